//! Module version ordering.
//!
//! Versions are `v`-prefixed semantic versions (`v1.2.3`,
//! `v0.0.0-20190101000000-abcdef123456`). Build metadata such as
//! `+incompatible` is accepted and ignored for ordering.
//!
//! [`for_sorting`] maps a version to a string whose byte-wise order is the
//! semver precedence order, letting SQL stores compare versions with plain
//! `<` and `>`.

use std::cmp::Ordering;

use semver::{Prerelease, Version};

use crate::error::{IndexError, Result};

/// Parse a `v`-prefixed semantic version.
pub fn parse(version: &str) -> Result<Version> {
    let Some(rest) = version.strip_prefix('v') else {
        return Err(IndexError::invalid(format!(
            "version {version:?} is not v-prefixed"
        )));
    };
    Version::parse(rest)
        .map_err(|e| IndexError::invalid(format!("version {version:?}: {e}")))
}

/// Compare two versions by semver precedence.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    let a = parse(a)?;
    let b = parse(b)?;
    Ok((a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre)))
}

/// Sort key for a version.
///
/// Numbers are written as a length letter followed by their digits, so
/// longer numbers sort after shorter ones. A release ends in `~`, which sorts
/// after the `-` that introduces a prerelease. Prerelease identifiers are
/// joined with `!` (below every identifier character) so a shorter
/// identifier list sorts first; numeric identifiers get a `#` marker and
/// alphanumeric ones `$`, putting numeric before alphanumeric.
pub fn for_sorting(version: &str) -> Result<String> {
    let v = parse(version)?;
    let mut key = String::new();
    key.push_str(&encode_number(v.major));
    key.push(',');
    key.push_str(&encode_number(v.minor));
    key.push(',');
    key.push_str(&encode_number(v.patch));
    if v.pre == Prerelease::EMPTY {
        key.push('~');
        return Ok(key);
    }
    key.push('-');
    for (i, ident) in v.pre.as_str().split('.').enumerate() {
        if i > 0 {
            key.push('!');
        }
        match ident.parse::<u64>() {
            Ok(n) if ident.chars().all(|c| c.is_ascii_digit()) => {
                key.push('#');
                key.push_str(&encode_number(n));
            }
            _ => {
                key.push('$');
                key.push_str(ident);
            }
        }
    }
    Ok(key)
}

fn encode_number(n: u64) -> String {
    let digits = n.to_string();
    let len_marker = (b'a' + (digits.len() as u8 - 1)) as char;
    format!("{len_marker}{digits}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requires_v_prefix() {
        assert!(parse("v1.2.3").is_ok());
        assert!(matches!(parse("1.2.3"), Err(IndexError::InvalidInput(_))));
        assert!(matches!(parse("v1.2"), Err(IndexError::InvalidInput(_))));
        assert!(parse("v2.0.0+incompatible").is_ok());
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare("v1.0.0", "v0.5.0").unwrap(), Ordering::Greater);
        assert_eq!(compare("v1.0.0", "v1.5.2").unwrap(), Ordering::Less);
        assert_eq!(compare("v1.0.0", "v1.0.0").unwrap(), Ordering::Equal);
        assert_eq!(
            compare("v2.0.0+incompatible", "v2.0.0").unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_sort_key_matches_precedence() {
        // Ascending semver precedence.
        let ordered = [
            "v0.0.0-20190101000000-abcdef123456",
            "v0.0.9",
            "v0.9.0",
            "v1.0.0-alpha",
            "v1.0.0-alpha.1",
            "v1.0.0-alpha.beta",
            "v1.0.0-alpha-b",
            "v1.0.0-beta",
            "v1.0.0-beta.2",
            "v1.0.0-beta.11",
            "v1.0.0-rc.1",
            "v1.0.0",
            "v1.1.0",
            "v1.2.3",
            "v1.2.4",
            "v1.10.0",
            "v2.0.0",
            "v10.0.0",
        ];
        for pair in ordered.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert_eq!(compare(a, b).unwrap(), Ordering::Less, "{a} < {b}");
            let (ka, kb) = (for_sorting(a).unwrap(), for_sorting(b).unwrap());
            assert!(ka < kb, "sort key {ka:?} for {a} should be < {kb:?} for {b}");
        }
    }

    #[test]
    fn test_sort_key_ignores_build_metadata() {
        assert_eq!(
            for_sorting("v2.0.0+incompatible").unwrap(),
            for_sorting("v2.0.0").unwrap()
        );
    }
}
