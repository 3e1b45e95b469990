//! Import-path tokenizer for full-text indexing.
//!
//! Decomposes a slash-delimited package path into the tokens stored in the
//! `path_tokens` column of the full-text index. Both stores index exactly
//! these tokens, so a query word matches a path only through them.
//!
//! # Tokens
//!
//! 1. The full path, trimmed of leading and trailing `/`.
//! 2. Every contiguous run of two or more segments (`golang.org/x/tools`,
//!    `x/tools/go`, `go/packages`, …).
//! 3. Every segment, except version qualifiers (`v2`) and a leading
//!    well-known code host (`github.com`).
//! 4. The `-` separated parts of each segment and the `.` separated parts of
//!    dotted segments minus the last one (`k8s.io` → `k8s`), skipping generic
//!    hosting words, single characters, numbers and version qualifiers.
//!
//! # Example
//!
//! ```rust
//! use pkgindex_core::tokenize::path_tokens;
//!
//! let mut tokens = path_tokens("k8s.io/client-go");
//! tokens.sort();
//! assert_eq!(tokens, ["client", "client-go", "go", "k8s", "k8s.io", "k8s.io/client-go"]);
//! ```

use std::collections::BTreeSet;

/// First segments that identify a hosting service rather than a project.
const COMMON_HOSTS: &[&str] = &[
    "bitbucket.org",
    "github.com",
    "gitlab.com",
    "golang.org",
    "gopkg.in",
];

/// Dotted-segment parts that carry no meaning for search.
const HOST_WORDS: &[&str] = &[
    "bitbucket",
    "code",
    "git",
    "github",
    "gitlab",
    "golang",
    "google",
    "googlesource",
    "gopkg",
    "www",
];

/// Tokenize a package path. Order is unspecified; callers sort to compare.
pub fn path_tokens(path: &str) -> Vec<String> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Vec::new();
    }

    let mut tokens: BTreeSet<String> = BTreeSet::new();
    tokens.insert(path.to_string());

    let parts: Vec<&str> = path.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if part.contains('-') {
            for p in part.split('-') {
                insert_sub_token(&mut tokens, p);
            }
        }

        for j in (i + 2)..=parts.len() {
            let joined = parts[i..j].join("/");
            let run = joined.trim_matches('/');
            if !run.is_empty() {
                tokens.insert(run.to_string());
            }
        }

        if i == 0 && COMMON_HOSTS.contains(part) {
            continue;
        }
        if !part.is_empty() && !is_version_qualifier(part) {
            tokens.insert(part.to_string());
        }

        let dot_parts: Vec<&str> = part.split('.').collect();
        if dot_parts.len() > 1 {
            for p in &dot_parts[..dot_parts.len() - 1] {
                if HOST_WORDS.contains(p) {
                    continue;
                }
                insert_sub_token(&mut tokens, p);
            }
        }
    }

    tokens.into_iter().collect()
}

fn insert_sub_token(tokens: &mut BTreeSet<String>, sub: &str) {
    if sub.chars().count() < 2 {
        return;
    }
    if sub.chars().all(|c| c.is_ascii_digit()) || is_version_qualifier(sub) {
        return;
    }
    tokens.insert(sub.to_string());
}

/// `v1`, `v2`, `v10` and friends: major-version suffix segments.
pub fn is_version_qualifier(s: &str) -> bool {
    match s.strip_prefix('v') {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// Split free text into lower-cased alphanumeric words.
///
/// Used for both query terms and the name/synopsis side of a document, so
/// the in-memory store and the FTS5 `unicode61` tokenizer agree on what a
/// word is.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(path: &str) -> Vec<String> {
        let mut got = path_tokens(path);
        got.sort();
        got
    }

    fn want(tokens: &[&str]) -> Vec<String> {
        let mut w: Vec<String> = tokens.iter().map(|s| s.to_string()).collect();
        w.sort();
        w
    }

    #[test]
    fn test_single_segment() {
        assert_eq!(sorted("context"), want(&["context"]));
    }

    #[test]
    fn test_host_with_tld() {
        assert_eq!(
            sorted("rsc.io/quote"),
            want(&["quote", "rsc", "rsc.io", "rsc.io/quote"])
        );
    }

    #[test]
    fn test_dash_parts() {
        assert_eq!(
            sorted("k8s.io/client-go"),
            want(&["k8s", "k8s.io", "client", "go", "client-go", "k8s.io/client-go"])
        );
    }

    #[test]
    fn test_common_host_skipped() {
        assert_eq!(
            sorted("github.com/foo/bar"),
            want(&["github.com/foo", "github.com/foo/bar", "foo", "foo/bar", "bar"])
        );
    }

    #[test]
    fn test_all_contiguous_runs() {
        assert_eq!(
            sorted("golang.org/x/tools/go/packages"),
            want(&[
                "go",
                "go/packages",
                "golang.org/x",
                "golang.org/x/tools",
                "golang.org/x/tools/go",
                "golang.org/x/tools/go/packages",
                "packages",
                "tools",
                "tools/go",
                "tools/go/packages",
                "x",
                "x/tools",
                "x/tools/go",
                "x/tools/go/packages",
            ])
        );
    }

    #[test]
    fn test_stray_slashes() {
        assert_eq!(
            sorted("/example.com/foo-bar///package///"),
            want(&[
                "bar",
                "example",
                "example.com",
                "example.com/foo-bar",
                "example.com/foo-bar///package",
                "foo",
                "foo-bar",
                "foo-bar///package",
                "package",
            ])
        );
    }

    #[test]
    fn test_long_path() {
        assert_eq!(
            sorted("cloud.google.com/go/cmd/go-cloud-debug-agent/internal/valuecollector"),
            want(&[
                "agent",
                "cloud",
                "cloud.google.com",
                "cloud.google.com/go",
                "cloud.google.com/go/cmd",
                "cloud.google.com/go/cmd/go-cloud-debug-agent",
                "cloud.google.com/go/cmd/go-cloud-debug-agent/internal",
                "cloud.google.com/go/cmd/go-cloud-debug-agent/internal/valuecollector",
                "cmd",
                "cmd/go-cloud-debug-agent",
                "cmd/go-cloud-debug-agent/internal",
                "cmd/go-cloud-debug-agent/internal/valuecollector",
                "debug",
                "go",
                "go-cloud-debug-agent",
                "go-cloud-debug-agent/internal",
                "go-cloud-debug-agent/internal/valuecollector",
                "go/cmd",
                "go/cmd/go-cloud-debug-agent",
                "go/cmd/go-cloud-debug-agent/internal",
                "go/cmd/go-cloud-debug-agent/internal/valuecollector",
                "internal",
                "internal/valuecollector",
                "valuecollector",
            ])
        );
    }

    #[test]
    fn test_host_words_skipped() {
        assert_eq!(
            sorted("code.cloud.gitlab.google.k8s.io"),
            want(&["cloud", "k8s", "code.cloud.gitlab.google.k8s.io"])
        );
    }

    #[test]
    fn test_version_qualifiers_and_numbers() {
        let got = sorted("gopkg.in/yaml.v2");
        assert_eq!(got, want(&["gopkg.in/yaml.v2", "yaml", "yaml.v2"]));

        let got = sorted("example.com/mod/v3");
        assert!(!got.contains(&"v3".to_string()));
        assert!(got.contains(&"mod/v3".to_string()));

        let got = sorted("example.com/api-2024");
        assert!(!got.contains(&"2024".to_string()));
        assert!(got.contains(&"api".to_string()));
    }

    #[test]
    fn test_empty_paths() {
        assert!(path_tokens("/").is_empty());
        assert!(path_tokens("").is_empty());
        assert!(path_tokens("///").is_empty());
    }

    #[test]
    fn test_case_preserved() {
        let got = sorted("github.com/Azure/azure-sdk");
        assert!(got.contains(&"Azure".to_string()));
        assert!(got.contains(&"azure".to_string()));
    }

    #[test]
    fn test_full_path_always_present() {
        for path in [
            "github.com",
            "gopkg.in",
            "v2",
            "a",
            "/rsc.io/quote/",
            "example.com/foo-bar///package",
        ] {
            let full = path.trim_matches('/').to_string();
            assert!(path_tokens(path).contains(&full), "missing full path for {path}");
        }
    }

    #[test]
    fn test_tokens_of_tokens_are_subset() {
        for path in [
            "golang.org/x/tools/go/packages",
            "cloud.google.com/go/cmd/go-cloud-debug-agent/internal/valuecollector",
            "/example.com/foo-bar///package///",
            "code.cloud.gitlab.google.k8s.io",
            "github.com/foo/bar/v2",
            "gopkg.in/yaml.v2",
            "foo.com/github.com/bar",
        ] {
            let all: BTreeSet<String> = path_tokens(path).into_iter().collect();
            for token in &all {
                for sub in path_tokens(token) {
                    assert!(
                        all.contains(&sub),
                        "{path}: token {token:?} produced {sub:?} outside the original set"
                    );
                }
            }
        }
    }

    #[test]
    fn test_words_lowercases_and_splits() {
        let got: Vec<String> = words("Package client-go implements a Go client.").collect();
        assert_eq!(
            got,
            ["package", "client", "go", "implements", "a", "go", "client"]
        );
    }
}
