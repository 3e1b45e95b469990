//! HyperLogLog primitives for approximate result counts.
//!
//! Every search document stores two small integers derived from its package
//! path: the register it falls into and the leading-zero count of its hash.
//! Counting the distinct documents matching a query is then a `GROUP BY
//! hll_register` with `MAX(hll_leading_zeros)` over the matching rows, fed
//! into a [`Sketch`].
//!
//! [`hash`] and [`leading_zero_bits`] are bit-exact and must never change:
//! values persisted by one build are read back by every later build.

use md5::{Digest, Md5};

/// log2 of the register count.
pub const REGISTER_BITS: u32 = 7;

/// Number of registers (`m` in the HLL literature).
pub const REGISTER_COUNT: usize = 1 << REGISTER_BITS;

/// 64-bit hash of `value`: the first 8 bytes of its MD5 digest, big-endian,
/// as a signed integer.
pub fn hash(value: &str) -> i64 {
    let digest = Md5::digest(value.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(prefix)
}

/// Leading zero bits of `x` in 64-bit two's complement.
///
/// `0` has 64; any negative value has 0.
pub fn leading_zero_bits(x: i64) -> u32 {
    (x as u64).leading_zeros()
}

/// Register index for a hash: its low [`REGISTER_BITS`] bits.
pub fn register(hash: i64) -> u32 {
    (hash as u64 & (REGISTER_COUNT as u64 - 1)) as u32
}

/// The `(hll_register, hll_leading_zeros)` pair stored with a document.
pub fn observation(package_path: &str) -> (u32, u32) {
    let h = hash(package_path);
    (register(h), leading_zero_bits(h))
}

/// Fixed-size accumulator of per-register maxima.
#[derive(Debug, Clone)]
pub struct Sketch {
    registers: [u8; REGISTER_COUNT],
}

impl Default for Sketch {
    fn default() -> Self {
        Self::new()
    }
}

impl Sketch {
    pub fn new() -> Self {
        Self {
            registers: [0; REGISTER_COUNT],
        }
    }

    /// Record a hashed value.
    pub fn insert_hash(&mut self, hash: i64) {
        self.observe(register(hash), leading_zero_bits(hash));
    }

    /// Record a stored `(register, leading zeros)` pair.
    ///
    /// The register value kept is `leading_zeros + 1` (the position of the
    /// first set bit), clamped to the largest possible value. Out-of-range
    /// registers are ignored.
    pub fn observe(&mut self, register: u32, leading_zeros: u32) {
        let Some(slot) = self.registers.get_mut(register as usize) else {
            return;
        };
        let rank = (leading_zeros.min(64) + 1) as u8;
        if rank > *slot {
            *slot = rank;
        }
    }

    /// Approximate number of distinct values recorded.
    pub fn estimate(&self) -> u64 {
        let m = REGISTER_COUNT as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);

        let mut sum = 0.0;
        let mut empty = 0usize;
        for &r in &self.registers {
            sum += 2f64.powi(-(r as i32));
            if r == 0 {
                empty += 1;
            }
        }

        let raw = alpha * m * m / sum;
        let estimate = if raw <= 2.5 * m && empty > 0 {
            // Linear counting for the small range.
            m * (m / empty as f64).ln()
        } else {
            raw
        };
        estimate.round() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.registers.iter().all(|&r| r == 0)
    }
}

impl Extend<(u32, u32)> for Sketch {
    fn extend<T: IntoIterator<Item = (u32, u32)>>(&mut self, iter: T) {
        for (register, zeros) in iter {
            self.observe(register, zeros);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_zero_bits() {
        let cases: &[(i64, u32)] = &[
            (-1, 0),
            (i64::MIN, 0),
            (0, 64),
            (1, 63),
            (1 << 31, 32),
            (1 << 62, 1),
            (i64::MAX, 1),
        ];
        for &(x, want) in cases {
            assert_eq!(leading_zero_bits(x), want, "leading_zero_bits({x})");
        }
    }

    #[test]
    fn test_hash_is_md5_prefix() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(hash(""), i64::from_be_bytes([0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04]));
    }

    #[test]
    fn test_hash_is_stable() {
        for s in ["", "The lazy fox.", "golang.org/x/tools", "Hello, 世界"] {
            assert_eq!(hash(s), hash(s));
        }
        assert_ne!(hash("golang.org/x/tools"), hash("golang.org/x/tool"));
    }

    #[test]
    fn test_register_in_range() {
        for s in ["a", "b", "foo.com/A", "Hello, 世界"] {
            assert!((register(hash(s)) as usize) < REGISTER_COUNT);
        }
        assert_eq!(register(-1), (REGISTER_COUNT - 1) as u32);
        assert_eq!(register(0), 0);
    }

    #[test]
    fn test_empty_sketch_estimates_zero() {
        let sketch = Sketch::new();
        assert!(sketch.is_empty());
        assert_eq!(sketch.estimate(), 0);
    }

    #[test]
    fn test_estimate_small_and_large() {
        for n in [1usize, 10, 72, 1_000, 20_000] {
            let mut sketch = Sketch::new();
            for i in 0..n {
                sketch.insert_hash(hash(&format!("example.com/pkg{i}")));
            }
            let est = sketch.estimate() as f64;
            let err = (est - n as f64).abs() / n as f64;
            // Standard error for m = 128 is about 9%; allow a wide margin.
            assert!(err < 0.35, "n={n} estimate={est}");
        }
    }

    #[test]
    fn test_duplicates_do_not_count() {
        let mut sketch = Sketch::new();
        for _ in 0..100 {
            sketch.insert_hash(hash("foo.com/A"));
        }
        assert_eq!(sketch.estimate(), 1);
    }

    #[test]
    fn test_extend_from_observations() {
        let mut a = Sketch::new();
        let mut b = Sketch::new();
        let paths: Vec<String> = (0..50).map(|i| format!("bar.com/importer{i}")).collect();
        for p in &paths {
            a.insert_hash(hash(p));
        }
        b.extend(paths.iter().map(|p| observation(p)));
        assert_eq!(a.estimate(), b.estimate());
    }
}
