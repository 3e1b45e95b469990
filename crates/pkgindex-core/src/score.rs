//! Ranking score for a matched search document.
//!
//! ```text
//! base  = max(text_rank, 0) × (1 + w × ln(1 + imported_by_count))
//! score = base × (no_go_mod_penalty if !has_go_mod)
//!              × (non_redistributable_penalty if !redistributable)
//! ```
//!
//! Popularity has diminishing weight, and a document's score never drops
//! when either its text rank or its imported-by count grows.

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Tunable constants for [`ScoreWeights::score`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Weight `w` of `ln(1 + imported_by_count)` in the base score.
    pub popularity_weight: f64,
    /// Multiplier applied to modules without a go.mod file.
    pub no_go_mod_penalty: f64,
    /// Multiplier applied to packages whose licenses forbid redistribution.
    pub non_redistributable_penalty: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            popularity_weight: 1.0,
            no_go_mod_penalty: 0.8,
            non_redistributable_penalty: 0.5,
        }
    }
}

impl ScoreWeights {
    /// Reject weights that would break monotonicity or make a penalty a
    /// no-op.
    pub fn validate(&self) -> Result<()> {
        if !(self.popularity_weight >= 0.0 && self.popularity_weight.is_finite()) {
            return Err(IndexError::invalid("popularity_weight must be a finite value >= 0"));
        }
        for (name, p) in [
            ("no_go_mod_penalty", self.no_go_mod_penalty),
            ("non_redistributable_penalty", self.non_redistributable_penalty),
        ] {
            if !(p > 0.0 && p < 1.0) {
                return Err(IndexError::invalid(format!("{name} must be in (0, 1), got {p}")));
            }
        }
        Ok(())
    }

    pub fn score(
        &self,
        text_rank: f64,
        imported_by_count: u64,
        redistributable: bool,
        has_go_mod: bool,
    ) -> f64 {
        let rank = if text_rank.is_finite() { text_rank.max(0.0) } else { 0.0 };
        let popularity = 1.0 + self.popularity_weight * (imported_by_count as f64).ln_1p();
        let mut score = rank * popularity;
        if !has_go_mod {
            score *= self.no_go_mod_penalty;
        }
        if !redistributable {
            score *= self.non_redistributable_penalty;
        }
        score
    }
}
