//! Daily step count generation.
//!
//! Two independent uniform draws: the configured baseline is first jittered
//! by `baseline_range` (skipped when zero), then the final count is drawn
//! within `final_range` of that intermediate baseline. Both ranges clamp at
//! zero.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::account::Account;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Jitter applied to the configured baseline (R1).
    #[serde(default)]
    pub baseline_range: u32,
    /// Jitter applied around the intermediate baseline (R2).
    #[serde(default = "default_final_range")]
    pub final_range: u32,
}

fn default_final_range() -> u32 {
    2000
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            baseline_range: 0,
            final_range: default_final_range(),
        }
    }
}

/// Both layers of one generation, kept for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepDraw {
    pub baseline: u32,
    pub steps: u32,
}

fn draw_around<R: Rng + ?Sized>(rng: &mut R, center: u32, range: u32) -> u32 {
    let low = center.saturating_sub(range);
    let high = center.saturating_add(range);
    rng.gen_range(low..=high)
}

/// Generate with a caller-supplied RNG.
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, baseline: u32, config: &StepConfig) -> StepDraw {
    let baseline = if config.baseline_range > 0 {
        draw_around(rng, baseline, config.baseline_range)
    } else {
        baseline
    };
    let steps = draw_around(rng, baseline, config.final_range);
    StepDraw { baseline, steps }
}

/// Today's step count for an account.
pub fn generate(account: &Account, config: &StepConfig) -> u32 {
    let draw = generate_with(&mut rand::thread_rng(), account.baseline, config);
    tracing::debug!(
        account = %account.user,
        configured = account.baseline,
        baseline = draw.baseline,
        steps = draw.steps,
        "generated step count"
    );
    draw.steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn zero_ranges_return_baseline() {
        let cfg = StepConfig {
            baseline_range: 0,
            final_range: 0,
        };
        let draw = generate_with(&mut rand::thread_rng(), 12_345, &cfg);
        assert_eq!(draw, StepDraw { baseline: 12_345, steps: 12_345 });
    }

    #[test]
    fn small_baseline_clamps_at_zero() {
        let cfg = StepConfig {
            baseline_range: 5000,
            final_range: 2000,
        };
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let draw = generate_with(&mut rng, 100, &cfg);
            assert!(draw.baseline <= 5100);
            assert!(draw.steps <= draw.baseline + 2000);
        }
    }

    #[test]
    fn generate_stays_in_default_window() {
        let account = Account::new("a@example.com", "pw", 20_000, "", None).unwrap();
        for _ in 0..200 {
            let steps = generate(&account, &StepConfig::default());
            assert!((18_000..=22_000).contains(&steps));
        }
    }

    #[test]
    fn draws_are_not_fixed() {
        let cfg = StepConfig::default();
        let mut rng = rand::thread_rng();
        let values: std::collections::HashSet<u32> =
            (0..50).map(|_| generate_with(&mut rng, 20_000, &cfg).steps).collect();
        assert!(values.len() > 1);
    }

    proptest! {
        #[test]
        fn final_draw_within_r2_when_r1_zero(baseline in 0u32..200_000, seed in any::<u64>()) {
            let cfg = StepConfig { baseline_range: 0, final_range: 2000 };
            let draw = generate_with(&mut StdRng::seed_from_u64(seed), baseline, &cfg);
            prop_assert_eq!(draw.baseline, baseline);
            prop_assert!(draw.steps >= baseline.saturating_sub(2000));
            prop_assert!(draw.steps <= baseline + 2000);
        }

        #[test]
        fn both_layers_respect_their_ranges(
            baseline in 0u32..200_000,
            r1 in 1u32..50_000,
            r2 in 0u32..10_000,
            seed in any::<u64>(),
        ) {
            let cfg = StepConfig { baseline_range: r1, final_range: r2 };
            let draw = generate_with(&mut StdRng::seed_from_u64(seed), baseline, &cfg);
            prop_assert!(draw.baseline >= baseline.saturating_sub(r1));
            prop_assert!(draw.baseline <= baseline + r1);
            prop_assert!(draw.steps >= draw.baseline.saturating_sub(r2));
            prop_assert!(draw.steps <= draw.baseline + r2);
        }
    }
}
