//! Reproducibility switches for clip sampling and the data-parallel resampling
//! kernels. The configuration is resolved once per process, either from the
//! `RIL_DETERMINISTIC*` variables or from an explicit [`configure`] call made
//! before anything reads it.

use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

const ENV_ENABLED: &str = "RIL_DETERMINISTIC";
const ENV_SEED: &str = "RIL_DETERMINISTIC_SEED";
const ENV_REDUCTION: &str = "RIL_DETERMINISTIC_REDUCTION";

/// Seed used when deterministic mode is on but no explicit seed was given.
pub const DEFAULT_SEED: u64 = 42;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterminismConfig {
    pub enabled: bool,
    /// Mixed into every labelled seed.
    pub base_seed: u64,
    /// Runs the rayon kernels on the calling thread in index order.
    pub single_threaded_reduction: bool,
}

impl Default for DeterminismConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_seed: DEFAULT_SEED,
            single_threaded_reduction: false,
        }
    }
}

impl DeterminismConfig {
    fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves the switches through `lookup`, which maps a variable name to
    /// its raw value.
    ///
    /// A present `RIL_DETERMINISTIC` enables the mode unless it reads as off.
    /// `RIL_DETERMINISTIC_REDUCTION` defaults to the enable flag, and an
    /// unparsable seed keeps [`DEFAULT_SEED`].
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup(ENV_ENABLED).map_or(false, |raw| parse_flag(&raw).unwrap_or(true));
        let base_seed = lookup(ENV_SEED)
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(DEFAULT_SEED);
        let single_threaded_reduction = lookup(ENV_REDUCTION)
            .and_then(|raw| parse_flag(&raw))
            .unwrap_or(enabled);

        Self {
            enabled,
            base_seed,
            single_threaded_reduction,
        }
    }

    /// Stable seed for `label` under this configuration's base seed.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        (self.base_seed, label).hash(&mut hasher);
        hasher.finish()
    }

    fn locks_reduction(&self) -> bool {
        self.enabled && self.single_threaded_reduction
    }
}

/// `Some(true)` / `Some(false)` for the usual spellings of a switch, `None`
/// for anything else.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

static CONFIG: OnceLock<DeterminismConfig> = OnceLock::new();

/// The process configuration, read from the environment on first use.
pub fn config() -> &'static DeterminismConfig {
    CONFIG.get_or_init(|| install(DeterminismConfig::from_env()))
}

/// Installs `cfg` unless a configuration was already resolved, and returns
/// whichever one is in effect.
pub fn configure(cfg: DeterminismConfig) -> &'static DeterminismConfig {
    CONFIG.get_or_init(|| install(cfg))
}

fn install(cfg: DeterminismConfig) -> DeterminismConfig {
    if cfg.locks_reduction() {
        // Ignored by rayon once its global pool exists.
        std::env::set_var("RAYON_NUM_THREADS", "1");
    }
    cfg
}

/// Seeded from `label` in deterministic mode, from OS entropy otherwise.
pub fn rng_from_label(label: &str) -> StdRng {
    let cfg = config();
    if cfg.enabled {
        StdRng::seed_from_u64(cfg.seed_for(label))
    } else {
        StdRng::from_entropy()
    }
}

pub fn rng_from_optional(seed: Option<u64>, label: &str) -> StdRng {
    seed.map_or_else(|| rng_from_label(label), StdRng::seed_from_u64)
}

/// Whether data-parallel kernels must stay on the calling thread.
pub fn lock_reduction_order() -> bool {
    config().locks_reduction()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)]) -> DeterminismConfig {
        let vars: HashMap<&str, &str> = vars.iter().copied().collect();
        DeterminismConfig::from_lookup(|name| vars.get(name).map(|raw| raw.to_string()))
    }

    #[test]
    fn no_variables_means_nondeterministic_defaults() {
        assert_eq!(resolve(&[]), DeterminismConfig::default());
    }

    #[test]
    fn enabling_locks_reductions_unless_overridden() {
        let cfg = resolve(&[(ENV_ENABLED, "1"), (ENV_SEED, " 7 ")]);
        assert!(cfg.enabled);
        assert_eq!(cfg.base_seed, 7);
        assert!(cfg.locks_reduction());

        let cfg = resolve(&[(ENV_ENABLED, "ON"), (ENV_REDUCTION, "no")]);
        assert!(cfg.enabled);
        assert!(!cfg.locks_reduction());
    }

    #[test]
    fn switch_spellings() {
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        // Present but unreadable still turns the mode on.
        assert!(resolve(&[(ENV_ENABLED, "maybe")]).enabled);
        assert!(!resolve(&[(ENV_ENABLED, "False")]).enabled);
    }

    #[test]
    fn unparsable_seed_keeps_the_default() {
        let cfg = resolve(&[(ENV_ENABLED, "1"), (ENV_SEED, "seven")]);
        assert_eq!(cfg.base_seed, DEFAULT_SEED);
    }

    #[test]
    fn labelled_seeds_depend_on_label_and_base() {
        let cfg = DeterminismConfig {
            enabled: true,
            base_seed: 99,
            ..DeterminismConfig::default()
        };
        assert_eq!(cfg.seed_for("ril.clip"), cfg.seed_for("ril.clip"));
        assert_ne!(cfg.seed_for("ril.clip"), cfg.seed_for("ril.crop"));
        let other = DeterminismConfig {
            base_seed: 100,
            ..cfg.clone()
        };
        assert_ne!(cfg.seed_for("ril.clip"), other.seed_for("ril.clip"));
    }

    #[test]
    fn explicit_seed_ignores_the_label() {
        let mut a = rng_from_optional(Some(11), "ril.clip");
        let mut b = rng_from_optional(Some(11), "ril.crop");
        let xs: Vec<u32> = (0..4).map(|_| a.gen()).collect();
        let ys: Vec<u32> = (0..4).map(|_| b.gen()).collect();
        assert_eq!(xs, ys);
    }
}
