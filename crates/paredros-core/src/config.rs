use std::env;
use tracing::warn;

/// Controls which consecutive decision steps collapse into one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConfig {
    pub enabled: bool,
    /// Only merge runs of steps that belong to the same rule.
    pub require_same_rule: bool,
    /// Runs shorter than this are left alone.
    pub min_group_size: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_same_rule: true,
            min_group_size: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How many upcoming tokens each step records.
    pub lookahead_depth: usize,
    pub merge: MergeConfig,
    /// Bound on the simulated call stack while predicting alternatives.
    pub max_prediction_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lookahead_depth: 3,
            merge: MergeConfig::default(),
            max_prediction_depth: 64,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(depth) = lookup("PAREDROS_LOOKAHEAD") {
            match depth.parse::<usize>() {
                Ok(depth) => config.lookahead_depth = depth,
                Err(_) => warn!(
                    value = %depth,
                    default = config.lookahead_depth,
                    "Invalid PAREDROS_LOOKAHEAD value, using default"
                ),
            }
        }

        if let Some(merge) = lookup("PAREDROS_MERGE") {
            match parse_switch(&merge) {
                Some(enabled) => config.merge.enabled = enabled,
                None => warn!(value = %merge, "Invalid PAREDROS_MERGE value, merging stays on"),
            }
        }

        if let Some(across) = lookup("PAREDROS_MERGE_ACROSS_RULES") {
            match parse_switch(&across) {
                Some(across) => config.merge.require_same_rule = !across,
                None => warn!(
                    value = %across,
                    "Invalid PAREDROS_MERGE_ACROSS_RULES value, merging stays within rules"
                ),
            }
        }

        if let Some(depth) = lookup("PAREDROS_MAX_PREDICTION_DEPTH") {
            match depth.parse::<usize>() {
                Ok(depth) if depth > 0 => config.max_prediction_depth = depth,
                _ => warn!(
                    value = %depth,
                    default = config.max_prediction_depth,
                    "Invalid PAREDROS_MAX_PREDICTION_DEPTH value, using default"
                ),
            }
        }

        config
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Some(true),
        "0" | "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rustc_hash::FxHashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: FxHashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.lookahead_depth, 3);
        assert_eq!(config.merge.min_group_size, 2);
    }

    #[rstest]
    #[case(&[("PAREDROS_LOOKAHEAD", "5")], 5, true, true)]
    #[case(&[("PAREDROS_LOOKAHEAD", "five")], 3, true, true)]
    #[case(&[("PAREDROS_MERGE", "off")], 3, false, true)]
    #[case(&[("PAREDROS_MERGE", "maybe")], 3, true, true)]
    #[case(&[("PAREDROS_MERGE_ACROSS_RULES", "on")], 3, true, false)]
    fn test_from_lookup(
        #[case] vars: &[(&str, &str)],
        #[case] lookahead: usize,
        #[case] merge_enabled: bool,
        #[case] same_rule: bool,
    ) {
        let config = Config::from_lookup(lookup(vars));
        assert_eq!(config.lookahead_depth, lookahead);
        assert_eq!(config.merge.enabled, merge_enabled);
        assert_eq!(config.merge.require_same_rule, same_rule);
    }

    #[rstest]
    #[case("0", 64)]
    #[case("12", 12)]
    fn test_prediction_depth(#[case] value: &str, #[case] expected: usize) {
        let config = Config::from_lookup(lookup(&[("PAREDROS_MAX_PREDICTION_DEPTH", value)]));
        assert_eq!(config.max_prediction_depth, expected);
    }
}
