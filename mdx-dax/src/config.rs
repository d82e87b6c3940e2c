//! The value-struct configuration consumed by the pipeline driver (spec.md
//! §6). Nothing in this crate reads a file or an environment variable for
//! it — loading config from disk is explicitly out of scope (spec.md §1) —
//! it is only ever constructed by the caller and passed in, exactly as
//! `prqlc::Options` is consumed by `prqlc::compile`.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dax::DaxOptions;
use crate::lint::{LinterOptions, OptimizationLevel, RuleName};
use mdx_parser::ParserOptions;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub parser: ParserOptions,
    pub linter: LinterOptions,
    pub dax: DaxOptions,
}

impl Config {
    /// Level `none`, no formatting: the cheapest profile, useful for
    /// hot-path translation where the caller doesn't care about the
    /// linter's cosmetic rewrites (spec.md §9 Design Notes).
    pub fn fast() -> Self {
        Config {
            parser: ParserOptions::default(),
            linter: LinterOptions {
                level: crate::lint::OptimizationLevel::None,
                ..LinterOptions::default()
            },
            dax: DaxOptions {
                format_output: false,
                ..DaxOptions::default()
            },
        }
    }

    /// Level `aggressive`, full formatting: every linter rule enabled,
    /// pretty-printed output.
    pub fn comprehensive() -> Self {
        Config {
            parser: ParserOptions::default(),
            linter: LinterOptions {
                level: crate::lint::OptimizationLevel::Aggressive,
                ..LinterOptions::default()
            },
            dax: DaxOptions {
                format_output: true,
                ..DaxOptions::default()
            },
        }
    }
}

/// Serializable mirror of [`Config`], since `ParserOptions`/`LinterOptions`
/// carry `Duration`/`HashSet<RuleName>` fields that don't implement
/// `Serialize` directly. Kept separate rather than deriving on the live
/// types, matching how the teacher keeps its wire/CLI config structs
/// distinct from the options structs components actually consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue {
    pub parser_strict_mode: bool,
    pub parser_max_input_size_chars: Option<usize>,
    pub parser_parse_timeout_secs: Option<f64>,
    pub linter_optimization_level: String,
    pub linter_disabled_rules: Vec<String>,
    pub linter_max_processing_time_secs: f64,
    pub linter_validate_before: bool,
    pub linter_validate_after: bool,
    pub dax_format_output: bool,
    pub dax_indent_size: usize,
    pub dax_escape_reserved_words: bool,
}

impl Default for ConfigValue {
    fn default() -> Self {
        let config = Config::default();
        ConfigValue {
            parser_strict_mode: config.parser.strict_mode,
            parser_max_input_size_chars: config.parser.max_input_size_chars,
            parser_parse_timeout_secs: config.parser.parse_timeout.map(|d| d.as_secs_f64()),
            linter_optimization_level: "conservative".to_string(),
            linter_disabled_rules: Vec::new(),
            linter_max_processing_time_secs: config
                .linter
                .timeout
                .map(|d| d.as_secs_f64())
                .unwrap_or(5.0),
            linter_validate_before: true,
            linter_validate_after: true,
            dax_format_output: config.dax.format_output,
            dax_indent_size: config.dax.indent_size,
            dax_escape_reserved_words: config.dax.escape_reserved_words,
        }
    }
}

/// Round-trips a [`ConfigValue`] back into a live [`Config`], the
/// counterpart `prqlc::Options`' own wire-struct-to-live-struct
/// conversions perform. Fails on an optimization level or rule name the
/// current build doesn't recognise, rather than silently dropping it.
impl std::convert::TryFrom<ConfigValue> for Config {
    type Error = String;

    fn try_from(value: ConfigValue) -> Result<Self, Self::Error> {
        let level = match value.linter_optimization_level.as_str() {
            "none" => OptimizationLevel::None,
            "conservative" => OptimizationLevel::Conservative,
            "moderate" => OptimizationLevel::Moderate,
            "aggressive" => OptimizationLevel::Aggressive,
            other => return Err(format!("unknown linter optimization level `{other}`")),
        };

        let mut disabled_rules = HashSet::new();
        for name in &value.linter_disabled_rules {
            let rule = match name.as_str() {
                "ParenthesesCleaner" => RuleName::ParenthesesCleaner,
                "CrossJoinSimplifier" => RuleName::CrossJoinSimplifier,
                "DuplicateSetMember" => RuleName::DuplicateSetMember,
                "DuplicateCalcMember" => RuleName::DuplicateCalcMember,
                "VacuousFunctionCalls" => RuleName::VacuousFunctionCalls,
                other => return Err(format!("unknown linter rule name `{other}`")),
            };
            disabled_rules.insert(rule);
        }

        Ok(Config {
            parser: ParserOptions {
                strict_mode: value.parser_strict_mode,
                max_input_size_chars: value.parser_max_input_size_chars,
                parse_timeout: value.parser_parse_timeout_secs.map(Duration::from_secs_f64),
            },
            linter: LinterOptions {
                level,
                disabled_rules,
                validate_before: value.linter_validate_before,
                validate_after: value.linter_validate_after,
                timeout: Some(Duration::from_secs_f64(value.linter_max_processing_time_secs)),
                ..LinterOptions::default()
            },
            dax: DaxOptions {
                format_output: value.dax_format_output,
                indent_size: value.dax_indent_size,
                escape_reserved_words: value.dax_escape_reserved_words,
                ..DaxOptions::default()
            },
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fast_disables_formatting_and_linting() {
        let config = Config::fast();
        assert_eq!(config.linter.level, crate::lint::OptimizationLevel::None);
        assert!(!config.dax.format_output);
    }

    #[test]
    fn comprehensive_enables_everything() {
        let config = Config::comprehensive();
        assert_eq!(config.linter.level, crate::lint::OptimizationLevel::Aggressive);
        assert!(config.dax.format_output);
    }

    #[test]
    fn config_value_round_trips_through_json() {
        let value = ConfigValue::default();
        let json = serde_json::to_string(&value).unwrap();
        let back: ConfigValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dax_indent_size, value.dax_indent_size);
    }

    #[test]
    fn config_value_converts_into_a_live_config() {
        let value = ConfigValue {
            linter_optimization_level: "aggressive".to_string(),
            linter_disabled_rules: vec!["VacuousFunctionCalls".to_string()],
            linter_validate_before: false,
            linter_validate_after: true,
            dax_indent_size: 2,
            ..ConfigValue::default()
        };
        let config = Config::try_from(value).unwrap();
        assert_eq!(config.linter.level, crate::lint::OptimizationLevel::Aggressive);
        assert!(config
            .linter
            .disabled_rules
            .contains(&crate::lint::RuleName::VacuousFunctionCalls));
        assert!(!config.linter.validate_before);
        assert!(config.linter.validate_after);
        assert_eq!(config.dax.indent_size, 2);
    }

    #[test]
    fn config_value_rejects_an_unknown_optimization_level() {
        let value = ConfigValue {
            linter_optimization_level: "extreme".to_string(),
            ..ConfigValue::default()
        };
        assert!(Config::try_from(value).is_err());
    }
}
