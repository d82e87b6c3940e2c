//! The CST linter/normalizer (spec.md §4.E): `lint(cst, options)` rewrites
//! a query bottom-up without changing its meaning, and records what it
//! did in a `Report`. Safety trumps cleverness: whenever a rule cannot
//! prove a rewrite preserves semantics, it leaves the node untouched.

mod rules;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use mdx_ast::cst::Query;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum OptimizationLevel {
    #[default]
    None,
    Conservative,
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
pub enum RuleName {
    ParenthesesCleaner,
    CrossJoinSimplifier,
    DuplicateSetMember,
    DuplicateCalcMember,
    VacuousFunctionCalls,
}

impl RuleName {
    fn min_level(self) -> OptimizationLevel {
        match self {
            RuleName::ParenthesesCleaner
            | RuleName::CrossJoinSimplifier
            | RuleName::DuplicateSetMember
            | RuleName::DuplicateCalcMember => OptimizationLevel::Conservative,
            RuleName::VacuousFunctionCalls => OptimizationLevel::Moderate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinterOptions {
    pub level: OptimizationLevel,
    pub disabled_rules: HashSet<RuleName>,
    pub skip_on_validation_error: bool,
    pub timeout: Option<Duration>,
    /// Run the validation hook (if any) before rewriting (spec.md §6).
    pub validate_before: bool,
    /// Run the validation hook (if any) after rewriting (spec.md §6).
    pub validate_after: bool,
}

impl Default for LinterOptions {
    fn default() -> Self {
        LinterOptions {
            level: OptimizationLevel::Conservative,
            disabled_rules: HashSet::new(),
            skip_on_validation_error: true,
            timeout: Some(Duration::from_secs(2)),
            validate_before: true,
            validate_after: true,
        }
    }
}

impl LinterOptions {
    fn rule_enabled(&self, rule: RuleName) -> bool {
        rule.min_level() <= self.level && !self.disabled_rules.contains(&rule)
    }
}

#[derive(Debug, Clone)]
pub struct Action {
    pub rule: RuleName,
    pub description: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub actions: Vec<Action>,
    pub rules_fired: HashSet<RuleName>,
    pub timed_out: bool,
}

impl Report {
    fn record(&mut self, rule: RuleName, description: impl Into<String>, before: String, after: String) {
        if before == after {
            return;
        }
        self.rules_fired.insert(rule);
        self.actions.push(Action {
            rule,
            description: description.into(),
            before,
            after,
        });
    }
}

/// Bottom-up rewrite pass. `validate` is an optional hook run before and
/// after the rewrite, gated by `options.validate_before`/`validate_after`;
/// if it returns `Err` after rewriting and `skip_on_validation_error` is
/// set, the original tree is returned with a warning recorded in the
/// report instead of a fired rule.
pub fn lint(
    query: Query,
    options: &LinterOptions,
    validate: Option<&dyn Fn(&Query) -> Result<(), String>>,
) -> (Query, Report) {
    let mut report = Report::default();

    if options.validate_before {
        if let Some(validate) = validate {
            if let Err(e) = validate(&query) {
                report.actions.push(Action {
                    rule: RuleName::ParenthesesCleaner,
                    description: format!("pre-lint validation failed, skipping all rules: {e}"),
                    before: String::new(),
                    after: String::new(),
                });
                return (query, report);
            }
        }
    }

    let deadline = options.timeout.map(|d| Instant::now() + d);
    let original = query.clone();
    let rewritten = rules::rewrite_query(query, options, &mut report, deadline);

    if let Some(deadline) = deadline {
        if Instant::now() > deadline {
            report.timed_out = true;
        }
    }

    if options.validate_after {
        if let Some(validate) = validate {
            if let Err(e) = validate(&rewritten) {
                if options.skip_on_validation_error {
                    report.actions.push(Action {
                        rule: RuleName::ParenthesesCleaner,
                        description: format!("post-lint validation failed, reverting: {e}"),
                        before: String::new(),
                        after: String::new(),
                    });
                    return (original, report);
                }
            }
        }
    }

    (rewritten, report)
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(mdx: &str) -> Query {
        mdx_parser::parse(mdx, &mdx_parser::ParserOptions::default()).unwrap()
    }

    #[test]
    fn leaves_query_unchanged_at_none_level() {
        let q = parse("SELECT {([Measures].[Sales Amount])} ON 0 FROM [Cube]");
        let options = LinterOptions {
            level: OptimizationLevel::None,
            ..LinterOptions::default()
        };
        let (_, report) = lint(q, &options, None);
        assert!(report.actions.is_empty());
    }

    #[test]
    fn strips_redundant_parens_at_conservative_level() {
        let q = parse(
            "WITH MEMBER [Measures].[X] AS (1 + 2) \
             SELECT {[Measures].[X]} ON 0 FROM [Cube]",
        );
        let (linted, report) = lint(q, &LinterOptions::default(), None);
        assert!(report.rules_fired.contains(&RuleName::ParenthesesCleaner));
        let def = &linted.with.unwrap().defs[0];
        assert!(!matches!(*def.value, mdx_ast::cst::ValueExpr::Paren(_)));
    }

    #[test]
    fn dedupes_set_members_at_conservative_level() {
        let q = parse(
            "SELECT {[Measures].[A], [Measures].[A]} ON 0 FROM [Cube]",
        );
        let (linted, report) = lint(q, &LinterOptions::default(), None);
        assert!(report.rules_fired.contains(&RuleName::DuplicateSetMember));
        if let mdx_ast::cst::SetExpr::Braced(b) = &linted.select.axes[0].set {
            assert_eq!(b.elements.len(), 1);
        } else {
            panic!("expected a braced set");
        }
    }

    #[test]
    fn simplifies_vacuous_iif_only_at_moderate_level() {
        let q = parse(
            "WITH MEMBER [Measures].[X] AS IIF(1=1, [Measures].[A], [Measures].[A]) \
             SELECT {[Measures].[X]} ON 0 FROM [Cube]",
        );
        let conservative = LinterOptions::default();
        let (linted, report) = lint(q.clone(), &conservative, None);
        assert!(!report.rules_fired.contains(&RuleName::VacuousFunctionCalls));
        let _ = linted;

        let moderate = LinterOptions {
            level: OptimizationLevel::Moderate,
            ..LinterOptions::default()
        };
        let (linted, report) = lint(q, &moderate, None);
        assert!(report.rules_fired.contains(&RuleName::VacuousFunctionCalls));
        let def = &linted.with.unwrap().defs[0];
        assert!(matches!(*def.value, mdx_ast::cst::ValueExpr::Member(_)));
    }

    #[test]
    fn validation_hook_runs_before_and_after_by_default() {
        let q = parse("SELECT {[Measures].[A], [Measures].[A]} ON 0 FROM [Cube]");
        let calls = std::cell::RefCell::new(0);
        let validate = |_: &Query| -> Result<(), String> {
            *calls.borrow_mut() += 1;
            Ok(())
        };
        let _ = lint(q, &LinterOptions::default(), Some(&validate));
        assert_eq!(*calls.borrow(), 2);
    }

    #[test]
    fn disabling_validate_after_skips_the_post_rewrite_check() {
        let q = parse("SELECT {[Measures].[A], [Measures].[A]} ON 0 FROM [Cube]");
        let validate = |_: &Query| -> Result<(), String> { Err("always fails".to_string()) };
        let options = LinterOptions {
            validate_before: false,
            validate_after: false,
            ..LinterOptions::default()
        };
        let (linted, report) = lint(q, &options, Some(&validate));
        assert!(report.rules_fired.contains(&RuleName::DuplicateSetMember));
        if let mdx_ast::cst::SetExpr::Braced(b) = &linted.select.axes[0].set {
            assert_eq!(b.elements.len(), 1);
        } else {
            panic!("expected a braced set");
        }
    }
}
