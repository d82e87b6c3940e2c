//! The pipeline driver (spec.md §4.G): a thin orchestrator over parse →
//! lint → build → generate, grounded on `prqlc::compile`'s staged-pipeline
//! shape (`examples/PRQL-prql/prqlc/prqlc/src/lib.rs`). Each stage is a
//! plain function call; the driver's only job is sequencing, timing, and
//! aggregating warnings (spec.md §5: stages execute in a fixed order and
//! warnings aggregate in that order).

use std::time::Instant;

use sha2::{Digest, Sha256};

use mdx_ast::Error;

use crate::config::Config;
use crate::dax::{self, GenOutput};
use crate::ir::{self, Query};
use crate::lint::{self, Report as LintReport};
use crate::text;

/// The result record returned by [`mdx_to_dax`]: DAX text plus the
/// aggregated warnings/timings/hash spec.md calls for.
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub dax: String,
    pub warnings: Vec<String>,
    pub metadata: ir::Metadata,
}

/// The result record returned by [`optimise`]: the linter's report plus a
/// best-effort reserialization of the rewritten tree back to MDX text
/// (spec.md §9 Open Question 1).
#[derive(Debug, Clone)]
pub struct OptimiseResult {
    pub report: LintReport,
    pub mdx: String,
}

fn source_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cheap CST shape sanity check, used as the linter's validation hook
/// (spec.md §4.E's "Safety" mechanism): a rewrite that drops the select
/// statement's only axis or empties out its cube reference has broken
/// something, regardless of which rule did it.
fn validate_cst_shape(query: &mdx_ast::cst::Query) -> Result<(), String> {
    if query.select.axes.is_empty() {
        return Err("select statement has no axes".to_string());
    }
    if query.select.cube.name().is_empty() {
        return Err("cube reference has no name".to_string());
    }
    if let Some(with) = &query.with {
        if with.defs.is_empty() {
            return Err("WITH clause has no calculated member definitions".to_string());
        }
        for def in &with.defs {
            if def.name.segments.is_empty() {
                return Err("calculated member definition has an empty name".to_string());
            }
        }
    }
    Ok(())
}

fn parse_stage(text: &str, config: &Config) -> Result<(mdx_ast::cst::Query, std::time::Duration), Error> {
    let start = Instant::now();
    let query = mdx_parser::parse(text, &config.parser)?;
    Ok((query, start.elapsed()))
}

/// `parse → optional lint → build`, shared by [`mdx_to_dax`], [`parse_only`]
/// and [`explain`].
fn parse_and_build(
    source: &str,
    config: &Config,
    run_lint: bool,
) -> Result<(Query, ir::Timings, Vec<String>), Error> {
    let (cst, parse_time) = parse_stage(source, config)?;
    log::debug!("parsed {} bytes in {:?}", source.len(), parse_time);

    let mut timings = ir::Timings {
        parse: Some(parse_time),
        ..ir::Timings::default()
    };
    let mut warnings = Vec::new();

    let cst = if run_lint {
        let start = Instant::now();
        let (linted, report) = lint::lint(cst, &config.linter, Some(&validate_cst_shape));
        timings.lint = Some(start.elapsed());
        if report.timed_out {
            warnings.push("linter timed out before completing all rules".to_string());
        }
        log::debug!("lint fired {} rule(s)", report.rules_fired.len());
        linted
    } else {
        cst
    };

    let start = Instant::now();
    let mut query = ir::build(&cst)?;
    timings.build = Some(start.elapsed());
    log::debug!("built IR in {:?}", timings.build.unwrap());

    warnings.append(&mut query.metadata.warnings);
    Ok((query, timings, warnings))
}

/// `parse → optional lint → build → generate` (spec.md §4.G).
pub fn mdx_to_dax(source: &str, config: &Config) -> Result<CompileResult, Error> {
    let run_lint = config.linter.level != lint::OptimizationLevel::None;
    let (mut query, mut timings, mut warnings) = parse_and_build(source, config, run_lint)?;

    let start = Instant::now();
    let GenOutput {
        dax,
        warnings: gen_warnings,
    } = dax::generate(&query, &config.dax)?;
    timings.generate = Some(start.elapsed());
    log::info!("generated {} byte(s) of DAX in {:?}", dax.len(), timings.generate.unwrap());

    warnings.extend(gen_warnings);
    query.metadata.timings = timings;
    query.metadata.source_hash = Some(source_hash(source));
    query.metadata.complexity_score = Some(query.complexity_score());
    query.metadata.warnings = warnings.clone();

    Ok(CompileResult {
        dax,
        warnings,
        metadata: query.metadata,
    })
}

/// `parse → build`, without linting or generation (spec.md §4.G).
pub fn parse_only(source: &str, config: &Config) -> Result<Query, Error> {
    let (mut query, timings, warnings) = parse_and_build(source, config, false)?;
    query.metadata.timings = timings;
    query.metadata.source_hash = Some(source_hash(source));
    query.metadata.complexity_score = Some(query.complexity_score());
    query.metadata.warnings = warnings;
    Ok(query)
}

/// `parse → lint → reserialize CST to text` (spec.md §4.G). Always lints,
/// regardless of `config.linter.level` being `None`, since that's the
/// whole point of calling this entry point rather than `mdx_to_dax`.
pub fn optimise(source: &str, config: &Config) -> Result<OptimiseResult, Error> {
    let (cst, _parse_time) = parse_stage(source, config)?;
    let (linted, report) = lint::lint(cst, &config.linter, Some(&validate_cst_shape));
    let mdx = text::render_query(&linted);
    Ok(OptimiseResult { report, mdx })
}

/// Renders a built [`Query`] into a caller-supplied explanation format.
/// Rendering itself is out of scope here; this trait is the seam an
/// external explanation component plugs into (spec.md §4.G,
/// SPEC_FULL.md's supplemented features).
pub trait Explainer {
    fn explain(&self, query: &Query) -> String;
}

/// `parse → build → hand the IR to an [`Explainer`]` (spec.md §4.G).
pub fn explain(source: &str, config: &Config, explainer: &dyn Explainer) -> Result<String, Error> {
    let (query, _timings, _warnings) = parse_and_build(source, config, false)?;
    Ok(explainer.explain(&query))
}

#[cfg(test)]
mod test {
    use super::*;

    struct NameListExplainer;
    impl Explainer for NameListExplainer {
        fn explain(&self, query: &Query) -> String {
            query
                .measures
                .iter()
                .map(|m| m.name.clone())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    #[test]
    fn mdx_to_dax_returns_dax_and_metadata() {
        let config = Config::default();
        let result = mdx_to_dax(
            "SELECT {[Measures].[Sales Amount]} ON 0 FROM [Adventure Works]",
            &config,
        )
        .unwrap();
        assert!(result.dax.contains("EVALUATE") && result.dax.contains("[Sales Amount]"));
        assert!(result.metadata.source_hash.is_some());
        assert!(result.metadata.timings.parse.is_some());
        assert!(result.metadata.timings.generate.is_some());
    }

    #[test]
    fn fast_config_skips_linting() {
        let config = Config::fast();
        let result = mdx_to_dax(
            "WITH MEMBER [Measures].[X] AS (1 + 2) \
             SELECT {[Measures].[X]} ON 0 FROM [Cube]",
            &config,
        )
        .unwrap();
        assert!(result.metadata.timings.lint.is_none());
    }

    #[test]
    fn parse_only_returns_ir_without_generating() {
        let config = Config::default();
        let query = parse_only("SELECT {[Measures].[A]} ON 0 FROM [Cube]", &config).unwrap();
        assert_eq!(query.measures.len(), 1);
        assert!(query.metadata.complexity_score.is_some());
    }

    #[test]
    fn optimise_reports_fired_rules_and_reserializes() {
        let config = Config::default();
        let result = optimise(
            "WITH MEMBER [Measures].[X] AS (1 + 2) \
             SELECT {[Measures].[X]} ON 0 FROM [Cube]",
            &config,
        )
        .unwrap();
        assert!(!result.report.rules_fired.is_empty());
        assert!(!result.mdx.contains("(1 + 2)"));
    }

    #[test]
    fn explain_hands_ir_to_the_supplied_explainer() {
        let config = Config::default();
        let text = explain(
            "SELECT {[Measures].[Sales Amount], [Measures].[Total Cost]} ON 0 FROM [Cube]",
            &config,
            &NameListExplainer,
        )
        .unwrap();
        assert_eq!(text, "Sales Amount, Total Cost");
    }

    #[test]
    fn invalid_input_surfaces_a_parse_error() {
        let config = Config::default();
        let err = mdx_to_dax("SELECT FROM [Cube]", &config).unwrap_err();
        assert!(err.to_string().len() > 0);
    }
}
