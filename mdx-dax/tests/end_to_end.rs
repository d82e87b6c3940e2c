//! Crate-level integration tests exercising the full `mdx_to_dax` pipeline
//! driver end to end, one per worked scenario in spec.md §8, in the style
//! of the teacher's `prqlc/tests/`.

use mdx_dax::{mdx_to_dax, Config};

fn compile_full(mdx: &str) -> mdx_dax::CompileResult {
    mdx_to_dax(mdx, &Config::default()).unwrap()
}

fn norm(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compile(mdx: &str) -> String {
    mdx_to_dax(mdx, &Config::default()).unwrap().dax
}

#[test]
fn scenario_1_measure_only() {
    let dax = compile("SELECT {[Measures].[Sales Amount]} ON 0 FROM [Adventure Works]");
    assert_eq!(norm(&dax), norm("EVALUATE { [Sales Amount] }"));
}

#[test]
fn scenario_2_measure_by_dimension() {
    let dax = compile(
        "SELECT {[Measures].[Sales Amount]} ON COLUMNS, \
         {[Product].[Category].Members} ON ROWS FROM [Adventure Works]",
    );
    assert_eq!(
        norm(&dax),
        norm(
            "EVALUATE
             SUMMARIZECOLUMNS(
                 Product[Category],
                 \"Sales Amount\", [Sales Amount]
             )"
        )
    );
}

#[test]
fn scenario_3_multiple_measures_quoted_table() {
    let dax = compile(
        "SELECT {{{[Measures].[Sales Amount]},{[Measures].[Order Quantity]}}} ON 0, \
         {[Date].[Calendar Year].Members} ON 1 FROM [Adventure Works]",
    );
    assert_eq!(
        norm(&dax),
        norm(
            "EVALUATE
             SUMMARIZECOLUMNS(
                 'Date'[Calendar Year],
                 \"Sales Amount\", [Sales Amount],
                 \"Order Quantity\", [Order Quantity]
             )"
        )
    );
}

#[test]
fn scenario_4_slicer_becomes_filter() {
    let dax = compile(
        "SELECT {[Measures].[Sales Amount]} ON 0, {[Product].[Category].Members} ON 1 \
         FROM [Adventure Works] WHERE ([Date].[Calendar Year].&[2023])",
    );
    assert_eq!(
        norm(&dax),
        norm(
            "EVALUATE
             CALCULATETABLE(
                 SUMMARIZECOLUMNS(
                     Product[Category],
                     \"Sales Amount\", [Sales Amount]
                 ),
                 'Date'[Calendar Year] = 2023
             )"
        )
    );
}

#[test]
fn scenario_5_specific_members_become_in_filter() {
    let dax = compile(
        "SELECT {[Measures].[Sales Amount]} ON 0, \
         {[Product].[Category].[Bikes], [Product].[Category].[Accessories]} ON 1 \
         FROM [Adventure Works]",
    );
    assert_eq!(
        norm(&dax),
        norm(
            "EVALUATE
             CALCULATETABLE(
                 SUMMARIZECOLUMNS(
                     \"Sales Amount\", [Sales Amount]
                 ),
                 Product[Category] IN {\"Bikes\", \"Accessories\"}
             )"
        )
    );
}

#[test]
fn scenario_6_calculated_measure_gets_define_block() {
    let dax = compile(
        "WITH MEMBER [Measures].[Profit] AS [Measures].[Sales Amount] - [Measures].[Total Cost] \
         SELECT {[Measures].[Profit]} ON 0 FROM [Adventure Works]",
    );
    assert!(dax.starts_with("DEFINE"));
    assert!(dax.contains("MEASURE"));
    assert!(dax.contains("[Profit] = ([Sales Amount] - [Total Cost])"));
    assert!(dax.contains("EVALUATE"));
    assert!(norm(&dax).ends_with("EVALUATE { [Profit] }"));
}

#[test]
fn empty_set_on_an_axis_produces_well_formed_dax() {
    let dax = compile("SELECT {} ON 0 FROM [Adventure Works]");
    assert!(dax.starts_with("EVALUATE"));
}

#[test]
fn key_reference_in_slicer_is_preserved_as_a_string_value() {
    let dax = compile(
        "SELECT {[Measures].[Sales Amount]} ON 0 FROM [Adventure Works] \
         WHERE ([Date].[Calendar Year].&[2023])",
    );
    assert!(dax.contains("'Date'[Calendar Year] = 2023"));
}

#[test]
fn compile_is_deterministic() {
    let mdx = "SELECT {[Measures].[Sales Amount]} ON COLUMNS, \
               {[Product].[Category].Members} ON ROWS FROM [Adventure Works]";
    assert_eq!(compile(mdx), compile(mdx));
}

#[test]
fn fast_config_produces_unformatted_single_line_output() {
    let dax = mdx_to_dax(
        "SELECT {[Measures].[Sales Amount]} ON COLUMNS, \
         {[Product].[Category].Members} ON ROWS FROM [Adventure Works]",
        &Config::fast(),
    )
    .unwrap()
    .dax;
    assert!(!dax.contains('\n'));
}

#[test]
fn non_empty_axis_is_wrapped_in_a_filter_guard_and_warned_about() {
    let result = compile_full(
        "SELECT {[Measures].[Sales Amount]} ON 0, \
         NON EMPTY {[Product].[Category].Members} ON 1 \
         FROM [Adventure Works]",
    );
    assert!(result.dax.contains("FILTER(") && result.dax.contains("[Sales Amount] <> BLANK()"));
    assert!(result.warnings.iter().any(|w| w.contains("NON EMPTY")));
}

#[test]
fn metadata_carries_a_stable_source_hash_and_complexity_score() {
    let mdx = "SELECT {[Measures].[Sales Amount]} ON 0 FROM [Adventure Works]";
    let first = mdx_to_dax(mdx, &Config::default()).unwrap();
    let second = mdx_to_dax(mdx, &Config::default()).unwrap();
    assert_eq!(first.metadata.source_hash, second.metadata.source_hash);
    assert!(first.metadata.complexity_score.is_some());
}
