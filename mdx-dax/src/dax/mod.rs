//! The DAX code generator (spec.md §4.F): `generate(query, options)` turns
//! an IR `Query` into DAX text. Shape selection (table literal vs `ROW` vs
//! `SUMMARIZECOLUMNS`, `CALCULATETABLE` wrapping, `TOPN`, the `NON EMPTY`
//! guard) follows the decision tree in §4.F; expression lowering follows
//! its operator table.

use itertools::Itertools;
use regex::Regex;

use mdx_ast::{Error, WithErrorInfo};

use crate::ir::{
    CalculationKind, ComparisonOperator, Constant, Dimension, DimensionFilter, DimensionOperator,
    Expr, ExprBinOp, ExprUnOp, Filter, FunctionKind, MeasureFilter, MemberSelection, OrderKey,
    Query, SortDirection,
};

const RESERVED_WORDS: &[&str] = &[
    "DATE", "TIME", "YEAR", "MONTH", "DAY", "HOUR", "MINUTE", "SECOND", "TRUE", "FALSE", "ALL",
    "FILTER", "VALUES", "DISTINCT",
];

/// Options consumed by the generator (spec.md §6's `dax.*` table).
#[derive(Debug, Clone)]
pub struct DaxOptions {
    pub format_output: bool,
    pub indent_size: usize,
    pub escape_reserved_words: bool,
    /// The table `DEFINE MEASURE` targets name for calculated measures
    /// (spec.md §9 Open Question 2). `None` synthesizes `_Calculations`.
    pub default_calculation_table: Option<String>,
}

impl Default for DaxOptions {
    fn default() -> Self {
        DaxOptions {
            format_output: true,
            indent_size: 4,
            escape_reserved_words: true,
            default_calculation_table: None,
        }
    }
}

/// The generator's output: the DAX text plus any warnings raised while
/// producing it (unknown function names, measure filters needing manual
/// review, ignored offsets — spec.md §7).
#[derive(Debug, Clone)]
pub struct GenOutput {
    pub dax: String,
    pub warnings: Vec<String>,
}

pub fn generate(query: &Query, options: &DaxOptions) -> Result<GenOutput, Error> {
    let mut warnings = Vec::new();
    let calc_table = options
        .default_calculation_table
        .clone()
        .unwrap_or_else(|| "_Calculations".to_string());

    let define_block = build_define_block(query, &calc_table, options, &mut warnings)?;

    let (group_cols, mut filter_args) = split_dimensions(query, options);
    for f in &query.filters {
        match f {
            Filter::Dimension(df) => filter_args.push(render_dimension_filter(df, options)),
            Filter::Measure(mf) => {
                warnings.push(format!(
                    "measure filter on `{}` may require manual verification",
                    mf.measure
                ));
                filter_args.push(render_measure_filter(mf, &calc_table, options));
            }
            Filter::NonEmpty(_) => {}
        }
    }

    let mut table_expr = if group_cols.is_empty() {
        build_dimensionless_table(query, options)
    } else {
        let measure_args = build_measure_args(query);
        render_call(
            "SUMMARIZECOLUMNS",
            &[group_cols, measure_args].concat(),
            options,
        )
    };

    if !filter_args.is_empty() {
        let mut args = vec![table_expr];
        args.extend(filter_args);
        table_expr = render_call("CALCULATETABLE", &args, options);
    }

    if let Some(non_empty) = query.filters.iter().find_map(non_empty_measure) {
        let measure_name = non_empty.or_else(|| query.measures.first().map(|m| m.name.clone()));
        if let Some(measure_name) = measure_name {
            table_expr = format!("FILTER({table_expr}, [{measure_name}] <> BLANK())");
        }
    }

    if let Some(limit) = &query.limit {
        if limit.offset > 0 {
            warnings.push(
                "row offsets are not directly expressible in DAX TOPN; the limit was dropped"
                    .to_string(),
            );
        } else {
            table_expr = format!("TOPN({}, {table_expr})", limit.count);
        }
    }

    let mut out = String::new();
    if let Some(define) = define_block {
        out.push_str(&define);
        out.push('\n');
    }
    out.push_str("EVALUATE\n");
    out.push_str(&table_expr);
    if let Some(order_by) = build_order_by(&query.order_by) {
        out.push('\n');
        out.push_str(&order_by);
    }

    Ok(GenOutput { dax: out, warnings })
}

fn non_empty_measure(f: &Filter) -> Option<Option<String>> {
    match f {
        Filter::NonEmpty(ne) => Some(ne.measure.clone()),
        _ => None,
    }
}

/// Emits `DEFINE MEASURE` lines for every calculation, in dependency
/// order, so that a calculation referencing another always follows it
/// (spec.md §4.C `dependencies()`, §4.F).
fn build_define_block(
    query: &Query,
    calc_table: &str,
    options: &DaxOptions,
    warnings: &mut Vec<String>,
) -> Result<Option<String>, Error> {
    let ordered = query.calculations_in_dependency_order().ok_or_else(|| {
        Error::new_simple("cyclic dependency among calculated members").with_code("generation.cycle")
    })?;
    if ordered.is_empty() {
        return Ok(None);
    }

    let mut lines = Vec::new();
    for calc in ordered {
        if calc.kind == CalculationKind::Member {
            warnings.push(format!(
                "calculated member `{}` has no owning measure and is emitted as a best-effort MEASURE",
                calc.name
            ));
        }
        let expr_text = render_expr(&calc.expression, options, warnings);
        let mut line = format!(
            "MEASURE {}[{}] = {}",
            quote_table(calc_table, options),
            calc.name,
            expr_text
        );
        if let Some(format_string) = &calc.format {
            line.push_str(&format!(" FORMAT_STRING = {}", literal_string(format_string)));
        }
        lines.push(line);
    }

    let body = if options.format_output {
        lines
            .iter()
            .map(|l| format!("{}{l}", " ".repeat(options.indent_size)))
            .join("\n")
    } else {
        lines.join(" ")
    };
    Ok(Some(format!("DEFINE\n{body}")))
}

/// Splits a query's dimensions into `SUMMARIZECOLUMNS` group columns and
/// filter arguments: `Specific` selections become `IN` filters rather than
/// group columns (spec.md §4.F).
fn split_dimensions(query: &Query, options: &DaxOptions) -> (Vec<String>, Vec<String>) {
    let mut group_cols = Vec::new();
    let mut filters = Vec::new();
    for dim in &query.dimensions {
        match &dim.members {
            MemberSelection::Specific(values) => {
                filters.push(render_specific_filter(dim, values, options));
            }
            _ => group_cols.push(col_ref(&dim.hierarchy.table, &dim.level.name, options)),
        }
    }
    (group_cols, filters)
}

fn render_specific_filter(dim: &Dimension, values: &[String], options: &DaxOptions) -> String {
    let col = col_ref(&dim.hierarchy.table, &dim.level.name, options);
    if values.len() == 1 {
        format!("{col} = {}", literal_for_filter_value(&values[0]))
    } else {
        format!("{col} IN {{{}}}", filter_value_list(values))
    }
}

fn render_dimension_filter(df: &DimensionFilter, options: &DaxOptions) -> String {
    let col = col_ref(&df.dimension.table, &df.dimension.name, options);
    match df.operator {
        DimensionOperator::Eq if df.values.len() == 1 => {
            format!("{col} = {}", literal_for_filter_value(&df.values[0]))
        }
        DimensionOperator::Eq | DimensionOperator::In => {
            format!("{col} IN {{{}}}", filter_value_list(&df.values))
        }
        DimensionOperator::Ne if df.values.len() == 1 => {
            format!("{col} <> {}", literal_for_filter_value(&df.values[0]))
        }
        DimensionOperator::NotIn | DimensionOperator::Ne => {
            format!("NOT({col} IN {{{}}})", filter_value_list(&df.values))
        }
        DimensionOperator::Gt => format!("{col} > {}", first_value(df)),
        DimensionOperator::Lt => format!("{col} < {}", first_value(df)),
        DimensionOperator::Ge => format!("{col} >= {}", first_value(df)),
        DimensionOperator::Le => format!("{col} <= {}", first_value(df)),
        DimensionOperator::Contains => {
            let v = first_value(df);
            format!("NOT(ISERROR(SEARCH({v}, {col})))")
        }
        DimensionOperator::StartsWith => {
            let v = first_value(df);
            format!("NOT(ISERROR(SEARCH({v}, {col}, 1))) && SEARCH({v}, {col}, 1) = 1")
        }
        DimensionOperator::EndsWith => {
            let v = first_value(df);
            format!(
                "NOT(ISERROR(SEARCH({v}, {col}))) && SEARCH({v}, {col}) = LEN({col}) - LEN({v}) + 1"
            )
        }
    }
}

fn first_value(df: &DimensionFilter) -> String {
    df.values
        .first()
        .map(|v| literal_for_filter_value(v))
        .unwrap_or_else(|| "BLANK()".to_string())
}

fn render_measure_filter(mf: &MeasureFilter, calc_table: &str, options: &DaxOptions) -> String {
    format!(
        "FILTER(ALL({}), [{}] {} {})",
        quote_table(calc_table, options),
        mf.measure,
        comparison_symbol(mf.operator),
        literal_number(mf.value)
    )
}

fn comparison_symbol(op: ComparisonOperator) -> &'static str {
    match op {
        ComparisonOperator::Eq => "=",
        ComparisonOperator::Ne => "<>",
        ComparisonOperator::Gt => ">",
        ComparisonOperator::Lt => "<",
        ComparisonOperator::Ge => ">=",
        ComparisonOperator::Le => "<=",
    }
}

fn filter_value_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| literal_for_filter_value(v))
        .join(", ")
}

/// The dimensionless shapes of spec.md §4.F: a brace table literal when no
/// measure carries an alias, `ROW(...)` otherwise.
fn build_dimensionless_table(query: &Query, _options: &DaxOptions) -> String {
    if query.measures.is_empty() {
        return "{ }".to_string();
    }
    if query.measures.iter().any(|m| m.alias.is_some()) {
        let parts: Vec<String> = query
            .measures
            .iter()
            .map(|m| {
                let label = m.alias.clone().unwrap_or_else(|| m.name.clone());
                format!("{}, [{}]", literal_string(&label), m.name)
            })
            .collect();
        format!("ROW({})", parts.join(", "))
    } else {
        let parts: Vec<String> = query.measures.iter().map(|m| format!("[{}]", m.name)).collect();
        format!("{{ {} }}", parts.join(", "))
    }
}

/// `"alias-or-name", [measure]` for every measure — library measures and
/// already-`DEFINE`d calculated measures are referenced identically, since
/// both resolve to a named DAX measure by the time `SUMMARIZECOLUMNS`
/// sees them (spec.md §9 records this reading of an otherwise-ambiguous
/// sentence in §4.F).
fn build_measure_args(query: &Query) -> Vec<String> {
    query
        .measures
        .iter()
        .map(|m| {
            let label = m.alias.clone().unwrap_or_else(|| m.name.clone());
            format!("{}, [{}]", literal_string(&label), m.name)
        })
        .collect()
}

fn build_order_by(order_by: &[OrderKey]) -> Option<String> {
    if order_by.is_empty() {
        return None;
    }
    let parts: Vec<String> = order_by
        .iter()
        .map(|k| {
            let dir = match k.direction {
                SortDirection::Desc => " DESC",
                SortDirection::Asc => "",
            };
            format!("[{}]{dir}", k.expr_name)
        })
        .collect();
    Some(format!("ORDER BY {}", parts.join(", ")))
}

/// A generic multi-argument call pretty-printer. Every nested call is
/// rendered independently and then re-indented wholesale by one level, so
/// `CALCULATETABLE(SUMMARIZECOLUMNS(...), filter)` lines up exactly like
/// the worked examples in spec.md §8 without each call needing to know its
/// nesting depth.
fn render_call(name: &str, args: &[String], options: &DaxOptions) -> String {
    if !options.format_output {
        return format!("{name}({})", args.join(", "));
    }
    let indent = " ".repeat(options.indent_size);
    let mut body = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            body.push_str(",\n");
        }
        for (j, line) in arg.lines().enumerate() {
            if j > 0 {
                body.push('\n');
            }
            body.push_str(&indent);
            body.push_str(line);
        }
    }
    format!("{name}(\n{body}\n)")
}

fn render_expr(expr: &Expr, options: &DaxOptions, warnings: &mut Vec<String>) -> String {
    match expr {
        Expr::Constant(c) => render_constant(c),
        Expr::MeasureRef(name) => format!("[{name}]"),
        Expr::MemberRef(m) => format!("{}[{}]", quote_table(&m.table, options), m.member),
        Expr::Binary(l, op, r) => render_binary(l, *op, r, options, warnings),
        Expr::Unary(op, e) => {
            let inner = render_expr(e, options, warnings);
            match op {
                ExprUnOp::Neg => format!("-({inner})"),
                ExprUnOp::Not => format!("NOT({inner})"),
            }
        }
        Expr::FunctionCall(kind, name, args) => {
            let dax_name = if *kind == FunctionKind::Unknown {
                warnings.push(format!(
                    "MDX function `{name}` has no recognised DAX equivalent; passed through verbatim"
                ));
                name.clone()
            } else {
                map_known_function(name)
            };
            let rendered_args: Vec<String> =
                args.iter().map(|a| render_expr(a, options, warnings)).collect();
            format!("{dax_name}({})", rendered_args.join(", "))
        }
        Expr::Iif(c, t, e) => format!(
            "IF({}, {}, {})",
            render_expr(c, options, warnings),
            render_expr(t, options, warnings),
            render_expr(e, options, warnings)
        ),
        Expr::Case(arms, else_branch) => {
            let mut acc = match else_branch {
                Some(e) => render_expr(e, options, warnings),
                None => "BLANK()".to_string(),
            };
            for (cond, value) in arms.iter().rev() {
                acc = format!(
                    "IF({}, {}, {acc})",
                    render_expr(cond, options, warnings),
                    render_expr(value, options, warnings)
                );
            }
            acc
        }
    }
}

fn render_binary(l: &Expr, op: ExprBinOp, r: &Expr, options: &DaxOptions, warnings: &mut Vec<String>) -> String {
    let lt = render_expr(l, options, warnings);
    let rt = render_expr(r, options, warnings);
    match op {
        ExprBinOp::Add => format!("({lt} + {rt})"),
        ExprBinOp::Sub => format!("({lt} - {rt})"),
        ExprBinOp::Mul => format!("({lt} * {rt})"),
        ExprBinOp::Div => format!("DIVIDE({lt}, {rt})"),
        ExprBinOp::Eq => format!("({lt} = {rt})"),
        ExprBinOp::Ne => format!("({lt} <> {rt})"),
        ExprBinOp::Lt => format!("({lt} < {rt})"),
        ExprBinOp::Le => format!("({lt} <= {rt})"),
        ExprBinOp::Gt => format!("({lt} > {rt})"),
        ExprBinOp::Ge => format!("({lt} >= {rt})"),
        ExprBinOp::And => format!("({lt} && {rt})"),
        ExprBinOp::Or => format!("({lt} || {rt})"),
    }
}

fn map_known_function(name: &str) -> String {
    match name.to_ascii_uppercase().as_str() {
        "MEMBERS" | "CHILDREN" | "DESCENDANTS" => "VALUES".to_string(),
        "AVG" => "AVERAGE".to_string(),
        other => other.to_string(),
    }
}

fn render_constant(c: &Constant) -> String {
    match c {
        Constant::Number(n) => literal_number(*n),
        Constant::String(s) => literal_string(s),
        Constant::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
    }
}

fn literal_string(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn literal_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn literal_for_filter_value(v: &str) -> String {
    if let Ok(i) = v.parse::<i64>() {
        return i.to_string();
    }
    if let Ok(f) = v.parse::<f64>() {
        if f.is_finite() {
            return literal_number(f);
        }
    }
    literal_string(v)
}

fn bare_identifier() -> &'static Regex {
    static BARE_IDENTIFIER: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    BARE_IDENTIFIER.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap())
}

fn quote_table(name: &str, options: &DaxOptions) -> String {
    let needs_quote = !bare_identifier().is_match(name)
        || (options.escape_reserved_words
            && RESERVED_WORDS.iter().any(|r| r.eq_ignore_ascii_case(name)));
    if needs_quote {
        format!("'{}'", name.replace('\'', "''"))
    } else {
        name.to_string()
    }
}

fn col_ref(table: &str, col: &str, options: &DaxOptions) -> String {
    format!("{}[{col}]", quote_table(table, options))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir;

    fn gen(mdx: &str) -> String {
        let cst = mdx_parser::parse(mdx, &mdx_parser::ParserOptions::default()).unwrap();
        let query = ir::build(&cst).unwrap();
        generate(&query, &DaxOptions::default()).unwrap().dax
    }

    fn gen_with(mdx: &str, options: &DaxOptions) -> String {
        let cst = mdx_parser::parse(mdx, &mdx_parser::ParserOptions::default()).unwrap();
        let query = ir::build(&cst).unwrap();
        generate(&query, options).unwrap().dax
    }

    fn norm(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn measure_only() {
        let dax = gen("SELECT {[Measures].[Sales Amount]} ON 0 FROM [Adventure Works]");
        assert_eq!(norm(&dax), norm("EVALUATE\n{ [Sales Amount] }"));
    }

    #[test]
    fn measure_by_dimension() {
        let dax = gen(
            "SELECT {[Measures].[Sales Amount]} ON COLUMNS, \
             {[Product].[Category].Members} ON ROWS FROM [Adventure Works]",
        );
        assert_eq!(
            norm(&dax),
            norm(
                "EVALUATE\nSUMMARIZECOLUMNS(\n    Product[Category],\n    \"Sales Amount\", [Sales Amount]\n)"
            )
        );
    }

    #[test]
    fn multiple_measures_quoted_table() {
        let dax = gen(
            "SELECT {{{[Measures].[Sales Amount]},{[Measures].[Order Quantity]}}} ON 0, \
             {[Date].[Calendar Year].Members} ON 1 FROM [Adventure Works]",
        );
        assert_eq!(
            norm(&dax),
            norm(
                "EVALUATE\nSUMMARIZECOLUMNS(\n    'Date'[Calendar Year],\n    \"Sales Amount\", [Sales Amount],\n    \"Order Quantity\", [Order Quantity]\n)"
            )
        );
    }

    #[test]
    fn slicer_becomes_filter() {
        let dax = gen(
            "SELECT {[Measures].[Sales Amount]} ON 0, {[Product].[Category].Members} ON 1 \
             FROM [Adventure Works] WHERE ([Date].[Calendar Year].&[2023])",
        );
        assert_eq!(
            norm(&dax),
            norm(
                "EVALUATE\nCALCULATETABLE(\n    SUMMARIZECOLUMNS(\n        Product[Category],\n        \"Sales Amount\", [Sales Amount]\n    ),\n    'Date'[Calendar Year] = 2023\n)"
            )
        );
    }

    #[test]
    fn specific_members_become_in_filter() {
        let dax = gen(
            "SELECT {[Measures].[Sales Amount]} ON 0, \
             {[Product].[Category].[Bikes], [Product].[Category].[Accessories]} ON 1 \
             FROM [Adventure Works]",
        );
        assert_eq!(
            norm(&dax),
            norm(
                "EVALUATE\nCALCULATETABLE(\n    SUMMARIZECOLUMNS(\n        \"Sales Amount\", [Sales Amount]\n    ),\n    Product[Category] IN {\"Bikes\", \"Accessories\"}\n)"
            )
        );
    }

    #[test]
    fn calculated_measure_gets_define_block() {
        let dax = gen(
            "WITH MEMBER [Measures].[Profit] AS [Measures].[Sales Amount] - [Measures].[Total Cost] \
             SELECT {[Measures].[Profit]} ON 0 FROM [Adventure Works]",
        );
        assert!(dax.starts_with("DEFINE\n"));
        assert!(dax.contains("MEASURE _Calculations[Profit] = ([Sales Amount] - [Total Cost])"));
        assert!(dax.ends_with("EVALUATE\n{ [Profit] }"));
    }

    #[test]
    fn positive_offset_is_dropped_with_warning() {
        let cst = mdx_parser::parse(
            "SELECT {[Measures].[Sales Amount]} ON 0 FROM [Cube]",
            &mdx_parser::ParserOptions::default(),
        )
        .unwrap();
        let mut query = ir::build(&cst).unwrap();
        query.limit = Some(ir::Limit { count: 10, offset: 5 });
        let out = generate(&query, &DaxOptions::default()).unwrap();
        assert!(!out.dax.contains("TOPN"));
        assert!(out.warnings.iter().any(|w| w.contains("offset")));
    }

    #[test]
    fn unformatted_output_is_single_line() {
        let options = DaxOptions {
            format_output: false,
            ..DaxOptions::default()
        };
        let dax = gen_with(
            "SELECT {[Measures].[Sales Amount]} ON COLUMNS, \
             {[Product].[Category].Members} ON ROWS FROM [Adventure Works]",
            &options,
        );
        assert!(!dax.contains('\n') || dax.lines().count() <= 2);
    }
}
