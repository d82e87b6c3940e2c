//! CST → IR lowering (spec.md §4.D). `build` implements the nine-step
//! algorithm from the spec: locate clauses, split the cube reference,
//! classify axis contents into measures/dimensions, lower slicer tuples
//! into filters, lower `WITH MEMBER` bodies into `Calculation`s, lower
//! scalar expressions, then validate.

use std::collections::HashMap;

use itertools::Itertools;
use mdx_ast::{self as cst, Error, WithErrorInfo};

use super::query::*;
use super::validate::Issue;

pub fn build(query: &cst::Query) -> Result<Query, Error> {
    let cube = split_cube_ref(&query.select.cube);

    let mut measures = Vec::new();
    let mut dimensions: Vec<Dimension> = Vec::new();
    let mut filters = Vec::new();
    let mut warnings = Vec::new();

    // Step 3/4: classify every axis's set contents into measures and
    // dimensions, merging sibling Specific members of the same
    // (table, level) into one dimension entry. An axis carrying `NON
    // EMPTY` becomes a `Filter::NonEmpty`, naming the measure found on
    // that same axis when there is exactly one (spec.md §6's mandatory
    // `NON EMPTY` input surface, §7's "NON EMPTY approximations" warning
    // category — DAX has no per-tuple suppression, only the
    // `FILTER(tbl, [measure] <> BLANK())` guard the generator wraps this
    // filter in).
    for axis in &query.select.axes {
        let mut members = Vec::new();
        flatten_set(&axis.set, &mut members);
        if axis.non_empty {
            let axis_measures: Vec<&str> = members
                .iter()
                .filter(|m| is_measures_ref(m))
                .filter_map(|m| m.path.segments.get(1).map(|s| s.text.as_str()))
                .collect();
            let measure = match axis_measures.as_slice() {
                [single] => Some(single.to_string()),
                _ => None,
            };
            filters.push(Filter::NonEmpty(NonEmptyFilter { measure }));
            warnings.push(
                "NON EMPTY is approximated as a FILTER(..., [measure] <> BLANK()) guard; \
                 exact MDX non-empty tuple suppression is not reproduced"
                    .to_string(),
            );
        }
        classify_members(&members, &mut measures, &mut dimensions, &mut warnings)?;
    }

    // Step 5: slicer -> filters, AND-combined across a tuple.
    if let Some(slicer) = &query.select.where_clause {
        for member in &slicer.members {
            if let Some(filter) = member_to_dimension_filter(member)? {
                filters.push(Filter::Dimension(filter));
            }
        }
    }

    // Step 6/7: WITH MEMBER definitions.
    let mut calculations = Vec::new();
    if let Some(with) = &query.with {
        for def in &with.defs {
            calculations.push(lower_calc_def(def)?);
        }
    }

    // Measures that refer to a calculation by name become CUSTOM.
    let calc_names: HashMap<&str, &Calculation> =
        calculations.iter().map(|c| (c.name.as_str(), c)).collect();
    for m in &mut measures {
        if let Some(calc) = calc_names.get(m.name.as_str()) {
            if calc.kind == CalculationKind::Measure {
                m.aggregation = Aggregation::Custom;
                m.expression = Some(calc.expression.clone());
            }
        }
    }

    let mut built = Query {
        cube,
        measures,
        dimensions,
        filters,
        calculations,
        order_by: Vec::new(),
        limit: None,
        metadata: Metadata {
            warnings,
            ..Metadata::default()
        },
    };

    // Step 8/9: validate, splitting issues into blocking errors and
    // metadata warnings.
    let issues = built.validate();
    let (blocking, advisory): (Vec<Issue>, Vec<Issue>) =
        issues.into_iter().partition(|i| i.blocking);
    if let Some(first) = blocking.into_iter().next() {
        return Err(Error::new_simple(first.message).with_code("build.invalid_query"));
    }
    built
        .metadata
        .warnings
        .extend(advisory.into_iter().map(|i| i.message));

    Ok(built)
}

fn split_cube_ref(cube: &cst::CubeRef) -> CubeRef {
    let segs: Vec<&str> = cube.segments.iter().map(|s| s.text.as_str()).collect();
    match segs.len() {
        0 => CubeRef {
            database: None,
            schema: None,
            name: String::new(),
        },
        1 => CubeRef {
            database: None,
            schema: None,
            name: segs[0].to_string(),
        },
        2 => CubeRef {
            database: None,
            schema: Some(segs[0].to_string()),
            name: segs[1].to_string(),
        },
        _ => CubeRef {
            database: Some(segs[0].to_string()),
            schema: Some(segs[segs.len() - 2].to_string()),
            name: segs[segs.len() - 1].to_string(),
        },
    }
}

/// Recursively flattens a CST set expression into the member expressions
/// it denotes, so crossjoins, nested braces and function-call sets are
/// all reduced to the same flat shape the classifier below expects
/// (spec.md §4.D step 3).
fn flatten_set<'a>(set: &'a cst::SetExpr, out: &mut Vec<&'a cst::MemberExpr>) {
    match set {
        cst::SetExpr::Member(m) => out.push(m),
        cst::SetExpr::Braced(braced) => {
            for el in &braced.elements {
                flatten_set_element(el, out);
            }
        }
        cst::SetExpr::CrossJoin(l, r) => {
            flatten_set(l, out);
            flatten_set(r, out);
        }
        cst::SetExpr::Paren(inner) => flatten_set(inner, out),
        cst::SetExpr::FunctionCall(call) => {
            for arg in &call.args {
                match arg {
                    cst::CallArg::Set(s) => flatten_set(s, out),
                    cst::CallArg::Value(cst::ValueExpr::Member(m)) => out.push(m),
                    cst::CallArg::Value(_) => {}
                }
            }
        }
    }
}

fn flatten_set_element<'a>(el: &'a cst::SetElement, out: &mut Vec<&'a cst::MemberExpr>) {
    match el {
        cst::SetElement::Member(m) => out.push(m),
        cst::SetElement::Tuple(t) => {
            for m in &t.members {
                out.push(m);
            }
        }
        cst::SetElement::Nested(s) => flatten_set(s, out),
    }
}

/// First segment case-insensitively `"Measures"` means a measure
/// reference; anything else is a dimension member reference (spec.md
/// §4.D step 3).
fn is_measures_ref(member: &cst::MemberExpr) -> bool {
    member
        .path
        .segments
        .first()
        .is_some_and(|s| s.text.eq_ignore_ascii_case("measures"))
}

fn classify_members(
    members: &[&cst::MemberExpr],
    measures: &mut Vec<Measure>,
    dimensions: &mut Vec<Dimension>,
    warnings: &mut Vec<String>,
) -> Result<(), Error> {
    // group dimension members by (table, level) so siblings in one set
    // merge into a single Specific dimension entry (spec.md §4.D step 4).
    let mut grouped: Vec<(HierarchyRef, LevelRef, MemberSelection)> = Vec::new();

    for member in members {
        if is_measures_ref(member) {
            let name = member
                .path
                .segments
                .get(1)
                .map(|s| s.text.clone())
                .unwrap_or_default();
            if measures.iter().any(|m| m.name == name) {
                continue;
            }
            measures.push(Measure {
                name,
                aggregation: Aggregation::Sum,
                alias: None,
                format: None,
                expression: None,
            });
            continue;
        }

        let segs = &member.path.segments;
        if segs.len() < 2 {
            warnings.push(format!(
                "member reference `{}` has too few segments to resolve a hierarchy/level",
                segs.iter()
                    .map(|s| s.text.as_str())
                    .join(".")
            ));
            continue;
        }
        let table = segs[0].text.clone();
        let level_name = segs[1].text.clone();
        let hierarchy = HierarchyRef {
            table: table.clone(),
            name: level_name.clone(),
        };
        let level = LevelRef {
            name: level_name,
            ordinal: None,
        };

        let selection = match &member.function {
            None => {
                if segs.len() >= 3 {
                    MemberSelection::Specific(vec![segs[2].text.clone()])
                } else {
                    MemberSelection::All
                }
            }
            Some(cst::MemberFunction::Members) => MemberSelection::All,
            Some(cst::MemberFunction::Children) => {
                MemberSelection::Children(segs.last().unwrap().text.clone())
            }
            Some(cst::MemberFunction::Descendants) => {
                MemberSelection::Descendants(segs.last().unwrap().text.clone())
            }
            Some(cst::MemberFunction::Key(key)) => MemberSelection::Specific(vec![key.clone()]),
            Some(cst::MemberFunction::Call(call)) => {
                warnings.push(format!(
                    "member function `{}` is not structurally understood, treated as ALL",
                    call.name
                ));
                MemberSelection::All
            }
        };

        if let Some((_, _, existing)) = grouped
            .iter_mut()
            .find(|(h, l, _)| h == &hierarchy && l == &level)
        {
            merge_selection(existing, selection);
        } else {
            grouped.push((hierarchy, level, selection));
        }
    }

    for (hierarchy, level, selection) in grouped {
        dimensions.push(Dimension {
            hierarchy,
            level,
            members: selection,
            alias: None,
        });
    }

    Ok(())
}

fn merge_selection(existing: &mut MemberSelection, new: MemberSelection) {
    match (existing, new) {
        (MemberSelection::Specific(a), MemberSelection::Specific(b)) => {
            for v in b {
                if !a.contains(&v) {
                    a.push(v);
                }
            }
        }
        (slot, new) => {
            *slot = new;
        }
    }
}

fn member_to_dimension_filter(member: &cst::MemberExpr) -> Result<Option<DimensionFilter>, Error> {
    if is_measures_ref(member) {
        return Ok(None);
    }
    let segs = &member.path.segments;
    if segs.len() < 2 {
        return Ok(None);
    }
    let dimension = HierarchyRef {
        table: segs[0].text.clone(),
        name: segs[1].text.clone(),
    };
    let value = match &member.function {
        Some(cst::MemberFunction::Key(key)) => key.clone(),
        None if segs.len() >= 3 => segs[2].text.clone(),
        _ => {
            return Ok(None);
        }
    };
    Ok(Some(DimensionFilter {
        dimension,
        operator: DimensionOperator::Eq,
        values: vec![value],
    }))
}

fn lower_calc_def(def: &cst::CalcMemberDef) -> Result<Calculation, Error> {
    let is_measure = def
        .name
        .segments
        .iter()
        .any(|s| s.text.eq_ignore_ascii_case("measures"));
    let name = def
        .name
        .segments
        .last()
        .map(|s| s.text.clone())
        .unwrap_or_default();
    let expression = lower_value_expr(&def.value)?;

    let mut solve_order = None;
    let mut format = None;
    for (prop, value) in &def.properties {
        if prop.eq_ignore_ascii_case("solve_order") {
            if let cst::ValueExpr::Literal(cst::Literal::Integer(n)) = value {
                solve_order = Some(*n as i32);
            }
        } else if prop.eq_ignore_ascii_case("format_string") {
            if let cst::ValueExpr::Literal(cst::Literal::String(s)) = value {
                format = Some(s.clone());
            }
        }
    }

    Ok(Calculation {
        name,
        kind: if is_measure {
            CalculationKind::Measure
        } else {
            CalculationKind::Member
        },
        expression,
        solve_order,
        format,
    })
}

/// Step 7: structural lowering of a scalar MDX expression to `ir::Expr`
/// (spec.md §4.D). Unknown function names are retained verbatim with
/// `FunctionKind::Unknown`; the generator decides whether to pass them
/// through or flag them.
fn lower_value_expr(expr: &cst::ValueExpr) -> Result<Expr, Error> {
    Ok(match expr {
        cst::ValueExpr::Literal(lit) => Expr::Constant(lower_literal(lit)),
        cst::ValueExpr::Paren(inner) => lower_value_expr(inner)?,
        cst::ValueExpr::Member(m) => lower_member_ref(m)?,
        cst::ValueExpr::Binary(b) => Expr::Binary(
            Box::new(lower_value_expr(&b.left)?),
            lower_bin_op(b.op),
            Box::new(lower_value_expr(&b.right)?),
        ),
        cst::ValueExpr::Unary(u) => {
            Expr::Unary(lower_un_op(u.op), Box::new(lower_value_expr(&u.expr)?))
        }
        cst::ValueExpr::Iif(i) => Expr::Iif(
            Box::new(lower_value_expr(&i.cond)?),
            Box::new(lower_value_expr(&i.then_branch)?),
            Box::new(lower_value_expr(&i.else_branch)?),
        ),
        cst::ValueExpr::Case(c) => {
            let arms = c
                .arms
                .iter()
                .map(|(cond, value)| Ok((lower_value_expr(cond)?, lower_value_expr(value)?)))
                .collect::<Result<Vec<_>, Error>>()?;
            let else_branch = c
                .else_branch
                .as_ref()
                .map(|e| lower_value_expr(e))
                .transpose()?
                .map(Box::new);
            Expr::Case(arms, else_branch)
        }
        cst::ValueExpr::FunctionCall(call) => {
            let kind = if known_function(&call.name) {
                FunctionKind::Known
            } else {
                FunctionKind::Unknown
            };
            let args = call
                .args
                .iter()
                .map(lower_call_arg)
                .collect::<Result<Vec<_>, Error>>()?;
            Expr::FunctionCall(kind, call.name.clone(), args)
        }
    })
}

fn lower_call_arg(arg: &cst::CallArg) -> Result<Expr, Error> {
    match arg {
        cst::CallArg::Value(v) => lower_value_expr(v),
        cst::CallArg::Set(cst::SetExpr::Member(m)) => lower_member_ref(m),
        cst::CallArg::Set(_) => Err(Error::new_simple(
            "function arguments naming a full set are not supported inside scalar expressions",
        )),
    }
}

fn lower_member_ref(member: &cst::MemberExpr) -> Result<Expr, Error> {
    if is_measures_ref(member) {
        let name = member
            .path
            .segments
            .get(1)
            .map(|s| s.text.clone())
            .unwrap_or_default();
        return Ok(Expr::MeasureRef(name));
    }
    let segs = &member.path.segments;
    let table = segs.first().map(|s| s.text.clone()).unwrap_or_default();
    let hierarchy = segs.get(1).map(|s| s.text.clone()).unwrap_or_default();
    let member_name = segs
        .get(2)
        .map(|s| s.text.clone())
        .unwrap_or_else(|| hierarchy.clone());
    Ok(Expr::MemberRef(MemberRef {
        table,
        hierarchy,
        member: member_name,
    }))
}

fn lower_literal(lit: &cst::Literal) -> Constant {
    match lit {
        cst::Literal::Integer(n) => Constant::Number(*n as f64),
        cst::Literal::Float(f) => Constant::Number(*f),
        cst::Literal::String(s) => Constant::String(s.clone()),
        cst::Literal::Boolean(b) => Constant::Bool(*b),
    }
}

fn lower_bin_op(op: cst::BinOpKind) -> ExprBinOp {
    match op {
        cst::BinOpKind::Add => ExprBinOp::Add,
        cst::BinOpKind::Sub => ExprBinOp::Sub,
        cst::BinOpKind::Mul => ExprBinOp::Mul,
        cst::BinOpKind::Div => ExprBinOp::Div,
        cst::BinOpKind::Eq => ExprBinOp::Eq,
        cst::BinOpKind::Ne => ExprBinOp::Ne,
        cst::BinOpKind::Lt => ExprBinOp::Lt,
        cst::BinOpKind::Le => ExprBinOp::Le,
        cst::BinOpKind::Gt => ExprBinOp::Gt,
        cst::BinOpKind::Ge => ExprBinOp::Ge,
        cst::BinOpKind::And => ExprBinOp::And,
        cst::BinOpKind::Or => ExprBinOp::Or,
    }
}

fn lower_un_op(op: cst::UnOpKind) -> ExprUnOp {
    match op {
        cst::UnOpKind::Neg => ExprUnOp::Neg,
        cst::UnOpKind::Not => ExprUnOp::Not,
    }
}

/// The fixed function-name table spec.md §4.D step 7 calls for: names the
/// generator is expected to map onto a specific DAX idiom. Anything not
/// listed here is passed through verbatim with a warning.
fn known_function(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "CROSSJOIN"
            | "FILTER"
            | "DESCENDANTS"
            | "ANCESTORS"
            | "MEMBERS"
            | "CHILDREN"
            | "UNION"
            | "INTERSECT"
            | "EXCEPT"
            | "NONEMPTY"
            | "DISTINCT"
            | "SUM"
            | "AVG"
            | "COUNT"
            | "MIN"
            | "MAX"
            | "PARALLELPERIOD"
            | "PERIODSTODATE"
            | "YTD"
            | "QTD"
            | "MTD"
            | "PREVIOUSMEMBER"
            | "LAG"
            | "LEAD"
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(mdx: &str) -> cst::Query {
        mdx_parser::parse(mdx, &mdx_parser::ParserOptions::default()).unwrap()
    }

    #[test]
    fn builds_measure_only_query() {
        let cst = parse("SELECT {[Measures].[Sales Amount]} ON 0 FROM [Adventure Works]");
        let q = build(&cst).unwrap();
        assert_eq!(q.measures.len(), 1);
        assert_eq!(q.measures[0].name, "Sales Amount");
        assert!(q.dimensions.is_empty());
        assert_eq!(q.cube.name, "Adventure Works");
    }

    #[test]
    fn builds_measure_by_dimension() {
        let cst = parse(
            "SELECT {[Measures].[Sales Amount]} ON COLUMNS, \
             {[Product].[Category].Members} ON ROWS FROM [Adventure Works]",
        );
        let q = build(&cst).unwrap();
        assert_eq!(q.dimensions.len(), 1);
        assert_eq!(q.dimensions[0].hierarchy.table, "Product");
        assert_eq!(q.dimensions[0].members, MemberSelection::All);
    }

    #[test]
    fn builds_specific_members_into_one_dimension() {
        let cst = parse(
            "SELECT {[Measures].[Sales Amount]} ON 0, \
             {[Product].[Category].[Bikes], [Product].[Category].[Accessories]} ON 1 \
             FROM [Adventure Works]",
        );
        let q = build(&cst).unwrap();
        assert_eq!(q.dimensions.len(), 1);
        assert_eq!(
            q.dimensions[0].members,
            MemberSelection::Specific(vec!["Bikes".to_string(), "Accessories".to_string()])
        );
    }

    #[test]
    fn builds_slicer_into_filter() {
        let cst = parse(
            "SELECT {[Measures].[Sales Amount]} ON 0 FROM [Adventure Works] \
             WHERE ([Date].[Calendar Year].&[2023])",
        );
        let q = build(&cst).unwrap();
        assert_eq!(q.filters.len(), 1);
        match &q.filters[0] {
            Filter::Dimension(f) => {
                assert_eq!(f.dimension.name, "Calendar Year");
                assert_eq!(f.values, vec!["2023".to_string()]);
            }
            _ => panic!("expected a dimension filter"),
        }
    }

    #[test]
    fn builds_calculated_measure() {
        let cst = parse(
            "WITH MEMBER [Measures].[Profit] AS [Measures].[Sales Amount] - [Measures].[Total Cost] \
             SELECT {[Measures].[Profit]} ON 0 FROM [Adventure Works]",
        );
        let q = build(&cst).unwrap();
        assert_eq!(q.calculations.len(), 1);
        assert_eq!(q.calculations[0].name, "Profit");
        assert_eq!(q.measures[0].aggregation, Aggregation::Custom);
        assert!(q.measures[0].expression.is_some());
    }

    #[test]
    fn rejects_cyclic_calculations() {
        let cst = parse(
            "WITH MEMBER [Measures].[A] AS [Measures].[B] \
             MEMBER [Measures].[B] AS [Measures].[A] \
             SELECT {[Measures].[A]} ON 0 FROM [Cube]",
        );
        assert!(build(&cst).is_err());
    }

    #[test]
    fn empty_braced_set_yields_no_members() {
        let cst = parse("SELECT {} ON 0 FROM [Cube]");
        let q = build(&cst).unwrap();
        assert!(q.measures.is_empty());
        assert!(q.dimensions.is_empty());
    }

    #[test]
    fn non_empty_axis_becomes_a_non_empty_filter_with_a_warning() {
        let cst = parse(
            "SELECT {[Measures].[Sales Amount]} ON 0, \
             NON EMPTY {[Product].[Category].Members} ON 1 \
             FROM [Adventure Works]",
        );
        let q = build(&cst).unwrap();
        assert!(q
            .filters
            .iter()
            .any(|f| matches!(f, Filter::NonEmpty(_))));
        assert!(q.metadata.warnings.iter().any(|w| w.contains("NON EMPTY")));
    }

    #[test]
    fn non_empty_axis_carrying_its_own_measure_names_it() {
        let cst = parse(
            "SELECT NON EMPTY {[Measures].[Sales Amount]} ON 0, \
             {[Product].[Category].Members} ON 1 \
             FROM [Adventure Works]",
        );
        let q = build(&cst).unwrap();
        let non_empty = q.filters.iter().find_map(|f| match f {
            Filter::NonEmpty(ne) => Some(ne),
            _ => None,
        });
        assert_eq!(non_empty.unwrap().measure.as_deref(), Some("Sales Amount"));
    }
}
