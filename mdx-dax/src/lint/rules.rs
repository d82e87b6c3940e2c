//! The individual rewrite rules behind [`super::lint`] (spec.md §4.E). Each
//! rule is a bottom-up, total function over the node kinds it cares about;
//! every rewrite is guarded by a textual equivalence check (via
//! `crate::text`) so a rule only fires when it can prove the before/after
//! forms denote the same thing.

use std::time::Instant;

use itertools::Itertools;
use mdx_ast::cst::*;

use super::{LinterOptions, Report, RuleName};
use crate::text;

pub fn rewrite_query(
    mut query: Query,
    options: &LinterOptions,
    report: &mut Report,
    deadline: Option<Instant>,
) -> Query {
    if let Some(with) = query.with.take() {
        query.with = Some(rewrite_with_clause(with, options, report, deadline));
    }
    query.select.axes = query
        .select
        .axes
        .into_iter()
        .map(|axis| rewrite_axis(axis, options, report, deadline))
        .collect();
    query
}

fn timed_out(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() > d)
}

fn rewrite_with_clause(
    mut with: WithClause,
    options: &LinterOptions,
    report: &mut Report,
    deadline: Option<Instant>,
) -> WithClause {
    with.defs = with
        .defs
        .into_iter()
        .map(|d| rewrite_calc_def(d, options, report, deadline))
        .collect();

    if options.rule_enabled(RuleName::DuplicateCalcMember) {
        let before = render_defs(&with.defs);
        let mut seen = std::collections::HashSet::new();
        with.defs
            .retain(|d| seen.insert(text::render_member_path(&d.name)));
        let after = render_defs(&with.defs);
        report.record(
            RuleName::DuplicateCalcMember,
            "dropped later MEMBER definitions that redefine an earlier target name",
            before,
            after,
        );
    }
    with
}

fn render_defs(defs: &[CalcMemberDef]) -> String {
    defs.iter()
        .map(|d| {
            format!(
                "MEMBER {} AS {}",
                text::render_member_path(&d.name),
                text::render_value_expr(&d.value)
            )
        })
        .join("; ")
}

fn rewrite_calc_def(
    mut def: CalcMemberDef,
    options: &LinterOptions,
    report: &mut Report,
    deadline: Option<Instant>,
) -> CalcMemberDef {
    if timed_out(deadline) {
        return def;
    }
    def.value = Box::new(rewrite_value_expr(*def.value, true, options, report, deadline));
    def
}

fn rewrite_axis(
    mut axis: Axis,
    options: &LinterOptions,
    report: &mut Report,
    deadline: Option<Instant>,
) -> Axis {
    axis.set = rewrite_set_expr(axis.set, options, report, deadline);
    axis
}

/// `top` marks a position where any amount of grouping is semantically
/// inert (a calc member's whole RHS, an `IIF`/`CASE` branch, a function
/// argument) — the only positions where a parenthesised binary expression
/// is safe to unwrap unconditionally.
fn rewrite_value_expr(
    expr: ValueExpr,
    top: bool,
    options: &LinterOptions,
    report: &mut Report,
    deadline: Option<Instant>,
) -> ValueExpr {
    if timed_out(deadline) {
        return expr;
    }

    let expr = match expr {
        ValueExpr::Binary(b) => ValueExpr::Binary(BinaryOp {
            op: b.op,
            left: Box::new(rewrite_value_expr(*b.left, false, options, report, deadline)),
            right: Box::new(rewrite_value_expr(*b.right, false, options, report, deadline)),
            span: b.span,
        }),
        ValueExpr::Unary(u) => ValueExpr::Unary(UnaryOp {
            op: u.op,
            expr: Box::new(rewrite_value_expr(*u.expr, false, options, report, deadline)),
            span: u.span,
        }),
        ValueExpr::FunctionCall(call) => {
            ValueExpr::FunctionCall(rewrite_scalar_function_call(call, options, report, deadline))
        }
        ValueExpr::Iif(i) => {
            let cond = Box::new(rewrite_value_expr(*i.cond, true, options, report, deadline));
            let then_branch = Box::new(rewrite_value_expr(*i.then_branch, true, options, report, deadline));
            let else_branch = Box::new(rewrite_value_expr(*i.else_branch, true, options, report, deadline));
            if options.rule_enabled(RuleName::VacuousFunctionCalls)
                && text::render_value_expr(&then_branch) == text::render_value_expr(&else_branch)
            {
                let before = format!(
                    "IIF({}, {}, {})",
                    text::render_value_expr(&cond),
                    text::render_value_expr(&then_branch),
                    text::render_value_expr(&else_branch)
                );
                let after = text::render_value_expr(&then_branch);
                report.record(
                    RuleName::VacuousFunctionCalls,
                    "IIF with identical branches always evaluates to that branch",
                    before,
                    after,
                );
                return *then_branch;
            }
            ValueExpr::Iif(IifExpr {
                cond,
                then_branch,
                else_branch,
                span: i.span,
            })
        }
        ValueExpr::Case(c) => ValueExpr::Case(CaseExpr {
            arms: c
                .arms
                .into_iter()
                .map(|(cond, value)| {
                    (
                        rewrite_value_expr(cond, true, options, report, deadline),
                        rewrite_value_expr(value, true, options, report, deadline),
                    )
                })
                .collect(),
            else_branch: c
                .else_branch
                .map(|e| Box::new(rewrite_value_expr(*e, true, options, report, deadline))),
            span: c.span,
        }),
        ValueExpr::Paren(inner) => {
            let inner = rewrite_value_expr(*inner, top, options, report, deadline);
            return maybe_unwrap_value_paren(inner, top, options, report);
        }
        // Literal, Member: nothing to rewrite.
        other => other,
    };
    expr
}

fn maybe_unwrap_value_paren(
    inner: ValueExpr,
    top: bool,
    options: &LinterOptions,
    report: &mut Report,
) -> ValueExpr {
    if !options.rule_enabled(RuleName::ParenthesesCleaner) {
        return ValueExpr::Paren(Box::new(inner));
    }
    let safe = match &inner {
        ValueExpr::Literal(_) | ValueExpr::Member(_) | ValueExpr::FunctionCall(_) => true,
        ValueExpr::Paren(_) => true,
        ValueExpr::Binary(_) | ValueExpr::Unary(_) | ValueExpr::Iif(_) | ValueExpr::Case(_) => top,
    };
    if safe {
        let before = format!("({})", text::render_value_expr(&inner));
        let after = text::render_value_expr(&inner);
        report.record(
            RuleName::ParenthesesCleaner,
            "removed parentheses that do not change grouping here",
            before,
            after,
        );
        inner
    } else {
        ValueExpr::Paren(Box::new(inner))
    }
}

fn rewrite_scalar_function_call(
    mut call: FunctionCall,
    options: &LinterOptions,
    report: &mut Report,
    deadline: Option<Instant>,
) -> FunctionCall {
    call.args = call
        .args
        .into_iter()
        .map(|arg| rewrite_call_arg(arg, options, report, deadline))
        .collect();
    call
}

fn rewrite_call_arg(
    arg: CallArg,
    options: &LinterOptions,
    report: &mut Report,
    deadline: Option<Instant>,
) -> CallArg {
    match arg {
        CallArg::Value(v) => CallArg::Value(rewrite_value_expr(v, true, options, report, deadline)),
        CallArg::Set(s) => CallArg::Set(rewrite_set_expr(s, options, report, deadline)),
    }
}

fn rewrite_set_expr(
    expr: SetExpr,
    options: &LinterOptions,
    report: &mut Report,
    deadline: Option<Instant>,
) -> SetExpr {
    if timed_out(deadline) {
        return expr;
    }

    match expr {
        SetExpr::Braced(mut braced) => {
            braced.elements = braced
                .elements
                .into_iter()
                .map(|el| rewrite_set_element(el, options, report, deadline))
                .collect();
            if options.rule_enabled(RuleName::DuplicateSetMember) {
                let before = render_elements(&braced.elements);
                let mut seen = std::collections::HashSet::new();
                braced
                    .elements
                    .retain(|el| seen.insert(text::render_set_element(el)));
                let after = render_elements(&braced.elements);
                report.record(
                    RuleName::DuplicateSetMember,
                    "removed a duplicate member reference inside a set literal",
                    before,
                    after,
                );
            }
            SetExpr::Braced(braced)
        }
        SetExpr::FunctionCall(call) => rewrite_set_function_call(call, options, report, deadline),
        SetExpr::Member(m) => SetExpr::Member(m),
        SetExpr::CrossJoin(l, r) => SetExpr::CrossJoin(
            Box::new(rewrite_set_expr(*l, options, report, deadline)),
            Box::new(rewrite_set_expr(*r, options, report, deadline)),
        ),
        SetExpr::Paren(inner) => {
            let inner = rewrite_set_expr(*inner, options, report, deadline);
            if options.rule_enabled(RuleName::ParenthesesCleaner) {
                let before = format!("({})", text::render_set_expr(&inner));
                let after = text::render_set_expr(&inner);
                report.record(
                    RuleName::ParenthesesCleaner,
                    "removed parentheses around a set expression: set grouping is associative",
                    before,
                    after,
                );
                inner
            } else {
                SetExpr::Paren(Box::new(inner))
            }
        }
    }
}

fn render_elements(elements: &[SetElement]) -> String {
    elements
        .iter()
        .map(text::render_set_element)
        .join(", ")
}

fn rewrite_set_element(
    el: SetElement,
    options: &LinterOptions,
    report: &mut Report,
    deadline: Option<Instant>,
) -> SetElement {
    match el {
        SetElement::Member(m) => SetElement::Member(m),
        SetElement::Tuple(t) => SetElement::Tuple(t),
        SetElement::Nested(s) => SetElement::Nested(rewrite_set_expr(s, options, report, deadline)),
    }
}

fn is_empty_set(set: &SetExpr) -> bool {
    matches!(set, SetExpr::Braced(b) if b.elements.is_empty())
}

fn empty_set() -> SetExpr {
    SetExpr::Braced(BracedSet {
        elements: Vec::new(),
        span: None,
    })
}

fn is_true_literal(value: &ValueExpr) -> bool {
    matches!(
        value,
        ValueExpr::Literal(Literal::Boolean(true)) | ValueExpr::Literal(Literal::Integer(1))
    )
}

fn is_false_literal(value: &ValueExpr) -> bool {
    matches!(
        value,
        ValueExpr::Literal(Literal::Boolean(false)) | ValueExpr::Literal(Literal::Integer(0))
    )
}

/// Rewrites `CROSSJOIN`/`UNION`/`INTERSECT`/`EXCEPT`/`FILTER`/`DISTINCT`
/// calls once their arguments have already been rewritten (spec.md §4.E).
fn rewrite_set_function_call(
    mut call: FunctionCall,
    options: &LinterOptions,
    report: &mut Report,
    deadline: Option<Instant>,
) -> SetExpr {
    call.args = call
        .args
        .into_iter()
        .map(|arg| rewrite_call_arg(arg, options, report, deadline))
        .collect();

    let name = call.name.to_ascii_uppercase();

    if name == "CROSSJOIN" && options.rule_enabled(RuleName::CrossJoinSimplifier) {
        if let [CallArg::Set(a), CallArg::Set(b)] = &call.args[..] {
            let before = text::render_function_call(&call);
            let rewritten = SetExpr::CrossJoin(Box::new(a.clone()), Box::new(b.clone()));
            let after = text::render_set_expr(&rewritten);
            report.record(
                RuleName::CrossJoinSimplifier,
                "CROSSJOIN(A, B) is equivalent to the flattened crossjoin A * B",
                before,
                after,
            );
            return rewritten;
        }
    }

    if options.rule_enabled(RuleName::VacuousFunctionCalls) {
        match (name.as_str(), &call.args[..]) {
            ("UNION", [CallArg::Set(a), CallArg::Set(b)]) if is_empty_set(b) => {
                return vacuous_set(call, a.clone(), report, "UNION(s, {}) is always just s");
            }
            ("INTERSECT", [CallArg::Set(a), CallArg::Set(b)])
                if text::render_set_expr(a) == text::render_set_expr(b) =>
            {
                return vacuous_set(call, a.clone(), report, "INTERSECT(s, s) is always just s");
            }
            ("EXCEPT", [CallArg::Set(a), CallArg::Set(b)]) if is_empty_set(b) => {
                return vacuous_set(call, a.clone(), report, "EXCEPT(s, {}) is always just s");
            }
            ("EXCEPT", [CallArg::Set(a), CallArg::Set(b)])
                if text::render_set_expr(a) == text::render_set_expr(b) =>
            {
                return vacuous_set(
                    call,
                    empty_set(),
                    report,
                    "EXCEPT(s, s) always removes everything",
                );
            }
            ("FILTER", [CallArg::Set(a), CallArg::Value(cond)]) if is_true_literal(cond) => {
                return vacuous_set(call, a.clone(), report, "FILTER(s, TRUE) is always just s");
            }
            ("FILTER", [CallArg::Set(a), CallArg::Value(cond)]) if is_false_literal(cond) => {
                let _ = a;
                return vacuous_set(call, empty_set(), report, "FILTER(s, FALSE) is always empty");
            }
            ("DISTINCT", [CallArg::Set(a)]) if is_single_member_or_empty(a) => {
                return vacuous_set(
                    call,
                    a.clone(),
                    report,
                    "DISTINCT of a single member or an empty set is a no-op",
                );
            }
            _ => {}
        }
    }

    let _ = deadline;
    SetExpr::FunctionCall(call)
}

fn is_single_member_or_empty(set: &SetExpr) -> bool {
    match set {
        SetExpr::Member(_) => true,
        SetExpr::Braced(b) => b.elements.len() <= 1,
        _ => false,
    }
}

fn vacuous_set(call: FunctionCall, replacement: SetExpr, report: &mut Report, why: &str) -> SetExpr {
    let before = text::render_function_call(&call);
    let after = text::render_set_expr(&replacement);
    report.record(RuleName::VacuousFunctionCalls, why, before, after);
    replacement
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lint::{lint, OptimizationLevel};

    fn parse(mdx: &str) -> Query {
        mdx_parser::parse(mdx, &mdx_parser::ParserOptions::default()).unwrap()
    }

    #[test]
    fn vacuous_iif_report_describes_the_rewrite() {
        let q = parse(
            "WITH MEMBER [Measures].[X] AS IIF(1=1, [Measures].[A], [Measures].[A]) \
             SELECT {[Measures].[X]} ON 0 FROM [Cube]",
        );
        let options = LinterOptions {
            level: OptimizationLevel::Moderate,
            ..LinterOptions::default()
        };
        let (_, report) = lint(q, &options, None);
        let action = report
            .actions
            .iter()
            .find(|a| a.rule == RuleName::VacuousFunctionCalls)
            .expect("vacuous IIF rule should have fired");
        assert_eq!(action.before, "IIF(1 = 1, [Measures].[A], [Measures].[A])");
        assert_eq!(action.after, "[Measures].[A]");
    }

    #[test]
    fn aggressive_pass_fires_crossjoin_and_dedup_rules_together() {
        let q = parse(
            "SELECT CROSSJOIN({[Measures].[X], [Measures].[X]}, {[Product].[Category].[Bikes]}) \
             ON 0 FROM [Cube]",
        );
        let options = LinterOptions {
            level: OptimizationLevel::Aggressive,
            ..LinterOptions::default()
        };
        let (linted, report) = lint(q, &options, None);
        assert!(report.rules_fired.contains(&RuleName::CrossJoinSimplifier));
        assert!(report.rules_fired.contains(&RuleName::DuplicateSetMember));
        assert!(matches!(linted.select.axes[0].set, SetExpr::CrossJoin(_, _)));
    }
}

