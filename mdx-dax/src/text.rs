//! Renders CST nodes back to MDX source text. Used by the linter's report
//! (before/after snippets for each applied action) and by the driver's
//! `optimise()` operation, which reserializes the linted tree (spec.md
//! §4.G, Open Question 1). This is a plain re-rendering, not a
//! pretty-printer: it favors a single canonical spelling over preserving
//! the input's original formatting.

use itertools::Itertools;
use mdx_ast::cst::*;

pub fn render_query(q: &Query) -> String {
    let mut out = String::new();
    if let Some(with) = &q.with {
        out.push_str("WITH ");
        for (i, def) in with.defs.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&render_calc_def(def));
        }
        out.push(' ');
    }
    out.push_str(&render_select(&q.select));
    out
}

fn render_calc_def(def: &CalcMemberDef) -> String {
    let mut s = format!(
        "MEMBER {} AS {}",
        render_member_path(&def.name),
        render_value_expr(&def.value)
    );
    for (prop, value) in &def.properties {
        s.push_str(&format!(", {} = {}", prop, render_value_expr(value)));
    }
    s
}

fn render_select(sel: &SelectStmt) -> String {
    let mut out = String::from("SELECT ");
    for (i, axis) in sel.axes.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&render_axis(axis));
    }
    out.push_str(" FROM ");
    out.push_str(&render_cube_ref(&sel.cube));
    if let Some(where_clause) = &sel.where_clause {
        out.push_str(" WHERE ");
        out.push_str(&render_slicer(where_clause));
    }
    out
}

fn render_axis(axis: &Axis) -> String {
    let mut out = String::new();
    if axis.non_empty {
        out.push_str("NON EMPTY ");
    }
    out.push_str(&render_set_expr(&axis.set));
    out.push_str(" ON ");
    out.push_str(&render_axis_id(axis.axis_id));
    out
}

fn render_axis_id(id: AxisId) -> String {
    match id {
        AxisId::Columns => "COLUMNS".to_string(),
        AxisId::Rows => "ROWS".to_string(),
        AxisId::Pages => "PAGES".to_string(),
        AxisId::Chapters => "CHAPTERS".to_string(),
        AxisId::Sections => "SECTIONS".to_string(),
        AxisId::Numbered(n) => n.to_string(),
        AxisId::Named(n) => format!("AXIS({n})"),
    }
}

fn render_cube_ref(cube: &CubeRef) -> String {
    cube.segments
        .iter()
        .map(|s| bracket(&s.text))
        .join(".")
}

fn render_slicer(slicer: &Slicer) -> String {
    if slicer.members.len() == 1 {
        render_member_expr(&slicer.members[0])
    } else {
        format!(
            "({})",
            slicer
                .members
                .iter()
                .map(render_member_expr)
                .join(", ")
        )
    }
}

pub fn render_set_expr(set: &SetExpr) -> String {
    match set {
        SetExpr::Braced(braced) => format!(
            "{{{}}}",
            braced
                .elements
                .iter()
                .map(render_set_element)
                .join(", ")
        ),
        SetExpr::FunctionCall(call) => render_function_call(call),
        SetExpr::Member(m) => render_member_expr(m),
        SetExpr::CrossJoin(l, r) => format!("{} * {}", render_set_expr(l), render_set_expr(r)),
        SetExpr::Paren(inner) => format!("({})", render_set_expr(inner)),
    }
}

pub(crate) fn render_set_element(el: &SetElement) -> String {
    match el {
        SetElement::Member(m) => render_member_expr(m),
        SetElement::Tuple(t) => format!(
            "({})",
            t.members
                .iter()
                .map(render_member_expr)
                .join(", ")
        ),
        SetElement::Nested(s) => render_set_expr(s),
    }
}

pub fn render_member_path(path: &MemberPath) -> String {
    path.segments
        .iter()
        .map(|s| bracket(&s.text))
        .join(".")
}

pub fn render_member_expr(member: &MemberExpr) -> String {
    let path = render_member_path(&member.path);
    match &member.function {
        None => path,
        Some(MemberFunction::Members) => format!("{path}.MEMBERS"),
        Some(MemberFunction::Children) => format!("{path}.CHILDREN"),
        Some(MemberFunction::Descendants) => format!("{path}.DESCENDANTS"),
        Some(MemberFunction::Key(key)) => format!("{path}.&[{key}]"),
        Some(MemberFunction::Call(call)) => format!("{path}.{}", render_function_call(call)),
    }
}

pub(crate) fn render_function_call(call: &FunctionCall) -> String {
    format!(
        "{}({})",
        call.name,
        call.args
            .iter()
            .map(render_call_arg)
            .join(", ")
    )
}

fn render_call_arg(arg: &CallArg) -> String {
    match arg {
        CallArg::Set(s) => render_set_expr(s),
        CallArg::Value(v) => render_value_expr(v),
    }
}

pub fn render_value_expr(expr: &ValueExpr) -> String {
    match expr {
        ValueExpr::Literal(lit) => render_literal(lit),
        ValueExpr::Member(m) => render_member_expr(m),
        ValueExpr::Binary(b) => format!(
            "{} {} {}",
            render_value_expr(&b.left),
            bin_op_text(b.op),
            render_value_expr(&b.right)
        ),
        ValueExpr::Unary(u) => match u.op {
            UnOpKind::Neg => format!("-{}", render_value_expr(&u.expr)),
            UnOpKind::Not => format!("NOT {}", render_value_expr(&u.expr)),
        },
        ValueExpr::FunctionCall(call) => render_function_call(call),
        ValueExpr::Iif(i) => format!(
            "IIF({}, {}, {})",
            render_value_expr(&i.cond),
            render_value_expr(&i.then_branch),
            render_value_expr(&i.else_branch)
        ),
        ValueExpr::Case(c) => {
            let mut s = String::from("CASE");
            for (cond, value) in &c.arms {
                s.push_str(&format!(
                    " WHEN {} THEN {}",
                    render_value_expr(cond),
                    render_value_expr(value)
                ));
            }
            if let Some(else_branch) = &c.else_branch {
                s.push_str(&format!(" ELSE {}", render_value_expr(else_branch)));
            }
            s.push_str(" END");
            s
        }
        ValueExpr::Paren(inner) => format!("({})", render_value_expr(inner)),
    }
}

fn bin_op_text(op: BinOpKind) -> &'static str {
    match op {
        BinOpKind::Add => "+",
        BinOpKind::Sub => "-",
        BinOpKind::Mul => "*",
        BinOpKind::Div => "/",
        BinOpKind::Eq => "=",
        BinOpKind::Ne => "<>",
        BinOpKind::Lt => "<",
        BinOpKind::Le => "<=",
        BinOpKind::Gt => ">",
        BinOpKind::Ge => ">=",
        BinOpKind::And => "AND",
        BinOpKind::Or => "OR",
    }
}

fn render_literal(lit: &Literal) -> String {
    match lit {
        Literal::Integer(i) => i.to_string(),
        Literal::Float(f) => f.to_string(),
        Literal::String(s) => format!("\"{}\"", s.replace('"', "\"\"")),
        Literal::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
    }
}

fn bracket(text: &str) -> String {
    format!("[{}]", text.replace(']', "]]"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_round_trippable_measure_query() {
        let q = mdx_parser::parse(
            "SELECT {[Measures].[Sales Amount]} ON 0 FROM [Adventure Works]",
            &mdx_parser::ParserOptions::default(),
        )
        .unwrap();
        let rendered = render_query(&q);
        let reparsed = mdx_parser::parse(&rendered, &mdx_parser::ParserOptions::default());
        assert!(reparsed.is_ok());
    }
}
