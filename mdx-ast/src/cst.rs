//! The concrete syntax tree produced by `mdx_parser::parse` (spec.md §3,
//! §4.A). Nodes are tagged sum types with typed fields, the way the
//! teacher's `ExprKind`/`StmtKind` are, rather than a generic
//! `{kind, children: Vec<Node>}` tree: each variant's fields *are* its
//! ordered children.

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

use crate::Span;

/// `query := with_clause? select_stmt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub with: Option<WithClause>,
    pub select: SelectStmt,
    pub span: Option<Span>,
}

/// `with_clause := WITH calc_def+`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithClause {
    pub defs: Vec<CalcMemberDef>,
    pub span: Option<Span>,
}

/// `calc_def := MEMBER member_path AS value_expr (',' prop '=' value_expr)*`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcMemberDef {
    pub name: MemberPath,
    pub value: Box<ValueExpr>,
    /// e.g. `SOLVE_ORDER = 1`, `FORMAT_STRING = "#,##0"`.
    pub properties: Vec<(String, ValueExpr)>,
    /// Comment text immediately preceding this definition, if any, kept for
    /// the linter's hint-harvesting pass (spec.md §4.A).
    pub leading_comment: Option<String>,
    pub span: Option<Span>,
}

/// `select_stmt := SELECT axis (',' axis)* FROM cube (WHERE slicer)?`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStmt {
    pub axes: Vec<Axis>,
    pub cube: CubeRef,
    pub where_clause: Option<Slicer>,
    pub span: Option<Span>,
}

/// `axis := (NON EMPTY)? set_expr ON axis_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub non_empty: bool,
    pub set: SetExpr,
    pub axis_id: AxisId,
    pub span: Option<Span>,
}

/// `axis_id := numeral | COLUMNS | ROWS | PAGES | CHAPTERS | SECTIONS | AXIS(numeral)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisId {
    Numbered(u32),
    Named(u32),
    Columns,
    Rows,
    Pages,
    Chapters,
    Sections,
}

impl AxisId {
    /// The conventional axis index used for ordering output, per the
    /// `COLUMNS == 0`, `ROWS == 1`, ... convention.
    pub fn ordinal(&self) -> u32 {
        match self {
            AxisId::Numbered(n) | AxisId::Named(n) => *n,
            AxisId::Columns => 0,
            AxisId::Rows => 1,
            AxisId::Pages => 2,
            AxisId::Chapters => 3,
            AxisId::Sections => 4,
        }
    }
}

/// `[db].[schema].[cube]`, possibly with fewer segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeRef {
    pub segments: Vec<BracketedIdent>,
    pub span: Option<Span>,
}

impl CubeRef {
    pub fn name(&self) -> &str {
        self.segments
            .last()
            .map(|s| s.text.as_str())
            .unwrap_or_default()
    }
}

/// `WHERE ( tuple_expr | member_expr )`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slicer {
    pub members: Vec<MemberExpr>,
    pub span: Option<Span>,
}

/// `set_expr := '{' set_body '}' | function_call | member_expr | set_expr '*' set_expr`
#[derive(Debug, Clone, PartialEq, EnumAsInner, Serialize, Deserialize)]
pub enum SetExpr {
    Braced(BracedSet),
    FunctionCall(FunctionCall),
    Member(MemberExpr),
    /// Infix crossjoin shorthand, `set_expr * set_expr`.
    CrossJoin(Box<SetExpr>, Box<SetExpr>),
    Paren(Box<SetExpr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracedSet {
    pub elements: Vec<SetElement>,
    pub span: Option<Span>,
}

/// `set_body := (tuple_expr | member_expr) (',' (tuple_expr | member_expr))*`
#[derive(Debug, Clone, PartialEq, EnumAsInner, Serialize, Deserialize)]
pub enum SetElement {
    Member(MemberExpr),
    Tuple(TupleExpr),
    Nested(SetExpr),
}

/// `tuple_expr := '(' member_expr (',' member_expr)* ')'`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleExpr {
    pub members: Vec<MemberExpr>,
    pub span: Option<Span>,
}

/// A (possibly qualified) member path: `[Measures].[Sales Amount]`,
/// `[Product].[Category].[Bikes]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPath {
    pub segments: Vec<BracketedIdent>,
    pub span: Option<Span>,
}

/// `member_expr := member_path member_fn?`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberExpr {
    pub path: MemberPath,
    pub function: Option<MemberFunction>,
    pub span: Option<Span>,
}

/// `member_fn := '.' MEMBERS | '.' CHILDREN | '&' '[' ident ']' | function_call`
#[derive(Debug, Clone, PartialEq, EnumAsInner, Serialize, Deserialize)]
pub enum MemberFunction {
    Members,
    Children,
    Descendants,
    /// `&[key]`, an exact-match key reference.
    Key(String),
    Call(FunctionCall),
}

/// `[...]`, with the inner `]]` escape already collapsed to a single `]`.
/// Content is case-sensitive and preserved verbatim (spec.md §4.D edge
/// cases).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketedIdent {
    pub text: String,
    pub span: Option<Span>,
}

/// `function_call := ident '(' ( call_arg (',' call_arg)* )? ')'`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<CallArg>,
    pub span: Option<Span>,
}

/// A function argument may be a set (`CROSSJOIN(a, b)`) or a scalar value
/// (`IIF(cond, a, b)`); the grammar does not disambiguate these statically,
/// so both are retained and the IR builder classifies them per callee.
#[derive(Debug, Clone, PartialEq, EnumAsInner, Serialize, Deserialize)]
pub enum CallArg {
    Set(SetExpr),
    Value(ValueExpr),
}

/// `value_expr`, i.e. scalar MDX expressions used inside `WITH MEMBER`
/// bodies, `IIF`/`CASE` branches, and function-call scalar arguments.
#[derive(Debug, Clone, PartialEq, EnumAsInner, strum::AsRefStr, Serialize, Deserialize)]
pub enum ValueExpr {
    Literal(Literal),
    Member(MemberExpr),
    Binary(BinaryOp),
    Unary(UnaryOp),
    FunctionCall(FunctionCall),
    Iif(IifExpr),
    Case(CaseExpr),
    Paren(Box<ValueExpr>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryOp {
    pub op: BinOpKind,
    pub left: Box<ValueExpr>,
    pub right: Box<ValueExpr>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryOp {
    pub op: UnOpKind,
    pub expr: Box<ValueExpr>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOpKind {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IifExpr {
    pub cond: Box<ValueExpr>,
    pub then_branch: Box<ValueExpr>,
    pub else_branch: Box<ValueExpr>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseExpr {
    pub arms: Vec<(ValueExpr, ValueExpr)>,
    pub else_branch: Option<Box<ValueExpr>>,
    pub span: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, EnumAsInner, strum::AsRefStr, Serialize, Deserialize)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{i}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::String(s) => write!(f, "{s:?}"),
            Literal::Boolean(b) => write!(f, "{b}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn axis_ordinal_matches_convention() {
        assert_eq!(AxisId::Columns.ordinal(), 0);
        assert_eq!(AxisId::Rows.ordinal(), 1);
        assert_eq!(AxisId::Numbered(2).ordinal(), 2);
    }

    #[test]
    fn cube_ref_name_is_last_segment() {
        let cube = CubeRef {
            segments: vec![
                BracketedIdent {
                    text: "AdventureWorksDW".into(),
                    span: None,
                },
                BracketedIdent {
                    text: "Adventure Works".into(),
                    span: None,
                },
            ],
            span: None,
        };
        assert_eq!(cube.name(), "Adventure Works");
    }
}
