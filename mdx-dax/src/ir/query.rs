//! The IR data model (spec.md §3, §4.C): the sole contract between the
//! front end (parser + builder) and the back end (DAX generator). Pure
//! data, no behaviour beyond construction and the read-only `validate()`/
//! `dependencies()` queries in `super::validate`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The root IR node, built from a CST `Query` by `super::build::build`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub cube: CubeRef,
    pub measures: Vec<Measure>,
    pub dimensions: Vec<Dimension>,
    pub filters: Vec<Filter>,
    pub calculations: Vec<Calculation>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<Limit>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CubeRef {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub aggregation: Aggregation,
    pub alias: Option<String>,
    pub format: Option<String>,
    /// Present iff `aggregation == Aggregation::Custom`; the expression is
    /// also recorded (by name) as a `Calculation` of kind `Measure`.
    pub expression: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::AsRefStr)]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    DistinctCount,
    Min,
    Max,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub hierarchy: HierarchyRef,
    pub level: LevelRef,
    pub members: MemberSelection,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyRef {
    pub table: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRef {
    pub name: String,
    pub ordinal: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, enum_as_inner::EnumAsInner)]
pub enum MemberSelection {
    All,
    /// Invariant: never empty — checked by `Query::validate()`, not
    /// enforced at construction (spec.md §3).
    Specific(Vec<String>),
    Children(String),
    Descendants(String),
    Range(String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, enum_as_inner::EnumAsInner)]
pub enum Filter {
    Dimension(DimensionFilter),
    Measure(MeasureFilter),
    NonEmpty(NonEmptyFilter),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub dimension: HierarchyRef,
    pub operator: DimensionOperator,
    /// Invariant: never empty.
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimensionOperator {
    Eq,
    Ne,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureFilter {
    pub measure: String,
    pub operator: ComparisonOperator,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonEmptyFilter {
    pub measure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub name: String,
    pub kind: CalculationKind,
    pub expression: Expr,
    pub solve_order: Option<i32>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalculationKind {
    Measure,
    Member,
}

/// A lowered scalar expression (spec.md §3): the recursive sum type shared
/// by calculated-member bodies and (eventually) measure filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, enum_as_inner::EnumAsInner)]
pub enum Expr {
    Constant(Constant),
    MeasureRef(String),
    MemberRef(MemberRef),
    Binary(Box<Expr>, ExprBinOp, Box<Expr>),
    Unary(ExprUnOp, Box<Expr>),
    FunctionCall(FunctionKind, String, Vec<Expr>),
    Iif(Box<Expr>, Box<Expr>, Box<Expr>),
    Case(Vec<(Expr, Expr)>, Option<Box<Expr>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Number(f64),
    String(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    pub table: String,
    pub hierarchy: String,
    pub member: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExprBinOp {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExprUnOp {
    Neg,
    Not,
}

/// Whether an unrecognised MDX function name was retained verbatim
/// (`Unknown`) or mapped to a known DAX idiom during generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    Known,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    pub expr_name: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub count: u64,
    pub offset: u64,
}

impl Query {
    /// Cheap implementation-defined heuristic (dimensions + filters +
    /// calculations), never consulted by `validate()` or the generator;
    /// see SPEC_FULL.md's Open Question 3.
    pub fn complexity_score(&self) -> u32 {
        (self.dimensions.len() + self.filters.len() + self.calculations.len()) as u32
    }
}

/// Driver-populated bookkeeping that is never read by `validate()` or the
/// generator; see SPEC_FULL.md's Open Question 3.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub timings: Timings,
    pub warnings: Vec<String>,
    pub source_hash: Option<String>,
    pub complexity_score: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    #[serde(with = "duration_opt")]
    pub parse: Option<Duration>,
    #[serde(with = "duration_opt")]
    pub lint: Option<Duration>,
    #[serde(with = "duration_opt")]
    pub build: Option<Duration>,
    #[serde(with = "duration_opt")]
    pub generate: Option<Duration>,
}

/// `serde` has no built-in `Option<Duration>` support; serialize as
/// milliseconds, mirroring how the teacher's crates store durations as
/// plain numeric fields rather than pulling in a duration-serde crate.
mod duration_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        v.map(|d| d.as_secs_f64()).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}
