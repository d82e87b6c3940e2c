//! IR model, linter, DAX code generator and pipeline driver translating
//! MDX queries (as parsed by `mdx-parser`) into DAX query text (spec.md
//! §4.C–§4.G).

pub mod config;
pub mod dax;
pub mod driver;
pub mod error_message;
pub mod ir;
pub mod lint;
pub mod text;

pub use config::{Config, ConfigValue};
pub use dax::{DaxOptions, GenOutput};
pub use driver::{explain, mdx_to_dax, optimise, parse_only, CompileResult, Explainer, OptimiseResult};
pub use error_message::{ErrorMessage, ErrorMessages, SourceLocation};
pub use ir::Query;
pub use lint::{lint, Action, LinterOptions, OptimizationLevel, Report, RuleName};
