//! Source positions, CST node types and shared error/diagnostic types for
//! the MDX-to-DAX translation pipeline.
//!
//! This crate has no behaviour of its own — it is the common vocabulary
//! `mdx-parser` and `mdx-dax` build on, the way `prqlc-ast` underlies
//! `prqlc-parser`/`prqlc`.

pub mod cst;
pub mod error;
pub mod span;

pub use cst::*;
pub use error::{Error, Errors, MessageKind, Reason, WithErrorInfo};
pub use span::{Position, Span};
