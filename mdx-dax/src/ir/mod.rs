//! The intermediate representation: a query's data model, the builder
//! that lowers a CST into it, and read-only validation/dependency
//! analysis over it (spec.md §3, §4.C, §4.D).

pub mod build;
pub mod query;
pub mod validate;

pub use build::build;
pub use query::*;
pub use validate::{Dependencies, Issue};
