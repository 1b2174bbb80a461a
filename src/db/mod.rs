//! Order store: row conversions and SQL repositories.
//!
//! - `model`: timestamp encoding shared by the queries.
//! - `repo`: SQL-only functions that map rows into domain entities.
//!
//! Callers import from `orderdesk::db`; the repository API is re-exported here.

pub mod model;
pub mod repo;

pub use repo::*;
