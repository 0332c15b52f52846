//! Configuration for the resource loader and the `rgx` tool
//!
//! Provides types and parsing for `resgraph.toml`.

pub mod loader;
pub mod schema;

pub use loader::*;
pub use schema::*;
