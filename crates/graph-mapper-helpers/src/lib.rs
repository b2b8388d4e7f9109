#![deny(rust_2018_idioms)]
#![warn(clippy::all)]

//! # graph-mapper-helpers
//!
//! Ready-made transform steps for graph-mapper path entries.
//!
//! Each helper returns a [`Step`]: a read function, a write function, or
//! both. [`pipe`] chains steps into a path entry with reads in order and
//! writes reversed, so a chain reads one way and writes back the other.
//!
//! ```
//! use graph_mapper::{GraphMapper, MapperConfig};
//! use graph_mapper_helpers::{number, boolean, pipe};
//! use serde_json::json;
//!
//! let mapper = GraphMapper::new(
//!     MapperConfig::new().map("active", pipe("Status", [number(), boolean()])),
//! )?;
//! assert_eq!(mapper.read(&json!({"Status": "1"}))?, Some(json!({"active": true})));
//! # Ok::<(), graph_mapper::Error>(())
//! ```

mod convert;
mod text;
mod values;

pub use convert::{
    boolean, boolean_from_int, float, int, iso_date, number, opposite_boolean_from_int,
};
pub use text::{join, json_parse, strip_html};
pub use values::{defaults_to, not_null, transform};

use graph_mapper::pipeline::paired;
use graph_mapper::{PathConfig, Sources, Step, TransformCatalog};
use thiserror::Error;

/// Errors raised by helper steps
#[derive(Error, Debug)]
pub enum HelperError {
    #[error("Invalid date: {value}")]
    InvalidDate { value: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// A path entry reading `from` through `steps`.
///
/// Reads run the steps' read sides in order; writes run their write sides
/// in reverse. Sides a step does not provide are skipped.
pub fn pipe(from: impl Into<Sources>, steps: impl IntoIterator<Item = Step>) -> PathConfig {
    let steps: Vec<Step> = steps.into_iter().collect();
    let (read, write) = paired(&steps);
    PathConfig {
        from: Some(from.into()),
        read,
        write,
        ..PathConfig::default()
    }
}

/// Every parameterless helper, by name, for configuration documents.
///
/// `join` joins with a single space, `strip_html` falls back to `null` and
/// `json_parse_graceful` drops unparsable input instead of failing.
pub fn catalog() -> TransformCatalog {
    TransformCatalog::new()
        .with("not_null", not_null())
        .with("join", join(" "))
        .with("strip_html", strip_html(serde_json::Value::Null))
        .with("json_parse", json_parse(false))
        .with("json_parse_graceful", json_parse(true))
        .with("boolean", boolean())
        .with("boolean_from_int", boolean_from_int())
        .with("opposite_boolean_from_int", opposite_boolean_from_int())
        .with("number", number())
        .with("int", int())
        .with("float", float())
        .with("iso_date", iso_date())
}
