#![deny(rust_2018_idioms)]
#![warn(clippy::all)]

//! # graph-mapper
//!
//! Declarative, bidirectional mapping between nested data trees.
//!
//! A [`GraphMapper`] is compiled once from a [`MapperConfig`] that pairs
//! dotted target paths with source paths. The same mapper then `read`s an
//! externally shaped source tree into an application shaped target tree and
//! `write`s a target tree back into the source shape.
//!
//! ```
//! use graph_mapper::{GraphMapper, MapperConfig, PathConfig, TransformFn};
//! use serde_json::{Value, json};
//!
//! let mapper = GraphMapper::new(
//!     MapperConfig::new().root("Person").map(
//!         "name",
//!         PathConfig::sources(["FirstName", "LastName"])
//!             .read(TransformFn::variadic(|args| {
//!                 let parts: Vec<&str> =
//!                     args.iter().flatten().filter_map(Value::as_str).collect();
//!                 Ok(Some(Value::from(parts.join(" "))))
//!             }))
//!             .write(TransformFn::new(|value| {
//!                 Ok(value.as_ref().and_then(Value::as_str).map(|name| {
//!                     Value::from(name.split(' ').collect::<Vec<_>>())
//!                 }))
//!             })),
//!     ),
//! )?;
//!
//! let source = json!({"Person": {"FirstName": "Bruce", "LastName": "Wayne"}});
//! let target = mapper.read(&source)?;
//! assert_eq!(target, Some(json!({"name": "Bruce Wayne"})));
//! assert_eq!(mapper.write(&json!({"name": "Bruce Wayne"}))?, Some(source));
//! # Ok::<(), graph_mapper::Error>(())
//! ```

pub mod config;
pub mod graph;
pub mod loader;
mod mappers;
pub mod path;
pub mod pipeline;
pub mod registry;
pub mod source_tree;

pub use config::{DeferredMapper, Finalize, MapperConfig, PathConfig, Sources};
pub use graph::{GraphMapper, ReadOptions};
pub use loader::{ConfigLoader, TransformCatalog};
pub use pipeline::{Pipeline, Step, TransformError, TransformFn, TransformResult};
pub use registry::MapperRegistry;
pub use source_tree::SourceTree;

use thiserror::Error;

/// Errors that can occur while compiling or running mappers
#[derive(Error, Debug)]
pub enum Error {
    #[error("Conflicting configuration for target path '{target_path}': {reason}")]
    ConfigurationConflict { target_path: String, reason: String },

    #[error("GraphMapper: The target path {{{path}}} does not exist.")]
    UnknownTargetPath { path: String },

    #[error("No mapper defined for '{name}'")]
    UnknownMapperName { name: String },

    /// A caller supplied transform failed; its error is passed through as is.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// A configured `finalize` function failed.
    #[error(transparent)]
    Finalize(TransformError),

    #[error("Cannot deserialize mapped target: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Invalid mapper configuration: {message}")]
    Config {
        message: String,
        line: Option<usize>,
        column: Option<usize>,
    },

    #[error("No transform registered under '{name}'")]
    UnknownTransform { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a configuration conflict error for a target path.
    pub fn conflict(target_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationConflict {
            target_path: target_path.into(),
            reason: reason.into(),
        }
    }

    /// Build an unknown-target-path error naming the offending path.
    pub fn unknown_target_path(path: impl Into<String>) -> Self {
        Self::UnknownTargetPath { path: path.into() }
    }

    /// Build an unknown-mapper error naming the requested mapper.
    pub fn unknown_mapper_name(name: impl Into<String>) -> Self {
        Self::UnknownMapperName { name: name.into() }
    }

    /// Build a configuration document error without location information.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            line: None,
            column: None,
        }
    }
}

/// Crate-local result type for mapping operations.
pub type Result<T> = std::result::Result<T, Error>;
