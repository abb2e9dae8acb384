//! Declarative field rules compiled into reusable validators.
//!
//! A [`Dto`] lists fields and the [`Rule`]s attached to each. [`compile`] turns it
//! into a [`CompiledValidator`] once, at route registration; the validator then
//! checks any JSON value against those rules with no per-call rule lookup. Regexes,
//! enum sets and nested `arrayItem` validators are all built up front and closed
//! over.
//!
//! ```rust
//! use muzu::validation::{compile, Dto, Rule};
//! use serde_json::json;
//!
//! let dto = Dto::new("CreateUser")
//!     .field("name", [Rule::IsRequired, Rule::IsString, Rule::MinLength(3)])
//!     .field("age", [Rule::IsOptional, Rule::IsInt, Rule::Min(0.0)]);
//! let validator = compile(&dto).unwrap();
//!
//! assert!(validator.validate(&json!({ "name": "ada" })).is_empty());
//!
//! let errors = validator.validate(&json!({ "name": "ab", "age": -1 }));
//! let constraints: Vec<_> = errors.iter().map(|e| e.constraint.as_str()).collect();
//! assert_eq!(constraints, ["minLength", "min"]);
//! ```

use serde::Serialize;
use serde_json::Value;

mod compiler;
mod formats;
mod rule;

pub use compiler::{CompileError, CompiledValidator, compile};
pub use rule::{Dto, DtoThunk, DtoType, FieldRules, Rule};

/// One violated constraint.
///
/// `field` is a path: plain for top-level fields (`name`), bracketed and dotted for
/// array items (`tags[1].name`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub constraint: String,
    pub value: Value,
    pub message: String,
}

impl ValidationError {
    pub fn new(
        field: impl Into<String>,
        constraint: impl Into<String>,
        value: Value,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
            value,
            message: message.into(),
        }
    }
}
