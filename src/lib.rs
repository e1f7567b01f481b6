//! # rpmexpand
//! RPM spec file and macro expansion engine.
//!
//! Spec files and macro files lean on the RPM macro language:
//! `%define`/`%global` definitions, parametric macros with getopt-style
//! options, `%if`/`%else`/`%endif` conditionals, `%[...]` expressions
//! with EVR version comparison, and a handful of built-in operators.
//! This crate reimplements that engine as a pure text pipeline: no
//! shell-outs, no filesystem access, no RPM build machinery.
//!
//! The registry is passed explicitly and owned by one expansion at a
//! time; clone it to expand several documents concurrently.

mod builtins;
mod error;
mod evr;
mod expression;
mod getopt;
mod macrofile;
mod macros;
mod specfile;
mod tokenize;

pub use builtins::Piece;
pub use error::ExpandError;
pub use evr::{evr_cmp, rpmvercmp, Evr};
pub use expression::{eval_expr, eval_expr_with, Value};
pub use macrofile::parse_macrofile;
pub use macros::{is_macro_name, Macro, MacroDefinition, MacroRegistry};
pub use specfile::{expand_specfile, expand_specfile_string, split_specfile, Snippet, SpecHooks};
