//! Script registry and multi-language execution domain logic.
//!
//! Holds the validation pipeline, the per-name serialized registry with its
//! published snapshots, the execution dispatcher, the language engines and
//! the per-script log hub. Persistence is reached only through the
//! [`store::ScriptStore`] trait; nothing in here talks to a database.

pub mod dispatcher;
pub mod document;
pub mod engine;
pub mod javascript;
pub mod logs;
pub mod lua;
pub mod python;
pub mod registry;
pub mod shell;
pub mod store;
pub mod subprocess;
pub mod validation;
