//! Domain logic for the scriptd runtime.
//!
//! Everything here is storage-agnostic: the registry talks to durable
//! storage only through the [`scripting::store::ScriptStore`] trait, and the
//! HTTP layer lives in `scriptd-api`.

pub mod error;
pub mod script_types;
pub mod scripting;
pub mod types;
