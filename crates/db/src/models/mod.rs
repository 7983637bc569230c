//! Database row types.

pub mod script;
