//! Protocol tool surface.
//!
//! Every core capability is exposed as a named operation taking a flat
//! string-keyed argument map and returning a text result or an explicit
//! error payload. Transport framing is a caller concern; this module has
//! no opinion on it.

pub mod tools;

pub use tools::{ToolArgs, ToolContext, ToolRegistry};
