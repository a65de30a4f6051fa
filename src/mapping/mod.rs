//! Mapping rules and the derived lookup index.
//!
//! Rules are data-only objects produced by the host's configuration layer.
//! The engine never interprets key codes (opaque 16-bit identifiers
//! compared for equality) and tracks exactly four modifier bits: shift,
//! control, command and option.

pub mod index;
pub mod rule;

pub use index::MappingIndex;
pub use rule::{MappingRule, Modifiers};
