//! Mapping rule and modifier-set types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// CGEventFlags bits for the four tracked modifiers. Everything outside this
// mask (caps lock, fn, device-specific bits, ...) is ignored for matching
// and preserved verbatim in rewritten events.
const EVENT_FLAG_SHIFT: u64 = 0x0002_0000;
const EVENT_FLAG_CONTROL: u64 = 0x0004_0000;
const EVENT_FLAG_OPTION: u64 = 0x0008_0000;
const EVENT_FLAG_COMMAND: u64 = 0x0010_0000;

const TRACKED_FLAGS_MASK: u64 =
    EVENT_FLAG_SHIFT | EVENT_FLAG_CONTROL | EVENT_FLAG_OPTION | EVENT_FLAG_COMMAND;

/// The 4-bit modifier set tracked by the engine.
///
/// Matching is exact equality over these four bits: a rule requiring only
/// `shift` does not fire while `shift+control` is held. Derived `PartialEq`
/// is that matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub control: bool,
    #[serde(default)]
    pub command: bool,
    #[serde(default)]
    pub option: bool,
}

impl Modifiers {
    /// No modifiers held.
    pub const NONE: Self = Self {
        shift: false,
        control: false,
        command: false,
        option: false,
    };

    /// Shift only.
    pub const SHIFT: Self = Self {
        shift: true,
        control: false,
        command: false,
        option: false,
    };

    /// Control only.
    pub const CONTROL: Self = Self {
        shift: false,
        control: true,
        command: false,
        option: false,
    };

    /// Command only.
    pub const COMMAND: Self = Self {
        shift: false,
        control: false,
        command: true,
        option: false,
    };

    /// Option only.
    pub const OPTION: Self = Self {
        shift: false,
        control: false,
        command: false,
        option: true,
    };

    /// Extract the tracked modifier set from a raw `CGEventFlags` value.
    pub fn from_event_flags(flags: u64) -> Self {
        Self {
            shift: flags & EVENT_FLAG_SHIFT != 0,
            control: flags & EVENT_FLAG_CONTROL != 0,
            command: flags & EVENT_FLAG_COMMAND != 0,
            option: flags & EVENT_FLAG_OPTION != 0,
        }
    }

    /// Raw `CGEventFlags` bits for this set, zero outside the tracked mask.
    pub fn to_event_flags(self) -> u64 {
        let mut flags = 0u64;
        if self.shift {
            flags |= EVENT_FLAG_SHIFT;
        }
        if self.control {
            flags |= EVENT_FLAG_CONTROL;
        }
        if self.command {
            flags |= EVENT_FLAG_COMMAND;
        }
        if self.option {
            flags |= EVENT_FLAG_OPTION;
        }
        flags
    }

    /// Rewrite a raw flag word to carry exactly this modifier set.
    ///
    /// Clears the four tracked bits and sets them from `self`; every other
    /// bit of `flags` is preserved verbatim.
    pub fn apply_to(self, flags: u64) -> u64 {
        (flags & !TRACKED_FLAGS_MASK) | self.to_event_flags()
    }
}

/// One source→target key+modifier transformation.
///
/// Immutable once handed to the index: replacing the whole rule set is the
/// only supported mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    /// Stable identity, assigned at creation.
    pub id: Uuid,
    /// Whether the rule participates in matching.
    pub enabled: bool,
    /// Modifier set that must be held, exactly, for the rule to fire.
    pub source_modifiers: Modifiers,
    /// Physical key code the rule listens for.
    pub source_key: u16,
    /// Modifier set written into the rewritten event.
    pub target_modifiers: Modifiers,
    /// Key code written into the rewritten event.
    pub target_key: u16,
}

impl MappingRule {
    /// Create an enabled rule with a fresh identity.
    pub fn new(
        source_modifiers: Modifiers,
        source_key: u16,
        target_modifiers: Modifiers,
        target_key: u16,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            enabled: true,
            source_modifiers,
            source_key,
            target_modifiers,
            target_key,
        }
    }

    /// Same rule with `enabled` replaced.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
