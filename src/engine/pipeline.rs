//! Per-event keyboard decision function.
//!
//! Runs synchronously inside the tap callback on the worker thread, as part
//! of the OS event-delivery call stack. It must stay non-blocking and
//! allocation-free on the pass-through path: the dominant case is a key with
//! no rule, rejected by a single hash probe.

use crate::engine::gate::GateState;
use crate::mapping::{MappingIndex, Modifiers};

/// Outcome of the keyboard pipeline for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecision {
    /// Deliver the original event untouched.
    Pass,
    /// Deliver a rewritten copy of the event.
    Rewrite(Rewrite),
}

/// Field rewrites to apply to a copy of the intercepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rewrite {
    /// Replacement key code; `None` when the rule maps a key onto itself
    /// and only the modifiers change.
    pub key_code: Option<u16>,
    /// Full replacement flag word: the four tracked modifier bits carry the
    /// rule's target set, every other bit is the observed value.
    pub flags: u64,
}

/// Decide what to do with one keyboard event.
///
/// Evaluation order, cheapest gate first after the master switch:
/// master enabled flag, index membership, app-scope gate, then the
/// candidate rules in stored order with first match winning.
pub fn decide_key(
    gate: &GateState,
    index: &MappingIndex,
    key_code: u16,
    flags: u64,
) -> KeyDecision {
    if !gate.is_enabled() {
        return KeyDecision::Pass;
    }

    if !index.is_monitored(key_code) {
        return KeyDecision::Pass;
    }

    if gate.is_app_scoped_only() && !gate.frontmost_is_target() {
        return KeyDecision::Pass;
    }

    let observed = Modifiers::from_event_flags(flags);
    for rule in index.candidates(key_code) {
        if observed == rule.source_modifiers {
            return KeyDecision::Rewrite(Rewrite {
                key_code: (rule.target_key != rule.source_key).then_some(rule.target_key),
                flags: rule.target_modifiers.apply_to(flags),
            });
        }
    }

    KeyDecision::Pass
}
