//! Scroll polarity filter.
//!
//! Reverses discrete scroll-wheel polarity while leaving trackpad-style
//! continuous scrolling alone: continuous surfaces already follow the
//! "natural scrolling" system setting, discrete wheels are the ones users
//! want flipped independently.

use crate::engine::gate::GateState;

/// Outcome of the scroll filter for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDecision {
    /// Deliver the original event untouched.
    Pass,
    /// Deliver a copy with the primary axis's integer delta and its
    /// fixed-point delta both negated; all other fields unchanged.
    Invert,
}

/// Decide whether to invert one scroll event.
///
/// `continuous` is the event's is-continuous indicator: true for trackpad
/// and Magic-Mouse-style surfaces, false for stepped wheels.
pub fn decide_scroll(gate: &GateState, continuous: bool) -> ScrollDecision {
    if !gate.is_enabled() || !gate.is_scroll_reversal_enabled() || continuous {
        ScrollDecision::Pass
    } else {
        ScrollDecision::Invert
    }
}
