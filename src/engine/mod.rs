//! Shared engine state and the per-event decision functions.
//!
//! Everything in this module is platform-neutral: the decision functions
//! operate on key codes and raw flag words, and the shared state is plain
//! atomics and bounded locks. The macOS binding in [`crate::tap`] translates
//! between `CGEvent`s and these types.

pub mod gate;
pub mod pipeline;
pub mod scroll;

pub use gate::GateState;

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mapping::{MappingIndex, MappingRule};

/// Construction-time snapshot of the engine's configuration.
///
/// Produced by the host's settings layer; loading and persisting it is the
/// host's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Master switch; defaults to on.
    pub enabled: bool,
    /// Restrict remapping to `scoped_app` while it is frontmost.
    #[serde(default)]
    pub app_scoped_only: bool,
    /// Bundle identifier app-scoped mode is keyed on.
    #[serde(default)]
    pub scoped_app: Option<String>,
    /// Invert discrete scroll-wheel polarity.
    #[serde(default)]
    pub scroll_reversal: bool,
    /// Active mapping rules, in first-match-wins order.
    #[serde(default)]
    pub rules: Vec<MappingRule>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app_scoped_only: false,
            scoped_app: None,
            scroll_reversal: false,
            rules: Vec::new(),
        }
    }
}

/// The state shared between control-thread callers and the tap callback.
///
/// The gate flags are individually atomic; the mapping index is published
/// whole behind an `RwLock<Arc<_>>` so the callback observes either the old
/// or the new index in full, never a mix. Both critical sections are a
/// single pointer operation.
#[derive(Debug)]
pub struct EngineShared {
    pub gate: GateState,
    index: RwLock<Arc<MappingIndex>>,
}

impl EngineShared {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            gate: GateState::new(
                config.enabled,
                config.app_scoped_only,
                config.scroll_reversal,
                config.scoped_app.clone(),
            ),
            index: RwLock::new(Arc::new(MappingIndex::build(&config.rules))),
        }
    }

    /// Rebuild the mapping index from a rule-set snapshot and publish it.
    ///
    /// The rebuild happens outside the lock; only the `Arc` swap is guarded.
    pub fn publish_rules(&self, rules: &[MappingRule]) {
        let index = Arc::new(MappingIndex::build(rules));
        debug!(
            monitored_keys = index.monitored_key_count(),
            "publishing rebuilt mapping index"
        );
        *self.index.write() = index;
    }

    /// Snapshot handle to the current index (hot path: one read-lock'd
    /// `Arc` clone).
    pub fn index(&self) -> Arc<MappingIndex> {
        Arc::clone(&self.index.read())
    }
}
