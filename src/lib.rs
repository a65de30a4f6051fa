//! # retap
//!
//! A system-wide input remapping engine for macOS built on the Quartz Event
//! Tap API. The engine intercepts keyboard and scroll-wheel events before
//! they reach any application, rewrites them according to user-defined
//! mapping rules, and re-injects the result.
//!
//! ## Overview
//!
//! A dedicated worker thread owns a session-level event tap and runs a
//! blocking `CFRunLoop`. For every intercepted event the OS synchronously
//! invokes the transform pipeline on that thread; the pipeline consults the
//! shared gate flags and the mapping index and answers in microseconds with
//! either the original event or a rewritten copy. The callback must never
//! block: a stalled tap callback freezes keyboard and mouse input for the
//! whole session.
//!
//! ## Quick Start
//!
//! ```no_run
//! use retap::{EngineConfig, MappingRule, Modifiers, RemapEngine};
//!
//! // Remap Cmd+J (key code 38) to Cmd+Left Arrow (key code 123).
//! let rule = MappingRule::new(Modifiers::COMMAND, 38, Modifiers::COMMAND, 123);
//!
//! let mut engine = RemapEngine::new(EngineConfig {
//!     rules: vec![rule],
//!     ..EngineConfig::default()
//! });
//!
//! engine.start()?;
//! // The host app keeps the engine alive and feeds it focus changes:
//! engine.notify_frontmost_app_changed(Some("com.apple.Terminal".into()));
//! engine.stop();
//! # Ok::<(), retap::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`mapping`]: mapping rules, the 4-bit modifier set, and the derived
//!   key-code index consulted on the hot path
//! - [`engine`]: cross-thread shared state and the pure per-event decision
//!   functions (keyboard pipeline and scroll polarity filter)
//! - [`tap`]: the interception runtime: tap registration, the worker
//!   thread and its run loop, and the start/stop/reconfigure lifecycle
//!
//! The decision functions are pure and platform-neutral; only [`tap`]
//! touches Core Graphics, so the engine builds and unit-tests on any OS.
//!
//! ## Permissions
//!
//! Creating an active event tap requires Accessibility permissions:
//! System Settings → Privacy & Security → Accessibility.

pub mod engine;
pub mod mapping;
pub mod tap;

// Re-export the surface the host application works with.
pub use engine::pipeline::{decide_key, KeyDecision, Rewrite};
pub use engine::scroll::{decide_scroll, ScrollDecision};
pub use engine::{EngineConfig, EngineShared, GateState};
pub use mapping::{MappingIndex, MappingRule, Modifiers};
pub use tap::RemapEngine;

/// Result type alias for the remapping engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the remapping engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The OS declined to create or operate the event tap, or the worker
    /// thread could not be spawned. Retryable via `start()`.
    #[error("event tap error: {0}")]
    Tap(String),

    /// Accessibility trust has not been granted to this process.
    #[error("accessibility permission not granted: {0}")]
    Permission(String),
}
