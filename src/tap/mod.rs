//! Interception runtime: tap lifecycle and the control surface.
//!
//! [`RemapEngine`] is what the host application holds. It owns the shared
//! engine state and the platform event tap, and funnels every lifecycle
//! transition (start, stop, the scroll-reversal restart) through one place
//! so callers never touch a live tap handle themselves.

#[cfg(target_os = "macos")]
mod event_tap;
#[cfg(not(target_os = "macos"))]
mod stub;

#[cfg(target_os = "macos")]
pub use event_tap::{check_accessibility_permissions, request_accessibility_permissions};

#[cfg(target_os = "macos")]
use event_tap::EventTap;
#[cfg(not(target_os = "macos"))]
use stub::EventTap;

use std::sync::Arc;

use tracing::info;

use crate::engine::{EngineConfig, EngineShared};
use crate::mapping::MappingRule;
use crate::Result;

/// The remapping engine: shared state plus the OS interception point.
///
/// All setters are safe to call from the control thread at any time,
/// including before [`start`](Self::start); they take effect for the next
/// event processed after the update is visible. Only
/// [`set_scroll_reversal`](Self::set_scroll_reversal) can restart the tap,
/// because the registered event category mask is fixed at creation time.
pub struct RemapEngine {
    shared: Arc<EngineShared>,
    tap: EventTap,
}

impl RemapEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            shared: Arc::new(EngineShared::new(&config)),
            tap: EventTap::new(),
        }
    }

    /// Register the event tap and begin intercepting. Idempotent: a no-op
    /// while already running.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Permission`] when accessibility trust is missing,
    /// [`crate::Error::Tap`] when the worker thread cannot be spawned or
    /// tap registration fails on it. `start()` waits for the worker to
    /// report registration, so a returned `Ok` means the tap is live and a
    /// returned error leaves the engine stopped and retryable.
    pub fn start(&mut self) -> Result<()> {
        self.tap.start(Arc::clone(&self.shared))
    }

    /// Disable the tap and tear down the worker thread. Safe to call
    /// repeatedly, before `start()`, and from a thread other than the
    /// worker. No callback fires after this returns.
    pub fn stop(&mut self) {
        self.tap.stop();
    }

    /// Whether the interception point is currently live.
    pub fn is_running(&self) -> bool {
        self.tap.is_running()
    }

    /// Replace the active rule set. Rebuilds and atomically publishes the
    /// mapping index; the tap keeps running throughout.
    pub fn configure(&self, rules: Vec<MappingRule>) {
        self.shared.publish_rules(&rules);
    }

    /// Master switch. Off means every event passes through untouched.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.gate.set_enabled(enabled);
    }

    /// Toggle app-scoped mode (remap only while the scoped app is
    /// frontmost).
    pub fn set_app_scoped_mode(&self, scoped: bool) {
        self.shared.gate.set_app_scoped_only(scoped);
    }

    /// Replace the bundle identifier app-scoped mode is keyed on.
    pub fn set_scoped_app(&self, identifier: Option<String>) {
        self.shared.gate.set_scoped_app(identifier);
    }

    /// Toggle discrete scroll-wheel reversal.
    ///
    /// The tap's event category mask is fixed at registration time, so
    /// flipping this while running recreates the tap with the new mask; the
    /// restart stays inside the runtime rather than leaking to callers.
    ///
    /// # Errors
    ///
    /// Propagates a failed re-registration. The flag itself is already
    /// updated at that point; a later `start()` retry picks it up.
    pub fn set_scroll_reversal(&mut self, reversed: bool) -> Result<()> {
        if self.shared.gate.is_scroll_reversal_enabled() == reversed {
            return Ok(());
        }
        self.shared.gate.set_scroll_reversal(reversed);

        if self.tap.is_running() {
            info!(reversed, "scroll reversal changed the event mask; recreating tap");
            self.tap.stop();
            self.tap.start(Arc::clone(&self.shared))?;
        }
        Ok(())
    }

    /// Record an application-focus change reported by the host OS.
    pub fn notify_frontmost_app_changed(&self, identifier: Option<String>) {
        self.shared.gate.set_frontmost_app(identifier);
    }

    /// Handle to the shared state, for the binding layer and tests.
    pub fn shared(&self) -> Arc<EngineShared> {
        Arc::clone(&self.shared)
    }
}

impl Drop for RemapEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
