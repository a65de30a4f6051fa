//! Cross-thread gate flags read by the tap callback.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Application-scope state guarded by the one hot-path lock.
///
/// The lock is held for a single compare or a single assignment, never for
/// computation. The callback must not wait on the control thread.
#[derive(Debug, Default)]
struct AppScope {
    /// Bundle identifier of the frontmost application, as last reported by
    /// the host's focus observer. `None` until the first report.
    frontmost: Option<String>,
    /// Bundle identifier remapping is restricted to in app-scoped mode.
    target: Option<String>,
}

/// Flags shared between the control thread and the tap worker thread.
///
/// The three booleans are independent toggles with no ordering relationship
/// to each other or to the index swap, so relaxed atomics suffice; a
/// configuration update becomes visible to the next event processed after
/// the store, which is the strongest guarantee the OS delivery model allows.
#[derive(Debug)]
pub struct GateState {
    /// Master kill switch: when false, every event passes through untouched.
    enabled: AtomicBool,
    /// Restrict remapping to the configured target application.
    app_scoped_only: AtomicBool,
    /// Invert discrete scroll-wheel polarity.
    scroll_reversal: AtomicBool,
    scope: Mutex<AppScope>,
}

impl Default for GateState {
    fn default() -> Self {
        Self::new(true, false, false, None)
    }
}

impl GateState {
    pub fn new(
        enabled: bool,
        app_scoped_only: bool,
        scroll_reversal: bool,
        scoped_app: Option<String>,
    ) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            app_scoped_only: AtomicBool::new(app_scoped_only),
            scroll_reversal: AtomicBool::new(scroll_reversal),
            scope: Mutex::new(AppScope {
                frontmost: None,
                target: scoped_app,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_app_scoped_only(&self) -> bool {
        self.app_scoped_only.load(Ordering::Relaxed)
    }

    pub fn set_app_scoped_only(&self, scoped: bool) {
        self.app_scoped_only.store(scoped, Ordering::Relaxed);
    }

    pub fn is_scroll_reversal_enabled(&self) -> bool {
        self.scroll_reversal.load(Ordering::Relaxed)
    }

    pub fn set_scroll_reversal(&self, reversed: bool) {
        self.scroll_reversal.store(reversed, Ordering::Relaxed);
    }

    /// Record the frontmost application reported by the host OS.
    ///
    /// Safe to call at any time from the control thread, including before
    /// the tap is started.
    pub fn set_frontmost_app(&self, identifier: Option<String>) {
        self.scope.lock().frontmost = identifier;
    }

    /// Replace the application identifier app-scoped mode is keyed on.
    pub fn set_scoped_app(&self, identifier: Option<String>) {
        self.scope.lock().target = identifier;
    }

    /// Hot-path check for app-scoped mode: is the target application
    /// frontmost right now? False when no target is configured or the
    /// frontmost app is unknown.
    pub fn frontmost_is_target(&self) -> bool {
        let scope = self.scope.lock();
        match (&scope.frontmost, &scope.target) {
            (Some(front), Some(target)) => front == target,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gate_is_enabled_and_unscoped() {
        let gate = GateState::default();
        assert!(gate.is_enabled());
        assert!(!gate.is_app_scoped_only());
        assert!(!gate.is_scroll_reversal_enabled());
        assert!(!gate.frontmost_is_target());
    }

    #[test]
    fn flag_flips_round_trip() {
        let gate = GateState::default();

        gate.set_enabled(false);
        assert!(!gate.is_enabled());

        gate.set_app_scoped_only(true);
        assert!(gate.is_app_scoped_only());

        gate.set_scroll_reversal(true);
        assert!(gate.is_scroll_reversal_enabled());
    }

    #[test]
    fn frontmost_matches_only_configured_target() {
        let gate = GateState::new(true, true, false, Some("com.example.editor".into()));

        // No frontmost report yet.
        assert!(!gate.frontmost_is_target());

        gate.set_frontmost_app(Some("com.example.browser".into()));
        assert!(!gate.frontmost_is_target());

        gate.set_frontmost_app(Some("com.example.editor".into()));
        assert!(gate.frontmost_is_target());

        gate.set_frontmost_app(None);
        assert!(!gate.frontmost_is_target());
    }

    #[test]
    fn no_target_never_matches() {
        let gate = GateState::default();
        gate.set_frontmost_app(Some("com.example.editor".into()));
        assert!(!gate.frontmost_is_target());
    }

    #[test]
    fn retargeting_takes_effect_immediately() {
        let gate = GateState::new(true, true, false, Some("com.example.a".into()));
        gate.set_frontmost_app(Some("com.example.b".into()));
        assert!(!gate.frontmost_is_target());

        gate.set_scoped_app(Some("com.example.b".into()));
        assert!(gate.frontmost_is_target());
    }
}
