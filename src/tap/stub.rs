//! Stand-in tap for non-macOS targets.
//!
//! Quartz event taps exist only on macOS. This backend keeps the crate
//! building and the pure engine testable everywhere else: the control
//! surface works normally and `start()` fails cleanly.

use std::sync::Arc;

use tracing::warn;

use crate::engine::EngineShared;
use crate::{Error, Result};

pub struct EventTap;

impl EventTap {
    pub fn new() -> Self {
        Self
    }

    pub fn start(&mut self, _shared: Arc<EngineShared>) -> Result<()> {
        warn!("event taps are only available on macOS");
        Err(Error::Tap(
            "event interception is only supported on macOS".into(),
        ))
    }

    pub fn stop(&mut self) {}

    pub fn is_running(&self) -> bool {
        false
    }
}
