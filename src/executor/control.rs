// src/executor/control.rs - Pause and cancel flags shared with a running plot
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable handle onto one executor's flags. Each flag is independent.
#[derive(Debug, Clone, Default)]
pub struct PlotControl {
    pause: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    /// Set when the pause came from the controller's feed hold.
    controller_hold: Arc<AtomicBool>,
}

impl PlotControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
        tracing::info!("Pause requested");
    }

    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
        tracing::info!("Resume requested");
    }

    /// Also clears a pending pause so a paused loop can exit.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.pause.store(false, Ordering::SeqCst);
        tracing::info!("Cancel requested");
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.pause.store(false, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);
        self.controller_hold.store(false, Ordering::SeqCst);
    }

    pub(crate) fn pause_for_controller_hold(&self) {
        self.controller_hold.store(true, Ordering::SeqCst);
        self.pause.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_controller_hold(&self) -> bool {
        self.controller_hold.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_clears_pause() {
        let control = PlotControl::new();
        control.pause();
        assert!(control.is_paused());
        control.cancel();
        assert!(control.is_cancelled());
        assert!(!control.is_paused());
    }

    #[test]
    fn test_clones_share_flags() {
        let control = PlotControl::new();
        let remote = control.clone();
        remote.pause();
        assert!(control.is_paused());
        remote.resume();
        assert!(!control.is_paused());
        assert!(!control.is_cancelled());
    }

    #[test]
    fn test_controller_hold_is_taken_once() {
        let control = PlotControl::new();
        control.pause_for_controller_hold();
        assert!(control.is_paused());
        assert!(control.take_controller_hold());
        assert!(!control.take_controller_hold());
    }
}
