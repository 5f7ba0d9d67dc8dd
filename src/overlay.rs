use crate::platform::{OverlaySurface, SystemSettings};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    Hidden,
    Visible,
}

/// Owns the single full-screen blocking surface.
///
/// `show` and `hide` are idempotent and do their check-and-act under one
/// lock, so any number of callers can drive them concurrently without
/// ever attaching two surfaces or detaching twice.
pub struct OverlayController {
    surface: Arc<dyn OverlaySurface>,
    settings: Arc<dyn SystemSettings>,
    host_identifier: String,
    state: Mutex<OverlayState>,
}

impl OverlayController {
    pub fn new(
        surface: Arc<dyn OverlaySurface>,
        settings: Arc<dyn SystemSettings>,
        host_identifier: &str,
    ) -> Self {
        Self {
            surface,
            settings,
            host_identifier: host_identifier.to_string(),
            state: Mutex::new(OverlayState::Hidden),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, OverlayState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("OverlayController: state mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn state(&self) -> OverlayState {
        *self.lock_state()
    }

    pub fn is_visible(&self) -> bool {
        self.state() == OverlayState::Visible
    }

    /// Attach the surface unless it is already up.
    ///
    /// An attach failure leaves the overlay hidden.
    pub fn show(&self) {
        let mut state = self.lock_state();
        if *state == OverlayState::Visible {
            return;
        }

        match self.surface.attach() {
            Ok(()) => {
                *state = OverlayState::Visible;
                info!("Overlay shown");
            }
            Err(e) => warn!("Failed to attach overlay, staying hidden: {e}"),
        }
    }

    /// Detach the surface unless it is already gone.
    ///
    /// Detach errors are swallowed; the state is Hidden afterwards regardless.
    pub fn hide(&self) {
        let mut state = self.lock_state();
        if *state == OverlayState::Hidden {
            return;
        }

        if let Err(e) = self.surface.detach() {
            debug!("Overlay detach failed, treating as already removed: {e}");
        }
        *state = OverlayState::Hidden;
        info!("Overlay hidden");
    }

    /// The overlay's "return to app" control. Hides before navigating so
    /// the blocked content never flashes.
    pub fn return_to_app(&self) {
        self.hide();
        if let Err(e) = self.settings.launch_app(&self.host_identifier) {
            warn!("Failed to bring {} to the front: {e}", self.host_identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_host;
    use std::thread;

    fn controller() -> (Arc<OverlayController>, crate::test_utils::Fakes) {
        let (host, fakes) = test_host();
        let overlay = OverlayController::new(host.surface, host.settings, "focus-shield");
        (Arc::new(overlay), fakes)
    }

    #[tokio::test]
    async fn test_show_is_idempotent() {
        let (overlay, fakes) = controller();
        overlay.show();
        overlay.show();
        overlay.show();

        assert!(overlay.is_visible());
        assert_eq!(fakes.surface.attach_count(), 1);
    }

    #[tokio::test]
    async fn test_hide_is_idempotent() {
        let (overlay, fakes) = controller();
        overlay.hide();
        assert_eq!(fakes.surface.detach_count(), 0);

        overlay.show();
        overlay.hide();
        overlay.hide();

        assert_eq!(overlay.state(), OverlayState::Hidden);
        assert_eq!(fakes.surface.detach_count(), 1);
    }

    #[tokio::test]
    async fn test_detach_failure_still_hides() {
        let (overlay, fakes) = controller();
        overlay.show();
        fakes.surface.set_fail_detach(true);

        overlay.hide();
        assert_eq!(overlay.state(), OverlayState::Hidden);

        fakes.surface.set_fail_detach(false);
        overlay.show();
        assert!(overlay.is_visible());
        assert_eq!(fakes.surface.attach_count(), 2);
    }

    #[tokio::test]
    async fn test_attach_failure_stays_hidden() {
        let (overlay, fakes) = controller();
        fakes.surface.set_fail_attach(true);

        overlay.show();
        assert_eq!(overlay.state(), OverlayState::Hidden);

        overlay.hide();
        assert_eq!(fakes.surface.detach_count(), 0);
    }

    #[tokio::test]
    async fn test_return_to_app_hides_before_launch() {
        let (overlay, fakes) = controller();
        overlay.show();
        overlay.return_to_app();

        assert!(!overlay.is_visible());
        let journal = fakes.journal.lock().unwrap().clone();
        assert_eq!(journal, vec!["attach", "detach", "launch focus-shield"]);
    }

    #[tokio::test]
    async fn test_concurrent_show_attaches_once() {
        let (overlay, fakes) = controller();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let overlay = Arc::clone(&overlay);
                thread::spawn(move || {
                    for _ in 0..50 {
                        overlay.show();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fakes.surface.attach_count(), 1);
        assert!(fakes.surface.is_attached());
    }
}
