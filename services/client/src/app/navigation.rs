//! services/client/src/app/navigation.rs
//!
//! Owns the currently displayed view and routes every navigation through the
//! guard.

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::app::guard::{self, GuardDecision, View};
use crate::app::session::SessionSnapshot;

pub struct Navigator {
    current: Mutex<View>,
    /// A navigation held back until session hydration completes.
    pending: Mutex<Option<View>>,
}

impl Navigator {
    pub fn new(initial: View) -> Self {
        Self {
            current: Mutex::new(initial),
            pending: Mutex::new(None),
        }
    }

    pub fn current(&self) -> View {
        *self.current.lock()
    }

    pub fn pending(&self) -> Option<View> {
        *self.pending.lock()
    }

    /// Requests `view`, following guard redirects. Returns the view now shown.
    pub fn navigate(&self, view: View, session: &SessionSnapshot) -> View {
        let mut target = view;
        // Redirect targets (login, chat) never redirect more than once.
        for _ in 0..3 {
            match guard::evaluate(target, session) {
                GuardDecision::Render => {
                    *self.pending.lock() = None;
                    *self.current.lock() = target;
                    debug!(view = target.path(), "Navigated");
                    return target;
                }
                GuardDecision::Redirect(to) => {
                    info!(from = target.path(), to = to.path(), "Navigation redirected");
                    target = to;
                }
                GuardDecision::Pending => {
                    debug!(view = target.path(), "Navigation waiting for session hydration");
                    *self.pending.lock() = Some(target);
                    return self.current();
                }
            }
        }
        self.force(View::Login);
        View::Login
    }

    /// Replays a navigation that was waiting on hydration.
    pub fn resume_pending(&self, session: &SessionSnapshot) -> View {
        let pending = self.pending.lock().take();
        match pending {
            Some(view) => self.navigate(view, session),
            None => self.current(),
        }
    }

    /// Switches views unconditionally, dropping any pending navigation.
    pub fn force(&self, view: View) {
        *self.pending.lock() = None;
        *self.current.lock() = view;
        debug!(view = view.path(), "Forced navigation");
    }
}
