//! services/client/src/app/guard.rs
//!
//! Decides, per navigation, whether the requested view may be shown given the
//! current session.

use crate::app::session::SessionSnapshot;

/// The views of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Login,
    Chat,
    Admin,
}

impl View {
    /// The view shown to an authenticated user by default.
    pub const DEFAULT_AUTHENTICATED: View = View::Chat;

    /// Maps a route path onto a view. The root path lands on the chat.
    pub fn from_path(path: &str) -> Option<View> {
        match path.trim().trim_end_matches('/') {
            "" | "/chat" | "chat" => Some(View::Chat),
            "/admin" | "admin" => Some(View::Admin),
            "/login" | "login" => Some(View::Login),
            _ => None,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            View::Login => "/login",
            View::Chat => "/chat",
            View::Admin => "/admin",
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self, View::Login)
    }

    pub fn requires_admin(&self) -> bool {
        matches!(self, View::Admin)
    }
}

/// Outcome of checking a navigation against the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    Redirect(View),
    /// The admin flag is not known yet because hydration is still running.
    Pending,
}

/// Evaluates the guard for `view`.
///
/// Token presence comes straight from persisted storage and never waits on
/// hydration; only the admin check depends on the user having been fetched.
pub fn evaluate(view: View, session: &SessionSnapshot) -> GuardDecision {
    if !view.requires_auth() {
        return GuardDecision::Render;
    }
    if !session.has_token {
        return GuardDecision::Redirect(View::Login);
    }
    if view.requires_admin() {
        if session.loading {
            return GuardDecision::Pending;
        }
        if !session.is_admin() {
            return GuardDecision::Redirect(View::DEFAULT_AUTHENTICATED);
        }
    }
    GuardDecision::Render
}
