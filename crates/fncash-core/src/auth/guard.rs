//! Navigation gating on session state.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use super::{AuthState, SessionController};

/// Screens the shell can navigate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    /// Main surface after sign-in
    Dashboard,
    History,
    AddTransaction,
    Settings,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Dashboard => "/",
            Route::History => "/history",
            Route::AddTransaction => "/add",
            Route::Settings => "/settings",
        }
    }

    pub fn is_login_surface(&self) -> bool {
        matches!(self, Route::Login)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let normalized = match trimmed.trim_end_matches('/') {
            "" => "/",
            other => other,
        };
        match normalized {
            "/login" => Ok(Route::Login),
            "/" | "/index" => Ok(Route::Dashboard),
            "/history" => Ok(Route::History),
            "/add" => Ok(Route::AddTransaction),
            "/settings" => Ok(Route::Settings),
            _ => Err(format!("Unknown route: {}", trimmed)),
        }
    }
}

/// What the shell should do for the requested location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still loading; show a neutral waiting view
    Wait,
    Redirect(Route),
    Render(Route),
}

/// Decide navigation for `location` given a session state
pub fn decide(state: &AuthState, location: Route) -> GuardDecision {
    match state {
        AuthState::Loading => GuardDecision::Wait,
        AuthState::Unauthenticated if !location.is_login_surface() => {
            GuardDecision::Redirect(Route::Login)
        }
        AuthState::Authenticated { .. } if location.is_login_surface() => {
            GuardDecision::Redirect(Route::Dashboard)
        }
        _ => GuardDecision::Render(location),
    }
}

/// Evaluates [`decide`] against the live session. Shells call
/// [`evaluate`](Self::evaluate) whenever the location changes or the
/// controller's state receiver fires.
#[derive(Clone)]
pub struct RouteGuard {
    session: Arc<SessionController>,
}

impl RouteGuard {
    pub fn new(session: Arc<SessionController>) -> Self {
        Self { session }
    }

    pub async fn evaluate(&self, location: Route) -> GuardDecision {
        let state = self.session.snapshot().await;
        let decision = decide(&state, location);
        if let GuardDecision::Redirect(target) = decision {
            debug!(from = %location, to = %target, "Redirecting");
        }
        decision
    }
}
