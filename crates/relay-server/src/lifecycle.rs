//! Per-connection state machine.
//!
//! ```text
//! Connecting -> Authenticating -> Rejected
//!                              -> Bound -> Registered (agent) -> Active -> Closed
//!                                       -> Active (saas)      -> Closed
//! ```
//!
//! `Bound` and `Registered` may also go straight to `Closed` when the socket
//! drops mid-setup. `Rejected` and `Closed` are terminal.

use std::fmt;

use relay_core::Role;
use tracing::warn;

/// Where a connection is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Socket accepted, nothing read yet.
    Connecting,
    /// Parameters under evaluation.
    Authenticating,
    /// Refused and closed with 1008. Terminal.
    Rejected,
    /// Admitted with a role and tenant.
    Bound,
    /// Agent entered in the registry.
    Registered,
    /// Greeting sent, heartbeat running, frames processed.
    Active,
    /// Socket closed and cleanup done. Terminal.
    Closed,
}

impl LifecycleState {
    /// Lowercase label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Rejected => "rejected",
            Self::Bound => "bound",
            Self::Registered => "registered",
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }

    /// Whether no further transitions are allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Closed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition the state machine does not allow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid lifecycle transition {from} -> {to}")]
pub struct InvalidTransition {
    /// State before the attempted move.
    pub from: LifecycleState,
    /// Requested state.
    pub to: LifecycleState,
}

/// Tracks one connection's state.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
    role: Option<Role>,
}

impl Lifecycle {
    /// Start in `Connecting`.
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Connecting,
            role: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Record the role bound at admission. Only agents pass through
    /// `Registered`.
    pub fn bind(&mut self, role: Role) -> Result<(), InvalidTransition> {
        self.advance(LifecycleState::Bound)?;
        self.role = Some(role);
        Ok(())
    }

    /// Move to `next` if the transition is allowed.
    pub fn advance(&mut self, next: LifecycleState) -> Result<(), InvalidTransition> {
        use LifecycleState as S;

        let allowed = match (self.state, next) {
            (S::Connecting, S::Authenticating)
            | (S::Authenticating, S::Rejected | S::Bound)
            | (S::Bound | S::Registered, S::Closed)
            | (S::Registered, S::Active)
            | (S::Active, S::Closed) => true,
            (S::Bound, S::Registered) => self.role.is_none_or(|r| r == Role::Agent),
            (S::Bound, S::Active) => self.role.is_none_or(|r| r == Role::Saas),
            _ => false,
        };
        if !allowed {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Like [`advance`](Self::advance), but logs a refused transition
    /// instead of returning it.
    pub fn step(&mut self, next: LifecycleState) {
        if let Err(e) = self.advance(next) {
            warn!(error = %e, "unexpected lifecycle transition");
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
