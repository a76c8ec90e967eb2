/// Cycle state definitions for one site's monitoring run
///
/// A cycle moves strictly forward through these states. Every non-terminal
/// state after `Init` may also abort straight to `Done(Failed)`.
use crate::state::RunStatus;
use crate::WatchError;
use std::fmt;

/// Represents the current state of a monitoring cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleState {
    /// Site has not been validated yet
    Init,

    /// Site is valid and effective fetch settings are resolved
    ConfigLoaded,

    /// Sitemap tree is being walked
    Fetching,

    /// Discovered entries are being compared with stored URLs
    Diffing,

    /// Diff result is being written in one transaction
    Committing,

    /// History is recorded and notifications may be sent
    NotifyPending,

    /// Terminal state
    Done(RunStatus),
}

impl CycleState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: CycleState) -> bool {
        use CycleState::*;

        match (self, next) {
            (Init, ConfigLoaded)
            | (ConfigLoaded, Fetching)
            | (Fetching, Diffing)
            | (Diffing, Committing)
            | (Committing, NotifyPending)
            | (NotifyPending, Done(RunStatus::Success))
            | (NotifyPending, Done(RunStatus::PartialSuccess)) => true,
            (Init, _) => false,
            (Done(_), _) => false,
            (_, Done(RunStatus::Failed)) => true,
            _ => false,
        }
    }

    /// Returns the name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ConfigLoaded => "config_loaded",
            Self::Fetching => "fetching",
            Self::Diffing => "diffing",
            Self::Committing => "committing",
            Self::NotifyPending => "notify_pending",
            Self::Done(_) => "done",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done(status) => write!(f, "done({})", status),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Tracks the state of one cycle and rejects illegal transitions
#[derive(Debug)]
pub struct CycleTracker {
    site_id: i64,
    state: CycleState,
}

impl CycleTracker {
    pub fn new(site_id: i64) -> Self {
        Self {
            site_id,
            state: CycleState::Init,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Moves to `next`
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Transition applied
    /// * `Err(WatchError::InvalidTransition)` - Transition is not allowed
    pub fn advance(&mut self, next: CycleState) -> crate::Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(WatchError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!(
            site_id = self.site_id,
            from = %self.state,
            to = %next,
            "Cycle state transition"
        );
        self.state = next;
        Ok(())
    }

    /// Moves to `Done(Failed)` if the cycle is not already finished
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            tracing::debug!(
                site_id = self.site_id,
                from = %self.state,
                "Cycle aborted"
            );
            self.state = CycleState::Done(RunStatus::Failed);
        }
    }
}
