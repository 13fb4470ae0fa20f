// crates/driftwatch-daemon/src/state.rs
//
// Lifecycle state machine for the Driftwatch daemon.
//
// Valid transitions:
//   Initializing -> Loading -> Running
//   Any state -> ShuttingDown

use std::fmt;

/// Lifecycle states of the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonState {
    /// Parsing arguments and configuration.
    Initializing,
    /// Opening stores and starting one controller per model.
    Loading,
    /// Controllers are sampling, evaluating, and retraining.
    Running,
    /// Cancelling in-flight jobs and stopping controllers.
    ShuttingDown,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonState::Initializing => write!(f, "Initializing"),
            DaemonState::Loading => write!(f, "Loading"),
            DaemonState::Running => write!(f, "Running"),
            DaemonState::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// State machine for managing daemon lifecycle transitions.
pub struct DaemonStateMachine {
    pub current: DaemonState,
}

impl DaemonStateMachine {
    /// Create a new state machine starting in the Initializing state.
    pub fn new() -> Self {
        Self {
            current: DaemonState::Initializing,
        }
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns an error if the transition is not valid.
    pub fn transition(&mut self, new_state: DaemonState) -> Result<(), String> {
        let valid = match (&self.current, &new_state) {
            (_, DaemonState::ShuttingDown) => self.current != DaemonState::ShuttingDown,
            (DaemonState::Initializing, DaemonState::Loading) => true,
            (DaemonState::Loading, DaemonState::Running) => true,
            _ => false,
        };

        if valid {
            tracing::info!("State transition: {} -> {}", self.current, new_state);
            self.current = new_state;
            Ok(())
        } else {
            Err(format!(
                "Invalid state transition: {} -> {}",
                self.current, new_state
            ))
        }
    }
}

impl Default for DaemonStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_sequence() {
        let mut sm = DaemonStateMachine::new();
        sm.transition(DaemonState::Loading).unwrap();
        sm.transition(DaemonState::Running).unwrap();
        sm.transition(DaemonState::ShuttingDown).unwrap();
        assert_eq!(sm.current, DaemonState::ShuttingDown);
    }

    #[test]
    fn cannot_skip_loading() {
        let mut sm = DaemonStateMachine::new();
        assert!(sm.transition(DaemonState::Running).is_err());
        assert_eq!(sm.current, DaemonState::Initializing);
    }

    #[test]
    fn shutdown_from_anywhere_but_only_once() {
        let mut sm = DaemonStateMachine::new();
        sm.transition(DaemonState::ShuttingDown).unwrap();
        assert!(sm.transition(DaemonState::ShuttingDown).is_err());
        assert!(sm.transition(DaemonState::Loading).is_err());
    }
}
