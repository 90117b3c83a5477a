use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use super::state::SessionState;
use crate::error::WalletError;

/// Session actions that take the in-flight slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Initialize,
    Register,
    PrepareSign,
    Sign,
    Reset,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Initialize => "initialize",
            ActionKind::Register => "register",
            ActionKind::PrepareSign => "prepare_sign",
            ActionKind::Sign => "sign",
            ActionKind::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Holds the session's single in-flight slot until dropped
///
/// Dropping the guard (normal return, error or a cancelled future) frees the
/// slot.
#[derive(Debug)]
pub(crate) struct ActionGuard<'a> {
    state: &'a Mutex<SessionState>,
}

impl<'a> ActionGuard<'a> {
    /// Claim the slot for `kind`, failing fast if another action holds it
    pub(crate) fn acquire(
        state: &'a Mutex<SessionState>,
        kind: ActionKind,
    ) -> Result<Self, WalletError> {
        let mut locked = state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(in_flight) = locked.in_flight {
            log::debug!("Rejecting {kind}: {in_flight} is in flight");
            return Err(WalletError::Busy {
                requested: kind,
                in_flight,
            });
        }
        locked.in_flight = Some(kind);
        Ok(Self { state })
    }
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        let mut locked = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        locked.in_flight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy_until_release() {
        let state = Mutex::new(SessionState::default());

        let guard = ActionGuard::acquire(&state, ActionKind::Register).unwrap();
        match ActionGuard::acquire(&state, ActionKind::Sign) {
            Err(WalletError::Busy {
                requested,
                in_flight,
            }) => {
                assert_eq!(requested, ActionKind::Sign);
                assert_eq!(in_flight, ActionKind::Register);
            }
            other => panic!("expected busy, got {other:?}"),
        }

        drop(guard);
        assert!(ActionGuard::acquire(&state, ActionKind::Sign).is_ok());
    }

    #[test]
    fn test_display_matches_serialized_name() {
        assert_eq!(ActionKind::PrepareSign.to_string(), "prepare_sign");
        assert_eq!(
            serde_json::to_string(&ActionKind::PrepareSign).unwrap(),
            "\"prepare_sign\""
        );
    }
}
