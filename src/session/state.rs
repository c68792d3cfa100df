use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Idle,
    Calibrated,
    Recording,
    Stopped,
    /// Resources released; nothing else is accepted.
    Terminated,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Calibrate,
    Recalibrate,
    Start,
    Stop,
    ContinueSameCalibration,
    RecalibrateAndContinue,
    Quit,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEvent::Calibrate => "calibrate",
            SessionEvent::Recalibrate => "recalibrate",
            SessionEvent::Start => "start",
            SessionEvent::Stop => "stop",
            SessionEvent::ContinueSameCalibration => "continue with the same calibration",
            SessionEvent::RecalibrateAndContinue => "recalibrate and continue",
            SessionEvent::Quit => "quit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot {event} while {from:?}")]
pub struct TransitionError {
    pub from: SessionStatus,
    pub event: SessionEvent,
}

impl SessionStatus {
    /// The state `event` leads to, or an error when it is not allowed here.
    ///
    /// Quitting is accepted from every state except `Recording`, which has
    /// to be stopped first so its files get written.
    pub fn apply(self, event: SessionEvent) -> Result<SessionStatus, TransitionError> {
        use SessionEvent as E;
        use SessionStatus as S;

        let next = match (self, event) {
            (S::Idle, E::Calibrate) => S::Calibrated,
            (S::Calibrated, E::Recalibrate) => S::Calibrated,
            (S::Calibrated, E::Start) => S::Recording,
            (S::Recording, E::Stop) => S::Stopped,
            (S::Stopped, E::ContinueSameCalibration) => S::Calibrated,
            (S::Stopped, E::RecalibrateAndContinue) => S::Calibrated,
            (S::Idle | S::Calibrated | S::Stopped, E::Quit) => S::Terminated,
            (from, event) => return Err(TransitionError { from, event }),
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionEvent as E;
    use SessionStatus as S;

    #[test]
    fn happy_path() {
        let mut status = S::default();
        for (event, expected) in [
            (E::Calibrate, S::Calibrated),
            (E::Recalibrate, S::Calibrated),
            (E::Start, S::Recording),
            (E::Stop, S::Stopped),
            (E::ContinueSameCalibration, S::Calibrated),
            (E::Start, S::Recording),
            (E::Stop, S::Stopped),
            (E::RecalibrateAndContinue, S::Calibrated),
            (E::Start, S::Recording),
            (E::Stop, S::Stopped),
            (E::Quit, S::Terminated),
        ] {
            status = status.apply(event).unwrap();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let cases = [
            (S::Idle, E::Start),
            (S::Idle, E::Stop),
            (S::Idle, E::Recalibrate),
            (S::Calibrated, E::Calibrate),
            (S::Calibrated, E::Stop),
            (S::Recording, E::Start),
            (S::Recording, E::Recalibrate),
            (S::Recording, E::Quit),
            (S::Stopped, E::Stop),
            (S::Stopped, E::Start),
            (S::Terminated, E::Calibrate),
            (S::Terminated, E::Quit),
        ];
        for (from, event) in cases {
            assert_eq!(from.apply(event), Err(TransitionError { from, event }));
        }
    }

    #[test]
    fn error_message_names_the_event() {
        let err = S::Idle.apply(E::Stop).unwrap_err();
        assert_eq!(err.to_string(), "cannot stop while Idle");
    }
}
