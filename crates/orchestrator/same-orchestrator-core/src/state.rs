//! Request lifecycle states.

use log::{trace, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestState {
    Idle,
    AwaitingConnection,
    ParsingRequest,
    Encoding,
    Inferring,
    Decoding,
    Responding,
    ErrorResponse,
}

impl RequestState {
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Idle, AwaitingConnection)
                | (AwaitingConnection, Idle)
                | (AwaitingConnection, ParsingRequest)
                | (ParsingRequest, Encoding)
                | (Encoding, Inferring)
                | (Inferring, Decoding)
                | (Decoding, Responding)
                | (ParsingRequest | Encoding | Inferring | Decoding, ErrorResponse)
                | (ErrorResponse, Responding)
                | (Responding, Idle)
        )
    }
}

/// Current state plus the ordered history of states visited.
#[derive(Clone, Debug)]
pub struct StateTracker {
    history: Vec<RequestState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            history: vec![RequestState::Idle],
        }
    }

    /// Tracker for a request whose connection was already accepted.
    pub fn begin_request() -> Self {
        Self {
            history: vec![RequestState::ParsingRequest],
        }
    }

    pub fn current(&self) -> RequestState {
        self.history
            .last()
            .copied()
            .unwrap_or(RequestState::Idle)
    }

    pub fn transition(&mut self, next: RequestState) {
        let current = self.current();
        if !current.can_transition_to(next) {
            warn!("unexpected state transition {current:?} -> {next:?}");
        }
        trace!("{current:?} -> {next:?}");
        self.history.push(next);
    }

    pub fn history(&self) -> &[RequestState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<RequestState> {
        self.history
    }

    /// Forget the history, keeping only the current state.
    pub fn reset_history(&mut self) {
        let current = self.current();
        self.history.clear();
        self.history.push(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestState::*;

    #[test]
    fn happy_path_is_valid() {
        let path = [
            Idle,
            AwaitingConnection,
            ParsingRequest,
            Encoding,
            Inferring,
            Decoding,
            Responding,
            Idle,
        ];
        assert!(path.windows(2).all(|w| w[0].can_transition_to(w[1])));
    }

    #[test]
    fn errors_always_pass_through_responding() {
        for from in [ParsingRequest, Encoding, Inferring, Decoding] {
            assert!(from.can_transition_to(ErrorResponse));
        }
        assert!(!ErrorResponse.can_transition_to(Idle));
        assert!(ErrorResponse.can_transition_to(Responding));
        assert!(!ParsingRequest.can_transition_to(Inferring));
    }

    #[test]
    fn tracker_records_history() {
        let mut tracker = StateTracker::begin_request();
        tracker.transition(ErrorResponse);
        tracker.transition(Responding);
        assert_eq!(tracker.current(), Responding);
        assert_eq!(tracker.history(), &[ParsingRequest, ErrorResponse, Responding]);
        tracker.reset_history();
        assert_eq!(tracker.history(), &[Responding]);
    }
}
