use std::fmt;
use tracing::{debug, error};

use crate::error::{describe_error_code, PipelineError};
use crate::results::ResultId;

/// Lifecycle of a single prediction request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    InputResolved,
    WorkerInvoked,
    JoinAttempted,
    Persisted,
    Responded,
    Failed,
}

impl RequestState {
    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, InputResolved)
                | (InputResolved, WorkerInvoked)
                | (WorkerInvoked, JoinAttempted)
                | (JoinAttempted, Persisted)
                | (Persisted, Responded)
                | (Received | InputResolved | WorkerInvoked, Failed)
                // Persisting the record is the one fatal step after the join
                | (JoinAttempted, Failed)
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Received => "RECEIVED",
            RequestState::InputResolved => "INPUT_RESOLVED",
            RequestState::WorkerInvoked => "WORKER_INVOKED",
            RequestState::JoinAttempted => "JOIN_ATTEMPTED",
            RequestState::Persisted => "PERSISTED",
            RequestState::Responded => "RESPONDED",
            RequestState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Tracks one request through [`RequestState`], logging each step
#[derive(Debug)]
pub struct RequestTracker {
    id: ResultId,
    state: RequestState,
}

impl RequestTracker {
    pub fn new(id: ResultId) -> Self {
        Self {
            id,
            state: RequestState::Received,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn advance(&mut self, next: RequestState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(result_id = %self.id, "{} -> {}", self.state, next);
        self.state = next;
    }

    /// Move to FAILED, logging the full error internally
    pub fn fail(&mut self, err: &PipelineError) {
        error!(
            result_id = %self.id,
            state = %self.state,
            code = err.code(),
            kind = describe_error_code(err.code()),
            "Prediction request failed: {}",
            err.developer_message()
        );
        if self.state.can_transition_to(RequestState::Failed) {
            self.state = RequestState::Failed;
        }
    }
}
