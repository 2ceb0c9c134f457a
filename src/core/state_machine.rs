use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};

/// Phases of one P2P transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Validating,
    Debiting,
    Crediting,
    FeeSettling,
    RecordingTransactions,
    NotifyingAsync,
    Done,
    Compensating,
    Rejected,
    Failed,
}

impl TransferState {
    pub fn name(&self) -> &'static str {
        match self {
            TransferState::Validating => "validating",
            TransferState::Debiting => "debiting",
            TransferState::Crediting => "crediting",
            TransferState::FeeSettling => "fee_settling",
            TransferState::RecordingTransactions => "recording_transactions",
            TransferState::NotifyingAsync => "notifying_async",
            TransferState::Done => "done",
            TransferState::Compensating => "compensating",
            TransferState::Rejected => "rejected",
            TransferState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Done | TransferState::Rejected | TransferState::Failed)
    }

    /// True once the sender may have been debited.
    pub fn money_may_have_moved(&self) -> bool {
        !matches!(self, TransferState::Validating | TransferState::Rejected)
    }

    pub fn can_advance_to(&self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Validating, Debiting)
                | (Validating, Rejected)
                | (Validating, Failed)
                | (Debiting, Crediting)
                | (Debiting, Compensating)
                | (Debiting, Rejected)
                | (Debiting, Failed)
                | (Crediting, FeeSettling)
                | (Crediting, RecordingTransactions)
                | (Crediting, Compensating)
                | (Crediting, Failed)
                | (Compensating, Failed)
                | (FeeSettling, RecordingTransactions)
                | (RecordingTransactions, NotifyingAsync)
                | (NotifyingAsync, Done)
        )
    }
}

impl std::fmt::Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub struct StateMachine {
    state: TransferState,
    history: Vec<TransferState>,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine {
            state: TransferState::Validating,
            history: vec![TransferState::Validating],
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn history(&self) -> &[TransferState] {
        &self.history
    }

    pub fn advance(&mut self, next: TransferState) -> Result<TransferState> {
        if !self.state.can_advance_to(next) {
            return Err(Error::IllegalTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }

        tracing::debug!(from = %self.state, to = %next, "transfer state transition");
        self.state = next;
        self.history.push(next);
        Ok(next)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
