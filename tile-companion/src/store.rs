use std::sync::Arc;

use thiserror::Error;

use crate::events::RecordAction;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppendError {
    #[error("action {name} arrived before any {}", RecordAction::NEW_ROUND)]
    RoundNotStarted { name: String },
    #[error("action {name} has step {step} but the round expects step {expected}")]
    OutOfSequence {
        name: String,
        step: usize,
        expected: usize,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record action batch is empty")]
    EmptyBatch,
}

#[derive(Debug, Clone, Default)]
pub struct RoundActions {
    actions: Vec<RecordAction>,
}

impl RoundActions {
    // A round marker starts a fresh list. Anything else must follow a
    // marker and, when it carries a step, land exactly at that step.
    pub fn append(&mut self, action: RecordAction) -> Result<(), AppendError> {
        if action.starts_round() {
            self.actions = vec![action];
            return Ok(());
        }
        if self.actions.is_empty() {
            return Err(AppendError::RoundNotStarted { name: action.name });
        }
        if let Some(step) = action.step {
            let expected = self.actions.len();
            if step != expected {
                return Err(AppendError::OutOfSequence {
                    name: action.name,
                    step,
                    expected,
                });
            }
        }
        self.actions.push(action);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.actions.clear();
    }

    pub fn as_slice(&self) -> &[RecordAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayCursor {
    pub round: usize,
    pub action: usize,
}

impl ReplayCursor {
    pub fn new(round: usize, action: usize) -> Self {
        Self { round, action }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    rounds: Vec<Arc<[RecordAction]>>,
}

impl RecordStore {
    // Splits a flat record into rounds at every round marker. Actions ahead
    // of the first marker form the first round.
    pub fn from_batch(actions: Vec<RecordAction>) -> Result<Self, StoreError> {
        if actions.is_empty() {
            return Err(StoreError::EmptyBatch);
        }
        let mut rounds: Vec<Arc<[RecordAction]>> = Vec::new();
        let mut current: Vec<RecordAction> = Vec::new();
        for action in actions {
            if action.starts_round() && !current.is_empty() {
                rounds.push(std::mem::take(&mut current).into());
            }
            current.push(action);
        }
        rounds.push(current.into());
        Ok(Self { rounds })
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn round(&self, index: usize) -> Option<&Arc<[RecordAction]>> {
        self.rounds.get(index)
    }

    pub fn round_len(&self, index: usize) -> usize {
        self.rounds.get(index).map(|round| round.len()).unwrap_or(0)
    }

    pub fn action(&self, cursor: ReplayCursor) -> Option<&RecordAction> {
        self.rounds
            .get(cursor.round)
            .and_then(|round| round.get(cursor.action))
    }

    pub fn clear(&mut self) {
        self.rounds.clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AppendError, RecordStore, ReplayCursor, RoundActions, StoreError};
    use crate::events::RecordAction;

    fn action(name: &str) -> RecordAction {
        RecordAction::new(name, json!({ "name": name }))
    }

    fn stepped(name: &str, step: usize) -> RecordAction {
        RecordAction {
            step: Some(step),
            ..action(name)
        }
    }

    #[test]
    fn live_append_requires_round_start() {
        let mut round = RoundActions::default();
        let err = round
            .append(action("RecordDiscardTile"))
            .expect_err("append before round start should fail");
        assert_eq!(
            err,
            AppendError::RoundNotStarted {
                name: "RecordDiscardTile".to_owned()
            }
        );
        assert!(round.is_empty());
    }

    #[test]
    fn live_append_checks_step_sequence() {
        let mut round = RoundActions::default();
        round.append(stepped("RecordNewRound", 0)).expect("new round");
        round.append(stepped("RecordDealTile", 1)).expect("step 1");
        round.append(action("RecordDiscardTile")).expect("unstepped action");

        let err = round
            .append(stepped("RecordDealTile", 5))
            .expect_err("gap should be rejected");
        assert!(matches!(err, AppendError::OutOfSequence { expected: 3, .. }));
        assert_eq!(round.len(), 3);
    }

    #[test]
    fn new_round_marker_restarts_the_list() {
        let mut round = RoundActions::default();
        round.append(action("RecordNewRound")).expect("new round");
        round.append(action("RecordDiscardTile")).expect("discard");
        round.append(action("RecordNewRound")).expect("second round");
        assert_eq!(round.len(), 1);
    }

    #[test]
    fn batch_splits_on_round_markers() {
        let store = RecordStore::from_batch(vec![
            action("RecordNewRound"),
            action("RecordDiscardTile"),
            action("RecordHule"),
            action("RecordNewRound"),
            action("RecordNoTile"),
        ])
        .expect("batch should split");

        assert_eq!(store.round_count(), 2);
        assert_eq!(store.round_len(0), 3);
        assert_eq!(store.round_len(1), 2);
        assert_eq!(
            store.action(ReplayCursor::new(1, 1)).map(|a| a.name.as_str()),
            Some("RecordNoTile")
        );
        assert!(store.action(ReplayCursor::new(2, 0)).is_none());
    }

    #[test]
    fn unmarked_batch_is_a_single_round() {
        let store = RecordStore::from_batch(vec![action("a0"), action("a1"), action("a2")])
            .expect("batch should split");
        assert_eq!(store.round_count(), 1);
        assert_eq!(store.round_len(0), 3);
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert_eq!(
            RecordStore::from_batch(Vec::new()).expect_err("empty batch"),
            StoreError::EmptyBatch
        );
    }
}
