use std::{sync::Arc, thread, time::Duration};

use thiserror::Error;
use tracing::debug;

use crate::{
    analysis::AnalysisTaskManager,
    events::{NavigationCommand, NavigationRequest, RecordAction},
    state::RoundDataState,
    store::{RecordStore, ReplayCursor},
};

pub const VISIBLE_TAIL: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("no record is loaded for replay")]
    NoRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Ignored,
    Moved(ReplayCursor),
    AdvancedRound(ReplayCursor),
    Wrapped,
}

/// Applies `actions` in order with output suppressed for all but the last
/// `VISIBLE_TAIL` of them.
pub fn fast_apply(state: &mut RoundDataState, actions: &[&RecordAction]) {
    if actions.is_empty() {
        return;
    }
    let visible_from = actions.len().saturating_sub(VISIBLE_TAIL);
    state.set_skip_output(true);
    for action in &actions[..visible_from] {
        state.apply(&action.action);
    }
    state.set_skip_output(false);
    for action in &actions[visible_from..] {
        state.apply(&action.action);
    }
}

#[derive(Debug)]
pub struct ReplayController {
    store: RecordStore,
    cursor: ReplayCursor,
    round_end_pause: Duration,
}

impl ReplayController {
    pub fn new(round_end_pause: Duration) -> Self {
        Self {
            store: RecordStore::default(),
            cursor: ReplayCursor::default(),
            round_end_pause,
        }
    }

    pub fn load(&mut self, store: RecordStore) {
        self.store = store;
        self.cursor = ReplayCursor::default();
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.cursor = ReplayCursor::default();
    }

    pub fn is_loaded(&self) -> bool {
        !self.store.is_empty()
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn cursor(&self) -> ReplayCursor {
        self.cursor
    }

    pub fn current_round(&self) -> Option<Arc<[RecordAction]>> {
        self.store.round(self.cursor.round).cloned()
    }

    pub fn current_action(&self) -> Option<&RecordAction> {
        self.store.action(self.cursor)
    }

    pub fn applied_prefix(&self) -> Vec<&RecordAction> {
        self.store
            .round(self.cursor.round)
            .map(|round| {
                let end = (self.cursor.action + 1).min(round.len());
                round[..end].iter().collect()
            })
            .unwrap_or_default()
    }

    pub fn navigate(
        &mut self,
        request: &NavigationRequest,
        state: &mut RoundDataState,
        tasks: &mut AnalysisTaskManager,
    ) -> Result<NavigationOutcome, NavigationError> {
        if self.store.is_empty() {
            return Err(NavigationError::NoRecord);
        }
        let rounds = self.store.round_count();
        debug!(command = ?request.command, index = request.index, fast_to = request.fast_to, cursor = ?self.cursor, "replay navigation");

        match &request.command {
            NavigationCommand::NextStep => {
                let next = self.cursor.action + 1;
                if next >= self.store.round_len(self.cursor.round) {
                    let at_round_end = self
                        .current_action()
                        .map(RecordAction::ends_round)
                        .unwrap_or(false);
                    if at_round_end {
                        return Ok(self.advance_round(state, tasks));
                    }
                    return Ok(NavigationOutcome::Ignored);
                }
                self.cursor.action = next;
                self.apply_cursor(state);
            }
            NavigationCommand::NextRound => {
                self.enter_round((self.cursor.round + 1) % rounds, tasks);
                self.apply_cursor(state);
            }
            NavigationCommand::PreRound => {
                self.enter_round((self.cursor.round + rounds - 1) % rounds, tasks);
                self.apply_cursor(state);
            }
            NavigationCommand::JumpRound => {
                let round = request.index.rem_euclid(rounds as i64) as usize;
                self.enter_round(round, tasks);
                self.apply_cursor(state);
            }
            command if command.is_bulk() => {
                if *command == NavigationCommand::JumpToLastRoundXun {
                    self.cursor.round = (self.cursor.round + rounds - 1) % rounds;
                    self.restart_analysis(tasks);
                }
                self.bulk_apply(command, request.fast_to, state);
            }
            _ => return Ok(NavigationOutcome::Ignored),
        }

        let ends_round = self
            .current_action()
            .map(RecordAction::ends_round)
            .unwrap_or(false);
        if ends_round {
            return Ok(self.advance_round(state, tasks));
        }
        Ok(NavigationOutcome::Moved(self.cursor))
    }

    // Replays from the round start (or just past the cursor for `nextXun`)
    // through the action after `fast_to`, which becomes the cursor.
    fn bulk_apply(&mut self, command: &NavigationCommand, fast_to: i64, state: &mut RoundDataState) {
        let Some(round) = self.store.round(self.cursor.round).cloned() else {
            return;
        };
        let last = round.len().saturating_sub(1) as i64;
        let target = (fast_to + 1).clamp(0, last) as usize;
        let start = if *command == NavigationCommand::NextXun {
            (self.cursor.action + 1).min(target)
        } else {
            0
        };
        debug!(round = self.cursor.round, start, target, "fast-forwarding record actions");
        let sequence: Vec<&RecordAction> = round[start..=target].iter().collect();
        fast_apply(state, &sequence);
        self.cursor.action = target;
    }

    fn advance_round(
        &mut self,
        state: &mut RoundDataState,
        tasks: &mut AnalysisTaskManager,
    ) -> NavigationOutcome {
        self.cursor.round += 1;
        self.cursor.action = 0;
        if self.cursor.round >= self.store.round_count() {
            self.cursor.round = 0;
            return NavigationOutcome::Wrapped;
        }
        if !self.round_end_pause.is_zero() {
            thread::sleep(self.round_end_pause);
        }
        self.restart_analysis(tasks);
        self.apply_cursor(state);
        NavigationOutcome::AdvancedRound(self.cursor)
    }

    fn enter_round(&mut self, round: usize, tasks: &mut AnalysisTaskManager) {
        self.cursor = ReplayCursor::new(round, 0);
        self.restart_analysis(tasks);
    }

    fn restart_analysis(&self, tasks: &mut AnalysisTaskManager) {
        let Some(round) = self.current_round() else {
            return;
        };
        match tasks.restart_active(round) {
            Some(task_id) => debug!(round = self.cursor.round, task_id, "analysis restarted"),
            None => debug!(round = self.cursor.round, "no active analysis entry to restart"),
        }
    }

    fn apply_cursor(&self, state: &mut RoundDataState) {
        if let Some(action) = self.current_action() {
            state.set_skip_output(false);
            state.apply(&action.action);
        }
    }
}
