use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    analysis::{Advisor, AnalysisKey, AnalysisTaskManager},
    catalog::{DiscoverySource, MatchCatalog},
    config::CompanionConfig,
    events::{
        AccountId, MajsoulEvent, NavigationRequest, RecordAction, RecordBaseInfo, Seat,
        SPECTATOR_ACCOUNT,
    },
    notify::CompanionNotifier,
    protocol::parse_majsoul_payload,
    replay::{fast_apply, NavigationError, NavigationOutcome, ReplayController},
    state::{GameMode, RoundDataState, RoundModel},
    store::{AppendError, RecordStore, RoundActions, StoreError},
    workers::PayloadHandler,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record {0} is not in the catalog")]
    UnknownRecord(String),
    #[error("no record uuid has been received for the record being viewed")]
    NoCurrentRecord,
    #[error("no active account is known for the record being viewed")]
    NoActiveAccount,
    #[error("account {account} has no seat in record {record}")]
    SeatNotFound { record: String, account: AccountId },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Append(#[from] AppendError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub round_end_pause: Duration,
    pub retained_generations: u64,
}

impl SessionSettings {
    pub fn from_config(config: &CompanionConfig) -> Self {
        Self {
            round_end_pause: Duration::from_millis(config.round_end_pause_ms),
            retained_generations: config.analysis_retained_generations,
        }
    }
}

pub struct MajsoulSession {
    catalog: MatchCatalog,
    state: RoundDataState,
    replay: ReplayController,
    live_round: RoundActions,
    tasks: AnalysisTaskManager,
    notifier: Arc<dyn CompanionNotifier>,
    current_record: Option<String>,
    active_account: Option<AccountId>,
    // Account announced together with a record we could not resolve yet; a
    // shared record pointer usually follows it.
    pending_account: Option<AccountId>,
}

impl MajsoulSession {
    pub fn new(
        model: Box<dyn RoundModel>,
        advisor: Arc<dyn Advisor>,
        notifier: Arc<dyn CompanionNotifier>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            catalog: MatchCatalog::default(),
            state: RoundDataState::new(model),
            replay: ReplayController::new(settings.round_end_pause),
            live_round: RoundActions::default(),
            tasks: AnalysisTaskManager::new(
                advisor,
                Arc::clone(&notifier),
                settings.retained_generations,
            ),
            notifier,
            current_record: None,
            active_account: None,
            pending_account: None,
        }
    }

    pub fn handle(&mut self, event: MajsoulEvent) {
        let kind = event.kind();
        if let Err(err) = self.dispatch(event) {
            warn!(kind, %err, "dropped event");
        }
    }

    fn dispatch(&mut self, event: MajsoulEvent) -> Result<(), RecordError> {
        match event {
            MajsoulEvent::FriendList(friends) => {
                info!(count = friends.len(), "friend list received");
                Ok(())
            }
            MajsoulEvent::RecordCatalog(records) => {
                self.on_record_catalog(records);
                Ok(())
            }
            MajsoulEvent::SharedRecordPointer(info) => self.on_shared_record(info),
            MajsoulEvent::BeginViewingRecord { identity, account } => {
                self.on_begin_viewing(&identity, account)
            }
            MajsoulEvent::RecordActionBatch(actions) => self.on_record_actions(actions),
            MajsoulEvent::ReplayNavigation(request) => self.on_navigation(&request),
            MajsoulEvent::BeginLiveSpectate(head) => {
                self.on_live_spectate(&head);
                Ok(())
            }
            MajsoulEvent::LiveAction { action, fast } => self.on_live_action(action, fast),
            MajsoulEvent::SeatChange(seat) => self.on_seat_change(seat),
            MajsoulEvent::SyncActionBatch(actions) => {
                let refs: Vec<&RecordAction> = actions.iter().collect();
                fast_apply(&mut self.state, &refs);
                Ok(())
            }
            MajsoulEvent::OpaqueStateDelta(payload) => {
                self.state.apply(&payload);
                Ok(())
            }
        }
    }

    fn on_record_catalog(&mut self, records: Vec<RecordBaseInfo>) {
        let received = records.len();
        for record in records {
            self.catalog.upsert(record, DiscoverySource::RecordList);
        }
        self.notifier.console(&format!(
            "received {received} records ({} collected); open one in the client to analyse it",
            self.catalog.len()
        ));
    }

    // The client also sends a shared pointer when opening one's own record,
    // so the two cases cannot be told apart here.
    fn on_shared_record(&mut self, info: RecordBaseInfo) -> Result<(), RecordError> {
        let identity = info.uuid.clone();
        self.catalog.upsert(info, DiscoverySource::SharedPointer);
        self.load_record(&identity)?;
        if let Some(account) = self.pending_account.take() {
            self.activate_account(account);
            self.catalog.resolve_account(&identity, account);
        }
        Ok(())
    }

    fn on_begin_viewing(
        &mut self,
        identity: &str,
        account: Option<AccountId>,
    ) -> Result<(), RecordError> {
        if !self.catalog.contains(identity) {
            self.pending_account = account;
            return Err(RecordError::UnknownRecord(identity.to_owned()));
        }
        self.load_record(identity)?;
        self.pending_account = None;
        if let Some(account) = account {
            self.activate_account(account);
            self.catalog.resolve_account(identity, account);
        }
        Ok(())
    }

    fn on_record_actions(&mut self, actions: Vec<RecordAction>) -> Result<(), RecordError> {
        if self.replay.is_loaded() {
            debug!("record actions already loaded for this record; ignoring repeat batch");
            return Ok(());
        }
        let record = self
            .current_record
            .clone()
            .ok_or(RecordError::NoCurrentRecord)?;
        let metadata = self
            .catalog
            .get(&record)
            .ok_or_else(|| RecordError::UnknownRecord(record.clone()))?;
        let account = self.active_account.ok_or(RecordError::NoActiveAccount)?;
        let seat = metadata
            .info
            .seat_of(account)
            .ok_or_else(|| RecordError::SeatNotFound {
                record: record.clone(),
                account,
            })?;
        let store = RecordStore::from_batch(actions)?;

        self.tasks.clear_match(&record);
        self.state.begin_replay(seat);
        self.replay.load(store);
        info!(
            record = %record,
            seat,
            rounds = self.replay.store().round_count(),
            "record loaded for replay"
        );

        if let Some(round) = self.replay.current_round() {
            self.tasks.ensure(AnalysisKey::new(record, seat), round);
        }
        if let Some(first) = self.replay.current_action() {
            self.state.apply(&first.action);
        }
        Ok(())
    }

    fn on_navigation(&mut self, request: &NavigationRequest) -> Result<(), RecordError> {
        let outcome = self
            .replay
            .navigate(request, &mut self.state, &mut self.tasks)?;
        match outcome {
            NavigationOutcome::Moved(cursor) => debug!(?cursor, "replay moved"),
            NavigationOutcome::AdvancedRound(cursor) => {
                debug!(?cursor, "replay advanced to the next round")
            }
            NavigationOutcome::Wrapped => {
                self.notifier
                    .console("end of record reached; back at the first round")
            }
            NavigationOutcome::Ignored => debug!(
                cursor = ?self.replay.cursor(),
                command = ?request.command,
                "navigation ignored"
            ),
        }
        Ok(())
    }

    fn on_live_spectate(&mut self, head: &serde_json::Value) {
        self.activate_account(SPECTATOR_ACCOUNT);
        self.current_record = None;
        self.replay.clear();
        self.live_round.clear();
        self.state.begin_live();
        self.notifier.console(&format!("loading live match: {head}"));
    }

    fn on_live_action(&mut self, action: RecordAction, fast: bool) -> Result<(), RecordError> {
        debug!(name = %action.name, fast, "live action received");
        self.live_round.append(action.clone())?;
        debug!(round_len = self.live_round.len(), "live action appended");
        self.state.set_skip_output(fast);
        self.state.apply(&action.action);
        self.state.set_skip_output(false);
        Ok(())
    }

    fn on_seat_change(&mut self, seat: Seat) -> Result<(), RecordError> {
        match self.state.mode() {
            GameMode::Idle => {
                self.state.set_seat(seat);
            }
            GameMode::Live => {
                self.state.set_seat(seat);
                if self.live_round.is_empty() {
                    debug!(seat, "no live actions to replay for the new seat");
                }
                let actions: Vec<&RecordAction> = self.live_round.as_slice().iter().collect();
                fast_apply(&mut self.state, &actions);
            }
            GameMode::Replay => {
                let record = self
                    .current_record
                    .clone()
                    .ok_or(RecordError::NoCurrentRecord)?;
                let round = self
                    .replay
                    .current_round()
                    .ok_or(NavigationError::NoRecord)?;
                self.state.set_seat(seat);
                self.tasks.ensure(AnalysisKey::new(record, seat), round);
                let applied = self.replay.applied_prefix();
                fast_apply(&mut self.state, &applied);
            }
        }
        debug!(seat, mode = ?self.state.mode(), "seat changed");
        Ok(())
    }

    fn load_record(&mut self, identity: &str) -> Result<(), RecordError> {
        let metadata = self
            .catalog
            .get(identity)
            .ok_or_else(|| RecordError::UnknownRecord(identity.to_owned()))?;
        let legacy = metadata.info.is_legacy_scoring();
        let description = metadata.info.describe();
        debug!(
            record = %identity,
            source = ?metadata.source,
            account = ?metadata.resolved_account(),
            "record selected"
        );

        self.current_record = Some(identity.to_owned());
        self.replay.clear();
        self.notifier.console(&format!("loading record {description}"));
        self.notifier.legacy_scoring_changed(legacy);
        Ok(())
    }

    fn activate_account(&mut self, account: AccountId) {
        if self.active_account == Some(account) {
            return;
        }
        self.active_account = Some(account);
        self.notifier.account_changed(account);
    }
}

#[cfg(test)]
impl MajsoulSession {
    pub fn catalog(&self) -> &MatchCatalog {
        &self.catalog
    }

    pub fn state(&self) -> &RoundDataState {
        &self.state
    }

    pub fn replay(&self) -> &ReplayController {
        &self.replay
    }

    pub fn tasks(&self) -> &AnalysisTaskManager {
        &self.tasks
    }

    pub fn live_round(&self) -> &RoundActions {
        &self.live_round
    }

    pub fn current_record(&self) -> Option<&str> {
        self.current_record.as_deref()
    }

    pub fn active_account(&self) -> Option<AccountId> {
        self.active_account
    }
}

impl PayloadHandler for MajsoulSession {
    fn source(&self) -> &'static str {
        "majsoul"
    }

    fn handle_payload(&mut self, raw: &[u8]) {
        match parse_majsoul_payload(raw) {
            Ok(event) => self.handle(event),
            Err(err) => warn!(?err, len = raw.len(), "dropped malformed payload"),
        }
    }
}
