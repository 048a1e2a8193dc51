use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Seat = usize;
pub type AccountId = i64;

pub const EAST_SEAT: Seat = 0;
pub const SPECTATOR_ACCOUNT: AccountId = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DetailRule {
    pub guyi_mode: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RecordMode {
    pub detail_rule: DetailRule,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RecordConfig {
    pub mode: RecordMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RecordAccount {
    pub account_id: AccountId,
    pub seat: Seat,
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RecordBaseInfo {
    pub uuid: String,
    pub start_time: i64,
    pub end_time: i64,
    pub config: RecordConfig,
    pub accounts: Vec<RecordAccount>,
}

impl RecordBaseInfo {
    pub fn is_legacy_scoring(&self) -> bool {
        self.config.mode.detail_rule.guyi_mode != 0
    }

    pub fn seat_of(&self, account: AccountId) -> Option<Seat> {
        self.accounts
            .iter()
            .find(|entry| entry.account_id == account)
            .map(|entry| entry.seat)
    }

    pub fn describe(&self) -> String {
        let started = Utc
            .timestamp_opt(self.start_time, 0)
            .single()
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown start".to_owned());
        let mut players: Vec<&RecordAccount> = self.accounts.iter().collect();
        players.sort_by_key(|entry| entry.seat);
        let names: Vec<&str> = players
            .iter()
            .map(|entry| entry.nickname.as_str())
            .collect();
        format!("{} [{}] {}", self.uuid, started, names.join(" / "))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordAction {
    pub name: String,
    #[serde(default)]
    pub action: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
}

impl RecordAction {
    pub const NEW_ROUND: &'static str = "RecordNewRound";
    pub const WIN: &'static str = "RecordHule";
    pub const EXHAUSTIVE_DRAW: &'static str = "RecordNoTile";
    pub const ABORTIVE_DRAW: &'static str = "RecordLiuJu";

    #[cfg(test)]
    pub fn new(name: impl Into<String>, action: Value) -> Self {
        Self {
            name: name.into(),
            action,
            step: None,
        }
    }

    pub fn starts_round(&self) -> bool {
        self.name == Self::NEW_ROUND
    }

    pub fn ends_round(&self) -> bool {
        matches!(
            self.name.as_str(),
            Self::WIN | Self::EXHAUSTIVE_DRAW | Self::ABORTIVE_DRAW
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationCommand {
    NextStep,
    NextRound,
    PreRound,
    JumpRound,
    NextXun,
    PreXun,
    JumpXun,
    PreStep,
    JumpToLastRoundXun,
    Unsupported(String),
}

impl NavigationCommand {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "nextStep" | "update" => Self::NextStep,
            "nextRound" => Self::NextRound,
            "preRound" => Self::PreRound,
            "jumpRound" => Self::JumpRound,
            "nextXun" => Self::NextXun,
            "preXun" => Self::PreXun,
            "jumpXun" => Self::JumpXun,
            "preStep" => Self::PreStep,
            "jumpToLastRoundXun" => Self::JumpToLastRoundXun,
            other => Self::Unsupported(other.to_owned()),
        }
    }

    pub fn is_bulk(&self) -> bool {
        matches!(
            self,
            Self::NextXun | Self::PreXun | Self::JumpXun | Self::PreStep | Self::JumpToLastRoundXun
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationRequest {
    pub command: NavigationCommand,
    pub index: i64,
    pub fast_to: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MajsoulEvent {
    FriendList(Vec<Value>),
    RecordCatalog(Vec<RecordBaseInfo>),
    SharedRecordPointer(RecordBaseInfo),
    BeginViewingRecord {
        identity: String,
        account: Option<AccountId>,
    },
    RecordActionBatch(Vec<RecordAction>),
    ReplayNavigation(NavigationRequest),
    BeginLiveSpectate(Value),
    LiveAction {
        action: RecordAction,
        fast: bool,
    },
    SeatChange(Seat),
    SyncActionBatch(Vec<RecordAction>),
    OpaqueStateDelta(Value),
}

impl MajsoulEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FriendList(_) => "friend_list",
            Self::RecordCatalog(_) => "record_catalog",
            Self::SharedRecordPointer(_) => "shared_record_pointer",
            Self::BeginViewingRecord { .. } => "begin_viewing_record",
            Self::RecordActionBatch(_) => "record_action_batch",
            Self::ReplayNavigation(_) => "replay_navigation",
            Self::BeginLiveSpectate(_) => "begin_live_spectate",
            Self::LiveAction { .. } => "live_action",
            Self::SeatChange(_) => "seat_change",
            Self::SyncActionBatch(_) => "sync_action_batch",
            Self::OpaqueStateDelta(_) => "opaque_state_delta",
        }
    }
}
