use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::events::{Seat, EAST_SEAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameMode {
    #[default]
    Idle,
    Live,
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyContext {
    pub seat: Option<Seat>,
    pub mode: GameMode,
    pub skip_output: bool,
}

pub trait RoundModel: Send {
    fn reset(&mut self);
    fn apply(&mut self, payload: &Value, ctx: ApplyContext) -> Result<()>;
}

pub struct RoundDataState {
    model: Box<dyn RoundModel>,
    current: Option<Value>,
    seat: Option<Seat>,
    mode: GameMode,
    skip_output: bool,
}

impl RoundDataState {
    pub fn new(model: Box<dyn RoundModel>) -> Self {
        Self {
            model,
            current: None,
            seat: None,
            mode: GameMode::Idle,
            skip_output: false,
        }
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn begin_live(&mut self) {
        self.reset();
        self.seat = Some(EAST_SEAT);
        self.mode = GameMode::Live;
    }

    pub fn begin_replay(&mut self, seat: Seat) {
        self.reset();
        self.seat = Some(seat);
        self.mode = GameMode::Replay;
    }

    pub fn set_seat(&mut self, seat: Seat) {
        self.seat = Some(seat);
    }

    pub fn set_skip_output(&mut self, skip: bool) {
        self.skip_output = skip;
    }

    pub fn apply(&mut self, payload: &Value) {
        let ctx = ApplyContext {
            seat: self.seat,
            mode: self.mode,
            skip_output: self.skip_output,
        };
        let current = self.current.insert(payload.clone());
        if let Err(err) = self.model.apply(current, ctx) {
            warn!(?err, mode = ?self.mode, "round tracker rejected payload");
        }
    }

    fn reset(&mut self) {
        self.model.reset();
        self.current = None;
        self.skip_output = false;
    }
}

#[cfg(test)]
impl RoundDataState {
    pub fn seat(&self) -> Option<Seat> {
        self.seat
    }

    pub fn skip_output(&self) -> bool {
        self.skip_output
    }

    pub fn current_payload(&self) -> Option<&Value> {
        self.current.as_ref()
    }
}

#[derive(Debug)]
pub struct LoggingRoundModel {
    source: &'static str,
    applied: u64,
}

impl LoggingRoundModel {
    pub fn new(source: &'static str) -> Self {
        Self {
            source,
            applied: 0,
        }
    }
}

impl RoundModel for LoggingRoundModel {
    fn reset(&mut self) {
        debug!(source = self.source, applied = self.applied, "round tracker reset");
        self.applied = 0;
    }

    fn apply(&mut self, payload: &Value, ctx: ApplyContext) -> Result<()> {
        self.applied += 1;
        if ctx.skip_output {
            return Ok(());
        }
        let keys: Vec<&str> = payload
            .as_object()
            .map(|fields| fields.keys().map(String::as_str).collect())
            .unwrap_or_default();
        info!(
            source = self.source,
            seat = ?ctx.seat,
            mode = ?ctx.mode,
            applied = self.applied,
            fields = %keys.join(","),
            "round updated"
        );
        Ok(())
    }
}
