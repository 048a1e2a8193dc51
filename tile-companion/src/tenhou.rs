use tracing::warn;

use crate::{
    protocol::parse_tenhou_payload,
    state::{RoundDataState, RoundModel},
    workers::PayloadHandler,
};

pub struct TenhouSession {
    state: RoundDataState,
}

impl TenhouSession {
    pub fn new(model: Box<dyn RoundModel>) -> Self {
        let mut state = RoundDataState::new(model);
        state.begin_live();
        Self { state }
    }
}

#[cfg(test)]
impl TenhouSession {
    pub fn state(&self) -> &RoundDataState {
        &self.state
    }
}

impl PayloadHandler for TenhouSession {
    fn source(&self) -> &'static str {
        "tenhou"
    }

    fn handle_payload(&mut self, raw: &[u8]) {
        match parse_tenhou_payload(raw) {
            Ok(payload) => self.state.apply(&payload),
            Err(err) => warn!(?err, len = raw.len(), "dropped malformed tenhou payload"),
        }
    }
}
