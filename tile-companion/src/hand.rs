use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{bail, Result};
use serde::Deserialize;
use tracing::{debug, info};

const MAX_HAND_TILES: usize = 14;
const MAX_COPIES: u8 = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct HandRequest {
    #[serde(default)]
    pub reset: bool,
    pub tiles: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandReport {
    pub tile_count: usize,
    pub normalized: String,
}

pub trait HandAnalyzer: Send + Sync {
    fn analyze(&self, reset: bool, tiles: &str) -> Result<HandReport>;
}

#[derive(Debug, Default)]
pub struct NotationHandAnalyzer;

impl HandAnalyzer for NotationHandAnalyzer {
    fn analyze(&self, reset: bool, tiles: &str) -> Result<HandReport> {
        let report = parse_tiles(tiles)?;
        info!(reset, tiles = report.tile_count, hand = %report.normalized, "hand analysed");
        Ok(report)
    }
}

fn parse_tiles(input: &str) -> Result<HandReport> {
    // 10 ranks (red five included) for each of m/p/s, 7 honours.
    let mut copies = [[0u8; 10]; 4];
    let mut groups: Vec<String> = Vec::new();
    let mut pending = String::new();
    let mut tile_count = 0;

    for ch in input.chars().filter(|ch| !ch.is_whitespace()) {
        if ch.is_ascii_digit() {
            pending.push(ch);
            continue;
        }
        let suit = match ch {
            'm' => 0,
            'p' => 1,
            's' => 2,
            'z' => 3,
            other => bail!("unexpected character {other:?} in tiles"),
        };
        if pending.is_empty() {
            bail!("suit {ch:?} has no ranks before it");
        }
        for digit in pending.bytes() {
            let rank = usize::from(digit - b'0');
            if suit == 3 && !(1..=7).contains(&rank) {
                bail!("honour rank {rank} is out of range");
            }
            copies[suit][rank] += 1;
            let same_tile = if rank == 0 || rank == 5 {
                copies[suit][0] + copies[suit][5]
            } else {
                copies[suit][rank]
            };
            if same_tile > MAX_COPIES {
                bail!("more than {MAX_COPIES} copies of {rank}{ch}");
            }
            tile_count += 1;
        }
        groups.push(format!("{}{ch}", std::mem::take(&mut pending)));
    }

    if !pending.is_empty() {
        bail!("ranks {pending} have no suit");
    }
    if tile_count == 0 || tile_count > MAX_HAND_TILES {
        bail!("hand has {tile_count} tiles, expected 1 to {MAX_HAND_TILES}");
    }
    Ok(HandReport {
        tile_count,
        normalized: groups.join(" "),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdHocOutcome {
    Done(HandReport),
    Busy,
    Rejected(String),
}

pub struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct AdHocAnalysis {
    analyzer: Arc<dyn HandAnalyzer>,
    busy: AtomicBool,
}

impl AdHocAnalysis {
    pub fn new(analyzer: Arc<dyn HandAnalyzer>) -> Self {
        Self {
            analyzer,
            busy: AtomicBool::new(false),
        }
    }

    pub fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: &self.busy })
    }

    pub fn submit(&self, body: &[u8]) -> AdHocOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!("ad hoc analysis already running; rejecting request");
            return AdHocOutcome::Busy;
        };
        let request: HandRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(err) => return AdHocOutcome::Rejected(format!("invalid request body: {err}")),
        };
        match self.analyzer.analyze(request.reset, &request.tiles) {
            Ok(report) => AdHocOutcome::Done(report),
            Err(err) => AdHocOutcome::Rejected(format!("{err:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{parse_tiles, AdHocAnalysis, AdHocOutcome, NotationHandAnalyzer};

    fn ad_hoc() -> AdHocAnalysis {
        AdHocAnalysis::new(Arc::new(NotationHandAnalyzer))
    }

    #[test]
    fn parses_compact_notation() {
        let report = parse_tiles("123m 406p789s 11z").expect("valid hand");
        assert_eq!(report.tile_count, 11);
        assert_eq!(report.normalized, "123m 406p 789s 11z");
    }

    #[test]
    fn rejects_bad_notation() {
        for input in ["", "123", "12x", "m", "8z", "55550m", "111122223333445m"] {
            assert!(parse_tiles(input).is_err(), "{input:?} should be rejected");
        }
    }

    #[test]
    fn submit_maps_outcomes() {
        let analysis = ad_hoc();
        assert!(matches!(
            analysis.submit(br#"{"reset": true, "tiles": "123m"}"#),
            AdHocOutcome::Done(report) if report.tile_count == 3
        ));
        assert!(matches!(analysis.submit(b"nope"), AdHocOutcome::Rejected(_)));
        assert!(matches!(
            analysis.submit(br#"{"tiles": "9q"}"#),
            AdHocOutcome::Rejected(_)
        ));
    }

    #[test]
    fn concurrent_request_is_turned_away() {
        let analysis = ad_hoc();
        let guard = analysis.try_begin().expect("first request enters");
        assert_eq!(
            analysis.submit(br#"{"tiles": "123m"}"#),
            AdHocOutcome::Busy
        );
        drop(guard);
        assert!(matches!(
            analysis.submit(br#"{"tiles": "123m"}"#),
            AdHocOutcome::Done(_)
        ));
    }
}
