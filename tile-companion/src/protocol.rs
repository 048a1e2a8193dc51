use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::events::{
    AccountId, MajsoulEvent, NavigationCommand, NavigationRequest, RecordAction, RecordBaseInfo,
    Seat,
};

// Most payloads set none of these and are plain state deltas. The client
// sends explicit nulls for unset fields, which read as empty here.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MajsoulMessage {
    #[serde(deserialize_with = "null_as_default")]
    friends: Vec<Value>,
    #[serde(deserialize_with = "null_as_default")]
    record_list: Vec<RecordBaseInfo>,
    shared_record_base_info: Option<RecordBaseInfo>,
    #[serde(deserialize_with = "null_as_default")]
    current_record_uuid: String,
    account_id: Option<AccountId>,
    #[serde(deserialize_with = "null_as_default")]
    record_actions: Vec<RecordAction>,
    record_click_action: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    record_click_action_index: i64,
    #[serde(deserialize_with = "null_as_default")]
    fast_record_to: i64,
    live_head: Option<Value>,
    live_fast_action: Option<RecordAction>,
    live_action: Option<RecordAction>,
    change_seat_to: Option<Seat>,
    #[serde(deserialize_with = "null_as_default")]
    sync_game_actions: Vec<RecordAction>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

type Rule = fn(&mut MajsoulMessage) -> Option<MajsoulEvent>;

const CLASSIFICATION_RULES: [(&str, Rule); 11] = [
    ("friends", friend_list),
    ("record_list", record_catalog),
    ("shared_record_base_info", shared_record_pointer),
    ("current_record_uuid", begin_viewing_record),
    ("record_actions", record_action_batch),
    ("record_click_action", replay_navigation),
    ("live_head", begin_live_spectate),
    ("live_fast_action", live_fast_action),
    ("live_action", live_action),
    ("change_seat_to", seat_change),
    ("sync_game_actions", sync_action_batch),
];

fn friend_list(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    (!msg.friends.is_empty()).then(|| MajsoulEvent::FriendList(std::mem::take(&mut msg.friends)))
}

fn record_catalog(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    (!msg.record_list.is_empty())
        .then(|| MajsoulEvent::RecordCatalog(std::mem::take(&mut msg.record_list)))
}

fn shared_record_pointer(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    msg.shared_record_base_info
        .take()
        .map(MajsoulEvent::SharedRecordPointer)
}

fn begin_viewing_record(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    (!msg.current_record_uuid.is_empty()).then(|| MajsoulEvent::BeginViewingRecord {
        identity: std::mem::take(&mut msg.current_record_uuid),
        account: msg.account_id,
    })
}

fn record_action_batch(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    (!msg.record_actions.is_empty())
        .then(|| MajsoulEvent::RecordActionBatch(std::mem::take(&mut msg.record_actions)))
}

fn replay_navigation(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    let tag = msg.record_click_action.take()?;
    Some(MajsoulEvent::ReplayNavigation(NavigationRequest {
        command: NavigationCommand::parse(&tag),
        index: msg.record_click_action_index,
        fast_to: msg.fast_record_to,
    }))
}

fn begin_live_spectate(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    msg.live_head.take().map(MajsoulEvent::BeginLiveSpectate)
}

fn live_fast_action(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    msg.live_fast_action
        .take()
        .map(|action| MajsoulEvent::LiveAction { action, fast: true })
}

fn live_action(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    msg.live_action
        .take()
        .map(|action| MajsoulEvent::LiveAction {
            action,
            fast: false,
        })
}

fn seat_change(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    msg.change_seat_to.map(MajsoulEvent::SeatChange)
}

fn sync_action_batch(msg: &mut MajsoulMessage) -> Option<MajsoulEvent> {
    (!msg.sync_game_actions.is_empty())
        .then(|| MajsoulEvent::SyncActionBatch(std::mem::take(&mut msg.sync_game_actions)))
}

pub fn parse_majsoul_payload(raw: &[u8]) -> Result<MajsoulEvent> {
    let value = decode_object(raw)?;
    let mut message =
        MajsoulMessage::deserialize(&value).context("payload fields have unexpected shapes")?;
    for (field, rule) in CLASSIFICATION_RULES {
        if let Some(event) = rule(&mut message) {
            debug!(field, kind = event.kind(), "classified payload");
            return Ok(event);
        }
    }
    Ok(MajsoulEvent::OpaqueStateDelta(value))
}

pub fn parse_tenhou_payload(raw: &[u8]) -> Result<Value> {
    decode_object(raw)
}

fn decode_object(raw: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(raw).context("payload is not valid json")?;
    if !value.is_object() {
        bail!("payload is not a json object");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_majsoul_payload, parse_tenhou_payload};
    use crate::events::{MajsoulEvent, NavigationCommand};

    fn parse(value: serde_json::Value) -> MajsoulEvent {
        parse_majsoul_payload(value.to_string().as_bytes()).expect("payload should parse")
    }

    #[test]
    fn record_catalog_wins_over_friend_list() {
        let event = parse(json!({
            "friends": [{"account_id": 5}],
            "record_list": [{"uuid": "R1"}]
        }));
        match event {
            MajsoulEvent::RecordCatalog(records) => assert_eq!(records[0].uuid, "R1"),
            other => panic!("expected record catalog, got {other:?}"),
        }
    }

    #[test]
    fn empty_lists_fall_through_to_later_rules() {
        let event = parse(json!({
            "friends": [],
            "record_list": [],
            "current_record_uuid": "R9",
            "account_id": 42
        }));
        assert_eq!(
            event,
            MajsoulEvent::BeginViewingRecord {
                identity: "R9".to_owned(),
                account: Some(42),
            }
        );
    }

    #[test]
    fn null_fields_read_as_unset() {
        let event = parse(json!({
            "friends": null,
            "record_list": null,
            "record_actions": null,
            "current_record_uuid": "R1",
            "account_id": 42
        }));
        assert_eq!(
            event,
            MajsoulEvent::BeginViewingRecord {
                identity: "R1".to_owned(),
                account: Some(42),
            }
        );

        let event = parse(json!({
            "current_record_uuid": null,
            "record_click_action": "nextRound",
            "record_click_action_index": null,
            "fast_record_to": null,
            "sync_game_actions": null
        }));
        match event {
            MajsoulEvent::ReplayNavigation(request) => {
                assert_eq!(request.command, NavigationCommand::NextRound);
                assert_eq!(request.index, 0);
                assert_eq!(request.fast_to, 0);
            }
            other => panic!("expected navigation, got {other:?}"),
        }
    }

    #[test]
    fn shared_pointer_precedes_current_record() {
        let event = parse(json!({
            "shared_record_base_info": {"uuid": "S1"},
            "current_record_uuid": "R1"
        }));
        assert!(matches!(event, MajsoulEvent::SharedRecordPointer(info) if info.uuid == "S1"));
    }

    #[test]
    fn navigation_carries_index_and_target() {
        let event = parse(json!({
            "record_click_action": "jumpXun",
            "record_click_action_index": 3,
            "fast_record_to": 17
        }));
        match event {
            MajsoulEvent::ReplayNavigation(request) => {
                assert_eq!(request.command, NavigationCommand::JumpXun);
                assert_eq!(request.index, 3);
                assert_eq!(request.fast_to, 17);
            }
            other => panic!("expected navigation, got {other:?}"),
        }
    }

    #[test]
    fn fast_live_action_precedes_plain_live_action() {
        let event = parse(json!({
            "live_fast_action": {"name": "RecordDealTile", "action": {"tile": "1m"}},
            "live_action": {"name": "RecordDiscardTile", "action": {}}
        }));
        match event {
            MajsoulEvent::LiveAction { action, fast } => {
                assert!(fast);
                assert_eq!(action.name, "RecordDealTile");
            }
            other => panic!("expected live action, got {other:?}"),
        }
    }

    #[test]
    fn seat_zero_is_still_a_seat_change() {
        assert_eq!(parse(json!({"change_seat_to": 0})), MajsoulEvent::SeatChange(0));
    }

    #[test]
    fn null_live_head_is_not_a_spectate_event() {
        let event = parse(json!({"live_head": null, "tile": "5p"}));
        assert!(matches!(event, MajsoulEvent::OpaqueStateDelta(_)));
    }

    #[test]
    fn unmatched_payload_is_an_opaque_delta() {
        let payload = json!({"tile": "3s", "seat": 1, "moqie": false});
        assert_eq!(parse(payload.clone()), MajsoulEvent::OpaqueStateDelta(payload));
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(parse_majsoul_payload(b"{not json").is_err());
        assert!(parse_majsoul_payload(b"[1,2,3]").is_err());
        assert!(parse_majsoul_payload(br#"{"friends": "nope"}"#).is_err());
        assert!(parse_tenhou_payload(b"\"tag\"").is_err());
        assert!(parse_tenhou_payload(br#"{"tag":"INIT"}"#).is_ok());
    }
}
