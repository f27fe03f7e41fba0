//! Phoenix channel frames as spoken by Supabase Realtime (`vsn=1.0.0`, JSON).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const PHOENIX_TOPIC: &str = "phoenix";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_PRESENCE: &str = "presence";
pub const EVENT_PRESENCE_STATE: &str = "presence_state";
pub const EVENT_PRESENCE_DIFF: &str = "presence_diff";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl Frame {
    pub fn new(topic: impl Into<String>, event: &str, payload: Value, reference: String) -> Self {
        Self {
            topic: topic.into(),
            event: event.to_string(),
            payload,
            reference: Some(reference),
            join_ref: None,
        }
    }

    pub fn heartbeat(reference: String) -> Self {
        Self::new(PHOENIX_TOPIC, EVENT_HEARTBEAT, json!({}), reference)
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

pub fn realtime_topic(name: &str) -> String {
    format!("realtime:{name}")
}

/// Join config for the INSERT changefeed of `public.{table}`.
pub fn changes_join_payload(table: &str, access_token: &str) -> Value {
    json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": [
                { "event": "INSERT", "schema": "public", "table": table }
            ],
            "private": false
        },
        "access_token": access_token
    })
}

/// Join config for the presence channel; `key` is how others see us.
pub fn presence_join_payload(key: &str, access_token: &str) -> Value {
    json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": key },
            "postgres_changes": [],
            "private": false
        },
        "access_token": access_token
    })
}

pub fn track_payload(online_at: &str) -> Value {
    json!({
        "type": "presence",
        "event": "track",
        "payload": { "online_at": online_at }
    })
}

pub fn untrack_payload() -> Value {
    json!({ "type": "presence", "event": "untrack" })
}

/// `phx_reply` payload to its response, or the server's reason for refusing.
pub fn parse_reply(payload: &Value) -> Result<Value, String> {
    let status = payload.get("status").and_then(Value::as_str).unwrap_or("");
    let response = payload.get("response").cloned().unwrap_or(Value::Null);
    if status == "ok" {
        Ok(response)
    } else {
        let reason = response
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("status `{status}`: {response}"));
        Err(reason)
    }
}

/// The new row of a `postgres_changes` INSERT, if that is what the payload carries.
pub fn inserted_record(payload: &Value) -> Option<&Value> {
    let data = payload.get("data")?;
    if data.get("type").and_then(Value::as_str) != Some("INSERT") {
        return None;
    }
    data.get("record")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_use_phoenix_field_names() {
        let frame = Frame::heartbeat("7".into());
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"topic": "phoenix", "event": "heartbeat", "payload": {}, "ref": "7"})
        );
    }

    #[test]
    fn server_push_without_ref_decodes() {
        let frame = Frame::decode(
            r#"{"topic":"realtime:online-status","event":"presence_state","payload":{},"ref":null}"#,
        )
        .unwrap();
        assert_eq!(frame.event, EVENT_PRESENCE_STATE);
        assert_eq!(frame.reference, None);
    }

    #[test]
    fn reply_status_is_checked() {
        let ok = json!({"status": "ok", "response": {"postgres_changes": []}});
        assert!(parse_reply(&ok).is_ok());

        let err = json!({"status": "error", "response": {"reason": "unauthorized"}});
        assert_eq!(parse_reply(&err), Err("unauthorized".to_string()));
    }

    #[test]
    fn only_inserts_yield_a_record() {
        let insert = json!({"ids": [1], "data": {"type": "INSERT", "record": {"id": 1}}});
        assert_eq!(inserted_record(&insert), Some(&json!({"id": 1})));

        let update = json!({"data": {"type": "UPDATE", "record": {"id": 1}}});
        assert_eq!(inserted_record(&update), None);
    }
}
