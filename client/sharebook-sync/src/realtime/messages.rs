/// Channel protocol frames exchanged with the realtime service
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::{RawChange, SubscriptionScope};

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const POSTGRES_CHANGES: &str = "postgres_changes";
pub const ACCESS_TOKEN: &str = "access_token";

/// Topic that carries heartbeats
pub const PHOENIX_TOPIC: &str = "phoenix";

/// One frame on the socket
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default, deserialize_with = "optional_ref")]
    pub msg_ref: Option<String>,
    #[serde(
        default,
        deserialize_with = "optional_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub join_ref: Option<String>,
}

/// Refs are strings from this client but some servers echo numbers
fn optional_ref<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// What an inbound frame means to a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Row change on the subscribed topic
    Change(RawChange),
    /// Reply to a frame we sent
    Reply {
        msg_ref: Option<String>,
        ok: bool,
        response: Value,
    },
    /// Channel crashed or was closed by the server
    Closed(String),
    /// Presence, system messages and anything else
    Ignored,
}

impl ChannelMessage {
    /// Join a topic, asking for postgres changes in `scope`
    pub fn join(scope: &SubscriptionScope, access_token: Option<&str>, msg_ref: String) -> Self {
        let mut change = json!({
            "event": "*",
            "schema": "public",
            "table": scope.table(),
        });
        if let Some(filter) = scope.filter() {
            change["filter"] = Value::String(filter);
        }

        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }

        ChannelMessage {
            topic: scope.topic(),
            event: PHX_JOIN.to_string(),
            payload,
            join_ref: Some(msg_ref.clone()),
            msg_ref: Some(msg_ref),
        }
    }

    pub fn leave(topic: &str, msg_ref: String) -> Self {
        ChannelMessage {
            topic: topic.to_string(),
            event: PHX_LEAVE.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref),
            join_ref: None,
        }
    }

    pub fn heartbeat(msg_ref: String) -> Self {
        ChannelMessage {
            topic: PHOENIX_TOPIC.to_string(),
            event: HEARTBEAT.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref),
            join_ref: None,
        }
    }

    /// Hand the channel a refreshed user token
    pub fn access_token(topic: &str, token: &str, msg_ref: String) -> Self {
        ChannelMessage {
            topic: topic.to_string(),
            event: ACCESS_TOKEN.to_string(),
            payload: json!({ "access_token": token }),
            msg_ref: Some(msg_ref),
            join_ref: None,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Classify the frame
    pub fn into_inbound(self) -> Result<Inbound, serde_json::Error> {
        match self.event.as_str() {
            POSTGRES_CHANGES => {
                // Payload is {"data": {...}, "ids": [...]}
                let data = match self.payload {
                    Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
                    _ => Value::Null,
                };
                Ok(Inbound::Change(serde_json::from_value(data)?))
            }
            PHX_REPLY => {
                let ok = self.payload.get("status").and_then(Value::as_str) == Some("ok");
                let response = self
                    .payload
                    .get("response")
                    .cloned()
                    .unwrap_or(Value::Null);
                Ok(Inbound::Reply {
                    msg_ref: self.msg_ref,
                    ok,
                    response,
                })
            }
            PHX_ERROR | PHX_CLOSE => Ok(Inbound::Closed(self.event)),
            _ => Ok(Inbound::Ignored),
        }
    }
}
