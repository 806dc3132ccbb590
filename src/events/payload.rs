//! Inbound payload shapes
//!
//! Servers are not strict about payloads, so every shape here is read field
//! by field: each field takes the first usable key from its list of names,
//! scalars of the wrong type are stringified, and anything unreadable is left
//! at its default without disturbing the other fields.

use serde_json::{Map, Value};

/// A chat message delivered by the server
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub kind: String,
    pub sender: String,
    pub content: String,
    /// Group, guild or room the message was addressed to
    pub room: Option<String>,
    pub timestamp: Option<String>,
}

impl ChatMessage {
    pub fn from_payload(payload: &Value) -> Self {
        match payload {
            Value::String(text) => Self {
                content: text.clone(),
                ..Default::default()
            },
            Value::Object(map) => Self {
                id: field(map, &["id"]).unwrap_or_default(),
                kind: field(map, &["type"]).unwrap_or_default(),
                sender: field(map, &["sender", "username", "from"]).unwrap_or_default(),
                content: field(map, &["content", "message", "text"]).unwrap_or_default(),
                room: field(map, &["room", "groupId", "guildId", "roomId"]),
                timestamp: field(map, &["timestamp"]),
            },
            _ => Self::default(),
        }
    }

    /// Scope shown in brackets: the addressed room, else the message type
    pub fn scope(&self) -> &str {
        match self.room.as_deref() {
            Some(room) if !room.is_empty() => room,
            _ => &self.kind,
        }
    }

    pub fn sender_or_unknown(&self) -> &str {
        if self.sender.is_empty() {
            "unknown"
        } else {
            &self.sender
        }
    }
}

/// A user referenced by presence and username events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub avatar: Option<String>,
}

impl UserInfo {
    pub fn from_payload(payload: &Value) -> Self {
        match payload {
            Value::String(name) => Self {
                username: name.clone(),
                ..Default::default()
            },
            Value::Object(map) => Self {
                id: field(map, &["id", "userId"]).unwrap_or_default(),
                username: field(map, &["username", "name"]).unwrap_or_default(),
                avatar: field(map, &["avatar"]),
            },
            _ => Self::default(),
        }
    }
}

/// A group or guild room
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub created_at: Option<String>,
    pub members: Vec<String>,
}

impl RoomInfo {
    pub fn from_payload(payload: &Value) -> Self {
        match payload {
            Value::String(id) => Self {
                id: id.clone(),
                ..Default::default()
            },
            Value::Object(map) => Self {
                id: field(map, &["id", "roomId"]).unwrap_or_default(),
                name: field(map, &["name"]).unwrap_or_default(),
                kind: field(map, &["type"]).unwrap_or_default(),
                created_at: field(map, &["created_at", "createdAt"]),
                members: match map.get("members") {
                    Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
                    _ => Vec::new(),
                },
            },
            _ => Self::default(),
        }
    }

    /// Identifier used for membership tracking
    pub fn key(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }

    /// Parse a room listing: a bare array or `{"rooms": [...]}`
    pub fn list_from_payload(payload: &Value) -> Vec<Self> {
        let items = match payload {
            Value::Array(items) => items.as_slice(),
            Value::Object(map) => match map.get("rooms") {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            },
            _ => &[],
        };
        items.iter().map(Self::from_payload).collect()
    }
}

/// Human-readable text carried by a free-form payload
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Object(map) => ["message", "reason", "error", "warning", "suggestion", "username"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string()),
        other => other.to_string(),
    }
}

/// First key in `names` holding a non-empty scalar
fn field(map: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| map.get(*name))
        .filter_map(scalar_text)
        .find(|text| !text.is_empty())
}

/// Strings as-is, numbers and booleans stringified; members listed as
/// objects contribute their username or id
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => field(map, &["username", "name", "id"]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_from_object() {
        let msg = ChatMessage::from_payload(&json!({
            "id": "m1",
            "type": "global",
            "sender": "bob",
            "content": "hi",
        }));
        assert_eq!(msg.sender, "bob");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.scope(), "global");
    }

    #[test]
    fn test_message_aliases_and_room() {
        let msg = ChatMessage::from_payload(&json!({
            "username": "carol",
            "message": "yo",
            "groupId": "g-9",
        }));
        assert_eq!(msg.sender, "carol");
        assert_eq!(msg.content, "yo");
        assert_eq!(msg.scope(), "g-9");
    }

    #[test]
    fn test_message_from_string() {
        let msg = ChatMessage::from_payload(&json!("plain"));
        assert_eq!(msg.content, "plain");
        assert_eq!(msg.sender_or_unknown(), "unknown");
    }

    #[test]
    fn test_numeric_timestamp_keeps_other_fields() {
        let msg = ChatMessage::from_payload(&json!({
            "sender": "bob",
            "content": "hi all",
            "timestamp": 1700000000,
        }));
        assert_eq!(msg.sender, "bob");
        assert_eq!(msg.content, "hi all");
        assert_eq!(msg.timestamp.as_deref(), Some("1700000000"));
    }

    #[test]
    fn test_field_and_alias_both_present() {
        let msg = ChatMessage::from_payload(&json!({
            "sender": "bob",
            "username": "bobby",
            "content": "team",
            "groupId": "g1",
            "roomId": "r1",
        }));
        assert_eq!(msg.sender, "bob");
        assert_eq!(msg.content, "team");
        assert_eq!(msg.scope(), "g1");

        // An empty primary key falls through to the next name
        let msg = ChatMessage::from_payload(&json!({"sender": "", "from": "dave", "text": "x"}));
        assert_eq!(msg.sender, "dave");
    }

    #[test]
    fn test_room_with_numeric_created_at() {
        let room = RoomInfo::from_payload(&json!({
            "id": "g1",
            "roomId": "ignored",
            "name": "Rust",
            "created_at": 1700000000,
            "members": ["a", {"username": "b"}, 7, null],
        }));
        assert_eq!(room.key(), "g1");
        assert_eq!(room.name, "Rust");
        assert_eq!(room.created_at.as_deref(), Some("1700000000"));
        assert_eq!(room.members, vec!["a", "b", "7"]);
    }

    #[test]
    fn test_unusable_fields_default_individually() {
        let msg = ChatMessage::from_payload(&json!({"sender": "bob", "content": {"nested": true}}));
        assert_eq!(msg.sender, "bob");
        assert_eq!(msg.content, "");
        assert_eq!(ChatMessage::from_payload(&json!(42)), ChatMessage::default());
    }

    #[test]
    fn test_room_list_shapes() {
        let rooms = RoomInfo::list_from_payload(&json!([
            {"id": "r1", "name": "Rustaceans", "type": "group", "members": ["a", "b"]},
            "r2",
        ]));
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].members.len(), 2);
        assert_eq!(rooms[1].key(), "r2");

        let wrapped = RoomInfo::list_from_payload(&json!({"rooms": [{"name": "lobby"}]}));
        assert_eq!(wrapped[0].key(), "lobby");

        assert!(RoomInfo::list_from_payload(&json!(null)).is_empty());
    }

    #[test]
    fn test_payload_text() {
        assert_eq!(payload_text(&json!("slow down")), "slow down");
        assert_eq!(payload_text(&json!({"reason": "bad token"})), "bad token");
        assert_eq!(payload_text(&json!(null)), "");
        assert_eq!(payload_text(&json!(7)), "7");
    }
}
