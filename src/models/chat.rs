use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One element of a modern, multi-part message. `text` is `None` for parts
/// that carry no string text (tool calls, files, step markers).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagePart {
    pub kind: String,
    pub text: Option<String>,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self { kind: "text".to_string(), text: Some(text.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    Parts(Vec<MessagePart>),
    Legacy(String),
    Empty,
}

/// A single conversational turn as the chat UI stores it.
///
/// Both stored shapes are accepted: the legacy `content` string and the
/// `parts` sequence. They are folded into [`MessageBody`] on the way in so
/// nothing downstream has to look at the raw JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredMessage", into = "StoredMessage")]
pub struct UiMessage {
    pub id: Option<String>,
    pub role: Role,
    pub body: MessageBody,
}

impl UiMessage {
    pub fn legacy(role: Role, content: impl Into<String>) -> Self {
        Self { id: None, role, body: MessageBody::Legacy(content.into()) }
    }

    pub fn with_parts(role: Role, parts: Vec<MessagePart>) -> Self {
        Self { id: None, role, body: MessageBody::Parts(parts) }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Returns the plain text of a message regardless of its stored shape.
pub fn extract_text(message: &UiMessage) -> String {
    match &message.body {
        MessageBody::Parts(parts) if !parts.is_empty() =>
            parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect(),
        MessageBody::Legacy(content) => content.clone(),
        _ => String::new(),
    }
}

#[derive(Serialize, Deserialize)]
struct StoredPart {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<JsonValue>,
}

#[derive(Serialize, Deserialize)]
struct StoredMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parts: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<JsonValue>,
}

fn parts_from_json(value: JsonValue) -> Vec<MessagePart> {
    let JsonValue::Array(items) = value else {
        return Vec::new();
    };
    items
        .into_iter()
        .map(|item| match serde_json::from_value::<StoredPart>(item) {
            Ok(p) =>
                MessagePart {
                    kind: p.kind,
                    text: match p.text {
                        Some(JsonValue::String(s)) => Some(s),
                        _ => None,
                    },
                },
            // still a part; it just has no text
            Err(_) => MessagePart { kind: String::new(), text: None },
        })
        .collect()
}

impl From<StoredMessage> for UiMessage {
    fn from(stored: StoredMessage) -> Self {
        let parts = stored.parts.map(parts_from_json).unwrap_or_default();
        let body = if !parts.is_empty() {
            MessageBody::Parts(parts)
        } else {
            match stored.content {
                Some(JsonValue::String(s)) => MessageBody::Legacy(s),
                _ => MessageBody::Empty,
            }
        };
        UiMessage { id: stored.id, role: stored.role, body }
    }
}

impl From<UiMessage> for StoredMessage {
    fn from(message: UiMessage) -> Self {
        let (parts, content) = match message.body {
            MessageBody::Parts(parts) => {
                let parts = parts
                    .into_iter()
                    .map(|p| StoredPart { kind: p.kind, text: p.text.map(JsonValue::String) })
                    .collect::<Vec<_>>();
                (serde_json::to_value(parts).ok(), None)
            }
            MessageBody::Legacy(s) => (None, Some(JsonValue::String(s))),
            MessageBody::Empty => (None, None),
        };
        StoredMessage { id: message.id, role: message.role, parts, content }
    }
}

/// A turn in the shape the model provider expects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl From<&UiMessage> for ChatTurn {
    fn from(message: &UiMessage) -> Self {
        Self { role: message.role.as_str().to_string(), content: extract_text(message) }
    }
}
