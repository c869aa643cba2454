use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One envelope on the wire; serialized as a single JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub src: String,
    pub dest: String,
    pub body: Value,
}

impl Message {
    pub fn new(src: impl Into<String>, dest: impl Into<String>, body: Value) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            body,
        }
    }

    /// The body's `type` tag, or `""` if absent.
    pub fn kind(&self) -> &str {
        self.body.get("type").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn msg_id(&self) -> Option<u64> {
        self.body.get("msg_id").and_then(Value::as_u64)
    }

    pub fn in_reply_to(&self) -> Option<u64> {
        self.body.get("in_reply_to").and_then(Value::as_u64)
    }
}

/// Set a field on an object body. Non-object bodies are wrapped as
/// `{"value": body}` first so correlation fields are never lost.
pub(crate) fn set_field(body: &mut Value, field: &str, value: Value) {
    if !body.is_object() {
        let inner = std::mem::take(body);
        let mut map = Map::new();
        map.insert("value".to_string(), inner);
        *body = Value::Object(map);
    }
    if let Value::Object(map) = body {
        map.insert(field.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_correlation_fields() {
        let msg: Message = serde_json::from_str(
            r#"{"src":"c1","dest":"n1","body":{"type":"send","msg_id":7,"key":"k1","msg":1}}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), "send");
        assert_eq!(msg.msg_id(), Some(7));
        assert_eq!(msg.in_reply_to(), None);
    }

    #[test]
    fn set_field_wraps_scalars() {
        let mut body = json!(3);
        set_field(&mut body, "in_reply_to", json!(1));
        assert_eq!(body, json!({"value": 3, "in_reply_to": 1}));
    }
}
