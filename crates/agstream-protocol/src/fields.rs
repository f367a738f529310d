//! Lenient field access for wire documents.
//!
//! Every lookup takes a list of accepted keys (camelCase first, then legacy
//! snake_case aliases). Missing or mistyped fields yield empty values.

use serde_json::Value;

/// First string value found under any of `keys`, or an empty string.
pub(crate) fn string(doc: &Value, keys: &[&str]) -> String {
    opt_string(doc, keys).unwrap_or_default()
}

/// First string value found under any of `keys`.
pub(crate) fn opt_string(doc: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| doc.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

/// First non-null value found under any of `keys`, or `Value::Null`.
pub(crate) fn value(doc: &Value, keys: &[&str]) -> Value {
    keys.iter()
        .find_map(|key| doc.get(key).filter(|v| !v.is_null()))
        .cloned()
        .unwrap_or(Value::Null)
}

/// First array found under any of `keys`.
pub(crate) fn array<'a>(doc: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|key| doc.get(key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_prefers_first_key() {
        let doc = json!({"messageId": "a", "message_id": "b"});
        assert_eq!(string(&doc, &["messageId", "message_id"]), "a");
        assert_eq!(string(&doc, &["message_id", "messageId"]), "b");
    }

    #[test]
    fn test_mistyped_fields_default() {
        let doc = json!({"delta": 42, "items": "nope", "nothing": null});
        assert_eq!(string(&doc, &["delta"]), "");
        assert!(array(&doc, &["items"]).is_empty());
        assert!(value(&doc, &["nothing"]).is_null());
    }

    #[test]
    fn test_falls_back_to_alias() {
        let doc = json!({"tool_call_id": "tc1"});
        assert_eq!(
            opt_string(&doc, &["toolCallId", "tool_call_id"]),
            Some("tc1".to_string())
        );
    }
}
