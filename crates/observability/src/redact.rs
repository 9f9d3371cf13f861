//! Redaction of sensitive fields before logging.

use serde_json::Value;

const PLACEHOLDER: &str = "[redacted]";

/// Redact sensitive fields in a context object, recursively.
///
/// Any key containing `token` or `key` (case-insensitive) has its value
/// replaced before the context reaches a log line.
pub fn redact_context(context: &mut Value) {
    match context {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if is_sensitive(key) {
                    *value = Value::String(PLACEHOLDER.to_string());
                } else {
                    redact_context(value);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_context(item);
            }
        }
        _ => {}
    }
}

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.contains("token") || lower.contains("key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_token_and_key_fields() {
        let mut context = json!({
            "dealId": "D-1",
            "apiToken": "secret-1",
            "dialect_key": "secret-2",
            "nested": {"refreshToken": "secret-3", "slot": 5},
        });
        redact_context(&mut context);

        assert_eq!(context["dealId"], "D-1");
        assert_eq!(context["apiToken"], PLACEHOLDER);
        assert_eq!(context["dialect_key"], PLACEHOLDER);
        assert_eq!(context["nested"]["refreshToken"], PLACEHOLDER);
        assert_eq!(context["nested"]["slot"], 5);
    }

    #[test]
    fn redacts_inside_arrays() {
        let mut context = json!([{"key": "a"}, {"plain": "b"}]);
        redact_context(&mut context);
        assert_eq!(context[0]["key"], PLACEHOLDER);
        assert_eq!(context[1]["plain"], "b");
    }

    #[test]
    fn scalars_pass_through() {
        let mut context = json!("hello");
        redact_context(&mut context);
        assert_eq!(context, "hello");
    }
}
