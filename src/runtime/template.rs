/// `{{path.to.value}}` placeholder resolution
///
/// Placeholders that cannot be resolved are left verbatim so a later step (or
/// the executor itself) can decide what an unresolved value means.

use crate::workflow::types::ExecutionContext;
use serde_json::{Map, Value};

/// Render every `{{expr}}` token of a string against the context
pub fn render(template: &str, context: &ExecutionContext) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}").map(|i| open + 2 + i) else {
            break;
        };
        // Innermost opener, so "{{a {{b}}" resolves b
        let start = rest[open..close].rfind("{{").map_or(open, |i| open + i);

        rendered.push_str(&rest[..start]);
        match resolve(rest[start + 2..close].trim(), context) {
            Some(value) => rendered.push_str(&value),
            None => rendered.push_str(&rest[start..close + 2]),
        }
        rest = &rest[close + 2..];
    }

    rendered.push_str(rest);
    rendered
}

/// Template a config value recursively, preserving its structure
///
/// Only strings are rendered. Numbers, booleans and null pass through.
pub fn render_value(value: &Value, context: &ExecutionContext) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, context)).collect()),
        Value::Object(obj) => Value::Object(render_map(obj, context)),
        other => other.clone(),
    }
}

/// Template every field of a config mapping
pub fn render_map(map: &Map<String, Value>, context: &ExecutionContext) -> Map<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), render_value(v, context)))
        .collect()
}

fn resolve(expr: &str, context: &ExecutionContext) -> Option<String> {
    if expr.is_empty() {
        return None;
    }

    match context.lookup_path(expr.split('.').map(str::trim))? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: Value) -> ExecutionContext {
        ExecutionContext::from_payload(value)
    }

    #[test]
    fn test_missing_key_is_left_verbatim() {
        assert_eq!(render("{{missing.key}}", &ctx(json!({}))), "{{missing.key}}");
    }

    #[test]
    fn test_nested_lookup_with_whitespace() {
        let context = ctx(json!({ "user": { "name": "Ada" } }));
        assert_eq!(render("Hello {{ user.name }}!", &context), "Hello Ada!");
    }

    #[test]
    fn test_non_string_values_are_stringified() {
        let context = ctx(json!({ "n": 42, "ok": true, "obj": { "a": 1 }, "list": [1, 2] }));
        assert_eq!(render("{{n}}|{{ok}}", &context), "42|true");
        assert_eq!(render("{{obj}}", &context), r#"{"a":1}"#);
        assert_eq!(render("{{list}}", &context), "[1,2]");
    }

    #[test]
    fn test_null_and_non_traversable_stay_unresolved() {
        let context = ctx(json!({ "gone": null, "name": "Ada" }));
        assert_eq!(render("{{gone}}", &context), "{{gone}}");
        assert_eq!(render("{{name.first}}", &context), "{{name.first}}");
    }

    #[test]
    fn test_partial_templating_mixes_resolved_and_unresolved() {
        let context = ctx(json!({ "a": "x" }));
        assert_eq!(render("{{a}}-{{b}}-{{a}}", &context), "x-{{b}}-x");
    }

    #[test]
    fn test_unterminated_placeholder_is_untouched() {
        let context = ctx(json!({ "a": "x" }));
        assert_eq!(render("{{a}} and {{a", &context), "x and {{a");
    }

    #[test]
    fn test_stray_opener_before_placeholder_is_kept() {
        let context = ctx(json!({ "b": "x" }));
        assert_eq!(render("{{a {{b}}", &context), "{{a x");
        assert_eq!(render("{{a {{missing}} {{b}}", &context), "{{a {{missing}} x");
    }

    #[test]
    fn test_render_is_idempotent_on_resolved_text() {
        let context = ctx(json!({ "a": "x" }));
        let once = render("value={{a}}", &context);
        assert_eq!(render(&once, &context), once);
    }

    #[test]
    fn test_render_value_preserves_structure() {
        let context = ctx(json!({ "to": "ops@example.com", "id": 7 }));
        let config = json!({
            "recipients": ["{{to}}", "static@example.com"],
            "meta": { "ref": "order-{{id}}", "count": 3, "urgent": false, "extra": null }
        });

        assert_eq!(
            render_value(&config, &context),
            json!({
                "recipients": ["ops@example.com", "static@example.com"],
                "meta": { "ref": "order-7", "count": 3, "urgent": false, "extra": null }
            })
        );
    }
}
