use serde_json::{Map, Value};

/// Replaces `{{dotted.path}}` placeholders with values from `ctx`. Unknown
/// paths render as an empty string; an unclosed `{{` is kept verbatim.
pub(crate) fn render(template: &str, ctx: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        let Some(open) = rest.find("{{") else {
            out.push_str(rest);
            return out;
        };
        let Some(close) = rest[open + 2..].find("}}") else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..open]);
        let path = rest[open + 2..open + 2 + close].trim();
        out.push_str(&lookup_ctx(path, ctx).unwrap_or_default());
        rest = &rest[open + 2 + close + 2..];
    }
}

/// Templates every string inside a JSON value, leaving other scalars alone.
pub(crate) fn render_value(value: &Value, ctx: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, ctx)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

pub(crate) fn lookup_ctx(path: &str, ctx: &Value) -> Option<String> {
    lookup_path(path, ctx).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Sequential property lookup. A missing segment yields `None` ("undefined");
/// an explicit JSON `null` yields `Some(Value::Null)`.
pub(crate) fn lookup_path<'a>(path: &str, ctx: &'a Value) -> Option<&'a Value> {
    let mut cur = ctx;
    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }
        cur = match cur {
            Value::Object(map) => map.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// First path in `paths` that resolves to a non-null string or number.
pub(crate) fn first_string(paths: &[&str], ctx: &Value) -> Option<String> {
    paths.iter().find_map(|p| match lookup_path(p, ctx)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_nested_paths_and_blanks_missing() {
        let ctx = json!({"task": {"title": "Pour slab", "hours": 6}, "tags": ["a", "b"]});
        assert_eq!(
            render("{{ task.title }} ({{task.hours}}h) {{tags.1}} {{nope.x}}!", &ctx),
            "Pour slab (6h) b !"
        );
        assert_eq!(render("unterminated {{task.title", &ctx), "unterminated {{task.title");
    }

    #[test]
    fn lookup_distinguishes_null_from_missing() {
        let ctx = json!({"task": {"assignedToId": null}});
        assert_eq!(lookup_path("task.assignedToId", &ctx), Some(&Value::Null));
        assert_eq!(lookup_path("task.missing", &ctx), None);
        assert_eq!(lookup_path("task.assignedToId.deeper", &ctx), None);
    }

    #[test]
    fn render_value_walks_objects() {
        let ctx = json!({"p": {"name": "Tower"}});
        let out = render_value(&json!({"title": "{{p.name}} kickoff", "n": 3}), &ctx);
        assert_eq!(out, json!({"title": "Tower kickoff", "n": 3}));
    }

    #[test]
    fn first_string_skips_nulls() {
        let ctx = json!({"a": null, "b": "user-7"});
        assert_eq!(first_string(&["a", "b"], &ctx).as_deref(), Some("user-7"));
        assert_eq!(first_string(&["a", "c"], &ctx), None);
    }
}
