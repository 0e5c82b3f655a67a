use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

use crate::script::Value;

/// Content type of the always-present plain-text display entry.
pub const TEXT_PLAIN: &str = "text/plain";
/// Content type produced by [`JsonDisplayHook`].
pub const APPLICATION_JSON: &str = "application/json";
/// Suffix appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// One rendering of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayItem {
    /// MIME-like content type
    pub content_type: String,
    /// Rendered content
    pub value: String,
}

/// Renderer that may produce a richer representation than plain text.
pub trait DisplayHook {
    /// Render `value`, or return `None` to defer to later hooks.
    fn render(&self, value: &Value) -> Option<DisplayItem>;
}

/// Renders plain data (lists and dicts) as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDisplayHook;

impl DisplayHook for JsonDisplayHook {
    fn render(&self, value: &Value) -> Option<DisplayItem> {
        if !matches!(value, Value::List(_) | Value::Dict(_)) {
            return None;
        }
        let json = value.to_json()?;
        Some(DisplayItem {
            content_type: APPLICATION_JSON.to_string(),
            value: json.to_string(),
        })
    }
}

/// Full, untruncated description of a captured value.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    /// Binding or member name, for named captures
    pub name: Option<String>,
    /// Developer representation
    pub result: String,
    /// Developer representation, as shown in value columns
    pub value: String,
    /// Type name
    pub type_name: String,
    /// User-facing text
    pub str: String,
    /// Renderings, richest first; plain text is always last
    pub display: Vec<DisplayItem>,
}

impl DisplayInfo {
    /// Describe `value`, consulting `hooks` in order.
    ///
    /// The first hook that renders the value is prepended to the plain-text
    /// entry.
    pub fn describe(value: &Value, name: Option<&str>, hooks: &[Box<dyn DisplayHook>]) -> Self {
        let repr = value.repr();
        let text = value.to_str();
        let mut display = Vec::with_capacity(2);
        if let Some(rich) = hooks
            .iter()
            .filter_map(|hook| hook.render(value))
            .find(|item| !item.value.is_empty())
        {
            display.push(rich);
        }
        display.push(DisplayItem {
            content_type: TEXT_PLAIN.to_string(),
            value: text.clone(),
        });
        Self {
            name: name.map(str::to_string),
            result: repr.clone(),
            value: repr,
            type_name: value.type_name().to_string(),
            str: text,
            display,
        }
    }

    /// Wire descriptor for this value under `handle`.
    ///
    /// `str` is only reported when it differs from `value`. `result`, `value`
    /// and `str` are truncated to `projection.max_length`; `type` and the
    /// display entries are reported whole.
    pub fn project(&self, handle: i64, projection: &Projection) -> JsonValue {
        let max = projection.max_length;
        let mut out = Map::new();
        if let Some(name) = &self.name {
            out.insert("name".into(), json!(name));
        }
        if projection.with_result {
            out.insert("result".into(), json!(truncate(&self.result, max)));
        }
        if projection.with_value {
            out.insert("value".into(), json!(truncate(&self.value, max)));
            if self.str != self.value {
                out.insert("str".into(), json!(truncate(&self.str, max)));
            }
        }
        out.insert("type".into(), json!(self.type_name));
        if projection.with_display {
            out.insert("display".into(), json!(self.display));
        }
        out.insert("variablesReference".into(), json!(handle));
        JsonValue::Object(out)
    }
}

/// Which descriptor fields to report, and how long textual fields may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    /// Include `value` (and `str` when it differs)
    pub with_value: bool,
    /// Include `result`
    pub with_result: bool,
    /// Include `display`
    pub with_display: bool,
    /// Truncation length; `3` or less disables truncation
    pub max_length: usize,
}

impl Projection {
    /// Every field, as evaluate and launch report them.
    pub fn full(max_length: usize) -> Self {
        Self {
            with_value: true,
            with_result: true,
            with_display: true,
            max_length,
        }
    }

    /// Value and type only, as variable listings report them.
    pub fn values(max_length: usize) -> Self {
        Self {
            with_value: true,
            with_result: false,
            with_display: false,
            max_length,
        }
    }
}

/// Cut `text` to `max` characters, ending in [`ELLIPSIS`], when `max > 3`
/// and the text is longer.
pub fn truncate(text: &str, max: usize) -> String {
    if max <= ELLIPSIS.len() || text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Never;

    impl DisplayHook for Never {
        fn render(&self, _value: &Value) -> Option<DisplayItem> {
            None
        }
    }

    #[test]
    fn plain_text_is_always_the_fallback() {
        let info = DisplayInfo::describe(&Value::from("hi"), None, &[]);
        assert_eq!(info.value, "'hi'");
        assert_eq!(info.str, "hi");
        assert_eq!(
            info.display,
            vec![DisplayItem {
                content_type: TEXT_PLAIN.into(),
                value: "hi".into()
            }]
        );
    }

    #[test]
    fn first_rendering_hook_wins_and_is_prepended() {
        let hooks: Vec<Box<dyn DisplayHook>> = vec![Box::new(Never), Box::new(JsonDisplayHook)];
        let list = Value::list(vec![Value::Int(1), Value::from("a")]);
        let info = DisplayInfo::describe(&list, Some("xs"), &hooks);
        assert_eq!(info.display.len(), 2);
        assert_eq!(info.display[0].content_type, APPLICATION_JSON);
        assert_eq!(info.display[0].value, "[1,\"a\"]");
        assert_eq!(info.display[1].content_type, TEXT_PLAIN);
        assert_eq!(info.name.as_deref(), Some("xs"));
    }

    #[test]
    fn str_is_omitted_when_equal_to_value() {
        let info = DisplayInfo::describe(&Value::Int(2), None, &[]);
        let body = info.project(7, &Projection::full(0));
        assert_eq!(body["value"], "2");
        assert_eq!(body["type"], "int");
        assert!(body.get("str").is_none());
        assert_eq!(body["variablesReference"], 7);

        let info = DisplayInfo::describe(&Value::from("x"), None, &[]);
        let body = info.project(7, &Projection::full(0));
        assert_eq!(body["str"], "x");
    }

    #[test]
    fn projection_drops_unrequested_fields() {
        let info = DisplayInfo::describe(&Value::Int(2), None, &[]);
        let body = info.project(1, &Projection::values(0));
        assert!(body.get("result").is_none());
        assert!(body.get("display").is_none());
        assert_eq!(body["value"], "2");
    }

    #[test]
    fn truncation_keeps_total_length() {
        assert_eq!(truncate("abcdefgh", 5), "ab...");
        assert_eq!(truncate("abcde", 5), "abcde");
        assert_eq!(truncate("abcdefgh", 3), "abcdefgh");
        assert_eq!(truncate("abcdefgh", 0), "abcdefgh");
        assert_eq!(truncate("ééééééé", 4), "é...");
    }

    #[test]
    fn truncation_leaves_type_and_display_whole() {
        let hooks: Vec<Box<dyn DisplayHook>> = vec![Box::new(JsonDisplayHook)];
        let list = Value::list(vec![Value::Int(100), Value::Int(200)]);
        let body = DisplayInfo::describe(&list, None, &hooks).project(1, &Projection::full(5));
        assert_eq!(body["value"], "[1...");
        assert_eq!(body["result"], "[1...");
        assert_eq!(body["type"], "list");
        let rich = body["display"][0]["value"].as_str().unwrap();
        assert_eq!(serde_json::from_str::<JsonValue>(rich).unwrap(), json!([100, 200]));
        assert_eq!(body["display"][1]["value"], "[100, 200]");
    }

    proptest! {
        #[test]
        fn truncated_text_never_exceeds_limit(text in ".{0,64}", max in 4usize..32) {
            let out = truncate(&text, max);
            let len = out.chars().count();
            prop_assert!(len <= max);
            if text.chars().count() > max {
                prop_assert_eq!(len, max);
                prop_assert!(out.ends_with(ELLIPSIS));
            } else {
                prop_assert_eq!(out, text);
            }
        }
    }
}
