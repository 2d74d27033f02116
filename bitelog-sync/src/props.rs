//! Typed decoding of Notion property bags
//!
//! A page carries a heterogeneous `properties` map whose entries differ in
//! shape per property type (title, rich text, select, multi-select, url,
//! number, date, files). Every accessor here returns an explicit default
//! when the property is missing or shaped unexpectedly; decoding never
//! fails and never panics.
//!
//! The `*_prop` builders produce the partial property values accepted by
//! the page update endpoint.

use chrono::NaiveDate;
use serde_json::{json, Map, Value};

/// Declared type of an existing property (`"select"`, `"rich_text"`, ...)
pub fn declared_type<'a>(props: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    props.get(name)?.get("type")?.as_str()
}

/// Concatenated plain text of a title property
pub fn title_text(props: &Map<String, Value>, name: &str) -> String {
    props
        .get(name)
        .and_then(|p| p.get("title"))
        .map(concat_plain_text)
        .unwrap_or_default()
}

/// Concatenated plain text of a rich text property
pub fn rich_text_text(props: &Map<String, Value>, name: &str) -> String {
    props
        .get(name)
        .and_then(|p| p.get("rich_text"))
        .map(concat_plain_text)
        .unwrap_or_default()
}

/// Name of the selected option, empty when unset
pub fn select_name(props: &Map<String, Value>, name: &str) -> String {
    props
        .get(name)
        .and_then(|p| p.get("select"))
        .and_then(|s| s.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Option names of a multi-select property, in display order
pub fn multi_select_names(props: &Map<String, Value>, name: &str) -> Vec<String> {
    props
        .get(name)
        .and_then(|p| p.get("multi_select"))
        .and_then(Value::as_array)
        .map(|options| {
            options
                .iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Value of a url property, empty when unset
pub fn url_value(props: &Map<String, Value>, name: &str) -> String {
    props
        .get(name)
        .and_then(|p| p.get("url"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Value of a number property
pub fn number_value(props: &Map<String, Value>, name: &str) -> Option<f64> {
    props
        .get(name)
        .and_then(|p| p.get("number"))
        .and_then(Value::as_f64)
}

/// Start date of a date property (any time-of-day component is dropped)
pub fn date_start(props: &Map<String, Value>, name: &str) -> Option<NaiveDate> {
    let start = props
        .get(name)
        .and_then(|p| p.get("date"))
        .and_then(|d| d.get("start"))
        .and_then(Value::as_str)?;
    NaiveDate::parse_from_str(start.get(..10)?, "%Y-%m-%d").ok()
}

/// URL of the first attachment of a files property.
///
/// Source-hosted attachments (`"type": "file"`) carry an expiring URL;
/// `"external"` attachments a caller-provided one. Both are accepted.
pub fn file_url(props: &Map<String, Value>, name: &str) -> String {
    let first = props
        .get(name)
        .and_then(|p| p.get("files"))
        .and_then(Value::as_array)
        .and_then(|files| files.first());

    let Some(file) = first else {
        return String::new();
    };

    let url = match file.get("type").and_then(Value::as_str) {
        Some("file") => file.get("file").and_then(|f| f.get("url")),
        Some("external") => file.get("external").and_then(|e| e.get("url")),
        _ => None,
    };
    url.and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Partial value for a url property
pub fn url_prop(url: &str) -> Value {
    json!({ "url": url })
}

/// Partial value for a number property
pub fn number_prop(value: f64) -> Value {
    json!({ "number": value })
}

/// Partial value for a rich text property
pub fn rich_text_prop(text: &str) -> Value {
    json!({ "rich_text": [{ "type": "text", "text": { "content": text } }] })
}

/// Partial value for a select property
pub fn select_prop(name: &str) -> Value {
    json!({ "select": { "name": name } })
}

fn concat_plain_text(items: &Value) -> String {
    items
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|t| t.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}
