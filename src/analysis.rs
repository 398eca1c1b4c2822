use std::sync::LazyLock;
use std::time::SystemTime;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?si)```(?:json)?\s*(.*?)```").expect("fenced-block regex"));
static BULLET_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n|\u{2022}|-\s").expect("bullet-split regex"));

/// The four provider-reply fields, coalesced to canonical names and shapes.
/// `foods` and `exercises` are always vectors after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisFields {
    pub summary: Option<String>,
    pub foods: Vec<String>,
    pub exercises: Vec<String>,
    pub disclaimer: Option<String>,
}

impl AnalysisFields {
    pub fn into_result(self, user_notes: Option<String>) -> AnalysisResult {
        AnalysisResult {
            summary: self.summary,
            foods: self.foods,
            exercises: self.exercises,
            disclaimer: self.disclaimer,
            generated_at: SystemTime::now(),
            user_notes: user_notes.filter(|notes| !notes.trim().is_empty()),
        }
    }
}

/// Normalized reply for one analysis call. Immutable once constructed;
/// replaced wholesale on each new request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub summary: Option<String>,
    pub foods: Vec<String>,
    pub exercises: Vec<String>,
    pub disclaimer: Option<String>,
    pub generated_at: SystemTime,
    pub user_notes: Option<String>,
}

fn aliased<'a>(value: &'a Value, primary: &str, secondary: &str) -> Option<&'a Value> {
    [primary, secondary]
        .iter()
        .find_map(|key| value.get(key).filter(|v| !v.is_null()))
}

fn string_field(value: &Value, primary: &str, secondary: &str) -> Option<String> {
    aliased(value, primary, secondary)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Coerces a field into a list: arrays keep order and drop blank entries;
/// a single bullet-delimited string is split into discrete items with
/// leading markers stripped; anything else is empty.
pub fn coerce_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|item| !item.trim().is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(text)) => BULLET_SPLIT
            .split(text)
            .map(|piece| piece.trim().trim_start_matches(['-', '\u{2022}']).trim())
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Coerces an already-parsed provider object into canonical fields.
pub fn normalize_analysis(value: &Value) -> AnalysisFields {
    AnalysisFields {
        summary: string_field(value, "summary", "overview"),
        foods: coerce_list(aliased(value, "foods", "recommended_foods")),
        exercises: coerce_list(aliased(value, "exercises", "recommended_exercises")),
        disclaimer: string_field(value, "disclaimer", "note"),
    }
}

fn has_analysis_fields(value: &Value) -> bool {
    const KEYS: &[&str] = &[
        "summary",
        "overview",
        "foods",
        "recommended_foods",
        "exercises",
        "recommended_exercises",
        "disclaimer",
        "note",
    ];
    KEYS.iter().any(|key| match value.get(key) {
        Some(Value::Null) | None => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    })
}

fn parse_object(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate.trim())
        .ok()
        .filter(Value::is_object)
}

/// Locates a JSON object inside free text: the content of a fenced code
/// block if one exists, otherwise the text itself; exact parse first, then
/// the span from the first `{` to the last `}`.
pub fn extract_json_from_text(text: &str) -> Option<Value> {
    let candidate = FENCED_BLOCK
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    if let Some(value) = parse_object(candidate) {
        return Some(value);
    }

    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_object(&candidate[start..=end])
}

/// Normalizes raw reply text: embedded JSON when one can be located,
/// otherwise the fence-stripped remainder becomes the summary.
pub fn analysis_from_text(raw: &str) -> AnalysisFields {
    if let Some(parsed) = extract_json_from_text(raw) {
        return normalize_analysis(&parsed);
    }

    let plain = FENCED_BLOCK.replace_all(raw, "").trim().to_string();
    AnalysisFields {
        summary: (!plain.is_empty()).then_some(plain),
        ..AnalysisFields::default()
    }
}

/// Full normalization chain for an arbitrary provider payload: structured
/// fields first, then JSON embedded in a text field, then plain text.
pub fn analysis_from_payload(payload: &Value) -> AnalysisFields {
    if has_analysis_fields(payload) {
        return normalize_analysis(payload);
    }

    let raw = payload
        .as_str()
        .or_else(|| {
            ["text", "result", "raw"]
                .iter()
                .find_map(|key| payload.get(key).and_then(Value::as_str))
        })
        .unwrap_or_default();

    analysis_from_text(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aliases_coalesce_to_canonical_names() {
        let fields = normalize_analysis(&json!({
            "overview": "looks fine",
            "recommended_foods": ["rice", "fish"],
            "recommended_exercises": "walk\nswim",
            "note": "see a doctor"
        }));
        assert_eq!(fields.summary.as_deref(), Some("looks fine"));
        assert_eq!(fields.foods, vec!["rice", "fish"]);
        assert_eq!(fields.exercises, vec!["walk", "swim"]);
        assert_eq!(fields.disclaimer.as_deref(), Some("see a doctor"));
    }

    #[test]
    fn bullet_strings_split_with_markers_stripped() {
        let fields = normalize_analysis(&json!({ "foods": "a\n-b\n\u{2022} c" }));
        assert_eq!(fields.foods, vec!["a", "b", "c"]);
    }

    #[test]
    fn blank_list_entries_dropped_order_kept() {
        let fields = normalize_analysis(&json!({ "exercises": ["run", "", "  ", "swim"] }));
        assert_eq!(fields.exercises, vec!["run", "swim"]);
    }

    #[test]
    fn absent_fields_become_empty_lists_and_nulls() {
        let fields = normalize_analysis(&json!({}));
        assert_eq!(fields, AnalysisFields::default());

        let fields = normalize_analysis(&json!({ "foods": 42 }));
        assert!(fields.foods.is_empty());
    }

    #[test]
    fn normalization_is_idempotent() {
        let fields = normalize_analysis(&json!({
            "summary": "s",
            "foods": "a\n-b",
            "exercises": [],
            "disclaimer": null
        }));
        let reparsed = serde_json::to_value(&fields).unwrap();
        assert_eq!(normalize_analysis(&reparsed), fields);
    }

    #[test]
    fn fenced_json_block_round_trips() {
        let raw = "Here you go:\n```json\n{\"summary\":\"s\",\"foods\":[\"a\",\"b\"],\"exercises\":[],\"disclaimer\":null}\n```\nthanks";
        let fields = analysis_from_text(raw);
        assert_eq!(fields.summary.as_deref(), Some("s"));
        assert_eq!(fields.foods, vec!["a", "b"]);
        assert!(fields.exercises.is_empty());
        assert_eq!(fields.disclaimer, None);
    }

    #[test]
    fn brace_span_recovered_from_noisy_text() {
        let raw = "The model says {\"summary\":\"ok\",\"foods\":[\"x\"]} and nothing else";
        let fields = analysis_from_text(raw);
        assert_eq!(fields.summary.as_deref(), Some("ok"));
        assert_eq!(fields.foods, vec!["x"]);
    }

    #[test]
    fn plain_text_fallback_strips_fences() {
        let raw = "```\nnot json at all\n```\nDrink more water.";
        let fields = analysis_from_text(raw);
        assert_eq!(fields.summary.as_deref(), Some("Drink more water."));
        assert!(fields.foods.is_empty());
        assert!(fields.exercises.is_empty());
        assert_eq!(fields.disclaimer, None);
    }

    #[test]
    fn empty_text_yields_empty_fields() {
        assert_eq!(analysis_from_text(""), AnalysisFields::default());
    }

    #[test]
    fn payload_chain_prefers_structured_fields() {
        let fields = analysis_from_payload(&json!({
            "summary": "direct",
            "raw": "{\"summary\":\"embedded\"}"
        }));
        assert_eq!(fields.summary.as_deref(), Some("direct"));
    }

    #[test]
    fn payload_chain_falls_back_to_raw_text() {
        let fields = analysis_from_payload(&json!({
            "raw": "```json\n{\"summary\":\"embedded\",\"foods\":\"a\\n-b\"}\n```"
        }));
        assert_eq!(fields.summary.as_deref(), Some("embedded"));
        assert_eq!(fields.foods, vec!["a", "b"]);
    }

    #[test]
    fn non_object_json_does_not_count_as_structured() {
        assert!(extract_json_from_text("42").is_none());
        assert!(extract_json_from_text("[1, 2]").is_none());
    }

    #[test]
    fn user_notes_blank_becomes_none() {
        let result = AnalysisFields::default().into_result(Some("   ".to_string()));
        assert_eq!(result.user_notes, None);

        let result = AnalysisFields::default().into_result(Some("goal: lose weight".to_string()));
        assert_eq!(result.user_notes.as_deref(), Some("goal: lose weight"));
    }
}
