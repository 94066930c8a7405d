//! Inline markers the mentor is told to emit: `[[guide:<id>]]` and
//! `[[learning-path: {json}]]`. The JSON payload nests braces, so learning
//! paths are found by brace matching rather than by a regex.
//!
//! The agent reads [`guide_ids`] and [`learning_paths`] out of finished
//! replies for the usage log. [`strip_markers`] is for clients that render
//! the reply prose without the marker syntax.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{ Deserialize, Serialize };

static GUIDE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[guide:([a-z0-9-]+)\]\]").unwrap());

pub const LEARNING_PATH_MARKER: &str = "[[learning-path:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStep {
    #[serde(default)]
    pub step: u32,
    #[serde(default)]
    pub guide_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub why: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPath {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub total_duration: Option<String>,
    pub steps: Vec<LearningStep>,
}

/// Guide ids referenced by `[[guide:<id>]]`, deduplicated in first-seen order.
pub fn guide_ids(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for cap in GUIDE_MARKER.captures_iter(text) {
        let id = &cap[1];
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Byte range of the balanced `{...}` object starting at the first `{` at or
/// after `from`. `None` when there is no `{` or the object never closes.
fn balanced_object(text: &str, from: usize) -> Option<(usize, usize)> {
    let start = from + text[from..].find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => {
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Every well-formed learning path in `text`. Payloads that fail to parse,
/// or lack a title or steps, are skipped.
pub fn learning_paths(text: &str) -> Vec<LearningPath> {
    let mut paths = Vec::new();
    let mut search_from = 0;
    while let Some(found) = text[search_from..].find(LEARNING_PATH_MARKER) {
        let json_from = search_from + found + LEARNING_PATH_MARKER.len();
        let Some((start, end)) = balanced_object(text, json_from) else {
            break;
        };
        if let Ok(path) = serde_json::from_str::<LearningPath>(&text[start..end]) {
            if !path.title.is_empty() {
                paths.push(path);
            }
        }
        search_from = end;
    }
    paths
}

/// Removes guide markers and learning-path blocks. An unterminated block
/// (still streaming) is cut to the end of the text.
pub fn strip_markers(text: &str) -> String {
    let mut result = GUIDE_MARKER.replace_all(text, "").into_owned();
    while let Some(idx) = result.find(LEARNING_PATH_MARKER) {
        let Some((_, brace_end)) = balanced_object(&result, idx) else {
            result.truncate(idx);
            break;
        };
        let end = result[brace_end..]
            .find("]]")
            .map(|i| brace_end + i + 2)
            .unwrap_or(brace_end);
        result.replace_range(idx..end, "");
    }
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str =
        r#"[[learning-path:
{"title": "쇼핑몰 (초급)", "totalDuration": "약 3시간", "steps": [{"step": 1, "guideId": "cards", "title": "카드", "description": "상품 카드", "duration": "20분", "difficulty": "beginner", "keyTopics": ["카드", "{이미지}"], "why": "기본 단위"}]}
]]"#;

    #[test]
    fn guide_ids_first_seen_order() {
        let text = "[[guide:forms]] x [[guide:cards]] [[guide:forms]] [[guide:UPPER]] [[guide:]]";
        assert_eq!(guide_ids(text), vec!["forms", "cards"]);
    }

    #[test]
    fn parses_nested_learning_path() {
        let text = format!("설명입니다.\n{}\n{}", PATH, PATH.replace("초급", "중급"));
        let paths = learning_paths(&text);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].title, "쇼핑몰 (초급)");
        assert_eq!(paths[1].title, "쇼핑몰 (중급)");
        let step = &paths[0].steps[0];
        assert_eq!(step.guide_id, "cards");
        assert_eq!(step.difficulty, Some(Difficulty::Beginner));
        assert_eq!(step.key_topics, vec!["카드", "{이미지}"]);
        assert_eq!(paths[0].total_duration.as_deref(), Some("약 3시간"));
    }

    #[test]
    fn invalid_payloads_are_skipped() {
        let text = r#"[[learning-path: {"title": broken}]] [[learning-path: {"steps": []}]] [[learning-path: {"title": "ok", "steps": []}]]"#;
        let paths = learning_paths(text);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].title, "ok");
    }

    #[test]
    fn steps_without_guide_id_are_kept() {
        let paths = learning_paths(r#"[[learning-path: {"title": "p", "steps": [{"step": 1, "title": "x"}]}]]"#);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].steps[0].title, "x");
        assert_eq!(paths[0].steps[0].guide_id, "");
    }

    #[test]
    fn unterminated_payload_stops_scan() {
        assert!(learning_paths(r#"[[learning-path: {"title": "a", "steps": ["#).is_empty());
        assert!(learning_paths("[[learning-path: no json here").is_empty());
    }

    #[test]
    fn strip_removes_all_markers() {
        let text = format!("카드 [[guide:cards]]를 보세요.\n{}", PATH);
        assert_eq!(strip_markers(&text), "카드 를 보세요.");
    }

    #[test]
    fn strip_cuts_streaming_block() {
        let text = r#"먼저 읽어보세요. [[learning-path: {"title": "a", "steps": [{"#;
        assert_eq!(strip_markers(text), "먼저 읽어보세요.");
    }
}
