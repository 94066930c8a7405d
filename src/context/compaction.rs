//! Folds the older part of a long conversation into one summary message.

use serde::{ Deserialize, Serialize };

use crate::context::markers::guide_ids;
use crate::models::chat::{ extract_text, MessagePart, Role, UiMessage };

pub const SUMMARY_MESSAGE_ID: &str = "context-summary";
const SUMMARY_HEADER: &str = "[이전 대화 요약]";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CompactionSettings {
    pub keep_recent: usize,
    pub project_info_chars: usize,
    pub decided_item_chars: usize,
    pub max_decided_items: usize,
    /// Phrases that mark a message as a project outline.
    pub project_markers: Vec<String>,
    /// Phrases that mark a message as confirming a decision.
    pub decision_markers: Vec<String>,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            keep_recent: 14,
            project_info_chars: 600,
            decided_item_chars: 200,
            max_decided_items: 5,
            project_markers: ["서비스명", "핵심 기능", "MVP", "타겟"]
                .into_iter()
                .map(String::from)
                .collect(),
            decision_markers: ["확정", "정했", "맞나요", "좋아요"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// What survives of the dropped prefix of a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationSummary {
    pub project_info: Option<String>,
    pub decided_items: Vec<String>,
    pub recommended_guide_ids: Vec<String>,
    pub summarized_count: usize,
    max_decided_items: usize,
}

fn take_chars(text: &str, n: usize) -> String {
    text.chars().take(n).collect()
}

fn contains_any(text: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| !m.is_empty() && text.contains(m.as_str()))
}

pub fn summarize_older(older: &[UiMessage], settings: &CompactionSettings) -> ConversationSummary {
    let mut summary = ConversationSummary {
        summarized_count: older.len(),
        max_decided_items: settings.max_decided_items,
        ..Default::default()
    };

    for message in older {
        let text = extract_text(message);
        if text.is_empty() {
            continue;
        }
        if contains_any(&text, &settings.project_markers) {
            summary.project_info = Some(take_chars(&text, settings.project_info_chars));
        }
        if contains_any(&text, &settings.decision_markers) {
            summary.decided_items.push(take_chars(&text, settings.decided_item_chars));
        }
        for id in guide_ids(&text) {
            if !summary.recommended_guide_ids.contains(&id) {
                summary.recommended_guide_ids.push(id);
            }
        }
    }

    summary
}

impl ConversationSummary {
    /// The most recent decided items, at most `max_decided_items` of them.
    pub fn recent_decisions(&self) -> &[String] {
        let start = self.decided_items.len().saturating_sub(self.max_decided_items);
        &self.decided_items[start..]
    }

    pub fn render(&self) -> String {
        let mut out = format!("{}\n", SUMMARY_HEADER);
        if let Some(info) = self.project_info.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&format!("프로젝트 정보:\n{}\n\n", info));
        }
        let decisions = self.recent_decisions();
        if !decisions.is_empty() {
            out.push_str(&format!("확정된 사항:\n{}\n\n", decisions.join("\n")));
        }
        if !self.recommended_guide_ids.is_empty() {
            out.push_str(&format!("이미 추천한 가이드: {}\n", self.recommended_guide_ids.join(", ")));
        }
        out.push_str(&format!("(이전 {}개 메시지 요약됨)", self.summarized_count));
        out
    }

    pub fn into_message(self) -> UiMessage {
        UiMessage::with_parts(Role::User, vec![MessagePart::text(self.render())]).with_id(
            SUMMARY_MESSAGE_ID
        )
    }
}

/// Keeps the last `keep_recent` messages and replaces everything before
/// them with a single summary message. Short histories come back untouched.
pub fn compact(messages: Vec<UiMessage>, settings: &CompactionSettings) -> Vec<UiMessage> {
    if messages.len() <= settings.keep_recent {
        return messages;
    }
    let split = messages.len() - settings.keep_recent;
    let mut older = messages;
    let recent = older.split_off(split);

    let mut out = Vec::with_capacity(recent.len() + 1);
    out.push(summarize_older(&older, settings).into_message());
    out.extend(recent);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> UiMessage {
        UiMessage::legacy(Role::User, text)
    }

    fn assistant(text: &str) -> UiMessage {
        UiMessage::with_parts(Role::Assistant, vec![MessagePart::text(text)])
    }

    fn history(n: usize) -> Vec<UiMessage> {
        (0..n).map(|i| user(&format!("message {}", i))).collect()
    }

    #[test]
    fn short_history_is_returned_unchanged() {
        let settings = CompactionSettings::default();
        for n in [0, 1, 13, 14] {
            let messages = history(n);
            assert_eq!(compact(messages.clone(), &settings), messages);
        }
    }

    #[test]
    fn long_history_gets_a_leading_summary() {
        let messages = history(20);
        let out = compact(messages.clone(), &CompactionSettings::default());
        assert_eq!(out.len(), 15);
        assert_eq!(out[0].id.as_deref(), Some(SUMMARY_MESSAGE_ID));
        assert_eq!(out[0].role, Role::User);
        assert_eq!(&out[1..], &messages[6..20]);
        assert_eq!(extract_text(&out[0]), "[이전 대화 요약]\n(이전 6개 메시지 요약됨)");
    }

    #[test]
    fn guide_markers_are_deduplicated() {
        let mut messages = vec![
            assistant("카드는 [[guide:cards]] 참고, 폼은 [[guide:forms]]"),
            assistant("다시 [[guide:cards]] 그리고 [[guide:Bad_Id]]"),
            user("[[guide:forms]] 봤어요")
        ];
        messages.extend(history(14));
        let out = compact(messages, &CompactionSettings::default());
        let text = extract_text(&out[0]);
        let line = text
            .lines()
            .find(|l| l.starts_with("이미 추천한 가이드: "))
            .unwrap();
        assert_eq!(line, "이미 추천한 가이드: cards, forms");
        assert_eq!(line.matches("cards").count(), 1);
        assert_eq!(line.matches("forms").count(), 1);
    }

    #[test]
    fn project_info_is_last_match_wins() {
        let older = vec![
            user("서비스명: 첫번째"),
            user("잡담"),
            user(&format!("핵심 기능은 {}", "가".repeat(700)))
        ];
        let summary = summarize_older(&older, &CompactionSettings::default());
        let info = summary.project_info.unwrap();
        assert!(info.starts_with("핵심 기능은"));
        assert_eq!(info.chars().count(), 600);
    }

    #[test]
    fn only_last_five_decisions_are_rendered() {
        let older: Vec<_> = (0..7).map(|i| user(&format!("결정 {} 확정", i))).collect();
        let summary = summarize_older(&older, &CompactionSettings::default());
        assert_eq!(summary.decided_items.len(), 7);
        assert_eq!(summary.recent_decisions().len(), 5);

        let rendered = summary.render();
        assert!(rendered.contains("확정된 사항:\n결정 2 확정\n결정 3 확정"));
        assert!(!rendered.contains("결정 1 확정"));
        assert!(rendered.ends_with("결정 6 확정\n\n(이전 7개 메시지 요약됨)"));
    }

    #[test]
    fn decided_items_are_truncated() {
        let older = vec![user(&format!("좋아요 {}", "x".repeat(300)))];
        let summary = summarize_older(&older, &CompactionSettings::default());
        assert_eq!(summary.decided_items[0].chars().count(), 200);
    }

    #[test]
    fn render_section_order() {
        let older = vec![
            user("MVP 정리: 동네 장터"),
            assistant("이렇게 정했어요 [[guide:cards]]"),
            UiMessage::with_parts(Role::User, vec![])
        ];
        let rendered = summarize_older(&older, &CompactionSettings::default()).render();
        assert_eq!(
            rendered,
            "[이전 대화 요약]\n프로젝트 정보:\nMVP 정리: 동네 장터\n\n확정된 사항:\n이렇게 정했어요 [[guide:cards]]\n\n이미 추천한 가이드: cards\n(이전 3개 메시지 요약됨)"
        );
    }
}
