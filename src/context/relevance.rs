//! Keyword relevance between the recent conversation and the guide catalog.
//!
//! Scoring is plain substring containment over lowercased text: a guide gets
//! a flat bonus when one of the semantic trigger phrases mapped to it appears,
//! plus one point per distinct keyword of its own (id, title, tags,
//! description words) found in the recent text. The ranked list is split into
//! a detailed tier, a light tier and, when little matched, the rest of the
//! catalog so the model can still recommend from it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{ Deserialize, Serialize };
use std::collections::{ HashMap, HashSet };

use crate::models::chat::{ extract_text, UiMessage };
use crate::models::guide::{ GuideCatalog, GuideDocument };

static DESCRIPTION_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s,./()]+").unwrap());
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static MD_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[.*?\]\(.*?\)").unwrap());
static MD_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(.*?\)").unwrap());
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

pub const DETAILED_HEADER: &str =
    "## 관련 가이드 상세 (답변 시 이 내용을 적극 활용하세요. 사용자 맥락에 맞는 가이드를 골라 [[guide:id]]로 추천하고, 반드시 학습경로도 함께 제시하세요)";
pub const LIGHT_HEADER: &str = "## 추가 관련 가이드 (필요 시 추천)";
pub const FALLBACK_HEADER: &str =
    "## 전체 가이드 목록 (위에 없는 가이드도 사용자 맥락에 맞으면 적극 추천하세요)";
const NO_EXAMPLE: &str = "없음";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RelevanceSettings {
    /// How many trailing messages feed the recent text.
    pub recent_window: usize,
    pub semantic_weight: u32,
    pub keyword_weight: u32,
    /// Size of the detailed tier.
    pub top_n: usize,
    pub body_excerpt_chars: usize,
    /// Below this many matches the unmatched catalog is listed too.
    pub fallback_threshold: usize,
    pub min_keyword_chars: usize,
}

impl Default for RelevanceSettings {
    fn default() -> Self {
        Self {
            recent_window: 12,
            semantic_weight: 5,
            keyword_weight: 1,
            top_n: 15,
            body_excerpt_chars: 500,
            fallback_threshold: 5,
            min_keyword_chars: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredMatch<'a> {
    pub document: &'a GuideDocument,
    pub score: u32,
}

/// Ranked guides for one request. `matched` only holds positive scores, in
/// descending score order with catalog order kept among equal scores.
#[derive(Debug, Clone)]
pub struct GuideTiers<'a> {
    pub matched: Vec<ScoredMatch<'a>>,
    pub unmatched: Vec<&'a GuideDocument>,
    top_n: usize,
}

impl<'a> GuideTiers<'a> {
    fn split_at(&self) -> usize {
        self.top_n.min(self.matched.len())
    }

    pub fn top(&self) -> &[ScoredMatch<'a>] {
        &self.matched[..self.split_at()]
    }

    pub fn rest(&self) -> &[ScoredMatch<'a>] {
        &self.matched[self.split_at()..]
    }

    pub fn score_of(&self, id: &str) -> u32 {
        self.matched
            .iter()
            .find(|m| m.document.id == id)
            .map(|m| m.score)
            .unwrap_or(0)
    }
}

/// Lowercased text of the last `window` messages joined by single spaces.
pub fn recent_text(messages: &[UiMessage], window: usize) -> String {
    let start = messages.len().saturating_sub(window);
    messages[start..]
        .iter()
        .map(extract_text)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Guide ids whose trigger phrase occurs in `recent`.
pub fn semantic_ids<'m>(
    recent: &str,
    semantic_map: &'m HashMap<String, Vec<String>>
) -> HashSet<&'m str> {
    semantic_map
        .iter()
        .filter(|(keyword, _)| {
            let keyword = keyword.to_lowercase();
            !keyword.is_empty() && recent.contains(&keyword)
        })
        .flat_map(|(_, ids)| ids.iter().map(|id| id.as_str()))
        .collect()
}

/// Distinct lowercase keywords a guide is matched on, in first-seen order.
pub fn guide_keywords(document: &GuideDocument, min_chars: usize) -> Vec<String> {
    let description = document.description.to_lowercase();
    let words = DESCRIPTION_SPLIT.split(&description)
        .filter(|w| w.chars().count() >= min_chars)
        .map(str::to_string);

    let mut seen = HashSet::new();
    std::iter
        ::once(document.id.to_lowercase())
        .chain(std::iter::once(document.title.to_lowercase()))
        .chain(document.tags.iter().map(|t| t.to_lowercase()))
        .chain(words)
        .filter(|kw| !kw.is_empty())
        .filter(|kw| seen.insert(kw.clone()))
        .collect()
}

pub fn score_document(
    document: &GuideDocument,
    recent: &str,
    semantic: &HashSet<&str>,
    settings: &RelevanceSettings
) -> u32 {
    let mut score = 0;
    if semantic.contains(document.id.as_str()) {
        score += settings.semantic_weight;
    }
    let hits = guide_keywords(document, settings.min_keyword_chars)
        .iter()
        .filter(|kw| recent.contains(kw.as_str()))
        .count() as u32;
    score + hits * settings.keyword_weight
}

pub fn score_guides<'a>(
    messages: &[UiMessage],
    catalog: &'a GuideCatalog,
    semantic_map: &HashMap<String, Vec<String>>,
    settings: &RelevanceSettings
) -> GuideTiers<'a> {
    let recent = recent_text(messages, settings.recent_window);
    let semantic = semantic_ids(&recent, semantic_map);

    let mut matched: Vec<ScoredMatch<'a>> = catalog
        .documents()
        .map(|document| ScoredMatch {
            document,
            score: score_document(document, &recent, &semantic, settings),
        })
        .filter(|m| m.score > 0)
        .collect();
    // sort_by is stable, equal scores keep catalog order
    matched.sort_by(|a, b| b.score.cmp(&a.score));

    let matched_ids: HashSet<&str> = matched
        .iter()
        .map(|m| m.document.id.as_str())
        .collect();
    let unmatched = catalog
        .documents()
        .filter(|d| !matched_ids.contains(d.id.as_str()))
        .collect();

    GuideTiers { matched, unmatched, top_n: settings.top_n }
}

/// Prompt-sized excerpt of a guide body: code blocks and images dropped,
/// links reduced to their text, blank runs collapsed, cut at `max_chars`.
pub fn summarize_content(content: &str, max_chars: usize) -> String {
    let text = CODE_FENCE.replace_all(content, "");
    let text = MD_IMAGE.replace_all(&text, "");
    let text = MD_LINK.replace_all(&text, "$1");
    let mut text = BLANK_RUN.replace_all(&text, "\n\n").into_owned();
    if text.chars().count() > max_chars {
        text = text.chars().take(max_chars).collect::<String>();
        text.push_str("...");
    }
    text.trim().to_string()
}

fn render_detailed(m: &ScoredMatch<'_>, settings: &RelevanceSettings) -> String {
    let doc = m.document;
    let example = doc.example
        .as_deref()
        .filter(|e| !e.is_empty())
        .unwrap_or(NO_EXAMPLE);
    let tags = doc.tags.iter().take(3).map(String::as_str).collect::<Vec<_>>().join(", ");
    format!(
        "### [{}] (id: {})\n설명: {}\n핵심 내용:\n{}\n프롬프트 예시: {}\n활용 상황: 사용자가 {} 관련 이야기를 할 때 추천",
        doc.title,
        doc.id,
        doc.description,
        summarize_content(&doc.body, settings.body_excerpt_chars),
        example,
        tags
    )
}

fn render_line(doc: &GuideDocument) -> String {
    format!("- **{}** (id: {}): {}", doc.title, doc.id, doc.description)
}

pub fn render_guide_context(tiers: &GuideTiers<'_>, settings: &RelevanceSettings) -> String {
    let mut result = String::new();

    if !tiers.top().is_empty() {
        result.push_str("\n\n");
        result.push_str(DETAILED_HEADER);
        result.push('\n');
        result.push_str(
            &tiers
                .top()
                .iter()
                .map(|m| render_detailed(m, settings))
                .collect::<Vec<_>>()
                .join("\n\n")
        );
    }

    if !tiers.rest().is_empty() {
        result.push_str("\n\n");
        result.push_str(LIGHT_HEADER);
        result.push('\n');
        result.push_str(
            &tiers
                .rest()
                .iter()
                .map(|m| render_line(m.document))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    if tiers.matched.len() < settings.fallback_threshold && !tiers.unmatched.is_empty() {
        result.push_str("\n\n");
        result.push_str(FALLBACK_HEADER);
        result.push('\n');
        result.push_str(
            &tiers.unmatched
                .iter()
                .map(|d| render_line(d))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    result
}

/// Scores the catalog against the recent conversation and renders the
/// prompt block in one go.
pub fn relevant_guide_context(
    messages: &[UiMessage],
    catalog: &GuideCatalog,
    semantic_map: &HashMap<String, Vec<String>>,
    settings: &RelevanceSettings
) -> String {
    let tiers = score_guides(messages, catalog, semantic_map, settings);
    render_guide_context(&tiers, settings)
}
