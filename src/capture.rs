//! Rule-based capture of memorable statements.
//!
//! Classification is a pure function of the text: global excludes, a length
//! gate, then the first matching `(trigger, exclude, category)` rule in order.
//! User rules from config run before the built-in ones.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::CaptureConfig;
use crate::embedding::EmbeddingProvider;
use crate::store::IndexStore;

/// Long text is reduced to its trigger sentences above this many chars.
const EXTRACT_THRESHOLD: usize = 200;
const MAX_SENTENCES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Preference,
    Decision,
    Entity,
    Fact,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Preference => "preference",
            Category::Decision => "decision",
            Category::Entity => "entity",
            Category::Fact => "fact",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "preference" => Ok(Category::Preference),
            "decision" => Ok(Category::Decision),
            "entity" => Ok(Category::Entity),
            "fact" => Ok(Category::Fact),
            "other" => Ok(Category::Other),
            other => Err(anyhow!(
                "unknown capture category: {other}. Expected preference, decision, entity, fact or other"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capture {
    pub category: Category,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CaptureRule {
    trigger: Regex,
    exclude: Option<Regex>,
    category: Category,
}

impl CaptureRule {
    pub fn new(trigger: &str, exclude: Option<&str>, category: Category) -> Result<Self> {
        Ok(Self {
            trigger: Regex::new(trigger)
                .with_context(|| format!("invalid capture trigger: {trigger}"))?,
            exclude: exclude
                .map(|p| Regex::new(p).with_context(|| format!("invalid capture exclude: {p}")))
                .transpose()?,
            category,
        })
    }

    fn matches(&self, text: &str) -> bool {
        self.trigger.is_match(text) && !self.exclude.as_ref().is_some_and(|e| e.is_match(text))
    }
}

const BUILTIN_RULES: &[(&str, Category)] = &[
    (r"我喜欢|我偏好|我习惯|我倾向|我不喜欢|我讨厌", Category::Preference),
    (r"(?i)\bi (like|prefer|hate|love|want|need)\b", Category::Preference),
    (r"我们决定|我决定|我选择|我们选择|我们使用|我们采用", Category::Decision),
    (r"(?i)\b(we|i) decided\b|\blet's use\b|\bwe'll use\b", Category::Decision),
    (r"\+?\d{10,}", Category::Entity),
    (r"[\w.-]+@[\w.-]+\.\w+", Category::Entity),
    (r"(?i)我的名字|我叫|\bcall me\b|\bmy name\b", Category::Entity),
    (r"(?i)我(在|从事|负责|开发|做)|\bi (work|develop|build)\b", Category::Fact),
    (r"(?i)我(的|是|住)|\bmy \S.* is\b", Category::Fact),
    (r"(?i)记住|记下|别忘|\bremember\b", Category::Other),
    (r"(?i)项目|任务|\bproject\b|\btask\b", Category::Other),
    (
        r"(?i)重要|关键|必须|一定|\balways\b|\bnever\b|\bimportant\b|\bmust\b|\bcrucial\b",
        Category::Other,
    ),
];

const GLOBAL_EXCLUDES: &[&str] = &[
    r"<[^>]+>",
    r"(?s)^```.*```$",
    r"(?i)<relevant-memories>",
    r"[\x{1F300}-\x{1F9FF}]{3,}",
    r"^[\d\s\-+.,]+$",
    r"^[\W\s]+$",
];

#[derive(Debug, Clone)]
pub struct CaptureRules {
    rules: Vec<CaptureRule>,
    excludes: Vec<Regex>,
    sentence: Regex,
    min_length: usize,
    max_length: usize,
}

impl CaptureRules {
    /// Config rules first, then the built-in set.
    pub fn from_config(config: &CaptureConfig) -> Result<Self> {
        let mut rules = Vec::with_capacity(config.rules.len() + BUILTIN_RULES.len());
        for rule in &config.rules {
            rules.push(CaptureRule::new(
                &rule.trigger,
                rule.exclude.as_deref(),
                rule.category.parse()?,
            )?);
        }
        for (trigger, category) in BUILTIN_RULES {
            rules.push(CaptureRule::new(trigger, None, *category)?);
        }
        let excludes = GLOBAL_EXCLUDES
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid exclude pattern: {p}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rules,
            excludes,
            sentence: Regex::new(r"[^。.!！?？\n]+[。.!！?？]?")?,
            min_length: config.min_length,
            max_length: config.max_length,
        })
    }

    /// `None` when the text is excluded, out of length bounds, or matches no rule.
    pub fn classify(&self, text: &str) -> Option<Capture> {
        let text = text.trim();
        let len = text.chars().count();
        if len < self.min_length || len > self.max_length {
            return None;
        }
        if self.excludes.iter().any(|e| e.is_match(text)) {
            return None;
        }
        let rule = self.rules.iter().find(|r| r.matches(text))?;
        Some(Capture {
            category: rule.category,
            content: self.extract_content(text),
        })
    }

    fn extract_content(&self, text: &str) -> String {
        let content = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if content.chars().count() <= EXTRACT_THRESHOLD {
            return content;
        }
        let sentences: Vec<&str> = self
            .sentence
            .find_iter(&content)
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty() && self.rules.iter().any(|r| r.matches(s)))
            .take(MAX_SENTENCES)
            .collect();
        if sentences.is_empty() {
            let head: String = content.chars().take(EXTRACT_THRESHOLD).collect();
            return format!("{head}...");
        }
        sentences.join(" ")
    }
}

/// The markdown list item a capture is stored as.
pub fn format_line(capture: &Capture, date: chrono::NaiveDate) -> String {
    format!(
        "- [{}] {} _({})_\n",
        capture.category,
        capture.content,
        date.format("%Y-%m-%d")
    )
}

/// True when an indexed chunk is at least `threshold` similar to `content`.
/// Any failure along the way counts as "not a duplicate".
pub async fn is_duplicate(
    store: &Arc<IndexStore>,
    embedder: &dyn EmbeddingProvider,
    content: &str,
    threshold: f64,
) -> bool {
    if !store.is_vector_capable() {
        return false;
    }
    let embedding = match embedder.embed(content).await {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(error = %e, "dedup embedding failed, treating as new");
            return false;
        }
    };
    let store = Arc::clone(store);
    let best = tokio::task::spawn_blocking(move || store.max_similarity(&embedding))
        .await
        .ok()
        .flatten();
    best.is_some_and(|score| score >= threshold)
}
