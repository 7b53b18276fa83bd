//! Core data models used throughout Marginalia.
//!
//! These types represent the highlights, comments, authors, and workflow
//! stage that flow between the selection layer, the annotation graph, the
//! feedback orchestrator, and the persistence gateway.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::anchor::GeometricAnchor;

pub type HighlightId = String;
pub type CommentId = String;

/// Who wrote a comment or created a highlight.
///
/// Decided once when the entity enters the system and never re-derived from
/// a display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorKind {
    User,
    Llm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub kind: AuthorKind,
    /// Display name as stored by the backend.
    pub name: String,
}

impl Author {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: AuthorKind::User,
            name: name.into(),
        }
    }

    pub fn llm(name: impl Into<String>) -> Self {
        Self {
            kind: AuthorKind::Llm,
            name: name.into(),
        }
    }

    /// Classify a wire author label against the configured LLM label.
    ///
    /// The comparison is trimmed and case-insensitive, matching how the
    /// backend stores LLM-authored rows.
    pub fn classify(label: &str, llm_label: &str) -> Self {
        let kind = if label.trim().eq_ignore_ascii_case(llm_label.trim()) {
            AuthorKind::Llm
        } else {
            AuthorKind::User
        };
        Self {
            kind,
            name: label.to_string(),
        }
    }

    pub fn is_llm(&self) -> bool {
        self.kind == AuthorKind::Llm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HighlightKind {
    PdfText,
    PdfShape,
}

impl HighlightKind {
    /// `elementType` value sent to the backend.
    pub fn element_type(&self) -> &'static str {
        match self {
            HighlightKind::PdfText => "pdf",
            HighlightKind::PdfShape => "shape",
        }
    }

    pub fn from_element_type(value: &str) -> Self {
        match value {
            "shape" | "image" => HighlightKind::PdfShape,
            _ => HighlightKind::PdfText,
        }
    }
}

/// Why an LLM comment was written. Sent to the backend as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CommentPurpose {
    ThinkingProcess,
    OtherOptions,
    Deliberation,
}

impl From<CommentPurpose> for u8 {
    fn from(p: CommentPurpose) -> u8 {
        match p {
            CommentPurpose::ThinkingProcess => 1,
            CommentPurpose::OtherOptions => 2,
            CommentPurpose::Deliberation => 3,
        }
    }
}

impl TryFrom<u8> for CommentPurpose {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(CommentPurpose::ThinkingProcess),
            2 => Ok(CommentPurpose::OtherOptions),
            3 => Ok(CommentPurpose::Deliberation),
            other => Err(format!("unknown comment purpose: {}", other)),
        }
    }
}

/// Per-document workflow phase. Ordered; only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum CompletionStage {
    OptionTips,
    DeliberationTips,
    MoreDeliberationTips,
    Export,
}

impl CompletionStage {
    pub fn value(&self) -> u8 {
        (*self).into()
    }

    pub fn next(&self) -> Option<CompletionStage> {
        match self {
            CompletionStage::OptionTips => Some(CompletionStage::DeliberationTips),
            CompletionStage::DeliberationTips => Some(CompletionStage::MoreDeliberationTips),
            CompletionStage::MoreDeliberationTips => Some(CompletionStage::Export),
            CompletionStage::Export => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CompletionStage::OptionTips => "option-tips",
            CompletionStage::DeliberationTips => "deliberation-tips",
            CompletionStage::MoreDeliberationTips => "more-deliberation-tips",
            CompletionStage::Export => "export",
        }
    }
}

impl std::fmt::Display for CompletionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl From<CompletionStage> for u8 {
    fn from(s: CompletionStage) -> u8 {
        match s {
            CompletionStage::OptionTips => 1,
            CompletionStage::DeliberationTips => 2,
            CompletionStage::MoreDeliberationTips => 3,
            CompletionStage::Export => 4,
        }
    }
}

impl TryFrom<u8> for CompletionStage {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(CompletionStage::OptionTips),
            2 => Ok(CompletionStage::DeliberationTips),
            3 => Ok(CompletionStage::MoreDeliberationTips),
            4 => Ok(CompletionStage::Export),
            other => Err(format!("unknown completion stage: {}", other)),
        }
    }
}

/// A highlighted region of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub id: HighlightId,
    pub kind: HighlightKind,
    pub source_text: String,
    /// `None` only for rehydrated records whose rects were empty.
    pub anchor: Option<GeometricAnchor>,
    pub memo: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Author,
    /// Derived: a user has replied to an LLM comment on this LLM highlight.
    pub has_user_reply: bool,
}

/// One node of a highlight's comment tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    pub highlight_id: HighlightId,
    pub parent_id: Option<CommentId>,
    pub author: Author,
    pub text: String,
    pub purpose: Option<CommentPurpose>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_reason: Option<String>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 and the naive `YYYY-MM-DDTHH:MM:SS[.f]` form (treated as
/// UTC). Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Deserialize an id that the backend may send as a number or a string.
pub fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected id as string or number, got {}",
            other
        ))),
    }
}

/// Optional variant of [`de_id`].
pub fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) if s.is_empty() => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected id as string or number, got {}",
            other
        ))),
    }
}
