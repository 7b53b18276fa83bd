//! The annotation graph: highlights, their comment trees, and selection.
//!
//! [`AnnotationGraph`] is the single source of truth for everything the
//! editor displays. All mutation goes through the methods below; derived
//! values (`has_user_reply`, document order, collapsed thread views,
//! highlight tone) are recomputed from the stored records rather than
//! patched incrementally.
//!
//! # Structure
//!
//! ```text
//! Highlight ──1:1── root Comment (parent_id = None)
//!     │
//!     └──1:N── reply Comments (parent_id = Some(..), same highlight)
//! ```
//!
//! Replies are displayed flattened one level under the root, ordered by
//! creation time, with their parent link preserved for "in reply to"
//! rendering. Soft-deleted comments stay in storage but are hidden from
//! every reply view until restored.
//!
//! # Selection
//!
//! | Field | Rule |
//! |-------|------|
//! | `active_comment_id` | setting it also activates the comment's highlight |
//! | `active_highlight_id` | clearing it clears the comment and scroll target |
//! | `active_scroll_target` | set by clicks on a highlight |
//! | `selected_root_ids` | roots picked for a dialogue round |

use std::collections::BTreeSet;

use chrono::Utc;
use serde::Serialize;

use crate::anchor::{document_order, GeometricAnchor};
use crate::error::AnnotationError;
use crate::models::{AuthorKind, Comment, CommentId, Highlight, HighlightId};
use crate::selection::ScrollTarget;

/// Number of replies an inactive thread shows before collapsing.
pub const COLLAPSE_THRESHOLD: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapsePolicy {
    pub threshold: usize,
}

impl Default for CollapsePolicy {
    fn default() -> Self {
        Self {
            threshold: COLLAPSE_THRESHOLD,
        }
    }
}

/// Replies of one thread after applying a [`CollapsePolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadView<'a> {
    pub replies: Vec<&'a Comment>,
    /// Older replies not shown.
    pub hidden: usize,
    pub expanded: bool,
}

/// How a reply's parent currently looks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParentState<'a> {
    /// The comment is itself a root.
    NoParent,
    Live(&'a Comment),
    SoftDeleted(&'a Comment),
    /// The parent was hard-deleted.
    Deleted,
}

/// Marker color class for a highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightTone {
    User,
    Llm,
    Answered,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    pub active_highlight_id: Option<HighlightId>,
    pub active_comment_id: Option<CommentId>,
    pub active_scroll_target: Option<ScrollTarget>,
    pub selected_root_ids: BTreeSet<CommentId>,
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationGraph {
    highlights: Vec<Highlight>,
    comments: Vec<Comment>,
    selection: SelectionState,
}

impl AnnotationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ============ Queries ============

    /// Highlights in insertion order.
    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn highlight(&self, id: &str) -> Option<&Highlight> {
        self.highlights.iter().find(|h| h.id == id)
    }

    pub fn comment(&self, id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == id)
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn root_for(&self, highlight_id: &str) -> Option<&Comment> {
        self.comments
            .iter()
            .find(|c| c.highlight_id == highlight_id && c.is_root())
    }

    /// Live comments of a highlight (root included), oldest first.
    pub fn live_comments_for(&self, highlight_id: &str) -> Vec<&Comment> {
        let mut out: Vec<&Comment> = self
            .comments
            .iter()
            .filter(|c| c.highlight_id == highlight_id && !c.is_soft_deleted())
            .collect();
        out.sort_by_key(|c| c.created_at);
        out
    }

    /// Most recent live comment of a highlight.
    pub fn latest_live_comment(&self, highlight_id: &str) -> Option<&Comment> {
        self.live_comments_for(highlight_id).last().copied()
    }

    // ============ Highlight mutations ============

    /// Insert a highlight with no comments.
    pub fn add_highlight(&mut self, highlight: Highlight) -> Result<(), AnnotationError> {
        if self.highlight(&highlight.id).is_some() {
            return Err(AnnotationError::validation(format!(
                "highlight {} already exists",
                highlight.id
            )));
        }
        let id = highlight.id.clone();
        self.highlights.push(highlight);
        self.recompute_user_reply(&id);
        Ok(())
    }

    /// Insert a highlight together with its root comment.
    ///
    /// Both records are validated before either is inserted, so a failure
    /// leaves the graph unchanged.
    pub fn add_highlight_with_root_comment(
        &mut self,
        highlight: Highlight,
        root: Comment,
    ) -> Result<(), AnnotationError> {
        if self.highlight(&highlight.id).is_some() {
            return Err(AnnotationError::validation(format!(
                "highlight {} already exists",
                highlight.id
            )));
        }
        if root.highlight_id != highlight.id {
            return Err(AnnotationError::validation(format!(
                "root comment {} belongs to highlight {}, not {}",
                root.id, root.highlight_id, highlight.id
            )));
        }
        if !root.is_root() {
            return Err(AnnotationError::validation(format!(
                "comment {} has a parent and cannot be a root",
                root.id
            )));
        }
        if self.comment(&root.id).is_some() {
            return Err(AnnotationError::validation(format!(
                "comment {} already exists",
                root.id
            )));
        }
        let id = highlight.id.clone();
        self.highlights.push(highlight);
        self.comments.push(root);
        self.recompute_user_reply(&id);
        log::debug!("graph: added highlight {} with root comment", id);
        Ok(())
    }

    /// Remove a highlight and every comment attached to it.
    pub fn delete_highlight(&mut self, id: &str) -> Result<Highlight, AnnotationError> {
        let idx = self
            .highlights
            .iter()
            .position(|h| h.id == id)
            .ok_or_else(|| AnnotationError::NotFound(format!("highlight {}", id)))?;
        let removed = self.highlights.remove(idx);

        let mut removed_comments = Vec::new();
        self.comments.retain(|c| {
            if c.highlight_id == id {
                removed_comments.push(c.id.clone());
                false
            } else {
                true
            }
        });
        for cid in &removed_comments {
            self.forget_comment(cid);
        }
        if self.selection.active_highlight_id.as_deref() == Some(id) {
            self.clear_selection();
        }
        log::debug!(
            "graph: deleted highlight {} and {} comment(s)",
            id,
            removed_comments.len()
        );
        Ok(removed)
    }

    /// Returns `false` when the highlight does not exist.
    pub fn update_highlight_memo(&mut self, id: &str, memo: &str) -> bool {
        match self.highlights.iter_mut().find(|h| h.id == id) {
            Some(h) => {
                h.memo = memo.to_string();
                true
            }
            None => false,
        }
    }

    // ============ Comment mutations ============

    /// Append a comment.
    ///
    /// # Errors
    ///
    /// - [`AnnotationError::NotFound`] when the highlight is missing.
    /// - [`AnnotationError::Validation`] for a duplicate id, a second root,
    ///   or a parent that is missing or belongs to another highlight.
    pub fn add_comment(&mut self, comment: Comment) -> Result<(), AnnotationError> {
        if self.highlight(&comment.highlight_id).is_none() {
            return Err(AnnotationError::NotFound(format!(
                "highlight {}",
                comment.highlight_id
            )));
        }
        if self.comment(&comment.id).is_some() {
            return Err(AnnotationError::validation(format!(
                "comment {} already exists",
                comment.id
            )));
        }
        match &comment.parent_id {
            Some(parent_id) => match self.comment(parent_id) {
                Some(parent) if parent.highlight_id == comment.highlight_id => {}
                Some(_) => {
                    return Err(AnnotationError::validation(format!(
                        "parent {} belongs to a different highlight",
                        parent_id
                    )))
                }
                None => {
                    return Err(AnnotationError::validation(format!(
                        "parent comment {} does not exist",
                        parent_id
                    )))
                }
            },
            None => {
                if self.root_for(&comment.highlight_id).is_some() {
                    return Err(AnnotationError::validation(format!(
                        "highlight {} already has a root comment",
                        comment.highlight_id
                    )));
                }
            }
        }
        let hid = comment.highlight_id.clone();
        self.comments.push(comment);
        self.recompute_user_reply(&hid);
        Ok(())
    }

    /// Hard-delete one comment. Its replies stay and report a deleted parent.
    pub fn delete_comment(&mut self, id: &str) -> Result<Comment, AnnotationError> {
        let idx = self
            .comments
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| AnnotationError::NotFound(format!("comment {}", id)))?;
        let removed = self.comments.remove(idx);
        self.forget_comment(id);
        self.recompute_user_reply(&removed.highlight_id);
        Ok(removed)
    }

    /// Hide a non-root LLM comment, recording why.
    pub fn soft_delete_comment(&mut self, id: &str, reason: &str) -> Result<(), AnnotationError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AnnotationError::validation(
                "A reason is required to delete an AI comment.",
            ));
        }
        let comment = self
            .comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AnnotationError::NotFound(format!("comment {}", id)))?;
        if comment.is_root() || comment.author.kind != AuthorKind::Llm {
            return Err(AnnotationError::validation(
                "only AI replies can be soft-deleted",
            ));
        }
        comment.deleted_at = Some(Utc::now());
        comment.deleted_reason = Some(reason.to_string());
        let hid = comment.highlight_id.clone();
        self.forget_comment(id);
        self.recompute_user_reply(&hid);
        Ok(())
    }

    /// Undo a soft delete.
    pub fn restore_comment(&mut self, id: &str) -> Result<(), AnnotationError> {
        let comment = self
            .comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AnnotationError::NotFound(format!("comment {}", id)))?;
        comment.deleted_at = None;
        comment.deleted_reason = None;
        let hid = comment.highlight_id.clone();
        self.recompute_user_reply(&hid);
        Ok(())
    }

    /// Set the text and stamp `edited_at`. No-op when the id is unknown.
    pub fn update_comment(&mut self, id: &str, text: &str) -> bool {
        match self.comments.iter_mut().find(|c| c.id == id) {
            Some(c) => {
                c.text = text.to_string();
                c.edited_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Replace the whole graph with rehydrated records.
    ///
    /// Comments whose highlight is missing are dropped. Selection is reset.
    pub fn replace_all(&mut self, highlights: Vec<Highlight>, comments: Vec<Comment>) {
        let before = comments.len();
        self.highlights = highlights;
        self.comments = comments
            .into_iter()
            .filter(|c| self.highlights.iter().any(|h| h.id == c.highlight_id))
            .collect();
        if self.comments.len() != before {
            log::warn!(
                "graph: dropped {} comment(s) without a highlight",
                before - self.comments.len()
            );
        }
        self.selection = SelectionState::default();
        let ids: Vec<HighlightId> = self.highlights.iter().map(|h| h.id.clone()).collect();
        for id in ids {
            self.recompute_user_reply(&id);
        }
    }

    fn forget_comment(&mut self, id: &str) {
        if self.selection.active_comment_id.as_deref() == Some(id) {
            self.selection.active_comment_id = None;
            self.selection.active_scroll_target = None;
        }
        self.selection.selected_root_ids.remove(id);
    }

    fn recompute_user_reply(&mut self, highlight_id: &str) {
        let Some(h) = self.highlights.iter().find(|h| h.id == highlight_id) else {
            return;
        };
        let value = h.created_by.kind == AuthorKind::Llm
            && self.comments.iter().any(|c| {
                c.highlight_id == highlight_id
                    && !c.is_soft_deleted()
                    && c.author.kind == AuthorKind::User
                    && c.parent_id.as_deref().and_then(|p| self.comment(p)).is_some_and(
                        |parent| {
                            parent.highlight_id == highlight_id
                                && !parent.is_soft_deleted()
                                && parent.author.kind == AuthorKind::Llm
                        },
                    )
            });
        if let Some(h) = self.highlights.iter_mut().find(|h| h.id == highlight_id) {
            h.has_user_reply = value;
        }
    }

    // ============ Derived views ============

    /// Root comments ordered by their highlight's position in the document.
    ///
    /// Roots without a highlight or anchor sort last in insertion order.
    pub fn roots_in_document_order(&self) -> Vec<&Comment> {
        let mut roots: Vec<&Comment> = self.comments.iter().filter(|c| c.is_root()).collect();
        roots.sort_by(|a, b| document_order(self.anchor_of(a), self.anchor_of(b)));
        roots
    }

    fn anchor_of(&self, comment: &Comment) -> Option<&GeometricAnchor> {
        self.highlight(&comment.highlight_id).and_then(|h| h.anchor.as_ref())
    }

    /// Live replies of a root's highlight, oldest first.
    pub fn replies(&self, root_id: &str) -> Vec<&Comment> {
        let Some(root) = self.comment(root_id) else {
            return Vec::new();
        };
        let mut out: Vec<&Comment> = self
            .comments
            .iter()
            .filter(|c| {
                c.highlight_id == root.highlight_id && !c.is_root() && !c.is_soft_deleted()
            })
            .collect();
        out.sort_by_key(|c| c.created_at);
        out
    }

    /// Whether the thread under `root_id` is the one the user is working in.
    pub fn is_thread_active(&self, root_id: &str) -> bool {
        let Some(root) = self.comment(root_id) else {
            return false;
        };
        if self.selection.active_highlight_id.as_deref() == Some(root.highlight_id.as_str()) {
            return true;
        }
        match &self.selection.active_comment_id {
            Some(active) if active == root_id => true,
            Some(active) => self
                .comment(active)
                .is_some_and(|c| c.highlight_id == root.highlight_id),
            None => false,
        }
    }

    /// Replies with inactive, over-threshold threads trimmed to the most
    /// recent `policy.threshold` entries.
    pub fn collapsed_replies(&self, root_id: &str, policy: CollapsePolicy) -> ThreadView<'_> {
        let replies = self.replies(root_id);
        if self.is_thread_active(root_id) || replies.len() <= policy.threshold {
            return ThreadView {
                replies,
                hidden: 0,
                expanded: true,
            };
        }
        let hidden = replies.len() - policy.threshold;
        ThreadView {
            replies: replies[hidden..].to_vec(),
            hidden,
            expanded: false,
        }
    }

    pub fn parent_state(&self, comment_id: &str) -> Option<ParentState<'_>> {
        let comment = self.comment(comment_id)?;
        Some(match &comment.parent_id {
            None => ParentState::NoParent,
            Some(pid) => match self.comment(pid) {
                Some(p) if p.is_soft_deleted() => ParentState::SoftDeleted(p),
                Some(p) => ParentState::Live(p),
                None => ParentState::Deleted,
            },
        })
    }

    /// Color class for a highlight, from who spoke last in its thread.
    pub fn highlight_tone(&self, highlight_id: &str) -> HighlightTone {
        let live = self.live_comments_for(highlight_id);
        let Some(latest) = live.last() else {
            return HighlightTone::User;
        };
        if latest.author.kind == AuthorKind::Llm {
            HighlightTone::Llm
        } else if live.iter().any(|c| c.author.kind == AuthorKind::Llm) {
            HighlightTone::Answered
        } else {
            HighlightTone::User
        }
    }

    // ============ Selection ============

    pub fn set_active_comment(&mut self, id: Option<&str>) -> Result<(), AnnotationError> {
        match id {
            None => {
                self.selection.active_comment_id = None;
                Ok(())
            }
            Some(id) => {
                let hid = self
                    .comment(id)
                    .map(|c| c.highlight_id.clone())
                    .ok_or_else(|| AnnotationError::NotFound(format!("comment {}", id)))?;
                self.selection.active_comment_id = Some(id.to_string());
                self.selection.active_highlight_id = Some(hid);
                Ok(())
            }
        }
    }

    /// Activate a highlight, or clear the selection with `None`.
    pub fn set_active_highlight(&mut self, id: Option<&str>) -> Result<(), AnnotationError> {
        match id {
            None => {
                self.clear_selection();
                Ok(())
            }
            Some(id) => {
                if self.highlight(id).is_none() {
                    return Err(AnnotationError::NotFound(format!("highlight {}", id)));
                }
                let keeps_comment = self
                    .selection
                    .active_comment_id
                    .as_deref()
                    .and_then(|c| self.comment(c))
                    .is_some_and(|c| c.highlight_id == id);
                if !keeps_comment {
                    self.selection.active_comment_id = None;
                }
                if self.selection.active_highlight_id.as_deref() != Some(id) {
                    self.selection.active_scroll_target = None;
                }
                self.selection.active_highlight_id = Some(id.to_string());
                Ok(())
            }
        }
    }

    /// Activate a highlight and remember where to scroll.
    pub fn focus_highlight(
        &mut self,
        id: &str,
        scroll_target: ScrollTarget,
    ) -> Result<(), AnnotationError> {
        self.set_active_highlight(Some(id))?;
        self.selection.active_scroll_target = Some(scroll_target);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection.active_highlight_id = None;
        self.selection.active_comment_id = None;
        self.selection.active_scroll_target = None;
    }

    /// Flip a root's membership in the dialogue selection. Returns whether
    /// it is now selected.
    pub fn toggle_root_selection(&mut self, root_id: &str) -> Result<bool, AnnotationError> {
        match self.comment(root_id) {
            Some(c) if c.is_root() => {}
            Some(_) => {
                return Err(AnnotationError::validation(format!(
                    "comment {} is not a thread root",
                    root_id
                )))
            }
            None => return Err(AnnotationError::NotFound(format!("comment {}", root_id))),
        }
        if self.selection.selected_root_ids.remove(root_id) {
            Ok(false)
        } else {
            self.selection.selected_root_ids.insert(root_id.to_string());
            Ok(true)
        }
    }

    pub fn clear_root_selection(&mut self) {
        self.selection.selected_root_ids.clear();
    }

    /// Selected roots, in document order.
    pub fn selected_roots(&self) -> Vec<&Comment> {
        self.roots_in_document_order()
            .into_iter()
            .filter(|c| self.selection.selected_root_ids.contains(&c.id))
            .collect()
    }
}
