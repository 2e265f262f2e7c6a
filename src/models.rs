use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const TITLE_MAX_CHARS: usize = 120;
pub const BODY_MAX_CHARS: usize = 1000;
pub const NAME_MAX_CHARS: usize = 60;

/// Entities stored in a persisted collection are addressed by a string id.
pub trait HasId {
    fn id(&self) -> &str;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("history must be a JSON array of messages")]
    MalformedHistory,
    #[error("duplicate message id '{0}' in history")]
    DuplicateId(String),
}

/// Trim `value` and check it against the non-empty and length rules.
pub fn require_text(field: &'static str, value: &str, max: Option<usize>) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty(field));
    }
    if let Some(max) = max {
        if trimmed.chars().count() > max {
            return Err(ValidationError::TooLong { field, max });
        }
    }
    Ok(trimmed.to_string())
}

// ---------------- Journal ----------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Positive,
    #[default]
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub title: String,
    pub content: String,
    pub mood: Mood,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HasId for JournalEntry {
    fn id(&self) -> &str { &self.id }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewJournalEntry {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub mood: Mood,
}

impl NewJournalEntry {
    /// Returns the trimmed `(title, content)` pair when both pass validation.
    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        let title = require_text("title", &self.title, Some(TITLE_MAX_CHARS))?;
        let content = require_text("content", &self.content, Some(BODY_MAX_CHARS))?;
        Ok((title, content))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct JournalUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub mood: Option<Mood>,
}

// ---------------- Doctor chat ----------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Doctor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub author: Author,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl HasId for ChatMessage {
    fn id(&self) -> &str { &self.id }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewChatMessage {
    pub author: Author,
    pub content: String,
}

// ---------------- Community ----------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommunityUser {
    pub id: String,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommunityComment {
    pub id: String,
    pub post_id: String,
    pub author: CommunityUser,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommunityPost {
    pub id: String,
    pub author: CommunityUser,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// User ids that encouraged this post; never contains duplicates.
    #[serde(default)]
    pub encouragements: Vec<String>,
    #[serde(default)]
    pub comments: Vec<CommunityComment>,
}

impl HasId for CommunityPost {
    fn id(&self) -> &str { &self.id }
}

impl CommunityPost {
    /// Flip membership of `user_id` in the encouragement set. Returns true when
    /// the user now encourages the post.
    pub fn toggle_encouragement(&mut self, user_id: &str) -> bool {
        if self.encouragements.iter().any(|u| u == user_id) {
            // drops every copy, so a set loaded with duplicates heals here
            self.encouragements.retain(|u| u != user_id);
            false
        } else {
            self.encouragements.push(user_id.to_string());
            true
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RenameUser {
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FeedOrder {
    #[default]
    Latest,
    Top,
}

/// Short relative label for a past timestamp ("just now", "5m ago", "3h ago", "2d ago").
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mins = (now - then).num_minutes();
    if mins < 1 {
        return "just now".into();
    }
    if mins < 60 {
        return format!("{mins}m ago");
    }
    let hrs = mins / 60;
    if hrs < 24 {
        return format!("{hrs}h ago");
    }
    format!("{}d ago", hrs / 24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn require_text_trims_and_bounds() {
        assert_eq!(require_text("title", "  hi  ", Some(5)).unwrap(), "hi");
        assert_eq!(require_text("title", "   ", None), Err(ValidationError::Empty("title")));
        assert!(matches!(
            require_text("title", "abcdef", Some(5)),
            Err(ValidationError::TooLong { field: "title", max: 5 })
        ));
    }

    #[test]
    fn time_ago_buckets() {
        let now = Utc::now();
        assert_eq!(time_ago(now - Duration::seconds(30), now), "just now");
        assert_eq!(time_ago(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(time_ago(now - Duration::minutes(185), now), "3h ago");
        assert_eq!(time_ago(now - Duration::hours(49), now), "2d ago");
    }

    #[test]
    fn journal_entry_uses_camel_case_on_the_wire() {
        let now = Utc::now();
        let e = JournalEntry {
            id: "1".into(),
            title: "t".into(),
            content: "c".into(),
            mood: Mood::Positive,
            created_at: now,
            updated_at: now,
        };
        let v = serde_json::to_value(&e).unwrap();
        assert!(v.get("createdAt").is_some());
        assert!(v.get("updatedAt").is_some());
        assert_eq!(v["mood"], "positive");
    }
}
