//! Connected home page: conversation, messages and wellness metrics fetched
//! from the hosted backend and mapped into view models.
//!
//! Backend columns are free text or nullable, so every closed-set field goes
//! through an explicit parse function. Fallback policy:
//!
//! | field                      | fallback    |
//! |----------------------------|-------------|
//! | message role               | `ai`        |
//! | language                   | `en`        |
//! | mood / mood status         | `neutral`   |
//! | energy                     | `medium`    |
//! | coherence                  | `clear`     |
//! | engagement                 | `moderate`  |
//! | trend                      | `stable`    |
//! | score                      | clamped to 0..=100, non-numeric is 0 |
//! | timestamp                  | absent      |

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::rest::{eq_filter, BackendError, RestClient};
use crate::session::Language;

// ---------------- Raw rows ----------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationRow {
    pub id: Value,
    pub user_id: Value,
    pub title: Value,
    pub language: Value,
    pub created_at: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageRow {
    pub id: Value,
    pub conversation_id: Value,
    pub role: Value,
    pub content: Value,
    pub language: Value,
    pub mood: Value,
    pub energy: Value,
    pub coherence: Value,
    pub created_at: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WellnessMetricsRow {
    pub user_id: Value,
    pub overall_score: Value,
    pub mood_score: Value,
    pub mood_trend: Value,
    pub mood_status: Value,
    pub energy_score: Value,
    pub energy_trend: Value,
    pub energy_status: Value,
    pub coherence_score: Value,
    pub coherence_trend: Value,
    pub coherence_status: Value,
    pub engagement_score: Value,
    pub engagement_trend: Value,
    pub engagement_status: Value,
    pub session_minutes: Value,
    pub warning_flags: Value,
    pub created_at: Value,
}

// ---------------- Closed sets ----------------

/// A closed set of labels with a documented fallback for anything else.
pub trait ClosedSet: Sized + Copy {
    const FALLBACK: Self;

    fn from_label(label: &str) -> Option<Self>;

    fn parse(raw: &Value) -> Self {
        raw.as_str()
            .map(|s| s.trim().to_ascii_lowercase())
            .and_then(|s| Self::from_label(&s))
            .unwrap_or(Self::FALLBACK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker { User, Ai }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoodStatus { Positive, Neutral, Concerning }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel { High, Medium, Low }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Coherence { Clear, Unclear, Confused }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engagement { Active, Moderate, Withdrawn }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend { Up, Down, Stable }

impl ClosedSet for Speaker {
    const FALLBACK: Self = Speaker::Ai;
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "user" => Some(Speaker::User),
            "ai" => Some(Speaker::Ai),
            _ => None,
        }
    }
}

impl ClosedSet for Language {
    const FALLBACK: Self = Language::En;
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "en" => Some(Language::En),
            "id" => Some(Language::Id),
            _ => None,
        }
    }
}

impl ClosedSet for MoodStatus {
    const FALLBACK: Self = MoodStatus::Neutral;
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "positive" => Some(MoodStatus::Positive),
            "neutral" => Some(MoodStatus::Neutral),
            "concerning" => Some(MoodStatus::Concerning),
            _ => None,
        }
    }
}

impl ClosedSet for EnergyLevel {
    const FALLBACK: Self = EnergyLevel::Medium;
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "high" => Some(EnergyLevel::High),
            "medium" => Some(EnergyLevel::Medium),
            "low" => Some(EnergyLevel::Low),
            _ => None,
        }
    }
}

impl ClosedSet for Coherence {
    const FALLBACK: Self = Coherence::Clear;
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "clear" => Some(Coherence::Clear),
            "unclear" => Some(Coherence::Unclear),
            "confused" => Some(Coherence::Confused),
            _ => None,
        }
    }
}

impl ClosedSet for Engagement {
    const FALLBACK: Self = Engagement::Moderate;
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "active" => Some(Engagement::Active),
            "moderate" => Some(Engagement::Moderate),
            "withdrawn" => Some(Engagement::Withdrawn),
            _ => None,
        }
    }
}

impl ClosedSet for Trend {
    const FALLBACK: Self = Trend::Stable;
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "up" => Some(Trend::Up),
            "down" => Some(Trend::Down),
            "stable" => Some(Trend::Stable),
            _ => None,
        }
    }
}

// ---------------- Field parsers ----------------

pub fn parse_speaker(raw: &Value) -> Speaker { Speaker::parse(raw) }
pub fn parse_language(raw: &Value) -> Language { Language::parse(raw) }
pub fn parse_mood(raw: &Value) -> MoodStatus { MoodStatus::parse(raw) }
pub fn parse_energy(raw: &Value) -> EnergyLevel { EnergyLevel::parse(raw) }
pub fn parse_coherence(raw: &Value) -> Coherence { Coherence::parse(raw) }
pub fn parse_engagement(raw: &Value) -> Engagement { Engagement::parse(raw) }
pub fn parse_trend(raw: &Value) -> Trend { Trend::parse(raw) }

fn as_number(raw: &Value) -> Option<f64> {
    let n = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

/// Percentage score: rounded and clamped to `0..=100`; anything non-numeric is 0.
pub fn parse_score(raw: &Value) -> u8 {
    as_number(raw).map(|n| n.round().clamp(0.0, 100.0) as u8).unwrap_or(0)
}

pub fn parse_minutes(raw: &Value) -> u32 {
    as_number(raw).map(|n| n.max(0.0).min(f64::from(u32::MAX)) as u32).unwrap_or(0)
}

pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    raw.as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Strings pass through; numbers and booleans are stringified; anything else is absent.
pub fn parse_text(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn parse_flags(raw: &Value) -> Vec<String> {
    match raw {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn is_present(raw: &Value) -> bool {
    !raw.is_null()
}

// ---------------- View models ----------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: String,
    pub title: String,
    pub language: Language,
    pub created_at: Option<DateTime<Utc>>,
}

impl ConversationView {
    pub fn from_row(row: &ConversationRow) -> Self {
        Self {
            id: parse_text(&row.id).unwrap_or_default(),
            title: parse_text(&row.title).filter(|t| !t.trim().is_empty()).unwrap_or_else(|| "Conversation".into()),
            language: parse_language(&row.language),
            created_at: parse_timestamp(&row.created_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Indicators {
    pub mood: Option<MoodStatus>,
    pub energy: Option<EnergyLevel>,
    pub coherence: Option<Coherence>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub speaker: Speaker,
    pub content: String,
    pub language: Language,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicators: Option<Indicators>,
}

impl MessageView {
    pub fn from_row(row: &MessageRow) -> Self {
        let indicators = if is_present(&row.mood) || is_present(&row.energy) || is_present(&row.coherence) {
            Some(Indicators {
                mood: is_present(&row.mood).then(|| parse_mood(&row.mood)),
                energy: is_present(&row.energy).then(|| parse_energy(&row.energy)),
                coherence: is_present(&row.coherence).then(|| parse_coherence(&row.coherence)),
            })
        } else {
            None
        };
        Self {
            id: parse_text(&row.id).unwrap_or_default(),
            speaker: parse_speaker(&row.role),
            content: parse_text(&row.content).unwrap_or_default(),
            language: parse_language(&row.language),
            timestamp: parse_timestamp(&row.created_at),
            indicators,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric<S> {
    pub score: u8,
    pub trend: Trend,
    pub status: S,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WellnessMetrics {
    pub mood: Metric<MoodStatus>,
    pub energy: Metric<EnergyLevel>,
    pub coherence: Metric<Coherence>,
    pub engagement: Metric<Engagement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WellnessView {
    pub overall_score: u8,
    pub metrics: WellnessMetrics,
    pub session_minutes: u32,
    pub warning_flags: Vec<String>,
}

impl WellnessView {
    pub fn from_row(row: &WellnessMetricsRow) -> Self {
        Self {
            overall_score: parse_score(&row.overall_score),
            metrics: WellnessMetrics {
                mood: Metric {
                    score: parse_score(&row.mood_score),
                    trend: parse_trend(&row.mood_trend),
                    status: parse_mood(&row.mood_status),
                },
                energy: Metric {
                    score: parse_score(&row.energy_score),
                    trend: parse_trend(&row.energy_trend),
                    status: parse_energy(&row.energy_status),
                },
                coherence: Metric {
                    score: parse_score(&row.coherence_score),
                    trend: parse_trend(&row.coherence_trend),
                    status: parse_coherence(&row.coherence_status),
                },
                engagement: Metric {
                    score: parse_score(&row.engagement_score),
                    trend: parse_trend(&row.engagement_trend),
                    status: parse_engagement(&row.engagement_status),
                },
            },
            session_minutes: parse_minutes(&row.session_minutes),
            warning_flags: parse_flags(&row.warning_flags),
        }
    }

    /// Static assessment shown when no backend is connected.
    pub fn demo() -> Self {
        Self {
            overall_score: 65,
            metrics: WellnessMetrics {
                mood: Metric { score: 45, trend: Trend::Down, status: MoodStatus::Concerning },
                energy: Metric { score: 35, trend: Trend::Down, status: EnergyLevel::Low },
                coherence: Metric { score: 85, trend: Trend::Stable, status: Coherence::Clear },
                engagement: Metric { score: 70, trend: Trend::Up, status: Engagement::Active },
            },
            session_minutes: 12,
            warning_flags: vec![
                "Sleep disruption patterns detected".into(),
                "Stress-related language patterns".into(),
                "Low energy indicators present".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HomeSource { Backend, Demo }

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeSnapshot {
    pub source: HomeSource,
    pub conversation: Option<ConversationView>,
    pub messages: Vec<MessageView>,
    pub wellness: Option<WellnessView>,
}

impl HomeSnapshot {
    pub fn demo(now: DateTime<Utc>) -> Self {
        let msg = |id: &str, speaker: Speaker, content: &str, mins_ago: i64, indicators: Option<Indicators>| MessageView {
            id: id.into(),
            speaker,
            content: content.into(),
            language: Language::En,
            timestamp: Some(now - Duration::minutes(mins_ago)),
            indicators,
        };
        Self {
            source: HomeSource::Demo,
            conversation: None,
            messages: vec![
                msg("1", Speaker::Ai, "Hello! I'm MindWhisper, your mental health companion. I'm here to listen and support you in a safe, judgment-free space. How are you feeling today?", 5, None),
                msg("2", Speaker::User, "I've been feeling really overwhelmed lately. Work has been stressful and I'm having trouble sleeping.", 4, Some(Indicators {
                    mood: Some(MoodStatus::Concerning),
                    energy: Some(EnergyLevel::Low),
                    coherence: Some(Coherence::Clear),
                })),
                msg("3", Speaker::Ai, "I hear that you're going through a challenging time with work stress affecting your sleep. That sounds really difficult. Can you tell me more about what specifically at work has been weighing on you?", 3, None),
            ],
            wellness: Some(WellnessView::demo()),
        }
    }
}

// ---------------- Backend port ----------------

#[async_trait]
pub trait WellnessBackend: Send + Sync {
    async fn latest_conversation(&self, user_id: &str) -> Result<Option<ConversationRow>, BackendError>;
    async fn create_conversation(&self, user_id: &str) -> Result<ConversationRow, BackendError>;
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>, BackendError>;
    async fn latest_metrics(&self, user_id: &str) -> Result<Option<WellnessMetricsRow>, BackendError>;
}

/// Fetch (or create) the user's conversation, its messages and the latest
/// metrics row. One attempt per call; the first error is returned as is.
pub async fn load_home(backend: &dyn WellnessBackend, user_id: &str) -> Result<HomeSnapshot, BackendError> {
    let row = match backend.latest_conversation(user_id).await? {
        Some(row) => row,
        None => {
            tracing::info!(user_id, "no conversation yet, creating one");
            backend.create_conversation(user_id).await?
        }
    };
    let conversation = ConversationView::from_row(&row);
    let messages = backend
        .list_messages(&conversation.id)
        .await?
        .iter()
        .map(MessageView::from_row)
        .collect();
    let wellness = backend.latest_metrics(user_id).await?.as_ref().map(WellnessView::from_row);
    Ok(HomeSnapshot { source: HomeSource::Backend, conversation: Some(conversation), messages, wellness })
}

/// [`WellnessBackend`] over the hosted REST API.
#[derive(Clone)]
pub struct HostedBackend {
    client: RestClient,
}

impl HostedBackend {
    pub fn new(client: RestClient) -> Self { Self { client } }
}

#[async_trait]
impl WellnessBackend for HostedBackend {
    async fn latest_conversation(&self, user_id: &str) -> Result<Option<ConversationRow>, BackendError> {
        let query = format!("{}&order=created_at.desc&limit=1", eq_filter("user_id", user_id));
        let rows: Vec<ConversationRow> = self.client.select("conversations", &query).await?;
        Ok(rows.into_iter().next())
    }

    async fn create_conversation(&self, user_id: &str) -> Result<ConversationRow, BackendError> {
        let created = self.client.insert("conversations", &json!({ "user_id": user_id })).await?;
        let row = match created {
            Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
            obj @ Value::Object(_) => obj,
            other => return Err(BackendError::Decode(format!("conversations insert returned {other}"))),
        };
        serde_json::from_value(row).map_err(|e| BackendError::Decode(format!("conversations: {e}")))
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>, BackendError> {
        let query = format!("{}&order=created_at.asc", eq_filter("conversation_id", conversation_id));
        self.client.select("messages", &query).await
    }

    async fn latest_metrics(&self, user_id: &str) -> Result<Option<WellnessMetricsRow>, BackendError> {
        let query = format!("{}&order=created_at.desc&limit=1", eq_filter("user_id", user_id));
        let rows: Vec<WellnessMetricsRow> = self.client.select("wellness_metrics", &query).await?;
        Ok(rows.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_labels_fall_back() {
        assert_eq!(parse_speaker(&json!("assistant")), Speaker::Ai);
        assert_eq!(parse_speaker(&json!(" USER ")), Speaker::User);
        assert_eq!(parse_language(&json!("fr")), Language::En);
        assert_eq!(parse_mood(&Value::Null), MoodStatus::Neutral);
        assert_eq!(parse_energy(&json!(3)), EnergyLevel::Medium);
        assert_eq!(parse_coherence(&json!("foggy")), Coherence::Clear);
        assert_eq!(parse_engagement(&json!("")), Engagement::Moderate);
        assert_eq!(parse_trend(&json!("sideways")), Trend::Stable);
    }

    #[test]
    fn scores_are_clamped() {
        assert_eq!(parse_score(&json!(72.6)), 73);
        assert_eq!(parse_score(&json!(140)), 100);
        assert_eq!(parse_score(&json!(-3)), 0);
        assert_eq!(parse_score(&json!("55")), 55);
        assert_eq!(parse_score(&json!("high")), 0);
        assert_eq!(parse_score(&Value::Null), 0);
    }

    #[test]
    fn message_without_indicator_columns_has_none() {
        let row = MessageRow { id: json!(7), role: json!("user"), content: json!("hi"), ..Default::default() };
        let view = MessageView::from_row(&row);
        assert_eq!(view.id, "7");
        assert_eq!(view.speaker, Speaker::User);
        assert!(view.indicators.is_none());

        let row = MessageRow { mood: json!("weird"), ..Default::default() };
        let ind = MessageView::from_row(&row).indicators.unwrap();
        assert_eq!(ind.mood, Some(MoodStatus::Neutral));
        assert_eq!(ind.energy, None);
    }
}
