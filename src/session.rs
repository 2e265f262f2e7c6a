//! Voice session choreography as an explicit state machine.
//!
//! `Idle -> Listening -> Processing -> Speaking -> Idle`. The machine never
//! reads a clock itself: every transition takes `now`, and pending deadlines
//! only fire inside [`VoiceSession::advance`]. [`SessionHandle`] pairs a
//! machine with an injected [`Clock`] for callers that want wall time.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Listening,
    Processing,
    Speaking,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub processing: Duration,
    pub speaking: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self { processing: Duration::from_secs(2), speaking: Duration::from_secs(3) }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("voice key required")]
    VoiceKeyRequired,
    #[error("voice key must not be empty")]
    EmptyVoiceKey,
    #[error("cannot {action} while {from:?}")]
    InvalidTransition { action: &'static str, from: Phase },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub phase: Phase,
    pub is_listening: bool,
    pub is_typing: bool,
    pub is_speaking: bool,
    pub is_muted: bool,
    pub language: Language,
    pub voice_key_configured: bool,
    pub session_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct VoiceSession {
    phase: Phase,
    deadline: Option<DateTime<Utc>>,
    muted: bool,
    language: Language,
    voice_key: Option<String>,
    started_at: DateTime<Utc>,
    timing: SessionTiming,
}

fn after(at: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    at + chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

impl VoiceSession {
    pub fn new(timing: SessionTiming, now: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::Idle,
            deadline: None,
            muted: false,
            language: Language::default(),
            voice_key: None,
            started_at: now,
            timing,
        }
    }

    pub fn phase(&self) -> Phase { self.phase }

    pub fn deadline(&self) -> Option<DateTime<Utc>> { self.deadline }

    pub fn configure_voice_key(&mut self, key: &str) -> Result<(), SessionError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(SessionError::EmptyVoiceKey);
        }
        self.voice_key = Some(key.to_string());
        Ok(())
    }

    pub fn start_listening(&mut self, now: DateTime<Utc>) -> Result<Phase, SessionError> {
        self.advance(now);
        if self.voice_key.is_none() {
            return Err(SessionError::VoiceKeyRequired);
        }
        if self.phase != Phase::Idle {
            return Err(SessionError::InvalidTransition { action: "start listening", from: self.phase });
        }
        self.phase = Phase::Listening;
        Ok(self.phase)
    }

    pub fn stop_listening(&mut self, now: DateTime<Utc>) -> Result<Phase, SessionError> {
        self.advance(now);
        if self.phase != Phase::Listening {
            return Err(SessionError::InvalidTransition { action: "stop listening", from: self.phase });
        }
        self.phase = Phase::Processing;
        self.deadline = Some(after(now, self.timing.processing));
        Ok(self.phase)
    }

    /// Fire every deadline that has elapsed by `now`, in order.
    pub fn advance(&mut self, now: DateTime<Utc>) -> Phase {
        while let Some(deadline) = self.deadline {
            if now < deadline {
                break;
            }
            match self.phase {
                Phase::Processing => {
                    self.phase = Phase::Speaking;
                    self.deadline = Some(after(deadline, self.timing.speaking));
                }
                Phase::Speaking => {
                    self.phase = Phase::Idle;
                    self.deadline = None;
                }
                Phase::Idle | Phase::Listening => self.deadline = None,
            }
        }
        self.phase
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    /// Back to `Idle` with pending deadlines cancelled and the session clock restarted.
    pub fn new_session(&mut self, now: DateTime<Utc>) {
        self.phase = Phase::Idle;
        self.deadline = None;
        self.started_at = now;
    }

    pub fn view(&self, now: DateTime<Utc>) -> SessionView {
        SessionView {
            phase: self.phase,
            is_listening: self.phase == Phase::Listening,
            is_typing: self.phase == Phase::Processing,
            is_speaking: self.phase == Phase::Speaking,
            is_muted: self.muted,
            language: self.language,
            voice_key_configured: self.voice_key.is_some(),
            session_minutes: (now - self.started_at).num_minutes().max(0),
        }
    }
}

/// One shared session driven by wall (or injected) time.
pub struct SessionHandle {
    session: Mutex<VoiceSession>,
    clock: Arc<dyn Clock>,
}

impl SessionHandle {
    pub fn new(timing: SessionTiming, clock: Arc<dyn Clock>) -> Self {
        let session = VoiceSession::new(timing, clock.now());
        Self { session: Mutex::new(session), clock }
    }

    /// Run `f` against the session after pending deadlines have fired, then
    /// return its result together with the resulting view.
    pub fn with<R>(&self, f: impl FnOnce(&mut VoiceSession, DateTime<Utc>) -> R) -> (R, SessionView) {
        let now = self.clock.now();
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        session.advance(now);
        let out = f(&mut session, now);
        (out, session.view(now))
    }

    pub fn view(&self) -> SessionView {
        self.with(|_, _| ()).1
    }
}
