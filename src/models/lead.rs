use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::fs;
use thiserror::Error;

const SEED_LEADS: &str = include_str!("../../json/leads.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[serde(alias = "Novo")]
    New,
    #[serde(alias = "Qualificando")]
    Qualifying,
    #[serde(alias = "Quente (Pronto)")]
    Hot,
    #[serde(alias = "Frio")]
    Cold,
    #[serde(alias = "Follow-up")]
    FollowUp,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::Qualifying,
        LeadStatus::Hot,
        LeadStatus::Cold,
        LeadStatus::FollowUp,
    ];
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LeadStatus::New => "New",
            LeadStatus::Qualifying => "Qualifying",
            LeadStatus::Hot => "Hot",
            LeadStatus::Cold => "Cold",
            LeadStatus::FollowUp => "Follow-up",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Ai,
    Lead,
}

/// Who is driving the conversation with a lead.
///
/// Only `Monitoring` leads get automated replies. `Paused` means a human
/// muted the assistant; `Escalated` means the assistant handed the lead to
/// the salesperson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadPhase {
    Monitoring,
    Paused,
    Escalated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseEvent {
    Pause,
    Resume,
    Escalate,
    HandBack,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeadError {
    #[error("lead '{0}' not found")]
    NotFound(String),
    #[error("cannot apply {event:?} to a lead in phase {from:?}")]
    InvalidTransition {
        from: LeadPhase,
        event: PhaseEvent,
    },
    #[error("failed to load leads: {0}")]
    Load(String),
}

impl LeadPhase {
    pub fn apply(self, event: PhaseEvent) -> Result<LeadPhase, LeadError> {
        use LeadPhase::*;
        use PhaseEvent::*;
        match (self, event) {
            (Monitoring, Pause) => Ok(Paused),
            (Paused, Resume) => Ok(Monitoring),
            (Monitoring | Paused, Escalate) => Ok(Escalated),
            (Escalated, HandBack) => Ok(Monitoring),
            (from, event) => Err(LeadError::InvalidTransition { from, event }),
        }
    }

    /// Maps the legacy pair of dashboard flags onto a phase.
    pub fn from_flags(ai_paused: bool, monitoring_active: bool) -> LeadPhase {
        match (ai_paused, monitoring_active) {
            (true, _) => LeadPhase::Paused,
            (false, true) => LeadPhase::Monitoring,
            (false, false) => LeadPhase::Paused,
        }
    }

    pub fn accepts_ai_replies(self) -> bool {
        self == LeadPhase::Monitoring
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "LeadRecord")]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub source: String,
    pub status: LeadStatus,
    pub last_message: String,
    pub timestamp: DateTime<Utc>,
    pub score: u8,
    #[serde(default)]
    pub interests: Vec<String>,
    pub phase: LeadPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_hours: Option<f32>,
    pub interaction_count: u32,
    pub last_speaker: Speaker,
}

/// Stored lead shape. Older exports carry `isAiPaused`/`monitoringActive`
/// instead of `phase`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeadRecord {
    id: String,
    name: String,
    phone: String,
    source: String,
    status: LeadStatus,
    last_message: String,
    timestamp: DateTime<Utc>,
    score: u8,
    #[serde(default)]
    interests: Vec<String>,
    #[serde(default)]
    phase: Option<LeadPhase>,
    #[serde(default)]
    is_ai_paused: bool,
    #[serde(default)]
    monitoring_active: bool,
    #[serde(default)]
    waiting_hours: Option<f32>,
    interaction_count: u32,
    last_speaker: Speaker,
}

impl From<LeadRecord> for Lead {
    fn from(record: LeadRecord) -> Self {
        let phase = record.phase.unwrap_or_else(||
            LeadPhase::from_flags(record.is_ai_paused, record.monitoring_active)
        );
        Lead {
            id: record.id,
            name: record.name,
            phone: record.phone,
            source: record.source,
            status: record.status,
            last_message: record.last_message,
            timestamp: record.timestamp,
            score: record.score,
            interests: record.interests,
            phase,
            waiting_hours: record.waiting_hours,
            interaction_count: record.interaction_count,
            last_speaker: record.last_speaker,
        }
    }
}

impl Lead {
    pub fn transition(&mut self, event: PhaseEvent) -> Result<LeadPhase, LeadError> {
        self.phase = self.phase.apply(event)?;
        Ok(self.phase)
    }

    /// Records an automated exchange: the lead spoke, the assistant answered.
    pub fn record_ai_exchange(&mut self, message: &str) {
        self.last_message = message.to_string();
        self.timestamp = Utc::now();
        self.interaction_count = self.interaction_count.saturating_add(1);
        self.last_speaker = Speaker::Ai;
        self.waiting_hours = Some(0.0);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadStats {
    pub total: usize,
    pub new: usize,
    pub qualifying: usize,
    pub hot: usize,
    pub cold: usize,
    pub follow_up: usize,
    pub escalated: usize,
}

impl LeadStats {
    pub fn from_leads(leads: &[Lead]) -> Self {
        let mut stats = LeadStats { total: leads.len(), ..Default::default() };
        for lead in leads {
            match lead.status {
                LeadStatus::New => {
                    stats.new += 1;
                }
                LeadStatus::Qualifying => {
                    stats.qualifying += 1;
                }
                LeadStatus::Hot => {
                    stats.hot += 1;
                }
                LeadStatus::Cold => {
                    stats.cold += 1;
                }
                LeadStatus::FollowUp => {
                    stats.follow_up += 1;
                }
            }
            if lead.phase == LeadPhase::Escalated {
                stats.escalated += 1;
            }
        }
        stats
    }
}

pub fn parse_leads(json: &str) -> Result<Vec<Lead>, LeadError> {
    serde_json::from_str(json).map_err(|e| LeadError::Load(e.to_string()))
}

pub fn seed_leads() -> Result<Vec<Lead>, LeadError> {
    parse_leads(SEED_LEADS)
}

pub fn load_leads(path: &str) -> Result<Vec<Lead>, LeadError> {
    let content = fs
        ::read_to_string(path)
        .map_err(|e| LeadError::Load(format!("failed to read '{}': {}", path, e)))?;
    parse_leads(&content)
}
