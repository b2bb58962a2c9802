use serde::{ Deserialize, Serialize };

use crate::llm::GroundingLink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResult {
    pub priority_summary: String,
    pub action_items: Vec<String>,
}

impl AnalyticsResult {
    pub fn fallback(summary: &str) -> Self {
        Self { priority_summary: summary.to_string(), action_items: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifyResult {
    pub text: String,
    pub is_handoff: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodReport {
    pub text: String,
    pub links: Vec<GroundingLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}
