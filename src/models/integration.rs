use serde::{ Deserialize, Serialize };
use thiserror::Error;
use url::Url;

const MASK: &str = "********";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("webhook URL '{0}' is not a valid http(s) URL")]
    InvalidWebhookUrl(String),
    #[error("guardian timeout must be greater than zero hours")]
    InvalidTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Soft,
    Persuasive,
}

/// Follow-up policy for leads that went quiet. Stored only; nothing acts on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianMode {
    pub enabled: bool,
    pub timeout_hours: f32,
    pub intensity: Intensity,
    pub monitor_new_leads: bool,
}

impl Default for GuardianMode {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_hours: 24.0,
            intensity: Intensity::Soft,
            monitor_new_leads: true,
        }
    }
}

#[derive(Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub verify_token: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub guardian_mode: GuardianMode,
}

impl std::fmt::Debug for WhatsAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsAppConfig")
            .field("phone_number_id", &self.phone_number_id)
            .field("access_token", &"[redacted]")
            .field("verify_token", &"[redacted]")
            .field("webhook_url", &self.webhook_url)
            .field("is_active", &self.is_active)
            .field("guardian_mode", &self.guardian_mode)
            .finish()
    }
}

impl WhatsAppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.webhook_url.trim().is_empty() {
            let parsed = Url::parse(&self.webhook_url).map_err(|_|
                ConfigError::InvalidWebhookUrl(self.webhook_url.clone())
            )?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidWebhookUrl(self.webhook_url.clone()));
            }
        }
        if !(self.guardian_mode.timeout_hours > 0.0) {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    /// Copy safe to hand back to the dashboard: secrets replaced by a mask.
    pub fn masked(&self) -> Self {
        let mask = |s: &str| if s.is_empty() { String::new() } else { MASK.to_string() };
        Self {
            access_token: mask(&self.access_token),
            verify_token: mask(&self.verify_token),
            ..self.clone()
        }
    }

    /// Applies an update coming from the form. Masked secrets keep the stored value.
    pub fn merge_update(&self, mut update: WhatsAppConfig) -> WhatsAppConfig {
        if update.access_token == MASK {
            update.access_token = self.access_token.clone();
        }
        if update.verify_token == MASK {
            update.verify_token = self.verify_token.clone();
        }
        update
    }
}
