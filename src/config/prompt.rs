use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{ json, Value as JsonValue };
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::info;

const EMBEDDED_PROMPTS: &str = include_str!("../../json/prompts.json");

static DEFAULT_PROMPTS: Lazy<Arc<PromptConfig>> = Lazy::new(|| {
    let config = parse_prompts(EMBEDDED_PROMPTS).unwrap_or_else(|e|
        panic!("embedded prompts.json is invalid: {}", e)
    );
    Arc::new(config)
});

#[derive(Debug)]
pub enum PromptError {
    Invalid(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::Invalid(msg) => write!(f, "Invalid prompt configuration: {}", msg),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct QualificationPrompts {
    pub system_instruction: String,
    pub user_template: String,
    pub lead_name_template: String,
    pub empty_reply: String,
    pub failure_reply: String,
    pub greeting: String,
    pub handoff_cues: Vec<String>,
}

impl QualificationPrompts {
    /// True when the reply carries any handoff cue (case-insensitive).
    pub fn detects_handoff(&self, reply: &str) -> bool {
        let reply = reply.to_lowercase();
        self.handoff_cues
            .iter()
            .any(|cue| reply.contains(&cue.to_lowercase()))
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AnalyticsPrompts {
    pub template: String,
    pub summary_description: String,
    pub action_items_description: String,
    pub default_summary: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TemplatePrompt {
    pub template: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ConnectionPrompts {
    pub probe: String,
    pub invalid_key_message: String,
    pub missing_key_message: String,
    pub failure_message: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    pub qualification: QualificationPrompts,
    pub analytics: AnalyticsPrompts,
    pub neighborhood: TemplatePrompt,
    pub property_copy: TemplatePrompt,
    pub icebreaker: TemplatePrompt,
    pub connection: ConnectionPrompts,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        DEFAULT_PROMPTS.as_ref().clone()
    }
}

impl PromptConfig {
    pub fn shared_default() -> Arc<PromptConfig> {
        Arc::clone(&DEFAULT_PROMPTS)
    }

    fn validate(&self) -> Result<(), PromptError> {
        let required = [
            ("qualification.system_instruction", &self.qualification.system_instruction),
            ("qualification.empty_reply", &self.qualification.empty_reply),
            ("qualification.failure_reply", &self.qualification.failure_reply),
            ("qualification.greeting", &self.qualification.greeting),
            ("analytics.default_summary", &self.analytics.default_summary),
            ("connection.probe", &self.connection.probe),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(PromptError::Invalid(format!("'{}' must not be empty", key)));
            }
        }
        if self.qualification.handoff_cues.iter().all(|c| c.trim().is_empty()) {
            return Err(PromptError::Invalid("qualification.handoff_cues is empty".to_string()));
        }
        let placeholders = [
            ("qualification.user_template", &self.qualification.user_template, "{message}"),
            ("analytics.template", &self.analytics.template, "{leads_json}"),
            ("neighborhood.template", &self.neighborhood.template, "{address}"),
            ("property_copy.template", &self.property_copy.template, "{features}"),
            ("icebreaker.template", &self.icebreaker.template, "{lead_type}"),
        ];
        for (key, template, placeholder) in placeholders {
            if !template.contains(placeholder) {
                return Err(
                    PromptError::Invalid(format!("'{}' is missing {}", key, placeholder))
                );
            }
        }
        Ok(())
    }
}

fn parse_prompts(content: &str) -> Result<PromptConfig, PromptError> {
    let config: PromptConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub fn load_prompts(path: &str) -> Result<Arc<PromptConfig>, Box<dyn Error + Send + Sync>> {
    let file_content = fs
        ::read_to_string(path)
        .map_err(|e| format!("Failed to read prompts file '{}': {}", path, e))?;
    let mut config = parse_prompts(&file_content).map_err(|e|
        format!("Failed to parse prompts file '{}': {}", path, e)
    )?;
    config.last_loaded = Some(SystemTime::now());
    Ok(Arc::new(config))
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let path = path.as_ref();
    let metadata = fs::metadata(path)?;
    let path_str = path.to_string_lossy();

    if let Ok(modified) = metadata.modified() {
        let stale = match current_config.last_loaded {
            Some(last_loaded) => modified > last_loaded,
            None => true,
        };
        if stale {
            info!("Prompts file {} changed, reloading...", path_str);
            let new_config = load_prompts(&path_str).map_err(|e|
                PromptError::Invalid(e.to_string())
            )?;
            return Ok(Some(new_config));
        }
    }
    Ok(None)
}

/// Single-pass `{key}` substitution; substituted values are never rescanned.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match vars.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn get_qualification_prompt(
    config: &PromptConfig,
    message: &str,
    history: &[String],
    lead_name: Option<&str>
) -> String {
    let name_line = match lead_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => render(&config.qualification.lead_name_template, &[("name", name)]),
        None => String::new(),
    };
    let history = history.join(" | ");
    render(
        &config.qualification.user_template,
        &[
            ("lead_name", &name_line),
            ("history", &history),
            ("message", message),
        ]
    )
}

pub fn get_analytics_prompt(config: &PromptConfig, leads_json: &str) -> String {
    render(&config.analytics.template, &[("leads_json", leads_json)])
}

/// Response schema declared for the analytics call.
pub fn analytics_schema(config: &PromptConfig) -> JsonValue {
    json!({
        "type": "OBJECT",
        "properties": {
            "prioritySummary": {
                "type": "STRING",
                "description": config.analytics.summary_description
            },
            "actionItems": {
                "type": "ARRAY",
                "items": { "type": "STRING" },
                "description": config.analytics.action_items_description
            }
        },
        "required": ["prioritySummary", "actionItems"]
    })
}

pub fn get_neighborhood_prompt(config: &PromptConfig, address: &str) -> String {
    render(&config.neighborhood.template, &[("address", address)])
}

pub fn get_property_copy_prompt(config: &PromptConfig, features: &[String], style: &str) -> String {
    let features = features.join(", ");
    render(
        &config.property_copy.template,
        &[
            ("features", &features),
            ("style", style),
        ]
    )
}

pub fn get_icebreaker_prompt(config: &PromptConfig, lead_type: &str, context: &str) -> String {
    render(
        &config.icebreaker.template,
        &[
            ("lead_type", lead_type),
            ("context", context),
        ]
    )
}
