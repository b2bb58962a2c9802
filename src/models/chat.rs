use serde::{ Serialize, Deserialize };

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// Append-only conversation transcript.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new(lead_id: Option<String>) -> Self {
        Self { lead_id, messages: Vec::new() }
    }

    pub fn with_greeting(lead_id: Option<String>, greeting: &str) -> Self {
        let mut transcript = Self::new(lead_id);
        transcript.push(ChatMessage::assistant(greeting));
        transcript
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Message contents in order, as fed to qualification.
    pub fn history(&self) -> Vec<String> {
        self.messages
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_keeps_order() {
        let mut t = Transcript::with_greeting(None, "Oi!");
        t.push(ChatMessage::user("Quero um apê"));
        t.push(ChatMessage::assistant("Bah, em qual bairro?"));
        assert_eq!(t.len(), 3);
        assert_eq!(t.history(), vec!["Oi!", "Quero um apê", "Bah, em qual bairro?"]);
        assert_eq!(t.messages()[1].role, ChatRole::User);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }
}
