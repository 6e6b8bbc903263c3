use serde::{Deserialize, Serialize};

/// Immutable per-request input. Built once by the request-handling
/// layer and borrowed by every detector for the duration of one
/// analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
    /// Rendered HTML body, when the client supplied one. Only the
    /// brand-visual detector looks at it.
    #[serde(default)]
    pub html_body: Option<String>,
}

impl Message {
    pub fn new(sender: &str, subject: &str, content: &str) -> Self {
        Self {
            sender: sender.to_string(),
            subject: subject.to_string(),
            content: content.to_string(),
            html_body: None,
        }
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html_body = Some(html.to_string());
        self
    }

    /// Subject and content both empty. No detector can produce a
    /// meaningful signal on such a message, so the engine short-circuits.
    pub fn is_empty(&self) -> bool {
        self.subject.trim().is_empty() && self.content.trim().is_empty()
    }

    /// Subject and body joined for detectors that scan both.
    pub fn combined_text(&self) -> String {
        if self.subject.is_empty() {
            self.content.clone()
        } else if self.content.is_empty() {
            self.subject.clone()
        } else {
            format!("{} {}", self.subject, self.content)
        }
    }

    /// Domain part of the sender address, lowercased.
    pub fn sender_domain(&self) -> Option<String> {
        self.sender
            .rsplit('@')
            .next()
            .filter(|d| !d.is_empty() && d.contains('.'))
            .map(|d| d.trim_end_matches('>').to_lowercase())
    }
}
