//! Language-model detector.
//!
//! Sends the message to an OpenAI-compatible chat endpoint and parses
//! a free-form judgment (boolean, confidence, techniques, rationale)
//! out of the reply. The call is a fallible RPC: any transport or
//! parse trouble surfaces as a detector-local error that the fusion
//! engine isolates. Identical messages are memoized in-adapter so
//! repeated analyses do not pay for repeated inference.

use crate::detectors::{Detector, DetectorId, DetectorResult, SignalPayload};
use crate::message::Message;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

const SYSTEM_PROMPT: &str =
    "You are a cybersecurity expert analyzing emails for phishing. Reply with JSON only.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmJudgment {
    pub is_phishing: bool,
    pub confidence: f64,
    #[serde(default)]
    pub techniques_detected: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    pub score: f64,
}

pub struct LlmDetector {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    cache: Mutex<HashMap<String, LlmJudgment>>,
}

impl LlmDetector {
    pub fn new(endpoint: String, model: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
            api_key,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the adapter can make calls at all. Checked once at
    /// registry construction; a missing key makes the detector
    /// unavailable rather than per-call failing.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn cache_key(message: &Message) -> String {
        let head: String = message.content.chars().take(100).collect();
        format!("{}|{}|{}", message.sender, message.subject, head)
    }

    fn build_prompt(message: &Message) -> String {
        format!(
            "Analyze this message and determine if it is a phishing attempt.\n\n\
             SENDER: {}\nSUBJECT: {}\nCONTENT: {}\n\n\
             Reply with JSON only, using exactly these fields:\n\
             {{\"is_phishing\": true/false, \"confidence\": 0-1, \
             \"techniques_detected\": [\"...\"], \"reasoning\": \"...\", \"score\": 0-1}}\n\n\
             Consider brand impersonation, psychological manipulation, urgency or \
             pressure tactics, suspicious links, requests for sensitive information, \
             and inconsistencies in the sender address.",
            message.sender, message.subject, message.content
        )
    }

    /// Parse the model reply: prefer the first JSON object in the
    /// text, fall back to keyword sniffing when the model ignored the
    /// format instruction.
    fn parse_reply(content: &str) -> LlmJudgment {
        if let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) {
            if end > start {
                if let Ok(judgment) = serde_json::from_str::<LlmJudgment>(&content[start..=end]) {
                    return LlmJudgment {
                        confidence: judgment.confidence.clamp(0.0, 1.0),
                        score: judgment.score.clamp(0.0, 1.0),
                        ..judgment
                    };
                }
            }
        }

        let lower = content.to_lowercase();
        let is_phishing = lower.contains("phishing") && !lower.contains("not phishing");
        let score = if is_phishing { 0.7 } else { 0.3 };
        LlmJudgment {
            is_phishing,
            confidence: score,
            techniques_detected: Vec::new(),
            reasoning: content.chars().take(500).collect(),
            score,
        }
    }

    async fn query(&self, message: &Message) -> Result<LlmJudgment> {
        let Some(api_key) = &self.api_key else {
            bail!("no API key configured for the LLM detector");
        };

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": Self::build_prompt(message)},
            ],
            "temperature": 0.1,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("LLM request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            bail!("LLM endpoint returned {status}");
        }

        let reply: serde_json::Value = response
            .json()
            .await
            .context("LLM reply was not valid JSON")?;
        let content = reply
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .context("LLM reply carried no message content")?;

        Ok(Self::parse_reply(content))
    }
}

#[async_trait]
impl Detector for LlmDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Llm
    }

    async fn evaluate(&self, message: &Message) -> Result<DetectorResult> {
        let key = Self::cache_key(message);
        let cached = self
            .cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key).cloned());

        let judgment = match cached {
            Some(judgment) => judgment,
            None => {
                let judgment = self.query(message).await?;
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(key, judgment.clone());
                }
                judgment
            }
        };

        log::debug!(
            "llm: is_phishing={}, score {:.3}",
            judgment.is_phishing,
            judgment.score
        );
        let score = judgment.score;
        Ok(DetectorResult::new(
            DetectorId::Llm,
            score,
            SignalPayload::Llm(judgment),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_reply() {
        let content = r#"Here is my analysis: {"is_phishing": true, "confidence": 0.9,
            "techniques_detected": ["urgency", "brand impersonation"],
            "reasoning": "Impersonates PayPal with urgent language.", "score": 0.85}"#;
        let judgment = LlmDetector::parse_reply(content);
        assert!(judgment.is_phishing);
        assert_eq!(judgment.score, 0.85);
        assert_eq!(judgment.techniques_detected.len(), 2);
    }

    #[test]
    fn test_parse_out_of_range_values_clamped() {
        let content = r#"{"is_phishing": true, "confidence": 1.7, "score": -0.2}"#;
        let judgment = LlmDetector::parse_reply(content);
        assert_eq!(judgment.confidence, 1.0);
        assert_eq!(judgment.score, 0.0);
    }

    #[test]
    fn test_parse_falls_back_to_keyword_sniffing() {
        let judgment = LlmDetector::parse_reply("This is clearly a phishing attempt.");
        assert!(judgment.is_phishing);
        assert_eq!(judgment.score, 0.7);

        let clean = LlmDetector::parse_reply("This message is not phishing.");
        assert!(!clean.is_phishing);
        assert_eq!(clean.score, 0.3);
    }

    #[tokio::test]
    async fn test_missing_key_is_a_detector_failure() {
        let detector = LlmDetector::new(
            "https://api.openai.com/v1/chat/completions".to_string(),
            "gpt-4o-mini".to_string(),
            None,
        );
        assert!(!detector.is_available());
        let msg = Message::new("a@b.com", "s", "c");
        assert!(detector.evaluate(&msg).await.is_err());
    }
}
