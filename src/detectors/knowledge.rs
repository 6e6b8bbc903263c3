//! Knowledge-retrieval detector.
//!
//! Retrieves brand and tactic indicators from the knowledge base that
//! actually appear in the message, then scores the retrieval
//! heuristically. When a brand matches strongly enough it emits a
//! structured [`BrandJudgment`] carrying its own confidence; the
//! fusion engine uses that judgment as its single escalation signal.

use crate::detectors::{BrandJudgment, Detector, DetectorId, DetectorResult, SignalPayload};
use crate::knowledge_base::KnowledgeBase;
use crate::message::Message;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Minimum brand-match score before a judgment is emitted.
const JUDGMENT_THRESHOLD: f64 = 0.2;

const SUBJECT_URGENCY_WORDS: &[&str] = &["urgent", "immediately", "alert", "warning", "action required"];
const SENSITIVE_PHRASES: &[&str] = &[
    "password",
    "credential",
    "credit card",
    "ssn",
    "social security",
    "account number",
];
const GRAMMAR_TELLS: &[&str] = &[
    "kindly",
    "do the needful",
    "valued customer",
    "dear customer",
    "dear user",
    "dear account holder",
];

#[derive(Debug, Clone, Serialize)]
pub struct TacticRetrieval {
    pub found_indicators: Vec<String>,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeReport {
    pub tactics_matched: BTreeMap<String, TacticRetrieval>,
    pub brand_judgment: Option<BrandJudgment>,
    pub heuristic_score: f64,
}

pub struct KnowledgeDetector {
    knowledge: Arc<KnowledgeBase>,
}

impl KnowledgeDetector {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }

    fn retrieve_tactics(&self, text: &str) -> BTreeMap<String, TacticRetrieval> {
        let mut matched = BTreeMap::new();
        for (tactic, indicators) in &self.knowledge.tactics {
            let found: Vec<String> = indicators
                .iter()
                .filter(|indicator| text.contains(indicator.as_str()))
                .cloned()
                .collect();
            if !found.is_empty() {
                let score = (found.len() as f64 / 10.0).min(1.0);
                matched.insert(
                    tactic.clone(),
                    TacticRetrieval {
                        found_indicators: found,
                        score,
                    },
                );
            }
        }
        matched
    }

    /// Score every known brand against the message and keep the best
    /// match. A brand scores when it is talked about while the sender
    /// domain is not one of its own, when the sender address carries
    /// one of its impersonation fragments, or when the subject matches
    /// a known phishing subject for it.
    fn judge_brands(&self, message: &Message, text: &str) -> Option<BrandJudgment> {
        let sender_lower = message.sender.to_lowercase();
        let sender_domain = message.sender_domain();
        let subject_lower = message.subject.to_lowercase();

        let mut best: Option<BrandJudgment> = None;
        for (brand, record) in &self.knowledge.brands {
            let brand_lower = brand.to_lowercase();
            let mut score = 0.0;
            let mut matched_patterns = Vec::new();

            let mentioned = text.contains(&brand_lower)
                || record.domains.iter().any(|d| text.contains(d.as_str()));
            let sender_is_legitimate = sender_domain.as_deref().is_some_and(|sd| {
                record
                    .domains
                    .iter()
                    .any(|d| sd == d || sd.ends_with(&format!(".{d}")))
            });
            if mentioned && !sender_is_legitimate {
                score += 0.5;
            }

            for pattern in &record.suspicious_patterns {
                if sender_lower.contains(pattern.as_str()) {
                    score += 0.3;
                    matched_patterns.push(pattern.clone());
                }
            }

            if record
                .common_subjects
                .iter()
                .any(|s| subject_lower.contains(s.as_str()))
            {
                score += 0.2;
            }

            if score > best.as_ref().map_or(0.0, |b| b.confidence) {
                best = Some(BrandJudgment {
                    brand: brand.clone(),
                    confidence: score.min(1.0),
                    legitimate_domains: record.domains.clone(),
                    matched_patterns,
                });
            }
        }

        best.filter(|j| j.confidence > JUDGMENT_THRESHOLD)
    }

    fn heuristic_score(&self, message: &Message, report: &KnowledgeReport) -> f64 {
        let mut score = 0.0;

        let tactic_sum: f64 = report.tactics_matched.values().map(|t| t.score).sum();
        score += (tactic_sum * 0.25).min(0.5);

        if let Some(judgment) = &report.brand_judgment {
            score += judgment.confidence * 0.3;
        }

        let subject_lower = message.subject.to_lowercase();
        if SUBJECT_URGENCY_WORDS.iter().any(|w| subject_lower.contains(w)) {
            score += 0.1;
        }

        let content_lower = message.content.to_lowercase();
        if SENSITIVE_PHRASES.iter().any(|p| content_lower.contains(p)) {
            score += 0.2;
        }
        if GRAMMAR_TELLS.iter().any(|p| content_lower.contains(p)) {
            score += 0.1;
        }

        score.min(1.0)
    }
}

#[async_trait]
impl Detector for KnowledgeDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Knowledge
    }

    async fn evaluate(&self, message: &Message) -> Result<DetectorResult> {
        let text = message.combined_text().to_lowercase();

        let mut report = KnowledgeReport {
            tactics_matched: self.retrieve_tactics(&text),
            brand_judgment: self.judge_brands(message, &text),
            heuristic_score: 0.0,
        };
        report.heuristic_score = self.heuristic_score(message, &report);

        log::debug!(
            "knowledge: {} tactic(s), brand judgment {:?}, score {:.3}",
            report.tactics_matched.len(),
            report.brand_judgment.as_ref().map(|j| &j.brand),
            report.heuristic_score
        );

        let score = report.heuristic_score;
        Ok(DetectorResult::new(
            DetectorId::Knowledge,
            score,
            SignalPayload::Knowledge(report),
        ))
    }
}
