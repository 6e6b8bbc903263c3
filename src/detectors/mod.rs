//! Detector adapters.
//!
//! Each detector is an independent signal source: it consumes one
//! immutable [`Message`] and produces a bounded suspicion score plus a
//! kind-specific payload. Detectors never see each other's output; the
//! fusion engine owns the combination.

pub mod brand_visual;
pub mod knowledge;
pub mod llm;
pub mod tactics;
pub mod urls;

use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identifier for every detector the registry knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DetectorId {
    /// Manipulation-tactic text patterns.
    Tactics,
    /// URL/domain suspicion analysis.
    Urls,
    /// Brand logo match from rendered markup.
    BrandVisual,
    /// External language-model judgment.
    Llm,
    /// Knowledge-base retrieval (brands and tactic indicators).
    Knowledge,
}

impl DetectorId {
    pub const ALL: [DetectorId; 5] = [
        DetectorId::Tactics,
        DetectorId::Urls,
        DetectorId::BrandVisual,
        DetectorId::Llm,
        DetectorId::Knowledge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorId::Tactics => "tactics",
            DetectorId::Urls => "urls",
            DetectorId::BrandVisual => "brand_visual",
            DetectorId::Llm => "llm",
            DetectorId::Knowledge => "knowledge",
        }
    }
}

impl std::fmt::Display for DetectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detector invocation's output. Produced once per message, never
/// mutated afterwards; owned by the fusion engine for the duration of
/// one analysis.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorResult {
    pub id: DetectorId,
    /// Normalized suspicion score, clamped to [0, 1] at construction.
    pub score: f64,
    pub payload: SignalPayload,
}

impl DetectorResult {
    pub fn new(id: DetectorId, score: f64, payload: SignalPayload) -> Self {
        Self {
            id,
            score: score.clamp(0.0, 1.0),
            payload,
        }
    }
}

/// Kind-specific evidence attached to a [`DetectorResult`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPayload {
    Tactics(tactics::TacticsReport),
    Urls(urls::UrlReport),
    BrandVisual(brand_visual::VisualReport),
    Llm(llm::LlmJudgment),
    Knowledge(knowledge::KnowledgeReport),
}

/// A structured brand-impersonation judgment carrying its own
/// confidence. The designated high-trust detector emits one of these
/// when it is sure enough; the fusion engine blends it into the
/// primary score exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct BrandJudgment {
    pub brand: String,
    pub confidence: f64,
    /// Domains the brand legitimately sends from; used by the
    /// suspicious-domain extractor to tag mismatches.
    pub legitimate_domains: Vec<String>,
    pub matched_patterns: Vec<String>,
}

/// Shared evaluation interface. An adapter either returns a bounded,
/// well-typed result or a detector-local failure; the engine isolates
/// failures at the call site.
#[async_trait]
pub trait Detector: Send + Sync {
    fn id(&self) -> DetectorId;

    async fn evaluate(&self, message: &Message) -> anyhow::Result<DetectorResult>;
}
