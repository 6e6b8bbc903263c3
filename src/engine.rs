//! Fusion engine.
//!
//! Runs every active detector over one message, folds their scores
//! into a weighted confidence, applies the decision threshold, blends
//! in the single high-trust escalation signal, and assembles the
//! complete analysis result. The engine holds no state across calls:
//! each analysis is a pure function of the message and the registry
//! snapshot it starts with.

use crate::detectors::{BrandJudgment, Detector, DetectorId, DetectorResult, SignalPayload};
use crate::domains::{extract_suspicious_domains, SuspiciousDomain};
use crate::explanation;
use crate::message::Message;
use crate::registry::{ComponentRegistry, WeightTable};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Default decision threshold: suspicious iff confidence exceeds it.
pub const DEFAULT_THRESHOLD: f64 = 0.5;
/// Default bound on a single detector invocation.
pub const DEFAULT_DETECTOR_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Suspicious,
    Legitimate,
}

/// Per-detector raw scores and effective weights, kept for
/// audit/debugging on every path, including the empty-message
/// short-circuit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TechnicalDetails {
    pub component_scores: BTreeMap<DetectorId, f64>,
    pub weights: BTreeMap<DetectorId, f64>,
    pub active_components: BTreeMap<DetectorId, bool>,
    pub final_score: f64,
    pub escalation_applied: bool,
    /// One entry per detector that failed or timed out this analysis.
    pub errors: BTreeMap<DetectorId, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub verdict: Verdict,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub extracted_urls: Vec<String>,
    pub suspicious_domains: Vec<SuspiciousDomain>,
    pub impersonated_brand: Option<String>,
    pub tactics_used: Vec<String>,
    pub recommendation: String,
    pub technical_details: TechnicalDetails,
    pub analysis_time_ms: u64,
}

impl AnalysisResult {
    pub fn is_suspicious(&self) -> bool {
        self.verdict == Verdict::Suspicious
    }
}

pub struct FusionEngine {
    detectors: Vec<Arc<dyn Detector>>,
    registry: Arc<ComponentRegistry>,
    threshold: f64,
    detector_timeout: Duration,
}

impl FusionEngine {
    pub fn new(registry: Arc<ComponentRegistry>, detectors: Vec<Arc<dyn Detector>>) -> Self {
        Self {
            detectors,
            registry,
            threshold: DEFAULT_THRESHOLD,
            detector_timeout: DEFAULT_DETECTOR_TIMEOUT,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_detector_timeout(mut self, detector_timeout: Duration) -> Self {
        self.detector_timeout = detector_timeout;
        self
    }

    /// Analyze one message. Never fails: detector trouble degrades the
    /// score, it does not surface to the caller.
    pub async fn analyze(&self, message: &Message) -> AnalysisResult {
        let started = Instant::now();
        let table = self.registry.active_weights();

        if message.is_empty() {
            return self.empty_result(&table, started);
        }

        let mut results: Vec<DetectorResult> = Vec::new();
        let mut scores: BTreeMap<DetectorId, f64> = BTreeMap::new();
        let mut errors: BTreeMap<DetectorId, String> = BTreeMap::new();

        for detector in &self.detectors {
            let id = detector.id();
            if !table.is_active(id) {
                continue;
            }

            // Fault isolation: a failing or slow detector scores 0 but
            // keeps its renormalized weight, so it cannot inflate the
            // influence of the detectors that did answer.
            match timeout(self.detector_timeout, detector.evaluate(message)).await {
                Ok(Ok(result)) => {
                    scores.insert(id, result.score);
                    results.push(result);
                }
                Ok(Err(e)) => {
                    log::warn!("detector {id} failed: {e:#}");
                    scores.insert(id, 0.0);
                    errors.insert(id, format!("{e:#}"));
                }
                Err(_) => {
                    log::warn!(
                        "detector {id} timed out after {:?}",
                        self.detector_timeout
                    );
                    scores.insert(id, 0.0);
                    errors.insert(id, format!("timed out after {:?}", self.detector_timeout));
                }
            }
        }

        let mut confidence: f64 = scores
            .iter()
            .map(|(id, score)| score * table.get(*id))
            .sum();
        confidence = confidence.clamp(0.0, 1.0);
        let mut suspicious = confidence > self.threshold;

        // Escalation pass: one post-sum blend of the high-trust brand
        // judgment, applied at most once, capable of flipping the
        // verdict either way.
        let judgment = brand_judgment(&results);
        let escalation_applied = judgment.is_some();
        if let Some(judgment) = judgment {
            confidence = (confidence + judgment.confidence) / 2.0;
            suspicious = confidence > self.threshold;
        }

        let url_report = results.iter().find_map(|r| match &r.payload {
            SignalPayload::Urls(report) => Some(report),
            _ => None,
        });
        let extracted_urls = url_report.map(|r| r.urls_found.clone()).unwrap_or_default();
        let suspicious_domains = extract_suspicious_domains(url_report, brand_judgment(&results));

        let impersonated_brand = brand_judgment(&results)
            .map(|j| j.brand.clone())
            .or_else(|| {
                results.iter().find_map(|r| match &r.payload {
                    SignalPayload::BrandVisual(report) => report.impersonated_brand.clone(),
                    _ => None,
                })
            });

        let tactics_used = results
            .iter()
            .find_map(|r| match &r.payload {
                SignalPayload::Tactics(report) => {
                    Some(report.tactics_detected.keys().cloned().collect())
                }
                _ => None,
            })
            .unwrap_or_default();

        let reasons = explanation::build_reasons(&results, suspicious);
        let recommendation = explanation::build_recommendation(&results, suspicious);

        let technical_details = TechnicalDetails {
            component_scores: scores,
            weights: table.iter().collect(),
            active_components: self.registry.active_flags(),
            final_score: confidence,
            escalation_applied,
            errors,
        };

        AnalysisResult {
            verdict: if suspicious {
                Verdict::Suspicious
            } else {
                Verdict::Legitimate
            },
            confidence,
            reasons,
            extracted_urls,
            suspicious_domains,
            impersonated_brand,
            tactics_used,
            recommendation,
            technical_details,
            analysis_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Deterministic result for a message with no text at all; no
    /// detector runs, the technical-detail record is a minimal stub.
    fn empty_result(&self, table: &WeightTable, started: Instant) -> AnalysisResult {
        AnalysisResult {
            verdict: Verdict::Legitimate,
            confidence: 0.0,
            reasons: vec!["Empty message".to_string()],
            extracted_urls: Vec::new(),
            suspicious_domains: Vec::new(),
            impersonated_brand: None,
            tactics_used: Vec::new(),
            recommendation:
                "This message contains no content to analyze. Treat unexpected empty messages \
                 with caution."
                    .to_string(),
            technical_details: TechnicalDetails {
                component_scores: BTreeMap::new(),
                weights: table.iter().collect(),
                active_components: self.registry.active_flags(),
                final_score: 0.0,
                escalation_applied: false,
                errors: BTreeMap::new(),
            },
            analysis_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn brand_judgment(results: &[DetectorResult]) -> Option<&BrandJudgment> {
    results.iter().find_map(|r| match &r.payload {
        SignalPayload::Knowledge(report) => report.brand_judgment.as_ref(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::knowledge::KnowledgeReport;
    use crate::detectors::tactics::TacticsReport;
    use crate::detectors::urls::UrlReport;
    use anyhow::anyhow;
    use async_trait::async_trait;

    /// Deterministic stand-in returning a fixed score.
    struct StaticDetector {
        id: DetectorId,
        score: f64,
        judgment: Option<BrandJudgment>,
    }

    impl StaticDetector {
        fn new(id: DetectorId, score: f64) -> Self {
            Self {
                id,
                score,
                judgment: None,
            }
        }

        fn with_judgment(mut self, brand: &str, confidence: f64) -> Self {
            self.judgment = Some(BrandJudgment {
                brand: brand.to_string(),
                confidence,
                legitimate_domains: vec![format!("{}.com", brand.to_lowercase())],
                matched_patterns: vec![],
            });
            self
        }
    }

    #[async_trait]
    impl Detector for StaticDetector {
        fn id(&self) -> DetectorId {
            self.id
        }

        async fn evaluate(&self, _message: &Message) -> anyhow::Result<DetectorResult> {
            let payload = match self.id {
                DetectorId::Knowledge => SignalPayload::Knowledge(KnowledgeReport {
                    brand_judgment: self.judgment.clone(),
                    ..KnowledgeReport::default()
                }),
                DetectorId::Urls => SignalPayload::Urls(UrlReport::default()),
                _ => SignalPayload::Tactics(TacticsReport::default()),
            };
            Ok(DetectorResult::new(self.id, self.score, payload))
        }
    }

    struct FailingDetector(DetectorId);

    #[async_trait]
    impl Detector for FailingDetector {
        fn id(&self) -> DetectorId {
            self.0
        }

        async fn evaluate(&self, _message: &Message) -> anyhow::Result<DetectorResult> {
            Err(anyhow!("detector backend unavailable"))
        }
    }

    struct SlowDetector(DetectorId);

    #[async_trait]
    impl Detector for SlowDetector {
        fn id(&self) -> DetectorId {
            self.0
        }

        async fn evaluate(&self, _message: &Message) -> anyhow::Result<DetectorResult> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(DetectorResult::new(
                self.0,
                1.0,
                SignalPayload::Urls(UrlReport::default()),
            ))
        }
    }

    fn det(detector: impl Detector + 'static) -> Arc<dyn Detector> {
        Arc::new(detector)
    }

    fn message() -> Message {
        Message::new("someone@example.com", "subject", "body text")
    }

    fn engine_with(entries: Vec<(Arc<dyn Detector>, f64)>) -> FusionEngine {
        let registry = Arc::new(ComponentRegistry::new());
        let mut detectors = Vec::new();
        for (detector, weight) in entries {
            registry.register(detector.id(), weight, true, true);
            detectors.push(detector);
        }
        FusionEngine::new(registry, detectors)
    }

    #[tokio::test]
    async fn test_empty_message_short_circuits() {
        let engine = engine_with(vec![(
            det(StaticDetector::new(DetectorId::Tactics, 1.0)),
            1.0,
        )]);
        let result = engine.analyze(&Message::new("a@b.com", "", "")).await;

        assert_eq!(result.verdict, Verdict::Legitimate);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reasons, vec!["Empty message".to_string()]);
        // Technical details present even on the short-circuit path.
        assert!(!result.technical_details.weights.is_empty());
        assert!(result.technical_details.component_scores.is_empty());
    }

    #[tokio::test]
    async fn test_single_detector_full_weight() {
        let engine = engine_with(vec![(
            det(StaticDetector::new(DetectorId::Tactics, 0.9)),
            0.4,
        )]);
        let result = engine.analyze(&message()).await;
        assert!((result.confidence - 0.9).abs() < 1e-9);
        assert_eq!(result.verdict, Verdict::Suspicious);
    }

    #[tokio::test]
    async fn test_weighted_sum_two_detectors() {
        let engine = engine_with(vec![
            (det(StaticDetector::new(DetectorId::Tactics, 0.8)), 0.6),
            (det(StaticDetector::new(DetectorId::Urls, 0.2)), 0.4),
        ]);
        let result = engine.analyze(&message()).await;
        assert!((result.confidence - 0.56).abs() < 1e-9);
        assert_eq!(result.verdict, Verdict::Suspicious);
    }

    #[tokio::test]
    async fn test_failed_detector_weight_still_spent() {
        let engine = engine_with(vec![
            (det(StaticDetector::new(DetectorId::Tactics, 0.8)), 0.5),
            (det(FailingDetector(DetectorId::Urls)), 0.5),
        ]);
        let result = engine.analyze(&message()).await;

        // 0.8 * 0.5 + 0.0 * 0.5; the failing detector's weight is not
        // redistributed to the survivor.
        assert!((result.confidence - 0.4).abs() < 1e-9);
        assert_eq!(result.verdict, Verdict::Legitimate);
        assert!(result.technical_details.errors.contains_key(&DetectorId::Urls));
        assert_eq!(result.technical_details.errors.len(), 1);
        assert_eq!(
            result.technical_details.component_scores.get(&DetectorId::Urls),
            Some(&0.0)
        );

        // Against a solo run of the same surviving detector.
        let solo = engine_with(vec![(
            det(StaticDetector::new(DetectorId::Tactics, 0.8)),
            0.5,
        )]);
        let solo_result = solo.analyze(&message()).await;
        assert!((solo_result.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_timeout_treated_as_failure() {
        let engine = engine_with(vec![
            (det(StaticDetector::new(DetectorId::Tactics, 0.6)), 0.5),
            (det(SlowDetector(DetectorId::Urls)), 0.5),
        ])
        .with_detector_timeout(Duration::from_millis(20));

        let result = engine.analyze(&message()).await;
        assert!((result.confidence - 0.3).abs() < 1e-9);
        assert!(result
            .technical_details
            .errors
            .get(&DetectorId::Urls)
            .is_some_and(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn test_escalation_blends_and_flips_verdict() {
        let engine = engine_with(vec![
            (det(StaticDetector::new(DetectorId::Tactics, 0.3)), 0.5),
            (
                det(StaticDetector::new(DetectorId::Knowledge, 0.3)
                    .with_judgment("PayPal", 0.9)),
                0.5,
            ),
        ]);
        let result = engine.analyze(&message()).await;

        // Primary sum: 0.3*0.5 + 0.3*0.5 = 0.3; blended: (0.3 + 0.9)/2 = 0.6.
        assert!((result.confidence - 0.6).abs() < 1e-9);
        assert_eq!(result.verdict, Verdict::Suspicious);
        assert!(result.technical_details.escalation_applied);
        assert_eq!(result.impersonated_brand.as_deref(), Some("PayPal"));
    }

    #[tokio::test]
    async fn test_no_escalation_without_judgment() {
        let engine = engine_with(vec![
            (det(StaticDetector::new(DetectorId::Tactics, 0.3)), 0.5),
            (det(StaticDetector::new(DetectorId::Knowledge, 0.3)), 0.5),
        ]);
        let result = engine.analyze(&message()).await;
        assert!((result.confidence - 0.3).abs() < 1e-9);
        assert!(!result.technical_details.escalation_applied);
        assert_eq!(result.verdict, Verdict::Legitimate);
    }

    #[tokio::test]
    async fn test_total_failure_degrades_to_legitimate() {
        let engine = engine_with(vec![
            (det(FailingDetector(DetectorId::Tactics)), 0.5),
            (det(FailingDetector(DetectorId::Urls)), 0.5),
        ]);
        let result = engine.analyze(&message()).await;

        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.verdict, Verdict::Legitimate);
        assert_eq!(result.technical_details.errors.len(), 2);
        // Still a complete result.
        assert!(!result.reasons.is_empty());
        assert!(!result.recommendation.is_empty());
    }

    #[tokio::test]
    async fn test_inactive_detector_not_invoked() {
        let registry = Arc::new(ComponentRegistry::new());
        registry.register(DetectorId::Tactics, 0.4, true, true);
        registry.register(DetectorId::Urls, 0.3, true, false);
        let engine = FusionEngine::new(
            Arc::clone(&registry),
            vec![
                det(StaticDetector::new(DetectorId::Tactics, 0.9)),
                det(FailingDetector(DetectorId::Urls)),
            ],
        );

        let result = engine.analyze(&message()).await;
        // Disabled detector neither scored nor errored.
        assert!(result.technical_details.errors.is_empty());
        assert!(!result
            .technical_details
            .component_scores
            .contains_key(&DetectorId::Urls));
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_idempotent_for_deterministic_detectors() {
        let engine = engine_with(vec![
            (det(StaticDetector::new(DetectorId::Tactics, 0.7)), 0.6),
            (
                det(StaticDetector::new(DetectorId::Knowledge, 0.4).with_judgment("Chase", 0.8)),
                0.4,
            ),
        ]);

        let first = engine.analyze(&message()).await;
        let second = engine.analyze(&message()).await;

        let mut a = serde_json::to_value(&first).unwrap();
        let mut b = serde_json::to_value(&second).unwrap();
        // Wall-clock timing is the only field allowed to differ.
        a["analysis_time_ms"] = 0.into();
        b["analysis_time_ms"] = 0.into();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_confidence_always_in_unit_interval() {
        let engine = engine_with(vec![
            (det(StaticDetector::new(DetectorId::Tactics, 1.0)), 0.7),
            (
                det(StaticDetector::new(DetectorId::Knowledge, 1.0).with_judgment("Apple", 1.0)),
                0.3,
            ),
        ]);
        let result = engine.analyze(&message()).await;
        assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
    }
}
