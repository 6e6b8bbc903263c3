//! In-memory analysis counters.
//!
//! Events flow over an unbounded channel into a worker task so the
//! analysis path never blocks on bookkeeping. Counters live only as
//! long as the process; nothing is persisted.

use crate::detectors::DetectorId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug)]
pub enum StatEvent {
    MessageAnalyzed {
        suspicious: bool,
        confidence: f64,
        analysis_time_ms: u64,
    },
    DetectorError {
        detector: DetectorId,
    },
    Snapshot(oneshot::Sender<StatsSnapshot>),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub total_messages: u64,
    pub suspicious: u64,
    pub legitimate: u64,
    pub total_analysis_time_ms: u64,
    pub confidence_sum: f64,
    pub detector_errors: BTreeMap<DetectorId, u64>,
    pub uptime_seconds: u64,
}

impl StatsSnapshot {
    pub fn average_confidence(&self) -> f64 {
        if self.total_messages == 0 {
            0.0
        } else {
            self.confidence_sum / self.total_messages as f64
        }
    }

    pub fn average_analysis_time_ms(&self) -> f64 {
        if self.total_messages == 0 {
            0.0
        } else {
            self.total_analysis_time_ms as f64 / self.total_messages as f64
        }
    }
}

pub struct StatisticsCollector {
    sender: mpsc::UnboundedSender<StatEvent>,
    _handle: tokio::task::JoinHandle<()>,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = tokio::spawn(Self::stats_worker(receiver));
        Self {
            sender,
            _handle: handle,
        }
    }

    pub fn record_event(&self, event: StatEvent) {
        if let Err(e) = self.sender.send(event) {
            log::warn!("Failed to send statistics event: {e}");
        }
    }

    pub async fn snapshot(&self) -> Option<StatsSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.record_event(StatEvent::Snapshot(tx));
        rx.await.ok()
    }

    async fn stats_worker(mut receiver: mpsc::UnboundedReceiver<StatEvent>) {
        let started = Instant::now();
        let mut snapshot = StatsSnapshot::default();

        while let Some(event) = receiver.recv().await {
            match event {
                StatEvent::MessageAnalyzed {
                    suspicious,
                    confidence,
                    analysis_time_ms,
                } => {
                    snapshot.total_messages += 1;
                    if suspicious {
                        snapshot.suspicious += 1;
                    } else {
                        snapshot.legitimate += 1;
                    }
                    snapshot.confidence_sum += confidence;
                    snapshot.total_analysis_time_ms += analysis_time_ms;
                }
                StatEvent::DetectorError { detector } => {
                    *snapshot.detector_errors.entry(detector).or_insert(0) += 1;
                }
                StatEvent::Snapshot(reply) => {
                    let mut out = snapshot.clone();
                    out.uptime_seconds = started.elapsed().as_secs();
                    let _ = reply.send(out);
                }
            }
        }
    }
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_verdicts_separately() {
        let collector = StatisticsCollector::new();
        collector.record_event(StatEvent::MessageAnalyzed {
            suspicious: true,
            confidence: 0.8,
            analysis_time_ms: 12,
        });
        collector.record_event(StatEvent::MessageAnalyzed {
            suspicious: false,
            confidence: 0.2,
            analysis_time_ms: 8,
        });

        let snapshot = collector.snapshot().await.unwrap();
        assert_eq!(snapshot.total_messages, 2);
        assert_eq!(snapshot.suspicious, 1);
        assert_eq!(snapshot.legitimate, 1);
        assert!((snapshot.average_confidence() - 0.5).abs() < 1e-9);
        assert!((snapshot.average_analysis_time_ms() - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_detector_errors_accumulate() {
        let collector = StatisticsCollector::new();
        collector.record_event(StatEvent::DetectorError {
            detector: DetectorId::Llm,
        });
        collector.record_event(StatEvent::DetectorError {
            detector: DetectorId::Llm,
        });

        let snapshot = collector.snapshot().await.unwrap();
        assert_eq!(snapshot.detector_errors.get(&DetectorId::Llm), Some(&2));
        assert_eq!(snapshot.total_messages, 0);
        assert_eq!(snapshot.average_confidence(), 0.0);
    }
}
