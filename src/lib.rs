pub mod config;
pub mod detectors;
pub mod domains;
pub mod engine;
pub mod explanation;
pub mod knowledge_base;
pub mod message;
pub mod registry;
pub mod statistics;

pub use config::Config;
pub use detectors::{Detector, DetectorId, DetectorResult};
pub use engine::{AnalysisResult, FusionEngine, Verdict};
pub use knowledge_base::KnowledgeBase;
pub use message::Message;
pub use registry::ComponentRegistry;
pub use statistics::{StatEvent, StatisticsCollector};
