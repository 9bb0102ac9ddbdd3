//! The three classification strategies and the hybrid that combines two.

pub mod batch;
pub mod hybrid;
pub mod llm;
pub mod router;

pub use batch::{BatchClassifier, BatchError, BatchPoller, BatchRun, PollDecision};
pub use hybrid::{HybridCounters, HybridError, HybridOrchestrator, HybridOutcome, HybridStage};
pub use llm::{classification_request, LlmClassification, LlmClassifier};
pub use router::{RouterClassification, RouterClassifier};
