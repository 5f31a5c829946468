//! FuseGate Search
//!
//! Retrieval half of the evidence pipeline:
//! - Query complexity routing
//! - Bounded, hedged, coalesced multi-source retrieval
//! - Per-source score calibration
//! - Calibrated rank fusion with URL canonicalization
//! - Cross-encoder reranking under a time budget
//! - The `EvidencePipeline` that ties them to the guard chain

pub mod calibration;
pub mod coalesce;
pub mod fusion;
pub mod pipeline;
pub mod rerank;
pub mod retrieval;
pub mod routing;
pub mod types;

pub use calibration::ScoreCalibrator;
pub use coalesce::{source_flight, SingleFlight, SourceFlight};
pub use fusion::RankFusionEngine;
pub use pipeline::{EvidencePipeline, PipelineOutput};
pub use rerank::{CrossEncoderReranker, InferenceScorer, RerankOutcome, RerankStrategy, TimeBudget};
pub use retrieval::{Fixture, RetrievalCoordinator, SearchAdapter};
pub use routing::{ComplexityRouter, QueryProfile, QueryTag, RoutingHints};
pub use types::{RankedHit, SearchHit, SourceResults};
