pub mod config;
pub mod domain;
pub mod errors;
pub mod estimate;
pub mod extract;
pub mod service;
pub mod store;
pub mod workflow;

pub use config::{AppConfig, LoadOptions, MergePolicy, ServiceConfig, WorkflowConfig};
pub use domain::conversation::{
    ConversationState, FieldValue, HistoryEntry, ImageRef, Role, SessionId,
};
pub use domain::estimate::{EstimateResult, PriceRange};
pub use errors::{EstimateError, ExtractionUnavailable, WorkflowError};
pub use extract::{FieldExtractor, ImageAnalyzer, NoopImageAnalyzer};
pub use service::EstimationService;
pub use store::SessionStore;
pub use workflow::{Node, TurnInput, TurnOutcome, WorkflowEngine};
