//! Credit-risk assessment: form editing, remote scoring, debounced what-if
//! simulation, confidence and recommendations, and the session ledger.

pub mod advisor;
pub mod batch;
pub mod client;
pub mod debounce;
pub mod decision;
pub mod domain;
pub mod features;
pub mod ledger;
pub mod orchestrator;
pub mod report;
pub mod session;

#[cfg(test)]
mod tests;

pub use advisor::{AdvisoryRule, ValidationWarning};
pub use batch::{normalize_rows, BatchResponse, BatchResult, RawRow};
pub use client::{
    with_retries, OversightSnapshot, PredictionClient, RetryPolicy, RiskApi, ServiceInfo,
    ServiceStatus, TransportError,
};
pub use decision::{estimate, recommend, ConfidenceBand, ConfidenceResult};
pub use domain::{
    FactorContribution, FieldKind, FieldValue, FormError, FormField, FormInput, Prediction,
};
pub use features::feature_label;
pub use ledger::{format_delta, HistoryEntry, Scenario, ScenarioLedger};
pub use orchestrator::{
    AssessError, AssessmentOrchestrator, AssessmentPhase, OrchestratorEvent,
    OrchestratorSettings, RequestKind,
};
pub use report::AssessmentReport;
pub use session::{
    FileStorage, Language, MemoryStorage, PersistenceError, Role, SessionStorage, SessionStore,
    StorageError,
};
