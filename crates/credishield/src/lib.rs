//! Loan-risk assessment orchestration: form state, scoring client, what-if
//! simulation, confidence and recommendations, and durable session history.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
