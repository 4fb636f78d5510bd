use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use crate::workflows::assessment::batch::{BatchResponse, BatchResult, RawRow};
use crate::workflows::assessment::client::{
    OversightSnapshot, RiskApi, ServiceInfo, TransportError,
};
use crate::workflows::assessment::domain::{FactorContribution, FormInput, Prediction};
use crate::workflows::assessment::ledger::Scenario;
use crate::workflows::assessment::orchestrator::{AssessmentOrchestrator, OrchestratorSettings};
use crate::workflows::assessment::session::{MemoryStorage, SessionStore};

pub(super) fn prediction(pd: f64) -> Prediction {
    Prediction {
        probability_of_default: pd,
        top_risk_increasing: vec![FactorContribution {
            feature: "num__credit_amount".to_string(),
            impact: 0.2,
        }],
        top_risk_decreasing: vec![FactorContribution {
            feature: "checking_status".to_string(),
            impact: -0.1,
        }],
    }
}

pub(super) fn scenario(name: &str, pd: f64) -> Scenario {
    Scenario::capture("scn", name, &FormInput::default(), &prediction(pd))
}

pub(super) fn unavailable(status: u16) -> TransportError {
    TransportError::Status {
        url: "http://scoring.test/predict".to_string(),
        status,
        body: "model warming up".to_string(),
    }
}

/// One scripted reply for `score`.
pub(super) struct Step {
    pub delay: Duration,
    pub result: Result<Prediction, u16>,
}

impl Step {
    pub fn ok(delay_ms: u64, pd: f64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            result: Ok(prediction(pd)),
        }
    }

    pub fn fail(delay_ms: u64, status: u16) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            result: Err(status),
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct RecordedCall {
    pub at: Instant,
    pub input: FormInput,
}

/// In-process stand-in for the scoring service.
///
/// Unscripted calls succeed immediately with pd 0.30.
#[derive(Default)]
pub(super) struct ScriptedApi {
    steps: Mutex<VecDeque<Step>>,
    health: Mutex<VecDeque<Result<ServiceInfo, u16>>>,
    calls: Mutex<Vec<RecordedCall>>,
    health_probes: Mutex<Vec<Instant>>,
    oversight_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl ScriptedApi {
    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let api = Self::default();
        api.steps.lock().unwrap().extend(steps);
        api
    }

    pub fn push_health(&self, result: Result<ServiceInfo, u16>) {
        self.health.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn health_probes(&self) -> Vec<Instant> {
        self.health_probes.lock().unwrap().clone()
    }

    pub fn oversight_calls(&self) -> usize {
        self.oversight_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

impl RiskApi for ScriptedApi {
    async fn score(&self, input: &FormInput, _max_retries: u32) -> Result<Prediction, TransportError> {
        let step = {
            let mut steps = self.steps.lock().unwrap();
            steps.pop_front().unwrap_or_else(|| Step::ok(0, 0.30))
        };
        {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                at: Instant::now(),
                input: input.clone(),
            });
        }
        tokio::time::sleep(step.delay).await;
        step.result.map_err(unavailable)
    }

    async fn health_check(&self) -> Result<ServiceInfo, TransportError> {
        let scripted = {
            self.health_probes.lock().unwrap().push(Instant::now());
            self.health.lock().unwrap().pop_front()
        };
        scripted
            .unwrap_or_else(|| {
                Ok(ServiceInfo {
                    service: "CrediShield XAI API".to_string(),
                    status: Some("ok".to_string()),
                })
            })
            .map_err(unavailable)
    }

    async fn score_batch(&self, rows: &[RawRow]) -> Result<BatchResponse, TransportError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BatchResponse {
            count: rows.len(),
            results: (0..rows.len())
                .map(|index| BatchResult {
                    index,
                    probability_of_default: 0.25,
                    extra: Default::default(),
                })
                .collect(),
        })
    }

    async fn oversight(&self) -> Result<OversightSnapshot, TransportError> {
        self.oversight_calls.fetch_add(1, Ordering::SeqCst);
        Ok(OversightSnapshot {
            model_registry: Some(json!({"active_model": "xgb-v3"})),
            fairness_metrics: Some(json!({"demographic_parity": 0.04})),
            audit_logs: vec![json!({"event": "predict"}), json!({"event": "batch"})],
        })
    }
}

pub(super) fn memory_store() -> SessionStore<MemoryStorage> {
    SessionStore::new(Arc::new(MemoryStorage::default()))
}

pub(super) fn quiet_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        debounce: Duration::from_millis(600),
        max_retries: 1,
        health_interval: None,
    }
}

pub(super) type TestOrchestrator = AssessmentOrchestrator<ScriptedApi, MemoryStorage>;

pub(super) fn orchestrator(api: &Arc<ScriptedApi>) -> (TestOrchestrator, SessionStore<MemoryStorage>) {
    let store = memory_store();
    let orchestrator = AssessmentOrchestrator::new(Arc::clone(api), store.clone(), quiet_settings());
    (orchestrator, store)
}
