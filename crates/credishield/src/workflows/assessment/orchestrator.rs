use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::advisor::{self, ValidationWarning};
use super::batch::{BatchResponse, RawRow};
use super::client::{OversightSnapshot, RiskApi, ServiceStatus, TransportError};
use super::debounce::DebounceTimer;
use super::decision::{estimate, recommend, ConfidenceResult};
use super::domain::{FieldValue, FormError, FormField, FormInput, Prediction};
use super::ledger::{HistoryEntry, Scenario, ScenarioLedger};
use super::report::AssessmentReport;
use super::session::{Language, PersistenceError, Role, SessionStorage, SessionStore};
use crate::config::ScoringConfig;

/// Timing knobs for the assessment loop.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub debounce: Duration,
    pub max_retries: u32,
    /// `None` or a zero interval disables background health polling.
    pub health_interval: Option<Duration>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&ScoringConfig::default())
    }
}

impl From<&ScoringConfig> for OrchestratorSettings {
    fn from(config: &ScoringConfig) -> Self {
        Self {
            debounce: config.debounce,
            max_retries: config.max_retries,
            health_interval: Some(config.health_interval),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentPhase {
    Idle,
    Assessing,
    Ready,
    Simulating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Assessment,
    Simulation,
}

/// What a single turn of [`AssessmentOrchestrator::next_event`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    SimulationIssued {
        seq: u64,
    },
    Assessed {
        seq: u64,
        kind: RequestKind,
        probability_of_default: f64,
        baseline_set: bool,
    },
    AssessmentFailed {
        seq: u64,
        kind: RequestKind,
        message: String,
    },
    /// A response arrived after a newer request was issued and was dropped.
    StaleDiscarded {
        seq: u64,
    },
    HealthChanged(ServiceStatus),
    OversightRefreshed {
        succeeded: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssessError {
    #[error("an assessment is already in flight")]
    AlreadyInFlight,
}

struct ScoringOutcome {
    seq: u64,
    kind: RequestKind,
    payload: FormInput,
    result: Result<Prediction, TransportError>,
}

enum Wake {
    Outcome(ScoringOutcome),
    Health(ServiceStatus),
    Oversight(Result<OversightSnapshot, TransportError>),
    Debounced(FormInput),
}

/// Owns the form, the live prediction, the ledger, and the health slot.
///
/// All state changes happen on the caller's task, either in the synchronous
/// methods or inside [`next_event`](Self::next_event). Network calls run on
/// spawned tasks and report back over channels; every scoring response is
/// tagged with the sequence number it was issued under and only the latest
/// sequence is ever committed.
///
/// Must be constructed inside a tokio runtime.
pub struct AssessmentOrchestrator<S, K> {
    api: Arc<S>,
    store: SessionStore<K>,
    ledger: ScenarioLedger<K>,
    settings: OrchestratorSettings,

    form: FormInput,
    prediction: Option<Prediction>,
    phase: AssessmentPhase,
    error: Option<String>,
    simulation_enabled: bool,
    last_payload: Option<FormInput>,

    sequence: u64,
    in_flight: Option<u64>,
    stale_discards: u64,

    health: ServiceStatus,
    role: Role,
    language: Language,
    tour_open: bool,
    oversight: Option<OversightSnapshot>,

    debounce: DebounceTimer<FormInput>,
    outcome_tx: mpsc::UnboundedSender<ScoringOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<ScoringOutcome>,
    health_rx: mpsc::UnboundedReceiver<ServiceStatus>,
    health_task: Option<JoinHandle<()>>,
    oversight_tx: mpsc::UnboundedSender<Result<OversightSnapshot, TransportError>>,
    oversight_rx: mpsc::UnboundedReceiver<Result<OversightSnapshot, TransportError>>,
}

impl<S, K> AssessmentOrchestrator<S, K>
where
    S: RiskApi + 'static,
    K: SessionStorage + 'static,
{
    pub fn new(api: Arc<S>, store: SessionStore<K>, settings: OrchestratorSettings) -> Self {
        let ledger = ScenarioLedger::load(store.clone());
        let role = store.role();
        let language = store.language();
        let tour_open = store.tour_open();

        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (health_tx, health_rx) = mpsc::unbounded_channel();
        let (oversight_tx, oversight_rx) = mpsc::unbounded_channel();

        let health_task = settings
            .health_interval
            .filter(|every| !every.is_zero())
            .map(|every| spawn_health_monitor(Arc::clone(&api), every, health_tx));

        let orchestrator = Self {
            api,
            store,
            ledger,
            settings,
            form: FormInput::default(),
            prediction: None,
            phase: AssessmentPhase::Idle,
            error: None,
            simulation_enabled: false,
            last_payload: None,
            sequence: 0,
            in_flight: None,
            stale_discards: 0,
            health: ServiceStatus::Checking,
            role,
            language,
            tour_open,
            oversight: None,
            debounce: DebounceTimer::new(),
            outcome_tx,
            outcome_rx,
            health_rx,
            health_task,
            oversight_tx,
            oversight_rx,
        };

        if role.can_view_oversight() {
            orchestrator.refresh_oversight();
        }
        orchestrator
    }

    pub fn form(&self) -> &FormInput {
        &self.form
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref()
    }

    pub fn phase(&self) -> AssessmentPhase {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn simulation_enabled(&self) -> bool {
        self.simulation_enabled
    }

    pub fn simulation_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    pub fn latest_sequence(&self) -> u64 {
        self.sequence
    }

    pub fn stale_discards(&self) -> u64 {
        self.stale_discards
    }

    pub fn health(&self) -> &ServiceStatus {
        &self.health
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn tour_open(&self) -> bool {
        self.tour_open
    }

    pub fn oversight(&self) -> Option<&OversightSnapshot> {
        self.oversight.as_ref()
    }

    pub fn ledger(&self) -> &ScenarioLedger<K> {
        &self.ledger
    }

    pub fn confidence(&self) -> ConfidenceResult {
        estimate(self.prediction.as_ref())
    }

    pub fn recommendations(&self) -> Vec<String> {
        recommend(&self.form, self.prediction.as_ref())
    }

    pub fn validation_warnings(&self) -> Vec<ValidationWarning> {
        advisor::warnings(&self.form)
    }

    pub fn validation_hints(&self) -> Vec<String> {
        advisor::hints(&self.form)
    }

    pub fn baseline_delta(&self) -> Option<f64> {
        self.prediction
            .as_ref()
            .and_then(|prediction| self.ledger.delta_vs_baseline(prediction))
    }

    pub fn report(&self, generated_at: DateTime<Utc>) -> Option<AssessmentReport> {
        let prediction = self.prediction.as_ref()?;
        Some(AssessmentReport::build(
            &self.form,
            prediction,
            &self.confidence(),
            &self.recommendations(),
            generated_at,
        ))
    }

    /// Single mutation entry point. Re-arms the what-if debounce once
    /// simulation is enabled.
    pub fn update_field(&mut self, field: FormField, value: FieldValue) -> Result<(), FormError> {
        self.form.set(field, value)?;
        self.schedule_simulation();
        Ok(())
    }

    /// Replace the whole form, e.g. when loading a saved scenario.
    pub fn replace_form(&mut self, form: FormInput) -> Result<(), FormError> {
        form.validate()?;
        self.form = form;
        self.schedule_simulation();
        Ok(())
    }

    fn schedule_simulation(&mut self) {
        if self.simulation_enabled {
            debug!(delay = ?self.settings.debounce, "arming what-if debounce");
            self.debounce.arm(self.settings.debounce, self.form.clone());
        }
    }

    /// Explicit user-triggered assessment of the current form.
    pub fn assess(&mut self) -> Result<u64, AssessError> {
        if self.is_loading() {
            return Err(AssessError::AlreadyInFlight);
        }
        self.debounce.cancel_pending();
        Ok(self.issue(RequestKind::Assessment, self.form.clone()))
    }

    /// Re-issue the payload of the most recent request.
    pub fn retry(&mut self) -> Result<u64, AssessError> {
        if self.is_loading() {
            return Err(AssessError::AlreadyInFlight);
        }
        let payload = self
            .last_payload
            .clone()
            .unwrap_or_else(|| self.form.clone());
        Ok(self.issue(RequestKind::Assessment, payload))
    }

    fn issue(&mut self, kind: RequestKind, payload: FormInput) -> u64 {
        self.sequence += 1;
        let seq = self.sequence;
        self.in_flight = Some(seq);
        self.error = None;
        self.last_payload = Some(payload.clone());
        self.phase = match kind {
            RequestKind::Assessment => AssessmentPhase::Assessing,
            RequestKind::Simulation => AssessmentPhase::Simulating,
        };

        let api = Arc::clone(&self.api);
        let tx = self.outcome_tx.clone();
        let max_retries = self.settings.max_retries;
        tokio::spawn(async move {
            let result = api.score(&payload, max_retries).await;
            let _ = tx.send(ScoringOutcome {
                seq,
                kind,
                payload,
                result,
            });
        });

        debug!(seq, ?kind, "scoring request issued");
        seq
    }

    /// Wait for the next thing that changes state and apply it.
    pub async fn next_event(&mut self) -> OrchestratorEvent {
        let wake = tokio::select! {
            biased;
            Some(outcome) = self.outcome_rx.recv() => Wake::Outcome(outcome),
            Some(status) = self.health_rx.recv() => Wake::Health(status),
            Some(result) = self.oversight_rx.recv() => Wake::Oversight(result),
            snapshot = self.debounce.fired() => Wake::Debounced(snapshot),
        };

        match wake {
            Wake::Outcome(outcome) => self.apply_outcome(outcome),
            Wake::Health(status) => {
                self.health = status.clone();
                OrchestratorEvent::HealthChanged(status)
            }
            Wake::Oversight(result) => self.apply_oversight(result),
            Wake::Debounced(snapshot) => {
                let seq = self.issue(RequestKind::Simulation, snapshot);
                OrchestratorEvent::SimulationIssued { seq }
            }
        }
    }

    /// Drive events until nothing is pending or in flight.
    pub async fn settle(&mut self) -> Vec<OrchestratorEvent> {
        let mut events = Vec::new();
        while self.is_loading() || self.debounce.is_pending() {
            events.push(self.next_event().await);
        }
        events
    }

    fn apply_outcome(&mut self, outcome: ScoringOutcome) -> OrchestratorEvent {
        let ScoringOutcome {
            seq,
            kind,
            payload,
            result,
        } = outcome;

        if seq != self.sequence {
            self.stale_discards += 1;
            debug!(seq, latest = self.sequence, "discarding superseded scoring response");
            return OrchestratorEvent::StaleDiscarded { seq };
        }
        self.in_flight = None;

        match result {
            Ok(prediction) => self.commit(seq, kind, &payload, prediction),
            Err(err) => {
                let message = err.to_string();
                warn!(seq, ?kind, error = %message, "assessment failed");
                self.error = Some(message.clone());
                self.phase = if self.prediction.is_some() {
                    AssessmentPhase::Ready
                } else {
                    AssessmentPhase::Idle
                };
                OrchestratorEvent::AssessmentFailed { seq, kind, message }
            }
        }
    }

    fn commit(
        &mut self,
        seq: u64,
        kind: RequestKind,
        payload: &FormInput,
        prediction: Prediction,
    ) -> OrchestratorEvent {
        let confidence = estimate(Some(&prediction));

        let baseline_set = self.ledger.baseline().is_none();
        if baseline_set {
            let baseline = Scenario::capture("baseline", "Baseline", payload, &prediction);
            log_persistence(self.ledger.set_baseline_if_absent(baseline), "baseline");
        }
        log_persistence(
            self.ledger
                .push_history(HistoryEntry::record(&prediction, confidence.band)),
            "history",
        );

        let probability_of_default = prediction.probability_of_default;
        self.prediction = Some(prediction);
        self.error = None;
        self.simulation_enabled = true;
        self.phase = AssessmentPhase::Ready;

        info!(
            seq,
            ?kind,
            probability_of_default,
            band = %confidence.band,
            "assessment applied"
        );

        OrchestratorEvent::Assessed {
            seq,
            kind,
            probability_of_default,
            baseline_set,
        }
    }

    /// Snapshot the current form and prediction into the saved list.
    pub fn save_scenario(&mut self) -> Option<Scenario> {
        let prediction = self.prediction.as_ref()?;
        let scenario = Scenario::capture(
            "scn",
            self.ledger.next_scenario_name(),
            &self.form,
            prediction,
        );
        log_persistence(self.ledger.add_scenario(scenario.clone()), "scenarios");
        Some(scenario)
    }

    /// Start over: default form, no prediction, empty ledger, nothing pending.
    ///
    /// Responses still on the wire are discarded when they arrive.
    pub fn reset_session(&mut self) {
        self.debounce.cancel_pending();
        self.sequence += 1;
        self.in_flight = None;
        self.form = FormInput::default();
        self.prediction = None;
        self.error = None;
        self.simulation_enabled = false;
        self.last_payload = None;
        self.phase = AssessmentPhase::Idle;
        log_persistence(self.ledger.clear(), "ledger");
        info!("assessment session reset");
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
        log_persistence(self.store.set_language(language), "language");
    }

    pub fn set_tour_open(&mut self, open: bool) {
        self.tour_open = open;
        log_persistence(self.store.set_tour_open(open), "tour");
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
        log_persistence(self.store.set_role(role), "role");
        if role.can_view_oversight() {
            self.refresh_oversight();
        } else {
            self.oversight = None;
        }
    }

    /// Score a batch; oversight data is refreshed afterwards for privileged roles.
    pub async fn score_batch(&mut self, rows: &[RawRow]) -> Result<BatchResponse, TransportError> {
        let response = self.api.score_batch(rows).await?;
        info!(rows = rows.len(), scored = response.count, "batch scored");
        if self.role.can_view_oversight() {
            self.refresh_oversight();
        }
        Ok(response)
    }

    fn refresh_oversight(&self) {
        let api = Arc::clone(&self.api);
        let tx = self.oversight_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(api.oversight().await);
        });
    }

    fn apply_oversight(
        &mut self,
        result: Result<OversightSnapshot, TransportError>,
    ) -> OrchestratorEvent {
        if !self.role.can_view_oversight() {
            return OrchestratorEvent::OversightRefreshed { succeeded: false };
        }
        match result {
            Ok(snapshot) => {
                self.oversight = Some(snapshot);
                OrchestratorEvent::OversightRefreshed { succeeded: true }
            }
            Err(err) => {
                warn!(error = %err, "oversight refresh failed");
                OrchestratorEvent::OversightRefreshed { succeeded: false }
            }
        }
    }
}

impl<S, K> Drop for AssessmentOrchestrator<S, K> {
    fn drop(&mut self) {
        self.debounce.cancel_pending();
        if let Some(handle) = self.health_task.take() {
            handle.abort();
        }
    }
}

fn spawn_health_monitor<S: RiskApi + 'static>(
    api: Arc<S>,
    every: Duration,
    tx: mpsc::UnboundedSender<ServiceStatus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let status = ServiceStatus::from_probe(api.health_check().await);
            if tx.send(status).is_err() {
                break;
            }
        }
    })
}

fn log_persistence<T>(result: Result<T, PersistenceError>, what: &'static str) {
    if let Err(err) = result {
        warn!(what, error = %err, "failed to persist session state");
    }
}
