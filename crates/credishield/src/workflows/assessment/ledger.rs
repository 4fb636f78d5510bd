use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::ConfidenceBand;
use super::domain::{FormInput, Prediction};
use super::session::{PersistenceError, SessionStorage, SessionStore};

pub const MAX_SAVED_SCENARIOS: usize = 12;
pub const MAX_HISTORY_ENTRIES: usize = 20;

/// A saved form snapshot together with the prediction it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub form_input: FormInput,
    pub prediction: Prediction,
}

impl Scenario {
    pub fn capture(
        prefix: &str,
        name: impl Into<String>,
        form_input: &FormInput,
        prediction: &Prediction,
    ) -> Self {
        Self {
            id: format!("{prefix}-{}", Uuid::new_v4()),
            name: name.into(),
            timestamp: Utc::now(),
            form_input: form_input.clone(),
            prediction: prediction.clone(),
        }
    }
}

/// One successful assessment in the rolling session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub prediction: Prediction,
    pub confidence_band: ConfidenceBand,
}

impl HistoryEntry {
    pub fn record(prediction: &Prediction, confidence_band: ConfidenceBand) -> Self {
        Self {
            id: format!("hist-{}", Uuid::new_v4()),
            timestamp: Utc::now(),
            prediction: prediction.clone(),
            confidence_band,
        }
    }
}

/// Baseline, saved scenarios, and history, written through on every mutation.
///
/// Collections are newest-first; inserting past the cap evicts from the tail.
pub struct ScenarioLedger<K> {
    store: SessionStore<K>,
    baseline: Option<Scenario>,
    scenarios: Vec<Scenario>,
    history: Vec<HistoryEntry>,
}

impl<K: SessionStorage> ScenarioLedger<K> {
    /// Hydrate from storage; unreadable keys come back empty.
    pub fn load(store: SessionStore<K>) -> Self {
        let baseline = store.baseline();
        let mut scenarios = store.saved_scenarios();
        scenarios.truncate(MAX_SAVED_SCENARIOS);
        let mut history = store.history();
        history.truncate(MAX_HISTORY_ENTRIES);

        Self {
            store,
            baseline,
            scenarios,
            history,
        }
    }

    pub fn baseline(&self) -> Option<&Scenario> {
        self.baseline.as_ref()
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Record the baseline unless one already exists. Returns whether it was set.
    pub fn set_baseline_if_absent(&mut self, snapshot: Scenario) -> Result<bool, PersistenceError> {
        if self.baseline.is_some() {
            return Ok(false);
        }
        self.baseline = Some(snapshot);
        self.store.set_baseline(self.baseline.as_ref())?;
        Ok(true)
    }

    /// Prepend a scenario, returning the one evicted to stay within the cap.
    pub fn add_scenario(&mut self, scenario: Scenario) -> Result<Option<Scenario>, PersistenceError> {
        self.scenarios.insert(0, scenario);
        let evicted = evict_beyond(&mut self.scenarios, MAX_SAVED_SCENARIOS);
        self.store.set_saved_scenarios(&self.scenarios)?;
        Ok(evicted)
    }

    pub fn push_history(
        &mut self,
        entry: HistoryEntry,
    ) -> Result<Option<HistoryEntry>, PersistenceError> {
        self.history.insert(0, entry);
        let evicted = evict_beyond(&mut self.history, MAX_HISTORY_ENTRIES);
        self.store.set_history(&self.history)?;
        Ok(evicted)
    }

    /// Percentage-point change in pd relative to the baseline.
    pub fn delta_vs_baseline(&self, prediction: &Prediction) -> Option<f64> {
        self.baseline.as_ref().map(|baseline| {
            (prediction.probability_of_default - baseline.prediction.probability_of_default)
                * 100.0
        })
    }

    pub fn next_scenario_name(&self) -> String {
        format!("Scenario {}", self.scenarios.len() + 1)
    }

    /// Drop everything, including the baseline. Only a session reset calls this.
    pub fn clear(&mut self) -> Result<(), PersistenceError> {
        self.baseline = None;
        self.scenarios.clear();
        self.history.clear();
        self.store.set_baseline(None)?;
        self.store.set_saved_scenarios(&self.scenarios)?;
        self.store.set_history(&self.history)?;
        Ok(())
    }
}

fn evict_beyond<T>(items: &mut Vec<T>, cap: usize) -> Option<T> {
    if items.len() > cap {
        let evicted = items.pop();
        items.truncate(cap);
        evicted
    } else {
        None
    }
}

/// Signed percentage-point rendering, e.g. `+15.0 pp`.
pub fn format_delta(delta: f64) -> String {
    format!("{delta:+.1} pp")
}
