use credishield::config::AppConfig;
use credishield::error::AppError;
use credishield::workflows::assessment::{
    AssessmentOrchestrator, FieldValue, FileStorage, FormField, OrchestratorSettings,
    PredictionClient, RawRow, SessionStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type CliOrchestrator = AssessmentOrchestrator<PredictionClient, FileStorage>;

/// A single `field=value` form edit supplied on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldAssignment {
    pub(crate) field: FormField,
    pub(crate) value: FieldValue,
}

pub(crate) fn parse_assignment(raw: &str) -> Result<FieldAssignment, String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{raw}'"))?;
    let field = FormField::from_key(key.trim())
        .ok_or_else(|| format!("unknown form field '{}'", key.trim()))?;
    let value = value.trim();

    let value = if field.is_numeric() {
        value
            .parse::<u32>()
            .map(FieldValue::Number)
            .map_err(|err| format!("{field} expects a whole number ({err})"))?
    } else {
        FieldValue::text(value)
    };

    Ok(FieldAssignment { field, value })
}

/// File-backed session for CLI commands. Health polling stays off for one-shot runs.
pub(crate) fn open_session(config: &AppConfig) -> Result<CliOrchestrator, AppError> {
    let client = PredictionClient::new(&config.scoring)?;
    let storage = FileStorage::open(&config.session.directory)?;
    let settings = OrchestratorSettings {
        health_interval: None,
        ..OrchestratorSettings::from(&config.scoring)
    };

    Ok(AssessmentOrchestrator::new(
        Arc::new(client),
        SessionStore::new(Arc::new(storage)),
        settings,
    ))
}

pub(crate) fn apply_assignments(
    orchestrator: &mut CliOrchestrator,
    assignments: Vec<FieldAssignment>,
) -> Result<(), AppError> {
    for FieldAssignment { field, value } in assignments {
        orchestrator.update_field(field, value)?;
    }
    Ok(())
}

/// Read a headed CSV into string rows; header and cell whitespace is trimmed.
pub(crate) fn read_batch_csv(path: &Path) -> Result<Vec<RawRow>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(column, cell)| (column.to_string(), cell.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
