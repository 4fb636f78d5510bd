use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use credishield::error::AppError;
use credishield::workflows::assessment::{
    BatchResponse, BatchResult, FactorContribution, FieldValue, FormError, FormField, FormInput,
    Prediction,
};
use serde_json::{json, Map, Value};
use tracing::debug;

pub(crate) const SERVICE_NAME: &str = "CrediShield Demo Scorer";
const TOP_FACTORS: usize = 5;
const BASE_PD: f64 = 0.30;

pub(crate) fn scoring_routes() -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/predict", post(predict_endpoint))
        .route("/predict/batch", post(batch_endpoint))
}

pub(crate) async fn service_info() -> Json<Value> {
    Json(json!({ "service": SERVICE_NAME, "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn predict_endpoint(
    Json(input): Json<FormInput>,
) -> Result<Json<Prediction>, AppError> {
    input.validate()?;
    Ok(Json(heuristic_prediction(&input)))
}

pub(crate) async fn batch_endpoint(
    Json(rows): Json<Vec<Map<String, Value>>>,
) -> Result<Json<BatchResponse>, AppError> {
    let mut results = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let input = form_from_row(row)?;
        let prediction = heuristic_prediction(&input);
        let mut extra = Map::new();
        extra.insert(
            "risk_band".to_string(),
            json!(risk_band(prediction.probability_of_default)),
        );
        results.push(BatchResult {
            index,
            probability_of_default: prediction.probability_of_default,
            extra,
        });
    }

    debug!(rows = results.len(), "demo batch scored");
    Ok(Json(BatchResponse {
        count: results.len(),
        results,
    }))
}

/// Overlay the recognised columns of a batch row onto the default form.
fn form_from_row(row: &Map<String, Value>) -> Result<FormInput, FormError> {
    let mut input = FormInput::default();
    for (column, cell) in row {
        let field =
            FormField::from_key(column).ok_or_else(|| FormError::UnknownField(column.clone()))?;
        let value = match cell {
            Value::Null => continue,
            Value::Number(number) => number
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(FieldValue::Number)
                .ok_or(FormError::KindMismatch {
                    field,
                    expected: "whole number",
                })?,
            Value::String(text) => FieldValue::Text(text.clone()),
            _ => {
                return Err(FormError::KindMismatch {
                    field,
                    expected: if field.is_numeric() { "whole number" } else { "text" },
                })
            }
        };
        input.set(field, value)?;
    }
    Ok(input)
}

fn risk_band(pd: f64) -> &'static str {
    if pd >= 0.5 {
        "high"
    } else if pd >= 0.25 {
        "medium"
    } else {
        "low"
    }
}

/// Deterministic stand-in for the model: additive contributions around a base rate.
pub(crate) fn heuristic_prediction(input: &FormInput) -> Prediction {
    let amount_share = (f64::from(input.credit_amount) / 20_000.0).min(1.0);
    let duration_share = (f64::from(input.duration) / 72.0).min(1.0);

    let mut contributions = vec![
        ("num__credit_amount", amount_share * 0.25 - 0.05),
        ("num__duration", duration_share * 0.20 - 0.06),
        (
            "num__installment_commitment",
            (f64::from(input.installment_commitment) - 2.0) * 0.03,
        ),
        (
            "cat__checking_status",
            match input.checking_status.as_str() {
                "<0" => 0.12,
                "0<=X<200" => 0.04,
                ">=200" => -0.06,
                _ => -0.10,
            },
        ),
        (
            "cat__savings_status",
            match input.savings_status.as_str() {
                "<100" => 0.06,
                "no known savings" => 0.02,
                ">=1000" => -0.08,
                _ => -0.03,
            },
        ),
        (
            "cat__employment",
            match input.employment.as_str() {
                "unemployed" => 0.08,
                "<1" => 0.03,
                "4<=X<7" => -0.03,
                ">=7" => -0.05,
                _ => 0.0,
            },
        ),
        (
            "num__age",
            match input.age {
                0..=24 => 0.05,
                25..=39 => 0.0,
                _ => -0.04,
            },
        ),
    ];

    let total: f64 = contributions.iter().map(|(_, impact)| impact).sum();
    let probability_of_default = (BASE_PD + total).clamp(0.02, 0.98);

    contributions.sort_by(|a, b| b.1.total_cmp(&a.1));
    let factor = |(feature, impact): &(&str, f64)| FactorContribution {
        feature: (*feature).to_string(),
        impact: *impact,
    };
    let top_risk_increasing = contributions
        .iter()
        .filter(|(_, impact)| *impact > 0.0)
        .take(TOP_FACTORS)
        .map(factor)
        .collect();
    let top_risk_decreasing = contributions
        .iter()
        .rev()
        .filter(|(_, impact)| *impact < 0.0)
        .take(TOP_FACTORS)
        .map(factor)
        .collect();

    Prediction {
        probability_of_default,
        top_risk_increasing,
        top_risk_decreasing,
    }
}
