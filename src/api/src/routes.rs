//! API route handlers.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use anyhow::Context;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::betting::{ConfidenceLevel, ValueTier};
use crate::config::{AppConfig, FEATURE_NAMES};
use crate::encoder::LabelEncoder;
use crate::model::{SharedModel, NUM_FEATURES};
use crate::predictor::{predict_entries, Encoders, PredictError};
use crate::race_card::{parse_race_card, RaceCardError, RaceEntry};
use crate::storage::{ActualResult, PredictionRepository};
use crate::types::{
    ErrorResponse, HealthResponse, HistoryResponse, MessageResponse, ModelInfoResponse,
    PredictResponse, PredictionRow, ResultUpdateRequest, SinglePredictRequest,
    SinglePredictResponse,
};

/// Application state shared across handlers.
pub struct AppState {
    pub model: Option<SharedModel>,
    pub jockey_encoder: Option<LabelEncoder>,
    pub trainer_encoder: Option<LabelEncoder>,
    pub config: AppConfig,
    pub history: Mutex<PredictionRepository>,
}

impl AppState {
    fn encoders(&self) -> Encoders<'_> {
        Encoders {
            jockey: self.jockey_encoder.as_ref(),
            trainer: self.trainer_encoder.as_ref(),
        }
    }

    fn predict(&self, entries: &[RaceEntry]) -> Result<Vec<PredictionRow>, PredictError> {
        predict_entries(
            entries,
            self.model.as_deref(),
            self.encoders(),
            &self.config.betting,
        )
    }
}

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl From<RaceCardError> for ApiError {
    fn from(err: RaceCardError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.status.to_string(),
            detail: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/model/info", get(model_info))
        .route("/predict", post(predict))
        .route("/predict/single", post(predict_single))
        .route("/history", get(history))
        .route("/history/:id/result", post(update_result))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "race prediction API is running".to_string(),
    })
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.model.is_some(),
    })
}

/// Model info endpoint.
pub async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfoResponse> {
    let classes = |enc: &Option<LabelEncoder>| {
        enc.as_ref()
            .map(|e| e.classes().to_vec())
            .unwrap_or_default()
    };

    Json(ModelInfoResponse {
        model_path: state.config.model.path.clone(),
        model_kind: state.model.as_ref().map(|m| m.kind().to_string()),
        num_features: NUM_FEATURES,
        feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        jockeys: classes(&state.jockey_encoder),
        trainers: classes(&state.trainer_encoder),
    })
}

/// Race card prediction endpoint (multipart field `file`).
pub async fn predict(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut content = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read file: {}", e)))?;
            content = Some(bytes);
            break;
        }
    }

    let content = content.ok_or_else(|| ApiError::bad_request("no file provided"))?;
    let entries = parse_race_card(&content)?;
    tracing::debug!("Parsed race card with {} horses", entries.len());

    let predictions = state.predict(&entries)?;

    let rows = predictions.clone();
    match with_history(&state, move |repo| repo.save_predictions(&rows, None)).await {
        Ok(n) => tracing::info!("Saved {} predictions to history", n),
        Err(e) => tracing::warn!("Failed to save predictions to history: {}", e.message),
    }

    Ok(Json(PredictResponse { predictions }))
}

/// Run a history store operation on the blocking pool.
async fn with_history<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut PredictionRepository) -> anyhow::Result<T> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let mut repo = state
            .history
            .lock()
            .map_err(|e| anyhow::anyhow!("history store unavailable: {}", e))?;
        f(&mut *repo)
    })
    .await
    .map_err(|e| ApiError::internal(format!("history task failed: {}", e)))?
    .map_err(|e| ApiError::internal(format!("{:#}", e)))
}

/// Single horse prediction endpoint.
pub async fn predict_single(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SinglePredictRequest>,
) -> Result<Json<SinglePredictResponse>, ApiError> {
    if state.model.is_none() {
        return Err(PredictError::ModelNotLoaded.into());
    }

    let known = |enc: &Option<LabelEncoder>, name: &str| {
        enc.as_ref().is_some_and(|e| e.contains(name))
    };
    if !known(&state.jockey_encoder, req.jockey.as_str()) {
        return Err(ApiError::bad_request(format!(
            "jockey not in training data: {}",
            req.jockey
        )));
    }
    if !known(&state.trainer_encoder, req.trainer.as_str()) {
        return Err(ApiError::bad_request(format!(
            "trainer not in training data: {}",
            req.trainer
        )));
    }

    let entry = RaceEntry {
        horse_name: String::new(),
        jockey: req.jockey,
        trainer: req.trainer,
        actual_weight: Some(req.actual_weight),
        draw: Some(req.draw),
        win_odds: Some(req.win_odds),
    };

    let row = state
        .predict(std::slice::from_ref(&entry))?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::internal("model returned no prediction"))?;

    let prob = row.predicted_top3_prob;
    let tier = ValueTier::from_score(row.value_score, &state.config.betting);
    Ok(Json(SinglePredictResponse {
        predicted_top3_prob: prob,
        top3_percent: (prob * 10_000.0).round() / 100.0,
        confidence: ConfidenceLevel::from_probability(prob),
        implied_probability: row.implied_probability,
        value_score: row.value_score,
        kelly_fraction: row.kelly_fraction,
        value_tier: tier,
        recommendation: tier.label().to_string(),
    }))
}

/// Saved predictions, newest race date first.
pub async fn history(State(state): State<Arc<AppState>>) -> Result<Json<HistoryResponse>, ApiError> {
    let predictions = with_history(&state, |repo| {
        repo.get_all_predictions().context("failed to read history")
    })
    .await?;
    Ok(Json(HistoryResponse { predictions }))
}

/// Settle a saved prediction with the actual result.
pub async fn update_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ResultUpdateRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let result: ActualResult = req
        .actual_result
        .parse()
        .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string()))?;

    let updated = with_history(&state, move |repo| {
        repo.set_actual_result(id, result)
            .context("failed to update history")
    })
    .await?;

    if !updated {
        return Err(ApiError::not_found(format!("prediction {} not found", id)));
    }

    Ok(Json(MessageResponse {
        message: format!("prediction {} marked {}", id, result),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PriorModel;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const BOUNDARY: &str = "RACECARDBOUNDARY";

    fn state(with_model: bool) -> Arc<AppState> {
        let model: Option<SharedModel> = if with_model {
            Some(Arc::new(PriorModel::new(0.6)))
        } else {
            None
        };
        Arc::new(AppState {
            model,
            jockey_encoder: Some(LabelEncoder::fit(["潘頓", "莫雷拉"])),
            trainer_encoder: Some(LabelEncoder::fit(["沈集成", "呂健威"])),
            config: AppConfig::default(),
            history: Mutex::new(PredictionRepository::in_memory().unwrap()),
        })
    }

    fn multipart_request(field: &str, csv: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"; filename=\"race.csv\"\r\n\
             Content-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = field,
            csv = csv
        );
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const CARD: &str = "horse_name,jockey,trainer,actual_weight,draw,win_odds\n\
                        浪漫勇士,潘頓,沈集成,133,5,2.0\n\
                        金鑽貴人,莫雷拉,呂健威,128,3,4.0";

    #[tokio::test]
    async fn test_root_and_health() {
        let app = build_router(state(false));
        let response = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["message"],
            "race prediction API is running"
        );

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["model_loaded"], false);
    }

    #[tokio::test]
    async fn test_model_info_lists_encoders() {
        let app = build_router(state(true));
        let response = app
            .oneshot(Request::get("/model/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["num_features"], 5);
        assert_eq!(json["model_kind"], "prior");
        assert_eq!(json["jockeys"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_predict_saves_history() {
        let state = state(true);
        let app = build_router(state.clone());

        let response = app.clone().oneshot(multipart_request("file", CARD)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let predictions = json["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0]["horse_name"], "浪漫勇士");
        assert_eq!(predictions[0]["predicted_top3_prob"], 0.6);
        assert_eq!(predictions[1]["implied_probability"], 0.25);

        assert_eq!(state.history.lock().unwrap().get_prediction_count().unwrap(), 2);

        let response = app
            .oneshot(Request::get("/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["predictions"].as_array().unwrap().len(), 2);
        assert_eq!(json["predictions"][0]["actual_result"], "unknown");
    }

    #[tokio::test]
    async fn test_predict_without_file_field() {
        let app = build_router(state(true));
        let response = app.oneshot(multipart_request("other", CARD)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["detail"], "no file provided");
    }

    #[tokio::test]
    async fn test_predict_missing_columns() {
        let app = build_router(state(true));
        let response = app
            .oneshot(multipart_request("file", "horse_name,jockey\nA,B"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("missing required columns"));
        assert!(detail.contains("win_odds"));
    }

    #[tokio::test]
    async fn test_predict_header_only_card() {
        let app = build_router(state(true));
        let response = app
            .oneshot(multipart_request(
                "file",
                "horse_name,jockey,trainer,actual_weight,draw,win_odds\n",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["detail"], "CSV file is empty");
    }

    #[tokio::test]
    async fn test_poisoned_history_store() {
        let state = state(true);
        let poisoner = state.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.history.lock().unwrap();
            panic!("history writer crashed");
        })
        .join();

        let app = build_router(state);
        let response = app.clone().oneshot(multipart_request("file", CARD)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["predictions"].as_array().unwrap().len(), 2);

        let response = app
            .oneshot(Request::get("/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("history store unavailable"));
    }

    #[tokio::test]
    async fn test_predict_without_model() {
        let app = build_router(state(false));
        let response = app.oneshot(multipart_request("file", CARD)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["detail"],
            "model not loaded, cannot predict"
        );
    }

    #[tokio::test]
    async fn test_predict_single() {
        let app = build_router(state(true));
        let request = json_request(
            "/predict/single",
            serde_json::json!({
                "jockey": "潘頓", "trainer": "沈集成",
                "actual_weight": 122.0, "draw": 5.0, "win_odds": 5.0
            }),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["top3_percent"], 60.0);
        assert_eq!(json["confidence"], "medium");
        assert_eq!(json["value_score"], 0.4);
        assert_eq!(json["value_tier"], "moderate");
        assert_eq!(json["recommendation"], "worth considering");
    }

    #[tokio::test]
    async fn test_predict_single_unknown_jockey() {
        let app = build_router(state(true));
        let request = json_request(
            "/predict/single",
            serde_json::json!({
                "jockey": "無名", "trainer": "沈集成",
                "actual_weight": 122.0, "draw": 5.0, "win_odds": 5.0
            }),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_result() {
        let state = state(true);
        let app = build_router(state.clone());
        app.clone().oneshot(multipart_request("file", CARD)).await.unwrap();
        let id = state.history.lock().unwrap().get_all_predictions().unwrap()[0].id;

        let response = app
            .clone()
            .oneshot(json_request(
                &format!("/history/{}/result", id),
                serde_json::json!({"actual_result": "top3"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(json_request(
                "/history/9999/result",
                serde_json::json!({"actual_result": "top3"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(json_request(
                &format!("/history/{}/result", id),
                serde_json::json!({"actual_result": "won"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
