//! JSON-over-HTTP surface. The caller's identity arrives in the `x-owner-id`
//! header; every handler is scoped to it.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use smartspend_core::{Category, CategoryRule, Job, JobId, OwnerId, Transaction, TransactionId};
use smartspend_import::ColumnHints;
use smartspend_pipeline::Pipeline;
use smartspend_storage::Page;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

pub const OWNER_HEADER: &str = "x-owner-id";
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/batches", post(submit_batch))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(job_status))
        .route("/transactions", get(list_transactions))
        .route("/transactions/{id}", get(get_transaction))
        .route("/transactions/{id}/correction", post(submit_correction))
        .route("/rules", get(list_rules).post(add_rule))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// The requesting owner, from [`OWNER_HEADER`].
pub struct Owner(pub OwnerId);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "missing x-owner-id header"))?;
        value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<OwnerId>().ok())
            .map(Owner)
            .ok_or_else(|| ApiError::bad_request("x-owner-id must be a UUID"))
    }
}

fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, format!("{what} not found")))
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    raw.parse()
        .map_err(|e: smartspend_core::UnknownCategory| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct Accepted {
    job_id: JobId,
    status: smartspend_core::JobStatus,
    total_count: u64,
}

async fn submit_batch(
    State(pipeline): State<Pipeline>,
    Owner(owner): Owner,
    Query(hints): Query<ColumnHints>,
    body: Bytes,
) -> Result<(StatusCode, Json<Accepted>), ApiError> {
    let hints = (!hints.is_empty()).then_some(hints);
    let job = pipeline.submit_batch(owner, &body, hints.as_ref()).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            job_id: job.id,
            status: job.status,
            total_count: job.total_count,
        }),
    ))
}

async fn job_status(
    State(pipeline): State<Pipeline>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let id: JobId = parse_id(&id, "job")?;
    Ok(Json(pipeline.job_status(owner, id).await?))
}

async fn list_jobs(
    State(pipeline): State<Pipeline>,
    Owner(owner): Owner,
) -> Result<Json<Vec<Job>>, ApiError> {
    Ok(Json(pipeline.list_jobs(owner).await?))
}

#[derive(Debug, Deserialize)]
struct TransactionFilter {
    job_id: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_transactions(
    State(pipeline): State<Pipeline>,
    Owner(owner): Owner,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let job_id = match filter.job_id.as_deref() {
        Some(raw) => Some(parse_id::<JobId>(raw, "job")?),
        None => None,
    };
    let page = Page::new(filter.limit, filter.offset);
    Ok(Json(pipeline.list_transactions(owner, job_id, page).await?))
}

async fn get_transaction(
    State(pipeline): State<Pipeline>,
    Owner(owner): Owner,
    Path(id): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let id: TransactionId = parse_id(&id, "transaction")?;
    Ok(Json(pipeline.get_transaction(owner, id).await?))
}

#[derive(Debug, Deserialize)]
struct CorrectionRequest {
    category: String,
}

#[derive(Debug, Serialize)]
struct CorrectionResponse {
    rule_id: smartspend_core::RuleId,
    priority: i64,
    rule: CategoryRule,
}

async fn submit_correction(
    State(pipeline): State<Pipeline>,
    Owner(owner): Owner,
    Path(id): Path<String>,
    Json(request): Json<CorrectionRequest>,
) -> Result<(StatusCode, Json<CorrectionResponse>), ApiError> {
    let id: TransactionId = parse_id(&id, "transaction")?;
    let category = parse_category(&request.category)?;
    let rule = pipeline.submit_correction(owner, id, category).await?;
    Ok((
        StatusCode::CREATED,
        Json(CorrectionResponse {
            rule_id: rule.id,
            priority: rule.priority,
            rule,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct NewRuleRequest {
    pattern: String,
    category: String,
    priority: Option<i64>,
}

async fn add_rule(
    State(pipeline): State<Pipeline>,
    Owner(owner): Owner,
    Json(request): Json<NewRuleRequest>,
) -> Result<(StatusCode, Json<CategoryRule>), ApiError> {
    let category = parse_category(&request.category)?;
    let rule = pipeline
        .add_rule(owner, &request.pattern, category, request.priority)
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn list_rules(
    State(pipeline): State<Pipeline>,
    Owner(owner): Owner,
) -> Result<Json<Vec<CategoryRule>>, ApiError> {
    Ok(Json(pipeline.list_rules(owner).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use smartspend_classify::{ExternalClassifier, MockClassifier};
    use smartspend_pipeline::{PipelineConfig, WorkerPool};
    use smartspend_storage::create_db;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn app() -> (tempfile::TempDir, Router, WorkerPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        let classifier = ExternalClassifier::new(
            Arc::new(MockClassifier::label("Dining", 0.9)),
            Duration::from_secs(1),
        );
        let (pipeline, workers) = Pipeline::start(pool, classifier, PipelineConfig::default());
        (dir, router(pipeline), workers)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn get_as(owner: OwnerId, uri: &str) -> Request<Body> {
        Request::get(uri)
            .header(OWNER_HEADER, owner.to_string())
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(owner: OwnerId, uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(OWNER_HEADER, owner.to_string())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_csv(owner: OwnerId, uri: &str, csv: &str) -> Request<Body> {
        Request::post(uri)
            .header(OWNER_HEADER, owner.to_string())
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(csv.to_string()))
            .unwrap()
    }

    async fn wait_terminal(app: &Router, owner: OwnerId, job_id: &str) -> Value {
        for _ in 0..500 {
            let (_, job) = send(app, get_as(owner, &format!("/jobs/{job_id}"))).await;
            let status = job["status"].as_str().unwrap_or_default().to_string();
            if !matches!(status.as_str(), "queued" | "running") {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} did not finish");
    }

    #[tokio::test]
    async fn missing_owner_header_is_rejected() {
        let (_dir, app, _workers) = app().await;
        let request = Request::get("/rules").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].as_str().unwrap().contains("x-owner-id"));
    }

    #[tokio::test]
    async fn batch_lifecycle_over_http() {
        let (_dir, app, _workers) = app().await;
        let owner = OwnerId::new();

        let csv = "Posted Date,Payee,Amount\n01/15/2024,Blue Fin Sushi,\"($42.10)\"\n";
        let (status, accepted) = send(&app, post_csv(owner, "/batches", csv)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted["status"], "queued");
        assert_eq!(accepted["total_count"], 1);

        let job_id = accepted["job_id"].as_str().unwrap().to_string();
        let job = wait_terminal(&app, owner, &job_id).await;
        assert_eq!(job["status"], "succeeded");
        assert_eq!(job["processed_count"], 1);

        let (status, txs) =
            send(&app, get_as(owner, &format!("/transactions?job_id={job_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(txs[0]["category"], "Dining");
        assert_eq!(txs[0]["category_source"], "ai");
    }

    #[tokio::test]
    async fn hints_pick_columns() {
        let (_dir, app, _workers) = app().await;
        let owner = OwnerId::new();
        let csv = "When,What,HowMuch\n2024-03-01,Corner Cafe,-4.50\n";

        let (status, _) = send(&app, post_csv(owner, "/batches", csv)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = "/batches?date=When&description=What&amount=HowMuch";
        let (status, accepted) = send(&app, post_csv(owner, uri, csv)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted["total_count"], 1);
    }

    #[tokio::test]
    async fn malformed_batch_is_400_with_message() {
        let (_dir, app, _workers) = app().await;
        let owner = OwnerId::new();
        let (status, body) = send(&app, post_csv(owner, "/batches", "foo,bar\n1,2\n")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid CSV format. Missing required columns"));

        let (_, jobs) = send(&app, get_as(owner, "/jobs")).await;
        assert_eq!(jobs.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn other_owners_job_is_not_found() {
        let (_dir, app, _workers) = app().await;
        let alice = OwnerId::new();
        let csv = "date,description,amount\n2024-01-01,Rent,-900\n";
        let (_, accepted) = send(&app, post_csv(alice, "/batches", csv)).await;
        let job_id = accepted["job_id"].as_str().unwrap();

        let (status, _) = send(&app, get_as(OwnerId::new(), &format!("/jobs/{job_id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get_as(alice, "/jobs/not-a-uuid")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn correction_returns_rule_id_and_priority() {
        let (_dir, app, _workers) = app().await;
        let owner = OwnerId::new();
        let (status, _) = send(
            &app,
            post_json(owner, "/rules", serde_json::json!({"pattern": "rent", "category": "Housing", "priority": 7})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let csv = "date,description,amount\n2024-01-01,Movie Night,-20\n";
        let (_, accepted) = send(&app, post_csv(owner, "/batches", csv)).await;
        let job_id = accepted["job_id"].as_str().unwrap().to_string();
        wait_terminal(&app, owner, &job_id).await;
        let (_, txs) = send(&app, get_as(owner, &format!("/transactions?job_id={job_id}"))).await;
        let tx_id = txs[0]["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            post_json(
                owner,
                &format!("/transactions/{tx_id}/correction"),
                serde_json::json!({"category": "entertainment"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["priority"], 8);
        assert!(body["rule_id"].is_i64());
        assert_eq!(body["rule"]["origin"], "learned_from_correction");

        let (_, tx) = send(&app, get_as(owner, &format!("/transactions/{tx_id}"))).await;
        assert_eq!(tx["category"], "Entertainment");
        assert_eq!(tx["category_source"], "manual");

        let (_, rules) = send(&app, get_as(owner, "/rules")).await;
        assert_eq!(rules[0]["match_pattern"], "movie night");
    }

    #[tokio::test]
    async fn unknown_category_is_422() {
        let (_dir, app, _workers) = app().await;
        let (status, _) = send(
            &app,
            post_json(OwnerId::new(), "/rules", serde_json::json!({"pattern": "x", "category": "Pets"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn uploads_up_to_the_cap_are_accepted() {
        let (_dir, app, _workers) = app().await;
        let owner = OwnerId::new();
        let mut csv = String::from("date,description,amount\n");
        let mut row = 0;
        while csv.len() < 3 * 1024 * 1024 {
            row += 1;
            csv.push_str(&format!("2024-01-01,Corner cafe purchase {row:08},-4.50\n"));
        }
        let (status, accepted) = send(&app, post_csv(owner, "/batches", &csv)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted["total_count"], row);

        let oversized = "x".repeat(MAX_UPLOAD_BYTES + 1);
        let (status, _) = send(&app, post_csv(owner, "/batches", &oversized)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn transactions_are_paged() {
        let (_dir, app, _workers) = app().await;
        let owner = OwnerId::new();
        let csv = "date,description,amount\n\
                   2024-01-01,Cafe one,-1\n\
                   2024-01-02,Cafe two,-2\n\
                   2024-01-03,Cafe three,-3\n";
        let (_, accepted) = send(&app, post_csv(owner, "/batches", csv)).await;
        let job_id = accepted["job_id"].as_str().unwrap().to_string();
        wait_terminal(&app, owner, &job_id).await;

        let uri = format!("/transactions?job_id={job_id}&limit=2&offset=1");
        let (status, txs) = send(&app, get_as(owner, &uri)).await;
        assert_eq!(status, StatusCode::OK);
        let txs = txs.as_array().unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0]["raw_description"], "Cafe two");
        assert_eq!(txs[1]["raw_description"], "Cafe three");
    }
}
