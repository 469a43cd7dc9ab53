use actix_web::{web, Error, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiContext;
use platform::{correlation_span, extract_correlation_id, record_counter};
use shared_types::{
    CoreErrorKind, Language, Query, RetrievedSource, ValidationDecisionKind, ValidationId,
};
use tracing::{error, info, Instrument};

pub fn configure(cfg: &mut web::ServiceConfig, ctx: ApiContext) {
    let ctx_data = web::Data::new(ctx);

    cfg.app_data(ctx_data.clone())
        .route("/query", web::post().to(submit_query))
        .route("/validation", web::get().to(list_validation_queue))
        .route("/validation/stats", web::get().to(validation_stats))
        .route("/validation/{id}", web::post().to(submit_validation_decision))
        .route("/validation/{id}/result", web::get().to(get_validation_result))
        .route("/health", web::get().to(health));
}

use actix_cors::Cors;
use actix_web::http::header;

pub fn configure_cors(cfg: &mut web::ServiceConfig) {
    let cors = Cors::default()
        .allowed_origin("http://localhost:8282")
        .allowed_origin("http://127.0.0.1:8282")
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
        ])
        .supports_credentials()
        .max_age(3600);

    cfg.service(web::scope("").wrap(cors));
}

use super::auth::verify_auth;

/// JWT-based authentication middleware.
///
/// If `ctx.jwt_auth` is `None`, authentication is disabled and all
/// requests are allowed. Otherwise, this verifies the JWT token in the
/// Authorization header. On failure, a `401 Unauthorized` response is returned.
pub async fn require_auth(req: &HttpRequest, ctx: &ApiContext) -> Result<(), HttpResponse> {
    if let Some(jwt_auth) = &ctx.jwt_auth {
        match verify_auth(req, jwt_auth).await {
            Ok(_) => Ok(()),
            Err(_) => Err(HttpResponse::Unauthorized().finish()),
        }
    } else {
        Ok(())
    }
}

/// §6.3 `POST /query` request body.
#[derive(Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub target_language: Option<String>,
    #[serde(default = "default_enable_human_loop")]
    pub enable_human_loop: bool,
}

fn default_enable_human_loop() -> bool {
    true
}

/// §6.3 `POST /query` response body.
#[derive(Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub answer: String,
    pub sources: Vec<RetrievedSource>,
    pub detected_language: String,
    pub target_language: String,
    pub consensus: String,
    pub iterations_used: u32,
    pub processing_time_ms: u64,
    pub validation_id: Option<Uuid>,
    pub untranslated: bool,
    pub error: Option<String>,
}

async fn submit_query(
    req: HttpRequest,
    body: web::Json<QueryRequest>,
    ctx: web::Data<ApiContext>,
) -> Result<HttpResponse, Error> {
    let correlation_id = extract_correlation_id(None);
    let span = correlation_span(correlation_id, "submit_query");

    async move {
        if let Err(resp) = require_auth(&req, ctx.get_ref()).await {
            return Ok(resp);
        }
        record_counter("http_requests_total_query", 1);

        let target_language = match body.target_language.as_deref() {
            Some(code) => match Language::from_code(code) {
                Some(lang) => Some(lang),
                None => {
                    return Ok(HttpResponse::BadRequest().json(serde_json::json!({
                        "error": format!("unrecognized target_language code: {code}")
                    })))
                }
            },
            None => None,
        };

        let query = Query {
            request_id: correlation_id,
            text: body.query.clone(),
            target_language,
            enable_human_loop: body.enable_human_loop,
        };

        info!(
            correlation_id = %correlation_id,
            endpoint = "/query",
            query_length = body.query.len(),
            "Received query"
        );

        match ctx.orchestrator.process_query(query).await {
            Ok(resp) => {
                info!(
                    correlation_id = %correlation_id,
                    endpoint = "/query",
                    consensus = ?resp.consensus,
                    "Query processed"
                );
                Ok(HttpResponse::Ok().json(QueryResponse {
                    success: resp.success,
                    answer: resp.answer,
                    sources: resp.sources,
                    detected_language: resp.detected_language.code().to_string(),
                    target_language: resp.target_language.code().to_string(),
                    consensus: format!("{:?}", resp.consensus),
                    iterations_used: resp.iterations_used,
                    processing_time_ms: resp.processing_time_ms,
                    validation_id: resp.validation_id,
                    untranslated: resp.untranslated,
                    error: resp.error,
                }))
            }
            Err(e) => {
                error!(
                    correlation_id = %correlation_id,
                    endpoint = "/query",
                    error = %e,
                    "Query failed"
                );
                let status = match e.kind {
                    CoreErrorKind::InputInvalid => actix_web::http::StatusCode::BAD_REQUEST,
                    _ => actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                };
                Ok(HttpResponse::build(status)
                    .json(serde_json::json!({ "error": e.message })))
            }
        }
    }
    .instrument(span)
    .await
}

/// §6.3 `POST /validation/{id}` request body.
#[derive(Deserialize)]
pub struct ValidationDecisionRequest {
    pub decision: ValidationDecisionKind,
    pub modified_text: Option<String>,
    pub notes: Option<String>,
}

async fn submit_validation_decision(
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<ValidationDecisionRequest>,
    ctx: web::Data<ApiContext>,
) -> Result<HttpResponse, Error> {
    let correlation_id = extract_correlation_id(None);
    let span = correlation_span(correlation_id, "submit_validation_decision");

    async move {
        if let Err(resp) = require_auth(&req, ctx.get_ref()).await {
            return Ok(resp);
        }
        record_counter("http_requests_total_validation_decision", 1);

        let validation_id: ValidationId = path.into_inner();
        let body = body.into_inner();

        info!(
            correlation_id = %correlation_id,
            endpoint = "/validation/{id}",
            validation_id = %validation_id,
            decision = ?body.decision,
            "Submitting human validation decision"
        );

        match ctx
            .orchestrator
            .submit_human_decision(validation_id, body.decision, body.modified_text, body.notes)
            .await
        {
            Ok(updated) => Ok(HttpResponse::Ok().json(updated)),
            Err(e) => {
                error!(
                    correlation_id = %correlation_id,
                    endpoint = "/validation/{id}",
                    error = %e,
                    "Failed to submit validation decision"
                );
                Ok(HttpResponse::Conflict().json(serde_json::json!({ "error": e.message })))
            }
        }
    }
    .instrument(span)
    .await
}

/// §6.1 follow-up fetch backing `GET /validation/{id}/result`: returns the
/// finalized envelope once a pending validation has been resolved, or
/// `202 Accepted` with no body while it is still `PENDING`.
async fn get_validation_result(
    req: HttpRequest,
    path: web::Path<Uuid>,
    ctx: web::Data<ApiContext>,
) -> Result<HttpResponse, Error> {
    if let Err(resp) = require_auth(&req, ctx.get_ref()).await {
        return Ok(resp);
    }
    record_counter("http_requests_total_validation_result", 1);
    let validation_id: ValidationId = path.into_inner();

    match ctx.orchestrator.get_validation_result(validation_id).await {
        Ok(Some(resp)) => Ok(HttpResponse::Ok().json(QueryResponse {
            success: resp.success,
            answer: resp.answer,
            sources: resp.sources,
            detected_language: resp.detected_language.code().to_string(),
            target_language: resp.target_language.code().to_string(),
            consensus: format!("{:?}", resp.consensus),
            iterations_used: resp.iterations_used,
            processing_time_ms: resp.processing_time_ms,
            validation_id: resp.validation_id,
            untranslated: resp.untranslated,
            error: resp.error,
        })),
        Ok(None) => Ok(HttpResponse::Accepted().finish()),
        Err(e) => Ok(HttpResponse::NotFound().json(serde_json::json!({ "error": e.message }))),
    }
}

#[derive(Deserialize)]
pub struct ValidationQueueFilter {
    pub min_priority: Option<u8>,
}

async fn list_validation_queue(
    req: HttpRequest,
    query: web::Query<ValidationQueueFilter>,
    ctx: web::Data<ApiContext>,
) -> Result<HttpResponse, Error> {
    if let Err(resp) = require_auth(&req, ctx.get_ref()).await {
        return Ok(resp);
    }
    record_counter("http_requests_total_validation_list", 1);
    let pending = ctx.orchestrator.get_validation_queue(query.min_priority);
    Ok(HttpResponse::Ok().json(pending))
}

async fn validation_stats(
    req: HttpRequest,
    ctx: web::Data<ApiContext>,
) -> Result<HttpResponse, Error> {
    if let Err(resp) = require_auth(&req, ctx.get_ref()).await {
        return Ok(resp);
    }
    record_counter("http_requests_total_validation_stats", 1);
    Ok(HttpResponse::Ok().json(ctx.orchestrator.get_validation_statistics()))
}

async fn health(req: HttpRequest, ctx: web::Data<ApiContext>) -> Result<HttpResponse, Error> {
    if let Err(resp) = require_auth(&req, ctx.get_ref()).await {
        return Ok(resp);
    }
    record_counter("http_requests_total_health", 1);
    Ok(HttpResponse::Ok().json(ctx.orchestrator.health()))
}
