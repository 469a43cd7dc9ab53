use actix_cors::Cors;
use actix_web::{http::header, middleware::DefaultHeaders, web, App, HttpServer};
use std::env;
use std::sync::Arc;
use std::time::Duration;

mod api;
mod agent;
mod cache;
mod config;
mod human_loop;
mod language;
mod llm;
mod llm_http;
mod orchestrator;
mod prompt;
mod retrieval;
mod retrieval_http;
mod safety;

use api::ApiContext;
use api::auth::JwtAuth;
use api::rate_limit::RateLimitConfig;
use human_loop::HumanLoopManager;
use llm_http::HttpLlmClient;
use orchestrator::Orchestrator;
use platform::audit::AuditLogger;
use retrieval_http::HttpRetrievalClient;

/// Builds the Actix HTTP server. Mirrors the teacher's CORS/security-header/
/// JSON-limit wiring; does not start the server, only constructs it so the
/// caller controls shutdown.
fn run_http_server(api_ctx: ApiContext, bind_addr: &str) -> std::io::Result<actix_web::dev::Server> {
    let ctx = api_ctx.clone();

    let server = HttpServer::new(move || {
        let cors = if ctx.app_env == "prod" {
            Cors::default()
                .allowed_origin("https://query-orchestrator.example.com")
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
                .supports_credentials()
                .max_age(3600)
        } else {
            Cors::default()
                .allowed_origin("http://localhost:8282")
                .allowed_origin("http://127.0.0.1:8282")
                .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
                .supports_credentials()
                .max_age(3600)
        };

        let security_headers = DefaultHeaders::new()
            .add(("X-Frame-Options", "DENY"))
            .add(("X-Content-Type-Options", "nosniff"))
            .add(("Referrer-Policy", "no-referrer"));

        let rate_limit_config = ctx.rate_limit_config.clone();
        let api_ctx_clone = ctx.clone();

        App::new()
            .app_data(web::Data::new(api_ctx_clone.clone()))
            .app_data(
                web::JsonConfig::default()
                    .limit(10 * 1024 * 1024)
                    .error_handler(|err, _req| {
                        let error_msg = format!("JSON payload error: {}", err);
                        tracing::warn!("{}", error_msg);
                        actix_web::error::InternalError::from_response(
                            err,
                            actix_web::HttpResponse::BadRequest().json(serde_json::json!({
                                "error": "Invalid JSON payload",
                                "details": error_msg,
                            })),
                        )
                        .into()
                    }),
            )
            .configure(|cfg| api::configure_http(cfg, api_ctx_clone.clone()))
            .wrap(api::audit_middleware::SecurityAuditMiddleware::new())
            .wrap(api::rate_limit::RateLimitMiddleware::new(rate_limit_config))
            .wrap(security_headers)
            .wrap(cors)
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    platform::init_tracing("query_orchestrator").expect("failed to init tracing");

    let metrics_addr = env::var("METRICS_ADDR").unwrap_or_else(|_| "127.0.0.1:9000".to_string());
    match metrics_addr.parse() {
        Ok(addr) => {
            if let Err(e) = platform::init_metrics(addr) {
                tracing::warn!("failed to initialize metrics exporter on {}: {}", metrics_addr, e);
            } else {
                tracing::info!("metrics exporter listening on {}", metrics_addr);
            }
        }
        Err(e) => {
            tracing::warn!(
                "invalid METRICS_ADDR '{}': {} (metrics exporter disabled)",
                metrics_addr,
                e
            );
        }
    }

    let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "data/config.toml".to_string());

    let cfg = match config::load_with_env(&config_path, &app_env) {
        Ok(cfg) => {
            tracing::info!(app_env = %app_env, config_path = %config_path, "configuration loaded");
            cfg
        }
        Err(e) => {
            tracing::error!("failed to load configuration from {}: {}", config_path, e);
            return Ok(());
        }
    };

    let bind_addr = cfg.bind_addr.clone();

    let llm: Arc<dyn llm::LLMClient> = Arc::new(HttpLlmClient::new(
        cfg.llm_base_url.clone(),
        cfg.llm_api_key.clone(),
        cfg.llm_model.clone(),
    ));
    let retrieval: Arc<dyn retrieval::RetrievalClient> =
        Arc::new(HttpRetrievalClient::new(cfg.retrieval_base_url.clone()));

    let cache = Arc::new(cache::ResponseCache::new(cfg.cache_ttl_s));
    let human_loop = HumanLoopManager::new(Duration::from_secs(cfg.human_loop_timeout_s));
    let audit = Arc::new(AuditLogger::new());

    let orchestrator = Arc::new(Orchestrator::new(
        cfg.clone(),
        llm,
        retrieval,
        Arc::clone(&cache),
        Arc::clone(&human_loop),
        audit,
    ));

    // Background sweep of expired cache entries; `lookup` already evicts
    // lazily, this only bounds growth from keys that are never looked up
    // again.
    {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                cache.reap_expired();
            }
        });
    }

    let jwt_auth = match env::var("JWT_SECRET") {
        Ok(secret) if !secret.trim().is_empty() => {
            tracing::info!("JWT authentication enabled");
            Some(Arc::new(JwtAuth::new(secret.as_bytes())))
        }
        _ => {
            tracing::warn!("JWT_SECRET not set; authentication disabled");
            None
        }
    };

    let api_ctx = ApiContext {
        orchestrator,
        jwt_auth,
        rate_limit_config: RateLimitConfig::default(),
        app_env,
    };

    tracing::info!(bind_addr = %bind_addr, "starting query orchestrator HTTP server");
    let server = run_http_server(api_ctx, &bind_addr)?;

    tokio::select! {
        result = server => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}
