use actix_web::web;
use std::sync::Arc;

use crate::orchestrator::Orchestrator;

pub mod audit_middleware;
pub mod auth;
pub mod http;
pub mod rate_limit;

use auth::JwtAuth;
use rate_limit::RateLimitConfig;

#[derive(Clone)]
pub struct ApiContext {
    pub orchestrator: Arc<Orchestrator>,
    /// JWT authentication handler
    pub jwt_auth: Option<Arc<JwtAuth>>,
    /// Rate limiting configuration
    pub rate_limit_config: RateLimitConfig,
    /// Current application environment (dev, staging, prod)
    pub app_env: String,
}

pub fn configure_http(cfg: &mut web::ServiceConfig, ctx: ApiContext) {
    http::configure(cfg, ctx);
}
