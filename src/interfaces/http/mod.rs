use crate::application::QueryOrchestrator;
use crate::domain::conversation::UserKey;
use crate::domain::customer::CallerProfile;
use actix_cors::Cors;
use actix_web::{dev::Server, get, http::StatusCode, post, web, App, HttpResponse, HttpServer, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

/// `user_id` in request bodies is trusted as-is: it must be set by an
/// authenticated upstream (the dispatch layer), never by end users directly.
/// No route reads a stored conversation back out.
pub struct HttpState {
    pub orchestrator: Arc<QueryOrchestrator>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[validate(length(min = 1, max = 4096))]
    pub prompt: String,
    /// Profile already known to the caller's session, if any.
    #[serde(default)]
    pub profile: Option<CallerProfile>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DescribeRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[validate(length(min = 1, max = 4096))]
    pub description: String,
    #[serde(default)]
    pub profile: Option<CallerProfile>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(ErrorBody {
        error: message.into(),
    })
}

#[post("/chat")]
async fn chat(data: web::Data<HttpState>, req: web::Json<ChatRequest>) -> impl Responder {
    if let Err(e) = req.validate() {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }
    let req = req.into_inner();
    let user_key = UserKey::from_account(req.user_id);
    info!(%user_key, "Chat request");

    let answer = data
        .orchestrator
        .answer(&user_key, req.prompt.trim(), req.profile)
        .await;
    HttpResponse::Ok().json(answer)
}

#[post("/describe")]
async fn describe(data: web::Data<HttpState>, req: web::Json<DescribeRequest>) -> impl Responder {
    if let Err(e) = req.validate() {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }
    let req = req.into_inner();
    let user_key = UserKey::from_account(req.user_id);
    info!(%user_key, "Drink description request");

    let answer = data
        .orchestrator
        .answer_drink_description(&user_key, req.description.trim(), req.profile)
        .await;
    HttpResponse::Ok().json(answer)
}

#[post("/history/reset")]
async fn reset_history(data: web::Data<HttpState>, req: web::Json<ResetRequest>) -> impl Responder {
    let user_key = UserKey::from_account(req.user_id);
    match data.orchestrator.conversations().clear(&user_key).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => {
            warn!(%user_key, error = %e, "Failed to reset history");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(chat)
        .service(describe)
        .service(reset_history)
        .service(health);
}

pub fn start_server(orchestrator: Arc<QueryOrchestrator>, host: &str, port: u16) -> std::io::Result<Server> {
    let state = web::Data::new(HttpState { orchestrator });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((host, port))?
    .run();

    info!(host, port, "HTTP server listening");
    Ok(server)
}
