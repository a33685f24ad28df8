//! HTTP host for the upload endpoint.
//!
//! * `GET /`: liveness text
//! * `POST /receipt-upload`: multipart form with a `receipt` file field
//!
//! Authentication happens upstream. The auth collaborator (a gateway or
//! reverse proxy) verifies the caller and forwards the owner id in a
//! request header, [`DEFAULT_IDENTITY_HEADER`] unless configured otherwise.

use crate::error::ReceiptError;
use crate::ingest::ReceiptPipeline;
use crate::reply::{error_reply, report_reply, Reply};
use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{middleware, web, App, HttpRequest, HttpResponse, HttpServer};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-id";

/// Multipart field carrying the uploaded file.
pub const UPLOAD_FIELD: &str = "receipt";

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub identity_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 5000,
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
        }
    }
}

/// Shared handler state.
pub struct AppState {
    pub pipeline: Arc<ReceiptPipeline>,
    pub identity_header: String,
}

/// Register the endpoint routes on an `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health))
        .route("/receipt-upload", web::post().to(receipt_upload));
}

/// Serve until the process is stopped.
pub async fn run_server(pipeline: ReceiptPipeline, server: ServerConfig) -> std::io::Result<()> {
    let state = web::Data::new(AppState {
        pipeline: Arc::new(pipeline),
        identity_header: server.identity_header.clone(),
    });

    info!(
        "Starting server on {}:{} (identity header '{}')",
        server.bind_addr, server.port, server.identity_header
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((server.bind_addr.as_str(), server.port))?
    .run()
    .await
}

/// `GET /`
async fn health() -> HttpResponse {
    HttpResponse::Ok().body("Backend is working!")
}

/// `POST /receipt-upload`
async fn receipt_upload(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: Multipart,
) -> HttpResponse {
    let user_id = req
        .headers()
        .get(state.identity_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let Some(user_id) = user_id else {
        return HttpResponse::Unauthorized().json(json!({ "message": "Unauthorized: No identity" }));
    };

    let limit = state.pipeline.config().max_upload_bytes;
    let (filename, bytes) = match read_upload(payload, limit).await {
        Ok(upload) => upload,
        Err(e) => {
            warn!("Rejected upload from {}: {}", user_id, e);
            return respond(error_reply(&e));
        }
    };

    let result = state.pipeline.ingest_bytes(&bytes, &filename, user_id).await;
    if let Err(e) = &result {
        warn!("Upload '{}' from {} failed: {}", filename, user_id, e);
    }
    respond(report_reply(&result))
}

/// Read the `receipt` field into memory, enforcing `limit`.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<(String, Vec<u8>), ReceiptError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|e| ReceiptError::Internal(format!("multipart: {e}")))?;
        let is_upload = field.name() == Some(UPLOAD_FIELD) && upload.is_none();
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
            .unwrap_or_default();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ReceiptError::Internal(format!("multipart: {e}")))?;
            if !is_upload {
                continue;
            }
            if bytes.len() + chunk.len() > limit {
                return Err(ReceiptError::UploadTooLarge {
                    size: bytes.len() + chunk.len(),
                    limit,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        if is_upload {
            debug!("Received '{}' ({} bytes)", filename, bytes.len());
            upload = Some((filename, bytes));
        }
    }

    match upload {
        Some((_, bytes)) if bytes.is_empty() => Err(ReceiptError::EmptyUpload),
        Some(upload) => Ok(upload),
        None => Err(ReceiptError::EmptyUpload),
    }
}

fn respond(reply: Reply) -> HttpResponse {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(reply.body)
}
