//! HTTP surface: multipart uploads in, streamed artifacts out.

use crate::config::{Config, Server};
use crate::error::ConvertError;
use crate::job::JobOptions;
use crate::orchestrator::{Artifact, Orchestrator};
use crate::router::Operation;
use crate::util::extension_of;
use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, get, post};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("upload error: {0}")]
    Upload(#[from] MultipartError),

    #[error(transparent)]
    Convert(#[from] ConvertError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Upload(err) => (err.status(), "upload_error"),
            ApiError::Convert(ConvertError::Unsupported { .. }) => {
                (StatusCode::BAD_REQUEST, "unsupported")
            }
            ApiError::Convert(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            ApiError::Convert(ConvertError::Engine(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "conversion_failed")
            }
            ApiError::Convert(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!("{kind}: {self}");
        }
        let body = ErrorResponse {
            error: kind,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

pub fn router(orchestrator: Arc<Orchestrator>, limits: &Server) -> Router {
    let state = AppState { orchestrator };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let operation = |op: Operation, limit: usize| -> MethodRouter<AppState> {
        post(move |state: State<AppState>, form: Multipart| run_operation(state, form, op))
            .layer(DefaultBodyLimit::max(limit))
    };

    Router::new()
        .route("/health", get(health))
        .route(
            "/convert",
            post(convert).layer(DefaultBodyLimit::max(limits.convert_limit_bytes)),
        )
        .route(
            "/merge",
            post(merge).layer(DefaultBodyLimit::max(limits.merge_limit_bytes)),
        )
        .route(
            "/rotate",
            operation(Operation::Rotate, limits.convert_limit_bytes),
        )
        .route(
            "/reorder",
            operation(Operation::Reorder, limits.convert_limit_bytes),
        )
        .route("/split", operation(Operation::Split, limits.operation_limit_bytes))
        .route(
            "/compress",
            operation(Operation::Compress, limits.operation_limit_bytes),
        )
        .route(
            "/extract/text",
            operation(Operation::ExtractText, limits.operation_limit_bytes),
        )
        .route(
            "/extract/images",
            operation(Operation::ExtractImages, limits.operation_limit_bytes),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind, serve until `shutdown` fires, then drain every pool.
pub async fn serve(
    cfg: &Config,
    orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(orchestrator.clone(), &cfg.server);
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind))?;
    info!("docmill listening on {}", listener.local_addr()?);

    let stop = shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        stop.cancelled().await;
    });
    // Requests still waiting on queued jobs get a failure once the pools drain, which
    // lets the graceful shutdown above complete.
    let drain = async {
        shutdown.cancelled().await;
        orchestrator.registry().drain().await;
    };
    let (served, ()) = tokio::join!(async { server.await }, drain);
    served.context("http server")?;

    info!("server shutdown complete");
    Ok(())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.orchestrator.registry();
    let engines: Vec<_> = crate::engine::Engine::ALL
        .iter()
        .filter_map(|&engine| registry.pool(engine))
        .map(|pool| {
            serde_json::json!({
                "engine": pool.engine(),
                "workers": pool.workers(),
                "queued": pool.queued(),
            })
        })
        .collect();
    Json(serde_json::json!({ "status": "ok", "engines": engines }))
}

struct UploadedFile {
    name: String,
    data: Bytes,
}

#[derive(Default)]
struct Form {
    files: Vec<UploadedFile>,
    fields: HashMap<String, String>,
}

impl Form {
    async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await? {
            let key = field.name().unwrap_or_default().to_string();
            if key == "file" || key == "files" {
                let name = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await?;
                form.files.push(UploadedFile { name, data });
            } else {
                let value = field.text().await?;
                form.fields.insert(key, value.trim().to_string());
            }
        }
        Ok(form)
    }

    fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn single_file(mut self) -> ApiResult<(UploadedFile, HashMap<String, String>)> {
        if self.files.is_empty() {
            return Err(ApiError::BadRequest("no file uploaded".to_string()));
        }
        Ok((self.files.swap_remove(0), self.fields))
    }
}

async fn convert(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let form = Form::read(multipart).await?;
    let to = form
        .field("to")
        .ok_or_else(|| ApiError::BadRequest("missing 'to' field".to_string()))?
        .to_string();
    let from = form.field("from").unwrap_or_default().to_string();
    let (file, _) = form.single_file()?;
    let from = if from.is_empty() {
        extension_of(Path::new(&file.name))
    } else {
        from
    };

    let orchestrator = &state.orchestrator;
    let workspace = orchestrator.workspace().await?;
    let input = workspace.stage_bytes(&file.name, &file.data).await?;
    let artifact = orchestrator
        .convert(workspace, &input, &from, &to, JobOptions::new())
        .await?;
    stream_artifact(artifact).await
}

async fn merge(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Response> {
    let form = Form::read(multipart).await?;
    if form.files.len() < 2 {
        return Err(ApiError::BadRequest(
            "at least 2 files are required to merge".to_string(),
        ));
    }

    let orchestrator = &state.orchestrator;
    let workspace = orchestrator.workspace().await?;
    let mut inputs = Vec::with_capacity(form.files.len());
    for (idx, file) in form.files.iter().enumerate() {
        // Prefixed so that uploads sharing a name do not overwrite each other.
        let name = format!("{idx:03}-{}", file.name);
        inputs.push(workspace.stage_bytes(&name, &file.data).await?);
    }
    let artifact = orchestrator.merge(workspace, &inputs).await?;
    stream_artifact(artifact).await
}

async fn run_operation(
    State(state): State<AppState>,
    multipart: Multipart,
    op: Operation,
) -> ApiResult<Response> {
    let form = Form::read(multipart).await?;
    let (file, fields) = form.single_file()?;
    let mut options = JobOptions::new();
    for key in ["angle", "order"] {
        if let Some(value) = fields.get(key) {
            options.insert(key, value.clone());
        }
    }

    let orchestrator = &state.orchestrator;
    let workspace = orchestrator.workspace().await?;
    let input = workspace.stage_bytes(&file.name, &file.data).await?;
    let artifact = orchestrator
        .run_operation(workspace, &input, op, options)
        .await?;
    stream_artifact(artifact).await
}

fn content_type_for(format: &str) -> &'static str {
    match format {
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "txt" => "text/plain; charset=utf-8",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        _ => "application/octet-stream",
    }
}

async fn stream_artifact(artifact: Artifact) -> ApiResult<Response> {
    let name = artifact.file_name().replace('"', "");
    let content_type = content_type_for(&artifact.format());
    info!(job_id = %artifact.job_id(), file = %name, "streaming artifact");

    let stream = artifact.into_stream().await?;
    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        ),
    ];
    Ok((headers, Body::from_stream(stream)).into_response())
}
