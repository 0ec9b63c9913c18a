//! Batch task handlers: upload, process, status, cleanup, archive

use crate::error::AppError;
use crate::jobs::{run_certificate_job, upload_prefix};
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Form, Json,
};
use certy_core::{DeliveryReport, TaskState, TaskStatus, Transition};
use certy_delivery::EmailSettings;
use certy_render::GeneratedCertificate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

const TASK_NOT_FOUND: &str = "Task ID";

/// Upload response
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub task_id: String,
    #[schema(example = "Files uploaded successfully")]
    pub message: String,
    #[schema(example = "students.xlsx")]
    pub excel_file: String,
    pub template_file: Option<String>,
}

/// Form submitted to start a batch
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProcessRequest {
    pub task_id: String,
    #[serde(alias = "sender_email_in")]
    pub sender_email: String,
    #[serde(alias = "sender_password_in")]
    pub sender_password: String,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<u16>,
}

/// Response to starting a batch
#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessResponse {
    #[schema(example = "Certificate processing started")]
    pub message: String,
    pub task_id: String,
    #[schema(value_type = String, example = "processing")]
    pub status: TaskState,
}

/// Full status of a task
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub task_id: String,
    #[schema(value_type = String, example = "completed")]
    pub status: TaskState,
    pub message: String,
    pub processed_count: usize,
    pub total_count: usize,
    pub timestamp: DateTime<Utc>,
    #[schema(value_type = Option<Object>)]
    pub results: Option<DeliveryReport>,
}

impl From<TaskStatus> for StatusResponse {
    fn from(status: TaskStatus) -> Self {
        Self {
            task_id: status.task_id,
            status: status.state,
            message: status.message,
            processed_count: status.processed_count,
            total_count: status.total_count,
            timestamp: status.timestamp,
            results: status.results,
        }
    }
}

/// Summary row in the task list
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskSummary {
    pub task_id: String,
    #[schema(value_type = String)]
    pub status: TaskState,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Task list response
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskSummary>,
}

/// Plain message response
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Last path component of an uploaded file name
fn base_file_name(name: &str) -> Option<String> {
    std::path::Path::new(name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

fn check_task_id(task_id: &str) -> Result<(), AppError> {
    Uuid::parse_str(task_id)
        .map(|_| ())
        .map_err(|_| AppError::BadRequest(format!("Invalid task ID: {task_id}")))
}

async fn read_field(field: axum::extract::multipart::Field<'_>) -> Result<Vec<u8>, AppError> {
    field
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| AppError::BadRequest(format!("multipart error: {e}")))
}

/// Upload a record spreadsheet and an optional template image
#[utoipa::path(
    post,
    path = "/upload-files",
    tag = "tasks",
    request_body(content = String, content_type = "multipart/form-data", description = "`excel_file` (.xlsx, .xls, .csv) and optional `template_file` (.png, .jpg, .jpeg, .pdf)"),
    responses(
        (status = 200, description = "Files stored and task created", body = UploadResponse),
        (status = 400, description = "Missing, empty or unsupported file", body = crate::error::ApiError)
    )
)]
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut excel: Option<(Option<String>, Vec<u8>)> = None;
    let mut template: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("multipart error: {e}")))?
    {
        match field.name() {
            Some("excel_file") => {
                let name = field.file_name().and_then(base_file_name);
                excel = Some((name, read_field(field).await?));
            }
            Some("template_file") => {
                let name = field.file_name().and_then(base_file_name);
                let data = read_field(field).await?;
                // Browsers send an empty part when no file was chosen
                if let Some(name) = name {
                    template = Some((name, data));
                }
            }
            _ => {}
        }
    }

    let (excel_name, excel_data) = excel.unwrap_or((None, Vec::new()));
    certy_records::validate_upload(excel_name.as_deref(), &excel_data)?;
    let excel_name = excel_name.unwrap_or_else(|| "unknown_file.xlsx".to_string());
    if let Some((name, data)) = &template {
        certy_records::validate_template_upload(name, data)?;
    }

    let task_id = Uuid::new_v4().to_string();
    let prefix = upload_prefix(&task_id);
    tokio::fs::create_dir_all(state.upload_dir()).await?;
    tokio::fs::write(state.upload_dir().join(format!("{prefix}{excel_name}")), &excel_data).await?;
    if let Some((name, data)) = &template {
        tokio::fs::write(state.upload_dir().join(format!("{prefix}{name}")), data).await?;
    }

    state.tasks.put(TaskStatus::uploaded(&task_id)).await?;
    tracing::info!("Task {} created for {}", task_id, excel_name);

    Ok(Json(UploadResponse {
        task_id,
        message: "Files uploaded successfully".to_string(),
        excel_file: excel_name,
        template_file: template.map(|(name, _)| name),
    }))
}

/// Start generating and mailing certificates for an uploaded task
#[utoipa::path(
    post,
    path = "/process-certificates",
    tag = "tasks",
    request_body(content = ProcessRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Processing started", body = ProcessResponse),
        (status = 400, description = "Task is already processing", body = crate::error::ApiError),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    )
)]
pub async fn process_certificates(
    State(state): State<Arc<AppState>>,
    Form(req): Form<ProcessRequest>,
) -> Result<impl IntoResponse, AppError> {
    let defaults = &state.config.email;
    let mut settings = EmailSettings::new(defaults, req.sender_email, req.sender_password)
        .with_server(
            req.smtp_server.unwrap_or_else(|| defaults.smtp_server.clone()),
            req.smtp_port.unwrap_or(defaults.smtp_port),
        );
    if let Some(subject) = req.email_subject {
        settings = settings.with_subject(subject);
    }
    if let Some(body) = req.email_body {
        settings = settings.with_body_template(body);
    }

    let transition = state
        .tasks
        .try_transition(
            &req.task_id,
            TaskState::Processing,
            "Starting certificate generation...",
        )
        .await?;
    match transition {
        Transition::Applied(_) => {}
        Transition::Rejected(_) => {
            return Err(AppError::BadRequest("Task is already processing".to_string()))
        }
        Transition::Missing => return Err(AppError::NotFound(TASK_NOT_FOUND.to_string())),
    }

    tokio::spawn(run_certificate_job(
        Arc::clone(&state),
        req.task_id.clone(),
        settings,
    ));

    Ok(Json(ProcessResponse {
        message: "Certificate processing started".to_string(),
        task_id: req.task_id,
        status: TaskState::Processing,
    }))
}

/// Get processing status for a task
#[utoipa::path(
    get,
    path = "/status/{task_id}",
    tag = "tasks",
    params(("task_id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task status", body = StatusResponse),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    )
)]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let status = state
        .tasks
        .get(&task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(TASK_NOT_FOUND.to_string()))?;

    Ok(Json(StatusResponse::from(status)))
}

/// List all tasks
#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    responses(
        (status = 200, description = "All known tasks", body = TaskListResponse)
    )
)]
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let tasks = state
        .tasks
        .list()
        .await?
        .into_iter()
        .map(|s| TaskSummary {
            task_id: s.task_id,
            status: s.state,
            message: s.message,
            timestamp: s.timestamp,
        })
        .collect();

    Ok(Json(TaskListResponse { tasks }))
}

/// Remove a task's status, uploads and generated certificates
#[utoipa::path(
    delete,
    path = "/cleanup/{task_id}",
    tag = "tasks",
    params(("task_id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task cleaned up", body = MessageResponse),
        (status = 400, description = "Malformed task ID", body = crate::error::ApiError)
    )
)]
pub async fn cleanup_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    check_task_id(&task_id)?;
    state.tasks.delete(&task_id).await?;

    let prefix = upload_prefix(&task_id);
    if tokio::fs::try_exists(state.upload_dir()).await? {
        let mut entries = tokio::fs::read_dir(state.upload_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
    }

    let output_dir = state.task_output_dir(&task_id);
    if tokio::fs::try_exists(&output_dir).await? {
        tokio::fs::remove_dir_all(&output_dir).await?;
    }

    tracing::info!("Cleaned up task {}", task_id);
    Ok(Json(MessageResponse {
        message: "Task cleaned up successfully".to_string(),
    }))
}

/// Download a task's generated certificates as a ZIP archive
#[utoipa::path(
    get,
    path = "/certificates/{task_id}/archive",
    tag = "tasks",
    params(("task_id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, description = "ZIP archive of the generated certificates"),
        (status = 404, description = "Task or certificates not found", body = crate::error::ApiError)
    )
)]
pub async fn download_archive(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    check_task_id(&task_id)?;
    if !state.tasks.contains(&task_id).await? {
        return Err(AppError::NotFound(TASK_NOT_FOUND.to_string()));
    }

    let output_dir = state.task_output_dir(&task_id);
    let archive = tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>, AppError> {
        if !output_dir.exists() {
            return Ok(None);
        }
        let mut paths: Vec<_> = std::fs::read_dir(&output_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e.eq_ignore_ascii_case("png")))
            .collect();
        if paths.is_empty() {
            return Ok(None);
        }
        paths.sort();

        let mut certificates = Vec::with_capacity(paths.len());
        for (record_index, path) in paths.into_iter().enumerate() {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            certificates.push(GeneratedCertificate {
                record_index,
                name: file_name.trim_end_matches("_certificate.png").replace('_', " "),
                png: std::fs::read(&path)?,
                file_name,
            });
        }
        Ok(Some(certy_delivery::bundle(&certificates)?))
    })
    .await??
    .ok_or_else(|| AppError::NotFound("Certificates".to_string()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{task_id}_certificates.zip\""),
            ),
        ],
        archive,
    ))
}
