//! Background certificate jobs
//!
//! A job owns its task's status record from the moment it is spawned:
//! it parses the uploaded records, renders every certificate, checks the
//! mail connection and sends the batch. Blocking stages run on the
//! blocking thread pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use certy_core::{TaskState, TaskStatus};
use certy_delivery::{EmailSender, EmailSettings};
use certy_records::{FileType, TEMPLATE_EXTENSIONS};
use certy_render::{generate_all, BatchOutcome, FontBook, LayoutConfig, LayoutPolicy, TemplateRenderer};

use crate::state::AppState;

/// Files uploaded for one task
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TaskUploads {
    pub records: Option<PathBuf>,
    pub template: Option<PathBuf>,
}

/// Prefix of every file saved for `task_id`
pub fn upload_prefix(task_id: &str) -> String {
    format!("{task_id}_")
}

/// Find the record file and template uploaded for `task_id`
pub fn find_uploads(upload_dir: &Path, task_id: &str) -> std::io::Result<TaskUploads> {
    let prefix = upload_prefix(task_id);
    let mut uploads = TaskUploads::default();
    if !upload_dir.exists() {
        return Ok(uploads);
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(upload_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    entries.sort();

    for path in entries {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if uploads.records.is_none() && FileType::from_extension(&ext) != FileType::Unknown {
            uploads.records = Some(path);
        } else if uploads.template.is_none() && TEMPLATE_EXTENSIONS.contains(&ext.as_str()) {
            uploads.template = Some(path);
        }
    }
    Ok(uploads)
}

/// Renderer for API batches: the configured layout over the uploaded
/// template, else the configured default template, else the layout's own
/// template (image or PDF), else a blank page
pub fn build_renderer(state: &AppState, template: Option<&Path>) -> anyhow::Result<TemplateRenderer> {
    let render = &state.config.render;
    let layout = match &render.layout_path {
        Some(path) => LayoutConfig::load(path)
            .with_context(|| format!("loading layout {}", path.display()))?,
        None => LayoutConfig::default(),
    };

    let layout_dir = render.layout_path.as_deref().and_then(Path::parent);
    let mut fonts = FontBook::system();
    fonts.register_custom(&layout.custom_fonts, layout_dir);

    let template = template
        .or(render.template_path.as_deref())
        .map(Path::to_path_buf)
        .or_else(|| layout.resolve_template(layout_dir));

    let mut renderer = TemplateRenderer::new(LayoutPolicy::Configured(layout), fonts);
    if let Some(path) = template {
        tracing::debug!("Using template {}", path.display());
        renderer = renderer.with_template_path(&path);
    }

    if let Err(e) = renderer.check() {
        tracing::warn!("Renderer check failed, certificates may not render: {}", e);
    }
    Ok(renderer)
}

async fn update_status<F>(state: &AppState, task_id: &str, apply: F)
where
    F: FnOnce(&mut TaskStatus),
{
    match state.tasks.get(task_id).await {
        Ok(Some(mut status)) => {
            apply(&mut status);
            if let Err(e) = state.tasks.put(status).await {
                tracing::error!("Failed to store status of task {}: {}", task_id, e);
            }
        }
        Ok(None) => tracing::warn!("Task {} disappeared while processing", task_id),
        Err(e) => tracing::error!("Failed to read status of task {}: {}", task_id, e),
    }
}

fn write_certificates(dir: &Path, outcome: &BatchOutcome) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for certificate in &outcome.certificates {
        std::fs::write(dir.join(&certificate.file_name), &certificate.png)?;
    }
    Ok(())
}

/// Run a certificate batch for `task_id`, recording the outcome in its status
pub async fn run_certificate_job(state: Arc<AppState>, task_id: String, settings: EmailSettings) {
    if let Err(e) = process(&state, &task_id, settings).await {
        tracing::error!("Error in background processing: {:#}", e);
        update_status(&state, &task_id, |s| {
            s.transition(TaskState::Error, format!("Processing failed: {e:#}"))
        })
        .await;
    }
}

async fn process(state: &Arc<AppState>, task_id: &str, settings: EmailSettings) -> anyhow::Result<()> {
    let uploads = find_uploads(state.upload_dir(), task_id)?;
    let Some(records_path) = uploads.records else {
        update_status(state, task_id, |s| {
            s.transition(TaskState::Error, "Excel/CSV file not found")
        })
        .await;
        return Ok(());
    };

    // Parse
    update_status(state, task_id, |s| s.note("Parsing data file...")).await;
    let records = tokio::task::spawn_blocking(move || certy_records::read_records(&records_path))
        .await??;
    let total = records.len();
    update_status(state, task_id, |s| s.total_count = total).await;

    // Render
    update_status(state, task_id, |s| s.note("Generating certificates...")).await;
    let job_state = Arc::clone(state);
    let output_dir = state.task_output_dir(task_id);
    let (records, outcome) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let renderer = build_renderer(&job_state, uploads.template.as_deref())?;
        let outcome = generate_all(&renderer, &records, |done, total| {
            tracing::debug!("Rendered {}/{}", done, total);
        });
        write_certificates(&output_dir, &outcome)
            .with_context(|| format!("writing certificates to {}", output_dir.display()))?;
        Ok((records, outcome))
    })
    .await??;

    let rendered = outcome.certificates.len();
    update_status(state, task_id, |s| {
        s.processed_count = rendered;
        s.note("Certificates generated. Sending emails...");
    })
    .await;

    // Deliver
    let transport = state.mailer.connect(&settings)?;
    let sender = EmailSender::new(transport, settings);
    let (sender, connected) = tokio::task::spawn_blocking(move || {
        let connected = sender.test_connection();
        (sender, connected)
    })
    .await?;

    if !connected {
        update_status(state, task_id, |s| {
            s.transition(
                TaskState::Error,
                "Email connection failed. Please check credentials.",
            )
        })
        .await;
        return Ok(());
    }

    let report = tokio::task::spawn_blocking(move || sender.send_bulk(&records, &outcome)).await?;

    tracing::info!(
        "Task {} completed: {} sent, {} failed",
        task_id,
        report.success_count,
        report.failure_count
    );
    update_status(state, task_id, |s| {
        s.transition(
            TaskState::Completed,
            format!(
                "Process completed. Sent {} emails successfully, {} failed.",
                report.success_count, report.failure_count
            ),
        );
        s.processed_count = report.success_count;
        s.results = Some(report);
    })
    .await;

    Ok(())
}
