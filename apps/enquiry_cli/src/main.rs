use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use admission_core::{
    controller::{SUBMISSION_CANCELLED, THANK_YOU_MESSAGE},
    report::{render_text_summary, EmailReport},
    settings::{admission_endpoint, load_settings, load_settings_from, SETTINGS_FILE},
    ControllerEvent, EnquiryForm, HttpTransport, PhotoFile, SubmissionController,
    SubmissionOutcome, SubmissionState,
};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use shared::domain::ReferenceId;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PREVIEW_WAIT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
struct Cli {
    /// Settings file with deployment and timing overrides, `admission.toml` when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit an enquiry read from a TOML file of `wireName = "value"` pairs.
    Submit {
        #[arg(long)]
        form: PathBuf,
        #[arg(long)]
        photo: Option<PathBuf>,
        /// Base URL overriding the configured deployment.
        #[arg(long)]
        endpoint: Option<String>,
        /// Write the HTML email report of the accepted enquiry here.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Render the HTML email report without submitting.
    Report {
        #[arg(long)]
        form: PathBuf,
        #[arg(long)]
        photo: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Validate a form file and list empty required fields.
    Check {
        #[arg(long)]
        form: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => load_settings_from(path, |key| std::env::var(key).ok()),
        None => load_settings(),
    };
    let settings_file = cli.settings.as_deref().unwrap_or(Path::new(SETTINGS_FILE));
    info!(settings_file = %settings_file.display(), "admission: settings loaded");

    match cli.command {
        Command::Submit {
            form,
            photo,
            endpoint,
            report,
        } => {
            let endpoint = match endpoint {
                Some(base) => admission_endpoint(&base),
                None => settings.endpoint(),
            }
            .context("invalid admission endpoint")?;
            info!(%endpoint, "admission: using endpoint");

            let controller = SubmissionController::new(
                Arc::new(HttpTransport::new(endpoint)),
                settings.submission_config(),
            );
            let result = submit(&controller, &form, photo.as_deref(), report.as_deref()).await;
            controller.shutdown().await;
            result?;
        }
        Command::Report { form, photo, out } => {
            let form = read_form(&form).await?;
            let max_bytes = settings.submission_config().max_photo_bytes;
            let preview = match photo {
                Some(path) => Some(read_photo(&path, max_bytes).await?.preview_data_url()),
                None => None,
            };
            let submitted_at = Utc::now();
            let reference_id = ReferenceId::generate(&settings.reference_prefix, submitted_at);
            let report = EmailReport {
                form: &form,
                photo_preview: preview.as_deref(),
                reference_id: &reference_id,
                submitted_at,
            };
            tokio::fs::write(&out, report.render_html())
                .await
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("{}", report.subject());
            println!("wrote {} (reference {reference_id})", out.display());
        }
        Command::Check { form } => {
            let form = read_form(&form).await?;
            println!("{}", serde_json::to_string_pretty(&form)?);
            print!("{}", render_text_summary(&form));
            let missing = form.missing_required();
            if !missing.is_empty() {
                let names: Vec<_> = missing.iter().map(|field| field.wire_name()).collect();
                bail!("required fields are empty: {}", names.join(", "));
            }
            println!("form is complete");
        }
    }

    Ok(())
}

async fn submit(
    controller: &Arc<SubmissionController>,
    form_path: &Path,
    photo_path: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<()> {
    let mut events = controller.subscribe_events();
    controller.open_form().await;

    for (name, value) in read_form_values(form_path).await? {
        controller
            .update_field_by_name(&name, &value)
            .await
            .with_context(|| format!("invalid value for {name}"))?;
    }

    if let Some(path) = photo_path {
        let photo = PhotoFile::from_path(path).await?;
        controller.attach_photo(photo).await?;
        let ready = tokio::time::timeout(PREVIEW_WAIT, async {
            loop {
                match events.recv().await {
                    Ok(ControllerEvent::PhotoPreviewReady { .. }) => break true,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break false,
                }
            }
        })
        .await
        .unwrap_or(false);
        if !ready {
            warn!("admission: photo preview not ready, report will omit it");
        }
    }

    let progress_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ControllerEvent::Progress(progress) => info!(progress, "admission: uploading"),
                ControllerEvent::StatusChanged(status)
                    if status.state == SubmissionState::Success =>
                {
                    info!("admission: submitted successfully")
                }
                _ => {}
            }
        }
    });

    let pending = controller.submit().await?;
    println!("submitting enquiry {}", pending.reference_id());

    let outcome = tokio::select! {
        outcome = pending.outcome() => outcome,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel().await;
            SubmissionOutcome::Cancelled
        }
    };
    progress_log.abort();

    match outcome {
        SubmissionOutcome::Success { receipt, reply } => {
            println!("{THANK_YOU_MESSAGE}");
            println!("reference: {}", receipt.reference_id);
            if let Some(message) = reply.user_message() {
                println!("server: {message}");
            }
            if let Some(path) = report_path {
                tokio::fs::write(path, receipt.email_report().render_html())
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("wrote report to {}", path.display());
            }
            Ok(())
        }
        SubmissionOutcome::Failed { reference_id, error } => {
            warn!(%reference_id, %error, "admission: submission failed");
            let status = controller.snapshot().await.status;
            bail!(status.error.unwrap_or_else(|| error.user_message()))
        }
        SubmissionOutcome::Cancelled => {
            println!("{SUBMISSION_CANCELLED}");
            Ok(())
        }
    }
}

async fn read_form_values(path: &Path) -> Result<Vec<(String, String)>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read form file {}", path.display()))?;
    let table: toml::Table =
        toml::from_str(&raw).with_context(|| format!("{} is not a TOML table", path.display()))?;

    Ok(table
        .into_iter()
        .map(|(key, value)| match value {
            toml::Value::String(text) => (key, text),
            other => (key, other.to_string()),
        })
        .collect())
}

async fn read_form(path: &Path) -> Result<EnquiryForm> {
    let mut form = EnquiryForm::new();
    for (name, value) in read_form_values(path).await? {
        form.set_by_name(&name, &value)
            .with_context(|| format!("invalid value for {name}"))?;
    }
    Ok(form)
}

async fn read_photo(path: &Path, max_bytes: u64) -> Result<PhotoFile> {
    let photo = PhotoFile::from_path(path).await?;
    photo.validate(max_bytes)?;
    Ok(photo)
}
