//! Auto-Certy CLI
//!
//! Usage:
//!   certy extract <image>
//!   certy generate --records <file> --out <zip>
//!   certy send --records <file> --sender <address>
//!   certy layout init <path>
//!   certy layout preview --out <png>

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use certy_core::config::{AppConfig, LoggingConfig};
use certy_core::StudentRecord;
use certy_delivery::{EmailSender, EmailSettings, SmtpMailer};
use certy_extractor::NameExtractor;
use certy_render::{
    generate_all, sample_record, BatchOutcome, CertificateRenderer, FixedLayout, FontBook,
    LayoutConfig, LayoutPolicy, TemplateRenderer,
};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "certy")]
#[command(about = "Certificate generator and mailer")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still override it)
    #[arg(long, global = true, env = "CERTY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract recipient name candidates from a certificate image
    Extract {
        /// Image to read
        image: PathBuf,
        /// NER confidence threshold in [0, 1]
        #[arg(long)]
        threshold: Option<f32>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Render certificates into a ZIP archive
    Generate {
        #[command(flatten)]
        source: RecipientSource,
        #[command(flatten)]
        design: DesignArgs,
        /// Output ZIP path
        #[arg(long)]
        out: PathBuf,
    },
    /// Render certificates and email each recipient their own
    Send {
        /// CSV or Excel file with name, email, year and branch columns
        #[arg(long)]
        records: PathBuf,
        #[command(flatten)]
        design: DesignArgs,
        /// Sender address, also used as the SMTP login
        #[arg(long)]
        sender: String,
        #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        smtp_server: Option<String>,
        #[arg(long)]
        smtp_port: Option<u16>,
        #[arg(long)]
        subject: Option<String>,
        /// File holding the body template ({name}, {branch}, {year})
        #[arg(long)]
        body_file: Option<PathBuf>,
    },
    /// Manage layout files
    Layout {
        #[command(subcommand)]
        action: LayoutAction,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct RecipientSource {
    /// CSV or Excel file of student records
    #[arg(long)]
    records: Option<PathBuf>,
    /// Text file with one name per line
    #[arg(long)]
    names_file: Option<PathBuf>,
    /// Certificate image to extract names from
    #[arg(long)]
    from_image: Option<PathBuf>,
}

#[derive(Args)]
struct DesignArgs {
    /// Template (.png, .jpg or the first page of a .pdf); a blank page is used otherwise
    #[arg(long)]
    template: Option<PathBuf>,
    /// Layout JSON; without it only the name is drawn at --x/--y
    #[arg(long)]
    layout: Option<PathBuf>,
    #[arg(long, default_value_t = 500)]
    x: i32,
    #[arg(long, default_value_t = 300)]
    y: i32,
    #[arg(long, default_value_t = 40.0)]
    font_size: f32,
    #[arg(long, default_value = "#000000")]
    color: String,
    /// Leave out the date line under the name
    #[arg(long)]
    no_date: bool,
}

#[derive(Subcommand)]
enum LayoutAction {
    /// Write the default layout to a file
    Init { path: PathBuf },
    /// Render sample data with a layout
    Preview {
        #[arg(long)]
        layout: Option<PathBuf>,
        #[arg(long)]
        template: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.as_str().into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn load_layout(path: &Path) -> anyhow::Result<LayoutConfig> {
    LayoutConfig::load(path).with_context(|| format!("loading layout {}", path.display()))
}

/// Layout policy for the design flags
fn layout_policy(design: &DesignArgs, default_layout: Option<&Path>) -> anyhow::Result<LayoutPolicy> {
    match design.layout.as_deref().or(default_layout) {
        Some(path) => Ok(LayoutPolicy::Configured(load_layout(path)?)),
        None => {
            let fixed = FixedLayout::new(design.x, design.y, design.font_size)
                .with_color(design.color.clone());
            Ok(LayoutPolicy::Fixed(if design.no_date {
                fixed
            } else {
                fixed.with_today()
            }))
        }
    }
}

/// Template to draw on: the flag, then the configured default, then the
/// one named by the layout file
fn template_for(
    explicit: Option<&Path>,
    config: &AppConfig,
    layout: Option<(&LayoutConfig, Option<&Path>)>,
) -> Option<PathBuf> {
    explicit
        .or(config.render.template_path.as_deref())
        .map(Path::to_path_buf)
        .or_else(|| layout.and_then(|(layout, dir)| layout.resolve_template(dir)))
}

fn build_renderer(design: &DesignArgs, config: &AppConfig) -> anyhow::Result<TemplateRenderer> {
    let policy = layout_policy(design, config.render.layout_path.as_deref())?;
    let layout_dir = design
        .layout
        .as_deref()
        .or(config.render.layout_path.as_deref())
        .and_then(Path::parent);

    let mut fonts = FontBook::system();
    let template = match &policy {
        LayoutPolicy::Configured(layout) => {
            fonts.register_custom(&layout.custom_fonts, layout_dir);
            template_for(design.template.as_deref(), config, Some((layout, layout_dir)))
        }
        LayoutPolicy::Fixed(_) => template_for(design.template.as_deref(), config, None),
    };

    let mut renderer = TemplateRenderer::new(policy, fonts);
    if let Some(path) = template {
        renderer = renderer.with_template_path(&path);
    }
    renderer.check().context("renderer is not usable")?;
    Ok(renderer)
}

/// One record per non-blank line
fn records_from_names(text: &str) -> Vec<StudentRecord> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(StudentRecord::from_name)
        .collect()
}

fn load_recipients(source: &RecipientSource, config: &AppConfig) -> anyhow::Result<Vec<StudentRecord>> {
    if let Some(path) = &source.records {
        return Ok(certy_records::read_records(path)?);
    }
    if let Some(path) = &source.names_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return Ok(records_from_names(&text));
    }
    if let Some(path) = &source.from_image {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let result = NameExtractor::from_config(config).extract(&bytes);
        for warning in &result.warnings {
            tracing::warn!("{}", warning);
        }
        return Ok(result
            .names
            .iter()
            .map(|n| StudentRecord::from_name(n.as_str()))
            .collect());
    }
    bail!("one of --records, --names-file or --from-image is required")
}

fn render_batch(renderer: &dyn CertificateRenderer, records: &[StudentRecord]) -> BatchOutcome {
    let outcome = generate_all(renderer, records, |done, total| {
        tracing::info!("Progress: {}/{}", done, total);
    });
    for failure in &outcome.failures {
        eprintln!("  failed: {} ({})", failure.name, failure.error);
    }
    outcome
}

fn run_extract(config: &AppConfig, image: &Path, threshold: Option<f32>, json: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let extractor = NameExtractor::from_config(config);
    let threshold = threshold.unwrap_or_else(|| extractor.default_threshold());
    let result = extractor.extract_from_bytes(&bytes, threshold);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.is_empty() {
        println!("No names found. {}", result.text);
    } else {
        for name in &result.names {
            println!("{name}");
        }
    }
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn run_generate(
    config: &AppConfig,
    source: &RecipientSource,
    design: &DesignArgs,
    out: &Path,
) -> anyhow::Result<()> {
    let records = load_recipients(source, config)?;
    if records.is_empty() {
        bail!("no recipients found");
    }

    let renderer = build_renderer(design, config)?;
    let outcome = render_batch(&renderer, &records);
    let archive = certy_delivery::bundle(&outcome.certificates)?;
    std::fs::write(out, archive).with_context(|| format!("writing {}", out.display()))?;

    println!(
        "Generated {} of {} certificates into {}",
        outcome.certificates.len(),
        outcome.total,
        out.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_send(
    config: &AppConfig,
    records: &Path,
    design: &DesignArgs,
    sender: String,
    password: String,
    smtp_server: Option<String>,
    smtp_port: Option<u16>,
    subject: Option<String>,
    body_file: Option<&Path>,
) -> anyhow::Result<()> {
    let mut settings = EmailSettings::new(&config.email, sender, password).with_server(
        smtp_server.unwrap_or_else(|| config.email.smtp_server.clone()),
        smtp_port.unwrap_or(config.email.smtp_port),
    );
    if let Some(subject) = subject {
        settings = settings.with_subject(subject);
    }
    if let Some(path) = body_file {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        settings = settings.with_body_template(body);
    }

    let records = certy_records::read_records(records)?;
    let renderer = build_renderer(design, config)?;
    let outcome = render_batch(&renderer, &records);

    let sender = EmailSender::new(SmtpMailer::new(&settings)?, settings);
    if !sender.test_connection() {
        bail!("Email connection failed. Please check credentials.");
    }

    let report = sender.send_bulk(&records, &outcome);
    for failed in &report.failed {
        eprintln!("  not sent: {} <{}>: {}", failed.name, failed.email, failed.error);
    }
    println!(
        "Sent {} emails successfully, {} failed.",
        report.success_count, report.failure_count
    );
    Ok(())
}

fn run_layout(config: &AppConfig, action: LayoutAction) -> anyhow::Result<()> {
    match action {
        LayoutAction::Init { path } => {
            LayoutConfig::default().save(&path)?;
            println!("Wrote default layout to {}", path.display());
        }
        LayoutAction::Preview {
            layout,
            template,
            out,
        } => {
            let layout_path = layout.or_else(|| config.render.layout_path.clone());
            let layout = match &layout_path {
                Some(path) => load_layout(path)?,
                None => LayoutConfig::default(),
            };

            let layout_dir = layout_path.as_deref().and_then(Path::parent);
            let mut fonts = FontBook::system();
            fonts.register_custom(&layout.custom_fonts, layout_dir);
            let template = template_for(template.as_deref(), config, Some((&layout, layout_dir)));

            let mut renderer = TemplateRenderer::new(LayoutPolicy::Configured(layout), fonts);
            if let Some(path) = template {
                renderer = renderer.with_template_path(&path);
            }
            renderer.check().context("renderer is not usable")?;

            renderer.render(&sample_record())?.save(&out)?;
            println!("Wrote preview to {}", out.display());
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Extract {
            image,
            threshold,
            json,
        } => run_extract(&config, &image, threshold, json),
        Commands::Generate {
            source,
            design,
            out,
        } => run_generate(&config, &source, &design, &out),
        Commands::Send {
            records,
            design,
            sender,
            password,
            smtp_server,
            smtp_port,
            subject,
            body_file,
        } => run_send(
            &config,
            &records,
            &design,
            sender,
            password,
            smtp_server,
            smtp_port,
            subject,
            body_file.as_deref(),
        ),
        Commands::Layout { action } => run_layout(&config, action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_requires_one_source() {
        assert!(Cli::try_parse_from(["certy", "generate", "--out", "a.zip"]).is_err());
        assert!(Cli::try_parse_from([
            "certy",
            "generate",
            "--records",
            "a.csv",
            "--names-file",
            "names.txt",
            "--out",
            "a.zip"
        ])
        .is_err());

        let cli = Cli::try_parse_from([
            "certy",
            "generate",
            "--names-file",
            "names.txt",
            "--no-date",
            "--out",
            "a.zip",
        ])
        .unwrap();
        match cli.command {
            Commands::Generate { source, design, .. } => {
                assert_eq!(source.names_file, Some(PathBuf::from("names.txt")));
                assert!(design.no_date);
                assert_eq!((design.x, design.y), (500, 300));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_records_from_names() {
        let records = records_from_names("Jane Doe\n\n  John Smith  \n");
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Jane Doe", "John Smith"]);
    }

    #[test]
    fn test_fixed_policy_without_layout() {
        let cli = Cli::try_parse_from([
            "certy", "generate", "--names-file", "n.txt", "--x", "120", "--font-size", "24",
            "--out", "a.zip",
        ])
        .unwrap();
        let Commands::Generate { design, .. } = cli.command else {
            panic!("expected generate");
        };

        match layout_policy(&design, None).unwrap() {
            LayoutPolicy::Fixed(fixed) => {
                assert_eq!(fixed.x, 120);
                assert_eq!(fixed.font_size, 24.0);
                assert!(fixed.date.is_some());
            }
            LayoutPolicy::Configured(_) => panic!("expected fixed layout"),
        }
    }

    #[test]
    fn test_configured_policy_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        LayoutConfig::default().save(&path).unwrap();

        let cli = Cli::try_parse_from([
            "certy",
            "generate",
            "--names-file",
            "n.txt",
            "--layout",
            path.to_str().unwrap(),
            "--out",
            "a.zip",
        ])
        .unwrap();
        let Commands::Generate { design, .. } = cli.command else {
            panic!("expected generate");
        };

        assert!(matches!(
            layout_policy(&design, None).unwrap(),
            LayoutPolicy::Configured(_)
        ));
    }

    #[test]
    fn test_template_precedence() {
        let layout = LayoutConfig::default();
        let layout_dir = Path::new("/srv/designs");
        let mut config = AppConfig::default();
        config.render.template_path = None;

        assert_eq!(
            template_for(None, &config, Some((&layout, Some(layout_dir)))),
            Some(PathBuf::from("/srv/designs/template.pdf"))
        );
        assert_eq!(template_for(None, &config, None), None);

        config.render.template_path = Some(PathBuf::from("default.png"));
        assert_eq!(
            template_for(None, &config, Some((&layout, Some(layout_dir)))),
            Some(PathBuf::from("default.png"))
        );
        assert_eq!(
            template_for(Some(Path::new("flag.pdf")), &config, None),
            Some(PathBuf::from("flag.pdf"))
        );
    }
}
