//! CLI binary for study-notes.
//!
//! A thin shim over the library: runs the full pipeline on one local file
//! against an in-memory store and prints what it produced.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use study_notes::{
    extract_text_async, validate_key, InMemoryStore, NoteDetail, NoteStatus, NoteStore,
    ProcessingObserver, RunReport, Stage, StudyConfig, StudyService, UploadRequest,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Spinner observer ─────────────────────────────────────────────────────────

/// Prints one line per finished stage above a spinner.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Processing");
        bar.set_message("waiting for worker…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ProcessingObserver for CliObserver {
    fn on_run_start(&self, _note_id: Uuid) {
        self.bar.set_message("summarising…");
    }

    fn on_stage_complete(&self, _note_id: Uuid, stage: Stage, items: usize) {
        self.bar.println(format!(
            "  {} {:<11} {}",
            green("✓"),
            stage.as_str(),
            dim(&format!("{items} items"))
        ));
        if stage == Stage::Summary {
            self.bar.set_message("flashcards, questions, events…");
        }
    }

    fn on_run_complete(&self, _note_id: Uuid, report: &RunReport) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} flashcards, {} questions, {} events",
            green("✔"),
            report.flashcards,
            report.questions,
            report.events
        );
        if report.skipped_events > 0 {
            eprintln!("  {}", dim(&format!("{} events skipped (bad dates)", report.skipped_events)));
        }
    }

    fn on_run_failed(&self, _note_id: Uuid, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full pipeline on a PDF, tagged with a course name
  study-notes process lecture3.pdf --course "Machine Learning"

  # Machine-readable output
  study-notes process notes.md --json > week1.json

  # Text extraction only (no API key needed)
  study-notes extract slides.pdf

  # Check a key before uploading
  study-notes validate-key

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          Model credential (must start with sk-)
  STUDY_NOTES_MODEL       Override model ID (default gpt-4o-mini)
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  RUST_LOG                Tracing filter, e.g. study_notes=debug
"#;

/// Turn lecture notes into summaries, flashcards, questions and deadlines.
#[derive(Parser, Debug)]
#[command(
    name = "study-notes",
    version,
    about = "Turn lecture notes into summaries, flashcards, questions and deadlines",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "STUDY_NOTES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "STUDY_NOTES_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline on a file and print the results.
    Process {
        /// Notes file: .pdf, .txt, .md, .html (anything else is read as text).
        file: PathBuf,

        /// Course name passed to the summary prompt.
        #[arg(long)]
        course: Option<String>,

        /// Note title (defaults to the filename).
        #[arg(long)]
        title: Option<String>,

        /// Print the note with all generated records as JSON.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Check that an API key is accepted by the provider.
    ValidateKey {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Print the text extracted from a file.
    Extract {
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// Model credential.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// LLM model ID.
    #[arg(long, env = "STUDY_NOTES_MODEL")]
    model: Option<String>,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "STUDY_NOTES_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Retries per stage on transient LLM failure.
    #[arg(long, env = "STUDY_NOTES_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,
}

impl ModelArgs {
    fn config(&self) -> Result<StudyConfig> {
        let mut builder = StudyConfig::builder()
            .api_timeout_secs(self.api_timeout)
            .max_retries(self.max_retries)
            .workers(1);
        if let Some(ref model) = self.model {
            builder = builder.model(model);
        }
        builder.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives the feedback that matters; library INFO logs would
    // interleave with it.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || matches!(cli.command, Command::Process { .. }) {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Extract { file } => {
            let (bytes, filename) = read_input(&file).await?;
            let text = extract_text_async(bytes, filename)
                .await
                .context("Text extraction failed")?;
            println!("{text}");
        }

        Command::ValidateKey { model } => {
            let config = model.config()?;
            let outcome = validate_key(&model.api_key, &config).await;
            match outcome.reason {
                None => println!("{} key accepted", green("✔")),
                Some(reason) => anyhow::bail!("key rejected: {reason}"),
            }
        }

        Command::Process {
            file,
            course,
            title,
            json,
            model,
        } => {
            let config = model.config()?;
            let (bytes, filename) = read_input(&file).await?;
            let show_progress = !cli.quiet && !json;
            let detail = process(
                config,
                bytes,
                filename,
                course,
                title,
                model.api_key,
                show_progress,
            )
            .await?;

            if json {
                let out =
                    serde_json::to_string_pretty(&detail).context("Failed to serialise output")?;
                println!("{out}");
            } else {
                print_detail(&detail);
            }

            if detail.note.status == NoteStatus::Failed {
                anyhow::bail!(
                    "processing failed: {}",
                    detail.note.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    Ok(())
}

async fn read_input(path: &Path) -> Result<(Vec<u8>, String)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((bytes, filename))
}

/// Upload into a throwaway in-memory service and wait for the run to finish.
async fn process(
    config: StudyConfig,
    bytes: Vec<u8>,
    filename: String,
    course: Option<String>,
    title: Option<String>,
    credential: String,
    show_progress: bool,
) -> Result<NoteDetail> {
    let store = Arc::new(InMemoryStore::new());
    let owner_id = Uuid::new_v4();
    let course_id = match course {
        Some(name) => Some(store.create_course(owner_id, name, None).await?.id),
        None => None,
    };

    let observer = show_progress.then(|| CliObserver::new() as Arc<dyn ProcessingObserver>);
    let service = StudyService::new(config, store.clone(), observer);

    let note = service
        .upload(UploadRequest {
            owner_id,
            course_id,
            title,
            filename,
            bytes,
            credential,
        })
        .await
        .context("Upload rejected")?;

    // Draining the pool waits for the one queued run.
    service.shutdown().await.context("Worker pool failed")?;

    let (note, flashcards, study_questions, extracted_events) = futures::try_join!(
        store.get_note(note.id),
        store.flashcards_for_note(note.id),
        store.questions_for_note(note.id),
        store.events_for_note(note.id),
    )?;
    Ok(NoteDetail {
        note,
        flashcards,
        study_questions,
        extracted_events,
    })
}

fn print_detail(detail: &NoteDetail) {
    let note = &detail.note;
    println!("{}", bold(&note.title));
    if let Some(ref summary) = note.summary {
        println!("\n{summary}");
    }
    if let Some(ref concepts) = note.key_concepts {
        if !concepts.is_empty() {
            println!("\n{}", bold("Key concepts"));
            for c in concepts {
                println!("  • {c}");
            }
        }
    }
    if let Some(ref gaps) = note.knowledge_gaps {
        if !gaps.is_empty() {
            println!("\n{}", bold("Review further"));
            for g in gaps {
                println!("  • {g}");
            }
        }
    }
    if !detail.flashcards.is_empty() {
        println!("\n{}", bold("Flashcards"));
        for card in &detail.flashcards {
            println!("  [{}] {}", card.difficulty, card.front);
            println!("      {}", dim(&card.back));
        }
    }
    if !detail.study_questions.is_empty() {
        println!("\n{}", bold("Study questions"));
        for q in &detail.study_questions {
            println!("  ({}) {}", q.question_type, q.question);
            if let Some(ref answer) = q.suggested_answer {
                println!("      {}", dim(answer));
            }
        }
    }
    if !detail.extracted_events.is_empty() {
        println!("\n{}", bold("Dates"));
        for e in &detail.extracted_events {
            println!(
                "  {}  {:<12} {}  {}",
                e.event_date.format("%Y-%m-%d %H:%M"),
                e.event_type.as_str(),
                e.title,
                dim(&format!("{:.0}%", e.confidence * 100.0))
            );
        }
    }
}
