//! mailtriage - local email triage and daily action digest
//!
//! Lists recent mail threads, classifies the ones that changed, keeps a
//! deduplicated task list, and mails a bucketed HTML digest.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/mailtriage/state.db (~/.local/share/mailtriage/state.db)
//! - Logs: $XDG_STATE_HOME/mailtriage/mailtriage.log (~/.local/state/mailtriage/mailtriage.log)
//! - Config: $XDG_CONFIG_HOME/mailtriage/config.toml (~/.config/mailtriage/config.toml)

mod init;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailtriage_core::cycle::{poll_interval, CycleReport, TriageCycle};
use mailtriage_core::mail::{FixtureProvider, GmailClient};
use mailtriage_core::schema::load_schema;
use mailtriage_core::{Config, Database, OpenTask, TriageEngine, TriageSchema};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Open tasks printed by `list`.
const LIST_LIMIT: usize = 200;

#[derive(Parser)]
#[command(name = "mailtriage")]
#[command(about = "Triage recent mail into tasks and a daily action digest")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config, schema and credentials files
    Init {
        /// Gmail access token to store in the credentials file
        #[arg(long)]
        access_token: Option<String>,

        /// Overwrite existing config and schema files
        #[arg(long)]
        force: bool,
    },

    /// Run one triage cycle
    Run,

    /// Run triage cycles until interrupted
    Poll {
        /// Minutes between cycles (minimum 1; defaults to cycle.poll_interval_minutes)
        #[arg(long = "interval-min")]
        interval_min: Option<u64>,
    },

    /// Mark a task as done
    Done {
        /// Task id as shown by `list`
        id: i64,
    },

    /// List open tasks
    List,

    /// Run one cycle against a fixture mailbox and write the digest to a file
    Demo {
        /// JSON fixture of threads and messages
        fixture: PathBuf,

        /// Where to write the digest HTML
        #[arg(long, default_value = "digest_preview.html")]
        preview_html: PathBuf,

        /// Address treated as mine (enables the follow-up scan)
        #[arg(long)]
        my_email: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let mut config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        mailtriage_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("mailtriage starting");

    match cli.command {
        Command::Init {
            access_token,
            force,
        } => init::run(access_token.as_deref(), force),
        Command::Run => {
            let (engine, provider) = live_components(&config)?;
            let db = open_database()?;
            let report = TriageCycle::new(&db, &provider, &engine, &config)
                .run_once()
                .context("triage cycle failed")?;
            print_cycle_report(&report);
            Ok(())
        }
        Command::Poll { interval_min } => {
            let (engine, provider) = live_components(&config)?;
            let db = open_database()?;
            let cycle = TriageCycle::new(&db, &provider, &engine, &config);
            let minutes = interval_min.unwrap_or(config.cycle.poll_interval_minutes);
            run_poll_mode(&cycle, minutes)
        }
        Command::Done { id } => {
            let db = open_database()?;
            db.mark_task_done(id)
                .with_context(|| format!("failed to mark task {id} as done"))?;
            println!("Marked task {id} as done.");
            tracing::info!(task_id = id, "Task marked done");
            Ok(())
        }
        Command::List => {
            let db = open_database()?;
            let tasks = db.list_open_tasks().context("failed to list open tasks")?;
            print_open_tasks(&tasks);
            Ok(())
        }
        Command::Demo {
            fixture,
            preview_html,
            my_email,
        } => {
            if my_email.is_some() {
                config.mail.my_email = my_email;
            }
            run_demo(&config, &fixture, &preview_html)
        }
    }
}

/// Open the database at its XDG path and apply migrations.
fn open_database() -> Result<Database> {
    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;
    Ok(db)
}

/// Load the configured schema file. Without `allow_bundled` a missing file is
/// a configuration error; with it the bundled schema stands in.
fn load_triage_schema(config: &Config, allow_bundled: bool) -> Result<TriageSchema> {
    let path = config.schema_path();
    let default_domain = Some(config.triage.default_domain.as_str());
    let schema = if allow_bundled && !path.exists() {
        tracing::info!(path = %path.display(), "No schema file, using bundled schema");
        TriageSchema::bundled(&config.triage.domains, default_domain)
    } else {
        load_schema(&path, &config.triage.domains, default_domain)
    };
    schema.context("failed to load classification schema")
}

/// Classifier and mailbox client for live cycles. Configuration problems
/// surface here, before any cycle runs.
fn live_components(config: &Config) -> Result<(TriageEngine, GmailClient)> {
    config
        .validate_for_cycle()
        .context("configuration is incomplete")?;

    let schema = load_triage_schema(config, false)?;
    let engine =
        TriageEngine::from_config(config, schema).context("failed to create classifier")?;
    let provider = GmailClient::new(&config.mail, &config.credentials_path())
        .context("failed to create mail client")?;

    tracing::info!(
        mode = config.llm.mode.as_str(),
        model = engine.model_name(),
        "Live triage ready"
    );
    Ok((engine, provider))
}

/// Run cycles until Ctrl+C. A failed cycle is logged and the loop continues.
fn run_poll_mode(cycle: &TriageCycle<'_>, minutes: u64) -> Result<()> {
    // Set up signal handler for graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let interval = poll_interval(minutes);

    println!(
        "Poll mode active (every {} min). Press Ctrl+C to stop.",
        interval.as_secs() / 60
    );
    println!();

    let mut iteration = 0u64;

    while running.load(Ordering::SeqCst) {
        iteration += 1;
        let timestamp = chrono::Local::now().format("%H:%M:%S");

        match cycle.run_once() {
            Ok(report) => {
                println!(
                    "[{}] threads: {} seen, {} analyzed | tasks: +{} new, {} open{}",
                    timestamp,
                    report.threads_seen,
                    report.threads_analyzed,
                    report.tasks_created + report.followups_created,
                    report.open_tasks,
                    if report.digest_sent { " | digest sent" } else { "" }
                );
                tracing::info!(
                    iteration,
                    threads_analyzed = report.threads_analyzed,
                    open_tasks = report.open_tasks,
                    "poll iteration"
                );
            }
            Err(e) => {
                println!("[{}] cycle failed: {}", timestamp, e);
                tracing::error!(iteration, error = %e, "poll iteration failed");
            }
        }

        sleep_while_running(&running, interval);
    }

    println!("Poll mode stopped.");
    tracing::info!("mailtriage poll mode stopped");

    Ok(())
}

/// Sleep for `total`, waking early once `running` is cleared.
fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(Duration::from_secs(1)));
    }
}

/// One cycle against a fixture mailbox in a throwaway database.
fn run_demo(config: &Config, fixture: &Path, preview_html: &Path) -> Result<()> {
    let provider = FixtureProvider::load(fixture)
        .with_context(|| format!("failed to load fixture {}", fixture.display()))?;

    let db = Database::open_in_memory().context("failed to open demo database")?;
    db.migrate().context("failed to run database migrations")?;

    let mut config = config.clone();
    config.cycle.send_digest = false;

    // The classifier follows llm.mode; only the mailbox is replaced
    config.validate_llm().context("configuration is incomplete")?;
    let schema = load_triage_schema(&config, true)?;
    let engine =
        TriageEngine::from_config(&config, schema).context("failed to create classifier")?;
    tracing::info!(mode = config.llm.mode.as_str(), "Demo triage ready");

    let report = TriageCycle::new(&db, &provider, &engine, &config)
        .run_once()
        .context("demo cycle failed")?;

    std::fs::write(preview_html, &report.digest_html)
        .with_context(|| format!("failed to write {}", preview_html.display()))?;

    print_cycle_report(&report);
    println!();
    println!("Digest preview: {}", preview_html.display());
    Ok(())
}

/// Print cycle result summary
fn print_cycle_report(report: &CycleReport) {
    println!("Cycle complete:");
    println!("  Follow-ups created: {}", report.followups_created);
    println!("  Threads seen:       {}", report.threads_seen);
    println!("  Threads analyzed:   {}", report.threads_analyzed);
    println!("  Threads unchanged:  {}", report.threads_unchanged);
    println!("  Threads suppressed: {}", report.threads_suppressed);
    println!("  Tasks created:      {}", report.tasks_created);
    println!("  Open tasks:         {}", report.open_tasks);
    if report.digest_sent {
        println!("  Digest:             sent");
    }

    if report.threads_failed > 0 {
        println!(
            "\nTriage failed for {} thread(s); they will be retried next cycle.",
            report.threads_failed
        );
    }
}

fn print_open_tasks(tasks: &[OpenTask]) {
    if tasks.is_empty() {
        println!("No open tasks.");
        return;
    }

    println!("Open tasks:");
    for task in tasks.iter().take(LIST_LIMIT) {
        println!("{}", format_task_row(task));
    }
    if tasks.len() > LIST_LIMIT {
        println!("... and {} more", tasks.len() - LIST_LIMIT);
    }
}

/// Two-line listing: id, priority, due date, bucket and title, then the subject.
fn format_task_row(open: &OpenTask) -> String {
    let task = &open.task;
    let due = task.due_date.as_deref().unwrap_or("-");
    let bucket = open.thread_bucket.as_deref().unwrap_or("-");
    let subject = open.thread_subject.as_deref().map(str::trim).unwrap_or("-");
    format!(
        "#{:>4}  [{:<6}]  due {:<10}  {:<18}  {}\n      subj: {}",
        task.id,
        task.priority,
        due,
        bucket,
        task.title.trim(),
        subject
    )
}
