//! Longhand CLI.
//!
//! Thin operational shell over the library: submit a job, run it to a
//! terminal state, and inspect state and progress. All orchestration
//! logic lives in the library; this binary only parses arguments and
//! prints results.
//!
//! ```bash
//! longhand submit "A field guide to peat bogs" --length long --span book
//! longhand run <job-id>
//! longhand status <job-id>
//! longhand list
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use longhand::jobs::{JobManager, JobStore};
use longhand::sched::{Scheduler, SchedulerConfig};
use longhand::session::SessionOverrides;
use longhand::spec::{LengthPreset, RunSpec, SpanPreset};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory for job descriptors, event logs, and the queue.
    #[arg(long, default_value = ".longhand")]
    state_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a job and print its id.
    Submit {
        /// Subject or topic of the document.
        subject: String,

        /// Length preset: standard | long | very-long | max
        #[arg(long, default_value = "long")]
        length: String,

        /// Span preset: medium | long | book
        #[arg(long, default_value = "book")]
        span: String,

        /// Backend identifier (bridge | openrouter).
        #[arg(long, default_value = "bridge")]
        backend: String,

        /// Output artifact path.
        #[arg(long)]
        out: Option<PathBuf>,

        /// File containing the composed system prompt.
        #[arg(long)]
        system_file: Option<PathBuf>,
    },

    /// Run a pending job to a terminal state.
    Run {
        job_id: String,

        /// Priority, lower is more urgent.
        #[arg(long, default_value_t = 0)]
        priority: i32,
    },

    /// Show a job's state, progress, and last error.
    Status { job_id: String },

    /// List all jobs.
    List,
}

fn parse_length(s: &str) -> Result<LengthPreset> {
    Ok(match s {
        "standard" => LengthPreset::Standard,
        "long" => LengthPreset::Long,
        "very-long" => LengthPreset::VeryLong,
        "max" => LengthPreset::Max,
        other => bail!("unknown length preset: {}", other),
    })
}

fn parse_span(s: &str) -> Result<SpanPreset> {
    Ok(match s {
        "medium" => SpanPreset::Medium,
        "long" => SpanPreset::Long,
        "book" => SpanPreset::Book,
        other => bail!("unknown span preset: {}", other),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let store = JobStore::open(&args.state_path)
        .with_context(|| format!("opening store at {}", args.state_path.display()))?
        .shared();

    match args.command {
        Command::Submit {
            subject,
            length,
            span,
            backend,
            out,
            system_file,
        } => {
            let mut spec = RunSpec::new(subject)
                .with_length(parse_length(&length)?)
                .with_span(parse_span(&span)?)
                .with_backend(backend);
            if let Some(out) = out {
                spec = spec.with_out_path(out);
            }
            let system_prompt = match system_file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => String::new(),
            };

            let manager = JobManager::new(store);
            // Resume an existing incomplete job for the same artifact
            // instead of creating a duplicate.
            if let Some(existing) = manager.find_resumable(&spec.artifact_path())? {
                info!(job_id = %existing, "Resumable job already targets this artifact");
                let id = manager.prepare_resume(&existing)?;
                println!("{}", id);
                return Ok(());
            }
            let id = manager.submit(spec, system_prompt, SessionOverrides::default())?;
            println!("{}", id);
        }

        Command::Run { job_id, priority } => {
            let scheduler = Scheduler::new(store.clone(), SchedulerConfig::default());
            scheduler.restore()?;
            scheduler.submit(&job_id, priority)?;
            scheduler.wait(&job_id).await;

            let job = store.load(&job_id)?;
            println!("{} {}", job.id, job.state);
        }

        Command::Status { job_id } => {
            let manager = JobManager::new(store.clone());
            let job = manager.load(&job_id)?;
            let last_chunk = store.last_completed_chunk(&job_id)?;
            println!("id:       {}", job.id);
            println!("name:     {}", job.name);
            println!("state:    {}", job.state);
            println!("backend:  {}", job.backend);
            println!("artifact: {}", job.out_path.display());
            println!(
                "progress: chunk {}/{} ({} bytes)",
                last_chunk,
                job.spec.resolved().chunks,
                job.progress.bytes_written
            );
            if let Some(err) = &job.progress.last_error {
                println!("error:    {}: {}", err.code, err.message);
            }
        }

        Command::List => {
            let manager = JobManager::new(store);
            for job in manager.list()? {
                println!("{}  {:9}  {}", job.id, job.state.to_string(), job.name);
            }
        }
    }

    Ok(())
}
