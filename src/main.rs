use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use brightsteps_lib::{
    application::{IngestDocumentRequest, PageText},
    build_environment,
    domain::{Answer, AnswerMode},
    init_tracing, resolve_data_dir,
    settings::{available_backends, ConfigManager},
};

/// Ask questions about child development against an indexed knowledge base.
#[derive(Parser)]
#[command(name = "brightsteps", author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question from the knowledge base
    Ask {
        question: String,
        /// strict (context only) or augmented (context plus general knowledge)
        #[arg(long)]
        mode: Option<AnswerMode>,
        /// Print the full answer as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add or replace a plain-text document. Form feeds separate pages.
    Ingest {
        file: PathBuf,
        /// Source name stored with each chunk (defaults to the file name)
        #[arg(long)]
        source: Option<String>,
        /// Page number of the first page
        #[arg(long)]
        page: Option<u32>,
    },
    /// Remove every chunk of a source
    Forget {
        #[arg(long)]
        source: String,
    },
    /// List indexed sources
    Sources,
    /// Check store and model readiness
    Health,
    /// Print the active configuration and where it is stored
    Config,
}

fn main() -> ExitCode {
    init_tracing();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Ask {
            question,
            mode,
            json,
        } => {
            let handles = build_environment()?;
            let mode = mode.unwrap_or(handles.service.config().default_mode);
            let answer = handles.service.answer_question(&question, mode);
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                print_answer(&answer);
            }
            Ok(if answer.is_error() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Ingest { file, source, page } => {
            let source = match source {
                Some(source) => source,
                None => file_label(&file)?,
            };
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let request = IngestDocumentRequest {
                source,
                pages: split_pages(&raw, page),
            };

            let handles = build_environment()?;
            let summary = handles
                .service
                .ingest_document(request)
                .map_err(|err| anyhow!(err.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Forget { source } => {
            let handles = build_environment()?;
            let removed = handles
                .service
                .forget_source(&source)
                .map_err(|err| anyhow!(err.to_string()))?;
            match removed {
                Some(count) => println!("removed {count} chunks from {source}"),
                None => println!("removed {source}"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sources => {
            let handles = build_environment()?;
            let listing = handles
                .service
                .sources()
                .map_err(|err| anyhow!(err.to_string()))?;
            for source in listing.sources {
                println!("{source}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Health => {
            let handles = build_environment()?;
            let status = handles
                .service
                .health()
                .map_err(|err| anyhow!(err.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            let data_dir = resolve_data_dir()?;
            let manager = ConfigManager::load(&data_dir).context("failed to load config file")?;
            if !manager.path().exists() {
                manager.persist().context("failed to write default config")?;
            }
            let backends: Vec<&str> = available_backends().iter().map(|b| b.id()).collect();
            println!("# {}", manager.path().display());
            println!("# embedding backends: {}", backends.join(", "));
            println!("{}", serde_json::to_string_pretty(&manager.current())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_answer(answer: &Answer) {
    if let Some(text) = &answer.text {
        println!("{text}");
    }
    if let Some(error) = &answer.error {
        eprintln!("error: {error}");
    }
    if let Some(contexts) = answer.contexts.as_ref().filter(|c| !c.is_empty()) {
        println!();
        println!("Contexts used:");
        for (index, context) in contexts.iter().enumerate() {
            let preview: String = context.chars().take(160).collect();
            println!("  [{}] {}", index + 1, preview.replace('\n', " "));
        }
    }
}

fn file_label(file: &Path) -> Result<String> {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("cannot derive a source name from {}", file.display()))
}

fn split_pages(raw: &str, first_page: Option<u32>) -> Vec<PageText> {
    if !raw.contains('\u{c}') {
        return vec![PageText {
            page: first_page,
            text: raw.to_string(),
        }];
    }

    let start = first_page.unwrap_or(1);
    raw.split('\u{c}')
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(index, text)| PageText {
            page: Some(start + index as u32),
            text: text.to_string(),
        })
        .collect()
}
