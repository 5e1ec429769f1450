use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use repoqa_core::bootstrap::{build_provider, build_session, load_or_build_index};
use repoqa_core::{Answer, Config, DirectoryCorpus, QaSession};
use repoqa_llm::LlmProvider;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Ask questions about a local source repository.
#[derive(Debug, Parser)]
#[command(name = "repoqa", version, about)]
struct Cli {
    /// Checked-out repository to index.
    #[arg(default_value = ".")]
    repo: PathBuf,

    /// TOML config file (default: $REPOQA_CONFIG, then ./repoqa.toml).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config);
    let mut config = Config::load(&config_path)?;
    config.resolve_secrets();
    config.validate()?;

    let provider = Arc::new(build_provider(&config)?);
    tracing::info!(
        provider = provider.name(),
        model = %config.llm.model,
        embedding_model = %config.llm.embedding_model,
        "provider ready"
    );

    let corpus = DirectoryCorpus::new(&cli.repo, &config.corpus);
    let index = load_or_build_index(Arc::clone(&provider), &corpus, &config)
        .await
        .with_context(|| format!("failed to index {}", cli.repo.display()))?;
    tracing::info!(chunks = index.len(), "index ready");

    let session = build_session(provider, index, &config);
    question_loop(&session).await
}

async fn question_loop<P: LlmProvider>(session: &QaSession<P>) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let question = line.trim();
        match question {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                session.reset().await;
                stdout.write_all(b"conversation cleared\n").await?;
                continue;
            }
            _ => {}
        }

        match session.ask(question).await {
            Ok(answer) => stdout.write_all(render_answer(&answer).as_bytes()).await?,
            Err(e) if e.is_transient() => {
                tracing::warn!("question failed, try again: {e}");
            }
            Err(e) => {
                tracing::error!("question failed: {e}");
            }
        }
    }
    Ok(())
}

fn render_answer(answer: &Answer) -> String {
    let mut out = format!("{}\n", answer.text);
    let files = answer.source_files();
    if !files.is_empty() {
        out.push_str("\nSources:\n");
        for file in files {
            out.push_str("  ");
            out.push_str(file);
            out.push('\n');
        }
    }
    out.push('\n');
    out
}

fn resolve_config_path(arg: Option<PathBuf>) -> PathBuf {
    if let Some(path) = arg {
        return path;
    }
    if let Ok(path) = std::env::var("REPOQA_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("repoqa.toml")
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
