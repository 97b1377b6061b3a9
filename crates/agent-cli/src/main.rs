//! Command-line interface for reflective stock-data queries

use agent_llm::providers::OpenAIProvider;
use agent_query::{
    ChatSession, EmbeddingIndex, KeywordIndex, Language, QueryConfig, QueryResolver,
    ReflectionObserver, Retriever, StockAnalyzer, TraceRecorder, TracingObserver,
    load_markdown_dir,
};
use agent_utils::LogFormat;
use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::Table;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "agent-cli")]
#[command(about = "Answer stock-data questions with generated and judged code", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Directory of markdown documentation for the data library
    #[arg(long, global = true, env = "QUERY_DOCS_DIR", default_value = "docs")]
    docs: PathBuf,

    /// How documentation is searched
    #[arg(long, global = true, value_enum, default_value_t = RetrievalKind::Keyword)]
    retrieval: RetrievalKind,

    /// Embedding index cache file
    #[arg(long, global = true, default_value = "embedding_index.json")]
    index: PathBuf,

    /// Chat model, overriding QUERY_MODEL
    #[arg(long, global = true)]
    model: Option<String>,

    /// Prompt language (zh or en), overriding QUERY_LANGUAGE
    #[arg(long, global = true)]
    language: Option<Language>,

    /// Log output format
    #[arg(long, global = true, default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum RetrievalKind {
    /// Term overlap, no network
    Keyword,
    /// Cosine similarity over embeddings
    Embedding,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one question and print the data as JSON
    Query {
        /// The question
        question: String,
        /// Single pass: no judge, no reflection, no retry
        #[arg(long)]
        direct: bool,
        /// Iterations per cycle
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Cycles restarted after a duplicate result
        #[arg(long)]
        max_retries: Option<usize>,
        /// Print every step of the resolution
        #[arg(long)]
        trace: bool,
    },
    /// Write a markdown research report for one stock
    Report {
        /// Stock name
        #[arg(long)]
        stock: String,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        start: NaiveDate,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        end: NaiveDate,
    },
    /// Chat interactively; /clear resets the history, /exit quits
    Chat {
        /// Scope every question to this stock
        #[arg(long)]
        stock: Option<String>,
        /// Markdown report pinned into the conversation
        #[arg(long)]
        report_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agent_utils::load_dotenv();
    let cli = Cli::parse();
    agent_utils::init_tracing_with(cli.global.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting agent-cli");

    let mut config = QueryConfig::from_env()?;
    if let Some(model) = &cli.global.model {
        config.model.clone_from(model);
    }
    if let Some(language) = cli.global.language {
        config.language = language;
    }

    match cli.command {
        Commands::Query {
            question,
            direct,
            max_iterations,
            max_retries,
            trace,
        } => {
            if let Some(n) = max_iterations {
                config.max_iterations = n;
            }
            if let Some(n) = max_retries {
                config.max_retries = n;
            }
            run_query(&cli.global, config, &question, direct, trace).await
        }
        Commands::Report { stock, start, end } => {
            if start > end {
                bail!("--start {start} is after --end {end}");
            }
            let resolver = build_resolver(&cli.global, config, Arc::new(TracingObserver)).await?;
            let analyzer = StockAnalyzer::new(resolver);
            let analysis = analyzer.analyze_stock(&stock, start, end).await?;
            println!("{}", analyzer.report(&analysis).await?);
            Ok(())
        }
        Commands::Chat { stock, report_file } => {
            let resolver = build_resolver(&cli.global, config, Arc::new(TracingObserver)).await?;
            run_chat(resolver, stock.as_deref(), report_file).await
        }
    }
}

async fn build_resolver(
    global: &GlobalArgs,
    config: QueryConfig,
    observer: Arc<dyn ReflectionObserver>,
) -> anyhow::Result<Arc<QueryResolver>> {
    let provider = Arc::new(OpenAIProvider::from_env()?);
    let documents = load_markdown_dir(&global.docs)
        .with_context(|| format!("loading documentation from {}", global.docs.display()))?;
    info!(documents = documents.len(), "Loaded documentation");

    let retriever: Arc<dyn Retriever> = match global.retrieval {
        RetrievalKind::Keyword => Arc::new(KeywordIndex::new(documents)),
        RetrievalKind::Embedding => Arc::new(
            EmbeddingIndex::load_or_build(provider.clone(), documents, &global.index).await?,
        ),
    };

    let resolver = QueryResolver::builder()
        .llm(provider)
        .retriever(retriever)
        .observer(observer)
        .config(config)
        .build()?;
    Ok(Arc::new(resolver))
}

async fn run_query(
    global: &GlobalArgs,
    config: QueryConfig,
    question: &str,
    direct: bool,
    trace: bool,
) -> anyhow::Result<()> {
    let recorder = Arc::new(TraceRecorder::new());
    let observer: Arc<dyn ReflectionObserver> = if trace {
        recorder.clone()
    } else {
        Arc::new(TracingObserver)
    };
    let resolver = build_resolver(global, config, observer).await?;

    let outcome = if direct {
        Some(resolver.resolve_direct(question).await?.outcome)
    } else {
        let resolution = resolver.resolve(question).await?;
        info!(attempts = resolution.attempts, terminal = resolution.terminal.label(), "Resolved");
        resolution.terminal.into_outcome()
    };

    if trace {
        print_trace(&recorder);
    }

    match outcome {
        Some(outcome) => match outcome.value() {
            Some(value) => {
                println!("{}", serde_json::to_string_pretty(value)?);
                Ok(())
            }
            None => bail!("generated code failed: {}", outcome.text()),
        },
        None => bail!("every cycle ended on a duplicate result"),
    }
}

fn print_trace(recorder: &TraceRecorder) {
    let mut table = Table::new();
    table.set_header(vec!["Attempt", "Iteration", "Stage", "Detail"]);
    for event in recorder.events() {
        table.add_row(vec![
            event.attempt.to_string(),
            event.iteration.map(|i| i.to_string()).unwrap_or_default(),
            event.stage.to_string(),
            event.detail,
        ]);
    }
    eprintln!("{table}");
}

async fn run_chat(
    resolver: Arc<QueryResolver>,
    stock: Option<&str>,
    report_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut session = match report_file {
        Some(path) => {
            let report = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading report {}", path.display()))?;
            ChatSession::with_report(resolver, &report)?
        }
        None => ChatSession::new(resolver),
    };
    info!(session = %session.id(), "Chat started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/exit" => break,
            "/clear" => {
                session.clear_history();
                println!("(history cleared)");
                continue;
            }
            _ => {}
        }

        let message = match stock {
            Some(stock) => session.scoped_question(stock, line)?,
            None => line.to_string(),
        };

        let mut turn = match session.process_message(&message).await {
            Ok(turn) => turn,
            Err(err) => {
                eprintln!("error: {err}");
                continue;
            }
        };
        while let Some(token) = turn.next().await {
            match token {
                Ok(token) => {
                    print!("{token}");
                    std::io::stdout().flush()?;
                }
                Err(err) => {
                    eprintln!("\nerror: {err}");
                    break;
                }
            }
        }
        println!();
    }

    Ok(())
}
