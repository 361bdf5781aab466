mod display;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use fairtrade_ai::{EmbeddingProvider, OpenAiChat, OpenAiEmbeddings, api_key_from_env};
use fairtrade_core::RagConfig;
use fairtrade_engine::{EXAMPLE_CASES, FairTradeRag, example_case};

/// Fair-trade law assistant: retrieval-grounded case analysis and law summaries.
#[derive(Parser)]
#[command(name = "fairtrade", version)]
struct Cli {
    /// JSON config file; unset fields take their defaults.
    #[arg(long, global = true, env = "FAIRTRADE_CONFIG")]
    config: Option<PathBuf>,

    /// Law corpus file written by the collector.
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Directory holding the persisted vector index.
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// API key for the embedding and generation endpoints.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Embed locally with an ONNX model directory instead of the HTTP endpoint.
    #[cfg(feature = "onnx")]
    #[arg(long, global = true)]
    onnx_model: Option<PathBuf>,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show corpus and index readiness.
    Status,
    /// Reload the corpus file and rebuild the vector index.
    Build,
    /// Show the law units most similar to a query.
    Search {
        query: String,
        /// Number of units to return.
        #[arg(short)]
        k: Option<usize>,
    },
    /// Analyse a case against the indexed laws ("-" reads stdin).
    Analyze {
        #[arg(required_unless_present = "example")]
        text: Option<String>,
        /// Use a built-in example case instead of TEXT.
        #[arg(long, conflicts_with = "text")]
        example: Option<String>,
    },
    /// Summarise one law, or every law in the corpus.
    Summarize {
        /// Law title or keyword, e.g. "하도급법".
        #[arg(long)]
        law: Option<String>,
    },
    /// List the built-in example cases.
    Examples,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    tracing::debug!("fairtrade v{}", env!("CARGO_PKG_VERSION"));
    let cli = Cli::parse();

    if let Command::Examples = cli.command {
        for case in &EXAMPLE_CASES {
            println!("== {} ==\n{}\n", case.name, case.description);
        }
        return Ok(());
    }

    let config = load_config(&cli)?;
    let rag = build_engine(&cli, config)?;

    match &cli.command {
        Command::Status => {
            let status = rag.status();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                display::print_status(&status);
            }
        }
        Command::Build => {
            let stats = rag.rebuild_index().await?;
            println!(
                "indexed {} units ({} dims, model {}) at {}",
                stats.units,
                stats.dimensions,
                stats.model,
                stats.built_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Command::Search { query, k } => {
            let hits = rag.retrieve(query, *k).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                display::print_hits(&hits);
            }
        }
        Command::Analyze { text, example } => {
            let case = case_text(text.as_deref(), example.as_deref())?;
            let result = rag.analyze_case(&case).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                display::print_analysis(&result);
            }
        }
        Command::Summarize { law } => {
            println!("{}", rag.get_law_summary(law.as_deref()).await?);
        }
        Command::Examples => {}
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<RagConfig> {
    let mut config = match &cli.config {
        Some(path) => RagConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RagConfig::default(),
    };
    if let Some(corpus) = &cli.corpus {
        config.corpus_path = corpus.clone();
    }
    if let Some(dir) = &cli.index_dir {
        config.index_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn build_engine(cli: &Cli, config: RagConfig) -> anyhow::Result<FairTradeRag> {
    let embedding_key = cli
        .api_key
        .clone()
        .or_else(|| api_key_from_env(config.embedding.api_key_env.as_deref()));
    let generation_key = cli
        .api_key
        .clone()
        .or_else(|| api_key_from_env(config.generation.api_key_env.as_deref()));

    let embedder = embedder(cli, &config, embedding_key)?;
    let generator = Arc::new(OpenAiChat::new(&config.generation, generation_key)?);
    Ok(FairTradeRag::new(config, embedder, generator)?)
}

#[cfg(feature = "onnx")]
fn embedder(
    cli: &Cli,
    config: &RagConfig,
    key: Option<String>,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    if let Some(dir) = &cli.onnx_model {
        return Ok(Arc::new(fairtrade_ai::OnnxEmbeddings::load(dir)?));
    }
    Ok(Arc::new(OpenAiEmbeddings::new(&config.embedding, key)?))
}

#[cfg(not(feature = "onnx"))]
fn embedder(
    _cli: &Cli,
    config: &RagConfig,
    key: Option<String>,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(OpenAiEmbeddings::new(&config.embedding, key)?))
}

fn case_text(text: Option<&str>, example: Option<&str>) -> anyhow::Result<String> {
    match (text, example) {
        (Some("-"), _) => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        (Some(text), _) => Ok(text.to_string()),
        (None, Some(name)) => match example_case(name) {
            Some(case) => Ok(case.description.to_string()),
            None => bail!("unknown example case '{name}'; run `fairtrade examples`"),
        },
        (None, None) => bail!("provide case text or --example"),
    }
}
