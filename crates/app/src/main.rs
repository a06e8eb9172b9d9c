use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use travel_search_core::{
    corpus, DuckDuckGoSearch, EmbeddingBackend, EngineConfig, FolderAnalyzer, FusionMode,
    HttpPageFetcher, IndexCache, OpenAiConfig, ScrapeStatus, SearchProvider, SynthesisBackend,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_MAX_SEARCH_RESULTS, DEFAULT_OPENAI_API_BASE,
};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbedderKind {
    Hashing,
    Openai,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SynthesizerKind {
    Extractive,
    Openai,
}

#[derive(Parser)]
#[command(name = "travel-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root folder holding one sub-folder per location.
    #[arg(long, env = "TRAVEL_SEARCH_DATA", default_value = "data")]
    data_root: PathBuf,

    /// Embedding backend used for indexing and queries.
    #[arg(long, value_enum, default_value = "hashing")]
    embedder: EmbedderKind,

    /// Answer backend.
    #[arg(long, value_enum, default_value = "extractive")]
    synthesizer: SynthesizerKind,

    /// API key for OpenAI-compatible backends.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// Base URL for OpenAI-compatible backends.
    #[arg(long, env = "OPENAI_API_BASE", default_value = DEFAULT_OPENAI_API_BASE)]
    openai_api_base: String,

    /// Embedding model for the openai embedder.
    #[arg(long, default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Vector size produced by the embedder.
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Chat model for the openai synthesizer.
    #[arg(long, default_value = "gpt-4o-mini")]
    chat_model: String,

    /// Maximum answer length for the extractive synthesizer.
    #[arg(long, default_value = "2000")]
    max_answer_chars: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Create a location folder and its metadata file.
    CreateFolder {
        /// Human-readable location name.
        #[arg(long)]
        location: String,
        /// Folder id; a new one is generated when omitted.
        #[arg(long)]
        folder_uuid: Option<String>,
    },
    /// Search the web for pages about a subject.
    Search {
        #[arg(long)]
        subject: String,
        #[arg(long, default_value_t = DEFAULT_MAX_SEARCH_RESULTS)]
        max_results: usize,
        /// Scrape the found pages into this location folder.
        #[arg(long)]
        folder_uuid: Option<String>,
    },
    /// Fetch pages and store their text in a location folder.
    Scrape {
        #[arg(long)]
        folder_uuid: String,
        /// Page to fetch; repeat for several pages.
        #[arg(long = "url", required = true)]
        urls: Vec<String>,
    },
    /// Build the folder index, or load it when already cached.
    Index {
        #[arg(long)]
        folder_uuid: String,
    },
    /// Answer a question from a folder's pages.
    Analyze {
        #[arg(long)]
        folder_uuid: String,
        #[arg(long)]
        query: String,
        /// Fusion mode, AND or OR.
        #[arg(long, default_value = "AND")]
        mode: String,
        /// Number of vector hits to consider.
        #[arg(long, default_value = "2")]
        top_k: usize,
        /// Print the cited page text after the answer.
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
    /// Delete a folder's cached index so the next query rebuilds it.
    Invalidate {
        #[arg(long)]
        folder_uuid: String,
    },
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        let embedding = match self.embedder {
            EmbedderKind::Hashing => EmbeddingBackend::Hashing {
                dimensions: self.embedding_dimensions,
            },
            EmbedderKind::Openai => EmbeddingBackend::OpenAi {
                model: self.embedding_model.clone(),
                dimensions: self.embedding_dimensions,
            },
        };
        let synthesis = match self.synthesizer {
            SynthesizerKind::Extractive => SynthesisBackend::Extractive {
                max_chars: self.max_answer_chars,
            },
            SynthesizerKind::Openai => SynthesisBackend::ChatCompletion {
                model: self.chat_model.clone(),
            },
        };

        EngineConfig {
            data_root: self.data_root.clone(),
            openai: OpenAiConfig {
                api_base: self.openai_api_base.clone(),
                api_key: self.openai_api_key.clone(),
            },
            embedding,
            synthesis,
            ..EngineConfig::default()
        }
    }
}

fn index_cache(config: &EngineConfig) -> Arc<IndexCache> {
    Arc::new(IndexCache::new(
        Arc::new(config.document_source()),
        config.build_embedder(),
        config.cache_options(),
    ))
}

async fn scrape(config: &EngineConfig, folder_uuid: &str, urls: &[String]) -> anyhow::Result<()> {
    let folder = corpus::resolve_folder(&config.data_root, folder_uuid)?;
    let fetcher = HttpPageFetcher::new()?;
    let outcomes = corpus::save_scraped_pages(&folder, urls, &fetcher).await?;

    let saved = outcomes
        .iter()
        .filter(|outcome| outcome.status == ScrapeStatus::Saved)
        .count();
    for outcome in &outcomes {
        println!("[{}] {}", outcome.status, outcome.url);
    }
    info!(folder = %folder.display(), saved, total = outcomes.len(), "scrape finished");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = cli.engine_config();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        data_root = %config.data_root.display(),
        "travel-search boot"
    );

    let uses_openai = matches!(cli.embedder, EmbedderKind::Openai)
        || matches!(cli.synthesizer, SynthesizerKind::Openai);
    if uses_openai && config.openai.api_key.is_none() {
        warn!("no OpenAI API key configured; requests may be rejected");
    }

    match cli.command {
        Command::CreateFolder {
            location,
            folder_uuid,
        } => {
            let folder_uuid = folder_uuid.unwrap_or_else(|| Uuid::new_v4().to_string());
            let folder =
                corpus::create_location_folder(&config.data_root, &folder_uuid, &location)?;
            println!("folder_uuid={folder_uuid}");
            println!("path={}", folder.display());
        }
        Command::Search {
            subject,
            max_results,
            folder_uuid,
        } => {
            let results = DuckDuckGoSearch::new()?
                .search(&subject, max_results)
                .await?;
            if results.is_empty() {
                println!("no results for {subject:?}");
            }
            for result in &results {
                println!("{}\n  {}\n  {}", result.title, result.link, result.snippet);
            }

            if let Some(folder_uuid) = folder_uuid {
                let urls: Vec<String> = results.into_iter().map(|result| result.link).collect();
                scrape(&config, &folder_uuid, &urls).await?;
            }
        }
        Command::Scrape { folder_uuid, urls } => {
            scrape(&config, &folder_uuid, &urls).await?;
        }
        Command::Index { folder_uuid } => {
            config.validate()?;
            let folder = corpus::resolve_folder(&config.data_root, &folder_uuid)?;
            let bundle = index_cache(&config).load_or_build(&folder).await?;
            println!(
                "{} nodes indexed ({} keywords) at {}",
                bundle.documents.len(),
                bundle.keyword.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Analyze {
            folder_uuid,
            query,
            mode,
            top_k,
            show_context,
        } => {
            config.fusion_mode = mode.parse::<FusionMode>()?;
            config.vector_top_k = top_k;
            config.validate()?;

            let folder = corpus::resolve_folder(&config.data_root, &folder_uuid)?;
            let mut analyzer = FolderAnalyzer::new(
                folder,
                index_cache(&config),
                config.build_synthesizer(),
                config.analyzer_options(),
            );
            analyzer.load_and_index().await?;

            let response = analyzer.query(&query).await?;
            println!("query: {}", response.query);
            println!("response:\n{}", response.response);
            if show_context {
                for (index, text) in response.context.iter().enumerate() {
                    println!("[context {}]\n{text}", index + 1);
                }
            } else {
                println!("context: {} passage(s)", response.context.len());
            }
        }
        Command::Invalidate { folder_uuid } => {
            let folder = corpus::resolve_folder(&config.data_root, &folder_uuid)?;
            let removed = index_cache(&config).invalidate(&folder).await?;
            if removed {
                println!("cached index removed for {}", folder.display());
            } else {
                println!("no cached index for {}", folder.display());
            }
        }
    }

    Ok(())
}
