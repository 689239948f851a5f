//! CLI entry point for support-rag.
//!
//! Builds index generations from scraped pages, queries them, and serves the
//! chat endpoint. Library errors are reported with recovery hints and mapped
//! to stable exit codes.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use support_rag::answer::{AnswerGenerator, ExtractiveAnswerer, build_prompt};
use support_rag::display::{
    THEME, create_build_table, create_help_text, create_manifest_table, create_results_table,
    with_spinner,
};
use support_rag::io::{ExitCode, JsonResponse, OutputFormat, ResponseMeta};
use support_rag::{
    Chunker, Embedder, FastEmbedLoader, IndexBuilder, IndexStore, ModelCache, RagError,
    RetrievalResult, Retriever, Settings,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Retrieval-augmented answering over a support-site corpus
#[derive(Parser)]
#[command(
    name = "support-rag",
    version = env!("CARGO_PKG_VERSION"),
    about = "Retrieval-augmented answering over a support-site corpus",
    long_about = "Chunk and embed scraped support pages, then answer questions from the closest chunks.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = create_help_text()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug detail to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .support-rag directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Build a new index generation from the corpus
    #[command(
        about = "Chunk, embed and publish the corpus as a new index generation",
        after_help = "Examples:\n  support-rag index\n  support-rag index --data-dir data/jiopay --model e5-small --progress"
    )]
    Index {
        /// Directory of scraped *.json pages (overrides data_dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Embedding model (overrides embedding.model)
        #[arg(short, long)]
        model: Option<String>,

        /// Show progress while embedding
        #[arg(short, long)]
        progress: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the chunks closest to a query
    #[command(
        about = "Rank indexed chunks against a query",
        after_help = "Examples:\n  support-rag retrieve \"refund timeline\"\n  support-rag retrieve \"KYC documents\" --top-k 3 --json\n\nJSON paths:\n  .data[].score\n  .data[].meta.url"
    )]
    Retrieve {
        query: String,

        /// Embedding model; must match the one the index was built with
        #[arg(short, long)]
        model: Option<String>,

        /// Number of chunks to return (overrides retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the index
    #[command(about = "Retrieve and answer a question with cited sources")]
    Ask {
        query: String,

        #[arg(short, long)]
        model: Option<String>,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Also print the LLM prompt assembled from the retrieved chunks
        #[arg(long)]
        show_prompt: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the active index generation
    #[command(about = "Display the manifest of the active index generation")]
    Info {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .support-rag/settings.toml")]
    Config,

    /// Start the HTTP server
    #[command(
        about = "Serve POST /chat over HTTP",
        after_help = "Examples:\n  support-rag serve\n  support-rag serve --bind 0.0.0.0:8000\n\nRequires the http-server feature."
    )]
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },
}

impl Commands {
    fn output_format(&self) -> OutputFormat {
        let json = match self {
            Commands::Index { json, .. }
            | Commands::Retrieve { json, .. }
            | Commands::Ask { json, .. }
            | Commands::Info { json } => *json,
            _ => false,
        };
        OutputFormat::from_json_flag(json)
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_ref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", THEME.error_with_icon(&format!("Configuration error: {e}")));
            return ExitCode::ConfigError.into();
        }
    };

    init_tracing(cli.debug || settings.debug);

    let format = cli.command.output_format();
    match run(cli.command, settings) {
        Ok(code) => code.into(),
        Err(e) => report_error(&e, format).into(),
    }
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => {
            let mut settings = Settings::load_from(path)?;
            if settings.workspace_root.is_none() {
                settings.workspace_root = Settings::workspace_root();
            }
            settings
        }
        None => Settings::load()?,
    };
    settings.validate()?;
    Ok(settings)
}

fn init_tracing(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}

fn report_error(error: &anyhow::Error, format: OutputFormat) -> ExitCode {
    let Some(rag) = error.downcast_ref::<RagError>() else {
        eprintln!("{}", THEME.error_with_icon(&format!("{error:#}")));
        return ExitCode::GeneralError;
    };

    if format.is_json() {
        let response = JsonResponse::from_error(rag).with_meta(ResponseMeta::now(None));
        match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing error response: {e}"),
        }
    } else {
        eprintln!("{}", THEME.error_with_icon(&rag.to_string()));
        for suggestion in rag.recovery_suggestions() {
            eprintln!("  {}", THEME.apply(&THEME.dim, suggestion));
        }
    }
    ExitCode::from_error(rag)
}

fn print_json<T: serde::Serialize>(data: T, started: Instant) -> anyhow::Result<()> {
    let elapsed = started.elapsed().as_millis() as u64;
    let response = JsonResponse::success(data).with_meta(ResponseMeta::now(Some(elapsed)));
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// One model cache per process, shared by every embedder built from it.
fn build_embedder(settings: &Settings) -> Embedder {
    let loader = FastEmbedLoader::new(settings.embedding.models_dir())
        .with_download_progress(settings.embedding.show_download_progress);
    let cache = ModelCache::new(Arc::new(loader)).with_load_timeout(settings.embedding.load_timeout());
    Embedder::new(Arc::new(cache)).with_batch_size(settings.embedding.batch_size)
}

fn index_store(settings: &Settings) -> IndexStore {
    IndexStore::new(settings.resolve_path(&settings.index_path))
}

fn build_retriever(settings: &Settings) -> Retriever {
    Retriever::new(build_embedder(settings), index_store(settings))
        .with_load_timeout(settings.retrieval.load_timeout())
}

fn retrieve(
    settings: &Settings,
    retriever: &Retriever,
    query: &str,
    model: Option<&str>,
    top_k: Option<usize>,
    format: OutputFormat,
) -> Result<Vec<RetrievalResult>, RagError> {
    let model = model.unwrap_or(&settings.embedding.model);
    let top_k = top_k.unwrap_or(settings.retrieval.top_k);
    if format.is_json() {
        retriever.retrieve(query, model, top_k)
    } else {
        with_spinner("Searching index...", || retriever.retrieve(query, model, top_k))
    }
}

fn run(command: Commands, settings: Settings) -> anyhow::Result<ExitCode> {
    let format = command.output_format();
    let started = Instant::now();

    match command {
        Commands::Init { force } => match Settings::init_config_file(force) {
            Ok(path) => {
                println!(
                    "{}",
                    THEME.success_with_icon(&format!(
                        "Created configuration file at: {}",
                        path.display()
                    ))
                );
                println!("Edit this file to customize your settings.");
            }
            Err(e) => {
                eprintln!("{}", THEME.error_with_icon(&e.to_string()));
                return Ok(ExitCode::ConfigError);
            }
        },

        Commands::Config => {
            println!("{}", THEME.apply(&THEME.header, "Current Configuration:"));
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
        }

        Commands::Index {
            data_dir,
            model,
            progress,
            json,
        } => {
            let data_dir = settings.resolve_path(data_dir.as_ref().unwrap_or(&settings.data_dir));
            let model = model.unwrap_or_else(|| settings.embedding.model.clone());
            let chunker = Chunker::new(settings.chunking.clone())?;
            let builder = IndexBuilder::new(build_embedder(&settings), index_store(&settings))
                .with_batch_size(settings.embedding.batch_size)
                .with_progress(progress && !json);

            if !json {
                eprintln!(
                    "Indexing {} with {}",
                    THEME.apply(&THEME.source, data_dir.display()),
                    THEME.apply(&THEME.number, &model)
                );
            }
            let report = builder.build_from_corpus(&data_dir, &chunker, &model)?;

            if json {
                print_json(&report, started)?;
            } else {
                println!("{}", create_build_table(&report));
                if report.chunk_count == 0 {
                    println!("{}", THEME.warning_with_icon("Corpus produced no chunks"));
                } else {
                    println!("{}", THEME.success_with_icon("Index published"));
                }
            }
        }

        Commands::Retrieve {
            query,
            model,
            top_k,
            json,
        } => {
            let retriever = build_retriever(&settings);
            let results = retrieve(&settings, &retriever, &query, model.as_deref(), top_k, format)?;

            if json {
                print_json(&results, started)?;
            } else if results.is_empty() {
                println!("{}", THEME.warning_with_icon("Index is empty, nothing to rank"));
            } else {
                println!("{}", create_results_table(&results));
            }
        }

        Commands::Ask {
            query,
            model,
            top_k,
            show_prompt,
            json,
        } => {
            let retriever = build_retriever(&settings);
            let results = retrieve(&settings, &retriever, &query, model.as_deref(), top_k, format)?;
            let answer = ExtractiveAnswerer::new(settings.answer.clone()).generate(&query, &results)?;

            if json {
                let mut data = serde_json::json!({ "answer": answer, "retrieved": results });
                if show_prompt {
                    data["prompt"] = build_prompt(&query, &results, &settings.answer).into();
                }
                print_json(data, started)?;
            } else {
                if show_prompt {
                    println!("{}", THEME.apply(&THEME.header, "Prompt:"));
                    println!("{}\n", build_prompt(&query, &results, &settings.answer));
                }
                println!("{}", THEME.apply(&THEME.answer, &answer));
                if !results.is_empty() {
                    println!();
                    for result in &results {
                        println!(
                            "  {} {}",
                            THEME.score(result.score),
                            THEME.apply(&THEME.source, &result.meta.url)
                        );
                    }
                }
            }
        }

        Commands::Info { json } => {
            let store = index_store(&settings);
            let (Some(generation), Some(manifest)) =
                (store.current_generation()?, store.current_manifest()?)
            else {
                return Err(RagError::IndexNotBuilt {
                    path: store.root().to_path_buf(),
                }
                .into());
            };
            let generations = store.list_generations()?;

            if json {
                print_json(
                    serde_json::json!({
                        "generation": generation,
                        "manifest": manifest,
                        "generations": generations,
                    }),
                    started,
                )?;
            } else {
                println!("{}", create_manifest_table(&generation, &manifest));
                println!(
                    "{} generation(s) on disk in {}",
                    THEME.apply(&THEME.number, generations.len()),
                    THEME.apply(&THEME.source, store.root().display())
                );
            }
        }

        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
            return serve(&settings, &bind);
        }
    }

    Ok(ExitCode::Success)
}

#[cfg(feature = "http-server")]
fn serve(settings: &Settings, bind: &str) -> anyhow::Result<ExitCode> {
    use support_rag::server::{self, AppState};

    let retriever = Arc::new(build_retriever(settings));
    // Warm the index so the first request does not pay for the load.
    match retriever.reload() {
        Ok(Some(generation)) => tracing::info!(generation = %generation, "loaded index"),
        Ok(None) => tracing::warn!("no index built yet, /chat will answer 503 until one is"),
        Err(e) => tracing::warn!("could not load index: {e}"),
    }

    let answerer: Arc<dyn AnswerGenerator> = Arc::new(ExtractiveAnswerer::new(settings.answer.clone()));
    let state = AppState::new(retriever, answerer)
        .with_defaults(settings.retrieval.top_k, settings.embedding.model.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(server::serve(state, &settings.server.allowed_origins, bind))?;
    Ok(ExitCode::Success)
}

#[cfg(not(feature = "http-server"))]
fn serve(_settings: &Settings, _bind: &str) -> anyhow::Result<ExitCode> {
    eprintln!("HTTP server support is not compiled in.");
    eprintln!("Please rebuild with: cargo build --features http-server");
    Ok(ExitCode::GeneralError)
}
