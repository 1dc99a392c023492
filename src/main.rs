//! gloo-rag: ask questions against Gloo AI content, search it, ingest into it,
//! or run the search/RAG proxy.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use gloo_rag::core::config::AppPaths;
use gloo_rag::core::logging;
use gloo_rag::ingest::{self, ItemMetadata};
use gloo_rag::llm::{plan_goal, ChatOptions, GenerationRequest, RoutingMode};
use gloo_rag::search::{clamp_limit, filter_by_content_type, SearchQuery, SortOrder};
use gloo_rag::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "gloo-rag", version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to config.yml in the data or working directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the search and RAG proxy server
    Serve {
        /// Port to bind (overrides settings and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Answer a question from retrieved content
    Ask {
        query: String,
        /// Number of search results to retrieve (1-100)
        #[arg(short, long)]
        limit: Option<i64>,
        /// relevance or certainty
        #[arg(long, default_value = "relevance")]
        sort_by: SortOrder,
        #[arg(long)]
        system_prompt: Option<String>,
        /// Only use results of these content types
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },
    /// Run a semantic search and print the results
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<i64>,
        /// Keep only these content types, e.g. Article,Video
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
        #[arg(long, default_value = "relevance")]
        sort_by: SortOrder,
    },
    /// Chat completion without local retrieval
    Complete {
        prompt: String,
        /// Let the platform ground the answer on its own sources
        #[arg(long)]
        grounded: bool,
        /// Restrict platform grounding to one publisher
        #[arg(long, requires = "grounded")]
        publisher: Option<String>,
        #[arg(long)]
        system_prompt: Option<String>,
        #[command(flatten)]
        routing: RoutingArgs,
        #[arg(long)]
        temperature: Option<f32>,
    },
    /// Talk in a platform-managed chat session
    Chat {
        message: String,
        /// Continue this chat instead of opening a new one
        #[arg(long)]
        chat_id: Option<String>,
        /// Print the whole conversation afterwards
        #[arg(long)]
        history: bool,
        #[arg(long)]
        no_suggestions: bool,
    },
    /// Turn a goal into a step-by-step growth plan (structured tool call)
    Plan {
        goal: String,
        #[command(flatten)]
        routing: RoutingArgs,
    },
    /// Push content into the platform
    Ingest {
        #[command(subcommand)]
        action: IngestAction,
    },
}

/// Model selection; at most one of these may be given.
#[derive(clap::Args, Debug)]
struct RoutingArgs {
    /// Auto-route, steered by this tradition (e.g. evangelical)
    #[arg(long, conflicts_with_all = ["family", "model"])]
    tradition: Option<String>,
    /// Use any model from this provider family (e.g. anthropic)
    #[arg(long, conflicts_with = "model")]
    family: Option<String>,
    /// Use this exact model id
    #[arg(long)]
    model: Option<String>,
}

impl RoutingArgs {
    fn into_mode(self) -> RoutingMode {
        match (self.model, self.family) {
            (Some(model), _) => RoutingMode::Model(model),
            (None, Some(family)) => RoutingMode::Family(family),
            (None, None) => RoutingMode::Auto {
                tradition: self.tradition,
            },
        }
    }
}

#[derive(Subcommand, Debug)]
enum IngestAction {
    /// Upload a .txt/.md file through realtime ingestion
    Text { file: PathBuf },
    /// Upload a file (.txt .md .pdf .doc .docx) to the data engine
    Upload {
        file: PathBuf,
        #[arg(long)]
        producer_id: Option<String>,
    },
    /// Upload a file and set its metadata
    Meta {
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        /// Comma separated
        #[arg(long)]
        tags: Option<String>,
    },
    /// Upload every .txt/.md file in a directory, one per second
    Batch { dir: PathBuf },
    /// Watch a directory and upload new .txt/.md files as they appear
    Watch { dir: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut paths = AppPaths::new();
    if let Some(config) = &cli.config {
        paths.config_path = config.clone();
    }
    let filter = match cli.verbose {
        0 => "info",
        1 => "gloo_rag=debug,info",
        _ => "trace",
    };
    logging::init(&paths, filter);

    let state = AppState::initialize(&paths).context("Failed to initialize")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Commands::Serve { port } => serve(state, port, cancel).await,
        Commands::Ask {
            query,
            limit,
            sort_by,
            system_prompt,
            types,
        } => ask(&state, &query, limit, sort_by, system_prompt, types, &cancel).await,
        Commands::Search {
            query,
            limit,
            types,
            sort_by,
        } => search(&state, &query, limit, types, sort_by, &cancel).await,
        Commands::Complete {
            prompt,
            grounded,
            publisher,
            system_prompt,
            routing,
            temperature,
        } => {
            let request = completion_request(&state, prompt, grounded, publisher)
                .system_prompt(system_prompt)
                .routing(routing.into_mode())
                .temperature(temperature);
            complete(&state, &request, &cancel).await
        }
        Commands::Chat {
            message,
            chat_id,
            history,
            no_suggestions,
        } => chat(&state, &message, chat_id, history, !no_suggestions, &cancel).await,
        Commands::Plan { goal, routing } => plan(&state, &goal, routing.into_mode(), &cancel).await,
        Commands::Ingest { action } => run_ingest(&state, action, cancel).await,
    }
}

async fn serve(state: Arc<AppState>, port: Option<u16>, cancel: CancellationToken) -> anyhow::Result<()> {
    let host = state.settings.server.host.clone();
    let port = port.unwrap_or(state.settings.server.port);
    let bind_addr = format!("{}:{}", host, port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    gloo_rag::server::serve(state, listener, cancel).await
}

async fn ask(
    state: &AppState,
    query: &str,
    limit: Option<i64>,
    sort: SortOrder,
    system_prompt: Option<String>,
    types: Vec<String>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut options = state.rag_options();
    if let Some(limit) = limit {
        options.limit = clamp_limit(limit, options.limit);
    }
    options.sort = sort;
    options.system_prompt = system_prompt;
    if !types.is_empty() {
        options.content_types = Some(types);
    }

    let answer = state
        .pipeline
        .run(query, &options, cancel)
        .await
        .with_context(|| format!("Could not answer '{}'", query))?;

    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!("  {}. {} ({})", i + 1, source.title, source.content_type);
        }
    }
    Ok(())
}

async fn search(
    state: &AppState,
    query: &str,
    limit: Option<i64>,
    types: Vec<String>,
    sort: SortOrder,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let rag = &state.settings.rag;
    let limit = limit
        .map(|l| clamp_limit(l, rag.default_search_limit))
        .unwrap_or(rag.default_search_limit);
    let search_query = SearchQuery::new(query, limit, rag.min_certainty).sorted_by(sort);

    let mut results = state
        .search
        .search(&search_query, cancel)
        .await
        .context("Search failed")?;
    if !types.is_empty() {
        results = filter_by_content_type(results, &types);
    }

    if results.is_empty() {
        println!("No results for '{}'.", query);
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        println!("{}. {} [{}] certainty {:.3}", i + 1, result.title, result.content_type, result.certainty);
        if !result.authors.is_empty() {
            println!("   by {}", result.authors.join(", "));
        }
        if !result.snippet_text.is_empty() {
            println!("   {}", result.snippet_text.chars().take(200).collect::<String>());
        }
    }
    Ok(())
}

fn completion_request(
    state: &AppState,
    prompt: String,
    grounded: bool,
    publisher: Option<String>,
) -> GenerationRequest {
    let rag = &state.settings.rag;
    if grounded {
        let publisher = publisher.or_else(|| state.settings.platform.publisher_name.clone());
        GenerationRequest::platform_grounded(prompt, publisher, rag.sources_limit, rag.max_tokens)
    } else {
        GenerationRequest::ungrounded(prompt, rag.max_tokens)
    }
}

async fn complete(
    state: &AppState,
    request: &GenerationRequest,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let result = state
        .generation
        .generate(request, cancel)
        .await
        .context("Completion failed")?;

    println!("{}", result.answer_text);
    tracing::info!(
        "Model {} (sources used: {})",
        result.model_id,
        result.sources_returned
    );
    Ok(())
}

async fn chat(
    state: &AppState,
    message: &str,
    chat_id: Option<String>,
    show_history: bool,
    suggestions: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let options = ChatOptions {
        suggestions,
        ..ChatOptions::default()
    };
    let reply = state
        .chat
        .send_message(message, chat_id.as_deref(), &options, cancel)
        .await
        .context("Chat message failed")?;

    println!("{}", reply.message);
    if !reply.suggestions.is_empty() {
        println!();
        println!("Suggested follow-ups:");
        for (i, suggestion) in reply.suggestions.iter().enumerate() {
            println!("  {}. {}", i + 1, suggestion);
        }
    }
    println!();
    println!("Chat ID: {}", reply.chat_id);

    if show_history {
        let history = state
            .chat
            .history(&reply.chat_id, cancel)
            .await
            .context("Could not fetch chat history")?;
        println!();
        println!("History (started {}):", history.created_at);
        for (i, entry) in history.messages.iter().enumerate() {
            println!("{}. {} [{}]:", i + 1, entry.role.to_uppercase(), entry.timestamp);
            println!("{}", entry.message);
        }
    }
    Ok(())
}

async fn plan(
    state: &AppState,
    goal: &str,
    routing: RoutingMode,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let plan = plan_goal(
        state.generation.as_ref(),
        goal,
        routing,
        state.settings.rag.max_tokens,
        cancel,
    )
    .await
    .context("Could not build a plan")?;

    println!("{}", plan.goal_title);
    println!("{}", "=".repeat(plan.goal_title.chars().count()));
    for step in &plan.steps {
        println!();
        println!("{}. {}", step.step_number, step.action);
        println!("   Timeline: {}", step.timeline);
    }
    Ok(())
}

async fn run_ingest(state: &AppState, action: IngestAction, cancel: CancellationToken) -> anyhow::Result<()> {
    match action {
        IngestAction::Text { file } => {
            let uploader = state.realtime_uploader()?;
            let message = uploader
                .process_file(&file, &cancel)
                .await
                .with_context(|| format!("Failed to ingest {}", file.display()))?;
            println!("Uploaded {}: {}", file.display(), message);
        }
        IngestAction::Upload { file, producer_id } => {
            let uploader = state.file_uploader()?;
            let receipt = uploader
                .upload_file(&file, producer_id.as_deref(), &cancel)
                .await
                .with_context(|| format!("Failed to upload {}", file.display()))?;
            println!("{}", receipt.message);
            for item in &receipt.ingesting {
                println!("  ingesting: {}", item);
            }
            for item in &receipt.duplicates {
                println!("  duplicate: {}", item);
            }
        }
        IngestAction::Meta {
            file,
            title,
            author,
            tags,
        } => {
            let pairs = [("title", title), ("author", author), ("tags", tags)]
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key, v)));
            let metadata = ItemMetadata::from_pairs(pairs)?;
            let uploader = state.file_uploader()?;
            let outcome = uploader
                .upload_with_metadata(&file, &metadata, &cancel)
                .await
                .with_context(|| format!("Failed to upload {}", file.display()))?;
            println!("Producer ID: {}", outcome.producer_id);
            match outcome.receipt.ingesting.first() {
                Some(item) => println!("Item ID: {}", item),
                None => println!("{}", outcome.receipt.message),
            }
            if let Some(message) = outcome.metadata_message {
                println!("Metadata updated: {}", message);
            }
        }
        IngestAction::Batch { dir } => {
            let uploader = state.realtime_uploader()?;
            let report = ingest::batch_upload(&dir, &uploader, ingest::BATCH_PAUSE, &cancel).await?;
            println!("Processed: {} files", report.processed);
            println!("Failed: {} files", report.failed.len());
            for (path, reason) in &report.failed {
                println!("  {}: {}", path.display(), reason);
            }
        }
        IngestAction::Watch { dir } => {
            let uploader = Arc::new(state.realtime_uploader()?);
            println!("Watching {} (Ctrl-C to stop)", dir.display());
            ingest::watch_directory(dir, uploader, cancel).await?;
        }
    }
    Ok(())
}
