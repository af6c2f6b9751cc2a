//! rill - streaming chat client for llmchat-style backends

mod config;

use std::io::Write as _;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use rill_client::{
    ApiClient, ClientStore, InclusionStatus, PreviewRequest, Role, StagedItem, Turn, TurnHandle,
    TurnStatus, reconcile, run_turn,
};

/// rill - streaming chat client
#[derive(Parser, Debug)]
#[command(name = "rill")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL (overrides config)
    #[arg(long)]
    base_url: Option<String>,

    /// Session id (overrides config)
    #[arg(long)]
    session: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Context items to stage alongside the request
#[derive(clap::Args, Debug, Default)]
struct StageArgs {
    /// Stage an inline text snippet (repeatable)
    #[arg(long = "stage-text", value_name = "TEXT")]
    stage_text: Vec<String>,

    /// Stage a server-side file by path (repeatable)
    #[arg(long = "stage-file", value_name = "PATH")]
    stage_file: Vec<String>,

    /// Stage a workspace item by id (repeatable)
    #[arg(long = "stage-workspace", value_name = "ID")]
    stage_workspace: Vec<String>,

    /// Stage a history message by id (repeatable)
    #[arg(long = "stage-message", value_name = "ID")]
    stage_message: Vec<String>,
}

impl StageArgs {
    fn items(&self) -> Vec<StagedItem> {
        let mut items = Vec::new();
        items.extend(self.stage_text.iter().map(StagedItem::text));
        items.extend(self.stage_file.iter().map(StagedItem::file));
        items.extend(self.stage_workspace.iter().map(StagedItem::workspace_ref));
        items.extend(self.stage_message.iter().map(StagedItem::history_ref));
        items
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message and stream the assistant reply to stdout
    Chat {
        message: String,
        #[command(flatten)]
        stage: StageArgs,
    },
    /// Preview the context the backend would assemble right now
    Preview {
        /// The would-be next query, for a more accurate preview
        #[arg(long)]
        query: Option<String>,
        #[command(flatten)]
        stage: StageArgs,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Create a default config file if none exists
    Init,
    /// Print the effective config
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let cfg = config::Config::load();

    let filter = if args.verbose {
        "rill=debug".to_string()
    } else {
        std::env::var("RILL_LOG")
            .ok()
            .or_else(|| cfg.log_filter.clone())
            .unwrap_or_else(|| "rill=warn".to_string())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Command::Config { action } = &args.command {
        return match action {
            ConfigAction::Init => {
                let path = config::Config::init().context("failed to create config")?;
                println!("Config file: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
                Ok(())
            }
            ConfigAction::Show => {
                println!("config path: {}", config::Config::config_path().display());
                println!("base_url:    {}", effective_base_url(&args, &cfg));
                println!(
                    "session_id:  {}",
                    args.session
                        .clone()
                        .or_else(|| cfg.session_id.clone())
                        .unwrap_or_else(|| "(unset)".to_string())
                );
                Ok(())
            }
        };
    }

    let base_url = effective_base_url(&args, &cfg);
    let session_id = args
        .session
        .clone()
        .or_else(|| cfg.session_id.clone())
        .context("no session id; pass --session or set session_id in the config")?;

    let client = ApiClient::new(base_url);

    match args.command {
        Command::Chat { message, stage } => chat(&client, &session_id, &message, &stage).await,
        Command::Preview { query, stage } => preview(&client, &session_id, query, &stage).await,
        Command::Config { .. } => unreachable!("handled above"),
    }
}

fn effective_base_url(args: &Args, cfg: &config::Config) -> String {
    args.base_url
        .clone()
        .or_else(|| cfg.base_url.clone())
        .unwrap_or_else(|| "http://localhost:5000".to_string())
}

async fn chat(
    client: &ApiClient,
    session_id: &str,
    message: &str,
    stage: &StageArgs,
) -> anyhow::Result<()> {
    let store = ClientStore::new();
    store.set_active_session(Some(session_id.to_string()));
    let staged = stage.items();
    for item in &staged {
        store.stage_item(item.clone());
    }

    let events = client
        .send_chat(session_id, message, &staged)
        .await
        .context("chat request failed")?;

    let mut turn = Turn::new(session_id);
    let handle = TurnHandle::new();

    // Ctrl-C aborts this turn only; the handle makes the turn cancellable
    // without tearing down anything else.
    let abort_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort_handle.abort();
        }
    });

    let mut printed = 0;
    run_turn(&mut turn, events, &handle, &store, client, |t| {
        // Renders replace the whole text; stdout only needs the new suffix.
        let text = &t.accumulated_text;
        if text.len() > printed {
            print!("{}", &text[printed..]);
            let _ = std::io::stdout().flush();
            printed = text.len();
        }
    })
    .await;
    println!();

    match turn.status {
        TurnStatus::Complete => {
            if let Some(usage) = store.context_usage() {
                eprintln!(
                    "[context: {}/{} tokens, {:.1}%]",
                    usage.tokens_used,
                    usage.max_tokens,
                    usage.usage_percentage()
                );
            }
            if let Some(id) = &turn.persistent_id {
                eprintln!("[message id: {}]", id);
            }
            Ok(())
        }
        TurnStatus::Cancelled => anyhow::bail!("turn cancelled"),
        _ => anyhow::bail!(
            "turn failed: {}",
            turn.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

async fn preview(
    client: &ApiClient,
    session_id: &str,
    query: Option<String>,
    stage: &StageArgs,
) -> anyhow::Result<()> {
    let staged = stage.items();
    let request = PreviewRequest {
        current_query: query,
        staged_items: staged.clone(),
        message_inclusion_map: None,
    };
    let response = client
        .preview_context(session_id, &request)
        .await
        .context("context preview failed")?;

    println!(
        "provider: {} / model: {}",
        response.provider_name.as_deref().unwrap_or("?"),
        response.model_name.as_deref().unwrap_or("?")
    );
    let usage = response.context_usage();
    println!(
        "tokens: {}/{} ({:.1}%)",
        usage.tokens_used,
        usage.max_tokens,
        usage.usage_percentage()
    );

    if !response.truncation_actions_taken.details.is_empty() {
        println!("truncation:");
        for detail in &response.truncation_actions_taken.details {
            println!("  - {}", detail);
        }
    }

    println!("segments:");
    for (i, segment) in response.prepared_messages.iter().enumerate() {
        let first_line = segment.content.lines().next().unwrap_or("");
        println!(
            "  [{:2}] {:9} {:5} tokens  {}",
            i,
            role_name(segment.role),
            segment.tokens.unwrap_or(0),
            first_line
        );
    }

    if !response.rag_documents_used.is_empty() {
        println!("rag documents: {}", response.rag_documents_used.len());
    }

    if !staged.is_empty() {
        let report = reconcile(&response);
        println!("staged items:");
        for item in &staged {
            let mark = match report.status_of(item) {
                InclusionStatus::Included => "included",
                InclusionStatus::Dropped => "dropped ",
            };
            println!("  [{}] {}", mark, item.resolution_key());
        }
    }

    Ok(())
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}
