use clap::{Parser, Subcommand};
use lib::chat::{ChatController, ChatError};
use lib::client::BackendClient;
use lib::config::Config;
use lib::session::Session;
use std::path::PathBuf;

mod render;

use render::TerminalSink;

#[derive(Parser)]
#[command(name = "toolchat")]
#[command(about = "Terminal client for a streaming tool-calling chat backend", long_about = None)]
struct Cli {
    /// Config file path (default: TOOLCHAT_CONFIG_PATH or ~/.toolchat/config.json)
    #[arg(long, short, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Chat with the backend (interactive). Type /clear to start over, /exit or /quit to leave.
    Chat {
        /// Model id (default: config chat.model, then the backend's default model).
        #[arg(long, short)]
        model: Option<String>,

        /// Optional existing session id to continue.
        #[arg(long, value_name = "ID")]
        session: Option<String>,

        /// Extra system prompt sent with every turn.
        #[arg(long, value_name = "TEXT")]
        system_prompt: Option<String>,
    },

    /// List tools the backend offers and which are selected.
    Tools,

    /// Replace the selected tool subset.
    Select {
        /// Tool names to enable; none disables all tools.
        names: Vec<String>,
    },

    /// List available models.
    Models,

    /// Show backend diagnostics.
    Status,

    /// Clear a session's history on the backend.
    Clear {
        #[arg(long, value_name = "ID")]
        session: String,
    },

    /// Run a single tool directly.
    Exec {
        tool: String,

        /// Tool parameters as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("toolchat {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Chat {
            model,
            session,
            system_prompt,
        }) => run_chat(cli.config, model, session, system_prompt).await,
        Some(Commands::Tools) => run_tools(cli.config).await,
        Some(Commands::Select { names }) => run_select(cli.config, names).await,
        Some(Commands::Models) => run_models(cli.config).await,
        Some(Commands::Status) => run_status(cli.config).await,
        Some(Commands::Clear { session }) => run_clear(cli.config, session).await,
        Some(Commands::Exec { tool, params }) => run_exec(cli.config, tool, params).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn load(config_path: Option<PathBuf>) -> anyhow::Result<(Config, BackendClient)> {
    let (config, _) = lib::config::load_config(config_path)?;
    let url = lib::config::resolve_backend_url(&config);
    let client = BackendClient::with_connect_timeout(Some(url), config.backend.connect_timeout())?;
    Ok((config, client))
}

async fn run_chat(
    config_path: Option<PathBuf>,
    model: Option<String>,
    session: Option<String>,
    system_prompt: Option<String>,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (config, client) = load(config_path)?;
    let model = match model.or_else(|| config.chat.model.clone()) {
        Some(m) => Some(m),
        None => match client.app_config().await {
            Ok(app) => app.default_model,
            Err(e) => {
                log::warn!("could not fetch model list: {}", e);
                None
            }
        },
    };
    let session = session.map(Session::resume).unwrap_or_default();
    let mut chat = ChatController::new(client, session)
        .with_model(model)
        .with_system_prompt(system_prompt.unwrap_or_else(|| config.chat.system_prompt.clone()))
        .with_policy(config.chat.segment_policy());

    log::info!(
        "chatting with {} using model {}",
        chat.client().base_url(),
        chat.model().unwrap_or("<none>")
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut sink = TerminalSink::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/clear") {
            match chat.clear().await {
                Ok(()) => println!("conversation cleared"),
                Err(e) => eprintln!("clear error: {}", e),
            }
            continue;
        }

        match chat.send(input, &mut sink).await {
            Ok(report) => {
                log::debug!(
                    "turn finished: {:?}, {} message(s), {} tool call(s)",
                    report.outcome,
                    report.messages.len(),
                    report.cards.len()
                );
            }
            Err(ChatError::Blocked(reason)) => eprintln!("cannot send: {}", reason),
            Err(e) => eprintln!("chat error: {}", e),
        }
    }

    if let Some(id) = chat.session().id() {
        println!("session: {}", id);
    }
    Ok(())
}

async fn run_tools(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (_, client) = load(config_path)?;
    let listing = client.tools().await?;
    if let Some(err) = &listing.error {
        eprintln!("backend reported: {}", err);
    }
    for tool in &listing.tools {
        let mark = if listing.is_selected(&tool.name) { "*" } else { " " };
        println!("{} {} ({}): {}", mark, tool.name, tool.package, tool.description);
    }
    Ok(())
}

async fn run_select(config_path: Option<PathBuf>, names: Vec<String>) -> anyhow::Result<()> {
    let (_, client) = load(config_path)?;
    let listing = client.tools().await?;
    let unknown = listing.unknown(&names);
    if !unknown.is_empty() {
        anyhow::bail!("unknown tool(s): {}", unknown.join(", "));
    }
    let result = client.select_tools(&names).await?;
    println!("selected {} tool(s)", result.selected_count);
    Ok(())
}

async fn run_models(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (_, client) = load(config_path)?;
    let app = client.app_config().await?;
    for m in &app.models {
        let mark = if app.default_model.as_deref() == Some(m.id.as_str()) { "*" } else { " " };
        println!("{} {} ({}): {}", mark, m.id, m.name, m.description);
    }
    Ok(())
}

async fn run_status(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (_, client) = load(config_path)?;
    let status = client.debug_status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn run_clear(config_path: Option<PathBuf>, session: String) -> anyhow::Result<()> {
    let (_, client) = load(config_path)?;
    client.clear(&session).await?;
    println!("cleared session {}", session);
    Ok(())
}

async fn run_exec(config_path: Option<PathBuf>, tool: String, params: String) -> anyhow::Result<()> {
    let (_, client) = load(config_path)?;
    let params: serde_json::Value = serde_json::from_str(&params)
        .map_err(|e| anyhow::anyhow!("--params is not valid JSON: {}", e))?;
    let result = client.execute_tool(&tool, params).await?;
    match result {
        serde_json::Value::String(s) => println!("{}", s),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}
