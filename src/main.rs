use std::error::Error;
use std::path::PathBuf;

use anyhow::anyhow;
use dotenvy::dotenv;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};

mod config;
mod handlers;
mod llm;
mod session;
mod state;
mod utils;

use config::CONFIG;
use handlers::analyze::analyze_callback;
use handlers::commands::{self, Command};
use handlers::upload::{upload_handler, ANALYZE_CALLBACK_PREFIX};
use llm::media::ImageSource;
use llm::openai::analyze_outfit;
use session::{run_analysis, SessionStore};
use state::AppState;
use utils::logging::{init_logging, ConsoleOutput};

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

const CLI_PROGRESS_LINE: &str = "👗 Analyzing outfit...";
const CLI_FEEDBACK_HEADER: &str = "✨ Style Feedback:";

#[derive(Debug, Clone, PartialEq, Eq)]
enum RunMode {
    Bot,
    Analyze { image_path: PathBuf },
    Help,
}

fn usage() -> &'static str {
    "Usage:\n  ai_stylist_bot                     run the Telegram bot\n  ai_stylist_bot analyze <image>     analyze one .jpg/.jpeg/.png file and print the feedback"
}

fn parse_run_mode(args: &[String]) -> anyhow::Result<RunMode> {
    match args.get(1).map(|value| value.as_str()) {
        None => Ok(RunMode::Bot),
        Some("--help" | "-h" | "help") => Ok(RunMode::Help),
        Some("analyze") => {
            let mut image_path: Option<PathBuf> = None;
            for arg in &args[2..] {
                match arg.as_str() {
                    "--help" | "-h" => return Ok(RunMode::Help),
                    other if other.starts_with("--") => {
                        return Err(anyhow!("Unknown analyze argument: {other}\n{}", usage()));
                    }
                    other => {
                        if image_path.is_some() {
                            return Err(anyhow!("analyze takes exactly one image path\n{}", usage()));
                        }
                        image_path = Some(PathBuf::from(other));
                    }
                }
            }
            let image_path =
                image_path.ok_or_else(|| anyhow!("Missing image path\n{}", usage()))?;
            Ok(RunMode::Analyze { image_path })
        }
        Some(other) => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

async fn run_cli_analysis(image_path: PathBuf) -> anyhow::Result<()> {
    CONFIG.require_openai_api_key()?;

    println!("{CLI_PROGRESS_LINE}");
    info!("CLI analysis of {} with {}", image_path.display(), CONFIG.openai_model);
    let store = SessionStore::new();
    let entry = run_analysis(&store, 0, ImageSource::Path(image_path), |encoded| async move {
        analyze_outfit(&encoded).await
    })
    .await?;

    println!("\n{CLI_FEEDBACK_HEADER}\n");
    println!("{}", entry.feedback);
    Ok(())
}

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    let mode = match parse_run_mode(&args) {
        Ok(mode) => mode,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(2);
        }
    };

    match mode {
        RunMode::Help => {
            println!("{}", usage());
            Ok(())
        }
        RunMode::Analyze { image_path } => {
            let guards = init_logging(ConsoleOutput::Stderr);
            let result = run_cli_analysis(image_path).await;
            if let Err(err) = result {
                error!("CLI analysis failed: {err}");
                drop(guards);
                eprintln!("Error: {err}");
                std::process::exit(1);
            }
            Ok(())
        }
        RunMode::Bot => {
            let _guards = init_logging(ConsoleOutput::Stdout);
            run_bot().await
        }
    }
}

async fn run_bot() -> HandlerResult {
    CONFIG.require_openai_api_key()?;
    let bot_token = CONFIG.require_bot_token()?;

    let bot = Bot::new(bot_token);
    info!("Starting AI Stylist bot with model {}", CONFIG.openai_model);
    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {err}");
    }

    let state = AppState::new();

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| msg.photo().is_some() || msg.document().is_some())
                .endpoint(handle_upload),
        )
        .endpoint(ignore_message);

    let callback_handler = Update::filter_callback_query().branch(
        dptree::filter(|query: CallbackQuery| {
            query
                .data
                .as_deref()
                .is_some_and(|data| data.starts_with(ANALYZE_CALLBACK_PREFIX))
        })
        .endpoint(handle_analyze_callback),
    );

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    // Updates from one chat are handled in order, so each session has at
    // most one analysis in flight.
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    let result = match command {
        Command::Start => commands::start_handler(bot, message).await,
        Command::Help => commands::help_handler(bot, message).await,
        Command::Current => commands::current_handler(bot, state, message).await,
        Command::History => commands::history_handler(bot, state, message).await,
    };
    if let Err(err) = result {
        error!("command handler failed: {err}");
    }
    Ok(())
}

async fn handle_upload(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    if let Err(err) = upload_handler(bot, state, message).await {
        error!("upload handler failed: {err}");
    }
    Ok(())
}

async fn handle_analyze_callback(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    if let Err(err) = analyze_callback(bot, state, query).await {
        error!("analyze callback failed: {err}");
    }
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
