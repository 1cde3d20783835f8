use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, ReplyParameters};
use teloxide::utils::command::BotCommands;

use crate::handlers::responses::{send_entry, FEEDBACK_TITLE, HISTORY_TITLE};
use crate::session::SessionState;
use crate::state::AppState;
use crate::utils::timing::{complete_command_timer, start_command_timer};

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "AI Stylist commands:")]
pub enum Command {
    #[command(description = "say hello")]
    Start,
    #[command(description = "show how to get style feedback")]
    Help,
    #[command(description = "show the latest style feedback")]
    Current,
    #[command(description = "show previous analyses, newest first")]
    History,
}

pub fn help_text() -> String {
    format!(
        "<b>🧠 AI Stylist</b>\n\n\
         Send an outfit photo (or a .jpg, .jpeg or .png file) and tap <b>Analyze Outfit</b> \
         to get real-time style feedback from a vision model.\n\n\
         Each new analysis moves the previous one into your history.\n\n{}",
        Command::descriptions()
    )
}

pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(
        message.chat.id,
        "Hello! I am your AI Stylist. Upload an outfit photo to get style feedback, or use /help.",
    )
    .reply_parameters(ReplyParameters::new(message.id))
    .await?;
    Ok(())
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    bot.send_message(message.chat.id, help_text())
        .parse_mode(ParseMode::Html)
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}

pub async fn current_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let mut timer = start_command_timer("current", &message);
    match state.sessions.current(message.chat.id.0) {
        Some(entry) => send_entry(&bot, message.chat.id, &entry, Some(FEEDBACK_TITLE)).await?,
        None => {
            bot.send_message(
                message.chat.id,
                "No analysis yet. Send an outfit photo to get started.",
            )
            .reply_parameters(ReplyParameters::new(message.id))
            .await?;
        }
    }
    complete_command_timer(&mut timer, "success", None);
    Ok(())
}

fn history_header(session: &SessionState) -> Option<String> {
    match session.history_len() {
        0 => None,
        n => Some(format!("<b>{HISTORY_TITLE}</b> ({n})")),
    }
}

pub async fn history_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let mut timer = start_command_timer("history", &message);
    let session = state.sessions.snapshot(message.chat.id.0);

    let Some(header) = history_header(&session) else {
        bot.send_message(message.chat.id, "No previous analyses yet.")
            .reply_parameters(ReplyParameters::new(message.id))
            .await?;
        complete_command_timer(&mut timer, "success", Some("empty".to_string()));
        return Ok(());
    };

    bot.send_message(message.chat.id, header)
        .parse_mode(ParseMode::Html)
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    for entry in session.history_newest_first() {
        send_entry(&bot, message.chat.id, entry, None).await?;
    }
    complete_command_timer(
        &mut timer,
        "success",
        Some(format!("entries={}", session.history_len())),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::media::UploadedImage;

    #[test]
    fn parses_known_commands_only() {
        assert_eq!(Command::parse("/history", "stylist_bot").ok(), Some(Command::History));
        assert_eq!(Command::parse("/current", "stylist_bot").ok(), Some(Command::Current));
        assert!(Command::parse("/tldr", "stylist_bot").is_err());
    }

    #[test]
    fn help_lists_every_command() {
        let text = help_text();
        for command in ["/start", "/help", "/current", "/history"] {
            assert!(text.contains(command), "missing {command}");
        }
    }

    #[test]
    fn history_header_counts_entries() {
        let mut session = SessionState::new();
        assert_eq!(history_header(&session), None);

        session.record(UploadedImage::new(vec![1], "shirt.png"), "A1".to_string());
        assert_eq!(history_header(&session), None);

        session.record(UploadedImage::new(vec![2], "pants.jpg"), "A2".to_string());
        assert_eq!(
            history_header(&session).as_deref(),
            Some("<b>🕑 Previous Analyses</b> (1)")
        );
    }
}
