use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ReplyParameters};
use tracing::{error, warn};

use crate::handlers::responses::{feedback_markdown, send_markdown, FEEDBACK_TITLE};
use crate::handlers::upload::parse_analyze_callback;
use crate::llm::openai::analyze_outfit;
use crate::session::run_analysis;
use crate::state::AppState;
use crate::utils::telegram::ChatActionHeartbeat;
use crate::utils::timing::{complete_command_timer, CommandTimer};

const STALE_UPLOAD_MESSAGE: &str =
    "This photo was replaced by a newer upload. Use the button under your latest photo.";

pub fn history_hint(history_len: usize) -> Option<String> {
    match history_len {
        0 => None,
        1 => Some("🕑 1 previous analysis. Send /history to see it.".to_string()),
        n => Some(format!("🕑 {n} previous analyses. Send /history to see them.")),
    }
}

/// Handles the "Analyze Outfit" button. The model call is awaited inline so
/// a chat never has two analyses running.
pub async fn analyze_callback(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    bot.answer_callback_query(query.id.clone()).await?;

    let Some(upload_message_id) = query.data.as_deref().and_then(parse_analyze_callback) else {
        return Ok(());
    };
    let Some(message) = query.message.as_ref() else {
        return Ok(());
    };
    let chat_id = message.chat().id;
    let prompt_message_id = message.id();

    let Some(image) = state.pending_upload_for(chat_id.0, upload_message_id) else {
        bot.send_message(chat_id, STALE_UPLOAD_MESSAGE)
            .reply_parameters(ReplyParameters::new(prompt_message_id))
            .await?;
        return Ok(());
    };

    let mut timer = CommandTimer::new(
        "analyze",
        Some(chat_id.0),
        Some(&query.from),
        Some(upload_message_id as i64),
        Some(image.name.as_str()),
    );
    timer.log_received();

    let progress = bot
        .send_message(chat_id, "Analyzing your outfit...")
        .reply_parameters(ReplyParameters::new(prompt_message_id))
        .await?;
    let heartbeat = ChatActionHeartbeat::start(bot.clone(), chat_id, ChatAction::Typing);
    let result = run_analysis(&state.sessions, chat_id.0, image.into(), |encoded| async move {
        analyze_outfit(&encoded).await
    })
    .await;
    drop(heartbeat);

    if let Err(err) = bot.delete_message(chat_id, progress.id).await {
        warn!("Failed to remove progress message in chat {}: {err}", chat_id.0);
    }

    match result {
        Ok(entry) => {
            send_markdown(
                &bot,
                chat_id,
                Some(prompt_message_id),
                &feedback_markdown(FEEDBACK_TITLE, &entry.feedback),
            )
            .await?;
            if let Some(hint) = history_hint(state.sessions.history_len(chat_id.0)) {
                bot.send_message(chat_id, hint).await?;
            }
            complete_command_timer(&mut timer, "success", None);
        }
        Err(err) => {
            error!("Analysis failed in chat {}: {err}", chat_id.0);
            bot.send_message(chat_id, format!("Error: {err}"))
                .reply_parameters(ReplyParameters::new(prompt_message_id))
                .await?;
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_pluralizes_and_hides_when_empty() {
        assert_eq!(history_hint(0), None);
        assert!(history_hint(1).unwrap().contains("1 previous analysis."));
        assert!(history_hint(4).unwrap().contains("4 previous analyses."));
    }
}
