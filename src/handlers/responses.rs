use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ParseMode, ReplyParameters};
use tracing::warn;

use crate::config::CONFIG;
use crate::handlers::render::{escape_html, markdown_to_telegram_html};
use crate::session::AnalysisEntry;
use crate::utils::telegram::split_message;

// Escaping and tags grow the text; chunks are cut from the markdown source.
const MARKUP_HEADROOM: usize = 600;
const PHOTO_CAPTION_LIMIT: usize = 1000;

pub const FEEDBACK_TITLE: &str = "✨ Style Feedback";
pub const HISTORY_TITLE: &str = "🕑 Previous Analyses";

async fn send_chunk(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    text: String,
    parse_mode: Option<ParseMode>,
) -> Result<()> {
    let mut request = bot.send_message(chat_id, text);
    if let Some(mode) = parse_mode {
        request = request.parse_mode(mode);
    }
    if let Some(reply_to) = reply_to {
        request = request.reply_parameters(ReplyParameters::new(reply_to));
    }
    request.await?;
    Ok(())
}

/// Sends model markdown as Telegram HTML, split to fit the message limit.
/// A chunk Telegram refuses to parse is resent as plain text.
pub async fn send_markdown(
    bot: &Bot,
    chat_id: ChatId,
    reply_to: Option<MessageId>,
    markdown: &str,
) -> Result<()> {
    let limit = CONFIG
        .telegram_max_length
        .saturating_sub(MARKUP_HEADROOM)
        .max(1);
    for (index, chunk) in split_message(markdown, limit).into_iter().enumerate() {
        let reply_to = if index == 0 { reply_to } else { None };
        let html = markdown_to_telegram_html(&chunk);
        if html.is_empty() {
            continue;
        }
        if let Err(err) = send_chunk(bot, chat_id, reply_to, html, Some(ParseMode::Html)).await {
            warn!("Failed to send formatted feedback, retrying as plain text: {err}");
            send_chunk(bot, chat_id, reply_to, chunk, None).await?;
        }
    }
    Ok(())
}

pub fn photo_caption(name: &str) -> String {
    let name: String = name.chars().take(PHOTO_CAPTION_LIMIT).collect();
    escape_html(&name)
}

pub fn feedback_markdown(title: &str, feedback: &str) -> String {
    format!("## {title}\n\n{feedback}")
}

/// Renders one analysis: the photo captioned with its name, then the feedback.
pub async fn send_entry(
    bot: &Bot,
    chat_id: ChatId,
    entry: &AnalysisEntry,
    title: Option<&str>,
) -> Result<()> {
    let photo = InputFile::memory(entry.image.bytes.clone()).file_name(entry.image.name.clone());
    if let Err(err) = bot
        .send_photo(chat_id, photo)
        .caption(photo_caption(&entry.image.name))
        .parse_mode(ParseMode::Html)
        .await
    {
        warn!("Failed to resend photo {}: {err}", entry.image.name);
    }

    let markdown = match title {
        Some(title) => feedback_markdown(title, &entry.feedback),
        None => entry.feedback.clone(),
    };
    send_markdown(bot, chat_id, None, &markdown).await
}
