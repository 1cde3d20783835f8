use anyhow::{anyhow, Result};
use teloxide::prelude::*;
use teloxide::types::{FileId, InlineKeyboardButton, InlineKeyboardMarkup, ReplyParameters};
use tracing::{info, warn};

use crate::config::CONFIG;
use crate::llm::media::{download_media, is_allowed_image_name, ImageError, UploadedImage};
use crate::state::{AppState, PendingUpload};
use crate::utils::timing::{complete_command_timer, start_command_timer};

pub const ANALYZE_CALLBACK_PREFIX: &str = "analyze:";

/// The file behind an upload message, before any bytes are fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UploadRef {
    file_id: FileId,
    name: String,
}

async fn get_file_url(bot: &Bot, file_id: &FileId) -> Result<String> {
    let file = bot.get_file(file_id.clone()).await?;
    Ok(format!(
        "https://api.telegram.org/file/bot{}/{}",
        CONFIG.bot_token.trim(),
        file.path
    ))
}

fn upload_ref(message: &Message) -> Result<Option<UploadRef>, ImageError> {
    if let Some(photo) = message.photo().and_then(|sizes| sizes.last()) {
        // Telegram re-encodes compressed photos as JPEG.
        return Ok(Some(UploadRef {
            file_id: photo.file.id.clone(),
            name: format!("photo_{}.jpg", message.id.0),
        }));
    }

    if let Some(document) = message.document() {
        let name = document
            .file_name
            .clone()
            .unwrap_or_else(|| format!("document_{}", message.id.0));
        if !is_allowed_image_name(&name) {
            return Err(ImageError::UnsupportedFormat { name });
        }
        return Ok(Some(UploadRef {
            file_id: document.file.id.clone(),
            name,
        }));
    }

    Ok(None)
}

pub fn analyze_keyboard(upload_message_id: i32) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "Analyze Outfit",
        format!("{ANALYZE_CALLBACK_PREFIX}{upload_message_id}"),
    )]])
}

pub fn parse_analyze_callback(data: &str) -> Option<i32> {
    data.strip_prefix(ANALYZE_CALLBACK_PREFIX)?
        .trim()
        .parse::<i32>()
        .ok()
}

/// Stores a photo or image document as the chat's pending upload and offers
/// the analyze button.
pub async fn upload_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let mut timer = start_command_timer("upload", &message);

    let upload = match upload_ref(&message) {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            complete_command_timer(&mut timer, "ignored", None);
            return Ok(());
        }
        Err(err) => {
            bot.send_message(message.chat.id, format!("Error: {err}"))
                .reply_parameters(ReplyParameters::new(message.id))
                .await?;
            complete_command_timer(&mut timer, "rejected", Some(err.to_string()));
            return Ok(());
        }
    };

    let bytes = match fetch_upload(&bot, &upload.file_id).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("Failed to fetch upload {} in chat {}: {err}", upload.name, message.chat.id.0);
            bot.send_message(message.chat.id, format!("Error: {err}"))
                .reply_parameters(ReplyParameters::new(message.id))
                .await?;
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            return Ok(());
        }
    };

    info!(
        "Chat {} uploaded {} ({} bytes)",
        message.chat.id.0,
        upload.name,
        bytes.len()
    );
    state.set_pending_upload(
        message.chat.id.0,
        PendingUpload {
            upload_message_id: message.id.0,
            image: UploadedImage::new(bytes, upload.name.clone()),
        },
    );

    bot.send_message(
        message.chat.id,
        format!("📸 Got {}. Tap below for style feedback.", upload.name),
    )
    .reply_parameters(ReplyParameters::new(message.id))
    .reply_markup(analyze_keyboard(message.id.0))
    .await?;
    complete_command_timer(&mut timer, "success", None);
    Ok(())
}

async fn fetch_upload(bot: &Bot, file_id: &FileId) -> Result<Vec<u8>> {
    let url = get_file_url(bot, file_id).await?;
    let bytes = download_media(&url).await?;
    if bytes.is_empty() {
        return Err(anyhow!("The uploaded file is empty"));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_data_round_trips_the_upload_id() {
        let keyboard = analyze_keyboard(321);
        let button = &keyboard.inline_keyboard[0][0];
        assert_eq!(button.text, "Analyze Outfit");
        assert_eq!(parse_analyze_callback("analyze:321"), Some(321));
    }

    #[test]
    fn foreign_or_garbled_callbacks_are_ignored() {
        assert_eq!(parse_analyze_callback("model:gpt"), None);
        assert_eq!(parse_analyze_callback("analyze:abc"), None);
        assert_eq!(parse_analyze_callback("analyze:"), None);
    }
}
