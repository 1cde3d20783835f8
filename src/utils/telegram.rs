use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tokio::task::JoinHandle;
use tracing::warn;

const CHAT_ACTION_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

/// Keeps a chat action ("typing…") visible while a slow call runs.
/// The background task stops when the guard is dropped.
pub struct ChatActionHeartbeat {
    task_handle: Option<JoinHandle<()>>,
}

impl ChatActionHeartbeat {
    pub fn start(bot: Bot, chat_id: ChatId, action: ChatAction) -> Self {
        let task_handle = tokio::spawn(async move {
            loop {
                if let Err(err) = bot.send_chat_action(chat_id, action.clone()).await {
                    warn!("send_chat_action failed for chat {}: {err}", chat_id.0);
                }
                tokio::time::sleep(CHAT_ACTION_HEARTBEAT_INTERVAL).await;
            }
        });

        ChatActionHeartbeat {
            task_handle: Some(task_handle),
        }
    }
}

impl Drop for ChatActionHeartbeat {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

fn fence_marker(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

// "\n" plus a three-character closing fence.
const FENCE_CLOSE_RESERVE: usize = 4;

struct ChunkBuilder {
    max_chars: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
    has_content: bool,
}

impl ChunkBuilder {
    fn new(max_chars: usize) -> Self {
        ChunkBuilder {
            max_chars,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
            has_content: false,
        }
    }

    /// `open_fence` is the fence the chunk is inside before `piece`;
    /// `reserve` keeps room to close the fence that is open after it.
    fn push(&mut self, piece: &str, reserve: usize, open_fence: Option<&str>) {
        let piece_len = piece.chars().count();
        if self.has_content && self.current_len + piece_len + reserve > self.max_chars {
            self.cut(open_fence);
        }
        self.current.push_str(piece);
        self.current_len += piece_len;
        self.has_content = true;
    }

    fn cut(&mut self, open_fence: Option<&str>) {
        if let Some(opener) = open_fence {
            if !self.current.ends_with('\n') {
                self.current.push('\n');
            }
            self.current.push_str(fence_marker(opener).unwrap_or("```"));
        }
        self.chunks.push(std::mem::take(&mut self.current));
        self.current_len = 0;
        self.has_content = false;
        if let Some(opener) = open_fence {
            self.current.push_str(opener);
            self.current.push('\n');
            self.current_len = self.current.chars().count();
        }
    }

    fn finish(mut self) -> Vec<String> {
        if self.has_content {
            self.chunks.push(self.current);
        }
        self.chunks
            .into_iter()
            .map(|chunk| chunk.trim_end().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }
}

/// Splits text into pieces of at most `max_chars` characters, preferring
/// line boundaries. A fenced code block cut in two is closed at the end of
/// one piece and reopened at the start of the next, so every piece renders
/// on its own.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut builder = ChunkBuilder::new(max_chars);
    let mut open_fence: Option<String> = None;

    for line in text.split_inclusive('\n') {
        let fence_after = match (&open_fence, fence_marker(line)) {
            (None, Some(_)) => Some(line.trim_end().to_string()),
            (Some(opener), Some(marker)) if fence_marker(opener) == Some(marker) => None,
            _ => open_fence.clone(),
        };
        let reserve = if fence_after.is_some() {
            FENCE_CLOSE_RESERVE
        } else {
            0
        };
        let reopen_len = open_fence
            .as_ref()
            .map_or(0, |opener| opener.chars().count() + 1);
        let budget = max_chars.saturating_sub(reopen_len + reserve).max(1);

        if line.chars().count() > budget {
            // A single oversized line is hard-wrapped on character boundaries.
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(budget) {
                let piece: String = piece.iter().collect();
                builder.push(&piece, reserve, open_fence.as_deref());
            }
        } else {
            builder.push(line, reserve, open_fence.as_deref());
        }
        open_fence = fence_after;
    }

    builder.finish()
}
