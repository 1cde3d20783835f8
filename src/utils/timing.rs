use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use teloxide::types::{Message, User};
use tracing::info;

use crate::utils::logging::TIMING_TARGET;

#[derive(Debug)]
pub struct CommandTimer {
    command: String,
    chat_id: Option<i64>,
    user_id: Option<i64>,
    username: Option<String>,
    message_id: Option<i64>,
    text: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

fn truncate_chars(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}

impl CommandTimer {
    pub fn new(
        command: &str,
        chat_id: Option<i64>,
        user: Option<&User>,
        message_id: Option<i64>,
        text: Option<&str>,
    ) -> Self {
        CommandTimer {
            command: command.to_string(),
            chat_id,
            user_id: user.and_then(|u| i64::try_from(u.id.0).ok()),
            username: user.and_then(|u| u.username.clone()),
            message_id,
            text: text.map(|value| truncate_chars(&value.replace('\n', " "), 300)),
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn from_message(command: &str, message: &Message) -> Self {
        Self::new(
            command,
            Some(message.chat.id.0),
            message.from.as_ref(),
            Some(message.id.0 as i64),
            message.text().or_else(|| message.caption()),
        )
    }

    pub fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            "event=command_received command={} chat_id={:?} user_id={:?} username={:?} message_id={:?} received_at={} text={:?}",
            self.command,
            self.chat_id,
            self.user_id,
            self.username,
            self.message_id,
            self.started_at.to_rfc3339(),
            self.text
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=command_completed command={} chat_id={:?} user_id={:?} message_id={:?} started_at={} response_sent_at={} duration_s={:.3} status={} detail={}",
            self.command,
            self.chat_id,
            self.user_id,
            self.message_id,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        if !self.is_completed() {
            self.mark_status("dropped", None);
            self.log_completed();
        }
    }
}

pub fn start_command_timer(command: &str, message: &Message) -> CommandTimer {
    let timer = CommandTimer::from_message(command, message);
    timer.log_received();
    timer
}

pub fn complete_command_timer(timer: &mut CommandTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_flattens_and_truncates_text() {
        let long_text = format!("line one\n{}", "x".repeat(400));
        let mut timer = CommandTimer::new("analyze", Some(7), None, Some(3), Some(&long_text));
        let text = timer.text.clone().unwrap_or_default();
        assert_eq!(text.chars().count(), 300);
        assert!(!text.contains('\n'));
        complete_command_timer(&mut timer, "success", None);
        assert!(timer.is_completed());
    }

    #[tokio::test]
    async fn llm_timing_passes_the_result_through() {
        let ok: Result<u32, String> =
            log_llm_timing("openai", "gpt-4o", "test", None, || async { Ok(5) }).await;
        assert_eq!(ok, Ok(5));

        let err: Result<u32, String> =
            log_llm_timing("openai", "gpt-4o", "test", None, || async {
                Err("boom".to_string())
            })
            .await;
        assert_eq!(err, Err("boom".to_string()));
    }
}
