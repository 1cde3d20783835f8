use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::Client;
use tracing::warn;

use crate::config::CONFIG;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(CONFIG.http_timeout_seconds))
        .user_agent(concat!("ai-stylist-bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|err| {
            warn!("Failed to build configured HTTP client, using defaults: {err}");
            Client::new()
        })
});

pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}
