use std::sync::Arc;

mod client;
mod config;
mod http;

pub use client::{
    BoxFuture, ConfigError, FetchError, FetchErrorKind, FetchResult, ReplyClient, ReplyRequest,
};
pub use config::{BackendConfig, DEFAULT_ENDPOINT};
pub use http::{HttpReplyClient, parse_reply};

pub fn create_client(config: BackendConfig) -> Result<Arc<dyn ReplyClient>, ConfigError> {
    let client = HttpReplyClient::new(config)?;
    tracing::info!(endpoint = client.endpoint(), "initialized reply client");
    Ok(Arc::new(client))
}
