use std::fmt;
use std::future::Future;
use std::pin::Pin;

use econ_chat_storage::SessionId;
use snafu::Snafu;

/// One user turn forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRequest {
    pub query: String,
    pub uid: SessionId,
}

impl ReplyRequest {
    pub fn new(query: impl Into<String>, uid: SessionId) -> Self {
        Self {
            query: query.into(),
            uid,
        }
    }
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type FetchResult<T> = Result<T, FetchError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FetchError {
    /// The backend answered but rejected or failed the request.
    #[snafu(display("backend returned status {status} on `{stage}`"))]
    Backend {
        stage: &'static str,
        status: u16,
        body: String,
    },
    /// The request never completed.
    #[snafu(display("transport failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: reqwest::Error,
    },
    /// A successful response that does not honour the reply contract.
    #[snafu(display("backend reply violates protocol on `{stage}`: {details}"))]
    Protocol {
        stage: &'static str,
        details: String,
    },
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Backend { .. } => FetchErrorKind::Backend,
            Self::Transport { .. } => FetchErrorKind::Transport,
            Self::Protocol { .. } => FetchErrorKind::Protocol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    Backend,
    Transport,
    Protocol,
}

impl FetchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("backend endpoint '{endpoint}' is invalid: {details}"))]
    InvalidEndpoint {
        stage: &'static str,
        endpoint: String,
        details: String,
    },
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildHttpClient {
        stage: &'static str,
        source: reqwest::Error,
    },
}

/// Issues exactly one backend request per call.
///
/// The returned future owns everything it needs, so callers can hold it across other
/// work while the request is in flight. Implementations resolve every failure to a
/// [`FetchError`] value.
pub trait ReplyClient: Send + Sync {
    fn endpoint(&self) -> &str;
    fn fetch_reply(&self, request: ReplyRequest) -> BoxFuture<'static, FetchResult<String>>;
}
