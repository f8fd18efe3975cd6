use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;

use super::client::{
    BackendSnafu, BoxFuture, BuildHttpClientSnafu, ConfigError, FetchResult, InvalidEndpointSnafu,
    ProtocolSnafu, ReplyClient, ReplyRequest, TransportSnafu,
};
use super::config::BackendConfig;

#[derive(Debug, Serialize)]
struct ReplyRequestBody<'a> {
    query: &'a str,
    uid: String,
}

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    response: Option<Value>,
}

/// JSON-over-HTTP reply client: `POST {"query","uid"}`, expects `{"response": "..."}`.
pub struct HttpReplyClient {
    http: reqwest::Client,
    endpoint: Url,
    endpoint_raw: String,
}

impl HttpReplyClient {
    pub fn new(config: BackendConfig) -> Result<Self, ConfigError> {
        let endpoint = Self::parse_endpoint(&config.endpoint)?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context(BuildHttpClientSnafu {
            stage: "build-http-client",
        })?;

        Ok(Self {
            http,
            endpoint,
            endpoint_raw: config.endpoint,
        })
    }

    fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
        let url = Url::parse(raw).map_err(|error| ConfigError::InvalidEndpoint {
            stage: "parse-endpoint",
            endpoint: raw.to_string(),
            details: error.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return InvalidEndpointSnafu {
                stage: "check-endpoint-scheme",
                endpoint: raw.to_string(),
                details: format!("unsupported scheme '{}'", url.scheme()),
            }
            .fail();
        }

        Ok(url)
    }

    async fn execute(
        http: reqwest::Client,
        endpoint: Url,
        request: ReplyRequest,
    ) -> FetchResult<String> {
        let body = ReplyRequestBody {
            query: &request.query,
            uid: request.uid.to_string(),
        };

        tracing::debug!(
            %endpoint,
            uid = %request.uid,
            query_len = request.query.len(),
            "sending reply request"
        );

        let response = http
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .context(TransportSnafu {
                stage: "send-reply-request",
            })?;

        let status = response.status();
        let payload = response.text().await.context(TransportSnafu {
            stage: "read-reply-response",
        })?;

        if !status.is_success() {
            return BackendSnafu {
                stage: "reply-http-status",
                status: status.as_u16(),
                body: payload,
            }
            .fail();
        }

        tracing::debug!(status = status.as_u16(), "received reply response");
        parse_reply(&payload)
    }
}

impl ReplyClient for HttpReplyClient {
    fn endpoint(&self) -> &str {
        &self.endpoint_raw
    }

    fn fetch_reply(&self, request: ReplyRequest) -> BoxFuture<'static, FetchResult<String>> {
        // reqwest::Client is reference counted; the clone shares one connection pool.
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(Self::execute(http, endpoint, request))
    }
}

/// Extracts the `response` field verbatim from a successful response body.
pub fn parse_reply(payload: &str) -> FetchResult<String> {
    let parsed = serde_json::from_str::<ReplyPayload>(payload).map_err(|error| {
        ProtocolSnafu {
            stage: "parse-reply-json",
            details: error.to_string(),
        }
        .build()
    })?;

    match parsed.response {
        Some(Value::String(reply)) => Ok(reply),
        Some(other) => ProtocolSnafu {
            stage: "check-reply-field",
            details: format!("`response` field must be a string, got {}", json_type(&other)),
        }
        .fail(),
        None => ProtocolSnafu {
            stage: "check-reply-field",
            details: "missing `response` field".to_string(),
        }
        .fail(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
