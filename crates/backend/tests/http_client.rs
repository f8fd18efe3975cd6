use std::time::Duration;

use econ_chat_backend::{
    BackendConfig, FetchError, FetchErrorKind, HttpReplyClient, ReplyClient, ReplyRequest,
};
use econ_chat_storage::SessionId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Serves a single canned HTTP response and hands back the raw request text.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/chat", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
        request
    });

    (url, handle)
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let read = stream.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&buffer);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.trim()
                        .eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8(buffer).unwrap()
}

fn client_for(url: &str) -> HttpReplyClient {
    HttpReplyClient::new(BackendConfig::new(url)).unwrap()
}

#[tokio::test]
async fn success_returns_reply_and_posts_json_contract() {
    let (url, server) = serve_once("200 OK", r#"{"response":"Hi there"}"#).await;
    let uid = SessionId::new_v4();

    let reply = client_for(&url)
        .fetch_reply(ReplyRequest::new("Hello", uid))
        .await
        .unwrap();
    assert_eq!(reply, "Hi there");

    let request = server.await.unwrap();
    let lowered = request.to_ascii_lowercase();
    assert!(request.starts_with("POST /chat "));
    assert!(lowered.contains("content-type: application/json"));

    let body = request.split("\r\n\r\n").nth(1).unwrap();
    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["query"], "Hello");
    assert_eq!(json["uid"], uid.to_string());
}

#[tokio::test]
async fn reply_text_is_not_trimmed_or_reencoded() {
    let (url, server) =
        serve_once("200 OK", r#"{"response":"  **bold** <b>x</b> é\n"}"#).await;

    let reply = client_for(&url)
        .fetch_reply(ReplyRequest::new("q", SessionId::new_v4()))
        .await
        .unwrap();

    assert_eq!(reply, "  **bold** <b>x</b> \u{e9}\n");
    server.await.unwrap();
}

#[tokio::test]
async fn non_success_status_is_backend_error_even_with_reply_body() {
    let (url, server) =
        serve_once("500 Internal Server Error", r#"{"response":"stack trace"}"#).await;

    let error = client_for(&url)
        .fetch_reply(ReplyRequest::new("Hello", SessionId::new_v4()))
        .await
        .unwrap_err();

    match error {
        FetchError::Backend { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, r#"{"response":"stack trace"}"#);
        }
        other => panic!("unexpected error: {other}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn malformed_success_body_is_protocol_error() {
    let (url, server) = serve_once("200 OK", r#"{"reply":"wrong field"}"#).await;

    let error = client_for(&url)
        .fetch_reply(ReplyRequest::new("Hello", SessionId::new_v4()))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), FetchErrorKind::Protocol);
    server.await.unwrap();
}

#[tokio::test]
async fn refused_connection_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/chat", listener.local_addr().unwrap());
    drop(listener);

    let error = client_for(&url)
        .fetch_reply(ReplyRequest::new("Hello", SessionId::new_v4()))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), FetchErrorKind::Transport);
}

#[tokio::test]
async fn configured_timeout_surfaces_as_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/chat", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let client = HttpReplyClient::new(
        BackendConfig::new(&url).with_request_timeout(Duration::from_millis(200)),
    )
    .unwrap();
    let error = client
        .fetch_reply(ReplyRequest::new("Hello", SessionId::new_v4()))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), FetchErrorKind::Transport);
    server.abort();
}
