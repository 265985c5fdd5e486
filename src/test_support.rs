//! Test helpers: a scripted, recording HTTP transport.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::transport::{
    HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError,
};

/// Serializes tests that touch the global SDK state or callback registry.
pub(crate) static FFI_TEST_LOCK: Mutex<()> = parking_lot::const_mutex(());

pub(crate) const USER_U1: &str =
    r#"{"accessToken":"tok123","user":{"id":"u1","email":"a@b.com","firstName":"Ada","lastName":null}}"#;

/// Replays queued outcomes in order and records every request it sees.
/// Running out of scripted outcomes is a transport error.
#[derive(Default)]
pub(crate) struct MockTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering each request.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn respond(self, status: u16, body: &str) -> Self {
        self.script
            .lock()
            .push_back(Ok(HttpResponse::new(status, body.as_bytes().to_vec())));
        self
    }

    pub(crate) fn fail(self, message: &str) -> Self {
        self.script
            .lock()
            .push_back(Err(TransportError(message.to_string())));
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted response".to_string())))
    }
}

/// Real `reqwest` transport that ignores proxy environment variables.
pub(crate) fn loopback_transport() -> ReqwestTransport {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .user_agent("siwa-sdk-test")
        .build()
        .unwrap();
    ReqwestTransport::from_client(client)
}

/// Serve one canned HTTP/1.1 response per incoming connection, in order, on
/// a loopback port. The join handle yields the raw requests received.
pub(crate) async fn serve_sequence(
    responses: Vec<(&'static str, String)>,
) -> (String, tokio::task::JoinHandle<Vec<String>>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        for (status_line, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if n == 0 || request_complete(&raw) {
                    break;
                }
            }
            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            seen.push(String::from_utf8_lossy(&raw).to_string());
        }
        seen
    });
    (format!("http://{}", addr), handle)
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let head_end = match text.find("\r\n\r\n") {
        Some(i) => i,
        None => return false,
    };
    let content_length = text[..head_end]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    raw.len() >= head_end + 4 + content_length
}
