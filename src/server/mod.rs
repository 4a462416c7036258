pub mod poller;
pub mod stream;
pub mod submit;

pub use poller::ChangePoller;

use std::error::Error;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tiny_http::{Header, Method, Request, Response, Server, StatusCode};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::storage::{MessageStore, Watermark};

use self::stream::EventStreamReader;

const CHAT_PATH: &str = "/api/chat";
/// Messages buffered between a poll loop and a slow client.
const STREAM_BUFFER: usize = 64;

/// HTTP front: accept loop plus routing for the two `/api/chat` methods.
pub struct HttpServer {
    server: Arc<Server>,
    store: Arc<MessageStore>,
    poll_interval: Duration,
    runtime: Handle,
}

/// Stops the accept loop from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    server: Arc<Server>,
}

impl ShutdownHandle {
    /// Unblock the accept loop; `HttpServer::run` returns after this.
    pub fn shutdown(&self) {
        self.server.unblock();
    }
}

impl HttpServer {
    /// Bind the listener. Must be called from within the tokio runtime so
    /// the poll loops have an executor to land on.
    pub fn bind(
        addr: &str,
        store: Arc<MessageStore>,
        poll_interval: Duration,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let server = Server::http(addr)?;
        Ok(Self {
            server: Arc::new(server),
            store,
            poll_interval,
            runtime: Handle::current(),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server: Arc::clone(&self.server),
        }
    }

    /// Accept loop. Blocks the calling thread; each request is handled on
    /// its own thread since stream connections stay open indefinitely.
    pub fn run(self) {
        for request in self.server.incoming_requests() {
            let store = Arc::clone(&self.store);
            let poll_interval = self.poll_interval;
            let runtime = self.runtime.clone();
            thread::spawn(move || handle_request(request, store, poll_interval, runtime));
        }
    }
}

fn handle_request(
    request: Request,
    store: Arc<MessageStore>,
    poll_interval: Duration,
    runtime: Handle,
) {
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or(&url);
    log::debug!("{} {}", request.method(), url);

    let result = match (request.method().clone(), path) {
        (Method::Get, CHAT_PATH) => handle_stream(request, &url, store, poll_interval, runtime),
        (Method::Post, CHAT_PATH) => handle_post(request, &store),
        _ => respond_json(request, 404, submit::error_body("not found")),
    };

    if let Err(err) = result {
        // Writes fail once the peer hangs up; nothing left to do.
        log::debug!("Connection closed: {err}");
    }
}

/// Open a `text/event-stream` response fed by a dedicated poll loop.
fn handle_stream(
    request: Request,
    url: &str,
    store: Arc<MessageStore>,
    poll_interval: Duration,
    runtime: Handle,
) -> std::io::Result<()> {
    let watermark = match resume_timestamp(url) {
        Some(timestamp) => Watermark::from_timestamp(timestamp),
        None => match store.latest_watermark() {
            Ok(watermark) => watermark,
            Err(err) => {
                log::error!("Failed to read stream start point: {err}");
                return respond_json(request, 500, submit::error_body(&err.to_string()));
            }
        },
    };

    let (event_tx, event_rx) = mpsc::channel(STREAM_BUFFER);
    let poller = ChangePoller::new(store, watermark, poll_interval, event_tx);
    runtime.spawn(poller.run());

    let response = Response::new(
        StatusCode(200),
        vec![
            content_type("text/event-stream"),
            Header::from_bytes(&b"Cache-Control"[..], &b"no-cache"[..]).unwrap(),
        ],
        EventStreamReader::new(event_rx),
        None,
        None,
    );
    request.respond(response)
}

fn handle_post(mut request: Request, store: &MessageStore) -> std::io::Result<()> {
    let mut body = String::new();
    if let Err(err) = request.as_reader().read_to_string(&mut body) {
        return respond_json(request, 400, submit::error_body(&err.to_string()));
    }

    let (status, payload) = submit::handle_submit(store, &body);
    respond_json(request, status, payload)
}

fn respond_json(request: Request, status: u16, body: String) -> std::io::Result<()> {
    let response = Response::from_string(body)
        .with_status_code(status)
        .with_header(content_type("application/json"));
    request.respond(response)
}

fn content_type(value: &str) -> Header {
    Header::from_bytes(&b"Content-Type"[..], value.as_bytes()).unwrap()
}

/// `lastTimestamp` query parameter; unparsable values are ignored and the
/// stream starts from the newest stored message instead.
fn resume_timestamp(url: &str) -> Option<i64> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|param| param.strip_prefix("lastTimestamp="))
        .and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_resume_parameter() {
        assert_eq!(resume_timestamp("/api/chat?lastTimestamp=123"), Some(123));
        assert_eq!(resume_timestamp("/api/chat?user=a&lastTimestamp=5"), Some(5));
        assert_eq!(resume_timestamp("/api/chat"), None);
        assert_eq!(resume_timestamp("/api/chat?lastTimestamp=abc"), None);
        assert_eq!(resume_timestamp("/api/chat?lastTimestampX=1"), None);
    }
}
