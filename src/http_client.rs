//! Streaming HTTP client. Grounded on the teacher's `relay/pool.rs`
//! (`connect`: build a `reqwest::Client`, assemble the target URL, issue the
//! request) and `parse/sse.rs` (consume a chunked body as a sequence of
//! delimited frames). Requests may use the non-standard `LISTEN`,
//! `SUBSCRIBE`, `UNSUBSCRIBE` methods the proxy protocol defines;
//! `reqwest::Method::from_bytes` accepts them verbatim.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::{Method, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};

/// Near-infinite timeout used for long-lived `LISTEN`/`SUBSCRIBE` requests, so
/// the HTTP client never closes the connection out from under a listener that
/// is simply waiting for the server's next push.
pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 365);
/// Default timeout for one-shot requests (`GET`/`POST`/proxy-info).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpStreamingClient {
	client: reqwest::Client,
}

impl HttpStreamingClient {
	pub fn new() -> Result<Self> {
		let client = reqwest::Client::builder()
			.build()
			.map_err(|e| Error::Transport(e.to_string()))?;
		Ok(Self { client })
	}

	/// Issues a single-shot request and returns the full body. Used for
	/// `GET /` (proxy info) and `POST /<key>` (put).
	#[instrument(skip(self, body), fields(%method, %url))]
	pub async fn one_shot(
		&self,
		method: Method,
		url: &str,
		body: Option<String>,
		timeout: Duration,
	) -> Result<(StatusCode, String)> {
		let mut req = self.client.request(method, url).timeout(timeout);
		if let Some(body) = body {
			req = req.body(body);
		}
		let resp = req.send().await?;
		let status = resp.status();
		let text = resp.text().await?;
		Ok((status, text))
	}

	/// Opens a long-lived request whose body is consumed frame-by-frame via
	/// [`StreamRequest::fetch_chunk`]. The worker task owns the connection;
	/// cancellation closes the underlying stream rather than raising on the
	/// reader. `cancel` is supplied by the caller so that
	/// an [`crate::registry::Operation`] or [`crate::registry::Listener`] can
	/// hold the same token and cancel this request without going through the
	/// returned handle.
	pub fn open_stream(
		&self,
		method: Method,
		url: &str,
		body: Option<String>,
		timeout: Duration,
		cancel: CancellationToken,
	) -> StreamRequest {
		let (tx, rx) = mpsc::unbounded_channel();
		let open = Arc::new(AtomicBool::new(true));

		let client = self.client.clone();
		let url = url.to_string();
		let task_cancel = cancel.clone();
		let task_open = open.clone();
		let task = tokio::spawn(async move {
			let result = run_stream(client, method, url, body, timeout, task_cancel.clone(), &tx).await;
			if let Err(e) = result {
				let _ = tx.send(Err(e));
			}
			task_open.store(false, Ordering::SeqCst);
		});

		StreamRequest {
			cancel,
			rx,
			open,
			task: Some(task),
		}
	}
}

async fn run_stream(
	client: reqwest::Client,
	method: Method,
	url: String,
	body: Option<String>,
	timeout: Duration,
	cancel: CancellationToken,
	tx: &mpsc::UnboundedSender<Result<String>>,
) -> Result<()> {
	let mut req = client.request(method, &url).timeout(timeout);
	if let Some(body) = body {
		req = req.body(body);
	}
	let resp = tokio::select! {
		_ = cancel.cancelled() => return Err(Error::Cancelled),
		r = req.send() => r?,
	};
	let status = resp.status();
	if status != StatusCode::OK {
		return Err(Error::Protocol {
			status: status.as_u16(),
		});
	}

	let mut stream = resp.bytes_stream();
	let mut buf = BytesMut::new();
	loop {
		let chunk: Option<std::result::Result<Bytes, reqwest::Error>> = tokio::select! {
			_ = cancel.cancelled() => {
				debug!("stream request cancelled");
				return Err(Error::Cancelled);
			}
			c = stream.next() => c,
		};
		let Some(chunk) = chunk else { break };
		let chunk = chunk?;
		buf.extend_from_slice(&chunk);
		while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
			let line = buf.split_to(pos + 1);
			let line = &line[..line.len() - 1];
			match std::str::from_utf8(line) {
				Ok(s) if !s.trim().is_empty() => {
					if tx.send(Ok(s.to_string())).is_err() {
						return Ok(());
					}
				}
				Ok(_) => {}
				Err(_) => {
					let _ = tx.send(Err(Error::Parse));
				}
			}
		}
	}
	if !buf.is_empty() {
		if let Ok(s) = std::str::from_utf8(&buf) {
			if !s.trim().is_empty() {
				let _ = tx.send(Ok(s.to_string()));
			}
		}
	}
	Ok(())
}

/// Handle to an in-flight streaming request.
pub struct StreamRequest {
	cancel: CancellationToken,
	rx: mpsc::UnboundedReceiver<Result<String>>,
	open: Arc<AtomicBool>,
	task: Option<tokio::task::JoinHandle<()>>,
}

impl StreamRequest {
	/// Blocks until the next `\n`-delimited frame is available, the stream
	/// closes normally, or an error (including cancellation) terminates it.
	pub async fn fetch_chunk(&mut self) -> Option<Result<String>> {
		self.rx.recv().await
	}

	pub fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst)
	}

	/// Closes the socket. Idempotent; does not itself error even if the
	/// request already completed.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Waits for the worker task driving this request to finish. Must never
	/// be called while holding a registry lock.
	pub async fn join(&mut self) {
		if let Some(task) = self.task.take() {
			if let Err(e) = task.await {
				warn!(error = %e, "stream worker task panicked");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[tokio::test]
	async fn one_shot_get_returns_body() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/"))
			.respond_with(ResponseTemplate::new(200).set_body_string("{\"node_id\":\"abc\"}"))
			.mount(&server)
			.await;

		let client = HttpStreamingClient::new().unwrap();
		let (status, body) = client
			.one_shot(Method::GET, &server.uri(), None, DEFAULT_TIMEOUT)
			.await
			.unwrap();
		assert_eq!(status, StatusCode::OK);
		assert!(body.contains("abc"));
	}

	#[tokio::test]
	async fn stream_yields_each_line_then_closes() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/deadbeef"))
			.respond_with(ResponseTemplate::new(200).set_body_string(
				"{\"id\":\"1\",\"data\":\"YQ==\"}\n{\"id\":\"2\",\"data\":\"Yg==\"}\n",
			))
			.mount(&server)
			.await;

		let client = HttpStreamingClient::new().unwrap();
		let url = format!("{}/deadbeef", server.uri());
		let mut req = client.open_stream(Method::GET, &url, None, LISTEN_TIMEOUT, CancellationToken::new());

		let first = req.fetch_chunk().await.unwrap().unwrap();
		assert!(first.contains("\"id\":\"1\""));
		let second = req.fetch_chunk().await.unwrap().unwrap();
		assert!(second.contains("\"id\":\"2\""));
		assert!(req.fetch_chunk().await.is_none());
		req.join().await;
	}

	#[tokio::test]
	async fn cancel_unblocks_fetch_chunk() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/slow"))
			.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3600)))
			.mount(&server)
			.await;

		let client = HttpStreamingClient::new().unwrap();
		let url = format!("{}/slow", server.uri());
		let mut req = client.open_stream(Method::GET, &url, None, LISTEN_TIMEOUT, CancellationToken::new());
		req.cancel();
		let outcome = req.fetch_chunk().await;
		assert!(matches!(outcome, Some(Err(Error::Cancelled)) | None));
		req.join().await;
	}
}
