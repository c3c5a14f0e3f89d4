use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Public error type. Per-request failures (a single `get`/`put`/listener
/// fetch failing) are *not* propagated through this type — they surface as
/// `ok: false` on the operation's done callback, matching the original's
/// `std::atomic_bool ok` contract. This enum is only
/// used for the handful of fallible, caller-facing constructors.
#[derive(Debug, Error)]
pub enum Error {
	#[error("transport error: {0}")]
	Transport(String),
	#[error("proxy returned non-200 status: {status}")]
	Protocol { status: u16 },
	#[error("failed to parse proxy response")]
	Parse,
	#[error("operation cancelled")]
	Cancelled,
	#[error("proxy host is not configured")]
	Configuration,
}

impl From<reqwest::Error> for Error {
	fn from(e: reqwest::Error) -> Self {
		Error::Transport(e.to_string())
	}
}

impl From<serde_json::Error> for Error {
	fn from(_: serde_json::Error) -> Self {
		Error::Parse
	}
}
