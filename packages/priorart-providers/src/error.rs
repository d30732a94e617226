pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("Credential request failed: {message}")]
	Auth { message: String },
	#[error("Request rejected with status {status}: {body}")]
	Permanent { status: u16, body: String },
	#[error("Gave up after {attempts} attempts: {last_error}")]
	RetryExhausted { attempts: u32, last_error: String },
}
impl Error {
	/// Misconfiguration that retrying the whole run cannot fix.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::Auth { .. } | Self::Permanent { .. } | Self::InvalidConfig { .. })
	}
}
