pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Provider error: {0}")]
	Provider(#[from] priorart_providers::Error),
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Errors that will recur on every retry of the same run.
	pub fn is_fatal(&self) -> bool {
		match self {
			Self::Provider(err) => err.is_fatal(),
			Self::InvalidRequest { .. } => true,
			Self::NotFound { .. } | Self::Storage { .. } => false,
		}
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<priorart_storage::Error> for Error {
	fn from(err: priorart_storage::Error) -> Self {
		match err {
			priorart_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			priorart_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			priorart_storage::Error::NotFound(message) => Self::NotFound { message },
			priorart_storage::Error::Corrupt(message) => Self::Storage { message },
		}
	}
}
