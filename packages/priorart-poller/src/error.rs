use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("Failed to access snapshot at {path:?}.")]
	Snapshot {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("Search API answered {status}: {body}")]
	Api { status: u16, body: String },
	#[error("A poll loop for {key} is already running.")]
	Busy { key: String },
	#[error("Job {key} is {state} but has no job token.")]
	MissingToken { key: String, state: String },
}
