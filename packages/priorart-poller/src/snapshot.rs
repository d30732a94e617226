//! Durable storage for [`SearchJob`] snapshots, one per job key.

use std::{
	collections::HashMap,
	path::{Path, PathBuf},
	sync::Mutex,
};

use crate::{
	Error, Result,
	client::BoxFuture,
	job::{JobKey, SearchJob},
};

pub trait SnapshotStore
where
	Self: Send + Sync,
{
	fn load<'a>(&'a self, key: &'a JobKey) -> BoxFuture<'a, Result<Option<SearchJob>>>;

	fn save<'a>(&'a self, job: &'a SearchJob) -> BoxFuture<'a, Result<()>>;
}

/// One JSON file per job under `dir`. Writes go to a temporary file first and are renamed into
/// place, so a crash never leaves a half-written snapshot.
pub struct FileSnapshots {
	dir: PathBuf,
}
impl FileSnapshots {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn path_for(&self, key: &JobKey) -> PathBuf {
		let stem: String = key
			.disclosure_id
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
			.collect();

		self.dir.join(format!("{stem}.{}.json", key.domain))
	}

	async fn load_inner(&self, key: &JobKey) -> Result<Option<SearchJob>> {
		let path = self.path_for(key);
		let raw = match tokio::fs::read(&path).await {
			Ok(raw) => raw,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(source) => return Err(Error::Snapshot { path, source }),
		};

		Ok(Some(serde_json::from_slice(&raw)?))
	}

	async fn save_inner(&self, job: &SearchJob) -> Result<()> {
		let path = self.path_for(&job.key);
		let tmp = path.with_extension("json.tmp");
		let raw = serde_json::to_vec_pretty(job)?;

		tokio::fs::create_dir_all(&self.dir)
			.await
			.map_err(|source| Error::Snapshot { path: self.dir.clone(), source })?;
		tokio::fs::write(&tmp, raw).await.map_err(|source| snapshot_error(&tmp, source))?;
		tokio::fs::rename(&tmp, &path).await.map_err(|source| snapshot_error(&path, source))?;

		Ok(())
	}
}
impl SnapshotStore for FileSnapshots {
	fn load<'a>(&'a self, key: &'a JobKey) -> BoxFuture<'a, Result<Option<SearchJob>>> {
		Box::pin(self.load_inner(key))
	}

	fn save<'a>(&'a self, job: &'a SearchJob) -> BoxFuture<'a, Result<()>> {
		Box::pin(self.save_inner(job))
	}
}

#[derive(Default)]
pub struct MemorySnapshots {
	jobs: Mutex<HashMap<JobKey, SearchJob>>,
	/// Every saved snapshot, oldest first.
	history: Mutex<Vec<SearchJob>>,
}
impl MemorySnapshots {
	pub fn with_job(job: SearchJob) -> Self {
		let store = Self::default();

		store.put(job);

		store
	}

	pub fn get(&self, key: &JobKey) -> Option<SearchJob> {
		self.jobs.lock().unwrap_or_else(|err| err.into_inner()).get(key).cloned()
	}

	pub fn history(&self) -> Vec<SearchJob> {
		self.history.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn put(&self, job: SearchJob) {
		self.jobs.lock().unwrap_or_else(|err| err.into_inner()).insert(job.key.clone(), job);
	}
}
impl SnapshotStore for MemorySnapshots {
	fn load<'a>(&'a self, key: &'a JobKey) -> BoxFuture<'a, Result<Option<SearchJob>>> {
		let job = self.get(key);

		Box::pin(async move { Ok(job) })
	}

	fn save<'a>(&'a self, job: &'a SearchJob) -> BoxFuture<'a, Result<()>> {
		self.history.lock().unwrap_or_else(|err| err.into_inner()).push(job.clone());
		self.put(job.clone());

		Box::pin(async { Ok(()) })
	}
}

fn snapshot_error(path: &Path, source: std::io::Error) -> Error {
	Error::Snapshot { path: path.to_path_buf(), source }
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;
	use uuid::Uuid;

	use super::*;
	use priorart_domain::Domain;

	fn key(id: &str) -> JobKey {
		JobKey { disclosure_id: id.to_string(), domain: Domain::Patents }
	}

	#[tokio::test]
	async fn file_snapshots_survive_a_new_store_instance() {
		let dir = std::env::temp_dir().join(format!("priorart-snapshots-{}", Uuid::new_v4()));
		let mut job = SearchJob::new(key("DISC/7 draft"));

		job.triggered(Uuid::new_v4(), datetime!(2026-03-01 09:00 UTC));
		FileSnapshots::new(&dir).save(&job).await.expect("Save should succeed.");

		let store = FileSnapshots::new(&dir);

		assert!(store.path_for(&job.key).ends_with("DISC_7_draft.patents.json"));
		assert_eq!(store.load(&job.key).await.expect("Load should succeed."), Some(job));
		assert_eq!(store.load(&key("DISC-8")).await.expect("Load should succeed."), None);

		let _ = tokio::fs::remove_dir_all(&dir).await;
	}
}
