use std::{future::Future, pin::Pin, time::Duration};

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};
use priorart_domain::{Disclosure, Domain, RankedResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Status of a server-side run as the poller sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
	pub status: String,
	pub ready: bool,
	pub count: i64,
	#[serde(default)]
	pub attempts: i32,
	#[serde(default)]
	pub last_error: Option<String>,
	#[serde(default)]
	pub results: Option<Vec<RankedResult>>,
}

/// The two calls the poll loop needs from the search service.
pub trait SearchApi
where
	Self: Send + Sync,
{
	fn trigger<'a>(
		&'a self,
		disclosure: &'a Disclosure,
		domain: Domain,
	) -> BoxFuture<'a, Result<Uuid>>;

	fn status<'a>(&'a self, job_token: Uuid) -> BoxFuture<'a, Result<RemoteStatus>>;
}

pub struct HttpSearchApi {
	http: Client,
	api_base: String,
}
impl HttpSearchApi {
	pub fn new(api_base: &str, timeout: Duration) -> Result<Self> {
		let http = Client::builder().timeout(timeout).build()?;

		Ok(Self { http, api_base: api_base.trim_end_matches('/').to_string() })
	}

	async fn trigger_inner(&self, disclosure: &Disclosure, domain: Domain) -> Result<Uuid> {
		#[derive(Deserialize)]
		struct Triggered {
			job_token: Uuid,
		}

		let url = format!("{}/v1/search/trigger", self.api_base);
		let body = serde_json::json!({ "disclosure": disclosure, "domain": domain });
		let res = self.http.post(url).json(&body).send().await?;
		let triggered: Triggered = read_json(res).await?;

		Ok(triggered.job_token)
	}

	async fn status_inner(&self, job_token: Uuid) -> Result<RemoteStatus> {
		let url = format!("{}/v1/search/jobs/{job_token}", self.api_base);
		let res = self.http.get(url).send().await?;

		read_json(res).await
	}
}
impl SearchApi for HttpSearchApi {
	fn trigger<'a>(
		&'a self,
		disclosure: &'a Disclosure,
		domain: Domain,
	) -> BoxFuture<'a, Result<Uuid>> {
		Box::pin(self.trigger_inner(disclosure, domain))
	}

	fn status<'a>(&'a self, job_token: Uuid) -> BoxFuture<'a, Result<RemoteStatus>> {
		Box::pin(self.status_inner(job_token))
	}
}

async fn read_json<T>(res: Response) -> Result<T>
where
	T: serde::de::DeserializeOwned,
{
	let status = res.status();

	if !status.is_success() {
		let body = res.text().await.unwrap_or_default();

		return Err(Error::Api { status: status.as_u16(), body });
	}

	Ok(res.json().await?)
}
