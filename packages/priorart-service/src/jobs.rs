//! Server side of the job protocol: triggering a domain search, reporting its status, and the
//! reviewer's report flag.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, PriorArtService, Result, ResultStore};
use priorart_domain::{Disclosure, Domain, RankedResult};
use priorart_storage::{
	models::{RunStatus, SearchRun},
	results, runs,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
	pub disclosure: Disclosure,
	pub domain: Domain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
	pub job_token: Uuid,
	/// An active run for the same disclosure and domain was returned instead of a new one.
	pub reused: bool,
	pub status: RunStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
	pub job_token: Uuid,
	pub disclosure_id: String,
	pub domain: Domain,
	pub status: RunStatus,
	pub ready: bool,
	/// Persisted results for the pair, across every run so far.
	pub count: i64,
	pub attempts: i32,
	pub last_error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub results: Option<Vec<RankedResult>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusQuery {
	pub disclosure_id: String,
	pub domain: Domain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
	pub disclosure_id: String,
	pub results: Vec<RankedResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFlagRequest {
	pub disclosure_id: String,
	pub candidate_id: String,
	pub add_to_report: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportFlagResponse {
	pub disclosure_id: String,
	pub candidate_id: String,
	pub add_to_report: bool,
	#[serde(with = "time::serde::rfc3339")]
	pub reviewed_at: OffsetDateTime,
}

impl PriorArtService {
	pub async fn trigger(&self, req: TriggerRequest) -> Result<TriggerResponse> {
		validate_trigger(&req)?;

		let payload = serde_json::to_value(&req.disclosure)
			.map_err(|err| Error::InvalidRequest { message: err.to_string() })?;
		let enqueued = runs::enqueue(
			&self.db,
			&req.disclosure.id,
			req.domain.as_str(),
			&payload,
			OffsetDateTime::now_utc(),
		)
		.await?;
		let status = enqueued.run.status()?;

		tracing::info!(
			disclosure_id = %req.disclosure.id,
			domain = %req.domain,
			job_token = %enqueued.run.run_id,
			reused = enqueued.reused,
			"Search triggered."
		);

		Ok(TriggerResponse { job_token: enqueued.run.run_id, reused: enqueued.reused, status })
	}

	pub async fn job_status(&self, job_token: Uuid) -> Result<JobStatus> {
		let Some(run) = runs::get(&self.db, job_token).await? else {
			return Err(Error::NotFound { message: format!("Unknown job token {job_token}.") });
		};

		status_for_run(&self.db, run).await
	}

	/// Status of the most recent run for the pair, whichever token triggered it.
	pub async fn latest_status(&self, query: StatusQuery) -> Result<JobStatus> {
		let disclosure_id = query.disclosure_id.trim();

		if disclosure_id.is_empty() {
			return Err(Error::InvalidRequest {
				message: "disclosure_id must be non-empty.".to_string(),
			});
		}

		let Some(run) = runs::latest(&self.db, disclosure_id, query.domain.as_str()).await? else {
			return Err(Error::NotFound {
				message: format!("No {} search for {disclosure_id}.", query.domain),
			});
		};

		status_for_run(&self.db, run).await
	}

	pub async fn results(&self, disclosure_id: &str) -> Result<ResultsResponse> {
		let results = self.db.query_all(disclosure_id, None).await?;

		Ok(ResultsResponse { disclosure_id: disclosure_id.to_string(), results })
	}

	pub async fn set_report_flag(&self, req: ReportFlagRequest) -> Result<ReportFlagResponse> {
		let now = OffsetDateTime::now_utc();
		let updated = results::set_report_flag(
			&self.db,
			&req.disclosure_id,
			&req.candidate_id,
			req.add_to_report,
			now,
		)
		.await?;

		if !updated {
			return Err(Error::NotFound {
				message: format!(
					"No result {} for disclosure {}.",
					req.candidate_id, req.disclosure_id
				),
			});
		}

		tracing::info!(
			disclosure_id = %req.disclosure_id,
			candidate_id = %req.candidate_id,
			add_to_report = req.add_to_report,
			"Report flag set by reviewer."
		);

		Ok(ReportFlagResponse {
			disclosure_id: req.disclosure_id,
			candidate_id: req.candidate_id,
			add_to_report: req.add_to_report,
			reviewed_at: now,
		})
	}
}

pub fn validate_trigger(req: &TriggerRequest) -> Result<()> {
	if req.disclosure.id.trim().is_empty() {
		return Err(Error::InvalidRequest {
			message: "disclosure.id must be non-empty.".to_string(),
		});
	}
	if req.disclosure.id.len() > 256 {
		return Err(Error::InvalidRequest {
			message: "disclosure.id must be at most 256 bytes.".to_string(),
		});
	}

	Ok(())
}

/// A run is ready once it finished; its results come with the status so the caller needs no
/// second round trip.
async fn status_for_run(store: &dyn ResultStore, run: SearchRun) -> Result<JobStatus> {
	let status = run.status()?;
	let domain = run.domain()?;
	let count = store.count(&run.disclosure_id, domain.as_str()).await?;
	let ready = status == RunStatus::Done;
	let results = if ready {
		Some(store.query_all(&run.disclosure_id, Some(domain.as_str())).await?)
	} else {
		None
	};

	Ok(JobStatus {
		job_token: run.run_id,
		disclosure_id: run.disclosure_id,
		domain,
		status,
		ready,
		count,
		attempts: run.attempts,
		last_error: run.last_error,
		results,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(id: &str) -> TriggerRequest {
		TriggerRequest {
			disclosure: Disclosure {
				id: id.to_string(),
				keywords: vec!["stent".to_string()],
				title: String::new(),
				description: String::new(),
			},
			domain: Domain::Patents,
		}
	}

	#[test]
	fn blank_disclosure_ids_are_rejected() {
		assert!(validate_trigger(&request("DISC-7")).is_ok());
		assert!(matches!(validate_trigger(&request("  ")), Err(Error::InvalidRequest { .. })));
		assert!(validate_trigger(&request(&"x".repeat(300))).is_err());
	}

	#[test]
	fn trigger_request_reads_the_upstream_shape() {
		let req: TriggerRequest = serde_json::from_value(serde_json::json!({
			"disclosure": { "id": "DISC-7", "keywords": ["stent", "biliary"] },
			"domain": "papers"
		}))
		.expect("Request should parse.");

		assert_eq!(req.domain, Domain::Papers);
		assert_eq!(req.disclosure.title, "");
	}

	#[test]
	fn pending_status_omits_results() {
		let status = JobStatus {
			job_token: Uuid::nil(),
			disclosure_id: "DISC-7".to_string(),
			domain: Domain::Patents,
			status: RunStatus::Pending,
			ready: false,
			count: 0,
			attempts: 0,
			last_error: None,
			results: None,
		};
		let json = serde_json::to_value(&status).expect("Status should serialize.");

		assert_eq!(json["status"], "PENDING");
		assert!(json.get("results").is_none());
	}
}
