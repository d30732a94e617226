use std::{future::IntoFuture, time::Duration};

use axum::{
	Json, Router,
	extract::Path,
	http::StatusCode,
	response::IntoResponse,
	routing,
};
use serde_json::Value;
use tokio::{
	net::TcpListener,
	sync::{oneshot, oneshot::Sender},
};
use uuid::Uuid;

use priorart_domain::{Disclosure, Domain};
use priorart_poller::{Error, HttpSearchApi, SearchApi};

const TOKEN: &str = "6f1c1f0e-3a59-4a8e-9d36-0c6f0b7f7f01";

async fn start_server(app: Router) -> (String, Sender<()>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind mock server.");
	let addr = listener.local_addr().expect("Failed to read mock server address.");
	let (tx, rx) = oneshot::channel();
	let server = axum::serve(listener, app).with_graceful_shutdown(async move {
		let _ = rx.await;
	});

	tokio::spawn(async move {
		let _ = server.into_future().await;
	});

	(format!("http://{addr}"), tx)
}

async fn trigger(Json(body): Json<Value>) -> impl IntoResponse {
	if body["disclosure"]["id"] != "DISC-1" || body["domain"] != "papers" {
		return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error_code": "bad" })));
	}

	(StatusCode::OK, Json(serde_json::json!({ "job_token": TOKEN, "reused": false, "status": "PENDING" })))
}

async fn job(Path(token): Path<String>) -> impl IntoResponse {
	if token != TOKEN {
		return (
			StatusCode::NOT_FOUND,
			Json(serde_json::json!({ "error_code": "not_found", "message": "Unknown job token." })),
		);
	}

	(
		StatusCode::OK,
		Json(serde_json::json!({
			"job_token": TOKEN,
			"disclosure_id": "DISC-1",
			"domain": "papers",
			"status": "DONE",
			"ready": true,
			"count": 3,
			"attempts": 1,
			"last_error": null,
			"results": []
		})),
	)
}

#[tokio::test]
async fn http_api_triggers_and_reads_status() {
	let app = Router::new()
		.route("/v1/search/trigger", routing::post(trigger))
		.route("/v1/search/jobs/{token}", routing::get(job));
	let (base, shutdown) = start_server(app).await;
	let api = HttpSearchApi::new(&format!("{base}/"), Duration::from_secs(2))
		.expect("Client should build.");
	let disclosure = Disclosure {
		id: "DISC-1".to_string(),
		keywords: vec!["radiology".to_string()],
		title: String::new(),
		description: String::new(),
	};
	let token = api.trigger(&disclosure, Domain::Papers).await.expect("Trigger should succeed.");

	assert_eq!(token.to_string(), TOKEN);

	let status = api.status(token).await.expect("Status should succeed.");

	assert!(status.ready);
	assert_eq!(status.count, 3);
	assert_eq!(status.results.map(|r| r.len()), Some(0));

	let missing = api.status(Uuid::nil()).await;

	assert!(matches!(missing, Err(Error::Api { status: 404, .. })));

	let _ = shutdown.send(());
}
