use std::sync::Arc;

use priorart_providers::RateLimiters;
use priorart_service::{PriorArtService, Providers};
use priorart_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<PriorArtService>,
}
impl AppState {
	pub async fn new(config: priorart_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let limiters = RateLimiters::from_config(&config.providers);
		let providers = Providers::from_config(&config, &limiters)?;
		let service = PriorArtService::new(config, db, providers);

		Ok(Self { service: Arc::new(service) })
	}
}
