use std::sync::Arc;

use jarvis_service::JarvisService;
use jarvis_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<JarvisService>,
}
impl AppState {
	/// Connects Postgres, bootstraps the schema, and wires the default ports.
	pub async fn new(config: jarvis_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		Ok(Self::from_service(JarvisService::new(config, db)))
	}

	pub fn from_service(service: JarvisService) -> Self {
		Self { service: Arc::new(service) }
	}
}
