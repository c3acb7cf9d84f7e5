use std::sync::Arc;

use anyhow::Context;
use log::{info, warn};

use timetable_planner::config::ServerConfig;
use timetable_planner::directory::InMemoryDirectory;
use timetable_planner::lessons::InMemoryLessonStore;
use timetable_planner::preview::InMemoryPreviewStore;
use timetable_planner::server::{self, AppState};
use timetable_planner::service::TimetableService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let directory = match &config.directory_file {
        Some(path) => InMemoryDirectory::from_path(path)
            .with_context(|| format!("loading directory from {}", path.display()))?,
        None => {
            warn!("DIRECTORY_FILE not set, starting with an empty directory");
            InMemoryDirectory::new()
        }
    };

    let service = TimetableService::new(
        Arc::new(directory),
        Arc::new(InMemoryLessonStore::new()),
        Arc::new(InMemoryPreviewStore::new()),
    )
    .with_preview_ttl(config.preview_ttl);
    info!("Timetable service ready: {:?}", service.stats());

    server::run_server(&config, AppState::new(service)).await
}
