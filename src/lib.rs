//! HTTP front end for the c3dl build bot.
//!
//! `GET /?submit` runs `./c3dlbuildbot full` (or `minified` with `getMini`)
//! and streams the result back as `c3dlapi.js`.

pub mod build_request;
pub mod config;
pub mod handlers;
pub mod process;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use build_request::{BuildMode, BuildRequest};
pub use config::{Config, ConfigError};
pub use process::{BuildError, BuildOutput, BuildTrigger, BUILDBOT_PATH};

#[derive(Clone)]
pub struct AppState {
    pub builds: Arc<BuildTrigger>,
}

impl AppState {
    pub fn new(builds: BuildTrigger) -> Self {
        Self {
            builds: Arc::new(builds),
        }
    }

    /// State for the real service: the fixed build tool plus any limits
    /// from the config.
    pub fn from_config(config: &Config) -> Self {
        let mut builds = BuildTrigger::new(BUILDBOT_PATH);
        if let Some(limit) = config.max_concurrent_builds {
            builds = builds.with_max_concurrent_builds(limit);
        }
        if let Some(timeout) = config.build_timeout {
            builds = builds.with_timeout(timeout);
        }
        Self::new(builds)
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::trigger_build))
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
