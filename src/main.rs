mod api;
mod config;
mod error;
mod quiz;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use warp::Filter;

use config::Config;
use quiz::{store, QuizServer};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let (sessions, users, quizzes) = store::seed_from_env().await;
    let server = Arc::new(QuizServer::new(sessions, users, quizzes));

    let routes = api::quiz_routes::quiz_websocket_route(server)
        .or(api::quiz_routes::quiz_health_check())
        .or(api::quiz_routes::quiz_config_endpoint());

    let addr = config.bind_address();
    tracing::info!(host = %config.server.host, port = config.server.port, "Quiz session server listening");

    warp::serve(routes).run(addr).await;
}
