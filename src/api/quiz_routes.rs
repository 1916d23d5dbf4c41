use std::collections::HashMap;
use std::sync::Arc;

use warp::Filter;

use super::quiz_websocket;
use crate::quiz::QuizServer;

/// Creates the quiz WebSocket route. The session token arrives as a query
/// parameter on the upgrade request and is validated during the handshake.
pub fn quiz_websocket_route(
    server: Arc<QuizServer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("quiz")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_quiz_server(server))
        .map(
            |ws: warp::ws::Ws, query: HashMap<String, String>, server: Arc<QuizServer>| {
                let token = query.get("token").cloned();
                ws.on_upgrade(move |websocket| {
                    quiz_websocket::handle_quiz_websocket(websocket, server, token)
                })
            },
        )
}

pub fn quiz_health_check() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("quiz")
        .and(warp::path("health"))
        .and(warp::get())
        .map(|| {
            warp::reply::json(&serde_json::json!({
                "status": "healthy",
                "service": "Quiz Session Server",
                "version": "1.0.0"
            }))
        })
}

pub fn quiz_config_endpoint() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path("quiz")
        .and(warp::path("config"))
        .and(warp::get())
        .map(|| {
            use std::env;

            let config = serde_json::json!({
                "QUIZ_WEBSOCKET_URL": env::var("QUIZ_WEBSOCKET_URL").ok(),
                "HOST_UI_URL": env::var("HOST_UI_URL").ok(),
                "PLAYER_UI_URL": env::var("PLAYER_UI_URL").ok()
            });

            warp::reply::json(&config)
        })
}

fn with_quiz_server(
    server: Arc<QuizServer>,
) -> impl Filter<Extract = (Arc<QuizServer>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || server.clone())
}
