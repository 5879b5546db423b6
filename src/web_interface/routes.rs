use std::convert::Infallible;

use log::{debug, error, warn};
use serde::Serialize;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::{self, Json, WithStatus};
use warp::{Filter, Rejection, Reply};

use super::types::*;
use crate::channel::WsChannel;
use crate::error_handling::types::SessionError;
use crate::scan_dispatch::{probe_catalog, OllamaCatalog};
use crate::session_management::{ScanRequest, SessionLifecycle};

const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Everything the route handlers need, cloned into each request.
#[derive(Clone)]
pub struct ApiContext {
    pub lifecycle: SessionLifecycle,
    pub models: OllamaCatalog,
}

fn with_context(
    context: ApiContext,
) -> impl Filter<Extract = (ApiContext,), Error = Infallible> + Clone {
    warp::any().map(move || context.clone())
}

fn json_reply<T: Serialize>(body: &T, status: StatusCode) -> WithStatus<Json> {
    reply::with_status(reply::json(body), status)
}

fn error_reply(message: impl Into<String>, status: StatusCode) -> WithStatus<Json> {
    json_reply(&ApiError::new(message), status)
}

/// All routes under `/api`, with CORS and JSON error replies.
pub fn api_routes(
    context: ApiContext,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_headers(vec!["content-type"]);

    root_route()
        .or(environments_route(context.clone()))
        .or(models_route(context.clone()))
        .or(probes_route())
        .or(create_scan_route(context.clone()))
        .or(cancel_scan_route(context.clone()))
        .or(list_sessions_route(context.clone()))
        .or(get_session_route(context.clone()))
        .or(scan_ws_route(context))
        .with(cors)
        .recover(handle_rejection)
}

/// GET /api/
pub fn root_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("api")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            reply::json(&RootResponse {
                message: "LLM Vulnerability Scanner API",
            })
        })
}

/// GET /api/environments
pub fn environments_route(
    context: ApiContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "environments")
        .and(warp::get())
        .and(with_context(context))
        .and_then(|context: ApiContext| async move {
            let environments = context
                .lifecycle
                .list_environments()
                .await
                .unwrap_or_else(|e| {
                    warn!("Environment listing unavailable: {}", e);
                    Vec::new()
                });
            Ok::<_, Rejection>(reply::json(&EnvironmentsResponse { environments }))
        })
}

/// GET /api/models
pub fn models_route(
    context: ApiContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "models")
        .and(warp::get())
        .and(with_context(context))
        .and_then(|context: ApiContext| async move {
            let models = context.models.list_models().await.unwrap_or_else(|e| {
                warn!("Model listing unavailable: {}", e);
                Vec::new()
            });
            Ok::<_, Rejection>(reply::json(&ModelsResponse { models }))
        })
}

/// GET /api/probes
pub fn probes_route() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "probes").and(warp::get()).map(|| {
        reply::json(&ProbesResponse {
            probes: probe_catalog(),
        })
    })
}

/// POST /api/scan
pub fn create_scan_route(
    context: ApiContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "scan")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_context(context))
        .and_then(|request: ScanRequest, context: ApiContext| async move {
            let reply = match context.lifecycle.create_session(request).await {
                Ok(session) => json_reply(
                    &ScanAccepted {
                        session_id: session.id,
                        status: "created",
                    },
                    StatusCode::OK,
                ),
                Err(SessionError::Validation(e)) => {
                    error_reply(e.to_string(), StatusCode::UNPROCESSABLE_ENTITY)
                }
                Err(e) => {
                    error!("Failed to create scan session: {}", e);
                    error_reply(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                }
            };
            Ok::<_, Rejection>(reply)
        })
}

/// POST /api/scan/{id}/cancel
pub fn cancel_scan_route(
    context: ApiContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "scan" / String / "cancel")
        .and(warp::post())
        .and(with_context(context))
        .and_then(|id_str: String, context: ApiContext| async move {
            let Ok(id) = Uuid::parse_str(&id_str) else {
                return Ok::<_, Rejection>(error_reply(
                    "Session not found",
                    StatusCode::NOT_FOUND,
                ));
            };
            let reply = match context.lifecycle.cancel(id).await {
                Ok(()) => json_reply(
                    &ScanAccepted {
                        session_id: id,
                        status: "cancelling",
                    },
                    StatusCode::OK,
                ),
                Err(SessionError::NotFound(_)) => {
                    error_reply("Session not found", StatusCode::NOT_FOUND)
                }
                Err(e @ SessionError::NotRunning(_)) => {
                    error_reply(e.to_string(), StatusCode::CONFLICT)
                }
                Err(e) => {
                    error!("[{}] cancel failed: {}", id, e);
                    error_reply(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                }
            };
            Ok::<_, Rejection>(reply)
        })
}

/// GET /api/sessions
pub fn list_sessions_route(
    context: ApiContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "sessions")
        .and(warp::get())
        .and(with_context(context))
        .and_then(|context: ApiContext| async move {
            match context.lifecycle.list_sessions().await {
                Ok(list) => Ok::<_, Rejection>(json_reply(&list, StatusCode::OK)),
                Err(e) => {
                    error!("Failed to load sessions: {}", e);
                    Ok::<_, Rejection>(error_reply(
                        "Failed to load sessions",
                        StatusCode::INTERNAL_SERVER_ERROR,
                    ))
                }
            }
        })
}

/// GET /api/sessions/{id}
pub fn get_session_route(
    context: ApiContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "sessions" / String)
        .and(warp::get())
        .and(with_context(context))
        .and_then(|id_str: String, context: ApiContext| async move {
            let Ok(id) = Uuid::parse_str(&id_str) else {
                return Ok::<_, Rejection>(error_reply(
                    "Session not found",
                    StatusCode::NOT_FOUND,
                ));
            };
            let reply = match context.lifecycle.get_session(id).await {
                Ok(session) => json_reply(&session, StatusCode::OK),
                Err(SessionError::NotFound(_)) => {
                    error_reply("Session not found", StatusCode::NOT_FOUND)
                }
                Err(e) => {
                    error!("[{}] failed to load session: {}", id, e);
                    error_reply(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                }
            };
            Ok::<_, Rejection>(reply)
        })
}

/// WS /api/ws/scan/{id}
///
/// The upgraded socket becomes the session's only observer channel; the scan
/// runs on the connection's task until the session is terminal.
pub fn scan_ws_route(
    context: ApiContext,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "ws" / "scan" / String)
        .and(warp::ws())
        .and(with_context(context))
        .map(|session_id: String, ws: warp::ws::Ws, context: ApiContext| {
            ws.on_upgrade(move |socket| async move {
                debug!("Observer connected for session {}", session_id);
                context
                    .lifecycle
                    .attach(&session_id, WsChannel::new(socket))
                    .await;
            })
        })
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (message, status) = if err.is_not_found() {
        ("Not found".to_string(), StatusCode::NOT_FOUND)
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (format!("Invalid request body: {}", e), StatusCode::BAD_REQUEST)
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ("Method not allowed".to_string(), StatusCode::METHOD_NOT_ALLOWED)
    } else {
        warn!("Unhandled rejection: {:?}", err);
        ("Bad request".to_string(), StatusCode::BAD_REQUEST)
    };
    Ok(error_reply(message, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan_dispatch::{CondaRuntime, ScanDispatcher};
    use crate::session_management::SessionStatus;
    use crate::storage::MemoryStore;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    fn context() -> ApiContext {
        let runtime = CondaRuntime::new("/nonexistent/conda", vec!["base".into()]);
        let lifecycle = SessionLifecycle::new(
            Arc::new(MemoryStore::new()),
            ScanDispatcher::new(Arc::new(runtime)),
            2,
            Duration::from_millis(200),
        );
        ApiContext {
            lifecycle,
            models: OllamaCatalog::new("/nonexistent/ollama"),
        }
    }

    fn body_json(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn root_reports_api_name() {
        let res = warp::test::request()
            .path("/api/")
            .reply(&api_routes(context()))
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_json(res.body())["message"],
            "LLM Vulnerability Scanner API"
        );
    }

    #[tokio::test]
    async fn enumeration_degrades_to_empty_lists() {
        let routes = api_routes(context());
        let res = warp::test::request()
            .path("/api/environments")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body())["environments"], serde_json::json!([]));

        let res = warp::test::request().path("/api/models").reply(&routes).await;
        assert_eq!(body_json(res.body())["models"], serde_json::json!([]));

        let res = warp::test::request().path("/api/probes").reply(&routes).await;
        let probes = body_json(res.body());
        assert_eq!(probes["probes"][0], "test.Test");
    }

    #[tokio::test]
    async fn create_scan_then_fetch_it() {
        let routes = api_routes(context());
        let res = warp::test::request()
            .method("POST")
            .path("/api/scan")
            .json(&serde_json::json!({
                "environment": "sec_env",
                "model_name": "llama3",
                "probes": ["test.Test"],
                "tool": "garak"
            }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let created = body_json(res.body());
        assert_eq!(created["status"], "created");
        let id = created["session_id"].as_str().unwrap().to_string();

        let res = warp::test::request()
            .path(&format!("/api/sessions/{}", id))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let session = body_json(res.body());
        assert_eq!(session["status"], "pending");
        assert_eq!(session["tool"], "garak");

        let res = warp::test::request().path("/api/sessions").reply(&routes).await;
        assert_eq!(body_json(res.body()).as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_scan_request_is_unprocessable() {
        let routes = api_routes(context());
        let res = warp::test::request()
            .method("POST")
            .path("/api/scan")
            .json(&serde_json::json!({
                "environment": "sec_env",
                "model_name": "llama3",
                "tool": "promptmap"
            }))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(res.body())["message"],
            "A working directory is required for Promptmap"
        );

        let res = warp::test::request().path("/api/sessions").reply(&routes).await;
        assert_eq!(body_json(res.body()), serde_json::json!([]));
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let res = warp::test::request()
            .method("POST")
            .path("/api/scan")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&api_routes(context()))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_sessions_are_not_found() {
        let routes = api_routes(context());
        for path in [
            format!("/api/sessions/{}", Uuid::new_v4()),
            "/api/sessions/not-a-uuid".to_string(),
        ] {
            let res = warp::test::request().path(&path).reply(&routes).await;
            assert_eq!(res.status(), StatusCode::NOT_FOUND);
        }

        let res = warp::test::request()
            .method("POST")
            .path(&format!("/api/scan/{}/cancel", Uuid::new_v4()))
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancelling_pending_session_conflicts() {
        let ctx = context();
        let session = ctx
            .lifecycle
            .create_session(ScanRequest {
                environment: "sec_env".into(),
                model_name: "llama3".into(),
                probes: vec!["test.Test".into()],
                tool: "garak".into(),
                working_directory: None,
            })
            .await
            .unwrap();
        let res = warp::test::request()
            .method("POST")
            .path(&format!("/api/scan/{}/cancel", session.id))
            .reply(&api_routes(ctx))
            .await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn ws_unknown_session_gets_not_found_and_close() {
        let mut client = warp::test::ws()
            .path(&format!("/api/ws/scan/{}", Uuid::new_v4()))
            .handshake(api_routes(context()))
            .await
            .unwrap();
        let msg = client.recv().await.unwrap();
        assert_eq!(msg.to_str().unwrap(), "❌ Session not found");
        assert!(client.recv_closed().await.is_ok());
    }

    #[tokio::test]
    async fn ws_scan_with_unavailable_runtime_fails_session() {
        let ctx = context();
        let session = ctx
            .lifecycle
            .create_session(ScanRequest {
                environment: "sec_env".into(),
                model_name: "llama3".into(),
                probes: vec!["test.Test".into()],
                tool: "garak".into(),
                working_directory: None,
            })
            .await
            .unwrap();

        let mut client = warp::test::ws()
            .path(&format!("/api/ws/scan/{}", session.id))
            .handshake(api_routes(ctx.clone()))
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Ok(msg) = client.recv().await {
            match msg.to_str() {
                Ok(text) => lines.push(text.to_string()),
                Err(_) => break,
            }
        }
        assert_eq!(lines[0], "🚀 Starting Garak scan...");
        assert!(lines
            .last()
            .unwrap()
            .starts_with("❌ Tool runtime not available"));

        let stored = ctx.lifecycle.get_session(session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert!(stored.completed_at.is_some());
    }
}
