use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::engine::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/agents",
            get(handlers::list_agents).post(handlers::register_agent),
        )
        .route(
            "/agents/:id",
            get(handlers::get_agent).delete(handlers::deactivate_agent),
        )
        .route("/agents/:id/run", post(handlers::run_agent))
        .route(
            "/agents/:id/webhook",
            post(handlers::agent_webhook).get(handlers::agent_webhook),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    log::info!("Muninn webhook server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::capabilities::CapabilityRegistry;
    use crate::engine::scheduler::SchedulerConfig;
    use crate::storage::InMemoryStore;
    use crate::types::AgentRecord;

    fn create_test_app() -> (Router, Scheduler) {
        let scheduler = Scheduler::new(
            Arc::new(InMemoryStore::new()),
            CapabilityRegistry::with_builtins(),
            SchedulerConfig::default(),
        );
        let state = AppState {
            scheduler: scheduler.clone(),
        };
        (create_router(state), scheduler)
    }

    async fn register(scheduler: &Scheduler, name: &str, kind: &str) -> AgentRecord {
        scheduler
            .registry()
            .register(name, kind, json!({}), None)
            .await
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_register_agent_with_sources() {
        let (app, scheduler) = create_test_app();
        let source = register(&scheduler, "source", "emitter").await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/agents")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "name": "collector",
                            "kind": "aggregate",
                            "sources": [source.id],
                            "interval_secs": 30
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = read_json(response).await;
        assert_eq!(json["name"], "collector");
        assert_eq!(json["interval_secs"], 30);

        let listeners = scheduler
            .router()
            .graph()
            .listeners(&source)
            .await
            .unwrap();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].name, "collector");
    }

    #[tokio::test]
    async fn test_register_unknown_kind_is_bad_request() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/agents")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name": "x", "kind": "teleporter"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_rejects_unusable_interval() {
        let (app, scheduler) = create_test_app();

        for interval in [json!(0), json!(-1), json!(10_000_000_000_000i64), json!(i64::MAX)] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/agents")
                        .header("content-type", "application/json")
                        .body(Body::from(
                            json!({
                                "name": "ticker",
                                "kind": "emitter",
                                "interval_secs": interval
                            })
                            .to_string(),
                        ))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let agents = scheduler
            .registry()
            .list(&crate::types::AgentFilter::default().including_inactive())
            .await
            .unwrap();
        assert!(agents.is_empty());
    }

    #[tokio::test]
    async fn test_list_agents_excludes_inactive_by_default() {
        let (app, scheduler) = create_test_app();
        register(&scheduler, "kept", "aggregate").await;
        let gone = register(&scheduler, "gone", "aggregate").await;
        scheduler.registry().deactivate(gone.id).await.unwrap();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/agents").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["name"], "kept");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/agents?include_inactive=true")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(read_json(response).await.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_agent_not_found() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/agents/00000000-0000-0000-0000-000000000000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deactivate_agent() {
        let (app, scheduler) = create_test_app();
        let agent = register(&scheduler, "retiring", "aggregate").await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/agents/{}", agent.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["is_active"], false);
    }

    #[tokio::test]
    async fn test_run_agent_reports_outcome() {
        let (app, scheduler) = create_test_app();
        let agent = scheduler
            .registry()
            .register("once", "emitter", json!({"data": "hello"}), None)
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/agents/{}/run", agent.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["consumed"], 0);
    }

    #[tokio::test]
    async fn test_webhook_is_delivered_to_capability() {
        let (app, scheduler) = create_test_app();
        let agent = register(&scheduler, "hook", "webhook_echo").await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/agents/{}/webhook?token=abc", agent.id))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"ping": 1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["method"], "POST");
        assert_eq!(json["query"]["token"], "abc");
        assert_eq!(json["body"]["ping"], 1);

        let after = scheduler.registry().get(agent.id).await.unwrap();
        assert!(!after.is_running);
        assert!(after.last_run.is_some());
    }

    #[tokio::test]
    async fn test_webhook_to_unknown_or_inactive_agent() {
        let (app, scheduler) = create_test_app();
        let agent = register(&scheduler, "hook", "webhook_echo").await;
        scheduler.registry().deactivate(agent.id).await.unwrap();

        for id in [agent.id, uuid::Uuid::new_v4()] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(format!("/agents/{}/webhook", id))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_webhook_to_capability_without_support() {
        let (app, scheduler) = create_test_app();
        let agent = register(&scheduler, "plain", "aggregate").await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/agents/{}/webhook", agent.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
