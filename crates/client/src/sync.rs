//! HTTP delivery of queued mutations.
//!
//! Each mutation is POSTed as JSON with its id in an `Idempotency-Key` header
//! so the remote can recognise a replay.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::fetch::{FetchConfig, build_http, transport_error};
use binsync_core::queue::Delivery;
use binsync_core::{Error, QueuedMutation, RemoteSink};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MutationBody<'a> {
    id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_key: Option<&'a str>,
    payload: &'a Value,
    created_at: DateTime<Utc>,
}

/// Interpret the remote's status code.
///
/// 2xx means applied, 409 means already applied under this id.
pub fn delivery_for_status(status: StatusCode) -> Result<Delivery, Error> {
    if status.is_success() {
        Ok(Delivery::Accepted)
    } else if status == StatusCode::CONFLICT {
        Ok(Delivery::Duplicate)
    } else {
        Err(Error::RemoteRejected(format!("status {}", status.as_u16())))
    }
}

/// [`RemoteSink`] that POSTs to a sync endpoint.
pub struct HttpSink {
    http: Client,
    endpoint: Url,
}

impl HttpSink {
    pub fn new(endpoint: &str, config: &FetchConfig) -> Result<Self, Error> {
        let endpoint = Url::parse(endpoint).map_err(|e| Error::InvalidUrl(format!("sync endpoint: {e}")))?;
        Ok(Self { http: build_http(config)?, endpoint })
    }

}

#[async_trait]
impl RemoteSink for HttpSink {
    async fn deliver(&self, mutation: &QueuedMutation) -> Result<Delivery, Error> {
        let body = MutationBody {
            id: &mutation.id,
            entity_key: mutation.entity_key.as_deref(),
            payload: &mutation.payload,
            created_at: mutation.created_at,
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("Idempotency-Key", &mutation.id)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let delivery = delivery_for_status(response.status());
        tracing::debug!(id = %mutation.id, status = response.status().as_u16(), "sync endpoint answered");
        delivery
    }
}

/// [`RemoteSink`] used when no sync endpoint is configured.
///
/// Every delivery fails as a network error, so mutations stay queued with
/// their attempt count rising until an endpoint is set.
#[derive(Debug, Default)]
pub struct UnconfiguredSink;

#[async_trait]
impl RemoteSink for UnconfiguredSink {
    async fn deliver(&self, _mutation: &QueuedMutation) -> Result<Delivery, Error> {
        Err(Error::Network("no sync endpoint configured".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router as HttpRouter;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::post;
    use binsync_core::queue::MutationState;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Remote {
        seen: Arc<Mutex<HashSet<String>>>,
        bodies: Arc<Mutex<Vec<Value>>>,
    }

    async fn accept(State(remote): State<Remote>, headers: HeaderMap, body: axum::Json<Value>) -> HttpStatus {
        let key = headers.get("idempotency-key").and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
        if !remote.seen.lock().unwrap().insert(key) {
            return HttpStatus::CONFLICT;
        }
        remote.bodies.lock().unwrap().push(body.0);
        HttpStatus::CREATED
    }

    async fn serve(remote: Remote) -> String {
        let app = HttpRouter::new()
            .route("/sync", post(accept))
            .route("/down", post(|| async { HttpStatus::SERVICE_UNAVAILABLE }))
            .with_state(remote);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn mutation(id: &str) -> QueuedMutation {
        QueuedMutation {
            seq: 1,
            id: id.into(),
            entity_key: Some("entry-1".into()),
            payload: json!({"category": "glass", "weightKg": 1.5}),
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
            state: MutationState::InFlight,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(delivery_for_status(StatusCode::OK).unwrap(), Delivery::Accepted);
        assert_eq!(delivery_for_status(StatusCode::NO_CONTENT).unwrap(), Delivery::Accepted);
        assert_eq!(delivery_for_status(StatusCode::CONFLICT).unwrap(), Delivery::Duplicate);
        assert!(matches!(delivery_for_status(StatusCode::BAD_GATEWAY), Err(Error::RemoteRejected(_))));
    }

    #[tokio::test]
    async fn test_post_then_replay_is_duplicate() {
        let remote = Remote::default();
        let base = serve(remote.clone()).await;
        let sink = HttpSink::new(&format!("{base}/sync"), &FetchConfig::default()).unwrap();

        assert_eq!(sink.deliver(&mutation("m-1")).await.unwrap(), Delivery::Accepted);
        assert_eq!(sink.deliver(&mutation("m-1")).await.unwrap(), Delivery::Duplicate);

        let bodies = remote.bodies.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["id"], "m-1");
        assert_eq!(bodies[0]["entityKey"], "entry-1");
        assert_eq!(bodies[0]["payload"]["weightKg"], 1.5);
    }

    #[tokio::test]
    async fn test_server_error_is_failure() {
        let base = serve(Remote::default()).await;
        let sink = HttpSink::new(&format!("{base}/down"), &FetchConfig::default()).unwrap();
        assert!(matches!(sink.deliver(&mutation("m-2")).await, Err(Error::RemoteRejected(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = HttpSink::new(&format!("http://{addr}/sync"), &FetchConfig::default()).unwrap();
        let err = sink.deliver(&mutation("m-3")).await.unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn test_unconfigured_sink_never_acknowledges() {
        let err = UnconfiguredSink.deliver(&mutation("m-4")).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }
}
