//! Shared test utilities for fwmgmt-groups integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use fwmgmt_groups::client::SESSION_HEADER;
use fwmgmt_groups::payload::{ApiFailure, DeleteGroupRequest, SetGroupRequest, ShowGroupRequest};
use fwmgmt_groups::store::OBJECT_NOT_FOUND_CODE;
use fwmgmt_groups::{ClientConfig, GroupStore, MemoryGroupStore, MgmtClient, StoreError};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const TEST_USER: &str = "admin";
pub const TEST_PASSWORD: &str = "secret";
pub const TEST_SID: &str = "sid-0123456789";

/// Group uid whose show-group answer is missing required fields.
pub const BROKEN_GROUP_UID: &str = "broken";

struct MockState {
    store: Arc<MemoryGroupStore>,
}

fn failure(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ApiFailure {
            code: Some(code.to_string()),
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn check_session(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(TEST_SID) => Ok(()),
        _ => Err(failure(
            StatusCode::UNAUTHORIZED,
            "generic_err_wrong_session_id",
            "Wrong session id [missing]. Session may be expired. Please check session id and resend the request.",
        )),
    }
}

fn respond<T: Serialize>(result: Result<T, StoreError>) -> Response {
    match result {
        Ok(body) => Json(body).into_response(),
        Err(StoreError::Rejected { code, message }) => {
            let status = if code.as_deref() == Some(OBJECT_NOT_FOUND_CODE) {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::BAD_REQUEST
            };
            (status, Json(ApiFailure { code, message })).into_response()
        }
        Err(e) => failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "generic_error",
            &e.to_string(),
        ),
    }
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["user"] == TEST_USER && body["password"] == TEST_PASSWORD {
        Json(json!({ "sid": TEST_SID, "api-server-version": "1.9" })).into_response()
    } else {
        failure(
            StatusCode::BAD_REQUEST,
            "err_login_failed",
            "Authentication to server failed.",
        )
    }
}

async fn logout(headers: HeaderMap) -> Response {
    if let Err(resp) = check_session(&headers) {
        return resp;
    }
    Json(json!({ "message": "OK" })).into_response()
}

async fn set_group(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(request): Json<SetGroupRequest>,
) -> Response {
    if let Err(resp) = check_session(&headers) {
        return resp;
    }
    respond(state.store.upsert_group(&request).await)
}

async fn show_group(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(request): Json<ShowGroupRequest>,
) -> Response {
    if let Err(resp) = check_session(&headers) {
        return resp;
    }
    if request.uid == BROKEN_GROUP_UID {
        return Json(json!({ "name": "no-uid" })).into_response();
    }
    respond(state.store.fetch_group(&request.uid).await)
}

async fn delete_group(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(request): Json<DeleteGroupRequest>,
) -> Response {
    if let Err(resp) = check_session(&headers) {
        return resp;
    }
    respond(
        state
            .store
            .delete_group(&request.uid)
            .await
            .map(|_| json!({ "message": "OK" })),
    )
}

/// Mock management server backed by a [`MemoryGroupStore`].
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<MemoryGroupStore>,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    /// Spawn a server on an ephemeral port.
    pub async fn spawn(store: Arc<MemoryGroupStore>) -> Self {
        let state = Arc::new(MockState {
            store: store.clone(),
        });

        let router = Router::new()
            .route("/web_api/login", post(login))
            .route("/web_api/logout", post(logout))
            .route("/web_api/set-group", post(set_group))
            .route("/web_api/show-group", post(show_group))
            .route("/web_api/delete-group", post(delete_group))
            .with_state(state);

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
        let actual_addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr: actual_addr,
            store,
            shutdown_tx,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/web_api", self.addr)
    }

    /// Client config with valid credentials.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.base_url());
        config.username = Some(TEST_USER.to_string());
        config.password = Some(TEST_PASSWORD.to_string());
        config
    }

    /// Logged-in client.
    pub async fn client(&self) -> MgmtClient {
        let client = MgmtClient::new(self.client_config()).expect("Failed to build client");
        client.login().await.expect("Login failed");
        client
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Store with a group `G1` (`g-1`) that already holds `Old` (`m-0`), plus
/// free objects `M1` (`m-1`), `M2` (`m-2`) and the service `http` (`s-1`).
pub async fn seeded_store() -> MemoryGroupStore {
    let store = MemoryGroupStore::new();
    store.add_object("m-0", "Old", Some("host")).await;
    store.add_object("m-1", "M1", Some("host")).await;
    store.add_object("m-2", "M2", Some("network")).await;
    store.add_object("s-1", "http", Some("service-tcp")).await;
    store
        .add_group("g-1", "G1", &["Old"])
        .await
        .expect("Failed to seed group");
    store
}
