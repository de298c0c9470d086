// Shared helpers for driving a real loopback listener from integration tests.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use auth_client::interface_adapters::clients::{ProviderClient, TokenExchangeSettings};
use auth_client::interface_adapters::host::{BrowserCommand, LoopbackHost};
use auth_client::interface_adapters::routes;
use auth_client::interface_adapters::state::{AppState, InMemorySessionStore, SystemClock};
use auth_client::use_cases::{HandshakeCoordinator, HandshakeSettings, ProviderSettings};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use url::Url;

// Authorization code the fake provider accepts.
pub const GOOD_CODE: &str = "good-code";

pub type TestCoordinator = HandshakeCoordinator<LoopbackHost, InMemorySessionStore, SystemClock>;

pub struct Harness {
    pub base_url: String,
    pub coordinator: Arc<TestCoordinator>,
    pub store: InMemorySessionStore,
}

// A "browser" that stays open until killed; `sh -c <script> sh <url>` keeps the URL out of the script.
fn long_lived_window() -> BrowserCommand {
    BrowserCommand {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), "sleep 30".to_string(), "sh".to_string()],
        detached: false,
    }
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr = listener.local_addr().expect("get local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server failed");
    });
    format!("http://{addr}")
}

// Token and userinfo endpoints standing in for the identity provider.
fn fake_provider() -> Router {
    Router::new()
        .route(
            "/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                if form.get("code").map(String::as_str) == Some(GOOD_CODE) {
                    Json(json!({"access_token": "token-abc", "token_type": "Bearer"}))
                        .into_response()
                } else {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": "invalid_grant", "error_description": "Code expired"})),
                    )
                        .into_response()
                }
            }),
        )
        .route(
            "/userinfo",
            get(|headers: HeaderMap| async move {
                let authorized = headers
                    .get(AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    == Some("Bearer token-abc");
                if authorized {
                    Json(json!({"sub": "u-1", "name": "Ada", "email": "ada@example.com"}))
                        .into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        )
}

// Bind an ephemeral loopback listener, serve the routes and wire a coordinator to it.
pub async fn start() -> Harness {
    let provider_url = serve(fake_provider()).await;

    // The listener must exist before its origin can be known.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    let addr = listener.local_addr().expect("get local addr");
    let base_url = format!("http://{addr}");

    let exchange = ProviderClient::new(
        TokenExchangeSettings {
            token_url: Url::parse(&format!("{provider_url}/token")).expect("expected token url"),
            userinfo_url: Url::parse(&format!("{provider_url}/userinfo"))
                .expect("expected userinfo url"),
            client_id: "client-123".to_string(),
            redirect_uri: format!("{base_url}/auth/callback"),
            scopes: vec!["openid".to_string()],
        },
        Duration::from_secs(5),
    )
    .expect("expected provider client to build");

    let host = LoopbackHost::new(base_url.clone(), long_lived_window());
    let app = routes::app(AppState {
        host: host.clone(),
        exchange: Arc::new(exchange),
    });
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("loopback server failed");
    });

    let store = InMemorySessionStore::default();
    let mut settings = HandshakeSettings::new(ProviderSettings {
        authorize_endpoint: Url::parse("https://idp.example.com/authorize")
            .expect("expected endpoint to parse"),
        client_id: "client-123".to_string(),
        redirect_uri: format!("{base_url}/auth/callback"),
        scopes: vec!["openid".to_string()],
    });
    settings.poll_interval = Duration::from_millis(100);
    settings.attempt_timeout = Duration::from_secs(10);

    let coordinator = Arc::new(HandshakeCoordinator::new(
        host,
        store.clone(),
        SystemClock,
        settings,
    ));

    Harness {
        base_url,
        coordinator,
        store,
    }
}

// Post a message until a listener is registered to receive it.
pub async fn post_when_listening(base_url: &str, origin: &str, body: &Value) -> u64 {
    let client = reqwest::Client::new();
    for _ in 0..100 {
        let res = client
            .post(format!("{base_url}/auth/message"))
            .header("origin", origin)
            .json(body)
            .send()
            .await
            .expect("request should succeed");
        let payload: Value = res.json().await.expect("expected json body");
        let delivered = payload["delivered"].as_u64().unwrap_or_default();
        if delivered > 0 {
            return delivered;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no listener registered in time");
}
