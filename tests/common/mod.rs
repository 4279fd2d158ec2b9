#![allow(dead_code)]

use axum::extract::{Form, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use meteo_exporter::client::{AuthenticatedClient, HttpOptions};
use reqwest::Url;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const APPLICATION_ID: &str = "YXBwOnNlY3JldA==";

pub const EXPIRED_BODY: &str = r#"{"code":"900901","message":"Invalid Credentials","description":"Invalid JWT token. Make sure you have provided the correct security credentials"}"#;

/// Fake token endpoint and station API. Tokens are handed out in order, the last one
/// repeating. The first `expired` station requests are answered with an expired token error.
#[derive(Debug, Default)]
pub struct Upstream {
    pub tokens: Vec<&'static str>,
    pub token_body: Option<&'static str>,
    pub expired: usize,
    pub station_body: String,
    pub token_calls: AtomicUsize,
    pub station_calls: AtomicUsize,
    pub seen_auth: Mutex<Vec<String>>,
    pub seen_stations: Mutex<Vec<String>>,
}

impl Upstream {
    pub fn new(station_body: &str) -> Self {
        Upstream {
            tokens: vec!["abc"],
            station_body: station_body.to_owned(),
            ..Default::default()
        }
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn station_calls(&self) -> usize {
        self.station_calls.load(Ordering::SeqCst)
    }

    pub fn seen_auth(&self) -> Vec<String> {
        self.seen_auth.lock().unwrap().clone()
    }
}

async fn token(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = up.token_calls.fetch_add(1, Ordering::SeqCst);

    let auth = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()).unwrap_or("");
    let grant_type = form.get("grant_type").map(String::as_str);
    if auth != format!("Basic {}", APPLICATION_ID) || grant_type != Some("client_credentials") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    if let Some(body) = up.token_body {
        return ([(CONTENT_TYPE, "application/json")], body).into_response();
    }

    let token = up.tokens[n.min(up.tokens.len() - 1)];
    Json(serde_json::json!({
        "access_token": token,
        "scope": "default",
        "token_type": "Bearer",
        "expires_in": 3600,
    }))
    .into_response()
}

async fn station(
    State(up): State<Arc<Upstream>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let n = up.station_calls.fetch_add(1, Ordering::SeqCst);

    let auth = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()).unwrap_or("");
    up.seen_auth.lock().unwrap().push(auth.to_owned());
    up.seen_stations
        .lock()
        .unwrap()
        .push(query.get("id_station").cloned().unwrap_or_default());

    if n < up.expired {
        return (StatusCode::UNAUTHORIZED, [(CONTENT_TYPE, "application/json")], EXPIRED_BODY).into_response();
    }

    (StatusCode::OK, [(CONTENT_TYPE, "application/json")], up.station_body.clone()).into_response()
}

/// Serve the router on an ephemeral local port, returning the bound address.
pub async fn serve(app: Router) -> SocketAddr {
    let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(app.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}

/// Start the fake upstream, returning the token and station URLs.
pub async fn start(up: Arc<Upstream>) -> (Url, Url) {
    let app = Router::new()
        .route("/token", post(token))
        .route("/station", get(station))
        .with_state(up);

    let addr = serve(app).await;
    let token_url = Url::parse(&format!("http://{}/token", addr)).unwrap();
    let station_url = Url::parse(&format!("http://{}/station", addr)).unwrap();
    (token_url, station_url)
}

pub fn client(token_url: Url) -> AuthenticatedClient {
    let options = HttpOptions {
        timeout: Duration::from_secs(5),
        accept_invalid_certs: false,
        follow_redirects: true,
    };
    let token_options = HttpOptions {
        follow_redirects: false,
        ..options
    };

    AuthenticatedClient::new(
        options.build().unwrap(),
        token_options.build().unwrap(),
        token_url,
        APPLICATION_ID.to_owned(),
    )
}
