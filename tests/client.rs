mod common;

use axum::response::{IntoResponse, Redirect};
use axum::routing::post;
use axum::{Json, Router};
use common::Upstream;
use meteo_exporter::client::{token_has_expired, AuthenticatedClient, ClientError, HttpOptions};
use reqwest::{Method, StatusCode, Url};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const OBSERVATIONS: &str = r#"[{"t":293.15,"u":60,"rr_per":0,"ff":3.2}]"#;

#[tokio::test]
async fn test_request_obtains_token_first() {
    let up = Arc::new(Upstream::new(OBSERVATIONS));
    let (token_url, station_url) = common::start(up.clone()).await;
    let mut client = common::client(token_url);

    assert_eq!(None, client.token());
    let res = client.request(Method::GET, station_url).await.unwrap();

    assert_eq!(StatusCode::OK, res.status);
    assert_eq!(OBSERVATIONS, res.body);
    assert_eq!(1, up.token_calls());
    assert_eq!(1, up.station_calls());
    assert_eq!(vec!["Bearer abc".to_owned()], up.seen_auth());
    assert_eq!(Some("Bearer abc"), client.token());
}

#[tokio::test]
async fn test_request_reuses_held_token() {
    let up = Arc::new(Upstream::new(OBSERVATIONS));
    let (token_url, station_url) = common::start(up.clone()).await;
    let mut client = common::client(token_url);

    client.request(Method::GET, station_url.clone()).await.unwrap();
    client.request(Method::GET, station_url.clone()).await.unwrap();
    client.request(Method::GET, station_url).await.unwrap();

    assert_eq!(1, up.token_calls());
    assert_eq!(3, up.station_calls());
}

#[tokio::test]
async fn test_request_refreshes_expired_token_once() {
    let up = Arc::new(Upstream {
        tokens: vec!["abc", "def"],
        expired: 1,
        ..Upstream::new(OBSERVATIONS)
    });
    let (token_url, station_url) = common::start(up.clone()).await;
    let mut client = common::client(token_url);

    let res = client.request(Method::GET, station_url).await.unwrap();

    assert_eq!(StatusCode::OK, res.status);
    assert_eq!(2, up.token_calls());
    assert_eq!(2, up.station_calls());
    assert_eq!(vec!["Bearer abc".to_owned(), "Bearer def".to_owned()], up.seen_auth());
    assert_eq!(Some("Bearer def"), client.token());
}

#[tokio::test]
async fn test_request_returns_second_expired_response() {
    let up = Arc::new(Upstream {
        tokens: vec!["abc", "def", "ghi"],
        expired: usize::MAX,
        ..Upstream::new(OBSERVATIONS)
    });
    let (token_url, station_url) = common::start(up.clone()).await;
    let mut client = common::client(token_url);

    let res = client.request(Method::GET, station_url).await.unwrap();

    assert_eq!(StatusCode::UNAUTHORIZED, res.status);
    assert!(token_has_expired(&res));
    assert_eq!(2, up.token_calls());
    assert_eq!(2, up.station_calls());
}

#[tokio::test]
async fn test_request_missing_access_token() {
    let up = Arc::new(Upstream {
        token_body: Some(r#"{"error":"invalid_client"}"#),
        ..Upstream::new(OBSERVATIONS)
    });
    let (token_url, station_url) = common::start(up.clone()).await;
    let mut client = common::client(token_url);

    let res = client.request(Method::GET, station_url).await;

    assert!(matches!(res, Err(ClientError::Authentication(_))));
    assert_eq!(1, up.token_calls());
    assert_eq!(0, up.station_calls());
    assert_eq!(None, client.token());
}

#[tokio::test]
async fn test_request_token_endpoint_unavailable() {
    let up = Arc::new(Upstream::new(OBSERVATIONS));
    let (_, station_url) = common::start(up.clone()).await;
    let missing = station_url.join("/does-not-exist").unwrap();
    let mut client = common::client(missing);

    let res = client.request(Method::GET, station_url).await;

    assert!(matches!(res, Err(ClientError::Authentication(_))));
    assert_eq!(0, up.station_calls());
}

async fn redirected_token_server(issued: Arc<AtomicUsize>) -> Url {
    let app = Router::new()
        .route("/token", post(|| async { Redirect::temporary("/token2") }))
        .route(
            "/token2",
            post(move || async move {
                issued.fetch_add(1, Ordering::SeqCst);
                Json(serde_json::json!({ "access_token": "zzz" })).into_response()
            }),
        );

    let addr = common::serve(app).await;
    Url::parse(&format!("http://{}/token", addr)).unwrap()
}

fn options(follow_redirects: bool) -> HttpOptions {
    HttpOptions {
        timeout: Duration::from_secs(5),
        accept_invalid_certs: false,
        follow_redirects,
    }
}

#[tokio::test]
async fn test_http_options_redirect_policy() {
    let issued = Arc::new(AtomicUsize::new(0));
    let token_url = redirected_token_server(issued.clone()).await;

    let res = options(false).build().unwrap().post(token_url.clone()).send().await.unwrap();
    assert_eq!(StatusCode::TEMPORARY_REDIRECT, res.status());
    assert_eq!(0, issued.load(Ordering::SeqCst));

    let res = options(true).build().unwrap().post(token_url).send().await.unwrap();
    assert_eq!(StatusCode::OK, res.status());
    assert_eq!(1, issued.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_request_token_endpoint_redirect_not_followed() {
    let issued = Arc::new(AtomicUsize::new(0));
    let token_url = redirected_token_server(issued.clone()).await;
    let up = Arc::new(Upstream::new(OBSERVATIONS));
    let (_, station_url) = common::start(up.clone()).await;

    let mut client = AuthenticatedClient::new(
        options(true).build().unwrap(),
        options(false).build().unwrap(),
        token_url,
        common::APPLICATION_ID.to_owned(),
    );

    let res = client.request(Method::GET, station_url).await;

    assert!(matches!(res, Err(ClientError::Authentication(_))));
    assert_eq!(0, issued.load(Ordering::SeqCst));
    assert_eq!(0, up.station_calls());
    assert_eq!(None, client.token());
}

#[tokio::test]
async fn test_request_transport_error_not_retried() {
    let up = Arc::new(Upstream::new(OBSERVATIONS));
    let (token_url, _) = common::start(up.clone()).await;

    // Bind then drop a listener to get a local port with nothing accepting on it.
    let closed: SocketAddr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let station_url = Url::parse(&format!("http://{}/station", closed)).unwrap();
    let mut client = common::client(token_url);

    let res = client.request(Method::GET, station_url).await;

    assert!(matches!(res, Err(ClientError::Internal(_))));
    assert_eq!(1, up.token_calls());
    assert_eq!(Some("Bearer abc"), client.token());
}
