//! End-to-end HTTP tests: the router is served on an ephemeral port and
//! driven with raw HTTP/1.1 requests.

use acled_core::{
    config::AppConfig,
    store::{NewConflict, Store},
};
use acled_server::{build_router, AppState};
use chrono::Utc;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn seed(store: &Store) {
    let now = Utc::now();
    for (country, region, score) in [
        ("Kenya", "Nairobi", 7.0),
        ("Kenya", "Mombasa", 4.0),
        ("Kenya", "Kisumu", 3.0),
        ("Uganda", "Kampala", 5.0),
        ("Uganda", "Jinja", 2.0),
    ] {
        store
            .insert_conflict(
                &NewConflict {
                    country: country.into(),
                    region: region.into(),
                    population: Some(250_000),
                    event_count: 12,
                    severity_score: score,
                },
                now,
            )
            .expect("seed row");
    }
}

async fn start(config: AppConfig) -> (SocketAddr, AppState) {
    let state = AppState::new(config).expect("app state");
    seed(&state.open_store().expect("seed connection"));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, state)
}

async fn send(
    addr: SocketAddr,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<&str>,
) -> (u16, Value) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(token) = token {
        req.push_str(&format!("Authorization: Bearer {token}\r\n"));
    }
    let payload = body.unwrap_or("");
    if body.is_some() {
        req.push_str("Content-Type: application/json\r\n");
    }
    req.push_str(&format!("Content-Length: {}\r\n\r\n{payload}", payload.len()));
    stream.write_all(req.as_bytes()).await.expect("write request");

    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response must have separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("http status");
    let json = serde_json::from_str(body).unwrap_or(Value::Null);
    (status, json)
}

async fn login(addr: SocketAddr, username: &str) -> String {
    let creds = format!(r#"{{"username":"{username}","password":"secret#123"}}"#);
    let (status, _) = send(addr, "POST", "/auth/register", None, Some(&creds)).await;
    assert_eq!(status, 201);
    let (status, body) = send(addr, "POST", "/auth/login", None, Some(&creds)).await;
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["token_type"], "Bearer");
    body["access_token"].as_str().expect("token").to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn health_and_risk_score() {
    let (addr, _) = start(AppConfig::default_test()).await;

    let (status, body) = send(addr, "GET", "/health", None, None).await;
    assert_eq!((status, body["status"].as_str()), (200, Some("ok")));

    let (status, first) = send(addr, "GET", "/conflictdata/Kenya/riskscore", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(first["country"], "Kenya");
    let avg = first["avg_score"].as_f64().expect("avg_score");
    assert!((avg - 14.0 / 3.0).abs() < 1e-9, "got {avg}");

    let (_, second) = send(addr, "GET", "/conflictdata/Kenya/riskscore", None, None).await;
    assert_eq!(first["computed_at"], second["computed_at"]);

    let (status, body) = send(addr, "GET", "/conflictdata/Atlantis/riskscore", None, None).await;
    assert_eq!(status, 404);
    assert!(body["error"].as_str().unwrap_or_default().contains("Atlantis"));
}

#[tokio::test(flavor = "multi_thread")]
async fn listing_and_country_lookup() {
    let (addr, _) = start(AppConfig::default_test()).await;

    let (status, page) = send(addr, "GET", "/conflictdata?page=1&per_page=2", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(page["total"], 5);
    assert_eq!(page["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(page["data"][0]["admin1"], "Kisumu");

    let (status, _) = send(addr, "GET", "/conflictdata?per_page=101", None, None).await;
    assert_eq!(status, 400);
    let (status, _) = send(addr, "GET", "/conflictdata?page=abc", None, None).await;
    assert_eq!(status, 400);

    let (status, one) = send(addr, "GET", "/conflictdata/Uganda", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(one["country"], "Uganda");
    assert_eq!(one["admin1_entries"].as_array().map(Vec::len), Some(2));

    let (status, many) = send(addr, "GET", "/conflictdata/Kenya,Uganda", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(many.as_array().map(Vec::len), Some(2));

    let (status, trailing) = send(addr, "GET", "/conflictdata/Kenya,", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(trailing.as_array().map(Vec::len), Some(2));

    let (status, _) = send(addr, "GET", "/conflictdata/Atlantis", None, None).await;
    assert_eq!(status, 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_and_feedback_flow() {
    let (addr, _) = start(AppConfig::default_test()).await;
    let creds = r#"{"username":"alice","password":"secret#123"}"#;

    let (status, body) = send(addr, "POST", "/auth/register", None, Some(creds)).await;
    assert_eq!(status, 201);
    assert_eq!(body["username"], "alice");
    assert!(body.get("password_hash").is_none());

    let (status, _) = send(addr, "POST", "/auth/register", None, Some(creds)).await;
    assert_eq!(status, 409);
    let weak = r#"{"username":"bob","password":"password1"}"#;
    let (status, _) = send(addr, "POST", "/auth/register", None, Some(weak)).await;
    assert_eq!(status, 400);
    let wrong = r#"{"username":"alice","password":"wrong#pass"}"#;
    let (status, _) = send(addr, "POST", "/auth/login", None, Some(wrong)).await;
    assert_eq!(status, 401);

    let (_, token) = send(addr, "POST", "/auth/login", None, Some(creds)).await;
    let token = token["access_token"].as_str().expect("token").to_string();

    let text = r#"{"text":"Checkpoints reopened on the northern highway."}"#;
    let (status, _) = send(addr, "POST", "/conflictdata/Nairobi/userfeedback", None, Some(text)).await;
    assert_eq!(status, 401);
    let (status, entry) =
        send(addr, "POST", "/conflictdata/Nairobi/userfeedback", Some(&token), Some(text)).await;
    assert_eq!(status, 201);
    assert_eq!(entry["country"], "Kenya");
    assert_eq!(entry["admin1"], "Nairobi");

    let short = r#"{"text":"too short"}"#;
    let (status, _) =
        send(addr, "POST", "/conflictdata/Nairobi/userfeedback", Some(&token), Some(short)).await;
    assert_eq!(status, 400);
    let (status, _) =
        send(addr, "POST", "/conflictdata/Gotham/userfeedback", Some(&token), Some(text)).await;
    assert_eq!(status, 404);

    let (status, listed) = send(addr, "GET", "/conflictdata/Nairobi/userfeedback", None, None).await;
    assert_eq!(status, 200);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_is_admin_only() {
    let (addr, state) = start(AppConfig::default_test()).await;
    let body = r#"{"country":"Kenya","admin1":"Nairobi"}"#;

    let (status, _) = send(addr, "DELETE", "/conflictdata", None, Some(body)).await;
    assert_eq!(status, 401);

    let user_token = login(addr, "alice").await;
    let (status, _) = send(addr, "DELETE", "/conflictdata", Some(&user_token), Some(body)).await;
    assert_eq!(status, 403);

    let _ = login(addr, "root").await;
    let store = state.open_store().expect("connection");
    assert!(store.set_admin("root", true).expect("promote"));
    let creds = r#"{"username":"root","password":"secret#123"}"#;
    let (_, token) = send(addr, "POST", "/auth/login", None, Some(creds)).await;
    let admin_token = token["access_token"].as_str().expect("token").to_string();

    let (status, resp) = send(addr, "DELETE", "/conflictdata", Some(&admin_token), Some(body)).await;
    assert_eq!(status, 200);
    assert_eq!(resp["deleted"], 1);

    let (status, _) = send(addr, "DELETE", "/conflictdata", Some(&admin_token), Some(body)).await;
    assert_eq!(status, 404);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_first_risk_reads_agree() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AppConfig::default_test();
    config.database_url = dir.path().join("http.db").to_string_lossy().into_owned();
    let (addr, state) = start(config).await;

    let requests: Vec<_> = (0..8)
        .map(|_| tokio::spawn(send(addr, "GET", "/conflictdata/Uganda/riskscore", None, None)))
        .collect();
    let mut bodies = Vec::new();
    for handle in requests {
        let (status, body) = handle.await.expect("request task");
        assert_eq!(status, 200);
        bodies.push(body);
    }

    assert!(bodies.windows(2).all(|w| w[0] == w[1]), "{bodies:?}");
    let store = state.open_store().expect("connection");
    assert_eq!(store.risk_aggregate_count("Uganda").unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn in_memory_mode_serves_concurrent_writes_and_reads() {
    let (addr, state) = start(AppConfig::default_test()).await;

    for round in 0..4 {
        let requests: Vec<_> = (0..16)
            .map(|i| {
                tokio::spawn(async move {
                    if i % 4 == 0 {
                        let creds =
                            format!(r#"{{"username":"user{round}x{i}","password":"secret#123"}}"#);
                        let (status, body) =
                            send(addr, "POST", "/auth/register", None, Some(&creds)).await;
                        (201, status, body)
                    } else {
                        let country = if i % 2 == 0 { "Kenya" } else { "Uganda" };
                        let path = format!("/conflictdata/{country}/riskscore");
                        let (status, body) = send(addr, "GET", &path, None, None).await;
                        (200, status, body)
                    }
                })
            })
            .collect();
        for handle in requests {
            let (expected, status, body) = handle.await.expect("request task");
            assert_eq!(status, expected, "round {round}: {body}");
        }
    }

    let store = state.open_store().expect("connection");
    assert_eq!(store.risk_aggregate_count("Kenya").unwrap(), 1);
    assert_eq!(store.risk_aggregate_count("Uganda").unwrap(), 1);
    assert!(store.user_by_username("user3x12").unwrap().is_some());
}
