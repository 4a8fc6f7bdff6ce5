#![cfg(feature = "server")]

mod common;

use common::{closed_port_url, credentials_query, spawn_relay, spawn_upstream, Reply};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use quickmark::relay::MARK_ATTENDANCE_PATH;
use serde_json::{json, Value};

fn endpoint(base: &str) -> String {
    format!("{}{}", base, MARK_ATTENDANCE_PATH)
}

#[tokio::test]
async fn missing_credentials_never_reach_upstream() {
    let upstream = spawn_upstream(Reply::lines(&[r#"{"status":"info"}"#])).await;
    let relay = spawn_relay(Some(upstream.url())).await;

    let response = reqwest::Client::new()
        .get(endpoint(&relay))
        .query(&[("user_email", "a@b.c"), ("quickchex_pass", "pw"), ("gmail_app_password", "")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "error", "message": "Missing credentials"}));
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn absent_email_key_never_reaches_upstream() {
    let upstream = spawn_upstream(Reply::lines(&[r#"{"status":"info"}"#])).await;
    let relay = spawn_relay(Some(upstream.url())).await;

    let response = reqwest::Client::new()
        .get(endpoint(&relay))
        .query(&[("quickchex_pass", "pw"), ("gmail_app_password", "apppw")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "error", "message": "Missing credentials"}));
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn unconfigured_upstream_is_a_server_error() {
    let relay = spawn_relay(None).await;

    let response = reqwest::Client::new()
        .get(endpoint(&relay))
        .query(&credentials_query())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"status": "error", "message": "API URL not configured on server"})
    );
}

#[tokio::test]
async fn upstream_rejection_keeps_status_and_hides_body() {
    let upstream = spawn_upstream(Reply::Status(503, "maintenance: db-7 is down".to_string())).await;
    let relay = spawn_relay(Some(upstream.url())).await;

    let response = reqwest::Client::new()
        .get(endpoint(&relay))
        .query(&credentials_query())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 503);
    let text = response.text().await.unwrap();
    assert!(!text.contains("db-7"));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body, json!({"status": "error", "message": "External API Error: 503"}));
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn unreachable_upstream_is_reported() {
    let relay = spawn_relay(Some(closed_port_url().await)).await;

    let response = reqwest::Client::new()
        .get(endpoint(&relay))
        .query(&credentials_query())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"status": "error", "message": "Failed to connect to external API proxy"})
    );
}

#[tokio::test]
async fn chunked_upstream_is_reframed_as_sse() {
    let check = "✓".as_bytes();
    let chunks = vec![
        b"{\"status\":\"info\",\"message\":\"Logging in\"}\n{\"status\":\"step_".to_vec(),
        [b"success\",\"message\":\"ok ".as_slice(), &check[..1]].concat(),
        [&check[1..], b"\"}\r\n\r\n".as_slice()].concat(),
        b"data: {\"status\":\"app_success\"}\nevent: done\n{\"status\":\"cookies_update\",\"cookies\":{}}".to_vec(),
    ];
    let upstream = spawn_upstream(Reply::Chunks(chunks)).await;
    let relay = spawn_relay(Some(upstream.url())).await;

    let response = reqwest::Client::new()
        .get(endpoint(&relay))
        .query(&credentials_query())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");

    assert_eq!(
        response.text().await.unwrap(),
        concat!(
            "data: {\"status\":\"info\",\"message\":\"Logging in\"}\n\n",
            "data: {\"status\":\"step_success\",\"message\":\"ok ✓\"}\n\n",
            "data: {\"status\":\"app_success\"}\n\n",
            "event: done\n\n",
            "data: {\"status\":\"cookies_update\",\"cookies\":{}}\n\n",
        )
    );
}

#[tokio::test]
async fn frames_parse_as_server_sent_events() {
    let upstream = spawn_upstream(Reply::lines(&[
        r#"{"status":"info","message":"Opening portal"}"#,
        "",
        r#"data: {"status":"app_success","message":"Marked"}"#,
    ]))
    .await;
    let relay = spawn_relay(Some(upstream.url())).await;

    let response = reqwest::Client::new()
        .get(endpoint(&relay))
        .query(&credentials_query())
        .send()
        .await
        .unwrap();

    let data: Vec<String> = response
        .bytes_stream()
        .eventsource()
        .map(|event| event.unwrap().data)
        .collect()
        .await;

    assert_eq!(
        data,
        vec![
            r#"{"status":"info","message":"Opening portal"}"#.to_string(),
            r#"{"status":"app_success","message":"Marked"}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn continuation_fields_are_forwarded_only_when_given() {
    let upstream = spawn_upstream(Reply::lines(&[r#"{"status":"app_success"}"#])).await;
    let relay = spawn_relay(Some(upstream.url())).await;

    let mut query = credentials_query();
    query.push(("_quikchex_app_session", "s1"));
    reqwest::Client::new()
        .get(endpoint(&relay))
        .query(&query)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(
        upstream.bodies(),
        vec![json!({
            "user_email": "a@b.c",
            "quickchex_pass": "pw",
            "gmail_app_password": "apppw",
            "_quikchex_app_session": "s1",
        })]
    );
}

#[tokio::test]
async fn repeated_and_aliased_keys_keep_the_first_value() {
    let upstream = spawn_upstream(Reply::lines(&[r#"{"status":"app_success"}"#])).await;
    let relay = spawn_relay(Some(upstream.url())).await;

    let mut query = credentials_query();
    query.push(("user_email", "second@b.c"));
    query.push(("_quikchex_app_session", "s1"));
    query.push(("session_cookie", "s-alias"));
    let response = reqwest::Client::new()
        .get(endpoint(&relay))
        .query(&query)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    response.text().await.unwrap();
    assert_eq!(
        upstream.bodies(),
        vec![json!({
            "user_email": "a@b.c",
            "quickchex_pass": "pw",
            "gmail_app_password": "apppw",
            "_quikchex_app_session": "s1",
        })]
    );
}

#[tokio::test]
async fn health_reports_ok() {
    let relay = spawn_relay(None).await;
    let body: Value = reqwest::get(format!("{}/health", relay))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}
