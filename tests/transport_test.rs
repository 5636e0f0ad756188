mod common;

use combined_energy::config::HttpConfig;
use combined_energy::transport::{RetryPolicy, Transport};
use common::{FakeUpstream, Reply};
use serde_json::json;
use std::time::{Duration, Instant};

fn http_config() -> HttpConfig {
    let mut config = HttpConfig::default();
    config.timeout_secs = 5;
    config.retry.base_delay_ms = 1;
    config
}

#[tokio::test]
async fn retries_503_until_success() {
    let upstream = FakeUpstream::start().await;
    upstream.push("/probe", Reply::status(503));
    upstream.push("/probe", Reply::status(503));
    upstream.set_default("/probe", Reply::ok(json!({"status": "ok"})));

    let transport = Transport::new(&http_config());
    let body = transport
        .get(&format!("{}/probe", upstream.url()), &[])
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(upstream.count("/probe"), 3);
}

#[tokio::test]
async fn gives_up_after_five_attempts() {
    let upstream = FakeUpstream::start().await;
    upstream.set_default("/probe", Reply::status(503));

    let transport = Transport::new(&http_config());
    let err = transport
        .get(&format!("{}/probe", upstream.url()), &[])
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(upstream.count("/probe"), 5);
}

#[tokio::test]
async fn backoff_doubles_between_attempts() {
    let upstream = FakeUpstream::start().await;
    for _ in 0..3 {
        upstream.push("/probe", Reply::status(503));
    }
    upstream.set_default("/probe", Reply::ok(json!({})));

    let transport = Transport::new(&http_config())
        .with_retry_policy(RetryPolicy::new(5, Duration::from_millis(20), 2));
    let started = Instant::now();
    transport
        .get(&format!("{}/probe", upstream.url()), &[])
        .await
        .unwrap();

    // 20 + 40 + 80 ms of sleeping before the fourth attempt
    assert!(started.elapsed() >= Duration::from_millis(140));
    assert_eq!(upstream.count("/probe"), 4);
}

#[tokio::test]
async fn other_statuses_propagate_immediately() {
    for status in [400u16, 401, 404, 500, 502] {
        let upstream = FakeUpstream::start().await;
        upstream.set_default("/probe", Reply::status(status));

        let transport = Transport::new(&http_config());
        let err = transport
            .get(&format!("{}/probe", upstream.url()), &[])
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(status));
        assert!(!err.is_retryable());
        assert_eq!(upstream.count("/probe"), 1, "status {}", status);
    }
}

#[tokio::test]
async fn connection_refused_is_not_retried() {
    let url = {
        let upstream = FakeUpstream::start().await;
        upstream.url()
    };
    // Give the dropped listener a moment to close
    tokio::time::sleep(Duration::from_millis(20)).await;

    let transport = Transport::new(&http_config());
    let err = transport.get(&format!("{}/probe", url), &[]).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(transport.requests_sent(), 1);
}

#[tokio::test]
async fn null_query_values_are_omitted() {
    let upstream = FakeUpstream::start().await;
    upstream.set_default("/probe", Reply::ok(json!({})));

    let transport = Transport::new(&http_config());
    transport
        .get(
            &format!("{}/probe", upstream.url()),
            &[
                ("jwt", Some("xxxx".to_string())),
                ("planId", None),
                ("postcode", None),
                ("i", Some("1234".to_string())),
            ],
        )
        .await
        .unwrap();

    let request = &upstream.requests_to("/probe")[0];
    assert_eq!(request.query.len(), 2);
    assert_eq!(request.query.get("jwt").map(String::as_str), Some("xxxx"));
    assert_eq!(request.query.get("i").map(String::as_str), Some("1234"));
    assert!(!request.query.contains_key("planId"));
}

#[tokio::test]
async fn scoped_use_closes_connection_and_reopens_on_demand() {
    let upstream = FakeUpstream::start().await;
    upstream.set_default("/probe", Reply::ok(json!({})));
    let url = format!("{}/probe", upstream.url());

    let transport = Transport::new(&http_config());
    {
        let _scope = transport.scoped().unwrap();
        transport.get(&url, &[]).await.unwrap();
        transport.get(&url, &[]).await.unwrap();
        assert!(transport.is_connected());
    }
    assert!(!transport.is_connected());

    transport.get(&url, &[]).await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(upstream.count("/probe"), 3);
}

#[tokio::test]
async fn host_owned_client_is_used() {
    let upstream = FakeUpstream::start().await;
    upstream.set_default("/probe", Reply::ok(json!({"ok": true})));

    let http = reqwest::Client::new();
    let transport = Transport::with_client(http, &http_config());
    assert!(transport.is_connected());
    let body = transport
        .get(&format!("{}/probe", upstream.url()), &[])
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
    assert!(transport.is_connected());
    assert!(transport.is_host_owned());
}

#[tokio::test]
async fn scope_never_drops_host_owned_client() {
    let upstream = FakeUpstream::start().await;
    upstream.set_default("/probe", Reply::ok(json!({})));
    let url = format!("{}/probe", upstream.url());

    let transport = Transport::with_client(reqwest::Client::new(), &http_config());
    {
        let _scope = transport.scoped().unwrap();
        transport.get(&url, &[]).await.unwrap();
    }
    assert!(transport.is_connected());
    transport.close();
    assert!(transport.is_connected());
    transport.get(&url, &[]).await.unwrap();
    assert_eq!(upstream.count("/probe"), 2);
}

#[test]
fn only_one_scope_at_a_time() {
    let transport = Transport::new(&http_config());
    let first = transport.scoped().unwrap();
    assert!(transport.is_scoped());
    assert!(transport.scoped().is_err());

    drop(first);
    assert!(!transport.is_scoped());
    let second = transport.scoped().unwrap();
    drop(second);
}
