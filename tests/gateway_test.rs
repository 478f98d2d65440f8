//! Gateway dispatch: failover, breakers, notifications, uploads, status.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use service_gateway::lifecycle::Shutdown;

mod common;

const SIGNUP_BODY: &str = r#"{"username":"kay","password":"secret"}"#;

fn multipart_body(include_beat: bool) -> (String, String) {
    let boundary = "gatewayboundary";
    let mut body = String::new();
    body.push_str(&format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nNight Drive\r\n",
        b = boundary
    ));
    body.push_str(&format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"artist\"\r\n\r\nKay\r\n",
        b = boundary
    ));
    if include_beat {
        body.push_str(&format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"beat\"; filename=\"drive.mp3\"\r\nContent-Type: audio/mpeg\r\n\r\nfake-audio-bytes\r\n",
            b = boundary
        ));
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    (format!("multipart/form-data; boundary={}", boundary), body)
}

#[tokio::test]
async fn test_single_replica_passes_response_through() {
    let shutdown = Shutdown::new();
    let replica = common::start_mock_backend(200, r#"{"username":"kay","beats":3}"#).await;
    let config = common::gateway_config("http://127.0.0.1:1", vec![replica.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let res = common::client()
        .get(format!("{}/user/profile", gateway))
        .header("authorization", "Bearer token-123")
        .header("cookie", "session=1")
        .send()
        .await
        .expect("gateway unreachable");

    assert_eq!(res.status(), 200);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), r#"{"username":"kay","beats":3}"#);

    let seen = replica.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/user/profile");
    assert_eq!(seen[0].headers["authorization"], "Bearer token-123");
    assert!(seen[0].headers.contains_key("x-request-id"));
    assert!(!seen[0].headers.contains_key("cookie"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_all_replicas_failing_opens_every_breaker() {
    let shutdown = Shutdown::new();
    let a = common::start_mock_backend(500, r#"{"error":"a"}"#).await;
    let b = common::start_mock_backend(502, r#"{"error":"b"}"#).await;
    let c = common::start_mock_backend(503, r#"{"error":"c"}"#).await;
    let config = common::gateway_config(
        "http://127.0.0.1:1",
        vec![a.replica(), b.replica(), c.replica()],
    );
    let gateway = common::start_gateway(config, &shutdown).await;
    let client = common::client();

    let res = client
        .post(format!("{}/user/signup", gateway))
        .header("content-type", "application/json")
        .body(SIGNUP_BODY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("All replicas failed"));
    assert_eq!((a.calls(), b.calls(), c.calls()), (3, 3, 3));

    // Every breaker is open now: no network call at all.
    let res = client
        .post(format!("{}/user/signup", gateway))
        .header("content-type", "application/json")
        .body(SIGNUP_BODY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!((a.calls(), b.calls(), c.calls()), (3, 3, 3));

    let status: Value = client
        .get(format!("{}/status", gateway))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let breakers = status["circuit_breakers"].as_array().unwrap();
    assert_eq!(breakers.len(), 3);
    assert!(breakers.iter().all(|b| b["state"] == "open"));

    shutdown.trigger();
}

#[tokio::test]
async fn test_failover_to_next_replica() {
    let shutdown = Shutdown::new();
    let a = common::start_mock_backend(500, r#"{"error":"down"}"#).await;
    let b = common::start_mock_backend(200, r#"{"from":"b"}"#).await;
    let config = common::gateway_config("http://127.0.0.1:1", vec![a.replica(), b.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let res = common::client()
        .get(format!("{}/user/profile", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), r#"{"from":"b"}"#);
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_retry_on_same_replica_recovers() {
    let shutdown = Shutdown::new();
    let count = Arc::new(AtomicU32::new(0));
    let cc = count.clone();
    let a = common::start_programmable_backend(move |_, _| {
        let cc = cc.clone();
        async move {
            if cc.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, r#"{"error":"warming up"}"#.to_string())
            } else {
                (200, r#"{"ok":true}"#.to_string())
            }
        }
    })
    .await;
    let b = common::start_mock_backend(200, r#"{"from":"b"}"#).await;
    let config = common::gateway_config("http://127.0.0.1:1", vec![a.replica(), b.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let res = common::client()
        .get(format!("{}/user/profile", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), r#"{"ok":true}"#);
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_client_error_short_circuits() {
    let shutdown = Shutdown::new();
    let a = common::start_mock_backend(404, r#"{"error":"User not found"}"#).await;
    let b = common::start_mock_backend(200, r#"{"from":"b"}"#).await;
    let config = common::gateway_config("http://127.0.0.1:1", vec![a.replica(), b.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let res = common::client()
        .get(format!("{}/user/profile", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), r#"{"error":"User not found"}"#);
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_replica_fails_over() {
    let shutdown = Shutdown::new();
    let closed = common::closed_addr().await;
    let b = common::start_mock_backend(200, r#"{"from":"b"}"#).await;
    let dead = service_gateway::config::ReplicaDescriptor::new(
        closed.ip().to_string(),
        closed.port().to_string(),
    );
    let config = common::gateway_config("http://127.0.0.1:1", vec![dead, b.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let res = common::client()
        .get(format!("{}/user/profile", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(b.calls(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_login_triggers_single_notification() {
    let shutdown = Shutdown::new();
    let (registry_url, registry) = common::start_registry(&shutdown).await;
    let notifier = common::start_mock_backend(200, r#"{"message":"sent"}"#).await;
    registry
        .register(
            "notification-service",
            "127.0.0.1",
            &notifier.addr.port().to_string(),
        )
        .unwrap();

    let replica = common::start_mock_backend(200, r#"{"token":"abc"}"#).await;
    let config = common::gateway_config(&registry_url, vec![replica.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let res = common::client()
        .post(format!("{}/user/login", gateway))
        .header("content-type", "application/json")
        .body(r#"{"username":"kay","password":"secret"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), r#"{"token":"abc"}"#);

    assert_eq!(notifier.wait_for_calls(1, Duration::from_secs(3)).await, 1);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = notifier.requests();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].path, "/notify-login");

    // The replica saw the body untouched.
    assert_eq!(
        replica.requests()[0].body,
        r#"{"username":"kay","password":"secret"}"#
    );

    shutdown.trigger();
}

#[tokio::test]
async fn test_failing_notification_does_not_affect_response() {
    let shutdown = Shutdown::new();
    let (registry_url, registry) = common::start_registry(&shutdown).await;
    let notifier = common::start_mock_backend(500, r#"{"error":"smtp down"}"#).await;
    registry
        .register(
            "notification-service",
            "127.0.0.1",
            &notifier.addr.port().to_string(),
        )
        .unwrap();

    let replica = common::start_mock_backend(201, r#"{"message":"created"}"#).await;
    let config = common::gateway_config(&registry_url, vec![replica.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let res = common::client()
        .post(format!("{}/user/signup", gateway))
        .header("content-type", "application/json")
        .body(SIGNUP_BODY)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);

    assert_eq!(notifier.wait_for_calls(1, Duration::from_secs(3)).await, 1);
    assert_eq!(notifier.requests()[0].path, "/notify-signup");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unresolved_notification_service_is_ignored() {
    let shutdown = Shutdown::new();
    let (registry_url, _) = common::start_registry(&shutdown).await;
    let replica = common::start_mock_backend(200, r#"{"token":"abc"}"#).await;
    let config = common::gateway_config(&registry_url, vec![replica.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let res = common::client()
        .post(format!("{}/user/login", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    shutdown.trigger();
}

#[tokio::test]
async fn test_discovery_fallback_without_static_replicas() {
    let shutdown = Shutdown::new();
    let (registry_url, registry) = common::start_registry(&shutdown).await;
    let config = common::gateway_config(&registry_url, Vec::new());
    let gateway = common::start_gateway(config, &shutdown).await;
    let client = common::client();

    let res = client
        .get(format!("{}/user/profile", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "userfile-service unavailable");

    let replica = common::start_mock_backend(200, r#"{"username":"kay"}"#).await;
    registry
        .register("userfile-service", "127.0.0.1", &replica.addr.port().to_string())
        .unwrap();

    let res = client
        .get(format!("{}/user/profile", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(replica.calls(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_rate_limit_rejects_excess_requests() {
    let shutdown = Shutdown::new();
    let replica = common::start_mock_backend(200, r#"{"ok":true}"#).await;
    let mut config = common::gateway_config("http://127.0.0.1:1", vec![replica.replica()]);
    config.rate_limit.enabled = true;
    config.rate_limit.user_requests_per_minute = 2;
    let gateway = common::start_gateway(config, &shutdown).await;
    let client = common::client();

    for _ in 0..2 {
        let res = client
            .get(format!("{}/user/profile", gateway))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
    }

    let res = client
        .get(format!("{}/user/profile", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 429);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Rate limit exceeded");
    assert_eq!(replica.calls(), 2);

    // Uploads have their own budget.
    let (content_type, body) = multipart_body(false);
    let res = client
        .post(format!("{}/beats/upload", gateway))
        .header("content-type", content_type)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);

    shutdown.trigger();
}

#[tokio::test]
async fn test_upload_without_beat_is_rejected() {
    let shutdown = Shutdown::new();
    let replica = common::start_mock_backend(201, r#"{"message":"uploaded"}"#).await;
    let config = common::gateway_config("http://127.0.0.1:1", vec![replica.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let (content_type, body) = multipart_body(false);
    let res = common::client()
        .post(format!("{}/beats/upload", gateway))
        .header("content-type", content_type)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "No file part in the request");
    assert_eq!(replica.calls(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_upload_is_forwarded_and_notifies() {
    let shutdown = Shutdown::new();
    let (registry_url, registry) = common::start_registry(&shutdown).await;
    let notifier = common::start_mock_backend(200, r#"{"message":"sent"}"#).await;
    registry
        .register(
            "notification-service",
            "127.0.0.1",
            &notifier.addr.port().to_string(),
        )
        .unwrap();
    let replica = common::start_mock_backend(201, r#"{"message":"uploaded"}"#).await;
    let config = common::gateway_config(&registry_url, vec![replica.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let (content_type, body) = multipart_body(true);
    let res = common::client()
        .post(format!("{}/beats/upload", gateway))
        .header("content-type", content_type.clone())
        .header("authorization", "Bearer token-123")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);

    let seen = replica.requests();
    assert_eq!(seen[0].path, "/beats/upload");
    assert_eq!(seen[0].headers["content-type"], content_type.as_str());
    assert_eq!(seen[0].headers["authorization"], "Bearer token-123");
    assert_eq!(seen[0].body, body);

    assert_eq!(notifier.wait_for_calls(1, Duration::from_secs(3)).await, 1);
    assert_eq!(notifier.requests()[0].path, "/notify-upload");

    shutdown.trigger();
}

#[tokio::test]
async fn test_status_aggregates_services() {
    let shutdown = Shutdown::new();
    let (registry_url, registry) = common::start_registry(&shutdown).await;
    let userfile = common::start_mock_backend(200, r#"{"status":"ok"}"#).await;
    registry
        .register("userfile-service", "127.0.0.1", &userfile.addr.port().to_string())
        .unwrap();
    let config = common::gateway_config(&registry_url, vec![userfile.replica()]);
    let gateway = common::start_gateway(config, &shutdown).await;

    let res = common::client()
        .get(format!("{}/status", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();

    assert_eq!(body["gateway_status"], "running");
    let services = body["services"].as_array().unwrap();
    assert_eq!(services[0]["service"], "userfile-service");
    assert_eq!(services[0]["status"], "running");
    assert_eq!(services[1]["service"], "notification-service");
    assert_eq!(services[1]["status"], "unavailable");
    assert_eq!(body["circuit_breakers"][0]["state"], "closed");

    shutdown.trigger();
}

#[tokio::test]
async fn test_request_deadline_returns_gateway_timeout() {
    let shutdown = Shutdown::new();
    let slow = common::start_programmable_backend(|_, _| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        (200, r#"{"late":true}"#.to_string())
    })
    .await;
    let mut config = common::gateway_config("http://127.0.0.1:1", vec![slow.replica()]);
    config.timeouts.upstream_ms = 5_000;
    config.timeouts.request_ms = 300;
    let gateway = common::start_gateway(config, &shutdown).await;

    let res = common::client()
        .get(format!("{}/user/profile", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 504);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Request timed out");

    shutdown.trigger();
}

async fn breaker_state(client: &reqwest::Client, gateway: &str, replica: &str) -> String {
    let status: Value = client
        .get(format!("{}/status", gateway))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    status["circuit_breakers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["replica"] == replica)
        .map(|b| b["state"].as_str().unwrap().to_string())
        .unwrap()
}

#[tokio::test]
async fn test_breaker_recovers_through_half_open() {
    let shutdown = Shutdown::new();
    let healthy = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = healthy.clone();
    let replica = common::start_programmable_backend(move |_, _| {
        let healthy = flag.load(Ordering::SeqCst);
        async move {
            if healthy {
                (200, r#"{"ok":true}"#.to_string())
            } else {
                (500, r#"{"error":"down"}"#.to_string())
            }
        }
    })
    .await;
    let id = replica.addr.to_string();
    let mut config = common::gateway_config("http://127.0.0.1:1", vec![replica.replica()]);
    config.circuit_breaker.reset_timeout_ms = 300;
    let gateway = common::start_gateway(config, &shutdown).await;
    let client = common::client();
    let profile = || client.get(format!("{}/user/profile", gateway)).send();

    assert_eq!(profile().await.unwrap().status(), 503);
    assert_eq!(replica.calls(), 3);
    assert_eq!(breaker_state(&client, &gateway, &id).await, "open");

    // Open: rejected without a call.
    assert_eq!(profile().await.unwrap().status(), 503);
    assert_eq!(replica.calls(), 3);

    // A failing half-open call reopens the breaker and restarts its timer.
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(profile().await.unwrap().status(), 503);
    assert_eq!(replica.calls(), 4);
    assert_eq!(profile().await.unwrap().status(), 503);
    assert_eq!(replica.calls(), 4);
    assert_eq!(breaker_state(&client, &gateway, &id).await, "open");

    // A successful half-open call closes it.
    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(profile().await.unwrap().status(), 200);
    assert_eq!(replica.calls(), 5);
    assert_eq!(breaker_state(&client, &gateway, &id).await, "closed");

    assert_eq!(profile().await.unwrap().status(), 200);
    assert_eq!(replica.calls(), 6);

    shutdown.trigger();
}

#[tokio::test]
async fn test_attempt_timeout_fails_over() {
    let shutdown = Shutdown::new();
    let slow = common::start_programmable_backend(|_, _| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        (200, r#"{"from":"slow"}"#.to_string())
    })
    .await;
    let fast = common::start_mock_backend(200, r#"{"from":"fast"}"#).await;
    let mut config = common::gateway_config("http://127.0.0.1:1", vec![slow.replica(), fast.replica()]);
    config.timeouts.upstream_ms = 100;
    let gateway = common::start_gateway(config, &shutdown).await;
    let client = common::client();

    let res = client
        .get(format!("{}/user/profile", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["from"], "fast");
    assert_eq!((slow.calls(), fast.calls()), (3, 1));
    assert_eq!(
        breaker_state(&client, &gateway, &slow.addr.to_string()).await,
        "open"
    );

    shutdown.trigger();
}
