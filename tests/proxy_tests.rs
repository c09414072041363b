//! End-to-end forwarding through the balancer.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_round_robin_skips_unhealthy_instance() {
    let a1 = common::start_backend("A1").await;
    let a2 = common::start_backend("A2").await;
    let lb = common::start_balancer(common::test_config()).await;
    lb.register("serviceA", &a1);
    lb.register("serviceA", &a2);
    lb.state.registry.update_health("serviceA", &a2.url(), false);

    let client = common::client();
    for _ in 0..3 {
        let res = client.get(lb.url("/proxy/serviceA/work")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["instance"], "A1");
    }
    assert_eq!(a1.hits(), 3);
    assert_eq!(a2.hits(), 0);
}

#[tokio::test]
async fn test_round_robin_cycles_through_instances() {
    let backends = [
        common::start_backend("R1").await,
        common::start_backend("R2").await,
        common::start_backend("R3").await,
    ];
    let lb = common::start_balancer(common::test_config()).await;
    for b in &backends {
        lb.register("ring", b);
    }

    let client = common::client();
    for _ in 0..6 {
        let res = client.get(lb.url("/proxy/ring")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    for b in &backends {
        assert_eq!(b.hits(), 2, "{} should serve exactly two requests", b.name);
    }
}

#[tokio::test]
async fn test_unknown_service_returns_503() {
    let lb = common::start_balancer(common::test_config()).await;

    let res = common::client()
        .get(lb.url("/proxy/serviceB/anything"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(res.headers().contains_key("x-trace-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["error"],
        "No healthy instances available for service: serviceB"
    );
}

#[tokio::test]
async fn test_least_connections_prefers_idle_instance() {
    let b1 = common::start_slow_backend("B1", Duration::from_millis(400)).await;
    let b2 = common::start_slow_backend("B2", Duration::from_millis(400)).await;
    let mut config = common::test_config();
    config.routing.strategy = "least-connections".into();
    let lb = common::start_balancer(config).await;
    lb.register("serviceB", &b1);
    lb.register("serviceB", &b2);

    let client = common::client();
    let first = tokio::spawn({
        let client = client.clone();
        let url = lb.url("/proxy/serviceB/slow");
        async move { client.get(url).send().await.unwrap().json::<Value>().await.unwrap() }
    });

    // Wait until the first request is in flight on B1.
    assert!(common::eventually(Duration::from_secs(2), || b1.hits() == 1).await);

    let second: Value = client
        .get(lb.url("/proxy/serviceB/slow"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first = first.await.unwrap();

    assert_eq!(first["instance"], "B1");
    assert_eq!(second["instance"], "B2");

    let instances = lb.state.registry.healthy_instances("serviceB");
    assert!(instances.iter().all(|i| i.active_connections() == 0));
}

#[tokio::test]
async fn test_unreachable_instance_returns_502() {
    let dead = common::closed_addr().await;
    let lb = common::start_balancer(common::test_config()).await;
    lb.state.registry.add_instance(
        "serviceC",
        &format!("http://{dead}"),
        &format!("http://{dead}/actuator/health"),
        "C1",
    );

    let res = common::client()
        .get(lb.url("/proxy/serviceC/x"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("Failed to forward request: "), "{message}");

    let recorded = lb.state.metrics.service("serviceC");
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded["C1"].error_count, 1);
}

#[tokio::test]
async fn test_forwards_path_query_body_and_headers() {
    let backend = common::start_backend("E1").await;
    let lb = common::start_balancer(common::test_config()).await;
    lb.register("echo", &backend);

    let trace = "0123456789abcdef0123456789abcdef";
    let res = common::client()
        .post(lb.url("/proxy/echo/api/items?id=7&name=a%20b&flag&=x"))
        .header("x-custom", "yes")
        .header("x-trace-id", trace)
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-trace-id"], trace);
    assert_eq!(res.headers()["x-served-by"], "E1");

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["method"], "POST");
    assert_eq!(body["path"], "/api/items");
    assert_eq!(body["query"], "id=7&name=a%20b");
    assert_eq!(body["body"], "payload");
    assert_eq!(body["headers"]["x-custom"], "yes");
    assert_eq!(body["headers"]["x-trace-id"], trace);
}

#[tokio::test]
async fn test_invalid_trace_id_is_replaced() {
    let backend = common::start_backend("T1").await;
    let lb = common::start_balancer(common::test_config()).await;
    lb.register("traced", &backend);

    let res = common::client()
        .get(lb.url("/proxy/traced"))
        .header("x-trace-id", "not-a-trace-id")
        .send()
        .await
        .unwrap();

    let issued = res.headers()["x-trace-id"].to_str().unwrap().to_string();
    assert_ne!(issued, "not-a-trace-id");
    assert_eq!(issued.len(), 32);

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["path"], "/");
    assert_eq!(body["headers"]["x-trace-id"], issued.as_str());
}

#[tokio::test]
async fn test_downstream_error_status_passes_through() {
    let backend =
        common::start_backend_with("F1", StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
    let lb = common::start_balancer(common::test_config()).await;
    lb.register("flaky", &backend);

    let res = common::client()
        .get(lb.url("/proxy/flaky/boom"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["instance"], "F1");

    let recorded = lb.state.metrics.service("flaky");
    assert_eq!(recorded["F1"].request_count, 1);
    assert_eq!(recorded["F1"].error_count, 1);
}

#[tokio::test]
async fn test_slow_instance_times_out() {
    let backend = common::start_slow_backend("S1", Duration::from_secs(3)).await;
    let mut config = common::test_config();
    config.proxy.timeout_ms = 200;
    let lb = common::start_balancer(config).await;
    lb.register("sluggish", &backend);

    let res = common::client()
        .get(lb.url("/proxy/sluggish"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let backend = common::start_backend("L1").await;
    let mut config = common::test_config();
    config.proxy.max_body_bytes = 16;
    let lb = common::start_balancer(config).await;
    lb.register("limited", &backend);

    let res = common::client()
        .post(lb.url("/proxy/limited"))
        .body(vec![b'x'; 64])
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(backend.hits(), 0);

    // The request limit does not cap responses: the echo body is well over 16 bytes.
    let res = common::client()
        .get(lb.url("/proxy/limited/items"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["instance"], "L1");
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_oversized_response_is_a_gateway_error() {
    let backend = common::start_backend("R1").await;
    let mut config = common::test_config();
    config.proxy.max_response_bytes = 16;
    let lb = common::start_balancer(config).await;
    lb.register("chatty", &backend);

    let res = common::client()
        .get(lb.url("/proxy/chatty"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(backend.hits(), 1);
}

#[tokio::test]
async fn test_liveness_reports_strategy() {
    let lb = common::start_balancer(common::test_config()).await;

    let body: Value = common::client()
        .get(lb.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "UP");
    assert_eq!(body["strategy"], "round-robin");
}

#[tokio::test]
async fn test_benchmark_attributes_requests_to_their_strategy() {
    let a1 = common::start_backend("A1").await;
    let failing = common::start_backend_with("A2", StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
    let lb = common::start_balancer(common::test_config()).await;
    lb.register("serviceA", &a1);

    let client = common::client();
    let res = client
        .post(lb.url("/api/benchmark/start?startAlgorithm=round-robin"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    for _ in 0..3 {
        client.get(lb.url("/proxy/serviceA/work")).send().await.unwrap();
    }
    // Health paths are not benchmarked.
    client
        .get(lb.url("/proxy/serviceA/actuator/health"))
        .send()
        .await
        .unwrap();

    client
        .post(lb.url("/api/benchmark/switch?algorithm=least-connections"))
        .send()
        .await
        .unwrap();
    lb.state.registry.remove_instance("serviceA", &a1.url());
    lb.register("serviceA", &failing);
    client.get(lb.url("/proxy/serviceA/work")).send().await.unwrap();

    let body: Value = client
        .post(lb.url("/api/benchmark/stop"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let results = &body["results"]["algorithmResults"];
    assert_eq!(results["round-robin"]["requestCount"], 3);
    assert_eq!(results["round-robin"]["errorCount"], 0);
    assert_eq!(results["least-connections"]["requestCount"], 1);
    assert_eq!(results["least-connections"]["errorCount"], 1);
    assert_eq!(results["rl-based"]["requestCount"], 0);
    assert_eq!(
        body["results"]["performanceComparison"]["lowestErrorRate"],
        "round-robin"
    );
}
