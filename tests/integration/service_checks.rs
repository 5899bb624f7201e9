//! HTTP and container service probes against real endpoints

use std::time::Duration;

use assert_matches::assert_matches;
use platform_monitor::{
    HealthStatus,
    config::{HttpMethod, ServiceConfig, ServiceProbe},
    error::SourceError,
    sources::{CollectContext, RawMetrics, ServiceHealthSource, SourceAdapter, SourceKind},
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_service(
    url: String,
    method: HttpMethod,
    expected_status: Option<Vec<u16>>,
    body_pattern: Option<&str>,
) -> ServiceHealthSource {
    ServiceHealthSource::new(
        ServiceConfig {
            name: "graphql".to_string(),
            probe: ServiceProbe::Http {
                url,
                method,
                expected_status,
                body_pattern: body_pattern.map(str::to_string),
            },
        },
        "docker",
    )
}

async fn probe(source: &ServiceHealthSource) -> (HealthStatus, Option<String>) {
    let ctx = CollectContext::with_timeout(Duration::from_secs(2));
    match source.collect(&ctx).await {
        Ok(RawMetrics::Service(health)) => {
            assert_eq!(health.name, "graphql");
            (health.status, health.detail)
        }
        other => panic!("unexpected probe result: {other:?}"),
    }
}

#[tokio::test]
async fn test_healthy_service() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
        .mount(&mock_server)
        .await;

    let source = http_service(
        format!("{}/healthz", mock_server.uri()),
        HttpMethod::Get,
        None,
        Some(r#""status":"ok""#),
    );

    assert_eq!(source.kind(), SourceKind::Service);
    assert_eq!(probe(&source).await, (HealthStatus::Healthy, None));
}

#[tokio::test]
async fn test_body_mismatch_is_degraded() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"migrating"}"#))
        .mount(&mock_server)
        .await;

    let source = http_service(
        format!("{}/healthz", mock_server.uri()),
        HttpMethod::Get,
        None,
        Some(r#""status":"ok""#),
    );

    let (status, detail) = probe(&source).await;
    assert_eq!(status, HealthStatus::Degraded);
    assert!(detail.is_some());
}

#[tokio::test]
async fn test_unexpected_status_is_unhealthy() {
    let mock_server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let source = http_service(format!("{}/", mock_server.uri()), HttpMethod::Head, None, None);

    let (status, detail) = probe(&source).await;
    assert_eq!(status, HealthStatus::Unhealthy);
    assert_eq!(detail.as_deref(), Some("unexpected status code: 503"));
}

#[tokio::test]
async fn test_expected_status_list() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    let source = http_service(
        format!("{}/graphql", mock_server.uri()),
        HttpMethod::Post,
        Some(vec![200, 400]),
        None,
    );

    assert_eq!(probe(&source).await.0, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_connection_refused_is_stopped() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let source = http_service(format!("http://127.0.0.1:{port}/"), HttpMethod::Get, None, None);

    assert_eq!(probe(&source).await.0, HealthStatus::Stopped);
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let source = http_service(mock_server.uri(), HttpMethod::Get, None, None);
    let ctx = CollectContext::with_timeout(Duration::from_millis(200));

    assert_matches!(source.collect(&ctx).await, Err(SourceError::Timeout(_)));
}
