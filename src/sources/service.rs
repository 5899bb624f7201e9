//! Health check for one named platform service
//!
//! ## Probes
//!
//! 1. **HTTP** - Method, expected status codes and optional body pattern
//! 2. **Container** - State and healthcheck of the service's container
//!
//! A probe that reaches a verdict reports it as `ServiceHealth`, even when the verdict
//! is "stopped". Only probes that could not reach a verdict (timeout, runtime CLI
//! missing) fail with a `SourceError`.

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tracing::{error, trace, warn};

use crate::config::{HttpMethod, ServiceConfig, ServiceProbe};
use crate::error::{SourceError, SourceResult};
use crate::{HealthStatus, ServiceHealth};

use super::{CollectContext, RawMetrics, SourceAdapter, SourceKind, command};

const INSPECT_FORMAT: &str = "{{.State.Status}} {{if .State.Health}}{{.State.Health.Status}}{{end}}";

pub struct ServiceHealthSource {
    config: ServiceConfig,

    /// HTTP client (reused across checks)
    client: reqwest::Client,

    docker_binary: String,

    body_pattern: Option<Regex>,
}

impl ServiceHealthSource {
    pub fn new(config: ServiceConfig, docker_binary: &str) -> Self {
        let body_pattern = match &config.probe {
            ServiceProbe::Http {
                body_pattern: Some(pattern),
                ..
            } => match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    error!("invalid regex pattern '{}': {}", pattern, e);
                    None
                }
            },
            _ => None,
        };

        Self {
            config,
            client: reqwest::Client::builder().build().unwrap_or_default(),
            docker_binary: docker_binary.to_string(),
            body_pattern,
        }
    }

    fn health(&self, status: HealthStatus, detail: Option<String>) -> RawMetrics {
        RawMetrics::Service(ServiceHealth {
            name: self.config.name.clone(),
            status,
            last_checked: Utc::now(),
            detail,
        })
    }

    async fn check_http(
        &self,
        ctx: &CollectContext,
        url: &str,
        method: HttpMethod,
        expected_status: Option<&[u16]>,
    ) -> SourceResult<RawMetrics> {
        trace!("checking service at {url}");

        let method = match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Head => reqwest::Method::HEAD,
        };
        let is_head = method == reqwest::Method::HEAD;
        let started = std::time::Instant::now();

        let response = match self
            .client
            .request(method, url)
            .timeout(ctx.remaining())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(SourceError::Timeout(started.elapsed())),
            Err(e) if e.is_connect() => {
                warn!("{}: connection failed: {e}", self.config.name);
                return Ok(self.health(HealthStatus::Stopped, Some(format!("connection failed: {e}"))));
            }
            Err(e) => return Err(SourceError::unavailable(format!("HTTP request failed: {e}"))),
        };

        let status_code = response.status().as_u16();

        let body = if is_head {
            String::new()
        } else {
            match response.text().await {
                Ok(body) => body,
                Err(e) if e.is_timeout() => return Err(SourceError::Timeout(started.elapsed())),
                Err(e) => return Err(SourceError::parse(format!("failed to read response body: {e}"))),
            }
        };

        let status = self.evaluate_response(status_code, expected_status, &body);
        let detail = match status {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded => Some("response body did not match pattern".to_string()),
            _ => Some(format!("unexpected status code: {status_code}")),
        };

        Ok(self.health(status, detail))
    }

    /// Expected status (any 2xx when unspecified) then body pattern
    fn evaluate_response(&self, status_code: u16, expected_status: Option<&[u16]>, body: &str) -> HealthStatus {
        let status_ok = match expected_status {
            Some(expected) => expected.contains(&status_code),
            None => (200..300).contains(&status_code),
        };

        if !status_ok {
            return HealthStatus::Unhealthy;
        }

        if let Some(re) = &self.body_pattern
            && !re.is_match(body)
        {
            return HealthStatus::Degraded;
        }

        HealthStatus::Healthy
    }

    async fn check_container(&self, ctx: &CollectContext, container: &str) -> SourceResult<RawMetrics> {
        let output = command::run(
            &self.docker_binary,
            &["inspect", "--format", INSPECT_FORMAT, container],
            ctx,
        )
        .await;

        match output {
            Ok(output) => {
                let status = parse_inspect_output(&output)?;
                let detail = (status != HealthStatus::Healthy).then(|| output.trim().to_string());
                Ok(self.health(status, detail))
            }
            Err(SourceError::Unavailable(msg)) if msg.contains("No such") => {
                Ok(self.health(HealthStatus::Stopped, Some(format!("container {container} not found"))))
            }
            Err(e) => Err(e),
        }
    }
}

/// Map `docker inspect` state and optional health status to a service status
pub fn parse_inspect_output(output: &str) -> SourceResult<HealthStatus> {
    let mut parts = output.split_whitespace();
    let state = parts
        .next()
        .ok_or_else(|| SourceError::parse("empty inspect output"))?;
    let health = parts.next();

    let status = match (state, health) {
        ("running", None | Some("healthy")) => HealthStatus::Healthy,
        ("running", Some("starting")) => HealthStatus::Degraded,
        ("running", Some("unhealthy")) => HealthStatus::Unhealthy,
        ("running", Some(other)) => {
            return Err(SourceError::parse(format!("unknown health status '{other}'")));
        }
        ("restarting", _) => HealthStatus::Unhealthy,
        _ => HealthStatus::Stopped,
    };

    Ok(status)
}

#[async_trait]
impl SourceAdapter for ServiceHealthSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Service
    }

    async fn collect(&self, ctx: &CollectContext) -> SourceResult<RawMetrics> {
        match &self.config.probe {
            ServiceProbe::Http {
                url,
                method,
                expected_status,
                ..
            } => {
                self.check_http(ctx, url, *method, expected_status.as_deref())
                    .await
            }
            ServiceProbe::Container { container } => self.check_container(ctx, container).await,
        }
    }
}
