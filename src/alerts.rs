//! Threshold rules and the alert state machine
//!
//! Evaluation is a pure function of the current snapshot, the previous alert set and
//! the rule table. Per rule:
//!
//! ```text
//! satisfied,     nothing firing → new Alert (Fired)
//! satisfied,     already firing → unchanged (idempotent)
//! not satisfied, firing         → resolved_at = now (Resolved)
//! not satisfied, nothing firing → nothing
//! ```
//!
//! Resolved alerts are kept newest-first up to a bounded history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Alert, MetricSnapshot, ServiceHealth, Severity};

/// Value a rule compares against its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    CpuPercent,
    MemoryPercent,
    DiskPercent,
    NetworkRxMbps,
    NetworkTxMbps,
    NetworkUtilizationPercent,
    ContainersUnhealthy,
    ContainersStopped,
    /// Services currently unhealthy or stopped
    ServicesUnhealthy,
}

impl MetricField {
    pub fn value(self, snapshot: &MetricSnapshot, services: &[ServiceHealth]) -> f64 {
        match self {
            MetricField::CpuPercent => snapshot.cpu.usage_percent,
            MetricField::MemoryPercent => snapshot.memory.percent,
            MetricField::DiskPercent => snapshot.disk.percent,
            MetricField::NetworkRxMbps => snapshot.network.rx_mbps(),
            MetricField::NetworkTxMbps => snapshot.network.tx_mbps(),
            MetricField::NetworkUtilizationPercent => snapshot.network.utilization_percent(),
            MetricField::ContainersUnhealthy => snapshot.containers.unhealthy as f64,
            MetricField::ContainersStopped => snapshot.containers.stopped as f64,
            MetricField::ServicesUnhealthy => {
                services.iter().filter(|service| service.status.is_down()).count() as f64
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparator {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Lt => value < threshold,
            Comparator::Le => value <= threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub metric: MetricField,
    pub comparator: Comparator,
    pub threshold: f64,
    pub severity: Severity,

    /// Message template; `{value}`, `{threshold}` and `{rule}` are substituted
    pub message: String,
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        metric: MetricField,
        comparator: Comparator,
        threshold: f64,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            metric,
            comparator,
            threshold,
            severity,
            message: message.into(),
        }
    }

    fn render(&self, value: f64) -> String {
        self.message
            .replace("{value}", &format!("{value:.1}"))
            .replace("{threshold}", &format!("{}", self.threshold))
            .replace("{rule}", &self.id)
    }
}

/// Rule table used when the configuration does not provide one
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "cpu_high",
            MetricField::CpuPercent,
            Comparator::Gt,
            80.0,
            Severity::Warning,
            "CPU usage is {value}% (limit {threshold}%)",
        ),
        AlertRule::new(
            "memory_high",
            MetricField::MemoryPercent,
            Comparator::Gt,
            85.0,
            Severity::Warning,
            "Memory usage is {value}% (limit {threshold}%)",
        ),
        AlertRule::new(
            "disk_high",
            MetricField::DiskPercent,
            Comparator::Gt,
            90.0,
            Severity::Critical,
            "Disk usage is {value}% (limit {threshold}%)",
        ),
        AlertRule::new(
            "containers_unhealthy",
            MetricField::ContainersUnhealthy,
            Comparator::Gt,
            0.0,
            Severity::Critical,
            "{value} container(s) report an unhealthy state",
        ),
        AlertRule::new(
            "services_down",
            MetricField::ServicesUnhealthy,
            Comparator::Gt,
            0.0,
            Severity::Critical,
            "{value} service(s) are unhealthy or stopped",
        ),
    ]
}

/// A change in an alert's firing state produced by one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum AlertTransition {
    Fired(Alert),
    Resolved(Alert),
}

impl AlertTransition {
    pub fn alert(&self) -> &Alert {
        match self {
            AlertTransition::Fired(alert) | AlertTransition::Resolved(alert) => alert,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Firing alerts in rule order, then resolved alerts newest-first
    pub alerts: Vec<Alert>,
    pub transitions: Vec<AlertTransition>,
}

pub fn evaluate(
    snapshot: &MetricSnapshot,
    services: &[ServiceHealth],
    previous: &[Alert],
    rules: &[AlertRule],
    max_resolved_history: usize,
    now: DateTime<Utc>,
) -> Evaluation {
    let mut firing = Vec::new();
    let mut resolved: Vec<Alert> = previous
        .iter()
        .filter(|alert| !alert.is_firing())
        .cloned()
        .collect();
    let mut transitions = Vec::new();

    for rule in rules {
        let value = rule.metric.value(snapshot, services);
        let satisfied = rule.comparator.holds(value, rule.threshold);
        let current = previous
            .iter()
            .find(|alert| alert.is_firing() && alert.rule_id == rule.id);

        match (satisfied, current) {
            (true, Some(alert)) => firing.push(alert.clone()),

            (true, None) => {
                let alert = Alert {
                    id: unique_id(&rule.id, now, previous),
                    rule_id: rule.id.clone(),
                    severity: rule.severity,
                    message: rule.render(value),
                    first_fired_at: now,
                    acknowledged: false,
                    resolved_at: None,
                };
                debug!("{}: alert fired ({value:.1} vs {})", rule.id, rule.threshold);
                transitions.push(AlertTransition::Fired(alert.clone()));
                firing.push(alert);
            }

            (false, Some(alert)) => {
                debug!("{}: alert resolved ({value:.1} vs {})", rule.id, rule.threshold);
                let alert = resolve(alert, now);
                transitions.push(AlertTransition::Resolved(alert.clone()));
                resolved.push(alert);
            }

            (false, None) => {}
        }
    }

    // Rules removed from the table cannot keep their alerts firing
    for orphan in previous
        .iter()
        .filter(|alert| alert.is_firing() && !rules.iter().any(|rule| rule.id == alert.rule_id))
    {
        debug!("{}: rule no longer configured, resolving alert", orphan.rule_id);
        let alert = resolve(orphan, now);
        transitions.push(AlertTransition::Resolved(alert.clone()));
        resolved.push(alert);
    }

    resolved.sort_by(|a, b| b.resolved_at.cmp(&a.resolved_at));
    resolved.truncate(max_resolved_history);

    firing.extend(resolved);

    Evaluation {
        alerts: firing,
        transitions,
    }
}

/// Mark an alert acknowledged, returning the updated set or `None` for unknown ids
///
/// Acknowledging does not resolve the alert.
pub fn acknowledge(alerts: &[Alert], id: &str) -> Option<Vec<Alert>> {
    if !alerts.iter().any(|alert| alert.id == id) {
        return None;
    }

    Some(
        alerts
            .iter()
            .map(|alert| {
                let mut alert = alert.clone();
                if alert.id == id {
                    alert.acknowledged = true;
                }
                alert
            })
            .collect(),
    )
}

fn resolve(alert: &Alert, now: DateTime<Utc>) -> Alert {
    let mut alert = alert.clone();
    alert.resolved_at = Some(now);
    alert
}

fn unique_id(rule_id: &str, now: DateTime<Utc>, previous: &[Alert]) -> String {
    let base = format!("{rule_id}-{}", now.timestamp_millis());
    if !previous.iter().any(|alert| alert.id == base) {
        return base;
    }

    (1..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !previous.iter().any(|alert| &alert.id == candidate))
        .unwrap_or(base)
}
