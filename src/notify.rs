//! Outbound alert notifications
//!
//! Fired and resolved alerts are pushed to every configured target. Delivery is
//! best effort: failures are logged and never fed back into the collection cycle.

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument};

use crate::alerts::AlertTransition;
use crate::config::{Discord, NotificationTarget, Webhook};
use crate::{Alert, Severity};

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

const RED: u32 = 15158332;
const ORANGE: u32 = 15105570;
const LIGHT_BLUE: u32 = 5793266;
const GREEN: u32 = 3066993;

#[derive(Debug, Clone)]
pub struct AlertNotifier {
    client: Client,
    targets: Vec<NotificationTarget>,
}

impl AlertNotifier {
    /// `None` when no targets are configured
    pub fn from_targets(targets: &[NotificationTarget]) -> Option<Self> {
        if targets.is_empty() {
            return None;
        }

        Some(Self {
            client: Client::new(),
            targets: targets.to_vec(),
        })
    }

    #[instrument(skip_all, fields(transitions = transitions.len()))]
    pub async fn notify(&self, transitions: &[AlertTransition]) {
        for transition in transitions {
            for target in &self.targets {
                match target {
                    NotificationTarget::Discord(discord) => {
                        self.send_discord(discord, &discord_message(transition, discord)).await;
                    }
                    NotificationTarget::Webhook(webhook) => {
                        self.send_webhook(webhook, transition).await;
                    }
                }
            }
        }
    }

    async fn send_discord(&self, discord: &Discord, message: &Message) {
        match self.client.post(&discord.url).json(message).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent Discord message");
                } else {
                    error!("Discord message failed with status: {}", response.status());
                    if let Ok(error_text) = response.text().await {
                        error!("Discord API error response: {}", error_text);
                    }
                }
            }
            Err(e) => {
                error!("Failed to send Discord message: {}", e);
            }
        }
    }

    async fn send_webhook(&self, webhook: &Webhook, transition: &AlertTransition) {
        let payload = webhook_payload(transition);

        match self.client.post(&webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook alert");
                } else {
                    error!("Webhook alert failed with status: {}", response.status());
                }
            }
            Err(e) => {
                error!("Failed to send webhook alert: {}", e);
            }
        }
    }
}

fn state_label(transition: &AlertTransition) -> &'static str {
    match transition {
        AlertTransition::Fired(_) => "fired",
        AlertTransition::Resolved(_) => "resolved",
    }
}

pub fn webhook_payload(transition: &AlertTransition) -> serde_json::Value {
    let alert = transition.alert();

    json!({
        "message": alert.message,
        "alertId": alert.id,
        "rule": alert.rule_id,
        "severity": alert.severity,
        "state": state_label(transition),
        "firstFiredAt": alert.first_fired_at.to_rfc3339(),
        "resolvedAt": alert.resolved_at.map(|at| at.to_rfc3339()),
        "timestamp": Utc::now().to_rfc3339()
    })
}

pub fn discord_message(transition: &AlertTransition, discord: &Discord) -> Message {
    let alert = transition.alert();
    let embed = build_embed(transition);

    let content = discord.user_id.as_ref().map(|user_id| {
        let emoji = match transition {
            AlertTransition::Fired(_) => "🔴",
            AlertTransition::Resolved(_) => "✅",
        };
        format!("{emoji} `{}` <@{user_id}>", alert.rule_id)
    });

    Message {
        content,
        embeds: vec![embed],
    }
}

fn build_embed(transition: &AlertTransition) -> Embed {
    let alert = transition.alert();

    let (title, color) = match transition {
        AlertTransition::Fired(Alert {
            severity: Severity::Critical,
            ..
        }) => ("🔥 Critical Alert", RED),
        AlertTransition::Fired(Alert {
            severity: Severity::Warning,
            ..
        }) => ("⚠️ Warning", ORANGE),
        AlertTransition::Fired(_) => ("ℹ️ Notice", LIGHT_BLUE),
        AlertTransition::Resolved(_) => ("✅ Resolved", GREEN),
    };

    let mut fields = vec![
        EmbedField {
            name: "Rule".to_string(),
            value: format!("`{}`", alert.rule_id),
            inline: true,
        },
        EmbedField {
            name: "Severity".to_string(),
            value: format!("{:?}", alert.severity),
            inline: true,
        },
    ];

    if let Some(resolved_at) = alert.resolved_at {
        let firing_for = resolved_at - alert.first_fired_at;
        fields.push(EmbedField {
            name: "Firing for".to_string(),
            value: format!("{}s", firing_for.num_seconds()),
            inline: true,
        });
    }

    Embed {
        title: Some(title.to_string()),
        description: Some(alert.message.clone()),
        color: Some(color),
        fields,
        timestamp: Some(Utc::now().to_rfc3339()),
    }
}
