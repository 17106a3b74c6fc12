//! Rendering of one change report as a webhook embed.

use crate::snapshot::{section, Diff, Snapshot};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

/// Embed field values are capped by the webhook API.
const FIELD_VALUE_LIMIT: usize = 1024;

const COLOR_ONLINE: u32 = 0x2ECC71;
const COLOR_IN_GAME: u32 = 0xE74C3C;
const COLOR_IDLE: u32 = 0x95A5A6;

#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub color: u32,
    pub thumbnail: Thumbnail,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
    pub footer: Footer,
}

#[derive(Debug, Serialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Serialize)]
pub struct Footer {
    pub text: String,
}

/// Build the change report for one user: a section of before → after
/// lines per changed sub-resource, then a summary of the fresh snapshot.
pub fn build_report(username: &str, id: u64, snapshot: &Snapshot, changes: &Diff) -> WebhookPayload {
    let status = snapshot.presence.status_label();
    let (color, icon) = match status.as_str() {
        "In Game" => (COLOR_IN_GAME, "\u{1F3AE}"),
        "Online" => (COLOR_ONLINE, "\u{1F7E2}"),
        _ => (COLOR_IDLE, "\u{26AA}"),
    };

    let shown_name = if snapshot.profile.name.is_empty() {
        username
    } else {
        &snapshot.profile.name
    };

    let mut fields = Vec::new();
    for (label, section_name) in [
        ("Profile changes", "profile"),
        ("Avatar changes", "avatar"),
        ("Presence changes", "presence"),
    ] {
        let entries = section(changes, section_name);
        if entries.is_empty() {
            continue;
        }
        let lines: Vec<String> = entries
            .iter()
            .map(|(field, change)| {
                format!(
                    "**{}**: `{}` \u{2192} `{}`",
                    field,
                    render_value(&change.before),
                    render_value(&change.after)
                )
            })
            .collect();
        fields.push(EmbedField {
            name: label.to_string(),
            value: truncate(&lines.join("\n"), FIELD_VALUE_LIMIT),
            inline: false,
        });
    }

    let mut summary = vec![
        format!("ID: {}", id),
        format!("Name: {}", snapshot.profile.name),
        format!("DisplayName: {}", snapshot.profile.display_name),
        format!("Status: {}", status),
    ];
    if !snapshot.presence.last_location.is_empty() {
        summary.push(format!("Location: {}", snapshot.presence.last_location));
    }
    fields.push(EmbedField {
        name: "Snapshot".to_string(),
        value: truncate(&summary.join("\n"), FIELD_VALUE_LIMIT),
        inline: false,
    });

    let embed = Embed {
        title: format!("{} {} \u{2014} {}", icon, status, shown_name),
        url: format!("https://www.roblox.com/users/{}/profile", id),
        color,
        thumbnail: Thumbnail {
            url: format!(
                "https://www.roblox.com/headshot-thumbnail/image?userId={}&width=150&height=150&format=png",
                id
            ),
        },
        fields,
        timestamp: Utc::now().to_rfc3339(),
        footer: Footer {
            text: "Public-only monitoring".to_string(),
        },
    };

    WebhookPayload {
        embeds: vec![embed],
    }
}

/// Bare text for strings, JSON for everything else.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cut at the last char boundary at or below `limit` bytes.
fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
