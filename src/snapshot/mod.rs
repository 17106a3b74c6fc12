use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};


/// Compacted profile attributes of one user
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub description: String,
}

/// Compacted avatar metadata
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AvatarFields {
    #[serde(default)]
    pub avatar_type: String,
    #[serde(default)]
    pub asset_count: u64,
}

/// Compacted presence status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceFields {
    #[serde(default)]
    pub presence_type: Option<i64>,
    #[serde(default)]
    pub last_location: String,
    #[serde(default)]
    pub place_id: Option<u64>,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub last_online: Option<String>,
}

impl PresenceFields {
    /// Friendly name for the presence code. Codes vary between endpoints;
    /// 2 is online, 3 is in-game, 0 and 1 are offline.
    pub fn status_label(&self) -> String {
        match self.presence_type {
            Some(2) => "Online".to_string(),
            Some(3) => "In Game".to_string(),
            Some(0) | Some(1) => "Offline".to_string(),
            Some(code) => code.to_string(),
            None => "Unknown".to_string(),
        }
    }
}

/// Observable state of one user at one poll. Only the latest snapshot
/// per user is retained.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub profile: ProfileFields,
    #[serde(default)]
    pub avatar: AvatarFields,
    #[serde(default)]
    pub presence: PresenceFields,
}

/// One changed field: value at the previous poll and value now.
/// A field absent on one side is reported as null.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldChange {
    pub before: Value,
    pub after: Value,
}

/// Field-level delta between two snapshots, keyed by "section.field".
/// BTreeMap keeps report ordering stable across passes.
pub type Diff = BTreeMap<String, FieldChange>;

/// Compare two snapshots field by field.
///
/// Pure and deterministic: values are compared by their canonical JSON
/// representation, with no field-specific semantics. An empty result
/// means no observable change.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Diff {
    let before = flatten(previous);
    let after = flatten(current);

    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    let mut changes = Diff::new();
    for key in keys {
        let b = before.get(key).cloned().unwrap_or(Value::Null);
        let a = after.get(key).cloned().unwrap_or(Value::Null);
        if b != a {
            changes.insert(key.clone(), FieldChange { before: b, after: a });
        }
    }
    changes
}

/// Changes within one section of the diff ("profile", "avatar", "presence"),
/// with the section prefix stripped.
pub fn section<'a>(changes: &'a Diff, name: &str) -> Vec<(&'a str, &'a FieldChange)> {
    let prefix = format!("{}.", name);
    changes
        .iter()
        .filter_map(|(key, change)| key.strip_prefix(&prefix).map(|field| (field, change)))
        .collect()
}

fn flatten(snapshot: &Snapshot) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();

    let p = &snapshot.profile;
    fields.insert("profile.id".to_string(), json!(p.id));
    fields.insert("profile.name".to_string(), json!(p.name));
    fields.insert("profile.display_name".to_string(), json!(p.display_name));
    fields.insert("profile.created".to_string(), json!(p.created));
    fields.insert("profile.description".to_string(), json!(p.description));

    let a = &snapshot.avatar;
    fields.insert("avatar.avatar_type".to_string(), json!(a.avatar_type));
    fields.insert("avatar.asset_count".to_string(), json!(a.asset_count));

    let pr = &snapshot.presence;
    fields.insert("presence.presence_type".to_string(), json!(pr.presence_type));
    fields.insert("presence.last_location".to_string(), json!(pr.last_location));
    fields.insert("presence.place_id".to_string(), json!(pr.place_id));
    fields.insert("presence.game_id".to_string(), json!(pr.game_id));
    fields.insert("presence.last_online".to_string(), json!(pr.last_online));

    fields
}
