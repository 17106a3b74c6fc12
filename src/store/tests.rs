use super::*;
use crate::snapshot::{PresenceFields, ProfileFields};
use chrono::TimeZone;
use tempfile::TempDir;

fn sample_state() -> PersistedState {
    let mut state = PersistedState::default();
    state.snapshots.insert(
        "alice".to_string(),
        Snapshot {
            profile: ProfileFields {
                id: 42,
                name: "alice".to_string(),
                ..ProfileFields::default()
            },
            presence: PresenceFields {
                presence_type: Some(2),
                ..PresenceFields::default()
            },
            ..Snapshot::default()
        },
    );
    state.last_notified_at.insert(
        "alice".to_string(),
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
    );
    state
}

#[test]
fn test_save_and_load_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");

    let state = sample_state();
    state.save(&path).unwrap();

    let loaded = PersistedState::load(&path);
    assert_eq!(loaded.snapshots.len(), 1);
    assert_eq!(loaded.snapshot_for("alice").profile.id, 42);
    assert_eq!(
        loaded.last_notified_at["alice"],
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    );
}

#[test]
fn test_missing_file_is_empty_state() {
    let temp_dir = TempDir::new().unwrap();
    let state = PersistedState::load(&temp_dir.path().join("absent.json"));
    assert!(state.snapshots.is_empty());
    assert!(state.last_notified_at.is_empty());
}

#[test]
fn test_corrupt_file_degrades_to_empty_state() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");
    fs::write(&path, "{ not json").unwrap();

    let state = PersistedState::load(&path);
    assert!(state.snapshots.is_empty());
}

#[test]
fn test_save_overwrites_previous_state() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");

    sample_state().save(&path).unwrap();

    let mut updated = sample_state();
    updated
        .snapshots
        .get_mut("alice")
        .unwrap()
        .presence
        .presence_type = Some(3);
    updated.save(&path).unwrap();

    let loaded = PersistedState::load(&path);
    assert_eq!(loaded.snapshot_for("alice").presence.presence_type, Some(3));
    // No .tmp file left behind after the rename
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn test_state_file_is_human_inspectable() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");
    sample_state().save(&path).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    // Pretty-printed JSON: multi-line with indentation
    assert!(raw.contains('\n'));
    assert!(raw.contains("\"snapshots\""));
    assert!(raw.contains("\"last_notified_at\""));
}

#[test]
fn test_snapshot_for_unknown_user_is_default() {
    let state = PersistedState::default();
    assert_eq!(state.snapshot_for("nobody"), Snapshot::default());
}

#[test]
fn test_tolerates_extra_fields_in_state_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state.json");
    fs::write(
        &path,
        r#"{ "snapshots": {}, "last_notified_at": {}, "schema": 1 }"#,
    )
    .unwrap();

    let state = PersistedState::load(&path);
    assert!(state.snapshots.is_empty());
}
