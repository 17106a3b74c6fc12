use super::*;
use crate::snapshot::PresenceFields;
use chrono::TimeZone;

fn changed_diff() -> Diff {
    let before = Snapshot {
        presence: PresenceFields {
            presence_type: Some(2),
            ..PresenceFields::default()
        },
        ..Snapshot::default()
    };
    let after = Snapshot {
        presence: PresenceFields {
            presence_type: Some(3),
            ..PresenceFields::default()
        },
        ..Snapshot::default()
    };
    diff(&before, &after)
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

#[test]
fn test_empty_diff_never_notifies() {
    let cooldown = chrono::Duration::seconds(30);
    assert!(!notification_permitted(&Diff::new(), None, at(0), cooldown));
    assert!(!notification_permitted(
        &Diff::new(),
        Some(at(-3600)),
        at(0),
        cooldown
    ));
}

#[test]
fn test_change_with_elapsed_cooldown_is_permitted() {
    let cooldown = chrono::Duration::seconds(30);
    let changes = changed_diff();
    assert!(notification_permitted(&changes, Some(at(-30)), at(0), cooldown));
    assert!(notification_permitted(&changes, Some(at(-31)), at(0), cooldown));
    assert!(notification_permitted(&changes, None, at(0), cooldown));
}

#[test]
fn test_change_within_cooldown_is_suppressed() {
    let cooldown = chrono::Duration::seconds(30);
    let changes = changed_diff();
    assert!(!notification_permitted(&changes, Some(at(-29)), at(0), cooldown));
    assert!(!notification_permitted(&changes, Some(at(0)), at(0), cooldown));
}

#[test]
fn test_epoch_seed_always_permits_first_notification() {
    // Fresh users are seeded with the epoch so the first change notifies
    let cooldown = chrono::Duration::seconds(3600);
    let changes = changed_diff();
    assert!(notification_permitted(
        &changes,
        Some(DateTime::UNIX_EPOCH),
        Utc::now(),
        cooldown
    ));
}

#[test]
fn test_resolve_tracked_keeps_configuration_order() {
    let usernames = vec![
        "carol".to_string(),
        "alice".to_string(),
        "bob".to_string(),
    ];
    let mapping = HashMap::from([
        ("alice".to_string(), 1),
        ("bob".to_string(), 2),
        ("carol".to_string(), 3),
    ]);

    let users = resolve_tracked(&usernames, &mapping);
    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["carol", "alice", "bob"]);
}

#[test]
fn test_resolve_tracked_drops_unresolved_names() {
    let usernames = vec!["alice".to_string(), "bob".to_string()];
    let mapping = HashMap::from([("alice".to_string(), 1)]);

    let users = resolve_tracked(&usernames, &mapping);
    assert_eq!(
        users,
        vec![TrackedUser {
            name: "alice".to_string(),
            id: 1
        }]
    );
}

#[test]
fn test_resolve_tracked_collapses_duplicates() {
    let usernames = vec![
        "alice".to_string(),
        "alice".to_string(),
        "bob".to_string(),
    ];
    let mapping = HashMap::from([("alice".to_string(), 1), ("bob".to_string(), 2)]);

    let users = resolve_tracked(&usernames, &mapping);
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].name, "alice");
    assert_eq!(users[1].name, "bob");
}

#[test]
fn test_next_pass_delay_accounts_for_work_time() {
    let target = Duration::from_secs(10);
    assert_eq!(
        next_pass_delay(target, Duration::from_secs(3)),
        Duration::from_secs(7)
    );
    assert_eq!(next_pass_delay(target, Duration::ZERO), target);
}

#[test]
fn test_next_pass_delay_never_negative() {
    let target = Duration::from_secs(10);
    assert_eq!(
        next_pass_delay(target, Duration::from_secs(25)),
        Duration::ZERO
    );
}
