//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{TimeZone, Utc};
use clansync_core::model::{
    AuditLogRecord, EntityKind, EventType, HistoryCategory, Tag, WarLogRecord, WarPhase, WarUpsert,
};
use clansync_core::traits::{AuditStore, EntityRegistry, SnapshotStore, WarLogStore};
use serde_json::json;

use crate::SqliteStore;

async fn store() -> SqliteStore {
    SqliteStore::open_in_memory()
        .await
        .expect("in-memory store")
}

fn tag(raw: &str) -> Tag {
    Tag::parse(raw).unwrap()
}

fn audit(owner_id: i64, event_type: EventType, minute: u32) -> AuditLogRecord {
    AuditLogRecord {
        id: None,
        owner_id,
        owner_kind: EntityKind::Clan,
        event_type,
        detail: format!("{event_type} at minute {minute}"),
        added_on: Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap(),
    }
}

fn war_row(owner_id: i64, clan_stars: u32, state: WarPhase) -> WarLogRecord {
    WarLogRecord {
        id: None,
        owner_id,
        start_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        end_time: Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap(),
        opponent_tag: tag("#O1"),
        opponent_name: "Rival".to_string(),
        opponent_league: Some("Crystal League I".to_string()),
        clan_stars,
        opponent_stars: 0,
        state,
        war: json!({ "state": "inWar" }),
    }
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_is_find_or_create() {
    let s = store().await;

    let first = s.register(EntityKind::Clan, &tag("#2PP"), false).await.unwrap();
    assert!(first.created);
    assert!(!first.entity.is_to_be_tracked);
    assert_eq!(first.entity.tag, tag("#2PP"));

    let again = s.register(EntityKind::Clan, &tag("#2pp"), true).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.entity.internal_id, first.entity.internal_id);
    assert!(again.entity.is_to_be_tracked);

    let downgrade = s.register(EntityKind::Clan, &tag("#2PP"), false).await.unwrap();
    assert!(downgrade.entity.is_to_be_tracked, "register never untracks");
}

#[tokio::test]
async fn same_tag_is_distinct_per_kind() {
    let s = store().await;
    let clan = s.register(EntityKind::Clan, &tag("#2PP"), true).await.unwrap();
    let player = s.register(EntityKind::Player, &tag("#2PP"), true).await.unwrap();
    assert!(player.created);
    assert_ne!(clan.entity.internal_id, player.entity.internal_id);
}

#[tokio::test]
async fn tracked_tags_follow_the_flag() {
    let s = store().await;
    s.register(EntityKind::Player, &tag("#P1"), true).await.unwrap();
    s.register(EntityKind::Player, &tag("#P2"), false).await.unwrap();
    s.register(EntityKind::Player, &tag("#P3"), true).await.unwrap();

    assert_eq!(
        s.tracked_tags(EntityKind::Player).await.unwrap(),
        vec![tag("#P1"), tag("#P3")]
    );

    assert!(s.set_tracked(EntityKind::Player, &tag("#P1"), false).await.unwrap());
    assert!(!s.set_tracked(EntityKind::Player, &tag("#P9"), true).await.unwrap());
    assert_eq!(s.tracked_tags(EntityKind::Player).await.unwrap(), vec![tag("#P3")]);
    assert!(s.tracked_tags(EntityKind::Clan).await.unwrap().is_empty());
}

#[tokio::test]
async fn lookup_missing_returns_none() {
    let s = store().await;
    assert!(s.lookup(EntityKind::Clan, &tag("#C404")).await.unwrap().is_none());
    assert!(s.resolve_owner(EntityKind::Clan, &tag("#C404")).await.unwrap().is_none());
}

#[tokio::test]
async fn mark_synced_updates_timestamp() {
    let s = store().await;
    let registered = s.register(EntityKind::Clan, &tag("#C1"), true).await.unwrap();
    let later = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

    s.mark_synced(EntityKind::Clan, &tag("#C1"), later).await.unwrap();

    let entity = s.lookup(EntityKind::Clan, &tag("#C1")).await.unwrap().unwrap();
    assert_eq!(entity.last_synced, later);
    assert_eq!(entity.first_seen, registered.entity.first_seen);
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshots_are_overwritten_in_place() {
    let s = store().await;
    let id = s.register(EntityKind::Clan, &tag("#C1"), true).await.unwrap().entity.internal_id;

    assert!(!s.has_snapshot(EntityKind::Clan, id).await.unwrap());
    s.put_snapshot(EntityKind::Clan, id, &json!({ "name": "Alpha" })).await.unwrap();
    s.put_snapshot(EntityKind::Clan, id, &json!({ "name": "Beta" })).await.unwrap();
    s.put_snapshot(EntityKind::War, id, &json!({ "state": "notInWar" })).await.unwrap();

    let clan = s.get_snapshot(EntityKind::Clan, id).await.unwrap().unwrap();
    assert_eq!(clan.snapshot["name"], "Beta");
    let war = s.get_snapshot(EntityKind::War, id).await.unwrap().unwrap();
    assert_eq!(war.snapshot["state"], "notInWar");
}

// ─── Audit log ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_answers_on_open_connection() {
    let s = store().await;
    assert!(s.ping().await);
}

#[tokio::test]
async fn history_filters_by_category_newest_first() {
    let s = store().await;
    let id = s.register(EntityKind::Clan, &tag("#C1"), true).await.unwrap().entity.internal_id;

    s.append_batch(&[
        audit(id, EventType::ClanNameChanged, 1),
        audit(id, EventType::MemberJoined, 2),
        audit(id, EventType::ClanLevelChanged, 3),
        audit(id, EventType::WarBegin, 4),
    ])
    .await
    .unwrap();

    let profile = s.history(id, HistoryCategory::Profile, 10).await.unwrap();
    let types: Vec<_> = profile.iter().map(|r| r.event_type).collect();
    assert_eq!(types, vec![EventType::ClanLevelChanged, EventType::ClanNameChanged]);

    let all = s.history(id, HistoryCategory::All, 2).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].event_type, EventType::WarBegin);
    assert!(all[0].id.is_some());

    let membership = s.history(id, HistoryCategory::Membership, 10).await.unwrap();
    assert_eq!(membership.len(), 1);
    assert_eq!(membership[0].detail, "member_joined at minute 2");
}

#[tokio::test]
async fn same_instant_records_keep_insertion_order() {
    let s = store().await;
    let id = s.register(EntityKind::Clan, &tag("#C1"), true).await.unwrap().entity.internal_id;

    s.append_batch(&[
        audit(id, EventType::ClanNameChanged, 5),
        audit(id, EventType::MemberJoined, 5),
    ])
    .await
    .unwrap();

    let all = s.history(id, HistoryCategory::All, 10).await.unwrap();
    assert_eq!(all[0].event_type, EventType::MemberJoined);
    assert_eq!(all[1].event_type, EventType::ClanNameChanged);
}

#[tokio::test]
async fn batch_with_unknown_owner_is_rejected_whole() {
    let s = store().await;
    let id = s.register(EntityKind::Clan, &tag("#C1"), true).await.unwrap().entity.internal_id;

    let result = s
        .append_batch(&[
            audit(id, EventType::ClanNameChanged, 1),
            audit(id + 100, EventType::ClanNameChanged, 2),
        ])
        .await;
    assert!(result.is_err());
    assert!(s.history(id, HistoryCategory::All, 10).await.unwrap().is_empty());
}

// ─── War log ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn war_upsert_keeps_one_row() {
    let s = store().await;
    let id = s.register(EntityKind::Clan, &tag("#C1"), true).await.unwrap().entity.internal_id;

    let first = s.upsert_war(&war_row(id, 0, WarPhase::Preparation)).await.unwrap();
    assert!(matches!(first, WarUpsert::Inserted(_)));

    let second = s.upsert_war(&war_row(id, 7, WarPhase::InWar)).await.unwrap();
    assert_eq!(second, WarUpsert::Updated(first.id()));

    let log = s.war_log(id, 10).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].clan_stars, 7);
    assert_eq!(log[0].state, WarPhase::InWar);
    assert_eq!(log[0].opponent_tag, tag("#O1"));
    assert_eq!(log[0].opponent_league.as_deref(), Some("Crystal League I"));

    let found = s.find_war(&log[0].key()).await.unwrap();
    assert_eq!(found.map(|w| w.id), Some(Some(first.id())));
}

#[tokio::test]
async fn update_of_missing_war_fails() {
    let s = store().await;
    let id = s.register(EntityKind::Clan, &tag("#C1"), true).await.unwrap().entity.internal_id;
    assert!(s.update_war(42, &war_row(id, 1, WarPhase::InWar)).await.is_err());
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clansync.db");

    {
        let s = SqliteStore::open(&path).await.unwrap();
        let id = s.register(EntityKind::Clan, &tag("#C1"), true).await.unwrap().entity.internal_id;
        s.append_batch(&[audit(id, EventType::ClanDisbanded, 1)]).await.unwrap();
    }

    let reopened = SqliteStore::open(&path).await.unwrap();
    let entity = reopened.lookup(EntityKind::Clan, &tag("#C1")).await.unwrap().unwrap();
    assert!(entity.is_to_be_tracked);
    let history = reopened
        .history(entity.internal_id, HistoryCategory::All, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].event_type, EventType::ClanDisbanded);
}
