//! SQL schema for the clan sync SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per known clan or player. Tags are stored without the leading '#'.
CREATE TABLE IF NOT EXISTS tracked_entity (
    entity_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    kind             TEXT    NOT NULL,   -- 'clan' | 'player'
    tag              TEXT    NOT NULL,
    is_to_be_tracked INTEGER NOT NULL DEFAULT 0,
    first_seen       TEXT    NOT NULL,   -- RFC 3339 UTC
    last_synced      TEXT    NOT NULL,
    UNIQUE (kind, tag)
);

-- Last known JSON per entity. Wars are stored under their clan's id.
CREATE TABLE IF NOT EXISTS entity_snapshot (
    kind         TEXT    NOT NULL,       -- 'clan' | 'player' | 'war'
    entity_id    INTEGER NOT NULL REFERENCES tracked_entity(entity_id),
    snapshot     TEXT    NOT NULL,
    last_updated TEXT    NOT NULL,
    PRIMARY KEY (kind, entity_id)
);

-- Append-only change log.
CREATE TABLE IF NOT EXISTS audit_log (
    audit_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id   INTEGER NOT NULL REFERENCES tracked_entity(entity_id),
    owner_kind TEXT    NOT NULL,
    event_type TEXT    NOT NULL,
    detail     TEXT    NOT NULL,
    added_on   TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS audit_log_owner_added
    ON audit_log (owner_id, added_on);

-- One row per war, updated in place while the war runs.
CREATE TABLE IF NOT EXISTS war_log (
    war_id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id        INTEGER NOT NULL REFERENCES tracked_entity(entity_id),
    start_time      TEXT    NOT NULL,
    end_time        TEXT    NOT NULL,
    opponent_tag    TEXT    NOT NULL,
    opponent_name   TEXT    NOT NULL,
    opponent_league TEXT,
    clan_stars      INTEGER NOT NULL,
    opponent_stars  INTEGER NOT NULL,
    state           TEXT    NOT NULL,   -- 'preparation' | 'inWar' | 'warEnded'
    war             TEXT    NOT NULL,
    UNIQUE (owner_id, start_time, end_time, opponent_tag)
);

CREATE INDEX IF NOT EXISTS war_log_owner_start
    ON war_log (owner_id, start_time);
";
