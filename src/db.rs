// 💾 SQLite record store
//
// Frameworks, nodes (levels + competencies) and scales live in SQLite.
// Every write also lands in the `events` table so an import can be audited
// after the fact ("every change is an event").

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::context::AuditContext;
use crate::entities::{
    Framework, FrameworkDraft, FrameworkId, Node, NodeDraft, NodeId, Parent, Scale,
    ScaleConfiguration, ScaleId,
};
use crate::error::{StoreError, StoreResult};
use crate::store::{RecordStore, ScaleLookup};

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// Event for audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        ctx: &AuditContext,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: ctx.now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: ctx.actor(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    // Enable WAL mode for crash recovery (in-memory databases report "memory")
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scales (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            scale TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS frameworks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            shortname TEXT NOT NULL,
            idnumber TEXT UNIQUE NOT NULL,
            description TEXT NOT NULL,
            scaleid INTEGER NOT NULL,
            scaleconfiguration TEXT NOT NULL,
            visible INTEGER NOT NULL DEFAULT 1,
            timecreated TEXT NOT NULL,
            timemodified TEXT NOT NULL,
            usermodified INTEGER NOT NULL
        )",
        [],
    )?;

    // parentid = 0 marks a level (child of the framework root)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS competencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            frameworkid INTEGER NOT NULL REFERENCES frameworks(id),
            idnumber TEXT NOT NULL,
            shortname TEXT NOT NULL,
            description TEXT NOT NULL,
            parentid INTEGER NOT NULL DEFAULT 0,
            timecreated TEXT NOT NULL,
            timemodified TEXT NOT NULL,
            usermodified INTEGER NOT NULL,
            UNIQUE (frameworkid, idnumber)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_competencies_parent ON competencies(frameworkid, parentid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> StoreResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> StoreResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_column(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// ============================================================================
// SQLITE STORE
// ============================================================================

const NODE_COLUMNS: &str = "id, frameworkid, idnumber, shortname, description, parentid,
                            timecreated, timemodified, usermodified";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Register a rating scale (scale administration itself lives elsewhere)
    pub fn insert_scale(&self, name: &str, values: &[String]) -> StoreResult<ScaleId> {
        self.conn.execute(
            "INSERT INTO scales (name, scale) VALUES (?1, ?2)",
            params![name, values.join(",")],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn count_nodes(&self, framework_id: FrameworkId) -> StoreResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM competencies WHERE frameworkid = ?1",
            params![framework_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Competencies attached to one level
    pub fn children(&self, parent_id: NodeId) -> StoreResult<Vec<Node>> {
        let sql = format!(
            "SELECT {} FROM competencies WHERE parentid = ?1 ORDER BY id",
            NODE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(params![parent_id], node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    fn node_exists(&self, id: NodeId) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT id FROM competencies WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        framework_id: row.get(1)?,
        external_id: row.get(2)?,
        short_name: row.get(3)?,
        description: row.get(4)?,
        parent: Parent::from_column(row.get(5)?),
        created_at: timestamp_column(row, 6)?,
        modified_at: timestamp_column(row, 7)?,
        modified_by: row.get(8)?,
    })
}

fn framework_from_row(row: &Row<'_>) -> rusqlite::Result<Framework> {
    let config_json: String = row.get(4)?;
    let scale_configuration: ScaleConfiguration = serde_json::from_str(&config_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Framework {
        id: row.get(0)?,
        short_name: row.get(1)?,
        external_id: row.get(2)?,
        description: row.get(3)?,
        scale_configuration,
        visible: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
        modified_at: timestamp_column(row, 7)?,
        modified_by: row.get(8)?,
    })
}

impl RecordStore for SqliteStore {
    fn find(&self, framework_id: FrameworkId, external_id: &str) -> StoreResult<Option<Node>> {
        let sql = format!(
            "SELECT {} FROM competencies WHERE frameworkid = ?1 AND idnumber = ?2",
            NODE_COLUMNS
        );
        let node = self
            .conn
            .query_row(&sql, params![framework_id, external_id], node_from_row)
            .optional()?;
        Ok(node)
    }

    fn create(&mut self, draft: &NodeDraft, ctx: &AuditContext) -> StoreResult<NodeId> {
        if self.framework(draft.framework_id)?.is_none() {
            return Err(StoreError::FrameworkNotFound(draft.framework_id));
        }
        if let Parent::Node(parent_id) = draft.parent {
            if !self.node_exists(parent_id)? {
                return Err(StoreError::NodeNotFound(parent_id));
            }
        }

        let now = ctx.now().to_rfc3339();
        let result = self.conn.execute(
            "INSERT INTO competencies (
                frameworkid, idnumber, shortname, description, parentid,
                timecreated, timemodified, usermodified
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7)",
            params![
                draft.framework_id,
                draft.external_id,
                draft.short_name,
                draft.description,
                draft.parent.as_column(),
                now,
                ctx.user_id,
            ],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::DuplicateExternalId {
                    framework_id: draft.framework_id,
                    external_id: draft.external_id.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        let role = if draft.parent == Parent::Root { "level" } else { "competency" };
        insert_event(
            &self.conn,
            &Event::new(
                "node_created",
                role,
                &id.to_string(),
                serde_json::json!({
                    "framework_id": draft.framework_id,
                    "idnumber": draft.external_id,
                    "parent_id": draft.parent.as_column(),
                }),
                ctx,
            ),
        )?;

        Ok(id)
    }

    fn update(&mut self, node: &Node, ctx: &AuditContext) -> StoreResult<()> {
        if let Parent::Node(parent_id) = node.parent {
            if !self.node_exists(parent_id)? {
                return Err(StoreError::NodeNotFound(parent_id));
            }
        }

        let changed = self.conn.execute(
            "UPDATE competencies
             SET shortname = ?1, description = ?2, parentid = ?3,
                 timemodified = ?4, usermodified = ?5
             WHERE id = ?6",
            params![
                node.short_name,
                node.description,
                node.parent.as_column(),
                ctx.now().to_rfc3339(),
                ctx.user_id,
                node.id,
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NodeNotFound(node.id));
        }

        insert_event(
            &self.conn,
            &Event::new(
                "node_updated",
                node.role().as_str(),
                &node.id.to_string(),
                serde_json::json!({
                    "idnumber": node.external_id,
                    "shortname": node.short_name,
                    "parent_id": node.parent.as_column(),
                }),
                ctx,
            ),
        )?;

        Ok(())
    }

    fn levels(&self, framework_id: FrameworkId) -> StoreResult<Vec<Node>> {
        let sql = format!(
            "SELECT {} FROM competencies WHERE frameworkid = ?1 AND parentid = 0 ORDER BY id",
            NODE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(params![framework_id], node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    fn framework(&self, id: FrameworkId) -> StoreResult<Option<Framework>> {
        let framework = self
            .conn
            .query_row(
                "SELECT id, shortname, idnumber, description, scaleconfiguration, visible,
                        timecreated, timemodified, usermodified
                 FROM frameworks WHERE id = ?1",
                params![id],
                framework_from_row,
            )
            .optional()?;
        Ok(framework)
    }

    fn framework_exists(&self, external_id: &str) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM frameworks WHERE idnumber = ?1",
                params![external_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn create_framework(
        &mut self,
        draft: &FrameworkDraft,
        ctx: &AuditContext,
    ) -> StoreResult<FrameworkId> {
        let now = ctx.now().to_rfc3339();
        let config_json = serde_json::to_string(&draft.scale_configuration)?;

        let inserted = self.conn.execute(
            "INSERT INTO frameworks (
                shortname, idnumber, description, scaleid, scaleconfiguration,
                visible, timecreated, timemodified, usermodified
            ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6, ?7)",
            params![
                draft.short_name,
                draft.external_id,
                draft.description,
                draft.scale_configuration.scale_id,
                config_json,
                now,
                ctx.user_id,
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::DuplicateFramework(draft.external_id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        insert_event(
            &self.conn,
            &Event::new(
                "framework_created",
                "framework",
                &id.to_string(),
                serde_json::json!({ "idnumber": draft.external_id }),
                ctx,
            ),
        )?;

        Ok(id)
    }
}

impl ScaleLookup for SqliteStore {
    fn get_scale(&self, id: ScaleId) -> StoreResult<Option<Scale>> {
        let scale = self
            .conn
            .query_row(
                "SELECT id, name, scale FROM scales WHERE id = ?1",
                params![id],
                |row| {
                    let raw: String = row.get(2)?;
                    Ok(Scale {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        values: Scale::parse_values(&raw),
                    })
                },
            )
            .optional()?;
        Ok(scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_framework() -> (SqliteStore, FrameworkId, AuditContext) {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let ctx = AuditContext::new(5);
        let scale_id = store
            .insert_scale("RENEC", &["1".to_string(), "2".to_string(), "3".to_string()])
            .unwrap();
        let scale = store.get_scale(scale_id).unwrap().unwrap();
        let fw = store
            .create_framework(
                &FrameworkDraft {
                    short_name: "RENEC".to_string(),
                    external_id: "RENEC-PRINCIPAL".to_string(),
                    description: "Registro Nacional".to_string(),
                    scale_configuration: ScaleConfiguration::for_scale(&scale),
                },
                &ctx,
            )
            .unwrap();
        (store, fw, ctx)
    }

    #[test]
    fn test_framework_round_trip() {
        let (store, fw, _ctx) = store_with_framework();

        let framework = store.framework(fw).unwrap().unwrap();
        assert_eq!(framework.external_id, "RENEC-PRINCIPAL");
        assert_eq!(framework.scale_configuration.default_id, 3);
        assert!(framework.visible);
        assert!(store.framework_exists("RENEC-PRINCIPAL").unwrap());
        assert!(!store.framework_exists("OTHER").unwrap());
        assert!(store.framework(fw + 1).unwrap().is_none());
    }

    #[test]
    fn test_create_find_update_node() {
        let (mut store, fw, ctx) = store_with_framework();
        let level = store
            .create(&NodeDraft::level(fw, "RENEC-NIVEL-2", "RENEC Level 2", "intermediate"), &ctx)
            .unwrap();
        let comp = store
            .create(&NodeDraft::competency(fw, level, "EC0217", "Impartir cursos", "old"), &ctx)
            .unwrap();

        let mut node = store.find(fw, "EC0217").unwrap().unwrap();
        assert_eq!(node.id, comp);
        assert_eq!(node.parent_id(), Some(level));
        assert_eq!(node.modified_by, 5);

        node.description = "new".to_string();
        store.update(&node, &ctx).unwrap();
        assert_eq!(store.find(fw, "EC0217").unwrap().unwrap().description, "new");

        assert_eq!(store.levels(fw).unwrap().len(), 1);
        assert_eq!(store.children(level).unwrap().len(), 1);
        assert_eq!(store.count_nodes(fw).unwrap(), 2);
    }

    #[test]
    fn test_duplicate_idnumber_maps_to_store_error() {
        let (mut store, fw, ctx) = store_with_framework();
        let draft = NodeDraft::level(fw, "RENEC-SIN-NIVEL", "Unassigned", "");
        store.create(&draft, &ctx).unwrap();

        let err = store.create(&draft, &ctx).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateExternalId { .. }));
        assert_eq!(store.count_nodes(fw).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_framework_maps_to_store_error() {
        let (mut store, fw, ctx) = store_with_framework();
        let existing = store.framework(fw).unwrap().unwrap();
        let draft = FrameworkDraft {
            short_name: "Copy".to_string(),
            external_id: existing.external_id.clone(),
            description: String::new(),
            scale_configuration: existing.scale_configuration.clone(),
        };

        let err = store.create_framework(&draft, &ctx).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFramework(ref id) if id == "RENEC-PRINCIPAL"));
    }

    #[test]
    fn test_missing_parent_rejected() {
        let (mut store, fw, ctx) = store_with_framework();
        let err = store
            .create(&NodeDraft::competency(fw, 404, "EC0001", "n", "d"), &ctx)
            .unwrap_err();
        assert!(matches!(err, StoreError::NodeNotFound(404)));
    }

    #[test]
    fn test_writes_are_audited() {
        let (mut store, fw, ctx) = store_with_framework();
        let id = store
            .create(&NodeDraft::level(fw, "RENEC-NIVEL-1", "RENEC Level 1", ""), &ctx)
            .unwrap();
        let mut node = store.find(fw, "RENEC-NIVEL-1").unwrap().unwrap();
        node.short_name = "Renamed".to_string();
        store.update(&node, &ctx).unwrap();

        let events = get_events_for_entity(store.connection(), "level", &id.to_string()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "node_created");
        assert_eq!(events[1].event_type, "node_updated");
        assert_eq!(events[1].actor, "user:5");
        assert_eq!(events[0].data["idnumber"], "RENEC-NIVEL-1");
    }

    #[test]
    fn test_event_log() {
        let store = SqliteStore::open_in_memory().unwrap();
        let event = Event::new(
            "test_event",
            "competency",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            &AuditContext::new(1),
        );

        insert_event(store.connection(), &event).unwrap();

        let events = get_events_for_entity(store.connection(), "competency", "test_id_123").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].actor, "user:1");
    }
}
