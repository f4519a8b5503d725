//! SQLite storage layer for security groups.

use chrono::{DateTime, Utc};
use refinery::embed_migrations;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::error::{Result, StorageError};
use super::traits::GroupStore;
use crate::model::{
    InstanceRole, RuleAction, RuleDirection, RuleProtocol, SecurityGroupData, SecurityGroupPatch,
    SecurityGroupRuleData,
};

embed_migrations!("migrations");

const GROUP_COLUMNS: &str =
    "id, name, description, project_id, external_id, is_dirty, created_at, updated_at";

const RULE_COLUMNS: &str = "id, security_group_id, priority, protocol, ports, direction, cidr, action, description, created_at";

/// SQLite storage for security groups.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Create a new storage instance with the given database path.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Create an in-memory storage instance (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::runner().run(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn insert_group(conn: &Connection, sg: &SecurityGroupData) -> Result<()> {
        conn.execute(
            "INSERT INTO security_groups (id, name, description, project_id, external_id, is_dirty, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                sg.id.to_string(),
                sg.name,
                sg.description,
                sg.project_id,
                sg.external_id,
                sg.is_dirty,
                sg.created_at.to_rfc3339(),
                sg.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Self::map_group_constraint(e, sg))?;

        Ok(())
    }

    fn insert_rule(conn: &Connection, rule: &SecurityGroupRuleData) -> Result<()> {
        conn.execute(
            "INSERT INTO security_group_rules (id, security_group_id, position, priority, protocol, ports, direction, cidr, action, description, created_at)
             VALUES (?1, ?2,
                     (SELECT COALESCE(MAX(position), -1) + 1 FROM security_group_rules WHERE security_group_id = ?2),
                     ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                rule.id.to_string(),
                rule.security_group_id.to_string(),
                rule.priority,
                rule.protocol.as_str(),
                rule.ports,
                rule.direction.as_str(),
                rule.cidr,
                rule.action.as_str(),
                rule.description,
                rule.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
            {
                return StorageError::SecurityGroupNotFound(rule.security_group_id.to_string());
            }
            StorageError::Database(e)
        })?;

        Ok(())
    }

    /// Translate unique-index violations into domain errors.
    fn map_group_constraint(e: rusqlite::Error, sg: &SecurityGroupData) -> StorageError {
        if let rusqlite::Error::SqliteFailure(ref err, ref msg) = e
            && err.code == rusqlite::ErrorCode::ConstraintViolation
        {
            let msg = msg.as_deref().unwrap_or_default();
            if msg.contains("security_groups.external_id") {
                return StorageError::ExternalIdExists(
                    sg.external_id.clone().unwrap_or_default(),
                );
            }
            if msg.contains("security_groups.name") {
                return StorageError::SecurityGroupNameExists(sg.name.clone());
            }
        }
        StorageError::Database(e)
    }

    fn query_groups(
        &self,
        sql: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<SecurityGroupData>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;

        let groups = stmt
            .query_map(args, |row| Ok(Self::row_to_security_group(row)))?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(groups)
    }

    fn fetch_group(conn: &Connection, id: &Uuid) -> Result<Option<SecurityGroupData>> {
        conn.query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM security_groups WHERE id = ?1"),
            params![id.to_string()],
            |row| Ok(Self::row_to_security_group(row)),
        )
        .optional()?
        .transpose()
    }

    fn row_to_security_group(row: &Row) -> Result<SecurityGroupData> {
        let id_str: String = row.get(0)?;
        let name: String = row.get(1)?;
        let description: Option<String> = row.get(2)?;
        let project_id: String = row.get(3)?;
        let external_id: Option<String> = row.get(4)?;
        let is_dirty: bool = row.get(5)?;
        let created_at_str: String = row.get(6)?;
        let updated_at_str: String = row.get(7)?;

        Ok(SecurityGroupData {
            id: parse_uuid(&id_str)?,
            name,
            description,
            project_id,
            external_id,
            is_dirty,
            created_at: parse_time(&created_at_str)?,
            updated_at: parse_time(&updated_at_str)?,
        })
    }

    fn row_to_security_group_rule(row: &Row) -> Result<SecurityGroupRuleData> {
        let id_str: String = row.get(0)?;
        let sg_id_str: String = row.get(1)?;
        let priority: i32 = row.get(2)?;
        let protocol_str: String = row.get(3)?;
        let ports: String = row.get(4)?;
        let direction_str: String = row.get(5)?;
        let cidr: String = row.get(6)?;
        let action_str: String = row.get(7)?;
        let description: Option<String> = row.get(8)?;
        let created_at_str: String = row.get(9)?;

        Ok(SecurityGroupRuleData {
            id: parse_uuid(&id_str)?,
            security_group_id: parse_uuid(&sg_id_str)?,
            priority,
            protocol: RuleProtocol::parse(&protocol_str)
                .ok_or_else(|| StorageError::Corrupt(format!("protocol {protocol_str}")))?,
            ports,
            direction: RuleDirection::parse(&direction_str)
                .ok_or_else(|| StorageError::Corrupt(format!("direction {direction_str}")))?,
            cidr,
            action: RuleAction::parse(&action_str)
                .ok_or_else(|| StorageError::Corrupt(format!("action {action_str}")))?,
            description,
            created_at: parse_time(&created_at_str)?,
        })
    }
}

impl GroupStore for Storage {
    // ========== Security Group Operations ==========

    fn list_security_groups(&self) -> Result<Vec<SecurityGroupData>> {
        self.query_groups(
            &format!("SELECT {GROUP_COLUMNS} FROM security_groups ORDER BY created_at, rowid"),
            &[],
        )
    }

    fn list_security_groups_by_project(&self, project_id: &str) -> Result<Vec<SecurityGroupData>> {
        self.query_groups(
            &format!(
                "SELECT {GROUP_COLUMNS} FROM security_groups WHERE project_id = ?1 ORDER BY created_at, rowid"
            ),
            &[&project_id],
        )
    }

    fn get_security_group_by_id(&self, id: &Uuid) -> Result<Option<SecurityGroupData>> {
        let conn = self.conn()?;
        Self::fetch_group(&conn, id)
    }

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<SecurityGroupData>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {GROUP_COLUMNS} FROM security_groups WHERE external_id = ?1"),
            params![external_id],
            |row| Ok(Self::row_to_security_group(row)),
        )
        .optional()?
        .transpose()
    }

    fn count_by_name(&self, project_id: &str, name: &str) -> Result<u32> {
        let conn = self.conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM security_groups
             WHERE project_id = ?1 AND name = ?2 AND external_id IS NULL",
            params![project_id, name],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn count_security_groups_in_project(&self, project_id: &str) -> Result<u32> {
        let conn = self.conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(*) FROM security_groups WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn create_security_group(&self, sg: &SecurityGroupData) -> Result<()> {
        let conn = self.conn()?;
        Self::insert_group(&conn, sg)
    }

    fn create_security_group_with_rules(
        &self,
        sg: &SecurityGroupData,
        rules: &[SecurityGroupRuleData],
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        Self::insert_group(&tx, sg)?;
        for rule in rules {
            Self::insert_rule(&tx, rule)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn update_security_group(
        &self,
        id: &Uuid,
        patch: &SecurityGroupPatch,
    ) -> Result<SecurityGroupData> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut sg = Self::fetch_group(&tx, id)?
            .ok_or_else(|| StorageError::SecurityGroupNotFound(id.to_string()))?;
        patch.apply(&mut sg);

        tx.execute(
            "UPDATE security_groups SET name = ?1, description = ?2, is_dirty = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                sg.name,
                sg.description,
                sg.is_dirty,
                sg.updated_at.to_rfc3339(),
                id.to_string(),
            ],
        )
        .map_err(|e| Self::map_group_constraint(e, &sg))?;

        tx.commit()?;
        Ok(sg)
    }

    fn delete_security_group(&self, id: &Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM security_groups WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(rows > 0)
    }

    // ========== Security Group Rule Operations ==========

    fn list_rules_for_security_group(&self, sg_id: &Uuid) -> Result<Vec<SecurityGroupRuleData>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM security_group_rules
             WHERE security_group_id = ?1 ORDER BY position"
        ))?;

        let rules = stmt
            .query_map(params![sg_id.to_string()], |row| {
                Ok(Self::row_to_security_group_rule(row))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rules)
    }

    fn create_security_group_rule(&self, rule: &SecurityGroupRuleData) -> Result<()> {
        let conn = self.conn()?;
        Self::insert_rule(&conn, rule)
    }

    // ========== Instance Attachment Operations ==========

    fn attach_instance(&self, instance_id: &str, sg_id: &Uuid, role: InstanceRole) -> Result<bool> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let rows = conn
            .execute(
                "INSERT OR IGNORE INTO instance_security_groups (instance_id, security_group_id, role, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![instance_id, sg_id.to_string(), role.as_str(), now],
            )
            .map_err(|e| {
                if let rusqlite::Error::SqliteFailure(ref err, _) = e
                    && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
                {
                    return StorageError::SecurityGroupNotFound(sg_id.to_string());
                }
                StorageError::Database(e)
            })?;

        Ok(rows > 0)
    }

    fn detach_instance(&self, instance_id: &str, sg_id: &Uuid, role: InstanceRole) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM instance_security_groups
             WHERE instance_id = ?1 AND security_group_id = ?2 AND role = ?3",
            params![instance_id, sg_id.to_string(), role.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn list_instances_for_group(&self, sg_id: &Uuid) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT instance_id FROM instance_security_groups
             WHERE security_group_id = ?1 ORDER BY instance_id",
        )?;

        let ids = stmt
            .query_map(params![sg_id.to_string()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    fn count_instances_for_group(&self, sg_id: &Uuid) -> Result<u32> {
        let conn = self.conn()?;
        let count: u32 = conn.query_row(
            "SELECT COUNT(DISTINCT instance_id) FROM instance_security_groups
             WHERE security_group_id = ?1",
            params![sg_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StorageError::Corrupt(format!("id {s}: {e}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("timestamp {s}: {e}")))
}
