//! Saved grasp configurations.
//!
//! Configs are immutable once written: an edit is saved as a new config.
//! The source text is kept verbatim and re-validated on every read so a
//! row can never hand out an untyped config.

use chrono::Utc;
use tracing::{info, instrument};

use grasp_core::config::{sort_for_listing, GraspConfig};
use grasp_core::ids::ConfigId;
use grasp_core::validate::parse_and_validate;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers::{self, format_time};

const SELECT_COLUMNS: &str = "SELECT id, name, source, created_at, updated_at FROM configs";

#[derive(Clone)]
pub struct ConfigRepo {
    db: Database,
}

impl ConfigRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Validate and save a new config. Structural errors reject the write.
    #[instrument(skip(self, source))]
    pub fn create(&self, name: &str, source: &str) -> Result<GraspConfig, StoreError> {
        let nodes = parse_and_validate(source)?;

        let id = ConfigId::new();
        let now = Utc::now();
        let stamp = format_time(&now);

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO configs (id, name, source, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), name, source, stamp, stamp],
            )?;
            Ok(())
        })?;

        info!(config_id = %id, nodes = nodes.len(), "config saved");

        Ok(GraspConfig {
            id,
            name: name.to_string(),
            source: source.to_string(),
            created_at: now,
            updated_at: now,
            nodes,
        })
    }

    /// Get a config by ID.
    #[instrument(skip(self), fields(config_id = %id))]
    pub fn read(&self, id: &ConfigId) -> Result<GraspConfig, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_config(row),
                None => Err(StoreError::NotFound(format!("config {id}"))),
            }
        })
    }

    /// All configs: `DEFAULT`-named first, then most recently updated.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<GraspConfig>, StoreError> {
        let configs = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(SELECT_COLUMNS)?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_config(row)?);
            }
            Ok(results)
        })?;
        Ok(sort_for_listing(&configs))
    }
}

fn row_to_config(row: &rusqlite::Row<'_>) -> Result<GraspConfig, StoreError> {
    let id: String = row_helpers::get(row, 0, "configs", "id")?;
    let name: String = row_helpers::get(row, 1, "configs", "name")?;
    let source: String = row_helpers::get(row, 2, "configs", "source")?;
    let created_at: String = row_helpers::get(row, 3, "configs", "created_at")?;
    let updated_at: String = row_helpers::get(row, 4, "configs", "updated_at")?;

    let nodes = parse_and_validate(&source).map_err(|e| StoreError::CorruptRow {
        table: "configs",
        column: "source",
        detail: e.to_string(),
    })?;

    Ok(GraspConfig {
        id: ConfigId::from_raw(id),
        name,
        source,
        created_at: row_helpers::parse_time(&created_at, "configs", "created_at")?,
        updated_at: row_helpers::parse_time(&updated_at, "configs", "updated_at")?,
        nodes,
    })
}
