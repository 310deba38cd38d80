//! Tagged media blobs scoped to a character.

use anyhow::{anyhow, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use shared::assets::{normalize_tag, Asset, AssetKind};
use std::collections::BTreeSet;

use crate::db::{from_millis, to_millis, Database};

const ASSET_COLUMNS: &str = "id, character_id, name, kind, data, timestamp";

#[derive(Clone)]
pub struct AssetRepository {
    db: Database,
}

impl AssetRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn add_asset(&self, asset: &Asset) -> Result<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO assets (id, character_id, name, kind, data, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                asset.id,
                asset.character_id,
                asset.name,
                asset.kind.as_str(),
                asset.data,
                to_millis(&asset.timestamp)
            ],
        )?;
        write_tags(&tx, &asset.id, &asset.tags)?;
        tx.commit()?;
        tracing::debug!(
            "Added {} asset {} for character {}",
            asset.kind.as_str(),
            asset.id,
            asset.character_id
        );
        Ok(())
    }

    pub fn get_asset_by_id(&self, id: &str) -> Result<Option<Asset>> {
        let conn = self.db.lock();
        let asset = conn
            .query_row(
                &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?1"),
                params![id],
                row_to_asset,
            )
            .optional()?;
        match asset {
            Some(mut asset) => {
                asset.tags = load_tags(&conn, &asset.id)?;
                Ok(Some(asset))
            }
            None => Ok(None),
        }
    }

    /// Replace name, kind, data and tags. The original timestamp is kept.
    pub fn update_asset(&self, asset: &Asset) -> Result<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE assets SET character_id = ?2, name = ?3, kind = ?4, data = ?5 WHERE id = ?1",
            params![
                asset.id,
                asset.character_id,
                asset.name,
                asset.kind.as_str(),
                asset.data
            ],
        )?;
        if changed == 0 {
            return Err(anyhow!("Asset not found: {}", asset.id));
        }
        tx.execute("DELETE FROM asset_tags WHERE asset_id = ?1", params![asset.id])?;
        write_tags(&tx, &asset.id, &asset.tags)?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_asset(&self, id: &str) -> Result<bool> {
        let conn = self.db.lock();
        let deleted = conn.execute("DELETE FROM assets WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn delete_assets_by_character_id(&self, character_id: &str) -> Result<usize> {
        let conn = self.db.lock();
        delete_for_character(&conn, character_id)
    }

    /// All assets of a character, newest first
    pub fn list_assets_for_character(&self, character_id: &str) -> Result<Vec<Asset>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE character_id = ?1
             ORDER BY timestamp DESC, id ASC"
        ))?;
        let assets = stmt
            .query_map(params![character_id], row_to_asset)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        with_tags(&conn, assets)
    }

    /// Every distinct tag carried by the character's assets
    pub fn tags_for_character(&self, character_id: &str) -> Result<BTreeSet<String>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT t.tag FROM asset_tags t
             JOIN assets a ON a.id = t.asset_id
             WHERE a.character_id = ?1",
        )?;
        let tags = stmt
            .query_map(params![character_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(tags)
    }

    /// Assets of `character_id` carrying ALL of `tags`, newest first.
    pub fn search_assets_by_tags<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a str>,
        character_id: &str,
    ) -> Result<Vec<Asset>> {
        let wanted: BTreeSet<String> = tags
            .into_iter()
            .map(normalize_tag)
            .filter(|t| !t.is_empty())
            .collect();
        if wanted.is_empty() {
            return self.list_assets_for_character(character_id);
        }

        let placeholders = (0..wanted.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {ASSET_COLUMNS} FROM assets a
             WHERE a.character_id = ?1
               AND (SELECT COUNT(DISTINCT t.tag) FROM asset_tags t
                    WHERE t.asset_id = a.id AND t.tag IN ({placeholders})) = {}
             ORDER BY a.timestamp DESC, a.id ASC",
            wanted.len()
        );

        let mut values: Vec<&str> = vec![character_id];
        values.extend(wanted.iter().map(String::as_str));

        let conn = self.db.lock();
        let mut stmt = conn.prepare(&sql)?;
        let assets = stmt
            .query_map(params_from_iter(values), row_to_asset)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        with_tags(&conn, assets)
    }
}

pub(crate) fn delete_for_character(conn: &Connection, character_id: &str) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM assets WHERE character_id = ?1",
        params![character_id],
    )?;
    if deleted > 0 {
        tracing::debug!("Deleted {} assets of character {}", deleted, character_id);
    }
    Ok(deleted)
}

fn write_tags(conn: &Connection, asset_id: &str, tags: &BTreeSet<String>) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO asset_tags (asset_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        let tag = normalize_tag(tag);
        if !tag.is_empty() {
            stmt.execute(params![asset_id, tag])?;
        }
    }
    Ok(())
}

fn load_tags(conn: &Connection, asset_id: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM asset_tags WHERE asset_id = ?1")?;
    let tags = stmt
        .query_map(params![asset_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()?;
    Ok(tags)
}

fn with_tags(conn: &Connection, mut assets: Vec<Asset>) -> Result<Vec<Asset>> {
    for asset in assets.iter_mut() {
        asset.tags = load_tags(conn, &asset.id)?;
    }
    Ok(assets)
}

fn row_to_asset(row: &Row<'_>) -> rusqlite::Result<Asset> {
    let kind: String = row.get(3)?;
    Ok(Asset {
        id: row.get(0)?,
        character_id: row.get(1)?,
        name: row.get(2)?,
        kind: AssetKind::parse(&kind).unwrap_or(AssetKind::Image),
        tags: BTreeSet::new(),
        data: row.get(4)?,
        timestamp: from_millis(row.get(5)?),
    })
}
