use anyhow::{anyhow, Result};
use rusqlite::{params, OptionalExtension, Row};
use shared::records::Personality;

use crate::asset_repository::delete_for_character;
use crate::db::{from_millis, to_millis, Database};

const COLUMNS: &str = "id, name, description, prompt, tone_examples, image, roleplay, created_at";

/// CRUD over personalities
#[derive(Clone)]
pub struct PersonalityStore {
    db: Database,
}

impl PersonalityStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, personality: &Personality) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO personalities (id, name, description, prompt, tone_examples, image, roleplay, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                personality.id,
                personality.name,
                personality.description,
                personality.prompt,
                serde_json::to_string(&personality.tone_examples)?,
                personality.image,
                personality.roleplay,
                to_millis(&personality.created_at)
            ],
        )?;
        tracing::info!("Created personality {} ({})", personality.name, personality.id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Personality>> {
        let conn = self.db.lock();
        let found = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM personalities WHERE id = ?1"),
                params![id],
                row_to_personality,
            )
            .optional()?;
        Ok(found)
    }

    /// Oldest first, the order they were created in
    pub fn list(&self) -> Result<Vec<Personality>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM personalities ORDER BY created_at ASC, id ASC"
        ))?;
        let list = stmt
            .query_map([], row_to_personality)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(list)
    }

    pub fn update(&self, personality: &Personality) -> Result<()> {
        let conn = self.db.lock();
        let changed = conn.execute(
            "UPDATE personalities
             SET name = ?2, description = ?3, prompt = ?4, tone_examples = ?5, image = ?6, roleplay = ?7
             WHERE id = ?1",
            params![
                personality.id,
                personality.name,
                personality.description,
                personality.prompt,
                serde_json::to_string(&personality.tone_examples)?,
                personality.image,
                personality.roleplay
            ],
        )?;
        if changed == 0 {
            return Err(anyhow!("Personality not found: {}", personality.id));
        }
        Ok(())
    }

    /// Delete a personality together with every asset it owns
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let assets = delete_for_character(&tx, id)?;
        let deleted = tx.execute("DELETE FROM personalities WHERE id = ?1", params![id])?;
        tx.commit()?;
        if deleted > 0 {
            tracing::info!("Deleted personality {} and {} assets", id, assets);
        }
        Ok(deleted > 0)
    }
}

fn row_to_personality(row: &Row<'_>) -> rusqlite::Result<Personality> {
    let tone_json: String = row.get(4)?;
    Ok(Personality {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        prompt: row.get(3)?,
        tone_examples: serde_json::from_str(&tone_json).unwrap_or_default(),
        image: row.get(5)?,
        roleplay: row.get(6)?,
        created_at: from_millis(row.get(7)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_repository::AssetRepository;
    use shared::assets::{Asset, AssetKind};

    #[test]
    fn test_create_get_update() {
        let store = PersonalityStore::new(Database::open_in_memory().unwrap());
        let mut ava = Personality::new("Ava", "A cheerful bard");
        ava.tone_examples = vec!["Hey there, traveller!".into()];
        store.create(&ava).unwrap();

        let loaded = store.get(&ava.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Ava");
        assert_eq!(loaded.tone_examples, ava.tone_examples);
        assert!(loaded.image.is_none());

        ava.image = Some(vec![9, 9]);
        ava.roleplay = true;
        store.update(&ava).unwrap();
        let loaded = store.get(&ava.id).unwrap().unwrap();
        assert_eq!(loaded.image, Some(vec![9, 9]));
        assert!(loaded.roleplay);

        assert!(store.update(&Personality::new("Ghost", "")).is_err());
    }

    #[test]
    fn test_list_in_creation_order() {
        let store = PersonalityStore::new(Database::open_in_memory().unwrap());
        let mut first = Personality::new("First", "");
        first.created_at = first.created_at - chrono::Duration::seconds(10);
        let second = Personality::new("Second", "");
        store.create(&second).unwrap();
        store.create(&first).unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["First".to_string(), "Second".to_string()]);
    }

    #[test]
    fn test_delete_cascades_assets() {
        let db = Database::open_in_memory().unwrap();
        let store = PersonalityStore::new(db.clone());
        let assets = AssetRepository::new(db);

        let ava = Personality::new("Ava", "");
        let bea = Personality::new("Bea", "");
        store.create(&ava).unwrap();
        store.create(&bea).unwrap();
        for owner in [&ava.id, &ava.id, &bea.id] {
            let asset = Asset::new(owner.as_str(), "x.png", AssetKind::Image, vec![], vec![1]);
            assets.add_asset(&asset).unwrap();
        }

        assert!(store.delete(&ava.id).unwrap());
        assert!(store.get(&ava.id).unwrap().is_none());
        assert!(assets.list_assets_for_character(&ava.id).unwrap().is_empty());
        assert_eq!(assets.list_assets_for_character(&bea.id).unwrap().len(), 1);
        assert!(!store.delete(&ava.id).unwrap());
    }
}
