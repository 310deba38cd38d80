//! Chats and their messages.

use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use shared::records::{title_from_message, Chat, Message, Role, DEFAULT_CHAT_TITLE};

use crate::db::{from_millis, to_millis, Database};

const MESSAGE_COLUMNS: &str = "id, chat_id, role, text, personality_id, created_at";

#[derive(Clone)]
pub struct ChatStore {
    db: Database,
}

impl ChatStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create_chat(&self, chat: &Chat) -> Result<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO chats (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                chat.id,
                chat.title,
                to_millis(&chat.created_at),
                to_millis(&chat.updated_at)
            ],
        )?;
        Ok(())
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        let conn = self.db.lock();
        let chat = conn
            .query_row(
                "SELECT id, title, created_at, updated_at FROM chats WHERE id = ?1",
                params![id],
                row_to_chat,
            )
            .optional()?;
        Ok(chat)
    }

    /// Most recently active first
    pub fn list_chats(&self) -> Result<Vec<Chat>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at FROM chats ORDER BY updated_at DESC, id ASC",
        )?;
        let chats = stmt
            .query_map([], row_to_chat)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chats)
    }

    pub fn rename_chat(&self, id: &str, title: &str) -> Result<()> {
        let conn = self.db.lock();
        let changed = conn.execute(
            "UPDATE chats SET title = ?2 WHERE id = ?1",
            params![id, title.trim()],
        )?;
        if changed == 0 {
            return Err(anyhow!("Chat not found: {}", id));
        }
        Ok(())
    }

    /// Delete a chat and all of its messages
    pub fn delete_chat(&self, id: &str) -> Result<bool> {
        let conn = self.db.lock();
        let deleted = conn.execute("DELETE FROM chats WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Append a message. The first user message titles an untitled chat.
    pub fn append_message(&self, message: &Message) -> Result<()> {
        let mut conn = self.db.lock();
        let tx = conn.transaction()?;
        let title: Option<String> = tx
            .query_row(
                "SELECT title FROM chats WHERE id = ?1",
                params![message.chat_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(title) = title else {
            return Err(anyhow!("Chat not found: {}", message.chat_id));
        };

        tx.execute(
            "INSERT INTO messages (id, chat_id, role, text, personality_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.chat_id,
                message.role.as_str(),
                message.text,
                message.personality_id,
                to_millis(&message.created_at)
            ],
        )?;

        let new_title = if title == DEFAULT_CHAT_TITLE && message.role == Role::User {
            title_from_message(&message.text)
        } else {
            title
        };
        tx.execute(
            "UPDATE chats SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![message.chat_id, new_title, to_millis(&Utc::now())],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let conn = self.db.lock();
        let message = conn
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Messages of a chat in the order they were written
    pub fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>> {
        let conn = self.db.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE chat_id = ?1 ORDER BY seq ASC"
        ))?;
        let messages = stmt
            .query_map(params![chat_id], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    pub fn update_message_text(&self, id: &str, text: &str) -> Result<()> {
        let conn = self.db.lock();
        let changed = conn.execute(
            "UPDATE messages SET text = ?2 WHERE id = ?1",
            params![id, text],
        )?;
        if changed == 0 {
            return Err(anyhow!("Message not found: {}", id));
        }
        Ok(())
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        let conn = self.db.lock();
        let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Delete every message written after `id` in the same chat
    pub fn delete_messages_after(&self, id: &str) -> Result<usize> {
        let conn = self.db.lock();
        let anchor: Option<(String, i64)> = conn
            .query_row(
                "SELECT chat_id, seq FROM messages WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((chat_id, seq)) = anchor else {
            return Err(anyhow!("Message not found: {}", id));
        };
        let deleted = conn.execute(
            "DELETE FROM messages WHERE chat_id = ?1 AND seq > ?2",
            params![chat_id, seq],
        )?;
        Ok(deleted)
    }
}

fn row_to_chat(row: &Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: from_millis(row.get(2)?),
        updated_at: from_millis(row.get(3)?),
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        role: Role::parse(&role).unwrap_or(Role::Model),
        text: row.get(3)?,
        personality_id: row.get(4)?,
        created_at: from_millis(row.get(5)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with_chat() -> (ChatStore, Chat) {
        let store = ChatStore::new(Database::open_in_memory().unwrap());
        let chat = Chat::new();
        store.create_chat(&chat).unwrap();
        (store, chat)
    }

    #[test]
    fn test_first_user_message_titles_chat() {
        let (store, chat) = store_with_chat();
        store
            .append_message(&Message::new(&chat.id, Role::Model, "Welcome!", None))
            .unwrap();
        assert_eq!(store.get_chat(&chat.id).unwrap().unwrap().title, DEFAULT_CHAT_TITLE);

        store
            .append_message(&Message::new(&chat.id, Role::User, "Tell me a story", None))
            .unwrap();
        store
            .append_message(&Message::new(&chat.id, Role::User, "Something else", None))
            .unwrap();
        assert_eq!(
            store.get_chat(&chat.id).unwrap().unwrap().title,
            "Tell me a story"
        );
    }

    #[test]
    fn test_messages_keep_order_and_edit() {
        let (store, chat) = store_with_chat();
        let first = Message::new(&chat.id, Role::User, "one", None);
        let second = Message::new(&chat.id, Role::Model, "two", Some("p1".into()));
        store.append_message(&first).unwrap();
        store.append_message(&second).unwrap();

        store.update_message_text(&second.id, "two [happy]").unwrap();
        let messages = store.list_messages(&chat.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "one");
        assert_eq!(messages[1].text, "two [happy]");
        assert_eq!(messages[1].personality_id.as_deref(), Some("p1"));
        assert!(store.update_message_text("missing", "x").is_err());
    }

    #[test]
    fn test_delete_messages_after() {
        let (store, chat) = store_with_chat();
        let ids: Vec<String> = (0..4)
            .map(|i| {
                let m = Message::new(&chat.id, Role::User, format!("m{i}"), None);
                store.append_message(&m).unwrap();
                m.id
            })
            .collect();

        assert_eq!(store.delete_messages_after(&ids[1]).unwrap(), 2);
        let left: Vec<String> = store
            .list_messages(&chat.id)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(left, vec!["m0".to_string(), "m1".to_string()]);
    }

    #[test]
    fn test_delete_chat_cascades_messages() {
        let dir = TempDir::new().unwrap();
        let store = ChatStore::new(Database::open(dir.path()).unwrap());
        let chat = Chat::new();
        store.create_chat(&chat).unwrap();
        let msg = Message::new(&chat.id, Role::User, "hi", None);
        store.append_message(&msg).unwrap();

        assert!(store.delete_chat(&chat.id).unwrap());
        assert!(store.get_message(&msg.id).unwrap().is_none());
        assert!(store.list_chats().unwrap().is_empty());
    }

    #[test]
    fn test_append_to_missing_chat_fails() {
        let store = ChatStore::new(Database::open_in_memory().unwrap());
        let msg = Message::new("nope", Role::User, "hi", None);
        assert!(store.append_message(&msg).is_err());
    }

    #[test]
    fn test_rename() {
        let (store, chat) = store_with_chat();
        store.rename_chat(&chat.id, "  Quest log ").unwrap();
        assert_eq!(store.get_chat(&chat.id).unwrap().unwrap().title, "Quest log");
        assert!(store.rename_chat("missing", "x").is_err());
    }
}
