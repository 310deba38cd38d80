//! Local persistence for Aphrodisiac: settings, personalities, chats and media.

pub mod asset_repository;
pub mod chat_store;
pub mod db;
pub mod personality_store;
pub mod settings_store;

pub use asset_repository::AssetRepository;
pub use chat_store::ChatStore;
pub use db::Database;
pub use personality_store::PersonalityStore;
pub use settings_store::SettingsStore;
