/// Failures inside a tag dispatch. These are logged, never shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Asset lookup failed for {tags:?}: {message}")]
    Lookup { tags: Vec<String>, message: String },

    #[error("No asset for {tags:?} on character {character_id}")]
    NoMatch {
        tags: Vec<String>,
        character_id: String,
    },

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),
}
