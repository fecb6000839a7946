use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Browser error: {message}")]
    Browser { message: String },

    #[error("Discord API error ({status}): {message}")]
    Discord { status: u16, message: String },

    #[error("API error: {message}")]
    Api { message: String },
}

impl From<rusqlite::Error> for BotError {
    fn from(e: rusqlite::Error) -> Self {
        BotError::Database {
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
