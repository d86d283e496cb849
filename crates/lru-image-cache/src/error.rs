//! Error types for the LRU image cache

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CacheError {
    EmptyQueue,
    NodeNotFound,
    NotFound(PathBuf),
    StoreRead(String),
    StoreWrite(String),
    Resolution(String),
    Transfer(String),
    MalformedPersistedState(String),
    Io(Box<std::io::Error>),
    Http(Box<reqwest::Error>),
    Config(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::EmptyQueue => write!(f, "Recency queue is empty"),
            CacheError::NodeNotFound => write!(f, "Node is not linked in the recency queue"),
            CacheError::NotFound(path) => write!(f, "Not found: {}", path.display()),
            CacheError::StoreRead(msg) => write!(f, "Store read error: {}", msg),
            CacheError::StoreWrite(msg) => write!(f, "Store write error: {}", msg),
            CacheError::Resolution(msg) => write!(f, "Resolution error: {}", msg),
            CacheError::Transfer(msg) => write!(f, "Transfer error: {}", msg),
            CacheError::MalformedPersistedState(msg) => {
                write!(f, "Malformed persisted state: {}", msg)
            }
            CacheError::Io(err) => write!(f, "IO error: {}", err),
            CacheError::Http(err) => write!(f, "HTTP error: {}", err),
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Http(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::MalformedPersistedState(err.to_string())
    }
}

impl From<url::ParseError> for CacheError {
    fn from(err: url::ParseError) -> Self {
        CacheError::Resolution(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
