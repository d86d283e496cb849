//! Per-key bookkeeping: consumer handlers and download state

use crate::types::ImageSource;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Callback invoked with the resolved local path of an object
///
/// Clones share the same callback and compare equal; two handlers built
/// from separate calls to [`Handler::new`] never do.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(&Path) + Send + Sync>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, path: &Path) {
        (self.0)(path)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler({:p})", Arc::as_ptr(&self.0))
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub source: ImageSource,
    pub downloading: bool,
    pub handlers: Vec<Handler>,
    pub immutable: bool,
    pub path: Option<PathBuf>,
}

impl CacheEntry {
    pub fn new(source: ImageSource, handler: Handler, immutable: bool, path: Option<PathBuf>) -> Self {
        Self {
            source,
            downloading: false,
            handlers: vec![handler],
            immutable,
            path,
        }
    }

    pub fn has_handlers(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// Drop the first handler identical to `handler`
    pub fn remove_handler(&mut self, handler: &Handler) -> bool {
        match self.handlers.iter().position(|h| h == handler) {
            Some(index) => {
                self.handlers.remove(index);
                true
            }
            None => false,
        }
    }
}
