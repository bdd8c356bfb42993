//! Worker thread configuration.

use serde::{Deserialize, Serialize};

/// Thread name used when [`ReaderOptions::name`] is not set.
pub const DEFAULT_THREAD_NAME: &str = "rabotnik-reader";

/// Options for the worker thread of a [`ReaderThread`](crate::ReaderThread).
///
/// Deserializes from an application config section; missing fields keep
/// their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Worker thread name, visible in debuggers and panic messages.
    pub name: Option<String>,
    /// Worker stack size in bytes. The platform default when unset.
    pub stack_size: Option<usize>,
}

impl ReaderOptions {
    /// Sets the worker thread name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the worker stack size in bytes.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Returns the configured thread name or [`DEFAULT_THREAD_NAME`].
    pub fn thread_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_THREAD_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ReaderOptions::default();
        assert_eq!(opts.thread_name(), DEFAULT_THREAD_NAME);
        assert_eq!(opts.stack_size, None);
    }

    #[test]
    fn test_builder() {
        let opts = ReaderOptions::default()
            .with_name("audio-in")
            .with_stack_size(256 * 1024);
        assert_eq!(opts.thread_name(), "audio-in");
        assert_eq!(opts.stack_size, Some(256 * 1024));
    }

    #[test]
    fn test_deserialize_partial() {
        let opts: ReaderOptions = serde_json::from_str(r#"{"name":"capture"}"#).unwrap();
        assert_eq!(opts, ReaderOptions::default().with_name("capture"));

        let opts: ReaderOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, ReaderOptions::default());
    }
}
