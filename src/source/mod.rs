//! Reading sources for the field monitor.
//!
//! Every source is exposed as a [`ReadingStream`]: a stream of validated
//! readings, where a bad payload shows up as [`SourceError::Malformed`] and a
//! lost hardware link as [`SourceError::Disconnected`]. The stream ending
//! means the source has nothing more to deliver.

pub mod channel;
pub mod lines;

use crate::core::reading::{Reading, ReadingError};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;

// Re-export commonly used types
pub use channel::{channel, ReadingSender};
pub use lines::{file, lines, stdin, tcp};

/// Boxed stream of readings as consumed by the monitor.
pub type ReadingStream = Pin<Box<dyn Stream<Item = Result<Reading, SourceError>> + Send>>;

/// Errors surfaced by a reading source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The payload did not describe a valid reading
    #[error("malformed reading: {0}")]
    Malformed(#[from] ReadingError),

    /// The hardware (or its bridge) is not connected
    #[error("source disconnected: {0}")]
    Disconnected(String),
}

/// Which transport feeds the monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    /// Readings posted to `POST /readings`
    #[default]
    Http,
    /// One payload per line on standard input
    Stdin,
    /// One payload per line from a file
    File { path: PathBuf },
    /// One payload per line from a hardware bridge over TCP
    Tcp { address: String },
}

impl SourceKind {
    /// Parse a CLI value: `http`, `stdin`, `file:<path>` or `tcp:<host:port>`.
    pub fn from_arg(s: &str) -> Option<Self> {
        let s = s.trim();
        match s.to_lowercase().as_str() {
            "http" => return Some(SourceKind::Http),
            "stdin" | "-" => return Some(SourceKind::Stdin),
            _ => {}
        }

        let (scheme, rest) = s.split_once(':')?;
        if rest.is_empty() {
            return None;
        }
        match scheme.to_lowercase().as_str() {
            "file" => Some(SourceKind::File {
                path: PathBuf::from(rest),
            }),
            "tcp" => Some(SourceKind::Tcp {
                address: rest.to_string(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Http => write!(f, "http"),
            SourceKind::Stdin => write!(f, "stdin"),
            SourceKind::File { path } => write!(f, "file:{}", path.display()),
            SourceKind::Tcp { address } => write!(f, "tcp:{address}"),
        }
    }
}

/// An opened source: the stream plus, for `http`, the sending half.
pub struct OpenedSource {
    pub stream: ReadingStream,
    pub sender: Option<ReadingSender>,
}

/// Open the configured source.
///
/// Connection failures do not error here; they surface as a
/// [`SourceError::Disconnected`] item so the monitor can stop quietly.
pub async fn open(kind: &SourceKind, channel_capacity: usize) -> OpenedSource {
    match kind {
        SourceKind::Http => {
            let (sender, stream) = channel(channel_capacity);
            OpenedSource {
                stream,
                sender: Some(sender),
            }
        }
        SourceKind::Stdin => OpenedSource {
            stream: stdin(),
            sender: None,
        },
        SourceKind::File { path } => OpenedSource {
            stream: file(path).await,
            sender: None,
        },
        SourceKind::Tcp { address } => OpenedSource {
            stream: tcp(address).await,
            sender: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!(SourceKind::from_arg("http"), Some(SourceKind::Http));
        assert_eq!(SourceKind::from_arg("STDIN"), Some(SourceKind::Stdin));
        assert_eq!(
            SourceKind::from_arg("tcp:127.0.0.1:7000"),
            Some(SourceKind::Tcp {
                address: "127.0.0.1:7000".to_string()
            })
        );
        assert_eq!(
            SourceKind::from_arg("file:/tmp/readings.txt"),
            Some(SourceKind::File {
                path: PathBuf::from("/tmp/readings.txt")
            })
        );
        assert_eq!(SourceKind::from_arg("tcp:"), None);
        assert_eq!(SourceKind::from_arg("bluetooth"), None);
    }

    #[test]
    fn test_source_kind_serde() {
        let kind = SourceKind::Tcp {
            address: "bridge:7000".to_string(),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"kind":"tcp","address":"bridge:7000"}"#);
        assert_eq!(kind.to_string(), "tcp:bridge:7000");
    }
}
