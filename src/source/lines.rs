//! Line-delimited payload sources (stdin, files, TCP hardware bridge).
//!
//! The hardware bridge relays each Bluetooth notification as one line of
//! text, e.g. `[90, 42, 43, 20.8, 82.0, 6.5, 202.9]`.

use super::{ReadingStream, SourceError};
use crate::core::reading::Reading;
use futures::StreamExt;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

/// Wrap a buffered reader into a reading stream.
///
/// Blank lines are skipped. EOF ends the stream; a read error is reported as
/// a disconnect.
pub fn lines<R>(reader: R) -> ReadingStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    Box::pin(futures::stream::unfold(
        reader.lines(),
        |mut lines| async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let item = Reading::parse(&line).map_err(SourceError::from);
                        return Some((item, lines));
                    }
                    Ok(None) => return None,
                    Err(e) => return Some((Err(SourceError::Disconnected(e.to_string())), lines)),
                }
            }
        },
    ))
}

/// Readings from standard input.
pub fn stdin() -> ReadingStream {
    lines(BufReader::new(tokio::io::stdin()))
}

/// Readings from a file, one payload per line.
pub async fn file(path: &Path) -> ReadingStream {
    match tokio::fs::File::open(path).await {
        Ok(f) => lines(BufReader::new(f)),
        Err(e) => disconnected(format!("{}: {e}", path.display())),
    }
}

/// Readings relayed by a hardware bridge over TCP.
///
/// The bridge closing the connection is reported as a disconnect rather than
/// a clean end of stream.
pub async fn tcp(address: &str) -> ReadingStream {
    match TcpStream::connect(address).await {
        Ok(stream) => {
            tracing::info!("Connected to hardware bridge at {}", address);
            let closed = format!("hardware bridge at {address} closed the connection");
            Box::pin(lines(BufReader::new(stream)).chain(futures::stream::once(async move {
                Err(SourceError::Disconnected(closed))
            })))
        }
        Err(e) => disconnected(format!("{address}: {e}")),
    }
}

fn disconnected(reason: String) -> ReadingStream {
    Box::pin(futures::stream::once(async move {
        Err(SourceError::Disconnected(reason))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_lines_parses_and_skips_blanks() {
        let input = "[1, 2, 3, 4, 5, 6, 7]\n\n  \n[7,6,5,4,3,2,1]\n";
        let mut stream = lines(BufReader::new(input.as_bytes()));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.nitrogen(), 1.0);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.rainfall(), 1.0);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_lines_reports_malformed_payload() {
        let mut stream = lines(BufReader::new("[1, 2, 3]\n".as_bytes()));
        let item = stream.next().await.unwrap();
        assert!(matches!(item, Err(SourceError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_disconnect() {
        let mut stream = file(Path::new("/nonexistent/annadata/readings.txt")).await;
        let item = stream.next().await.unwrap();
        assert!(matches!(item, Err(SourceError::Disconnected(_))));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_tcp_bridge_close_is_disconnect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"[1,1,1,1,1,1,1]\n").await.unwrap();
        });

        let mut stream = tcp(&addr.to_string()).await;
        assert!(stream.next().await.unwrap().is_ok());
        assert!(matches!(
            stream.next().await.unwrap(),
            Err(SourceError::Disconnected(_))
        ));
    }
}
