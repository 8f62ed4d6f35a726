//! Follow a log file from its end, like `tail -f`.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, warn};

use super::LineSink;

/// How long a follower waits before looking for new content.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Follows `path` and sends each new complete line, passed through `format`.
///
/// If the file exists, only content appended after the call is sent. A file
/// that does not exist yet is waited for and then read from the beginning.
/// When the file shrinks it is assumed truncated and read again from the
/// start. Returns when the sink reports a stop.
pub async fn follow_file<F>(path: PathBuf, mut sink: LineSink, format: F)
where
    F: Fn(&str) -> String + Send + 'static,
{
    let (file, existed) = match open_when_present(&path, &mut sink).await {
        Some(opened) => opened,
        None => return,
    };

    let mut reader = BufReader::new(file);
    let mut position = if existed {
        match reader.seek(SeekFrom::End(0)).await {
            Ok(position) => position,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to seek log file");
                return;
            }
        }
    } else {
        0
    };

    let mut pending: Vec<u8> = Vec::new();
    loop {
        let read = match reader.read_until(b'\n', &mut pending).await {
            Ok(read) => read,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read log file");
                return;
            }
        };

        if read == 0 {
            if let Ok(metadata) = reader.get_ref().metadata().await {
                if metadata.len() < position {
                    debug!(path = %path.display(), "Log file truncated, reading from start");
                    pending.clear();
                    position = match reader.seek(SeekFrom::Start(0)).await {
                        Ok(position) => position,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Failed to rewind log file");
                            return;
                        }
                    };
                    continue;
                }
            }
            if sink.idle(POLL_INTERVAL).await {
                return;
            }
            continue;
        }

        position += read as u64;
        // A line without its newline is still being written.
        if pending.last() != Some(&b'\n') {
            continue;
        }

        // Service output is not guaranteed to be UTF-8.
        let text = String::from_utf8_lossy(&pending);
        let line = text.trim_end_matches(['\n', '\r']);
        let formatted = format(line);
        pending.clear();
        if !sink.send(formatted).await {
            return;
        }
    }
}

/// Opens the file, waiting for it to appear. Returns the file and whether it
/// existed on the first attempt, or `None` if stopped or unreadable.
async fn open_when_present(path: &Path, sink: &mut LineSink) -> Option<(File, bool)> {
    let mut first_attempt = true;
    loop {
        match File::open(path).await {
            Ok(file) => return Some((file, first_attempt)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if first_attempt {
                    debug!(path = %path.display(), "Waiting for log file to appear");
                }
                first_attempt = false;
                if sink.idle(POLL_INTERVAL).await {
                    return None;
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open log file");
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::logs::{LogAggregator, POLL_INTERVAL};
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn append(path: &Path, content: &str) {
        append_bytes(path, content.as_bytes());
    }

    fn append_bytes(path: &Path, content: &[u8]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(content).unwrap();
    }

    fn follow(aggregator: &mut LogAggregator, path: PathBuf) {
        aggregator.spawn(move |sink| super::follow_file(path, sink, |line| line.to_string()));
    }

    async fn next_line(rx: &mut tokio::sync::mpsc::Receiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a line")
            .expect("stream closed")
    }

    #[tokio::test]
    async fn test_partial_lines_are_held_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        append(&path, "");

        let (mut aggregator, mut rx) = LogAggregator::new(16);
        follow(&mut aggregator, path.clone());
        tokio::time::sleep(POLL_INTERVAL * 2).await;

        append(&path, "hel");
        tokio::time::sleep(POLL_INTERVAL * 2).await;
        append(&path, "lo\r\nworld\n");

        assert_eq!(next_line(&mut rx).await, "hello");
        assert_eq!(next_line(&mut rx).await, "world");

        aggregator.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_follower() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        append_bytes(&path, b"");

        let (mut aggregator, mut rx) = LogAggregator::new(16);
        follow(&mut aggregator, path.clone());
        tokio::time::sleep(POLL_INTERVAL * 2).await;

        append_bytes(&path, b"bad \xff\xfe byte\n");
        append_bytes(&path, b"good line\n");

        assert_eq!(next_line(&mut rx).await, "bad \u{fffd}\u{fffd} byte");
        assert_eq!(next_line(&mut rx).await, "good line");

        aggregator.shutdown().await;
    }

    #[tokio::test]
    async fn test_waits_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.log");

        let (mut aggregator, mut rx) = LogAggregator::new(16);
        follow(&mut aggregator, path.clone());
        tokio::time::sleep(POLL_INTERVAL).await;

        append(&path, "first\nsecond\n");
        assert_eq!(next_line(&mut rx).await, "first");
        assert_eq!(next_line(&mut rx).await, "second");

        aggregator.shutdown().await;
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_truncated_file_is_read_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.log");
        append(&path, "a fairly long line that will be truncated away\n");

        let (mut aggregator, mut rx) = LogAggregator::new(16);
        follow(&mut aggregator, path.clone());
        tokio::time::sleep(POLL_INTERVAL * 2).await;

        std::fs::write(&path, "").unwrap();
        tokio::time::sleep(POLL_INTERVAL * 2).await;
        append(&path, "after\n");

        assert_eq!(next_line(&mut rx).await, "after");
        aggregator.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_while_waiting_for_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut aggregator, mut rx) = LogAggregator::new(16);
        follow(&mut aggregator, dir.path().join("never.log"));

        tokio::time::timeout(Duration::from_secs(5), aggregator.shutdown())
            .await
            .expect("follower ignored the stop signal");
        assert_eq!(rx.recv().await, None);
    }
}
