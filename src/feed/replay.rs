//! Newline-delimited JSON event replay

use super::FeedEvent;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reads one [`FeedEvent`] per line and forwards it to the pipeline
///
/// Events go out on one channel in file order, whatever their source. Blank lines and lines starting with `#` are skipped. Malformed lines are
/// logged and dropped.
pub struct JsonlReplay<R> {
    reader: R,
}

impl JsonlReplay<BufReader<tokio::fs::File>> {
    /// Replay events from a file
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl JsonlReplay<BufReader<tokio::io::Stdin>> {
    /// Replay events from standard input
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> JsonlReplay<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Forward every event, returning how many were delivered
    pub async fn run(self, events: mpsc::Sender<FeedEvent>) -> anyhow::Result<u64> {
        let mut lines = self.reader.lines();
        let mut delivered = 0u64;
        let mut line_no = 0u64;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<FeedEvent>(line) {
                Ok(event) => {
                    events.send(event).await?;
                    delivered += 1;
                }
                Err(e) => {
                    warn!(line = line_no, error = %e, "Skipping malformed event");
                }
            }
        }

        debug!(lines = line_no, "Replay input exhausted");
        info!(events = delivered, "Replay finished");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{ordered_channel, AccountEvent};

    #[tokio::test]
    async fn test_replay_skips_comments_and_bad_lines() {
        let input = concat!(
            "# header\n",
            "\n",
            r#"{"type":"odds","market_id":"m1","quotes":[{"source":"a","long_probability":"0.6"}],"timestamp":"2024-01-01T00:00:00Z"}"#,
            "\n",
            "not json\n",
            r#"{"type":"account","kind":"balance","balance":"100"}"#,
            "\n",
        );
        let (tx, mut rx) = ordered_channel(8);
        let replay = JsonlReplay::new(BufReader::new(input.as_bytes()));
        let delivered = replay.run(tx).await.unwrap();

        assert_eq!(delivered, 2);
        match rx.recv().await.unwrap() {
            FeedEvent::Odds(odds) => assert_eq!(odds.quotes.len(), 1),
            other => panic!("expected odds first, got {:?}", other),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            FeedEvent::Account(AccountEvent::Balance { .. })
        ));
    }

    #[tokio::test]
    async fn test_replay_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(
            &path,
            r#"{"type":"account","kind":"order_cancelled","order_id":"o1"}"#,
        )
        .unwrap();

        let (tx, mut rx) = ordered_channel(8);
        let delivered = JsonlReplay::open(&path).await.unwrap().run(tx).await.unwrap();
        assert_eq!(delivered, 1);
        assert!(matches!(rx.recv().await, Some(FeedEvent::Account(_))));
    }
}
