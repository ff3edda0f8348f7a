//! Live event relay
//!
//! Reads events in the replay format from a line stream (stdin in the
//! binary), timestamps each on arrival and applies it. Runs until the
//! stream ends or shutdown is signalled.

use super::replay::{is_blank, parse_event, EventRunner, ReplayError};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{info, warn};

/// Apply events from `input` until EOF or shutdown, passing each record to
/// `emit`. Unreadable lines are reported and skipped.
pub async fn serve_lines<R>(
    input: R,
    runner: &EventRunner,
    mut shutdown: watch::Receiver<bool>,
    mut emit: impl FnMut(Value),
) -> Result<(), ReplayError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut line = 0;

    loop {
        let next = tokio::select! {
            next = lines.next_line() => next?,
            _ = shutdown.changed() => {
                info!("Shutdown requested, stopping event relay");
                break;
            }
        };

        let Some(text) = next else {
            info!("Event stream closed");
            break;
        };
        line += 1;
        if is_blank(&text) {
            continue;
        }

        match parse_event(line, &text) {
            Ok(event) => emit(runner.apply(event, Utc::now()).await),
            Err(err) => {
                warn!(error = %err, "Skipping unreadable event");
                emit(json!({
                    "event": "error",
                    "line": line,
                    "error": err.to_string(),
                }));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoteboxConfig;
    use tokio::io::{AsyncWriteExt, BufReader};

    const START: &str = r#"{"kind":"start","channel_id":"c1","entries":[{"image_url":"u","prompt":"p"}],"duration_secs":60}"#;
    const VOTE: &str = r#"{"kind":"vote","channel_id":"c1","voter_id":"u1","custom_id":"vote_0"}"#;

    #[tokio::test]
    async fn test_serve_until_eof() {
        let runner = EventRunner::with_console(&VoteboxConfig::default());
        let (_tx, rx) = watch::channel(false);
        let input = format!("{}\n\nnot json\n{}\n", START, VOTE);

        let mut records = Vec::new();
        serve_lines(BufReader::new(input.as_bytes()), &runner, rx, |r| {
            records.push(r)
        })
        .await
        .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["options"], 1);
        assert_eq!(records[1]["event"], "error");
        assert_eq!(records[1]["line"], 3);
        assert_eq!(records[2]["status"], "recorded");
        assert_eq!(runner.store().get("c1").unwrap().total_votes(), 1);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let runner = EventRunner::with_console(&VoteboxConfig::default());
        let (tx, rx) = watch::channel(false);
        let (mut writer, reader) = tokio::io::duplex(1024);

        writer
            .write_all(format!("{}\n", START).as_bytes())
            .await
            .unwrap();

        let mut records = Vec::new();
        let serve = serve_lines(BufReader::new(reader), &runner, rx, |r| records.push(r));
        let stop = async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(serve, stop);

        result.unwrap();
        assert_eq!(records.len(), 1);
        // The writer is still open; only the shutdown ended the relay
        drop(writer);
    }
}
