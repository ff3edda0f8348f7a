//! Replay integration test
//!
//! Writes a vote script to disk and replays it through the public API,
//! checking the tally, private replies, and the final summary.

use std::io::Write;

use votebox::cli::{run_replay_file, ReplayError};
use votebox::config::{load_from, VoteboxConfig};
use votebox::polls::OverwritePolicy;

const ENTRIES: &str = r#"[{"image_url":"https://img/a.png","prompt":"a lighthouse"},{"image_url":"https://img/b.png","prompt":"a canyon","caption":"b!"},{"image_url":"https://img/c.png","prompt":"a glacier"}]"#;

fn write_script(lines: &[String]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

fn start(channel: &str, duration_secs: i64) -> String {
    format!(
        r#"{{"kind":"start","channel_id":"{}","entries":{},"duration_secs":{}}}"#,
        channel, ENTRIES, duration_secs
    )
}

fn vote(channel: &str, voter: &str, custom_id: &str, at: i64) -> String {
    format!(
        r#"{{"kind":"vote","channel_id":"{}","voter_id":"{}","custom_id":"{}","at":{}}}"#,
        channel, voter, custom_id, at
    )
}

fn end(channel: &str) -> String {
    format!(r#"{{"kind":"end","channel_id":"{}"}}"#, channel)
}

#[tokio::test]
async fn test_replay_full_vote() {
    let script = write_script(&[
        start("chan1", 300),
        vote("chan1", "alice", "vote_0", 5),
        vote("chan1", "bob", "vote_1", 6),
        vote("chan1", "alice", "vote_1", 7),
        vote("chan1", "alice", "vote_1", 8),
        vote("chan1", "carol", "vote_3", 9),
        vote("chan1", "carol", "vote_-1", 9),
        vote("chan2", "dave", "vote_0", 10),
        vote("chan1", "erin", "vote_2", 301),
        end("chan1"),
    ]);

    let records = run_replay_file(script.path(), &VoteboxConfig::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 10);

    // alice switches, then repeats her choice
    assert_eq!(records[3]["image_number"], 2);
    assert_eq!(records[3]["votes"], 2);
    assert_eq!(records[4]["status"], "recorded");
    assert_eq!(records[4]["votes"], 2);
    assert_eq!(
        records[4]["reply"],
        "You voted for Image 2! Current votes: 2"
    );

    for idx in [5, 6] {
        assert_eq!(records[idx]["status"], "rejected");
        assert_eq!(records[idx]["reply"], "Invalid vote option.");
    }
    assert_eq!(records[7]["reply"], "This vote has ended.");
    assert_eq!(records[8]["reply"], "This vote has ended.");

    let summary = &records[9]["summary"];
    assert_eq!(summary["total_votes"], 2);
    assert_eq!(summary["winners"], serde_json::json!([2]));
    assert_eq!(summary["options"][0]["votes"], 0);
    assert_eq!(summary["options"][1]["caption"], "b!");
}

#[tokio::test]
async fn test_replay_reject_policy() {
    let config = load_from(|key| {
        (key == "VOTEBOX_OVERWRITE_POLICY").then(|| "reject".to_string())
    })
    .unwrap();
    assert_eq!(config.overwrite_policy, OverwritePolicy::Reject);

    let script = write_script(&[
        start("chan1", 60),
        start("chan1", 60),
        end("chan1"),
        end("chan1"),
    ]);
    let records = run_replay_file(script.path(), &config).await.unwrap();

    assert!(records[0]["message_id"].is_string());
    assert!(records[1]["error"]
        .as_str()
        .unwrap()
        .contains("already has an open vote"));
    assert!(records[2]["summary"].is_object());
    assert!(records[3]["summary"].is_null());
}

#[tokio::test]
async fn test_replay_bad_script() {
    let script = write_script(&[start("chan1", 60), "{not json".to_string()]);
    let err = run_replay_file(script.path(), &VoteboxConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ReplayError::Parse { line: 2, .. }));

    let missing = std::path::Path::new("/nonexistent/votebox/script.jsonl");
    let err = run_replay_file(missing, &VoteboxConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ReplayError::Io(_)));
}

#[tokio::test]
async fn test_replay_rejects_times_past_calendar() {
    let script = write_script(&[
        start("chan1", 60),
        vote("chan1", "alice", "vote_0", 9_000_000_000_000_000),
    ]);
    let err = run_replay_file(script.path(), &VoteboxConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ReplayError::Parse { line: 2, .. }));

    let script = write_script(&[start("chan1", i64::MAX)]);
    let err = run_replay_file(script.path(), &VoteboxConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ReplayError::Parse { line: 1, .. }));
}
