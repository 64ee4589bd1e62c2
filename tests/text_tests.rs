use std::io::Cursor;
use std::path::Path;

use chrono::{DateTime, Utc};
use log_merge::text::{TextLogName, TextLogReader};
use log_merge::{LogError, LogLevel, LogLineCollection};

fn at(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text).unwrap().to_utc()
}

fn read(content: &str, start: &str) -> Vec<log_merge::LogLine> {
    let reader = TextLogReader::new(Cursor::new(content.as_bytes().to_vec()), at(start), LogLevel::Info, true);
    reader.map(|line| line.unwrap()).collect()
}

#[test]
fn test_file_name_parsing() {
    let name = TextLogName::parse(Path::new("logs/cbl_warning_1704067200000.cbllog")).unwrap();
    assert_eq!(name.level, LogLevel::Warn);
    assert_eq!(name.start, at("2024-01-01T00:00:00Z"));

    let name = TextLogName::parse(Path::new("cbl_debug_1704067200123.txt")).unwrap();
    assert_eq!(name.level, LogLevel::Debug);
    assert_eq!(name.start, at("2024-01-01T00:00:00.123Z"));
}

#[test]
fn test_unrecognized_file_names() {
    for bad in [
        "cbl_info.cbllog",
        "cbl_loud_1704067200000.cbllog",
        "cbl_info_soon.cbllog",
        "my_cbl_info_1704067200000.cbllog",
    ] {
        assert!(
            matches!(TextLogName::parse(Path::new(bad)), Err(LogError::UnrecognizedFileName(_))),
            "accepted {}",
            bad
        );
    }
}

#[test]
fn test_banner_takes_day_start() {
    let lines = read(
        "---- CouchbaseLite/3.1.0 (Java; Linux) serialNo=12\n13:45:10.5| opened\n",
        "2024-01-01T13:00:00Z",
    );
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].time(), at("2024-01-01T00:00:00Z"));
    assert!(lines[0].message().starts_with("---- CouchbaseLite"));
    assert_eq!(lines[1].time(), at("2024-01-01T13:45:10.5Z"));
    assert_eq!(lines[1].message(), " opened");
    assert_eq!(lines[1].level(), LogLevel::Info);
    assert!(lines[1].domain().is_none());
}

#[test]
fn test_day_rollover() {
    let lines = read("23:59:59| late\n00:00:01| early\n", "2024-01-01T08:00:00Z");
    assert_eq!(lines[0].time(), at("2024-01-01T23:59:59Z"));
    assert_eq!(lines[1].time(), at("2024-01-02T00:00:01Z"));

    let mut merged = LogLineCollection::new();
    merged.add(lines[1].clone());
    merged.add(lines[0].clone());
    let messages: Vec<_> = merged.iter().map(|line| line.message().to_string()).collect();
    assert_eq!(messages, [" late", " early"]);
}

#[test]
fn test_continuation_line_reuses_time() {
    let lines = read("10:00:00.25| first\r\nno separator here\n", "2024-01-01T00:00:00Z");
    assert_eq!(lines[1].time(), lines[0].time());
    assert_eq!(lines[1].message(), "no separator here");
}

#[test]
fn test_invalid_timestamp_stops_reader() {
    let mut reader = TextLogReader::new(
        Cursor::new(b"25:00:00| bad\n10:00:00| fine\n".to_vec()),
        at("2024-01-01T00:00:00Z"),
        LogLevel::Error,
        true,
    );
    assert!(matches!(reader.next(), Some(Err(LogError::InvalidTimestamp(_)))));
    assert!(reader.next().is_none());
}

#[test]
fn test_open_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cbl_error_1704067200000.cbllog");
    std::fs::write(&path, "---- CouchbaseLite banner\n00:00:02| boom\n").unwrap();

    let reader = TextLogReader::open(&path, true).unwrap();
    assert_eq!(reader.level(), LogLevel::Error);
    let lines: Vec<_> = reader.map(|line| line.unwrap()).collect();
    assert_eq!(lines[1].time(), at("2024-01-01T00:00:02Z"));
    assert_eq!(lines[1].level(), LogLevel::Error);
}
