use std::io::Cursor;

use chrono::{DateTime, Utc};
use log_merge::{LogArgument, LogDecoder, LogEncoder, LogError, LogLevel, PointerSize};

// 2024-01-01T00:00:00Z as a varint
const START: [u8; 5] = [0x80, 0x81, 0xC8, 0xAC, 0x06];

fn header(pointer_size: u8) -> Vec<u8> {
    let mut data = vec![0xCF, 0xB2, 0xAB, 0x1B]; // Magic
    data.push(1); // Version
    data.push(pointer_size);
    data.extend_from_slice(&START);
    data
}

fn at(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text).unwrap().to_utc()
}

fn decode_all(data: &[u8]) -> Vec<log_merge::LogLine> {
    LogDecoder::new(data).unwrap().map(|line| line.unwrap()).collect()
}

/// Two records: "count=%d" with -5, then "name=%-s" with "db1".
fn two_record_log() -> Vec<u8> {
    let mut data = header(4);

    data.extend_from_slice(&[0xE0, 0xC6, 0x5B]); // Elapsed 1_500_000us
    data.push(2); // Info
    data.push(0); // Domain 0, first use
    data.extend_from_slice(b"DB\0");
    data.push(0); // No object
    data.push(1); // Format 1, first use
    data.extend_from_slice(b"count=%d\0");
    data.extend_from_slice(&[1, 5]); // Negative, magnitude 5

    data.push(0); // Elapsed 0
    data.push(3); // Warn
    data.push(0); // Domain 0, already seen
    data.push(0); // No object
    data.push(2); // Format 2, first use
    data.extend_from_slice(b"name=%-s\0");
    data.push(3); // Token 3, first use
    data.extend_from_slice(b"db1\0");
    data
}

#[test]
fn test_two_record_log() {
    let data = two_record_log();
    let mut decoder = LogDecoder::new(&data[..]).unwrap();
    assert_eq!(decoder.version(), 1);
    assert_eq!(decoder.pointer_size(), PointerSize::Four);
    assert_eq!(decoder.start(), at("2024-01-01T00:00:00Z"));

    let first = decoder.read_line().unwrap().unwrap();
    assert_eq!(first.message(), "count=-5");
    assert_eq!(first.level(), LogLevel::Info);
    assert_eq!(first.time(), at("2024-01-01T00:00:01.5Z"));
    assert_eq!(first.domain().unwrap().value(), "DB");
    assert!(first.object().is_none());
    assert_eq!(first.arguments(), &[LogArgument::signed(-5)]);

    let second = decoder.read_line().unwrap().unwrap();
    assert_eq!(second.message(), "name=db1");
    assert_eq!(second.level(), LogLevel::Warn);
    assert_eq!(second.time(), first.time());
    assert_eq!(second.domain().unwrap().value(), "DB");

    assert!(decoder.is_finished().unwrap());
    assert!(decoder.read_line().unwrap().is_none());
    assert_eq!(decoder.records_read(), 2);
}

#[test]
fn test_round_trip_through_encoder() {
    let data = two_record_log();
    let decoder = LogDecoder::new(&data[..]).unwrap();
    let start = decoder.start();
    let lines: Vec<_> = decoder.map(|line| line.unwrap()).collect();

    let mut encoder = LogEncoder::new(Cursor::new(Vec::new()), start).unwrap();
    for line in &lines {
        encoder.write_line(line).unwrap();
    }
    let encoded = encoder.finish().unwrap().into_inner();

    let again = decode_all(&encoded);
    assert_eq!(again.len(), 2);
    for (before, after) in lines.iter().zip(&again) {
        assert_eq!(before.message(), after.message());
        assert_eq!(before.arguments(), after.arguments());
        assert_eq!(before.time(), after.time());
        assert_eq!(before.level(), after.level());
    }
    assert_eq!(again[0].message(), "count=-5");
    assert_eq!(again[1].message(), "name=db1");
}

#[test]
fn test_header_only_is_empty_log() {
    let data = header(8);
    let mut decoder = LogDecoder::new(&data[..]).unwrap();
    assert_eq!(decoder.pointer_size(), PointerSize::Eight);
    assert!(decoder.is_finished().unwrap());
    assert!(decoder.read_line().unwrap().is_none());
}

#[test]
fn test_header_errors() {
    let mut bad_magic = header(4);
    bad_magic[0] = 0x00;
    assert!(matches!(
        LogDecoder::new(&bad_magic[..]),
        Err(LogError::InvalidMagic([0x00, 0xB2, 0xAB, 0x1B]))
    ));

    let mut bad_version = header(4);
    bad_version[4] = 2;
    assert!(matches!(LogDecoder::new(&bad_version[..]), Err(LogError::UnsupportedVersion(2))));

    let bad_pointer = header(6);
    assert!(matches!(LogDecoder::new(&bad_pointer[..]), Err(LogError::InvalidPointerSize(6))));

    let full = header(4);
    assert!(matches!(LogDecoder::new(&full[..7]), Err(LogError::TruncatedHeader)));
    assert!(matches!(LogDecoder::new(&[0u8; 0][..]), Err(LogError::TruncatedHeader)));
}

#[test]
fn test_truncated_record_stops_iteration() {
    let mut data = two_record_log();
    data.truncate(data.len() - 2); // Cut into the "db1" literal

    let mut decoder = LogDecoder::new(&data[..]).unwrap();
    assert!(decoder.next().unwrap().is_ok());
    assert!(matches!(decoder.next(), Some(Err(LogError::Truncated { record: 1 }))));
    assert!(decoder.next().is_none());
}

#[test]
fn test_record_level_errors() {
    let mut bad_level = header(4);
    bad_level.extend_from_slice(&[0, 9, 0]);
    let mut decoder = LogDecoder::new(&bad_level[..]).unwrap();
    assert!(matches!(decoder.read_line(), Err(LogError::InvalidLevel(9))));

    let mut overflow = header(4);
    overflow.extend_from_slice(&[0xFF; 10]); // Elapsed past 64 bits
    let mut decoder = LogDecoder::new(&overflow[..]).unwrap();
    assert!(matches!(decoder.read_line(), Err(LogError::VarintOverflow)));

    let mut bad_format = header(4);
    bad_format.extend_from_slice(&[0, 2, 0]);
    bad_format.extend_from_slice(b"D\0");
    bad_format.push(0);
    bad_format.push(1);
    bad_format.extend_from_slice(b"%k\0");
    let mut decoder = LogDecoder::new(&bad_format[..]).unwrap();
    assert!(matches!(
        decoder.read_line(),
        Err(LogError::UnknownConversion { conversion: Some('k'), .. })
    ));
}

#[test]
fn test_object_ids() {
    let mut data = header(4);
    // Object 5 on first use carries its literal
    data.extend_from_slice(&[0, 1, 0]);
    data.extend_from_slice(b"DB\0");
    data.push(5);
    data.extend_from_slice(b"DB@0x1\0");
    data.push(1);
    data.extend_from_slice(b"opened\0");
    // Second use is the ID alone
    data.extend_from_slice(&[0, 1, 0, 5, 1]);
    // Object 0 is absent and never carries a literal
    data.extend_from_slice(&[0, 1, 0, 0, 1]);

    let lines = decode_all(&data);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].object().unwrap().value(), "DB@0x1");
    assert_eq!(lines[1].object().unwrap().id(), 5);
    assert_eq!(lines[1].object().unwrap().value(), "DB@0x1");
    assert!(lines[2].object().is_none());
    assert!(lines.iter().all(|line| line.message() == "opened"));
}

#[test]
fn test_missing_format_yields_empty_message() {
    let mut data = header(4);
    data.extend_from_slice(&[0, 4, 7]);
    data.extend_from_slice(b"Sync\0");
    data.push(0); // No object
    data.push(0); // No format, so no arguments either
    data.extend_from_slice(&[0, 4, 7, 0, 0]);

    let lines = decode_all(&data);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].level(), LogLevel::Error);
    assert_eq!(lines[0].domain().unwrap().id(), 7);
    assert!(lines[0].format().is_none());
    assert_eq!(lines[0].message(), "");
    assert!(lines[0].arguments().is_empty());
}

#[test]
fn test_argument_conversions() {
    let mut data = header(8);
    data.extend_from_slice(&[0, 0, 0]);
    data.extend_from_slice(b"Query\0");
    data.push(0);
    data.push(1);
    data.extend_from_slice(b"%c %x %lu %.2f %p 100%%\0");
    data.extend_from_slice(&[0, 65]); // 'A'
    data.extend_from_slice(&[0xFF, 0x01]); // 255
    data.push(42);
    data.extend_from_slice(&3.25f64.to_le_bytes());
    data.extend_from_slice(&0xDEAD_BEEFu64.to_le_bytes());

    let lines = decode_all(&data);
    assert_eq!(lines[0].message(), "A FF 42 3.25 0x00000000deadbeef 100%");
    assert_eq!(lines[0].level(), LogLevel::Debug);
}

#[test]
fn test_byte_string_variants() {
    let mut data = header(4);
    data.extend_from_slice(&[0, 2, 0]);
    data.extend_from_slice(b"BLIP\0");
    data.push(0);
    data.push(1);
    data.extend_from_slice(b"%s|%.*s|%-.*s\0");
    data.extend_from_slice(&[2, b'h', b'i']);
    data.extend_from_slice(&[3, b'a', b'b', b'c']);
    data.extend_from_slice(&[2, 0x0A, 0xFF]);

    let lines = decode_all(&data);
    assert_eq!(lines[0].message(), "hi|abc|0AFF");
}

#[test]
fn test_argument_tokens_share_the_domain_id_space() {
    let mut data = header(4);
    data.extend_from_slice(&[0, 2, 1]);
    data.extend_from_slice(b"DB\0");
    data.push(0);
    data.push(2);
    data.extend_from_slice(b"in %-s\0");
    data.push(1); // Token 1 is the domain literal already read

    let lines = decode_all(&data);
    assert_eq!(lines[0].message(), "in DB");
}

#[test]
fn test_elapsed_accumulates() {
    let mut data = header(4);
    data.extend_from_slice(&[0xE0, 0xC6, 0x5B, 2, 0]); // +1.5s
    data.extend_from_slice(b"DB\0");
    data.extend_from_slice(&[0, 0]);
    data.extend_from_slice(&[0xC0, 0xBB, 0xA0, 0xEE, 0xC1, 0x02, 2, 0, 0, 0]); // +86399s

    let lines = decode_all(&data);
    assert_eq!(lines[0].time(), at("2024-01-01T00:00:01.5Z"));
    assert_eq!(lines[1].time(), at("2024-01-02T00:00:00.5Z"));
}

#[test]
fn test_every_conversion_survives_reencoding() {
    let mut data = header(8);
    data.extend_from_slice(&[0x05, 2, 0]); // Elapsed 5us, Info, domain 0
    data.extend_from_slice(b"Query\0");
    data.push(5); // Object 5, first use
    data.extend_from_slice(b"Conn@0x1\0");
    data.push(1);
    data.extend_from_slice(b"%c %d %u %x %.1f %p %s %.*s %-.*s %-s %-s\0");
    data.extend_from_slice(&[0, 90]); // 'Z'
    data.extend_from_slice(&[1, 7]); // -7
    data.extend_from_slice(&[0xAC, 0x02]); // 300
    data.extend_from_slice(&[0xFF, 0x01]); // 255
    data.extend_from_slice(&2.5f64.to_le_bytes());
    data.extend_from_slice(&0xCAFE_F00Du64.to_le_bytes());
    data.extend_from_slice(&[2, b'h', b'i']);
    data.extend_from_slice(&[3, b'a', b'b', b'c']);
    data.extend_from_slice(&[2, 0xDE, 0xAD]);
    data.push(7); // Token 7, first use
    data.extend_from_slice(b"db1\0");
    data.push(7); // Token 7 again, ID only

    data.extend_from_slice(&[0x0A, 3, 0, 5, 2]); // Elapsed 10us, Warn, domain 0, object 5, format 2
    data.extend_from_slice(b"again %-s at %p\0");
    data.push(7);
    data.extend_from_slice(&1u64.to_le_bytes());

    let decoder = LogDecoder::new(&data[..]).unwrap();
    let start = decoder.start();
    let lines: Vec<_> = decoder.map(|line| line.unwrap()).collect();
    assert_eq!(
        lines[0].message(),
        "Z -7 300 FF 2.5 0x00000000cafef00d hi abc DEAD db1 db1"
    );
    assert_eq!(lines[1].message(), "again db1 at 0x0000000000000001");

    let mut encoder = LogEncoder::new(Cursor::new(Vec::new()), start).unwrap();
    for line in &lines {
        encoder.write_line(line).unwrap();
    }
    assert_eq!(encoder.pointer_size(), Some(PointerSize::Eight));
    let encoded = encoder.finish().unwrap().into_inner();

    let mut decoder = LogDecoder::new(&encoded[..]).unwrap();
    assert_eq!(decoder.pointer_size(), PointerSize::Eight);
    let again: Vec<_> = decoder.by_ref().map(|line| line.unwrap()).collect();
    assert_eq!(again.len(), lines.len());
    for (before, after) in lines.iter().zip(&again) {
        assert_eq!(before.arguments(), after.arguments());
        assert_eq!(before.message(), after.message());
        assert_eq!(before.time(), after.time());
        assert_eq!(before.level(), after.level());
        assert_eq!(after.object().unwrap().value(), "Conn@0x1");
    }
}
