// CSV export of a run's records

mod common;

use common::{minimal_record, record};
use ecowatch::aggregation::aggregate;
use ecowatch::export::{CSV_HEADER, to_csv_string, write_csv};

#[test]
fn test_empty_run_has_header_only() {
    let agg = aggregate("7", &[]).unwrap();
    let csv = to_csv_string(&agg).unwrap();
    assert_eq!(csv.lines().count(), 1);
    assert!(csv.starts_with("Timestamp,PID,CPU Usage (%)"));
}

#[test]
fn test_rows_follow_arrival_order() {
    let records = vec![
        minimal_record("2", "7", 2_000),
        minimal_record("1", "7", 1_000),
    ];
    let agg = aggregate("7", &records).unwrap();
    let csv = to_csv_string(&agg).unwrap();

    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADER.to_vec());
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][0], "1970-01-01T00:00:02.000Z");
    assert_eq!(&rows[1][0], "1970-01-01T00:00:01.000Z");
}

#[test]
fn test_row_values() {
    let agg = aggregate("7", &[record("1", "7", (40.5, 3.0, 12.0), (10.0, 2.0, 1.5, 0.25))]).unwrap();
    let mut buf = Vec::new();
    write_csv(&agg, &mut buf).unwrap();

    let mut reader = csv::Reader::from_reader(buf.as_slice());
    let row = reader.records().next().unwrap().unwrap();
    assert_eq!(&row[1], "4242");
    assert_eq!(&row[2], "40.5");
    assert_eq!(&row[3], "10");
    assert_eq!(&row[4], "3");
    assert_eq!(&row[7], "1.5");
    assert_eq!(&row[9], "0.25");
}
