//! CSV export and query helpers over a real store file

mod common;

use common::{create_test_record, temp_store};
use intellimail::export::{
    export_csv, filter_unreplied, paginate, sort_by_timestamp_desc, CSV_HEADER, NO_EMAILS_MESSAGE,
};

fn parse(csv: &str) -> (Vec<String>, Vec<csv::StringRecord>) {
    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let headers = reader
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader.records().map(|r| r.unwrap()).collect();
    (headers, rows)
}

#[tokio::test]
async fn test_export_empty_store_has_placeholder_row() {
    let (_dir, store) = temp_store();
    store.replace_all(&[]).await.unwrap();

    let (headers, rows) = parse(&export_csv(&store).await);

    assert_eq!(headers, CSV_HEADER.to_vec());
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][5], NO_EMAILS_MESSAGE);
    assert_eq!(&rows[0][0], "");
}

#[tokio::test]
async fn test_export_missing_store_has_placeholder_row() {
    let (_dir, store) = temp_store();

    let (_, rows) = parse(&export_csv(&store).await);
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][5], "No emails found.");
}

#[tokio::test]
async fn test_export_invalid_store_has_error_row() {
    let (_dir, store) = temp_store();
    std::fs::write(store.path(), "{\"emails\": [ {\"id\": ").unwrap();

    let (headers, rows) = parse(&export_csv(&store).await);

    assert_eq!(headers.len(), 9);
    assert_eq!(rows.len(), 1);
    assert!(rows[0][5].starts_with("Error: "));
}

#[tokio::test]
async fn test_export_rows_follow_store_order() {
    let (_dir, store) = temp_store();
    let mut drafted = create_test_record("b", 200, false);
    drafted.draft = Some("Hi Alice, on it.".to_string());
    store
        .replace_all(&[create_test_record("a", 100, true), drafted])
        .await
        .unwrap();

    let (_, rows) = parse(&export_csv(&store).await);

    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][0], "a");
    assert_eq!(&rows[0][1], "thread_a");
    assert_eq!(&rows[0][4], "100");
    assert_eq!(&rows[0][6], "- item a needs review");
    assert_eq!(&rows[0][7], "true");
    assert_eq!(&rows[0][8], "");
    assert_eq!(&rows[1][7], "false");
    assert_eq!(&rows[1][8], "Hi Alice, on it.");
}

#[test]
fn test_unreplied_page_of_newest() {
    let records = vec![
        create_test_record("a", 100, false),
        create_test_record("b", 300, false),
        create_test_record("r", 400, true),
        create_test_record("c", 200, false),
    ];

    let mut unreplied = filter_unreplied(&records);
    sort_by_timestamp_desc(&mut unreplied);

    let first: Vec<_> = paginate(&unreplied, 0, 2).iter().map(|r| r.timestamp).collect();
    let second: Vec<_> = paginate(&unreplied, 2, 2).iter().map(|r| r.timestamp).collect();
    assert_eq!(first, vec![300, 200]);
    assert_eq!(second, vec![100]);
    assert!(paginate(&unreplied, 4, 2).is_empty());
}
