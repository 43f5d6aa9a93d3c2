//! Integration tests for the store backends

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::strings;
use rtms_ingest::models::TransactionRecord;
use rtms_ingest::store::{CsvFileStore, SheetsStore, StoreError, StoreWriter, TabularStore};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VALUES_PATH: &str = "/v4/spreadsheets/sheet-123/values/Trades";

fn sheets_store(server: &MockServer) -> SheetsStore {
    SheetsStore::new(&server.uri(), "sheet-123", "Trades", "token-abc", Duration::from_secs(5))
        .unwrap()
}

fn record(amount: &str, floor: &str) -> TransactionRecord {
    TransactionRecord::from_fields([("dealAmount", amount), ("floor", floor), ("aptNm", "자이")])
}

#[tokio::test]
async fn test_csv_writer_creates_header_then_projects() {
    let dir = TempDir::new().unwrap();
    let store = CsvFileStore::new(dir.path().join("transactions.csv"));

    let mut writer = StoreWriter::new(store.clone());
    let snapshot = writer.load_snapshot().await.unwrap();
    assert!(snapshot.is_empty());

    assert_eq!(writer.append(&[record("50,000", "7")]).await.unwrap(), 1);

    // A later batch with a different field set keeps the first header
    let later = TransactionRecord::from_fields([("buildYear", "2008"), ("dealAmount", "51,000")]);
    assert_eq!(writer.append(&[later]).await.unwrap(), 1);

    let table = store.read_table().await.unwrap();
    assert_eq!(table.header, strings(&["dealAmount", "floor", "aptNm"]));
    assert_eq!(
        table.rows,
        vec![strings(&["50,000", "7", "자이"]), strings(&["51,000", "", ""])]
    );

    // A fresh writer sees both identities
    let snapshot = StoreWriter::new(store).load_snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
async fn test_sheets_read_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VALUES_PATH))
        .and(header("authorization", "Bearer token-abc"))
        .and(query_param("valueRenderOption", "FORMATTED_VALUE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "range": "Trades!A1:C3",
            "majorDimension": "ROWS",
            "values": [
                [" dealAmount", "floor ", "aptNm"],
                ["50,000", "7", "자이"],
                ["51,000"]
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let table = sheets_store(&server).read_table().await.unwrap();

    assert_eq!(table.header, strings(&["dealAmount", "floor", "aptNm"]));
    assert_eq!(table.rows.len(), 2);
    let records: Vec<_> = table.records().collect();
    assert_eq!(records[1].deal_amount.as_deref(), Some("51,000"));
    assert_eq!(records[1].floor.as_deref(), Some(""));
}

#[tokio::test]
async fn test_sheets_empty_sheet_has_no_values() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VALUES_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"range": "Trades!A1:Z1000", "majorDimension": "ROWS"})),
        )
        .mount(&server)
        .await;

    let table = sheets_store(&server).read_table().await.unwrap();
    assert!(table.is_empty());
}

#[tokio::test]
async fn test_sheets_append_writes_raw_values() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VALUES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "values": [["floor", "dealAmount"]]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{VALUES_PATH}:append")))
        .and(query_param("valueInputOption", "RAW"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .and(body_partial_json(serde_json::json!({
            "values": [["7", "50,000"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "spreadsheetId": "sheet-123",
            "updates": {"updatedRows": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut writer = StoreWriter::new(sheets_store(&server));
    writer.load_snapshot().await.unwrap();
    assert_eq!(writer.append(&[record("50,000", "7")]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_sheets_rejection_is_store_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{VALUES_PATH}:append")))
        .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
        .mount(&server)
        .await;

    let err = sheets_store(&server)
        .append_rows(vec![strings(&["a"])])
        .await
        .unwrap_err();

    match err {
        StoreError::Rejected(message) => assert!(message.contains("PERMISSION_DENIED")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_sheets_missing_tab_is_created_on_first_append() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VALUES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {
                "code": 400,
                "message": "Unable to parse range: Trades",
                "status": "INVALID_ARGUMENT"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-123:batchUpdate"))
        .and(body_partial_json(serde_json::json!({
            "requests": [{"addSheet": {"properties": {"title": "Trades"}}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "spreadsheetId": "sheet-123"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{VALUES_PATH}:append")))
        .and(body_partial_json(serde_json::json!({
            "values": [["dealAmount", "floor", "aptNm"], ["50,000", "7", "자이"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "spreadsheetId": "sheet-123"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let mut writer = StoreWriter::new(sheets_store(&server));
    let snapshot = writer.load_snapshot().await.unwrap();
    assert!(snapshot.is_empty());

    assert_eq!(writer.append(&[record("50,000", "7")]).await.unwrap(), 1);
    // The tab exists now, so a second append goes straight to values.append
    writer
        .store()
        .append_rows(vec![
            strings(&["dealAmount", "floor", "aptNm"]),
            strings(&["50,000", "7", "자이"]),
        ])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sheets_other_bad_request_still_fails_read() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VALUES_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid requests"))
        .mount(&server)
        .await;

    let err = sheets_store(&server).read_table().await.unwrap_err();
    assert!(matches!(err, StoreError::Rejected(ref message) if message.contains("Invalid requests")));
}
