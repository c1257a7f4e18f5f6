//! Read-only views over the stored collection: filtering, ordering, paging, CSV

use tracing::warn;

use crate::error::Result;
use crate::models::EmailRecord;
use crate::store::EmailStore;

/// Column order of the CSV export
pub const CSV_HEADER: [&str; 9] = [
    "id",
    "thread_id",
    "sender",
    "subject",
    "timestamp",
    "body",
    "summary",
    "replied",
    "draft",
];

pub const NO_EMAILS_MESSAGE: &str = "No emails found.";

pub fn filter_unreplied(records: &[EmailRecord]) -> Vec<EmailRecord> {
    records.iter().filter(|r| !r.replied).cloned().collect()
}

/// Newest first; records with equal timestamps keep their relative order
pub fn sort_by_timestamp_desc(records: &mut [EmailRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// Window of `limit` records starting at `offset`; out-of-range offsets yield an empty slice
pub fn paginate<T>(records: &[T], offset: usize, limit: usize) -> &[T] {
    let start = offset.min(records.len());
    let end = start.saturating_add(limit).min(records.len());
    &records[start..end]
}

/// Render the stored collection as CSV.
///
/// Never fails: an empty store yields a single "No emails found." row and an
/// unreadable store a single `Error: ...` row, both in the `body` column.
pub async fn export_csv(store: &EmailStore) -> String {
    let rows = match store.try_load().await {
        Ok(records) if records.is_empty() => vec![placeholder_row(NO_EMAILS_MESSAGE)],
        Ok(records) => records.iter().map(record_row).collect(),
        Err(e) => {
            warn!("Exporting error row for unreadable store {:?}: {}", store.path(), e);
            vec![placeholder_row(&format!("Error: {}", e))]
        }
    };

    match write_csv(&rows) {
        Ok(csv) => csv,
        Err(e) => {
            warn!("CSV rendering failed: {}", e);
            format!("{}\n,,,,,Error: {},,,\n", CSV_HEADER.join(","), e)
        }
    }
}

fn record_row(record: &EmailRecord) -> [String; 9] {
    [
        record.id.clone(),
        record.thread_id.clone(),
        record.sender.clone(),
        record.subject.clone(),
        record.timestamp.to_string(),
        record.body.clone(),
        record.summary.clone().unwrap_or_default(),
        record.replied.to_string(),
        record.draft.clone().unwrap_or_default(),
    ]
}

fn placeholder_row(body: &str) -> [String; 9] {
    let mut row: [String; 9] = Default::default();
    row[5] = body.to_string();
    row
}

fn write_csv(rows: &[[String; 9]]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in rows {
        writer.write_record(row)?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
