//! Common test utilities and fixtures

#![allow(dead_code)]

use intellimail::error::Result;
use intellimail::gateway::MailGateway;
use intellimail::generator::DraftGenerator;
use intellimail::models::{EmailRecord, FetchedMessage, Generation};
use intellimail::store::EmailStore;
use mockall::mock;
use tempfile::TempDir;

pub const OWNER: &str = "me@example.com";

/// Create a fetched message with default values
pub fn create_fetched_message(id: &str, timestamp: i64) -> FetchedMessage {
    FetchedMessage {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        sender: "Alice Example <alice@example.com>".to_string(),
        subject: format!("Question {}", id),
        timestamp,
        body: format!("Could you look at item {} before Friday?", id),
    }
}

/// Create a stored record that has a summary but no draft yet
pub fn create_test_record(id: &str, timestamp: i64, replied: bool) -> EmailRecord {
    EmailRecord {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        sender: "Alice Example <alice@example.com>".to_string(),
        subject: format!("Question {}", id),
        timestamp,
        body: format!("Could you look at item {} before Friday?", id),
        summary: Some(format!("- item {} needs review", id)),
        replied,
        draft: if replied { Some(String::new()) } else { None },
    }
}

/// Store backed by a fresh temp directory; keep the `TempDir` alive for the test
pub fn temp_store() -> (TempDir, EmailStore) {
    let dir = TempDir::new().expect("create temp dir");
    let store = EmailStore::new(dir.path().join("emails.json"));
    (dir, store)
}

/// Raw bytes of the store file, or `None` when it was never written
pub fn store_bytes(store: &EmailStore) -> Option<Vec<u8>> {
    std::fs::read(store.path()).ok()
}

pub fn summary_for(text: &str) -> String {
    format!("- {}", text)
}

pub fn draft_for(text: &str) -> String {
    format!("Hi, thanks for your note about: {}", text)
}

mock! {
    pub MailGateway {}

    #[async_trait::async_trait]
    impl MailGateway for MailGateway {
        async fn list_recent(&self, max_results: u32) -> Result<Vec<FetchedMessage>>;
        async fn owner_aliases(&self) -> Result<Vec<String>>;
        async fn thread_replied(&self, thread_id: &str, aliases: &[String]) -> Result<bool>;
        async fn send_reply(&self, thread_id: &str, text: &str) -> Result<()>;
    }
}

mock! {
    pub DraftGenerator {}

    #[async_trait::async_trait]
    impl DraftGenerator for DraftGenerator {
        async fn summarize(&self, text: &str) -> Generation;
        async fn draft_reply(&self, text: &str) -> Generation;
    }
}

/// Generator that succeeds with deterministic text and expects exactly the given call counts
pub fn counting_generator(summaries: usize, drafts: usize) -> MockDraftGenerator {
    let mut generator = MockDraftGenerator::new();
    generator
        .expect_summarize()
        .times(summaries)
        .returning(|text| Generation::ok(summary_for(text)));
    generator
        .expect_draft_reply()
        .times(drafts)
        .returning(|text| Generation::ok(draft_for(text)));
    generator
}

/// Generator that must never be called
pub fn unused_generator() -> MockDraftGenerator {
    counting_generator(0, 0)
}

/// Gateway that must never be called
pub fn unused_gateway() -> MockMailGateway {
    let mut gateway = MockMailGateway::new();
    gateway.expect_list_recent().never();
    gateway.expect_owner_aliases().never();
    gateway.expect_thread_replied().never();
    gateway.expect_send_reply().never();
    gateway
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_fetched_message() {
        let msg = create_fetched_message("m1", 100);
        assert_eq!(msg.thread_id, "thread_m1");
        assert_eq!(msg.timestamp, 100);
    }

    #[test]
    fn test_create_test_record_replied_has_empty_draft() {
        let record = create_test_record("m1", 100, true);
        assert_eq!(record.draft.as_deref(), Some(""));
        assert!(!create_test_record("m2", 100, false).draft.is_some());
    }
}
