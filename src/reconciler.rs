//! Reconciler: merges freshly fetched mail with the store and fills in AI fields
//!
//! Collaborators are injected, so tests can run the whole pass against
//! in-memory doubles. A pass either completes and replaces the stored
//! collection, or fails before anything is written.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::MAX_FETCH_RESULTS;
use crate::error::{MailError, Result};
use crate::export::{filter_unreplied, sort_by_timestamp_desc};
use crate::gateway::MailGateway;
use crate::generator::DraftGenerator;
use crate::models::{ensure_unique_ids, EmailRecord, FetchedMessage, Generation};
use crate::store::EmailStore;

/// Clamp a requested fetch count into `1..=MAX_FETCH_RESULTS`
pub fn clamp_max_results(requested: u32) -> u32 {
    requested.clamp(1, MAX_FETCH_RESULTS)
}

pub struct Reconciler {
    gateway: Arc<dyn MailGateway>,
    generator: Arc<dyn DraftGenerator>,
    store: EmailStore,
    max_concurrent: usize,
}

impl Reconciler {
    pub fn new(
        gateway: Arc<dyn MailGateway>,
        generator: Arc<dyn DraftGenerator>,
        store: EmailStore,
        max_concurrent: usize,
    ) -> Self {
        Self {
            gateway,
            generator,
            store,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn store(&self) -> &EmailStore {
        &self.store
    }

    /// Fetch recent mail, work out reply status, generate summaries and drafts,
    /// and replace the stored collection with the result.
    ///
    /// Gateway failures (fetch, aliases, thread inspection) and duplicate
    /// message ids abort before the store is touched. Generation failures
    /// only leave empty fields.
    pub async fn refresh(&self, max_results: u32) -> Result<Vec<EmailRecord>> {
        let max_results = clamp_max_results(max_results);
        info!("Refreshing up to {} recent emails", max_results);

        let messages = self.gateway.list_recent(max_results).await?;
        debug!("Fetched {} messages", messages.len());
        ensure_unique_ids(messages.iter().map(|m| m.id.as_str()))?;

        let aliases = self.gateway.owner_aliases().await?;
        debug!("Owner aliases: {:?}", aliases);

        // All thread checks complete before any generation starts
        let alias_slice = aliases.as_slice();
        let replied: Vec<bool> = stream::iter(messages.iter())
            .map(move |message| self.gateway.thread_replied(&message.thread_id, alias_slice))
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        let records: Vec<EmailRecord> = stream::iter(messages.into_iter().zip(replied))
            .map(|(message, replied)| self.reconcile_one(message, replied))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        self.store.replace_all(&records).await?;

        let unreplied = records.iter().filter(|r| !r.replied).count();
        info!(
            "Refresh complete: {} emails stored, {} awaiting reply",
            records.len(),
            unreplied
        );
        Ok(records)
    }

    async fn reconcile_one(&self, message: FetchedMessage, replied: bool) -> EmailRecord {
        let input = message.generation_input().to_string();

        let summary = self.generator.summarize(&input).await;
        if !summary.success {
            warn!("Summary for {} left empty", message.id);
        }

        let draft = if replied {
            String::new()
        } else {
            let draft = self.generator.draft_reply(&input).await;
            if !draft.success {
                warn!("Draft for {} left empty", message.id);
            }
            draft.into_text()
        };

        let mut record = EmailRecord::from_fetched(message);
        record.summary = Some(summary.into_text());
        record.replied = replied;
        record.draft = Some(draft);
        record
    }

    /// Newest unreplied emails, at most `limit`, with missing drafts generated
    /// and persisted.
    ///
    /// Records whose draft generation fails are returned without a draft and
    /// retried on the next call.
    pub async fn list_unreplied_with_drafts(&self, limit: usize) -> Result<Vec<EmailRecord>> {
        let mut records = self.store.load().await;

        let mut selected = filter_unreplied(&records);
        sort_by_timestamp_desc(&mut selected);
        selected.truncate(limit);

        let pending: Vec<usize> = selected
            .iter()
            .enumerate()
            .filter(|(_, r)| r.needs_draft())
            .map(|(i, _)| i)
            .collect();

        if pending.is_empty() {
            return Ok(selected);
        }

        debug!("Backfilling drafts for {} emails", pending.len());
        let generated: Vec<(usize, Generation)> = stream::iter(pending)
            .map(|i| {
                let input = selected[i].generation_input().to_string();
                async move { (i, self.generator.draft_reply(&input).await) }
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut backfilled: HashMap<String, String> = HashMap::new();
        for (i, generation) in generated {
            if generation.success && !generation.text.is_empty() {
                selected[i].draft = Some(generation.text.clone());
                backfilled.insert(selected[i].id.clone(), generation.text);
            } else {
                warn!("Could not backfill draft for {}", selected[i].id);
            }
        }

        if !backfilled.is_empty() {
            for record in records.iter_mut() {
                if let Some(draft) = backfilled.remove(&record.id) {
                    record.draft = Some(draft);
                }
            }
            self.store.replace_all(&records).await?;
            info!("Persisted backfilled drafts");
        }

        Ok(selected)
    }

    /// Send `reply_text` into the stored email's thread and flag it replied.
    ///
    /// The store is only written after the send succeeds. A corrupt store
    /// surfaces as `StoreCorrupt` rather than an unknown id.
    pub async fn mark_replied(&self, id: &str, reply_text: &str) -> Result<EmailRecord> {
        if reply_text.trim().is_empty() {
            return Err(MailError::BadRequest("Reply text is empty".to_string()));
        }

        let mut record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| MailError::EmailNotFound(id.to_string()))?;

        self.gateway.send_reply(&record.thread_id, reply_text).await?;
        info!("Reply sent for email {} (thread {})", id, record.thread_id);

        let matched = self.store.update_one(id, EmailRecord::mark_replied).await?;
        if !matched {
            return Err(MailError::EmailNotFound(id.to_string()));
        }

        record.mark_replied();
        Ok(record)
    }

    /// The whole stored collection
    pub async fn list_emails(&self) -> Vec<EmailRecord> {
        self.store.load().await
    }

    /// Replace the stored collection with caller-supplied records
    pub async fn save_emails(&self, records: &[EmailRecord]) -> Result<usize> {
        self.store.replace_all(records).await?;
        info!("Saved {} client-provided emails", records.len());
        Ok(records.len())
    }

    pub async fn generate_summary(&self, text: &str) -> Generation {
        if text.trim().is_empty() {
            return Generation::failed("No text provided");
        }
        self.generator.summarize(text).await
    }

    pub async fn generate_draft(&self, text: &str) -> Generation {
        if text.trim().is_empty() {
            return Generation::failed("No text provided");
        }
        self.generator.draft_reply(text).await
    }

    /// Fetch recent messages without generating anything or touching the store
    pub async fn preview_recent(&self, count: u32) -> Result<Vec<FetchedMessage>> {
        self.gateway.list_recent(clamp_max_results(count)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_max_results() {
        assert_eq!(clamp_max_results(0), 1);
        assert_eq!(clamp_max_results(1), 1);
        assert_eq!(clamp_max_results(20), 20);
        assert_eq!(clamp_max_results(50), 50);
        assert_eq!(clamp_max_results(500), 50);
    }
}
