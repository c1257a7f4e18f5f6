//! Mail gateway: Gmail access for fetching, thread inspection, and replies

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use google_gmail1::api::{Message, MessagePart};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::auth::{GmailHub, CALL_SCOPE};
use crate::config::GatewayConfig;
use crate::error::{MailError, Result};
use crate::models::FetchedMessage;

/// Operations the reconciler needs from the mailbox provider
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// Fetch up to `max_results` of the most recent messages, newest first
    async fn list_recent(&self, max_results: u32) -> Result<Vec<FetchedMessage>>;

    /// Addresses the mailbox owner sends from (primary address plus send-as aliases)
    async fn owner_aliases(&self) -> Result<Vec<String>>;

    /// True if any message after the first in the thread was sent by one of `aliases`
    async fn thread_replied(&self, thread_id: &str, aliases: &[String]) -> Result<bool>;

    /// Send `text` as a reply to the last message of the thread
    async fn send_reply(&self, thread_id: &str, text: &str) -> Result<()>;
}

#[async_trait]
impl<G: MailGateway + ?Sized> MailGateway for Arc<G> {
    async fn list_recent(&self, max_results: u32) -> Result<Vec<FetchedMessage>> {
        self.as_ref().list_recent(max_results).await
    }

    async fn owner_aliases(&self) -> Result<Vec<String>> {
        self.as_ref().owner_aliases().await
    }

    async fn thread_replied(&self, thread_id: &str, aliases: &[String]) -> Result<bool> {
        self.as_ref().thread_replied(thread_id, aliases).await
    }

    async fn send_reply(&self, thread_id: &str, text: &str) -> Result<()> {
        self.as_ref().send_reply(thread_id, text).await
    }
}

/// Gmail-backed gateway with bounded concurrency, per-call timeouts, and retry
pub struct ProductionMailGateway {
    hub: GmailHub,
    rate_limiter: Arc<Semaphore>,
    max_concurrent: usize,
    request_timeout: Duration,
    max_retries: u32,
}

impl ProductionMailGateway {
    pub fn new(hub: GmailHub, config: &GatewayConfig) -> Self {
        Self {
            hub,
            rate_limiter: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            max_concurrent: config.max_concurrent_requests,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
        }
    }

    /// Authenticate and build a gateway in one step
    pub async fn connect(
        credentials_path: &std::path::Path,
        token_cache_path: &std::path::Path,
        config: &GatewayConfig,
    ) -> Result<Self> {
        let hub = crate::auth::initialize_gmail_hub(credentials_path, token_cache_path).await?;
        Ok(Self::new(hub, config))
    }

    /// Check if an error is retryable
    fn should_retry(error: &MailError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    let wait = match e {
                        MailError::RateLimitExceeded { retry_after } => {
                            Duration::from_secs(retry_after).max(delay)
                        }
                        _ => delay,
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one API call under the rate limiter, with a timeout per attempt and retry
    async fn call<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            MailError::NetworkError(format!("Failed to acquire rate limit permit: {}", e))
        })?;

        let timeout = self.request_timeout;
        Self::with_retry(operation_name, self.max_retries, || {
            let attempt = operation();
            async move {
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("Gmail API {} call timed out after {:?}", operation_name, timeout);
                        Err(MailError::NetworkError(format!(
                            "{} timed out after {:?}",
                            operation_name, timeout
                        )))
                    }
                }
            }
        })
        .await
    }

    async fn get_full_message(&self, id: &str) -> Result<FetchedMessage> {
        let message = self
            .call("messages.get", || async move {
                let (_, message) = self
                    .hub
                    .users()
                    .messages_get("me", id)
                    .format("full")
                    .add_scope(CALL_SCOPE)
                    .doit()
                    .await?;
                Ok::<_, MailError>(message)
            })
            .await?;

        parse_fetched_message(message)
    }

    async fn primary_address(&self) -> Result<String> {
        let profile = self
            .call("users.getProfile", || async move {
                let (_, profile) = self
                    .hub
                    .users()
                    .get_profile("me")
                    .add_scope(CALL_SCOPE)
                    .doit()
                    .await?;
                Ok::<_, MailError>(profile)
            })
            .await?;

        profile
            .email_address
            .filter(|address| !address.is_empty())
            .ok_or_else(|| MailError::ApiError("Profile has no email address".to_string()))
    }

    async fn thread_messages(&self, thread_id: &str, format: &'static str) -> Result<Vec<Message>> {
        let thread = self
            .call("threads.get", || async move {
                let (_, thread) = self
                    .hub
                    .users()
                    .threads_get("me", thread_id)
                    .format(format)
                    .add_scope(CALL_SCOPE)
                    .doit()
                    .await?;
                Ok::<_, MailError>(thread)
            })
            .await?;

        Ok(thread.messages.unwrap_or_default())
    }
}

#[async_trait]
impl MailGateway for ProductionMailGateway {
    async fn list_recent(&self, max_results: u32) -> Result<Vec<FetchedMessage>> {
        let response = self
            .call("messages.list", || async move {
                let (_, response) = self
                    .hub
                    .users()
                    .messages_list("me")
                    .max_results(max_results)
                    .add_scope(CALL_SCOPE)
                    .doit()
                    .await?;
                Ok::<_, MailError>(response)
            })
            .await?;

        let ids: Vec<String> = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .take(max_results as usize)
            .collect();

        debug!("messages.list returned {} ids", ids.len());

        // `buffered` keeps the provider's newest-first order
        let messages: Vec<FetchedMessage> = stream::iter(ids)
            .map(|id| async move { self.get_full_message(&id).await })
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        info!("Fetched {} recent messages", messages.len());
        Ok(messages)
    }

    async fn owner_aliases(&self) -> Result<Vec<String>> {
        let primary = self.primary_address().await?;
        let mut aliases = vec![primary];

        let send_as = self
            .call("settings.sendAs.list", || async move {
                let (_, response) = self
                    .hub
                    .users()
                    .settings_send_as_list("me")
                    .add_scope(CALL_SCOPE)
                    .doit()
                    .await?;
                Ok::<_, MailError>(response)
            })
            .await;

        match send_as {
            Ok(response) => {
                for address in response
                    .send_as
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|s| s.send_as_email)
                {
                    if !address.is_empty() && !aliases.iter().any(|a| a.eq_ignore_ascii_case(&address)) {
                        aliases.push(address);
                    }
                }
            }
            Err(e) => warn!("Could not list send-as aliases, using primary address only: {}", e),
        }

        debug!("Owner aliases: {:?}", aliases);
        Ok(aliases)
    }

    async fn thread_replied(&self, thread_id: &str, aliases: &[String]) -> Result<bool> {
        let messages = self.thread_messages(thread_id, "metadata").await?;
        Ok(thread_has_reply(&messages, aliases))
    }

    async fn send_reply(&self, thread_id: &str, text: &str) -> Result<()> {
        let messages = self.thread_messages(thread_id, "full").await?;
        let last = messages
            .last()
            .ok_or_else(|| MailError::SendFailed(format!("Thread {} has no messages", thread_id)))?;

        let owner = self.primary_address().await?;
        let raw = build_reply(last, &owner, text)?;

        // Sends run once, outside the retry loop
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            MailError::NetworkError(format!("Failed to acquire rate limit permit: {}", e))
        })?;

        let envelope = Message {
            thread_id: Some(thread_id.to_string()),
            ..Default::default()
        };
        let mime_type: mime::Mime = "message/rfc822"
            .parse()
            .map_err(|e| MailError::SendFailed(format!("Invalid MIME type: {}", e)))?;

        let send = self
            .hub
            .users()
            .messages_send(envelope, "me")
            .add_scope(CALL_SCOPE)
            .upload(Cursor::new(raw), mime_type);

        match tokio::time::timeout(self.request_timeout, send).await {
            Ok(Ok((_, sent))) => {
                info!(
                    "Sent reply in thread {} (message {})",
                    thread_id,
                    sent.id.unwrap_or_default()
                );
                Ok(())
            }
            Ok(Err(e)) => Err(MailError::SendFailed(MailError::from(e).to_string())),
            Err(_) => Err(MailError::SendFailed(format!(
                "send timed out after {:?}",
                self.request_timeout
            ))),
        }
    }
}

/// Case-insensitive lookup of a header on a message part
fn header_value<'a>(part: Option<&'a MessagePart>, name: &str) -> Option<&'a str> {
    part?
        .headers
        .as_ref()?
        .iter()
        .find(|h| h.name.as_deref().map_or(false, |n| n.eq_ignore_ascii_case(name)))
        .and_then(|h| h.value.as_deref())
}

fn part_data(part: &MessagePart) -> Option<String> {
    part.body
        .as_ref()
        .and_then(|b| b.data.as_ref())
        .filter(|d| !d.is_empty())
        .map(|d| String::from_utf8_lossy(d).into_owned())
}

/// Depth-first search for the first `text/plain` part with content
fn find_plain_text(part: &MessagePart) -> Option<String> {
    let is_plain = part
        .mime_type
        .as_deref()
        .map_or(false, |m| m.eq_ignore_ascii_case("text/plain"));
    if is_plain {
        if let Some(text) = part_data(part) {
            return Some(text);
        }
    }

    part.parts
        .as_ref()?
        .iter()
        .find_map(find_plain_text)
}

/// Plain-text body of a message: a `text/plain` part, else a single-part body, else the snippet
fn extract_body(message: &Message) -> String {
    let from_payload = message.payload.as_ref().and_then(|payload| {
        find_plain_text(payload).or_else(|| {
            let single_part = payload.parts.as_ref().map_or(true, |p| p.is_empty());
            if single_part {
                part_data(payload)
            } else {
                None
            }
        })
    });

    from_payload
        .or_else(|| message.snippet.clone())
        .unwrap_or_default()
}

/// Convert a full-format Gmail message into a fetched message
fn parse_fetched_message(message: Message) -> Result<FetchedMessage> {
    let id = message
        .id
        .clone()
        .ok_or_else(|| MailError::InvalidMessageFormat("Missing message ID".to_string()))?;
    let thread_id = message
        .thread_id
        .clone()
        .ok_or_else(|| MailError::InvalidMessageFormat("Missing thread ID".to_string()))?;

    let payload = message.payload.as_ref();
    let sender = header_value(payload, "From").unwrap_or_default().to_string();
    let subject = header_value(payload, "Subject").unwrap_or_default().to_string();
    let timestamp = message.internal_date.unwrap_or(0);
    let body = extract_body(&message);

    Ok(FetchedMessage {
        id,
        thread_id,
        sender,
        subject,
        timestamp,
        body,
    })
}

/// Substring match of the From header against the owner's addresses
fn from_matches_alias(from: &str, aliases: &[String]) -> bool {
    let from = from.to_lowercase();
    aliases
        .iter()
        .filter(|a| !a.is_empty())
        .any(|alias| from.contains(&alias.to_lowercase()))
}

/// True if a message after the first one in the thread was sent by the owner
fn thread_has_reply(messages: &[Message], aliases: &[String]) -> bool {
    messages.iter().skip(1).any(|m| {
        header_value(m.payload.as_ref(), "From")
            .map_or(false, |from| from_matches_alias(from, aliases))
    })
}

fn reply_subject(subject: &str) -> String {
    if subject.trim_start().to_lowercase().starts_with("re:") {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

/// The original's `Message-ID` if it is a well-formed `<msg-id>`
fn thread_message_id(payload: Option<&MessagePart>) -> Option<String> {
    header_value(payload, "Message-ID")
        .map(str::trim)
        .filter(|id| id.len() > 2 && id.starts_with('<') && id.ends_with('>'))
        .filter(|id| !id.contains(char::is_whitespace))
        .map(str::to_string)
}

/// Build an RFC 822 reply to `original`
///
/// Threading headers are only set when the original carries a usable
/// `Message-ID`.
fn build_reply(original: &Message, owner: &str, text: &str) -> Result<Vec<u8>> {
    let payload = original.payload.as_ref();
    let to = header_value(payload, "Reply-To")
        .or_else(|| header_value(payload, "From"))
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MailError::SendFailed("Original message has no sender".to_string()))?;

    let from_mailbox: Mailbox = owner
        .trim()
        .parse()
        .map_err(|e| MailError::SendFailed(format!("Invalid owner address {:?}: {}", owner, e)))?;
    let to_mailbox: Mailbox = to
        .trim()
        .parse()
        .map_err(|e| MailError::SendFailed(format!("Invalid reply address {:?}: {}", to, e)))?;
    let subject = reply_subject(header_value(payload, "Subject").unwrap_or_default());

    let mut builder = lettre::Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(subject);

    match thread_message_id(payload) {
        Some(message_id) => {
            let references = header_value(payload, "References")
                .unwrap_or_default()
                .split_whitespace()
                .chain(std::iter::once(message_id.as_str()))
                .collect::<Vec<_>>()
                .join(" ");
            builder = builder.in_reply_to(message_id).references(references);
        }
        None => debug!("Original has no usable Message-ID, sending without threading headers"),
    }

    let email = builder
        .header(ContentType::TEXT_PLAIN)
        .body(text.to_string())
        .map_err(|e| MailError::SendFailed(format!("Failed to build reply: {}", e)))?;

    Ok(email.formatted())
}
