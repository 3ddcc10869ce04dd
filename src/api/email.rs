//! Email outbox worker and delivery abstractions.
//!
//! Auth flows never send mail inline: they enqueue rows in `email_outbox`
//! inside the same transaction as the state change that requires delivery.
//! A background task polls that table, locks a batch with
//! `FOR UPDATE SKIP LOCKED`, and hands each row to an `EmailSender`. Failed
//! rows retry with capped exponential backoff and jitter until a max attempt
//! threshold, then are marked `failed` and logged. A slow or broken mail
//! path therefore never delays or fails a login or registration attempt.
//!
//! The default sender for local dev is `LogEmailSender`, which logs the
//! payload and returns `Ok(())`.

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Email delivery abstraction used by the outbox worker.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email outbox send stub"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Default worker config: 5s poll interval, 10 messages per batch,
    /// 5 max attempts, and 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn with_backoff_base_seconds(mut self, seconds: u64) -> Self {
        self.backoff_base = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_backoff_max_seconds(mut self, seconds: u64) -> Self {
        self.backoff_max = Duration::from_secs(seconds);
        self
    }

    /// Clamp zero or inverted values to workable minimums.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.poll_interval.is_zero() {
            self.poll_interval = Duration::from_secs(1);
        }
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        self.max_attempts = self.max_attempts.max(1);
        if self.backoff_base.is_zero() {
            self.backoff_base = Duration::from_secs(1);
        }
        if self.backoff_max < self.backoff_base {
            self.backoff_max = self.backoff_base;
        }
        self
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();

        loop {
            if let Err(err) = process_outbox_batch(&pool, sender.as_ref(), &config).await {
                error!("email outbox batch failed: {err}");
            }

            sleep(config.poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    // Lock a batch so multiple workers can run without double-sending.
    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size).unwrap_or(0))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let attempt = u32::try_from(attempts).unwrap_or(0).saturating_add(1);
        let message = EmailMessage {
            to_email: row.get("to_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        match sender.send(&message) {
            Ok(()) => mark_sent(&mut tx, id, attempt).await?,
            Err(err) => {
                if attempt >= config.max_attempts {
                    error!(outbox_id = %id, "email delivery gave up: {err}");
                    mark_failed(&mut tx, id, attempt, &err.to_string()).await?;
                } else {
                    let delay = backoff_delay(attempt, config.backoff_base, config.backoff_max);
                    schedule_retry(&mut tx, id, attempt, &err.to_string(), delay).await?;
                }
            }
        }
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn mark_sent(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempt: u32,
) -> Result<()> {
    let query = r"
        UPDATE email_outbox
        SET status = 'sent',
            attempts = $2,
            last_error = NULL,
            sent_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(i32::try_from(attempt).unwrap_or(i32::MAX))
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update outbox status to sent")?;
    Ok(())
}

async fn mark_failed(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempt: u32,
    last_error: &str,
) -> Result<()> {
    let query = r"
        UPDATE email_outbox
        SET status = 'failed',
            attempts = $2,
            last_error = $3
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(i32::try_from(attempt).unwrap_or(i32::MAX))
        .bind(last_error)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update outbox status to failed")?;
    Ok(())
}

async fn schedule_retry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempt: u32,
    last_error: &str,
    delay: Duration,
) -> Result<()> {
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    let query = r"
        UPDATE email_outbox
        SET status = 'pending',
            attempts = $2,
            last_error = $3,
            next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(i32::try_from(attempt).unwrap_or(i32::MAX))
        .bind(last_error)
        .bind(delay_ms)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update outbox retry schedule")?;
    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max).min(max);
    jitter_delay(delay)
}

/// Spread retries over [delay/2, delay] to avoid thundering herds.
fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::{EmailMessage, EmailSender, EmailWorkerConfig, LogEmailSender, backoff_delay};
    use std::time::Duration;

    #[test]
    fn normalize_clamps_zeroes() {
        let config = EmailWorkerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .with_backoff_base_seconds(0)
            .with_backoff_max_seconds(0)
            .normalize();

        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert!(config.backoff_max >= config.backoff_base);
    }

    #[test]
    fn backoff_delay_is_capped() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        for attempt in 1..=64 {
            let delay = backoff_delay(attempt, base, max);
            assert!(delay <= max);
            assert!(delay >= Duration::from_millis(2500));
        }
    }

    #[test]
    fn log_sender_accepts_message() {
        let sender = LogEmailSender;
        let message = EmailMessage {
            to_email: "a@x.com".to_string(),
            template: "verify_email".to_string(),
            payload_json: "{}".to_string(),
        };
        assert!(sender.send(&message).is_ok());
    }
}
