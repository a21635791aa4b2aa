use crate::api::{self, ForecastDataset, ForecastPayload};
use crate::restore::CounterStore;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;

/// Failure raised to the scheduler. The API answering with a non-zero status
/// is not an error at this level; see [`PollOutcome::ApiRejected`].
#[derive(Debug, Error)]
pub enum PollError {
    #[error("forecast request failed: {0}")]
    Transport(String),
    #[error("forecast response was not valid JSON: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Updated { accepted: usize, rejected: usize },
    ApiRejected { status: i64 },
}

/// Consistent point-in-time view handed to readers. The dataset is shared by
/// reference and only ever swapped wholesale at poll commit, so holders of a
/// snapshot never observe a partially written map.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub dataset: Arc<ForecastDataset>,
    pub api_status: Option<i64>,
    pub api_message: String,
    pub next_api_request_at: Option<DateTime<Tz>>,
    pub last_api_success_at: Option<DateTime<Tz>>,
    pub api_calls_today: u64,
    pub last_reset_day: NaiveDate,
}

#[derive(Debug)]
struct Inner {
    dataset: Arc<ForecastDataset>,
    api_status: Option<i64>,
    api_message: String,
    next_api_request_at: Option<DateTime<Tz>>,
    last_api_success_at: Option<DateTime<Tz>>,
    api_calls_today: u64,
    last_reset_day: NaiveDate,
}

/// Owns the polling state machine: rate-limited fetches, response
/// validation, the daily call counter, and the last-known-good dataset.
pub struct Coordinator {
    http: reqwest::Client,
    api_url: String,
    request_timeout: Duration,
    tz: Tz,
    counter_store: Option<CounterStore>,
    gate: tokio::sync::Mutex<()>,
    inner: RwLock<Inner>,
}

impl Coordinator {
    pub fn new(
        http: reqwest::Client,
        api_url: String,
        request_timeout: Duration,
        tz: Tz,
        counter_store: Option<CounterStore>,
    ) -> Self {
        let today = Utc::now().with_timezone(&tz).date_naive();
        Self {
            http,
            api_url,
            request_timeout,
            tz,
            counter_store,
            gate: tokio::sync::Mutex::new(()),
            inner: RwLock::new(Inner {
                dataset: Arc::new(ForecastDataset::new()),
                api_status: None,
                api_message: String::new(),
                next_api_request_at: None,
                last_api_success_at: None,
                api_calls_today: 0,
                last_reset_day: today,
            }),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn local_now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.read();
        Snapshot {
            dataset: inner.dataset.clone(),
            api_status: inner.api_status,
            api_message: inner.api_message.clone(),
            next_api_request_at: inner.next_api_request_at,
            last_api_success_at: inner.last_api_success_at,
            api_calls_today: inner.api_calls_today,
            last_reset_day: inner.last_reset_day,
        }
    }

    /// One-time startup restore of the daily call counter from a previously
    /// persisted value. Anything but a plain non-negative integer is ignored.
    pub fn restore_call_count(&self, raw: &str) -> bool {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        match trimmed.parse::<u64>() {
            Ok(value) => {
                self.write().api_calls_today = value;
                true
            }
            Err(_) => false,
        }
    }

    /// One fetch-and-normalize cycle. Sequentialized through an internal
    /// gate; overlapping callers wait their turn.
    pub async fn poll(&self) -> Result<PollOutcome, PollError> {
        let _guard = self.gate.lock().await;
        let result = self.run_poll(self.local_now()).await;
        self.persist_call_count();
        result
    }

    /// Like [`poll`](Self::poll), but coalesces: returns `None` without
    /// fetching when another poll already holds the gate.
    pub async fn try_poll(&self) -> Option<Result<PollOutcome, PollError>> {
        let Ok(_guard) = self.gate.try_lock() else {
            return None;
        };
        let result = self.run_poll(self.local_now()).await;
        self.persist_call_count();
        Some(result)
    }

    async fn run_poll(&self, now: DateTime<Tz>) -> Result<PollOutcome, PollError> {
        // Runs before any network I/O so a date rollover still lands when
        // the fetch below fails.
        self.roll_daily_counter(now.date_naive());

        let response = self
            .http
            .get(&self.api_url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| PollError::Transport(err.to_string()))?;

        // Counts against the daily quota as soon as a response exists, even
        // when the body fails to decode below.
        self.write().api_calls_today += 1;

        let payload: ForecastPayload = response
            .json()
            .await
            .map_err(|err| PollError::Decode(err.to_string()))?;

        if payload.status != 0 {
            {
                let mut inner = self.write();
                inner.api_status = Some(payload.status);
                inner.api_message = payload.message.clone();
            }
            tracing::warn!(
                status = payload.status,
                message = %payload.message,
                "forecast API rejected the request, keeping previous dataset"
            );
            return Ok(PollOutcome::ApiRejected {
                status: payload.status,
            });
        }

        let next_request = payload
            .preferred_next_api_request_at
            .as_ref()
            .and_then(|hint| hint.epoch_time_utc)
            .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
            .map(|utc| utc.with_timezone(&self.tz));

        let normalized = api::normalize(&payload.data);
        if normalized.rejected > 0 {
            tracing::debug!(
                rejected = normalized.rejected,
                "dropped malformed forecast entries"
            );
        }
        let accepted = normalized.dataset.len();

        // Single critical section: readers see the old dataset with the old
        // scalars, or the new dataset with the new scalars, never a mix.
        {
            let mut inner = self.write();
            inner.api_status = Some(0);
            inner.api_message = payload.message;
            inner.last_api_success_at = Some(now);
            if next_request.is_some() {
                inner.next_api_request_at = next_request;
            }
            inner.dataset = Arc::new(normalized.dataset);
        }

        tracing::info!(
            accepted,
            rejected = normalized.rejected,
            "forecast dataset refreshed"
        );
        Ok(PollOutcome::Updated {
            accepted,
            rejected: normalized.rejected,
        })
    }

    /// Runs after every poll attempt, whichever trigger started it, so a
    /// restart never restores an older counter value than the one shown.
    fn persist_call_count(&self) {
        let Some(store) = &self.counter_store else {
            return;
        };
        let calls = self.read().api_calls_today;
        if let Err(err) = store.save(calls) {
            tracing::warn!(error = %err, "failed to persist api call counter");
        }
    }

    fn roll_daily_counter(&self, today: NaiveDate) {
        let mut inner = self.write();
        if today > inner.last_reset_day {
            inner.api_calls_today = 0;
            inner.last_reset_day = today;
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|err| err.into_inner())
    }
}
