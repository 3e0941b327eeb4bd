//! The search session: a sequential page-fetch loop with cooperative
//! cancellation.
//!
//! A [`SearchSession`] owns its state; callers interact through
//! [`SearchSession::start`], a cloneable [`StopHandle`], status snapshots and
//! a stream of [`SessionEvent`]s for whatever renders the results.
//!
//! # Loop
//!
//! ```text
//! Idle ──start──▶ Running ──┬── stop ───────────────▶ Stopped
//!                  ▲   │    ├── last page ───────────▶ Completed
//!                  └───┘    └── fetch error ─────────▶ Failed
//!              next cursor
//! ```
//!
//! Exactly one fetch is outstanding at a time. The only suspension points are
//! the fetch itself and the inter-page delay. The cancellation flag is checked
//! before every fetch and after every delay; a fetch already in flight is
//! allowed to finish and its matches are still recorded.

use secrecy::SecretString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

use super::policy::filter_items;
use super::types::{DateRange, FilterMode, Item, Page, Query, SessionError};
use crate::fetch::{FetchError, Fetcher, PageRequest};

/// Pause between successive page fetches.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// Public Types
// ============================================================================

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Stopped,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_running(self) -> bool {
        matches!(self, SessionState::Running)
    }

    /// Whether query input and mode selection should be enabled.
    pub fn controls_enabled(self) -> bool {
        !self.is_running()
    }
}

/// Snapshot of a session's progress.
///
/// Terminal states keep the last count and message until the next start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub total_matches: usize,
    pub pages_scanned: u32,
    pub message: String,
}

/// Parameters for one search.
#[derive(Debug)]
pub struct SearchRequest {
    /// Raw query text; trimmed and validated by [`SearchSession::start`]
    pub query: String,
    pub mode: FilterMode,
    pub date_range: DateRange,
    /// User-supplied API key. `None` routes requests through the proxy.
    pub credential: Option<SecretString>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: FilterMode) -> Self {
        Self {
            query: query.into(),
            mode,
            date_range: DateRange::default(),
            credential: None,
        }
    }

    pub fn with_date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }

    pub fn with_credential(mut self, credential: Option<SecretString>) -> Self {
        self.credential = credential;
        self
    }
}

/// Progress notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Started {
        query: String,
        mode: FilterMode,
    },
    /// About to request `page` (1-based).
    PageRequested {
        page: u32,
        total_matches: usize,
    },
    /// A page came back; `matches` are the items that passed the filter, in
    /// page order.
    PageScanned {
        page: u32,
        scanned: usize,
        matches: Vec<Item>,
        total_matches: usize,
    },
    /// The session entered `Stopped`, `Completed` or `Failed`.
    Finished {
        state: SessionState,
        total_matches: usize,
        message: String,
    },
}

// ============================================================================
// Shared State
// ============================================================================

/// State reachable from both the running loop and any [`StopHandle`].
#[derive(Default)]
struct Shared {
    cancelled: AtomicBool,
    /// Set when `stop_with` replaced the summary message
    custom_stop_message: AtomicBool,
    wake: Notify,
    status: Mutex<SessionStatus>,
    events: Mutex<Option<mpsc::UnboundedSender<SessionEvent>>>,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, SessionStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn emit(&self, event: SessionEvent) {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = events.as_ref() {
            if tx.send(event).is_err() {
                tracing::trace!("Session event receiver dropped");
            }
        }
    }

    /// Running → Stopped. Returns false if nothing was running.
    fn stop(&self, message: Option<String>) -> bool {
        let event = {
            let mut status = self.status();
            if !status.state.is_running() {
                return false;
            }
            self.cancelled.store(true, Ordering::Release);
            self.custom_stop_message
                .store(message.is_some(), Ordering::Release);
            status.state = SessionState::Stopped;
            status.message = message.unwrap_or_else(|| stopped_message(status.total_matches));
            tracing::info!(
                total_matches = status.total_matches,
                pages = status.pages_scanned,
                "Search stopped"
            );
            finished_event(&status)
        };

        // Cut a pending inter-page delay short
        self.wake.notify_waiters();
        self.emit(event);
        true
    }

    fn finish(&self, state: SessionState, message: impl FnOnce(usize) -> String) {
        let event = {
            let mut status = self.status();
            status.state = state;
            status.message = message(status.total_matches);
            finished_event(&status)
        };
        self.emit(event);
    }
}

fn finished_event(status: &SessionStatus) -> SessionEvent {
    SessionEvent::Finished {
        state: status.state,
        total_matches: status.total_matches,
        message: status.message.clone(),
    }
}

fn stopped_message(total: usize) -> String {
    if total == 0 {
        "Search stopped. No matches found.".to_string()
    } else {
        format!("Search stopped. Found {} total match(es).", total)
    }
}

fn completed_message(total: usize) -> String {
    format!(
        "Search complete: reached the end of results. Found {} match(es).",
        total
    )
}

// ============================================================================
// StopHandle
// ============================================================================

/// Cancels the running search from another task (e.g. a Ctrl-C listener).
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Stops the running search. Returns false if no search was running.
    pub fn stop(&self) -> bool {
        self.shared.stop(None)
    }

    /// Stops with a custom status message in place of the match summary.
    pub fn stop_with(&self, message: impl Into<String>) -> bool {
        self.shared.stop(Some(message.into()))
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status().clone()
    }
}

// ============================================================================
// SearchSession
// ============================================================================

/// Drives paginated fetches and filters each page's titles.
///
/// `start` takes `&mut self`, so two loops can never interleave on one
/// session. Use a [`StopHandle`] to cancel while `start` is pending.
pub struct SearchSession<F> {
    fetcher: F,
    page_delay: Duration,
    shared: Arc<Shared>,
}

impl<F: Fetcher> SearchSession<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            page_delay: DEFAULT_PAGE_DELAY,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Returns a receiver for session events, replacing any earlier one.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.events.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    /// Drops the event sender so the subscriber's stream ends.
    pub fn close_events(&self) {
        self.shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Stops the running search. Returns false if no search was running.
    pub fn stop(&self) -> bool {
        self.shared.stop(None)
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status().clone()
    }

    /// Runs one search to a terminal state and returns the final status.
    ///
    /// # Errors
    ///
    /// [`SessionError::EmptyQuery`] if the query is blank. The status
    /// message is updated but the state does not change and nothing is
    /// fetched.
    pub async fn start(&mut self, request: SearchRequest) -> Result<SessionStatus, SessionError> {
        let query = match Query::parse(&request.query) {
            Ok(query) => query,
            Err(e) => {
                self.shared.status().message = e.to_string();
                return Err(e);
            }
        };

        // A previous `start` future dropped mid-run leaves the state Running
        let abandoned = self.shared.status().state.is_running();
        if abandoned {
            tracing::debug!("Stopping abandoned search before restart");
            self.shared.stop(None);
        }

        self.shared.cancelled.store(false, Ordering::Release);
        self.shared
            .custom_stop_message
            .store(false, Ordering::Release);
        *self.shared.status() = SessionStatus {
            state: SessionState::Running,
            total_matches: 0,
            pages_scanned: 0,
            message: "Starting search...".to_string(),
        };

        tracing::info!(
            query = %query,
            mode = %request.mode,
            dated = !request.date_range.is_unbounded(),
            direct = request.credential.is_some(),
            "Search started"
        );
        self.shared.emit(SessionEvent::Started {
            query: query.as_str().to_string(),
            mode: request.mode,
        });

        self.run(
            &query,
            request.mode,
            &request.date_range,
            request.credential.as_ref(),
        )
        .await;

        Ok(self.status())
    }

    async fn run(
        &self,
        query: &Query,
        mode: FilterMode,
        date_range: &DateRange,
        credential: Option<&SecretString>,
    ) {
        let effective = query.effective(date_range);
        let mut cursor: Option<String> = None;
        let mut page: u32 = 1;

        loop {
            if self.shared.is_cancelled() {
                return;
            }

            let total = self.begin_page(page);
            self.shared.emit(SessionEvent::PageRequested {
                page,
                total_matches: total,
            });

            let request = PageRequest {
                query: &effective,
                cursor: cursor.as_deref(),
                credential,
                date_range,
            };
            let Page { items, next_cursor } = match self.fetcher.fetch_page(&request).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    self.fail(page, &e);
                    return;
                }
            };

            // Titles are matched against what the user typed, never the
            // date-qualified string sent upstream
            let scanned = items.len();
            let matches = filter_items(items, query.as_str(), mode);
            let total = self.record_page(page, matches.len());

            tracing::debug!(
                page = page,
                scanned = scanned,
                matched = matches.len(),
                total = total,
                has_next = next_cursor.is_some(),
                "Page scanned"
            );
            self.shared.emit(SessionEvent::PageScanned {
                page,
                scanned,
                matches,
                total_matches: total,
            });

            let Some(next) = next_cursor else {
                self.complete();
                return;
            };

            if scanned == 0 {
                tracing::debug!(page = page, "Empty page with continuation, moving on");
            }

            if !self.pause().await {
                return;
            }

            cursor = Some(next);
            page += 1;
        }
    }

    /// Marks `page` as requested and returns the running total.
    fn begin_page(&self, page: u32) -> usize {
        let mut status = self.shared.status();
        // A stop can land between the flag check and this lock
        if status.state.is_running() {
            status.message = format!(
                "Searching page {}... (found {} so far)",
                page, status.total_matches
            );
        }
        status.total_matches
    }

    /// Adds a page's matches to the running total and returns the new total.
    fn record_page(&self, page: u32, matched: usize) -> usize {
        let mut status = self.shared.status();
        status.total_matches += matched;
        status.pages_scanned = page;
        match status.state {
            SessionState::Running => {
                status.message = format!(
                    "Page {} scanned, {} found so far",
                    page, status.total_matches
                );
            }
            // A page that was in flight at stop still counts toward the summary
            SessionState::Stopped
                if !self.shared.custom_stop_message.load(Ordering::Acquire) =>
            {
                status.message = stopped_message(status.total_matches);
            }
            _ => {}
        }
        status.total_matches
    }

    fn complete(&self) {
        self.shared.finish(SessionState::Completed, |total| {
            tracing::info!(total_matches = total, "Search complete");
            completed_message(total)
        });
    }

    fn fail(&self, page: u32, error: &FetchError) {
        tracing::warn!(
            page = page,
            status = ?error.status(),
            error = %error,
            "Search failed"
        );
        self.shared.finish(SessionState::Failed, |_| {
            format!("Search failed: {}", error)
        });
    }

    /// Waits out the inter-page delay. Returns false if the session was
    /// cancelled before or during the wait.
    async fn pause(&self) -> bool {
        let wake = self.shared.wake.notified();
        tokio::pin!(wake);
        // Register before re-checking the flag so a concurrent stop can't slip between
        wake.as_mut().enable();

        if self.shared.is_cancelled() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.page_delay) => {}
            _ = &mut wake => {}
        }

        !self.shared.is_cancelled()
    }
}
