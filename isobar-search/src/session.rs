//! Session-level forecast base date and the availability search.
//!
//! A [`DateSession`] owns the active workspace and base date that every
//! dashboard consumer keys on. [`DateSession::shift_forecast_base_date`]
//! walks forward or backward in fixed steps until it finds a base date
//! whose run exists and has usable content.

use std::sync::{Mutex, MutexGuard, PoisonError};

use isobar_core::{ForecastDate, SearchConfig, DEFAULT_SEARCH_ATTEMPTS};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::probe::{ForecastProbe, SummaryBaseline};

/// Search progress. Only one variant holds at a time, so a session can
/// never be searching and failed at once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchState {
    #[default]
    Idle,
    Searching,
    /// Last search committed this date.
    Found(String),
    /// Last search ran out of attempts. Sticky until cleared or a later
    /// search commits.
    Exhausted,
}

/// What consumers key their requests on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DateContext {
    pub workspace: Option<String>,
    pub active_date: Option<String>,
    /// Bumped on every change of date or workspace.
    pub reset_epoch: u64,
}

/// A committed search step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCandidate {
    /// 1-indexed step at which the date was found.
    pub attempt: u32,
    pub date: ForecastDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Committed(SearchCandidate),
    Exhausted,
    /// Date or workspace changed underneath the search.
    Superseded,
    AlreadySearching,
    /// No workspace, no active date, or an active date in an unknown layout.
    MissingContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    pub max_attempts: u32,
    pub baseline: SummaryBaseline,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_SEARCH_ATTEMPTS,
            baseline: SummaryBaseline::default(),
        }
    }
}

impl From<&SearchConfig> for SearchSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            baseline: SummaryBaseline::from(config),
        }
    }
}

struct SessionInner {
    workspace: Option<String>,
    active_date: Option<String>,
    base_date_value: Option<f64>,
    reset_epoch: u64,
    state: SearchState,
    /// Generation token of the latest search; bumped by every search start
    /// and every external date or workspace change.
    token: u64,
}

impl SessionInner {
    fn context(&self) -> DateContext {
        DateContext {
            workspace: self.workspace.clone(),
            active_date: self.active_date.clone(),
            reset_epoch: self.reset_epoch,
        }
    }

    /// Invalidate derived state after the date or workspace moved.
    fn reset_derived(&mut self) {
        self.base_date_value = None;
        self.reset_epoch += 1;
    }
}

pub struct DateSession<P> {
    probe: P,
    settings: SearchSettings,
    inner: Mutex<SessionInner>,
    context: watch::Sender<DateContext>,
}

impl<P: ForecastProbe> DateSession<P> {
    pub fn new(probe: P, settings: SearchSettings) -> Self {
        let (context, _) = watch::channel(DateContext::default());
        Self {
            probe,
            settings,
            inner: Mutex::new(SessionInner {
                workspace: None,
                active_date: None,
                base_date_value: None,
                reset_epoch: 0,
                state: SearchState::Idle,
                token: 0,
            }),
            context,
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn state(&self) -> SearchState {
        self.lock().state.clone()
    }

    pub fn searching(&self) -> bool {
        matches!(self.lock().state, SearchState::Searching)
    }

    pub fn failed(&self) -> bool {
        matches!(self.lock().state, SearchState::Exhausted)
    }

    pub fn context(&self) -> DateContext {
        self.lock().context()
    }

    pub fn active_date(&self) -> Option<String> {
        self.lock().active_date.clone()
    }

    pub fn workspace(&self) -> Option<String> {
        self.lock().workspace.clone()
    }

    pub fn reset_epoch(&self) -> u64 {
        self.lock().reset_epoch
    }

    pub fn base_date_value(&self) -> Option<f64> {
        self.lock().base_date_value
    }

    /// Value picked at the active base date; cleared whenever it moves.
    pub fn set_base_date_value(&self, value: Option<f64>) {
        self.lock().base_date_value = value;
    }

    /// Receive a new [`DateContext`] after every date or workspace change.
    pub fn subscribe(&self) -> watch::Receiver<DateContext> {
        self.context.subscribe()
    }

    /// Dismiss a failed search without searching again.
    pub fn clear_failed(&self) {
        let mut inner = self.lock();
        if inner.state == SearchState::Exhausted {
            inner.state = SearchState::Idle;
        }
    }

    /// Manual date pick. Supersedes any running search.
    pub fn select_date(&self, date: impl Into<String>) {
        let mut inner = self.lock();
        inner.active_date = Some(date.into());
        self.supersede(&mut inner);
    }

    /// Move to another workspace, optionally with its starting date.
    /// Supersedes any running search.
    pub fn switch_workspace(&self, workspace: impl Into<String>, active_date: Option<String>) {
        let mut inner = self.lock();
        inner.workspace = Some(workspace.into());
        inner.active_date = active_date;
        self.supersede(&mut inner);
    }

    /// Step the base date by `hours` until a date with usable content
    /// turns up, trying at most `max_attempts` steps.
    ///
    /// Probe failures count as an unusable step. A search superseded by a
    /// date or workspace change stops without touching state. Dropping the
    /// returned future before it completes releases the search lock.
    pub async fn shift_forecast_base_date(&self, hours: i64) -> SearchOutcome {
        let (guard, workspace, start) = match self.begin_search() {
            Ok(started) => started,
            Err(outcome) => return outcome,
        };
        let token = guard.token;
        let baseline = &self.settings.baseline;

        for attempt in 1..=self.settings.max_attempts {
            let candidate = match start.shifted(hours.saturating_mul(i64::from(attempt))) {
                Ok(candidate) => candidate,
                Err(err) => {
                    warn!(attempt, error = %err, "Search candidate out of range");
                    continue;
                }
            };

            let available = match self.probe.availability(&workspace, candidate.raw()).await {
                Ok(availability) => availability.available,
                Err(err) => {
                    warn!(
                        workspace = %workspace,
                        date = candidate.raw(),
                        attempt,
                        error = %err,
                        "Availability probe failed"
                    );
                    false
                }
            };
            if !self.is_current(token) {
                debug!(attempt, "Search superseded");
                return SearchOutcome::Superseded;
            }
            if !available {
                debug!(date = candidate.raw(), attempt, "No run at candidate");
                continue;
            }

            let usable = match self.probe.summary(&workspace, candidate.raw(), baseline).await {
                Ok(summary) => summary.is_usable(),
                Err(err) => {
                    warn!(
                        workspace = %workspace,
                        date = candidate.raw(),
                        attempt,
                        error = %err,
                        "Summary probe failed"
                    );
                    false
                }
            };
            if usable {
                let outcome = self.commit(token, SearchCandidate { attempt, date: candidate });
                guard.disarm();
                return outcome;
            }
            if !self.is_current(token) {
                debug!(attempt, "Search superseded");
                return SearchOutcome::Superseded;
            }
            debug!(date = candidate.raw(), attempt, "Run has no usable series");
        }

        let mut inner = self.lock();
        if inner.token != token {
            return SearchOutcome::Superseded;
        }
        inner.state = SearchState::Exhausted;
        drop(inner);
        guard.disarm();
        info!(
            workspace = %workspace,
            start = start.raw(),
            hours,
            attempts = self.settings.max_attempts,
            "No usable forecast base date found"
        );
        SearchOutcome::Exhausted
    }

    fn begin_search(&self) -> Result<(SearchGuard<'_>, String, ForecastDate), SearchOutcome> {
        let mut inner = self.lock();
        if inner.state == SearchState::Searching {
            debug!("Search already running");
            return Err(SearchOutcome::AlreadySearching);
        }
        let (Some(workspace), Some(active_date)) = (&inner.workspace, &inner.active_date) else {
            debug!("Search needs a workspace and an active date");
            return Err(SearchOutcome::MissingContext);
        };
        let start = match ForecastDate::parse(active_date) {
            Ok(start) => start,
            Err(err) => {
                warn!(active_date = %active_date, error = %err, "Cannot search from active date");
                return Err(SearchOutcome::MissingContext);
            }
        };
        let workspace = workspace.clone();

        inner.token += 1;
        inner.state = SearchState::Searching;
        let guard = SearchGuard {
            inner: &self.inner,
            token: inner.token,
            armed: true,
        };
        Ok((guard, workspace, start))
    }

    fn commit(&self, token: u64, candidate: SearchCandidate) -> SearchOutcome {
        let mut inner = self.lock();
        if inner.token != token {
            debug!(date = candidate.date.raw(), "Search superseded before commit");
            return SearchOutcome::Superseded;
        }
        let date = candidate.date.raw().to_string();
        inner.active_date = Some(date.clone());
        inner.reset_derived();
        inner.state = SearchState::Found(date);
        self.context.send_replace(inner.context());
        info!(
            date = candidate.date.raw(),
            attempt = candidate.attempt,
            "Forecast base date committed"
        );
        SearchOutcome::Committed(candidate)
    }

    fn supersede(&self, inner: &mut SessionInner) {
        inner.token += 1;
        inner.reset_derived();
        if inner.state == SearchState::Searching {
            inner.state = SearchState::Idle;
        }
        self.context.send_replace(inner.context());
    }

    fn is_current(&self, token: u64) -> bool {
        self.lock().token == token
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        lock(&self.inner)
    }
}

fn lock(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held for the life of one search. If the search future is dropped
/// mid-flight, puts a still-current `Searching` state back to `Idle`.
struct SearchGuard<'a> {
    inner: &'a Mutex<SessionInner>,
    token: u64,
    armed: bool,
}

impl SearchGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SearchGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = lock(self.inner);
        if inner.token == self.token && inner.state == SearchState::Searching {
            trace!(token = self.token, "Search dropped before completion");
            inner.state = SearchState::Idle;
        }
    }
}
