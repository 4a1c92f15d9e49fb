//! A single unit of work (one stack) and the polling loop that drives it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::events::{EventEmitter, RuntimeEvent};
use super::status::Status;
use crate::dag::Walker;

/// The function that moves a step forward.
///
/// Called repeatedly with the step's current status until it returns a
/// terminal one. Each call should do at most one remote check or action and
/// return promptly; returning the same in-flight status means "still
/// waiting". Errors become `Failed` with the error message as reason.
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn advance(&self, status: &Status) -> anyhow::Result<Status>;
}

/// Adapts a plain closure into a [`StepAction`].
pub struct FnAction<F> {
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(&Status) -> anyhow::Result<Status> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> StepAction for FnAction<F>
where
    F: Fn(&Status) -> anyhow::Result<Status> + Send + Sync,
{
    async fn advance(&self, status: &Status) -> anyhow::Result<Status> {
        (self.func)(status)
    }
}

/// How long to wait between polls of an in-flight step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    /// Add up to 10% random jitter so parallel steps do not poll in lockstep.
    pub jitter: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            multiplier: 1.5,
            jitter: true,
        }
    }
}

impl PollPolicy {
    /// Constant interval, no backoff, no jitter.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay before poll number `attempt` (the first poll, attempt 0, is
    /// immediate).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.interval.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = if secs.is_finite() && secs < self.max_interval.as_secs_f64() {
            Duration::from_secs_f64(secs).min(self.max_interval)
        } else {
            self.max_interval
        };
        if self.jitter {
            capped.mul_f64(1.0 + fastrand::f64() * 0.1)
        } else {
            capped
        }
    }
}

#[derive(Debug, Clone)]
struct StepState {
    status: Status,
    last_updated: DateTime<Utc>,
}

/// Point-in-time copy of a step's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub name: String,
    pub status: Status,
    pub last_updated: DateTime<Utc>,
}

/// State-machine wrapper around one unit of work.
pub struct Step {
    name: String,
    short_name: String,
    requires: Vec<String>,
    action: Arc<dyn StepAction>,
    state: RwLock<StepState>,
    emitter: RwLock<Option<Arc<EventEmitter>>>,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("status", &self.status())
            .finish()
    }
}

impl Step {
    /// `name` is the step's unique identity in the graph (a stack's fully
    /// qualified name).
    pub fn new<S: Into<String>>(name: S, action: Arc<dyn StepAction>) -> Self {
        let name = name.into();
        Self {
            short_name: name.clone(),
            name,
            requires: Vec::new(),
            action,
            state: RwLock::new(StepState {
                status: Status::Pending,
                last_updated: Utc::now(),
            }),
            emitter: RwLock::new(None),
        }
    }

    pub fn from_fn<S, F>(name: S, func: F) -> Self
    where
        S: Into<String>,
        F: Fn(&Status) -> anyhow::Result<Status> + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(FnAction::new(func)))
    }

    /// The name used for targeting (a stack's name without namespace).
    pub fn with_short_name<S: Into<String>>(mut self, short_name: S) -> Self {
        self.short_name = short_name.into();
        self
    }

    /// Identities of the steps this one depends on.
    pub fn with_requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = requires.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    pub fn status(&self) -> Status {
        self.state.read().status.clone()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.state.read().last_updated
    }

    pub fn snapshot(&self) -> StepSnapshot {
        let state = self.state.read();
        StepSnapshot {
            name: self.name.clone(),
            status: state.status.clone(),
            last_updated: state.last_updated,
        }
    }

    pub fn submitted(&self) -> bool {
        !self.status().is_pending()
    }

    pub fn completed(&self) -> bool {
        self.status().is_complete()
    }

    pub fn skipped(&self) -> bool {
        self.status().is_skipped()
    }

    pub fn failed(&self) -> bool {
        self.status().is_failed()
    }

    pub fn done(&self) -> bool {
        self.status().is_done()
    }

    pub fn ok(&self) -> bool {
        self.status().is_ok()
    }

    pub(crate) fn attach_emitter(&self, emitter: Arc<EventEmitter>) {
        *self.emitter.write() = Some(emitter);
    }

    /// Record a new status. Setting the current status again is a no-op and
    /// does not notify observers.
    pub fn set_status(&self, status: Status) {
        let last_updated = {
            let mut state = self.state.write();
            if state.status == status {
                return;
            }
            state.status = status.clone();
            state.last_updated = Utc::now();
            state.last_updated
        };

        debug!(step = %self.name, status = %status, "status changed");
        if let Some(emitter) = self.emitter.read().as_ref() {
            emitter.emit(RuntimeEvent::StepStatusChanged {
                step: self.name.clone(),
                status,
                last_updated,
            });
        }
    }

    /// Advance once and record the result.
    pub async fn run_once(&self) -> Status {
        let current = self.status();
        let next = match AssertUnwindSafe(self.action.advance(&current))
            .catch_unwind()
            .await
        {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                error!(step = %self.name, error = %e, "step action failed");
                Status::failed(e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(step = %self.name, panic = %message, "step action panicked");
                Status::failed(message)
            }
        };
        self.set_status(next.clone());
        next
    }

    /// Poll until the step is done or `cancel` fires. Returns [`Step::ok`].
    ///
    /// Each advance call holds a slot from `walker`, so bounded walkers cap
    /// how many steps are talking to the provider at once; the sleep between
    /// polls holds nothing.
    pub async fn run(&self, walker: &Walker, cancel: &CancellationToken, poll: &PollPolicy) -> bool {
        let mut attempt: u32 = 0;
        while !self.done() {
            if cancel.is_cancelled() {
                self.interrupt();
                break;
            }

            let delay = poll.delay_for(attempt);
            if delay.is_zero() {
                // A zero interval must still let the runtime run timers and
                // the task that fires `cancel`.
                tokio::task::yield_now().await;
                if cancel.is_cancelled() {
                    self.interrupt();
                    break;
                }
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.interrupt();
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let slot = tokio::select! {
                _ = cancel.cancelled() => {
                    self.interrupt();
                    break;
                }
                slot = walker.acquire() => slot,
            };
            self.run_once().await;
            drop(slot);

            attempt = attempt.saturating_add(1);
        }

        if self.ok() {
            info!(step = %self.name, status = %self.status(), "step finished");
        }
        self.ok()
    }

    fn interrupt(&self) {
        info!(step = %self.name, "cancellation requested; stopping step");
        self.set_status(Status::cancelled("interrupted"));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "step action panicked".to_string()
    }
}
