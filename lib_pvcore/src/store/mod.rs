//! # Store
//!
//! The single writer of PV state. Every change, whether a widget request or a
//! transport event, is an [`Action`] that goes through the same pipeline:
//!
//! 1. [`ConnectionMiddleware`] performs transport side effects and fills in
//!    the effective PV name,
//! 2. [`UpdateThrottle`] diverts value updates into periodic batches,
//! 3. [`CsState::reduce`] applies the action.
//!
//! Transports never hold the store. They hold an [`ActionSender`] and the
//! store drains its inbox in order, so actions never interleave. Readers take
//! a [`StoreReader`], which shares the state behind a read/write lock and
//! exposes a revision counter that ticks once per applied action.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::dtypes::DType;
use crate::utils::{read, write};

pub mod actions;
pub mod middleware;
pub mod selectors;
pub mod state;
pub mod throttle;

pub use actions::{Action, ActionSender, ValueChanged};
pub use middleware::ConnectionMiddleware;
pub use selectors::{pv_state_comparator, PvArrayResults};
pub use state::{CsState, PvState};
pub use throttle::{UpdateThrottle, DEFAULT_THROTTLE_PERIOD};

pub struct Store {
    state: Arc<RwLock<CsState>>,
    middleware: ConnectionMiddleware,
    throttle: Option<UpdateThrottle>,
    timer_requested: bool,
    inbox: mpsc::UnboundedReceiver<Action>,
    sender: ActionSender,
    revision: watch::Sender<u64>,
}

impl Store {
    /// Builds a store around `connection` and connects it. With
    /// `throttle_period` set to `None` value updates are applied immediately.
    pub fn new(connection: Arc<dyn Connection>, throttle_period: Option<Duration>) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        let sender = ActionSender::new(tx);
        let middleware = ConnectionMiddleware::new(connection, Arc::new(sender.clone()));
        middleware.connect();
        let (revision, _) = watch::channel(0);

        Self {
            state: Arc::new(RwLock::new(CsState::default())),
            middleware,
            throttle: throttle_period.map(UpdateThrottle::new),
            timer_requested: false,
            inbox,
            sender,
            revision,
        }
    }

    pub fn sender(&self) -> ActionSender {
        self.sender.clone()
    }

    pub fn reader(&self) -> StoreReader {
        StoreReader {
            state: Arc::clone(&self.state),
            revision: self.revision.subscribe(),
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        self.middleware.connection()
    }

    /// Runs one action through middleware, throttle and reducer.
    pub fn dispatch(&mut self, action: Action) {
        let action = {
            let state = read(&self.state);
            self.middleware.handle(&state, action)
        };

        match action {
            Action::ValueChanged(update) if self.throttle.is_some() => {
                if let Some(throttle) = self.throttle.as_mut() {
                    self.timer_requested |= throttle.queue_update(update);
                }
            }
            action => self.apply(action),
        }
    }

    /// Dispatches every action already waiting in the inbox. Returns how many
    /// were processed.
    pub fn process_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(action) = self.inbox.try_recv() {
            self.dispatch(action);
            processed += 1;
        }
        processed
    }

    /// Applies the queued batch now. Returns `false` if nothing was queued.
    pub fn flush(&mut self) -> bool {
        match self.throttle.as_mut().and_then(UpdateThrottle::take_batch) {
            Some(batch) => {
                self.apply(batch);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, action: Action) {
        log::trace!("Applying {action:?}");
        write(&self.state).reduce(action);
        self.revision.send_modify(|r| *r += 1);
    }

    fn flush_timer(&self) -> Option<Interval> {
        let throttle = self.throttle.as_ref()?;
        let period = throttle.period();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(ticker)
    }

    /// Processes actions until `shutdown` fires. The flush timer starts with
    /// the first throttled update and then runs for the life of the loop.
    /// Pending actions and batches are applied before returning.
    pub async fn run(mut self, shutdown: CancellationToken) -> Self {
        let mut ticker: Option<Interval> = None;
        loop {
            if self.timer_requested && ticker.is_none() {
                ticker = self.flush_timer();
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,

                Some(action) = self.inbox.recv() => self.dispatch(action),

                _ = async {
                    match ticker.as_mut() {
                        Some(t) => {
                            t.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.flush();
                }
            }
        }
        self.process_pending();
        self.flush();
        log::debug!("Store loop stopped");
        self
    }
}

/// Shared read access to the store's state.
#[derive(Clone)]
pub struct StoreReader {
    state: Arc<RwLock<CsState>>,
    revision: watch::Receiver<u64>,
}

impl StoreReader {
    pub fn with_state<R>(&self, f: impl FnOnce(&CsState) -> R) -> R {
        f(&read(&self.state))
    }

    pub fn snapshot(&self) -> CsState {
        self.with_state(CsState::clone)
    }

    pub fn select_pv_state(&self, pv_name: &str) -> (Option<PvState>, String) {
        self.with_state(|s| selectors::select_pv_state(s, pv_name))
    }

    pub fn select_pv_states<S: AsRef<str>>(&self, pv_names: &[S]) -> PvArrayResults {
        self.with_state(|s| selectors::select_pv_states(s, pv_names))
    }

    pub fn select_device(&self, device: &str) -> Option<DType> {
        self.with_state(|s| selectors::select_device(s, device))
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Waits until at least one more action has been applied. Returns `false`
    /// once the store is dropped.
    pub async fn changed(&mut self) -> bool {
        self.revision.changed().await.is_ok()
    }
}
