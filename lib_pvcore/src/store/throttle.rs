use std::time::Duration;

use super::actions::{Action, ValueChanged};

/// Flush interval used when none is configured.
pub const DEFAULT_THROTTLE_PERIOD: Duration = Duration::from_millis(100);

/// Collects value updates between flushes so the registry applies them as
/// one batch instead of once per update.
///
/// The throttle owns no timer. [`queue_update`](Self::queue_update) reports
/// when a timer must be started; the owner then calls
/// [`take_batch`](Self::take_batch) every [`period`](Self::period).
#[derive(Debug)]
pub struct UpdateThrottle {
    queue: Vec<ValueChanged>,
    update_period: Duration,
    started: bool,
}

impl UpdateThrottle {
    pub fn new(update_period: Duration) -> Self {
        Self {
            queue: Vec::new(),
            update_period,
            started: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.update_period
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queues an update. Returns `true` exactly once, for the first update,
    /// when the flush timer has to be started.
    pub fn queue_update(&mut self, update: ValueChanged) -> bool {
        self.queue.push(update);
        !std::mem::replace(&mut self.started, true)
    }

    /// Everything queued since the last flush, or `None` if nothing was.
    pub fn take_batch(&mut self) -> Option<Action> {
        if self.queue.is_empty() {
            return None;
        }
        Some(Action::ValuesChanged(std::mem::take(&mut self.queue)))
    }
}

impl Default for UpdateThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtypes::DType;

    fn update(pv: &str, v: f64) -> ValueChanged {
        ValueChanged {
            pv_name: pv.to_string(),
            value: DType::from_double(v),
        }
    }

    #[test]
    fn timer_requested_once() {
        let mut throttle = UpdateThrottle::default();
        assert!(throttle.queue_update(update("A", 1.0)));
        assert!(!throttle.queue_update(update("A", 2.0)));
        assert!(throttle.take_batch().is_some());
        assert!(!throttle.queue_update(update("A", 3.0)));
    }

    #[test]
    fn batches_keep_arrival_order() {
        let mut throttle = UpdateThrottle::new(Duration::from_millis(10));
        throttle.queue_update(update("A", 1.0));
        throttle.queue_update(update("B", 5.0));
        throttle.queue_update(update("A", 2.0));
        assert_eq!(throttle.pending(), 3);

        assert_eq!(
            throttle.take_batch(),
            Some(Action::ValuesChanged(vec![
                update("A", 1.0),
                update("B", 5.0),
                update("A", 2.0)
            ]))
        );
        assert_eq!(throttle.take_batch(), None);
    }
}
