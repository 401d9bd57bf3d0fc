//! Fixed-offset acknowledgement schedule.

use std::collections::VecDeque;
use std::ops::AddAssign;

/// Amounts due at future step offsets.
///
/// Each step schedules first and then calls [`DelayLine::advance`] once. An
/// amount scheduled at offset `n` comes out `n` steps after the step that
/// scheduled it, i.e. from the `n + 1`-th advance.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayLine<T> {
    slots: VecDeque<T>,
}

impl<T> DelayLine<T>
where
    T: Copy + Default + AddAssign,
{
    /// Creates an empty line with room for offsets up to `horizon` steps.
    pub fn with_horizon(horizon: usize) -> Self {
        let len = horizon.max(1) + 1;
        let mut slots = VecDeque::with_capacity(len);
        slots.resize(len, T::default());
        Self { slots }
    }

    /// Adds `amount` to the slot released `offset` steps from now.
    ///
    /// The line grows when `offset` is beyond the current horizon.
    pub fn schedule(&mut self, offset: usize, amount: T) {
        if offset >= self.slots.len() {
            self.slots.resize(offset + 1, T::default());
        }
        self.slots[offset] += amount;
    }

    /// Releases the amount due this step and shifts the schedule by one.
    pub fn advance(&mut self) -> T {
        let due = self.slots.pop_front().unwrap_or_default();
        self.slots.push_back(T::default());
        due
    }

    /// Sum of everything scheduled but not yet released.
    pub fn pending(&self) -> T {
        let mut total = T::default();
        for amount in &self.slots {
            total += *amount;
        }
        total
    }

    /// Number of offsets currently held without growing.
    pub fn horizon(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_after_offset_steps() {
        let mut line = DelayLine::<u64>::with_horizon(4);
        line.schedule(3, 5);

        // Same step, then three more
        assert_eq!(line.advance(), 0);
        assert_eq!(line.advance(), 0);
        assert_eq!(line.advance(), 0);
        assert_eq!(line.advance(), 5);
        assert_eq!(line.advance(), 0);
    }

    #[test]
    fn test_offset_one_released_next_step() {
        let mut line = DelayLine::<u64>::with_horizon(2);
        line.schedule(1, 3);
        assert_eq!(line.advance(), 0);
        assert_eq!(line.advance(), 3);
    }

    #[test]
    fn test_grows_beyond_horizon() {
        let mut line = DelayLine::<f64>::with_horizon(1);
        line.schedule(10, 1.5);
        assert!(line.horizon() > 10);
        assert_eq!(line.pending(), 1.5);

        let released: f64 = (0..11).map(|_| line.advance()).sum();
        assert_eq!(released, 1.5);
        assert_eq!(line.pending(), 0.0);
    }

    #[test]
    fn test_pending_tracks_scheduled_minus_released() {
        let mut line = DelayLine::<u64>::with_horizon(8);
        line.schedule(0, 4);
        line.schedule(2, 6);
        line.schedule(5, 1);
        assert_eq!(line.pending(), 11);

        let acked = line.advance();
        assert_eq!(acked, 4);
        assert_eq!(line.pending(), 7);
    }
}
