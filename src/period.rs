//! Conversion of a period in microseconds into counter cycles.

use crate::{Channel, ClockConfig, Error};

/// How a period maps onto the counter of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PeriodPlan {
    /// Counter increments that make up the period.
    pub total_counts: u32,
    /// Overflow (or compare match) events that cover the period.
    pub required_overflow_count: u32,
    /// Counter start value that shortens the first cycle.
    pub initial_counter_value: u16,
}

impl PeriodPlan {
    /// Plan a period of `period_us` on `channel` for the clock setup `C`.
    ///
    /// Integer division truncates, so periods that are not a whole number of
    /// counts come out slightly short. Nothing carries the lost fraction over
    /// to the next period.
    pub fn new<C: ClockConfig>(channel: Channel, period_us: u16) -> Result<Self, Error> {
        let mhz = C::cpu_mhz()?;
        let divisor = C::PRESCALER
            .divisor()
            .ok_or(Error::UnsupportedPrescaler)?;

        let total_counts = u32::from(period_us) * mhz / divisor;
        Ok(Self::from_counts(total_counts, channel.max_count()))
    }

    /// Split `total_counts` into cycles of `max_count`.
    pub fn from_counts(total_counts: u32, max_count: u16) -> Self {
        let max_count = u32::from(max_count);
        let mut required_overflow_count = total_counts / max_count;
        let remainder = total_counts % max_count;

        let initial_counter_value = if remainder != 0 {
            required_overflow_count += 1;
            (max_count - remainder) as u16
        } else {
            0
        };

        Self {
            total_counts,
            required_overflow_count,
            initial_counter_value,
        }
    }
}
