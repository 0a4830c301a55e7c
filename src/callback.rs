//! Event notifications shared between the driver and interrupt handlers.

use core::cell::Cell;

use critical_section::Mutex;

use crate::{
    Channel, Event, PeriodPlan,
    channel::{CHANNELS, EVENTS},
    regs::RegisterAccess,
    trace,
};

/// Notification invoked from interrupt context.
///
/// It takes no arguments, returns nothing and must not block: it runs with
/// interrupts disabled.
pub type Callback = fn();

/// Interrupt side view of a period requested with the interrupt technique.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Countdown {
    event: Event,
    required: u32,
    /// Counter value loaded at the start of each period, if any.
    reload: Option<u16>,
    elapsed: u32,
}

/// Callbacks per channel and event, plus the period countdowns the
/// interrupt handlers run.
///
/// Meant to live in a `static` so interrupt handlers can reach it.
pub struct CallbackRegistry {
    callbacks: [[Mutex<Cell<Option<Callback>>>; EVENTS]; CHANNELS],
    countdowns: [Mutex<Cell<Option<Countdown>>>; CHANNELS],
}

impl CallbackRegistry {
    pub const fn new() -> Self {
        Self {
            callbacks: [const { [const { Mutex::new(Cell::new(None)) }; EVENTS] }; CHANNELS],
            countdowns: [const { Mutex::new(Cell::new(None)) }; CHANNELS],
        }
    }

    /// Store `callback`, replacing the previous one.
    pub(crate) fn set(&self, channel: Channel, event: Event, callback: Callback) {
        critical_section::with(|cs| {
            self.slot(channel, event).borrow(cs).set(Some(callback));
        });
    }

    /// Make the handler call back once per `plan` instead of once per event.
    /// With `reload` the counter restarts from the plan's start value after
    /// every period.
    pub(crate) fn arm(&self, channel: Channel, event: Event, plan: &PeriodPlan, reload: bool) {
        let countdown = Countdown {
            event,
            required: plan.required_overflow_count,
            reload: reload.then_some(plan.initial_counter_value),
            elapsed: 0,
        };
        critical_section::with(|cs| {
            self.countdowns[channel.index()].borrow(cs).set(Some(countdown));
        });
    }

    pub(crate) fn disarm(&self, channel: Channel) {
        critical_section::with(|cs| {
            self.countdowns[channel.index()].borrow(cs).set(None);
        });
    }

    /// Service a hardware event. Call this from the interrupt handler of
    /// `channel`/`event`.
    ///
    /// The flag is cleared first. If a period is armed for this event the
    /// callback only runs when the period is complete, and the counter is
    /// reloaded for the next one. The flag is cleared again after a reload.
    pub fn dispatch<R: RegisterAccess>(&self, regs: &mut R, channel: Channel, event: Event) {
        channel.clear_flag(regs, event);

        let callback = critical_section::with(|cs| {
            let cell = self.countdowns[channel.index()].borrow(cs);
            if let Some(mut countdown) = cell.get() {
                if countdown.event == event && countdown.required != 0 {
                    countdown.elapsed += 1;
                    if countdown.elapsed < countdown.required {
                        cell.set(Some(countdown));
                        return None;
                    }
                    countdown.elapsed = 0;
                    cell.set(Some(countdown));
                    if let Some(initial) = countdown.reload {
                        channel.write_counter(regs, initial);
                        channel.clear_flag(regs, event);
                    }
                }
            }
            self.slot(channel, event).borrow(cs).get()
        });

        if let Some(callback) = callback {
            trace!("timer {:?} {:?}: callback", channel, event);
            callback();
        }
    }

    fn slot(&self, channel: Channel, event: Event) -> &Mutex<Cell<Option<Callback>>> {
        &self.callbacks[channel.index()][event as usize]
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
