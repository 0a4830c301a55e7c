#![cfg_attr(not(test), no_std)]

//! Timer/counter driver for the ATmega32.

pub(crate) use log::{debug, trace, warn};

pub mod callback;
pub mod channel;
pub mod clock;
pub mod delay;
pub mod error;
pub mod gpio;
pub mod mode;
pub mod period;
pub mod regs;
pub mod timer;
pub mod usart;

pub use callback::{Callback, CallbackRegistry};
pub use channel::{Channel, ChannelId, Event};
pub use clock::{BoardClock, BoardTiming, Clock, ClockConfig, Prescaler};
pub use delay::BusyWaitDelay;
pub use error::Error;
pub use mode::{InterruptSelection, Mode, PinFunction, Technique};
pub use period::PeriodPlan;
pub use timer::{ChannelConfig, ChannelState, Timers};
pub use usart::Usart;
