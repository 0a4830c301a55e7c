use avr_hal_generic as hal;

pub use hal::clock::Clock;

use crate::{Channel, Error};

/// Highest CPU clock the ATmega32 is rated for, with an external crystal.
pub const MAX_CPU_MHZ: u32 = 16;

/// Timer clock source selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prescaler {
    /// clk/1.
    Direct,
    Div8,
    Div64,
    Div256,
    Div1024,
    /// External pin, falling edge.
    ExtFalling,
    /// External pin, rising edge.
    ExtRising,
}

impl Prescaler {
    /// Clock divisor, `None` for the external clock sources.
    pub const fn divisor(self) -> Option<u32> {
        match self {
            Prescaler::Direct => Some(1),
            Prescaler::Div8 => Some(8),
            Prescaler::Div64 => Some(64),
            Prescaler::Div256 => Some(256),
            Prescaler::Div1024 => Some(1024),
            Prescaler::ExtFalling | Prescaler::ExtRising => None,
        }
    }

    /// Clock select bits for `channel`.
    ///
    /// Timer 2 has its own table with extra divisors and no external input.
    pub fn clock_select(self, channel: Channel) -> Result<u8, Error> {
        match (channel, self) {
            (Channel::Timer2, Prescaler::Direct) => Ok(0b001),
            (Channel::Timer2, Prescaler::Div8) => Ok(0b010),
            (Channel::Timer2, Prescaler::Div64) => Ok(0b100),
            (Channel::Timer2, Prescaler::Div256) => Ok(0b110),
            (Channel::Timer2, Prescaler::Div1024) => Ok(0b111),
            (Channel::Timer2, _) => Err(Error::UnsupportedPrescaler),
            (_, Prescaler::Direct) => Ok(0b001),
            (_, Prescaler::Div8) => Ok(0b010),
            (_, Prescaler::Div64) => Ok(0b011),
            (_, Prescaler::Div256) => Ok(0b100),
            (_, Prescaler::Div1024) => Ok(0b101),
            (_, Prescaler::ExtFalling) => Ok(0b110),
            (_, Prescaler::ExtRising) => Ok(0b111),
        }
    }
}

/// Clock select value that stops a channel.
pub(crate) const NO_CLOCK: u8 = 0;

/// Compile-time clock setup shared by all timer channels.
pub trait ClockConfig {
    /// CPU clock.
    type Cpu: Clock;
    /// Prescaler applied when a channel is started.
    const PRESCALER: Prescaler;

    /// Checked CPU clock in whole MHz.
    fn cpu_mhz() -> Result<u32, Error> {
        match Self::Cpu::FREQ / 1_000_000 {
            mhz @ 1..=MAX_CPU_MHZ => Ok(mhz),
            _ => Err(Error::UnsupportedClock),
        }
    }
}

/// Board clock rate.
pub type BoardClock = hal::clock::MHz8;

/// Board timing: internal 8MHz oscillator, timers run at the CPU clock.
pub struct BoardTiming;

impl ClockConfig for BoardTiming {
    type Cpu = BoardClock;
    const PRESCALER: Prescaler = Prescaler::Direct;
}
