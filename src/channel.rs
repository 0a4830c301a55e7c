//! Timer channels and where their bits live.

use crate::{
    Error,
    gpio::Port,
    regs::{Field, Reg, RegisterAccess},
};

/// Number of timer/counter units on the ATmega32.
pub const CHANNELS: usize = 3;

/// A timer/counter unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    /// 8-bit `TC0`, output `OC0` on PB3.
    Timer0 = 0,
    /// 16-bit `TC1`, output `OC1A` on PD5.
    Timer1,
    /// 8-bit `TC2`, output `OC2` on PD7.
    Timer2,
}

/// Hardware event raised by a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    Overflow = 0,
    CompareMatch,
}

/// Number of [`Event`] kinds.
pub const EVENTS: usize = 2;

/// Anything that identifies a channel.
///
/// Lets the driver accept raw identifiers next to the typed [`Channel`].
pub trait ChannelId: Copy {
    fn channel(self) -> Result<Channel, Error>;
}

impl ChannelId for Channel {
    fn channel(self) -> Result<Channel, Error> {
        Ok(self)
    }
}

impl ChannelId for u8 {
    fn channel(self) -> Result<Channel, Error> {
        Channel::try_from(self)
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Channel::Timer0),
            1 => Ok(Channel::Timer1),
            2 => Ok(Channel::Timer2),
            _ => Err(Error::InvalidChannel),
        }
    }
}

impl Channel {
    pub const ALL: [Channel; CHANNELS] = [Channel::Timer0, Channel::Timer1, Channel::Timer2];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Largest value the counter holds.
    pub const fn max_count(self) -> u16 {
        match self {
            Channel::Timer1 => u16::MAX,
            Channel::Timer0 | Channel::Timer2 => u8::MAX as u16,
        }
    }

    /// Port and pin number of the output compare pin.
    pub const fn output_pin(self) -> (Port, u8) {
        match self {
            Channel::Timer0 => (Port::B, 3),
            Channel::Timer1 => (Port::D, 5),
            Channel::Timer2 => (Port::D, 7),
        }
    }

    /// Clock select bits.
    pub(crate) const fn clock_select(self) -> Field {
        match self {
            Channel::Timer0 => Field::new(Reg::TCCR0, 0, 3),
            Channel::Timer1 => Field::new(Reg::TCCR1B, 0, 3),
            Channel::Timer2 => Field::new(Reg::TCCR2, 0, 3),
        }
    }

    /// Compare output mode bits (channel A on timer 1).
    pub(crate) const fn compare_output(self) -> Field {
        match self {
            Channel::Timer0 => Field::new(Reg::TCCR0, 4, 2),
            Channel::Timer1 => Field::new(Reg::TCCR1A, 6, 2),
            Channel::Timer2 => Field::new(Reg::TCCR2, 4, 2),
        }
    }

    /// Program the waveform generation bits from a 4-bit WGM value.
    ///
    /// The 8-bit timers only have WGMn0 and WGMn1, which correspond to bits
    /// 0 and 2 of the value.
    pub(crate) fn write_waveform<R: RegisterAccess>(self, regs: &mut R, wgm: u8) {
        match self {
            Channel::Timer0 | Channel::Timer2 => {
                let reg = if self == Channel::Timer0 {
                    Reg::TCCR0
                } else {
                    Reg::TCCR2
                };
                regs.write_field(Field::new(reg, 6, 1), wgm & 1);
                regs.write_field(Field::new(reg, 3, 1), (wgm >> 2) & 1);
            }
            Channel::Timer1 => {
                regs.write_field(Field::new(Reg::TCCR1A, 0, 2), wgm & 0b11);
                regs.write_field(Field::new(Reg::TCCR1B, 3, 2), wgm >> 2);
            }
        }
    }

    /// Interrupt enable bits in TIMSK that belong to this channel.
    pub(crate) const fn interrupt_mask(self) -> u8 {
        match self {
            Channel::Timer0 => 0b0000_0011,
            Channel::Timer1 => 0b0011_1100,
            Channel::Timer2 => 0b1100_0000,
        }
    }

    /// Bit of `event` in TIMSK and TIFR; both share the layout.
    pub(crate) const fn event_bit(self, event: Event) -> u8 {
        match (self, event) {
            (Channel::Timer0, Event::Overflow) => 1 << 0,
            (Channel::Timer0, Event::CompareMatch) => 1 << 1,
            (Channel::Timer1, Event::Overflow) => 1 << 2,
            (Channel::Timer1, Event::CompareMatch) => 1 << 4,
            (Channel::Timer2, Event::Overflow) => 1 << 6,
            (Channel::Timer2, Event::CompareMatch) => 1 << 7,
        }
    }

    pub(crate) fn flag_raised<R: RegisterAccess>(self, regs: &mut R, event: Event) -> bool {
        regs.read(Reg::TIFR) & self.event_bit(event) != 0
    }

    pub(crate) fn clear_flag<R: RegisterAccess>(self, regs: &mut R, event: Event) {
        regs.clear_flags(Reg::TIFR, self.event_bit(event));
    }

    pub fn read_counter<R: RegisterAccess>(self, regs: &mut R) -> u16 {
        match self {
            Channel::Timer0 => regs.read(Reg::TCNT0).into(),
            Channel::Timer1 => regs.read_wide(Reg::TCNT1L),
            Channel::Timer2 => regs.read(Reg::TCNT2).into(),
        }
    }

    /// Values wider than the counter are truncated.
    pub(crate) fn write_counter<R: RegisterAccess>(self, regs: &mut R, value: u16) {
        match self {
            Channel::Timer0 => regs.write(Reg::TCNT0, value as u8),
            Channel::Timer1 => regs.write_wide(Reg::TCNT1L, value),
            Channel::Timer2 => regs.write(Reg::TCNT2, value as u8),
        }
    }

    pub(crate) fn write_compare<R: RegisterAccess>(self, regs: &mut R, value: u16) {
        match self {
            Channel::Timer0 => regs.write(Reg::OCR0, value as u8),
            Channel::Timer1 => regs.write_wide(Reg::OCR1AL, value),
            Channel::Timer2 => regs.write(Reg::OCR2, value as u8),
        }
    }
}
