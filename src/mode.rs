//! Counting modes, output pin functions and their compatibility rules.

use crate::{Channel, Error};

/// Counting/waveform generation mode.
///
/// Raw values follow the WGM numbering of the 16-bit timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    Normal = 0,
    /// Phase correct PWM, TOP = 0xFF.
    PhaseCorrectPwm,
    PhaseCorrectPwm9Bit,
    PhaseCorrectPwm10Bit,
    /// Clear timer on compare match, TOP = OCR.
    CompareMatch,
    /// Fast PWM, TOP = 0xFF.
    FastPwm,
    FastPwm9Bit,
    FastPwm10Bit,
    PhaseFrequencyCorrectPwmIcr,
    PhaseFrequencyCorrectPwmOcr,
    PhaseCorrectPwmIcr,
    PhaseCorrectPwmOcr,
    CompareMatchIcr,
    FastPwmIcr = 14,
    FastPwmOcr,
}

impl TryFrom<u8> for Mode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        Ok(match value {
            0 => Mode::Normal,
            1 => Mode::PhaseCorrectPwm,
            2 => Mode::PhaseCorrectPwm9Bit,
            3 => Mode::PhaseCorrectPwm10Bit,
            4 => Mode::CompareMatch,
            5 => Mode::FastPwm,
            6 => Mode::FastPwm9Bit,
            7 => Mode::FastPwm10Bit,
            8 => Mode::PhaseFrequencyCorrectPwmIcr,
            9 => Mode::PhaseFrequencyCorrectPwmOcr,
            10 => Mode::PhaseCorrectPwmIcr,
            11 => Mode::PhaseCorrectPwmOcr,
            12 => Mode::CompareMatchIcr,
            13 => return Err(Error::ReservedValue),
            14 => Mode::FastPwmIcr,
            15 => Mode::FastPwmOcr,
            _ => return Err(Error::InvalidValue),
        })
    }
}

impl Mode {
    /// WGM bit pattern of the mode.
    pub const fn wgm(self) -> u8 {
        self as u8
    }

    pub const fn is_pwm(self) -> bool {
        !matches!(self, Mode::Normal | Mode::CompareMatch | Mode::CompareMatchIcr)
    }

    /// Whether the driver implements the mode. These are the four modes all
    /// channels share; the wide modes of timer 1 are not driven yet.
    pub const fn is_driven(self) -> bool {
        matches!(
            self,
            Mode::Normal | Mode::PhaseCorrectPwm | Mode::CompareMatch | Mode::FastPwm
        )
    }

    /// TOP value of the PWM modes that have a fixed one.
    pub(crate) const fn fixed_top(self) -> Option<u16> {
        match self {
            Mode::PhaseCorrectPwm | Mode::FastPwm => Some(0x00FF),
            Mode::PhaseCorrectPwm9Bit | Mode::FastPwm9Bit => Some(0x01FF),
            Mode::PhaseCorrectPwm10Bit | Mode::FastPwm10Bit => Some(0x03FF),
            _ => None,
        }
    }
}

/// What the output compare pin does on a compare match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PinFunction {
    /// Pin disconnected from the timer.
    Unused = 0,
    Toggle,
    Clear,
    Set,
    /// Placeholder for the COM encoding that PWM modes reserve.
    Reserved = 5,
    /// PWM, cleared on compare match.
    NonInverting,
    /// PWM, set on compare match.
    Inverting,
}

/// Values above this do not fit the two COM bits.
const MAX_COM_VALUE: u8 = 0b11;

impl TryFrom<u8> for PinFunction {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        Ok(match value {
            0 => PinFunction::Unused,
            1 => PinFunction::Toggle,
            2 => PinFunction::Clear,
            3 => PinFunction::Set,
            5 => PinFunction::Reserved,
            6 => PinFunction::NonInverting,
            7 => PinFunction::Inverting,
            _ => return Err(Error::InvalidValue),
        })
    }
}

impl PinFunction {
    /// COM bits for the function.
    ///
    /// PWM functions alias onto the compare-match encodings by dropping the
    /// field modulus: non-inverting shares `Clear`'s bits, inverting shares
    /// `Set`'s.
    pub const fn com_bits(self) -> u8 {
        let raw = self as u8;
        if raw > MAX_COM_VALUE {
            raw - (MAX_COM_VALUE + 1)
        } else {
            raw
        }
    }

    /// Check the function against `mode`.
    pub fn check(self, mode: Mode) -> Result<(), Error> {
        use PinFunction::*;

        if mode.is_pwm() && self == Reserved {
            return Err(Error::ReservedValue);
        }

        let compatible = match mode {
            Mode::Normal => self == Unused,
            Mode::CompareMatch | Mode::CompareMatchIcr => {
                matches!(self, Unused | Toggle | Clear | Set)
            }
            _ => matches!(self, Unused | NonInverting | Inverting),
        };

        if compatible {
            Ok(())
        } else {
            Err(Error::IncompatibleConfiguration)
        }
    }
}

/// How the caller waits for a period to elapse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Technique {
    /// Poll the flags until the period is over.
    BusyWait = 0,
    /// Let the interrupt handlers count and call back.
    Interrupt,
}

impl TryFrom<u8> for Technique {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Technique::BusyWait),
            1 => Ok(Technique::Interrupt),
            _ => Err(Error::InvalidTechnique),
        }
    }
}

/// Which interrupt sources of a channel are enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptSelection {
    None = 0,
    Overflow,
    CompareMatch,
    Both,
    /// Every source the channel has; timer 1 only.
    All,
}

impl TryFrom<u8> for InterruptSelection {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        Ok(match value {
            0 => InterruptSelection::None,
            1 => InterruptSelection::Overflow,
            2 => InterruptSelection::CompareMatch,
            3 => InterruptSelection::Both,
            4 => InterruptSelection::All,
            _ => return Err(Error::InvalidValue),
        })
    }
}

impl InterruptSelection {
    /// TIMSK bits for the selection on `channel`.
    pub(crate) fn enable_bits(self, channel: Channel) -> Result<u8, Error> {
        use crate::Event;

        let overflow = channel.event_bit(Event::Overflow);
        let compare = channel.event_bit(Event::CompareMatch);

        match self {
            InterruptSelection::None => Ok(0),
            InterruptSelection::Overflow => Ok(overflow),
            InterruptSelection::CompareMatch => Ok(compare),
            InterruptSelection::Both => Ok(overflow | compare),
            InterruptSelection::All if channel == Channel::Timer1 => Ok(channel.interrupt_mask()),
            InterruptSelection::All => Err(Error::UnsupportedForChannel),
        }
    }
}
