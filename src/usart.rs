use avr_hal_generic::{clock::Clock, usart::Baudrate};
use nano_fmt::NanoWrite;

use crate::{
    Error,
    regs::{Reg, RegisterAccess},
};

const UDRE: u8 = 1 << 5;
const U2X: u8 = 1 << 1;
const RXEN: u8 = 1 << 4;
const TXEN: u8 = 1 << 3;

/// Largest value the 12-bit baud rate register takes.
const UBRR_MAX: u32 = 0x0FFF;

/// Wrapper around USART that can be used for output formatting.
pub struct Usart<R> {
    regs: R,
}

/// Baud rate settings, or `InvalidValue` when the rate is out of reach of
/// the 12-bit divisor at this clock.
fn baudrate<CLOCK: Clock>(baudrate: u32) -> Result<Baudrate<CLOCK>, Error> {
    if baudrate == 0 || baudrate > CLOCK::FREQ / 4 {
        return Err(Error::InvalidValue);
    }
    if (CLOCK::FREQ / 8 / baudrate).saturating_sub(1) / 2 > UBRR_MAX {
        return Err(Error::InvalidValue);
    }
    Ok(Baudrate::new(baudrate))
}

impl<R: RegisterAccess> Usart<R> {
    /// Set up 8N1 at `baudrate` and enable receiver and transmitter.
    pub fn new<CLOCK: Clock>(mut regs: R, baudrate: u32) -> Result<Self, Error> {
        let baudrate = self::baudrate::<CLOCK>(baudrate)?;
        let [lo, hi] = baudrate.ubrr.to_le_bytes();

        // URSEL clear selects UBRRH rather than UCSRC.
        regs.write(Reg::UBRRH, hi & 0x0F);
        regs.write(Reg::UBRRL, lo);
        regs.write(Reg::UCSRA, if baudrate.u2x { U2X } else { 0 });
        regs.write(Reg::UCSRB, TXEN | RXEN);

        Ok(Self { regs })
    }

    pub fn release(self) -> R {
        self.regs
    }
}

impl<R: RegisterAccess> NanoWrite for Usart<R> {
    fn write_byte(&mut self, b: u8) {
        while self.regs.read(Reg::UCSRA) & UDRE == 0 {}

        self.regs.write(Reg::UDR, b);
    }
}
