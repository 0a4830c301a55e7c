//! Register access layer.
//!
//! Registers are addressed by their data-space address, the same address the
//! datasheet lists in parentheses next to the I/O address.

/// Data-space address of an 8-bit register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reg(pub u8);

impl Reg {
    pub const UBRRL: Reg = Reg(0x29);
    pub const UCSRB: Reg = Reg(0x2A);
    pub const UCSRA: Reg = Reg(0x2B);
    pub const UDR: Reg = Reg(0x2C);
    pub const DDRD: Reg = Reg(0x31);
    pub const PORTD: Reg = Reg(0x32);
    pub const DDRC: Reg = Reg(0x34);
    pub const PORTC: Reg = Reg(0x35);
    pub const DDRB: Reg = Reg(0x37);
    pub const PORTB: Reg = Reg(0x38);
    pub const DDRA: Reg = Reg(0x3A);
    pub const PORTA: Reg = Reg(0x3B);
    /// Shared with UCSRC, selected by URSEL.
    pub const UBRRH: Reg = Reg(0x40);
    pub const OCR2: Reg = Reg(0x43);
    pub const TCNT2: Reg = Reg(0x44);
    pub const TCCR2: Reg = Reg(0x45);
    pub const OCR1AL: Reg = Reg(0x4A);
    pub const OCR1AH: Reg = Reg(0x4B);
    pub const TCNT1L: Reg = Reg(0x4C);
    pub const TCNT1H: Reg = Reg(0x4D);
    pub const TCCR1B: Reg = Reg(0x4E);
    pub const TCCR1A: Reg = Reg(0x4F);
    pub const TCNT0: Reg = Reg(0x52);
    pub const TCCR0: Reg = Reg(0x53);
    pub const TIFR: Reg = Reg(0x58);
    pub const TIMSK: Reg = Reg(0x59);
    pub const OCR0: Reg = Reg(0x5C);

    /// The byte following this one, i.e. the high byte of a 16-bit pair.
    const fn high(self) -> Reg {
        Reg(self.0 + 1)
    }

    /// Byte of one of the 16-bit timer 1 registers.
    #[cfg(target_arch = "avr")]
    fn is_wide_half(self) -> bool {
        matches!(self, Reg::TCNT1L | Reg::TCNT1H | Reg::OCR1AL | Reg::OCR1AH)
    }
}

/// A named group of bits inside a register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub reg: Reg,
    pub shift: u8,
    pub width: u8,
}

impl Field {
    pub const fn new(reg: Reg, shift: u8, width: u8) -> Self {
        Self { reg, shift, width }
    }

    /// Mask of the field in register position.
    pub const fn mask(self) -> u8 {
        (((1u16 << self.width) - 1) as u8) << self.shift
    }
}

/// Byte level access to the peripheral registers.
pub trait RegisterAccess {
    fn read(&mut self, reg: Reg) -> u8;

    fn write(&mut self, reg: Reg, value: u8);

    /// Read a field, shifted down to bit 0.
    fn read_field(&mut self, field: Field) -> u8 {
        (self.read(field.reg) & field.mask()) >> field.shift
    }

    /// Replace a field leaving the rest of the register as it is.
    fn write_field(&mut self, field: Field, value: u8) {
        let old = self.read(field.reg) & !field.mask();
        self.write(field.reg, old | ((value << field.shift) & field.mask()));
    }

    /// Clear write-one-to-clear flags. Only the bits in `mask` are written.
    fn clear_flags(&mut self, reg: Reg, mask: u8) {
        self.write(reg, mask);
    }

    /// Read a 16-bit register pair. The low byte latches the high byte.
    fn read_wide(&mut self, low: Reg) -> u16 {
        let lo = self.read(low);
        let hi = self.read(low.high());
        u16::from_le_bytes([lo, hi])
    }

    /// Write a 16-bit register pair. The high byte goes to TEMP first.
    fn write_wide(&mut self, low: Reg, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write(low.high(), hi);
        self.write(low, lo);
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &mut T {
    fn read(&mut self, reg: Reg) -> u8 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u8) {
        (**self).write(reg, value)
    }

    fn clear_flags(&mut self, reg: Reg, mask: u8) {
        (**self).clear_flags(reg, mask)
    }

    fn read_wide(&mut self, low: Reg) -> u16 {
        (**self).read_wide(low)
    }

    fn write_wide(&mut self, low: Reg, value: u16) {
        (**self).write_wide(low, value)
    }
}

/// Size of the I/O part of the data space.
const IO_END: usize = 0x60;

/// In-memory register image for running the driver off target.
///
/// TIFR behaves like the hardware one: writing a one clears the flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterFile {
    mem: [u8; IO_END],
}

impl RegisterFile {
    pub const fn new() -> Self {
        Self { mem: [0; IO_END] }
    }

    /// Current value of a register without going through the access trait.
    pub fn peek(&self, reg: Reg) -> u8 {
        self.mem[reg.0 as usize]
    }

    /// Set a register the way the hardware would, bypassing write rules.
    pub fn poke(&mut self, reg: Reg, value: u8) {
        self.mem[reg.0 as usize] = value;
    }

    /// Raise flag bits, as the counter hardware does.
    pub fn raise_flags(&mut self, reg: Reg, mask: u8) {
        self.mem[reg.0 as usize] |= mask;
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterAccess for RegisterFile {
    fn read(&mut self, reg: Reg) -> u8 {
        self.peek(reg)
    }

    fn write(&mut self, reg: Reg, value: u8) {
        let cell = &mut self.mem[reg.0 as usize];
        if reg == Reg::TIFR {
            *cell &= !value;
        } else {
            *cell = value;
        }
    }
}

#[cfg(target_arch = "avr")]
use avr_device::atmega32a::{PORTA, PORTB, PORTC, PORTD, TC0, TC1, TC2, USART};

/// Registers of the running MCU, reached through the device crate.
#[cfg(target_arch = "avr")]
pub struct Pac {
    _private: (),
}

#[cfg(target_arch = "avr")]
impl Pac {
    /// Create a handle to the hardware registers.
    ///
    /// # Safety
    ///
    /// Handles alias the same hardware. Callers must not interleave
    /// read-modify-write sequences on the same register from main code and
    /// an interrupt handler.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "avr")]
macro_rules! byte_registers {
    ($($name:ident => $periph:ident.$field:ident),* $(,)?) => {
        fn read_byte(reg: Reg) -> Option<u8> {
            // SAFETY: plain reads of I/O registers owned by the handle.
            unsafe {
                match reg {
                    $(Reg::$name => Some((*$periph::ptr()).$field.read().bits()),)*
                    _ => None,
                }
            }
        }

        fn write_byte(reg: Reg, value: u8) -> bool {
            // SAFETY: every bit pattern is accepted by these registers.
            unsafe {
                match reg {
                    $(Reg::$name => (*$periph::ptr()).$field.write(|w| w.bits(value)),)*
                    _ => return false,
                }
            }
            true
        }
    };
}

#[cfg(target_arch = "avr")]
byte_registers! {
    TCCR0 => TC0.tccr0,
    TCNT0 => TC0.tcnt0,
    OCR0 => TC0.ocr0,
    TIMSK => TC0.timsk,
    TIFR => TC0.tifr,
    TCCR1A => TC1.tccr1a,
    TCCR1B => TC1.tccr1b,
    TCCR2 => TC2.tccr2,
    TCNT2 => TC2.tcnt2,
    OCR2 => TC2.ocr2,
    DDRA => PORTA.ddra,
    PORTA => PORTA.porta,
    DDRB => PORTB.ddrb,
    PORTB => PORTB.portb,
    DDRC => PORTC.ddrc,
    PORTC => PORTC.portc,
    DDRD => PORTD.ddrd,
    PORTD => PORTD.portd,
    UDR => USART.udr,
    UCSRA => USART.ucsra,
    UCSRB => USART.ucsrb,
    UBRRL => USART.ubrrl,
    UBRRH => USART.ubrrh,
}

#[cfg(target_arch = "avr")]
impl RegisterAccess for Pac {
    fn read(&mut self, reg: Reg) -> u8 {
        match read_byte(reg) {
            Some(value) => value,
            None if reg.is_wide_half() => {
                let [lo, hi] = self.read_wide(Reg(reg.0 & !1)).to_le_bytes();
                if reg.0 & 1 == 0 { lo } else { hi }
            }
            None => 0,
        }
    }

    fn write(&mut self, reg: Reg, value: u8) {
        if !write_byte(reg, value) && reg.is_wide_half() {
            let low = Reg(reg.0 & !1);
            let mut bytes = self.read_wide(low).to_le_bytes();
            bytes[usize::from(reg.0 & 1)] = value;
            self.write_wide(low, u16::from_le_bytes(bytes));
        }
    }

    fn read_wide(&mut self, low: Reg) -> u16 {
        // TEMP is shared by all 16-bit registers, keep interrupts out.
        critical_section::with(|_| {
            // SAFETY: 16-bit reads go low byte first through TEMP.
            let tc1 = unsafe { &*TC1::ptr() };
            match low {
                Reg::TCNT1L => tc1.tcnt1.read().bits(),
                Reg::OCR1AL => tc1.ocr1a.read().bits(),
                _ => 0,
            }
        })
    }

    fn write_wide(&mut self, low: Reg, value: u16) {
        critical_section::with(|_| {
            // SAFETY: 16-bit writes go high byte first through TEMP.
            let tc1 = unsafe { &*TC1::ptr() };
            match low {
                Reg::TCNT1L => tc1.tcnt1.write(|w| unsafe { w.bits(value) }),
                Reg::OCR1AL => tc1.ocr1a.write(|w| unsafe { w.bits(value) }),
                _ => {}
            }
        });
    }
}
