use crate::regs::{Reg, RegisterAccess};

/// I/O port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Port {
    A,
    B,
    C,
    D,
}

impl Port {
    const fn ddr(self) -> Reg {
        match self {
            Port::A => Reg::DDRA,
            Port::B => Reg::DDRB,
            Port::C => Reg::DDRC,
            Port::D => Reg::DDRD,
        }
    }
}

/// Pin modes the timer driver asks for. Only compare outputs are driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMode {
    Output,
}

/// Pin direction control used by the timer driver.
pub trait Gpio {
    /// Switch `pin` of `port` to `mode`, leaving its level alone.
    fn set_pin_mode(&mut self, port: Port, pin: u8, mode: PinMode);
}

/// [`Gpio`] on top of the DDR registers.
pub struct PortRegisters<R> {
    regs: R,
}

impl<R: RegisterAccess> PortRegisters<R> {
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    pub fn release(self) -> R {
        self.regs
    }
}

impl<R: RegisterAccess> Gpio for PortRegisters<R> {
    fn set_pin_mode(&mut self, port: Port, pin: u8, mode: PinMode) {
        let ddr = self.regs.read(port.ddr());
        match mode {
            PinMode::Output => self.regs.write(port.ddr(), ddr | 1 << (pin & 7)),
        }
    }
}
