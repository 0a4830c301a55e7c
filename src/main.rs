#![cfg_attr(target_arch = "avr", no_std, no_main, feature(abi_avr_interrupt))]

//! Demo firmware: a millisecond tick from TC0 interrupts, PWM on OC2 and
//! busy-wait delays on TC1, reported over the serial port.

#[cfg(target_arch = "avr")]
mod board {
    use core::cell::Cell;

    use critical_section::Mutex;
    use embedded_hal::delay::DelayNs;
    use nano_fmt::{NanoDisplay, NanoWrite};
    use panic_halt as _;

    use atmega_hal as hal;
    use hal::port::{
        Pin,
        mode::{Floating, Input, Output},
    };

    use atmega32_timer::{
        BoardClock, BoardTiming, BusyWaitDelay, CallbackRegistry, Channel, Error, Event,
        InterruptSelection, Mode, PinFunction, Technique, Timers, Usart,
        channel::CHANNELS,
        gpio::{Gpio, PinMode, Port},
        regs::Pac,
    };

    /// UART baud rate.
    const BAUDRATE: u32 = 9600;

    /// Tick period (in microseconds).
    const TICK_US: u16 = 1000;

    /// Duty cycle of the OC2 output (in percent).
    const DUTY_CYCLE: u8 = 25;

    /// Time between reports (in milliseconds).
    const REPORT_MS: u32 = 500;

    type BoardTimers = Timers<'static, Pac, CompareOutputs, BoardTiming>;

    /// OC0, OC1A and OC2 until a channel drives them. Dropping an output
    /// pin keeps its direction.
    struct CompareOutputs {
        idle: [Option<Pin<Input<Floating>>>; CHANNELS],
    }

    impl Gpio for CompareOutputs {
        fn set_pin_mode(&mut self, port: Port, pin: u8, mode: PinMode) {
            let Some(index) = Channel::ALL
                .iter()
                .position(|channel| channel.output_pin() == (port, pin))
            else {
                return;
            };
            let PinMode::Output = mode;
            if let Some(idle) = self.idle[index].take() {
                let _: Pin<Output> = idle.into_output();
            }
        }
    }

    static CALLBACKS: CallbackRegistry = CallbackRegistry::new();

    /// Milliseconds counted by the TC0 callback.
    static TICKS: Mutex<Cell<u16>> = Mutex::new(Cell::new(0));

    fn tick() {
        critical_section::with(|cs| {
            let ticks = TICKS.borrow(cs);
            ticks.set(ticks.get().wrapping_add(1));
        });
    }

    fn dispatch(channel: Channel, event: Event) {
        // SAFETY: Handlers only clear flags and reload counters, main code
        // does neither while the interrupt is enabled.
        let mut regs = unsafe { Pac::steal() };
        CALLBACKS.dispatch(&mut regs, channel, event);
    }

    #[avr_device::interrupt(atmega32a)]
    fn TIMER0_OVF() {
        dispatch(Channel::Timer0, Event::Overflow);
    }

    #[avr_device::interrupt(atmega32a)]
    fn TIMER0_COMP() {
        dispatch(Channel::Timer0, Event::CompareMatch);
    }

    #[avr_device::interrupt(atmega32a)]
    fn TIMER1_OVF() {
        dispatch(Channel::Timer1, Event::Overflow);
    }

    #[avr_device::interrupt(atmega32a)]
    fn TIMER1_COMPA() {
        dispatch(Channel::Timer1, Event::CompareMatch);
    }

    #[avr_device::interrupt(atmega32a)]
    fn TIMER2_OVF() {
        dispatch(Channel::Timer2, Event::Overflow);
    }

    #[avr_device::interrupt(atmega32a)]
    fn TIMER2_COMP() {
        dispatch(Channel::Timer2, Event::CompareMatch);
    }

    fn setup(timers: &mut BoardTimers) -> Result<(), Error> {
        // Millisecond tick.
        timers.configure(
            Channel::Timer0,
            Mode::Normal,
            PinFunction::Unused,
            Technique::Interrupt,
        )?;
        timers.register_callback(Channel::Timer0, Event::Overflow, Some(tick))?;
        timers.set_interrupts(Channel::Timer0, InterruptSelection::Overflow)?;
        timers.set_period_us(Channel::Timer0, TICK_US)?;
        timers.start(Channel::Timer0)?;

        // Fixed duty cycle on OC2 (PD7).
        timers.configure(
            Channel::Timer2,
            Mode::FastPwm,
            PinFunction::NonInverting,
            Technique::Interrupt,
        )?;
        timers.set_duty_cycle(Channel::Timer2, DUTY_CYCLE)?;
        timers.start(Channel::Timer2)?;

        // Delays.
        timers.configure(
            Channel::Timer1,
            Mode::CompareMatch,
            PinFunction::Unused,
            Technique::BusyWait,
        )?;
        timers.start(Channel::Timer1)
    }

    /// Log data over the serial port.
    fn send_report<W: NanoWrite>(w: &mut W, elapsed: u32) {
        let ticks = critical_section::with(|cs| TICKS.borrow(cs).get());

        "MS, ".fmt(w);
        elapsed.fmt(w);
        ", TICKS, ".fmt(w);
        ticks.fmt(w);
        "\r\n".fmt(w);
    }

    fn halt<W: NanoWrite>(w: &mut W, error: Error) -> ! {
        "ERROR, ".fmt(w);
        error.fmt(w);
        "\r\n".fmt(w);
        sleep_forever()
    }

    fn sleep_forever() -> ! {
        loop {
            avr_device::asm::sleep();
        }
    }

    #[avr_device::entry]
    fn main() -> ! {
        let Some(dp) = hal::Peripherals::take() else {
            sleep_forever();
        };
        let pins = hal::pins!(dp);
        let outputs = CompareOutputs {
            idle: [
                Some(pins.pb3.downgrade()),
                Some(pins.pd5.downgrade()),
                Some(pins.pd7.downgrade()),
            ],
        };

        // SAFETY: Every handle is created here, before interrupts are on.
        let (regs, serial_regs) = unsafe { (Pac::steal(), Pac::steal()) };

        let mut serial = match Usart::new::<BoardClock>(serial_regs, BAUDRATE) {
            Ok(serial) => serial,
            Err(_) => sleep_forever(),
        };
        "atmega32 timer demo\r\n".fmt(&mut serial);

        let mut timers: BoardTimers = Timers::new(regs, outputs, &CALLBACKS);
        if let Err(error) = setup(&mut timers) {
            halt(&mut serial, error);
        }

        // SAFETY: Setup is complete, no critical section is active.
        unsafe { avr_device::interrupt::enable() };

        let mut delay = match BusyWaitDelay::new(&mut timers, Channel::Timer1) {
            Ok(delay) => delay,
            Err(error) => halt(&mut serial, error),
        };

        let mut elapsed = 0u32;
        loop {
            delay.delay_ms(REPORT_MS);
            elapsed = elapsed.wrapping_add(REPORT_MS);
            send_report(&mut serial, elapsed);
        }
    }
}

#[cfg(not(target_arch = "avr"))]
fn main() {}
