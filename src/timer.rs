//! The timer driver.

use core::marker::PhantomData;

use crate::{
    Callback, CallbackRegistry, Channel, ChannelId, ClockConfig, Error, Event, InterruptSelection,
    Mode, PeriodPlan, PinFunction, Technique,
    channel::CHANNELS,
    clock::NO_CLOCK,
    debug,
    gpio::{Gpio, PinMode},
    regs::{Reg, RegisterAccess},
    warn,
};

/// Stored settings of a configured channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub mode: Mode,
    /// As requested; the register holds [`PinFunction::com_bits`].
    pub pin_function: PinFunction,
    pub technique: Technique,
    pub interrupts: InterruptSelection,
}

impl ChannelConfig {
    /// Compare output bits the pin function was normalized to.
    pub const fn com_bits(&self) -> u8 {
        self.pin_function.com_bits()
    }
}

/// Configuration store entry of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Unconfigured,
    Configured(ChannelConfig),
}

impl ChannelState {
    fn config(self) -> Result<ChannelConfig, Error> {
        match self {
            ChannelState::Configured(config) => Ok(config),
            ChannelState::Unconfigured => Err(Error::InvalidTechnique),
        }
    }
}

/// Driver context owning the timer registers.
///
/// `C` supplies the compile-time clock setup. Callbacks and interrupt side
/// countdowns live in a [`CallbackRegistry`] shared with the interrupt
/// handlers.
pub struct Timers<'a, R, G, C> {
    regs: R,
    gpio: G,
    callbacks: &'a CallbackRegistry,
    store: [ChannelState; CHANNELS],
    plans: [Option<PeriodPlan>; CHANNELS],
    _clock: PhantomData<C>,
}

/// Progress of a busy wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BusyWait {
    WaitingFirstCycle,
    Counting { elapsed: u32 },
    Done,
}

impl<'a, R, G, C> Timers<'a, R, G, C>
where
    R: RegisterAccess,
    G: Gpio,
    C: ClockConfig,
{
    /// Create the driver with every channel unconfigured.
    pub fn new(regs: R, gpio: G, callbacks: &'a CallbackRegistry) -> Self {
        Self {
            regs,
            gpio,
            callbacks,
            store: [ChannelState::Unconfigured; CHANNELS],
            plans: [None; CHANNELS],
            _clock: PhantomData,
        }
    }

    /// Give back the register and GPIO handles.
    pub fn release(self) -> (R, G) {
        (self.regs, self.gpio)
    }

    pub fn registers(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn gpio(&mut self) -> &mut G {
        &mut self.gpio
    }

    /// Stored configuration of `channel`.
    pub fn state(&self, channel: Channel) -> ChannelState {
        self.store[channel.index()]
    }

    /// Last period computed for `channel`.
    pub fn period_plan(&self, channel: Channel) -> Option<PeriodPlan> {
        self.plans[channel.index()]
    }

    /// Stored settings, `InvalidTechnique` for a channel never configured.
    pub fn config(&self, id: impl ChannelId) -> Result<ChannelConfig, Error> {
        self.state(id.channel()?).config()
    }

    /// Configure mode, output pin function and timing technique.
    ///
    /// All interrupt sources of the channel end up disabled and any period
    /// armed for the interrupt handlers is dropped.
    pub fn configure(
        &mut self,
        id: impl ChannelId,
        mode: Mode,
        pin_function: PinFunction,
        technique: Technique,
    ) -> Result<(), Error> {
        let channel = id.channel()?;
        if !mode.is_driven() {
            return Err(Error::UnsupportedMode);
        }
        pin_function.check(mode)?;

        channel.write_waveform(&mut self.regs, mode.wgm());
        self.regs
            .write_field(channel.compare_output(), pin_function.com_bits());

        if pin_function != PinFunction::Unused {
            let (port, pin) = channel.output_pin();
            self.gpio.set_pin_mode(port, pin, PinMode::Output);
        }

        self.write_interrupt_enable(channel, 0);
        self.callbacks.disarm(channel);

        self.store[channel.index()] = ChannelState::Configured(ChannelConfig {
            mode,
            pin_function,
            technique,
            interrupts: InterruptSelection::None,
        });

        debug!(
            "timer {:?}: {:?}, pin {:?}, {:?}",
            channel, mode, pin_function, technique
        );
        Ok(())
    }

    /// Change the mode of a configured channel.
    pub fn set_mode(&mut self, id: impl ChannelId, mode: Mode) -> Result<(), Error> {
        let channel = id.channel()?;
        let config = self.state(channel).config()?;
        self.configure(channel, mode, config.pin_function, config.technique)
    }

    /// Change the output pin function of a configured channel.
    pub fn set_pin_function(
        &mut self,
        id: impl ChannelId,
        pin_function: PinFunction,
    ) -> Result<(), Error> {
        let channel = id.channel()?;
        let config = self.state(channel).config()?;
        self.configure(channel, config.mode, pin_function, config.technique)
    }

    /// Change the timing technique of a configured channel.
    pub fn set_technique(&mut self, id: impl ChannelId, technique: Technique) -> Result<(), Error> {
        let channel = id.channel()?;
        let config = self.state(channel).config()?;
        self.configure(channel, config.mode, config.pin_function, technique)
    }

    /// Enable the selected interrupt sources of `channel`, disabling the
    /// others.
    ///
    /// Busy waiting channels only accept [`InterruptSelection::None`].
    pub fn set_interrupts(
        &mut self,
        id: impl ChannelId,
        selection: InterruptSelection,
    ) -> Result<(), Error> {
        let channel = id.channel()?;
        let bits = selection.enable_bits(channel)?;
        let mut config = self.state(channel).config()?;

        if config.technique == Technique::BusyWait && selection != InterruptSelection::None {
            return Err(Error::IncompatibleConfiguration);
        }

        self.write_interrupt_enable(channel, bits);
        config.interrupts = selection;
        self.store[channel.index()] = ChannelState::Configured(config);

        debug!("timer {:?}: interrupts {:?}", channel, selection);
        Ok(())
    }

    /// Register the callback for `event` on `channel`, replacing any
    /// previous one.
    ///
    /// `None` stands for a missing callback and is rejected.
    pub fn register_callback(
        &mut self,
        id: impl ChannelId,
        event: Event,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        let channel = id.channel()?;
        let callback = callback.ok_or(Error::NullCallback)?;

        self.callbacks.set(channel, event, callback);
        Ok(())
    }

    /// Time a period of `period_us` microseconds.
    ///
    /// Busy waiting channels block until the period is over, so the channel
    /// has to be started first. Interrupt driven channels load the first
    /// cycle, arm the countdown for the interrupt handler and return at once.
    /// PWM channels count overflows of the running waveform: neither the
    /// counter nor the compare register is touched.
    pub fn set_period_us(&mut self, id: impl ChannelId, period_us: u16) -> Result<(), Error> {
        let channel = id.channel()?;
        let plan = PeriodPlan::new::<C>(channel, period_us)?;
        let config = self.state(channel).config()?;

        self.plans[channel.index()] = Some(plan);
        debug!("timer {:?}: {}us -> {:?}", channel, period_us, plan);

        match config.technique {
            Technique::BusyWait => self.busy_wait(channel, config.mode, &plan),
            Technique::Interrupt => {
                let event = Self::counted_event(channel, config.mode, &plan)?;
                let reload = !config.mode.is_pwm();
                if reload {
                    self.load_first_cycle(channel, event, &plan);
                }
                self.callbacks.arm(channel, event, &plan, reload);
                Ok(())
            }
        }
    }

    /// Set the PWM duty cycle in percent.
    pub fn set_duty_cycle(&mut self, id: impl ChannelId, percent: u8) -> Result<(), Error> {
        let channel = id.channel()?;
        let config = self.state(channel).config()?;
        let top = config
            .mode
            .fixed_top()
            .ok_or(Error::IncompatibleConfiguration)?;
        if percent > 100 {
            return Err(Error::InvalidValue);
        }

        let compare = u32::from(top) * u32::from(percent) / 100;
        channel.write_compare(&mut self.regs, compare as u16);
        Ok(())
    }

    /// Start counting with the configured prescaler.
    pub fn start(&mut self, id: impl ChannelId) -> Result<(), Error> {
        let channel = id.channel()?;
        let select = C::PRESCALER.clock_select(channel)?;

        self.regs.write_field(channel.clock_select(), select);
        Ok(())
    }

    /// Stop counting. Counter value and configuration are kept.
    pub fn stop(&mut self, id: impl ChannelId) -> Result<(), Error> {
        let channel = id.channel()?;

        self.regs.write_field(channel.clock_select(), NO_CLOCK);
        Ok(())
    }

    fn write_interrupt_enable(&mut self, channel: Channel, bits: u8) {
        let mask = channel.interrupt_mask();
        let timsk = self.regs.read(Reg::TIMSK) & !mask;
        self.regs.write(Reg::TIMSK, timsk | (bits & mask));
    }

    /// Event that marks the end of a cycle in `mode`.
    fn counted_event(channel: Channel, mode: Mode, plan: &PeriodPlan) -> Result<Event, Error> {
        match mode {
            // The match would never fire.
            Mode::CompareMatch if plan.initial_counter_value == channel.max_count() => {
                Err(Error::UnsupportedConfiguration)
            }
            Mode::CompareMatch => Ok(Event::CompareMatch),
            _ => Ok(Event::Overflow),
        }
    }

    /// Shorten the first cycle. In compare-match mode the compare register
    /// is moved to the top so a match lands where an overflow would.
    ///
    /// The flag is cleared after the counter is loaded: an event raised
    /// before the load belongs to the previous count.
    fn load_first_cycle(&mut self, channel: Channel, event: Event, plan: &PeriodPlan) {
        if event == Event::CompareMatch {
            channel.write_compare(&mut self.regs, channel.max_count());
        }
        channel.write_counter(&mut self.regs, plan.initial_counter_value);
        channel.clear_flag(&mut self.regs, event);
    }

    /// Poll the channel's flag until `plan` has elapsed.
    ///
    /// There is no timeout: a stopped channel blocks forever.
    fn busy_wait(&mut self, channel: Channel, mode: Mode, plan: &PeriodPlan) -> Result<(), Error> {
        if mode.is_pwm() {
            return Err(Error::UnsupportedConfiguration);
        }
        let event = Self::counted_event(channel, mode, plan)?;
        let mut state = BusyWait::WaitingFirstCycle;

        loop {
            state = match state {
                BusyWait::WaitingFirstCycle if plan.required_overflow_count == 0 => BusyWait::Done,
                BusyWait::WaitingFirstCycle => {
                    if self.regs.read_field(channel.clock_select()) == NO_CLOCK {
                        warn!("timer {:?}: busy wait on a stopped channel", channel);
                    }
                    self.load_first_cycle(channel, event, plan);
                    BusyWait::Counting { elapsed: 0 }
                }
                BusyWait::Counting { elapsed } => {
                    if channel.flag_raised(&mut self.regs, event) {
                        channel.clear_flag(&mut self.regs, event);
                        let elapsed = elapsed + 1;
                        if elapsed >= plan.required_overflow_count {
                            BusyWait::Done
                        } else {
                            BusyWait::Counting { elapsed }
                        }
                    } else {
                        BusyWait::Counting { elapsed }
                    }
                }
                BusyWait::Done => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicU8, Ordering};
    use std::vec::Vec;

    use avr_hal_generic::clock::MHz8;

    use super::*;
    use crate::{
        Prescaler,
        gpio::Port,
        regs::{Field, RegisterFile},
    };

    struct Clock8;

    impl ClockConfig for Clock8 {
        type Cpu = MHz8;
        const PRESCALER: Prescaler = Prescaler::Direct;
    }

    struct ExternalClock;

    impl ClockConfig for ExternalClock {
        type Cpu = MHz8;
        const PRESCALER: Prescaler = Prescaler::ExtFalling;
    }

    struct Overclocked;

    impl crate::Clock for Overclocked {
        const FREQ: u32 = 20_000_000;
    }

    impl ClockConfig for Overclocked {
        type Cpu = Overclocked;
        const PRESCALER: Prescaler = Prescaler::Direct;
    }

    /// Records every pin mode request.
    #[derive(Default)]
    struct PinLog(Vec<(Port, u8, PinMode)>);

    impl Gpio for PinLog {
        fn set_pin_mode(&mut self, port: Port, pin: u8, mode: PinMode) {
            self.0.push((port, pin, mode));
        }
    }

    /// Raises every timer flag whenever TIFR is read, and counts the flags
    /// cleared.
    #[derive(Default)]
    struct Ticking {
        file: RegisterFile,
        cleared: u32,
    }

    impl RegisterAccess for Ticking {
        fn read(&mut self, reg: Reg) -> u8 {
            if reg == Reg::TIFR {
                self.file.raise_flags(Reg::TIFR, 0xFF);
            }
            self.file.read(reg)
        }

        fn write(&mut self, reg: Reg, value: u8) {
            if reg == Reg::TIFR {
                self.cleared += value.count_ones();
            }
            self.file.write(reg, value);
        }
    }

    /// Leaves the overflow flag of timer 0 raised when the counter is
    /// loaded, as an overflow from the previous count would. Every poll
    /// that finds the flag clear counts one real overflow and raises it.
    #[derive(Default)]
    struct StaleOverflow {
        file: RegisterFile,
        overflows: u32,
    }

    impl RegisterAccess for StaleOverflow {
        fn read(&mut self, reg: Reg) -> u8 {
            if reg == Reg::TIFR && self.file.peek(Reg::TIFR) & 1 == 0 {
                self.overflows += 1;
                self.file.raise_flags(Reg::TIFR, 1);
            }
            self.file.read(reg)
        }

        fn write(&mut self, reg: Reg, value: u8) {
            self.file.write(reg, value);
            if reg == Reg::TCNT0 {
                self.file.raise_flags(Reg::TIFR, 1);
            }
        }
    }

    fn timers(registry: &CallbackRegistry) -> Timers<'_, RegisterFile, PinLog, Clock8> {
        Timers::new(RegisterFile::new(), PinLog::default(), registry)
    }

    const ALL_MODES: [Mode; 4] = [
        Mode::Normal,
        Mode::PhaseCorrectPwm,
        Mode::CompareMatch,
        Mode::FastPwm,
    ];

    const ALL_FUNCTIONS: [PinFunction; 7] = [
        PinFunction::Unused,
        PinFunction::Toggle,
        PinFunction::Clear,
        PinFunction::Set,
        PinFunction::Reserved,
        PinFunction::NonInverting,
        PinFunction::Inverting,
    ];

    /// Expected outcome of configuring `mode` with `function`.
    fn expected(mode: Mode, function: PinFunction) -> Result<(), Error> {
        use PinFunction::*;

        match (mode, function) {
            (_, Unused) => Ok(()),
            (Mode::CompareMatch, Toggle | Clear | Set) => Ok(()),
            (Mode::FastPwm | Mode::PhaseCorrectPwm, NonInverting | Inverting) => Ok(()),
            (Mode::FastPwm | Mode::PhaseCorrectPwm, Reserved) => Err(Error::ReservedValue),
            _ => Err(Error::IncompatibleConfiguration),
        }
    }

    #[test_log::test]
    fn compatibility_table() {
        for channel in Channel::ALL {
            for mode in ALL_MODES {
                for function in ALL_FUNCTIONS {
                    let registry = CallbackRegistry::new();
                    let mut timers = timers(&registry);

                    let result = timers.configure(channel, mode, function, Technique::Interrupt);

                    assert_eq!(result, expected(mode, function), "{mode:?} {function:?}");
                    if result.is_ok() {
                        assert_eq!(
                            timers.state(channel),
                            ChannelState::Configured(ChannelConfig {
                                mode,
                                pin_function: function,
                                technique: Technique::Interrupt,
                                interrupts: InterruptSelection::None,
                            })
                        );
                        let com = timers.registers().read_field(channel.compare_output());
                        assert_eq!(com, function.com_bits());
                    } else {
                        assert_eq!(timers.state(channel), ChannelState::Unconfigured);
                    }
                }
            }
        }
    }

    #[test]
    fn failed_configuration_writes_nothing() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers.registers().poke(Reg::TIMSK, 0xFF);

        let result = timers.configure(
            Channel::Timer0,
            Mode::FastPwm,
            PinFunction::Toggle,
            Technique::BusyWait,
        );

        assert_eq!(result, Err(Error::IncompatibleConfiguration));
        let (regs, gpio) = timers.release();
        assert_eq!(regs.peek(Reg::TCCR0), 0);
        assert_eq!(regs.peek(Reg::TIMSK), 0xFF);
        assert!(gpio.0.is_empty());
    }

    #[test]
    fn wide_modes_are_not_driven() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);

        for mode in [Mode::FastPwm10Bit, Mode::CompareMatchIcr, Mode::PhaseCorrectPwmOcr] {
            assert_eq!(
                timers.configure(1u8, mode, PinFunction::Unused, Technique::BusyWait),
                Err(Error::UnsupportedMode)
            );
        }
    }

    #[test]
    fn raw_channel_outside_range() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);

        assert_eq!(
            timers.configure(3u8, Mode::Normal, PinFunction::Unused, Technique::BusyWait),
            Err(Error::InvalidChannel)
        );
        assert_eq!(timers.start(7u8), Err(Error::InvalidChannel));
        assert_eq!(timers.stop(3u8), Err(Error::InvalidChannel));
        assert_eq!(
            timers.set_interrupts(9u8, InterruptSelection::None),
            Err(Error::InvalidChannel)
        );
        assert_eq!(timers.set_period_us(3u8, 10), Err(Error::InvalidChannel));
    }

    #[test]
    fn output_pin_only_when_used() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);

        timers
            .configure(Channel::Timer0, Mode::Normal, PinFunction::Unused, Technique::BusyWait)
            .unwrap();
        timers
            .configure(
                Channel::Timer2,
                Mode::FastPwm,
                PinFunction::Inverting,
                Technique::Interrupt,
            )
            .unwrap();
        timers
            .configure(
                Channel::Timer1,
                Mode::CompareMatch,
                PinFunction::Toggle,
                Technique::Interrupt,
            )
            .unwrap();

        let (regs, gpio) = timers.release();
        assert_eq!(
            gpio.0,
            [(Port::D, 7, PinMode::Output), (Port::D, 5, PinMode::Output)]
        );
        // WGM20, COM21, COM20, WGM21.
        assert_eq!(regs.peek(Reg::TCCR2), 0b0111_1000);
        // COM1A0, CTC on WGM12.
        assert_eq!(regs.peek(Reg::TCCR1A), 0b0100_0000);
        assert_eq!(regs.peek(Reg::TCCR1B), 0b0000_1000);
    }

    #[test]
    fn configure_is_idempotent() {
        let registry = CallbackRegistry::new();
        let mut once = timers(&registry);
        let mut twice = timers(&registry);

        for timers in [&mut once, &mut twice] {
            timers
                .configure(
                    Channel::Timer0,
                    Mode::CompareMatch,
                    PinFunction::Clear,
                    Technique::Interrupt,
                )
                .unwrap();
        }
        twice
            .configure(
                Channel::Timer0,
                Mode::CompareMatch,
                PinFunction::Clear,
                Technique::Interrupt,
            )
            .unwrap();

        assert_eq!(once.state(Channel::Timer0), twice.state(Channel::Timer0));
        let (once, _) = once.release();
        let (twice, _) = twice.release();
        for reg in [Reg::TCCR0, Reg::TIMSK, Reg::TCNT0, Reg::OCR0] {
            assert_eq!(once.peek(reg), twice.peek(reg));
        }
    }

    #[test]
    fn configure_disables_only_own_interrupts() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers.registers().poke(Reg::TIMSK, 0xFF);

        timers
            .configure(Channel::Timer1, Mode::Normal, PinFunction::Unused, Technique::Interrupt)
            .unwrap();

        assert_eq!(timers.registers().peek(Reg::TIMSK), 0b1100_0011);
    }

    #[test]
    fn busy_wait_rejects_interrupts() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers
            .configure(Channel::Timer0, Mode::Normal, PinFunction::Unused, Technique::BusyWait)
            .unwrap();

        for selection in [
            InterruptSelection::Overflow,
            InterruptSelection::CompareMatch,
            InterruptSelection::Both,
        ] {
            assert_eq!(
                timers.set_interrupts(Channel::Timer0, selection),
                Err(Error::IncompatibleConfiguration)
            );
        }
        assert_eq!(
            timers.set_interrupts(Channel::Timer0, InterruptSelection::None),
            Ok(())
        );
        assert_eq!(timers.registers().peek(Reg::TIMSK), 0);
    }

    #[test]
    fn interrupt_selections() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        for channel in Channel::ALL {
            timers
                .configure(channel, Mode::Normal, PinFunction::Unused, Technique::Interrupt)
                .unwrap();
        }

        timers
            .set_interrupts(Channel::Timer0, InterruptSelection::Overflow)
            .unwrap();
        timers
            .set_interrupts(Channel::Timer1, InterruptSelection::All)
            .unwrap();
        timers
            .set_interrupts(Channel::Timer2, InterruptSelection::CompareMatch)
            .unwrap();
        assert_eq!(
            timers.set_interrupts(Channel::Timer0, InterruptSelection::All),
            Err(Error::UnsupportedForChannel)
        );

        assert_eq!(timers.registers().peek(Reg::TIMSK), 0b1011_1101);
        match timers.state(Channel::Timer1) {
            ChannelState::Configured(config) => {
                assert_eq!(config.interrupts, InterruptSelection::All)
            }
            ChannelState::Unconfigured => panic!("timer 1 lost its configuration"),
        }
    }

    #[test]
    fn unconfigured_channel_has_no_technique() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);

        assert_eq!(
            timers.set_interrupts(Channel::Timer2, InterruptSelection::None),
            Err(Error::InvalidTechnique)
        );
        assert_eq!(
            timers.set_period_us(Channel::Timer2, 100),
            Err(Error::InvalidTechnique)
        );
        assert_eq!(
            timers.set_mode(Channel::Timer2, Mode::Normal),
            Err(Error::InvalidTechnique)
        );
        assert_eq!(timers.config(2u8), Err(Error::InvalidTechnique));
        assert_eq!(timers.config(5u8), Err(Error::InvalidChannel));
    }

    #[test]
    fn single_field_setters_revalidate() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers
            .configure(
                Channel::Timer0,
                Mode::FastPwm,
                PinFunction::NonInverting,
                Technique::Interrupt,
            )
            .unwrap();

        assert_eq!(
            timers.set_mode(Channel::Timer0, Mode::Normal),
            Err(Error::IncompatibleConfiguration)
        );
        timers
            .set_pin_function(Channel::Timer0, PinFunction::Unused)
            .unwrap();
        timers.set_mode(Channel::Timer0, Mode::Normal).unwrap();
        timers
            .set_technique(Channel::Timer0, Technique::BusyWait)
            .unwrap();

        assert_eq!(
            timers.state(Channel::Timer0),
            ChannelState::Configured(ChannelConfig {
                mode: Mode::Normal,
                pin_function: PinFunction::Unused,
                technique: Technique::BusyWait,
                interrupts: InterruptSelection::None,
            })
        );
    }

    #[test]
    fn missing_callback() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);

        assert_eq!(
            timers.register_callback(Channel::Timer0, Event::Overflow, None),
            Err(Error::NullCallback)
        );
        assert_eq!(
            timers.register_callback(4u8, Event::Overflow, Some(|| {})),
            Err(Error::InvalidChannel)
        );
    }

    #[test]
    fn start_stop_touch_only_clock_select() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers
            .configure(
                Channel::Timer0,
                Mode::CompareMatch,
                PinFunction::Toggle,
                Technique::Interrupt,
            )
            .unwrap();
        timers.registers().poke(Reg::TCNT0, 42);
        let before = timers.state(Channel::Timer0);
        let control = timers.registers().peek(Reg::TCCR0);

        timers.start(Channel::Timer0).unwrap();
        assert_eq!(timers.registers().peek(Reg::TCCR0), control | 0b001);

        timers.stop(Channel::Timer0).unwrap();
        assert_eq!(timers.registers().peek(Reg::TCCR0), control);
        assert_eq!(timers.registers().peek(Reg::TCNT0), 42);
        assert_eq!(timers.state(Channel::Timer0), before);
    }

    #[test]
    fn timer2_cannot_count_external_clock() {
        let registry = CallbackRegistry::new();
        let mut timers: Timers<'_, _, _, ExternalClock> =
            Timers::new(RegisterFile::new(), PinLog::default(), &registry);

        assert_eq!(timers.start(Channel::Timer2), Err(Error::UnsupportedPrescaler));
        assert_eq!(timers.start(Channel::Timer1), Ok(()));
        assert_eq!(
            timers.registers().read_field(Field::new(Reg::TCCR1B, 0, 3)),
            0b110
        );
    }

    #[test_log::test]
    fn busy_wait_counts_overflows() {
        let registry = CallbackRegistry::new();
        let mut timers: Timers<'_, Ticking, PinLog, Clock8> =
            Timers::new(Ticking::default(), PinLog::default(), &registry);
        timers
            .configure(Channel::Timer0, Mode::Normal, PinFunction::Unused, Technique::BusyWait)
            .unwrap();
        timers.start(Channel::Timer0).unwrap();

        timers.set_period_us(Channel::Timer0, 70).unwrap();

        let plan = timers.period_plan(Channel::Timer0).unwrap();
        assert_eq!(plan.required_overflow_count, 3);
        let (regs, _) = timers.release();
        // One clear on entry, then one per cycle.
        assert_eq!(regs.cleared, 1 + 3);
        assert_eq!(regs.file.peek(Reg::TCNT0), 205);
    }

    #[test_log::test]
    fn busy_wait_ignores_flag_raised_before_load() {
        let registry = CallbackRegistry::new();
        let mut timers: Timers<'_, StaleOverflow, PinLog, Clock8> =
            Timers::new(StaleOverflow::default(), PinLog::default(), &registry);
        timers
            .configure(Channel::Timer0, Mode::Normal, PinFunction::Unused, Technique::BusyWait)
            .unwrap();
        timers.start(Channel::Timer0).unwrap();

        // 160 counts: a single shortened cycle.
        timers.set_period_us(Channel::Timer0, 20).unwrap();

        let plan = timers.period_plan(Channel::Timer0).unwrap();
        assert_eq!(plan.required_overflow_count, 1);
        assert_eq!(timers.registers().overflows, 1);
    }

    #[test]
    fn interrupt_technique_drops_flag_raised_before_load() {
        let registry = CallbackRegistry::new();
        let mut timers: Timers<'_, StaleOverflow, PinLog, Clock8> =
            Timers::new(StaleOverflow::default(), PinLog::default(), &registry);
        timers
            .configure(Channel::Timer0, Mode::Normal, PinFunction::Unused, Technique::Interrupt)
            .unwrap();

        timers.set_period_us(Channel::Timer0, 20).unwrap();

        let regs = &timers.registers().file;
        assert_eq!(regs.peek(Reg::TCNT0), 95);
        assert_eq!(regs.peek(Reg::TIFR) & 1, 0);
    }

    #[test]
    fn busy_wait_keeps_other_interrupt_enables() {
        let registry = CallbackRegistry::new();
        let mut timers: Timers<'_, Ticking, PinLog, Clock8> =
            Timers::new(Ticking::default(), PinLog::default(), &registry);
        timers
            .configure(Channel::Timer0, Mode::Normal, PinFunction::Unused, Technique::BusyWait)
            .unwrap();
        timers.start(Channel::Timer0).unwrap();
        timers.registers().file.poke(Reg::TIMSK, 0b1111_1100);

        timers.set_period_us(Channel::Timer0, 70).unwrap();

        assert_eq!(timers.registers().file.peek(Reg::TIMSK), 0b1111_1100);
    }

    #[test]
    fn period_errors_write_nothing() {
        let registry = CallbackRegistry::new();
        let mut timers: Timers<'_, RegisterFile, PinLog, ExternalClock> =
            Timers::new(RegisterFile::new(), PinLog::default(), &registry);
        timers
            .configure(Channel::Timer2, Mode::Normal, PinFunction::Unused, Technique::Interrupt)
            .unwrap();
        let before = timers.registers().clone();

        assert_eq!(
            timers.set_period_us(Channel::Timer2, 100),
            Err(Error::UnsupportedPrescaler)
        );
        assert_eq!(*timers.registers(), before);
        assert_eq!(timers.period_plan(Channel::Timer2), None);

        let mut timers: Timers<'_, RegisterFile, PinLog, Overclocked> =
            Timers::new(RegisterFile::new(), PinLog::default(), &registry);
        timers
            .configure(Channel::Timer0, Mode::Normal, PinFunction::Unused, Technique::BusyWait)
            .unwrap();
        let before = timers.registers().clone();

        assert_eq!(
            timers.set_period_us(Channel::Timer0, 100),
            Err(Error::UnsupportedClock)
        );
        assert_eq!(*timers.registers(), before);
        assert_eq!(timers.period_plan(Channel::Timer0), None);
    }

    #[test]
    fn busy_wait_in_compare_mode_moves_compare_to_top() {
        let registry = CallbackRegistry::new();
        let mut timers: Timers<'_, Ticking, PinLog, Clock8> =
            Timers::new(Ticking::default(), PinLog::default(), &registry);
        timers
            .configure(
                Channel::Timer1,
                Mode::CompareMatch,
                PinFunction::Unused,
                Technique::BusyWait,
            )
            .unwrap();

        timers.set_period_us(Channel::Timer1, 10_000).unwrap();

        let (mut regs, _) = timers.release();
        assert_eq!(regs.cleared, 1 + 2);
        assert_eq!(regs.read_wide(Reg::OCR1AL), u16::MAX);
        // 80000 counts = 65535 + 14465
        assert_eq!(regs.read_wide(Reg::TCNT1L), 51070);
    }

    #[test]
    fn busy_wait_needs_normal_or_compare_mode() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers
            .configure(
                Channel::Timer0,
                Mode::FastPwm,
                PinFunction::NonInverting,
                Technique::BusyWait,
            )
            .unwrap();

        assert_eq!(
            timers.set_period_us(Channel::Timer0, 100),
            Err(Error::UnsupportedConfiguration)
        );
    }

    #[test]
    fn zero_period_returns_at_once() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers
            .configure(Channel::Timer0, Mode::Normal, PinFunction::Unused, Technique::BusyWait)
            .unwrap();

        // The plain register file never raises a flag.
        assert_eq!(timers.set_period_us(Channel::Timer0, 0), Ok(()));
    }

    #[test]
    fn degenerate_compare_plan() {
        let plan = PeriodPlan {
            total_counts: 0,
            required_overflow_count: 1,
            initial_counter_value: 255,
        };

        assert_eq!(
            Timers::<RegisterFile, PinLog, Clock8>::counted_event(
                Channel::Timer0,
                Mode::CompareMatch,
                &plan
            ),
            Err(Error::UnsupportedConfiguration)
        );
    }

    #[test]
    fn interrupt_technique_arms_and_returns() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers
            .configure(Channel::Timer2, Mode::CompareMatch, PinFunction::Unused, Technique::Interrupt)
            .unwrap();
        timers
            .set_interrupts(Channel::Timer2, InterruptSelection::CompareMatch)
            .unwrap();

        timers.set_period_us(Channel::Timer2, 70).unwrap();

        assert_eq!(timers.registers().peek(Reg::OCR2), 255);
        assert_eq!(timers.registers().peek(Reg::TCNT2), 205);
        // Reconfiguring disables the interrupts again.
        timers
            .configure(Channel::Timer2, Mode::CompareMatch, PinFunction::Unused, Technique::Interrupt)
            .unwrap();
        assert_eq!(timers.registers().peek(Reg::TIMSK), 0);
    }

    static PWM_PERIODS: AtomicU8 = AtomicU8::new(0);

    fn pwm_period() {
        PWM_PERIODS.fetch_add(1, Ordering::SeqCst);
    }

    #[test_log::test]
    fn interrupt_period_on_pwm_keeps_waveform() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers
            .configure(Channel::Timer2, Mode::FastPwm, PinFunction::NonInverting, Technique::Interrupt)
            .unwrap();
        timers.set_duty_cycle(Channel::Timer2, 25).unwrap();
        timers
            .register_callback(Channel::Timer2, Event::Overflow, Some(pwm_period))
            .unwrap();
        timers.registers().poke(Reg::TCNT2, 17);

        timers.set_period_us(Channel::Timer2, 100).unwrap();

        // 800 counts: four overflows per period.
        let plan = timers.period_plan(Channel::Timer2).unwrap();
        assert_eq!(plan.required_overflow_count, 4);
        assert_eq!(timers.registers().peek(Reg::OCR2), 63);
        assert_eq!(timers.registers().peek(Reg::TCNT2), 17);

        for _ in 0..8 {
            registry.dispatch(timers.registers(), Channel::Timer2, Event::Overflow);
        }
        assert_eq!(PWM_PERIODS.load(Ordering::SeqCst), 2);
        assert_eq!(timers.registers().peek(Reg::TCNT2), 17);
        assert_eq!(timers.registers().peek(Reg::OCR2), 63);
    }

    #[test]
    fn stored_pin_function_is_the_requested_one() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers
            .configure(Channel::Timer0, Mode::FastPwm, PinFunction::Inverting, Technique::Interrupt)
            .unwrap();

        let config = timers.config(Channel::Timer0).unwrap();
        assert_eq!(config.pin_function, PinFunction::Inverting);
        assert_eq!(config.com_bits(), PinFunction::Set.com_bits());
        let com = timers.registers().read_field(Channel::Timer0.compare_output());
        assert_eq!(com, config.com_bits());
    }

    #[test]
    fn duty_cycle() {
        let registry = CallbackRegistry::new();
        let mut timers = timers(&registry);
        timers
            .configure(
                Channel::Timer1,
                Mode::PhaseCorrectPwm,
                PinFunction::NonInverting,
                Technique::Interrupt,
            )
            .unwrap();
        timers
            .configure(Channel::Timer0, Mode::Normal, PinFunction::Unused, Technique::BusyWait)
            .unwrap();

        timers.set_duty_cycle(Channel::Timer1, 50).unwrap();
        assert_eq!(timers.registers().read_wide(Reg::OCR1AL), 127);
        assert_eq!(
            timers.set_duty_cycle(Channel::Timer1, 101),
            Err(Error::InvalidValue)
        );
        assert_eq!(
            timers.set_duty_cycle(Channel::Timer0, 50),
            Err(Error::IncompatibleConfiguration)
        );
    }
}
