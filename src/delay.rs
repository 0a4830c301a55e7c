use embedded_hal::delay::DelayNs;

use crate::{
    Channel, ChannelId, ClockConfig, Error, Mode, PeriodPlan, Technique, Timers,
    gpio::Gpio,
    regs::RegisterAccess,
};

/// Delay implementation that busy waits on a timer channel.
pub struct BusyWaitDelay<'t, 'a, R, G, C> {
    timers: &'t mut Timers<'a, R, G, C>,
    channel: Channel,
}

impl<'t, 'a, R, G, C> BusyWaitDelay<'t, 'a, R, G, C>
where
    R: RegisterAccess,
    G: Gpio,
    C: ClockConfig,
{
    /// Borrow a busy waiting channel for delays. Start the channel before
    /// delaying, a stopped one never finishes.
    ///
    /// Everything a period request could fail on is checked here, so the
    /// delays themselves cannot fail.
    pub fn new(timers: &'t mut Timers<'a, R, G, C>, id: impl ChannelId) -> Result<Self, Error> {
        let channel = id.channel()?;
        PeriodPlan::new::<C>(channel, 0)?;

        let config = timers.config(channel)?;
        if config.technique != Technique::BusyWait {
            return Err(Error::IncompatibleConfiguration);
        }
        if !matches!(config.mode, Mode::Normal | Mode::CompareMatch) {
            return Err(Error::UnsupportedConfiguration);
        }

        Ok(Self { timers, channel })
    }

    fn wait_us(&mut self, mut us: u32) {
        while us > 0 {
            let chunk = us.min(u32::from(u16::MAX));
            // Clock, technique and mode were checked in `new` and cannot
            // change while the timers are borrowed, so this cannot fail.
            let result = self.timers.set_period_us(self.channel, chunk as u16);
            debug_assert!(result.is_ok());
            us -= chunk;
        }
    }
}

impl<R, G, C> DelayNs for BusyWaitDelay<'_, '_, R, G, C>
where
    R: RegisterAccess,
    G: Gpio,
    C: ClockConfig,
{
    fn delay_ns(&mut self, ns: u32) {
        self.wait_us(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        self.wait_us(us);
    }

    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.wait_us(1000);
        }
    }
}
