use nano_fmt::{NanoDisplay, NanoWrite};

/// Errors reported by the timer driver.
///
/// Every check runs before the first register write, so a failed call leaves
/// the hardware untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Error {
    /// Channel identifier is outside the supported set.
    InvalidChannel = 1,
    /// Raw value does not name any variant.
    InvalidValue,
    /// Mode is not implemented for this channel.
    UnsupportedMode,
    /// Value is meaningless for this channel's register layout.
    UnsupportedForChannel,
    /// A reserved placeholder value was used.
    ReservedValue,
    /// Two settings contradict each other.
    IncompatibleConfiguration,
    /// The stored technique is unset, i.e. the channel was never configured.
    InvalidTechnique,
    /// No callback was supplied.
    NullCallback,
    /// CPU clock exceeds what the part is rated for.
    UnsupportedClock,
    /// Prescaler selection is not available here.
    UnsupportedPrescaler,
    /// The configured mode cannot be used for period timing.
    UnsupportedConfiguration,
}

impl Error {
    /// Numeric code, stable across releases.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl NanoDisplay for Error {
    fn fmt<F: NanoWrite>(self, f: &mut F) {
        f.write_byte(b'E');
        self.code().fmt(f);
    }
}
