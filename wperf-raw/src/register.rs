//! Generic register abstractions for type-safe system-register programming

/// Trait for register layouts that can be converted to/from raw system-register values
///
/// This trait provides type-safe conversion between structured register
/// layouts and the raw 64-bit values that are written to/read from PMU,
/// DSU, DMC or SPE registers.
///
/// # Example
///
/// ```ignore
/// use wperf_raw::register::RegisterLayout;
///
/// #[derive(Debug, Default)]
/// struct EventTypeSelector {
///     event_code: u16,
///     filter_bits: u64,
/// }
///
/// impl RegisterLayout for EventTypeSelector {
///     fn to_bits(&self) -> u64 {
///         (self.event_code as u64) | (self.filter_bits & !0xFFFF)
///     }
///
///     fn from_bits(value: u64) -> Self {
///         Self {
///             event_code: (value & 0xFFFF) as u16,
///             filter_bits: value & !0xFFFF,
///         }
///     }
/// }
/// ```
pub trait RegisterLayout: Sized {
    /// Convert this register layout to a raw value
    fn to_bits(&self) -> u64;

    /// Parse a raw register value into this layout
    fn from_bits(value: u64) -> Self;

    /// Validate that the register values are within acceptable ranges
    ///
    /// Returns `Ok(())` if valid, or an error message if invalid.
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

/// A hardware register with address and typed layout
///
/// This struct combines a system-register index (or MMIO offset for DMC)
/// with a typed register layout, providing a convenient abstraction for
/// working with specific registers.
///
/// # Example
///
/// ```ignore
/// use wperf_raw::register::Register;
///
/// let reg = Register::new(0, EventTypeSelector {
///     event_code: 0x08,
///     filter_bits: 0,
/// });
///
/// let value = reg.layout.to_bits();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Register<T: RegisterLayout> {
    /// Register index or MMIO byte offset
    pub address: u64,
    /// Typed register layout
    pub layout: T,
}

impl<T: RegisterLayout> Register<T> {
    /// Create a new register with the given address and layout
    pub fn new(address: u64, layout: T) -> Self {
        Self { address, layout }
    }

    /// Create a register with default layout
    pub fn with_address(address: u64) -> Self
    where
        T: Default,
    {
        Self {
            address,
            layout: T::default(),
        }
    }

    /// Validate the register layout
    pub fn validate(&self) -> Result<(), &'static str> {
        self.layout.validate()
    }

    /// Get the raw value for this register
    pub fn to_bits(&self) -> u64 {
        self.layout.to_bits()
    }

    /// Update the layout from a raw register value
    pub fn update_from_bits(&mut self, value: u64) {
        self.layout = T::from_bits(value);
    }
}
