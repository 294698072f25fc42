use crate::{CoreMask, Error, Result};

/// Computes the affinity a process should have so that it no longer uses any reserved core.
///
/// Every reserved core is removed from `current`. If that would leave the process with no cores
/// at all, the process is instead moved to the lowest-numbered active core that is not reserved.
///
/// # Errors
///
/// Returns [`Error::NoFallbackCore`] if the process would be left with no cores and every
/// active core is reserved. The process should then be left as it is.
///
/// # Example
///
/// ```
/// use core_warden::{CoreMask, exclude};
///
/// let active = CoreMask::from_bits(0b1111);
///
/// // Partial overlap: the reserved cores are simply removed.
/// let mask = exclude(CoreMask::from_bits(0b0110), CoreMask::from_bits(0b0100), active);
/// assert_eq!(mask.unwrap(), CoreMask::from_bits(0b0010));
///
/// // Full overlap: the process moves to the lowest free core.
/// let mask = exclude(CoreMask::from_bits(0b1100), CoreMask::from_bits(0b1100), active);
/// assert_eq!(mask.unwrap(), CoreMask::from_bits(0b0001));
/// ```
pub fn exclude(current: CoreMask, reserved: CoreMask, active: CoreMask) -> Result<CoreMask> {
    let remaining = current.difference(reserved);

    if !remaining.is_empty() {
        return Ok(remaining);
    }

    active
        .difference(reserved)
        .lowest()
        .and_then(CoreMask::single)
        .ok_or(Error::NoFallbackCore { reserved })
}
