use std::fmt;

use itertools::Itertools;
use nonempty::NonEmpty;

use crate::inspector::check_core;
use crate::{CoreIndex, CoreMask, Error, Result, System, core_list};

/// The cores under protection, validated against the system topology.
///
/// A reservation always contains at least one core, has no duplicates and keeps the order in
/// which the cores were requested. Validation happens once, when the reservation is created.
/// If cores go offline afterwards, the reservation is not revisited.
///
/// # Example
///
/// ```
/// use core_warden::fake::FakeSystemBuilder;
/// use core_warden::{CoreMask, ReservationSet};
///
/// let system = FakeSystemBuilder::new().cores(8).build().system();
///
/// let reservation = ReservationSet::new(&system, &[7, 6, 7]).unwrap();
///
/// assert_eq!(reservation.cores().len(), 2);
/// assert_eq!(reservation.primary(), 7);
/// assert_eq!(reservation.mask(), CoreMask::from_bits(0b1100_0000));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReservationSet {
    cores: NonEmpty<CoreIndex>,
    mask: CoreMask,
}

impl ReservationSet {
    /// Validates the requested cores against the topology of `system`.
    ///
    /// # Errors
    ///
    /// * [`Error::EmptyReservation`] if no cores are requested.
    /// * [`Error::InvalidCore`] if a core index is not below the logical core count.
    /// * [`Error::InactiveCore`] if a core exists but is not active.
    pub fn new(system: &System, cores: &[CoreIndex]) -> Result<Self> {
        Self::validate(
            cores,
            system.logical_core_count(),
            system.active_core_mask(),
        )
    }

    /// Validates the requested cores against an explicit topology.
    pub fn validate(cores: &[CoreIndex], core_count: u32, active: CoreMask) -> Result<Self> {
        let unique = cores.iter().copied().unique().collect_vec();

        let cores = NonEmpty::from_vec(unique).ok_or(Error::EmptyReservation)?;

        let mut mask = CoreMask::EMPTY;

        for &core in &cores {
            check_core(core, core_count, active)?;
            mask.insert(core);
        }

        Ok(Self { cores, mask })
    }

    /// The reserved cores as a mask.
    #[must_use]
    pub fn mask(&self) -> CoreMask {
        self.mask
    }

    /// The reserved cores, in the order they were requested.
    #[must_use]
    pub fn cores(&self) -> &NonEmpty<CoreIndex> {
        &self.cores
    }

    /// The first requested core.
    #[must_use]
    pub fn primary(&self) -> CoreIndex {
        self.cores.head
    }

    /// Whether the reservation covers the given core.
    #[must_use]
    pub fn contains(&self, core: CoreIndex) -> bool {
        self.mask.contains(core)
    }

    /// The number of reserved cores. Never zero.
    #[must_use]
    #[expect(clippy::len_without_is_empty, reason = "a reservation is never empty")]
    pub fn len(&self) -> usize {
        self.cores.len()
    }
}

impl fmt::Display for ReservationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", core_list::emit(self.mask))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn keeps_request_order_without_duplicates() {
        let reservation = ReservationSet::validate(&[3, 1, 3, 2, 1], 4, CoreMask::first_n(4))
            .unwrap();

        assert_eq!(
            reservation.cores().iter().copied().collect_vec(),
            vec![3, 1, 2]
        );
        assert_eq!(reservation.primary(), 3);
        assert_eq!(reservation.len(), 3);
        assert_eq!(reservation.mask(), CoreMask::from_bits(0b1110));
        assert!(reservation.contains(2));
        assert!(!reservation.contains(0));
        assert_eq!(reservation.to_string(), "1-3");
    }

    #[test]
    fn rejects_empty_request() {
        assert!(matches!(
            ReservationSet::validate(&[], 4, CoreMask::first_n(4)),
            Err(Error::EmptyReservation)
        ));
    }

    #[test]
    fn rejects_core_beyond_count() {
        assert!(matches!(
            ReservationSet::validate(&[0, 8], 8, CoreMask::first_n(8)),
            Err(Error::InvalidCore {
                core: 8,
                core_count: 8
            })
        ));
    }

    #[test]
    fn rejects_inactive_core() {
        let active = CoreMask::from_bits(0b1101);

        let error = ReservationSet::validate(&[1], 4, active).unwrap_err();

        assert!(matches!(error, Error::InactiveCore { core: 1, active: a } if a == active));
    }

    #[test]
    fn validates_against_system() {
        let system = crate::fake::FakeSystemBuilder::new()
            .cores(2)
            .build()
            .system();

        ReservationSet::new(&system, &[1]).unwrap();
        ReservationSet::new(&system, &[2]).unwrap_err();
    }
}
