use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::{
    AffinityError, AffinityInspector, CancellationToken, CoreMask, CorrectionEvent, ProcessEntry,
    ReservationSet, System, exclude, is_critical_process,
};

/// Callback invoked once per successful affinity correction.
///
/// Called synchronously on the thread doing the sweep. Anything slow should be handed off to
/// another thread, or it delays the next sweep.
pub(crate) type CorrectionObserver = Arc<dyn Fn(&CorrectionEvent) + Send + Sync>;

/// What happened during one or more sweeps.
///
/// Every process listed during a sweep is counted in exactly one of the fields.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct SweepSummary {
    /// The current process, placeholder entries and critical processes.
    pub skipped: usize,

    /// Processes whose affinity could not be read.
    pub unreadable: usize,

    /// Processes whose affinity did not touch any reserved core.
    pub compliant: usize,

    /// Processes that were moved off the reserved cores.
    pub corrected: usize,

    /// Processes we were not allowed to move.
    pub denied: usize,

    /// Processes that disappeared or refused the new affinity for another reason.
    pub unavailable: usize,

    /// Processes left alone because every active core is reserved.
    pub no_fallback: usize,
}

impl SweepSummary {
    /// Total number of processes that used a reserved core, whether or not they were moved.
    #[must_use]
    pub fn conflicts(&self) -> usize {
        self.corrected
            .saturating_add(self.denied)
            .saturating_add(self.unavailable)
            .saturating_add(self.no_fallback)
    }

    /// Total number of processes listed.
    #[must_use]
    pub fn listed(&self) -> usize {
        self.skipped
            .saturating_add(self.unreadable)
            .saturating_add(self.compliant)
            .saturating_add(self.conflicts())
    }

    fn count(&mut self, verdict: Verdict) {
        let counter = match verdict {
            Verdict::Skipped => &mut self.skipped,
            Verdict::Unreadable => &mut self.unreadable,
            Verdict::Compliant => &mut self.compliant,
            Verdict::Corrected => &mut self.corrected,
            Verdict::Denied => &mut self.denied,
            Verdict::Unavailable => &mut self.unavailable,
            Verdict::NoFallback => &mut self.no_fallback,
        };

        *counter = counter.saturating_add(1);
    }

    /// Adds the counts of another summary to this one.
    pub fn merge(&mut self, other: &Self) {
        self.skipped = self.skipped.saturating_add(other.skipped);
        self.unreadable = self.unreadable.saturating_add(other.unreadable);
        self.compliant = self.compliant.saturating_add(other.compliant);
        self.corrected = self.corrected.saturating_add(other.corrected);
        self.denied = self.denied.saturating_add(other.denied);
        self.unavailable = self.unavailable.saturating_add(other.unavailable);
        self.no_fallback = self.no_fallback.saturating_add(other.no_fallback);
    }
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} listed, {} corrected, {} denied, {} unavailable, {} without fallback, {} unreadable, {} skipped",
            self.listed(),
            self.corrected,
            self.denied,
            self.unavailable,
            self.no_fallback,
            self.unreadable,
            self.skipped
        )
    }
}

/// The outcome of looking at a single process.
enum Verdict {
    Skipped,
    Unreadable,
    Compliant,
    Corrected,
    Denied,
    Unavailable,
    NoFallback,
}

/// Moves other processes off reserved cores.
///
/// A sweep lists every process once, leaves alone the current process, placeholder entries and
/// critical processes, and moves every other process that may use a reserved core. Failures to
/// inspect or move a single process are counted and never end the sweep.
///
/// # Example
///
/// ```
/// use core_warden::fake::FakeSystemBuilder;
/// use core_warden::{CoreMask, ReservationSet, Sweeper};
///
/// let fake = FakeSystemBuilder::new()
///     .cores(4)
///     .process(100, "worker", CoreMask::from_bits(0b1100))
///     .build();
/// let system = fake.system();
///
/// let reservation = ReservationSet::new(&system, &[3]).unwrap();
/// let summary = Sweeper::new(system).sweep(&reservation);
///
/// assert_eq!(summary.corrected, 1);
/// assert_eq!(fake.affinity_of(100), Some(CoreMask::from_bits(0b0100)));
/// ```
#[derive(Clone)]
pub struct Sweeper {
    system: System,
    inspector: AffinityInspector,
    observer: Option<CorrectionObserver>,
}

impl Sweeper {
    /// Creates a sweeper for the given system.
    #[must_use]
    pub fn new(system: System) -> Self {
        Self {
            inspector: AffinityInspector::new(system.clone()),
            system,
            observer: None,
        }
    }

    /// Registers a callback to invoke after every successful correction, replacing any
    /// previously registered callback.
    #[must_use]
    pub fn on_correction<F>(mut self, observer: F) -> Self
    where
        F: Fn(&CorrectionEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub(crate) fn with_observer(mut self, observer: Option<CorrectionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Performs one sweep over all processes.
    pub fn sweep(&self, reservation: &ReservationSet) -> SweepSummary {
        let active = self.system.active_core_mask();
        let mut summary = SweepSummary::default();

        for process in self.system.processes() {
            summary.count(self.examine(&process, reservation, active));
        }

        debug!(%reservation, %summary, "sweep finished");

        summary
    }

    /// Performs one sweep and reports the result as an info-level log entry.
    pub fn reserve_once(&self, reservation: &ReservationSet) -> SweepSummary {
        let summary = self.sweep(reservation);

        info!(
            %reservation,
            corrected = summary.corrected,
            denied = summary.denied,
            conflicts = summary.conflicts(),
            "reserved cores"
        );

        summary
    }

    /// Sweeps once per `step_interval`, `steps` times in total, unless cancelled first.
    ///
    /// Cancellation is checked before every sweep and interrupts the wait between sweeps.
    /// Returns the combined summary of every sweep performed.
    pub fn protect_for(
        &self,
        reservation: &ReservationSet,
        steps: u32,
        step_interval: Duration,
        cancellation: &CancellationToken,
    ) -> SweepSummary {
        let mut total = SweepSummary::default();

        for step in 0..steps {
            if cancellation.is_cancelled() {
                debug!(step, "timed protection cancelled");
                break;
            }

            total.merge(&self.sweep(reservation));

            // No need to wait after the last sweep.
            if step.saturating_add(1) < steps && cancellation.wait_timeout(step_interval) {
                debug!(step, "timed protection cancelled");
                break;
            }
        }

        info!(%reservation, %total, "timed protection finished");

        total
    }

    fn examine(
        &self,
        process: &ProcessEntry,
        reservation: &ReservationSet,
        active: CoreMask,
    ) -> Verdict {
        let process_id = process.id();
        let process_name = process.name();

        if !self.system.is_foreign_process(process_id) || is_critical_process(process_name) {
            trace!(process_id, process_name, "skipping process");
            return Verdict::Skipped;
        }

        let Ok(current) = self.inspector.affinity(process_id) else {
            trace!(process_id, process_name, "cannot read affinity");
            return Verdict::Unreadable;
        };

        if !current.intersects(reservation.mask()) {
            return Verdict::Compliant;
        }

        let corrected = match exclude(current, reservation.mask(), active) {
            Ok(mask) => mask,
            Err(error) => {
                warn!(process_id, process_name, %error, "cannot move process");
                return Verdict::NoFallback;
            }
        };

        match self.inspector.set_affinity(process_id, corrected) {
            Ok(()) => {
                info!(
                    process_id,
                    process_name,
                    previous_mask = %current,
                    new_mask = %corrected,
                    "moved process off reserved cores"
                );

                if let Some(observer) = &self.observer {
                    observer(&CorrectionEvent::new(process, current, corrected));
                }

                Verdict::Corrected
            }
            Err(AffinityError::InsufficientPrivilege) => {
                debug!(process_id, process_name, "not allowed to move process");
                Verdict::Denied
            }
            Err(_) => {
                debug!(process_id, process_name, "process refused new affinity");
                Verdict::Unavailable
            }
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(std::any::type_name::<Self>())
            .field("system", &self.system)
            .field("has_observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mockall::predicate::eq;
    use parking_lot::Mutex;

    use super::*;
    use crate::fake::FakeSystemBuilder;
    use crate::pal::MockPlatform;

    fn reservation(system: &System, cores: &[u32]) -> ReservationSet {
        ReservationSet::new(system, cores).unwrap()
    }

    #[test]
    fn moves_conflicting_process_and_reports_event() {
        let fake = FakeSystemBuilder::new()
            .cores(4)
            .process(100, "worker", CoreMask::from_bits(0b1100))
            .process(101, "bystander", CoreMask::from_bits(0b0011))
            .build();
        let system = fake.system();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sweeper = Sweeper::new(system.clone()).on_correction({
            let events = Arc::clone(&events);
            move |event| events.lock().push(event.clone())
        });

        let summary = sweeper.sweep(&reservation(&system, &[2, 3]));

        assert_eq!(summary.corrected, 1);
        assert_eq!(summary.compliant, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(fake.affinity_of(100), Some(CoreMask::from_bits(0b0001)));
        assert_eq!(fake.affinity_of(101), Some(CoreMask::from_bits(0b0011)));

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].process_id(), 100);
        assert_eq!(events[0].previous_mask(), CoreMask::from_bits(0b1100));
        assert_eq!(events[0].new_mask(), CoreMask::from_bits(0b0001));
    }

    #[test]
    fn leaves_self_placeholders_and_critical_processes_alone() {
        let mut mock = MockPlatform::new();
        mock.expect_active_core_mask()
            .return_const(CoreMask::from_bits(0b11));
        mock.expect_logical_core_count().return_const(2_u32);
        mock.expect_current_process_id().return_const(50_u32);
        mock.expect_is_placeholder_process()
            .returning(|id| id == 0);
        mock.expect_processes().returning(|| {
            vec![
                ProcessEntry::new(0, "idle"),
                ProcessEntry::new(50, "core_warden"),
                ProcessEntry::new(60, "lsass.exe"),
                ProcessEntry::new(61, "systemd"),
            ]
        });
        // Nothing may even be inspected, let alone changed.
        mock.expect_process_affinity().never();
        mock.expect_set_process_affinity().never();

        let system = System::from_mock(mock);
        let reservation = reservation(&system, &[1]);

        let summary = Sweeper::new(system).sweep(&reservation);

        assert_eq!(summary.skipped, 4);
        assert_eq!(summary.listed(), 4);
    }

    #[test]
    fn counts_every_failure_kind_without_stopping() {
        let fake = FakeSystemBuilder::new()
            .cores(2)
            .unreadable_process(10, "hidden")
            .protected_process(11, "guarded", CoreMask::from_bits(0b10))
            .process(12, "worker", CoreMask::from_bits(0b11))
            .build();
        let system = fake.system();

        let summary = Sweeper::new(system.clone()).sweep(&reservation(&system, &[1]));

        assert_eq!(summary.unreadable, 1);
        assert_eq!(summary.denied, 1);
        assert_eq!(summary.corrected, 1);
        assert_eq!(summary.conflicts(), 2);
        assert_eq!(fake.affinity_of(11), Some(CoreMask::from_bits(0b10)));
        assert_eq!(fake.affinity_of(12), Some(CoreMask::from_bits(0b01)));
    }

    #[test]
    fn process_exiting_mid_sweep_is_unavailable() {
        let mut mock = MockPlatform::new();
        mock.expect_active_core_mask()
            .return_const(CoreMask::from_bits(0b11));
        mock.expect_logical_core_count().return_const(2_u32);
        mock.expect_current_process_id().return_const(50_u32);
        mock.expect_is_placeholder_process().return_const(false);
        mock.expect_processes()
            .returning(|| vec![ProcessEntry::new(7, "ephemeral")]);
        mock.expect_process_affinity()
            .with(eq(7))
            .return_const(Ok(CoreMask::from_bits(0b10)));
        mock.expect_set_process_affinity()
            .with(eq(7), eq(CoreMask::from_bits(0b01)))
            .times(1)
            .return_const(Err(AffinityError::ProcessUnavailable));

        let system = System::from_mock(mock);
        let reservation = reservation(&system, &[1]);

        let summary = Sweeper::new(system).sweep(&reservation);

        assert_eq!(summary.unavailable, 1);
        assert_eq!(summary.corrected, 0);
    }

    #[test]
    fn no_fallback_leaves_process_unchanged() {
        let fake = FakeSystemBuilder::new()
            .cores(2)
            .process(10, "worker", CoreMask::from_bits(0b11))
            .build();
        let system = fake.system();

        let summary = Sweeper::new(system.clone()).sweep(&reservation(&system, &[0, 1]));

        assert_eq!(summary.no_fallback, 1);
        assert_eq!(fake.affinity_of(10), Some(CoreMask::from_bits(0b11)));
        assert_eq!(fake.affinity_writes(10), 0);
    }

    #[test]
    fn protect_for_sweeps_once_per_step() {
        let fake = FakeSystemBuilder::new()
            .cores(4)
            .process(10, "worker", CoreMask::from_bits(0b1000))
            .build();
        let system = fake.system();
        let reservation = reservation(&system, &[3]);

        let corrections = Arc::new(AtomicUsize::new(0));
        let sweeper = Sweeper::new(system).on_correction({
            let corrections = Arc::clone(&corrections);
            move |_| {
                corrections.fetch_add(1, Ordering::Relaxed);
            }
        });

        let summary = sweeper.protect_for(
            &reservation,
            3,
            Duration::ZERO,
            &CancellationToken::new(),
        );

        assert_eq!(fake.listing_count(), 3);
        // Corrected in the first step, compliant afterwards.
        assert_eq!(summary.corrected, 1);
        assert_eq!(corrections.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn protect_for_stops_when_cancelled() {
        let fake = FakeSystemBuilder::new().build();
        let system = fake.system();
        let reservation = reservation(&system, &[3]);

        let token = CancellationToken::new();
        token.cancel();

        let summary = Sweeper::new(system).protect_for(
            &reservation,
            10,
            Duration::from_secs(60),
            &token,
        );

        assert_eq!(fake.listing_count(), 0);
        assert_eq!(summary, SweepSummary::default());
    }

    #[test]
    fn summary_merge_and_display() {
        let mut total = SweepSummary {
            corrected: 1,
            skipped: 2,
            ..SweepSummary::default()
        };

        total.merge(&SweepSummary {
            corrected: 2,
            denied: 1,
            ..SweepSummary::default()
        });

        assert_eq!(total.corrected, 3);
        assert_eq!(total.conflicts(), 4);
        assert_eq!(total.listed(), 6);
        assert_eq!(
            total.to_string(),
            "6 listed, 3 corrected, 1 denied, 0 unavailable, 0 without fallback, 0 unreadable, 2 skipped"
        );
    }
}
