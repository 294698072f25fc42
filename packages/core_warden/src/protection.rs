use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::{fmt, mem};

use oneshot::RecvTimeoutError;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::sweep::CorrectionObserver;
use crate::{
    CancellationToken, CoreIndex, CorrectionEvent, Error, ProtectionConfig, ReservationSet,
    Result, Sweeper, System,
};

const THREAD_NAME: &str = "core_warden-protection";

/// Whether a [`ProtectionController`] is currently protecting a reservation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ProtectionState {
    /// No protection loop is running.
    Idle,

    /// A protection loop is running for the current reservation.
    Active,
}

/// How a request to stop the protection loop ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum StopOutcome {
    /// There was nothing to stop.
    NotRunning,

    /// The loop observed the request and exited.
    Stopped,

    /// The loop did not exit within the stop timeout. It has been told to stop and will not
    /// start another sweep, but it may still be finishing the current one. The controller no
    /// longer tracks it.
    TimedOut,
}

/// Keeps other processes off a set of reserved cores until told to stop.
///
/// The controller owns at most one background thread. Every
/// [`sweep_interval`][ProtectionConfig::sweep_interval] that thread lists all processes and
/// moves those that may use a reserved core, as [`Sweeper::sweep()`] does.
///
/// Starting and stopping are serialized: a start while protection is active first stops the
/// running loop, so two loops of the same controller never run side by side. Dropping the
/// controller stops the loop.
///
/// # Example
///
/// ```
/// use core_warden::fake::FakeSystemBuilder;
/// use core_warden::{CoreMask, ProtectionController, ProtectionState};
///
/// let fake = FakeSystemBuilder::new()
///     .cores(4)
///     .process(100, "worker", CoreMask::from_bits(0b1100))
///     .build();
///
/// let controller = ProtectionController::builder(fake.system())
///     .on_correction(|event| println!("{event}"))
///     .build();
///
/// controller.start(&[2, 3]).unwrap();
/// assert_eq!(controller.state(), ProtectionState::Active);
///
/// controller.stop();
/// assert_eq!(controller.state(), ProtectionState::Idle);
/// ```
pub struct ProtectionController {
    system: System,
    config: ProtectionConfig,
    observer: Option<CorrectionObserver>,

    state: Mutex<ControllerState>,

    /// Number of loop threads of this controller that have not yet exited, including any
    /// abandoned after a stop timeout.
    live_loops: Arc<AtomicUsize>,
}

enum ControllerState {
    Idle,
    Active(ActiveLoop),
}

struct ActiveLoop {
    reservation: ReservationSet,
    cancellation: CancellationToken,

    /// Completed (or disconnected) when the loop thread exits, for whatever reason.
    exited: oneshot::Receiver<()>,
    thread: JoinHandle<()>,
}

impl ProtectionController {
    /// Creates a controller with the default configuration and no correction observer.
    #[must_use]
    pub fn new(system: System) -> Self {
        Self::builder(system).build()
    }

    /// Starts configuring a controller.
    #[must_use]
    pub fn builder(system: System) -> ProtectionControllerBuilder {
        ProtectionControllerBuilder::new(system)
    }

    /// Starts protecting the given cores, replacing any protection already active.
    ///
    /// The cores are validated before anything else happens. If validation fails, any running
    /// loop keeps running undisturbed.
    ///
    /// # Errors
    ///
    /// * [`Error::EmptyReservation`], [`Error::InvalidCore`] or [`Error::InactiveCore`] if the
    ///   cores do not form a valid reservation.
    /// * [`Error::LoopStartFailed`] if the background thread cannot be created. Any previously
    ///   running loop has been stopped by then, so the controller is left idle.
    pub fn start(&self, cores: &[CoreIndex]) -> Result<()> {
        let reservation = ReservationSet::new(&self.system, cores)?;

        let mut state = self.state.lock();

        if let ControllerState::Active(previous) = mem::replace(&mut *state, ControllerState::Idle)
        {
            debug!(reservation = %previous.reservation, "replacing active protection");
            self.shut_down(previous);
        }

        let cancellation = CancellationToken::new();
        let (exit_tx, exit_rx) = oneshot::channel();

        let sweeper = Sweeper::new(self.system.clone()).with_observer(self.observer.clone());
        let config = self.config.clone();
        let live_loops = Arc::clone(&self.live_loops);
        let loop_reservation = reservation.clone();
        let loop_cancellation = cancellation.clone();

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                live_loops.fetch_add(1, Ordering::AcqRel);

                // Runs even if a sweep panics, so a stop never waits for a dead thread.
                let _exit = scopeguard::guard((), move |()| {
                    live_loops.fetch_sub(1, Ordering::AcqRel);
                    drop(exit_tx.send(()));
                });

                run_loop(&sweeper, &loop_reservation, &config, &loop_cancellation);
            })
            .map_err(Error::LoopStartFailed)?;

        debug!(%reservation, "protection started");

        *state = ControllerState::Active(ActiveLoop {
            reservation,
            cancellation,
            exited: exit_rx,
            thread,
        });

        Ok(())
    }

    /// Stops the protection loop, waiting up to the configured
    /// [`stop_timeout`][ProtectionConfig::stop_timeout] for it to exit.
    ///
    /// The controller is idle afterwards regardless of the outcome.
    pub fn stop(&self) -> StopOutcome {
        let mut state = self.state.lock();

        match mem::replace(&mut *state, ControllerState::Idle) {
            ControllerState::Idle => StopOutcome::NotRunning,
            ControllerState::Active(active) => self.shut_down(active),
        }
    }

    /// Whether a protection loop is running.
    #[must_use]
    pub fn state(&self) -> ProtectionState {
        match *self.state.lock() {
            ControllerState::Idle => ProtectionState::Idle,
            ControllerState::Active(_) => ProtectionState::Active,
        }
    }

    /// The reservation under protection, if any.
    #[must_use]
    pub fn reservation(&self) -> Option<ReservationSet> {
        match &*self.state.lock() {
            ControllerState::Idle => None,
            ControllerState::Active(active) => Some(active.reservation.clone()),
        }
    }

    /// The cancellation token of the running loop, if any.
    ///
    /// Cancelling it makes the loop exit after its current sweep, but the controller stays
    /// [`Active`][ProtectionState::Active] until [`stop()`][Self::stop] or the next
    /// [`start()`][Self::start].
    #[must_use]
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        match &*self.state.lock() {
            ControllerState::Idle => None,
            ControllerState::Active(active) => Some(active.cancellation.clone()),
        }
    }

    /// Number of loop threads started by this controller that have not yet exited.
    ///
    /// This is at most one, except shortly after a stop that timed out.
    #[must_use]
    pub fn live_loops(&self) -> usize {
        self.live_loops.load(Ordering::Acquire)
    }

    /// The configuration the controller was built with.
    #[must_use]
    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    fn shut_down(&self, active: ActiveLoop) -> StopOutcome {
        active.cancellation.cancel();

        match active.exited.recv_timeout(self.config.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if active.thread.join().is_err() {
                    warn!(reservation = %active.reservation, "protection loop panicked");
                }

                debug!(reservation = %active.reservation, "protection stopped");

                StopOutcome::Stopped
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    reservation = %active.reservation,
                    timeout = ?self.config.stop_timeout,
                    "protection loop did not stop in time, abandoning it"
                );

                StopOutcome::TimedOut
            }
        }
    }
}

fn run_loop(
    sweeper: &Sweeper,
    reservation: &ReservationSet,
    config: &ProtectionConfig,
    cancellation: &CancellationToken,
) {
    debug!(%reservation, "protection loop started");

    if !cancellation.wait_timeout(config.first_sweep_delay) {
        loop {
            if cancellation.is_cancelled() {
                break;
            }

            sweeper.sweep(reservation);

            if cancellation.wait_timeout(config.sweep_interval) {
                break;
            }
        }
    }

    debug!(%reservation, "protection loop exiting");
}

impl Drop for ProtectionController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl fmt::Debug for ProtectionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(std::any::type_name::<Self>())
            .field("system", &self.system)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("live_loops", &self.live_loops())
            .finish_non_exhaustive()
    }
}

/// Builder for configuring a [`ProtectionController`].
#[must_use]
pub struct ProtectionControllerBuilder {
    system: System,
    config: ProtectionConfig,
    observer: Option<CorrectionObserver>,
}

impl ProtectionControllerBuilder {
    fn new(system: System) -> Self {
        Self {
            system,
            config: ProtectionConfig::default(),
            observer: None,
        }
    }

    /// Sets the timing of the protection loop.
    pub fn config(mut self, config: ProtectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a callback to invoke on the loop thread after every successful correction.
    ///
    /// The callback delays the next sweep for as long as it runs.
    pub fn on_correction<F>(mut self, observer: F) -> Self
    where
        F: Fn(&CorrectionEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Creates the controller. It starts out idle.
    pub fn build(self) -> ProtectionController {
        ProtectionController {
            system: self.system,
            config: self.config,
            observer: self.observer,
            state: Mutex::new(ControllerState::Idle),
            live_loops: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))] // No API contract to test.
impl fmt::Debug for ProtectionControllerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(std::any::type_name::<Self>())
            .field("system", &self.system)
            .field("config", &self.config)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}
