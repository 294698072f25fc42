//! Fake system implementation for testing.
//!
//! A fake system has a configurable processor topology and an in-memory process table. It lets
//! tests drive the reservation engine deterministically, including processes that exit, refuse
//! affinity changes or cannot be inspected at all.
//!
//! Only available when the `test-util` feature is enabled.
//!
//! # Basic usage
//!
//! ```
//! use core_warden::fake::FakeSystemBuilder;
//! use core_warden::{CoreAllocator, CoreMask};
//!
//! let fake = FakeSystemBuilder::new()
//!     .cores(4)
//!     .process(100, "worker", CoreMask::from_bits(0b0011))
//!     .build();
//!
//! let allocator = CoreAllocator::new(fake.system());
//!
//! assert_eq!(allocator.available_cores(), CoreMask::from_bits(0b1100));
//! ```
//!
//! # Designing testable code
//!
//! Accept a [`System`] as a parameter instead of always calling [`System::current()`]. Tests
//! can then substitute a fake system while production code uses the real one.
//!
//! # Isolation
//!
//! Each fake system is independent, so multiple fakes can coexist in parallel tests without
//! interference.

mod platform;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

pub(crate) use platform::FakePlatform;
use platform::{FakeProcess, FakeState};

use crate::{CoreMask, ProcessId, ProcessPriority, System};

const DEFAULT_CORE_COUNT: u32 = 8;
const DEFAULT_CURRENT_PROCESS_ID: ProcessId = 1000;
const DEFAULT_CURRENT_PROCESS_NAME: &str = "core_warden";

/// Builder for configuring a fake system.
///
/// By default the system has 8 active cores and contains only the current process (ID 1000),
/// which is allowed on every active core.
///
/// Adding two processes with the same ID will cause a panic when building the system.
///
/// # Example
///
/// ```
/// use core_warden::CoreMask;
/// use core_warden::fake::FakeSystemBuilder;
///
/// let fake = FakeSystemBuilder::new()
///     .cores(4)
///     .active_mask(CoreMask::from_bits(0b0111))
///     .current_process(50, "owner")
///     .placeholder(0, "idle")
///     .process(100, "worker", CoreMask::from_bits(0b0011))
///     .protected_process(200, "antivirus", CoreMask::from_bits(0b0111))
///     .unreadable_process(300, "secret")
///     .build();
///
/// assert_eq!(fake.affinity_of(100), Some(CoreMask::from_bits(0b0011)));
/// ```
#[derive(Clone, Debug)]
pub struct FakeSystemBuilder {
    core_count: u32,
    active: Option<CoreMask>,
    current_process: (ProcessId, String),
    placeholders: Vec<ProcessId>,
    processes: Vec<(ProcessId, FakeProcess)>,
    listing_delay: Duration,
    max_priority: ProcessPriority,
}

impl Default for FakeSystemBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSystemBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core_count: DEFAULT_CORE_COUNT,
            active: None,
            current_process: (
                DEFAULT_CURRENT_PROCESS_ID,
                DEFAULT_CURRENT_PROCESS_NAME.to_string(),
            ),
            placeholders: Vec::new(),
            processes: Vec::new(),
            listing_delay: Duration::ZERO,
            max_priority: ProcessPriority::Realtime,
        }
    }

    /// Sets the number of logical cores. Unless overridden with
    /// [`active_mask()`][Self::active_mask], all of them are active.
    #[must_use]
    pub fn cores(mut self, count: u32) -> Self {
        self.core_count = count;
        self
    }

    /// Sets which cores are active. Cores outside the logical core count are ignored.
    #[must_use]
    pub fn active_mask(mut self, mask: CoreMask) -> Self {
        self.active = Some(mask);
        self
    }

    /// Sets the ID and name of the process the engine runs in.
    #[must_use]
    pub fn current_process(mut self, id: ProcessId, name: impl Into<String>) -> Self {
        self.current_process = (id, name.into());
        self
    }

    /// Adds an ordinary process allowed on the given cores.
    #[must_use]
    pub fn process(mut self, id: ProcessId, name: impl Into<String>, affinity: CoreMask) -> Self {
        self.processes.push((id, FakeProcess::new(name, affinity)));
        self
    }

    /// Adds a process whose affinity can be read but not changed, as if owned by a more
    /// privileged user.
    #[must_use]
    pub fn protected_process(
        mut self,
        id: ProcessId,
        name: impl Into<String>,
        affinity: CoreMask,
    ) -> Self {
        let mut process = FakeProcess::new(name, affinity);
        process.writable = false;

        self.processes.push((id, process));
        self
    }

    /// Adds a process that is listed but cannot be opened for inspection or modification.
    #[must_use]
    pub fn unreadable_process(mut self, id: ProcessId, name: impl Into<String>) -> Self {
        let mut process = FakeProcess::new(name, CoreMask::EMPTY);
        process.readable = false;
        process.writable = false;

        self.processes.push((id, process));
        self
    }

    /// Adds an idle or kernel placeholder entry, allowed on every core.
    #[must_use]
    pub fn placeholder(mut self, id: ProcessId, name: impl Into<String>) -> Self {
        self.placeholders.push(id);
        self.processes
            .push((id, FakeProcess::new(name, CoreMask::from_bits(u64::MAX))));
        self
    }

    /// Makes every process listing take at least this long, simulating an expensive
    /// enumeration.
    #[must_use]
    pub fn listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    /// Limits how high the current process may raise its priority. Higher requests fail with
    /// [`PermissionDenied`][std::io::ErrorKind::PermissionDenied]. By default every level is
    /// allowed.
    #[must_use]
    pub fn max_priority(mut self, priority: ProcessPriority) -> Self {
        self.max_priority = priority;
        self
    }

    /// Builds the fake system.
    ///
    /// # Panics
    ///
    /// Panics if two processes share an ID.
    #[must_use]
    pub fn build(self) -> FakeSystem {
        let active = self
            .active
            .unwrap_or(CoreMask::from_bits(u64::MAX))
            & CoreMask::first_n(self.core_count);

        let mut state = FakeState::default();

        let (current_id, current_name) = self.current_process;
        state
            .processes
            .insert(current_id, FakeProcess::new(current_name, active));

        for (id, process) in self.processes {
            assert!(
                state.processes.insert(id, process).is_none(),
                "fake system already contains a process with ID {id}"
            );
        }

        FakeSystem {
            platform: Arc::new(FakePlatform {
                core_count: self.core_count,
                active,
                current_process_id: current_id,
                placeholders: self.placeholders,
                listing_delay: self.listing_delay,
                max_priority: self.max_priority,
                state: Mutex::new(state),
            }),
        }
    }
}

/// Handle to a fake system, used both to obtain a [`System`] for the code under test and to
/// inspect or change the fake process table.
///
/// Clones are equivalent and refer to the same fake system.
#[derive(Clone, Debug)]
pub struct FakeSystem {
    platform: Arc<FakePlatform>,
}

impl FakeSystem {
    /// Returns a [`System`] backed by this fake.
    #[must_use]
    pub fn system(&self) -> System {
        System::fake(self)
    }

    pub(crate) fn platform(&self) -> Arc<FakePlatform> {
        Arc::clone(&self.platform)
    }

    /// The current affinity of a process, or `None` if no such process exists.
    #[must_use]
    pub fn affinity_of(&self, id: ProcessId) -> Option<CoreMask> {
        self.platform
            .state
            .lock()
            .processes
            .get(&id)
            .map(|p| p.affinity)
    }

    /// Changes the affinity of a process behind the engine's back, as the process itself or
    /// another tool might.
    ///
    /// # Panics
    ///
    /// Panics if no such process exists.
    pub fn set_affinity_of(&self, id: ProcessId, affinity: CoreMask) {
        let mut state = self.platform.state.lock();
        let process = state
            .processes
            .get_mut(&id)
            .unwrap_or_else(|| panic!("fake system has no process with ID {id}"));

        process.affinity = affinity;
    }

    /// Adds a new process to the table.
    ///
    /// # Panics
    ///
    /// Panics if a process with this ID already exists.
    pub fn spawn(&self, id: ProcessId, name: impl Into<String>, affinity: CoreMask) {
        let mut state = self.platform.state.lock();

        assert!(
            state
                .processes
                .insert(id, FakeProcess::new(name, affinity))
                .is_none(),
            "fake system already contains a process with ID {id}"
        );
    }

    /// Removes a process from the table. Does nothing if it does not exist.
    pub fn exit(&self, id: ProcessId) {
        self.platform.state.lock().processes.remove(&id);
    }

    /// How many times the engine has successfully changed the affinity of a process.
    #[must_use]
    pub fn affinity_writes(&self, id: ProcessId) -> usize {
        self.platform
            .state
            .lock()
            .processes
            .get(&id)
            .map_or(0, |p| p.affinity_writes)
    }

    /// How many successful affinity changes the engine has made across all processes.
    #[must_use]
    pub fn total_affinity_writes(&self) -> usize {
        self.platform
            .state
            .lock()
            .processes
            .values()
            .map(|p| p.affinity_writes)
            .sum()
    }

    /// The priority of the current process. New fake systems start at
    /// [`Normal`][ProcessPriority::Normal].
    #[must_use]
    pub fn priority(&self) -> ProcessPriority {
        self.platform.state.lock().priority
    }

    /// How many times the process list has been requested.
    #[must_use]
    pub fn listing_count(&self) -> usize {
        self.platform.state.lock().listings
    }
}
