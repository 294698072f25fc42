#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Reserves processor cores for the current process by steering every other process off them.
//!
//! Operating systems do not offer ordinary processes a way to claim a core for themselves. What
//! they do offer is control over the affinity of other processes: the set of cores each process
//! is allowed to run on. This package repeatedly looks at every process on the system and, if a
//! process may run on a reserved core, narrows its affinity so that it no longer can.
//!
//! # Quick start
//!
//! ```no_run
//! use core_warden::{CoreAllocator, ProtectionController, System};
//!
//! let system = System::current();
//!
//! // The highest-numbered cores tend to be the quietest.
//! let cores = CoreAllocator::new(system.clone()).recommend(2);
//!
//! let controller = ProtectionController::builder(system)
//!     .on_correction(|event| println!("moved {event}"))
//!     .build();
//!
//! controller.start(&cores)?;
//! // ... latency-sensitive work on the reserved cores ...
//! controller.stop();
//! # Ok::<(), core_warden::Error>(())
//! ```
//!
//! # Building blocks
//!
//! * [`CoreMask`] is the set-of-cores type used everywhere.
//! * [`exclude()`] decides the new affinity of a single process. It is a pure function.
//! * [`Sweeper`] applies it once to every process, or a fixed number of times with
//!   [`Sweeper::protect_for()`].
//! * [`ProtectionController`] runs sweeps on a background thread until stopped.
//! * [`CoreAllocator`] and [`AffinityInspector`] answer one-off questions about which cores other
//!   processes use and let the current process bind itself to cores.
//!
//! # What is left alone
//!
//! The current process, idle and kernel placeholder entries and the processes named in
//! [`CRITICAL_PROCESS_NAMES`] are never inspected or changed. Processes that cannot be opened or
//! that refuse the change are skipped until the next sweep. A process that uses only reserved
//! cores is moved to the lowest-numbered active core that is not reserved.
//!
//! # Limitations
//!
//! * Protection is best-effort. A process can be scheduled onto a reserved core between sweeps,
//!   for example by changing its own affinity.
//! * Only the first 64 cores ([`MAX_CORES`]) can be reserved or reported.
//! * Critical processes are recognized by executable name only.
//! * Changing the affinity of processes owned by other users usually requires elevated
//!   privileges. Without them, such processes are counted as denied and left alone.
//!
//! # Platform support
//!
//! Linux and Windows are supported. On other platforms only the current process is visible, so
//! there is never anything to correct.
//!
//! # Testing
//!
//! With the `test-util` feature, the [`fake`] module provides an in-memory system with a
//! configurable topology and process table. Accept a [`System`] instead of calling
//! [`System::current()`] to make your code testable with it.

mod allocator;
mod cancellation;
mod config;
mod core_mask;
mod error;
mod exclusion;
mod inspector;
mod pal;
mod primitive_types;
mod priority;
mod process;
mod protection;
mod reservation;
mod sweep;
mod system;

pub mod core_list;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use allocator::*;
pub use cancellation::*;
pub use config::*;
pub use core_mask::*;
pub use error::*;
pub use exclusion::*;
pub use inspector::*;
pub use primitive_types::*;
pub use priority::*;
pub use process::*;
pub use protection::*;
pub use reservation::*;
pub use sweep::*;
pub use system::*;
