use std::io;

use thiserror::Error;

use crate::{CoreIndex, CoreMask, ProcessId, ProcessPriority};

/// Why a single process could not be inspected or adjusted.
///
/// These failures are expected during normal operation (processes exit, some are protected by
/// the operating system) and never abort a sweep. The affected process is skipped until the
/// next sweep.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum AffinityError {
    /// The process has exited or could not be opened for inspection.
    #[error("process is unavailable (exited or inaccessible)")]
    ProcessUnavailable,

    /// The process exists but the current process is not allowed to change its affinity.
    #[error("insufficient privilege to change process affinity")]
    InsufficientPrivilege,
}

/// Errors that can occur when reserving cores or managing protection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Removing the reserved cores would leave a process with no cores and every active core is
    /// reserved, so there is no safe substitute to move the process to.
    #[error("no fallback core: every active core is reserved ({reserved})")]
    NoFallbackCore {
        /// The reserved cores that left no room for a fallback.
        reserved: CoreMask,
    },

    /// A reservation was requested with an empty list of cores.
    #[error("a reservation must contain at least one core")]
    EmptyReservation,

    /// A core index is outside the range of logical cores the system reports.
    #[error("core {core} does not exist: the system has {core_count} logical cores")]
    InvalidCore {
        /// The offending core index.
        core: CoreIndex,

        /// The number of logical cores the system reports.
        core_count: u32,
    },

    /// A core index exists but the core is not currently active.
    #[error("core {core} is not active (active cores: {active})")]
    InactiveCore {
        /// The offending core index.
        core: CoreIndex,

        /// The active core mask at the time of the check.
        active: CoreMask,
    },

    /// The system reports no active cores, so there is nothing to bind to.
    #[error("the system reports no active cores")]
    NoActiveCores,

    /// The background protection thread could not be created.
    #[error("failed to start the protection loop")]
    LoopStartFailed(#[source] io::Error),

    /// Reading or changing the affinity of a specific process failed.
    #[error("process {process_id}: {source}")]
    Affinity {
        /// The process that could not be inspected or adjusted.
        process_id: ProcessId,

        /// What went wrong.
        #[source]
        source: AffinityError,
    },

    /// A core list string did not match the cpulist format.
    #[error("invalid core list: '{invalid_value}' is invalid: {problem}")]
    InvalidCoreList {
        /// The entire core list or the specific part of it that was invalid.
        invalid_value: String,

        /// A human-readable description of the problem.
        problem: String,
    },

    /// A priority name was not recognized.
    #[error("unknown priority '{0}': expected idle, below-normal, normal, above-normal, high or realtime")]
    InvalidPriority(String),

    /// The priority of the current process could not be changed.
    #[error("failed to set process priority to {priority}")]
    PriorityChangeFailed {
        /// The priority that was requested.
        priority: ProcessPriority,

        /// The operating system error.
        #[source]
        source: io::Error,
    },

    /// A configuration file could not be understood.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn invalid_core_list(invalid_value: impl Into<String>, problem: &str) -> Self {
        Self::InvalidCoreList {
            invalid_value: invalid_value.into(),
            problem: problem.to_string(),
        }
    }
}

/// A specialized `Result` type for `core_warden` operations, returning the crate's [`Error`]
/// type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
