use std::str::FromStr;

use derive_more::Display;

use crate::Error;

/// Scheduling priority of the current process, from lowest to highest.
///
/// On Windows each level is a process priority class. On Linux each level is a nice value
/// applied to every thread of the process:
///
/// | Level | Windows | Linux nice |
/// |---|---|---|
/// | `Idle` | `IDLE_PRIORITY_CLASS` | 19 |
/// | `BelowNormal` | `BELOW_NORMAL_PRIORITY_CLASS` | 10 |
/// | `Normal` | `NORMAL_PRIORITY_CLASS` | 0 |
/// | `AboveNormal` | `ABOVE_NORMAL_PRIORITY_CLASS` | -5 |
/// | `High` | `HIGH_PRIORITY_CLASS` | -10 |
/// | `Realtime` | `REALTIME_PRIORITY_CLASS` | -20 |
///
/// Levels above `Normal` usually require elevated privileges. `Realtime` on Linux is only the
/// lowest nice value, not a real-time scheduling policy.
///
/// # Example
///
/// ```
/// use core_warden::ProcessPriority;
///
/// let priority: ProcessPriority = "above-normal".parse().unwrap();
///
/// assert_eq!(priority, ProcessPriority::AboveNormal);
/// assert_eq!(priority.to_string(), "above-normal");
/// assert!(priority > ProcessPriority::Normal);
/// ```
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum ProcessPriority {
    /// Runs only when nothing else wants the processor.
    #[display("idle")]
    Idle,

    /// Below the default.
    #[display("below-normal")]
    BelowNormal,

    /// The default priority of new processes.
    #[default]
    #[display("normal")]
    Normal,

    /// Above the default.
    #[display("above-normal")]
    AboveNormal,

    /// For time-critical work.
    #[display("high")]
    High,

    /// The highest priority the operating system offers to processes.
    #[display("realtime")]
    Realtime,
}

impl ProcessPriority {
    /// Every level, from lowest to highest.
    pub const ALL: [Self; 6] = [
        Self::Idle,
        Self::BelowNormal,
        Self::Normal,
        Self::AboveNormal,
        Self::High,
        Self::Realtime,
    ];

    /// The Linux nice value that corresponds to this level.
    #[must_use]
    pub const fn nice_value(self) -> i32 {
        match self {
            Self::Idle => 19,
            Self::BelowNormal => 10,
            Self::Normal => 0,
            Self::AboveNormal => -5,
            Self::High => -10,
            Self::Realtime => -20,
        }
    }
}

impl FromStr for ProcessPriority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|priority| priority.to_string().eq_ignore_ascii_case(value))
            .ok_or_else(|| Error::InvalidPriority(value.to_string()))
    }
}
