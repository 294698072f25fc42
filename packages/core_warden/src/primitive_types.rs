/// Identifies a logical processor core.
///
/// This matches the numeric identifier used by standard tooling of the operating system
/// (`taskset` on Linux, Task Manager affinity on Windows).
pub type CoreIndex = u32;

/// Identifies a process, as reported by the operating system.
pub type ProcessId = u32;

/// The number of cores a single [`CoreMask`][crate::CoreMask] can describe.
///
/// Systems with more logical processors are only partially visible: cores at index
/// `MAX_CORES` and above are never reserved, never offered as fallback and never reported.
pub const MAX_CORES: CoreIndex = 64;
