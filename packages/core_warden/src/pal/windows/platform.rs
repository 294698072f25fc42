use std::io;

use windows::Win32::Foundation::{CloseHandle, ERROR_ACCESS_DENIED, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};
use windows::Win32::System::Threading::{
    ABOVE_NORMAL_PRIORITY_CLASS, BELOW_NORMAL_PRIORITY_CLASS, GetCurrentProcess,
    GetCurrentProcessId, GetProcessAffinityMask, HIGH_PRIORITY_CLASS, IDLE_PRIORITY_CLASS,
    NORMAL_PRIORITY_CLASS, OpenProcess, PROCESS_ACCESS_RIGHTS, PROCESS_CREATION_FLAGS,
    PROCESS_QUERY_INFORMATION, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SET_INFORMATION,
    REALTIME_PRIORITY_CLASS, SetPriorityClass, SetProcessAffinityMask,
};

use crate::pal::Platform;
use crate::{AffinityError, CoreMask, ProcessEntry, ProcessId, ProcessPriority};

/// Singleton instance of `BuildTargetPlatform`, used by public API types to hook up to the
/// correct PAL implementation.
pub(crate) static BUILD_TARGET_PLATFORM: BuildTargetPlatform = BuildTargetPlatform;

// Process ID 0 is the "System Idle Process" and process ID 4 is the "System" process. Neither is
// a real user-mode process whose affinity could be managed.
const PLACEHOLDER_PROCESS_IDS: [ProcessId; 2] = [0, 4];

/// The platform that matches the crate's build target.
///
/// Affinity masks are limited to the processor group of the calling process, which on systems
/// with at most 64 logical processors means every processor.
#[derive(Debug)]
pub(crate) struct BuildTargetPlatform;

impl BuildTargetPlatform {
    fn system_info() -> SYSTEM_INFO {
        let mut info = SYSTEM_INFO::default();

        // SAFETY: No safety requirements beyond passing a valid output pointer.
        unsafe {
            GetSystemInfo(&raw mut info);
        }

        info
    }

    /// Opens a process and hands the handle to `f`, closing it again on every exit path.
    fn with_process<R>(
        process_id: ProcessId,
        access: PROCESS_ACCESS_RIGHTS,
        f: impl FnOnce(HANDLE) -> Result<R, AffinityError>,
    ) -> Result<R, AffinityError> {
        // SAFETY: No safety requirements beyond passing valid arguments.
        let handle = unsafe { OpenProcess(access, false, process_id) }.map_err(|e| {
            if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                AffinityError::InsufficientPrivilege
            } else {
                AffinityError::ProcessUnavailable
            }
        })?;

        let handle = scopeguard::guard(handle, |handle| {
            // SAFETY: The handle was opened above and is closed exactly once, here.
            drop(unsafe { CloseHandle(handle) });
        });

        f(*handle)
    }
}

// Real OS calls are excluded from coverage measurement because they are only exercised by
// integration tests on a real system, where error paths are impractical to trigger.
#[cfg_attr(coverage_nightly, coverage(off))]
impl Platform for BuildTargetPlatform {
    fn logical_core_count(&self) -> u32 {
        Self::system_info().dwNumberOfProcessors
    }

    fn active_core_mask(&self) -> CoreMask {
        CoreMask::from_bits(Self::system_info().dwActiveProcessorMask as u64)
    }

    fn current_process_id(&self) -> ProcessId {
        // SAFETY: No safety requirements.
        unsafe { GetCurrentProcessId() }
    }

    fn is_placeholder_process(&self, process_id: ProcessId) -> bool {
        PLACEHOLDER_PROCESS_IDS.contains(&process_id)
    }

    fn processes(&self) -> Vec<ProcessEntry> {
        // SAFETY: No safety requirements beyond passing valid arguments.
        let Ok(snapshot) = (unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }) else {
            return Vec::new();
        };

        let snapshot = scopeguard::guard(snapshot, |snapshot| {
            // SAFETY: The snapshot handle was created above and is closed exactly once, here.
            drop(unsafe { CloseHandle(snapshot) });
        });

        let mut entry = PROCESSENTRY32W {
            dwSize: u32::try_from(size_of::<PROCESSENTRY32W>())
                .expect("PROCESSENTRY32W is a few hundred bytes"),
            ..Default::default()
        };

        let mut processes = Vec::new();

        // SAFETY: The snapshot handle is valid and `entry` has its size field initialized.
        let mut next = unsafe { Process32FirstW(*snapshot, &raw mut entry) };

        while next.is_ok() {
            processes.push(ProcessEntry::new(
                entry.th32ProcessID,
                exe_file_name(&entry.szExeFile),
            ));

            // SAFETY: The snapshot handle is valid and `entry` has its size field initialized.
            next = unsafe { Process32NextW(*snapshot, &raw mut entry) };
        }

        processes
    }

    fn process_affinity(&self, process_id: ProcessId) -> Result<CoreMask, AffinityError> {
        // Failing to even open the process for reading means we cannot manage it, whatever
        // the reason, so every failure here is reported as unavailability.
        Self::with_process(process_id, PROCESS_QUERY_LIMITED_INFORMATION, |handle| {
            let mut process_mask: usize = 0;
            let mut system_mask: usize = 0;

            // SAFETY: The handle is valid and both output pointers point to live locals.
            unsafe {
                GetProcessAffinityMask(handle, &raw mut process_mask, &raw mut system_mask)
            }
            .map_err(|_| AffinityError::ProcessUnavailable)?;

            Ok(CoreMask::from_bits(process_mask as u64))
        })
        .map_err(|_| AffinityError::ProcessUnavailable)
    }

    fn set_process_affinity(
        &self,
        process_id: ProcessId,
        mask: CoreMask,
    ) -> Result<(), AffinityError> {
        let bits = usize::try_from(mask.bits()).map_err(|_| AffinityError::ProcessUnavailable)?;

        Self::with_process(
            process_id,
            PROCESS_SET_INFORMATION | PROCESS_QUERY_INFORMATION,
            |handle| {
                // SAFETY: The handle is valid and was opened with PROCESS_SET_INFORMATION.
                unsafe { SetProcessAffinityMask(handle, bits) }.map_err(|e| {
                    if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                        AffinityError::InsufficientPrivilege
                    } else {
                        AffinityError::ProcessUnavailable
                    }
                })
            },
        )
    }

    fn set_current_process_priority(&self, priority: ProcessPriority) -> Result<(), io::Error> {
        // SAFETY: The pseudo handle of the current process is always valid and needs no closing.
        unsafe { SetPriorityClass(GetCurrentProcess(), priority_class(priority)) }
            .map_err(io::Error::from)
    }
}

fn priority_class(priority: ProcessPriority) -> PROCESS_CREATION_FLAGS {
    match priority {
        ProcessPriority::Idle => IDLE_PRIORITY_CLASS,
        ProcessPriority::BelowNormal => BELOW_NORMAL_PRIORITY_CLASS,
        ProcessPriority::Normal => NORMAL_PRIORITY_CLASS,
        ProcessPriority::AboveNormal => ABOVE_NORMAL_PRIORITY_CLASS,
        ProcessPriority::High => HIGH_PRIORITY_CLASS,
        ProcessPriority::Realtime => REALTIME_PRIORITY_CLASS,
    }
}

fn exe_file_name(raw: &[u16]) -> String {
    let len = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());

    String::from_utf16_lossy(raw.get(..len).unwrap_or_default())
}
