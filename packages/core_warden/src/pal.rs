//! Platform Abstraction Layer (PAL). Everything the crate needs from the operating system (the
//! topology query and the process directory) goes through the `Platform` trait defined here.

mod abstractions;
pub(crate) use abstractions::*;

mod facade;
pub(crate) use facade::*;

#[cfg(all(target_os = "linux", not(miri)))]
mod linux;
#[cfg(all(target_os = "linux", not(miri)))]
pub(crate) use linux::*;

#[cfg(all(windows, not(miri)))]
mod windows;
#[cfg(all(windows, not(miri)))]
pub(crate) use windows::*;

// The fallback module is compiled in test mode on all platforms so it can be tested everywhere,
// but it is only glob-imported when it is the primary implementation. On supported platforms in
// test mode, it must be accessed via the explicit path `fallback::`.
#[cfg(any(test, miri, not(any(target_os = "linux", windows))))]
pub(crate) mod fallback;

#[cfg(any(miri, not(any(target_os = "linux", windows))))]
pub(crate) use fallback::*;
