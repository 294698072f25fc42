//! Reading and writing core lists in the Linux `cpulist` format.
//!
//! This is the format used by `/sys/devices/system/cpu/online`, `taskset --cpu-list` and similar
//! tooling. The value is a comma-separated list of items, where each item is either:
//!
//! * a single core (e.g. `1`)
//! * an inclusive range of cores (e.g. `2-4`)
//! * an inclusive range with a stride (e.g. `5-9:2`, equivalent to `5,7,9`)
//!
//! Whitespace is not allowed inside the list, though a trailing newline (as found in `sysfs`
//! files) is tolerated by [`parse`].
//!
//! ```
//! use core_warden::core_list;
//!
//! let cores = core_list::parse("6-7,2,0-4:2").unwrap();
//! assert_eq!(cores, vec![0, 2, 4, 6, 7]);
//!
//! assert_eq!(core_list::emit(cores), "0,2,4,6-7");
//! ```

use itertools::Itertools;

use crate::{CoreIndex, Error, Result};

/// Largest core index a core list may name.
///
/// Ranges are expanded in memory, so this bounds the size of a parsed list.
pub const MAX_LISTED_CORE: CoreIndex = 65_535;

/// Parses a core list, returning the core indices in ascending order without duplicates.
///
/// An empty string is valid input and returns an empty result.
pub fn parse(core_list: &str) -> Result<Vec<CoreIndex>> {
    let parts = core_list
        .trim_end_matches('\n')
        .split(',')
        .map(parse_part)
        .collect::<Result<Vec<_>>>()?;

    Ok(parts.into_iter().flatten().sorted().dedup().collect())
}

/// Emits the given cores as a compact core list, collapsing consecutive runs into ranges.
///
/// Input order does not matter and duplicates are ignored.
pub fn emit(cores: impl IntoIterator<Item = CoreIndex>) -> String {
    let cores = cores.into_iter().sorted().dedup().collect_vec();

    let mut runs: Vec<(CoreIndex, CoreIndex)> = Vec::new();

    for core in cores {
        match runs.last_mut() {
            Some((_, end)) if end.checked_add(1) == Some(core) => *end = core,
            _ => runs.push((core, core)),
        }
    }

    runs.into_iter()
        .map(|(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{start}-{end}")
            }
        })
        .join(",")
}

fn parse_part(part: &str) -> Result<Vec<CoreIndex>> {
    if part.is_empty() {
        return Ok(vec![]);
    }

    match part.split_once('-') {
        Some((start, rest)) => parse_range(start, rest),
        None => parse_index(part, "not a range and not an integer either").map(|core| vec![core]),
    }
}

fn parse_range(start: &str, rest: &str) -> Result<Vec<CoreIndex>> {
    let start = parse_index(start, "range start is not an integer")?;

    let (end, stride) = match rest.split_once(':') {
        Some((end, stride)) => (
            parse_index(end, "range end is not an integer")?,
            parse_index(stride, "range stride is not an integer")?,
        ),
        None => (parse_index(rest, "range end is not an integer")?, 1),
    };

    if stride == 0 {
        return Err(Error::invalid_core_list(
            stride.to_string(),
            "range stride must not be zero",
        ));
    }

    if start > end {
        return Err(Error::invalid_core_list(
            format!("{start}-{end}"),
            "range start must be <= end",
        ));
    }

    if end > MAX_LISTED_CORE {
        return Err(Error::invalid_core_list(
            format!("{start}-{end}"),
            "range end exceeds the largest supported core index",
        ));
    }

    Ok((start..=end).step_by(stride as usize).collect())
}

fn parse_index(value: &str, problem: &str) -> Result<CoreIndex> {
    value
        .parse::<CoreIndex>()
        .map_err(|_| Error::invalid_core_list(value, problem))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::CoreMask;

    #[test]
    fn parse_smoke_test() {
        assert_eq!(parse("").unwrap(), Vec::<CoreIndex>::new());
        assert_eq!(parse("7").unwrap(), vec![7]);
        assert_eq!(parse("3,1,2").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse("0-3,2-5").unwrap(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(parse("0-10:4").unwrap(), vec![0, 4, 8]);
        assert_eq!(parse("0-0:9").unwrap(), vec![0]);
        assert_eq!(parse("0-63\n").unwrap().len(), 64);
    }

    #[test]
    fn parse_rejects_garbage() {
        parse("x").unwrap_err();
        parse("1-x").unwrap_err();
        parse("x-1").unwrap_err();
        parse("1-4:x").unwrap_err();
        parse("1 ,2").unwrap_err();
        parse("-1").unwrap_err();
    }

    #[test]
    fn parse_rejects_zero_stride_and_reversed_range() {
        let error = parse("1-4:0").unwrap_err();
        assert!(error.to_string().contains("stride must not be zero"));

        let error = parse("4-1").unwrap_err();
        assert!(error.to_string().contains("'4-1'"));
    }

    #[test]
    fn parse_rejects_oversized_range() {
        let error = parse("0-200000000").unwrap_err();
        assert!(error.to_string().contains("'0-200000000'"));

        parse("0-4294967295:4294967295").unwrap_err();
        parse("65535-65536").unwrap_err();

        assert_eq!(parse("0-255").unwrap().len(), 256);
        assert_eq!(parse("65535").unwrap(), vec![65_535]);
    }

    #[test]
    fn emit_collapses_runs() {
        assert_eq!(emit(CoreMask::EMPTY), "");
        assert_eq!(emit([5]), "5");
        assert_eq!(emit([0, 1, 2, 3]), "0-3");
        assert_eq!(emit([7, 6, 0, 2, 3, 3]), "0,2-3,6-7");
        assert_eq!(emit(CoreMask::from_bits(0b1011_0001)), "0,4-5,7");
    }
}
