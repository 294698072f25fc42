#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))]

//! Command-line front end for reserving processor cores.
//!
//! All printing happens here. The library itself only logs via `tracing`.

use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use argh::FromArgs;
use core_warden::{
    AffinityInspector, CancellationToken, ConfigFile, CoreAllocator, CoreIndex, Error,
    ProcessPriority, ProtectionConfig, ProtectionController, ReservationSet, SweepSummary,
    Sweeper, System, core_list,
};
use tracing_subscriber::EnvFilter;

/// Reserve processor cores for this process by moving other processes off them.
#[derive(Debug, FromArgs)]
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Info(InfoArgs),
    Recommend(RecommendArgs),
    Available(AvailableArgs),
    Reserve(ReserveArgs),
    Protect(ProtectArgs),
    Bind(BindArgs),
    AutoBind(AutoBindArgs),
    Priority(PriorityArgs),
}

/// Show the processor topology and the affinity of this process.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "info")]
struct InfoArgs {
    /// also list the affinity of every other process that can be inspected
    #[argh(switch)]
    processes: bool,
}

/// Suggest which cores to reserve, highest-numbered first.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "recommend")]
struct RecommendArgs {
    /// how many cores to suggest
    #[argh(option, default = "1")]
    count: u32,
}

/// Show the active cores that no other process may run on.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "available")]
struct AvailableArgs {
    /// keep printing the available cores once per second for this many seconds
    #[argh(option)]
    watch: Option<u64>,
}

/// Move every other process off the given cores once.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "reserve")]
struct ReserveArgs {
    /// cores to reserve, as a core list (e.g. "6-7")
    #[argh(option, from_str_fn(parse_cores))]
    cores: CoreListArg,
}

/// Keep every other process off the given cores until stopped.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "protect")]
struct ProtectArgs {
    /// cores to reserve, as a core list (e.g. "6-7"); overrides the configuration file
    #[argh(option, from_str_fn(parse_cores))]
    cores: Option<CoreListArg>,

    /// protect for this many seconds, then exit; without it, protect until a line (or end of
    /// input) is read from stdin
    #[argh(option)]
    duration: Option<u64>,

    /// path to a TOML configuration file
    #[argh(option)]
    config: Option<PathBuf>,
}

/// Bind this process to the given cores.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "bind")]
struct BindArgs {
    /// cores to bind to, as a core list (e.g. "6-7")
    #[argh(option, from_str_fn(parse_cores))]
    cores: CoreListArg,
}

/// Bind this process to the cores no other process uses, or the highest core if none.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "auto-bind")]
struct AutoBindArgs {}

/// Change the scheduling priority of this process.
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "priority")]
struct PriorityArgs {
    /// one of idle, below-normal, normal, above-normal, high or realtime
    #[argh(positional)]
    level: ProcessPriority,
}

/// A core list given on the command line. Wrapped so argh treats it as a single value.
#[derive(Debug, Eq, PartialEq)]
struct CoreListArg(Vec<CoreIndex>);

fn parse_cores(value: &str) -> Result<CoreListArg, String> {
    core_list::parse(value)
        .map(CoreListArg)
        .map_err(|e| e.to_string())
}

// Only reachable by spawning the binary, which the tests do not do.
#[cfg_attr(test, mutants::skip)]
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args: Args = argh::from_env();

    match run(args.command, &System::current()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, system: &System) -> Result<(), Error> {
    match command {
        Command::Info(args) => info(system, args.processes),
        Command::Recommend(args) => {
            let cores = CoreAllocator::new(system.clone()).recommend(args.count);
            println!("{}", core_list::emit(cores.iter().copied()));
            Ok(())
        }
        Command::Available(args) => {
            available(system, args.watch.map(Duration::from_secs));
            Ok(())
        }
        Command::Reserve(args) => {
            let reservation = ReservationSet::new(system, &args.cores.0)?;
            let summary = Sweeper::new(system.clone()).reserve_once(&reservation);
            report(&summary);
            Ok(())
        }
        Command::Protect(args) => protect(system, args),
        Command::Bind(args) => {
            let mask = AffinityInspector::new(system.clone()).bind_current_process(&args.cores.0)?;
            println!("bound to {}", core_list::emit(mask));
            Ok(())
        }
        Command::AutoBind(_) => {
            let mask = CoreAllocator::new(system.clone()).bind_current_process_to_available()?;
            println!("bound to {}", core_list::emit(mask));
            Ok(())
        }
        Command::Priority(args) => {
            AffinityInspector::new(system.clone()).set_current_process_priority(args.level)?;
            println!("priority set to {}", args.level);
            Ok(())
        }
    }
}

fn available(system: &System, watch: Option<Duration>) {
    let allocator = CoreAllocator::new(system.clone());

    let Some(duration) = watch else {
        println!("{}", core_list::emit(allocator.available_cores()));
        return;
    };

    let interval = ProtectionConfig::default().step_interval;

    allocator.watch_available(
        steps_within(duration, interval),
        interval,
        &CancellationToken::new(),
        |available| println!("{}", core_list::emit(available)),
    );
}

/// How many steps of `interval` cover `duration`. Always at least one.
fn steps_within(duration: Duration, interval: Duration) -> u32 {
    let interval_millis = interval.as_millis().max(1);

    u32::try_from(duration.as_millis().div_ceil(interval_millis))
        .unwrap_or(u32::MAX)
        .max(1)
}

fn info(system: &System, list_processes: bool) -> Result<(), Error> {
    let inspector = AffinityInspector::new(system.clone());

    println!("logical cores: {}", system.logical_core_count());
    println!("active cores:  {}", core_list::emit(system.active_core_mask()));
    println!(
        "own affinity:  {}",
        core_list::emit(inspector.current_process_affinity()?)
    );

    if list_processes {
        let names = system
            .processes()
            .into_iter()
            .map(|p| (p.id(), p.name().to_string()))
            .collect::<BTreeMap<_, _>>();

        for (process_id, mask) in inspector.process_affinities() {
            let name = names.get(&process_id).map_or("?", String::as_str);
            println!("{process_id:>8} {:<24} {}", name, core_list::emit(mask));
        }
    }

    Ok(())
}

fn protect(system: &System, args: ProtectArgs) -> Result<(), Error> {
    let file = args
        .config
        .as_deref()
        .map(ConfigFile::load)
        .transpose()?
        .unwrap_or_default();

    let cores = args
        .cores
        .map(|cores| cores.0)
        .or_else(|| file.cores().map(<[CoreIndex]>::to_vec))
        .unwrap_or_default();

    let config = file.protection().clone();

    match args.duration {
        Some(seconds) => protect_for(system, &cores, &config, Duration::from_secs(seconds)),
        None => protect_until_input(system, &cores, config),
    }
}

fn protect_for(
    system: &System,
    cores: &[CoreIndex],
    config: &ProtectionConfig,
    duration: Duration,
) -> Result<(), Error> {
    let reservation = ReservationSet::new(system, cores)?;

    let summary = Sweeper::new(system.clone()).protect_for(
        &reservation,
        steps_within(duration, config.step_interval),
        config.step_interval,
        &CancellationToken::new(),
    );

    report(&summary);
    Ok(())
}

fn protect_until_input(
    system: &System,
    cores: &[CoreIndex],
    config: ProtectionConfig,
) -> Result<(), Error> {
    let controller = ProtectionController::builder(system.clone())
        .config(config)
        .on_correction(|event| println!("moved {event}"))
        .build();

    controller.start(cores)?;

    eprintln!("protecting cores; press Enter to stop");

    // Any outcome, including a read error, ends protection.
    let mut line = String::new();
    drop(io::stdin().lock().read_line(&mut line));

    let outcome = controller.stop();
    eprintln!("protection ended: {outcome:?}");

    Ok(())
}

fn report(summary: &SweepSummary) {
    println!("{summary}");

    if summary.denied > 0 {
        eprintln!(
            "some processes could not be moved for lack of privilege; run as administrator or root to move them"
        );
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use core_warden::CoreMask;
    use core_warden::fake::FakeSystemBuilder;

    use super::*;

    #[test]
    fn parse_cores_reports_core_list_errors() {
        assert_eq!(parse_cores("1,3-4"), Ok(CoreListArg(vec![1, 3, 4])));
        assert!(parse_cores("4-1").unwrap_err().contains("4-1"));
    }

    #[test]
    fn args_parse_subcommands() {
        let args = Args::from_args(
            &["core_warden"],
            &["protect", "--cores", "2-3", "--duration", "5"],
        )
        .unwrap();

        match args.command {
            Command::Protect(protect) => {
                assert_eq!(protect.cores, Some(CoreListArg(vec![2, 3])));
                assert_eq!(protect.duration, Some(5));
                assert!(protect.config.is_none());
            }
            _ => panic!("expected the protect subcommand"),
        }

        Args::from_args(&["core_warden"], &["reserve", "--cores", "x"]).unwrap_err();
    }

    #[test]
    fn recommend_defaults_to_one_core() {
        let args = Args::from_args(&["core_warden"], &["recommend"]).unwrap();

        assert!(matches!(
            args.command,
            Command::Recommend(RecommendArgs { count: 1 })
        ));
    }

    #[test]
    fn priority_level_is_positional() {
        let args = Args::from_args(&["core_warden"], &["priority", "below-normal"]).unwrap();

        assert!(matches!(
            args.command,
            Command::Priority(PriorityArgs {
                level: ProcessPriority::BelowNormal
            })
        ));

        Args::from_args(&["core_warden"], &["priority", "urgent"]).unwrap_err();
    }

    #[test]
    fn priority_is_applied_within_the_allowed_range() {
        let fake = FakeSystemBuilder::new()
            .max_priority(ProcessPriority::Normal)
            .build();

        let result = run(
            Command::Priority(PriorityArgs {
                level: ProcessPriority::High,
            }),
            &fake.system(),
        );

        assert!(matches!(result, Err(Error::PriorityChangeFailed { .. })));
        assert_eq!(fake.priority(), ProcessPriority::Normal);

        run(
            Command::Priority(PriorityArgs {
                level: ProcessPriority::Idle,
            }),
            &fake.system(),
        )
        .unwrap();

        assert_eq!(fake.priority(), ProcessPriority::Idle);
    }

    #[test]
    fn available_watch_is_optional() {
        let args = Args::from_args(&["core_warden"], &["available", "--watch", "10"]).unwrap();

        assert!(matches!(
            args.command,
            Command::Available(AvailableArgs { watch: Some(10) })
        ));

        let fake = FakeSystemBuilder::new().cores(4).build();

        run(Command::Available(AvailableArgs { watch: None }), &fake.system()).unwrap();
        assert_eq!(fake.listing_count(), 1);

        // A zero-length watch still takes one snapshot.
        run(
            Command::Available(AvailableArgs { watch: Some(0) }),
            &fake.system(),
        )
        .unwrap();
        assert_eq!(fake.listing_count(), 2);
    }

    #[test]
    fn steps_cover_the_whole_duration() {
        let second = Duration::from_secs(1);

        assert_eq!(steps_within(Duration::from_secs(3), second), 3);
        assert_eq!(steps_within(Duration::from_millis(2500), second), 3);
        assert_eq!(steps_within(Duration::ZERO, second), 1);
        assert_eq!(steps_within(second, Duration::ZERO), 1000);
        assert_eq!(steps_within(Duration::MAX, Duration::from_millis(1)), u32::MAX);
    }

    #[test]
    fn reserve_moves_processes_on_given_system() {
        let fake = FakeSystemBuilder::new()
            .cores(4)
            .process(100, "worker", CoreMask::from_bits(0b1000))
            .build();

        run(
            Command::Reserve(ReserveArgs {
                cores: CoreListArg(vec![3]),
            }),
            &fake.system(),
        )
        .unwrap();

        assert_eq!(fake.affinity_of(100), Some(CoreMask::from_bits(0b0001)));
    }

    #[test]
    fn timed_protection_validates_cores() {
        let fake = FakeSystemBuilder::new().cores(4).build();

        let result = run(
            Command::Protect(ProtectArgs {
                cores: Some(CoreListArg(vec![7])),
                duration: Some(1),
                config: None,
            }),
            &fake.system(),
        );

        assert!(matches!(result, Err(Error::InvalidCore { core: 7, .. })));
        assert_eq!(fake.listing_count(), 0);
    }
}
