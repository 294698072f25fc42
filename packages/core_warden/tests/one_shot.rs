//! Integration tests for the one-shot operations: allocation, inspection and single sweeps.

use std::time::Duration;

use core_warden::fake::FakeSystemBuilder;
use core_warden::{
    AffinityInspector, CancellationToken, CoreAllocator, CoreMask, CorrectionEvent, Error,
    ReservationSet, Sweeper, exclude, recommend_cores,
};
use testing::Recorder;

#[test]
fn recommends_highest_cores_first() {
    assert_eq!(recommend_cores(8, 3), vec![7, 6, 5]);

    let fake = FakeSystemBuilder::new().cores(8).build();
    assert_eq!(CoreAllocator::new(fake.system()).recommend(3), vec![7, 6, 5]);
}

#[test]
fn available_cores_exclude_those_used_by_others() {
    let fake = FakeSystemBuilder::new()
        .cores(4)
        .process(10, "a", CoreMask::from_bits(0b0001))
        .process(11, "b", CoreMask::from_bits(0b0010))
        .unreadable_process(12, "c")
        .placeholder(0, "Idle")
        .build();

    let allocator = CoreAllocator::new(fake.system());

    assert_eq!(allocator.occupied_cores(), CoreMask::from_bits(0b0011));
    assert_eq!(allocator.available_cores(), CoreMask::from_bits(0b1100));
}

#[test]
fn auto_bind_uses_available_cores() {
    let fake = FakeSystemBuilder::new()
        .cores(4)
        .current_process(50, "me")
        .process(10, "a", CoreMask::from_bits(0b0011))
        .build();

    let bound = CoreAllocator::new(fake.system())
        .bind_current_process_to_available()
        .unwrap();

    assert_eq!(bound, CoreMask::from_bits(0b1100));
    assert_eq!(fake.affinity_of(50), Some(bound));
}

#[test]
fn bind_rejects_cores_outside_topology() {
    let fake = FakeSystemBuilder::new()
        .cores(4)
        .active_mask(CoreMask::from_bits(0b0111))
        .build();

    let inspector = AffinityInspector::new(fake.system());

    assert!(matches!(
        inspector.bind_current_process(&[]),
        Err(Error::EmptyReservation)
    ));
    assert!(matches!(
        inspector.bind_current_process(&[4]),
        Err(Error::InvalidCore { core: 4, .. })
    ));
    assert!(matches!(
        inspector.bind_current_process(&[3]),
        Err(Error::InactiveCore { core: 3, .. })
    ));

    assert_eq!(
        inspector.bind_current_process(&[1, 2]).unwrap(),
        CoreMask::from_bits(0b0110)
    );
    assert_eq!(
        inspector.current_process_affinity().unwrap(),
        CoreMask::from_bits(0b0110)
    );
}

#[test]
fn exclusion_never_overlaps_reservation() {
    let active = CoreMask::from_bits(0b1111);

    for reserved_bits in 1..16_u64 {
        let reserved = CoreMask::from_bits(reserved_bits);

        for current_bits in 1..16_u64 {
            let current = CoreMask::from_bits(current_bits);

            match exclude(current, reserved, active) {
                Ok(new_mask) => {
                    assert!(!new_mask.is_empty());
                    assert!(!new_mask.intersects(reserved));
                }
                Err(Error::NoFallbackCore { .. }) => assert_eq!(reserved, active),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
    }
}

#[test]
fn fully_reserved_system_leaves_processes_alone() {
    let fake = FakeSystemBuilder::new()
        .cores(2)
        .process(10, "worker", CoreMask::from_bits(0b11))
        .build();

    let reservation = ReservationSet::new(&fake.system(), &[0, 1]).unwrap();
    let summary = Sweeper::new(fake.system()).sweep(&reservation);

    assert_eq!(summary.no_fallback, 1);
    assert_eq!(summary.corrected, 0);
    assert_eq!(fake.affinity_of(10), Some(CoreMask::from_bits(0b11)));
}

#[test]
fn reserve_once_reports_every_outcome() {
    let fake = FakeSystemBuilder::new()
        .cores(4)
        .placeholder(0, "Idle")
        .process(4, "lsass.exe", CoreMask::from_bits(0b1111))
        .process(10, "on-reserved", CoreMask::from_bits(0b1100))
        .process(11, "elsewhere", CoreMask::from_bits(0b0011))
        .protected_process(12, "root-owned", CoreMask::from_bits(0b1111))
        .unreadable_process(13, "hidden")
        .build();

    let events = Recorder::<CorrectionEvent>::new();
    let reservation = ReservationSet::new(&fake.system(), &[3, 2]).unwrap();

    let summary = Sweeper::new(fake.system())
        .on_correction(events.sink())
        .reserve_once(&reservation);

    // The current process, the placeholder and the critical process.
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.unreadable, 1);
    assert_eq!(summary.compliant, 1);
    assert_eq!(summary.corrected, 1);
    assert_eq!(summary.denied, 1);
    assert_eq!(summary.conflicts(), 2);

    assert_eq!(fake.affinity_of(10), Some(CoreMask::from_bits(0b0001)));
    assert_eq!(fake.total_affinity_writes(), 1);

    let events = events.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events.first().unwrap().process_id(), 10);
}

#[test]
fn timed_protection_runs_requested_steps() {
    let fake = FakeSystemBuilder::new()
        .cores(4)
        .process(10, "worker", CoreMask::from_bits(0b1000))
        .build();

    let reservation = ReservationSet::new(&fake.system(), &[3]).unwrap();

    let summary = Sweeper::new(fake.system()).protect_for(
        &reservation,
        3,
        Duration::ZERO,
        &CancellationToken::new(),
    );

    assert_eq!(fake.listing_count(), 3);
    assert_eq!(summary.corrected, 1);
    assert_eq!(fake.affinity_of(10), Some(CoreMask::from_bits(0b0001)));
}

#[test]
fn timed_protection_stops_when_cancelled() {
    let fake = FakeSystemBuilder::new().cores(4).build();
    let reservation = ReservationSet::new(&fake.system(), &[3]).unwrap();

    let cancellation = CancellationToken::new();
    cancellation.cancel();

    Sweeper::new(fake.system()).protect_for(
        &reservation,
        100,
        Duration::from_secs(60),
        &cancellation,
    );

    assert_eq!(fake.listing_count(), 0);
}
