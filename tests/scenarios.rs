//! Integration tests mirroring the end-to-end scenarios used to validate
//! this crate's command/transfer state machine.

use fdc_core::disk::TrackFormat;
use fdc_core::{Disk, Drive, FdcConfig, FdcController, Scheduler, TestDisk, TestDma, TestDrive, TestScheduler};

const PORT_COMMAND_STATUS: u16 = 0x84;
const PORT_DATA: u16 = 0x87;
const PORT_EXTERNAL_STATE: u16 = 0xE8;

type Fdc = FdcController<TestDrive<TestDisk>, TestDma>;

fn new_fdc() -> Fdc {
    let _ = env_logger::builder().is_test(true).try_init();
    FdcController::new(FdcConfig::default(), TestDrive::new(), TestDma::new())
}

/// Run every scheduled callback to completion, including ones newly
/// scheduled by earlier callbacks (a multi-tick Type I walk reschedules
/// itself on every tick), rather than a single `drain_all()` pass.
fn run_scheduler(fdc: &mut Fdc, sched: &mut TestScheduler) {
    while !sched.is_empty() {
        for token in sched.drain_all() {
            fdc.on_timer(token, sched);
        }
    }
}

fn enable(fdc: &mut Fdc, sched: &mut TestScheduler, double_density: bool) {
    let mut byte: u8 = 0b0001_0000; // chip_enable bit
    if double_density {
        byte |= 0b0000_1000;
    }
    fdc.write_port(PORT_EXTERNAL_STATE, byte, sched).unwrap();
    run_scheduler(fdc, sched);
}

#[test]
fn scenario_reset_and_restore() {
    let mut fdc = new_fdc();
    let mut sched = TestScheduler::new();
    fdc.drive_mut().force_cylinder(5);

    enable(&mut fdc, &mut sched, false);

    assert_eq!(fdc.drive().track(), 0);
    let status = fdc.read_port(PORT_COMMAND_STATUS, &mut sched).unwrap();
    assert_eq!(status & 0b0000_0001, 0, "not busy after settling");
}

#[test]
fn scenario_write_track_then_read_sector_round_trips_size() {
    let mut fdc = new_fdc();
    let mut sched = TestScheduler::new();
    enable(&mut fdc, &mut sched, true);

    fdc.write_port(0x85, 7, &mut sched).unwrap(); // track register = 7

    fdc.write_port(PORT_COMMAND_STATUS, 0xF0, &mut sched).unwrap(); // WriteTrack
    run_scheduler(&mut fdc, &mut sched);

    let mut stream = vec![0x4Eu8, 0xFC];
    for s in 1u8..=9 {
        stream.push(0xFE);
        stream.push(7); // track
        stream.push(0); // head
        stream.push(s);
        stream.push(2); // length code -> 512
        stream.push(0xFB);
        stream.extend(std::iter::repeat(0u8).take(512));
        stream.push(0xF7);
    }
    for byte in stream {
        fdc.write_port(PORT_DATA, byte, &mut sched).unwrap();
    }
    fdc.drive_mut().set_index(true);
    fdc.on_index_edge().unwrap();

    assert!(fdc.drive().disk().get_track(7, 0).is_some());
    let track = fdc.drive().disk().get_track(7, 0).unwrap();
    assert_eq!(track.sector_count, 9);
    assert!(matches!(track.format, TrackFormat::Mfm500));

    for s in 1..=9u8 {
        let sector = fdc.drive_mut().disk_mut().get_sector(7, 0, s - 1).unwrap();
        assert_eq!(sector.len(), 512);
    }
}

#[test]
fn scenario_write_track_invalid_length_is_fatal_and_disk_unmodified() {
    let mut fdc = new_fdc();
    let mut sched = TestScheduler::new();
    enable(&mut fdc, &mut sched, true);
    fdc.write_port(0x85, 7, &mut sched).unwrap();

    fdc.write_port(PORT_COMMAND_STATUS, 0xF0, &mut sched).unwrap();
    run_scheduler(&mut fdc, &mut sched);

    let mut stream = vec![0x4Eu8, 0xFC];
    for s in 1u8..=4 {
        stream.push(0xFE);
        stream.push(7);
        stream.push(0);
        stream.push(s);
        stream.push(2);
        stream.push(0xFB);
        stream.extend(std::iter::repeat(0u8).take(512));
        stream.push(0xF7);
    }
    // Sector 5 carries an invalid length code.
    stream.push(0xFE);
    stream.push(7);
    stream.push(0);
    stream.push(5);
    stream.push(7);

    let mut saw_error = false;
    for byte in stream {
        if fdc.write_port(PORT_DATA, byte, &mut sched).is_err() {
            saw_error = true;
            break;
        }
    }
    assert!(saw_error, "invalid length code must be fatal");
    assert!(fdc.drive().disk().get_track(7, 0).is_none(), "disk must stay unmodified");
}
