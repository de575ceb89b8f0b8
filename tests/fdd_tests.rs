use tracing_subscriber::fmt;
use wasmzx::{
    bus::{BusContext, InterruptLines, PortDispatcher},
    clock::MachineTimings,
    fdd::{Drive, DriveType, MotorState, StepDirection, Transfer, NO_DATA},
    paging::PagingState,
    DiskGeometry, DiskImage, EventKind, EventQueue, FddError, MachineType, MemoryMap,
};

#[cfg(test)]
#[ctor::ctor]
fn init() {
    let fmt_subscriber = fmt::Subscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(fmt_subscriber)
        .expect("Unable to set global tracing subscriber");
}

struct Rig {
    tstates: u32,
    memory: MemoryMap,
    paging: PagingState,
    events: EventQueue,
    interrupts: InterruptLines,
    ports: PortDispatcher,
}

impl Rig {
    fn new() -> Self {
        Self {
            tstates: 0,
            memory: MemoryMap::new(),
            paging: PagingState::new(MachineType::Spectrum128),
            events: EventQueue::new(),
            interrupts: InterruptLines::default(),
            ports: PortDispatcher::new(),
        }
    }

    fn ctx(&mut self) -> BusContext<'_> {
        BusContext {
            tstates: self.tstates,
            timings: MachineTimings::SPECTRUM_128,
            memory: &mut self.memory,
            paging: &mut self.paging,
            events: &mut self.events,
            interrupts: &mut self.interrupts,
            ports: &mut self.ports,
        }
    }

    /// Fire drive events up to `until`.
    fn run(&mut self, drive: &mut Drive, until: u32) {
        while let Some(event) = self.events.pop_due(until) {
            self.tstates = event.time;
            match event.kind {
                EventKind::FddMotor => {
                    drive.event_motor(event.time, &mut self.ctx());
                }
                EventKind::FddIndex => {
                    drive.event_index(event.time, &mut self.ctx());
                }
                _ => {}
            }
        }
        self.tstates = until;
    }
}

fn sentinel(n: usize) -> u8 {
    (n * 7 + 3) as u8
}

#[test]
fn test_step_out_at_track_zero() {
    let mut drive = Drive::new(0, DriveType::Shugart, 80, 2).unwrap();
    assert!(drive.track_zero());
    drive.step(StepDirection::Out);
    assert_eq!(drive.cylinder(), 0);
    assert!(drive.track_zero());

    drive.step(StepDirection::In);
    drive.step(StepDirection::Out);
    drive.step(StepDirection::Out);
    assert_eq!(drive.cylinder(), 0);
    assert!(drive.track_zero());
}

#[test]
fn test_motor_on_twice_keeps_one_ready_event() {
    let mut rig = Rig::new();
    let mut drive = Drive::new(2, DriveType::Shugart, 80, 2).unwrap();

    drive.motor_on(true, &mut rig.ctx());
    rig.tstates = 1_000;
    drive.motor_on(true, &mut rig.ctx());

    let pending: Vec<_> = rig
        .events
        .iter()
        .filter(|e| e.kind == EventKind::FddMotor && e.payload == Some(2))
        .collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].time, MachineTimings::SPECTRUM_128.revolution());
}

#[test]
fn test_index_pulse_follows_rotation() {
    let mut rig = Rig::new();
    let mut drive = Drive::new(0, DriveType::Shugart, 80, 2).unwrap();
    let timings = MachineTimings::SPECTRUM_128;
    let ready = timings.revolution();

    drive.motor_on(true, &mut rig.ctx());
    rig.run(&mut drive, ready);
    assert_eq!(drive.motor(), MotorState::Ready);
    assert!(!drive.index());

    let pulse = ready + timings.ms_to_tstates(196);
    rig.run(&mut drive, pulse);
    assert!(drive.index());
    rig.run(&mut drive, pulse + timings.ms_to_tstates(4));
    assert!(!drive.index());

    drive.motor_on(false, &mut rig.ctx());
    rig.run(&mut drive, u32::MAX);
    assert_eq!(drive.motor(), MotorState::Off);
    assert!(rig.events.is_empty());
}

#[test]
fn test_not_ready_drive_still_rotates() {
    let mut drive = Drive::new(0, DriveType::Shugart, 80, 2).unwrap();
    drive
        .insert(DiskImage::blank(DiskGeometry::TRDOS_DS80).unwrap())
        .unwrap();

    assert_eq!(drive.read_write_byte(Transfer::Read), Ok(NO_DATA));
    assert_eq!(drive.read_write_byte(Transfer::Write(0x55)), Ok(NO_DATA));
    assert_eq!(drive.rotation(), 2);
}

#[test]
fn test_write_protected_disk() {
    let mut rig = Rig::new();
    let mut drive = Drive::new(0, DriveType::Pc, 80, 2).unwrap();
    let mut image = DiskImage::blank(DiskGeometry::TRDOS_DS80).unwrap();
    image.set_write_protected(true);
    drive.insert(image).unwrap();
    drive.select(true);
    drive.head_load(true);
    drive.motor_on(true, &mut rig.ctx());
    rig.run(&mut drive, MachineTimings::SPECTRUM_128.revolution());
    assert!(drive.is_ready());
    assert!(drive.write_protected());

    drive.set_rotation(100);
    assert_eq!(
        drive.read_write_byte(Transfer::Write(0x00)),
        Err(FddError::ReadOnly)
    );
    assert_eq!(drive.rotation(), 101);
    assert!(!drive.disk().unwrap().is_dirty());
}

#[test]
fn test_eject_returns_dirty_image() {
    let mut rig = Rig::new();
    let mut drive = Drive::new(0, DriveType::Pc, 80, 2).unwrap();
    drive
        .insert(DiskImage::blank(DiskGeometry::TRDOS_DS80).unwrap())
        .unwrap();
    drive.select(true);
    drive.head_load(true);
    drive.motor_on(true, &mut rig.ctx());
    rig.run(&mut drive, MachineTimings::SPECTRUM_128.revolution());

    let start = drive.disk().unwrap().sector_data_offset(3).unwrap();
    drive.set_rotation(start);
    drive.read_write_byte(Transfer::Write(0xE5)).unwrap();

    let mut image = drive.eject().unwrap();
    assert!(!drive.has_disk());
    assert_eq!(image.dirty_sectors(), 1);
    assert_eq!(image.flush(), 16);
    assert_eq!(image.to_raw()[2 * 256], 0xE5);
    assert!(!image.is_dirty());
}

#[test]
fn test_sector_write_then_read_back() {
    let mut rig = Rig::new();
    let geometry = DiskGeometry::new(80, 2, 10, 512);
    let mut drive = Drive::new(0, DriveType::Shugart, 80, 2).unwrap();
    drive.insert(DiskImage::blank(geometry).unwrap()).unwrap();

    drive.select(true);
    drive.head_load(true);
    drive.motor_on(true, &mut rig.ctx());
    rig.run(&mut drive, MachineTimings::SPECTRUM_128.revolution() + 1);
    assert!(drive.is_ready());

    let start = drive.disk().unwrap().sector_data_offset(1).unwrap();
    drive.set_rotation(start);
    for n in 0..512 {
        let written = drive
            .read_write_byte(Transfer::Write(sentinel(n) as u16))
            .unwrap();
        assert_eq!(written, sentinel(n) as u16);
    }

    drive.set_rotation(start);
    for n in 0..512 {
        assert_eq!(
            drive.read_write_byte(Transfer::Read),
            Ok(sentinel(n) as u16),
            "byte {}",
            n
        );
    }

    let mut image = drive.eject().unwrap();
    image.flush();
    let expected: Vec<u8> = (0..512).map(sentinel).collect();
    assert_eq!(&image.to_raw()[..512], &expected[..]);
}

#[test]
fn test_visitor_skips_cancelled_motor_event() {
    let mut rig = Rig::new();
    let revolution = MachineTimings::SPECTRUM_128.revolution();
    let mut first = Drive::new(0, DriveType::Shugart, 80, 2).unwrap();
    let mut second = Drive::new(1, DriveType::Shugart, 80, 2).unwrap();

    rig.events
        .schedule(70_908, EventKind::Frame, None)
        .unwrap();
    first.motor_on(true, &mut rig.ctx());
    rig.tstates = 500;
    second.motor_on(true, &mut rig.ctx());

    rig.events.cancel_matching(|e| e.payload == Some(0));

    let mut seen = Vec::new();
    rig.events.for_each(|e| seen.push((e.kind, e.time, e.payload)));
    assert_eq!(
        seen,
        vec![
            (EventKind::Frame, 70_908, None),
            (EventKind::FddMotor, revolution + 500, Some(1)),
        ]
    );
}
