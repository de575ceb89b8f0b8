use tracing_subscriber::fmt;
use wasmzx::{
    fdd::{DriveType, MotorState},
    memory::PAGE_SIZE,
    BankId, BetaConfig, DiskGeometry, DiskImage, DriveConfig, EventKind, Machine, MachineBuilder,
    MachineConfig, MachineType, PageRef, Snapshot, SnapshotError,
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

const STATUS: u16 = 0x001F;
const SECTOR: u16 = 0x005F;
const DATA: u16 = 0x007F;
const SYSTEM: u16 = 0x00FF;

fn beta_machine(model: MachineType) -> Machine {
    let mut rom = vec![0u8; model.rom_pages() * PAGE_SIZE];
    rom[0] = 0xF3;
    let mut beta_rom = vec![0u8; 2 * PAGE_SIZE];
    beta_rom[0] = 0xC3;

    MachineBuilder::new()
        .machine(model)
        .rom(&rom)
        .beta_rom(&beta_rom)
        .drive(DriveConfig::default())
        .build()
        .unwrap()
}

/// Page the interface in, insert a blank disk and spin drive 0 up.
fn ready_drive(machine: &mut Machine) {
    machine.check_rom_paging(0x3D2F);
    assert!(machine.paging().romcs);
    machine
        .insert_disk(0, DiskImage::blank(DiskGeometry::TRDOS_DS80).unwrap())
        .unwrap();

    // side 0, drive 0, controller out of reset
    machine.write_port(SYSTEM, 0x3C);
    for _ in 0..12 {
        assert!(machine.run_frame().is_continue());
    }
    let beta = machine.beta().unwrap();
    assert_eq!(beta.drive(0).map(|d| d.motor()), Some(MotorState::Ready));
}

/// Issue a type II command and service DRQ until INTRQ, polling the
/// system register the way the disk ROM does. Returns the final status.
fn run_command(machine: &mut Machine, command: u8, mut on_drq: impl FnMut(&mut Machine)) -> u8 {
    machine.write_port(STATUS, command);
    for _ in 0..400_000 {
        let _ = machine.idle(16);
        let system = machine.read_port(SYSTEM);
        if system & 0x80 != 0 {
            return machine.read_port(STATUS);
        }
        if system & 0x40 != 0 {
            on_drq(machine);
        }
    }
    panic!("command {:02X} never completed", command);
}

fn sentinel(n: usize) -> u8 {
    (n as u8).wrapping_mul(13) ^ 0x5A
}

#[test]
fn test_run_frame_wraps_the_clock() {
    let mut machine = Machine::new(MachineType::Spectrum48).unwrap();
    let frame_length = machine.timings().frame_length();

    assert!(machine.run_frame().is_continue());
    assert_eq!(machine.frame_count(), 1);
    assert!(machine.tstates() < frame_length);
    assert!(machine.interrupt_pending());

    let kinds: Vec<EventKind> = machine.events().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::InterruptEnd, EventKind::Frame]);

    assert!(machine.run_frame().is_continue());
    assert_eq!(machine.frame_count(), 2);
}

#[test]
fn test_breakpoint_stops_idle() {
    let mut machine = Machine::new(MachineType::Spectrum48).unwrap();
    machine.add_breakpoint(1_000).unwrap();

    assert!(machine.idle(2_000).is_break());
    assert!(machine.is_stopped());
    assert_eq!(machine.tstates(), 1_000);

    machine.resume();
    assert!(!machine.is_stopped());
    assert!(machine.idle(1_000).is_continue());
    assert_eq!(machine.tstates(), 2_000);

    machine.add_breakpoint(3_000).unwrap();
    machine.clear_breakpoints();
    assert!(machine.idle(2_000).is_continue());
}

#[test]
fn test_128k_paging_lock() {
    let mut machine = Machine::new(MachineType::Spectrum128).unwrap();

    machine.write_port(0x7FFD, 0x20 | 0x03);
    assert!(machine.paging().locked);
    assert_eq!(machine.memory().slot(6), PageRef::new(BankId::Ram, 6));

    machine.write_port(0x7FFD, 0x04);
    assert_eq!(machine.memory().slot(6), PageRef::new(BankId::Ram, 6));

    machine.reset();
    assert!(!machine.paging().locked);
    assert_eq!(machine.memory().slot(6), PageRef::new(BankId::Ram, 0));
    machine.write_port(0x7FFD, 0x04);
    assert_eq!(machine.memory().slot(6), PageRef::new(BankId::Ram, 8));
}

#[test]
fn test_beta_rom_follows_pc() {
    let mut machine = beta_machine(MachineType::Spectrum48);
    assert_eq!(machine.peek(0x0000), 0xF3);

    machine.check_rom_paging(0x3C00);
    assert_eq!(machine.peek(0x0000), 0xF3);

    machine.check_rom_paging(0x3D2F);
    assert_eq!(machine.peek(0x0000), 0xC3);
    assert_eq!(machine.memory().slot(0), PageRef::new(BankId::Overlay, 0));
    machine.check_rom_paging(0x3FFF);
    assert_eq!(machine.peek(0x0000), 0xC3);

    machine.check_rom_paging(0x4000);
    assert_eq!(machine.peek(0x0000), 0xF3);

    let id = machine.beta_id().unwrap();
    machine.set_peripheral_active(id, false).unwrap();
    machine.check_rom_paging(0x3D00);
    assert_eq!(machine.peek(0x0000), 0xF3);
}

#[test]
fn test_beta_rom_needs_basic_rom() {
    let mut machine = beta_machine(MachineType::Spectrum128);
    machine.check_rom_paging(0x3D00);
    assert!(!machine.paging().romcs);

    machine.write_port(0x7FFD, 0x10);
    machine.check_rom_paging(0x3D00);
    assert!(machine.paging().romcs);
}

#[test]
fn test_beta_ports_hidden_while_paged_out() {
    let mut machine = beta_machine(MachineType::Spectrum48);
    machine.advance(100);
    // nothing answers, the border floats high
    assert_eq!(machine.peek_port(SYSTEM), 0xFF);
    assert_eq!(machine.read_port(SYSTEM), 0xFF);
    assert_eq!(machine.peek_port(STATUS), 0xFF);

    machine.check_rom_paging(0x3D00);
    assert_eq!(machine.peek_port(SYSTEM), 0x00);
    assert_eq!(machine.read_port(SYSTEM), 0x00);
}

#[test]
fn test_beta_sector_write_and_read() {
    let mut machine = beta_machine(MachineType::Spectrum48);
    ready_drive(&mut machine);

    machine.write_port(SECTOR, 1);
    let mut written = 0;
    let status = run_command(&mut machine, 0xA0, |m| {
        m.write_port(DATA, sentinel(written));
        written += 1;
    });
    assert_eq!(written, 256);
    assert_eq!(status, 0x00);

    machine.write_port(SECTOR, 1);
    let mut read = Vec::new();
    let status = run_command(&mut machine, 0x80, |m| read.push(m.read_port(DATA)));
    assert_eq!(status, 0x00);
    let expected: Vec<u8> = (0..256).map(sentinel).collect();
    assert_eq!(read, expected);

    let mut image = machine.eject_disk(0).unwrap().unwrap();
    assert!(image.is_dirty());
    image.flush();
    assert_eq!(&image.to_raw()[..256], &expected[..]);
}

#[test]
fn test_beta_missing_sector() {
    let mut machine = beta_machine(MachineType::Spectrum48);
    ready_drive(&mut machine);

    machine.write_port(SECTOR, 17);
    let status = run_command(&mut machine, 0x80, |_| panic!("no data expected"));
    assert_eq!(status & 0x10, 0x10);
}

#[test]
fn test_beta_without_disk_is_not_ready() {
    let mut machine = beta_machine(MachineType::Spectrum48);
    machine.check_rom_paging(0x3D00);
    machine.write_port(SYSTEM, 0x3C);

    let status = run_command(&mut machine, 0x80, |_| panic!("no data expected"));
    assert_eq!(status & 0x80, 0x80);
}

#[test]
fn test_reset_stops_the_disk_interface() {
    let mut machine = beta_machine(MachineType::Spectrum48);
    ready_drive(&mut machine);
    machine.add_breakpoint(50_000).unwrap();

    machine.reset();
    assert!(!machine.paging().romcs);
    assert_eq!(machine.tstates(), 0);
    assert_eq!(machine.frame_count(), 0);
    assert!(machine.events().iter().all(|e| e.kind != EventKind::Breakpoint));

    // spin-down takes two revolutions
    for _ in 0..25 {
        let _ = machine.run_frame();
    }
    let beta = machine.beta().unwrap();
    assert_eq!(beta.drive(0).map(|d| d.motor()), Some(MotorState::Off));
    assert!(beta.drive(0).unwrap().has_disk());
}

#[test]
fn test_snapshot_round_trip() {
    let mut machine = beta_machine(MachineType::Spectrum128);
    machine.write_port(0x7FFD, 0x13);
    machine.write_memory(0xC000, 0xAB);
    machine.write_memory(0x4000, 0xCD);
    ready_drive(&mut machine);
    machine.advance(1_234);

    let json = machine.snapshot().to_json().unwrap();
    let snapshot = Snapshot::from_json(&json).unwrap();
    assert_eq!(snapshot, machine.snapshot());

    let mut restored = beta_machine(MachineType::Spectrum128);
    restored.restore(&snapshot).unwrap();

    assert_eq!(restored.tstates(), machine.tstates());
    assert_eq!(restored.frame_count(), machine.frame_count());
    assert_eq!(restored.paging(), machine.paging());
    assert_eq!(restored.memory().slots(), machine.memory().slots());
    assert_eq!(restored.peek(0xC000), 0xAB);
    assert_eq!(restored.peek(0x4000), 0xCD);
    assert_eq!(restored.events().events(), machine.events().events());
    assert_eq!(restored.snapshot(), machine.snapshot());

    let beta = restored.beta().unwrap();
    assert_eq!(beta.drive(0).map(|d| d.motor()), Some(MotorState::Ready));
    assert!(!beta.drive(0).unwrap().has_disk());
}

#[test]
fn test_snapshot_mismatches_leave_machine_alone() {
    let source = Machine::new(MachineType::Spectrum128).unwrap();
    let snapshot = source.snapshot();

    let mut other_model = Machine::new(MachineType::Spectrum48).unwrap();
    other_model.advance(500);
    assert!(matches!(
        other_model.restore(&snapshot),
        Err(SnapshotError::MachineMismatch { .. })
    ));
    assert_eq!(other_model.tstates(), 500);

    let mut with_beta = beta_machine(MachineType::Spectrum128);
    assert!(matches!(
        with_beta.restore(&snapshot),
        Err(SnapshotError::PoolMismatch {
            bank: BankId::Overlay,
            ..
        })
    ));

    let mut without_ay = MachineBuilder::new()
        .machine(MachineType::Spectrum128)
        .with_ay(false)
        .build()
        .unwrap();
    assert!(matches!(
        without_ay.restore(&snapshot),
        Err(SnapshotError::PeripheralMismatch(_))
    ));
}

#[test]
fn test_bad_peripheral_state_leaves_machine_alone() {
    let mut source = beta_machine(MachineType::Spectrum128);
    source.write_port(0x7FFD, 0x13);
    source.write_memory(0xC000, 0xAB);
    source.advance(5_000);
    let mut snapshot = source.snapshot();
    let beta = snapshot
        .peripherals
        .iter_mut()
        .find(|p| p.name == "beta 128")
        .unwrap();
    beta.state = Some(serde_json::json!({ "bogus": 1 }));

    let mut machine = beta_machine(MachineType::Spectrum128);
    machine.advance(100);
    let before = machine.snapshot();
    let byte = machine.peek(0xC000);
    assert_ne!(byte, 0xAB);
    assert!(matches!(machine.restore(&snapshot), Err(SnapshotError::Json(_))));

    assert_eq!(machine.tstates(), 100);
    assert_eq!(machine.peek(0xC000), byte);
    assert_eq!(machine.snapshot(), before);
}

#[test]
fn test_reconfigure_keeps_rom_and_disks() {
    let mut machine = beta_machine(MachineType::Spectrum48);
    machine
        .insert_disk(0, DiskImage::blank(DiskGeometry::TRDOS_DS80).unwrap())
        .unwrap();

    let config = MachineConfig {
        machine: MachineType::Spectrum128,
        beta: Some(BetaConfig {
            drives: vec![
                DriveConfig::default(),
                DriveConfig {
                    kind: DriveType::Pc,
                    cylinders: 40,
                    heads: 1,
                },
            ],
            intrq_to_cpu: false,
        }),
        ay: None,
    };
    machine.reconfigure(&config).unwrap();

    assert_eq!(machine.model(), MachineType::Spectrum128);
    assert_eq!(machine.peek(0x0000), 0xF3);
    assert!(machine.ay().is_some());
    let beta = machine.beta().unwrap();
    assert_eq!(beta.drives().len(), 2);
    assert!(beta.drive(0).unwrap().has_disk());
    assert!(!beta.drive(1).unwrap().has_disk());
}

#[test]
fn test_disk_calls_without_interface() {
    let mut machine = Machine::new(MachineType::Pentagon).unwrap();
    let image = DiskImage::blank(DiskGeometry::TRDOS_DS80).unwrap();
    assert!(machine.insert_disk(0, image).is_err());
    assert!(machine.eject_disk(0).is_err());
    machine.check_rom_paging(0x3D00);
    assert!(!machine.paging().romcs);
}
