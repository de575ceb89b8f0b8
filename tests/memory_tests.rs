use tracing_subscriber::fmt;
use wasmzx::{
    memory::{MemoryMap, PAGE_SIZE},
    BankId, ConfigError, Machine, MachineBuilder, MachineType, PageRef,
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

#[test]
fn test_every_slot_is_always_populated() {
    let mut map = MemoryMap::new();
    assert!(map.slots().iter().all(|slot| *slot == PageRef::UNMAPPED));

    map.allocate_pool(BankId::Ram, 2).unwrap();
    map.map_slot(3, PageRef::new(BankId::Ram, 1));
    for address in (0..=0xFFFFu16).step_by(PAGE_SIZE) {
        let _ = map.read(address);
    }
    assert_eq!(map.slot(3), PageRef::new(BankId::Ram, 1));
    assert_eq!(map.slots().len(), 8);
}

#[test]
fn test_unmapped_pool_is_reserved() {
    let mut map = MemoryMap::new();
    assert!(matches!(
        map.allocate_pool(BankId::Unmapped, 4),
        Err(ConfigError::ReservedBank(BankId::Unmapped))
    ));
    assert!(matches!(
        map.set_contended(PageRef::new(BankId::Ram, 0), true),
        Err(ConfigError::NoSuchPage { .. })
    ));
}

#[test]
fn test_128k_bank_switch_round_trip() {
    let mut machine = Machine::new(MachineType::Spectrum128).unwrap();

    for bank in 0..8u8 {
        machine.write_port(0x7FFD, bank);
        machine.write_memory(0xC000, 0x10 + bank);
    }
    for bank in 0..8u8 {
        machine.write_port(0x7FFD, bank);
        assert_eq!(machine.peek(0xC000), 0x10 + bank, "bank {}", bank);
        assert_eq!(machine.memory().is_contended(0xC000), bank % 2 == 1);
    }

    // bank 5 is also the screen at 0x4000, bank 2 sits at 0x8000
    assert_eq!(machine.peek(0x4000), 0x15);
    assert_eq!(machine.peek(0x8000), 0x12);
}

#[test]
fn test_aliased_screen_bank() {
    let mut machine = Machine::new(MachineType::Spectrum128).unwrap();
    machine.write_port(0x7FFD, 0x05);
    assert_eq!(machine.memory().slot(6), machine.memory().slot(2));

    machine.write_memory(0x4123, 0x77);
    assert_eq!(machine.peek(0xC123), 0x77);
}

#[test]
fn test_128k_rom_select() {
    let mut rom = vec![0u8; 4 * PAGE_SIZE];
    rom[0] = 0x01;
    rom[2 * PAGE_SIZE] = 0x02;
    let mut machine = MachineBuilder::new()
        .machine(MachineType::Spectrum128)
        .rom(&rom)
        .build()
        .unwrap();

    assert_eq!(machine.peek(0x0000), 0x01);
    machine.write_port(0x7FFD, 0x10);
    assert_eq!(machine.peek(0x0000), 0x02);
    assert!(machine.paging().basic_rom_selected());
}

#[test]
fn test_timex_dock_chunks() {
    let mut machine = Machine::new(MachineType::Tc2048).unwrap();
    machine
        .memory_mut()
        .load(BankId::Dock, 4, &[0xC3; PAGE_SIZE])
        .unwrap();

    machine.write_port(0x00F4, 0x10);
    assert_eq!(machine.memory().slot(4), PageRef::new(BankId::Dock, 4));
    assert_eq!(machine.peek(0x8000), 0xC3);
    machine.write_memory(0x8000, 0x00);
    assert_eq!(machine.peek(0x8000), 0xC3);

    machine.write_port(0x00F4, 0x00);
    assert_eq!(machine.memory().slot(4), PageRef::new(BankId::Ram, 4));
    assert_eq!(machine.read_port(0x00F4), 0x00);
}

#[test]
fn test_memory_dump() {
    let mut machine = Machine::new(MachineType::Spectrum48).unwrap();
    machine.write_memory(0x8000, b'Z');
    machine.write_memory(0x8001, b'X');

    let dump = machine.memory_dump(0x8000, 0x801F);
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("8000: 5a 58 ff"));
}
