// WD1793 floppy disk controller

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    bus::BusContext,
    disk::{crc_add, DATA_AM, DELETED_DATA_AM, ID_AM},
    error::FddError,
    event::EventKind,
    fdd::{Drive, StepDirection, Transfer, NO_DATA},
};

/// Stepping rates for r1r0 with a 1 MHz clock.
const STEP_RATES_MS: [u32; 4] = [6, 12, 20, 30];
const SETTLE_MS: u32 = 15;
/// Revolutions searched for an ID field before giving up.
const SEARCH_REVOLUTIONS: usize = 5;
/// Bytes after the ID field in which a data mark must appear.
const DATA_MARK_WINDOW: usize = 43;
/// Idle revolutions before the head is unloaded.
const HEAD_UNLOAD_REVOLUTIONS: u8 = 15;
const MAX_STEPS: u16 = 255;

const MARK_A1: u16 = 0xFFA1;
const MARK_C2: u16 = 0xFFC2;

/// Externally visible activity of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FdcState {
    Idle,
    Seeking,
    Reading,
    Writing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum CommandType {
    TypeI,
    TypeII,
    TypeIII,
}

/// Where the current command is between events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Phase {
    Idle,
    Step,
    Verify,
    SearchId,
    DataMark,
    WriteGap,
    AddressFound,
    WaitIndex,
    TrackStart,
    ReadData,
    ReadId,
    ReadTrack,
    WriteData,
    WriteTrack,
    /// Command finished; completion is signalled when the disk gets there.
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fdc {
    // Registers
    command: u8,
    track: u8,
    sector: u8,
    data: u8,
    /// Side selected by the interface.
    side: u8,

    state: FdcState,
    command_type: CommandType,
    phase: Phase,

    // Status flags
    busy: bool,
    drq: bool,
    intrq: bool,
    crc_error: bool,
    seek_error: bool,
    record_not_found: bool,
    lost_data: bool,
    write_protect: bool,
    deleted_data: bool,

    // Command progress
    direction_in: bool,
    steps: u16,
    remaining: usize,
    crc: u16,
    id_field: [u8; 6],
    id_index: usize,
    last_f5: bool,

    intrq_on_index: bool,
    idle_revolutions: u8,
    intrq_to_cpu: bool,
}

impl Fdc {
    pub fn new(intrq_to_cpu: bool) -> Self {
        Self {
            command: 0,
            track: 0,
            sector: 1,
            data: 0,
            side: 0,
            state: FdcState::Idle,
            command_type: CommandType::TypeI,
            phase: Phase::Idle,
            busy: false,
            drq: false,
            intrq: false,
            crc_error: false,
            seek_error: false,
            record_not_found: false,
            lost_data: false,
            write_protect: false,
            deleted_data: false,
            direction_in: true,
            steps: 0,
            remaining: 0,
            crc: 0xFFFF,
            id_field: [0; 6],
            id_index: 0,
            last_f5: false,
            intrq_on_index: false,
            idle_revolutions: 0,
            intrq_to_cpu,
        }
    }

    pub fn reset(&mut self, ctx: &mut BusContext) {
        tracing::debug!("[FDC] Reset");
        ctx.events.cancel_kind(EventKind::FdcCommand);
        let intrq_to_cpu = self.intrq_to_cpu;
        *self = Self::new(intrq_to_cpu);
        self.set_intrq(false, ctx);
    }

    pub fn state(&self) -> FdcState {
        self.state
    }

    pub fn intrq(&self) -> bool {
        self.intrq
    }

    pub fn drq(&self) -> bool {
        self.drq
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn track_register(&self) -> u8 {
        self.track
    }

    pub fn sector_register(&self) -> u8 {
        self.sector
    }

    pub fn set_side(&mut self, side: u8) {
        self.side = side;
    }

    pub fn side(&self) -> u8 {
        self.side
    }

    /// Assemble the status register from the individual flags.
    pub fn status(&self, drive: &Drive) -> u8 {
        let mut status = 0;
        if !drive.is_ready() {
            status |= 0x80;
        }
        if self.busy {
            status |= 0x01;
        }
        if self.crc_error {
            status |= 0x08;
        }

        match self.command_type {
            CommandType::TypeI => {
                if drive.write_protected() {
                    status |= 0x40;
                }
                if drive.is_loaded() {
                    status |= 0x20;
                }
                if self.seek_error {
                    status |= 0x10;
                }
                if drive.track_zero() {
                    status |= 0x04;
                }
                if drive.index() {
                    status |= 0x02;
                }
            }
            CommandType::TypeII | CommandType::TypeIII => {
                if self.write_protect {
                    status |= 0x40;
                }
                if self.deleted_data {
                    status |= 0x20;
                }
                if self.record_not_found {
                    status |= 0x10;
                }
                if self.lost_data {
                    status |= 0x04;
                }
                if self.drq {
                    status |= 0x02;
                }
            }
        }
        status
    }

    /// Debugger view of a register, without side effects.
    pub fn peek_register(&self, register: u8, drive: &Drive) -> u8 {
        match register & 0x03 {
            0 => self.status(drive),
            1 => self.track,
            2 => self.sector,
            _ => self.data,
        }
    }

    pub fn read_register(&mut self, register: u8, drive: &mut Drive, ctx: &mut BusContext) -> u8 {
        match register & 0x03 {
            0 => {
                let status = self.status(drive);
                self.set_intrq(false, ctx);
                tracing::trace!("[FDC] Status {:02X}", status);
                status
            }
            1 => self.track,
            2 => self.sector,
            _ => {
                let value = self.data;
                if self.drq
                    && matches!(self.phase, Phase::ReadData | Phase::ReadId | Phase::ReadTrack)
                {
                    self.drq = false;
                    self.read_next(drive, ctx);
                }
                value
            }
        }
    }

    pub fn write_register(&mut self, register: u8, value: u8, drive: &mut Drive, ctx: &mut BusContext) {
        match register & 0x03 {
            0 => self.write_command(value, drive, ctx),
            1 => self.track = value,
            2 => self.sector = value,
            _ => {
                self.data = value;
                if self.drq && matches!(self.phase, Phase::WriteData | Phase::WriteTrack) {
                    self.drq = false;
                    self.write_next(drive, ctx);
                }
            }
        }
    }

    fn write_command(&mut self, value: u8, drive: &mut Drive, ctx: &mut BusContext) {
        if value & 0xF0 == 0xD0 {
            self.force_interrupt(value, ctx);
            return;
        }
        if self.busy {
            tracing::warn!("[FDC] Command {:02X} ignored while busy", value);
            return;
        }

        tracing::debug!("[FDC] Command {:02X} ({})", value, command_name(value));
        self.set_intrq(false, ctx);
        self.command = value;
        self.busy = true;
        self.drq = false;
        self.crc_error = false;
        self.seek_error = false;
        self.record_not_found = false;
        self.lost_data = false;
        self.write_protect = false;
        self.deleted_data = false;
        self.idle_revolutions = 0;

        if value & 0x80 == 0 {
            self.start_type_i(value, drive, ctx);
        } else {
            self.start_type_ii_iii(value, drive, ctx);
        }
    }

    fn start_type_i(&mut self, value: u8, drive: &mut Drive, ctx: &mut BusContext) {
        self.command_type = CommandType::TypeI;
        self.state = FdcState::Seeking;
        self.steps = 0;
        drive.head_load(value & 0x08 != 0);

        match value >> 4 {
            0x0 => {
                self.track = 0xFF;
                self.data = 0;
            }
            0x4 | 0x5 => self.direction_in = true,
            0x6 | 0x7 => self.direction_in = false,
            _ => {}
        }

        self.phase = Phase::Step;
        self.schedule(0, ctx);
    }

    fn start_type_ii_iii(&mut self, value: u8, drive: &mut Drive, ctx: &mut BusContext) {
        let writing = matches!(value >> 4, 0xA | 0xB | 0xF);
        self.command_type = match value >> 4 {
            0x8..=0xB => CommandType::TypeII,
            _ => CommandType::TypeIII,
        };

        if !drive.is_ready() {
            tracing::debug!("[FDC] Drive {} not ready", drive.id());
            self.finish(ctx);
            return;
        }
        if writing && drive.write_protected() {
            tracing::debug!("[FDC] Disk in drive {} is write protected", drive.id());
            self.write_protect = true;
            self.finish(ctx);
            return;
        }

        drive.head_load(true);
        self.state = if writing {
            FdcState::Writing
        } else {
            FdcState::Reading
        };
        self.phase = match value >> 4 {
            0xE | 0xF => Phase::WaitIndex,
            _ => Phase::SearchId,
        };

        let delay = if value & 0x04 != 0 {
            ctx.timings.ms_to_tstates(SETTLE_MS)
        } else {
            0
        };
        self.schedule(delay, ctx);
    }

    fn force_interrupt(&mut self, value: u8, ctx: &mut BusContext) {
        tracing::debug!("[FDC] Force interrupt {:02X}", value);
        if self.busy {
            self.busy = false;
            self.drq = false;
            self.phase = Phase::Idle;
            self.state = FdcState::Idle;
            ctx.events.cancel_kind(EventKind::FdcCommand);
        } else {
            self.command_type = CommandType::TypeI;
        }
        self.intrq_on_index = value & 0x04 != 0;
        self.set_intrq(value & 0x08 != 0, ctx);
    }

    fn set_intrq(&mut self, on: bool, ctx: &mut BusContext) {
        self.intrq = on;
        if self.intrq_to_cpu {
            ctx.interrupts.peripheral = on;
        }
    }

    fn schedule(&mut self, delay: u32, ctx: &mut BusContext) {
        ctx.events.cancel_kind(EventKind::FdcCommand);
        if let Err(e) = ctx
            .events
            .schedule(ctx.tstates + delay, EventKind::FdcCommand, None)
        {
            // the command cannot continue without its event
            tracing::error!("[FDC] Command {:02X} aborted: {}", self.command, e);
            self.record_not_found = true;
            self.finish(ctx);
        }
    }

    fn byte_time(drive: &Drive, ctx: &BusContext) -> u32 {
        ctx.timings.revolution() / drive.track_length() as u32
    }

    fn finish(&mut self, ctx: &mut BusContext) {
        tracing::debug!(
            "[FDC] Command {:02X} done, track {} sector {}",
            self.command,
            self.track,
            self.sector
        );
        self.busy = false;
        self.drq = false;
        self.phase = Phase::Idle;
        self.state = FdcState::Idle;
        ctx.events.cancel_kind(EventKind::FdcCommand);
        self.set_intrq(true, ctx);
    }

    /// Index hole edge on the selected drive.
    pub fn index_pulse(&mut self, index: bool, drive: &mut Drive, ctx: &mut BusContext) {
        if !index {
            return;
        }
        if self.intrq_on_index {
            self.set_intrq(true, ctx);
        }
        if !self.busy && drive.is_loaded() {
            self.idle_revolutions += 1;
            if self.idle_revolutions >= HEAD_UNLOAD_REVOLUTIONS {
                tracing::trace!("[FDC] Unloading head of drive {}", drive.id());
                drive.head_load(false);
                self.idle_revolutions = 0;
            }
        }
    }

    /// Continue the current command. Stale events are ignored.
    pub fn event(&mut self, drive: &mut Drive, ctx: &mut BusContext) {
        match self.phase {
            Phase::Idle => {}
            Phase::Step => self.event_step(drive, ctx),
            Phase::Verify => self.event_verify(drive, ctx),
            Phase::SearchId => self.event_search_id(drive, ctx),
            Phase::DataMark => self.event_data_mark(drive, ctx),
            Phase::WriteGap => self.event_write_gap(drive, ctx),
            Phase::AddressFound => {
                self.id_index = 0;
                self.data = self.id_field[0];
                self.phase = Phase::ReadId;
                self.request_byte(drive, ctx);
            }
            Phase::WaitIndex => {
                let track_length = drive.track_length();
                let wait = (track_length - drive.rotation() % track_length) % track_length;
                self.phase = Phase::TrackStart;
                self.schedule(wait as u32 * Self::byte_time(drive, ctx), ctx);
            }
            Phase::TrackStart => {
                drive.set_rotation(0);
                self.remaining = drive.track_length();
                if self.command >> 4 == 0xE {
                    self.phase = Phase::ReadTrack;
                    self.read_next(drive, ctx);
                } else {
                    self.phase = Phase::WriteTrack;
                    self.last_f5 = false;
                    self.request_byte(drive, ctx);
                }
            }
            Phase::ReadData | Phase::ReadId | Phase::ReadTrack => {
                if self.drq {
                    tracing::trace!("[FDC] Lost data");
                    self.lost_data = true;
                    self.drq = false;
                    self.read_next(drive, ctx);
                }
            }
            Phase::WriteData | Phase::WriteTrack => {
                if self.drq {
                    tracing::trace!("[FDC] Lost data");
                    self.lost_data = true;
                    self.drq = false;
                    self.data = 0;
                    self.write_next(drive, ctx);
                }
            }
            Phase::Done => self.finish(ctx),
        }
    }

    fn event_step(&mut self, drive: &mut Drive, ctx: &mut BusContext) {
        let kind = self.command >> 4;
        let update_track = kind < 2 || self.command & 0x10 != 0;

        let direction_in = match kind {
            0x0 => {
                if drive.track_zero() {
                    self.track = 0;
                    return self.end_type_i(drive, ctx);
                }
                false
            }
            0x1 => {
                if self.track == self.data {
                    return self.end_type_i(drive, ctx);
                }
                self.data > self.track
            }
            _ => {
                if self.steps > 0 {
                    return self.end_type_i(drive, ctx);
                }
                self.direction_in
            }
        };

        if !direction_in && drive.track_zero() {
            self.track = 0;
            return self.end_type_i(drive, ctx);
        }
        if self.steps >= MAX_STEPS {
            tracing::debug!("[FDC] Track 0 not found after {} steps", self.steps);
            self.seek_error = true;
            return self.end_type_i(drive, ctx);
        }

        self.direction_in = direction_in;
        self.steps += 1;
        if direction_in {
            drive.step(StepDirection::In);
            if update_track {
                self.track = self.track.wrapping_add(1);
            }
        } else {
            drive.step(StepDirection::Out);
            if update_track {
                self.track = self.track.wrapping_sub(1);
            }
        }

        let rate = STEP_RATES_MS[(self.command & 0x03) as usize];
        self.schedule(ctx.timings.ms_to_tstates(rate), ctx);
    }

    fn end_type_i(&mut self, drive: &mut Drive, ctx: &mut BusContext) {
        if self.command & 0x04 != 0 {
            drive.head_load(true);
            self.phase = Phase::Verify;
            self.schedule(ctx.timings.ms_to_tstates(SETTLE_MS), ctx);
        } else {
            self.finish(ctx);
        }
    }

    fn event_verify(&mut self, drive: &mut Drive, ctx: &mut BusContext) {
        let track = self.track;
        let (found, bytes) = self.scan_id(drive, |id| id[0] == track);
        if found.is_none() {
            tracing::debug!("[FDC] Verify failed on track {}", track);
            self.seek_error = true;
        }
        self.phase = Phase::Done;
        self.schedule(bytes as u32 * Self::byte_time(drive, ctx), ctx);
    }

    fn event_search_id(&mut self, drive: &mut Drive, ctx: &mut BusContext) {
        let kind = self.command >> 4;
        let (track, sector) = (self.track, self.sector);
        let compare_side = self.command & 0x02 != 0;
        let side = (self.command >> 3) & 0x01;

        let (found, bytes) = if kind == 0xC {
            self.scan_id(drive, |_| true)
        } else {
            self.scan_id(drive, |id| {
                id[0] == track && id[2] == sector && (!compare_side || id[1] & 0x01 == side)
            })
        };
        let elapsed = bytes as u32 * Self::byte_time(drive, ctx);

        let Some(id) = found else {
            tracing::debug!("[FDC] Record not found: track {} sector {}", track, sector);
            self.record_not_found = true;
            self.phase = Phase::Done;
            return self.schedule(elapsed, ctx);
        };

        self.id_field = id;
        self.phase = match kind {
            0x8 | 0x9 => Phase::DataMark,
            0xA | 0xB => Phase::WriteGap,
            _ => Phase::AddressFound,
        };
        self.schedule(elapsed, ctx);
    }

    fn event_data_mark(&mut self, drive: &mut Drive, ctx: &mut BusContext) {
        let mut marks = 0;
        let mut found = None;
        for _ in 0..DATA_MARK_WINDOW {
            let byte = Self::transfer(drive, Transfer::Read);
            if byte == MARK_A1 {
                marks += 1;
                continue;
            }
            if marks >= 3 && matches!(byte as u8, DATA_AM | DELETED_DATA_AM) {
                found = Some(byte as u8);
                break;
            }
            marks = 0;
        }

        let Some(mark) = found else {
            tracing::debug!("[FDC] No data mark after ID {:02X?}", &self.id_field[..4]);
            self.record_not_found = true;
            return self.finish(ctx);
        };

        self.deleted_data = mark == DELETED_DATA_AM;
        self.crc = [0xA1, 0xA1, 0xA1, mark]
            .iter()
            .fold(0xFFFF, |crc, &b| crc_add(crc, b));
        self.remaining = self.sector_length();
        self.phase = Phase::ReadData;
        self.read_next(drive, ctx);
    }

    fn event_write_gap(&mut self, drive: &mut Drive, ctx: &mut BusContext) {
        // GAP2 is left alone, the controller rewrites sync and mark
        for _ in 0..22 {
            Self::transfer(drive, Transfer::Read);
        }
        let mark = if self.command & 0x01 != 0 {
            DELETED_DATA_AM
        } else {
            DATA_AM
        };
        let mut preamble = [0x0000u16; 16];
        preamble[12..15].fill(MARK_A1);
        preamble[15] = mark as u16;
        for byte in preamble {
            if self.write_byte(drive, byte, ctx).is_err() {
                return;
            }
        }

        self.crc = [0xA1, 0xA1, 0xA1, mark]
            .iter()
            .fold(0xFFFF, |crc, &b| crc_add(crc, b));
        self.remaining = self.sector_length();
        self.phase = Phase::WriteData;
        self.request_byte(drive, ctx);
    }

    fn sector_length(&self) -> usize {
        128 << (self.id_field[3] & 0x03)
    }

    /// Raw byte from the drive; no-data reads as zero.
    fn transfer(drive: &mut Drive, transfer: Transfer) -> u16 {
        match drive.read_write_byte(transfer) {
            Ok(NO_DATA) => 0,
            Ok(value) => value,
            Err(_) => 0,
        }
    }

    /// Write one byte, ending the command if the disk refuses it.
    fn write_byte(&mut self, drive: &mut Drive, value: u16, ctx: &mut BusContext) -> Result<(), FddError> {
        match drive.read_write_byte(Transfer::Write(value)) {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::debug!("[FDC] Write failed: {}", e);
                self.write_protect = true;
                self.finish(ctx);
                Err(e)
            }
        }
    }

    /// Search for an ID field accepted by `wanted` within a few revolutions.
    /// Returns the ID (C H R N and CRC) and the number of bytes passed.
    fn scan_id(&mut self, drive: &mut Drive, wanted: impl Fn(&[u8; 6]) -> bool) -> (Option<[u8; 6]>, usize) {
        let budget = SEARCH_REVOLUTIONS * drive.track_length();
        let mut bytes = 0;
        let mut marks = 0;

        while bytes < budget {
            let byte = Self::transfer(drive, Transfer::Read);
            bytes += 1;
            if byte == MARK_A1 {
                marks += 1;
                continue;
            }
            if marks < 3 || byte != ID_AM as u16 {
                marks = 0;
                continue;
            }
            marks = 0;

            let mut id = [0u8; 6];
            for slot in id.iter_mut() {
                *slot = Self::transfer(drive, Transfer::Read) as u8;
            }
            bytes += 6;

            let crc = [0xA1, 0xA1, 0xA1, ID_AM]
                .iter()
                .chain(&id[..4])
                .fold(0xFFFF, |crc, &b| crc_add(crc, b));
            let crc_ok = crc == u16::from_be_bytes([id[4], id[5]]);

            if !wanted(&id) {
                continue;
            }
            self.crc_error = !crc_ok;
            if crc_ok || self.command >> 4 == 0xC {
                return (Some(id), bytes);
            }
            tracing::debug!("[FDC] CRC error in ID {:02X?}", &id[..4]);
        }
        (None, bytes)
    }

    /// Set DRQ and arm the lost-data timeout for the next byte.
    fn request_byte(&mut self, drive: &Drive, ctx: &mut BusContext) {
        self.drq = true;
        self.schedule(Self::byte_time(drive, ctx), ctx);
    }

    /// Move the next byte of a read into the data register.
    fn read_next(&mut self, drive: &mut Drive, ctx: &mut BusContext) {
        match self.phase {
            Phase::ReadData if self.remaining > 0 => {
                self.data = Self::transfer(drive, Transfer::Read) as u8;
                self.crc = crc_add(self.crc, self.data);
                self.remaining -= 1;
                self.request_byte(drive, ctx);
            }
            Phase::ReadData => {
                let stored = u16::from_be_bytes([
                    Self::transfer(drive, Transfer::Read) as u8,
                    Self::transfer(drive, Transfer::Read) as u8,
                ]);
                if stored != self.crc {
                    tracing::debug!("[FDC] Data CRC error in sector {}", self.sector);
                    self.crc_error = true;
                    return self.finish(ctx);
                }
                self.sector_done(drive, ctx);
            }
            Phase::ReadId => {
                self.id_index += 1;
                if self.id_index < self.id_field.len() {
                    self.data = self.id_field[self.id_index];
                    self.request_byte(drive, ctx);
                } else {
                    self.sector = self.id_field[0];
                    self.finish(ctx);
                }
            }
            Phase::ReadTrack if self.remaining > 0 => {
                self.data = Self::transfer(drive, Transfer::Read) as u8;
                self.remaining -= 1;
                self.request_byte(drive, ctx);
            }
            Phase::ReadTrack => self.finish(ctx),
            _ => {}
        }
    }

    /// Put the byte just written to the data register on the disk.
    fn write_next(&mut self, drive: &mut Drive, ctx: &mut BusContext) {
        match self.phase {
            Phase::WriteData => {
                let value = self.data;
                if self.write_byte(drive, value as u16, ctx).is_err() {
                    return;
                }
                self.crc = crc_add(self.crc, value);
                self.remaining -= 1;
                if self.remaining > 0 {
                    return self.request_byte(drive, ctx);
                }

                let [hi, lo] = self.crc.to_be_bytes();
                for byte in [hi, lo, 0xFF] {
                    if self.write_byte(drive, byte as u16, ctx).is_err() {
                        return;
                    }
                }
                self.sector_done(drive, ctx);
            }
            Phase::WriteTrack => {
                let value = self.data;
                let mut out = Vec::with_capacity(2);
                match value {
                    0xF5 => {
                        if !self.last_f5 {
                            self.crc = 0xFFFF;
                        }
                        self.crc = crc_add(self.crc, 0xA1);
                        out.push(MARK_A1);
                    }
                    0xF6 => out.push(MARK_C2),
                    0xF7 => {
                        let [hi, lo] = self.crc.to_be_bytes();
                        out.extend([hi as u16, lo as u16]);
                    }
                    _ => {
                        self.crc = crc_add(self.crc, value);
                        out.push(value as u16);
                    }
                }
                self.last_f5 = value == 0xF5;

                for byte in out {
                    if self.remaining == 0 {
                        break;
                    }
                    if self.write_byte(drive, byte, ctx).is_err() {
                        return;
                    }
                    self.remaining -= 1;
                }
                if self.remaining == 0 {
                    self.finish(ctx);
                } else {
                    self.request_byte(drive, ctx);
                }
            }
            _ => {}
        }
    }

    fn sector_done(&mut self, drive: &Drive, ctx: &mut BusContext) {
        if self.command & 0x10 == 0 {
            return self.finish(ctx);
        }
        self.sector = self.sector.wrapping_add(1);
        self.phase = Phase::SearchId;
        self.schedule(Self::byte_time(drive, ctx), ctx);
    }
}

fn command_name(command: u8) -> &'static str {
    match command >> 4 {
        0x0 => "restore",
        0x1 => "seek",
        0x2 | 0x3 => "step",
        0x4 | 0x5 => "step in",
        0x6 | 0x7 => "step out",
        0x8 | 0x9 => "read sector",
        0xA | 0xB => "write sector",
        0xC => "read address",
        0xD => "force interrupt",
        0xE => "read track",
        _ => "write track",
    }
}

impl fmt::Display for Fdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FDC: Command={:02X} Track={} Sector={} Data={:02X} Side={} State={:?}",
            self.command, self.track, self.sector, self.data, self.side, self.state
        )
    }
}
