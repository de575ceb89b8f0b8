// Raw sector dumps (TRD, IMG) exposed to the drive as MFM-style tracks

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::DiskError;

pub const DD_TRACK_LENGTH: usize = 6250;
pub const HD_TRACK_LENGTH: usize = 12500;

const GAP4A: usize = 80;
const GAP1: usize = 50;
const GAP2: usize = 22;
const MAX_GAP3: usize = 54;
const MIN_GAP3: usize = 8;
const SYNC: usize = 12;
const MARK_BYTE: u8 = 0xA1;
const INDEX_MARK_BYTE: u8 = 0xC2;
const GAP_BYTE: u8 = 0x4E;

pub const INDEX_AM: u8 = 0xFC;
pub const ID_AM: u8 = 0xFE;
pub const DATA_AM: u8 = 0xFB;
pub const DELETED_DATA_AM: u8 = 0xF8;

/// Offset of the first data byte from the start of a sector's sync field.
const SECTOR_DATA_OFFSET: usize = SYNC + 4 + 4 + 2 + GAP2 + SYNC + 4;
const TRACK_PREAMBLE: usize = GAP4A + SYNC + 4 + GAP1;

/// CRC-CCITT as computed by the controller, seeded with 0xFFFF.
pub fn crc_add(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ ((byte as u16) << 8);
    for _ in 0..8 {
        crc = if crc & 0x8000 != 0 {
            (crc << 1) ^ 0x1021
        } else {
            crc << 1
        };
    }
    crc
}

pub fn crc(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0xFFFF, |crc, &b| crc_add(crc, b))
}

/// Fixed-size bit set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.words[index / 64] & (1 << (index % 64)) != 0
    }

    pub fn set(&mut self, index: usize, value: bool) {
        if index >= self.len {
            return;
        }
        let bit = 1 << (index % 64);
        if value {
            self.words[index / 64] |= bit;
        } else {
            self.words[index / 64] &= !bit;
        }
    }

    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskGeometry {
    pub cylinders: u8,
    pub sides: u8,
    pub sectors: u8,
    pub sector_size: u16,
    /// Sector id of the first sector on a track.
    pub first_sector: u8,
}

impl DiskGeometry {
    pub const fn new(cylinders: u8, sides: u8, sectors: u8, sector_size: u16) -> Self {
        Self {
            cylinders,
            sides,
            sectors,
            sector_size,
            first_sector: 1,
        }
    }

    /// 640 KiB TR-DOS disk: 80 cylinders, 2 sides, 16 x 256 byte sectors.
    pub const TRDOS_DS80: DiskGeometry = DiskGeometry::new(80, 2, 16, 256);

    pub fn validate(&self) -> Result<(), DiskError> {
        if !(1..=2).contains(&self.sides) {
            return Err(DiskError::InvalidGeometry(format!(
                "{} sides, expected 1 or 2",
                self.sides
            )));
        }
        if !(1..=99).contains(&self.cylinders) {
            return Err(DiskError::InvalidGeometry(format!(
                "{} cylinders, expected 1 to 99",
                self.cylinders
            )));
        }
        if self.sectors == 0 || size_code(self.sector_size).is_none() {
            return Err(DiskError::InvalidGeometry(format!(
                "{} sectors of {} bytes",
                self.sectors, self.sector_size
            )));
        }
        Ok(())
    }

    pub fn size_code(&self) -> u8 {
        size_code(self.sector_size).unwrap_or(2)
    }

    pub fn track_count(&self) -> usize {
        self.cylinders as usize * self.sides as usize
    }

    pub fn total_sectors(&self) -> usize {
        self.track_count() * self.sectors as usize
    }

    pub fn total_bytes(&self) -> usize {
        self.total_sectors() * self.sector_size as usize
    }

    fn track_index(&self, cylinder: u8, side: u8) -> usize {
        cylinder as usize * self.sides as usize + side as usize
    }
}

fn size_code(sector_size: u16) -> Option<u8> {
    match sector_size {
        128 => Some(0),
        256 => Some(1),
        512 => Some(2),
        1024 => Some(3),
        _ => None,
    }
}

/// Raw track bytes plus the parallel clock-mark bitmap.
#[derive(Debug, Clone)]
struct Track {
    data: Vec<u8>,
    clocks: Bitmap,
    dirty: bool,
}

impl Track {
    fn new(length: usize) -> Self {
        Self {
            data: vec![GAP_BYTE; length],
            clocks: Bitmap::new(length),
            dirty: false,
        }
    }

    fn put(&mut self, pos: &mut usize, value: u8, count: usize) {
        for _ in 0..count {
            self.data[*pos] = value;
            *pos += 1;
        }
    }

    fn put_mark(&mut self, pos: &mut usize, mark: u8, am: u8) {
        for _ in 0..3 {
            self.clocks.set(*pos, true);
            self.data[*pos] = mark;
            *pos += 1;
        }
        self.data[*pos] = am;
        *pos += 1;
    }

    fn is_mark(&self, pos: usize) -> bool {
        (0..3).all(|n| self.clocks.get(pos + n) && self.data.get(pos + n) == Some(&MARK_BYTE))
    }
}

#[derive(Debug, Clone)]
pub struct DiskImage {
    geometry: DiskGeometry,
    /// Flat sector dump, cylinder-major then side then sector.
    data: Vec<u8>,
    tracks: Vec<Option<Track>>,
    track_length: usize,
    gap3: usize,
    present: Bitmap,
    dirty: Bitmap,
    write_protected: bool,
}

impl DiskImage {
    /// A zero-filled, formatted disk.
    pub fn blank(geometry: DiskGeometry) -> Result<Self, DiskError> {
        geometry.validate()?;
        Self::from_raw(geometry, vec![0; geometry.total_bytes()])
    }

    /// Wrap a plain sector dump. Short images are padded with zeros.
    pub fn from_raw(geometry: DiskGeometry, mut data: Vec<u8>) -> Result<Self, DiskError> {
        geometry.validate()?;
        if data.len() > geometry.total_bytes() || data.len() % geometry.sector_size as usize != 0 {
            return Err(DiskError::InvalidSize(format!(
                "{} bytes for {} sectors of {} bytes",
                data.len(),
                geometry.total_sectors(),
                geometry.sector_size
            )));
        }
        data.resize(geometry.total_bytes(), 0);

        let (track_length, gap3) = layout(&geometry)?;
        tracing::debug!(
            "[DISK] {}x{}x{}x{} image, track length {} gap3 {}",
            geometry.cylinders,
            geometry.sides,
            geometry.sectors,
            geometry.sector_size,
            track_length,
            gap3
        );

        Ok(Self {
            geometry,
            data,
            tracks: vec![None; geometry.track_count()],
            track_length,
            gap3,
            present: Bitmap::new(geometry.total_sectors()),
            dirty: Bitmap::new(geometry.total_sectors()),
            write_protected: false,
        })
    }

    pub fn load_raw<P: AsRef<Path>>(path: P, geometry: DiskGeometry) -> Result<Self, DiskError> {
        let data = fs::read(path.as_ref())?;
        tracing::info!(
            "[DISK] Loaded {} bytes from {}",
            data.len(),
            path.as_ref().display()
        );
        Self::from_raw(geometry, data)
    }

    /// Flush and write the sector dump to a file.
    pub fn save_raw<P: AsRef<Path>>(&mut self, path: P) -> Result<(), DiskError> {
        self.flush();
        fs::write(path, &self.data)?;
        Ok(())
    }

    pub fn geometry(&self) -> &DiskGeometry {
        &self.geometry
    }

    pub fn track_length(&self) -> usize {
        self.track_length
    }

    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    pub fn set_write_protected(&mut self, protected: bool) {
        self.write_protected = protected;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.any()
    }

    pub fn dirty_sectors(&self) -> usize {
        self.dirty.count()
    }

    pub fn is_sector_present(&self, cylinder: u8, side: u8, sector: usize) -> bool {
        self.sector_index(cylinder, side, sector)
            .map(|i| self.present.get(i))
            .unwrap_or(false)
    }

    /// The flat sector dump. Bytes still sitting in dirty tracks are not
    /// included until `flush`.
    pub fn to_raw(&self) -> &[u8] {
        &self.data
    }

    /// Track position of the first data byte of the sector with `sector_id`,
    /// as laid out on a freshly materialised track.
    pub fn sector_data_offset(&self, sector_id: u8) -> Option<usize> {
        let k = sector_id.checked_sub(self.geometry.first_sector)? as usize;
        (k < self.geometry.sectors as usize)
            .then(|| TRACK_PREAMBLE + k * self.sector_stride() + SECTOR_DATA_OFFSET)
    }

    fn sector_stride(&self) -> usize {
        SECTOR_DATA_OFFSET + self.geometry.sector_size as usize + 2 + self.gap3
    }

    fn sector_index(&self, cylinder: u8, side: u8, sector: usize) -> Option<usize> {
        (cylinder < self.geometry.cylinders
            && side < self.geometry.sides
            && sector < self.geometry.sectors as usize)
            .then(|| {
                self.geometry.track_index(cylinder, side) * self.geometry.sectors as usize + sector
            })
    }

    /// Byte at `pos` on a track; the high byte is 0xFF for clock marks.
    /// Missing tracks and sides read as unformatted gap.
    pub fn read_byte(&mut self, cylinder: u8, side: u8, pos: usize) -> u16 {
        let Some(track) = self.track(cylinder, side) else {
            return GAP_BYTE as u16;
        };
        let pos = pos % track.data.len();
        let clock = if track.clocks.get(pos) { 0xFF00 } else { 0 };
        clock | track.data[pos] as u16
    }

    pub fn write_byte(&mut self, cylinder: u8, side: u8, pos: usize, value: u16) {
        let stride = self.sector_stride();
        let sectors = self.geometry.sectors as usize;
        let Some(first) = self.sector_index(cylinder, side, 0) else {
            tracing::warn!("[DISK] Write outside the disk at {}/{}", cylinder, side);
            return;
        };
        let Some(track) = self.track(cylinder, side) else {
            return;
        };
        let pos = pos % track.data.len();
        track.data[pos] = value as u8;
        track.clocks.set(pos, value & 0xFF00 != 0);
        track.dirty = true;

        let sector = pos
            .checked_sub(TRACK_PREAMBLE)
            .map(|p| p / stride)
            .filter(|&k| k < sectors);
        match sector {
            Some(k) => self.dirty.set(first + k, true),
            None => (0..sectors).for_each(|k| self.dirty.set(first + k, true)),
        }
    }

    fn track(&mut self, cylinder: u8, side: u8) -> Option<&mut Track> {
        if cylinder >= self.geometry.cylinders || side >= self.geometry.sides {
            return None;
        }
        let index = self.geometry.track_index(cylinder, side);
        if self.tracks[index].is_none() {
            let track = self.build_track(cylinder, side);
            let first = index * self.geometry.sectors as usize;
            for k in 0..self.geometry.sectors as usize {
                self.present.set(first + k, true);
            }
            self.tracks[index] = Some(track);
        }
        self.tracks[index].as_mut()
    }

    fn build_track(&self, cylinder: u8, side: u8) -> Track {
        let g = &self.geometry;
        let size = g.sector_size as usize;
        let mut track = Track::new(self.track_length);
        let mut pos = GAP4A;

        track.put(&mut pos, 0x00, SYNC);
        track.put_mark(&mut pos, INDEX_MARK_BYTE, INDEX_AM);
        track.put(&mut pos, GAP_BYTE, GAP1);

        for k in 0..g.sectors {
            let id = [cylinder, side, g.first_sector + k, g.size_code()];
            track.put(&mut pos, 0x00, SYNC);
            let crc_start = pos;
            track.put_mark(&mut pos, MARK_BYTE, ID_AM);
            for byte in id {
                track.put(&mut pos, byte, 1);
            }
            let [hi, lo] = crc(&track.data[crc_start..pos]).to_be_bytes();
            track.put(&mut pos, hi, 1);
            track.put(&mut pos, lo, 1);
            track.put(&mut pos, GAP_BYTE, GAP2);

            track.put(&mut pos, 0x00, SYNC);
            let crc_start = pos;
            track.put_mark(&mut pos, MARK_BYTE, DATA_AM);
            let offset = (g.track_index(cylinder, side) * g.sectors as usize + k as usize) * size;
            track.data[pos..pos + size].copy_from_slice(&self.data[offset..offset + size]);
            pos += size;
            let [hi, lo] = crc(&track.data[crc_start..pos]).to_be_bytes();
            track.put(&mut pos, hi, 1);
            track.put(&mut pos, lo, 1);
            track.put(&mut pos, GAP_BYTE, self.gap3);
        }
        track
    }

    /// Decode every dirty track back into the sector dump.
    /// Returns the number of sectors recovered.
    pub fn flush(&mut self) -> usize {
        let g = self.geometry;
        let size = g.sector_size as usize;
        let mut written = 0;

        for cylinder in 0..g.cylinders {
            for side in 0..g.sides {
                let index = g.track_index(cylinder, side);
                let Some(track) = self.tracks[index].as_mut() else {
                    continue;
                };
                if !track.dirty {
                    continue;
                }

                for (id, data) in decode_sectors(track, size) {
                    let [c, h, r, n] = id;
                    let Some(k) = r.checked_sub(g.first_sector).map(usize::from) else {
                        continue;
                    };
                    if c != cylinder || h != side || k >= g.sectors as usize || n != g.size_code()
                    {
                        tracing::warn!(
                            "[DISK] Skipping sector C{} H{} R{} N{} on track {}/{}",
                            c,
                            h,
                            r,
                            n,
                            cylinder,
                            side
                        );
                        continue;
                    }
                    let offset = (index * g.sectors as usize + k) * size;
                    self.data[offset..offset + size].copy_from_slice(&data);
                    written += 1;
                }
                track.dirty = false;
            }
        }

        self.dirty.clear();
        tracing::debug!("[DISK] Flushed {} sectors", written);
        written
    }
}

/// Compute track length and GAP3 so the sectors fit.
fn layout(geometry: &DiskGeometry) -> Result<(usize, usize), DiskError> {
    let sectors = geometry.sectors as usize;
    let fixed = SECTOR_DATA_OFFSET + geometry.sector_size as usize + 2;

    for track_length in [DD_TRACK_LENGTH, HD_TRACK_LENGTH] {
        let room = track_length.saturating_sub(TRACK_PREAMBLE + sectors * fixed) / sectors;
        if room >= MIN_GAP3 {
            return Ok((track_length, room.min(MAX_GAP3)));
        }
    }
    Err(DiskError::FormatError(format!(
        "{} sectors of {} bytes",
        geometry.sectors, geometry.sector_size
    )))
}

/// Every readable sector of a track as `(C H R N, data)`.
fn decode_sectors(track: &Track, size: usize) -> Vec<([u8; 4], Vec<u8>)> {
    let len = track.data.len();
    let mut sectors = Vec::new();
    let mut pos = 0;

    while pos + 10 < len {
        if !(track.is_mark(pos) && track.data[pos + 3] == ID_AM) {
            pos += 1;
            continue;
        }
        let id = [
            track.data[pos + 4],
            track.data[pos + 5],
            track.data[pos + 6],
            track.data[pos + 7],
        ];
        let id_end = pos + 10;
        pos = id_end;

        // data mark must follow within GAP2 + sync + a little slack
        let search_end = (id_end + GAP2 + SYNC + 8).min(len.saturating_sub(4));
        let data_mark = (id_end..search_end).find(|&p| {
            track.is_mark(p) && matches!(track.data[p + 3], DATA_AM | DELETED_DATA_AM)
        });
        let Some(mark) = data_mark else {
            continue;
        };
        let data_start = mark + 4;
        let sector_size = 128usize << (id[3] & 0x03);
        if sector_size != size || data_start + size > len {
            continue;
        }
        sectors.push((id, track.data[data_start..data_start + size].to_vec()));
        pos = data_start + size;
    }
    sectors
}
