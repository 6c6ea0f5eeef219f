/*
    fdc_core

    Copyright 2025 The fdc_core Contributors

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the "Software"),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.
*/

//! The disk-image collaborator (§6).
//!
//! Entirely out of scope for the FDC core itself - the spec treats the
//! disk container as an external collaborator described only by its
//! contract. `fdc_core` defines that contract as the [`Disk`] trait and
//! ships [`TestDisk`], a trivial in-memory reference implementation used by
//! the crate's own tests (and usable by a frontend that just wants
//! something to drive the controller against before wiring up a real disk
//! image library).

use std::collections::HashMap;

/// Low-level recording format of a track. Only the two formats the spec
/// requires the sector engine to recognize.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TrackFormat {
    /// Single-density FM at 500 kbit/s.
    Fm500,
    /// Double-density MFM at 500 kbit/s.
    Mfm500,
}

/// Geometry of one physical track, as reported by [`Disk::get_track`].
#[derive(Copy, Clone, Debug)]
pub struct Track {
    pub format: TrackFormat,
    pub sector_count: u8,
}

/// Contract for the disk-image container.
///
/// `cylinder`/`head` address a physical track; `sector_zero_index` is
/// zero-indexed (the FDC's own `sector` register is 1-indexed, callers
/// subtract one, per spec §6).
pub trait Disk {
    fn get_track(&self, cylinder: u8, head: u8) -> Option<Track>;

    /// Borrow a sector's backing byte array mutably, for both read and
    /// write transfers.
    fn get_sector(&mut self, cylinder: u8, head: u8, sector_zero_index: u8) -> Option<&mut [u8]>;

    /// Lay down a freshly formatted track, replacing whatever was there.
    fn format_track(&mut self, format: TrackFormat, cylinder: u8, head: u8, sector_count: u8, sector_size: usize);

    /// Mark the disk image modified (dirty) for the host's save-prompt
    /// bookkeeping. A no-op stand-in is fine for tests.
    fn set_modified(&mut self);
}

struct TestTrack {
    format: TrackFormat,
    sectors: Vec<Vec<u8>>,
}

/// A trivial in-memory [`Disk`] implementation keyed by `(cylinder, head)`.
#[derive(Default)]
pub struct TestDisk {
    tracks: HashMap<(u8, u8), TestTrack>,
    modified: bool,
}

impl TestDisk {
    pub fn new() -> Self {
        TestDisk::default()
    }

    /// Test helper: pre-populate a sector's contents without going through
    /// `format_track` first (useful to set up a read scenario directly).
    pub fn seed_sector(&mut self, cylinder: u8, head: u8, sector_one_index: u8, format: TrackFormat, data: Vec<u8>) {
        let track = self.tracks.entry((cylinder, head)).or_insert_with(|| TestTrack {
            format,
            sectors: Vec::new(),
        });
        track.format = format;
        let idx = (sector_one_index - 1) as usize;
        if track.sectors.len() <= idx {
            track.sectors.resize(idx + 1, Vec::new());
        }
        track.sectors[idx] = data;
    }

    pub fn modified(&self) -> bool {
        self.modified
    }
}

impl Disk for TestDisk {
    fn get_track(&self, cylinder: u8, head: u8) -> Option<Track> {
        self.tracks.get(&(cylinder, head)).map(|t| Track {
            format: t.format,
            sector_count: t.sectors.len() as u8,
        })
    }

    fn get_sector(&mut self, cylinder: u8, head: u8, sector_zero_index: u8) -> Option<&mut [u8]> {
        self.tracks
            .get_mut(&(cylinder, head))?
            .sectors
            .get_mut(sector_zero_index as usize)
            .map(|v| v.as_mut_slice())
    }

    fn format_track(&mut self, format: TrackFormat, cylinder: u8, head: u8, sector_count: u8, sector_size: usize) {
        let sectors = vec![vec![0u8; sector_size]; sector_count as usize];
        self.tracks.insert((cylinder, head), TestTrack { format, sectors });
        self.modified = true;
    }

    fn set_modified(&mut self) {
        self.modified = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_then_read_round_trips_size() {
        let mut disk = TestDisk::new();
        disk.format_track(TrackFormat::Mfm500, 7, 0, 9, 512);
        let track = disk.get_track(7, 0).unwrap();
        assert_eq!(track.sector_count, 9);
        let sector = disk.get_sector(7, 0, 2).unwrap();
        assert_eq!(sector.len(), 512);
    }
}
