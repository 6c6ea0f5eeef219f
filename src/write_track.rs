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

//! The write-track raw byte-stream parser (§4.7).
//!
//! A `WriteTrack` command hands the host a PIO data port and expects it to
//! deposit one byte per write until the drive's index signal is next
//! observed. This module is the automaton that reconstructs sector geometry
//! from that stream; [`crate::controller::FdcController`] owns one per
//! in-flight `WriteTrack` and feeds it a byte at a time.

use std::collections::HashSet;

use anyhow::{bail, Result};

use crate::disk::TrackFormat;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Gap4,
    IndexMark,
    IdRecordMark,
    CollectingId,
    DataRecordMark,
    CollectingData,
    AwaitingRecordEnd,
}

const GAP4_MFM: u8 = 0x4E;
const GAP4_FM: u8 = 0xFF;
const SOFT_INDEX_MARK: u8 = 0xFC;
const ID_RECORD_MARK: u8 = 0xFE;
const DATA_RECORD_MARK: u8 = 0xFB;
const RECORD_END: u8 = 0xF7;

/// The geometry [`WriteTrackParser::finish`] hands back once a complete,
/// well-formed stream has been consumed, ready to pass to
/// [`crate::disk::Disk::format_track`].
#[derive(Copy, Clone, Debug)]
pub struct FormattedTrack {
    pub format: TrackFormat,
    pub cylinder: u8,
    pub head: u8,
    pub sector_count: u8,
    pub sector_size: usize,
}

/// Reconstructs sector geometry from a raw WriteTrack byte stream.
///
/// `expected_track`/`expected_head` are the FDC `track` register and the
/// side-select bit latched at the moment the WriteTrack command was
/// accepted; every sector-ID record in the stream must declare the same
/// values, or the stream is malformed (§4.7, §7 taxonomy 2).
pub struct WriteTrackParser {
    state: State,
    double_density: bool,
    expected_track: u8,
    expected_head: u8,
    sector_size: Option<usize>,
    order: Vec<u8>,
    seen: HashSet<u8>,
    id_bytes: Vec<u8>,
    data_remaining: usize,
    current_sector: u8,
}

impl WriteTrackParser {
    pub fn new(double_density: bool, expected_track: u8, expected_head: u8) -> Self {
        WriteTrackParser {
            state: State::Gap4,
            double_density,
            expected_track,
            expected_head,
            sector_size: None,
            order: Vec::new(),
            seen: HashSet::new(),
            id_bytes: Vec::with_capacity(4),
            data_remaining: 0,
            current_sector: 0,
        }
    }

    /// Decode the sector-length code carried by every ID record. Only
    /// 0..=3 are valid (§4.7); anything else is fatal.
    fn decode_length_code(code: u8) -> Result<usize> {
        match code {
            0 => Ok(128),
            1 => Ok(256),
            2 => Ok(512),
            3 => Ok(1024),
            other => bail!("WriteTrack: invalid sector length code {} (only 0-3 are defined)", other),
        }
    }

    fn complete_id_record(&mut self) -> Result<()> {
        let track = self.id_bytes[0];
        let head = self.id_bytes[1];
        let sector = self.id_bytes[2];
        let length_code = self.id_bytes[3];

        if track != self.expected_track {
            bail!(
                "WriteTrack: sector ID declares track {} but FDC track register is {}",
                track,
                self.expected_track
            );
        }
        if head != self.expected_head {
            bail!(
                "WriteTrack: sector ID declares head {} but side-select is {}",
                head,
                self.expected_head
            );
        }

        let size = Self::decode_length_code(length_code)?;
        match self.sector_size {
            None => self.sector_size = Some(size),
            Some(existing) if existing != size => bail!(
                "WriteTrack: sector {} declares size {} bytes but track size was already set to {} bytes",
                sector,
                size,
                existing
            ),
            _ => {}
        }

        if !self.seen.insert(sector) {
            bail!("WriteTrack: sector {} appears twice on the same track", sector);
        }
        self.order.push(sector);
        self.current_sector = sector;
        self.state = State::DataRecordMark;
        Ok(())
    }

    /// Feed one more byte of the raw stream into the automaton.
    pub fn feed(&mut self, byte: u8) -> Result<()> {
        match self.state {
            State::Gap4 => match byte {
                GAP4_MFM if self.double_density => self.state = State::IndexMark,
                GAP4_FM if !self.double_density => self.state = State::IndexMark,
                GAP4_MFM | GAP4_FM => bail!(
                    "WriteTrack: gap-4 filler {:#04X} does not match the current density flag",
                    byte
                ),
                other => bail!(
                    "WriteTrack: expected gap-4 filler (0x4E/0xFF) as the first byte, got {:#04X}",
                    other
                ),
            },
            State::IndexMark => {
                if byte == SOFT_INDEX_MARK {
                    self.state = State::IdRecordMark;
                }
                // otherwise: more gap filler, absorbed silently
            }
            State::IdRecordMark => {
                if byte == ID_RECORD_MARK {
                    self.id_bytes.clear();
                    self.state = State::CollectingId;
                }
                // otherwise: inter-record gap filler, absorbed silently
            }
            State::CollectingId => {
                self.id_bytes.push(byte);
                if self.id_bytes.len() == 4 {
                    self.complete_id_record()?;
                }
            }
            State::DataRecordMark => {
                if byte == DATA_RECORD_MARK {
                    let size = self
                        .sector_size
                        .expect("sector_size is set before entering DataRecordMark");
                    self.data_remaining = size;
                    self.state = if size == 0 {
                        State::AwaitingRecordEnd
                    }
                    else {
                        State::CollectingData
                    };
                }
                // otherwise: inter-field gap filler, absorbed silently
            }
            State::CollectingData => {
                self.data_remaining -= 1;
                if self.data_remaining == 0 {
                    self.state = State::AwaitingRecordEnd;
                }
            }
            State::AwaitingRecordEnd => {
                if byte != RECORD_END {
                    bail!(
                        "WriteTrack: expected record-end marker 0xF7 after sector {} data, got {:#04X}",
                        self.current_sector,
                        byte
                    );
                }
                self.state = State::IdRecordMark;
            }
        }
        Ok(())
    }

    /// Finalize parsing once the drive's index edge has been observed.
    /// Fails if the stream ended mid-record or the sectors seen do not form
    /// a contiguous `1..=N` prefix (§4.7).
    pub fn finish(self) -> Result<FormattedTrack> {
        if !matches!(self.state, State::IdRecordMark) {
            bail!("WriteTrack: index reached while mid-record (state {:?})", self.state);
        }
        if self.order.is_empty() {
            bail!("WriteTrack: stream produced no sectors before the index edge");
        }
        let n = self.order.len() as u8;
        for s in 1..=n {
            if !self.seen.contains(&s) {
                bail!("WriteTrack: sector numbers are not a contiguous 1..={} prefix (missing {})", n, s);
            }
        }

        Ok(FormattedTrack {
            format: if self.double_density {
                TrackFormat::Mfm500
            }
            else {
                TrackFormat::Fm500
            },
            cylinder: self.expected_track,
            head: self.expected_head,
            sector_count: n,
            sector_size: self.sector_size.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_sector(p: &mut WriteTrackParser, track: u8, head: u8, sector: u8, length_code: u8, size: usize) {
        p.feed(ID_RECORD_MARK).unwrap();
        p.feed(track).unwrap();
        p.feed(head).unwrap();
        p.feed(sector).unwrap();
        p.feed(length_code).unwrap();
        p.feed(DATA_RECORD_MARK).unwrap();
        for _ in 0..size {
            p.feed(0x00).unwrap();
        }
        p.feed(RECORD_END).unwrap();
    }

    #[test]
    fn valid_double_density_layout() {
        let mut p = WriteTrackParser::new(true, 7, 0);
        p.feed(GAP4_MFM).unwrap();
        p.feed(SOFT_INDEX_MARK).unwrap();
        for s in 1..=9u8 {
            feed_sector(&mut p, 7, 0, s, 2, 512);
        }
        let track = p.finish().unwrap();
        assert_eq!(track.sector_count, 9);
        assert_eq!(track.sector_size, 512);
        assert_eq!(track.cylinder, 7);
        assert!(matches!(track.format, TrackFormat::Mfm500));
    }

    #[test]
    fn invalid_length_code_is_fatal() {
        let mut p = WriteTrackParser::new(true, 7, 0);
        p.feed(GAP4_MFM).unwrap();
        p.feed(SOFT_INDEX_MARK).unwrap();
        for s in 1..=4u8 {
            feed_sector(&mut p, 7, 0, s, 2, 512);
        }
        // Sector 5 declares an invalid length code (3 maps to 1024, try an
        // out-of-range code instead).
        p.feed(ID_RECORD_MARK).unwrap();
        p.feed(7).unwrap();
        p.feed(0).unwrap();
        p.feed(5).unwrap();
        let err = p.feed(7).unwrap_err();
        assert!(err.to_string().contains("invalid sector length code"));
    }

    #[test]
    fn duplicate_sector_number_is_fatal() {
        let mut p = WriteTrackParser::new(true, 7, 0);
        p.feed(GAP4_MFM).unwrap();
        p.feed(SOFT_INDEX_MARK).unwrap();
        feed_sector(&mut p, 7, 0, 1, 2, 512);
        p.feed(ID_RECORD_MARK).unwrap();
        p.feed(7).unwrap();
        p.feed(0).unwrap();
        let err = p.feed(1).unwrap_err();
        assert!(err.to_string().contains("appears twice"));
    }

    #[test]
    fn gap_density_mismatch_is_fatal() {
        let mut p = WriteTrackParser::new(true, 7, 0);
        let err = p.feed(GAP4_FM).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn non_contiguous_sectors_are_fatal() {
        let mut p = WriteTrackParser::new(false, 1, 0);
        p.feed(GAP4_FM).unwrap();
        p.feed(SOFT_INDEX_MARK).unwrap();
        feed_sector(&mut p, 1, 0, 1, 0, 128);
        feed_sector(&mut p, 1, 0, 3, 0, 128);
        let err = p.finish().unwrap_err();
        assert!(err.to_string().contains("contiguous"));
    }
}
