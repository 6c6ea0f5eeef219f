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

//! Port map, command decoding, and status-bit layouts (§4.1, §4.2, §4.4).

use modular_bitfield::prelude::*;

/// FDC command/status port (W: command, R: status).
pub const PORT_COMMAND_STATUS: u16 = 0x84;
/// Track register, read/write.
pub const PORT_TRACK: u16 = 0x85;
/// Sector register, read/write.
pub const PORT_SECTOR: u16 = 0x86;
/// Data register, read/write.
pub const PORT_DATA: u16 = 0x87;
/// External state (W) / external status (R) latch.
pub const PORT_EXTERNAL_STATE: u16 = 0xE8;

// Status byte bit positions, shared across all layouts (§4.4 table).
pub const STATUS_BUSY: u8 = 0b0000_0001;
pub const STATUS_BIT1: u8 = 0b0000_0010; // Index (I) / DRQ (II/III)
pub const STATUS_BIT2: u8 = 0b0000_0100; // Track0 (I) / LostData (II/III)
pub const STATUS_CRC_ERROR: u8 = 0b0000_1000;
pub const STATUS_BIT4: u8 = 0b0001_0000; // SeekErr (I) / RNF (II/III)
pub const STATUS_BIT5: u8 = 0b0010_0000; // HeadLoaded (I) / RecType (II/III write)
pub const STATUS_WRITE_PROTECT: u8 = 0b0100_0000; // WriteProt (I, Wr)
pub const STATUS_NOT_READY: u8 = 0b1000_0000;

/// Which status-byte layout a command family selects (§4.4).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandFamily {
    TypeI,
    ReadFamily,
    WriteFamily,
}

/// Low-nibble parameter bits for every Type I command (§4.2).
#[bitfield]
#[derive(Copy, Clone, Debug, Default)]
pub struct TypeIParams {
    pub step_rate: B2, // ignored
    pub verify: bool,
    pub head_load: bool,
    pub update: bool,
    #[skip]
    unused: B3,
}

/// Low-nibble parameter bits for every Type II/III command (§4.2).
#[bitfield]
#[derive(Copy, Clone, Debug, Default)]
pub struct SectorCmdParams {
    pub dam_override: bool, // ignored
    pub side_select: bool,
    pub delay_flag: bool, // ignored (15ms delay)
    pub long_sector: bool, // ignored
    #[skip]
    unused: B4,
}

/// Direction of the most recent single-cylinder step, used by the bare
/// STEP command (no direction bit) to repeat it (§4.3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepDirection {
    In,
    Out,
}

/// A fully decoded command-register write (§4.2).
#[derive(Copy, Clone, Debug)]
pub enum Command {
    Restore(TypeIParams),
    Seek(TypeIParams),
    Step(TypeIParams),
    StepIn(TypeIParams),
    StepOut(TypeIParams),
    ReadSectorSingle(SectorCmdParams),
    ReadSectorMultiple(SectorCmdParams),
    WriteSectorSingle(SectorCmdParams),
    WriteSectorMultiple(SectorCmdParams),
    ReadAddress(SectorCmdParams),
    ReadTrack(SectorCmdParams),
    WriteTrack(SectorCmdParams),
    ForceInterrupt { condition: u8 },
}

impl Command {
    /// Decode a byte written to the command port. The high nibble selects
    /// the family; for Type I commands the low-order bit of that nibble
    /// doubles as the "update" parameter bit, which is why `TypeIParams`
    /// is built from the whole byte rather than just the low nibble.
    pub fn decode(byte: u8) -> Command {
        match byte >> 4 {
            0x0 => Command::Restore(TypeIParams::from_bytes([byte])),
            0x1 => Command::Seek(TypeIParams::from_bytes([byte])),
            0x2 | 0x3 => Command::Step(TypeIParams::from_bytes([byte])),
            0x4 | 0x5 => Command::StepIn(TypeIParams::from_bytes([byte])),
            0x6 | 0x7 => Command::StepOut(TypeIParams::from_bytes([byte])),
            0x8 => Command::ReadSectorSingle(SectorCmdParams::from_bytes([byte])),
            0x9 => Command::ReadSectorMultiple(SectorCmdParams::from_bytes([byte])),
            0xA => Command::WriteSectorSingle(SectorCmdParams::from_bytes([byte])),
            0xB => Command::WriteSectorMultiple(SectorCmdParams::from_bytes([byte])),
            0xC => Command::ReadAddress(SectorCmdParams::from_bytes([byte])),
            0xD => Command::ForceInterrupt { condition: byte & 0x0F },
            0xE => Command::ReadTrack(SectorCmdParams::from_bytes([byte])),
            0xF => Command::WriteTrack(SectorCmdParams::from_bytes([byte])),
            _ => unreachable!("nibble is 4 bits"),
        }
    }

    pub fn family(&self) -> CommandFamily {
        use Command::*;
        match self {
            Restore(_) | Seek(_) | Step(_) | StepIn(_) | StepOut(_) | ForceInterrupt { .. } => CommandFamily::TypeI,
            ReadSectorSingle(_) | ReadSectorMultiple(_) | ReadAddress(_) | ReadTrack(_) => CommandFamily::ReadFamily,
            WriteSectorSingle(_) | WriteSectorMultiple(_) | WriteTrack(_) => CommandFamily::WriteFamily,
        }
    }

    pub fn name(&self) -> &'static str {
        use Command::*;
        match self {
            Restore(_) => "Restore",
            Seek(_) => "Seek",
            Step(_) => "Step",
            StepIn(_) => "StepIn",
            StepOut(_) => "StepOut",
            ReadSectorSingle(_) => "ReadSectorSingle",
            ReadSectorMultiple(_) => "ReadSectorMultiple",
            WriteSectorSingle(_) => "WriteSectorSingle",
            WriteSectorMultiple(_) => "WriteSectorMultiple",
            ReadAddress(_) => "ReadAddress",
            ReadTrack(_) => "ReadTrack",
            WriteTrack(_) => "WriteTrack",
            ForceInterrupt { .. } => "ForceInterrupt",
        }
    }
}

/// External state latch, write side (§3, §4.1). Bit assignment is this
/// crate's own choice, the spec names the fields but not their bit
/// positions, documented in `DESIGN.md`.
#[bitfield]
#[derive(Copy, Clone, Debug, Default)]
pub struct ExternalStateLatch {
    pub wait_enable: bool, // ignored
    pub precomp: bool,     // ignored
    pub side_select: bool,
    pub double_density: bool,
    pub chip_enable: bool,
    pub drive_select: B3,
}

/// External status latch, read side (§3, §4.1). Bit assignment is this
/// crate's own choice, documented in `DESIGN.md`.
#[bitfield]
#[derive(Copy, Clone, Debug, Default)]
pub struct ExternalStatusLatch {
    pub disk_change: bool,
    pub dma_terminal_count: bool,
    pub two_sided: bool,
    #[skip]
    unused: B4,
    pub not_loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_step_family_and_update_bit() {
        let cmd = Command::decode(0b0011_0101); // Step, update=1, head_load=0, verify=1
        match cmd {
            Command::Step(p) => {
                assert!(p.update());
                assert!(p.verify());
                assert!(!p.head_load());
            }
            _ => panic!("expected Step"),
        }
    }

    #[test]
    fn decodes_restore_and_seek_without_update_ambiguity() {
        assert!(matches!(Command::decode(0x00), Command::Restore(_)));
        assert!(matches!(Command::decode(0x10), Command::Seek(_)));
    }

    #[test]
    fn decodes_force_interrupt_condition_bits() {
        match Command::decode(0xD5) {
            Command::ForceInterrupt { condition } => assert_eq!(condition, 0x5),
            _ => panic!("expected ForceInterrupt"),
        }
    }

    #[test]
    fn families_group_as_spec_table_describes() {
        assert_eq!(Command::decode(0x00).family(), CommandFamily::TypeI);
        assert_eq!(Command::decode(0x80).family(), CommandFamily::ReadFamily);
        assert_eq!(Command::decode(0xA0).family(), CommandFamily::WriteFamily);
        assert_eq!(Command::decode(0xF0).family(), CommandFamily::WriteFamily);
    }
}
