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

//! The command/transfer state machine (§4).
//!
//! [`FdcController`] owns the register file, the external latches, and the
//! single in-flight operation slot. It never stores a scheduler; one is
//! passed transiently to whichever method needs to arm a callback, since in
//! a real emulator the scheduler is shared bus-wide rather than owned by one
//! device.

use anyhow::{bail, Result};
use log::{debug, trace, warn};

use crate::config::{FdcConfig, DRQ_PACING_RELOAD};
use crate::disk::{Disk, TrackFormat};
use crate::dma::DmaChannel;
use crate::drive::Drive;
use crate::history::HistoryBuffer;
use crate::scheduler::{Scheduler, Token};
use crate::types::{
    Command, CommandFamily, ExternalStateLatch, ExternalStatusLatch, SectorCmdParams, StepDirection, TypeIParams,
    PORT_COMMAND_STATUS, PORT_DATA, PORT_EXTERNAL_STATE, PORT_SECTOR, PORT_TRACK, STATUS_BIT1, STATUS_BIT2,
    STATUS_BIT4, STATUS_BIT5, STATUS_BUSY, STATUS_CRC_ERROR, STATUS_NOT_READY, STATUS_WRITE_PROTECT,
};
use crate::write_track::WriteTrackParser;

const CMD_LOG_CAPACITY: usize = 32;

/// A Type I command in flight. The worker counts down a fixed number of
/// single-cylinder steps computed once at dispatch, rather than comparing
/// live register/drive positions each tick: the `track` register and the
/// drive's physical head move in lock-step (same direction, same step
/// count) but may start from different cylinders (spec §8 scenario 2), and
/// when `follows` is false the register never moves at all, so neither can
/// serve as the loop's own termination condition.
#[derive(Copy, Clone, Debug)]
struct TypeIOp {
    params: TypeIParams,
    direction: i8,
    remaining_steps: u8,
    /// Whether the `track` register should follow the head (the "update"
    /// bit for STEP/STEP-IN/STEP-OUT; always true for RESTORE/SEEK).
    follows: bool,
}

/// A Type II/III sector transfer in flight.
#[derive(Clone, Debug)]
struct SectorOp {
    cmd: Command,
    cylinder: u8,
    head: u8,
    sector: u8,
    buffer: Vec<u8>,
    index: usize,
}

/// A WriteTrack in flight.
struct WriteTrackOp {
    parser: WriteTrackParser,
}

/// The single slot tracking whatever command is currently executing.
enum ActiveOperation {
    Idle,
    TypeI(TypeIOp),
    Sector(SectorOp),
    WriteTrack(WriteTrackOp),
}

/// The FD1797-style command/transfer state machine (§2).
///
/// Generic over the drive and DMA collaborators it is bound to; the disk is
/// reached through `D::Disk`. The scheduler is passed per-call rather than
/// stored, since it is normally owned by the surrounding bus, not by one
/// device.
pub struct FdcController<D: Drive, X: DmaChannel> {
    config: FdcConfig,
    drive: D,
    dma: X,

    // Register file (§3).
    track: u8,
    sector: u8,
    data: u8,

    // External state latch, decoded (§3, §4.1).
    side_select: bool,
    double_density: bool,
    chip_enabled: bool,
    drive_select: u8,

    // Internal flags (§3).
    busy: bool,
    drq: bool,
    crc_error: bool,
    seek_error: bool,
    head_loaded: bool,
    record_type_or_write_fault: bool,
    record_not_found: bool,
    lost_data: bool,
    write_protect: bool,
    command_abort: bool,
    index_reset: bool,
    interrupt_pending: bool,

    last_command: Command,
    last_direction: StepDirection,

    active: ActiveOperation,
    drq_counter: u16,

    /// Token identifying the in-flight command operation's next scheduled
    /// tick; stale callbacks from an aborted or superseded command are inert
    /// without touching the scheduler. The index-reset timer armed by
    /// chip-enable runs independently of whatever command is executing, so
    /// it gets its own slot rather than sharing this one.
    current_command_token: Token,
    index_reset_token: Option<Token>,
    next_token: Token,

    cmd_log: HistoryBuffer<String>,
}

impl<D: Drive, X: DmaChannel> FdcController<D, X> {
    pub fn new(config: FdcConfig, drive: D, dma: X) -> Self {
        FdcController {
            config,
            drive,
            dma,
            track: 0,
            sector: 0,
            data: 0,
            side_select: false,
            double_density: false,
            chip_enabled: false,
            drive_select: 0,
            busy: false,
            drq: false,
            crc_error: false,
            seek_error: false,
            head_loaded: false,
            record_type_or_write_fault: false,
            record_not_found: false,
            lost_data: false,
            write_protect: false,
            command_abort: false,
            index_reset: false,
            interrupt_pending: false,
            last_command: Command::Restore(TypeIParams::new()),
            last_direction: StepDirection::Out,
            active: ActiveOperation::Idle,
            drq_counter: DRQ_PACING_RELOAD,
            current_command_token: 0,
            index_reset_token: None,
            next_token: 1,
            cmd_log: HistoryBuffer::new(CMD_LOG_CAPACITY),
        }
    }

    pub fn drive(&self) -> &D {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut D {
        &mut self.drive
    }

    /// Recently dispatched commands, oldest first, for post-mortem
    /// diagnostics. Bounded to the last [`CMD_LOG_CAPACITY`] entries.
    pub fn command_log(&self) -> Vec<String> {
        self.cmd_log.as_vec()
    }

    fn log_cmd(&mut self, func: &str, s: &str) {
        self.cmd_log.push(format!("{}: {}", self.last_command.name(), s));
        trace!("{}(): {}", func, s);
    }

    /// Allocate a fresh token for the in-flight command's next tick, marking
    /// it the only one `on_timer` will honor for that purpose.
    fn next_command_token(&mut self) -> Token {
        let token = self.next_token;
        self.next_token += 1;
        self.current_command_token = token;
        token
    }

    fn next_index_reset_token(&mut self) -> Token {
        let token = self.next_token;
        self.next_token += 1;
        self.index_reset_token = Some(token);
        token
    }

    // ---- §4.1 Port-level interface -----------------------------------

    pub fn write_port<S: Scheduler>(&mut self, port: u16, byte: u8, sched: &mut S) -> Result<()> {
        match port {
            PORT_COMMAND_STATUS => self.write_command(byte, sched),
            PORT_TRACK => {
                self.track = byte;
                Ok(())
            }
            PORT_SECTOR => {
                self.sector = byte;
                Ok(())
            }
            PORT_DATA => self.write_data(byte, sched),
            PORT_EXTERNAL_STATE => self.write_external_state(byte, sched),
            other => bail!("fdc_core: unexpected port write to {:#06X}", other),
        }
    }

    pub fn read_port<S: Scheduler>(&mut self, port: u16, sched: &mut S) -> Result<u8> {
        match port {
            PORT_COMMAND_STATUS => Ok(self.read_status()),
            PORT_TRACK => Ok(self.track),
            PORT_SECTOR => Ok(self.sector),
            PORT_DATA => self.read_data(sched),
            PORT_EXTERNAL_STATE => Ok(self.read_external_status()),
            other => bail!("fdc_core: unexpected port read from {:#06X}", other),
        }
    }

    fn write_external_state(&mut self, byte: u8, sched: &mut impl Scheduler) -> Result<()> {
        let latch = ExternalStateLatch::from_bytes([byte]);
        self.side_select = latch.side_select();
        self.double_density = latch.double_density();
        self.drive_select = latch.drive_select();
        self.drive.set_selected(self.drive_select == self.config.drive_unit);

        if latch.chip_enable() && !self.chip_enabled {
            self.enable_chip(sched);
        }
        else if !latch.chip_enable() && self.chip_enabled {
            self.disable_chip();
        }
        Ok(())
    }

    fn read_external_status(&self) -> u8 {
        ExternalStatusLatch::new()
            .with_disk_change(self.drive.disk_change())
            .with_dma_terminal_count(self.dma.terminal_count())
            .with_two_sided(!self.drive.is_single_sided())
            .with_not_loaded(!self.drive.is_loaded())
            .into_bytes()[0]
    }

    // ---- §4.6 Chip enable / disable -----------------------------------

    fn enable_chip(&mut self, sched: &mut impl Scheduler) {
        self.chip_enabled = true;
        self.dispatch_restore(sched);
        if self.drive.is_selected() {
            self.index_reset = true;
            let token = self.next_index_reset_token();
            sched.schedule(self.config.index_reset_duration_ns, token);
        }
    }

    fn disable_chip(&mut self) {
        self.chip_enabled = false;
        self.busy = false;
        self.drq = false;
        self.crc_error = false;
        self.seek_error = false;
        self.head_loaded = false;
        self.record_type_or_write_fault = false;
        self.record_not_found = false;
        self.lost_data = false;
        self.write_protect = false;
        self.command_abort = false;
        self.index_reset = false;
        self.index_reset_token = None;
        self.interrupt_pending = false;
        self.active = ActiveOperation::Idle;
        self.side_select = false;
        self.double_density = false;
        self.drive_select = 0;
        self.last_command = Command::Restore(TypeIParams::new());
    }

    /// Clear the pseudo-Index override asserted by [`enable_chip`]; called by
    /// `on_timer` when the index-reset token comes due.
    fn clear_index_reset(&mut self) {
        self.index_reset = false;
    }

    /// Dispatch a synthetic RESTORE as if the host had written it: used on
    /// chip-enable (§4.6) and this is, notably, where `head_load=true` is
    /// expected by spec scenario 1.
    fn dispatch_restore(&mut self, sched: &mut impl Scheduler) {
        let params = TypeIParams::new().with_head_load(true);
        let cmd = Command::Restore(params);
        self.last_command = cmd;
        self.begin_type_i(cmd, params, sched);
    }

    // ---- §4.2 Command decoder ------------------------------------------

    fn write_command(&mut self, byte: u8, sched: &mut impl Scheduler) -> Result<()> {
        let cmd = Command::decode(byte);
        if self.busy && !matches!(cmd, Command::ForceInterrupt { .. }) {
            debug!("write_command(): discarding {:?}, busy", cmd.name());
            return Ok(());
        }

        self.last_command = cmd;
        self.interrupt_pending = false;

        match cmd {
            Command::Restore(p) | Command::Seek(p) | Command::Step(p) | Command::StepIn(p) | Command::StepOut(p) => {
                self.begin_type_i(cmd, p, sched);
            }
            Command::ReadSectorSingle(p) | Command::WriteSectorSingle(p) => {
                self.begin_sector_transfer(cmd, p, sched)?;
            }
            Command::ReadSectorMultiple(_)
            | Command::WriteSectorMultiple(_)
            | Command::ReadAddress(_)
            | Command::ReadTrack(_) => {
                bail!("fdc_core: command {} is recognized but not implemented", cmd.name());
            }
            Command::WriteTrack(p) => {
                self.begin_write_track(p, sched);
            }
            Command::ForceInterrupt { condition } => {
                self.force_interrupt(condition);
            }
        }
        Ok(())
    }

    // ---- §4.3 Type I engine ---------------------------------------------

    fn begin_type_i(&mut self, cmd: Command, params: TypeIParams, sched: &mut impl Scheduler) {
        // RESTORE and SEEK walk the `track` register to an absolute
        // destination; STEP/STEP-IN/STEP-OUT always take exactly one
        // cylinder in a fixed direction. Either way, the drive's physical
        // head takes the same number of steps in the same direction as
        // `track`, but starting from its own (possibly different) physical
        // cylinder, so the loop below tracks remaining step count and
        // direction rather than a shared destination.
        let (direction, remaining_steps, follows) = match cmd {
            Command::Restore(_) => {
                self.track = self.drive.track();
                (-1i8, self.track, true)
            }
            Command::Seek(_) => {
                let delta = self.data as i16 - self.track as i16;
                let direction: i8 = if delta >= 0 { 1 } else { -1 };
                (direction, delta.unsigned_abs() as u8, true)
            }
            Command::Step(_) => (Self::direction_sign(self.last_direction), 1u8, params.update()),
            Command::StepIn(_) => {
                self.last_direction = StepDirection::In;
                (1i8, 1u8, params.update())
            }
            Command::StepOut(_) => {
                self.last_direction = StepDirection::Out;
                (-1i8, 1u8, params.update())
            }
            _ => unreachable!("begin_type_i only called for Type I commands"),
        };

        self.busy = true;
        self.command_abort = false;
        self.active = ActiveOperation::TypeI(TypeIOp {
            params,
            direction,
            remaining_steps,
            follows,
        });
        self.log_cmd("begin_type_i", &format!("direction={} steps={}", direction, remaining_steps));

        let token = self.next_command_token();
        sched.schedule(self.config.command_latency_ns, token);
    }

    fn direction_sign(direction: StepDirection) -> i8 {
        match direction {
            StepDirection::In => 1,
            StepDirection::Out => -1,
        }
    }

    /// One scheduled tick of the Type I worker: take one more cylinder step
    /// toward the destination computed in `begin_type_i`, or finish if the
    /// step budget is already spent.
    fn on_timer_type_i(&mut self, mut op: TypeIOp, sched: &mut impl Scheduler) {
        if self.command_abort {
            self.active = ActiveOperation::Idle;
            return;
        }

        if op.remaining_steps == 0 {
            self.complete_type_i(op);
            return;
        }

        let drive_next = (self.drive.track() as i16 + op.direction as i16).clamp(0, u8::MAX as i16) as u8;
        self.drive.seek_to(drive_next);
        if op.follows {
            self.track = (self.track as i16 + op.direction as i16).clamp(0, u8::MAX as i16) as u8;
        }
        op.remaining_steps -= 1;

        if op.remaining_steps == 0 {
            self.complete_type_i(op);
        } else {
            self.active = ActiveOperation::TypeI(op);
            let token = self.next_command_token();
            sched.schedule(self.config.step_time_ns, token);
        }
    }

    fn complete_type_i(&mut self, op: TypeIOp) {
        self.head_loaded = op.params.head_load();
        self.seek_error = op.params.verify() && self.drive.is_loaded() && self.track != self.drive.track();

        self.busy = false;
        self.interrupt_pending = true;
        self.active = ActiveOperation::Idle;
        self.log_cmd("complete_type_i", &format!("track={} seek_error={}", self.track, self.seek_error));
    }

    // ---- §4.4 Status synthesizer ------------------------------------------

    fn read_status(&mut self) -> u8 {
        let interrupt_was_pending = self.interrupt_pending;
        self.interrupt_pending = false;

        let mut status: u8 = 0;
        if self.busy {
            status |= STATUS_BUSY;
        }
        if !self.drive.is_selected() || !self.drive.is_loaded() {
            status |= STATUS_NOT_READY;
        }
        if self.crc_error {
            status |= STATUS_CRC_ERROR;
        }

        match self.last_command.family() {
            CommandFamily::TypeI => {
                if self.drive.index() || self.index_reset {
                    status |= STATUS_BIT1;
                }
                if self.drive.track0() {
                    status |= STATUS_BIT2;
                }
                if self.seek_error {
                    status |= STATUS_BIT4;
                }
                if self.head_loaded {
                    status |= STATUS_BIT5;
                }
                if self.write_protect {
                    status |= STATUS_WRITE_PROTECT;
                }
            }
            CommandFamily::ReadFamily => {
                if self.drq {
                    status |= STATUS_BIT1;
                }
                if self.lost_data {
                    status |= STATUS_BIT2;
                }
                if self.record_not_found {
                    status |= STATUS_BIT4;
                }
                if self.record_type_or_write_fault {
                    status |= STATUS_BIT5;
                }
            }
            CommandFamily::WriteFamily => {
                if self.drq {
                    status |= STATUS_BIT1;
                }
                if self.lost_data {
                    status |= STATUS_BIT2;
                }
                if self.record_not_found {
                    status |= STATUS_BIT4;
                }
                if self.record_type_or_write_fault {
                    status |= STATUS_BIT5;
                }
                if self.write_protect {
                    status |= STATUS_WRITE_PROTECT;
                }
            }
        }

        if interrupt_was_pending {
            trace!("read_status(): cleared interrupt_pending, byte={:08b}", status);
        }
        status
    }

    // ---- §4.5 Sector-transfer state machine -------------------------------

    fn begin_sector_transfer(&mut self, cmd: Command, params: SectorCmdParams, sched: &mut impl Scheduler) -> Result<()> {
        let _ = params;
        self.busy = true;
        self.command_abort = false;
        let token = self.next_command_token();
        sched.schedule(self.config.command_latency_ns, token);
        // Deferred to `on_timer`: the actual entry validation (§4.5 steps
        // 1-6) happens once the command-accept latency elapses, matching the
        // Type I engine's own scheduled-entry shape.
        self.active = ActiveOperation::Sector(SectorOp {
            cmd,
            cylinder: self.track,
            head: self.side_select as u8,
            sector: self.sector,
            buffer: Vec::new(),
            index: 0,
        });
        Ok(())
    }

    fn on_timer_sector_entry(&mut self, mut op: SectorOp) {
        if self.command_abort {
            self.active = ActiveOperation::Idle;
            return;
        }

        self.crc_error = false;
        self.record_not_found = false;
        self.write_protect = false;
        self.record_type_or_write_fault = false;

        let drive_track = self.drive.track();
        let is_write = matches!(op.cmd, Command::WriteSectorSingle(_));

        let track_info = self.drive.disk().get_track(op.cylinder, op.head);

        if self.track != drive_track || track_info.map(|t| op.sector > t.sector_count).unwrap_or(true) {
            self.record_not_found = true;
        }

        if let Some(track) = track_info {
            let format_ok = matches!(track.format, TrackFormat::Fm500 | TrackFormat::Mfm500);
            let density_matches = matches!(
                (track.format, self.double_density),
                (TrackFormat::Fm500, false) | (TrackFormat::Mfm500, true)
            );
            if !format_ok || !density_matches {
                self.crc_error = true;
            }
        }

        self.write_protect = is_write && self.drive.is_write_protected();

        if !self.drive.is_selected()
            || !self.drive.is_loaded()
            || self.record_not_found
            || self.crc_error
            || self.write_protect
        {
            self.busy = false;
            self.drq = false;
            self.active = ActiveOperation::Idle;
            self.log_cmd(
                "on_timer_sector_entry",
                &format!(
                    "aborted rnf={} crc={} wp={}",
                    self.record_not_found, self.crc_error, self.write_protect
                ),
            );
            return;
        }

        let sector_size = match self.drive.disk_mut().get_sector(op.cylinder, op.head, op.sector - 1) {
            Some(bytes) => bytes.len(),
            None => {
                self.record_not_found = true;
                self.busy = false;
                self.drq = false;
                self.active = ActiveOperation::Idle;
                return;
            }
        };

        op.buffer = match op.cmd {
            Command::ReadSectorSingle(_) => self
                .drive
                .disk_mut()
                .get_sector(op.cylinder, op.head, op.sector - 1)
                .map(|s| s.to_vec())
                .unwrap_or_default(),
            _ => vec![0u8; sector_size],
        };
        op.index = 0;

        self.drq = true;
        self.drq_counter = DRQ_PACING_RELOAD;
        self.log_cmd("on_timer_sector_entry", &format!("c={} h={} s={} n={}", op.cylinder, op.head, op.sector, sector_size));
        self.active = ActiveOperation::Sector(op);
    }

    /// DRQ handshake: models the real pacing countdown (§4.5, §9).
    pub fn drq(&mut self) -> bool {
        if !self.drq {
            return false;
        }
        if self.drq_counter == 0 {
            self.drq_counter = DRQ_PACING_RELOAD;
            true
        }
        else {
            self.drq_counter -= 1;
            false
        }
    }

    pub fn dma_read(&mut self) -> Result<u8> {
        let ActiveOperation::Sector(op) = &mut self.active
        else {
            bail!("fdc_core: dma_read() with no sector transfer in flight");
        };
        if op.index >= op.buffer.len() {
            warn!("dma_read(): overrun past end of sector buffer ({} bytes)", op.buffer.len());
            return Ok(0);
        }
        let byte = op.buffer[op.index];
        op.index += 1;
        self.drq_counter = DRQ_PACING_RELOAD;
        Ok(byte)
    }

    pub fn dma_write(&mut self, byte: u8) -> Result<()> {
        let ActiveOperation::Sector(op) = &mut self.active
        else {
            bail!("fdc_core: dma_write() with no sector transfer in flight");
        };
        if !matches!(op.cmd, Command::WriteSectorSingle(_)) {
            bail!(
                "fdc_core: dma_write() invariant violation: current command is {}, not WriteSectorSingle",
                op.cmd.name()
            );
        }
        if op.index >= op.buffer.len() {
            warn!("dma_write(): overrun past end of sector buffer ({} bytes)", op.buffer.len());
            return Ok(());
        }
        op.buffer[op.index] = byte;
        op.index += 1;
        self.drq_counter = DRQ_PACING_RELOAD;
        Ok(())
    }

    pub fn dma_complete(&mut self) -> Result<()> {
        self.finish_data_transfer()
    }

    fn finish_data_transfer(&mut self) -> Result<()> {
        let ActiveOperation::Sector(op) = std::mem::replace(&mut self.active, ActiveOperation::Idle)
        else {
            bail!("fdc_core: finish_data_transfer() with no sector transfer in flight");
        };

        if matches!(op.cmd, Command::WriteSectorSingle(_)) {
            if let Some(dest) = self.drive.disk_mut().get_sector(op.cylinder, op.head, op.sector - 1) {
                let n = dest.len().min(op.buffer.len());
                dest[..n].copy_from_slice(&op.buffer[..n]);
            }
            self.drive.disk_mut().set_modified();
        }

        self.drq = false;
        self.busy = false;
        self.interrupt_pending = true;
        self.log_cmd("finish_data_transfer", &format!("{} bytes", op.buffer.len()));
        Ok(())
    }

    // ---- §4.5 PIO path ------------------------------------------------

    fn write_data(&mut self, byte: u8, sched: &mut impl Scheduler) -> Result<()> {
        if !self.drq {
            self.data = byte;
            return Ok(());
        }

        match &self.active {
            ActiveOperation::WriteTrack(_) => self.feed_write_track_byte(byte)?,
            ActiveOperation::Sector(op) if matches!(op.cmd, Command::WriteSectorSingle(_)) => {
                self.dma_write(byte)?;
                if self.pio_sector_exhausted() {
                    self.finish_data_transfer()?;
                }
            }
            _ => {
                let _ = sched;
                self.data = byte;
            }
        }
        Ok(())
    }

    fn read_data(&mut self, _sched: &mut impl Scheduler) -> Result<u8> {
        if !self.drq {
            return Ok(self.data);
        }
        match &self.active {
            ActiveOperation::Sector(op) if matches!(op.cmd, Command::ReadSectorSingle(_)) => {
                let exhausted_before = op.index >= op.buffer.len();
                let byte = self.dma_read()?;
                if exhausted_before || self.pio_sector_exhausted() {
                    self.finish_data_transfer()?;
                }
                Ok(byte)
            }
            _ => Ok(self.data),
        }
    }

    fn pio_sector_exhausted(&self) -> bool {
        matches!(&self.active, ActiveOperation::Sector(op) if op.index >= op.buffer.len())
    }

    // ---- §4.7 Write-track byte-stream parser --------------------------

    fn begin_write_track(&mut self, _params: SectorCmdParams, sched: &mut impl Scheduler) {
        self.busy = true;
        self.drq = true;
        self.drq_counter = DRQ_PACING_RELOAD;
        self.command_abort = false;
        self.active = ActiveOperation::WriteTrack(WriteTrackOp {
            parser: WriteTrackParser::new(self.double_density, self.track, self.side_select as u8),
        });
        self.log_cmd("begin_write_track", "awaiting stream");
        let _ = sched;
    }

    fn feed_write_track_byte(&mut self, byte: u8) -> Result<()> {
        let ActiveOperation::WriteTrack(op) = &mut self.active
        else {
            bail!("fdc_core: feed_write_track_byte() with no WriteTrack in flight");
        };
        op.parser.feed(byte)
    }

    /// Called when the drive's index signal transitions from low to high
    /// while a WriteTrack is in flight; finalizes the stream (§4.7).
    pub fn on_index_edge(&mut self) -> Result<()> {
        if !matches!(&self.active, ActiveOperation::WriteTrack(_)) {
            return Ok(());
        }
        let ActiveOperation::WriteTrack(op) = std::mem::replace(&mut self.active, ActiveOperation::Idle)
        else {
            unreachable!("checked above");
        };
        let formatted = op.parser.finish()?;
        self.drive
            .disk_mut()
            .format_track(formatted.format, formatted.cylinder, formatted.head, formatted.sector_count, formatted.sector_size);
        self.drive.disk_mut().set_modified();

        self.drq = false;
        self.busy = false;
        self.interrupt_pending = true;
        self.log_cmd(
            "on_index_edge",
            &format!("formatted {} sectors of {} bytes", formatted.sector_count, formatted.sector_size),
        );
        Ok(())
    }

    // ---- §4.8 Force-interrupt ------------------------------------------

    fn force_interrupt(&mut self, condition: u8) {
        self.command_abort = true;
        self.busy = false;
        self.drq = false;
        self.active = ActiveOperation::Idle;
        self.last_command = Command::Restore(TypeIParams::new());
        trace!("force_interrupt(): condition bits {:#06b}", condition);
    }

    // ---- scheduler callback dispatch -----------------------------------

    /// Invoked by the embedding emulator when a previously scheduled `token`
    /// comes due. Tokens from a superseded command or a chip-disable that
    /// happened since are silently ignored.
    pub fn on_timer(&mut self, token: Token, sched: &mut impl Scheduler) {
        if self.index_reset_token == Some(token) {
            self.index_reset_token = None;
            if self.chip_enabled {
                self.clear_index_reset();
            }
            return;
        }
        if token != self.current_command_token {
            return;
        }
        if !self.chip_enabled {
            return;
        }
        if self.command_abort {
            match &self.active {
                ActiveOperation::TypeI(_) => self.active = ActiveOperation::Idle,
                ActiveOperation::Sector(_) => self.active = ActiveOperation::Idle,
                _ => {}
            }
            return;
        }

        match std::mem::replace(&mut self.active, ActiveOperation::Idle) {
            ActiveOperation::TypeI(op) => self.on_timer_type_i(op, sched),
            ActiveOperation::Sector(op) if op.buffer.is_empty() && op.index == 0 && !self.drq => {
                self.on_timer_sector_entry(op);
            }
            ActiveOperation::Sector(op) => self.active = ActiveOperation::Sector(op),
            ActiveOperation::WriteTrack(op) => self.active = ActiveOperation::WriteTrack(op),
            ActiveOperation::Idle => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::TestDisk;
    use crate::drive::TestDrive;
    use crate::dma::TestDma;
    use crate::scheduler::TestScheduler;

    fn new_controller() -> FdcController<TestDrive<TestDisk>, TestDma> {
        let drive = TestDrive::new();
        FdcController::new(FdcConfig::default(), drive, TestDma::new())
    }

    /// Run every scheduled callback to completion, including ones newly
    /// scheduled by earlier callbacks (a multi-tick Type I walk reschedules
    /// itself on every tick), rather than a single `drain_all()` pass.
    fn run_scheduler(fdc: &mut FdcController<TestDrive<TestDisk>, TestDma>, sched: &mut TestScheduler) {
        while !sched.is_empty() {
            for token in sched.drain_all() {
                fdc.on_timer(token, sched);
            }
        }
    }

    fn enable_and_select(fdc: &mut FdcController<TestDrive<TestDisk>, TestDma>, sched: &mut TestScheduler) {
        let latch = ExternalStateLatch::new().with_chip_enable(true).with_drive_select(0);
        fdc.write_port(PORT_EXTERNAL_STATE, latch.into_bytes()[0], sched).unwrap();
        run_scheduler(fdc, sched);
    }

    #[test]
    fn reset_and_restore_reaches_track_zero() {
        let mut fdc = new_controller();
        let mut sched = TestScheduler::new();
        fdc.drive.force_cylinder(5);
        fdc.track = 99;

        enable_and_select(&mut fdc, &mut sched);

        assert_eq!(fdc.track, 0);
        assert_eq!(fdc.drive.track(), 0);
        assert!(fdc.interrupt_pending);
        let status = fdc.read_status();
        assert_ne!(status & STATUS_BIT2, 0, "Track0 should be set");
        assert_eq!(status & STATUS_BUSY, 0);
        assert_ne!(status & STATUS_BIT5, 0, "HeadLoaded should reflect RESTORE's head-load bit");
    }

    #[test]
    fn seek_with_verify_failure_sets_seek_error() {
        let mut fdc = new_controller();
        let mut sched = TestScheduler::new();
        enable_and_select(&mut fdc, &mut sched);

        fdc.track = 0;
        fdc.drive.force_cylinder(3);
        fdc.write_port(PORT_DATA, 5, &mut sched).unwrap();
        // SEEK, verify=1: 0b0001_0100
        fdc.write_port(PORT_COMMAND_STATUS, 0b0001_0100, &mut sched).unwrap();
        run_scheduler(&mut fdc, &mut sched);

        assert_eq!(fdc.track, 5);
        assert!(fdc.seek_error);
    }

    #[test]
    fn sector_read_end_to_end_via_dma() {
        let mut fdc = new_controller();
        let mut sched = TestScheduler::new();
        enable_and_select(&mut fdc, &mut sched);

        let data: Vec<u8> = (0..=255u16).map(|v| (v % 256) as u8).collect();
        fdc.drive.disk_mut().seed_sector(2, 0, 3, TrackFormat::Mfm500, data.clone());
        fdc.double_density = true;
        fdc.track = 0;
        fdc.drive.force_cylinder(0);

        // SEEK to 2.
        fdc.write_port(PORT_DATA, 2, &mut sched).unwrap();
        fdc.write_port(PORT_COMMAND_STATUS, 0x10, &mut sched).unwrap();
        run_scheduler(&mut fdc, &mut sched);
        assert_eq!(fdc.track, 2);

        fdc.sector = 3;
        // ReadSectorSingle, side=0.
        fdc.write_port(PORT_COMMAND_STATUS, 0x80, &mut sched).unwrap();
        run_scheduler(&mut fdc, &mut sched);
        assert!(fdc.drq);

        let mut read_back = Vec::new();
        for _ in 0..data.len() {
            read_back.push(fdc.dma_read().unwrap());
        }
        assert_eq!(read_back, data);

        // 257th read overruns; should not panic, returns a filler byte.
        let overrun = fdc.dma_read().unwrap();
        assert_eq!(overrun, 0);

        fdc.dma_complete().unwrap();
        assert!(!fdc.busy);
        assert!(!fdc.drq);
        assert!(fdc.interrupt_pending);
    }

    #[test]
    fn force_interrupt_mid_seek_stops_without_completion() {
        let mut fdc = new_controller();
        let mut sched = TestScheduler::new();
        enable_and_select(&mut fdc, &mut sched);

        fdc.track = 0;
        fdc.write_port(PORT_DATA, 50, &mut sched).unwrap();
        fdc.write_port(PORT_COMMAND_STATUS, 0x10, &mut sched).unwrap();

        for _ in 0..10 {
            let due = sched.advance_to(sched.now() + fdc.config.step_time_ns.max(fdc.config.command_latency_ns) + 1);
            for token in due {
                fdc.on_timer(token, &mut sched);
            }
        }
        let track_before_abort = fdc.track;
        assert!(track_before_abort > 0 && track_before_abort < 50);

        fdc.write_port(PORT_COMMAND_STATUS, 0xD0, &mut sched).unwrap();
        assert!(!fdc.busy);

        let due = sched.drain_all();
        for token in due {
            fdc.on_timer(token, &mut sched);
        }
        assert_eq!(fdc.track, track_before_abort);
        assert!(!fdc.interrupt_pending);
        assert_eq!(fdc.last_command.family(), CommandFamily::TypeI);
    }

    #[test]
    fn unimplemented_command_is_fatal() {
        let mut fdc = new_controller();
        let mut sched = TestScheduler::new();
        enable_and_select(&mut fdc, &mut sched);
        // ReadSectorMultiple
        let err = fdc.write_port(PORT_COMMAND_STATUS, 0x90, &mut sched).unwrap_err();
        assert!(err.to_string().contains("not implemented"));
    }

    #[test]
    fn unrecognized_port_is_fatal() {
        let mut fdc = new_controller();
        let mut sched = TestScheduler::new();
        assert!(fdc.write_port(0x99, 0, &mut sched).is_err());
        assert!(fdc.read_port(0x99, &mut sched).is_err());
    }

    #[test]
    fn dma_write_disallowed_for_non_write_command() {
        let mut fdc = new_controller();
        let mut sched = TestScheduler::new();
        enable_and_select(&mut fdc, &mut sched);
        fdc.drive
            .disk_mut()
            .seed_sector(0, 0, 1, TrackFormat::Mfm500, vec![0u8; 512]);
        fdc.double_density = true;
        fdc.sector = 1;
        fdc.write_port(PORT_COMMAND_STATUS, 0x80, &mut sched).unwrap();
        run_scheduler(&mut fdc, &mut sched);

        let err = fdc.dma_write(0x42).unwrap_err();
        assert!(err.to_string().contains("invariant violation"));
    }
}
