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

//! Emulation core for a Western Digital FD1797-style floppy disk controller.
//!
//! This crate implements the command/transfer state machine, the external
//! state/status latches, and the write-track byte-stream parser. The
//! physical drive, the disk image container, the event scheduler, and the
//! DMA engine are modelled as collaborator traits ([`drive::Drive`],
//! [`disk::Disk`], [`scheduler::Scheduler`], [`dma::DmaChannel`]) that an
//! embedding emulator supplies; this crate ships trivial in-memory
//! reference implementations of each for its own tests.

pub mod config;
pub mod controller;
pub mod disk;
pub mod dma;
pub mod drive;
pub mod history;
pub mod scheduler;
pub mod types;
pub mod write_track;

pub use config::FdcConfig;
pub use controller::FdcController;
pub use disk::{Disk, TestDisk, Track, TrackFormat};
pub use dma::{DmaChannel, TestDma};
pub use drive::{Drive, TestDrive};
pub use scheduler::{Scheduler, TestScheduler, Token};
