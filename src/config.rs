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

//! Configuration for [`crate::controller::FdcController`].
//!
//! Mirrors the teacher's `FloppyDriveConfig`-style construction parameters:
//! a small `serde`-derived struct supplied at construction time, rather than
//! constants baked into the controller.

use serde::{Deserialize, Serialize};

/// Command-accept latency: the delay between a command being accepted and
/// the worker's first scheduled tick. Named `FDC_COMMAND_LATENCY_NS` in the
/// spec; 12 microseconds by default.
pub const DEFAULT_COMMAND_LATENCY_NS: u64 = 12_000;

/// Per-cylinder head step time. 6 milliseconds by default.
pub const DEFAULT_STEP_TIME_NS: u64 = 6_000_000;

/// Duration of the pseudo-Index override asserted after a chip-enable rising
/// edge. The spec calls this value out explicitly as a guess reproducing
/// undocumented FD1797 behaviour a diagnostic relies on, and asks that a
/// port keep it as a named, tunable constant. 10 milliseconds by default.
pub const DEFAULT_INDEX_OVERRIDE_NS: u64 = 10_000_000;

/// DRQ pacing countdown. Preserved verbatim from the source behaviour this
/// is ported from: the counter resets to 16 after each asserted poll.
pub const DRQ_PACING_RELOAD: u16 = 16;

/// Scratch buffer size for an in-flight `WriteTrack`.
pub const WRITE_TRACK_BUFFER_CAPACITY: usize = 65_536;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FdcConfig {
    /// Delay, in nanoseconds, between a command being accepted and the
    /// first scheduled tick of its worker.
    pub command_latency_ns: u64,
    /// Delay, in nanoseconds, between successive head-step ticks.
    pub step_time_ns: u64,
    /// Duration, in nanoseconds, of the post-reset pseudo-Index override.
    pub index_reset_duration_ns: u64,
    /// Which external-latch `drive_select` value (0-7) addresses the single
    /// `Drive` this controller is bound to. The spec models exactly one bound
    /// drive per controller but a 3-bit drive-select field in the latch; a
    /// write that selects any other unit simply deselects ours.
    pub drive_unit: u8,
}

impl Default for FdcConfig {
    fn default() -> Self {
        FdcConfig {
            command_latency_ns: DEFAULT_COMMAND_LATENCY_NS,
            step_time_ns: DEFAULT_STEP_TIME_NS,
            index_reset_duration_ns: DEFAULT_INDEX_OVERRIDE_NS,
            drive_unit: 0,
        }
    }
}
