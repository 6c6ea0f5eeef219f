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

//! The DMA collaborator (§6).
//!
//! The 8237-style DMA controller itself is out of scope; `fdc_core` only
//! needs its terminal-count signal, since that bit gets folded into the
//! external status byte (§4.4). [`FdcController`](crate::controller::FdcController)
//! implements the *inbound* half of this relationship itself
//! (`drq`/`dma_read`/`dma_write`/`dma_complete`), so there is no trait for
//! that direction here.

/// Contract for the DMA engine the controller's sector transfers ride on.
pub trait DmaChannel {
    /// Terminal-count line, asserted by the DMA engine once its transfer's
    /// byte count has been exhausted. Read-only from the FDC's side; folded
    /// into the external status latch (§3 "External status latch").
    fn terminal_count(&self) -> bool;
}

/// A trivial reference [`DmaChannel`] for tests: terminal count is set and
/// cleared directly by the test rather than driven by a real transfer count.
#[derive(Default)]
pub struct TestDma {
    tc: bool,
}

impl TestDma {
    pub fn new() -> Self {
        TestDma::default()
    }

    pub fn set_terminal_count(&mut self, tc: bool) {
        self.tc = tc;
    }
}

impl DmaChannel for TestDma {
    fn terminal_count(&self) -> bool {
        self.tc
    }
}
