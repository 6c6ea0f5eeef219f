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

//! The scheduler collaborator (§6, §9 "Callback-based scheduling").
//!
//! The real scheduler lives in the surrounding emulator and is shared by
//! every device on the bus; `fdc_core` only depends on its contract. Rather
//! than threading `FnMut` closures that capture the controller (the pattern
//! the teacher's original control flow used and the design notes call out
//! as something to avoid in a systems-language port), the controller hands
//! the scheduler an opaque `u64` token. When the token comes due the
//! embedding emulator calls [`crate::controller::FdcController::on_timer`]
//! with that token; the controller matches it against its single
//! `current_token` slot and guards with `command_abort` before doing
//! anything, which makes cancellation (ForceInterrupt) a matter of bumping
//! a counter rather than invalidating a closure.

/// A token identifying one scheduled callback. Opaque to the scheduler;
/// meaningful only to the component that scheduled it.
pub type Token = u64;

/// Contract for the external event scheduler.
pub trait Scheduler {
    /// Schedule `token` to fire after `delay_ns` nanoseconds of simulated
    /// time have elapsed.
    fn schedule(&mut self, delay_ns: u64, token: Token);
}

/// A deterministic, manually-advanced scheduler used by tests and by any
/// frontend that wants a trivial reference implementation rather than
/// wiring up its own event loop. Not gated behind `#[cfg(test)]`: a small
/// embedding emulator can use this directly, the same role the teacher's
/// own `FloppyDiskDrive` plays relative to a real disk image backend.
#[derive(Default)]
pub struct TestScheduler {
    now_ns: u64,
    pending: Vec<(u64, Token)>,
}

impl TestScheduler {
    pub fn new() -> Self {
        TestScheduler {
            now_ns: 0,
            pending: Vec::new(),
        }
    }

    pub fn now(&self) -> u64 {
        self.now_ns
    }

    /// Advance simulated time to `now_ns`, returning every token whose
    /// deadline is at or before `now_ns`, in scheduled (deadline, then
    /// insertion) order.
    pub fn advance_to(&mut self, now_ns: u64) -> Vec<Token> {
        self.now_ns = now_ns;
        let mut due_idx: Vec<usize> = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, (deadline, _))| *deadline <= now_ns)
            .map(|(i, _)| i)
            .collect();
        due_idx.sort_by_key(|&i| self.pending[i].0);

        let mut due = Vec::with_capacity(due_idx.len());
        for &i in &due_idx {
            due.push(self.pending[i].1);
        }

        let due_set: std::collections::HashSet<usize> = due_idx.into_iter().collect();
        let mut kept = Vec::with_capacity(self.pending.len());
        for (i, entry) in self.pending.drain(..).enumerate() {
            if !due_set.contains(&i) {
                kept.push(entry);
            }
        }
        self.pending = kept;

        due
    }

    /// Convenience for tests: run every scheduled callback up to and
    /// including the one with the furthest deadline currently pending.
    pub fn drain_all(&mut self) -> Vec<Token> {
        let Some(&(max_deadline, _)) = self.pending.iter().max_by_key(|(d, _)| *d) else {
            return Vec::new();
        };
        self.advance_to(max_deadline)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Scheduler for TestScheduler {
    fn schedule(&mut self, delay_ns: u64, token: Token) {
        self.pending.push((self.now_ns + delay_ns, token));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_order() {
        let mut s = TestScheduler::new();
        s.schedule(100, 1);
        s.schedule(50, 2);
        let due = s.advance_to(100);
        assert_eq!(due, vec![2, 1]);
        assert!(s.is_empty());
    }

    #[test]
    fn future_tokens_stay_pending() {
        let mut s = TestScheduler::new();
        s.schedule(100, 1);
        let due = s.advance_to(50);
        assert!(due.is_empty());
        assert!(!s.is_empty());
    }
}
