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

//! A fixed-size ring buffer that overwrites its oldest entry once full.
//!
//! Used by [`crate::controller::FdcController`] to keep a bounded log of
//! recently dispatched commands for diagnostics, without requiring a logger
//! to be installed.

#[derive(Debug)]
pub struct HistoryBuffer<T>
where
    T: Clone,
{
    buffer: Vec<T>,
    capacity: usize,
    start: usize,
    end: usize,
    full: bool,
}

impl<T> HistoryBuffer<T>
where
    T: Clone,
{
    pub fn new(capacity: usize) -> Self {
        HistoryBuffer {
            buffer: Vec::with_capacity(capacity),
            capacity,
            start: 0,
            end: 0,
            full: false,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.full {
            self.buffer[self.start] = item;
            self.start = (self.start + 1) % self.capacity;
            self.end = self.start;
        }
        else {
            if self.buffer.len() < self.capacity {
                self.buffer.push(item);
            }
            else {
                self.buffer[self.end] = item;
            }
            self.end = (self.end + 1) % self.capacity;
            self.full = self.end == self.start;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer[self.start..]
            .iter()
            .chain(self.buffer[..self.start].iter())
            .take(self.len())
    }

    pub fn as_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        if self.full {
            self.capacity
        }
        else {
            self.end
        }
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
        self.full = false;
        self.buffer.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0 && !self.full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_when_full() {
        let mut h = HistoryBuffer::new(3);
        h.push(1);
        h.push(2);
        h.push(3);
        h.push(4);
        assert_eq!(h.as_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn not_full_preserves_order() {
        let mut h = HistoryBuffer::new(4);
        h.push("a".to_string());
        h.push("b".to_string());
        assert_eq!(h.as_vec(), vec!["a".to_string(), "b".to_string()]);
    }
}
