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

//! The physical-drive collaborator (§6).
//!
//! Like the disk-image container, the drive model is out of scope here:
//! head position, index/track-0 sensors, media insertion and write
//! protection all live in the surrounding emulator. `fdc_core` defines the
//! contract as the [`Drive`] trait and ships [`TestDrive`], an in-memory
//! reference implementation used by the crate's own tests.

use crate::disk::Disk;

/// Contract for the physical floppy drive the controller is bound to.
///
/// A single [`crate::controller::FdcController`] is constructed against one
/// `Drive` for its lifetime (per spec §3 "Lifecycle"); multi-drive FDCs
/// select among several controller instances at the bus level rather than
/// inside this core, since the spec's register file and status latch are
/// both scoped to "the drive", singular.
pub trait Drive {
    type Disk: Disk;

    /// Set from the external state latch's drive-select bit on every write
    /// to the external state port (§4.1).
    fn set_selected(&mut self, selected: bool);
    fn is_selected(&self) -> bool;

    fn is_loaded(&self) -> bool;
    fn is_single_sided(&self) -> bool;
    fn is_write_protected(&self) -> bool;

    /// True once until acknowledged by the drive itself (typically on the
    /// next step or media-settle event); the FDC only ever reads it.
    fn disk_change(&self) -> bool;

    fn track0(&self) -> bool;

    /// Level of the index sensor. The write-track parser watches for an
    /// edge (false -> true) on this signal to know a revolution has
    /// completed.
    fn index(&self) -> bool;

    /// Current physical cylinder.
    fn track(&self) -> u8;

    /// Move the head to `cylinder`, updating `track()` and any sensors
    /// (track0, disk_change-acknowledgement) that depend on head motion.
    fn seek_to(&mut self, cylinder: u8);

    fn reset(&mut self);

    fn disk(&self) -> &Self::Disk;
    fn disk_mut(&mut self) -> &mut Self::Disk;
}

/// A trivial in-memory [`Drive`] used by this crate's own tests.
pub struct TestDrive<D: Disk> {
    selected: bool,
    loaded: bool,
    single_sided: bool,
    write_protected: bool,
    disk_change: bool,
    track0_sensor_cylinder: u8,
    index_level: bool,
    cylinder: u8,
    disk: D,
}

impl<D: Disk + Default> TestDrive<D> {
    pub fn new() -> Self {
        TestDrive {
            selected: false,
            loaded: true,
            single_sided: false,
            write_protected: false,
            disk_change: false,
            track0_sensor_cylinder: 0,
            index_level: false,
            cylinder: 0,
            disk: D::default(),
        }
    }
}

impl<D: Disk> TestDrive<D> {
    pub fn with_disk(disk: D) -> Self {
        TestDrive {
            selected: false,
            loaded: true,
            single_sided: false,
            write_protected: false,
            disk_change: false,
            track0_sensor_cylinder: 0,
            index_level: false,
            cylinder: 0,
            disk,
        }
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        self.loaded = loaded;
    }

    pub fn set_single_sided(&mut self, single_sided: bool) {
        self.single_sided = single_sided;
    }

    pub fn set_write_protected(&mut self, write_protected: bool) {
        self.write_protected = write_protected;
    }

    pub fn set_disk_change(&mut self, changed: bool) {
        self.disk_change = changed;
    }

    /// Directly move the physical head without going through `seek_to`,
    /// simulating desynchronization between the FDC's `track` register and
    /// the drive for testing the verify-failure scenario (spec §8 scenario 2).
    pub fn force_cylinder(&mut self, cylinder: u8) {
        self.cylinder = cylinder;
    }

    /// Flip the index sensor level; used by tests to simulate the drive's
    /// rotation reaching the index hole.
    pub fn set_index(&mut self, level: bool) {
        self.index_level = level;
    }
}

impl<D: Disk> Drive for TestDrive<D> {
    type Disk = D;

    fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    fn is_selected(&self) -> bool {
        self.selected
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn is_single_sided(&self) -> bool {
        self.single_sided
    }

    fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    fn disk_change(&self) -> bool {
        self.disk_change
    }

    fn track0(&self) -> bool {
        self.cylinder == self.track0_sensor_cylinder
    }

    fn index(&self) -> bool {
        self.index_level
    }

    fn track(&self) -> u8 {
        self.cylinder
    }

    fn seek_to(&mut self, cylinder: u8) {
        self.cylinder = cylinder;
        self.disk_change = false;
    }

    fn reset(&mut self) {
        self.index_level = false;
    }

    fn disk(&self) -> &D {
        &self.disk
    }

    fn disk_mut(&mut self) -> &mut D {
        &mut self.disk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::TestDisk;

    #[test]
    fn seek_to_updates_track_and_clears_disk_change() {
        let mut drive: TestDrive<TestDisk> = TestDrive::new();
        drive.set_disk_change(true);
        drive.force_cylinder(5);
        drive.seek_to(0);
        assert_eq!(drive.track(), 0);
        assert!(!drive.disk_change());
    }
}
