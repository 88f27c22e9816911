//! Shared RAM frame pool with FIFO reclamation. Frames are reassigned, never
//! exhausted; reassignment invalidates the previous owner's page-table line.

use crate::params::{PAGE_SIZE, RAM_SIZE};
use crate::task::{Task, TaskId};

/// The frame pool. Frames are identified by index; ownership is tracked per
/// frame as a task id, not a pointer.
pub struct Ram {
    /// FIFO hand. Advanced before each grant so the first grant is frame 0.
    hand: usize,
    owners: Vec<Option<TaskId>>,
}

impl Ram {
    pub fn new() -> Self {
        Self::with_frames((RAM_SIZE / PAGE_SIZE) as usize)
    }

    pub fn with_frames(num_frames: usize) -> Self {
        assert!(num_frames > 0, "RAM must have at least one frame");
        Self {
            hand: num_frames - 1,
            owners: vec![None; num_frames],
        }
    }

    pub fn num_frames(&self) -> usize {
        self.owners.len()
    }

    pub fn owner(&self, frame: u64) -> Option<TaskId> {
        self.owners[frame as usize]
    }

    /// Grants the next frame to `owner`, reclaiming it from the previous
    /// owner if there was one. The previous owner's page-table line pointing
    /// at the frame is invalidated before ownership changes hands.
    pub fn next_frame(&mut self, tasks: &mut [Task], owner: TaskId) -> u64 {
        self.hand = (self.hand + 1) % self.owners.len();
        let frame = self.hand as u64;
        if let Some(prev) = self.owners[self.hand] {
            let table = tasks[prev.0].page_table_mut();
            if let Some(line) = table.find_by_frame(frame) {
                table.invalidate(line);
            }
        }
        self.owners[self.hand] = Some(owner);
        frame
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}
