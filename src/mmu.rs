//! Per-core MMU: resolves a task's virtual references against its page
//! table, pulling fresh frames from RAM on a fault.

use crate::core::CoreId;
use crate::ram::Ram;
use crate::task::{Task, TaskId};

pub struct Mmu {
    core: CoreId,
}

impl Mmu {
    pub fn new(core: CoreId) -> Self {
        Self { core }
    }

    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Translates the reference at `pos` of task `tid`. Returns true on a
    /// page hit. On a fault a frame is requested from RAM and the page is
    /// mapped before the reference resolves.
    pub fn translate(&self, tasks: &mut [Task], tid: TaskId, pos: usize, ram: &mut Ram) -> bool {
        let page = tasks[tid.0].mem_ref(pos).virtual_page() as usize;
        assert!(
            page < tasks[tid.0].page_table().num_lines(),
            "page table of task {} too small for page {page}",
            tid.0
        );

        if tasks[tid.0].page_table().valid(page) {
            let frame = tasks[tid.0].page_table().frame(page);
            tasks[tid.0].resolve_ref(pos, frame);
            true
        } else {
            let frame = ram.next_frame(tasks, tid);
            let task = &mut tasks[tid.0];
            task.page_table_mut().map(page, frame);
            task.resolve_ref(pos, frame);
            false
        }
    }
}
