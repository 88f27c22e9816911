//! Memory references and per-task page tables.

use crate::params::PAGE_SIZE;

/// A single memory reference, split into (virtual page, byte offset) when
/// created. The physical frame is filled in by the MMU during translation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemRef {
    virtual_page: u64,
    offset: u64,
    physical_frame: Option<u64>,
}

impl MemRef {
    pub fn new(addr: u64) -> Self {
        Self {
            virtual_page: addr / PAGE_SIZE,
            offset: addr % PAGE_SIZE,
            physical_frame: None,
        }
    }

    pub fn virtual_page(&self) -> u64 {
        self.virtual_page
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The resolved frame id. Only valid after translation.
    pub fn physical_frame(&self) -> u64 {
        self.physical_frame
            .expect("reference used before translation")
    }

    pub fn is_resolved(&self) -> bool {
        self.physical_frame.is_some()
    }

    /// Records the frame this reference resolved to.
    pub fn resolve(&mut self, frame: u64) {
        self.physical_frame = Some(frame);
    }

    /// The original virtual address.
    pub fn address(&self) -> u64 {
        self.virtual_page * PAGE_SIZE + self.offset
    }

    /// The resolved physical address.
    pub fn physical_address(&self) -> u64 {
        self.physical_frame() * PAGE_SIZE + self.offset
    }
}

/// One page-table line: a valid bit plus the frame the page maps to.
#[derive(Clone, Copy, Debug, Default)]
struct PageLine {
    valid: bool,
    frame: u64,
}

/// Per-task virtual-page → frame map.
#[derive(Clone, Debug)]
pub struct PageTable {
    lines: Vec<PageLine>,
}

impl PageTable {
    pub fn new(num_lines: usize) -> Self {
        Self {
            lines: vec![PageLine::default(); num_lines],
        }
    }

    pub fn num_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn valid(&self, page: usize) -> bool {
        self.lines[page].valid
    }

    /// The frame a page maps to. Reading an invalid line is a programming
    /// error.
    pub fn frame(&self, page: usize) -> u64 {
        let line = &self.lines[page];
        assert!(line.valid, "read of invalid page-table line {page}");
        line.frame
    }

    /// Maps a page to a frame and marks the line valid.
    pub fn map(&mut self, page: usize, frame: u64) {
        self.lines[page] = PageLine { valid: true, frame };
    }

    pub fn invalidate(&mut self, page: usize) {
        self.lines[page].valid = false;
    }

    /// Finds the valid line pointing at `frame`, if any.
    pub fn find_by_frame(&self, frame: u64) -> Option<usize> {
        self.lines
            .iter()
            .position(|l| l.valid && l.frame == frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memref_splits_address() {
        let r = MemRef::new(2 * PAGE_SIZE + 17);
        assert_eq!(r.virtual_page(), 2);
        assert_eq!(r.offset(), 17);
        assert_eq!(r.address(), 2 * PAGE_SIZE + 17);
        assert!(!r.is_resolved());
    }

    #[test]
    fn memref_resolution() {
        let mut r = MemRef::new(100);
        r.resolve(7);
        assert_eq!(r.physical_frame(), 7);
        assert_eq!(r.physical_address(), 7 * PAGE_SIZE + 100);
    }

    #[test]
    fn page_table_map_and_invalidate() {
        let mut pt = PageTable::new(4);
        assert!(!pt.valid(2));
        pt.map(2, 9);
        assert!(pt.valid(2));
        assert_eq!(pt.frame(2), 9);
        assert_eq!(pt.find_by_frame(9), Some(2));
        pt.invalidate(2);
        assert!(!pt.valid(2));
        assert_eq!(pt.find_by_frame(9), None);
    }

    #[test]
    #[should_panic]
    fn page_table_invalid_read_panics() {
        let pt = PageTable::new(1);
        pt.frame(0);
    }
}
