//! L1 cache model: set-associative with word-granular blocks and FIFO
//! replacement at both the way and the block level.

use crate::mem::MemRef;
use crate::params::{PAGE_SIZE, WORDS_PER_BLOCK};

/// Per-core cache geometry.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub num_sets: usize,
    pub num_ways: usize,
    /// Blocks per way.
    pub num_blocks: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_sets: 64,
            num_ways: 2,
            num_blocks: 4,
        }
    }
}

/// One block: covers a contiguous word range once populated.
#[derive(Clone, Debug, Default)]
struct Block {
    populated: bool,
    start: u64,
    end: u64,
}

impl Block {
    /// Populates the block with the range containing `offset`.
    fn fill(&mut self, offset: u64) {
        self.populated = true;
        self.start = (offset / WORDS_PER_BLOCK) * WORDS_PER_BLOCK;
        self.end = self.start + WORDS_PER_BLOCK;
    }

    fn covers(&self, offset: u64) -> bool {
        self.populated && self.start <= offset && offset < self.end
    }
}

/// One way: a tag plus its blocks, replaced block-by-block in FIFO order.
#[derive(Clone, Debug)]
struct Way {
    populated: bool,
    tag: u64,
    blocks: Vec<Block>,
    next_block: usize,
}

impl Way {
    fn new(num_blocks: usize) -> Self {
        Self {
            populated: false,
            tag: 0,
            blocks: vec![Block::default(); num_blocks],
            next_block: 0,
        }
    }

    fn has_word(&self, offset: u64) -> bool {
        self.populated && self.blocks.iter().any(|b| b.covers(offset))
    }

    /// Overwrites the FIFO-victim block with the range covering `offset`.
    fn replace_block(&mut self, offset: u64) {
        self.populated = true;
        let victim = self.next_block;
        self.blocks[victim].fill(offset);
        self.next_block = (self.next_block + 1) % self.blocks.len();
    }

    /// Retags the way and fills every block with consecutive word ranges
    /// starting at `offset`, modeling a full line fill from memory.
    fn refill(&mut self, tag: u64, offset: u64) {
        self.populated = true;
        self.tag = tag;
        for (i, block) in self.blocks.iter_mut().enumerate() {
            block.fill(offset + WORDS_PER_BLOCK * i as u64);
        }
    }
}

#[derive(Clone, Debug)]
struct CacheSet {
    ways: Vec<Way>,
    next_way: usize,
}

impl CacheSet {
    fn new(num_ways: usize, num_blocks: usize) -> Self {
        Self {
            ways: (0..num_ways).map(|_| Way::new(num_blocks)).collect(),
            next_way: 0,
        }
    }

    fn find_way(&self, tag: u64) -> Option<usize> {
        self.ways.iter().position(|w| w.populated && w.tag == tag)
    }
}

/// Private L1 cache for one core.
pub struct Cache {
    config: CacheConfig,
    sets: Vec<CacheSet>,
    /// Way evictions this epoch (set conflicts).
    conflicts: u64,
}

impl Cache {
    pub fn new(config: CacheConfig) -> Self {
        assert!(config.num_sets > 0, "cache must have at least one set");
        assert!(config.num_ways > 0, "cache must have at least one way");
        assert!(config.num_blocks > 0, "ways must have at least one block");
        let sets = (0..config.num_sets)
            .map(|_| CacheSet::new(config.num_ways, config.num_blocks))
            .collect();
        Self {
            config,
            sets,
            conflicts: 0,
        }
    }

    pub fn num_sets(&self) -> usize {
        self.config.num_sets
    }

    /// Returns (set index, tag) for a resolved reference.
    fn index_and_tag(&self, r: &MemRef) -> (usize, u64) {
        let tag = r.physical_frame() * PAGE_SIZE;
        ((tag % self.config.num_sets as u64) as usize, tag)
    }

    /// The set a resolved reference maps to.
    pub fn set_index(&self, r: &MemRef) -> usize {
        self.index_and_tag(r).0
    }

    /// A lookup hits iff some way of the set carries the tag and one of its
    /// blocks covers the referenced word.
    pub fn lookup(&self, r: &MemRef) -> bool {
        let (idx, tag) = self.index_and_tag(r);
        let set = &self.sets[idx];
        match set.find_way(tag) {
            Some(way) => set.ways[way].has_word(r.offset()),
            None => false,
        }
    }

    /// Repairs the miss the caller just observed: a block fill when the tag
    /// is present, a full way refill (counted as a set conflict) otherwise.
    pub fn replace(&mut self, r: &MemRef) {
        let (idx, tag) = self.index_and_tag(r);
        let set = &mut self.sets[idx];
        match set.find_way(tag) {
            Some(way) => set.ways[way].replace_block(r.offset()),
            None => {
                set.next_way = (set.next_way + 1) % set.ways.len();
                self.conflicts += 1;
                let victim = set.next_way;
                set.ways[victim].refill(tag, r.offset());
            }
        }
    }

    /// Drains the set-conflict counter accumulated since the last call.
    pub fn take_conflicts(&mut self) -> u64 {
        std::mem::take(&mut self.conflicts)
    }
}
