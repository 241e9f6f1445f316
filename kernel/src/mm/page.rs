//! Page Table Management
//!
//! Single-level, per-process page tables: logical page number -> frame.

use super::FrameIndex;
use crate::{KernelError, KernelResult};

/// Page table entry
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry(Option<FrameIndex>);

impl PageTableEntry {
    /// Create empty (unmapped) entry
    pub const fn empty() -> Self {
        Self(None)
    }

    /// Create entry mapped to `frame`
    pub const fn new(frame: FrameIndex) -> Self {
        Self(Some(frame))
    }

    /// Get backing frame
    pub fn frame(&self) -> Option<FrameIndex> {
        self.0
    }

    /// Check if entry is present
    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    /// Set backing frame
    pub fn set_frame(&mut self, frame: FrameIndex) {
        self.0 = Some(frame);
    }

    /// Clear entry
    pub fn clear(&mut self) {
        self.0 = None;
    }
}

impl std::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(frame) => write!(f, "PageTableEntry({})", frame),
            None => f.write_str("PageTableEntry(-)"),
        }
    }
}

/// Page table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    /// Create table with `pages` unmapped entries
    pub fn new(pages: usize) -> Self {
        Self {
            entries: vec![PageTableEntry::empty(); pages],
        }
    }

    /// Build a table mapping page `i` to `frames[i]`
    pub fn from_frames(frames: &[FrameIndex]) -> Self {
        Self {
            entries: frames.iter().copied().map(PageTableEntry::new).collect(),
        }
    }

    /// Number of logical pages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if table has no pages
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get entry for a page
    pub fn entry(&self, page: usize) -> Option<&PageTableEntry> {
        self.entries.get(page)
    }

    /// Get mutable entry for a page
    pub fn entry_mut(&mut self, page: usize) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(page)
    }

    /// Resolve a page to its frame
    pub fn lookup(&self, page: usize) -> KernelResult<FrameIndex> {
        let entry = self.entries.get(page).ok_or(KernelError::PageOutOfRange {
            page,
            pages: self.entries.len(),
        })?;

        entry.frame().ok_or(KernelError::UnmappedPage(page))
    }

    /// Frames currently mapped, in page order
    pub fn mapped_frames(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.entries.iter().filter_map(PageTableEntry::frame)
    }

    /// `(page, frame)` pairs for every entry, unmapped as `None`
    pub fn mappings(&self) -> Vec<(usize, Option<FrameIndex>)> {
        self.entries.iter().map(PageTableEntry::frame).enumerate().collect()
    }

    /// Unmap every page
    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            entry.clear();
        }
    }
}
