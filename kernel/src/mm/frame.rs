//! Physical Frame Pool
//!
//! Fixed pool of frames handed out from a FIFO free queue. Each frame
//! records its owner and the logical page it backs.

use crate::sys::ProcessId;
use crate::{KernelError, KernelResult};
use std::collections::VecDeque;
use tracing::warn;

/// Index of a physical frame
pub type FrameIndex = usize;

/// Physical frame descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame {
    /// Owning process, `None` when free
    pub owner: Option<ProcessId>,
    /// Logical page backed by this frame
    pub page: Option<usize>,
}

impl Frame {
    /// Check if frame is in use
    pub fn is_occupied(&self) -> bool {
        self.owner.is_some()
    }
}

/// Physical frame allocator with a FIFO free list
#[derive(Debug, Clone)]
pub struct FrameAllocator {
    /// Frame descriptors, indexed by frame number
    frames: Vec<Frame>,
    /// Free frames in hand-out order
    free: VecDeque<FrameIndex>,
}

impl FrameAllocator {
    /// Create allocator with `total_frames` free frames
    pub fn new(total_frames: usize) -> Self {
        Self {
            frames: vec![Frame::default(); total_frames],
            free: (0..total_frames).collect(),
        }
    }

    /// Take `count` frames for `owner`, mapping them to pages `0..count`.
    ///
    /// All-or-nothing: on shortage no frame changes hands.
    pub fn allocate(&mut self, owner: ProcessId, count: usize) -> KernelResult<Vec<FrameIndex>> {
        if count > self.free.len() {
            return Err(KernelError::InsufficientFrames {
                needed: count,
                available: self.free.len(),
            });
        }

        let mut taken = Vec::with_capacity(count);
        for page in 0..count {
            let Some(index) = self.free.pop_front() else {
                break;
            };
            self.frames[index] = Frame { owner: Some(owner), page: Some(page) };
            taken.push(index);
        }

        Ok(taken)
    }

    /// Return a frame to the back of the free queue
    pub fn deallocate(&mut self, index: FrameIndex) -> KernelResult<()> {
        let frame = self.frames.get_mut(index).ok_or(KernelError::InvalidFrame(index))?;

        if !frame.is_occupied() {
            warn!("Double free of frame {}", index);
            return Err(KernelError::InvalidFrame(index));
        }

        *frame = Frame::default();
        self.free.push_back(index);

        Ok(())
    }

    /// Get frame descriptor
    pub fn frame(&self, index: FrameIndex) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Iterate over all frame descriptors
    pub fn frames(&self) -> impl Iterator<Item = (FrameIndex, &Frame)> {
        self.frames.iter().enumerate()
    }

    /// Get number of free frames
    pub fn free_frames(&self) -> usize {
        self.free.len()
    }

    /// Get number of occupied frames
    pub fn occupied_frames(&self) -> usize {
        self.frames.len() - self.free.len()
    }

    /// Get total number of frames
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }
}
