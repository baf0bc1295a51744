//! Fake physical memory for unit tests.

use crate::mapper::DirectMapper;
use kernel_memory_addresses::{FrameNumber, PageSize, Size4K};

/// Back `frames` frames starting at `first` with a leaked, zeroed buffer.
pub fn scratch_mapper(first: FrameNumber, frames: usize) -> DirectMapper {
    let buffer = vec![0u8; frames * Size4K::SIZE as usize].leak();
    let base = buffer.as_mut_ptr() as u64;
    unsafe { DirectMapper::with_offset(base.wrapping_sub(first.as_u64() * Size4K::SIZE)) }
}
