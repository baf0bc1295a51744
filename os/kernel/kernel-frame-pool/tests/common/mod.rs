#![allow(dead_code)]

use kernel_frame_pool::mapper::{DirectMapper, FrameMapper};
use kernel_frame_pool::{FRAME_SIZE, PoolRegistry, PoolId, release_frames};
use kernel_memory_addresses::FrameNumber;

/// A leaked host buffer standing in for the physical frames
/// `[first, first + frames)`.
pub struct FakeMemory {
    mapper: DirectMapper,
    first: FrameNumber,
    frames: usize,
}

impl FakeMemory {
    pub fn new(first: u64, frames: usize) -> Self {
        let buffer = vec![0u8; frames * FRAME_SIZE].leak();
        let base = buffer.as_mut_ptr() as u64;
        let offset = base.wrapping_sub(first * FRAME_SIZE as u64);
        Self {
            mapper: unsafe { DirectMapper::with_offset(offset) },
            first: FrameNumber::new(first),
            frames,
        }
    }

    pub fn mapper(&self) -> &DirectMapper {
        &self.mapper
    }

    /// Byte view of an allocated run, for tests that write into it.
    pub fn run_bytes(&self, first: FrameNumber, n_frames: usize) -> &'static mut [u8] {
        let end = first.as_u64() + n_frames as u64;
        assert!(first >= self.first, "run below backed memory");
        assert!(
            end <= self.first.as_u64() + self.frames as u64,
            "run above backed memory"
        );
        unsafe { self.mapper.frame_bytes_mut(first, n_frames * FRAME_SIZE) }
    }
}

/// Allocate `allocs_to_go % 4 + 1` frames, fill them, recurse, then verify
/// and release them again.
pub fn exercise_pool(
    memory: &FakeMemory,
    pools: &mut PoolRegistry<'_>,
    pool: PoolId,
    allocs_to_go: u32,
) {
    if allocs_to_go == 0 {
        return;
    }

    let n_frames = (allocs_to_go % 4 + 1) as usize;
    let first = pools.get_frames(pool, n_frames).unwrap();
    let bytes = memory.run_bytes(first, n_frames);
    for word in bytes.chunks_exact_mut(4) {
        word.copy_from_slice(&allocs_to_go.to_le_bytes());
    }

    exercise_pool(memory, pools, pool, allocs_to_go - 1);

    assert!(
        bytes
            .chunks_exact(4)
            .all(|word| word == allocs_to_go.to_le_bytes()),
        "run at {first} was overwritten"
    );
    assert_eq!(release_frames(pools, first), Ok(n_frames));
}
