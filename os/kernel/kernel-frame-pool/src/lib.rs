//! # Contiguous Physical Frame Pools
//!
//! Allocation of *contiguous runs* of 4 KiB physical frames for the kernel.
//! Memory is split into one or more [`ContFramePool`]s, each owning a fixed
//! range of frame numbers; a [`PoolRegistry`] holds them all so a run can be
//! released knowing nothing but its first frame number.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 PoolRegistry                         │
//! │    • Pools in creation order, disjoint ranges        │
//! │    • release_frames(frame) → owning pool             │
//! │    • print_pool_info(sink)                           │
//! └──────────────────┬───────────────────────────────────┘
//!                    │
//! ┌──────────────────▼───────────────────────────────────┐
//! │                 ContFramePool                        │
//! │    • First-fit search for n contiguous free frames   │
//! │    • Explicit reservation (mark_inaccessible)        │
//! │    • Run release from the head frame                 │
//! └──────────────────┬───────────────────────────────────┘
//!                    │
//! ┌──────────────────▼───────────────────────────────────┐
//! │        FrameBitmap (2 bits per frame)                │
//! │    • Lives in an info frame, reached via FrameMapper │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Frame States
//!
//! Every frame is [`Free`](FrameState::Free),
//! [`HeadOfSequence`](FrameState::HeadOfSequence) (first frame of an allocated
//! run) or [`Allocated`](FrameState::Allocated) (any later frame of a run).
//! The head marker is what lets a release find where its run starts; the run
//! ends at the next frame that is not `Allocated`.
//!
//! ## Info Frames
//!
//! A pool's bitmap needs `nframes / 4` bytes. One 4 KiB info frame therefore
//! describes up to [`MAX_POOL_FRAMES`] frames (64 MiB), which is also the
//! largest pool this crate creates. The info frame either is the pool's own
//! first frame ([`InfoFrames::SelfHosted`]) or was allocated from another
//! pool ([`InfoFrames::External`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_frame_pool::mapper::DirectMapper;
//! use kernel_frame_pool::{InfoFrames, PoolRegistry, needed_info_frames, release_frames};
//! use kernel_memory_addresses::FrameNumber;
//!
//! # fn main() -> Result<(), kernel_frame_pool::FramePoolError> {
//! let mapper = unsafe { DirectMapper::identity() };
//! let mut pools = PoolRegistry::new();
//!
//! // 2 MiB..4 MiB, bitmap in frame 512
//! let kernel = unsafe {
//!     pools.create_pool(&mapper, FrameNumber::new(512), 512, InfoFrames::SelfHosted)?
//! };
//!
//! // 4 MiB..32 MiB, bitmap in a frame taken from the kernel pool
//! let n_info = needed_info_frames(7168);
//! let info = pools.get_frames(kernel, n_info)?;
//! let process = unsafe {
//!     pools.create_pool(&mapper, FrameNumber::new(1024), 7168, InfoFrames::External(info))?
//! };
//!
//! // 15 MiB..16 MiB is a memory hole
//! pools.mark_inaccessible(process, FrameNumber::new(3840), 256)?;
//!
//! let run = pools.get_frames(process, 4)?;
//! assert_eq!(release_frames(&mut pools, run)?, 4);
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety
//!
//! The crate never guesses where memory is. Creating a pool is `unsafe`: the
//! caller vouches that the info frame is mapped by the given
//! [`mapper::FrameMapper`] and used by nothing else for the pool's lifetime.
//! Everything after that is safe code over the borrowed bitmap.
//!
//! ## Concurrency
//!
//! All mutation goes through `&mut`; the registry is meant to be owned by a
//! single bring-up path or wrapped in the caller's own lock.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod error;
pub mod mapper;
mod pool;
mod registry;
mod report;
mod state;

#[cfg(test)]
mod testing;

use kernel_memory_addresses::{PageSize, Size4K};

pub use error::FramePoolError;
pub use pool::{ContFramePool, InfoFrames};
pub use registry::{PoolId, PoolRegistry, release_frames};
pub use report::PoolSummary;
pub use state::{FRAMES_PER_BYTE, FrameState};

/// Size of one frame in bytes.
#[allow(clippy::cast_possible_truncation)]
pub const FRAME_SIZE: usize = Size4K::SIZE as usize;

/// Frames whose state fits into one info frame.
pub const FRAMES_PER_INFO_FRAME: usize = FRAMES_PER_BYTE * FRAME_SIZE;

/// Largest pool that can be created.
pub const MAX_POOL_FRAMES: usize = FRAMES_PER_INFO_FRAME;

/// Number of info frames needed to track `nframes` frames.
#[inline]
#[must_use]
pub const fn needed_info_frames(nframes: usize) -> usize {
    nframes.div_ceil(FRAMES_PER_INFO_FRAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_frame_capacity() {
        assert_eq!(FRAMES_PER_INFO_FRAME, 16384);
        assert_eq!(needed_info_frames(1), 1);
        assert_eq!(needed_info_frames(1024), 1);
        assert_eq!(needed_info_frames(16384), 1);
        assert_eq!(needed_info_frames(16385), 2);
    }
}
