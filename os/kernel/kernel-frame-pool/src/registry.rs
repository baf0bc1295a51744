//! The set of all frame pools, and release by frame number.
//!
//! Frames are released by number only: whoever frees a run does not know
//! which pool it came from. The [`PoolRegistry`] keeps every pool in creation
//! order and resolves a frame number to the pool whose range contains it.

use crate::error::FramePoolError;
use crate::mapper::FrameMapper;
use crate::pool::{ContFramePool, InfoFrames};
use alloc::vec::Vec;
use core::fmt;
use kernel_memory_addresses::FrameNumber;

/// Handle of a registered pool; stable for the registry's lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(usize);

impl PoolId {
    /// Position of the pool in creation order, starting at zero.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Append-only arena of frame pools.
///
/// # Invariants
/// - Pool frame ranges are pairwise disjoint.
/// - No two pools keep their bitmaps in the same frame.
#[derive(Default)]
pub struct PoolRegistry<'m> {
    pools: Vec<ContFramePool<'m>>,
}

impl<'m> PoolRegistry<'m> {
    #[must_use]
    pub const fn new() -> Self {
        Self { pools: Vec::new() }
    }

    /// Create a pool over `[base_frame_no, base_frame_no + nframes)` and
    /// register it.
    ///
    /// Overlap with registered pools is checked before any memory is touched.
    ///
    /// # Errors
    /// [`FramePoolError::PoolOverlap`] if the range or info frame collides
    /// with a registered pool, otherwise whatever
    /// [`ContFramePool::new`] reports.
    ///
    /// # Safety
    /// Same contract as [`ContFramePool::new`].
    pub unsafe fn create_pool<M: FrameMapper + ?Sized>(
        &mut self,
        mapper: &M,
        base_frame_no: FrameNumber,
        nframes: usize,
        info: InfoFrames,
    ) -> Result<PoolId, FramePoolError> {
        ContFramePool::check_range(base_frame_no, nframes)?;
        let info_frame_no = match info {
            InfoFrames::SelfHosted => base_frame_no,
            InfoFrames::External(frame) => frame,
        };
        self.check_disjoint(base_frame_no, nframes, info_frame_no)?;

        // SAFETY: Forwarded to the caller.
        let pool = unsafe { ContFramePool::new(mapper, base_frame_no, nframes, info)? };
        Ok(self.push(pool))
    }

    /// Register a pool built with [`ContFramePool::new`].
    ///
    /// # Errors
    /// [`FramePoolError::PoolOverlap`] if the pool collides with a registered
    /// pool; the pool is dropped in that case.
    pub fn register(&mut self, pool: ContFramePool<'m>) -> Result<PoolId, FramePoolError> {
        self.check_disjoint(pool.base_frame_no(), pool.nframes(), pool.info_frame_no())?;
        Ok(self.push(pool))
    }

    fn push(&mut self, pool: ContFramePool<'m>) -> PoolId {
        let id = PoolId(self.pools.len());
        self.pools.push(pool);
        log::debug!("registered frame pool {id}");
        id
    }

    fn check_disjoint(
        &self,
        base_frame_no: FrameNumber,
        nframes: usize,
        info_frame_no: FrameNumber,
    ) -> Result<(), FramePoolError> {
        let first = base_frame_no;
        let last = base_frame_no + (nframes - 1);
        let clash = self.pools.iter().any(|pool| {
            let ranges_overlap = first <= pool.last_frame_no() && pool.base_frame_no() <= last;
            ranges_overlap || pool.info_frame_no() == info_frame_no
        });
        if clash {
            return Err(FramePoolError::PoolOverlap { first, last }.logged());
        }
        Ok(())
    }

    /// The pool whose range contains `frame`, searched in creation order.
    #[must_use]
    pub fn owner_of(&self, frame: FrameNumber) -> Option<PoolId> {
        self.pools
            .iter()
            .position(|pool| pool.contains(frame))
            .map(PoolId)
    }

    #[must_use]
    pub fn pool(&self, id: PoolId) -> Option<&ContFramePool<'m>> {
        self.pools.get(id.0)
    }

    #[must_use]
    pub fn pool_mut(&mut self, id: PoolId) -> Option<&mut ContFramePool<'m>> {
        self.pools.get_mut(id.0)
    }

    /// [`ContFramePool::get_frames`] on pool `id`.
    ///
    /// # Errors
    /// [`FramePoolError::UnknownPool`] or any allocation error.
    pub fn get_frames(
        &mut self,
        id: PoolId,
        n_frames: usize,
    ) -> Result<FrameNumber, FramePoolError> {
        self.pool_mut(id)
            .ok_or_else(|| FramePoolError::UnknownPool(id).logged())?
            .get_frames(n_frames)
    }

    /// [`ContFramePool::mark_inaccessible`] on pool `id`.
    ///
    /// # Errors
    /// [`FramePoolError::UnknownPool`] or any marking error.
    pub fn mark_inaccessible(
        &mut self,
        id: PoolId,
        base: FrameNumber,
        n_frames: usize,
    ) -> Result<(), FramePoolError> {
        self.pool_mut(id)
            .ok_or_else(|| FramePoolError::UnknownPool(id).logged())?
            .mark_inaccessible(base, n_frames)
    }

    /// All pools in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &ContFramePool<'m>)> {
        self.pools.iter().enumerate().map(|(i, pool)| (PoolId(i), pool))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

/// Release the run of frames starting at `first_frame_no`, whichever pool it
/// belongs to. Returns the number of frames released.
///
/// # Errors
/// - [`FramePoolError::UnknownFrame`] if no registered pool owns the frame.
/// - [`FramePoolError::NotHeadOfSequence`] if the frame does not start a run.
/// - [`FramePoolError::CorruptState`] if the run touches an invalid code.
pub fn release_frames(
    registry: &mut PoolRegistry<'_>,
    first_frame_no: FrameNumber,
) -> Result<usize, FramePoolError> {
    let Some(id) = registry.owner_of(first_frame_no) else {
        return Err(FramePoolError::UnknownFrame {
            frame: first_frame_no,
        }
        .logged());
    };

    let pool = &mut registry.pools[id.0];
    let released = pool.release_run(first_frame_no)?;
    log::debug!(
        "released {released} frame(s) at {first_frame_no} to pool {id}, {} free",
        pool.free_count()
    );
    Ok(released)
}
