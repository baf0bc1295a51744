//! A contiguous frame pool.
//!
//! The pool owns the frames `[base_frame_no, base_frame_no + nframes)` and
//! tracks each of them in a 2-bit state bitmap (see [`crate::state`]). An
//! allocated run of `n` frames is stored as one
//! [`HeadOfSequence`](FrameState::HeadOfSequence) frame followed by `n - 1`
//! [`Allocated`](FrameState::Allocated) frames, so runs can be released from
//! their first frame number alone.

use crate::error::FramePoolError;
use crate::mapper::FrameMapper;
use crate::report::PoolSummary;
use crate::state::{FrameBitmap, FrameState};
use crate::{MAX_POOL_FRAMES, needed_info_frames};
use kernel_memory_addresses::FrameNumber;

/// Where a pool keeps its state bitmap.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InfoFrames {
    /// In the pool's own first frame(s), which are reserved at construction.
    SelfHosted,
    /// In a frame the caller already reserved, usually from another pool.
    External(FrameNumber),
}

impl InfoFrames {
    /// Frame number `0` means [`SelfHosted`](Self::SelfHosted).
    #[inline]
    #[must_use]
    pub const fn from_raw(info_frame_no: u64) -> Self {
        match info_frame_no {
            0 => Self::SelfHosted,
            n => Self::External(FrameNumber::new(n)),
        }
    }
}

/// Allocator for contiguous runs of frames out of a fixed frame range.
///
/// # Invariants
/// - `free_count` equals the number of [`FrameState::Free`] frames.
/// - Every failed operation leaves bitmap and counters untouched.
pub struct ContFramePool<'m> {
    base_frame_no: FrameNumber,
    nframes: usize,
    free_count: usize,
    info_frame_no: FrameNumber,
    info_frames: usize,
    bitmap: FrameBitmap<'m>,
}

impl<'m> ContFramePool<'m> {
    /// Build a pool over `[base_frame_no, base_frame_no + nframes)`.
    ///
    /// All frames start out free. A [`SelfHosted`](InfoFrames::SelfHosted)
    /// pool then reserves the frames holding its own bitmap, which are always
    /// the first frames of the range. An [`External`](InfoFrames::External)
    /// info frame that happens to lie inside the range is reserved as a
    /// one-frame run; outside the range its owner has already reserved it.
    ///
    /// Creating a pool does not register it; see
    /// [`PoolRegistry`](crate::PoolRegistry).
    ///
    /// # Errors
    /// - [`FramePoolError::EmptyPool`] if `nframes` is zero.
    /// - [`FramePoolError::PoolTooLarge`] if one info frame cannot describe
    ///   `nframes` frames.
    /// - [`FramePoolError::OutOfRange`] if the range overflows the frame
    ///   number space.
    ///
    /// # Safety
    /// The info frame(s) must be mapped by `mapper`, and must not be accessed
    /// by anything but this pool for `'m`. A self-hosted pool's frames must
    /// be backed by memory.
    pub unsafe fn new<M: FrameMapper + ?Sized>(
        mapper: &M,
        base_frame_no: FrameNumber,
        nframes: usize,
        info: InfoFrames,
    ) -> Result<Self, FramePoolError> {
        Self::check_range(base_frame_no, nframes)?;

        let info_frame_no = match info {
            InfoFrames::SelfHosted => base_frame_no,
            InfoFrames::External(frame) => frame,
        };

        // SAFETY: Caller guarantees the info frame is mapped and exclusive.
        let bytes =
            unsafe { mapper.frame_bytes_mut(info_frame_no, FrameBitmap::bytes_for(nframes)) };

        let mut pool = Self {
            base_frame_no,
            nframes,
            free_count: nframes,
            info_frame_no,
            info_frames: needed_info_frames(nframes),
            bitmap: FrameBitmap::new(bytes),
        };
        pool.bitmap.clear();

        match info {
            InfoFrames::SelfHosted => {
                let first = pool.get_frames(pool.info_frames)?;
                debug_assert_eq!(first, base_frame_no, "info frames must lead the pool");
            }
            InfoFrames::External(frame) if pool.contains(frame) => {
                pool.mark_inaccessible(frame, 1)?;
            }
            InfoFrames::External(_) => {}
        }

        log::info!("initialized frame pool: {}", pool.summary());
        Ok(pool)
    }

    /// Validate a prospective pool range.
    pub(crate) fn check_range(
        base_frame_no: FrameNumber,
        nframes: usize,
    ) -> Result<(), FramePoolError> {
        if nframes == 0 {
            return Err(FramePoolError::EmptyPool.logged());
        }
        if nframes > MAX_POOL_FRAMES {
            return Err(FramePoolError::PoolTooLarge {
                nframes,
                max: MAX_POOL_FRAMES,
            }
            .logged());
        }
        if base_frame_no.checked_add(nframes as u64).is_none() {
            return Err(FramePoolError::OutOfRange {
                frame: base_frame_no,
            }
            .logged());
        }
        Ok(())
    }

    /// Allocate `n_frames` contiguous frames and return the first one.
    ///
    /// Frames are searched in ascending order; the lowest run that fits wins.
    /// The first frame of the run becomes
    /// [`HeadOfSequence`](FrameState::HeadOfSequence), the rest
    /// [`Allocated`](FrameState::Allocated).
    ///
    /// # Errors
    /// - [`FramePoolError::EmptyRequest`] if `n_frames` is zero.
    /// - [`FramePoolError::InsufficientFrames`] if fewer than `n_frames`
    ///   frames are free, or the pool is smaller than `n_frames`.
    /// - [`FramePoolError::NoContiguousRun`] if enough frames are free but no
    ///   run of `n_frames` exists.
    /// - [`FramePoolError::CorruptState`] if the bitmap holds an invalid code.
    pub fn get_frames(&mut self, n_frames: usize) -> Result<FrameNumber, FramePoolError> {
        if n_frames == 0 {
            return Err(FramePoolError::EmptyRequest.logged());
        }
        if n_frames > self.free_count || n_frames > self.nframes {
            return Err(FramePoolError::InsufficientFrames {
                requested: n_frames,
                free: self.free_count,
                total: self.nframes,
            }
            .logged());
        }

        let mut run_start = 0;
        let mut run_len = 0;
        let mut longest = 0;
        for index in 0..self.nframes {
            if self.state_at(index)?.is_free() {
                if run_len == 0 {
                    run_start = index;
                }
                run_len += 1;
                if run_len == n_frames {
                    let first = self.frame_at(run_start);
                    self.mark_inaccessible(first, n_frames)?;
                    log::debug!(
                        "allocated {n_frames} frame(s) at {first}, {} free",
                        self.free_count
                    );
                    return Ok(first);
                }
                longest = longest.max(run_len);
            } else {
                run_len = 0;
            }
        }

        Err(FramePoolError::NoContiguousRun {
            requested: n_frames,
            longest,
        }
        .logged())
    }

    /// Reserve exactly `[base, base + n_frames)`.
    ///
    /// Used for frames with known contents (kernel image, memory holes,
    /// metadata) and by [`get_frames`](Self::get_frames). Either all frames
    /// change state or none does.
    ///
    /// # Errors
    /// - [`FramePoolError::EmptyRequest`] if `n_frames` is zero.
    /// - [`FramePoolError::OutOfRange`] if any frame of the range lies outside
    ///   the pool.
    /// - [`FramePoolError::NotFree`] if any frame of the range is not free.
    /// - [`FramePoolError::CorruptState`] if the bitmap holds an invalid code.
    pub fn mark_inaccessible(
        &mut self,
        base: FrameNumber,
        n_frames: usize,
    ) -> Result<(), FramePoolError> {
        if n_frames == 0 {
            return Err(FramePoolError::EmptyRequest.logged());
        }
        let start = self
            .index_of(base)
            .ok_or_else(|| FramePoolError::OutOfRange { frame: base }.logged())?;
        let end = start
            .checked_add(n_frames)
            .filter(|&end| end <= self.nframes)
            .ok_or_else(|| {
                FramePoolError::OutOfRange {
                    frame: self.frame_at(self.nframes),
                }
                .logged()
            })?;

        for index in start..end {
            let state = self.state_at(index)?;
            if !state.is_free() {
                return Err(FramePoolError::NotFree {
                    frame: self.frame_at(index),
                    state,
                }
                .logged());
            }
        }

        self.bitmap.set(start, FrameState::HeadOfSequence);
        for index in start + 1..end {
            self.bitmap.set(index, FrameState::Allocated);
        }
        self.free_count -= n_frames;

        log::trace!("marked frames {base}..+{n_frames} inaccessible");
        Ok(())
    }

    /// Free the run starting at `head`; returns the number of frames freed.
    ///
    /// The run ends before the first frame that is free or the head of
    /// another run, or at the end of the pool.
    pub(crate) fn release_run(&mut self, head: FrameNumber) -> Result<usize, FramePoolError> {
        let start = self
            .index_of(head)
            .ok_or_else(|| FramePoolError::OutOfRange { frame: head }.logged())?;
        let state = self.state_at(start)?;
        if state != FrameState::HeadOfSequence {
            return Err(FramePoolError::NotHeadOfSequence { frame: head, state }.logged());
        }

        let mut end = start + 1;
        while end < self.nframes && self.state_at(end)? == FrameState::Allocated {
            end += 1;
        }

        for index in start..end {
            self.bitmap.set(index, FrameState::Free);
        }
        let released = end - start;
        self.free_count += released;
        Ok(released)
    }

    /// State of `frame`.
    ///
    /// # Errors
    /// [`FramePoolError::OutOfRange`] if the frame is not in this pool,
    /// [`FramePoolError::CorruptState`] for an invalid code.
    pub fn state(&self, frame: FrameNumber) -> Result<FrameState, FramePoolError> {
        let index = self
            .index_of(frame)
            .ok_or(FramePoolError::OutOfRange { frame })?;
        self.state_at(index)
    }

    /// Length of the longest run of free frames.
    ///
    /// # Errors
    /// [`FramePoolError::CorruptState`] for an invalid code.
    pub fn longest_free_run(&self) -> Result<usize, FramePoolError> {
        let mut longest = 0;
        let mut run = 0;
        for index in 0..self.nframes {
            if self.state_at(index)?.is_free() {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }
        Ok(longest)
    }

    /// Whether `frame` lies in this pool's range.
    #[inline]
    #[must_use]
    pub fn contains(&self, frame: FrameNumber) -> bool {
        self.index_of(frame).is_some()
    }

    #[inline]
    #[must_use]
    pub const fn base_frame_no(&self) -> FrameNumber {
        self.base_frame_no
    }

    /// The last frame of the pool (inclusive).
    #[inline]
    #[must_use]
    pub fn last_frame_no(&self) -> FrameNumber {
        self.frame_at(self.nframes - 1)
    }

    #[inline]
    #[must_use]
    pub const fn nframes(&self) -> usize {
        self.nframes
    }

    #[inline]
    #[must_use]
    pub const fn free_count(&self) -> usize {
        self.free_count
    }

    #[inline]
    #[must_use]
    pub const fn used_count(&self) -> usize {
        self.nframes - self.free_count
    }

    /// First frame holding this pool's bitmap.
    #[inline]
    #[must_use]
    pub const fn info_frame_no(&self) -> FrameNumber {
        self.info_frame_no
    }

    /// Number of frames the bitmap occupies.
    #[inline]
    #[must_use]
    pub const fn info_frames(&self) -> usize {
        self.info_frames
    }

    #[must_use]
    pub fn summary(&self) -> PoolSummary {
        PoolSummary {
            first_frame: self.base_frame_no,
            last_frame: self.last_frame_no(),
            total: self.nframes,
            free: self.free_count,
            used: self.used_count(),
            info_frame: self.info_frame_no,
            info_frames: self.info_frames,
        }
    }

    #[inline]
    fn index_of(&self, frame: FrameNumber) -> Option<usize> {
        let offset = frame.checked_distance_from(self.base_frame_no)?;
        usize::try_from(offset)
            .ok()
            .filter(|&index| index < self.nframes)
    }

    #[inline]
    fn frame_at(&self, index: usize) -> FrameNumber {
        self.base_frame_no + index
    }

    #[inline]
    fn state_at(&self, index: usize) -> Result<FrameState, FramePoolError> {
        let bits = self.bitmap.bits(index);
        FrameState::from_bits(bits).ok_or_else(|| {
            FramePoolError::CorruptState {
                frame: self.frame_at(index),
                bits,
            }
            .logged()
        })
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&mut self, frame: FrameNumber) {
        let index = self.index_of(frame).expect("frame in pool");
        self.bitmap.set_bits(index, 0b11);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::DirectMapper;
    use crate::testing::scratch_mapper;

    const BASE: FrameNumber = FrameNumber::new(2);

    fn pool(nframes: usize) -> ContFramePool<'static> {
        let mapper = scratch_mapper(BASE, 1);
        unsafe { ContFramePool::new(&mapper, BASE, nframes, InfoFrames::SelfHosted) }
            .expect("pool")
    }

    fn states(pool: &ContFramePool, first: u64, n: u64) -> Vec<FrameState> {
        (first..first + n)
            .map(|f| pool.state(FrameNumber::new(f)).unwrap())
            .collect()
    }

    #[test]
    fn self_hosted_pool_reserves_its_info_frame() {
        let p = pool(1024);
        assert_eq!(p.info_frame_no(), BASE);
        assert_eq!(p.info_frames(), 1);
        assert_eq!(p.state(BASE), Ok(FrameState::HeadOfSequence));
        assert_eq!(p.state(FrameNumber::new(3)), Ok(FrameState::Free));
        assert_eq!(p.free_count(), 1023);
        assert_eq!(p.last_frame_no(), FrameNumber::new(1025));
    }

    #[test]
    fn allocations_take_lowest_free_run() {
        let mut p = pool(1024);
        let a = p.get_frames(10).unwrap();
        let b = p.get_frames(5).unwrap();
        assert_eq!(a, FrameNumber::new(3));
        assert_eq!(b, FrameNumber::new(13));
        assert_eq!(p.free_count(), 1023 - 15);

        let mut expected = vec![FrameState::HeadOfSequence];
        expected.extend([FrameState::Allocated; 9]);
        assert_eq!(states(&p, 3, 10), expected);
        assert_eq!(p.state(FrameNumber::new(18)), Ok(FrameState::Free));
    }

    #[test]
    fn scan_skips_runs_that_are_too_short() {
        let mut p = pool(16);
        // frames 3..6 free, 6 reserved, 7.. free
        p.mark_inaccessible(FrameNumber::new(6), 1).unwrap();
        assert_eq!(p.get_frames(4).unwrap(), FrameNumber::new(7));
        assert_eq!(p.get_frames(3).unwrap(), FrameNumber::new(3));
    }

    #[test]
    fn release_run_stops_at_next_head() {
        let mut p = pool(64);
        let a = p.get_frames(3).unwrap();
        let b = p.get_frames(2).unwrap();
        assert_eq!(p.release_run(a), Ok(3));
        assert_eq!(p.state(b), Ok(FrameState::HeadOfSequence));
        assert_eq!(p.state(b + 1u64), Ok(FrameState::Allocated));
        assert_eq!(p.free_count(), 63 - 2);
    }

    #[test]
    fn release_run_stops_at_pool_end() {
        let mut p = pool(8);
        let a = p.get_frames(7).unwrap();
        assert_eq!(p.free_count(), 0);
        assert_eq!(p.release_run(a), Ok(7));
        assert_eq!(p.free_count(), 7);
    }

    #[test]
    fn release_of_non_head_fails() {
        let mut p = pool(64);
        let a = p.get_frames(3).unwrap();
        assert_eq!(
            p.release_run(a + 1u64),
            Err(FramePoolError::NotHeadOfSequence {
                frame: a + 1u64,
                state: FrameState::Allocated
            })
        );
        assert_eq!(
            p.release_run(FrameNumber::new(40)),
            Err(FramePoolError::NotHeadOfSequence {
                frame: FrameNumber::new(40),
                state: FrameState::Free
            })
        );
        assert_eq!(p.free_count(), 63 - 3);
    }

    #[test]
    fn request_validation() {
        let mut p = pool(16);
        assert_eq!(p.get_frames(0), Err(FramePoolError::EmptyRequest));
        assert_eq!(
            p.get_frames(16),
            Err(FramePoolError::InsufficientFrames {
                requested: 16,
                free: 15,
                total: 16
            })
        );
        assert_eq!(p.free_count(), 15);
    }

    #[test]
    fn fragmentation_is_reported_without_mutation() {
        let mut p = pool(16);
        // 3..=17 free; pin every fourth frame
        for f in [6u64, 10, 14] {
            p.mark_inaccessible(FrameNumber::new(f), 1).unwrap();
        }
        let before = states(&p, 2, 16);
        assert_eq!(p.longest_free_run(), Ok(3));
        assert_eq!(
            p.get_frames(4),
            Err(FramePoolError::NoContiguousRun {
                requested: 4,
                longest: 3
            })
        );
        assert_eq!(states(&p, 2, 16), before);
        assert_eq!(p.free_count(), 12);
    }

    #[test]
    fn mark_inaccessible_is_all_or_nothing() {
        let mut p = pool(32);
        p.mark_inaccessible(FrameNumber::new(10), 2).unwrap();
        let before = states(&p, 2, 32);

        assert_eq!(
            p.mark_inaccessible(FrameNumber::new(5), 6),
            Err(FramePoolError::NotFree {
                frame: FrameNumber::new(10),
                state: FrameState::HeadOfSequence
            })
        );
        assert_eq!(
            p.mark_inaccessible(FrameNumber::new(30), 8),
            Err(FramePoolError::OutOfRange {
                frame: FrameNumber::new(34)
            })
        );
        assert_eq!(
            p.mark_inaccessible(FrameNumber::new(1), 1),
            Err(FramePoolError::OutOfRange {
                frame: FrameNumber::new(1)
            })
        );
        assert_eq!(states(&p, 2, 32), before);
        assert_eq!(p.free_count(), 32 - 1 - 2);
    }

    #[test]
    fn oversized_marking_is_rejected_without_mutation() {
        let mut p = pool(16);
        p.mark_inaccessible(FrameNumber::new(5), 2).unwrap();
        let before = states(&p, 2, 16);

        assert_eq!(
            p.mark_inaccessible(FrameNumber::new(5), usize::MAX),
            Err(FramePoolError::OutOfRange {
                frame: FrameNumber::new(18)
            })
        );
        assert_eq!(
            p.mark_inaccessible(FrameNumber::new(3), usize::MAX - 1),
            Err(FramePoolError::OutOfRange {
                frame: FrameNumber::new(18)
            })
        );
        assert_eq!(states(&p, 2, 16), before);
        assert_eq!(p.state(FrameNumber::new(5)), Ok(FrameState::HeadOfSequence));
        assert_eq!(p.free_count(), 16 - 1 - 2);
    }

    #[test]
    fn corrupt_codes_are_reported() {
        let mut p = pool(16);
        let a = p.get_frames(2).unwrap();
        p.corrupt(FrameNumber::new(8));
        assert_eq!(
            p.state(FrameNumber::new(8)),
            Err(FramePoolError::CorruptState {
                frame: FrameNumber::new(8),
                bits: 0b11
            })
        );
        assert!(matches!(
            p.get_frames(8),
            Err(FramePoolError::CorruptState { .. })
        ));
        // a run followed directly by a corrupt frame is left alone
        p.corrupt(a + 2u64);
        assert!(matches!(
            p.release_run(a),
            Err(FramePoolError::CorruptState { .. })
        ));
        assert_eq!(p.state(a), Ok(FrameState::HeadOfSequence));
    }

    #[test]
    fn size_bounds() {
        let mapper = unsafe { DirectMapper::identity() };
        assert!(matches!(
            unsafe { ContFramePool::new(&mapper, BASE, 0, InfoFrames::SelfHosted) },
            Err(FramePoolError::EmptyPool)
        ));
        assert!(matches!(
            unsafe {
                ContFramePool::new(&mapper, BASE, MAX_POOL_FRAMES + 1, InfoFrames::SelfHosted)
            },
            Err(FramePoolError::PoolTooLarge { .. })
        ));
    }

    #[test]
    fn largest_pool_needs_one_info_frame() {
        let mapper = scratch_mapper(BASE, 1);
        let p = unsafe {
            ContFramePool::new(&mapper, BASE, MAX_POOL_FRAMES, InfoFrames::SelfHosted)
        }
        .unwrap();
        assert_eq!(p.info_frames(), 1);
        assert_eq!(p.free_count(), MAX_POOL_FRAMES - 1);
    }

    #[test]
    fn external_info_frame_inside_the_pool_is_reserved() {
        let info = FrameNumber::new(5);
        let mapper = scratch_mapper(info, 1);
        let mut p =
            unsafe { ContFramePool::new(&mapper, BASE, 8, InfoFrames::External(info)) }.unwrap();
        assert_eq!(p.state(info), Ok(FrameState::HeadOfSequence));
        assert_eq!(p.free_count(), 7);
        assert_eq!(p.get_frames(3).unwrap(), BASE);
        assert_eq!(p.get_frames(3).unwrap(), FrameNumber::new(6));
    }

    #[test]
    fn raw_info_frame_encoding() {
        assert_eq!(InfoFrames::from_raw(0), InfoFrames::SelfHosted);
        assert_eq!(
            InfoFrames::from_raw(513),
            InfoFrames::External(FrameNumber::new(513))
        );
    }
}
