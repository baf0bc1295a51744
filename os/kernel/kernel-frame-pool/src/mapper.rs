//! # Reaching Frame Contents from Kernel Code
//!
//! A pool keeps its state bitmap *inside* physical frames: either its own first
//! frame or a frame handed to it by another pool. Code can only dereference
//! virtual addresses, so the pool asks a [`FrameMapper`] for a byte view of
//! the frame that holds the bitmap.
//!
//! ## Mapping strategies
//! - **Identity map**: physical address `pa` is visible at virtual `pa`
//!   (early boot, 32-bit kernels). Use [`DirectMapper::identity`].
//! - **Higher-half direct map**: physical `pa` is visible at `HHDM_BASE + pa`.
//!   Use [`DirectMapper::with_offset`].
//!
//! ## Example
//! ```rust,no_run
//! use kernel_frame_pool::mapper::{DirectMapper, FrameMapper};
//! use kernel_memory_addresses::FrameNumber;
//!
//! let mapper = unsafe { DirectMapper::with_offset(0xFFFF_8000_0000_0000) };
//! let bytes: &mut [u8] = unsafe { mapper.frame_bytes_mut(FrameNumber::new(512), 256) };
//! bytes.fill(0);
//! ```

use kernel_memory_addresses::{FrameNumber, Size4K};

/// Converts frame numbers into byte views of the frame contents.
pub trait FrameMapper {
    /// Map `len` bytes starting at the first byte of frame `first`.
    ///
    /// # Safety
    /// - The mapping must be present and cover the requested range.
    /// - The bytes must not be accessed through any other reference for the
    ///   chosen lifetime `'a`.
    unsafe fn frame_bytes_mut<'a>(&self, first: FrameNumber, len: usize) -> &'a mut [u8];
}

/// [`FrameMapper`] for memory mapped at a constant offset from its physical
/// address (identity map or HHDM).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DirectMapper {
    offset: u64,
}

impl DirectMapper {
    /// Physical memory is identity mapped.
    ///
    /// # Safety
    /// The caller asserts that every frame later passed to
    /// [`frame_bytes_mut`](FrameMapper::frame_bytes_mut) is identity mapped.
    #[must_use]
    pub const unsafe fn identity() -> Self {
        Self { offset: 0 }
    }

    /// Physical address `pa` is mapped at `offset + pa` (wrapping).
    ///
    /// # Safety
    /// The caller asserts that the mapping exists for every frame later passed
    /// to [`frame_bytes_mut`](FrameMapper::frame_bytes_mut).
    #[must_use]
    pub const unsafe fn with_offset(offset: u64) -> Self {
        Self { offset }
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }
}

impl FrameMapper for DirectMapper {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn frame_bytes_mut<'a>(&self, first: FrameNumber, len: usize) -> &'a mut [u8] {
        let pa = first.start_address::<Size4K>().as_u64();
        let va = self.offset.wrapping_add(pa) as usize as *mut u8;
        // SAFETY: Caller must ensure the frames are mapped at `offset + pa` and exclusive.
        unsafe { core::slice::from_raw_parts_mut(va, len) }
    }
}
