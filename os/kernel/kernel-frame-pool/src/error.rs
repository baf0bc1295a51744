use crate::registry::PoolId;
use crate::state::FrameState;
use kernel_memory_addresses::FrameNumber;

/// Everything that can go wrong in a frame pool.
///
/// None of these are recoverable from the allocator's point of view: an
/// `Err` always leaves every pool exactly as it was before the call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramePoolError {
    #[error("pool of {nframes} frames exceeds the {max} frames one info frame can describe")]
    PoolTooLarge { nframes: usize, max: usize },
    #[error("pool must span at least one frame")]
    EmptyPool,
    #[error("request for zero frames")]
    EmptyRequest,
    #[error("requested {requested} frames but only {free} of {total} are free")]
    InsufficientFrames {
        requested: usize,
        free: usize,
        total: usize,
    },
    #[error("unable to find {requested} contiguous free frames (longest run is {longest})")]
    NoContiguousRun { requested: usize, longest: usize },
    #[error("frame {frame} is out of range")]
    OutOfRange { frame: FrameNumber },
    #[error("frame {frame} is {state}, expected free")]
    NotFree {
        frame: FrameNumber,
        state: FrameState,
    },
    #[error("frame {frame} is {state}, not the head of a sequence")]
    NotHeadOfSequence {
        frame: FrameNumber,
        state: FrameState,
    },
    #[error("frame {frame} has invalid state bits {bits:#04b}")]
    CorruptState { frame: FrameNumber, bits: u8 },
    #[error("no frame pool owns frame {frame}")]
    UnknownFrame { frame: FrameNumber },
    #[error("frames {first}..={last} overlap a registered pool")]
    PoolOverlap {
        first: FrameNumber,
        last: FrameNumber,
    },
    #[error("no frame pool with id {0}")]
    UnknownPool(PoolId),
}

impl FramePoolError {
    /// Report on the error log and hand the error back.
    #[inline]
    #[must_use]
    pub(crate) fn logged(self) -> Self {
        log::error!("{self}");
        self
    }
}
