//! Per-frame state and its 2-bit bitmap encoding.
//!
//! | Bits | State |
//! |------|-------|
//! | `00` | [`FrameState::Free`] |
//! | `01` | [`FrameState::Allocated`] |
//! | `10` | [`FrameState::HeadOfSequence`] |
//! | `11` | invalid, reported as corruption |
//!
//! Four frames share one byte; frame `i` of a pool lives in byte `i / 4` at
//! bit offset `(i * 2) % 8`.

use bitfield_struct::bitfield;
use core::fmt;

/// Number of frame states packed into one bitmap byte.
pub const FRAMES_PER_BYTE: usize = 4;

/// State of a single frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameState {
    /// Not part of any allocated run.
    Free = 0b00,
    /// Part of an allocated run, but not its first frame.
    Allocated = 0b01,
    /// First frame of an allocated run.
    HeadOfSequence = 0b10,
}

impl FrameState {
    /// Decode a 2-bit state code; `None` for the invalid code `0b11`.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b00 => Some(Self::Free),
            0b01 => Some(Self::Allocated),
            0b10 => Some(Self::HeadOfSequence),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Free => "free",
            Self::Allocated => "allocated",
            Self::HeadOfSequence => "head-of-sequence",
        })
    }
}

/// One bitmap byte: the states of four consecutive frames.
///
/// Slot 0 occupies the lowest two bits.
#[bitfield(u8)]
struct StateByte {
    #[bits(2)]
    slot0: u8,
    #[bits(2)]
    slot1: u8,
    #[bits(2)]
    slot2: u8,
    #[bits(2)]
    slot3: u8,
}

impl StateByte {
    #[inline]
    const fn slot(self, slot: usize) -> u8 {
        match slot {
            0 => self.slot0(),
            1 => self.slot1(),
            2 => self.slot2(),
            _ => self.slot3(),
        }
    }

    /// Clear the 2-bit field of `slot` and store `bits` in it.
    #[inline]
    const fn with_slot(self, slot: usize, bits: u8) -> Self {
        match slot {
            0 => self.with_slot0(bits),
            1 => self.with_slot1(bits),
            2 => self.with_slot2(bits),
            _ => self.with_slot3(bits),
        }
    }
}

/// State bitmap of one pool, indexed by frame offset within the pool.
pub(crate) struct FrameBitmap<'m> {
    bytes: &'m mut [u8],
}

impl<'m> FrameBitmap<'m> {
    /// Bytes needed to describe `nframes` frames.
    #[inline]
    pub(crate) const fn bytes_for(nframes: usize) -> usize {
        nframes.div_ceil(FRAMES_PER_BYTE)
    }

    pub(crate) const fn new(bytes: &'m mut [u8]) -> Self {
        Self { bytes }
    }

    /// Mark every frame as [`FrameState::Free`].
    pub(crate) fn clear(&mut self) {
        self.bytes.fill(0);
    }

    #[inline]
    const fn locate(index: usize) -> (usize, usize) {
        (index / FRAMES_PER_BYTE, index % FRAMES_PER_BYTE)
    }

    /// Raw 2-bit code of the frame at `index`.
    #[inline]
    pub(crate) fn bits(&self, index: usize) -> u8 {
        let (byte, slot) = Self::locate(index);
        StateByte::from_bits(self.bytes[byte]).slot(slot)
    }

    #[inline]
    pub(crate) fn set(&mut self, index: usize, state: FrameState) {
        let (byte, slot) = Self::locate(index);
        self.bytes[byte] = StateByte::from_bits(self.bytes[byte])
            .with_slot(slot, state.into_bits())
            .into_bits();
    }

    #[cfg(test)]
    pub(crate) fn set_bits(&mut self, index: usize, bits: u8) {
        let (byte, slot) = Self::locate(index);
        self.bytes[byte] = StateByte::from_bits(self.bytes[byte])
            .with_slot(slot, bits)
            .into_bits();
    }
}
