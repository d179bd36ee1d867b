//! Flow control arithmetic
//!
//! Capacity is derived from a snapshot of the channel's status, current
//! index and last valid index; nothing is cached between checks.

use crate::regs::StatusFlags;
use crate::ring::MAX_BDL_ENTRIES;

/// One read of the channel's playback position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackPosition {
    /// Channel status register
    pub status: StatusFlags,
    /// Slot the hardware is playing (CIV)
    pub current_index: u8,
    /// Last slot the hardware may play (LVI)
    pub last_valid_index: u8,
}

impl PlaybackPosition {
    /// True if the DMA engine has stopped
    pub fn is_halted(&self) -> bool {
        self.status.contains(StatusFlags::DMA_CONTROLLER_HALTED)
    }

    /// Number of slots still owned by the hardware.
    ///
    /// `(LVI - CIV) mod 32`, plus the slot being played while the engine
    /// runs.
    pub fn head_distance(&self) -> usize {
        let ring = MAX_BDL_ENTRIES as isize;
        let mut distance = self.last_valid_index as isize - self.current_index as isize;
        if distance < 0 {
            distance += ring;
        }
        let mut distance = distance as usize;
        if !self.is_halted() {
            distance += 1;
        }
        distance
    }

    /// True if a pool of `page_count` buffers has one free for the writer
    pub fn has_capacity(&self, page_count: usize) -> bool {
        self.head_distance() < page_count
    }
}
