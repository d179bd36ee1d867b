//! AC'97 register map
//!
//! - NAM (Native Audio Mixer): codec registers, BAR0
//! - NABM (Native Audio Bus Master): DMA engine registers, BAR1

use bitflags::bitflags;

/// NAM register offsets (relative to mixer base)
pub mod nam {
    /// Reset register - write any value to reset codec
    pub const RESET: u16 = 0x00;
    /// Master volume (L/R)
    pub const MASTER_VOLUME: u16 = 0x02;
    /// PCM out volume
    pub const PCM_OUT_VOLUME: u16 = 0x18;
    /// Extended audio ID
    pub const EXTENDED_AUDIO_ID: u16 = 0x28;
    /// Extended audio status/control
    pub const EXTENDED_AUDIO_CTRL: u16 = 0x2A;
    /// Front DAC sample rate
    pub const FRONT_DAC_RATE: u16 = 0x2C;
    /// Vendor ID 1
    pub const VENDOR_ID1: u16 = 0x7C;
    /// Vendor ID 2
    pub const VENDOR_ID2: u16 = 0x7E;
}

/// NABM register offsets (relative to bus master base)
pub mod nabm {
    /// PCM In channel block
    pub const PCM_IN: u16 = 0x00;
    /// PCM Out channel block
    pub const PCM_OUT: u16 = 0x10;
    /// Mic In channel block
    pub const MIC_IN: u16 = 0x20;
    /// Global control
    pub const GLOB_CNT: u16 = 0x2C;
    /// Global status
    pub const GLOB_STA: u16 = 0x30;
}

/// Per-channel register offsets (relative to a channel block)
pub mod channel_reg {
    /// Buffer descriptor list base address (32-bit)
    pub const BDBAR: u16 = 0x00;
    /// Current index value (8-bit)
    pub const CIV: u16 = 0x04;
    /// Last valid index (8-bit)
    pub const LVI: u16 = 0x05;
    /// Status (16-bit)
    pub const SR: u16 = 0x06;
    /// Position in current buffer, in samples (16-bit)
    pub const PICB: u16 = 0x08;
    /// Prefetched index value (8-bit)
    pub const PIV: u16 = 0x0A;
    /// Control (8-bit)
    pub const CR: u16 = 0x0B;
}

bitflags! {
    /// Channel status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u16 {
        /// DMA controller halted
        const DMA_CONTROLLER_HALTED = 1 << 0;
        /// Current equals last valid
        const CURRENT_EQUALS_LAST_VALID = 1 << 1;
        /// Last valid buffer completion interrupt
        const LAST_VALID_BUFFER_COMPLETION = 1 << 2;
        /// Buffer completion interrupt
        const BUFFER_COMPLETION = 1 << 3;
        /// FIFO error
        const FIFO_ERROR = 1 << 4;
    }
}

impl StatusFlags {
    /// Write-1-to-clear bits acknowledged by the interrupt handler
    pub const INTERRUPT_ACK: Self = Self::LAST_VALID_BUFFER_COMPLETION
        .union(Self::BUFFER_COMPLETION)
        .union(Self::FIFO_ERROR);
}

bitflags! {
    /// Channel control register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u8 {
        /// Run/pause bus master
        const RUN_PAUSE_BUS_MASTER = 1 << 0;
        /// Reset registers
        const RESET_REGISTERS = 1 << 1;
        /// Last valid buffer interrupt enable
        const LAST_VALID_BUFFER_INTERRUPT_ENABLE = 1 << 2;
        /// FIFO error interrupt enable
        const FIFO_ERROR_INTERRUPT_ENABLE = 1 << 3;
        /// Interrupt on completion enable
        const INTERRUPT_ON_COMPLETION_ENABLE = 1 << 4;
    }
}

bitflags! {
    /// Global control register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GlobalControl: u32 {
        /// GPI interrupt enable
        const GPI_INTERRUPT_ENABLE = 1 << 0;
        /// Cold reset (active low, writing 1 releases the link)
        const COLD_RESET = 1 << 1;
        /// Warm reset
        const WARM_RESET = 1 << 2;
        /// AC-link shut off
        const LINK_SHUT_OFF = 1 << 3;
    }
}

bitflags! {
    /// Extended audio ID register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExtendedAudioId: u16 {
        /// Variable rate PCM audio supported
        const VARIABLE_RATE_PCM = 1 << 0;
        /// Double rate PCM audio supported
        const DOUBLE_RATE_PCM = 1 << 1;
        /// S/PDIF supported
        const SPDIF = 1 << 2;
        /// Variable rate mic supported
        const VARIABLE_RATE_MIC = 1 << 3;
        /// Codec revision field
        const REVISION = 0b11 << 10;
    }
}

/// Revision field value for AC'97 2.3 codecs
pub const REVISION_23: u16 = 0b10;

impl ExtendedAudioId {
    /// Codec revision field (bits 10..=11)
    pub fn revision(self) -> u16 {
        (self.bits() & Self::REVISION.bits()) >> 10
    }
}

bitflags! {
    /// Extended audio status/control register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExtendedAudioControl: u16 {
        /// Variable rate audio enable
        const VARIABLE_RATE_AUDIO = 1 << 0;
        /// Double rate audio enable
        const DOUBLE_RATE_AUDIO = 1 << 1;
    }
}
