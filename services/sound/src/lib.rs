//! # S-SOUND: AC'97 PCM Output Driver
//!
//! Playback driver for Intel AC'97 compatible controllers (ICH, QEMU and
//! VirtualBox emulate one). The driver streams 16-bit PCM to the codec
//! through the bus master DMA engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          DeviceRegistry  /  detect() bus scan            │
//! ├─────────────────────────────────────────────────────────┤
//! │   SoundDevice (read/write/ioctl)  │  IrqHandler          │
//! ├───────────────────────────────────┴─────────────────────┤
//! │                     Ac97 device                          │
//! │  flow control ─ output pool ─ descriptor ring ─ channel  │
//! │                  codec negotiation                       │
//! ├─────────────────────────────────────────────────────────┤
//! │   Platform: port I/O, DMA pages, IRQ masking, waits      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The crate never touches global state. Everything the driver needs from
//! the kernel (register access, DMA memory, interrupt masking, blocking
//! waits) arrives through the [`Platform`] trait.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod channel;
pub mod codec;
pub mod config;
pub mod device;
pub mod dma;
pub mod flow;
pub mod io;
pub mod platform;
pub mod pool;
pub mod regs;
pub mod registry;
pub mod ring;
pub mod sync;

#[cfg(test)]
mod sim;

use core::fmt;

pub use config::Ac97Config;
pub use device::{Ac97, DeviceInfo};
pub use dma::{DmaAllocator, DmaBuffer, RegionAccess, PAGE_SIZE};
pub use io::{PortIo, RegisterPort, RegisterWidth};
pub use platform::{PciAddress, PciDeviceIdentifier, Platform};
pub use registry::{
    detect, DeviceId, DeviceRegistry, IrqHandler, IrqRegistrar, IrqReturn, SoundDevice,
};
pub use sync::{InterruptControl, WaitQueue};

/// Ioctl request numbers understood by [`SoundDevice::ioctl`].
pub mod ioctl {
    /// Returns the negotiated PCM output sample rate in Hz
    pub const SOUNDCARD_IOCTL_GET_SAMPLE_RATE: u32 = 0x5301;
    /// Sets the PCM output sample rate; the argument is the rate in Hz
    pub const SOUNDCARD_IOCTL_SET_SAMPLE_RATE: u32 = 0x5302;
}

/// Audio driver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioError {
    /// Requested parameter is outside what the codec can do
    NotSupported,
    /// DMA memory could not be set up
    NotReady,
    /// Malformed request
    InvalidArgument,
    /// Allocator ran out of DMA-capable memory
    OutOfMemory,
    /// Source memory could not be read
    Fault,
    /// No such device
    DeviceNotFound,
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AudioError::NotSupported => "operation not supported",
            AudioError::NotReady => "device not ready",
            AudioError::InvalidArgument => "invalid argument",
            AudioError::OutOfMemory => "out of memory",
            AudioError::Fault => "bad address",
            AudioError::DeviceNotFound => "device not found",
        };
        f.write_str(msg)
    }
}
