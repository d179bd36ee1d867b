//! Kernel services consumed by the driver

use core::fmt;

use crate::dma::DmaAllocator;
use crate::io::PortIo;
use crate::sync::{InterruptControl, WaitQueue};

/// PCI class code for multimedia controllers
pub const CLASS_MULTIMEDIA: u8 = 0x04;

/// PCI multimedia subclass for audio controllers
pub const SUBCLASS_AUDIO_CONTROLLER: u8 = 0x01;

/// PCI function address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PciAddress {
    /// Bus number
    pub bus: u8,
    /// Device number
    pub device: u8,
    /// Function number
    pub function: u8,
}

impl PciAddress {
    /// Creates a new PCI address
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self { bus, device, function }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// What the bus scan reports for one function
#[derive(Debug, Clone, Copy)]
pub struct PciDeviceIdentifier {
    /// Function address
    pub address: PciAddress,
    /// Base class code
    pub class_code: u8,
    /// Subclass code
    pub subclass_code: u8,
    /// BAR0 (NAM mixer, I/O space)
    pub bar0: u32,
    /// BAR1 (NABM bus master, I/O space)
    pub bar1: u32,
    /// Legacy interrupt line
    pub interrupt_line: u8,
}

impl PciDeviceIdentifier {
    /// True for multimedia/audio controller functions
    pub fn is_audio_controller(&self) -> bool {
        self.class_code == CLASS_MULTIMEDIA && self.subclass_code == SUBCLASS_AUDIO_CONTROLLER
    }

    /// Mixer I/O base from BAR0
    pub fn mixer_base(&self) -> u16 {
        (self.bar0 & 0xFFFC) as u16
    }

    /// Bus master I/O base from BAR1
    pub fn bus_master_base(&self) -> u16 {
        (self.bar1 & 0xFFFC) as u16
    }
}

/// Everything the driver needs from the kernel
pub trait Platform: PortIo + InterruptControl + DmaAllocator + Send + Sync + 'static {
    /// Queue writers block on while the ring is full
    type WaitQueue: WaitQueue + Default;

    /// Switches the function to INTx pin interrupts
    fn enable_pin_based_interrupts(&self, address: PciAddress);

    /// Sets the bus master enable bit in the command register
    fn enable_bus_mastering(&self, address: PciAddress);

    /// Unmasks `line` at the interrupt controller
    fn enable_irq(&self, line: u8);
}
