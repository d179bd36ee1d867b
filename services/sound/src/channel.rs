//! Bus master channel
//!
//! Each NABM channel (PCM in, PCM out, mic) is a block of registers at a
//! fixed offset in the bus master window. The driver only drives PCM out,
//! but the block layout is the same for all three.

use log::debug;

use crate::flow::PlaybackPosition;
use crate::io::{PortIo, RegisterPort};
use crate::regs::{channel_reg, ControlFlags, StatusFlags};

/// One NABM channel and the host's view of whether its DMA engine runs
pub struct Ac97Channel {
    name: &'static str,
    /// Absolute port of the channel block
    base: u16,
    dma_running: bool,
}

impl Ac97Channel {
    /// Channel block at `bus_master_base + offset`
    pub const fn new(name: &'static str, bus_master_base: u16, offset: u16) -> Self {
        Self {
            name,
            base: bus_master_base + offset,
            dma_running: false,
        }
    }

    /// Channel name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Absolute port of the channel block
    pub fn base(&self) -> u16 {
        self.base
    }

    /// Host-side mirror of the Run/Pause bit
    pub fn dma_running(&self) -> bool {
        self.dma_running
    }

    fn regs<'a, P: PortIo + ?Sized>(&self, io: &'a P) -> RegisterPort<'a, P> {
        RegisterPort::new(io, self.base)
    }

    /// Reads the status register
    pub fn status<P: PortIo + ?Sized>(&self, io: &P) -> StatusFlags {
        StatusFlags::from_bits_retain(self.regs(io).read::<u16>(channel_reg::SR))
    }

    /// Acknowledges status bits (write-1-to-clear)
    pub fn clear_status<P: PortIo + ?Sized>(&self, io: &P, flags: StatusFlags) {
        self.regs(io).write::<u16>(channel_reg::SR, flags.bits());
    }

    /// Reads status, CIV and LVI. Call with the device lock held so the
    /// three reads form one snapshot.
    pub fn position<P: PortIo + ?Sized>(&self, io: &P) -> PlaybackPosition {
        let regs = self.regs(io);
        PlaybackPosition {
            status: StatusFlags::from_bits_retain(regs.read::<u16>(channel_reg::SR)),
            current_index: regs.read::<u8>(channel_reg::CIV),
            last_valid_index: regs.read::<u8>(channel_reg::LVI),
        }
    }

    /// Resets the channel registers and waits for the hardware to finish.
    ///
    /// This is the only way host and hardware ring positions get back in
    /// sync; CIV and LVI both read 0 afterwards.
    pub fn reset<P: PortIo + ?Sized>(&mut self, io: &P, poll_delay_us: u32) {
        debug!("ac97: channel {}: resetting", self.name);

        let regs = self.regs(io);
        regs.write::<u8>(channel_reg::CR, ControlFlags::RESET_REGISTERS.bits());

        while ControlFlags::from_bits_retain(regs.read::<u8>(channel_reg::CR))
            .contains(ControlFlags::RESET_REGISTERS)
        {
            regs.delay(poll_delay_us);
        }

        self.dma_running = false;
    }

    /// Points the engine at the list and lets it play up to `last_valid_index`
    pub fn set_last_valid_index<P: PortIo + ?Sized>(
        &self,
        io: &P,
        buffer_address: u32,
        last_valid_index: u8,
    ) {
        #[cfg(feature = "debug")]
        log::trace!(
            "ac97: channel {}: setting LVI - address: {:#x} LVI: {}",
            self.name,
            buffer_address,
            last_valid_index
        );

        let regs = self.regs(io);
        regs.write::<u32>(channel_reg::BDBAR, buffer_address);
        regs.write::<u8>(channel_reg::LVI, last_valid_index);
    }

    /// Sets Run/Pause with FIFO error and completion interrupts enabled
    pub fn start_dma<P: PortIo + ?Sized>(&mut self, io: &P) {
        debug!("ac97: channel {}: starting DMA engine", self.name);

        let regs = self.regs(io);
        let mut control = ControlFlags::from_bits_retain(regs.read::<u8>(channel_reg::CR));
        control |= ControlFlags::RUN_PAUSE_BUS_MASTER;
        control |= ControlFlags::FIFO_ERROR_INTERRUPT_ENABLE;
        control |= ControlFlags::INTERRUPT_ON_COMPLETION_ENABLE;
        regs.write::<u8>(channel_reg::CR, control.bits());

        self.dma_running = true;
    }
}
