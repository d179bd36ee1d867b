//! AC'97 Audio Controller
//!
//! Ties the pieces together: negotiation at init, the blocking write path,
//! and the PCM out interrupt handler.
//!
//! Locking:
//! - `pcm_out` (an [`IrqLock`]) holds the channel and descriptor ring. The
//!   interrupt handler takes it too, so status/index reads and LVI updates
//!   never interleave with the handler.
//! - `output` holds the buffer pool and is only taken by `write`. It is held
//!   for the whole call, so concurrent writers are serialized.
//! - `codec` holds negotiated rate and capabilities; control path only.

use alloc::string::String;
use core::cmp::min;

use log::{debug, info, warn};
use spin::Mutex;

use crate::channel::Ac97Channel;
use crate::codec::{
    vendor_name, CodecState, Mixer, PCM_FIXED_SAMPLE_RATE, PCM_SAMPLE_RATE_MAXIMUM,
    PCM_SAMPLE_RATE_MINIMUM,
};
use crate::config::Ac97Config;
use crate::dma::{DmaAllocator, RegionAccess, PAGE_SIZE};
use crate::io::RegisterPort;
use crate::platform::{PciAddress, PciDeviceIdentifier, Platform};
use crate::pool::OutputBufferPool;
use crate::regs::{nabm, GlobalControl, StatusFlags};
use crate::registry::{IrqHandler, IrqReturn, SoundDevice};
use crate::ring::{BdlEntry, DescriptorRing, BDL_SIZE};
use crate::sync::{IrqLock, IrqLockGuard, WaitQueue};
use crate::{ioctl, AudioError};

type DmaBufferOf<P> = <P as DmaAllocator>::Buffer;

/// Caller memory a write copies from.
///
/// Kernel callers hand in slices; a syscall layer implements this over
/// user memory and reports unreadable pages as [`AudioError::Fault`].
pub trait SampleSource {
    /// Copies `dest.len()` bytes starting at `offset` into `dest`
    fn read_into(&self, offset: usize, dest: &mut [u8]) -> Result<(), AudioError>;
}

impl SampleSource for [u8] {
    fn read_into(&self, offset: usize, dest: &mut [u8]) -> Result<(), AudioError> {
        let end = offset.checked_add(dest.len()).ok_or(AudioError::Fault)?;
        let src = self.get(offset..end).ok_or(AudioError::Fault)?;
        dest.copy_from_slice(src);
        Ok(())
    }
}

/// Audio device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// PCI function
    pub pci_address: PciAddress,
    /// Codec vendor ID
    pub vendor_id: u32,
    /// Codec vendor name
    pub vendor_name: &'static str,
    /// Current output rate
    pub sample_rate: u32,
    /// Minimum sample rate
    pub min_sample_rate: u32,
    /// Maximum sample rate
    pub max_sample_rate: u32,
    /// Variable rate audio enabled
    pub variable_rate: bool,
    /// Double rate audio enabled
    pub double_rate: bool,
}

/// State shared between the writer and the interrupt handler
struct PcmOut<B> {
    channel: Ac97Channel,
    ring: Option<DescriptorRing<B>>,
}

impl<B: crate::dma::DmaBuffer> PcmOut<B> {
    fn reset<P: crate::io::PortIo + ?Sized>(&mut self, io: &P, poll_delay_us: u32) {
        self.channel.reset(io, poll_delay_us);
        if let Some(ring) = self.ring.as_mut() {
            ring.rewind();
        }
    }
}

/// AC'97 Audio Controller
pub struct Ac97<P: Platform> {
    platform: P,
    config: Ac97Config,
    pci_address: PciAddress,
    irq_line: u8,
    /// Mixer base I/O port
    mixer_base: u16,
    /// Bus master base I/O port
    bus_master_base: u16,
    codec: Mutex<CodecState>,
    pcm_out: IrqLock<PcmOut<DmaBufferOf<P>>>,
    output: Mutex<Option<OutputBufferPool<DmaBufferOf<P>>>>,
    irq_queue: P::WaitQueue,
}

impl<P: Platform> Ac97<P> {
    /// Binds to the controller described by `identifier`. No hardware is
    /// touched until [`initialize`](Self::initialize).
    pub fn new(
        platform: P,
        identifier: &PciDeviceIdentifier,
        config: Ac97Config,
    ) -> Result<Self, AudioError> {
        config.validate()?;
        let bus_master_base = identifier.bus_master_base();
        Ok(Self {
            platform,
            config,
            pci_address: identifier.address,
            irq_line: identifier.interrupt_line,
            mixer_base: identifier.mixer_base(),
            bus_master_base,
            codec: Mutex::new(CodecState::default()),
            pcm_out: IrqLock::new(PcmOut {
                channel: Ac97Channel::new("PCMOut", bus_master_base, nabm::PCM_OUT),
                ring: None,
            }),
            output: Mutex::new(None),
            irq_queue: P::WaitQueue::default(),
        })
    }

    /// Resets and negotiates with the codec, then enables the interrupt
    /// line. Register the interrupt handler before calling this.
    ///
    /// # Panics
    ///
    /// Panics if the codec is not revision 2.3 or refuses its initial rate.
    pub fn initialize(&self) {
        debug!("ac97 @ {}: mixer base: {:#06x}", self.pci_address, self.mixer_base);
        debug!("ac97 @ {}: bus base: {:#06x}", self.pci_address, self.bus_master_base);

        self.platform.enable_pin_based_interrupts(self.pci_address);
        self.platform.enable_bus_mastering(self.pci_address);

        // Bus cold reset, enable interrupts
        let bus = RegisterPort::new(&self.platform, self.bus_master_base);
        let mut control = GlobalControl::from_bits_retain(bus.read::<u32>(nabm::GLOB_CNT));
        control |= GlobalControl::GPI_INTERRUPT_ENABLE;
        control |= GlobalControl::COLD_RESET;
        bus.write::<u32>(nabm::GLOB_CNT, control.bits());

        let mixer = self.mixer();
        mixer.reset();

        {
            let mut codec = self.codec.lock();
            codec.enable_extended_features(&mixer);
            let rate = codec.initial_sample_rate(self.config.default_sample_rate);
            if let Err(err) = codec.set_pcm_output_sample_rate(&mixer, rate) {
                panic!("ac97 @ {}: initial rate {} Hz rejected: {}", self.pci_address, rate, err);
            }
        }

        // Left and right attenuation of 0 is 0 dB
        mixer.set_master_output_volume(0, 0, false);
        mixer.set_pcm_output_volume(0, 0, false);

        self.reset_pcm_out(&mut self.lock_pcm_out());
        self.platform.enable_irq(self.irq_line);

        info!("ac97 @ {}: initialized, {} Hz", self.pci_address, self.sample_rate());
    }

    fn mixer(&self) -> Mixer<'_, P> {
        Mixer::new(&self.platform, self.mixer_base)
    }

    fn lock_pcm_out(&self) -> IrqLockGuard<'_, PcmOut<DmaBufferOf<P>>, P> {
        self.pcm_out.lock(&self.platform)
    }

    fn reset_pcm_out(&self, pcm_out: &mut PcmOut<DmaBufferOf<P>>) {
        pcm_out.reset(&self.platform, self.config.reset_poll_delay_us);
    }

    /// PCI function this device is bound to
    pub fn pci_address(&self) -> PciAddress {
        self.pci_address
    }

    /// Negotiated PCM output rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.codec.lock().sample_rate
    }

    /// Changes the PCM output rate. See
    /// [`CodecState::set_pcm_output_sample_rate`] for what is accepted.
    pub fn set_sample_rate(&self, sample_rate: u32) -> Result<(), AudioError> {
        let mixer = self.mixer();
        self.codec.lock().set_pcm_output_sample_rate(&mixer, sample_rate)
    }

    /// Master output attenuation, 6 bits per channel
    pub fn set_master_output_volume(&self, left: u8, right: u8, muted: bool) {
        self.mixer().set_master_output_volume(left, right, muted);
    }

    /// PCM out attenuation, 5 bits per channel
    pub fn set_pcm_output_volume(&self, left: u8, right: u8, muted: bool) {
        self.mixer().set_pcm_output_volume(left, right, muted);
    }

    /// Playback only; reads never return data.
    pub fn read(&self, _buffer: &mut [u8]) -> Result<usize, AudioError> {
        Ok(0)
    }

    /// Queues `length` bytes of 16-bit PCM from `data`, blocking while the
    /// hardware still owns every output buffer.
    ///
    /// Data is pushed one page at a time. If a page fails the error is
    /// returned; pages before it have already been queued.
    ///
    /// The buffer pool lock is a spin lock held for the whole call,
    /// including any wait for free buffers. A concurrent caller busy-waits
    /// until the current one returns, so callers that may contend should be
    /// serialized above the driver (the device file layer holds one writer
    /// at a time).
    pub fn write<S: SampleSource + ?Sized>(
        &self,
        data: &S,
        length: usize,
    ) -> Result<usize, AudioError> {
        if length % 2 != 0 {
            return Err(AudioError::InvalidArgument);
        }

        let mut output = self.output.lock();
        if output.is_none() {
            *output = Some(self.allocate_dma_memory()?);
        }
        let pool = match output.as_mut() {
            Some(pool) => pool,
            None => return Err(AudioError::NotReady),
        };

        let mut offset = 0;
        while offset < length {
            let chunk = min(length - offset, PAGE_SIZE);
            self.write_single_buffer(pool, data, offset, chunk)?;
            offset += chunk;
        }

        Ok(length)
    }

    /// Allocates pool and descriptor list together; nothing is kept if
    /// either allocation fails.
    fn allocate_dma_memory(&self) -> Result<OutputBufferPool<DmaBufferOf<P>>, AudioError> {
        let pages = self
            .platform
            .allocate_dma_buffer_pages(
                self.config.output_buffer_page_count * PAGE_SIZE,
                "AC97 Output buffer",
                RegionAccess::WRITE,
            )
            .map_err(|err| {
                warn!("ac97 @ {}: output buffer allocation failed: {}", self.pci_address, err);
                AudioError::NotReady
            })?;
        let list = self
            .platform
            .allocate_dma_buffer_pages(BDL_SIZE, "AC97 Buffer Descriptor List", RegionAccess::WRITE)
            .map_err(|err| {
                warn!("ac97 @ {}: descriptor list allocation failed: {}", self.pci_address, err);
                AudioError::NotReady
            })?;

        self.lock_pcm_out().ring = Some(DescriptorRing::new(list));
        Ok(OutputBufferPool::new(pages))
    }

    fn write_single_buffer<S: SampleSource + ?Sized>(
        &self,
        pool: &mut OutputBufferPool<DmaBufferOf<P>>,
        data: &S,
        offset: usize,
        length: usize,
    ) -> Result<(), AudioError> {
        debug_assert!(length <= PAGE_SIZE);

        self.wait_for_free_buffer(pool.page_count());

        // Copy outside the lock: the source may need to fault pages in.
        pool.fill_current(length, |dest| data.read_into(offset, dest))?;
        let buffer_address = pool.current_physical_address();

        let mut pcm_out = self.lock_pcm_out();
        if !pcm_out.channel.dma_running() {
            self.reset_pcm_out(&mut pcm_out);
        }

        let PcmOut { channel, ring } = &mut *pcm_out;
        let ring = ring.as_mut().ok_or(AudioError::NotReady)?;

        let number_of_samples = (length / 2) as u16;
        let index = ring.populate(BdlEntry::new(buffer_address, number_of_samples, true, false));
        channel.set_last_valid_index(&self.platform, ring.physical_base(), index);

        if !channel.dma_running() {
            channel.start_dma(&self.platform);
        }

        ring.advance();
        pool.advance();
        Ok(())
    }

    /// Blocks until fewer than `page_count` buffers are still queued.
    fn wait_for_free_buffer(&self, page_count: usize) {
        let mut pcm_out = self.lock_pcm_out();
        loop {
            let position = pcm_out.channel.position(&self.platform);
            if position.has_capacity(page_count) {
                break;
            }

            #[cfg(feature = "debug")]
            log::trace!(
                "ac97 @ {}: waiting on interrupt - stat: {:#b} CI: {} LVI: {}",
                self.pci_address,
                position.status.bits(),
                position.current_index,
                position.last_valid_index
            );

            let ticket = self.irq_queue.prepare_to_wait();
            drop(pcm_out);
            self.irq_queue.wait(ticket, "AC97");
            pcm_out = self.lock_pcm_out();

            // A stopped engine gets a full reset before the next queue, so
            // there is room by definition.
            if !pcm_out.channel.dma_running() {
                break;
            }
        }
    }

    /// Services a PCM out interrupt.
    ///
    /// # Panics
    ///
    /// Panics on a FIFO error; the driver never expects one.
    pub fn handle_irq(&self) -> IrqReturn {
        let mut pcm_out = self.lock_pcm_out();
        let status = pcm_out.channel.status(&self.platform);

        #[cfg(feature = "debug")]
        log::trace!("ac97 @ {}: interrupt received - stat: {:#b}", self.pci_address, status.bits());

        assert!(
            !status.contains(StatusFlags::FIFO_ERROR),
            "ac97 @ {}: PCM out FIFO error",
            self.pci_address
        );

        if !status.contains(StatusFlags::BUFFER_COMPLETION) {
            return IrqReturn::NotHandled;
        }

        pcm_out.channel.clear_status(&self.platform, StatusFlags::INTERRUPT_ACK);

        // Nothing left to play and nobody waiting: shut the engine down.
        if status.contains(StatusFlags::DMA_CONTROLLER_HALTED) && self.irq_queue.is_empty() {
            self.reset_pcm_out(&mut pcm_out);
        } else {
            self.irq_queue.wake_all();
        }
        IrqReturn::Handled
    }

    /// Device information snapshot
    pub fn info(&self) -> DeviceInfo {
        let codec = self.codec.lock().clone();
        let (min_sample_rate, max_sample_rate) = if codec.variable_rate_pcm_supported {
            let shift = if codec.double_rate_pcm_enabled { 1 } else { 0 };
            (PCM_SAMPLE_RATE_MINIMUM << shift, PCM_SAMPLE_RATE_MAXIMUM << shift)
        } else {
            (PCM_FIXED_SAMPLE_RATE, PCM_FIXED_SAMPLE_RATE)
        };
        DeviceInfo {
            name: String::from(self.config.name),
            pci_address: self.pci_address,
            vendor_id: codec.vendor_id,
            vendor_name: vendor_name(codec.vendor_id),
            sample_rate: codec.sample_rate,
            min_sample_rate,
            max_sample_rate,
            variable_rate: codec.variable_rate_pcm_supported,
            double_rate: codec.double_rate_pcm_enabled,
        }
    }
}

impl<P: Platform> IrqHandler for Ac97<P> {
    fn irq_line(&self) -> u8 {
        self.irq_line
    }

    fn handle_irq(&self) -> IrqReturn {
        Ac97::handle_irq(self)
    }
}

impl<P: Platform> SoundDevice for Ac97<P> {
    fn info(&self) -> DeviceInfo {
        Ac97::info(self)
    }

    fn read(&self, buffer: &mut [u8]) -> Result<usize, AudioError> {
        Ac97::read(self, buffer)
    }

    fn write(&self, data: &[u8]) -> Result<usize, AudioError> {
        Ac97::write(self, data, data.len())
    }

    fn ioctl(&self, request: u32, arg: usize) -> Result<usize, AudioError> {
        match request {
            ioctl::SOUNDCARD_IOCTL_GET_SAMPLE_RATE => Ok(self.sample_rate() as usize),
            ioctl::SOUNDCARD_IOCTL_SET_SAMPLE_RATE => {
                let rate = u32::try_from(arg).map_err(|_| AudioError::NotSupported)?;
                self.set_sample_rate(rate)?;
                Ok(0)
            }
            _ => Err(AudioError::InvalidArgument),
        }
    }
}
