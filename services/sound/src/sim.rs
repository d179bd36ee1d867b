//! Simulated AC'97 controller for unit tests
//!
//! Models the NAM mixer and the PCM out bus master channel closely enough to
//! drive the real write path: channel reset, the halt/resume behaviour of
//! the DMA engine around LVI, write-1-to-clear status bits and descriptor
//! fetches from simulated physical memory.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::vec;
use std::vec::Vec;

use crate::dma::{DmaAllocator, DmaBuffer, RegionAccess, PAGE_SIZE};
use crate::io::PortIo;
use crate::platform::{PciAddress, Platform};
use crate::regs::{
    channel_reg, nabm, nam, ControlFlags, ExtendedAudioControl, ExtendedAudioId, StatusFlags,
    REVISION_23,
};
use crate::registry::{IrqHandler, IrqRegistrar, IrqReturn};
use crate::ring::{BdlEntry, DescriptorFlags, BDL_ENTRY_SIZE, MAX_BDL_ENTRIES};
use crate::sync::{InterruptControl, WaitQueue};
use crate::AudioError;

/// Mixer window of the simulated function
pub const MIXER_BASE: u16 = 0x1000;

/// Bus master window of the simulated function
pub const BUS_MASTER_BASE: u16 = 0x2000;

/// Physical address handed out for the first DMA allocation
pub const FIRST_DMA_ADDRESS: u64 = 0x0010_0000;

const MIXER_WINDOW: u16 = 0x80;
const PCM_OUT_BASE: u16 = BUS_MASTER_BASE + nabm::PCM_OUT;

/// SigmaTel STAC9700
const VENDOR_ID: u32 = 0x8384_7600;

/// Backing store of one simulated DMA region
pub type SharedMemory = Arc<Mutex<Vec<u8>>>;

/// DMA region backed by host memory
pub struct SimBuffer {
    base: u64,
    pages: usize,
    memory: SharedMemory,
}

impl SimBuffer {
    /// Region at `base` that no controller can see
    pub fn standalone(base: u64, pages: usize) -> Self {
        Self {
            base,
            pages,
            memory: Arc::new(Mutex::new(vec![0; pages * PAGE_SIZE])),
        }
    }

    /// Shared handle to the bytes of the region
    pub fn memory(&self) -> SharedMemory {
        self.memory.clone()
    }
}

impl DmaBuffer for SimBuffer {
    fn vaddr(&self) -> usize {
        self.base as usize
    }

    fn page_count(&self) -> usize {
        self.pages
    }

    fn physical_page(&self, index: usize) -> u64 {
        assert!(index < self.pages, "page {} out of range", index);
        self.base + (index * PAGE_SIZE) as u64
    }

    fn with_page_mut<R>(&mut self, index: usize, f: impl FnOnce(&mut [u8]) -> R) -> R {
        assert!(index < self.pages, "page {} out of range", index);
        let mut memory = self.memory.lock().unwrap();
        let start = index * PAGE_SIZE;
        f(&mut memory[start..start + PAGE_SIZE])
    }
}

fn pages_for(size: usize) -> usize {
    (size + PAGE_SIZE - 1) / PAGE_SIZE
}

fn default_mixer() -> [u16; (MIXER_WINDOW / 2) as usize] {
    let mut mixer = [0u16; (MIXER_WINDOW / 2) as usize];
    mixer[(nam::MASTER_VOLUME / 2) as usize] = 0x8000;
    mixer[(nam::PCM_OUT_VOLUME / 2) as usize] = 0x8808;
    mixer[(nam::FRONT_DAC_RATE / 2) as usize] = 48000;
    mixer
}

struct Hardware {
    mixer: [u16; (MIXER_WINDOW / 2) as usize],
    extended_id: u16,
    rate_quantum: u16,
    global_control: u32,

    bdbar: u32,
    civ: u8,
    lvi: u8,
    status: u16,
    control: u8,
    reset_polls: u32,
    reset_polls_left: u32,
    resets: usize,
    starts: usize,

    delay_calls: usize,
    writes: Vec<u16>,

    regions: Vec<(u64, SharedMemory)>,
    next_dma_address: u64,
    allocation_budget: Option<usize>,
    allocations: Vec<&'static str>,
    played: Vec<Vec<u8>>,

    pin_interrupts: bool,
    bus_mastering: bool,
    enabled_irqs: Vec<u8>,
}

impl Hardware {
    fn new(extended_id: u16) -> Self {
        Self {
            mixer: default_mixer(),
            extended_id,
            rate_quantum: 1,
            global_control: 0,
            bdbar: 0,
            civ: 0,
            lvi: 0,
            status: StatusFlags::DMA_CONTROLLER_HALTED.bits(),
            control: 0,
            reset_polls: 0,
            reset_polls_left: 0,
            resets: 0,
            starts: 0,
            delay_calls: 0,
            writes: Vec::new(),
            regions: Vec::new(),
            next_dma_address: FIRST_DMA_ADDRESS,
            allocation_budget: None,
            allocations: Vec::new(),
            played: Vec::new(),
            pin_interrupts: false,
            bus_mastering: false,
            enabled_irqs: Vec::new(),
        }
    }

    fn status(&self) -> StatusFlags {
        StatusFlags::from_bits_retain(self.status)
    }

    fn control(&self) -> ControlFlags {
        ControlFlags::from_bits_retain(self.control)
    }

    fn read(&mut self, port: u16) -> u32 {
        if (MIXER_BASE..MIXER_BASE + MIXER_WINDOW).contains(&port) {
            return match port - MIXER_BASE {
                nam::VENDOR_ID1 => VENDOR_ID >> 16,
                nam::VENDOR_ID2 => VENDOR_ID & 0xFFFF,
                nam::EXTENDED_AUDIO_ID => self.extended_id as u32,
                offset => self.mixer[(offset / 2) as usize] as u32,
            };
        }
        if port == BUS_MASTER_BASE + nabm::GLOB_CNT {
            return self.global_control;
        }
        match port.checked_sub(PCM_OUT_BASE) {
            Some(channel_reg::BDBAR) => self.bdbar,
            Some(channel_reg::CIV) => self.civ as u32,
            Some(channel_reg::LVI) => self.lvi as u32,
            Some(channel_reg::SR) => self.status as u32,
            Some(channel_reg::PICB) => 0,
            Some(channel_reg::PIV) => ((self.civ as usize + 1) % MAX_BDL_ENTRIES) as u32,
            Some(channel_reg::CR) => {
                if self.reset_polls_left > 0 {
                    self.reset_polls_left -= 1;
                } else {
                    self.control &= !ControlFlags::RESET_REGISTERS.bits();
                }
                self.control as u32
            }
            _ => panic!("read from unmapped port {:#06x}", port),
        }
    }

    fn write(&mut self, port: u16, value: u32) {
        self.writes.push(port);

        if (MIXER_BASE..MIXER_BASE + MIXER_WINDOW).contains(&port) {
            self.write_mixer(port - MIXER_BASE, value as u16);
            return;
        }
        if port == BUS_MASTER_BASE + nabm::GLOB_CNT {
            self.global_control = value;
            return;
        }
        match port.checked_sub(PCM_OUT_BASE) {
            Some(channel_reg::BDBAR) => self.bdbar = value & !0x7,
            Some(channel_reg::LVI) => {
                self.lvi = (value as usize % MAX_BDL_ENTRIES) as u8;
                // A halted engine picks up newly published descriptors.
                if self.control().contains(ControlFlags::RUN_PAUSE_BUS_MASTER)
                    && self.status().contains(StatusFlags::DMA_CONTROLLER_HALTED)
                    && self.civ != self.lvi
                {
                    self.civ = ((self.civ as usize + 1) % MAX_BDL_ENTRIES) as u8;
                    self.status &= !(StatusFlags::DMA_CONTROLLER_HALTED
                        | StatusFlags::CURRENT_EQUALS_LAST_VALID)
                        .bits();
                }
            }
            Some(channel_reg::SR) => {
                self.status &= !(value as u16 & StatusFlags::INTERRUPT_ACK.bits());
            }
            Some(channel_reg::CR) => {
                self.write_control(ControlFlags::from_bits_retain(value as u8))
            }
            _ => panic!("write to unmapped port {:#06x}", port),
        }
    }

    fn write_mixer(&mut self, offset: u16, value: u16) {
        match offset {
            nam::RESET => self.mixer = default_mixer(),
            nam::VENDOR_ID1 | nam::VENDOR_ID2 | nam::EXTENDED_AUDIO_ID => {}
            nam::FRONT_DAC_RATE => {
                let control = ExtendedAudioControl::from_bits_retain(
                    self.mixer[(nam::EXTENDED_AUDIO_CTRL / 2) as usize],
                );
                if control.contains(ExtendedAudioControl::VARIABLE_RATE_AUDIO) {
                    let quantum = self.rate_quantum;
                    self.mixer[(offset / 2) as usize] = value / quantum * quantum;
                }
            }
            _ => self.mixer[(offset / 2) as usize] = value,
        }
    }

    fn write_control(&mut self, control: ControlFlags) {
        if control.contains(ControlFlags::RESET_REGISTERS) {
            self.resets += 1;
            self.bdbar = 0;
            self.civ = 0;
            self.lvi = 0;
            self.status = StatusFlags::DMA_CONTROLLER_HALTED.bits();
            self.reset_polls_left = self.reset_polls;
            self.control = if self.reset_polls > 0 {
                ControlFlags::RESET_REGISTERS.bits()
            } else {
                0
            };
            return;
        }

        let was_running = self.control().contains(ControlFlags::RUN_PAUSE_BUS_MASTER);
        let running = control.contains(ControlFlags::RUN_PAUSE_BUS_MASTER);
        if running && !was_running {
            self.starts += 1;
            self.status &= !StatusFlags::DMA_CONTROLLER_HALTED.bits();
        } else if !running && was_running {
            self.status |= StatusFlags::DMA_CONTROLLER_HALTED.bits();
        }
        self.control = control.bits();
    }

    fn read_physical(&self, address: u64, length: usize) -> Vec<u8> {
        for (base, memory) in &self.regions {
            let memory = memory.lock().unwrap();
            let end = base + memory.len() as u64;
            if (*base..end).contains(&address) {
                let start = (address - base) as usize;
                return memory[start..start + length].to_vec();
            }
        }
        panic!("DMA from unmapped address {:#x}", address);
    }

    fn bdl_entry(&self, index: usize) -> BdlEntry {
        let address = self.bdbar as u64 + (index * BDL_ENTRY_SIZE) as u64;
        let mut bytes = [0u8; BDL_ENTRY_SIZE];
        bytes.copy_from_slice(&self.read_physical(address, BDL_ENTRY_SIZE));
        BdlEntry::from_bytes(bytes)
    }
}

/// Simulated controller; clones share the same hardware
#[derive(Clone)]
pub struct SimController {
    hardware: Arc<Mutex<Hardware>>,
}

impl SimController {
    /// Variable rate capable AC'97 2.3 codec
    pub fn new() -> Self {
        Self::with_extended_id(ExtendedAudioId::VARIABLE_RATE_PCM.bits() | (REVISION_23 << 10))
    }

    /// Codec reporting `extended_id` in its extended audio ID register
    pub fn with_extended_id(extended_id: u16) -> Self {
        Self {
            hardware: Arc::new(Mutex::new(Hardware::new(extended_id))),
        }
    }

    fn hw(&self) -> MutexGuard<'_, Hardware> {
        self.hardware.lock().unwrap()
    }

    /// Reads after a channel reset that still see the reset bit
    pub fn set_reset_polls(&self, polls: u32) {
        self.hw().reset_polls = polls;
    }

    /// Rounds front DAC rates down to a multiple of `quantum`
    pub fn set_rate_quantum(&self, quantum: u16) {
        self.hw().rate_quantum = quantum;
    }

    /// Number of further allocations that succeed; `None` for no limit
    pub fn set_allocation_budget(&self, budget: Option<usize>) {
        self.hw().allocation_budget = budget;
    }

    /// Names of the regions allocated so far
    pub fn allocations(&self) -> Vec<&'static str> {
        self.hw().allocations.clone()
    }

    /// Number of `io_delay` calls
    pub fn delay_calls(&self) -> usize {
        self.hw().delay_calls
    }

    /// Number of channel resets
    pub fn resets(&self) -> usize {
        self.hw().resets
    }

    /// Number of times the engine was switched from paused to running
    pub fn starts(&self) -> usize {
        self.hw().starts
    }

    /// Current value of a mixer register
    pub fn mixer_register(&self, offset: u16) -> u16 {
        self.hw().read(MIXER_BASE + offset) as u16
    }

    /// Global control register
    pub fn global_control(&self) -> u32 {
        self.hw().global_control
    }

    /// PCM out control register, without side effects
    pub fn pcm_out_control(&self) -> u8 {
        self.hw().control
    }

    /// PCM out descriptor list base
    pub fn pcm_out_bdbar(&self) -> u32 {
        self.hw().bdbar
    }

    /// PCM out current index
    pub fn pcm_out_civ(&self) -> u8 {
        self.hw().civ
    }

    /// PCM out last valid index
    pub fn pcm_out_lvi(&self) -> u8 {
        self.hw().lvi
    }

    /// PCM out status register
    pub fn pcm_out_status(&self) -> StatusFlags {
        self.hw().status()
    }

    /// Sets status bits as if the hardware raised them
    pub fn raise_status(&self, flags: StatusFlags) {
        self.hw().status |= flags.bits();
    }

    /// Descriptor `index` of the list BDBAR points at
    pub fn bdl_entry(&self, index: usize) -> BdlEntry {
        self.hw().bdl_entry(index)
    }

    /// Plays the descriptor at CIV, if the engine is running.
    ///
    /// Returns the bytes played. The engine halts after the last valid
    /// descriptor and advances otherwise.
    pub fn consume_one(&self) -> Option<Vec<u8>> {
        let mut hw = self.hw();
        if !hw.control().contains(ControlFlags::RUN_PAUSE_BUS_MASTER)
            || hw.status().contains(StatusFlags::DMA_CONTROLLER_HALTED)
        {
            return None;
        }

        let entry = hw.bdl_entry(hw.civ as usize);
        let data = hw.read_physical(entry.address as u64, entry.length as usize * 2);
        hw.played.push(data.clone());

        let mut raised = StatusFlags::empty();
        if entry.flags().contains(DescriptorFlags::INTERRUPT_ON_COMPLETION) {
            raised |= StatusFlags::BUFFER_COMPLETION;
        }
        if hw.civ == hw.lvi {
            raised |= StatusFlags::DMA_CONTROLLER_HALTED
                | StatusFlags::CURRENT_EQUALS_LAST_VALID
                | StatusFlags::LAST_VALID_BUFFER_COMPLETION;
        } else {
            hw.civ = ((hw.civ as usize + 1) % MAX_BDL_ENTRIES) as u8;
        }
        hw.status |= raised.bits();
        Some(data)
    }

    /// Every buffer played so far, in order
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.hw().played.clone()
    }

    /// Total register writes
    pub fn write_count(&self) -> usize {
        self.hw().writes.len()
    }

    /// Register writes to `port`
    pub fn writes_to(&self, port: u16) -> usize {
        self.hw().writes.iter().filter(|&&p| p == port).count()
    }

    /// Forgets logged writes
    pub fn clear_write_log(&self) {
        self.hw().writes.clear();
    }

    /// True once INTx was selected for the function
    pub fn pin_interrupts_enabled(&self) -> bool {
        self.hw().pin_interrupts
    }

    /// True once bus mastering was enabled
    pub fn bus_mastering_enabled(&self) -> bool {
        self.hw().bus_mastering
    }

    /// True if `line` was unmasked
    pub fn irq_enabled(&self, line: u8) -> bool {
        self.hw().enabled_irqs.contains(&line)
    }
}

impl Default for SimController {
    fn default() -> Self {
        Self::new()
    }
}

impl PortIo for SimController {
    fn in8(&self, port: u16) -> u8 {
        self.hw().read(port) as u8
    }

    fn in16(&self, port: u16) -> u16 {
        self.hw().read(port) as u16
    }

    fn in32(&self, port: u16) -> u32 {
        self.hw().read(port)
    }

    fn out8(&self, port: u16, value: u8) {
        self.hw().write(port, value as u32)
    }

    fn out16(&self, port: u16, value: u16) {
        self.hw().write(port, value as u32)
    }

    fn out32(&self, port: u16, value: u32) {
        self.hw().write(port, value)
    }

    fn io_delay(&self, _microseconds: u32) {
        self.hw().delay_calls += 1;
    }
}

impl InterruptControl for SimController {
    fn disable_interrupts(&self) -> bool {
        false
    }

    fn restore_interrupts(&self, _were_enabled: bool) {}
}

impl DmaAllocator for SimController {
    type Buffer = SimBuffer;

    fn allocate_dma_buffer_pages(
        &self,
        size: usize,
        name: &'static str,
        _access: RegionAccess,
    ) -> Result<SimBuffer, AudioError> {
        let mut hw = self.hw();
        let budget = hw.allocation_budget;
        match budget {
            Some(0) => return Err(AudioError::OutOfMemory),
            Some(left) => hw.allocation_budget = Some(left - 1),
            None => {}
        }

        let pages = pages_for(size);
        let buffer = SimBuffer::standalone(hw.next_dma_address, pages);
        hw.next_dma_address += (pages * PAGE_SIZE) as u64;
        hw.regions.push((buffer.base, buffer.memory()));
        hw.allocations.push(name);
        Ok(buffer)
    }
}

impl Platform for SimController {
    type WaitQueue = CondvarWaitQueue;

    fn enable_pin_based_interrupts(&self, _address: PciAddress) {
        self.hw().pin_interrupts = true;
    }

    fn enable_bus_mastering(&self, _address: PciAddress) {
        self.hw().bus_mastering = true;
    }

    fn enable_irq(&self, line: u8) {
        self.hw().enabled_irqs.push(line);
    }
}

#[derive(Default)]
struct QueueState {
    generation: u64,
    waiters: usize,
}

/// Wait queue on a host condition variable. A wake releases every
/// registered waiter at once.
#[derive(Default)]
pub struct CondvarWaitQueue {
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

impl WaitQueue for CondvarWaitQueue {
    type Ticket = u64;

    fn prepare_to_wait(&self) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.waiters += 1;
        state.generation
    }

    fn wait(&self, ticket: u64, _reason: &'static str) {
        let mut state = self.state.lock().unwrap();
        while state.generation == ticket {
            state = self.wakeup.wait(state).unwrap();
        }
    }

    fn wake_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.generation += 1;
        state.waiters = 0;
        self.wakeup.notify_all();
    }

    fn is_empty(&self) -> bool {
        self.state.lock().unwrap().waiters == 0
    }
}

/// Records handler registrations and dispatches lines by hand
#[derive(Default)]
pub struct SimIrqRegistrar {
    handlers: Mutex<Vec<(u8, Arc<dyn IrqHandler>)>>,
}

impl SimIrqRegistrar {
    /// Lines with a registered handler, in registration order
    pub fn lines(&self) -> Vec<u8> {
        self.handlers.lock().unwrap().iter().map(|(line, _)| *line).collect()
    }

    /// Runs every handler on `line`
    pub fn dispatch(&self, line: u8) -> Vec<IrqReturn> {
        let handlers: Vec<_> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == line)
            .map(|(_, handler)| handler.clone())
            .collect();
        handlers.iter().map(|handler| handler.handle_irq()).collect()
    }
}

impl IrqRegistrar for SimIrqRegistrar {
    fn register_irq_handler(
        &self,
        line: u8,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<(), AudioError> {
        self.handlers.lock().unwrap().push((line, handler));
        Ok(())
    }
}
