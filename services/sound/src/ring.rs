//! Buffer Descriptor List
//!
//! The bus master walks a 32-entry circular list of descriptors. Each entry
//! points at one physical buffer. The host fills slots at its write cursor
//! and publishes them by moving the channel's last valid index.

use bitflags::bitflags;

use crate::dma::DmaBuffer;

/// Maximum BDL entries (AC'97 supports up to 32)
pub const MAX_BDL_ENTRIES: usize = 32;

/// Size of one BDL entry in bytes
pub const BDL_ENTRY_SIZE: usize = 8;

/// Size of the whole list in bytes
pub const BDL_SIZE: usize = MAX_BDL_ENTRIES * BDL_ENTRY_SIZE;

bitflags! {
    /// Descriptor control bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescriptorFlags: u16 {
        /// Buffer underrun policy: play zeros instead of the last sample
        const BUFFER_UNDERRUN_POLICY = 1 << 14;
        /// Raise a completion interrupt once this buffer has been played
        const INTERRUPT_ON_COMPLETION = 1 << 15;
    }
}

/// Buffer Descriptor List entry (8 bytes each)
#[repr(C, packed)]
#[derive(Clone, Copy, Debug)]
pub struct BdlEntry {
    /// Physical address of buffer
    pub address: u32,
    /// Buffer length in samples (not bytes!)
    pub length: u16,
    /// Control flags
    pub control: u16,
}

impl BdlEntry {
    /// Create a new BDL entry
    pub const fn new(address: u32, samples: u16, ioc: bool, bup: bool) -> Self {
        let mut control = 0u16;
        if ioc {
            control |= DescriptorFlags::INTERRUPT_ON_COMPLETION.bits();
        }
        if bup {
            control |= DescriptorFlags::BUFFER_UNDERRUN_POLICY.bits();
        }
        Self {
            address,
            length: samples,
            control,
        }
    }

    /// Empty entry
    pub const fn empty() -> Self {
        Self {
            address: 0,
            length: 0,
            control: 0,
        }
    }

    /// Control bits of this entry
    pub fn flags(&self) -> DescriptorFlags {
        DescriptorFlags::from_bits_retain(self.control)
    }

    /// Little-endian wire layout as read by the bus master
    pub fn to_bytes(&self) -> [u8; BDL_ENTRY_SIZE] {
        let (address, length, control) = (self.address, self.length, self.control);
        let mut bytes = [0u8; BDL_ENTRY_SIZE];
        bytes[0..4].copy_from_slice(&address.to_le_bytes());
        bytes[4..6].copy_from_slice(&length.to_le_bytes());
        bytes[6..8].copy_from_slice(&control.to_le_bytes());
        bytes
    }

    /// Parses the wire layout
    pub fn from_bytes(bytes: [u8; BDL_ENTRY_SIZE]) -> Self {
        Self {
            address: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            length: u16::from_le_bytes([bytes[4], bytes[5]]),
            control: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }
}

/// Descriptor list living in DMA memory, plus the host write cursor
pub struct DescriptorRing<B> {
    memory: B,
    write_index: usize,
}

impl<B: DmaBuffer> DescriptorRing<B> {
    /// Wraps a region of at least [`BDL_SIZE`] bytes. The list must fit in
    /// the first page: the controller takes a single base address.
    pub fn new(mut memory: B) -> Self {
        memory.with_page_mut(0, |page| {
            assert!(page.len() >= BDL_SIZE, "BDL region too small");
            for slot in page[..BDL_SIZE].chunks_exact_mut(BDL_ENTRY_SIZE) {
                slot.copy_from_slice(&BdlEntry::empty().to_bytes());
            }
        });
        Self {
            memory,
            write_index: 0,
        }
    }

    /// Physical base address programmed into BDBAR
    pub fn physical_base(&self) -> u32 {
        self.memory.physical_page(0) as u32
    }

    /// Slot the next entry will be written to
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Writes `entry` into the slot at the write cursor and returns that
    /// slot. The cursor is not moved; see [`advance`](Self::advance).
    pub fn populate(&mut self, entry: BdlEntry) -> u8 {
        let index = self.write_index;
        let offset = index * BDL_ENTRY_SIZE;
        self.memory.with_page_mut(0, |page| {
            page[offset..offset + BDL_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        });
        index as u8
    }

    /// Reads back the entry in `index`
    pub fn entry(&mut self, index: usize) -> BdlEntry {
        let offset = (index % MAX_BDL_ENTRIES) * BDL_ENTRY_SIZE;
        self.memory.with_page_mut(0, |page| {
            let mut bytes = [0u8; BDL_ENTRY_SIZE];
            bytes.copy_from_slice(&page[offset..offset + BDL_ENTRY_SIZE]);
            BdlEntry::from_bytes(bytes)
        })
    }

    /// Moves the write cursor to the next slot
    pub fn advance(&mut self) {
        self.write_index = (self.write_index + 1) % MAX_BDL_ENTRIES;
    }

    /// Puts the write cursor back to slot 0 after a channel reset
    pub fn rewind(&mut self) {
        self.write_index = 0;
    }
}
