//! DMA memory handles
//!
//! The driver asks the kernel for physically backed pages and receives an
//! opaque handle. Only the handle knows how the pages are mapped.

use bitflags::bitflags;

use crate::AudioError;

/// Size of one DMA page
pub const PAGE_SIZE: usize = 4096;

bitflags! {
    /// Access rights requested for a DMA region
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionAccess: u8 {
        /// Host may read the region
        const READ = 1 << 0;
        /// Host may write the region
        const WRITE = 1 << 1;
    }
}

/// A run of DMA-visible pages
pub trait DmaBuffer: Send {
    /// Kernel virtual address of the first page
    fn vaddr(&self) -> usize;

    /// Number of pages in the region
    fn page_count(&self) -> usize;

    /// Physical address of page `index`
    fn physical_page(&self, index: usize) -> u64;

    /// Runs `f` over the mapped bytes of page `index`.
    fn with_page_mut<R>(&mut self, index: usize, f: impl FnOnce(&mut [u8]) -> R) -> R;
}

/// Source of DMA pages
pub trait DmaAllocator {
    /// Handle type returned by the allocator
    type Buffer: DmaBuffer;

    /// Allocates enough pages to hold `size` bytes.
    ///
    /// Returns [`AudioError::OutOfMemory`] when no DMA-capable memory is
    /// left. The driver reports that to writers as `NotReady`.
    fn allocate_dma_buffer_pages(
        &self,
        size: usize,
        name: &'static str,
        access: RegionAccess,
    ) -> Result<Self::Buffer, AudioError>;
}
