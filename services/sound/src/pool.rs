//! Output buffer pool
//!
//! A fixed set of page-sized DMA buffers filled round-robin. Every buffer is
//! referenced by at most one live descriptor; the flow controller makes sure
//! the hardware is done with a page before it comes around again.

use crate::dma::{DmaBuffer, PAGE_SIZE};
use crate::AudioError;

/// Page-sized playback buffers plus their write cursor
pub struct OutputBufferPool<B> {
    pages: B,
    page_index: usize,
}

impl<B: DmaBuffer> OutputBufferPool<B> {
    /// Wraps an allocated region; every page becomes one buffer
    pub fn new(pages: B) -> Self {
        Self {
            pages,
            page_index: 0,
        }
    }

    /// Number of buffers in the pool
    pub fn page_count(&self) -> usize {
        self.pages.page_count()
    }

    /// Buffer the next chunk goes into
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Physical address of the buffer at the cursor
    pub fn current_physical_address(&self) -> u32 {
        self.pages.physical_page(self.page_index) as u32
    }

    /// Fills the first `length` bytes of the buffer at the cursor through
    /// `fill`. Errors from `fill` are passed through untouched.
    pub fn fill_current<F>(&mut self, length: usize, fill: F) -> Result<(), AudioError>
    where
        F: FnOnce(&mut [u8]) -> Result<(), AudioError>,
    {
        if length > PAGE_SIZE {
            return Err(AudioError::InvalidArgument);
        }
        let index = self.page_index;
        self.pages.with_page_mut(index, |page| fill(&mut page[..length]))
    }

    /// Moves the cursor to the next buffer
    pub fn advance(&mut self) {
        self.page_index = (self.page_index + 1) % self.page_count();
    }
}
