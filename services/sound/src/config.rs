//! Driver configuration

use crate::ring::MAX_BDL_ENTRIES;
use crate::AudioError;

/// AC'97 driver configuration
#[derive(Debug, Clone)]
pub struct Ac97Config {
    /// Name reported in device info
    pub name: &'static str,
    /// Number of page-sized output buffers in flight
    pub output_buffer_page_count: usize,
    /// Rate programmed at init when the codec supports variable rate
    pub default_sample_rate: u32,
    /// Delay between polls while a channel reset completes
    pub reset_poll_delay_us: u32,
}

impl Default for Ac97Config {
    fn default() -> Self {
        Self {
            name: "AC'97 Audio Controller",
            output_buffer_page_count: 4,
            default_sample_rate: 44100,
            reset_poll_delay_us: 50,
        }
    }
}

impl Ac97Config {
    /// Checks that the pool fits the descriptor ring
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.output_buffer_page_count == 0 || self.output_buffer_page_count >= MAX_BDL_ENTRIES {
            return Err(AudioError::InvalidArgument);
        }
        Ok(())
    }
}
