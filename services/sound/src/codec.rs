//! Codec negotiation
//!
//! Everything that goes through the NAM (mixer) window: codec reset,
//! extended capability detection, PCM front DAC rate and output volumes.

use log::{debug, info};

use crate::io::{PortIo, RegisterPort};
use crate::regs::{nam, ExtendedAudioControl, ExtendedAudioId, REVISION_23};
use crate::AudioError;

/// Rate of codecs without variable rate audio
pub const PCM_FIXED_SAMPLE_RATE: u32 = 48000;

/// Lowest rate the front DAC accepts
pub const PCM_SAMPLE_RATE_MINIMUM: u32 = 8000;

/// Highest rate the front DAC accepts. With double rate enabled the
/// effective output rate goes up to twice this.
pub const PCM_SAMPLE_RATE_MAXIMUM: u32 = 48000;

/// Attenuation field width of the master volume register
const MASTER_VOLUME_MASK: u8 = 63;

/// Attenuation field width of the PCM out volume register
const PCM_VOLUME_MASK: u8 = 31;

const MUTE_BIT: u16 = 1 << 15;

/// Packs a stereo attenuation pair into a volume register value
pub fn volume_value(left: u8, right: u8, mask: u8, muted: bool) -> u16 {
    let mut value = (right & mask) as u16 | (((left & mask) as u16) << 8);
    if muted {
        value |= MUTE_BIT;
    }
    value
}

/// Get vendor name from the combined vendor ID
pub fn vendor_name(id: u32) -> &'static str {
    match id >> 16 {
        0x4144 => "Analog Devices",
        0x414C => "Avance Logic/Realtek",
        0x4352 => "Cirrus Logic",
        0x4358 => "Conexant",
        0x4943 => "ICEnsemble",
        0x4E53 => "National Semiconductor",
        0x5349 => "Silicon Laboratories",
        0x5452 => "TriTech",
        0x574D => "Wolfson",
        0x8384 => "SigmaTel",
        0x8086 => "Intel",
        _ => "Unknown",
    }
}

/// View over the NAM register window
pub struct Mixer<'a, P: ?Sized> {
    regs: RegisterPort<'a, P>,
}

impl<'a, P: PortIo + ?Sized> Mixer<'a, P> {
    /// Mixer window at `base`
    pub fn new(io: &'a P, base: u16) -> Self {
        Self {
            regs: RegisterPort::new(io, base),
        }
    }

    /// Resets every mixer register to its default
    pub fn reset(&self) {
        self.regs.write::<u16>(nam::RESET, 1);
    }

    /// Combined vendor ID (VID1 << 16 | VID2)
    pub fn vendor_id(&self) -> u32 {
        let high = self.regs.read::<u16>(nam::VENDOR_ID1) as u32;
        let low = self.regs.read::<u16>(nam::VENDOR_ID2) as u32;
        (high << 16) | low
    }

    /// Extended audio ID register
    pub fn extended_audio_id(&self) -> ExtendedAudioId {
        ExtendedAudioId::from_bits_retain(self.regs.read::<u16>(nam::EXTENDED_AUDIO_ID))
    }

    /// Extended audio status/control register
    pub fn extended_audio_control(&self) -> ExtendedAudioControl {
        ExtendedAudioControl::from_bits_retain(self.regs.read::<u16>(nam::EXTENDED_AUDIO_CTRL))
    }

    /// Writes the extended audio status/control register
    pub fn set_extended_audio_control(&self, control: ExtendedAudioControl) {
        self.regs.write::<u16>(nam::EXTENDED_AUDIO_CTRL, control.bits());
    }

    /// Writes the PCM front DAC rate register
    pub fn set_front_dac_rate(&self, rate: u16) {
        self.regs.write::<u16>(nam::FRONT_DAC_RATE, rate);
    }

    /// Reads back the PCM front DAC rate the codec settled on
    pub fn front_dac_rate(&self) -> u16 {
        self.regs.read::<u16>(nam::FRONT_DAC_RATE)
    }

    /// Master output attenuation (6-bit per channel); 0 is 0 dB
    pub fn set_master_output_volume(&self, left: u8, right: u8, muted: bool) {
        self.regs.write::<u16>(
            nam::MASTER_VOLUME,
            volume_value(left, right, MASTER_VOLUME_MASK, muted),
        );
    }

    /// PCM out attenuation (5-bit per channel); 0 is 0 dB
    pub fn set_pcm_output_volume(&self, left: u8, right: u8, muted: bool) {
        self.regs.write::<u16>(
            nam::PCM_OUT_VOLUME,
            volume_value(left, right, PCM_VOLUME_MASK, muted),
        );
    }
}

/// Codec capabilities and the negotiated output rate
#[derive(Debug, Clone, Default)]
pub struct CodecState {
    /// Vendor ID read at init
    pub vendor_id: u32,
    /// Codec advertises variable rate PCM and it has been enabled
    pub variable_rate_pcm_supported: bool,
    /// Double rate PCM has been enabled
    pub double_rate_pcm_enabled: bool,
    /// Effective output rate in Hz, 0 until first programmed
    pub sample_rate: u32,
}

impl CodecState {
    /// Detects extended features and turns on variable and double rate
    /// where available.
    ///
    /// # Panics
    ///
    /// Panics if the codec is not AC'97 revision 2.3.
    pub fn enable_extended_features<P: PortIo + ?Sized>(&mut self, mixer: &Mixer<'_, P>) {
        self.vendor_id = mixer.vendor_id();

        let extended_audio_id = mixer.extended_audio_id();
        assert_eq!(
            extended_audio_id.revision(),
            REVISION_23,
            "ac97: unsupported codec revision (extended audio ID {:#06x})",
            extended_audio_id.bits()
        );

        let mut control = mixer.extended_audio_control();
        if extended_audio_id.contains(ExtendedAudioId::VARIABLE_RATE_PCM) {
            control |= ExtendedAudioControl::VARIABLE_RATE_AUDIO;
            self.variable_rate_pcm_supported = true;
        }
        if !self.variable_rate_pcm_supported {
            control.remove(ExtendedAudioControl::DOUBLE_RATE_AUDIO);
        } else if extended_audio_id.contains(ExtendedAudioId::DOUBLE_RATE_PCM) {
            control |= ExtendedAudioControl::DOUBLE_RATE_AUDIO;
            self.double_rate_pcm_enabled = true;
        }
        mixer.set_extended_audio_control(control);

        debug!(
            "ac97: codec {:#010x} ({}): VRA={} DRA={}",
            self.vendor_id,
            vendor_name(self.vendor_id),
            self.variable_rate_pcm_supported,
            self.double_rate_pcm_enabled
        );
    }

    /// Shift applied to rates while double rate is on
    fn double_rate_shift(&self) -> u32 {
        if self.double_rate_pcm_enabled {
            1
        } else {
            0
        }
    }

    /// Rate programmed at init
    pub fn initial_sample_rate(&self, default_sample_rate: u32) -> u32 {
        if self.variable_rate_pcm_supported {
            default_sample_rate
        } else {
            PCM_FIXED_SAMPLE_RATE
        }
    }

    /// Programs the front DAC for `sample_rate` Hz.
    ///
    /// Returns `NotSupported`, leaving the codec untouched, if the rate
    /// (after the double rate shift) is outside 8000..=48000 or the codec
    /// only does 48 kHz. The stored rate is the codec's readback, so a
    /// codec that rounds the request is reported truthfully.
    pub fn set_pcm_output_sample_rate<P: PortIo + ?Sized>(
        &mut self,
        mixer: &Mixer<'_, P>,
        sample_rate: u32,
    ) -> Result<(), AudioError> {
        if self.sample_rate == sample_rate {
            return Ok(());
        }

        let shift = self.double_rate_shift();
        let shifted_sample_rate = sample_rate >> shift;
        if !self.variable_rate_pcm_supported && shifted_sample_rate != PCM_FIXED_SAMPLE_RATE {
            return Err(AudioError::NotSupported);
        }
        if !(PCM_SAMPLE_RATE_MINIMUM..=PCM_SAMPLE_RATE_MAXIMUM).contains(&shifted_sample_rate) {
            return Err(AudioError::NotSupported);
        }

        mixer.set_front_dac_rate(shifted_sample_rate as u16);
        self.sample_rate = (mixer.front_dac_rate() as u32) << shift;

        info!("ac97: PCM front DAC rate set to {} Hz", self.sample_rate);
        Ok(())
    }
}
