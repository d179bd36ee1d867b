//! Device registry and bus scan
//!
//! The registry is an ordinary object owned by whoever runs detection.
//! Drivers never reach for it themselves.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{info, warn};

use crate::config::Ac97Config;
use crate::device::{Ac97, DeviceInfo};
use crate::platform::{PciDeviceIdentifier, Platform};
use crate::AudioError;

/// Audio device handle
pub type DeviceId = u32;

/// Result of running an interrupt handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt came from this device and was serviced
    Handled,
    /// Not ours; other handlers on a shared line should run
    NotHandled,
}

/// Something that services an interrupt line
pub trait IrqHandler: Send + Sync {
    /// Line the handler is attached to
    fn irq_line(&self) -> u8;

    /// Called by the dispatcher when the line fires
    fn handle_irq(&self) -> IrqReturn;
}

/// Something that answers the character device operations
pub trait SoundDevice: IrqHandler {
    /// Gets device information
    fn info(&self) -> DeviceInfo;

    /// Reads captured audio
    fn read(&self, buffer: &mut [u8]) -> Result<usize, AudioError>;

    /// Writes audio data for playback
    fn write(&self, data: &[u8]) -> Result<usize, AudioError>;

    /// Handles a control request
    fn ioctl(&self, request: u32, arg: usize) -> Result<usize, AudioError>;
}

/// Interrupt line registration
pub trait IrqRegistrar {
    /// Attaches `handler` to `line`
    fn register_irq_handler(
        &self,
        line: u8,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<(), AudioError>;
}

/// Live sound devices
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, Arc<dyn SoundDevice>>,
    next_device_id: DeviceId,
    default_playback: Option<DeviceId>,
}

impl DeviceRegistry {
    /// Creates an empty registry
    pub const fn new() -> Self {
        Self {
            devices: BTreeMap::new(),
            next_device_id: 1,
            default_playback: None,
        }
    }

    /// Registers a device; the first one becomes the default for playback
    pub fn register_device(&mut self, device: Arc<dyn SoundDevice>) -> DeviceId {
        let id = self.next_device_id;
        self.next_device_id += 1;

        if self.default_playback.is_none() {
            self.default_playback = Some(id);
        }

        self.devices.insert(id, device);
        id
    }

    /// Unregisters a device
    pub fn unregister_device(&mut self, id: DeviceId) -> Option<Arc<dyn SoundDevice>> {
        if self.default_playback == Some(id) {
            self.default_playback = None;
        }
        self.devices.remove(&id)
    }

    /// Gets a device by ID
    pub fn device(&self, id: DeviceId) -> Option<Arc<dyn SoundDevice>> {
        self.devices.get(&id).cloned()
    }

    /// Lists all registered devices
    pub fn list_devices(&self) -> Vec<(DeviceId, DeviceInfo)> {
        self.devices.iter().map(|(id, d)| (*id, d.info())).collect()
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Gets the default playback device
    pub fn default_playback_device(&self) -> Option<DeviceId> {
        self.default_playback
    }

    /// Sets the default playback device
    pub fn set_default_playback(&mut self, id: DeviceId) -> Result<(), AudioError> {
        if self.devices.contains_key(&id) {
            self.default_playback = Some(id);
            Ok(())
        } else {
            Err(AudioError::DeviceNotFound)
        }
    }

    /// Drops every device
    pub fn teardown(&mut self) {
        self.devices.clear();
        self.default_playback = None;
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Attaches every audio controller in `devices`.
///
/// Each match gets its own [`Ac97`] with a clone of `platform`; its
/// interrupt handler is registered before the hardware is initialized, then
/// the device is added to `registry`. Returns how many devices were
/// attached.
pub fn detect<P, I>(
    devices: I,
    platform: &P,
    irqs: &dyn IrqRegistrar,
    registry: &mut DeviceRegistry,
    config: &Ac97Config,
) -> usize
where
    P: Platform + Clone,
    I: IntoIterator<Item = PciDeviceIdentifier>,
{
    let mut attached = 0;
    for identifier in devices {
        if !identifier.is_audio_controller() {
            continue;
        }

        info!("ac97: found audio controller at {}", identifier.address);

        let device = match Ac97::new(platform.clone(), &identifier, config.clone()) {
            Ok(device) => Arc::new(device),
            Err(err) => {
                warn!("ac97: failed to initialize device {}: {}", identifier.address, err);
                continue;
            }
        };

        if let Err(err) = irqs.register_irq_handler(identifier.interrupt_line, device.clone()) {
            warn!(
                "ac97: cannot attach IRQ {} for {}: {}",
                identifier.interrupt_line, identifier.address, err
            );
            continue;
        }

        device.initialize();
        registry.register_device(device);
        attached += 1;
    }
    attached
}
