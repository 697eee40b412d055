use std::collections::HashMap;

use otaa_encoding::keys::{AppKey, DevEui, JoinEui};

use super::device::{Device, Session};
use super::JoinError;

/// Join server context of one JoinEUI.
#[derive(Debug, Clone)]
pub struct Application {
    join_eui: JoinEui,
    net_id: u32,
    devices: HashMap<DevEui, Device>,
    dev_addrs: HashMap<u32, DevEui>,
}

impl Application {
    pub fn new(join_eui: JoinEui, net_id: u32) -> Self {
        Application {
            join_eui,
            net_id: net_id & 0xFF_FFFF,
            devices: HashMap::new(),
            dev_addrs: HashMap::new(),
        }
    }

    pub fn join_eui(&self) -> JoinEui {
        self.join_eui
    }

    pub fn net_id(&self) -> u32 {
        self.net_id
    }

    pub fn add_device(&mut self, dev_eui: DevEui, app_key: AppKey) -> Result<(), JoinError> {
        if self.devices.contains_key(&dev_eui) {
            return Err(JoinError::DuplicateDevice { join_eui: self.join_eui, dev_eui });
        }
        self.devices.insert(dev_eui, Device::new(dev_eui, app_key));
        Ok(())
    }

    pub fn device(&self, dev_eui: &DevEui) -> Option<&Device> {
        self.devices.get(dev_eui)
    }

    pub(crate) fn device_mut(&mut self, dev_eui: &DevEui) -> Option<&mut Device> {
        self.devices.get_mut(dev_eui)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// DevEUI of the device that was given `dev_addr`.
    pub fn dev_eui_by_addr(&self, dev_addr: u32) -> Option<DevEui> {
        self.dev_addrs.get(&dev_addr).copied()
    }

    /// Stores `session` on the device and routes its DevAddr to it.
    pub(crate) fn start_session(&mut self, dev_eui: DevEui, session: Session) {
        if let Some(device) = self.devices.get_mut(&dev_eui) {
            self.dev_addrs.insert(session.dev_addr, dev_eui);
            device.start_session(session);
        }
    }
}
