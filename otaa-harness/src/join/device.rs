use otaa_encoding::keys::{AppKey, DevEui, SessionKeys};

use crate::region::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    /// No JoinRequest seen yet.
    Idle,
    /// A JoinAccept was produced, waiting for the first valid uplink.
    Joining,
    Joined,
}

/// Result of the latest JoinRequest of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub dev_nonce: u16,
    pub app_nonce: u32,
    pub dev_addr: u32,
    pub keys: SessionKeys,
}

#[derive(Debug, Clone)]
pub struct Device {
    dev_eui: DevEui,
    app_key: AppKey,
    state: JoinState,
    join_attempts: u32,
    session: Option<Session>,
}

impl Device {
    pub fn new(dev_eui: DevEui, app_key: AppKey) -> Self {
        Device { dev_eui, app_key, state: JoinState::Idle, join_attempts: 0, session: None }
    }

    pub fn dev_eui(&self) -> DevEui {
        self.dev_eui
    }

    pub fn app_key(&self) -> &AppKey {
        &self.app_key
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    pub fn join_attempts(&self) -> u32 {
        self.join_attempts
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Receive window of the next JoinAccept: RX1 on even attempts, RX2 on odd.
    pub(crate) fn next_rx_window(&mut self) -> Window {
        let window = if self.join_attempts % 2 == 0 { Window::_1 } else { Window::_2 };
        self.join_attempts = self.join_attempts.wrapping_add(1);
        window
    }

    pub(crate) fn start_session(&mut self, session: Session) {
        self.session = Some(session);
        self.state = JoinState::Joining;
    }

    pub(crate) fn set_joined(&mut self) {
        self.state = JoinState::Joined;
    }
}
