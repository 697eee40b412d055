//! The join server: turns JoinRequests into scheduled JoinAccepts and checks
//! the uplink that confirms each activation.
use std::collections::HashMap;

use otaa_encoding::creator::JoinAccept;
use otaa_encoding::default_crypto::DefaultFactory;
use otaa_encoding::keys::{CryptoFactory, DevEui, JoinEui};
use otaa_encoding::parser::{DataUplinkPayload, Frame, JoinRequestPayload};
use rand_core::RngCore;
use tracing::{debug, error, info, warn};

use crate::forwarder::{RxPacket, Transmitter};
use crate::logging::RESULT_TARGET;
use crate::region::{ChannelPlan, Configuration, RxWindowConfig, Window};

mod allocator;
mod application;
mod device;

pub use allocator::{DevAddrAllocator, DEV_ADDR_FIRST, DEV_ADDR_LAST};
pub use application::Application;
pub use device::{Device, JoinState, Session};

const APP_NONCE_MASK: u32 = 0xFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("DevAddr space exhausted")]
    AddressSpaceExhausted,
    #[error("device {dev_eui} is listed twice for JoinEUI {join_eui}")]
    DuplicateDevice { join_eui: JoinEui, dev_eui: DevEui },
    #[error("JoinEUI {0} is configured twice")]
    DuplicateApplication(JoinEui),
}

/// Why a frame did not produce a JoinAccept or a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The PHYPayload does not hold a complete frame.
    InvalidFrame,
    UnknownJoinEui,
    UnknownDevEui,
    /// The uplink datarate is not an uplink datarate of the region.
    UnresolvableDatarate,
    /// The region has no downlink window for the uplink channel.
    NoRxWindow,
    AddressSpaceExhausted,
}

/// What [`JoinServer::handle`] did with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    JoinAcceptScheduled {
        dev_eui: DevEui,
        dev_addr: u32,
        window: Window,
        tmst: u32,
        rx: RxWindowConfig,
    },
    /// The session was created but the transmitter refused the downlink.
    JoinAcceptNotSent { dev_eui: DevEui, dev_addr: u32, window: Window },
    Dropped(DropReason),
    Joined { dev_eui: DevEui, dev_addr: u32 },
    MicMismatch { dev_eui: DevEui, dev_addr: u32 },
    /// Frames the join server has no business with.
    Ignored,
}

/// Registries of every configured application and the DevAddr allocator
/// shared by all of them.
pub struct JoinServer<R, F = DefaultFactory> {
    applications: HashMap<JoinEui, Application>,
    allocator: DevAddrAllocator,
    plan: Configuration,
    rng: R,
    crypto: F,
}

impl<R: RngCore> JoinServer<R> {
    pub fn new(plan: Configuration, rng: R) -> Self {
        Self::with_crypto(plan, rng, DefaultFactory)
    }
}

impl<R: RngCore, F: CryptoFactory> JoinServer<R, F> {
    pub fn with_crypto(plan: Configuration, rng: R, crypto: F) -> Self {
        JoinServer {
            applications: HashMap::new(),
            allocator: DevAddrAllocator::new(),
            plan,
            rng,
            crypto,
        }
    }

    pub fn with_allocator(mut self, allocator: DevAddrAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn add_application(&mut self, app: Application) -> Result<(), JoinError> {
        let join_eui = app.join_eui();
        if self.applications.contains_key(&join_eui) {
            return Err(JoinError::DuplicateApplication(join_eui));
        }
        self.applications.insert(join_eui, app);
        Ok(())
    }

    pub fn application(&self, join_eui: &JoinEui) -> Option<&Application> {
        self.applications.get(join_eui)
    }

    pub fn applications(&self) -> impl Iterator<Item = &Application> {
        self.applications.values()
    }

    pub fn device(&self, join_eui: &JoinEui, dev_eui: &DevEui) -> Option<&Device> {
        self.applications.get(join_eui)?.device(dev_eui)
    }

    pub fn plan(&self) -> &Configuration {
        &self.plan
    }

    /// Dispatches one received packet. JoinAccepts are handed to `tx`.
    pub async fn handle<T: Transmitter>(&mut self, pkt: &RxPacket, tx: &mut T) -> Outcome {
        match pkt.frame() {
            Frame::Invalid => {
                debug!("Dropping undecodable frame of {} bytes", pkt.payload.len());
                Outcome::Dropped(DropReason::InvalidFrame)
            }
            Frame::JoinRequest(jr) => self.handle_join_request(&jr, pkt, tx).await,
            Frame::DataUp(up) => self.handle_data_up(&up),
            Frame::Other(mhdr) => {
                debug!("Ignoring {:?} frame", mhdr.mtype());
                Outcome::Ignored
            }
        }
    }

    async fn handle_join_request<T: Transmitter>(
        &mut self,
        jr: &JoinRequestPayload<&[u8]>,
        pkt: &RxPacket,
        tx: &mut T,
    ) -> Outcome {
        let join_eui = jr.join_eui();
        let dev_eui = jr.dev_eui();
        let dev_nonce = jr.dev_nonce();

        let Some(app) = self.applications.get_mut(&join_eui) else {
            debug!("JoinRequest for unknown JoinEUI {}", join_eui);
            return Outcome::Dropped(DropReason::UnknownJoinEui);
        };
        let net_id = app.net_id();
        let Some(device) = app.device_mut(&dev_eui) else {
            debug!("JoinRequest from unknown DevEUI {} (JoinEUI {})", dev_eui, join_eui);
            return Outcome::Dropped(DropReason::UnknownDevEui);
        };
        let app_key = *device.app_key();

        info!(
            target: RESULT_TARGET,
            "JoinRequest from DevEUI {} JoinEUI {} DevNonce 0x{:04x} freq {} datr {}",
            dev_eui,
            join_eui,
            dev_nonce,
            pkt.freq,
            pkt.datr
        );
        // the accept is still sent so the device gets exercised
        if !jr.validate_mic(&app_key, &self.crypto) {
            warn!(target: RESULT_TARGET, "JoinRequest MIC check failed for DevEUI {}", dev_eui);
        }

        let Some(uplink_dr) = pkt.datr.lora_label().and_then(|l| self.plan.uplink_datarate(l))
        else {
            error!("JoinRequest from {}: unresolvable datarate {}", dev_eui, pkt.datr);
            return Outcome::Dropped(DropReason::UnresolvableDatarate);
        };
        match self.plan.tx_channel(pkt.freq, uplink_dr) {
            Some(ch) => info!(
                target: RESULT_TARGET,
                "JoinEUI {} DevEUI {}: receive channel {} DR{}",
                join_eui,
                dev_eui,
                ch,
                uplink_dr
            ),
            None => info!(
                target: RESULT_TARGET,
                "JoinEUI {} DevEUI {}: receive frequency {} is off plan, DR{}",
                join_eui,
                dev_eui,
                pkt.freq,
                uplink_dr
            ),
        }

        let window = device.next_rx_window();
        let Some(rx) = self.plan.join_accept_window(window, pkt.freq, uplink_dr) else {
            error!(
                "JoinRequest from {}: no {} configuration for {} MHz DR{}",
                dev_eui, window, pkt.freq, uplink_dr
            );
            return Outcome::Dropped(DropReason::NoRxWindow);
        };
        let delay = self.plan.join_accept_delay(window);
        let tmst = pkt.tmst.wrapping_add(delay.as_micros() as u32);

        let dev_addr = match device.session() {
            Some(session) => session.dev_addr,
            None => match self.allocator.allocate() {
                Ok(addr) => addr,
                Err(e) => {
                    error!("JoinRequest from {}: {}", dev_eui, e);
                    return Outcome::Dropped(DropReason::AddressSpaceExhausted);
                }
            },
        };
        let app_nonce = loop {
            let nonce = self.rng.next_u32() & APP_NONCE_MASK;
            if nonce != 0 {
                break nonce;
            }
        };

        let accept = JoinAccept::new(app_nonce, net_id, dev_addr);
        let keys = accept.session_keys(&app_key, dev_nonce, &self.crypto);
        app.start_session(dev_eui, Session { dev_nonce, app_nonce, dev_addr, keys });
        debug!(
            "Session for {}: DevAddr {:08x} AppNonce {:06x} NwkSKey {} AppSKey {}",
            dev_eui,
            dev_addr,
            app_nonce,
            hex::encode(keys.nwkskey),
            hex::encode(keys.appskey)
        );

        let phy = accept.encode(&app_key, &self.crypto);
        if tx.transmit(&phy, tmst, &rx, pkt).await {
            info!(
                target: RESULT_TARGET,
                "JoinAccept for DevEUI {} scheduled in {} at tmst {} on {} MHz DR{}",
                dev_eui,
                window,
                tmst,
                rx.frequency_mhz(),
                rx.datarate
            );
            Outcome::JoinAcceptScheduled { dev_eui, dev_addr, window, tmst, rx }
        } else {
            warn!(target: RESULT_TARGET, "JoinAccept for DevEUI {} was not sent", dev_eui);
            Outcome::JoinAcceptNotSent { dev_eui, dev_addr, window }
        }
    }

    fn handle_data_up(&mut self, up: &DataUplinkPayload<&[u8]>) -> Outcome {
        let dev_addr = u32::from(up.dev_addr());
        for app in self.applications.values_mut() {
            let Some(dev_eui) = app.dev_eui_by_addr(dev_addr) else {
                continue;
            };
            let Some(device) = app.device_mut(&dev_eui) else {
                continue;
            };
            if device.state() != JoinState::Joining {
                continue;
            }
            let Some(session) = device.session() else {
                continue;
            };

            if up.validate_mic(&session.keys.nwkskey, &self.crypto) {
                device.set_joined();
                info!(
                    target: RESULT_TARGET,
                    "OTAA Success: DevEUI {} joined with DevAddr {:08x} (FCnt {})",
                    dev_eui,
                    dev_addr,
                    up.fcnt()
                );
                return Outcome::Joined { dev_eui, dev_addr };
            }
            warn!(
                target: RESULT_TARGET,
                "OTAA verification failed: MIC mismatch on uplink from DevEUI {} DevAddr {:08x}",
                dev_eui,
                dev_addr
            );
            return Outcome::MicMismatch { dev_eui, dev_addr };
        }
        debug!("Ignoring uplink from DevAddr {:08x}", dev_addr);
        Outcome::Ignored
    }
}
