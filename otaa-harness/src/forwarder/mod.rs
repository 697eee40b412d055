//! Gateway side of the harness: a Semtech UDP packet forwarder server.
//!
//! The forwarder answers PUSH_DATA and PULL_DATA with their ACKs, turns every
//! received `rxpk` into an [`RxPacket`] and sends downlinks as PULL_RESP to the
//! gateway that pulled last.
use std::io;
use std::net::SocketAddr;

use otaa_encoding::parser::{parse, Frame, MType};
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::{debug, error, info, warn};

use crate::region::{ChannelPlan, Configuration, RxWindowConfig};

pub mod packet;
use packet::{DataRate, GatewayMessage, MessageKind, PullRespPayload, RxPk, TxPk};

const MAX_DATAGRAM_LEN: usize = 65_535;

/// A LoRa frame received by a gateway together with its radio metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RxPacket {
    /// Decoded PHYPayload.
    pub payload: Vec<u8>,
    /// RX central frequency in MHz.
    pub freq: f64,
    pub datr: DataRate,
    /// Concentrator timestamp of the end of reception, in microseconds.
    pub tmst: u32,
    /// Protocol version of the PUSH_DATA that carried this packet.
    pub version: u8,
    pub token: u16,
    pub gateway_id: Option<[u8; 8]>,
}

impl RxPacket {
    pub fn from_rxpk(
        rxpk: &RxPk,
        version: u8,
        token: u16,
        gateway_id: Option<[u8; 8]>,
    ) -> Result<Self, base64::DecodeError> {
        Ok(RxPacket {
            payload: rxpk.payload()?,
            freq: rxpk.freq,
            datr: rxpk.datr.clone(),
            tmst: rxpk.tmst,
            version,
            token,
            gateway_id,
        })
    }

    pub fn frame(&self) -> Frame<&[u8]> {
        parse(&self.payload[..])
    }
}

/// Counters kept by the forwarder.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Datagrams received, valid or not.
    pub datagrams: u64,
    /// PUSH_DATA messages accepted.
    pub push_data: u64,
    /// PULL_RESP messages sent.
    pub pull_resp: u64,
}

/// Sends a downlink frame in answer to an uplink.
#[allow(async_fn_in_trait)]
pub trait Transmitter {
    /// Schedules `frame` for transmission at concentrator time `tmst` with the
    /// radio settings of `rx`. Returns whether the request left the harness.
    async fn transmit(
        &mut self,
        frame: &[u8],
        tmst: u32,
        rx: &RxWindowConfig,
        origin: &RxPacket,
    ) -> bool;
}

pub struct Forwarder {
    socket: UdpSocket,
    plan: Configuration,
    pull_peer: Option<SocketAddr>,
    push_peer: Option<SocketAddr>,
    token: u16,
    stats: ForwarderStats,
    discard_mtypes: Vec<MType>,
    buf: Vec<u8>,
}

impl Forwarder {
    pub async fn bind<A: ToSocketAddrs>(addr: A, plan: Configuration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket, plan))
    }

    pub fn from_socket(socket: UdpSocket, plan: Configuration) -> Self {
        Forwarder {
            socket,
            plan,
            pull_peer: None,
            push_peer: None,
            token: 1,
            stats: ForwarderStats::default(),
            discard_mtypes: Vec::new(),
            buf: vec![0; MAX_DATAGRAM_LEN],
        }
    }

    /// Frames of these message types are dropped before they reach the caller.
    pub fn with_discard_mtypes(mut self, mtypes: Vec<MType>) -> Self {
        self.discard_mtypes = mtypes;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stats(&self) -> ForwarderStats {
        self.stats
    }

    /// Address of the gateway that sent the latest PULL_DATA.
    pub fn pull_peer(&self) -> Option<SocketAddr> {
        self.pull_peer
    }

    /// Address of the gateway that sent the latest PUSH_DATA.
    pub fn push_peer(&self) -> Option<SocketAddr> {
        self.push_peer
    }

    pub fn plan(&self) -> &Configuration {
        &self.plan
    }

    /// Waits for the next datagram and returns the packets it carries. Only
    /// socket receive errors are returned, malformed datagrams yield nothing.
    pub async fn receive(&mut self) -> io::Result<Vec<RxPacket>> {
        let (len, src) = self.socket.recv_from(&mut self.buf).await?;
        let datagram = self.buf[..len].to_vec();
        Ok(self.handle_datagram(&datagram, src).await)
    }

    async fn handle_datagram(&mut self, datagram: &[u8], src: SocketAddr) -> Vec<RxPacket> {
        self.stats.datagrams += 1;
        let msg = match GatewayMessage::decode(datagram) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping datagram of {} bytes from {}: {}", datagram.len(), src, e);
                return Vec::new();
            }
        };

        match msg.kind {
            MessageKind::PushData(payload) => {
                self.push_peer = Some(src);
                self.stats.push_data += 1;
                self.send_ack(&packet::push_ack(msg.version, msg.token), src, "PUSH_ACK").await;

                let mut packets = Vec::with_capacity(payload.rxpk.len());
                for rxpk in &payload.rxpk {
                    let pkt = RxPacket::from_rxpk(rxpk, msg.version, msg.token, msg.gateway_id);
                    let pkt = match pkt {
                        Ok(pkt) => pkt,
                        Err(e) => {
                            warn!("Dropping rxpk with undecodable data from {}: {}", src, e);
                            continue;
                        }
                    };
                    if let Some(mhdr) = pkt.frame().mhdr() {
                        if self.discard_mtypes.contains(&mhdr.mtype()) {
                            debug!("Discarding {:?} frame", mhdr.mtype());
                            continue;
                        }
                    }
                    packets.push(pkt);
                }
                if let Some(stat) = payload.stat {
                    debug!("Gateway status: {}", stat);
                }
                packets
            }
            MessageKind::PullData => {
                self.pull_peer = Some(src);
                self.send_ack(&packet::pull_ack(msg.version, msg.token), src, "PULL_ACK").await;
                Vec::new()
            }
            MessageKind::TxAck(payload) => {
                match payload {
                    Some(ack) if !ack.txpk_ack.is_ok() => warn!(
                        "TX_ACK from {} (token: 0x{:04x}): {}",
                        src, msg.token, ack.txpk_ack.error
                    ),
                    _ => debug!("TX_ACK from {} (token: 0x{:04x})", src, msg.token),
                }
                Vec::new()
            }
            kind => {
                debug!("Dropping {:?} message from {}", kind.identifier(), src);
                Vec::new()
            }
        }
    }

    async fn send_ack(&self, ack: &[u8], dest: SocketAddr, what: &str) {
        match self.socket.send_to(ack, dest).await {
            Ok(_) => debug!("{}: {}", what, dest),
            Err(e) => error!("Failed to send {} to {}: {}", what, dest, e),
        }
    }

    fn next_token(&mut self) -> u16 {
        let token = self.token;
        self.token = self.token.wrapping_add(1);
        token
    }
}

impl Transmitter for Forwarder {
    async fn transmit(
        &mut self,
        frame: &[u8],
        tmst: u32,
        rx: &RxWindowConfig,
        origin: &RxPacket,
    ) -> bool {
        let Some(dest) = self.pull_peer else {
            warn!("PULL_RESP: destination address not set, no PULL_DATA received yet");
            return false;
        };
        let Some(datr) = self.plan.datarate_label(rx.datarate) else {
            error!("PULL_RESP: no datarate label for DR{}", rx.datarate);
            return false;
        };

        let txpk = TxPk::lora(tmst, rx.frequency_mhz(), datr, self.plan.coding_rate(), frame);
        let msg = GatewayMessage {
            version: origin.version,
            token: self.next_token(),
            gateway_id: None,
            kind: MessageKind::PullResp(PullRespPayload { txpk }),
        };
        let bytes = match msg.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("PULL_RESP: failed to encode: {}", e);
                return false;
            }
        };

        match self.socket.send_to(&bytes, dest).await {
            Ok(sent) if sent == bytes.len() => {
                self.stats.pull_resp += 1;
                info!(
                    "PULL_RESP: {} bytes_sent={} freq={} datr={} tmst={}",
                    dest,
                    sent,
                    rx.frequency_mhz(),
                    datr,
                    tmst
                );
                true
            }
            Ok(sent) => {
                error!("PULL_RESP: partial send to {}, {} of {} bytes", dest, sent, bytes.len());
                false
            }
            Err(e) => {
                error!("PULL_RESP: failed to send to {}: {}", dest, e);
                false
            }
        }
    }
}
