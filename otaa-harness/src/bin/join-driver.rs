//! Device and gateway simulator for the harness.
//!
//! Sends a PULL_DATA, then a JoinRequest for every configured device, decrypts
//! the JoinAccepts it gets back and optionally answers each with an uplink
//! signed with the new session.
//!
//! ```bash
//! cargo run -p otaa-harness --bin join-driver -- --conf conf/test_harness.conf --uplink
//! ```
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use otaa_encoding::creator::{encode_join_request, DataPayloadCreator};
use otaa_encoding::default_crypto::DefaultFactory;
use otaa_encoding::keys::{AppKey, DevEui, JoinEui};
use otaa_encoding::parser::DecryptedJoinAcceptPayload;
use otaa_harness::config::{Config, DEFAULT_CONF_FILE};
use otaa_harness::forwarder::packet::{GatewayMessage, MessageKind, PushDataPayload, RxPk};
use otaa_harness::{logging, ChannelPlan, Configuration};
use rand_core::{OsRng, RngCore};
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;
use tracing::{info, warn};

const GATEWAY_ID: [u8; 8] = [0xaa, 0x55, 0x5a, 0x00, 0x00, 0x00, 0x00, 0x01];

#[derive(Parser, Debug)]
#[command(name = "join-driver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Harness configuration file, the same the harness reads.
    #[arg(long, default_value = DEFAULT_CONF_FILE)]
    conf: PathBuf,

    /// Uplink frequency in MHz.
    #[arg(long, default_value_t = 902.3)]
    freq: f64,

    /// Uplink datarate index.
    #[arg(long, default_value_t = 0)]
    dr: u8,

    /// Answer each JoinAccept with a data uplink.
    #[arg(long, default_value_t = false)]
    uplink: bool,

    /// Seconds to wait for each JoinAccept.
    #[arg(long, default_value_t = 10)]
    wait: u64,
}

struct Gateway {
    socket: UdpSocket,
    server: SocketAddr,
    token: u16,
    tmst: u32,
}

impl Gateway {
    async fn connect(server: &str) -> anyhow::Result<Self> {
        let server = lookup_host(server)
            .await?
            .next()
            .ok_or_else(|| anyhow!("cannot resolve {}", server))?;
        let bind: SocketAddr =
            if server.is_ipv4() { "0.0.0.0:0".parse()? } else { "[::]:0".parse()? };
        let socket = UdpSocket::bind(bind).await?;
        Ok(Gateway { socket, server, token: OsRng.next_u32() as u16, tmst: 1_000_000 })
    }

    async fn send(&mut self, kind: MessageKind) -> anyhow::Result<()> {
        self.token = self.token.wrapping_add(1);
        let msg =
            GatewayMessage { version: 2, token: self.token, gateway_id: Some(GATEWAY_ID), kind };
        self.socket.send_to(&msg.encode()?, self.server).await?;
        Ok(())
    }

    async fn push(&mut self, freq: f64, datr: &str, phy: &[u8]) -> anyhow::Result<()> {
        self.tmst = self.tmst.wrapping_add(10_000_000);
        let rxpk = RxPk::new(self.tmst, freq, datr, phy);
        self.send(MessageKind::PushData(PushDataPayload { rxpk: vec![rxpk], stat: None })).await
    }

    /// Next PULL_RESP payload, skipping ACKs.
    async fn pull_resp(&self, wait: Duration) -> anyhow::Result<Option<Vec<u8>>> {
        let mut buf = [0u8; 2048];
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            let Ok(received) = timeout(left, self.socket.recv_from(&mut buf)).await else {
                return Ok(None);
            };
            let (len, _) = received?;
            match GatewayMessage::decode(&buf[..len]) {
                Ok(GatewayMessage { kind: MessageKind::PullResp(resp), .. }) => {
                    info!(
                        "PULL_RESP freq={} datr={} tmst={}",
                        resp.txpk.freq, resp.txpk.datr, resp.txpk.tmst
                    );
                    return Ok(Some(resp.txpk.payload()?));
                }
                Ok(msg) => info!("{:?} from harness", msg.kind.identifier()),
                Err(e) => warn!("Undecodable datagram from harness: {}", e),
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&logging::LogConfig::default())?;
    let config = Config::load(&args.conf)?;
    let plan = Configuration::new(config.region()?);
    let datr = plan.datarate_label(args.dr).ok_or_else(|| anyhow!("DR{} has no label", args.dr))?;
    if plan.tx_channel(args.freq, args.dr).is_none() {
        bail!("{} MHz DR{} is not an uplink channel of {}", args.freq, args.dr, plan.region());
    }

    let target = config.listen_addr();
    let mut gw =
        Gateway::connect(&target).await.with_context(|| format!("cannot reach {}", target))?;
    gw.send(MessageKind::PullData).await?;

    let mut joined = 0;
    let mut total = 0;
    for app in config.load_applications()? {
        for device in app.devices() {
            total += 1;
            let ok =
                join(&mut gw, &args, datr, app.join_eui(), device.dev_eui(), device.app_key())
                    .await?;
            joined += usize::from(ok);
        }
    }
    info!("{} of {} devices received a valid JoinAccept", joined, total);
    Ok(())
}

async fn join(
    gw: &mut Gateway,
    args: &Args,
    datr: &str,
    join_eui: JoinEui,
    dev_eui: DevEui,
    key: &AppKey,
) -> anyhow::Result<bool> {
    let dev_nonce = OsRng.next_u32() as u16;
    let request = encode_join_request(join_eui, dev_eui, dev_nonce, key, &DefaultFactory);
    info!("JoinRequest DevEUI {} DevNonce 0x{:04x}", dev_eui, dev_nonce);
    gw.push(args.freq, datr, &request).await?;

    let Some(phy) = gw.pull_resp(Duration::from_secs(args.wait)).await? else {
        warn!("No JoinAccept for DevEUI {}", dev_eui);
        return Ok(false);
    };
    let Some(accept) = DecryptedJoinAcceptPayload::new(phy, key, &DefaultFactory) else {
        warn!("Downlink for DevEUI {} is not a JoinAccept", dev_eui);
        return Ok(false);
    };
    if !accept.validate_mic(key, &DefaultFactory) {
        warn!("JoinAccept for DevEUI {} has a bad MIC", dev_eui);
        return Ok(false);
    }
    let keys = accept.derive_session_keys(key, dev_nonce, &DefaultFactory);
    info!(
        "JoinAccept DevEUI {} DevAddr {:08x} AppNonce {:06x} NetID {:06x}",
        dev_eui,
        accept.dev_addr(),
        accept.app_nonce(),
        accept.net_id()
    );

    if args.uplink {
        let mut buf = [0u8; 64];
        let mut phy = DataPayloadCreator::new(&mut buf[..]).map_err(|e| anyhow!("{e}"))?;
        phy.set_dev_addr(accept.dev_addr()).set_fcnt(0).set_f_port(1);
        let uplink = phy
            .build(b"otaa", &[], &keys.nwkskey, &keys.appskey, &DefaultFactory)
            .map_err(|e| anyhow!("{e}"))?;
        gw.push(args.freq, datr, uplink).await?;
        info!("Uplink sent from DevAddr {:08x}", accept.dev_addr());
    }
    Ok(true)
}
