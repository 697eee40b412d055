use std::net::SocketAddr;
use std::time::Duration;

use otaa_encoding::creator::{encode_join_request, DataPayloadCreator};
use otaa_encoding::default_crypto::DefaultFactory;
use otaa_encoding::keys::{AppKey, DevEui, JoinEui, SessionKeys};
use otaa_encoding::parser::DecryptedJoinAcceptPayload;
use otaa_harness::forwarder::packet::{DataRate, GatewayMessage, MessageKind, PushDataPayload, RxPk};
use otaa_harness::join::{Application, JoinState, DEV_ADDR_FIRST};
use otaa_harness::region::Window;
use otaa_harness::{Configuration, Forwarder, JoinServer, Outcome, Region, Server};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::UdpSocket;

const GW: [u8; 8] = [0xaa, 0x55, 0x5a, 0, 0, 0, 0, 1];

struct Gateway {
    socket: UdpSocket,
    harness: SocketAddr,
    token: u16,
}

impl Gateway {
    async fn new(harness: SocketAddr) -> Self {
        Gateway { socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(), harness, token: 0x100 }
    }

    async fn send(&mut self, kind: MessageKind) -> u16 {
        self.token += 1;
        let msg = GatewayMessage { version: 2, token: self.token, gateway_id: Some(GW), kind };
        self.socket.send_to(&msg.encode().unwrap(), self.harness).await.unwrap();
        self.token
    }

    async fn push(&mut self, tmst: u32, phy: &[u8]) -> u16 {
        let rxpk = RxPk::new(tmst, 902.3, "SF10BW125", phy);
        self.send(MessageKind::PushData(PushDataPayload { rxpk: vec![rxpk], stat: None })).await
    }

    async fn recv(&self) -> GatewayMessage {
        let mut buf = [0u8; 2048];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), self.socket.recv_from(&mut buf))
            .await
            .expect("no answer from the harness")
            .unwrap();
        GatewayMessage::decode(&buf[..len]).unwrap()
    }
}

fn app_key() -> AppKey {
    "2B7E151628AED2A6ABF7158809CF4F3C".parse().unwrap()
}

fn join_eui() -> JoinEui {
    "70B3D57ED0000001".parse().unwrap()
}

fn dev_eui() -> DevEui {
    "0080000000000042".parse().unwrap()
}

async fn harness() -> Server<StdRng> {
    let plan = Configuration::new(Region::US915);
    let mut app = Application::new(join_eui(), 0x13);
    app.add_device(dev_eui(), app_key()).unwrap();
    let mut join = JoinServer::new(plan.clone(), StdRng::seed_from_u64(42));
    join.add_application(app).unwrap();
    let forwarder = Forwarder::bind("127.0.0.1:0", plan).await.unwrap();
    Server::new(forwarder, join)
}

fn uplink(dev_addr: u32, keys: &SessionKeys) -> Vec<u8> {
    let mut buf = [0u8; 64];
    let mut phy = DataPayloadCreator::new(&mut buf[..]).unwrap();
    phy.set_dev_addr(dev_addr).set_fcnt(0).set_f_port(1);
    phy.build(b"otaa", &[], &keys.nwkskey, &keys.appskey, &DefaultFactory).unwrap().to_vec()
}

#[tokio::test]
async fn device_joins_through_simulated_gateway() {
    let mut server = harness().await;
    let mut gw = Gateway::new(server.local_addr().unwrap()).await;

    let token = gw.send(MessageKind::PullData).await;
    assert!(server.step().await.unwrap().is_empty());
    let ack = gw.recv().await;
    assert_eq!((ack.token, ack.kind), (token, MessageKind::PullAck));

    let dev_nonce = 0x2d10;
    let request =
        encode_join_request(join_eui(), dev_eui(), dev_nonce, &app_key(), &DefaultFactory);
    let token = gw.push(2_000_000, &request).await;
    let outcomes = server.step().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [Outcome::JoinAcceptScheduled {
            window: Window::_1,
            tmst: 7_000_000,
            dev_addr: DEV_ADDR_FIRST,
            ..
        }]
    ));

    let ack = gw.recv().await;
    assert_eq!((ack.token, ack.kind), (token, MessageKind::PushAck));
    let MessageKind::PullResp(resp) = gw.recv().await.kind else { panic!("expected a PULL_RESP") };
    assert_eq!(resp.txpk.tmst, 7_000_000);
    assert!((resp.txpk.freq - 923.3).abs() < 1e-6);
    assert_eq!(resp.txpk.datr, DataRate::Lora("SF10BW500".into()));
    assert_eq!(resp.txpk.codr, "4/5");
    assert!(resp.txpk.ipol);
    assert_eq!(resp.txpk.size, 17);

    let phy = resp.txpk.payload().unwrap();
    let accept = DecryptedJoinAcceptPayload::new(phy, &app_key(), &DefaultFactory)
        .expect("downlink is a JoinAccept");
    assert!(accept.validate_mic(&app_key(), &DefaultFactory));
    assert_eq!(accept.dev_addr(), DEV_ADDR_FIRST);
    let keys = accept.derive_session_keys(&app_key(), dev_nonce, &DefaultFactory);

    gw.push(9_000_000, &uplink(accept.dev_addr(), &keys)).await;
    let outcomes = server.step().await.unwrap();
    assert_eq!(outcomes, vec![Outcome::Joined { dev_eui: dev_eui(), dev_addr: DEV_ADDR_FIRST }]);
    gw.recv().await;

    let device = server.join_server().device(&join_eui(), &dev_eui()).unwrap();
    assert_eq!(device.state(), JoinState::Joined);
    let stats = server.stats();
    assert_eq!((stats.datagrams, stats.push_data, stats.pull_resp), (3, 2, 1));
}

#[tokio::test]
async fn join_request_before_pull_data_is_not_sent() {
    let mut server = harness().await;
    let mut gw = Gateway::new(server.local_addr().unwrap()).await;

    let request = encode_join_request(join_eui(), dev_eui(), 1, &app_key(), &DefaultFactory);
    gw.push(0, &request).await;
    let outcomes = server.step().await.unwrap();
    assert!(matches!(outcomes.as_slice(), [Outcome::JoinAcceptNotSent { window: Window::_1, .. }]));
    assert_eq!(gw.recv().await.kind, MessageKind::PushAck);
    assert_eq!(server.stats().pull_resp, 0);

    // the retry after a PULL_DATA lands in RX2
    gw.send(MessageKind::PullData).await;
    server.step().await.unwrap();
    gw.recv().await;
    gw.push(0, &request).await;
    let outcomes = server.step().await.unwrap();
    assert!(matches!(
        outcomes.as_slice(),
        [Outcome::JoinAcceptScheduled { window: Window::_2, tmst: 6_000_000, .. }]
    ));
    gw.recv().await;
    let MessageKind::PullResp(resp) = gw.recv().await.kind else { panic!("expected a PULL_RESP") };
    assert_eq!(resp.txpk.datr, DataRate::Lora("SF12BW500".into()));
}

#[tokio::test]
async fn unknown_device_gets_no_downlink() {
    let mut server = harness().await;
    let mut gw = Gateway::new(server.local_addr().unwrap()).await;
    gw.send(MessageKind::PullData).await;
    server.step().await.unwrap();
    gw.recv().await;

    let stranger: DevEui = "0080000000000099".parse().unwrap();
    let request = encode_join_request(join_eui(), stranger, 1, &app_key(), &DefaultFactory);
    gw.push(0, &request).await;
    assert_eq!(server.step().await.unwrap().len(), 1);
    assert_eq!(gw.recv().await.kind, MessageKind::PushAck);
    let mut buf = [0u8; 64];
    let silence = tokio::time::timeout(Duration::from_millis(200), gw.socket.recv_from(&mut buf));
    assert!(silence.await.is_err());
    assert_eq!(server.stats().pull_resp, 0);
}
