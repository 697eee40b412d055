//! Semtech UDP packet forwarder messages.
//!
//! Every datagram starts with `version(1) ‖ token(2, LE) ‖ identifier(1)`.
//! Gateway originated messages then carry the 8 byte gateway id, and some
//! messages end with a JSON object.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol versions accepted from gateways.
pub const PROTOCOL_VERSIONS: [u8; 2] = [1, 2];

const HEADER_LEN: usize = 4;
const GATEWAY_HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Identifier {
    PushData = 0,
    PushAck = 1,
    PullData = 2,
    PullResp = 3,
    PullAck = 4,
    TxAck = 5,
}

impl TryFrom<u8> for Identifier {
    type Error = PacketError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Identifier::PushData,
            1 => Identifier::PushAck,
            2 => Identifier::PullData,
            3 => Identifier::PullResp,
            4 => Identifier::PullAck,
            5 => Identifier::TxAck,
            _ => return Err(PacketError::UnknownIdentifier(v)),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("datagram of {0} bytes is too short")]
    TooShort(usize),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown message identifier {0}")]
    UnknownIdentifier(u8),
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayMessage {
    pub version: u8,
    pub token: u16,
    pub gateway_id: Option<[u8; 8]>,
    pub kind: MessageKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    PushData(PushDataPayload),
    PushAck,
    PullData,
    PullResp(PullRespPayload),
    PullAck,
    TxAck(Option<TxAckPayload>),
}

impl MessageKind {
    pub fn identifier(&self) -> Identifier {
        match self {
            MessageKind::PushData(_) => Identifier::PushData,
            MessageKind::PushAck => Identifier::PushAck,
            MessageKind::PullData => Identifier::PullData,
            MessageKind::PullResp(_) => Identifier::PullResp,
            MessageKind::PullAck => Identifier::PullAck,
            MessageKind::TxAck(_) => Identifier::TxAck,
        }
    }
}

impl GatewayMessage {
    pub fn decode(b: &[u8]) -> Result<Self, PacketError> {
        if b.len() < HEADER_LEN {
            return Err(PacketError::TooShort(b.len()));
        }
        let version = b[0];
        if !PROTOCOL_VERSIONS.contains(&version) {
            return Err(PacketError::UnsupportedVersion(version));
        }
        let token = u16::from_le_bytes([b[1], b[2]]);
        let identifier = Identifier::try_from(b[3])?;

        let (gateway_id, kind) = match identifier {
            Identifier::PushData => {
                let gateway_id = gateway_id(b)?;
                let payload = serde_json::from_slice(&b[GATEWAY_HEADER_LEN..])?;
                (Some(gateway_id), MessageKind::PushData(payload))
            }
            Identifier::PullData => (Some(gateway_id(b)?), MessageKind::PullData),
            Identifier::PushAck => (None, MessageKind::PushAck),
            Identifier::PullAck => (None, MessageKind::PullAck),
            Identifier::PullResp => {
                (None, MessageKind::PullResp(serde_json::from_slice(&b[HEADER_LEN..])?))
            }
            Identifier::TxAck => {
                // some forwarders omit the gateway id and start the JSON right away
                if b.get(HEADER_LEN) == Some(&b'{') {
                    (None, MessageKind::TxAck(Some(serde_json::from_slice(&b[HEADER_LEN..])?)))
                } else if b.len() == HEADER_LEN {
                    (None, MessageKind::TxAck(None))
                } else {
                    let gateway_id = gateway_id(b)?;
                    let body = &b[GATEWAY_HEADER_LEN..];
                    let payload = if body.iter().all(|c| c.is_ascii_whitespace() || *c == 0) {
                        None
                    } else {
                        Some(serde_json::from_slice(body)?)
                    };
                    (Some(gateway_id), MessageKind::TxAck(payload))
                }
            }
        };
        Ok(GatewayMessage { version, token, gateway_id, kind })
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut b = Vec::with_capacity(GATEWAY_HEADER_LEN);
        b.push(self.version);
        b.extend_from_slice(&self.token.to_le_bytes());
        b.push(self.kind.identifier() as u8);
        match &self.kind {
            MessageKind::PushData(payload) => {
                b.extend_from_slice(&self.gateway_id.unwrap_or_default());
                b.append(&mut serde_json::to_vec(payload)?);
            }
            MessageKind::PullData => b.extend_from_slice(&self.gateway_id.unwrap_or_default()),
            MessageKind::PushAck | MessageKind::PullAck => {}
            MessageKind::PullResp(payload) => b.append(&mut serde_json::to_vec(payload)?),
            MessageKind::TxAck(payload) => {
                if let Some(id) = self.gateway_id {
                    b.extend_from_slice(&id);
                }
                if let Some(payload) = payload {
                    b.append(&mut serde_json::to_vec(payload)?);
                }
            }
        }
        Ok(b)
    }
}

fn gateway_id(b: &[u8]) -> Result<[u8; 8], PacketError> {
    if b.len() < GATEWAY_HEADER_LEN {
        return Err(PacketError::TooShort(b.len()));
    }
    let mut id = [0; 8];
    id.copy_from_slice(&b[HEADER_LEN..GATEWAY_HEADER_LEN]);
    Ok(id)
}

/// PUSH_ACK answering a PUSH_DATA with `version` and `token`.
pub fn push_ack(version: u8, token: u16) -> [u8; 4] {
    let t = token.to_le_bytes();
    [version, t[0], t[1], Identifier::PushAck as u8]
}

/// PULL_ACK answering a PULL_DATA with `version` and `token`.
pub fn pull_ack(version: u8, token: u16) -> [u8; 4] {
    let t = token.to_le_bytes();
    [version, t[0], t[1], Identifier::PullAck as u8]
}

/// LoRa datarate identifier (eg. SF12BW500) or FSK datarate in bits per second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataRate {
    Lora(String),
    Fsk(u32),
}

impl DataRate {
    pub fn lora_label(&self) -> Option<&str> {
        match self {
            DataRate::Lora(label) => Some(label),
            DataRate::Fsk(_) => None,
        }
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataRate::Lora(label) => f.write_str(label),
            DataRate::Fsk(bps) => write!(f, "{bps}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PushDataPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rxpk: Vec<RxPk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxPk {
    /// Internal concentrator timestamp of the end of reception, in microseconds.
    pub tmst: u32,
    /// RX central frequency in MHz.
    pub freq: f64,
    pub datr: DataRate,
    /// Base64 encoded PHYPayload.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chan: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfch: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<i8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsnr: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u16>,
}

impl RxPk {
    /// A LoRa reception of `phy` as a gateway would report it.
    pub fn new(tmst: u32, freq: f64, datr: &str, phy: &[u8]) -> Self {
        RxPk {
            tmst,
            freq,
            datr: DataRate::Lora(datr.to_string()),
            data: STANDARD.encode(phy),
            chan: None,
            rfch: Some(0),
            stat: Some(1),
            modu: Some("LORA".to_string()),
            codr: Some("4/5".to_string()),
            rssi: None,
            lsnr: None,
            size: u16::try_from(phy.len()).ok(),
        }
    }

    pub fn payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.data.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRespPayload {
    pub txpk: TxPk,
}

/// `txpk` object of a PULL_RESP.
///
/// `ipol` goes on the wire as the JSON boolean `true`, the type the Semtech
/// protocol defines for it, not as the string `"true"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxPk {
    /// Send packet immediately (will ignore tmst).
    #[serde(default)]
    pub imme: bool,
    /// Send packet on a certain concentrator timestamp value.
    pub tmst: u32,
    /// TX central frequency in MHz.
    pub freq: f64,
    /// Concentrator "RF chain" used for TX.
    pub rfch: u8,
    /// TX output power in dBm.
    pub powe: u8,
    pub modu: String,
    pub datr: DataRate,
    pub codr: String,
    /// Lora modulation polarization inversion, a JSON boolean.
    pub ipol: bool,
    pub size: u16,
    /// Base64 encoded PHYPayload.
    pub data: String,
    pub ant: u8,
}

impl TxPk {
    /// Downlink request for `phy` with the fixed radio settings of this harness.
    pub fn lora(tmst: u32, freq: f64, datr: &str, codr: &str, phy: &[u8]) -> Self {
        TxPk {
            imme: false,
            tmst,
            freq,
            rfch: 0,
            powe: 20,
            modu: "LORA".to_string(),
            datr: DataRate::Lora(datr.to_string()),
            codr: codr.to_string(),
            ipol: true,
            size: u16::try_from(phy.len()).unwrap_or(u16::MAX),
            data: STANDARD.encode(phy),
            ant: 0,
        }
    }

    pub fn payload(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.data.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TxAckPayload {
    pub txpk_ack: TxPkAck,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TxPkAck {
    #[serde(default)]
    pub error: String,
}

impl TxPkAck {
    pub fn is_ok(&self) -> bool {
        matches!(self.error.as_str(), "" | "NONE")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const GW: [u8; 8] = [0xaa, 0x55, 0x5a, 0x00, 0x00, 0x00, 0x00, 0x01];

    fn push_data_bytes(json: &str) -> Vec<u8> {
        let mut b = vec![2, 0x34, 0x12, 0];
        b.extend_from_slice(&GW);
        b.extend_from_slice(json.as_bytes());
        b
    }

    #[test]
    fn decode_push_data() {
        let b = push_data_bytes(concat!(
            r#"{"rxpk":[{"tmst":3512348611,"chan":2,"rfch":0,"freq":902.3,"stat":1,"#,
            r#""modu":"LORA","datr":"SF10BW125","codr":"4/5","rssi":-35,"lsnr":5.1,"#,
            r#""size":3,"data":"AQID"}]}"#,
        ));
        let msg = GatewayMessage::decode(&b).unwrap();
        assert_eq!(msg.version, 2);
        assert_eq!(msg.token, 0x1234);
        assert_eq!(msg.gateway_id, Some(GW));
        let MessageKind::PushData(payload) = msg.kind else { panic!("not a PUSH_DATA") };
        assert_eq!(payload.rxpk.len(), 1);
        let rxpk = &payload.rxpk[0];
        assert_eq!(rxpk.tmst, 3512348611);
        assert_eq!(rxpk.datr, DataRate::Lora("SF10BW125".into()));
        assert_eq!(rxpk.payload().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn decode_stat_only_push_data() {
        let b = push_data_bytes(r#"{"stat":{"time":"2014-01-12 08:59:28 GMT","rxnb":2}}"#);
        let msg = GatewayMessage::decode(&b).unwrap();
        let MessageKind::PushData(payload) = msg.kind else { panic!("not a PUSH_DATA") };
        assert!(payload.rxpk.is_empty());
        assert!(payload.stat.is_some());
    }

    #[test]
    fn fsk_datarate_is_a_number() {
        let b = push_data_bytes(
            r#"{"rxpk":[{"tmst":1,"freq":902.3,"datr":50000,"data":"AQID"}]}"#,
        );
        let MessageKind::PushData(payload) = GatewayMessage::decode(&b).unwrap().kind else {
            panic!("not a PUSH_DATA")
        };
        assert_eq!(payload.rxpk[0].datr, DataRate::Fsk(50000));
        assert_eq!(payload.rxpk[0].datr.lora_label(), None);
    }

    #[test]
    fn ack_formats() {
        assert_eq!(push_ack(2, 0x1234), [2, 0x34, 0x12, 1]);
        assert_eq!(pull_ack(1, 0xbeef), [1, 0xef, 0xbe, 4]);
        let msg =
            GatewayMessage { version: 2, token: 7, gateway_id: None, kind: MessageKind::PullAck };
        assert_eq!(msg.encode().unwrap(), vec![2, 7, 0, 4]);
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(GatewayMessage::decode(&[2, 0, 0]), Err(PacketError::TooShort(3))));
        assert!(matches!(
            GatewayMessage::decode(&[3, 0, 0, 0]),
            Err(PacketError::UnsupportedVersion(3))
        ));
        assert!(matches!(
            GatewayMessage::decode(&[2, 0, 0, 9]),
            Err(PacketError::UnknownIdentifier(9))
        ));
        // PULL_DATA without a full gateway id
        assert!(matches!(
            GatewayMessage::decode(&[2, 0, 0, 2, 1, 2, 3]),
            Err(PacketError::TooShort(7))
        ));
        assert!(matches!(
            GatewayMessage::decode(&push_data_bytes("{not json")),
            Err(PacketError::Json(_))
        ));
    }

    #[test]
    fn tx_ack_with_and_without_gateway_id() {
        let mut b = vec![2, 1, 0, 5];
        b.extend_from_slice(br#"{"txpk_ack":{"error":"TOO_LATE"}}"#);
        let msg = GatewayMessage::decode(&b).unwrap();
        assert_eq!(msg.gateway_id, None);
        let MessageKind::TxAck(Some(ack)) = msg.kind else { panic!("no ack body") };
        assert_eq!(ack.txpk_ack.error, "TOO_LATE");
        assert!(!ack.txpk_ack.is_ok());

        let mut b = vec![2, 1, 0, 5];
        b.extend_from_slice(&GW);
        let msg = GatewayMessage::decode(&b).unwrap();
        assert_eq!(msg.gateway_id, Some(GW));
        assert_eq!(msg.kind, MessageKind::TxAck(None));

        b.extend_from_slice(br#"{"txpk_ack":{"error":"NONE"}}"#);
        let MessageKind::TxAck(Some(ack)) = GatewayMessage::decode(&b).unwrap().kind else {
            panic!("no ack body")
        };
        assert!(ack.txpk_ack.is_ok());
    }

    #[test]
    fn pull_resp_json_shape() {
        let txpk = TxPk::lora(5_000_100, 923.3, "SF10BW500", "4/5", &[0x20, 1, 2]);
        let msg = GatewayMessage {
            version: 2,
            token: 1,
            gateway_id: None,
            kind: MessageKind::PullResp(PullRespPayload { txpk }),
        };
        let b = msg.encode().unwrap();
        assert_eq!(&b[..4], &[2, 1, 0, 3]);
        let json: serde_json::Value = serde_json::from_slice(&b[4..]).unwrap();
        let txpk = &json["txpk"];
        assert!((txpk["freq"].as_f64().unwrap() - 923.3).abs() < 1e-9);
        assert_eq!(txpk["datr"], "SF10BW500");
        assert_eq!(txpk["codr"], "4/5");
        assert_eq!(txpk["tmst"], 5_000_100);
        assert_eq!(txpk["modu"], "LORA");
        assert_eq!(txpk["ipol"], true);
        assert_eq!(txpk["rfch"], 0);
        assert_eq!(txpk["ant"], 0);
        assert_eq!(txpk["powe"], 20);
        assert_eq!(txpk["size"], 3);
        assert_eq!(txpk["data"], "IAEC");

        let MessageKind::PullResp(decoded) = GatewayMessage::decode(&b).unwrap().kind else {
            panic!("not a PULL_RESP")
        };
        assert_eq!(decoded.txpk.payload().unwrap(), vec![0x20, 1, 2]);
        assert!(decoded.txpk.ipol);
    }
}
