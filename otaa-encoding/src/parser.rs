//! Provides types and methods for parsing LoRaWAN payloads.
//!
//! # Examples
//!
//! ```
//! use otaa_encoding::parser::*;
//! use otaa_encoding::keys::NwkSKey;
//! use otaa_encoding::default_crypto::DefaultFactory;
//!
//! let data = [0x40, 0x04, 0x03, 0x02, 0x01, 0x80, 0x01, 0x00, 0x01,
//!     0xa6, 0x94, 0x64, 0x26, 0x15, 0xd6, 0xc3, 0xb5, 0x82];
//! if let Frame::DataUp(phy) = parse(&data[..]) {
//!     assert_eq!(u32::from(phy.dev_addr()), 0x01020304);
//!     assert!(phy.validate_mic(&NwkSKey::from([2; 16]), &DefaultFactory));
//! } else {
//!     panic!("failed to parse data payload");
//! }
//! ```

use super::keys::{
    AppKey, CryptoFactory, DevEui, Encrypter, JoinEui, NwkSKey, SessionKeys, MIC,
};
use super::packet_length::phy::join::{JOIN_ACCEPT_LEN, JOIN_REQUEST_LEN};
use super::packet_length::phy::mac::fhdr::FHDR_MIN_LEN;
use super::packet_length::phy::{MHDR_LEN, MIC_LEN, PHY_PAYLOAD_MIN_LEN};
use super::securityhelpers;

macro_rules! fixed_len_struct {
    (
        $(#[$outer:meta])*
        struct $type:ident[$size:expr];
    ) => {
        $(#[$outer])*
        #[derive(Debug, Eq)]
        pub struct $type<T: AsRef<[u8]>>(T);

        impl<T: AsRef<[u8]>> $type<T> {
            fn new_from_raw(bytes: T) -> $type<T> {
                $type(bytes)
            }

            pub fn new(data: T) -> Option<$type<T>> {
                let bytes = data.as_ref();
                if bytes.len() != $size {
                    None
                } else {
                    Some($type(data))
                }
            }
        }

        impl<T: AsRef<[u8]> + Clone> Clone for $type<T> {
            fn clone(&self) -> Self {
                Self(self.0.clone())
            }
        }

        impl<T: AsRef<[u8]> + Copy> Copy for $type<T> {}

        impl<T: AsRef<[u8]>, V: AsRef<[u8]>> PartialEq<$type<T>> for $type<V> {
            fn eq(&self, other: &$type<T>) -> bool {
                self.as_ref() == other.as_ref()
            }
        }

        impl From<[u8; $size]> for $type<[u8; $size]> {
            fn from(v: [u8; $size]) -> Self {
                $type(v)
            }
        }

        impl<T: AsRef<[u8]>> AsRef<[u8]> for $type<T> {
            fn as_ref(&self) -> &[u8] {
                self.0.as_ref()
            }
        }
    };
}

fixed_len_struct! {
    /// DevAddr represents a 32 bit device address, in wire (LSB first) order.
    struct DevAddr[4];
}

impl<T: AsRef<[u8]>> From<DevAddr<T>> for u32 {
    fn from(v: DevAddr<T>) -> Self {
        let b = v.as_ref();
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

impl From<u32> for DevAddr<[u8; 4]> {
    fn from(v: u32) -> Self {
        DevAddr(v.to_le_bytes())
    }
}

/// Frame is the decoded form of a received PHYPayload.
///
/// Only the frames taking part in activation are decoded further, every
/// other message type is reported with its header alone.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<T> {
    /// The payload is too short for the type announced by its MHDR.
    Invalid,
    JoinRequest(JoinRequestPayload<T>),
    DataUp(DataUplinkPayload<T>),
    Other(MHDR),
}

impl<T: AsRef<[u8]>> Frame<T> {
    pub fn mhdr(&self) -> Option<MHDR> {
        match self {
            Frame::Invalid => None,
            Frame::JoinRequest(p) => Some(p.mhdr()),
            Frame::DataUp(p) => Some(p.mhdr()),
            Frame::Other(mhdr) => Some(*mhdr),
        }
    }

    pub fn is_join_request(&self) -> bool {
        matches!(self, Frame::JoinRequest(_))
    }

    pub fn is_data_up(&self) -> bool {
        matches!(self, Frame::DataUp(_))
    }
}

/// Parses a payload as LoRaWAN physical payload.
///
/// # Argument
///
/// * data - the bytes from which the Frame is to be built.
pub fn parse<T: AsRef<[u8]>>(data: T) -> Frame<T> {
    let bytes = data.as_ref();
    if bytes.is_empty() {
        return Frame::Invalid;
    }
    let mhdr = MHDR(bytes[0]);
    match mhdr.mtype() {
        MType::JoinRequest => {
            JoinRequestPayload::new(data).map(Frame::JoinRequest).unwrap_or(Frame::Invalid)
        }
        MType::UnconfirmedDataUp | MType::ConfirmedDataUp => {
            DataUplinkPayload::new(data).map(Frame::DataUp).unwrap_or(Frame::Invalid)
        }
        _ => Frame::Other(mhdr),
    }
}

/// JoinRequestPayload represents a JoinRequest.
#[derive(Debug, PartialEq, Eq)]
pub struct JoinRequestPayload<T>(T);

impl<T: AsRef<[u8]>> JoinRequestPayload<T> {
    /// Creates a new JoinRequestPayload if the provided data is acceptable.
    ///
    /// # Examples
    ///
    /// ```
    /// let data = [0x00, 0x04, 0x03, 0x02, 0x01, 0x04, 0x03, 0x02, 0x01, 0x05, 0x04, 0x03,
    ///     0x02, 0x05, 0x04, 0x03, 0x02, 0x2d, 0x10, 0x6a, 0x99, 0x0e, 0x12];
    /// let phy = otaa_encoding::parser::JoinRequestPayload::new(&data[..]).unwrap();
    /// assert_eq!(phy.dev_nonce(), 0x102d);
    /// ```
    pub fn new(data: T) -> Option<Self> {
        let bytes = data.as_ref();
        if bytes.len() == JOIN_REQUEST_LEN && MHDR(bytes[0]).mtype() == MType::JoinRequest {
            Some(Self(data))
        } else {
            None
        }
    }

    pub fn mhdr(&self) -> MHDR {
        MHDR(self.0.as_ref()[0])
    }

    /// Gives the JoinEUI of the JoinRequest.
    pub fn join_eui(&self) -> JoinEui {
        JoinEui::from(read_eui(&self.0.as_ref()[1..9]))
    }

    /// Gives the DevEUI of the JoinRequest.
    pub fn dev_eui(&self) -> DevEui {
        DevEui::from(read_eui(&self.0.as_ref()[9..17]))
    }

    /// Gives the DevNonce of the JoinRequest.
    pub fn dev_nonce(&self) -> u16 {
        let d = self.0.as_ref();
        u16::from_le_bytes([d[17], d[18]])
    }

    pub fn mic(&self) -> MIC {
        read_mic(self.0.as_ref())
    }

    /// Verifies that the JoinRequest has correct MIC.
    pub fn validate_mic<F: CryptoFactory>(&self, key: &AppKey, factory: &F) -> bool {
        self.mic() == self.calculate_mic(key, factory)
    }

    fn calculate_mic<F: CryptoFactory>(&self, key: &AppKey, factory: &F) -> MIC {
        let d = self.0.as_ref();
        securityhelpers::calculate_mic(&d[..d.len() - MIC_LEN], factory.new_mac(key.inner()))
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for JoinRequestPayload<T> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// DataUplinkPayload represents a confirmed or unconfirmed data uplink.
///
/// The FRMPayload is left encrypted; the harness only needs the header and
/// the MIC.
#[derive(Debug, PartialEq, Eq)]
pub struct DataUplinkPayload<T>(T);

impl<T: AsRef<[u8]>> DataUplinkPayload<T> {
    pub fn new(data: T) -> Option<Self> {
        let bytes = data.as_ref();
        if bytes.len() < PHY_PAYLOAD_MIN_LEN {
            return None;
        }
        match MHDR(bytes[0]).mtype() {
            MType::UnconfirmedDataUp | MType::ConfirmedDataUp => {}
            _ => return None,
        }
        let fhdr_len = FHDR_MIN_LEN + FCtrl(bytes[5]).f_opts_len() as usize;
        if bytes.len() < MHDR_LEN + fhdr_len + MIC_LEN {
            return None;
        }
        Some(Self(data))
    }

    pub fn mhdr(&self) -> MHDR {
        MHDR(self.0.as_ref()[0])
    }

    /// Gives the device address associated with the given payload.
    pub fn dev_addr(&self) -> DevAddr<&[u8]> {
        DevAddr::new_from_raw(&self.0.as_ref()[1..5])
    }

    /// Gives the FCtrl associated with the given payload.
    pub fn fctrl(&self) -> FCtrl {
        FCtrl(self.0.as_ref()[5])
    }

    /// Gives the truncated FCnt associated with the given payload.
    pub fn fcnt(&self) -> u16 {
        let d = self.0.as_ref();
        u16::from_le_bytes([d[6], d[7]])
    }

    /// Gives the FOpts bytes carried in the header.
    pub fn f_opts(&self) -> &[u8] {
        let end = MHDR_LEN + self.fhdr_length();
        &self.0.as_ref()[MHDR_LEN + FHDR_MIN_LEN..end]
    }

    /// Gives the FPort if the frame carries one.
    pub fn f_port(&self) -> Option<u8> {
        let d = self.0.as_ref();
        let port_idx = MHDR_LEN + self.fhdr_length();
        if port_idx < d.len() - MIC_LEN {
            Some(d[port_idx])
        } else {
            None
        }
    }

    /// Gives the still encrypted FRMPayload, empty when there is none.
    pub fn frm_payload(&self) -> &[u8] {
        let d = self.0.as_ref();
        let start = MHDR_LEN + self.fhdr_length() + 1;
        let end = d.len() - MIC_LEN;
        if start < end {
            &d[start..end]
        } else {
            &[]
        }
    }

    pub fn mic(&self) -> MIC {
        read_mic(self.0.as_ref())
    }

    /// Verifies the MIC with the session's NwkSKey and the FCnt carried in
    /// the frame.
    pub fn validate_mic<F: CryptoFactory>(&self, key: &NwkSKey, factory: &F) -> bool {
        u32::from(self.mic()) == self.calculate_mic(key, factory)
    }

    pub fn calculate_mic<F: CryptoFactory>(&self, key: &NwkSKey, factory: &F) -> u32 {
        let d = self.0.as_ref();
        securityhelpers::calculate_uplink_mic(
            factory,
            key,
            u32::from(self.dev_addr()),
            u32::from(self.fcnt()),
            &d[..d.len() - MIC_LEN],
        )
    }

    fn fhdr_length(&self) -> usize {
        FHDR_MIN_LEN + self.fctrl().f_opts_len() as usize
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for DataUplinkPayload<T> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// DecryptedJoinAcceptPayload is the device's view of a received JoinAccept.
///
/// The join server produces the ciphertext with AES decrypt, so the device
/// recovers the cleartext with AES encrypt.
#[derive(Debug, PartialEq, Eq)]
pub struct DecryptedJoinAcceptPayload<T>(T);

impl<T: AsRef<[u8]> + AsMut<[u8]>> DecryptedJoinAcceptPayload<T> {
    /// Decrypts the JoinAccept in place.
    ///
    /// # Examples
    ///
    /// ```
    /// use otaa_encoding::default_crypto::DefaultFactory;
    /// use otaa_encoding::keys::AppKey;
    /// use otaa_encoding::parser::DecryptedJoinAcceptPayload;
    ///
    /// let key: AppKey = "00112233445566778899AABBCCDDEEFF".parse().unwrap();
    /// let mut data = [0x20, 0x00, 0xa7, 0xa4, 0x78, 0x81, 0xfd, 0x81, 0x40, 0x24, 0xd3, 0xd4,
    ///     0x20, 0xba, 0xcf, 0xa3, 0x08];
    /// let ja = DecryptedJoinAcceptPayload::new(&mut data[..], &key, &DefaultFactory).unwrap();
    /// assert!(ja.validate_mic(&key, &DefaultFactory));
    /// assert_eq!(ja.dev_addr(), 0xdeadbeef);
    /// ```
    pub fn new<F: CryptoFactory>(mut data: T, key: &AppKey, factory: &F) -> Option<Self> {
        let bytes = data.as_mut();
        if bytes.len() != JOIN_ACCEPT_LEN || MHDR(bytes[0]).mtype() != MType::JoinAccept {
            return None;
        }
        let aes_enc = factory.new_enc(key.inner());
        aes_enc.encrypt_block(&mut bytes[1..17]);
        Some(Self(data))
    }
}

impl<T: AsRef<[u8]>> DecryptedJoinAcceptPayload<T> {
    /// AppNonce as read by a LoRaWAN 1.0 device, bytes 1..4 little endian.
    pub fn app_nonce(&self) -> u32 {
        read_u24(&self.0.as_ref()[1..4])
    }

    /// NetID as read by a LoRaWAN 1.0 device, bytes 4..7 little endian.
    pub fn net_id(&self) -> u32 {
        read_u24(&self.0.as_ref()[4..7])
    }

    pub fn dev_addr(&self) -> u32 {
        let d = self.0.as_ref();
        u32::from_le_bytes([d[7], d[8], d[9], d[10]])
    }

    pub fn dl_settings(&self) -> u8 {
        self.0.as_ref()[11]
    }

    pub fn rx_delay(&self) -> u8 {
        self.0.as_ref()[12]
    }

    pub fn mic(&self) -> MIC {
        read_mic(self.0.as_ref())
    }

    /// Verifies that the JoinAccept has correct MIC.
    pub fn validate_mic<F: CryptoFactory>(&self, key: &AppKey, factory: &F) -> bool {
        let d = self.0.as_ref();
        self.mic()
            == securityhelpers::calculate_mic(&d[..d.len() - MIC_LEN], factory.new_mac(key.inner()))
    }

    /// Derives the session the device ends up with after this JoinAccept.
    pub fn derive_session_keys<F: CryptoFactory>(
        &self,
        key: &AppKey,
        dev_nonce: u16,
        factory: &F,
    ) -> SessionKeys {
        key.derive_session_keys(self.app_nonce(), self.net_id(), dev_nonce, factory)
    }
}

fn read_eui(b: &[u8]) -> [u8; 8] {
    let mut eui = [0u8; 8];
    eui.copy_from_slice(b);
    eui
}

fn read_u24(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], 0])
}

fn read_mic(d: &[u8]) -> MIC {
    let mut mic = [0u8; 4];
    mic.copy_from_slice(&d[d.len() - MIC_LEN..]);
    MIC(mic)
}

/// MHDR represents LoRaWAN MHDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MHDR(u8);

impl MHDR {
    pub fn new(byte: u8) -> MHDR {
        MHDR(byte)
    }

    /// Gives the type of message that PhyPayload is carrying.
    pub fn mtype(&self) -> MType {
        match self.0 >> 5 {
            0 => MType::JoinRequest,
            1 => MType::JoinAccept,
            2 => MType::UnconfirmedDataUp,
            3 => MType::UnconfirmedDataDown,
            4 => MType::ConfirmedDataUp,
            5 => MType::ConfirmedDataDown,
            6 => MType::RFU,
            _ => MType::Proprietary,
        }
    }

    pub fn raw_value(&self) -> u8 {
        self.0
    }
}

impl From<u8> for MHDR {
    fn from(v: u8) -> Self {
        MHDR(v)
    }
}

/// MType gives the possible message types of the PhyPayload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MType {
    JoinRequest,
    JoinAccept,
    UnconfirmedDataUp,
    UnconfirmedDataDown,
    ConfirmedDataUp,
    ConfirmedDataDown,
    RFU,
    Proprietary,
}

impl MType {
    /// The three bit value carried in the MHDR.
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// FCtrl represents the FCtrl of an uplink FHDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FCtrl(pub u8);

impl FCtrl {
    pub fn raw_value(&self) -> u8 {
        self.0
    }

    pub fn adr(&self) -> bool {
        self.0 >> 7 == 1
    }

    pub fn f_opts_len(&self) -> u8 {
        self.0 & 0x0f
    }
}
