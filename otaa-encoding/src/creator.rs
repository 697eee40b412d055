//! Provides types and methods for creating LoRaWAN payloads.
//!
//! See [JoinAcceptCreator::new] for an example.
use super::keys::{AppKey, AppSKey, CryptoFactory, Decrypter, DevEui, JoinEui, NwkSKey, SessionKeys};
use super::parser::FCtrl;
use super::securityhelpers;
use crate::packet_length::phy::join::{JOIN_ACCEPT_LEN, JOIN_REQUEST_LEN};
use crate::packet_length::phy::mac::fhdr::FOPTS_MAX_LEN;
use crate::packet_length::phy::{MIC_LEN, PHY_PAYLOAD_MIN_LEN};

/// DLSettings announced in every JoinAccept: RX1DROffset 0, RX2 datarate 8.
pub const DEFAULT_DL_SETTINGS: u8 = 8;
/// RxDelay announced in every JoinAccept, in seconds.
pub const DEFAULT_RX_DELAY: u8 = 1;

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    BufferTooShort,
    MacCommandTooBigForFOpts,
    FRMPayloadWithoutFPort,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::BufferTooShort => f.write_str("buffer too short"),
            Error::MacCommandTooBigForFOpts => f.write_str("mac commands do not fit in FOpts"),
            Error::FRMPayloadWithoutFPort => f.write_str("FRMPayload requires an FPort"),
        }
    }
}

/// JoinAcceptCreator serves for creating binary representation of Physical
/// Payload of JoinAccept.
///
/// The cleartext body uses the legacy packing expected by the devices under
/// test: NetID then AppNonce, each as 24 bits most significant byte first,
/// followed by DevAddr (little endian), DLSettings and RxDelay.
///
/// # Examples
///
/// ```
/// let mut buf = [0u8; 17];
/// let mut phy = otaa_encoding::creator::JoinAcceptCreator::new(&mut buf[..]).unwrap();
/// let key = otaa_encoding::keys::AppKey::from([1; 16]);
/// phy.set_app_nonce(0x010101);
/// phy.set_net_id(0x010101);
/// phy.set_dev_addr(0x01010101);
/// phy.set_dl_settings(2);
/// phy.set_rx_delay(1);
/// let payload = phy.build(&key, &otaa_encoding::default_crypto::DefaultFactory);
/// assert_eq!(payload.len(), 17);
/// ```
pub struct JoinAcceptCreator<D> {
    data: D,
    encrypted: bool,
}

impl<D: AsMut<[u8]>> JoinAcceptCreator<D> {
    /// Creates a well initialized JoinAcceptCreator over `data`.
    pub fn new(mut data: D) -> Result<Self, Error> {
        let d = data.as_mut();
        if d.len() < JOIN_ACCEPT_LEN {
            return Err(Error::BufferTooShort);
        }
        d[0] = 0x20;
        Ok(Self { data, encrypted: false })
    }

    /// Sets the AppNonce of the JoinAccept. Only the low 24 bits are used.
    pub fn set_app_nonce(&mut self, app_nonce: u32) -> &mut Self {
        self.data.as_mut()[4..7].copy_from_slice(&app_nonce.to_be_bytes()[1..]);

        self
    }

    /// Sets the network ID of the JoinAccept. Only the low 24 bits are used.
    pub fn set_net_id(&mut self, net_id: u32) -> &mut Self {
        self.data.as_mut()[1..4].copy_from_slice(&net_id.to_be_bytes()[1..]);

        self
    }

    /// Sets the device address of the JoinAccept.
    pub fn set_dev_addr(&mut self, dev_addr: u32) -> &mut Self {
        self.data.as_mut()[7..11].copy_from_slice(&dev_addr.to_le_bytes());

        self
    }

    /// Sets the DLSettings of the JoinAccept.
    pub fn set_dl_settings(&mut self, dl_settings: u8) -> &mut Self {
        self.data.as_mut()[11] = dl_settings;

        self
    }

    /// Sets the RX delay of the JoinAccept.
    pub fn set_rx_delay(&mut self, rx_delay: u8) -> &mut Self {
        self.data.as_mut()[12] = rx_delay;

        self
    }

    /// Provides the binary representation of the encrypted join accept
    /// physical payload with the MIC set.
    ///
    /// The body and MIC go through AES *decrypt* so that the device recovers
    /// them with AES encrypt.
    pub fn build<F: CryptoFactory>(&mut self, key: &AppKey, factory: &F) -> &[u8] {
        let d = &mut self.data.as_mut()[..JOIN_ACCEPT_LEN];
        if !self.encrypted {
            set_mic(d, key, factory);
            factory.new_dec(key.inner()).decrypt_block(&mut d[1..17]);
            self.encrypted = true;
        }
        d
    }
}

impl JoinAcceptCreator<[u8; JOIN_ACCEPT_LEN]> {
    /// Creates a JoinAcceptCreator owning an exactly sized buffer.
    pub fn owned() -> Self {
        let mut data = [0u8; JOIN_ACCEPT_LEN];
        data[0] = 0x20;
        Self { data, encrypted: false }
    }

    pub fn into_inner(self) -> [u8; JOIN_ACCEPT_LEN] {
        self.data
    }
}

fn set_mic<F: CryptoFactory>(data: &mut [u8], key: &AppKey, factory: &F) {
    let len = data.len();
    let mic = securityhelpers::calculate_mic(&data[..len - MIC_LEN], factory.new_mac(key.inner()));

    data[len - MIC_LEN..].copy_from_slice(&mic.0[..]);
}

/// The content of a JoinAccept sent by the join server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAccept {
    pub app_nonce: u32,
    pub net_id: u32,
    pub dev_addr: u32,
    pub dl_settings: u8,
    pub rx_delay: u8,
}

impl JoinAccept {
    pub fn new(app_nonce: u32, net_id: u32, dev_addr: u32) -> Self {
        Self {
            app_nonce,
            net_id,
            dev_addr,
            dl_settings: DEFAULT_DL_SETTINGS,
            rx_delay: DEFAULT_RX_DELAY,
        }
    }

    /// Encrypted PHYPayload of this JoinAccept.
    pub fn encode<F: CryptoFactory>(&self, key: &AppKey, factory: &F) -> [u8; JOIN_ACCEPT_LEN] {
        let mut phy = JoinAcceptCreator::owned();
        phy.set_app_nonce(self.app_nonce)
            .set_net_id(self.net_id)
            .set_dev_addr(self.dev_addr)
            .set_dl_settings(self.dl_settings)
            .set_rx_delay(self.rx_delay);
        phy.build(key, factory);
        phy.into_inner()
    }

    /// AppNonce as a LoRaWAN 1.0 device reads it from the cleartext.
    pub fn wire_app_nonce(&self) -> u32 {
        swap24(self.net_id)
    }

    /// NetID as a LoRaWAN 1.0 device reads it from the cleartext.
    pub fn wire_net_id(&self) -> u32 {
        swap24(self.app_nonce)
    }

    /// Session keys the device derives after receiving this JoinAccept.
    pub fn session_keys<F: CryptoFactory>(
        &self,
        key: &AppKey,
        dev_nonce: u16,
        factory: &F,
    ) -> SessionKeys {
        key.derive_session_keys(self.wire_app_nonce(), self.wire_net_id(), dev_nonce, factory)
    }
}

fn swap24(v: u32) -> u32 {
    (v & 0xff) << 16 | (v & 0xff00) | (v >> 16) & 0xff
}

/// encode_join_accept builds a JoinAccept with the default DLSettings and RxDelay.
pub fn encode_join_accept<F: CryptoFactory>(
    key: &AppKey,
    app_nonce: u32,
    net_id: u32,
    dev_addr: u32,
    factory: &F,
) -> [u8; JOIN_ACCEPT_LEN] {
    JoinAccept::new(app_nonce, net_id, dev_addr).encode(key, factory)
}

/// JoinRequestCreator serves for creating binary representation of Physical
/// Payload of JoinRequest.
/// # Examples
///
/// ```
/// let mut buf = [0u8; 23];
/// let mut phy = otaa_encoding::creator::JoinRequestCreator::new(&mut buf[..]).unwrap();
/// let key = otaa_encoding::keys::AppKey::from([7; 16]);
/// phy.set_join_eui(otaa_encoding::keys::JoinEui::from([1; 8]));
/// phy.set_dev_eui(otaa_encoding::keys::DevEui::from([2; 8]));
/// phy.set_dev_nonce(0x0303);
/// let payload = phy.build(&key, &otaa_encoding::default_crypto::DefaultFactory);
/// ```
pub struct JoinRequestCreator<D> {
    data: D,
}

impl<D: AsMut<[u8]>> JoinRequestCreator<D> {
    /// Creates a well initialized JoinRequestCreator.
    pub fn new(mut data: D) -> Result<Self, Error> {
        let d = data.as_mut();
        if d.len() < JOIN_REQUEST_LEN {
            return Err(Error::BufferTooShort);
        }
        d[0] = 0x00;
        Ok(Self { data })
    }

    /// Sets the JoinEUI of the JoinRequest.
    pub fn set_join_eui(&mut self, join_eui: JoinEui) -> &mut Self {
        self.data.as_mut()[1..9].copy_from_slice(join_eui.as_ref());

        self
    }

    /// Sets the device EUI of the JoinRequest.
    pub fn set_dev_eui(&mut self, dev_eui: DevEui) -> &mut Self {
        self.data.as_mut()[9..17].copy_from_slice(dev_eui.as_ref());

        self
    }

    /// Sets the device nonce of the JoinRequest.
    pub fn set_dev_nonce(&mut self, dev_nonce: u16) -> &mut Self {
        self.data.as_mut()[17..19].copy_from_slice(&dev_nonce.to_le_bytes());

        self
    }

    /// Provides the binary representation of the JoinRequest physical payload
    /// with the MIC set.
    pub fn build<F: CryptoFactory>(&mut self, key: &AppKey, factory: &F) -> &[u8] {
        let d = self.data.as_mut();
        set_mic(&mut d[..JOIN_REQUEST_LEN], key, factory);
        &d[..JOIN_REQUEST_LEN]
    }
}

/// encode_join_request builds the JoinRequest a device would send.
pub fn encode_join_request<F: CryptoFactory>(
    join_eui: JoinEui,
    dev_eui: DevEui,
    dev_nonce: u16,
    key: &AppKey,
    factory: &F,
) -> [u8; JOIN_REQUEST_LEN] {
    let mut data = [0u8; JOIN_REQUEST_LEN];
    data[1..9].copy_from_slice(join_eui.as_ref());
    data[9..17].copy_from_slice(dev_eui.as_ref());
    data[17..19].copy_from_slice(&dev_nonce.to_le_bytes());
    set_mic(&mut data, key, factory);
    data
}

/// DataPayloadCreator serves for creating binary representation of Physical
/// Payload of a data uplink.
///
/// # Example
///
/// ```
/// let mut buf = [0u8; 64];
/// let mut phy = otaa_encoding::creator::DataPayloadCreator::new(&mut buf[..]).unwrap();
/// let nwk_skey = otaa_encoding::keys::NwkSKey::from([2; 16]);
/// let app_skey = otaa_encoding::keys::AppSKey::from([1; 16]);
/// phy.set_confirmed(true)
///     .set_f_port(42)
///     .set_dev_addr(0x01020304)
///     .set_fctrl(&otaa_encoding::parser::FCtrl(0x80))
///     .set_fcnt(7);
/// let factory = otaa_encoding::default_crypto::DefaultFactory;
/// phy.build(b"hello lora", &[], &nwk_skey, &app_skey, &factory).unwrap();
/// ```
pub struct DataPayloadCreator<D> {
    data: D,
    dev_addr: u32,
    fcnt: u32,
    f_port: Option<u8>,
}

impl<D: AsMut<[u8]>> DataPayloadCreator<D> {
    /// Creates a well initialized DataPayloadCreator.
    ///
    /// By default the packet is an unconfirmed data up packet.
    pub fn new(mut data: D) -> Result<Self, Error> {
        let d = data.as_mut();
        if d.len() < PHY_PAYLOAD_MIN_LEN {
            return Err(Error::BufferTooShort);
        }
        d[0] = 0x40;
        d[1..8].fill(0);
        Ok(DataPayloadCreator { data, dev_addr: 0, fcnt: 0, f_port: None })
    }

    /// Sets whether the packet is confirmed or unconfirmed.
    pub fn set_confirmed(&mut self, confirmed: bool) -> &mut Self {
        self.data.as_mut()[0] = if confirmed { 0x80 } else { 0x40 };

        self
    }

    pub fn set_dev_addr(&mut self, dev_addr: u32) -> &mut Self {
        self.dev_addr = dev_addr;
        self.data.as_mut()[1..5].copy_from_slice(&dev_addr.to_le_bytes());

        self
    }

    /// Sets the FCtrl header. FOptsLen is filled in by [build](Self::build).
    pub fn set_fctrl(&mut self, fctrl: &FCtrl) -> &mut Self {
        self.data.as_mut()[5] = fctrl.raw_value() & 0xf0;

        self
    }

    /// Sets the FCnt header of the DataPayload packet to the specified value.
    ///
    /// NOTE: In the packet header the value will be truncated to u16.
    pub fn set_fcnt(&mut self, fcnt: u32) -> &mut Self {
        self.fcnt = fcnt;
        self.data.as_mut()[6..8].copy_from_slice(&(fcnt as u16).to_le_bytes());

        self
    }

    pub fn set_f_port(&mut self, f_port: u8) -> &mut Self {
        self.f_port = Some(f_port);

        self
    }

    /// Provides the binary representation of the uplink with the FRMPayload
    /// encrypted and the MIC set.
    pub fn build<F: CryptoFactory>(
        &mut self,
        payload: &[u8],
        f_opts: &[u8],
        nwk_skey: &NwkSKey,
        app_skey: &AppSKey,
        factory: &F,
    ) -> Result<&[u8], Error> {
        if f_opts.len() > FOPTS_MAX_LEN {
            return Err(Error::MacCommandTooBigForFOpts);
        }
        if self.f_port.is_none() && !payload.is_empty() {
            return Err(Error::FRMPayloadWithoutFPort);
        }
        let port_len = usize::from(self.f_port.is_some());
        let total = 8 + f_opts.len() + port_len + payload.len() + MIC_LEN;
        let d = self.data.as_mut();
        if d.len() < total {
            return Err(Error::BufferTooShort);
        }

        d[5] = (d[5] & 0xf0) | f_opts.len() as u8;
        let mut last_filled = 8;
        d[last_filled..last_filled + f_opts.len()].copy_from_slice(f_opts);
        last_filled += f_opts.len();

        if let Some(port) = self.f_port {
            d[last_filled] = port;
            last_filled += 1;
            let frm = &mut d[last_filled..last_filled + payload.len()];
            frm.copy_from_slice(payload);
            let enc_key = if port == 0 { nwk_skey.inner() } else { app_skey.inner() };
            securityhelpers::encrypt_frm_data_payload(
                frm,
                self.dev_addr,
                self.fcnt,
                &factory.new_enc(enc_key),
            );
            last_filled += payload.len();
        }

        let mic = securityhelpers::calculate_uplink_mic(
            factory,
            nwk_skey,
            self.dev_addr,
            self.fcnt,
            &d[..last_filled],
        );
        d[last_filled..last_filled + MIC_LEN].copy_from_slice(&mic.to_le_bytes());

        Ok(&d[..last_filled + MIC_LEN])
    }
}
