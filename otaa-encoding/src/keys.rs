//! Implement types for dealing with LoRaWAN keys, identifiers and the
//! cryptography entities required by the join procedure.
use core::fmt;
use core::str::FromStr;

macro_rules! lorawan_key {
    (
        $(#[$outer:meta])*
        pub struct $type:ident(AES128);
    ) => {
        $(#[$outer])*
        #[doc = concat!(
            "# Usage\n\n",
            "## Creating from a hex-encoded MSB string:\n",
            "```\n",
            "use otaa_encoding::keys::", stringify!($type), ";\n",
            "use core::str::FromStr;\n",
            "let key = ", stringify!($type),
            "::from_str(\"00112233445566778899aabbccddeeff\").unwrap();\n",
            "```\n"
        )]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $type(pub(crate) AES128);

        impl $type {
            pub fn inner(&self) -> &AES128 {
                &self.0
            }
        }

        impl From<[u8; 16]> for $type {
            fn from(key: [u8; 16]) -> Self {
                $type(AES128(key))
            }
        }

        impl AsRef<[u8]> for $type {
            fn as_ref(&self) -> &[u8] {
                &self.0 .0
            }
        }

        impl FromStr for $type {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut res = [0u8; 16];
                hex::decode_to_slice(s.trim().as_bytes(), &mut res)?;
                Ok(Self::from(res))
            }
        }
    };
}

lorawan_key!(
    /// The [`AppKey`] is the AES-128 root key of an end-device using OTAA.
    ///
    /// It never leaves the device or the join server; both sides derive the
    /// session keys from it.
    pub struct AppKey(AES128);
);

lorawan_key!(
    /// The [`AppSKey`] is the application session key (AES-128) of an end-device.
    pub struct AppSKey(AES128);
);

lorawan_key!(
    /// The [`NwkSKey`] is the network session key (AES-128) of an end-device.
    ///
    /// It signs every uplink of the session.
    pub struct NwkSKey(AES128);
);

/// Selects which session key a derivation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionKeyKind {
    Nwk = 0x01,
    App = 0x02,
}

/// The pair of keys agreed during a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionKeys {
    pub nwkskey: NwkSKey,
    pub appskey: AppSKey,
}

impl AppKey {
    /// LoRaWAN 1.0.x session key derivation.
    ///
    /// `key = aes128_encrypt(AppKey, kind | AppNonce | NetID | DevNonce | pad16)`,
    /// every field little endian. Only the low 24 bits of `app_nonce` and
    /// `net_id` are used.
    pub fn derive_session_key<F: CryptoFactory>(
        &self,
        kind: SessionKeyKind,
        app_nonce: u32,
        net_id: u32,
        dev_nonce: u16,
        crypto: &F,
    ) -> AES128 {
        let mut block = [0u8; 16];
        block[0] = kind as u8;
        block[1..4].copy_from_slice(&app_nonce.to_le_bytes()[..3]);
        block[4..7].copy_from_slice(&net_id.to_le_bytes()[..3]);
        block[7..9].copy_from_slice(&dev_nonce.to_le_bytes());
        crypto.new_enc(&self.0).encrypt_block(&mut block);
        AES128(block)
    }

    pub fn derive_nwkskey<F: CryptoFactory>(
        &self,
        app_nonce: u32,
        net_id: u32,
        dev_nonce: u16,
        crypto: &F,
    ) -> NwkSKey {
        NwkSKey(self.derive_session_key(SessionKeyKind::Nwk, app_nonce, net_id, dev_nonce, crypto))
    }

    pub fn derive_appskey<F: CryptoFactory>(
        &self,
        app_nonce: u32,
        net_id: u32,
        dev_nonce: u16,
        crypto: &F,
    ) -> AppSKey {
        AppSKey(self.derive_session_key(SessionKeyKind::App, app_nonce, net_id, dev_nonce, crypto))
    }

    /// Derives both session keys at once.
    pub fn derive_session_keys<F: CryptoFactory>(
        &self,
        app_nonce: u32,
        net_id: u32,
        dev_nonce: u16,
        crypto: &F,
    ) -> SessionKeys {
        SessionKeys {
            nwkskey: self.derive_nwkskey(app_nonce, net_id, dev_nonce, crypto),
            appskey: self.derive_appskey(app_nonce, net_id, dev_nonce, crypto),
        }
    }
}

macro_rules! lorawan_eui {
    (
        $(#[$outer:meta])*
        pub struct $type:ident([u8; 8]);
    ) => {
        $(#[$outer])*
        #[doc = concat!(
            "# Usage\n\n",
            "## Creating from a hex-encoded MSB string:\n",
            "```\n",
            "use otaa_encoding::keys::", stringify!($type), ";\n",
            "use core::str::FromStr;\n",
            "let eui = ", stringify!($type), "::from_str(\"0011223344556677\").unwrap();\n",
            "assert_eq!(eui.as_ref(), &[0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);\n",
            "```\n\n",
            "## Creating from a byte array in LSB (wire) format:\n",
            "```\n",
            "use otaa_encoding::keys::", stringify!($type), ";\n",
            "let eui = ", stringify!($type), "::from([\n",
            "    0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00\n",
            "]);\n",
            "assert_eq!(eui.to_string(), \"0011223344556677\");\n",
            "```\n"
        )]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $type([u8; 8]);

        impl $type {
            /// Builds the EUI from its display (MSB first) representation.
            pub fn from_msb(mut bytes: [u8; 8]) -> Self {
                bytes.reverse();
                $type(bytes)
            }

            /// Gives the EUI in display (MSB first) order.
            pub fn to_msb(&self) -> [u8; 8] {
                let mut bytes = self.0;
                bytes.reverse();
                bytes
            }
        }

        impl From<[u8; 8]> for $type {
            fn from(eui: [u8; 8]) -> Self {
                $type(eui)
            }
        }

        impl AsRef<[u8]> for $type {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl FromStr for $type {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut res = [0u8; 8];
                hex::decode_to_slice(s.trim().as_bytes(), &mut res)?;
                Ok(Self::from_msb(res))
            }
        }

        impl fmt::Display for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for b in self.0.iter().rev() {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    };
}

lorawan_eui!(
    /// [`DevEui`] is a global end-device ID in the IEEE EUI64 address space.
    ///
    /// Stored in the order it is carried over the air (LSB first).
    pub struct DevEui([u8; 8]);
);

lorawan_eui!(
    /// [`JoinEui`] identifies the join server able to process a JoinRequest.
    ///
    /// Before LoRaWAN 1.0.4 it was called AppEUI.
    pub struct JoinEui([u8; 8]);
);

/// [`AES128`] represents 128-bit AES key.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct AES128(pub [u8; 16]);

impl From<[u8; 16]> for AES128 {
    fn from(v: [u8; 16]) -> Self {
        AES128(v)
    }
}

/// [`MIC`] represents LoRaWAN message integrity code (MIC).
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct MIC(pub [u8; 4]);

impl From<[u8; 4]> for MIC {
    fn from(v: [u8; 4]) -> Self {
        MIC(v)
    }
}

impl From<u32> for MIC {
    fn from(v: u32) -> Self {
        MIC(v.to_le_bytes())
    }
}

impl From<MIC> for u32 {
    fn from(v: MIC) -> Self {
        u32::from_le_bytes(v.0)
    }
}

/// Trait for implementations of AES128 encryption.
pub trait Encrypter {
    fn encrypt_block(&self, block: &mut [u8]);
}

/// Trait for implementations of AES128 decryption.
pub trait Decrypter {
    fn decrypt_block(&self, block: &mut [u8]);
}

/// Trait for implementations of CMAC (RFC4493).
pub trait Mac {
    fn input(&mut self, data: &[u8]);
    fn reset(&mut self);
    fn result(self) -> [u8; 16];
}

/// Represents an abstraction over the crypto functions.
///
/// This trait provides a way to pick a different implementation of the crypto primitives.
pub trait CryptoFactory {
    type E: Encrypter;
    type D: Decrypter;
    type M: Mac;

    /// Method that creates an Encrypter.
    fn new_enc(&self, key: &AES128) -> Self::E;

    /// Method that creates a Decrypter.
    fn new_dec(&self, key: &AES128) -> Self::D;

    /// Method that creates a MAC calculator.
    fn new_mac(&self, key: &AES128) -> Self::M;
}
