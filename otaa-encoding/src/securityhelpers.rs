//! Block cipher, CMAC and MIC helpers shared by the parser and the creators.
use super::keys::{self, CryptoFactory, Decrypter, Encrypter, NwkSKey, AES128};

/// Encrypts a single block with AES-128.
pub fn aes_encrypt_block<F: CryptoFactory>(factory: &F, key: &AES128, block: [u8; 16]) -> [u8; 16] {
    let mut out = block;
    factory.new_enc(key).encrypt_block(&mut out);
    out
}

/// Decrypts a single block with AES-128.
pub fn aes_decrypt_block<F: CryptoFactory>(factory: &F, key: &AES128, block: [u8; 16]) -> [u8; 16] {
    let mut out = block;
    factory.new_dec(key).decrypt_block(&mut out);
    out
}

/// AES-CMAC of `msg`, truncated to the first four bytes of the tag and read
/// little endian.
pub fn cmac<F: CryptoFactory>(factory: &F, key: &AES128, msg: &[u8]) -> u32 {
    calculate_mic(msg, factory.new_mac(key)).into()
}

/// calculate_uplink_mic computes the MIC of an uplink data frame.
///
/// `msg` is the PHYPayload without its trailing MIC. Only the 16 bit FCnt
/// carried on the air is known to the harness, so the upper bits of the
/// counter in B0 are zero.
pub fn calculate_uplink_mic<F: CryptoFactory>(
    factory: &F,
    key: &NwkSKey,
    dev_addr: u32,
    fcnt: u32,
    msg: &[u8],
) -> u32 {
    let b0 = b0_block(0, dev_addr, fcnt, msg.len());
    calculate_mic_with_header(&b0, msg, factory.new_mac(key.inner())).into()
}

// first | 0x00 * 4 | Dir | DevAddr | FCnt | 0x00 | last
fn helper_block(first: u8, dir: u8, dev_addr: u32, fcnt: u32) -> [u8; 16] {
    let mut res = [0u8; 16];
    res[0] = first;
    res[5] = dir;
    res[6..10].copy_from_slice(&dev_addr.to_le_bytes());
    res[10..14].copy_from_slice(&fcnt.to_le_bytes());
    res
}

fn b0_block(dir: u8, dev_addr: u32, fcnt: u32, len: usize) -> [u8; 16] {
    let mut res = helper_block(0x49, dir, dev_addr, fcnt);
    res[15] = len as u8;
    res
}

/// encrypt_frm_data_payload encrypts (or decrypts) an uplink FRMPayload in place.
pub fn encrypt_frm_data_payload<E: Encrypter>(
    payload: &mut [u8],
    dev_addr: u32,
    fcnt: u32,
    aes_enc: &E,
) {
    let mut a = helper_block(0x01, 0, dev_addr, fcnt);
    let mut s = [0u8; 16];

    let mut ctr = 1;
    for (i, b) in payload.iter_mut().enumerate() {
        let j = i & 0x0f;
        if j == 0 {
            a[15] = ctr;
            ctr += 1;
            s.copy_from_slice(&a);
            aes_enc.encrypt_block(&mut s);
        }
        *b ^= s[j];
    }
}

fn calculate_mic_with_header<M: keys::Mac>(header: &[u8], data: &[u8], mic: M) -> keys::MIC {
    let mut cipher = mic;
    cipher.input(header);
    cipher.input(data);
    let result = cipher.result();

    let mut mic = [0u8; 4];
    mic.copy_from_slice(&result[0..4]);

    keys::MIC(mic)
}

/// calculate_mic computes the MIC of a join frame.
pub fn calculate_mic<M: keys::Mac>(data: &[u8], key: M) -> keys::MIC {
    calculate_mic_with_header(&[], data, key)
}
