use otaa_encoding::creator::*;
use otaa_encoding::default_crypto::DefaultFactory;
use otaa_encoding::keys::*;
use otaa_encoding::parser::*;
use otaa_encoding::securityhelpers::{calculate_uplink_mic, cmac};

fn phy_join_request_payload() -> Vec<u8> {
    vec![
        0x00, 0x04, 0x03, 0x02, 0x01, 0x04, 0x03, 0x02, 0x01, 0x05, 0x04, 0x03, 0x02, 0x05, 0x04,
        0x03, 0x02, 0x2d, 0x10, 0x6a, 0x99, 0x0e, 0x12,
    ]
}

fn phy_join_accept_payload() -> Vec<u8> {
    vec![
        0x20, 0x49, 0x3e, 0xeb, 0x51, 0xfb, 0xa2, 0x11, 0x6f, 0x81, 0x0e, 0xdb, 0x37, 0x42, 0x97,
        0x51, 0x42,
    ]
}

fn phy_dataup_payload() -> Vec<u8> {
    vec![
        0x40, 0x04, 0x03, 0x02, 0x01, 0x80, 0x01, 0x00, 0x01, 0xa6, 0x94, 0x64, 0x26, 0x15, 0xd6,
        0xc3, 0xb5, 0x82,
    ]
}

fn app_key() -> AppKey {
    AppKey::from([
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0xff,
    ])
}

const RFC4493_KEY: &str = "2b7e151628aed2a6abf7158809cf4f3c";
const RFC4493_MSG: &str = "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51\
                           30c81c46a35ce411e5fbc1191a0a52eff69f2445df4f9b17ad2b417be66c3710";

#[test]
fn test_cmac_rfc4493_vectors() {
    let mut key = [0u8; 16];
    hex::decode_to_slice(RFC4493_KEY, &mut key).unwrap();
    let key = AES128(key);
    let msg = hex::decode(RFC4493_MSG).unwrap();

    assert_eq!(cmac(&DefaultFactory, &key, &[]), 0x29691dbb);
    assert_eq!(cmac(&DefaultFactory, &key, &msg[..16]), 0xb4160a07);
    assert_eq!(cmac(&DefaultFactory, &key, &msg[..40]), 0x4767a6df);
    assert_eq!(cmac(&DefaultFactory, &key, &msg[..64]), 0xbfbef051);
}

#[test]
fn test_join_accept_golden_vector() {
    let key: AppKey = "00112233445566778899AABBCCDDEEFF".parse().unwrap();
    let phy = encode_join_accept(&key, 0x01020304, 0xaabbccdd, 0xdeadbeef, &DefaultFactory);
    assert_eq!(hex::encode(phy), "2000a7a47881fd814024d3d420bacfa308");

    let accept = JoinAccept {
        app_nonce: 0x01020304,
        net_id: 0xaabbccdd,
        dev_addr: 0xdeadbeef,
        dl_settings: 8,
        rx_delay: 1,
    };
    assert_eq!(accept.encode(&key, &DefaultFactory), phy);
}

#[test]
fn test_join_accept_is_decrypted_by_device() {
    let key = app_key();
    let accept = JoinAccept::new(0x00c0ffee, 0x000013, 0xffff0003);
    let mut phy = accept.encode(&key, &DefaultFactory);

    let device = DecryptedJoinAcceptPayload::new(&mut phy[..], &key, &DefaultFactory).unwrap();
    assert!(device.validate_mic(&key, &DefaultFactory));
    assert_eq!(device.dev_addr(), 0xffff0003);
    assert_eq!(device.dl_settings(), 8);
    assert_eq!(device.rx_delay(), 1);
    assert_eq!(device.app_nonce(), accept.wire_app_nonce());
    assert_eq!(device.net_id(), accept.wire_net_id());
    assert_eq!(
        device.derive_session_keys(&key, 0x4242, &DefaultFactory),
        accept.session_keys(&key, 0x4242, &DefaultFactory)
    );
}

#[test]
fn test_join_accept_with_wrong_key_fails_mic() {
    let accept = JoinAccept::new(1, 0, 0xffff0000);
    let mut phy = accept.encode(&app_key(), &DefaultFactory);
    let other = AppKey::from([0x55; 16]);
    let device = DecryptedJoinAcceptPayload::new(&mut phy[..], &other, &DefaultFactory).unwrap();
    assert!(!device.validate_mic(&other, &DefaultFactory));
}

#[test]
fn test_new_join_accept_payload_too_short() {
    let mut bytes = phy_join_accept_payload();
    let len = bytes.len();
    assert!(
        DecryptedJoinAcceptPayload::new(&mut bytes[..(len - 1)], &app_key(), &DefaultFactory)
            .is_none()
    );
}

#[test]
fn test_decrypt_known_join_accept() {
    let key = app_key();
    let join_request = JoinRequestPayload::new(phy_join_request_payload()).unwrap();
    let join_accept =
        DecryptedJoinAcceptPayload::new(phy_join_accept_payload(), &key, &DefaultFactory).unwrap();

    assert!(join_accept.validate_mic(&key, &DefaultFactory));
    assert_eq!(join_accept.app_nonce(), 0x570bc7);
    assert_eq!(join_accept.net_id(), 0x221101);
    assert_eq!(join_accept.dev_addr(), 0x02031980);

    let keys = join_accept.derive_session_keys(&key, join_request.dev_nonce(), &DefaultFactory);
    assert_eq!(
        keys.nwkskey,
        NwkSKey::from([
            0x7b, 0xb2, 0x5f, 0x89, 0xe0, 0xd1, 0x37, 0x1e, 0x1f, 0xbf, 0x4d, 0x99, 0x7e, 0x14,
            0x68, 0xa3,
        ])
    );
    assert_eq!(
        keys.appskey,
        AppSKey::from([
            0x14, 0x88, 0x20, 0xdf, 0xb1, 0xe0, 0xc9, 0xd6, 0x28, 0x9c, 0xde, 0x16, 0xc1, 0xaf,
            0x24, 0x9f,
        ])
    );
}

#[test]
fn test_mhdr_mtype() {
    let examples = [
        (0x00, MType::JoinRequest),
        (0x20, MType::JoinAccept),
        (0x40, MType::UnconfirmedDataUp),
        (0x60, MType::UnconfirmedDataDown),
        (0x80, MType::ConfirmedDataUp),
        (0xa0, MType::ConfirmedDataDown),
        (0xc0, MType::RFU),
        (0xe0, MType::Proprietary),
    ];
    for &(v, ref expected) in &examples {
        let mhdr = MHDR::new(v);
        assert_eq!(mhdr.mtype(), *expected);
        assert_eq!(mhdr.mtype().bits(), v >> 5);
    }
}

#[test]
fn test_join_request_header_selects_type() {
    let data = phy_join_request_payload();
    assert!(parse(&data[..]).is_join_request());

    let mut other = phy_join_request_payload();
    other[0] = 0x20;
    let frame = parse(&other[..]);
    assert!(!frame.is_join_request());
    assert_eq!(frame, Frame::Other(MHDR::new(0x20)));
}

#[test]
fn test_parse_join_request() {
    let data = phy_join_request_payload();
    match parse(data) {
        Frame::JoinRequest(jr) => {
            let join_eui = JoinEui::from([0x04, 0x03, 0x02, 0x01, 0x04, 0x03, 0x02, 0x01]);
            assert_eq!(jr.join_eui(), join_eui);
            assert_eq!(jr.join_eui().to_string(), "0102030401020304");
            assert_eq!(jr.dev_eui().to_string(), "0203040502030405");
            assert_eq!(jr.dev_nonce(), 0x102d);
            assert_eq!(u32::from(jr.mic()), 0x120e996a);
            assert!(jr.validate_mic(&AppKey::from([1; 16]), &DefaultFactory));
            assert!(!jr.validate_mic(&AppKey::from([2; 16]), &DefaultFactory));
        }
        f => panic!("unexpected frame {:?}", f),
    }
}

#[test]
fn test_join_request_creator() {
    let mut buf = [0u8; 23];
    let mut phy = JoinRequestCreator::new(&mut buf[..]).unwrap();
    let key = AppKey::from([1; 16]);
    phy.set_join_eui(JoinEui::from([0x04, 0x03, 0x02, 0x01, 0x04, 0x03, 0x02, 0x01]))
        .set_dev_eui(DevEui::from([0x05, 0x04, 0x03, 0x02, 0x05, 0x04, 0x03, 0x02]))
        .set_dev_nonce(0x102d);

    assert_eq!(phy.build(&key, &DefaultFactory), &phy_join_request_payload()[..]);
}

#[test]
fn test_encode_join_request() {
    let join_eui: JoinEui = "0102030401020304".parse().unwrap();
    let dev_eui: DevEui = "0203040502030405".parse().unwrap();
    let key = AppKey::from([1; 16]);
    let phy = encode_join_request(join_eui, dev_eui, 0x102d, &key, &DefaultFactory);
    assert_eq!(&phy[..], &phy_join_request_payload()[..]);
}

#[test]
fn test_validate_data_mic() {
    let data = phy_dataup_payload();
    match parse(&data[..]) {
        Frame::DataUp(phy) => {
            assert_eq!(phy.fcnt(), 1);
            assert!(phy.validate_mic(&NwkSKey::from([2; 16]), &DefaultFactory));
            assert!(!phy.validate_mic(&NwkSKey::from([3; 16]), &DefaultFactory));
        }
        f => panic!("unexpected frame {:?}", f),
    }
}

#[test]
fn test_uplink_mic_vector() {
    let data = phy_dataup_payload();
    let mic = calculate_uplink_mic(
        &DefaultFactory,
        &NwkSKey::from([2; 16]),
        0x01020304,
        1,
        &data[..data.len() - 4],
    );
    assert_eq!(mic, 0x82b5c3d6);
}

#[test]
fn test_data_payload_creator() {
    let nwkskey = NwkSKey::from([2; 16]);
    let appskey = AppSKey::from([1; 16]);
    let mut buf = [0u8; 64];
    let mut phy = DataPayloadCreator::new(&mut buf[..]).unwrap();
    phy.set_confirmed(false)
        .set_f_port(1)
        .set_dev_addr(0x01020304)
        .set_fctrl(&FCtrl(0x80))
        .set_fcnt(1);

    let built = phy.build(b"hello", &[], &nwkskey, &appskey, &DefaultFactory).unwrap();
    assert_eq!(built, &phy_dataup_payload()[..]);
}

#[test]
fn test_data_payload_creator_with_f_opts() {
    let nwkskey = NwkSKey::from([9; 16]);
    let appskey = AppSKey::from([8; 16]);
    let mut buf = [0u8; 64];
    let mut phy = DataPayloadCreator::new(&mut buf[..]).unwrap();
    phy.set_confirmed(true).set_f_port(10).set_dev_addr(0xffff0001).set_fcnt(5);

    let built =
        phy.build(&[1, 2, 3], &[0x02], &nwkskey, &appskey, &DefaultFactory).unwrap().to_vec();
    match parse(&built[..]) {
        Frame::DataUp(p) => {
            assert_eq!(p.mhdr().mtype(), MType::ConfirmedDataUp);
            assert_eq!(p.fcnt(), 5);
            assert_eq!(p.f_opts(), &[0x02]);
            assert_eq!(p.f_port(), Some(10));
            assert_eq!(p.frm_payload().len(), 3);
            assert!(p.validate_mic(&nwkskey, &DefaultFactory));
        }
        f => panic!("unexpected frame {:?}", f),
    }
}
