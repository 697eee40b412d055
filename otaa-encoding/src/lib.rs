//! Library for parsing and building the LoRaWAN frames used during OTAA.
#![no_std]
#![deny(rust_2018_idioms)]
#![doc = include_str!("../README.md")]

pub mod creator;
pub mod keys;
pub mod packet_length;
pub mod parser;
pub mod securityhelpers;

#[cfg(feature = "default-crypto")]
pub mod default_crypto;

#[test]
fn join_request_round_trip() {
    use crate::creator::JoinRequestCreator;
    use crate::default_crypto::DefaultFactory;
    use crate::keys::{AppKey, DevEui, JoinEui};
    use crate::parser::{parse, Frame};

    let key = AppKey::from([7; 16]);
    let join_eui = JoinEui::from([1, 2, 3, 4, 5, 6, 7, 8]);
    let dev_eui = DevEui::from([8, 7, 6, 5, 4, 3, 2, 1]);
    let mut buf = [0u8; 23];
    let mut phy = JoinRequestCreator::new(&mut buf[..]).unwrap();
    phy.set_join_eui(join_eui).set_dev_eui(dev_eui).set_dev_nonce(0x1234);
    let data = phy.build(&key, &DefaultFactory);

    match parse(data) {
        Frame::JoinRequest(jr) => {
            assert_eq!(jr.join_eui(), join_eui);
            assert_eq!(jr.dev_eui(), dev_eui);
            assert_eq!(jr.dev_nonce(), 0x1234);
            assert!(jr.validate_mic(&key, &DefaultFactory));
        }
        _ => panic!("expected a join request"),
    }
}
