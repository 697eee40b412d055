//! LoRaWAN OTAA conformance harness.
//!
//! The harness plays the network and join server behind a Semtech UDP packet
//! forwarder. It answers JoinRequests of the configured devices with correctly
//! timed JoinAccepts and reports, per device, whether the first uplink of the
//! new session carries a valid MIC.
#![deny(rust_2018_idioms)]

pub mod config;
pub mod forwarder;
pub mod join;
pub mod logging;
pub mod region;
pub mod server;

pub use config::{Config, ConfigError};
pub use forwarder::{Forwarder, RxPacket, Transmitter};
pub use join::{JoinServer, Outcome};
pub use region::{ChannelPlan, Configuration, Region};
pub use server::Server;
