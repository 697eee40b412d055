//! Regional channel plans: uplink to downlink channel and datarate mapping
//! and receive window timing for JoinAccept scheduling.
use core::fmt;
use core::str::FromStr;
use std::time::Duration;

pub(crate) mod constants;
use constants::*;

#[cfg(not(feature = "region-us915"))]
compile_error!("You must enable at least one region! eg: `region-us915`");

#[cfg(feature = "region-us915")]
mod us915;
#[cfg(feature = "region-us915")]
pub use us915::US915;

const NUM_DATARATES: usize = 14;

/// This datarate type is used internally for defining bandwidth/sf per region
#[derive(Debug, Clone)]
pub(crate) struct Datarate {
    label: &'static str,
    spreading_factor: u8,
    bandwidth_khz: u16,
}

/// Frequency and datarate of a downlink receive window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxWindowConfig {
    /// Centre frequency in Hz.
    pub frequency: u32,
    pub datarate: u8,
}

impl RxWindowConfig {
    pub fn frequency_mhz(&self) -> f64 {
        f64::from(self.frequency) / 1_000_000.0
    }
}

/// The two receive windows a device opens after a JoinRequest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    _1,
    _2,
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::_1 => f.write_str("RX1"),
            Window::_2 => f.write_str("RX2"),
        }
    }
}

/// Static tables of a region. Every region must say how an uplink frequency
/// maps to its channel; there is no generic fallback.
pub trait ChannelPlan {
    /// Uplink channel index of `freq_mhz` at `datarate`, if it is on the plan.
    fn tx_channel(&self, freq_mhz: f64, datarate: u8) -> Option<u8>;

    fn rx1_config(&self, freq_mhz: f64, datarate: u8, rx1_dr_offset: u8) -> Option<RxWindowConfig>;

    fn rx2_config(&self) -> RxWindowConfig;

    fn datarate_label(&self, datarate: u8) -> Option<&'static str>;

    /// Uplink datarate index of a `SFxBWy` label.
    fn uplink_datarate(&self, label: &str) -> Option<u8>;

    fn coding_rate(&self) -> &'static str {
        DEFAULT_CODING_RATE
    }

    fn join_accept_delay(&self, window: Window) -> Duration {
        match window {
            Window::_1 => Duration::from_millis(u64::from(JOIN_ACCEPT_DELAY1)),
            Window::_2 => Duration::from_millis(u64::from(JOIN_ACCEPT_DELAY2)),
        }
    }

    /// Window parameters for a JoinAccept answering an uplink on
    /// `freq_mhz`/`datarate`, without RX1 datarate offset.
    fn join_accept_window(
        &self,
        window: Window,
        freq_mhz: f64,
        datarate: u8,
    ) -> Option<RxWindowConfig> {
        match window {
            Window::_1 => self.rx1_config(freq_mhz, datarate, 0),
            Window::_2 => Some(self.rx2_config()),
        }
    }
}

/// Parses a LoRa datarate label such as `SF7BW125` into spreading factor and
/// bandwidth in kHz.
pub fn parse_lora_datarate(label: &str) -> Option<(u8, u16)> {
    let label = label.trim().to_ascii_uppercase();
    let rest = label.strip_prefix("SF")?;
    let (sf, bw) = rest.split_once("BW")?;
    Some((sf.parse().ok()?, bw.parse().ok()?))
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("region {0} is not supported by this harness")]
    Unsupported(String),
    #[error("unknown region {0:?}")]
    Unknown(String),
}

/// Regions supported by this crate. Each region is individually
/// feature-gated (eg: `region-us915`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    #[cfg(feature = "region-us915")]
    US915,
}

const KNOWN_REGIONS: [&str; 13] = [
    "EU868", "EU433", "US915", "AU915", "CN470", "CN779", "AS923", "AS923_1", "AS923_2",
    "AS923_3", "AS923_4", "KR920", "IN865",
];

impl FromStr for Region {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase().replace('-', "_");
        match name.as_str() {
            #[cfg(feature = "region-us915")]
            "US915" => Ok(Region::US915),
            n if KNOWN_REGIONS.contains(&n) || n == "RU864" => {
                Err(RegionError::Unsupported(s.trim().to_string()))
            }
            _ => Err(RegionError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "region-us915")]
            Region::US915 => f.write_str("US915"),
        }
    }
}

#[derive(Debug, Clone)]
enum State {
    #[cfg(feature = "region-us915")]
    US915(US915),
}

impl State {
    fn new(region: Region) -> State {
        match region {
            #[cfg(feature = "region-us915")]
            Region::US915 => State::US915(US915::default()),
        }
    }

    fn region(&self) -> Region {
        match self {
            #[cfg(feature = "region-us915")]
            Self::US915(_) => Region::US915,
        }
    }
}

macro_rules! region_dispatch {
  ($s:expr, $t:tt) => {
      match &$s.state {
        #[cfg(feature = "region-us915")]
        State::US915(state) => state.$t(),
      }
  };
  ($s:expr, $t:tt, $($arg:tt)*) => {
      match &$s.state {
        #[cfg(feature = "region-us915")]
        State::US915(state) => state.$t($($arg)*),
      }
  };
}

#[derive(Debug, Clone)]
/// Region-specific configuration used by the join server and the gateway
/// transport. Constructed from the `Region` enum.
pub struct Configuration {
    state: State,
}

impl Configuration {
    pub fn new(region: Region) -> Configuration {
        Configuration { state: State::new(region) }
    }

    pub fn region(&self) -> Region {
        self.state.region()
    }
}

impl From<Region> for Configuration {
    fn from(region: Region) -> Self {
        Configuration::new(region)
    }
}

#[cfg(feature = "region-us915")]
impl From<US915> for Configuration {
    fn from(us915: US915) -> Self {
        Configuration { state: State::US915(us915) }
    }
}

impl ChannelPlan for Configuration {
    fn tx_channel(&self, freq_mhz: f64, datarate: u8) -> Option<u8> {
        region_dispatch!(self, tx_channel, freq_mhz, datarate)
    }

    fn rx1_config(&self, freq_mhz: f64, datarate: u8, rx1_dr_offset: u8) -> Option<RxWindowConfig> {
        region_dispatch!(self, rx1_config, freq_mhz, datarate, rx1_dr_offset)
    }

    fn rx2_config(&self) -> RxWindowConfig {
        region_dispatch!(self, rx2_config)
    }

    fn datarate_label(&self, datarate: u8) -> Option<&'static str> {
        region_dispatch!(self, datarate_label, datarate)
    }

    fn uplink_datarate(&self, label: &str) -> Option<u8> {
        region_dispatch!(self, uplink_datarate, label)
    }

    fn coding_rate(&self) -> &'static str {
        region_dispatch!(self, coding_rate)
    }

    fn join_accept_delay(&self, window: Window) -> Duration {
        region_dispatch!(self, join_accept_delay, window)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn region_from_str() {
        assert_eq!("US915".parse::<Region>(), Ok(Region::US915));
        assert_eq!(" us915 ".parse::<Region>(), Ok(Region::US915));
        assert_eq!("EU868".parse::<Region>(), Err(RegionError::Unsupported("EU868".into())));
        assert_eq!("AS923-1".parse::<Region>(), Err(RegionError::Unsupported("AS923-1".into())));
        assert_eq!("MARS1".parse::<Region>(), Err(RegionError::Unknown("MARS1".into())));
    }

    #[test]
    fn parse_labels() {
        assert_eq!(parse_lora_datarate("SF7BW125"), Some((7, 125)));
        assert_eq!(parse_lora_datarate("sf12bw500"), Some((12, 500)));
        assert_eq!(parse_lora_datarate("SF7"), None);
        assert_eq!(parse_lora_datarate("50000"), None);
    }

    #[test]
    fn join_accept_delays() {
        let plan = Configuration::new(Region::US915);
        assert_eq!(plan.join_accept_delay(Window::_1), Duration::from_secs(5));
        assert_eq!(plan.join_accept_delay(Window::_2), Duration::from_secs(6));
        assert_eq!(plan.coding_rate(), "4/5");
    }

    #[test]
    fn join_accept_window_selects_rx2() {
        let plan = Configuration::new(Region::US915);
        assert_eq!(
            plan.join_accept_window(Window::_2, 902.3, 0),
            Some(RxWindowConfig { frequency: 923_300_000, datarate: 8 })
        );
        assert_eq!(
            plan.join_accept_window(Window::_1, 902.5, 2),
            Some(RxWindowConfig { frequency: 923_900_000, datarate: 12 })
        );
    }
}
