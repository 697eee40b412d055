/// US915 region support (902..928 MHz)
///
/// Fixed channel plan: 64 uplink channels of 125 kHz starting at 902.3 MHz
/// every 200 kHz (DR0 to DR3), 8 uplink channels of 500 kHz starting at
/// 903.0 MHz every 1.6 MHz (DR4) and 8 downlink channels of 500 kHz starting
/// at 923.3 MHz every 600 kHz.
use super::*;

mod datarates;
use datarates::*;

const UPLINK_125KHZ_FIRST: u32 = 902_300_000;
const UPLINK_125KHZ_STEP: u32 = 200_000;
const UPLINK_125KHZ_CHANNELS: u8 = 64;

const UPLINK_500KHZ_FIRST: u32 = 903_000_000;
const UPLINK_500KHZ_STEP: u32 = 1_600_000;
const UPLINK_500KHZ_CHANNELS: u8 = 8;

const DOWNLINK_FIRST: u32 = 923_300_000;
const DOWNLINK_STEP: u32 = 600_000;
const DOWNLINK_CHANNELS: u8 = 8;

const DEFAULT_RX2: u32 = 923_300_000;
const DEFAULT_RX2_DR: u8 = 8;

const MAX_UPLINK_DR: u8 = 4;

/// State struct for the `US915` region.
#[derive(Debug, Default, Clone)]
pub struct US915;

impl US915 {
    pub fn new() -> Self {
        Self
    }

    /// RX1 downlink frequencies, indexed by `uplink channel % 8`.
    pub fn downlink_channels() -> [u32; DOWNLINK_CHANNELS as usize] {
        core::array::from_fn(|i| DOWNLINK_FIRST + DOWNLINK_STEP * i as u32)
    }
}

impl ChannelPlan for US915 {
    fn tx_channel(&self, freq_mhz: f64, datarate: u8) -> Option<u8> {
        let freq = mhz_to_hz(freq_mhz)?;
        match datarate {
            0..=3 => nearest_channel(freq, UPLINK_125KHZ_FIRST, UPLINK_125KHZ_STEP)
                .filter(|ch| *ch < UPLINK_125KHZ_CHANNELS),
            4 => nearest_channel(freq, UPLINK_500KHZ_FIRST, UPLINK_500KHZ_STEP)
                .filter(|ch| *ch < UPLINK_500KHZ_CHANNELS)
                .map(|ch| UPLINK_125KHZ_CHANNELS + ch),
            _ => None,
        }
    }

    fn rx1_config(&self, freq_mhz: f64, datarate: u8, rx1_dr_offset: u8) -> Option<RxWindowConfig> {
        let channel = self.tx_channel(freq_mhz, datarate)?;
        let frequency = Self::downlink_channels()[(channel % DOWNLINK_CHANNELS) as usize];
        let datarate = *RX1_DATARATES.get(datarate as usize)?.get(rx1_dr_offset as usize)?;
        Some(RxWindowConfig { frequency, datarate })
    }

    fn rx2_config(&self) -> RxWindowConfig {
        RxWindowConfig { frequency: DEFAULT_RX2, datarate: DEFAULT_RX2_DR }
    }

    fn datarate_label(&self, datarate: u8) -> Option<&'static str> {
        DATARATES.get(datarate as usize)?.as_ref().map(|dr| dr.label)
    }

    fn uplink_datarate(&self, label: &str) -> Option<u8> {
        let (sf, bw) = parse_lora_datarate(label)?;
        DATARATES[..=MAX_UPLINK_DR as usize]
            .iter()
            .position(|dr| {
                matches!(dr, Some(dr) if dr.spreading_factor == sf && dr.bandwidth_khz == bw)
            })
            .map(|i| i as u8)
    }
}

// Channel whose centre is closest to `freq` on the grid `first + n * step`.
fn nearest_channel(freq: u32, first: u32, step: u32) -> Option<u8> {
    let (freq, first, step) = (u64::from(freq), u64::from(first), u64::from(step));
    let half = step / 2;
    if freq + half < first {
        return None;
    }
    let ch = (freq + half - first) / step;
    u8::try_from(ch).ok()
}

fn mhz_to_hz(freq_mhz: f64) -> Option<u32> {
    let hz = (freq_mhz * 1_000_000.0).round();
    if hz.is_finite() && hz >= 0.0 && hz <= u32::MAX as f64 {
        Some(hz as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn uplink_channel_numbers() {
        let plan = US915::new();
        assert_eq!(plan.tx_channel(902.3, 0), Some(0));
        assert_eq!(plan.tx_channel(902.5, 3), Some(1));
        assert_eq!(plan.tx_channel(914.9, 1), Some(63));
        assert_eq!(plan.tx_channel(915.1, 1), None);
        assert_eq!(plan.tx_channel(903.0, 4), Some(64));
        assert_eq!(plan.tx_channel(914.2, 4), Some(71));
        assert_eq!(plan.tx_channel(902.3, 5), None);
        assert_eq!(plan.tx_channel(800.0, 0), None);
    }

    #[test]
    fn off_grid_frequency_rounds_to_nearest_channel() {
        let plan = US915::new();
        assert_eq!(plan.tx_channel(902.38, 0), Some(0));
        assert_eq!(plan.tx_channel(902.42, 0), Some(1));
    }

    #[test]
    fn rx1_covers_every_125khz_channel() {
        let plan = US915::new();
        for ch in 0..64u32 {
            let freq = 902.3 + 0.2 * f64::from(ch);
            for dr in 0..4u8 {
                assert_eq!(plan.tx_channel(freq, dr), Some(ch as u8));
                let expected = RxWindowConfig {
                    frequency: 923_300_000 + 600_000 * (ch % 8),
                    datarate: RX1_DATARATES[dr as usize][0],
                };
                assert_eq!(plan.rx1_config(freq, dr, 0), Some(expected), "ch {} DR{}", ch, dr);
            }
        }
    }

    #[test]
    fn rx1_for_500khz_uplink() {
        let plan = US915::new();
        let rx1 = plan.rx1_config(903.0, 4, 0).unwrap();
        assert_eq!(rx1, RxWindowConfig { frequency: 923_300_000, datarate: 13 });
        let rx1 = plan.rx1_config(904.6, 4, 2).unwrap();
        assert_eq!(rx1, RxWindowConfig { frequency: 923_900_000, datarate: 12 });
    }

    #[test]
    fn rx1_offset_out_of_range() {
        let plan = US915::new();
        assert_eq!(plan.rx1_config(902.3, 0, 4), None);
        assert_eq!(plan.rx1_config(902.3, 8, 0), None);
    }

    #[test]
    fn datarate_labels() {
        let plan = US915::new();
        assert_eq!(plan.datarate_label(0), Some("SF10BW125"));
        assert_eq!(plan.datarate_label(4), Some("SF8BW500"));
        assert_eq!(plan.datarate_label(5), None);
        assert_eq!(plan.datarate_label(8), Some("SF12BW500"));
        assert_eq!(plan.datarate_label(13), Some("SF7BW500"));
        assert_eq!(plan.datarate_label(14), None);
    }

    #[test]
    fn uplink_datarate_is_inverse_of_label() {
        let plan = US915::new();
        for dr in 0..=4 {
            let label = plan.datarate_label(dr).unwrap();
            assert_eq!(plan.uplink_datarate(label), Some(dr));
        }
        assert_eq!(plan.uplink_datarate("SF12BW500"), None);
        assert_eq!(plan.uplink_datarate("SF7BW250"), None);
        assert_eq!(plan.uplink_datarate("garbage"), None);
    }
}
