use super::{Datarate, NUM_DATARATES};

pub(crate) const DATARATES: [Option<Datarate>; NUM_DATARATES] = [
    // DR0
    Some(Datarate { label: "SF10BW125", spreading_factor: 10, bandwidth_khz: 125 }),
    // DR1
    Some(Datarate { label: "SF9BW125", spreading_factor: 9, bandwidth_khz: 125 }),
    // DR2
    Some(Datarate { label: "SF8BW125", spreading_factor: 8, bandwidth_khz: 125 }),
    // DR3
    Some(Datarate { label: "SF7BW125", spreading_factor: 7, bandwidth_khz: 125 }),
    // DR4
    Some(Datarate { label: "SF8BW500", spreading_factor: 8, bandwidth_khz: 500 }),
    // DR5: LR-FHSS CR1/3
    None,
    // DR6: LR-FHSS CR2/3
    None,
    // DR7: RFU
    None,
    // DR8
    Some(Datarate { label: "SF12BW500", spreading_factor: 12, bandwidth_khz: 500 }),
    // DR9
    Some(Datarate { label: "SF11BW500", spreading_factor: 11, bandwidth_khz: 500 }),
    // DR10
    Some(Datarate { label: "SF10BW500", spreading_factor: 10, bandwidth_khz: 500 }),
    // DR11
    Some(Datarate { label: "SF9BW500", spreading_factor: 9, bandwidth_khz: 500 }),
    // DR12
    Some(Datarate { label: "SF8BW500", spreading_factor: 8, bandwidth_khz: 500 }),
    // DR13
    Some(Datarate { label: "SF7BW500", spreading_factor: 7, bandwidth_khz: 500 }),
];

/// RX1 datarate indexed by uplink datarate (DR0..DR4) and RX1DROffset (0..3).
pub(crate) const RX1_DATARATES: [[u8; 4]; 5] =
    [[10, 9, 8, 8], [11, 10, 9, 8], [12, 11, 10, 9], [13, 12, 11, 10], [13, 13, 12, 11]];
