/// Delay between the end of a JoinRequest and the opening of RX1, in milliseconds.
pub(crate) const JOIN_ACCEPT_DELAY1: u32 = 5000;
/// Delay between the end of a JoinRequest and the opening of RX2, in milliseconds.
pub(crate) const JOIN_ACCEPT_DELAY2: u32 = 6000;

pub(crate) const DEFAULT_CODING_RATE: &str = "4/5";
