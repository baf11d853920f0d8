//! Meter table programming.

use crate::types::MeterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterModCommand {
    Add,
    Modify,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterBand {
    /// Drop packets above `rate`.
    Drop { rate: u32, burst_size: u32 },
}

/// An `OFPT_METER_MOD` message. Rates are in kbit/s when `kbps` is set,
/// packets/s otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterMod {
    pub command: MeterModCommand,
    pub kbps: bool,
    pub meter_id: MeterId,
    pub bands: Vec<MeterBand>,
}
