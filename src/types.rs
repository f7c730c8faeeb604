//! Core data types shared across the disambiguator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ticks per second of the lightcap clock (48 MHz).
pub const TIMEBASE_HZ: u32 = 48_000_000;

/// Acode bit set on the "skip" sync variant.
pub const SKIP_BIT: u8 = 0b100;
/// Acode bit carrying one bit of the OOTX side channel.
pub const DATA_BIT: u8 = 0b010;
/// Acode bit naming the swept axis.
pub const AXIS_BIT: u8 = 0b001;

/// `index` value of a merged-sync [`LightRecord`].
pub const SYNC_INDEX: i32 = -2;

/// One raw optical event as reported by a tracked object's sensors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightEvent {
    /// Index of the reporting photodiode.
    pub sensor_id: u8,
    /// Tick at which the pulse started; monotonic, wraps at 32 bits.
    pub timestamp: u32,
    /// How long the diode stayed lit, in ticks.
    pub length: u32,
}

/// Which base station emitted a pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lighthouse {
    A,
    B,
}

impl Lighthouse {
    /// Index into per-lighthouse tables such as the tracker's anchors.
    pub const fn index(self) -> usize {
        match self {
            Lighthouse::A => 0,
            Lighthouse::B => 1,
        }
    }
}

impl fmt::Display for Lighthouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lighthouse::A => write!(f, "A"),
            Lighthouse::B => write!(f, "B"),
        }
    }
}

/// Sweep rotation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub const fn bit(self) -> u8 {
        match self {
            Axis::X => 0,
            Axis::Y => AXIS_BIT,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
        }
    }
}

/// Timing regime of the installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    /// Two lighthouses sharing the full 12-slot, 1.6 M-tick period.
    Full,
    /// A single lighthouse repeating the first six slots every 800 k ticks.
    Single60Hz,
}

/// The `(skip, data, axis)` triple a sync pulse's width encodes.
///
/// Kept structured at rest; packed to the wire form with [`SlotCode::bits`]
/// only at the emit boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCode {
    pub skip: bool,
    pub data: bool,
    pub axis: Axis,
}

impl SlotCode {
    pub const fn new(skip: bool, axis: Axis) -> Self {
        Self {
            skip,
            data: false,
            axis,
        }
    }

    pub const fn with_data(self, data: bool) -> Self {
        Self {
            skip: self.skip,
            data,
            axis: self.axis,
        }
    }

    /// Packed integer form: `skip << 2 | data << 1 | axis`.
    pub const fn bits(self) -> u8 {
        (self.skip as u8) << 2 | (self.data as u8) << 1 | self.axis.bit()
    }
}

/// One normalized light observation handed to the upstream pose solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightRecord {
    /// Sensor index for sweep hits; [`SYNC_INDEX`] for merged syncs.
    pub index: i32,
    /// The sensor that saw a sweep hit, or minus the number of pulses
    /// merged into a sync.
    pub sensor: i32,
    /// Packed acode bits, inferred data bit included.
    pub acode: u8,
    /// Ticks since the start of the sync slot that opened this
    /// half-rotation; zero for sync records.
    pub sweep_offset: u32,
    /// Raw start tick of the underlying pulse.
    pub timestamp: u32,
    /// Raw pulse length in ticks.
    pub length: u32,
    /// Base station the pulse came from.
    pub lighthouse: Lighthouse,
}

impl LightRecord {
    /// Whether this record is a merged sync rather than a sweep hit.
    pub const fn is_sync(&self) -> bool {
        self.index < 0
    }
}

/// Receiver for normalized light records.
///
/// Implemented for `Vec<LightRecord>` so tests and simple pipelines can
/// collect records directly; pose solvers implement it on their own intake.
pub trait LightSink {
    fn emit_light(&mut self, record: LightRecord);
}

impl LightSink for Vec<LightRecord> {
    fn emit_light(&mut self, record: LightRecord) {
        self.push(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_code_packing() {
        assert_eq!(SlotCode::new(false, Axis::X).bits(), 0b000);
        assert_eq!(SlotCode::new(false, Axis::Y).bits(), 0b001);
        assert_eq!(SlotCode::new(true, Axis::X).bits(), 0b100);
        assert_eq!(SlotCode::new(true, Axis::Y).bits(), 0b101);
        assert_eq!(SlotCode::new(true, Axis::X).with_data(true).bits(), 0b110);
    }

    #[test]
    fn lighthouse_indices_are_stable() {
        assert_eq!(Lighthouse::A.index(), 0);
        assert_eq!(Lighthouse::B.index(), 1);
    }

    #[test]
    fn sync_records_are_flagged_by_negative_index() {
        let record = LightRecord {
            index: SYNC_INDEX,
            sensor: -4,
            acode: 0b100,
            sweep_offset: 0,
            timestamp: 1000,
            length: 4750,
            lighthouse: Lighthouse::B,
        };
        assert!(record.is_sync());

        let sweep = LightRecord {
            index: 3,
            sensor: 3,
            ..record
        };
        assert!(!sweep.is_sync());
    }
}
