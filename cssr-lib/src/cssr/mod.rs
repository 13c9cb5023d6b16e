//! Compact SSR (CSSR) decoding.
//!
//! CSSR is the mask-indexed correction encoding shared, with different
//! field widths, by QZSS CLAS, MADOCA-PPP, BeiDou PPP-B2b, and (in a
//! close variant) Galileo HAS. A mask subtype declares the satellites
//! and signals in play; every later subtype is a dense array indexed by
//! that mask. Field widths, scales, and invalid sentinels live in
//! per-dialect tables; the decoders never hard-code a width.

mod decoder;
mod mask;

pub use decoder::{
    AtmosStecEntry, ClockEntry, CodeBiasEntry, CombinedBiasEntry, CssrDecoder, CssrStats,
    DataPartSummary, GridPoint, OrbitClockEntry, OrbitEntry, PhaseBiasEntry, StecEntry,
    StecPoly, SubtypeBody, SubtypeRecord, UraEntry,
};
pub(crate) use decoder::for_each_cell;
pub use mask::{GnssMask, Mask, MaskContext, SatId};

use serde::{Deserialize, Serialize};

use crate::bits::BitCursor;
use crate::framing::Constellation;
use crate::prelude::*;

/// RTCM message number carried at the head of every CSSR message.
pub const MSGNUM_CSSR: u16 = 4073;

/// Correction dialect; selects the field table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    Clas,
    MadocaPpp,
    BdsB2b,
    Has,
}

/// Width/scale of one bit-packed scalar. The most-negative value of a
/// signed field is the "no value" sentinel; `invalid_max` additionally
/// treats the most-positive value as unusable (HAS clock "do not use").
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub width: usize,
    pub scale: f64,
    pub invalid_max: bool,
}

impl FieldSpec {
    pub const fn new(width: usize, scale: f64) -> Self {
        FieldSpec {
            width,
            scale,
            invalid_max: false,
        }
    }

    pub const fn with_invalid_max(width: usize, scale: f64) -> Self {
        FieldSpec {
            width,
            scale,
            invalid_max: true,
        }
    }

    /// Read one scaled scalar; `None` is the wire's "no value".
    pub fn read(&self, cur: &mut BitCursor<'_>) -> Result<Option<f64>> {
        let raw = cur.take_signed(self.width)?;
        let min = -(1_i64 << (self.width - 1));
        if raw == min {
            return Ok(None);
        }
        if self.invalid_max && raw == (1_i64 << (self.width - 1)) - 1 {
            return Ok(None);
        }
        Ok(Some(raw as f64 * self.scale))
    }
}

/// Per-dialect field table for the satellite- and signal-scoped scalars.
#[derive(Clone, Copy, Debug)]
pub struct FieldTable {
    pub orbit_radial: FieldSpec,
    pub orbit_along: FieldSpec,
    pub orbit_cross: FieldSpec,
    pub clock_c0: FieldSpec,
    pub code_bias: FieldSpec,
    pub phase_bias: FieldSpec,
    /// IODE width for Galileo satellites; all others use `iode_width`.
    pub iode_width_gal: usize,
    pub iode_width: usize,
}

const CLAS_TABLE: FieldTable = FieldTable {
    orbit_radial: FieldSpec::new(15, 0.0016),
    orbit_along: FieldSpec::new(13, 0.0064),
    orbit_cross: FieldSpec::new(13, 0.0064),
    clock_c0: FieldSpec::new(15, 0.0016),
    code_bias: FieldSpec::new(11, 0.02),
    phase_bias: FieldSpec::new(15, 0.001),
    iode_width_gal: 10,
    iode_width: 8,
};

const B2B_TABLE: FieldTable = FieldTable {
    orbit_radial: FieldSpec::new(15, 0.0016),
    orbit_along: FieldSpec::new(13, 0.0064),
    orbit_cross: FieldSpec::new(13, 0.0064),
    clock_c0: FieldSpec::new(15, 0.0016),
    code_bias: FieldSpec::new(12, 0.017),
    phase_bias: FieldSpec::new(15, 0.001),
    iode_width_gal: 10,
    iode_width: 10,
};

const HAS_TABLE: FieldTable = FieldTable {
    orbit_radial: FieldSpec::new(13, 0.0025),
    orbit_along: FieldSpec::new(12, 0.0080),
    orbit_cross: FieldSpec::new(12, 0.0080),
    clock_c0: FieldSpec::with_invalid_max(13, 0.0025),
    code_bias: FieldSpec::new(11, 0.02),
    phase_bias: FieldSpec::new(11, 0.01),
    iode_width_gal: 10,
    iode_width: 8,
};

impl Dialect {
    #[must_use]
    pub fn field_table(&self) -> &'static FieldTable {
        match self {
            // MADOCA-PPP reuses the CLAS compact layout
            Dialect::Clas | Dialect::MadocaPpp => &CLAS_TABLE,
            Dialect::BdsB2b => &B2B_TABLE,
            Dialect::Has => &HAS_TABLE,
        }
    }

    pub(crate) fn iode_width(&self, system: Constellation) -> usize {
        let table = self.field_table();
        if system == Constellation::Galileo {
            table.iode_width_gal
        } else {
            table.iode_width
        }
    }
}

/// GNSS id as used in mask subtypes.
pub(crate) fn constellation_from_gnss_id(id: u8) -> Option<Constellation> {
    Some(match id {
        0 => Constellation::Gps,
        1 => Constellation::Glonass,
        2 => Constellation::Galileo,
        3 => Constellation::BeiDou,
        4 => Constellation::Qzss,
        5 => Constellation::Sbas,
        _ => return None,
    })
}

/// Signal name for a signal-mask bit index.
#[must_use]
pub fn signal_name(system: Constellation, index: u8) -> &'static str {
    let index = usize::from(index);
    match system {
        Constellation::Gps => [
            "L1 C/A",
            "L1 P",
            "L1 Z-tracking",
            "L1 L1C(D)",
            "L1 L1C(P)",
            "L1 L1C(D+P)",
            "L2 L2C(M)",
            "L2 L2C(L)",
            "L2 L2C(M+L)",
            "L2 P",
            "L2 Z-tracking",
            "L5 I",
            "L5 Q",
            "L5 I+Q",
            "",
            "",
        ]
        .get(index)
        .copied()
        .unwrap_or(""),
        Constellation::Glonass => [
            "G1 C/A",
            "G1 P",
            "G2 C/A",
            "G2 P",
            "G1a(D)",
            "G1a(P)",
            "G1a(D+P)",
            "G2a(D)",
            "G2a(P)",
            "G2a(D+P)",
            "G3 I",
            "G3 Q",
            "G3 I+Q",
            "",
            "",
            "",
        ]
        .get(index)
        .copied()
        .unwrap_or(""),
        Constellation::Galileo => [
            "E1 B I/NAV OS/CS/SoL",
            "E1 C no data",
            "E1 B+C",
            "E5a I F/NAV OS",
            "E5a Q no data",
            "E5a I+Q",
            "E5b I I/NAV OS/CS/SoL",
            "E5b Q no data",
            "E5b I+Q",
            "E5 I",
            "E5 Q",
            "E5 I+Q",
            "Service specific 1",
            "Service specific 2",
            "Service specific 3",
            "",
        ]
        .get(index)
        .copied()
        .unwrap_or(""),
        Constellation::BeiDou => [
            "B1 I",
            "B1 Q",
            "B1 I+Q",
            "B3 I",
            "B3 Q",
            "B3 I+Q",
            "B2 I",
            "B2 Q",
            "B2 I+Q",
            "",
            "",
            "",
            "",
            "",
            "",
            "",
        ]
        .get(index)
        .copied()
        .unwrap_or(""),
        Constellation::Qzss => [
            "L1 C/A",
            "L1 L1C(D)",
            "L1 L1C(P)",
            "L1 L1C(D+P)",
            "L2 L2C(M)",
            "L2 L2C(L)",
            "L2 L2C(M+L)",
            "L5 I",
            "L5 Q",
            "L5 I+Q",
            "",
            "",
            "",
            "",
            "",
            "",
        ]
        .get(index)
        .copied()
        .unwrap_or(""),
        Constellation::Sbas => ["L1 C/A", "L5 I", "L5 Q", "L5 I+Q"]
            .get(index)
            .copied()
            .unwrap_or(""),
        Constellation::Navic => "",
    }
}

/// Common CSSR message header following the 4073 message number.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CssrHeader {
    pub subtype: u8,
    /// GPS epoch (1 s), mask subtype only.
    pub epoch: Option<u32>,
    /// GNSS hourly epoch, all other subtypes.
    pub hourly_epoch: Option<u16>,
    pub update_interval: u8,
    pub multiple_message: bool,
    pub iodssr: u8,
}

impl CssrHeader {
    /// Decode the message number, subtype, and epoch/interval/IOD header.
    ///
    /// Returns `None` when the buffer holds only zero padding or a
    /// non-4073 message number (the caller discards it as null data).
    pub fn decode(cur: &mut BitCursor<'_>) -> Result<Option<Self>> {
        let msgnum = cur.take(12)? as u16;
        if msgnum != MSGNUM_CSSR {
            return Ok(None);
        }
        let subtype = cur.take(4)? as u8;
        let mut head = CssrHeader {
            subtype,
            epoch: None,
            hourly_epoch: None,
            update_interval: 0,
            multiple_message: false,
            iodssr: 0,
        };
        if subtype == 10 {
            // service information carries no epoch header
            return Ok(Some(head));
        }
        if subtype == 1 {
            head.epoch = Some(cur.take(20)? as u32);
        } else {
            head.hourly_epoch = Some(cur.take(12)? as u16);
        }
        head.update_interval = cur.take(4)? as u8;
        head.multiple_message = cur.take_bool()?;
        head.iodssr = cur.take(4)? as u8;
        Ok(Some(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    #[test]
    fn field_read_scales_and_detects_invalid() {
        let spec = FieldSpec::new(15, 0.0016);
        let mut w = BitWriter::new();
        w.put_signed(15, 302);
        w.put_signed(15, -16384);
        let bytes = w.into_bytes();
        let mut cur = BitCursor::new(&bytes);
        let v = spec.read(&mut cur).unwrap().unwrap();
        assert!((v - 0.4832).abs() < 1e-9);
        assert_eq!(spec.read(&mut cur).unwrap(), None);
    }

    #[test]
    fn has_clock_rejects_do_not_use() {
        let spec = HAS_TABLE.clock_c0;
        let mut w = BitWriter::new();
        w.put_signed(13, 4095); // most positive: satellite shall not be used
        let bytes = w.into_bytes();
        assert_eq!(spec.read(&mut BitCursor::new(&bytes)).unwrap(), None);
    }

    #[test]
    fn iode_width_depends_on_system() {
        assert_eq!(Dialect::Clas.iode_width(Constellation::Galileo), 10);
        assert_eq!(Dialect::Clas.iode_width(Constellation::Gps), 8);
    }

    #[test]
    fn header_decodes_mask_epoch() {
        let mut w = BitWriter::new();
        w.put(12, u64::from(MSGNUM_CSSR));
        w.put(4, 1); // ST1
        w.put(20, 518_400);
        w.put(4, 2); // interval
        w.put(1, 0);
        w.put(4, 7); // iodssr
        let bytes = w.into_bytes();
        let head = CssrHeader::decode(&mut BitCursor::new(&bytes))
            .unwrap()
            .unwrap();
        assert_eq!(head.subtype, 1);
        assert_eq!(head.epoch, Some(518_400));
        assert_eq!(head.hourly_epoch, None);
        assert_eq!(head.iodssr, 7);
    }

    #[test]
    fn header_rejects_other_message_numbers() {
        let mut w = BitWriter::new();
        w.put(12, 1057);
        w.put(24, 0);
        let bytes = w.into_bytes();
        assert!(CssrHeader::decode(&mut BitCursor::new(&bytes))
            .unwrap()
            .is_none());
    }

    #[test]
    fn signal_names_match_mask_indices() {
        assert_eq!(signal_name(Constellation::Gps, 0), "L1 C/A");
        assert_eq!(signal_name(Constellation::Gps, 7), "L2 L2C(L)");
        assert_eq!(signal_name(Constellation::Gps, 9), "L2 P");
        assert_eq!(signal_name(Constellation::Galileo, 0), "E1 B I/NAV OS/CS/SoL");
        assert_eq!(signal_name(Constellation::Qzss, 1), "L1 L1C(D)");
        assert_eq!(signal_name(Constellation::Gps, 15), "");
    }
}
