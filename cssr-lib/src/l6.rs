//! QZSS L6 transport frames.
//!
//! An L6 frame is 2000 bits: the `1A CF FC 1D` preamble, PRN, a message
//! type id byte naming the broadcasting vendor and facility, a 1-bit
//! alert flag, a 1695-bit data part, and 256 bits of Reed-Solomon parity
//! already consumed by the receiver. Five consecutive frames with the
//! subframe indicator marking the first form one subframe; the Compact
//! SSR decoder in [`crate::cssr`] chains their data parts.

use serde::{Deserialize, Serialize};

use crate::bits::BitCursor;
use crate::prelude::*;

pub const PREAMBLE: [u8; 4] = [0x1a, 0xcf, 0xfc, 0x1d];
/// Full frame length in bytes.
pub const FRAME_LEN: usize = 250;
/// Data part length in bits (after the alert bit).
pub const DATA_PART_BITS: usize = 1695;
/// Data parts per subframe.
pub const PARTS_PER_SUBFRAME: u8 = 5;

/// Broadcasting vendor, from the top bits of the message type id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vendor {
    Madoca,
    MadocaPpp,
    Qznma,
    Clas,
    Unknown(u8),
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vendor::Madoca => f.write_str("MADOCA"),
            Vendor::MadocaPpp => f.write_str("MADOCA-PPP"),
            Vendor::Qznma => f.write_str("QZNMA"),
            Vendor::Clas => f.write_str("CLAS"),
            Vendor::Unknown(id) => write!(f, "unknown (vendor ID 0b{id:03b})"),
        }
    }
}

/// Decoded L6 frame header plus the raw data part.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct L6Frame {
    pub prn: u16,
    pub vendor: Vendor,
    /// Message-generating facility: Kobe or Hitachi-Ota, plus a sub id.
    pub facility_kobe: bool,
    pub facility_sub: u8,
    /// Ionosphere service (vs clock/ephemeris), MADOCA-PPP only.
    pub service_iono: bool,
    /// CNAV message extension (vs LNAV).
    pub msg_ext_cnav: bool,
    pub alert: bool,
    /// First data part of a subframe.
    pub subframe_indicator: bool,
    /// The 212 bytes holding alert bit + 1695-bit data part.
    dpart: Vec<u8>,
}

impl L6Frame {
    /// Decode a 250-byte L6 frame.
    ///
    /// # Errors
    /// [`Error::LengthFail`] on a short buffer; [`Error::SyncLost`] when
    /// the preamble does not match.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < FRAME_LEN - 32 {
            return Err(Error::LengthFail {
                stage: Stage::Framer,
                value: raw.len(),
                prn: None,
                tow: None,
            });
        }
        if raw[..4] != PREAMBLE {
            return Err(Error::SyncLost {
                stage: Stage::Framer,
                skipped: 0,
            });
        }
        let prn = u16::from(raw[4]);
        let mtid = raw[5];
        let vendor = match mtid >> 5 {
            0b001 => Vendor::Madoca,
            0b010 => Vendor::MadocaPpp,
            0b011 => Vendor::Qznma,
            0b101 => Vendor::Clas,
            id => Vendor::Unknown(id),
        };
        Ok(L6Frame {
            prn,
            vendor,
            facility_kobe: (mtid >> 4) & 1 == 1,
            facility_sub: (mtid >> 3) & 1,
            service_iono: (mtid >> 2) & 1 == 1,
            msg_ext_cnav: (mtid >> 1) & 1 == 1,
            alert: raw[6] & 0x80 != 0,
            subframe_indicator: mtid & 1 == 1,
            dpart: raw[6..218].to_vec(),
        })
    }

    /// Facility name as broadcast, e.g. `Hitachi-Ota:1`.
    #[must_use]
    pub fn facility(&self) -> String {
        let name = if self.facility_kobe { "Kobe" } else { "Hitachi-Ota" };
        format!("{name}:{}", self.facility_sub)
    }

    /// Cursor over the 1695-bit data part (alert bit skipped).
    #[must_use]
    pub fn data_part(&self) -> BitCursor<'_> {
        BitCursor::at(&self.dpart, 1)
    }

    /// Copy of the data part packed into bytes, MSB-first.
    #[must_use]
    pub fn data_part_bytes(&self) -> Vec<u8> {
        self.data_part()
            .take_bytes(DATA_PART_BITS)
            .expect("data part length is fixed")
    }
}
