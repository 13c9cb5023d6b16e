//! Vendor-specific framed-stream demultiplexers.
//!
//! Each framer turns a receiver byte stream into a lazy sequence of
//! per-satellite payload frames. Framing failures are yielded as tagged
//! errors and the stream continues; a framer never panics on malformed
//! input and re-synchronizes byte-by-byte after a bad frame.

pub(crate) mod bytes;

pub mod allystar;
pub mod novatel;
pub mod pocketsdr;
pub mod raw;
pub mod septentrio;
pub mod ublox;

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::time::GpsTime;
use crate::Result;

/// Which framing a byte stream uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Framing {
    Allystar,
    Ublox,
    Novatel,
    Septentrio,
    PocketSdr,
    /// Bare 250-byte L6 frames.
    RawL6,
    /// {PRN, 62-byte page} HAS records.
    RawHasPages,
    /// {PRN, 32-byte message} L1S records.
    RawL1s,
    /// {PRN, 62-byte data field} B2b records.
    RawB2b,
}

/// Open a framer of the given kind over a byte stream.
///
/// Each vendor framer is also available directly (e.g.
/// [`allystar::AllystarFrames`]) when static dispatch is preferred.
pub fn frame<'a, R>(reader: R, kind: Framing) -> Box<dyn Iterator<Item = Result<SatFrame>> + 'a>
where
    R: Read + 'a,
{
    match kind {
        Framing::Allystar => Box::new(allystar::AllystarFrames::new(reader)),
        Framing::Ublox => Box::new(ublox::UbxFrames::new(reader)),
        Framing::Novatel => Box::new(novatel::NovFrames::new(reader)),
        Framing::Septentrio => Box::new(septentrio::SbfFrames::new(reader)),
        Framing::PocketSdr => Box::new(pocketsdr::PsdrLines::new(reader)),
        Framing::RawL6 => Box::new(raw::RawL6Frames::new(reader)),
        Framing::RawHasPages => Box::new(raw::HasPageRecords::new(reader)),
        Framing::RawL1s => Box::new(raw::L1sRecords::new(reader)),
        Framing::RawB2b => Box::new(raw::B2bRecords::new(reader)),
    }
}

/// Satellite constellation, keyed by how a PRN should be displayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Constellation {
    Gps,
    Glonass,
    Galileo,
    BeiDou,
    Qzss,
    Sbas,
    Navic,
}

impl Constellation {
    /// One-letter satellite system prefix used throughout GNSS tooling.
    #[must_use]
    pub fn letter(&self) -> char {
        match self {
            Constellation::Gps => 'G',
            Constellation::Glonass => 'R',
            Constellation::Galileo => 'E',
            Constellation::BeiDou => 'C',
            Constellation::Qzss => 'J',
            Constellation::Sbas => 'S',
            Constellation::Navic => 'I',
        }
    }
}

/// Which signal the payload bytes came from; fixes the payload length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    /// QZSS L6D/L6E, 250-byte frame (Allystar carries 252 with trailing pad).
    L6,
    /// Galileo E6B HAS C/NAV page, 492 bits in 62 bytes.
    E6b,
    /// Galileo E1B I/NAV page.
    INav,
    /// QZSS L1S / SBAS, 250 bits in 32 bytes.
    L1s,
    /// BeiDou B2b, 486 bits in 62 bytes.
    B2b,
    /// QZSS LNAV subframe (300 bits in 32 bytes as receivers pad it).
    QzssLnav,
}

/// Error bitmap attached to a frame; causes are distinguishable so a
/// downstream stage can decide what still is usable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameFlags {
    pub checksum: bool,
    pub payload_len: bool,
    pub data_len: bool,
    pub reed_solomon: bool,
    pub week: bool,
    pub tow: bool,
}

impl FrameFlags {
    #[must_use]
    pub fn ok(&self) -> bool {
        *self == FrameFlags::default()
    }
}

impl std::fmt::Display for FrameFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (set, name) in [
            (self.checksum, "CS "),
            (self.payload_len, "Payload "),
            (self.data_len, "Data "),
            (self.reed_solomon, "RS "),
            (self.week, "Week "),
            (self.tow, "TOW "),
        ] {
            if set {
                f.write_str(name)?;
            }
        }
        Ok(())
    }
}

/// A single per-satellite payload frame extracted by a framer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SatFrame {
    pub constellation: Constellation,
    pub prn: u16,
    pub signal: Signal,
    /// Receive epoch, when the vendor framing carries one.
    pub time: Option<GpsTime>,
    /// Raw time of week in milliseconds, for tick bookkeeping.
    pub tow_ms: Option<u32>,
    /// Carrier-to-noise ratio in dB-Hz.
    pub cno: Option<f64>,
    pub flags: FrameFlags,
    pub payload: Vec<u8>,
}

impl SatFrame {
    /// Satellite name in the usual `G01` / `E12` / `J199`-style notation.
    #[must_use]
    pub fn sat_name(&self) -> String {
        format!("{}{:02}", self.constellation.letter(), self.prn)
    }
}
