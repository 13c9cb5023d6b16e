//! Mask subtype decoding and the stateful mask context.
//!
//! The mask is an ordered list of (satellite, signals) pairs; downstream
//! subtypes are dense arrays indexed by this ordering, so the ordering
//! must be preserved exactly as decoded.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{constellation_from_gnss_id, signal_name, Dialect};
use crate::bits::BitCursor;
use crate::framing::Constellation;
use crate::prelude::*;

/// A satellite named by its mask position, e.g. `G01` or `E12`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SatId {
    pub system: Constellation,
    pub number: u8,
}

impl std::fmt::Display for SatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{:02}", self.system.letter(), self.number)
    }
}

/// Per-GNSS section of a mask.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GnssMask {
    pub system: Constellation,
    /// 1-based satellite numbers, in mask-bit order.
    pub sats: Vec<u8>,
    /// Signal-mask bit indices, in mask-bit order.
    pub signals: Vec<u8>,
    /// Row-major (satellite, signal) availability; all true when the
    /// cell-mask option is off.
    pub cell_mask: Vec<bool>,
}

impl GnssMask {
    #[must_use]
    pub fn sat_ids(&self) -> impl Iterator<Item = SatId> + '_ {
        self.sats.iter().map(|&number| SatId {
            system: self.system,
            number,
        })
    }

    #[must_use]
    pub fn signal_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.signals.iter().map(|&i| signal_name(self.system, i))
    }
}

/// A decoded mask: the satellite/signal sets one IODSSR epoch refers to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    pub iodssr: u8,
    pub systems: Vec<GnssMask>,
}

impl Mask {
    /// Decode the mask body (after the CSSR header) for `dialect`.
    ///
    /// The HAS variant appends a 3-bit nav-message indicator per GNSS and
    /// 6 reserved bits after the sections.
    pub fn decode(cur: &mut BitCursor<'_>, dialect: Dialect, iodssr: u8) -> Result<Self> {
        let ngnss = cur.take(4)? as usize;
        let mut systems = Vec::with_capacity(ngnss);
        for _ in 0..ngnss {
            let gnss_id = cur.take(4)? as u8;
            let mut sats = Vec::new();
            for i in 0..40u8 {
                if cur.take_bool()? {
                    sats.push(i + 1);
                }
            }
            let mut signals = Vec::new();
            for i in 0..16u8 {
                if cur.take_bool()? {
                    signals.push(i);
                }
            }
            let ncell = sats.len() * signals.len();
            let cell_mask = if cur.take_bool()? {
                let mut cells = Vec::with_capacity(ncell);
                for _ in 0..ncell {
                    cells.push(cur.take_bool()?);
                }
                cells
            } else {
                vec![true; ncell]
            };
            if dialect == Dialect::Has {
                let nm = cur.take(3)?;
                if nm != 0 {
                    debug!(nm, "HAS nav message indicator is not zero");
                }
            }
            let Some(system) = constellation_from_gnss_id(gnss_id) else {
                return Err(Error::UnknownSubtype { subtype: gnss_id });
            };
            systems.push(GnssMask {
                system,
                sats,
                signals,
                cell_mask,
            });
        }
        if dialect == Dialect::Has {
            cur.skip(6)?; // reserved
        }
        Ok(Mask { iodssr, systems })
    }

    /// Total number of masked satellites.
    #[must_use]
    pub fn n_sat(&self) -> usize {
        self.systems.iter().map(|s| s.sats.len()).sum()
    }

    /// Total number of active (satellite, signal) cells.
    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.systems
            .iter()
            .map(|s| s.cell_mask.iter().filter(|&&c| c).count())
            .sum()
    }

    /// Number of masked signals summed over active cells per satellite,
    /// i.e. the signal count the statistics report.
    #[must_use]
    pub fn n_sig(&self) -> usize {
        self.n_cells()
    }
}

/// Mask table owned by a decoder; one active mask per (PRN, dialect) key.
///
/// Replacement is monotonic within an IODSSR epoch: only a mask subtype
/// installs or replaces an entry, and a non-mask subtype with a different
/// IODSSR never mutates the table.
#[derive(Debug, Default)]
pub struct MaskContext {
    table: HashMap<(u16, Dialect), Mask>,
}

impl MaskContext {
    #[must_use]
    pub fn new() -> Self {
        MaskContext::default()
    }

    pub fn install(&mut self, prn: u16, dialect: Dialect, mask: Mask) {
        self.table.insert((prn, dialect), mask);
    }

    #[must_use]
    pub fn active(&self, prn: u16, dialect: Dialect) -> Option<&Mask> {
        self.table.get(&(prn, dialect))
    }

    /// Look up the active mask and check a message's IODSSR against it.
    pub fn matching(&self, prn: u16, dialect: Dialect, iodssr: u8) -> Result<&Mask> {
        let mask = self
            .active(prn, dialect)
            .ok_or(Error::MaskAbsent)?;
        if mask.iodssr != iodssr {
            return Err(Error::IodssrMismatch {
                active: mask.iodssr,
                msg: iodssr,
            });
        }
        Ok(mask)
    }
}
