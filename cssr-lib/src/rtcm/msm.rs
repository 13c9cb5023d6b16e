//! Multiple Signal Message (MSM) observation decoding.
//!
//! MSM payloads are laid out mask-first: a 64-bit satellite mask, a
//! 32-bit signal mask, and an nsat x nsig cell mask select which
//! satellite and cell data blocks follow. Field blocks are grouped by
//! field across satellites, not by satellite.

use serde::{Deserialize, Serialize};

use crate::bits::BitCursor;
use crate::framing::Constellation;
use crate::prelude::*;

const SPEED_OF_LIGHT: f64 = 299_792_458.0;
/// Rough range integer value meaning "no data".
const ROUGH_INVALID: u64 = 255;

/// True for any MSM message number.
#[must_use]
pub fn is_msm(msgnum: u16) -> bool {
    msm_system(msgnum).is_some() && (1..=7).contains(&(msgnum % 10))
}

fn msm_system(msgnum: u16) -> Option<Constellation> {
    Some(match msgnum {
        1071..=1077 => Constellation::Gps,
        1081..=1087 => Constellation::Glonass,
        1091..=1097 => Constellation::Galileo,
        1101..=1107 => Constellation::Sbas,
        1111..=1117 => Constellation::Qzss,
        1121..=1127 => Constellation::BeiDou,
        1131..=1137 => Constellation::Navic,
        _ => return None,
    })
}

/// Per-satellite rough observables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MsmSat {
    /// 1-based satellite mask index.
    pub id: u8,
    /// Rough range in meters, when the level carries it.
    pub rough_range: Option<f64>,
    /// Rough phase range rate in m/s (MSM5/7).
    pub rough_rate: Option<f64>,
}

/// Per-cell observables; `None` marks the wire's no-value sentinels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MsmCell {
    pub sat_id: u8,
    pub signal_id: u8,
    pub pseudorange: Option<f64>,
    pub phase_range: Option<f64>,
    pub lock_time: u16,
    pub half_cycle_ambiguity: bool,
    /// Carrier-to-noise ratio in dB-Hz.
    pub cnr: Option<f64>,
    /// Phase range rate (Doppler equivalent) in m/s (MSM5/7).
    pub phase_rate: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MsmMessage {
    pub number: u16,
    pub system: Constellation,
    /// MSM level 1..=7.
    pub level: u8,
    pub station_id: u16,
    /// GLONASS: day of week; others unused.
    pub day_of_week: Option<u8>,
    /// Epoch time in milliseconds (time of day for GLONASS).
    pub epoch_ms: u32,
    pub sync: bool,
    pub iod: u8,
    pub sats: Vec<MsmSat>,
    pub signals: Vec<u8>,
    pub cells: Vec<MsmCell>,
}

impl MsmMessage {
    /// Satellite names, applying the SBAS PRN offset.
    #[must_use]
    pub fn sat_names(&self) -> Vec<String> {
        self.sats
            .iter()
            .map(|s| {
                if self.system == Constellation::Sbas {
                    format!("S{}", u16::from(s.id) + 119)
                } else {
                    format!("{}{:02}", self.system.letter(), s.id)
                }
            })
            .collect()
    }
}

struct CellLayout {
    rough_int: bool,
    rough_rate: bool,
    fine_pr: Option<(usize, f64)>,
    fine_phase: Option<(usize, f64)>,
    lock: usize,
    cnr: Option<(usize, f64)>,
    fine_rate: bool,
}

fn layout(level: u8) -> CellLayout {
    // fine scales are in milliseconds of range
    let ms = SPEED_OF_LIGHT / 1000.0;
    match level {
        1 => CellLayout {
            rough_int: false,
            rough_rate: false,
            fine_pr: Some((15, ms / f64::from(1 << 24))),
            fine_phase: None,
            lock: 0,
            cnr: None,
            fine_rate: false,
        },
        2 => CellLayout {
            rough_int: false,
            rough_rate: false,
            fine_pr: None,
            fine_phase: Some((22, ms / f64::from(1 << 29))),
            lock: 4,
            cnr: None,
            fine_rate: false,
        },
        3 => CellLayout {
            rough_int: false,
            rough_rate: false,
            fine_pr: Some((15, ms / f64::from(1 << 24))),
            fine_phase: Some((22, ms / f64::from(1 << 29))),
            lock: 4,
            cnr: None,
            fine_rate: false,
        },
        4 => CellLayout {
            rough_int: true,
            rough_rate: false,
            fine_pr: Some((15, ms / f64::from(1 << 24))),
            fine_phase: Some((22, ms / f64::from(1 << 29))),
            lock: 4,
            cnr: Some((6, 1.0)),
            fine_rate: false,
        },
        5 => CellLayout {
            rough_int: true,
            rough_rate: true,
            fine_pr: Some((15, ms / f64::from(1 << 24))),
            fine_phase: Some((22, ms / f64::from(1 << 29))),
            lock: 4,
            cnr: Some((6, 1.0)),
            fine_rate: true,
        },
        6 => CellLayout {
            rough_int: true,
            rough_rate: false,
            fine_pr: Some((20, ms / f64::from(1 << 29))),
            fine_phase: Some((24, ms * (2f64).powi(-31))),
            lock: 10,
            cnr: Some((10, 0.0625)),
            fine_rate: false,
        },
        _ => CellLayout {
            rough_int: true,
            rough_rate: true,
            fine_pr: Some((20, ms / f64::from(1 << 29))),
            fine_phase: Some((24, ms * (2f64).powi(-31))),
            lock: 10,
            cnr: Some((10, 0.0625)),
            fine_rate: true,
        },
    }
}

fn read_fine(cur: &mut BitCursor<'_>, width: usize, scale: f64) -> Result<Option<f64>> {
    let raw = cur.take_signed(width)?;
    if raw == -(1_i64 << (width - 1)) {
        return Ok(None);
    }
    Ok(Some(raw as f64 * scale))
}

/// Decode an MSM payload; the cursor sits just past the message number.
pub fn decode_msm(msgnum: u16, cur: &mut BitCursor<'_>) -> Result<MsmMessage> {
    let system = msm_system(msgnum).ok_or(Error::UnknownSubtype {
        subtype: (msgnum % 256) as u8,
    })?;
    let level = (msgnum % 10) as u8;
    let station_id = cur.take(12)? as u16;
    let (day_of_week, epoch_ms) = if system == Constellation::Glonass {
        let dow = cur.take(3)? as u8;
        (Some(dow), cur.take(27)? as u32)
    } else {
        (None, cur.take(30)? as u32)
    };
    let sync = cur.take_bool()?;
    let iod = cur.take(3)? as u8;
    cur.skip(7)?; // cumulative session transmit time
    cur.skip(2 + 2 + 1 + 3)?; // clock steering, ext clock, smoothing

    let mut sat_ids = Vec::new();
    for i in 0..64u8 {
        if cur.take_bool()? {
            sat_ids.push(i + 1);
        }
    }
    let mut signals = Vec::new();
    for i in 0..32u8 {
        if cur.take_bool()? {
            signals.push(i + 1);
        }
    }
    let mut cell_mask = Vec::with_capacity(sat_ids.len() * signals.len());
    for _ in 0..sat_ids.len() * signals.len() {
        cell_mask.push(cur.take_bool()?);
    }

    let layout = layout(level);
    let nsat = sat_ids.len();

    // satellite blocks are field-major
    let mut rough_int = vec![None; nsat];
    if layout.rough_int {
        for slot in rough_int.iter_mut() {
            let v = cur.take(8)?;
            if v != ROUGH_INVALID {
                *slot = Some(v);
            }
        }
        if layout.rough_rate {
            cur.skip(4 * nsat)?; // extended satellite info
        }
    }
    let mut rough_mod = vec![0u64; nsat];
    for slot in rough_mod.iter_mut() {
        *slot = cur.take(10)?;
    }
    let mut rough_rate = vec![None; nsat];
    if layout.rough_rate {
        for slot in rough_rate.iter_mut() {
            let v = cur.take_signed(14)?;
            if v != -8192 {
                *slot = Some(v as f64);
            }
        }
    }

    let sats: Vec<MsmSat> = sat_ids
        .iter()
        .enumerate()
        .map(|(i, &id)| MsmSat {
            id,
            rough_range: rough_int[i].map(|int| {
                (int as f64 + rough_mod[i] as f64 / 1024.0) * SPEED_OF_LIGHT / 1000.0
            }),
            rough_rate: rough_rate[i],
        })
        .collect();

    // cell blocks, also field-major over the active cells
    let active: Vec<(usize, u8)> = cell_mask
        .iter()
        .enumerate()
        .filter(|(_, &on)| on)
        .map(|(idx, _)| (idx / signals.len(), signals[idx % signals.len()]))
        .collect();
    let ncell = active.len();

    let mut fine_pr = vec![None; ncell];
    if let Some((width, scale)) = layout.fine_pr {
        for slot in fine_pr.iter_mut() {
            *slot = read_fine(cur, width, scale)?;
        }
    }
    let mut fine_phase = vec![None; ncell];
    if let Some((width, scale)) = layout.fine_phase {
        for slot in fine_phase.iter_mut() {
            *slot = read_fine(cur, width, scale)?;
        }
    }
    let mut lock = vec![0u16; ncell];
    if layout.lock > 0 {
        for slot in lock.iter_mut() {
            *slot = cur.take(layout.lock)? as u16;
        }
        // half-cycle ambiguity indicators
    }
    let mut half = vec![false; ncell];
    if layout.fine_phase.is_some() {
        for slot in half.iter_mut() {
            *slot = cur.take_bool()?;
        }
    }
    let mut cnr = vec![None; ncell];
    if let Some((width, scale)) = layout.cnr {
        for slot in cnr.iter_mut() {
            let v = cur.take(width)?;
            if v != 0 {
                *slot = Some(v as f64 * scale);
            }
        }
    }
    let mut fine_rate = vec![None; ncell];
    if layout.fine_rate {
        for slot in fine_rate.iter_mut() {
            *slot = read_fine(cur, 15, 0.0001)?;
        }
    }

    let cells = active
        .iter()
        .enumerate()
        .map(|(c, &(sat_idx, signal_id))| MsmCell {
            sat_id: sat_ids[sat_idx],
            signal_id,
            pseudorange: match (sats[sat_idx].rough_range, fine_pr[c]) {
                (Some(rough), Some(fine)) => Some(rough + fine),
                _ => None,
            },
            phase_range: match (sats[sat_idx].rough_range, fine_phase[c]) {
                (Some(rough), Some(fine)) => Some(rough + fine),
                _ => None,
            },
            lock_time: lock[c],
            half_cycle_ambiguity: half[c],
            cnr: cnr[c],
            phase_rate: match (sats[sat_idx].rough_rate, fine_rate[c]) {
                (Some(rough), Some(fine)) => Some(rough + fine),
                _ => None,
            },
        })
        .collect();

    Ok(MsmMessage {
        number: msgnum,
        system,
        level,
        station_id,
        day_of_week,
        epoch_ms,
        sync,
        iod,
        sats,
        signals,
        cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    fn write_msm7_header(w: &mut BitWriter, sats: &[u8], signals: &[u8], cells: &[bool]) {
        w.put(12, 0); // station id
        w.put(3, 4); // GLONASS day of week
        w.put(27, 41_400_000); // time of day ms
        w.put(1, 0); // sync
        w.put(3, 2); // iod
        w.put(7, 0);
        w.put(2 + 2 + 1 + 3, 0);
        let mut sat_bits = [0u64; 64];
        for &s in sats {
            sat_bits[usize::from(s) - 1] = 1;
        }
        for b in sat_bits {
            w.put(1, b);
        }
        let mut sig_bits = [0u64; 32];
        for &s in signals {
            sig_bits[usize::from(s) - 1] = 1;
        }
        for b in sig_bits {
            w.put(1, b);
        }
        for &c in cells {
            w.put(1, u64::from(c));
        }
    }

    #[test]
    fn msm7_decodes_masks_and_cells() {
        let mut w = BitWriter::new();
        // two satellites, one signal, both cells active
        write_msm7_header(&mut w, &[1, 11], &[2], &[true, true]);
        // satellite data: rough int, extended info, rough mod, rough rate
        w.put(8, 80);
        w.put(8, 81);
        w.put(4, 0);
        w.put(4, 0);
        w.put(10, 512);
        w.put(10, 0);
        w.put_signed(14, -100);
        w.put_signed(14, 200);
        // cell data: fine pr, fine phase, lock, half, cnr, fine rate
        w.put_signed(20, 1000);
        w.put_signed(20, -(1 << 19)); // invalid
        w.put_signed(24, 2000);
        w.put_signed(24, -2000);
        w.put(10, 100);
        w.put(10, 200);
        w.put(1, 1);
        w.put(1, 0);
        w.put(10, 45 * 16);
        w.put(10, 0); // cnr 0 means no value
        w.put_signed(15, 50);
        w.put_signed(15, -50);

        let bytes = w.into_bytes();
        let msg = decode_msm(1087, &mut BitCursor::new(&bytes)).unwrap();

        assert_eq!(msg.system, Constellation::Glonass);
        assert_eq!(msg.level, 7);
        assert_eq!(msg.day_of_week, Some(4));
        assert_eq!(msg.sat_names(), vec!["R01", "R11"]);
        assert_eq!(msg.cells.len(), 2);

        let c = SPEED_OF_LIGHT / 1000.0;
        let rough0 = (80.0 + 0.5) * c;
        let want_pr = rough0 + 1000.0 * c / f64::from(1 << 29);
        assert!((msg.cells[0].pseudorange.unwrap() - want_pr).abs() < 1e-6);
        assert_eq!(msg.cells[1].pseudorange, None); // fine value was invalid
        assert!(msg.cells[0].half_cycle_ambiguity);
        assert!((msg.cells[0].cnr.unwrap() - 45.0).abs() < 1e-9);
        assert_eq!(msg.cells[1].cnr, None);
        assert!((msg.cells[0].phase_rate.unwrap() - (-100.0 + 0.005)).abs() < 1e-9);
    }

    #[test]
    fn msm4_omits_rate_fields() {
        let mut w = BitWriter::new();
        w.put(12, 7); // station id
        w.put(30, 1000); // tow ms
        w.put(1, 0);
        w.put(3, 0);
        w.put(7, 0);
        w.put(8, 0);
        let mut sat_bits = [0u64; 64];
        sat_bits[15] = 1; // G16
        for b in sat_bits {
            w.put(1, b);
        }
        let mut sig_bits = [0u64; 32];
        sig_bits[1] = 1;
        for b in sig_bits {
            w.put(1, b);
        }
        w.put(1, 1); // single active cell
        w.put(8, 70); // rough int
        w.put(10, 0); // rough mod
        w.put_signed(15, 0); // fine pr
        w.put_signed(22, 0); // fine phase
        w.put(4, 3); // lock
        w.put(1, 0);
        w.put(6, 40); // cnr

        let bytes = w.into_bytes();
        let msg = decode_msm(1074, &mut BitCursor::new(&bytes)).unwrap();
        assert_eq!(msg.sat_names(), vec!["G16"]);
        assert_eq!(msg.cells.len(), 1);
        assert_eq!(msg.cells[0].cnr, Some(40.0));
        assert_eq!(msg.cells[0].phase_rate, None);
        let want = 70.0 * SPEED_OF_LIGHT / 1000.0;
        assert!((msg.cells[0].pseudorange.unwrap() - want).abs() < 1e-6);
    }

    #[test]
    fn sbas_names_use_prn_offset() {
        let mut w = BitWriter::new();
        w.put(12, 0);
        w.put(30, 0);
        w.put(1 + 3 + 7 + 8, 0);
        let mut sat_bits = [0u64; 64];
        sat_bits[0] = 1; // S120
        for b in sat_bits {
            w.put(1, b);
        }
        for _ in 0..32 {
            w.put(1, 0);
        }
        w.put(10, 0); // rough range modulo for the one satellite
        let bytes = w.into_bytes();
        let msg = decode_msm(1101, &mut BitCursor::new(&bytes)).unwrap();
        assert_eq!(msg.sat_names(), vec!["S120"]);
    }

    #[test]
    fn is_msm_covers_ranges() {
        assert!(is_msm(1074));
        assert!(is_msm(1087));
        assert!(is_msm(1137));
        assert!(!is_msm(1070));
        assert!(!is_msm(1078));
        assert!(!is_msm(1057));
    }
}
