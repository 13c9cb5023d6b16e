//! QZSS L1S sub-meter augmentation and DC report messages.
//!
//! An L1S message is 250 bits: preamble, 6-bit message type, a 212-bit
//! data field, and CRC-24Q over the 6-bit-padded head. The SLAS message
//! types chain through issue numbers: MT48 installs the PRN mask, MT49
//! attaches per-satellite issue numbers, and MT50 DGPS corrections are
//! only valid while both IODP and IODI match.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bits::{BitCursor, BitWriter};
use crate::crc::crc24q;
use crate::prelude::*;

/// Data field length in bits.
const DATA_FIELD_BITS: usize = 212;
/// Satellites covered by the issue-number and correction messages.
pub const CORRECTION_SLOTS: usize = 23;
/// Pseudorange corrections per MT50.
const PRC_SLOTS: usize = 14;

/// Ground monitoring station names by code.
#[must_use]
pub fn station_name(code: u8) -> &'static str {
    match code {
        0 => "Sapporo",
        1 => "Sendai",
        3 => "Hitachiota",
        5 => "Komatsu",
        6 => "Kobe",
        7 => "Hiroshima",
        8 => "Fukuoka",
        9 => "Tanegashima",
        10 => "Amami",
        11 => "Itoman",
        12 => "Miyako",
        13 => "Ishigaki",
        14 => "Chichijima",
        63 => "N/A",
        _ => "undefined",
    }
}

/// Disaster category names for DC reports.
#[must_use]
pub fn disaster_category(code: u8) -> &'static str {
    match code {
        1 => "Earthquake Early Warning",
        2 => "Hypocenter",
        3 => "Seismic Intensity",
        4 => "Nankai Trough Earthquake",
        5 => "Tsunami",
        6 => "Northwest Pacific Tsunami",
        8 => "Volcano",
        9 => "Ash Fall",
        10 => "Weather",
        11 => "Flood",
        12 => "Typhoon",
        14 => "Marine",
        _ => "undefined classification",
    }
}

/// Report classification for DC reports.
#[must_use]
pub fn report_classification(code: u8) -> &'static str {
    match code {
        1 => "MaxPri",
        2 => "Priority",
        3 => "Normal",
        7 => "Test",
        _ => "undefined priority",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStation {
    pub code: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub height: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum L1sBody {
    /// MT43/44 disaster and crisis report.
    DcReport {
        classification: u8,
        category: u8,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        information_type: u8,
    },
    /// MT47 monitoring station locations.
    StationInfo(Vec<MonitoringStation>),
    /// MT48 PRN mask.
    PrnMask { iodp: u8, sats: Vec<String> },
    /// MT49 per-satellite data issue numbers.
    IssueNumbers {
        iodi: u8,
        iodp: u8,
        /// (satellite, issue number, available)
        entries: Vec<(String, u8, bool)>,
    },
    /// MT50 DGPS pseudorange corrections.
    DgpsCorrection {
        station: u8,
        station_healthy: bool,
        /// (satellite, correction in meters)
        entries: Vec<(String, f64)>,
    },
    /// MT51 satellite health.
    SatelliteHealth { unhealthy: Vec<String> },
    /// An MT50/49 whose issue numbers do not match the current mask.
    IssueMismatch { expected: u8, got: u8 },
    Null,
    Other { message_type: u8 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct L1sMessage {
    pub message_type: u8,
    pub crc_ok: bool,
    pub body: L1sBody,
}

/// Stateful L1S decoder; tracks mask and issue numbers across messages.
#[derive(Debug, Default)]
pub struct L1sDecoder {
    iodp: u8,
    iodi: u8,
    mask: Vec<String>,
}

impl L1sDecoder {
    #[must_use]
    pub fn new() -> Self {
        L1sDecoder::default()
    }

    /// Decode one 250-bit message from its 32-byte zero-padded form.
    pub fn decode(&mut self, raw: &[u8]) -> Result<L1sMessage> {
        let mut cur = BitCursor::new(raw);
        let preamble = cur.take(8)? as u8;
        let message_type = cur.take(6)? as u8;
        let data = cur.take_bytes(DATA_FIELD_BITS)?;
        let crc = cur.take(24)? as u32;

        let mut checked = BitWriter::new();
        checked.put(6, 0);
        checked.put(8, u64::from(preamble));
        checked.put(6, u64::from(message_type));
        checked.extend_bits(&data, DATA_FIELD_BITS);
        let crc_ok = crc24q(&checked.into_bytes()) == crc;
        if !crc_ok {
            trace!(message_type, "l1s crc mismatch");
            return Ok(L1sMessage {
                message_type,
                crc_ok,
                body: L1sBody::Other { message_type },
            });
        }

        let mut cur = BitCursor::new(&data);
        let body = match message_type {
            43 | 44 => decode_dc_report(&mut cur)?,
            47 => decode_station_info(&mut cur)?,
            48 => self.decode_prn_mask(&mut cur)?,
            49 => self.decode_issue_numbers(&mut cur)?,
            50 => self.decode_dgps(&mut cur)?,
            51 => decode_satellite_health(&mut cur)?,
            63 => L1sBody::Null,
            other => L1sBody::Other {
                message_type: other,
            },
        };
        Ok(L1sMessage {
            message_type,
            crc_ok,
            body,
        })
    }

    fn decode_prn_mask(&mut self, cur: &mut BitCursor<'_>) -> Result<L1sBody> {
        let iodp = cur.take(2)? as u8;
        let mut sats = Vec::new();
        for (letter, count) in [('G', 64), ('J', 9), ('R', 36), ('E', 36), ('C', 36)] {
            for i in 0..count {
                if cur.take_bool()? {
                    sats.push(format!("{letter}{:02}", i + 1));
                }
            }
        }
        self.iodp = iodp;
        self.mask = sats.clone();
        Ok(L1sBody::PrnMask { iodp, sats })
    }

    fn decode_issue_numbers(&mut self, cur: &mut BitCursor<'_>) -> Result<L1sBody> {
        let iodi = cur.take(2)? as u8;
        let mut available = [false; CORRECTION_SLOTS];
        for slot in available.iter_mut() {
            *slot = cur.take_bool()?;
        }
        let mut iods = [0u8; CORRECTION_SLOTS];
        for slot in iods.iter_mut() {
            *slot = cur.take(8)? as u8;
        }
        let iodp = cur.take(2)? as u8;
        if iodp != self.iodp {
            return Ok(L1sBody::IssueMismatch {
                expected: self.iodp,
                got: iodp,
            });
        }
        self.iodi = iodi;
        let entries = self
            .mask
            .iter()
            .take(CORRECTION_SLOTS)
            .enumerate()
            .map(|(i, sat)| (sat.clone(), iods[i], available[i]))
            .collect();
        Ok(L1sBody::IssueNumbers {
            iodi,
            iodp,
            entries,
        })
    }

    fn decode_dgps(&mut self, cur: &mut BitCursor<'_>) -> Result<L1sBody> {
        let iodp = cur.take(2)? as u8;
        let iodi = cur.take(2)? as u8;
        let station = cur.take(6)? as u8;
        let station_healthy = !cur.take_bool()?;
        let mut selected = [false; CORRECTION_SLOTS];
        for slot in selected.iter_mut() {
            *slot = cur.take_bool()?;
        }
        let mut prc = [0.0f64; PRC_SLOTS];
        for slot in prc.iter_mut() {
            *slot = cur.take_signed(12)? as f64 * 0.04;
        }
        if iodp != self.iodp {
            return Ok(L1sBody::IssueMismatch {
                expected: self.iodp,
                got: iodp,
            });
        }
        if iodi != self.iodi {
            return Ok(L1sBody::IssueMismatch {
                expected: self.iodi,
                got: iodi,
            });
        }
        let mut entries = Vec::new();
        let mut used = 0usize;
        for (i, sat) in self.mask.iter().take(CORRECTION_SLOTS).enumerate() {
            if selected[i] && used < PRC_SLOTS {
                entries.push((sat.clone(), prc[used]));
                used += 1;
            }
        }
        Ok(L1sBody::DgpsCorrection {
            station,
            station_healthy,
            entries,
        })
    }
}

fn decode_dc_report(cur: &mut BitCursor<'_>) -> Result<L1sBody> {
    let classification = cur.take(3)? as u8;
    let category = cur.take(4)? as u8;
    let month = cur.take(4)? as u8;
    let day = cur.take(5)? as u8;
    let hour = cur.take(5)? as u8;
    let minute = cur.take(6)? as u8;
    let information_type = cur.take(2)? as u8;
    cur.skip(171)?; // category-specific data
    let version = cur.take(6)?;
    if version != 1 {
        trace!(version, "dc report version is not 1");
    }
    Ok(L1sBody::DcReport {
        classification,
        category,
        month,
        day,
        hour,
        minute,
        information_type,
    })
}

fn decode_station_info(cur: &mut BitCursor<'_>) -> Result<L1sBody> {
    let mut stations = Vec::new();
    for _ in 0..5 {
        let code = cur.take(6)? as u8;
        let lat = cur.take_signed(15)? as f64 * 0.005;
        let lon = cur.take_signed(15)? as f64 * 0.005 + 115.0;
        let height = cur.take(6)? as i32 * 50 - 100;
        if code == 63 {
            continue;
        }
        stations.push(MonitoringStation {
            code,
            latitude: lat,
            longitude: lon,
            height,
        });
    }
    Ok(L1sBody::StationInfo(stations))
}

fn decode_satellite_health(cur: &mut BitCursor<'_>) -> Result<L1sBody> {
    cur.skip(2)?; // spare
    let mut unhealthy = Vec::new();
    for (letter, count) in [('G', 64), ('J', 9), ('R', 36), ('E', 36), ('C', 36)] {
        for i in 0..count {
            if !cur.take_bool()? {
                unhealthy.push(format!("{letter}{:02}", i + 1));
            }
        }
    }
    Ok(L1sBody::SatelliteHealth { unhealthy })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_zeros(w: &mut BitWriter, mut n: usize) {
        while n > 0 {
            let chunk = n.min(64);
            w.put(chunk, 0);
            n -= chunk;
        }
    }

    /// Build a sealed 32-byte message from a data-field writer.
    fn seal(message_type: u8, df: &BitWriter) -> Vec<u8> {
        let df_bits = df.len();
        assert!(df_bits <= DATA_FIELD_BITS);
        let mut data = BitWriter::new();
        data.extend_bits(&df.clone().into_bytes(), df_bits);
        put_zeros(&mut data, DATA_FIELD_BITS - df_bits);
        let data = data.into_bytes();

        let mut checked = BitWriter::new();
        checked.put(6, 0);
        checked.put(8, 0x53); // preamble
        checked.put(6, u64::from(message_type));
        checked.extend_bits(&data, DATA_FIELD_BITS);
        let crc = crc24q(&checked.into_bytes());

        let mut out = BitWriter::new();
        out.put(8, 0x53);
        out.put(6, u64::from(message_type));
        out.extend_bits(&data, DATA_FIELD_BITS);
        out.put(24, u64::from(crc));
        let mut raw = out.into_bytes();
        raw.resize(32, 0);
        raw
    }

    fn mask_message(iodp: u8) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put(2, u64::from(iodp));
        let mut bits = [0u64; 64 + 9 + 36 + 36 + 36];
        bits[15] = 1; // G16
        bits[21] = 1; // G22
        bits[64] = 1; // J01
        for b in bits {
            w.put(1, b);
        }
        seal(48, &w)
    }

    #[test]
    fn prn_mask_orders_satellites() {
        let mut dec = L1sDecoder::new();
        let msg = dec.decode(&mask_message(2)).unwrap();
        assert!(msg.crc_ok);
        let L1sBody::PrnMask { iodp, sats } = &msg.body else {
            panic!("expected prn mask");
        };
        assert_eq!(*iodp, 2);
        assert_eq!(sats, &["G16", "G22", "J01"]);
    }

    #[test]
    fn dgps_correction_maps_prc_to_masked_sats() {
        let mut dec = L1sDecoder::new();
        dec.decode(&mask_message(2)).unwrap();

        // MT49 installs IODI 1
        let mut w = BitWriter::new();
        w.put(2, 1); // iodi
        for _ in 0..CORRECTION_SLOTS {
            w.put(1, 1);
        }
        for _ in 0..CORRECTION_SLOTS {
            w.put(8, 77);
        }
        w.put(2, 2); // matching iodp
        let msg = dec.decode(&seal(49, &w)).unwrap();
        let L1sBody::IssueNumbers { iodi, entries, .. } = &msg.body else {
            panic!("expected issue numbers");
        };
        assert_eq!(*iodi, 1);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], ("G16".to_string(), 77, true));

        // MT50: corrections for the first and third masked satellites
        let mut w = BitWriter::new();
        w.put(2, 2); // iodp
        w.put(2, 1); // iodi
        w.put(6, 0); // Sapporo
        w.put(1, 0); // healthy
        let mut selected = [0u64; CORRECTION_SLOTS];
        selected[0] = 1;
        selected[2] = 1;
        for b in selected {
            w.put(1, b);
        }
        w.put_signed(12, -77); // -3.08 m
        w.put_signed(12, 25); // 1.00 m
        for _ in 2..PRC_SLOTS {
            w.put_signed(12, 0);
        }
        let msg = dec.decode(&seal(50, &w)).unwrap();
        let L1sBody::DgpsCorrection { station, station_healthy, entries } = &msg.body else {
            panic!("expected dgps correction");
        };
        assert_eq!(station_name(*station), "Sapporo");
        assert!(station_healthy);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "G16");
        assert!((entries[0].1 + 3.08).abs() < 1e-9);
        assert_eq!(entries[1].0, "J01");
        assert!((entries[1].1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn dgps_with_stale_iodp_reports_mismatch() {
        let mut dec = L1sDecoder::new();
        dec.decode(&mask_message(2)).unwrap();

        let mut w = BitWriter::new();
        w.put(2, 3); // wrong iodp
        w.put(2, 0);
        w.put(6, 0);
        w.put(1, 0);
        for _ in 0..CORRECTION_SLOTS {
            w.put(1, 0);
        }
        for _ in 0..PRC_SLOTS {
            w.put_signed(12, 0);
        }
        let msg = dec.decode(&seal(50, &w)).unwrap();
        assert_eq!(
            msg.body,
            L1sBody::IssueMismatch {
                expected: 2,
                got: 3
            }
        );
    }

    #[test]
    fn dc_report_extracts_times() {
        let mut w = BitWriter::new();
        w.put(3, 3); // normal priority
        w.put(4, 10); // weather
        w.put(4, 9);
        w.put(5, 19);
        w.put(5, 11);
        w.put(6, 44);
        w.put(2, 0); // issue
        put_zeros(&mut w, 171);
        w.put(6, 1); // version
        let msg = L1sDecoder::new().decode(&seal(43, &w)).unwrap();
        let L1sBody::DcReport { classification, category, month, day, hour, minute, .. } =
            msg.body
        else {
            panic!("expected dc report");
        };
        assert_eq!(report_classification(classification), "Normal");
        assert_eq!(disaster_category(category), "Weather");
        assert_eq!((month, day, hour, minute), (9, 19, 11, 44));
    }

    #[test]
    fn station_info_skips_empty_slots() {
        let mut w = BitWriter::new();
        // Sapporo at 43.15 N 141.22 E height 50
        w.put(6, 0);
        w.put_signed(15, 8630);
        w.put_signed(15, 5244);
        w.put(6, 3);
        for _ in 0..4 {
            w.put(6, 63);
            w.put_signed(15, 0);
            w.put_signed(15, 0);
            w.put(6, 0);
        }
        let msg = L1sDecoder::new().decode(&seal(47, &w)).unwrap();
        let L1sBody::StationInfo(stations) = &msg.body else {
            panic!("expected station info");
        };
        assert_eq!(stations.len(), 1);
        assert_eq!(station_name(stations[0].code), "Sapporo");
        assert!((stations[0].latitude - 43.15).abs() < 1e-9);
        assert!((stations[0].longitude - 141.22).abs() < 1e-9);
        assert_eq!(stations[0].height, 50);
    }

    #[test]
    fn corrupt_crc_is_flagged() {
        let mut raw = mask_message(0);
        raw[10] ^= 0x01;
        let msg = L1sDecoder::new().decode(&raw).unwrap();
        assert!(!msg.crc_ok);
    }
}
