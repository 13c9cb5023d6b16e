//! Galileo High Accuracy Service (HAS) message reassembly and decoding.
//!
//! HAS messages are spread over up to 32 pages of 53 bytes, Reed-Solomon
//! coded so that any MS distinct pages recover the message (see
//! [`crate::gf256`]). Pages for the same message id arrive from several
//! satellites; groups are kept per MID, retain the first-seen message
//! size, and are discarded on successful decode or when a conflicting
//! size appears.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bits::BitCursor;
use crate::cssr::{
    for_each_cell, ClockEntry, CodeBiasEntry, Dialect, Mask, MaskContext, OrbitEntry,
    PhaseBiasEntry,
};
use crate::gf256::{self, PAGE_BYTES};
use crate::prelude::*;

/// Validity interval in seconds per encoded index (0 = unlimited slot).
pub const VALIDITY_INTERVAL: [u16; 16] = [
    5, 10, 15, 20, 30, 60, 90, 120, 180, 240, 300, 600, 900, 1800, 3600, 0,
];

/// 24-bit header pattern marking a dummy page.
const DUMMY_HEADER: u32 = 0xaf3bc3;
/// Offset of the page header within the 62-byte C/NAV page.
const HEADER_OFFSET_BITS: usize = 14;
/// Encoded page body bits.
const BODY_BITS: usize = 424;

/// One HAS page as carried on E6B.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HasPage {
    pub prn: u16,
    pub mid: u8,
    /// Message size in pages, 1..=32.
    pub ms: u8,
    /// Page id, 1-based symbol-column index.
    pub pid: u8,
    pub body: Vec<u8>,
}

impl HasPage {
    /// Parse a 62-byte C/NAV page. Returns `None` for dummy pages and
    /// non-MT1 message types.
    pub fn decode(prn: u16, raw: &[u8]) -> Result<Option<Self>> {
        if raw.len() < 62 {
            return Err(Error::LengthFail {
                stage: Stage::Framer,
                value: raw.len(),
                prn: Some(prn),
                tow: None,
            });
        }
        let mut cur = BitCursor::at(raw, HEADER_OFFSET_BITS);
        let header = cur.peek(24)? as u32;
        if header == DUMMY_HEADER {
            trace!(prn, "dummy has page");
            return Ok(None);
        }
        let _status = cur.take(2)?;
        cur.skip(2)?; // reserved
        let mtype = cur.take(2)?;
        if mtype != 1 {
            debug!(prn, mtype, "unsupported has message type");
            return Ok(None);
        }
        let mid = cur.take(5)? as u8;
        let ms = cur.take(5)? as u8 + 1;
        let pid = cur.take(8)? as u8;
        if pid == 0 {
            return Err(Error::LengthFail {
                stage: Stage::Reassembler,
                value: 0,
                prn: Some(prn),
                tow: None,
            });
        }
        let body = cur.take_bytes(BODY_BITS)?;
        Ok(Some(HasPage {
            prn,
            mid,
            ms,
            pid,
            body,
        }))
    }
}

/// One decoded HAS MT1 message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HasMessage {
    pub mid: u8,
    pub ms: u8,
    /// Time of hour in seconds.
    pub toh: u16,
    pub mask_id: u8,
    pub iod_set: u8,
    pub mask: Option<Mask>,
    pub orbit_validity: Option<u16>,
    pub orbits: Vec<OrbitEntry>,
    pub clock_validity: Option<u16>,
    /// Full-set clock corrections, multiplier already applied.
    pub clocks: Vec<ClockEntry>,
    pub subset_clocks: Vec<ClockEntry>,
    pub code_bias_validity: Option<u16>,
    pub code_biases: Vec<CodeBiasEntry>,
    pub phase_bias_validity: Option<u16>,
    /// Phase biases in cycles.
    pub phase_biases: Vec<PhaseBiasEntry>,
}

/// Collects pages per message id and decodes complete messages.
///
/// HAS broadcast groups share one message set across satellites, so the
/// grouping key is the MID alone; the mask context is shared the same
/// way.
#[derive(Debug, Default)]
pub struct HasDecoder {
    groups: HashMap<u8, PageGroup>,
    masks: MaskContext,
}

#[derive(Debug)]
struct PageGroup {
    ms: u8,
    pages: Vec<(u8, [u8; PAGE_BYTES])>,
}

impl HasDecoder {
    #[must_use]
    pub fn new() -> Self {
        HasDecoder::default()
    }

    /// Number of live page groups (bounded by the 31 possible MIDs).
    #[must_use]
    pub fn live_groups(&self) -> usize {
        self.groups.len()
    }

    /// Offer one page; returns a decoded message once MS distinct pages
    /// for its MID have been gathered.
    pub fn push_page(&mut self, page: &HasPage) -> Result<Option<HasMessage>> {
        let group = self.groups.entry(page.mid).or_insert_with(|| PageGroup {
            ms: page.ms,
            pages: Vec::new(),
        });
        if group.ms != page.ms {
            let kept = group.ms;
            // a new size replaces the group wholesale
            *group = PageGroup {
                ms: page.ms,
                pages: Vec::new(),
            };
            group.pages.push((page.pid, page_body(page)?));
            return Err(Error::MsMismatch {
                mid: page.mid,
                kept,
                got: page.ms,
            });
        }
        if group.pages.iter().any(|&(pid, _)| pid == page.pid) {
            return Ok(None);
        }
        group.pages.push((page.pid, page_body(page)?));
        if group.pages.len() < usize::from(group.ms) {
            return Ok(None);
        }

        let group = self.groups.remove(&page.mid).expect("inserted above");
        let cleartext = gf256::erasure_decode(&group.pages, usize::from(group.ms))?;
        trace!(mid = page.mid, ms = group.ms, "has message complete");
        let message = self.decode_message(page.mid, group.ms, &cleartext)?;
        Ok(Some(message))
    }

    fn decode_message(&mut self, mid: u8, ms: u8, cleartext: &[u8]) -> Result<HasMessage> {
        let mut cur = BitCursor::new(cleartext);
        let mut msg = HasMessage {
            mid,
            ms,
            toh: cur.take(12)? as u16,
            ..HasMessage::default()
        };
        let f_mask = cur.take_bool()?;
        let f_orbit = cur.take_bool()?;
        let f_ckful = cur.take_bool()?;
        let f_cksub = cur.take_bool()?;
        let f_cbias = cur.take_bool()?;
        let f_pbias = cur.take_bool()?;
        msg.mask_id = cur.take(5)? as u8;
        msg.iod_set = cur.take(5)? as u8;
        cur.skip(4)?; // reserved

        let table = Dialect::Has.field_table();
        if f_mask {
            let mask = Mask::decode(&mut cur, Dialect::Has, msg.iod_set)?;
            self.masks.install(0, Dialect::Has, mask.clone());
            msg.mask = Some(mask);
        }
        let mask = self.masks.matching(0, Dialect::Has, msg.iod_set)?.clone();

        if f_orbit {
            msg.orbit_validity = Some(validity(cur.take(4)?));
            for section in &mask.systems {
                let w_iode = Dialect::Has.iode_width(section.system);
                for sat in section.sat_ids() {
                    msg.orbits.push(OrbitEntry {
                        sat,
                        iode: cur.take(w_iode)? as u16,
                        radial: table.orbit_radial.read(&mut cur)?,
                        along: table.orbit_along.read(&mut cur)?,
                        cross: table.orbit_cross.read(&mut cur)?,
                    });
                }
            }
        }

        if f_ckful {
            msg.clock_validity = Some(validity(cur.take(4)?));
            let mut multipliers = Vec::with_capacity(mask.systems.len());
            for _ in &mask.systems {
                multipliers.push(cur.take(2)? as f64 + 1.0);
            }
            for (section, mult) in mask.systems.iter().zip(multipliers) {
                for sat in section.sat_ids() {
                    let c0 = table.clock_c0.read(&mut cur)?;
                    msg.clocks.push(ClockEntry {
                        sat,
                        c0: c0.map(|v| v * mult),
                    });
                }
            }
        }

        if f_cksub {
            let n_sub = cur.take(4)? as usize;
            for _ in 0..n_sub {
                let gnss_id = cur.take(4)? as u8;
                let mult = cur.take(2)? as f64 + 1.0;
                let section = mask
                    .systems
                    .iter()
                    .find(|s| gnss_matches(s.system, gnss_id))
                    .ok_or(Error::UnknownSubtype { subtype: gnss_id })?;
                for sat in section.sat_ids() {
                    let c0 = table.clock_c0.read(&mut cur)?;
                    msg.subset_clocks.push(ClockEntry {
                        sat,
                        c0: c0.map(|v| v * mult),
                    });
                }
            }
        }

        if f_cbias {
            msg.code_bias_validity = Some(validity(cur.take(4)?));
            for_each_cell(&mask, |sat, signal| {
                msg.code_biases.push(CodeBiasEntry {
                    sat,
                    signal: signal.to_string(),
                    bias: table.code_bias.read(&mut cur)?,
                });
                Ok(())
            })?;
        }

        if f_pbias {
            msg.phase_bias_validity = Some(validity(cur.take(4)?));
            for_each_cell(&mask, |sat, signal| {
                let bias = table.phase_bias.read(&mut cur)?;
                let discontinuity = cur.take(2)? as u8;
                msg.phase_biases.push(PhaseBiasEntry {
                    sat,
                    signal: signal.to_string(),
                    bias,
                    discontinuity,
                });
                Ok(())
            })?;
        }

        Ok(msg)
    }
}

fn page_body(page: &HasPage) -> Result<[u8; PAGE_BYTES]> {
    let mut body = [0u8; PAGE_BYTES];
    if page.body.len() != PAGE_BYTES {
        return Err(Error::LengthFail {
            stage: Stage::Reassembler,
            value: page.body.len(),
            prn: Some(page.prn),
            tow: None,
        });
    }
    body.copy_from_slice(&page.body);
    Ok(body)
}

fn validity(index: u64) -> u16 {
    VALIDITY_INTERVAL[index as usize & 0xf]
}

fn gnss_matches(system: crate::framing::Constellation, gnss_id: u8) -> bool {
    crate::cssr::constellation_from_gnss_id(gnss_id) == Some(system)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    /// Build the cleartext of a MT1 message with mask + orbit blocks for
    /// one GPS satellite, padded to `ms` pages.
    fn build_mask_orbit_cleartext(ms: usize) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.put(12, 2250); // toh
        w.put(1, 1); // mask
        w.put(1, 1); // orbit
        w.put(1, 0);
        w.put(1, 0);
        w.put(1, 0);
        w.put(1, 0);
        w.put(5, 3); // mask id
        w.put(5, 9); // iod set
        w.put(4, 0); // reserved

        // mask: one GNSS (GPS), satellite 1, signals 0 and 7
        w.put(4, 1);
        w.put(4, 0);
        let mut sat_bits = [0u64; 40];
        sat_bits[0] = 1;
        for b in sat_bits {
            w.put(1, b);
        }
        let mut sig_bits = [0u64; 16];
        sig_bits[0] = 1;
        sig_bits[7] = 1;
        for b in sig_bits {
            w.put(1, b);
        }
        w.put(1, 0); // no cell mask
        w.put(3, 0); // nav message
        w.put(6, 0); // reserved

        // orbit block: validity index 6 (90 s), IODE 82, deltas
        w.put(4, 6);
        w.put(8, 82);
        w.put_signed(13, 434); // 1.0850 m
        w.put_signed(12, -406); // -3.2480 m
        w.put_signed(12, 98); // 0.7840 m

        let mut bytes = w.into_bytes();
        bytes.resize(ms * PAGE_BYTES, 0);
        bytes
    }

    fn pages_for(cleartext: &[u8], ms: usize, mid: u8) -> Vec<HasPage> {
        gf256::encode_pages(cleartext, ms)
            .into_iter()
            .map(|(pid, body)| HasPage {
                prn: 12,
                mid,
                ms: ms as u8,
                pid,
                body: body.to_vec(),
            })
            .collect()
    }

    #[test]
    fn page_header_parses() {
        let mut w = BitWriter::new();
        w.put(HEADER_OFFSET_BITS, 0);
        w.put(2, 1); // status
        w.put(2, 0);
        w.put(2, 1); // mt1
        w.put(5, 17); // mid
        w.put(5, 10); // ms - 1
        w.put(8, 3); // pid
        let mut raw = w.into_bytes();
        raw.resize(62, 0);

        let page = HasPage::decode(7, &raw).unwrap().unwrap();
        assert_eq!(page.mid, 17);
        assert_eq!(page.ms, 11);
        assert_eq!(page.pid, 3);
        assert_eq!(page.body.len(), PAGE_BYTES);
    }

    #[test]
    fn dummy_pages_are_skipped() {
        let mut w = BitWriter::new();
        w.put(HEADER_OFFSET_BITS, 0);
        w.put(24, u64::from(DUMMY_HEADER));
        let mut raw = w.into_bytes();
        raw.resize(62, 0);
        assert_eq!(HasPage::decode(7, &raw).unwrap(), None);
    }

    #[test]
    fn pid_zero_is_rejected() {
        let mut w = BitWriter::new();
        w.put(HEADER_OFFSET_BITS, 0);
        w.put(2, 1);
        w.put(2, 0);
        w.put(2, 1);
        w.put(5, 17);
        w.put(5, 10);
        w.put(8, 0); // pid 0
        let mut raw = w.into_bytes();
        raw.resize(62, 0);
        assert!(HasPage::decode(7, &raw).is_err());
    }

    #[test]
    fn message_decodes_after_ms_distinct_pages() {
        let ms = 11;
        let cleartext = build_mask_orbit_cleartext(ms);
        let pages = pages_for(&cleartext, ms, 17);

        let mut dec = HasDecoder::new();
        // feed a mix of systematic and parity pages, duplicates included
        for page in pages.iter().take(ms - 1) {
            assert_eq!(dec.push_page(page).unwrap(), None);
        }
        assert_eq!(dec.push_page(&pages[2]).unwrap(), None); // duplicate PID
        let msg = dec.push_page(&pages[40]).unwrap().unwrap();

        assert_eq!(msg.mid, 17);
        assert_eq!(msg.ms, 11);
        assert_eq!(msg.toh, 2250);
        assert_eq!(msg.iod_set, 9);
        let mask = msg.mask.as_ref().unwrap();
        assert_eq!(mask.n_sat(), 1);
        assert_eq!(msg.orbit_validity, Some(90));
        assert_eq!(msg.orbits.len(), 1);
        let orbit = &msg.orbits[0];
        assert_eq!(orbit.sat.to_string(), "G01");
        assert_eq!(orbit.iode, 82);
        assert!((orbit.radial.unwrap() - 1.0850).abs() < 1e-9);
        assert!((orbit.along.unwrap() + 3.2480).abs() < 1e-9);
        assert!((orbit.cross.unwrap() - 0.7840).abs() < 1e-9);
        // the group is gone after a successful decode
        assert_eq!(dec.live_groups(), 0);
    }

    #[test]
    fn ms_change_restarts_group() {
        let ms = 4;
        let cleartext = build_mask_orbit_cleartext(ms);
        let pages = pages_for(&cleartext, ms, 5);

        let mut dec = HasDecoder::new();
        dec.push_page(&pages[0]).unwrap();
        // same MID, different MS
        let mut odd = pages[1].clone();
        odd.ms = 6;
        let err = dec.push_page(&odd).unwrap_err();
        assert!(matches!(err, Error::MsMismatch { mid: 5, kept: 4, got: 6 }));
        // the fresh group uses the new size and keeps the offending page
        assert_eq!(dec.live_groups(), 1);
    }

    #[test]
    fn clock_without_prior_mask_is_mask_absent() {
        let ms = 2;
        let mut w = BitWriter::new();
        w.put(12, 100); // toh
        w.put(1, 0); // no mask
        w.put(1, 0);
        w.put(1, 1); // clock full
        w.put(1, 0);
        w.put(1, 0);
        w.put(1, 0);
        w.put(5, 1);
        w.put(5, 2);
        w.put(4, 0);
        let mut cleartext = w.into_bytes();
        cleartext.resize(ms * PAGE_BYTES, 0);
        let pages = pages_for(&cleartext, ms, 8);

        let mut dec = HasDecoder::new();
        dec.push_page(&pages[0]).unwrap();
        let err = dec.push_page(&pages[1]).unwrap_err();
        assert!(matches!(err, Error::MaskAbsent));
    }
}
