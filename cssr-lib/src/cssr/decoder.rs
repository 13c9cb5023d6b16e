//! Stateful CLAS / MADOCA-PPP Compact SSR decoder.
//!
//! Five L6 data parts chain into one subframe; CSSR messages are packed
//! back to back in the chained bitstream and may span data-part
//! boundaries, so the decoder consumes messages greedily and keeps the
//! unconsumed tail for the next data part. Decoding only runs once a
//! subframe opening with an ST1 mask has been seen.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::mask::{Mask, MaskContext, SatId};
use super::{signal_name, CssrHeader, Dialect};
use crate::bits::BitCursor;
use crate::l6::{L6Frame, PARTS_PER_SUBFRAME};
use crate::prelude::*;

/// Cumulative bit accounting for one mask epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssrStats {
    pub n_sat: usize,
    pub n_sig: usize,
    pub bit_sat: usize,
    pub bit_sig: usize,
    pub bit_other: usize,
    pub bit_null: usize,
}

impl CssrStats {
    #[must_use]
    pub fn bit_total(&self) -> usize {
        self.bit_sat + self.bit_sig + self.bit_other + self.bit_null
    }
}

impl std::fmt::Display for CssrStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "stat n_sat {} n_sig {} bit_sat {} bit_sig {} bit_other {} bit_null {} bit_total {}",
            self.n_sat,
            self.n_sig,
            self.bit_sat,
            self.bit_sig,
            self.bit_other,
            self.bit_null,
            self.bit_total()
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitEntry {
    pub sat: SatId,
    pub iode: u16,
    pub radial: Option<f64>,
    pub along: Option<f64>,
    pub cross: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClockEntry {
    pub sat: SatId,
    pub c0: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeBiasEntry {
    pub sat: SatId,
    pub signal: String,
    pub bias: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseBiasEntry {
    pub sat: SatId,
    pub signal: String,
    pub bias: Option<f64>,
    pub discontinuity: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinedBiasEntry {
    pub sat: SatId,
    pub signal: String,
    pub code_bias: Option<f64>,
    pub phase_bias: Option<f64>,
    pub discontinuity: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UraEntry {
    pub sat: SatId,
    pub ura: u8,
}

/// STEC polynomial coefficients; higher orders appear per correction type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StecPoly {
    pub c00: Option<f64>,
    pub c01: Option<f64>,
    pub c10: Option<f64>,
    pub c11: Option<f64>,
    pub c02: Option<f64>,
    pub c20: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StecEntry {
    pub sat: SatId,
    pub quality: u8,
    pub poly: StecPoly,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub hydrostatic: Option<f64>,
    pub wet: Option<f64>,
    pub residuals: Vec<(SatId, Option<f64>)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbitClockEntry {
    pub sat: SatId,
    pub iode: Option<u16>,
    pub radial: Option<f64>,
    pub along: Option<f64>,
    pub cross: Option<f64>,
    pub c0: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AtmosStecEntry {
    pub sat: SatId,
    pub quality: u8,
    pub correction_type: u8,
    pub poly: StecPoly,
    pub residuals: Vec<Option<f64>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SubtypeBody {
    Mask(Mask),
    Orbit(Vec<OrbitEntry>),
    Clock(Vec<ClockEntry>),
    CodeBias(Vec<CodeBiasEntry>),
    PhaseBias(Vec<PhaseBiasEntry>),
    CombinedBias {
        network_id: Option<u8>,
        entries: Vec<CombinedBiasEntry>,
    },
    Ura(Vec<UraEntry>),
    Stec {
        correction_type: u8,
        network_id: u8,
        entries: Vec<StecEntry>,
    },
    Grid {
        correction_type: u8,
        network_id: u8,
        quality: u8,
        grids: Vec<GridPoint>,
    },
    /// ST10 service information is not decoded; sample streams do not
    /// exercise it and the remaining subframe buffer is abandoned.
    ServiceInfo,
    OrbitClock {
        network_id: Option<u8>,
        entries: Vec<OrbitClockEntry>,
    },
    Atmos {
        network_id: u8,
        trop_quality: Option<u8>,
        trop_poly: Option<[Option<f64>; 4]>,
        trop_offset: Option<f64>,
        trop_residuals: Vec<Option<f64>>,
        stec: Vec<AtmosStecEntry>,
    },
}

/// One fully decoded CSSR message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubtypeRecord {
    pub header: CssrHeader,
    pub body: SubtypeBody,
    /// Consumed message bits padded to bytes; the payload an RTCM 4073
    /// envelope would carry.
    pub raw: Vec<u8>,
}

/// Everything one data part produced.
#[derive(Clone, Debug, Default)]
pub struct DataPartSummary {
    pub sfn: u32,
    pub dpn: u8,
    pub records: Vec<SubtypeRecord>,
    /// Tagged decode errors; the stream continues past all of them.
    pub errors: Vec<String>,
    /// Subtype whose message continues in the next data part (0 when the
    /// subtype number itself was not yet readable).
    pub partial: Option<u8>,
    /// Trailing null padding closed the subframe buffer.
    pub null: bool,
    /// Bit accounting for the mask epoch that an ST1 just closed.
    pub stats: Option<CssrStats>,
}

/// CLAS / MADOCA-PPP subframe-chaining CSSR decoder.
pub struct CssrDecoder {
    dialect: Dialect,
    masks: MaskContext,
    buf: Vec<u8>,
    nbits: usize,
    dpn: u8,
    sfn: u32,
    run: bool,
    stats: CssrStats,
}

impl CssrDecoder {
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        CssrDecoder {
            dialect,
            masks: MaskContext::new(),
            buf: Vec::new(),
            nbits: 0,
            dpn: 0,
            sfn: 0,
            run: false,
            stats: CssrStats::default(),
        }
    }

    #[must_use]
    pub fn mask(&self, prn: u16) -> Option<&Mask> {
        self.masks.active(prn, self.dialect)
    }

    #[must_use]
    pub fn stats(&self) -> CssrStats {
        self.stats
    }

    fn clear_buf(&mut self) {
        self.buf.clear();
        self.nbits = 0;
    }

    fn set_buf(&mut self, bytes: Vec<u8>, nbits: usize) {
        self.buf = bytes;
        self.nbits = nbits;
    }

    fn append_buf(&mut self, bytes: &[u8], nbits: usize) {
        let mut w = crate::bits::BitWriter::new();
        w.extend_bits(&self.buf, self.nbits);
        w.extend_bits(bytes, nbits);
        self.nbits += nbits;
        self.buf = w.into_bytes();
    }

    fn consume_buf(&mut self, nbits: usize) {
        let rest = self.nbits - nbits;
        let bytes = BitCursor::at(&self.buf, nbits)
            .take_bytes(rest)
            .expect("tail length is in range");
        self.set_buf(bytes, rest);
    }

    /// Feed one L6 frame; returns the records and diagnostics its data
    /// part produced.
    pub fn push_frame(&mut self, frame: &L6Frame) -> DataPartSummary {
        let mut summary = DataPartSummary::default();
        let dpart = frame.data_part_bytes();
        let dpart_bits = crate::l6::DATA_PART_BITS;

        if frame.subframe_indicator {
            self.dpn = 1;
            self.set_buf(dpart, dpart_bits);
            match self.peek_subtype() {
                Some(1) => {
                    self.sfn = 1;
                    self.run = true;
                }
                Some(_) if self.run => self.sfn += 1,
                _ => self.clear_buf(),
            }
        } else if self.run {
            self.dpn += 1;
            if self.dpn > PARTS_PER_SUBFRAME {
                warn!("too many data parts, dropping subframe");
                self.run = false;
                self.dpn = 0;
                self.sfn = 0;
                self.clear_buf();
                summary.errors.push("too many data parts".to_string());
                return summary;
            }
            self.append_buf(&dpart, dpart_bits);
        } else {
            trace!(prn = frame.prn, "data part before first mask, dropped");
            return summary;
        }

        summary.sfn = self.sfn;
        summary.dpn = self.dpn;
        if self.run {
            self.drain(frame.prn, &mut summary);
        }
        summary
    }

    /// Peek the subtype at the front of the buffer, if decodable.
    fn peek_subtype(&self) -> Option<u8> {
        let mut cur = BitCursor::new(&self.buf[..self.nbits.div_ceil(8)]);
        if cur.rest_is_zero() {
            return None;
        }
        match CssrHeader::decode(&mut cur) {
            Ok(Some(head)) => Some(head.subtype),
            _ => None,
        }
    }

    /// Consume as many complete messages from the buffer as possible.
    fn drain(&mut self, prn: u16, summary: &mut DataPartSummary) {
        loop {
            if self.nbits == 0 {
                return;
            }
            let buf = self.buf[..self.nbits.div_ceil(8)].to_vec();
            let mut cur = BitCursor::new(&buf);

            if BitCursor::at(&buf, 0).rest_is_zero() {
                trace!(bits = self.nbits, "null padding ends subframe");
                self.stats.bit_null += self.nbits;
                self.clear_buf();
                summary.null = true;
                return;
            }
            if self.nbits < 16 {
                summary.partial = Some(0);
                return;
            }
            let head = match CssrHeader::decode(&mut cur) {
                Ok(Some(head)) => head,
                Ok(None) => {
                    debug!("message number is not 4073, discarding buffer");
                    self.stats.bit_null += self.nbits;
                    self.clear_buf();
                    summary.null = true;
                    return;
                }
                Err(_) => {
                    summary.partial = Some(0);
                    return;
                }
            };

            match self.decode_message(prn, &buf, cur, head, summary) {
                Drained::Consumed => {}
                Drained::NeedMore => {
                    summary.partial = Some(head.subtype);
                    return;
                }
                Drained::Abandoned => {
                    self.clear_buf();
                    return;
                }
            }
        }
    }

    fn decode_message(
        &mut self,
        prn: u16,
        buf: &[u8],
        mut cur: BitCursor<'_>,
        head: CssrHeader,
        summary: &mut DataPartSummary,
    ) -> Drained {
        let dialect = self.dialect;
        let head_bits = cur.pos();

        if head.subtype == 1 {
            let mask = match Mask::decode(&mut cur, dialect, head.iodssr) {
                Ok(mask) => mask,
                Err(Error::ShortPayload { .. }) => return Drained::NeedMore,
                Err(err) => {
                    summary.errors.push(err.to_string());
                    return Drained::Abandoned;
                }
            };
            if cur.pos() > self.nbits {
                // the decode ran into byte padding; wait for more bits
                return Drained::NeedMore;
            }
            // an ST1 closes the previous accounting epoch
            summary.stats = Some(self.stats);
            self.stats = CssrStats {
                n_sat: mask.n_sat(),
                n_sig: mask.n_sig(),
                bit_other: cur.pos(),
                ..CssrStats::default()
            };
            self.masks.install(prn, dialect, mask.clone());
            self.finish_record(buf, cur.pos(), head, SubtypeBody::Mask(mask), summary);
            return Drained::Consumed;
        }

        if head.subtype == 10 {
            debug!("service information subtype is not implemented");
            summary
                .records
                .push(SubtypeRecord {
                    header: head,
                    body: SubtypeBody::ServiceInfo,
                    raw: Vec::new(),
                });
            return Drained::Abandoned;
        }

        // every non-mask subtype decodes against the active mask
        let Some(active) = self.masks.active(prn, dialect) else {
            summary.errors.push(Error::MaskAbsent.to_string());
            return Drained::Abandoned;
        };
        let mask = active.clone();
        // on an IODSSR mismatch, advance over the message using the active
        // mask's shape but drop the correction payload
        let mismatch = (mask.iodssr != head.iodssr).then(|| {
            Error::IodssrMismatch {
                active: mask.iodssr,
                msg: head.iodssr,
            }
            .to_string()
        });

        // decode on a scratch copy of the statistics so an incomplete
        // message does not get counted twice when it resumes
        let mut stats = self.stats;
        let body = match decode_subtype(head.subtype, &mut cur, &mask, dialect, &mut stats, head_bits)
        {
            Ok(body) => body,
            Err(Error::ShortPayload { .. }) => return Drained::NeedMore,
            Err(err) => {
                summary.errors.push(err.to_string());
                return Drained::Abandoned;
            }
        };
        if cur.pos() > self.nbits {
            return Drained::NeedMore;
        }
        self.stats = stats;

        if let Some(mismatch) = mismatch {
            summary.errors.push(mismatch);
            self.consume_buf(cur.pos());
            return Drained::Consumed;
        }
        self.finish_record(buf, cur.pos(), head, body, summary);
        Drained::Consumed
    }

    fn finish_record(
        &mut self,
        buf: &[u8],
        nbits: usize,
        header: CssrHeader,
        body: SubtypeBody,
        summary: &mut DataPartSummary,
    ) {
        let raw = BitCursor::new(buf)
            .take_bytes(nbits)
            .expect("consumed bits are in the buffer");
        summary.records.push(SubtypeRecord { header, body, raw });
        self.consume_buf(nbits);
    }
}

enum Drained {
    Consumed,
    NeedMore,
    Abandoned,
}

fn decode_subtype(
    subtype: u8,
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    dialect: Dialect,
    stats: &mut CssrStats,
    head_bits: usize,
) -> Result<SubtypeBody> {
    match subtype {
        2 => decode_orbit(cur, mask, dialect, stats, head_bits),
        3 => decode_clock(cur, mask, dialect, stats, head_bits),
        4 => decode_code_bias(cur, mask, dialect, stats, head_bits),
        5 => decode_phase_bias(cur, mask, dialect, stats, head_bits),
        6 => decode_combined_bias(cur, mask, dialect, stats, head_bits),
        7 => decode_ura(cur, mask, stats, head_bits),
        8 => decode_stec(cur, mask, stats, head_bits),
        9 => decode_grid(cur, mask, stats, head_bits),
        11 => decode_orbit_clock(cur, mask, dialect, stats, head_bits),
        12 => decode_atmos(cur, mask, stats, head_bits),
        other => Err(Error::UnknownSubtype { subtype: other }),
    }
}

fn decode_orbit(
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    dialect: Dialect,
    stats: &mut CssrStats,
    head_bits: usize,
) -> Result<SubtypeBody> {
    let table = dialect.field_table();
    let mut entries = Vec::new();
    for section in &mask.systems {
        let w_iode = dialect.iode_width(section.system);
        for sat in section.sat_ids() {
            let iode = cur.take(w_iode)? as u16;
            entries.push(OrbitEntry {
                sat,
                iode,
                radial: table.orbit_radial.read(cur)?,
                along: table.orbit_along.read(cur)?,
                cross: table.orbit_cross.read(cur)?,
            });
        }
    }
    stats.bit_other += head_bits;
    stats.bit_sat += cur.pos() - head_bits;
    Ok(SubtypeBody::Orbit(entries))
}

fn decode_clock(
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    dialect: Dialect,
    stats: &mut CssrStats,
    head_bits: usize,
) -> Result<SubtypeBody> {
    let table = dialect.field_table();
    let mut entries = Vec::new();
    for section in &mask.systems {
        for sat in section.sat_ids() {
            entries.push(ClockEntry {
                sat,
                c0: table.clock_c0.read(cur)?,
            });
        }
    }
    stats.bit_other += head_bits;
    stats.bit_sat += cur.pos() - head_bits;
    Ok(SubtypeBody::Clock(entries))
}

/// Visit every active (satellite, signal) cell in mask order.
pub(crate) fn for_each_cell<F>(mask: &Mask, mut f: F) -> Result<()>
where
    F: FnMut(SatId, &'static str) -> Result<()>,
{
    for section in &mask.systems {
        let mut cell = 0usize;
        for &sat_number in &section.sats {
            for &sig in &section.signals {
                let active = section.cell_mask[cell];
                cell += 1;
                if !active {
                    continue;
                }
                f(
                    SatId {
                        system: section.system,
                        number: sat_number,
                    },
                    signal_name(section.system, sig),
                )?;
            }
        }
    }
    Ok(())
}

fn decode_code_bias(
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    dialect: Dialect,
    stats: &mut CssrStats,
    head_bits: usize,
) -> Result<SubtypeBody> {
    let table = dialect.field_table();
    let mut entries = Vec::new();
    for_each_cell(mask, |sat, signal| {
        entries.push(CodeBiasEntry {
            sat,
            signal: signal.to_string(),
            bias: table.code_bias.read(cur)?,
        });
        Ok(())
    })?;
    stats.bit_other += head_bits;
    stats.bit_sig += cur.pos() - head_bits;
    Ok(SubtypeBody::CodeBias(entries))
}

fn decode_phase_bias(
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    dialect: Dialect,
    stats: &mut CssrStats,
    head_bits: usize,
) -> Result<SubtypeBody> {
    let table = dialect.field_table();
    let mut entries = Vec::new();
    for_each_cell(mask, |sat, signal| {
        let bias = table.phase_bias.read(cur)?;
        let discontinuity = cur.take(2)? as u8;
        entries.push(PhaseBiasEntry {
            sat,
            signal: signal.to_string(),
            bias,
            discontinuity,
        });
        Ok(())
    })?;
    stats.bit_other += head_bits;
    stats.bit_sig += cur.pos() - head_bits;
    Ok(SubtypeBody::PhaseBias(entries))
}

/// Satellite sub-mask used by the network-scoped subtypes.
fn decode_svmask(cur: &mut BitCursor<'_>, mask: &Mask) -> Result<Vec<Vec<bool>>> {
    let mut svmask = Vec::with_capacity(mask.systems.len());
    for section in &mask.systems {
        let mut bits = Vec::with_capacity(section.sats.len());
        for _ in 0..section.sats.len() {
            bits.push(cur.take_bool()?);
        }
        svmask.push(bits);
    }
    Ok(svmask)
}

fn decode_combined_bias(
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    dialect: Dialect,
    stats: &mut CssrStats,
    head_bits: usize,
) -> Result<SubtypeBody> {
    let table = dialect.field_table();
    let f_code = cur.take_bool()?;
    let f_phase = cur.take_bool()?;
    let f_network = cur.take_bool()?;
    let mut network_id = None;
    let svmask = if f_network {
        network_id = Some(cur.take(5)? as u8);
        decode_svmask(cur, mask)?
    } else {
        mask.systems.iter().map(|s| vec![true; s.sats.len()]).collect()
    };

    let mut entries = Vec::new();
    for (si, section) in mask.systems.iter().enumerate() {
        let mut cell = 0usize;
        for (ji, &sat_number) in section.sats.iter().enumerate() {
            for &sig in &section.signals {
                let active = section.cell_mask[cell];
                cell += 1;
                if !active || !svmask[si][ji] {
                    continue;
                }
                let mut entry = CombinedBiasEntry {
                    sat: SatId {
                        system: section.system,
                        number: sat_number,
                    },
                    signal: signal_name(section.system, sig).to_string(),
                    code_bias: None,
                    phase_bias: None,
                    discontinuity: None,
                };
                if f_code {
                    entry.code_bias = table.code_bias.read(cur)?;
                }
                if f_phase {
                    entry.phase_bias = table.phase_bias.read(cur)?;
                    entry.discontinuity = Some(cur.take(2)? as u8);
                }
                entries.push(entry);
            }
        }
    }
    stats.bit_other += head_bits + 3;
    stats.bit_sig += cur.pos() - head_bits - 3;
    Ok(SubtypeBody::CombinedBias {
        network_id,
        entries,
    })
}

fn decode_ura(
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    stats: &mut CssrStats,
    head_bits: usize,
) -> Result<SubtypeBody> {
    let mut entries = Vec::new();
    for section in &mask.systems {
        for sat in section.sat_ids() {
            entries.push(UraEntry {
                sat,
                ura: cur.take(6)? as u8,
            });
        }
    }
    stats.bit_other += head_bits;
    stats.bit_sat += cur.pos() - head_bits;
    Ok(SubtypeBody::Ura(entries))
}

fn read_sentinel(cur: &mut BitCursor<'_>, width: usize, scale: f64) -> Result<Option<f64>> {
    super::FieldSpec::new(width, scale).read(cur)
}

fn decode_stec_poly(cur: &mut BitCursor<'_>, correction_type: u8) -> Result<StecPoly> {
    let mut poly = StecPoly {
        c00: read_sentinel(cur, 14, 0.05)?,
        ..StecPoly::default()
    };
    if correction_type >= 1 {
        poly.c01 = read_sentinel(cur, 12, 0.02)?;
        poly.c10 = read_sentinel(cur, 12, 0.02)?;
    }
    if correction_type >= 2 {
        poly.c11 = read_sentinel(cur, 10, 0.02)?;
    }
    if correction_type >= 3 {
        poly.c02 = read_sentinel(cur, 8, 0.005)?;
        poly.c20 = read_sentinel(cur, 8, 0.005)?;
    }
    Ok(poly)
}

fn decode_stec(
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    stats: &mut CssrStats,
    head_bits: usize,
) -> Result<SubtypeBody> {
    let correction_type = cur.take(2)? as u8;
    let network_id = cur.take(5)? as u8;
    let svmask = decode_svmask(cur, mask)?;
    let mut entries = Vec::new();
    for (si, section) in mask.systems.iter().enumerate() {
        for (ji, sat) in section.sat_ids().enumerate() {
            if !svmask[si][ji] {
                continue;
            }
            let quality = cur.take(6)? as u8;
            entries.push(StecEntry {
                sat,
                quality,
                poly: decode_stec_poly(cur, correction_type)?,
            });
        }
    }
    stats.bit_other += head_bits + 7;
    stats.bit_sat += cur.pos() - head_bits - 7;
    Ok(SubtypeBody::Stec {
        correction_type,
        network_id,
        entries,
    })
}

fn decode_grid(
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    stats: &mut CssrStats,
    _head_bits: usize,
) -> Result<SubtypeBody> {
    let correction_type = cur.take(2)? as u8;
    let wide_range = cur.take_bool()?;
    let residual_width = if wide_range { 16 } else { 7 };
    let network_id = cur.take(5)? as u8;
    let svmask = decode_svmask(cur, mask)?;
    let quality = cur.take(6)? as u8;
    let n_grid = cur.take(6)? as usize;

    let mut grids = Vec::with_capacity(n_grid);
    for _ in 0..n_grid {
        let hydrostatic = read_sentinel(cur, 9, 0.004)?;
        let wet = read_sentinel(cur, 8, 0.004)?;
        let mut residuals = Vec::new();
        for (si, section) in mask.systems.iter().enumerate() {
            for (ji, sat) in section.sat_ids().enumerate() {
                if !svmask[si][ji] {
                    continue;
                }
                residuals.push((sat, read_sentinel(cur, residual_width, 0.04)?));
            }
        }
        grids.push(GridPoint {
            hydrostatic,
            wet,
            residuals,
        });
    }
    stats.bit_other += cur.pos();
    Ok(SubtypeBody::Grid {
        correction_type,
        network_id,
        quality,
        grids,
    })
}

fn decode_orbit_clock(
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    dialect: Dialect,
    stats: &mut CssrStats,
    head_bits: usize,
) -> Result<SubtypeBody> {
    let table = dialect.field_table();
    let f_orbit = cur.take_bool()?;
    let f_clock = cur.take_bool()?;
    let f_network = cur.take_bool()?;
    let mut network_id = None;
    let svmask = if f_network {
        network_id = Some(cur.take(5)? as u8);
        decode_svmask(cur, mask)?
    } else {
        mask.systems.iter().map(|s| vec![true; s.sats.len()]).collect()
    };

    let mut entries = Vec::new();
    for (si, section) in mask.systems.iter().enumerate() {
        let w_iode = dialect.iode_width(section.system);
        for (ji, sat) in section.sat_ids().enumerate() {
            if !svmask[si][ji] {
                continue;
            }
            let mut entry = OrbitClockEntry {
                sat,
                iode: None,
                radial: None,
                along: None,
                cross: None,
                c0: None,
            };
            if f_orbit {
                entry.iode = Some(cur.take(w_iode)? as u16);
                entry.radial = table.orbit_radial.read(cur)?;
                entry.along = table.orbit_along.read(cur)?;
                entry.cross = table.orbit_cross.read(cur)?;
            }
            if f_clock {
                entry.c0 = table.clock_c0.read(cur)?;
            }
            entries.push(entry);
        }
    }
    stats.bit_other += head_bits + 3;
    stats.bit_sat += cur.pos() - head_bits - 3;
    if f_network {
        stats.bit_other += 5;
        stats.bit_sat -= 5;
    }
    Ok(SubtypeBody::OrbitClock {
        network_id,
        entries,
    })
}

fn decode_atmos(
    cur: &mut BitCursor<'_>,
    mask: &Mask,
    stats: &mut CssrStats,
    _head_bits: usize,
) -> Result<SubtypeBody> {
    let trop_avail = cur.take(2)? as u8;
    let stec_avail = cur.take(2)? as u8;
    let network_id = cur.take(5)? as u8;
    let n_grid = cur.take(6)? as usize;

    let mut trop_quality = None;
    let mut trop_poly = None;
    if trop_avail & 0b10 != 0 {
        trop_quality = Some(cur.take(6)? as u8);
        let trop_type = cur.take(2)? as u8;
        let mut poly = [None; 4];
        poly[0] = read_sentinel(cur, 9, 0.004)?;
        if trop_type >= 1 {
            poly[1] = read_sentinel(cur, 7, 0.002)?;
            poly[2] = read_sentinel(cur, 7, 0.002)?;
        }
        if trop_type >= 2 {
            poly[3] = read_sentinel(cur, 7, 0.001)?;
        }
        trop_poly = Some(poly);
    }

    let mut trop_offset = None;
    let mut trop_residuals = Vec::new();
    if trop_avail & 0b01 != 0 {
        let wide = cur.take_bool()?;
        let width = if wide { 8 } else { 6 };
        trop_offset = Some(cur.take(4)? as f64 * 0.02);
        for _ in 0..n_grid {
            trop_residuals.push(read_sentinel(cur, width, 0.004)?);
        }
    }

    let stec_start = cur.pos();
    let mut stec = Vec::new();
    if stec_avail & 0b10 != 0 {
        let svmask = decode_svmask(cur, mask)?;
        for (si, section) in mask.systems.iter().enumerate() {
            for (ji, sat) in section.sat_ids().enumerate() {
                if !svmask[si][ji] {
                    continue;
                }
                let quality = cur.take(6)? as u8;
                let correction_type = cur.take(2)? as u8;
                let poly = decode_stec_poly(cur, correction_type)?;
                let size = cur.take(2)? as u8;
                let (width, scale) = match size {
                    0 => (4, 0.04),
                    1 => (4, 0.12),
                    2 => (5, 0.16),
                    _ => (7, 0.24),
                };
                let mut residuals = Vec::with_capacity(n_grid);
                for _ in 0..n_grid {
                    residuals.push(read_sentinel(cur, width, scale)?);
                }
                stec.push(AtmosStecEntry {
                    sat,
                    quality,
                    correction_type,
                    poly,
                    residuals,
                });
            }
        }
    }
    stats.bit_other += stec_start;
    stats.bit_sat += cur.pos() - stec_start;
    Ok(SubtypeBody::Atmos {
        network_id,
        trop_quality,
        trop_poly,
        trop_offset,
        trop_residuals,
        stec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;
    use crate::cssr::MSGNUM_CSSR;
    use crate::framing::Constellation;
    use crate::l6::{L6Frame, DATA_PART_BITS, PREAMBLE};

    fn write_header(w: &mut BitWriter, subtype: u8, iodssr: u8) {
        w.put(12, u64::from(MSGNUM_CSSR));
        w.put(4, u64::from(subtype));
        if subtype == 1 {
            w.put(20, 450_000);
        } else {
            w.put(12, 125);
        }
        w.put(4, 2); // update interval
        w.put(1, 0); // multiple message
        w.put(4, u64::from(iodssr));
    }

    /// ST1 with GPS G01+G02 on signals L1 C/A and L2 L2C(L).
    fn write_st1(w: &mut BitWriter, iodssr: u8) {
        write_header(w, 1, iodssr);
        w.put(4, 1); // one gnss
        w.put(4, 0); // GPS
        let mut sat_bits = [0u64; 40];
        sat_bits[0] = 1;
        sat_bits[1] = 1;
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
    }

    fn write_st3(w: &mut BitWriter, iodssr: u8, values: [i64; 2]) {
        write_header(w, 3, iodssr);
        for v in values {
            w.put_signed(15, v);
        }
    }

    /// Pack a bit stream into L6 frames of 1695 data-part bits.
    fn frames_of(w: BitWriter) -> Vec<L6Frame> {
        let nbits = w.len();
        let bytes = w.into_bytes();
        let mut frames = Vec::new();
        let mut off = 0usize;
        let mut first = true;
        while off == 0 || off < nbits {
            let chunk: Vec<u8> = {
                let mut cw = BitWriter::new();
                let n = DATA_PART_BITS.min(nbits.saturating_sub(off));
                if n > 0 {
                    let mut cur = BitCursor::at(&bytes, off);
                    let mut left = n;
                    while left > 0 {
                        let take = left.min(32);
                        cw.put(take, cur.take(take).unwrap());
                        left -= take;
                    }
                }
                cw.into_bytes()
            };
            let mtid = if first { 0b1010_0001 } else { 0b1010_0000 };
            let mut raw = PREAMBLE.to_vec();
            raw.push(199);
            raw.push(mtid);
            let mut body = vec![0u8; 212];
            // place data part after the alert bit
            let mut bw = BitWriter::new();
            bw.put(1, 0);
            bw.extend_bits(&chunk, DATA_PART_BITS.min(nbits.saturating_sub(off)));
            let packed = bw.into_bytes();
            body[..packed.len()].copy_from_slice(&packed);
            raw.extend_from_slice(&body);
            raw.extend_from_slice(&[0u8; 32]);
            frames.push(L6Frame::decode(&raw).unwrap());
            off += DATA_PART_BITS;
            first = false;
        }
        frames
    }

    #[test]
    fn mask_then_clock_decodes_in_one_data_part() {
        let mut w = BitWriter::new();
        write_st1(&mut w, 7);
        write_st3(&mut w, 7, [302, -16384]);
        let frames = frames_of(w);
        assert_eq!(frames.len(), 1);

        let mut dec = CssrDecoder::new(Dialect::Clas);
        let summary = dec.push_frame(&frames[0]);
        assert_eq!(summary.sfn, 1);
        assert_eq!(summary.dpn, 1);
        assert!(summary.errors.is_empty());
        assert_eq!(summary.records.len(), 2);

        let SubtypeBody::Mask(mask) = &summary.records[0].body else {
            panic!("first record should be the mask");
        };
        assert_eq!(mask.iodssr, 7);
        assert_eq!(mask.n_sat(), 2);
        assert_eq!(mask.n_sig(), 4);

        let SubtypeBody::Clock(clocks) = &summary.records[1].body else {
            panic!("second record should be clock corrections");
        };
        assert_eq!(clocks.len(), 2);
        assert_eq!(clocks[0].sat.to_string(), "G01");
        assert!((clocks[0].c0.unwrap() - 0.4832).abs() < 1e-9);
        assert_eq!(clocks[1].c0, None); // most-negative sentinel

        // null padding closes the rest of the data part
        assert!(summary.null);
    }

    #[test]
    fn decoding_waits_for_first_mask() {
        let mut w = BitWriter::new();
        write_st3(&mut w, 7, [0, 0]);
        let frames = frames_of(w);
        let mut dec = CssrDecoder::new(Dialect::Clas);
        let summary = dec.push_frame(&frames[0]);
        assert!(summary.records.is_empty());
        assert_eq!(summary.sfn, 0);
    }

    #[test]
    fn iodssr_mismatch_drops_payload_but_keeps_mask_and_position() {
        let mut w = BitWriter::new();
        write_st1(&mut w, 4);
        write_st3(&mut w, 5, [100, 100]); // stale IODSSR
        write_st3(&mut w, 4, [302, 0]); // matches
        let frames = frames_of(w);

        let mut dec = CssrDecoder::new(Dialect::Clas);
        let summary = dec.push_frame(&frames[0]);

        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("IODSSR mismatch (active=4, msg=5)"));
        // mask + the second (matching) clock message
        assert_eq!(summary.records.len(), 2);
        let SubtypeBody::Clock(clocks) = &summary.records[1].body else {
            panic!("expected clock record");
        };
        assert!((clocks[0].c0.unwrap() - 0.4832).abs() < 1e-9);
        // the active mask is still the IODSSR=4 one
        assert_eq!(dec.mask(199).unwrap().iodssr, 4);
    }

    #[test]
    fn message_spanning_data_parts_resumes() {
        let mut w = BitWriter::new();
        write_st1(&mut w, 2);
        // pad with ST3 messages until one is forced to straddle the
        // 1695-bit data part boundary
        while w.len() <= DATA_PART_BITS - 20 {
            write_st3(&mut w, 2, [1, 2]);
        }
        let frames = frames_of(w);
        assert_eq!(frames.len(), 2);

        let mut dec = CssrDecoder::new(Dialect::Clas);
        let first = dec.push_frame(&frames[0]);
        assert_eq!(first.partial, Some(3));
        let n_first = first.records.len();
        assert!(n_first >= 2);

        let second = dec.push_frame(&frames[1]);
        assert_eq!(second.dpn, 2);
        assert!(!second.records.is_empty());
        let SubtypeBody::Clock(clocks) = &second.records[0].body else {
            panic!("resumed record should be a clock message");
        };
        assert!((clocks[0].c0.unwrap() - 0.0016).abs() < 1e-9);
    }

    #[test]
    fn new_st1_reports_previous_epoch_stats() {
        let mut w = BitWriter::new();
        write_st1(&mut w, 1);
        write_st3(&mut w, 1, [10, 20]);
        let frames1 = frames_of(w);

        let mut w = BitWriter::new();
        write_st1(&mut w, 2);
        let frames2 = frames_of(w);

        let mut dec = CssrDecoder::new(Dialect::Clas);
        let s1 = dec.push_frame(&frames1[0]);
        // first ST1 closes the empty startup epoch
        assert_eq!(s1.stats.unwrap().bit_total(), 0);

        let s2 = dec.push_frame(&frames2[0]);
        let stats = s2.stats.unwrap();
        assert_eq!(stats.n_sat, 2);
        assert_eq!(stats.n_sig, 4);
        // clock message: 37-bit header as other, 30 bits as satellite
        assert_eq!(stats.bit_sat, 30);
        assert!(stats.bit_other > 0);
        assert!(stats.bit_null > 0); // padding after the clock message
        assert_eq!(
            stats.bit_total(),
            stats.bit_sat + stats.bit_sig + stats.bit_other + stats.bit_null
        );
    }

    #[test]
    fn orbit_subtype_decodes_iode_and_deltas() {
        let mut w = BitWriter::new();
        write_st1(&mut w, 3);
        write_header(&mut w, 2, 3);
        for (iode, r, a, c) in [(82i64, 678i64, -508i64, 123i64), (7, 1, 2, 3)] {
            w.put(8, iode as u64);
            w.put_signed(15, r);
            w.put_signed(13, a);
            w.put_signed(13, c);
        }
        let frames = frames_of(w);
        let mut dec = CssrDecoder::new(Dialect::Clas);
        let summary = dec.push_frame(&frames[0]);
        let SubtypeBody::Orbit(orbits) = &summary.records[1].body else {
            panic!("expected orbit record");
        };
        assert_eq!(orbits[0].iode, 82);
        assert!((orbits[0].radial.unwrap() - 678.0 * 0.0016).abs() < 1e-9);
        assert!((orbits[0].along.unwrap() - -508.0 * 0.0064).abs() < 1e-9);
    }

    #[test]
    fn too_many_data_parts_resets_subframe() {
        let mut w = BitWriter::new();
        write_st1(&mut w, 1);
        let frames = frames_of(w);
        let mut dec = CssrDecoder::new(Dialect::Clas);
        dec.push_frame(&frames[0]);

        // five continuation parts beyond the opener overflow the subframe
        let cont = {
            let mut raw = PREAMBLE.to_vec();
            raw.push(199);
            raw.push(0b1010_0000);
            raw.extend_from_slice(&[0u8; 212 + 32]);
            L6Frame::decode(&raw).unwrap()
        };
        for _ in 0..4 {
            dec.push_frame(&cont);
        }
        let summary = dec.push_frame(&cont);
        assert!(summary
            .errors
            .iter()
            .any(|e| e.contains("too many data parts")));
        // decoding is gated again until the next ST1
        let summary = dec.push_frame(&cont);
        assert!(summary.records.is_empty());
        assert_eq!(summary.sfn, 0);
    }

    #[test]
    fn code_bias_uses_cell_ordering() {
        let mut w = BitWriter::new();
        write_st1(&mut w, 6);
        write_header(&mut w, 4, 6);
        for v in [50i64, -60, 70, -1024] {
            w.put_signed(11, v);
        }
        let frames = frames_of(w);
        let mut dec = CssrDecoder::new(Dialect::Clas);
        let summary = dec.push_frame(&frames[0]);
        let SubtypeBody::CodeBias(biases) = &summary.records[1].body else {
            panic!("expected code bias record");
        };
        assert_eq!(biases.len(), 4);
        assert_eq!(biases[0].sat.to_string(), "G01");
        assert_eq!(biases[0].signal, "L1 C/A");
        assert_eq!(biases[1].signal, "L2 L2C(L)");
        assert_eq!(biases[2].sat.to_string(), "G02");
        assert!((biases[0].bias.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(biases[3].bias, None);
    }
}
