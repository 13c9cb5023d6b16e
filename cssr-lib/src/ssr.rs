//! RTCM-SSR message bodies (1057..1068 and companions).
//!
//! Unlike Compact SSR these messages are self-contained: each carries its
//! own satellite list, IOD, and update interval. MADOCA broadcasts them
//! embedded in L6 frames; the same bodies appear in plain RTCM streams.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bits::BitCursor;
use crate::framing::Constellation;
use crate::l6::{L6Frame, Vendor};
use crate::prelude::*;

/// SSR message family; fixes the body layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SsrKind {
    Orbit,
    Clock,
    CodeBias,
    CombinedOrbitClock,
    Ura,
    HighRateClock,
}

/// Classify an RTCM SSR message number.
#[must_use]
pub fn ssr_kind(msgnum: u16) -> Option<(Constellation, SsrKind)> {
    let (base, system) = match msgnum {
        1057..=1062 => (1057, Constellation::Gps),
        1063..=1068 => (1063, Constellation::Glonass),
        1240..=1245 => (1240, Constellation::Galileo),
        1246..=1251 => (1246, Constellation::Qzss),
        1258..=1263 => (1258, Constellation::BeiDou),
        _ => return None,
    };
    let kind = match msgnum - base {
        0 => SsrKind::Orbit,
        1 => SsrKind::Clock,
        2 => SsrKind::CodeBias,
        3 => SsrKind::CombinedOrbitClock,
        4 => SsrKind::Ura,
        _ => SsrKind::HighRateClock,
    };
    Some((system, kind))
}

/// Satellite id width within SSR bodies.
fn sat_id_width(system: Constellation) -> usize {
    match system {
        Constellation::Qzss => 4,
        Constellation::Glonass => 5,
        _ => 6,
    }
}

/// Common SSR header.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SsrHeader {
    pub epoch: u32,
    pub update_interval: u8,
    pub multiple_message: bool,
    pub satellite_datum: Option<bool>,
    pub iod: u8,
    pub provider_id: u16,
    pub solution_id: u8,
    pub n_sat: u8,
}

impl SsrHeader {
    pub fn decode(
        cur: &mut BitCursor<'_>,
        system: Constellation,
        kind: SsrKind,
    ) -> Result<Self> {
        let epoch_width = if system == Constellation::Glonass { 17 } else { 20 };
        let epoch = cur.take(epoch_width)? as u32;
        let update_interval = cur.take(4)? as u8;
        let multiple_message = cur.take_bool()?;
        let satellite_datum = if matches!(kind, SsrKind::Orbit | SsrKind::CombinedOrbitClock) {
            Some(cur.take_bool()?)
        } else {
            None
        };
        let iod = cur.take(4)? as u8;
        let provider_id = cur.take(16)? as u16;
        let solution_id = cur.take(4)? as u8;
        let n_sat_width = if system == Constellation::Qzss { 4 } else { 6 };
        let n_sat = cur.take(n_sat_width)? as u8;
        Ok(SsrHeader {
            epoch,
            update_interval,
            multiple_message,
            satellite_datum,
            iod,
            provider_id,
            solution_id,
            n_sat,
        })
    }
}

/// Per-satellite SSR payload, values scaled to meters (and m/s, m/s^2).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SsrBody {
    Orbit(Vec<SsrOrbit>),
    Clock(Vec<SsrClock>),
    CodeBias(Vec<SsrCodeBias>),
    CombinedOrbitClock(Vec<(SsrOrbit, SsrClock)>),
    Ura(Vec<SsrUra>),
    HighRateClock(Vec<SsrHighRateClock>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SsrOrbit {
    pub sat_id: u8,
    pub iode: u8,
    pub radial: f64,
    pub along: f64,
    pub cross: f64,
    pub dot_radial: f64,
    pub dot_along: f64,
    pub dot_cross: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SsrClock {
    pub sat_id: u8,
    pub c0: f64,
    pub c1: f64,
    pub c2: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SsrCodeBias {
    pub sat_id: u8,
    /// (signal and tracking mode indicator, bias in meters)
    pub biases: Vec<(u8, f64)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SsrUra {
    pub sat_id: u8,
    pub ura: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SsrHighRateClock {
    pub sat_id: u8,
    pub clock: f64,
}

/// A complete RTCM-SSR message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SsrMessage {
    pub msgnum: u16,
    pub system: Constellation,
    pub header: SsrHeader,
    pub body: SsrBody,
}

impl SsrMessage {
    /// Satellite names in body order, e.g. `["G01", "G12"]`.
    #[must_use]
    pub fn sat_names(&self) -> Vec<String> {
        let name = |id: u8| format!("{}{id:02}", self.system.letter());
        match &self.body {
            SsrBody::Orbit(v) => v.iter().map(|e| name(e.sat_id)).collect(),
            SsrBody::Clock(v) => v.iter().map(|e| name(e.sat_id)).collect(),
            SsrBody::CodeBias(v) => v.iter().map(|e| name(e.sat_id)).collect(),
            SsrBody::CombinedOrbitClock(v) => v.iter().map(|(o, _)| name(o.sat_id)).collect(),
            SsrBody::Ura(v) => v.iter().map(|e| name(e.sat_id)).collect(),
            SsrBody::HighRateClock(v) => v.iter().map(|e| name(e.sat_id)).collect(),
        }
    }
}

/// Decode one SSR message body starting at the message number.
pub fn decode_ssr(cur: &mut BitCursor<'_>) -> Result<Option<SsrMessage>> {
    let msgnum = cur.take(12)? as u16;
    if msgnum == 0 {
        return Ok(None);
    }
    let Some((system, kind)) = ssr_kind(msgnum) else {
        return Err(Error::UnknownSubtype {
            subtype: (msgnum % 256) as u8,
        });
    };
    let header = SsrHeader::decode(cur, system, kind)?;
    let n = usize::from(header.n_sat);
    let w = sat_id_width(system);

    let body = match kind {
        SsrKind::Orbit => {
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(decode_orbit(cur, w)?);
            }
            SsrBody::Orbit(v)
        }
        SsrKind::Clock => {
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(decode_clock(cur, w)?);
            }
            SsrBody::Clock(v)
        }
        SsrKind::CodeBias => {
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                let sat_id = cur.take(w)? as u8;
                let n_bias = cur.take(5)? as usize;
                let mut biases = Vec::with_capacity(n_bias);
                for _ in 0..n_bias {
                    let mode = cur.take(5)? as u8;
                    let bias = cur.take_signed(14)? as f64 * 0.01;
                    biases.push((mode, bias));
                }
                v.push(SsrCodeBias { sat_id, biases });
            }
            SsrBody::CodeBias(v)
        }
        SsrKind::CombinedOrbitClock => {
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                let orbit = decode_orbit(cur, w)?;
                let mut clock = decode_clock(cur, 0)?;
                clock.sat_id = orbit.sat_id;
                v.push((orbit, clock));
            }
            SsrBody::CombinedOrbitClock(v)
        }
        SsrKind::Ura => {
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(SsrUra {
                    sat_id: cur.take(w)? as u8,
                    ura: cur.take(6)? as u8,
                });
            }
            SsrBody::Ura(v)
        }
        SsrKind::HighRateClock => {
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(SsrHighRateClock {
                    sat_id: cur.take(w)? as u8,
                    clock: cur.take_signed(22)? as f64 * 1e-4,
                });
            }
            SsrBody::HighRateClock(v)
        }
    };
    Ok(Some(SsrMessage {
        msgnum,
        system,
        header,
        body,
    }))
}

fn decode_orbit(cur: &mut BitCursor<'_>, sat_id_width: usize) -> Result<SsrOrbit> {
    let sat_id = if sat_id_width > 0 {
        cur.take(sat_id_width)? as u8
    } else {
        0
    };
    Ok(SsrOrbit {
        sat_id,
        iode: cur.take(8)? as u8,
        radial: cur.take_signed(22)? as f64 * 1e-4,
        along: cur.take_signed(20)? as f64 * 4e-4,
        cross: cur.take_signed(20)? as f64 * 4e-4,
        dot_radial: cur.take_signed(21)? as f64 * 1e-6,
        dot_along: cur.take_signed(19)? as f64 * 4e-6,
        dot_cross: cur.take_signed(19)? as f64 * 4e-6,
    })
}

fn decode_clock(cur: &mut BitCursor<'_>, sat_id_width: usize) -> Result<SsrClock> {
    let sat_id = if sat_id_width > 0 {
        cur.take(sat_id_width)? as u8
    } else {
        0
    };
    Ok(SsrClock {
        sat_id,
        c0: cur.take_signed(22)? as f64 * 1e-4,
        c1: cur.take_signed(21)? as f64 * 1e-6,
        c2: cur.take_signed(27)? as f64 * 2e-8,
    })
}

/// MADOCA L6 frame content: the embedded RTCM-SSR stream.
#[derive(Clone, Debug, Default)]
pub struct MadocaSummary {
    pub tow: u32,
    pub week: u16,
    pub messages: Vec<MadocaMessage>,
    pub errors: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct MadocaMessage {
    pub message: SsrMessage,
    /// Byte-aligned message bits, ready for RTCM re-framing.
    pub raw: Vec<u8>,
}

/// Decoder for the MADOCA (RTCM-SSR in L6) vendor path.
///
/// Each frame is self-contained: TOW and week lead the data part and the
/// remainder is a back-to-back run of SSR messages terminated by a zero
/// message number or exhaustion.
#[derive(Debug, Default)]
pub struct MadocaDecoder;

impl MadocaDecoder {
    #[must_use]
    pub fn new() -> Self {
        MadocaDecoder
    }

    pub fn push_frame(&mut self, frame: &L6Frame) -> Result<MadocaSummary> {
        debug_assert_eq!(frame.vendor, Vendor::Madoca);
        let dpart = frame.data_part_bytes();
        let mut cur = BitCursor::new(&dpart);
        let mut summary = MadocaSummary {
            tow: cur.take(20)? as u32,
            week: cur.take(13)? as u16,
            ..MadocaSummary::default()
        };

        // the SSR run is relative to the byte-aligned stream after tow/week
        let body = BitCursor::at(&dpart, cur.pos())
            .take_bytes(cur.remaining())
            .expect("length from cursor");
        let mut pos = 0usize;
        loop {
            let mut msg_cur = BitCursor::at(&body, pos);
            if msg_cur.remaining() < 12 {
                break;
            }
            let start = pos;
            match decode_ssr(&mut msg_cur) {
                Ok(Some(message)) => {
                    let mut end = msg_cur.pos();
                    if end % 8 != 0 {
                        end += 8 - end % 8;
                    }
                    let raw = BitCursor::at(&body, start)
                        .take_bytes(end - start)
                        .expect("message bits are in the buffer");
                    summary.messages.push(MadocaMessage { message, raw });
                    pos = end;
                }
                Ok(None) => break,
                Err(Error::ShortPayload { .. }) => break,
                Err(err) => {
                    trace!(%err, "madoca ssr run ends");
                    summary.errors.push(err.to_string());
                    break;
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;
    use crate::l6::PREAMBLE;

    fn write_ssr_hr_clock(w: &mut BitWriter, msgnum: u16, sats: &[(u8, i64)]) {
        let (system, kind) = ssr_kind(msgnum).unwrap();
        w.put(12, u64::from(msgnum));
        let epoch_width = if system == Constellation::Glonass { 17 } else { 20 };
        w.put(epoch_width, 518_000);
        w.put(4, 2); // interval
        w.put(1, 0); // mmi
        assert_eq!(kind, SsrKind::HighRateClock);
        w.put(4, 8); // iod
        w.put(16, 0); // provider
        w.put(4, 0); // solution
        let n_sat_width = if system == Constellation::Qzss { 4 } else { 6 };
        w.put(n_sat_width, sats.len() as u64);
        let id_width = sat_id_width(system);
        for &(id, clock) in sats {
            w.put(id_width, u64::from(id));
            w.put_signed(22, clock);
        }
    }

    #[test]
    fn kind_mapping_covers_madoca_numbers() {
        assert_eq!(ssr_kind(1062), Some((Constellation::Gps, SsrKind::HighRateClock)));
        assert_eq!(ssr_kind(1068), Some((Constellation::Glonass, SsrKind::HighRateClock)));
        assert_eq!(ssr_kind(1057), Some((Constellation::Gps, SsrKind::Orbit)));
        assert_eq!(ssr_kind(1247), Some((Constellation::Qzss, SsrKind::Clock)));
        assert_eq!(ssr_kind(1005), None);
    }

    #[test]
    fn hr_clock_decodes_satellite_list() {
        let mut w = BitWriter::new();
        write_ssr_hr_clock(&mut w, 1062, &[(1, 123), (12, -55)]);
        let bytes = w.into_bytes();
        let msg = decode_ssr(&mut BitCursor::new(&bytes)).unwrap().unwrap();

        assert_eq!(msg.msgnum, 1062);
        assert_eq!(msg.header.iod, 8);
        assert_eq!(msg.header.n_sat, 2);
        assert_eq!(msg.sat_names(), vec!["G01", "G12"]);
        let SsrBody::HighRateClock(v) = &msg.body else {
            panic!("expected high rate clock body");
        };
        assert!((v[0].clock - 0.0123).abs() < 1e-9);
        assert!((v[1].clock + 0.0055).abs() < 1e-9);
    }

    #[test]
    fn glonass_uses_short_epoch_and_id() {
        let mut w = BitWriter::new();
        write_ssr_hr_clock(&mut w, 1068, &[(5, 10)]);
        let bytes = w.into_bytes();
        let msg = decode_ssr(&mut BitCursor::new(&bytes)).unwrap().unwrap();
        assert_eq!(msg.system, Constellation::Glonass);
        assert_eq!(msg.sat_names(), vec!["R05"]);
    }

    #[test]
    fn madoca_frame_carries_a_run_of_messages() {
        // the SSR run is byte-aligned relative to its own start, which
        // sits right after the 33 bits of TOW and week
        let mut run = BitWriter::new();
        write_ssr_hr_clock(&mut run, 1062, &[(1, 100), (2, 200)]);
        run.align_to_byte();
        write_ssr_hr_clock(&mut run, 1068, &[(3, 300)]);

        let mut w = BitWriter::new();
        w.put(20, 601_922); // tow
        w.put(13, 2202); // week
        let run_bits = run.len();
        w.extend_bits(&run.into_bytes(), run_bits);

        // wrap into an L6 frame: MADOCA vendor, alert bit then data part
        let mut dp = BitWriter::new();
        dp.put(1, 0); // alert
        let nbits = w.len();
        dp.extend_bits(&w.into_bytes(), nbits);
        let packed = dp.into_bytes();
        let mut raw = PREAMBLE.to_vec();
        raw.push(209);
        raw.push(0b0010_0000);
        let mut body = vec![0u8; 212];
        body[..packed.len()].copy_from_slice(&packed);
        raw.extend_from_slice(&body);
        raw.extend_from_slice(&[0u8; 32]);
        let frame = crate::l6::L6Frame::decode(&raw).unwrap();

        let summary = MadocaDecoder::new().push_frame(&frame).unwrap();
        assert_eq!(summary.tow, 601_922);
        assert_eq!(summary.week, 2202);
        assert_eq!(summary.messages.len(), 2);
        assert_eq!(summary.messages[0].message.msgnum, 1062);
        assert_eq!(summary.messages[0].message.header.n_sat, 2);
        assert_eq!(summary.messages[1].message.msgnum, 1068);
        assert!(!summary.messages[0].raw.is_empty());
        assert!(summary.errors.is_empty());
    }
}
