//! RTCM 3 framing, message dispatch, and encoding.
//!
//! An RTCM frame is `D3`, six reserved zero bits, a 10-bit payload
//! length, the payload, and CRC-24Q over header plus payload. The framer
//! tolerates arbitrary garbage between frames and re-synchronizes
//! byte-by-byte; a CSSR payload can be re-framed unchanged into a
//! type-4073 envelope with [`encode_frame`].

pub mod msm;

use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bits::BitCursor;
use crate::crc::crc24q;
use crate::framing::bytes::Bytes;
use crate::framing::Constellation;
use crate::prelude::*;
use crate::ssr::{decode_ssr, SsrMessage};

pub use msm::{MsmCell, MsmMessage, MsmSat};

pub const PREAMBLE: u8 = 0xd3;
/// Maximum payload length expressible in the 10-bit length field.
pub const MAX_PAYLOAD: usize = 1023;

/// A CRC-valid RTCM frame's payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RtcmMessage {
    /// Message number from the first 12 payload bits.
    pub number: u16,
    pub payload: Vec<u8>,
}

/// Frame a payload: preamble, 10-bit length, payload, CRC-24Q.
///
/// # Errors
/// [`Error::LengthFail`] when the payload is empty or longer than
/// [`MAX_PAYLOAD`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() || payload.len() > MAX_PAYLOAD {
        return Err(Error::LengthFail {
            stage: Stage::Rtcm,
            value: payload.len(),
            prn: None,
            tow: None,
        });
    }
    let mut frame = Vec::with_capacity(payload.len() + 6);
    frame.push(PREAMBLE);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(payload);
    let crc = crc24q(&frame);
    frame.extend_from_slice(&crc.to_be_bytes()[1..]);
    Ok(frame)
}

/// Iterator of RTCM messages over a byte stream.
pub struct RtcmFrames<R> {
    bytes: Bytes<R>,
}

impl<R: Read> RtcmFrames<R> {
    pub fn new(reader: R) -> Self {
        RtcmFrames {
            bytes: Bytes::new(reader),
        }
    }

    fn read_frame(&mut self) -> Result<Option<Result<RtcmMessage>>> {
        loop {
            let Some(skipped) = self.bytes.scan_sync(&[PREAMBLE])? else {
                return Ok(None);
            };
            if skipped > 0 {
                trace!(skipped, "rtcm resync");
            }
            let mut len_bytes = [0u8; 2];
            if self.bytes.read_exact(&mut len_bytes).is_err() {
                return Ok(None);
            }
            if len_bytes[0] & 0xfc != 0 {
                // reserved bits must be zero; rescan from the next byte
                self.bytes.push(&len_bytes);
                return Ok(Some(Err(Error::SyncLost {
                    stage: Stage::Rtcm,
                    skipped: 1,
                })));
            }
            let len = usize::from(u16::from_be_bytes(len_bytes) & 0x3ff);
            if len == 0 {
                self.bytes.push(&len_bytes);
                return Ok(Some(Err(Error::LengthFail {
                    stage: Stage::Rtcm,
                    value: 0,
                    prn: None,
                    tow: None,
                })));
            }
            let mut rest = vec![0u8; len + 3];
            if self.bytes.read_exact(&mut rest).is_err() {
                return Ok(None);
            }
            let mut frame = vec![PREAMBLE, len_bytes[0], len_bytes[1]];
            frame.extend_from_slice(&rest[..len]);
            if crc24q(&frame).to_be_bytes()[1..] != rest[len..] {
                // keep the bytes after the preamble for rescanning
                let mut stash = len_bytes.to_vec();
                stash.extend_from_slice(&rest);
                self.bytes.push(&stash);
                return Ok(Some(Err(Error::ChecksumFail {
                    stage: Stage::Rtcm,
                    prn: None,
                    tow: None,
                })));
            }
            let payload = rest[..len].to_vec();
            let number = BitCursor::new(&payload).take(12)? as u16;
            return Ok(Some(Ok(RtcmMessage { number, payload })));
        }
    }
}

impl<R: Read> Iterator for RtcmFrames<R> {
    type Item = Result<RtcmMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_frame() {
            Ok(Some(item)) => Some(item),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Decoded view of an RTCM message payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RtcmContent {
    /// 1005/1006 reference station antenna reference point, ECEF meters.
    ReferenceStation {
        station_id: u16,
        x: f64,
        y: f64,
        z: f64,
        antenna_height: Option<f64>,
    },
    /// 1007/1008/1033 antenna and receiver descriptors.
    AntennaInfo {
        station_id: u16,
        antenna: String,
        setup_id: u8,
        antenna_serial: Option<String>,
        receiver: Option<String>,
        firmware: Option<String>,
        receiver_serial: Option<String>,
    },
    /// Broadcast ephemeris; only identity and health are surfaced.
    Ephemeris {
        system: Constellation,
        sat_id: u8,
        health: Option<u8>,
    },
    Msm(MsmMessage),
    Ssr(SsrMessage),
    /// 4073 Compact SSR envelope; the payload is handed to the CSSR
    /// decoder unchanged.
    Cssr { subtype: u8 },
    Unknown,
}

impl RtcmMessage {
    /// Decode the payload by message number.
    pub fn content(&self) -> Result<RtcmContent> {
        let mut cur = BitCursor::new(&self.payload);
        cur.skip(12)?;
        match self.number {
            1005 | 1006 => decode_reference_station(&mut cur, self.number == 1006),
            1007 | 1008 | 1033 => decode_antenna_info(&mut cur, self.number),
            1019 => decode_ephemeris_gps(&mut cur),
            1020 => decode_ephemeris_plain(&mut cur, Constellation::Glonass),
            1041 => decode_ephemeris_navic(&mut cur),
            1042 => decode_ephemeris_bds(&mut cur),
            1044 => decode_ephemeris_qzss(&mut cur),
            1045 | 1046 => decode_ephemeris_plain(&mut cur, Constellation::Galileo),
            n if msm::is_msm(n) => Ok(RtcmContent::Msm(msm::decode_msm(n, &mut cur)?)),
            n if crate::ssr::ssr_kind(n).is_some() => {
                let mut cur = BitCursor::new(&self.payload);
                match decode_ssr(&mut cur)? {
                    Some(msg) => Ok(RtcmContent::Ssr(msg)),
                    None => Ok(RtcmContent::Unknown),
                }
            }
            4073 => {
                let subtype = cur.take(4)? as u8;
                Ok(RtcmContent::Cssr { subtype })
            }
            _ => Ok(RtcmContent::Unknown),
        }
    }
}

fn decode_reference_station(cur: &mut BitCursor<'_>, with_height: bool) -> Result<RtcmContent> {
    let station_id = cur.take(12)? as u16;
    cur.skip(6)?; // ITRF realization year
    cur.skip(4)?; // GPS/GLONASS/Galileo/reference-station indicators
    let x = cur.take_signed(38)? as f64 * 1e-4;
    cur.skip(2)?; // oscillator and reserved
    let y = cur.take_signed(38)? as f64 * 1e-4;
    cur.skip(2)?; // quarter-cycle indicator
    let z = cur.take_signed(38)? as f64 * 1e-4;
    let antenna_height = if with_height {
        Some(cur.take(16)? as f64 * 1e-4)
    } else {
        None
    };
    Ok(RtcmContent::ReferenceStation {
        station_id,
        x,
        y,
        z,
        antenna_height,
    })
}

fn read_string(cur: &mut BitCursor<'_>) -> Result<String> {
    let mut n = cur.take(8)? as usize;
    if n > 31 {
        n = 31;
    }
    let mut s = String::with_capacity(n);
    for _ in 0..n {
        s.push(cur.take(8)? as u8 as char);
    }
    Ok(s)
}

fn decode_antenna_info(cur: &mut BitCursor<'_>, number: u16) -> Result<RtcmContent> {
    let station_id = cur.take(12)? as u16;
    let antenna = read_string(cur)?;
    let setup_id = cur.take(8)? as u8;
    let mut info = RtcmContent::AntennaInfo {
        station_id,
        antenna,
        setup_id,
        antenna_serial: None,
        receiver: None,
        firmware: None,
        receiver_serial: None,
    };
    let RtcmContent::AntennaInfo {
        antenna_serial,
        receiver,
        firmware,
        receiver_serial,
        ..
    } = &mut info
    else {
        unreachable!()
    };
    if number == 1008 || number == 1033 {
        *antenna_serial = Some(read_string(cur)?);
    }
    if number == 1033 {
        *receiver = Some(read_string(cur)?);
        *firmware = Some(read_string(cur)?);
        *receiver_serial = Some(read_string(cur)?);
    }
    Ok(info)
}

fn decode_ephemeris_gps(cur: &mut BitCursor<'_>) -> Result<RtcmContent> {
    let sat_id = cur.take(6)? as u8;
    cur.skip(
        10 + 4 + 2 + 14 + 8 + 16 + 8 + 16 + 22 + 10 + 16 + 16 + 32 + 16 + 32 + 16 + 32 + 16 + 16
            + 32 + 16 + 32 + 16 + 32 + 24 + 8,
    )?;
    let health = cur.take(6)? as u8;
    Ok(RtcmContent::Ephemeris {
        system: Constellation::Gps,
        sat_id,
        health: Some(health),
    })
}

fn decode_ephemeris_qzss(cur: &mut BitCursor<'_>) -> Result<RtcmContent> {
    let sat_id = cur.take(4)? as u8;
    cur.skip(
        16 + 8 + 16 + 22 + 8 + 16 + 16 + 32 + 16 + 32 + 16 + 32 + 16 + 16 + 32 + 16 + 32 + 16
            + 32 + 24 + 14 + 2 + 10 + 4,
    )?;
    let health = cur.take(6)? as u8;
    Ok(RtcmContent::Ephemeris {
        system: Constellation::Qzss,
        sat_id,
        health: Some(health),
    })
}

fn decode_ephemeris_bds(cur: &mut BitCursor<'_>) -> Result<RtcmContent> {
    let sat_id = cur.take(6)? as u8;
    cur.skip(
        13 + 4 + 14 + 5 + 17 + 11 + 22 + 24 + 5 + 18 + 16 + 32 + 18 + 32 + 18 + 32 + 17 + 18
            + 32 + 18 + 32 + 18 + 32 + 24 + 10 + 10,
    )?;
    let health = cur.take(1)? as u8;
    Ok(RtcmContent::Ephemeris {
        system: Constellation::BeiDou,
        sat_id,
        health: Some(health),
    })
}

fn decode_ephemeris_navic(cur: &mut BitCursor<'_>) -> Result<RtcmContent> {
    let sat_id = cur.take(6)? as u8;
    cur.skip(10 + 22 + 16 + 8 + 4 + 16 + 8 + 22 + 8 + 10)?;
    let health = cur.take(2)? as u8;
    Ok(RtcmContent::Ephemeris {
        system: Constellation::Navic,
        sat_id,
        health: Some(health),
    })
}

fn decode_ephemeris_plain(cur: &mut BitCursor<'_>, system: Constellation) -> Result<RtcmContent> {
    let sat_id = cur.take(6)? as u8;
    Ok(RtcmContent::Ephemeris {
        system,
        sat_id,
        health: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitWriter;

    fn frame_with(payload: &[u8]) -> Vec<u8> {
        encode_frame(payload).unwrap()
    }

    #[test]
    fn encode_decode_round_trips_all_lengths() {
        for len in [1usize, 2, 63, 255, 1023] {
            let payload: Vec<u8> = (0..len).map(|i| (i * 7 + len) as u8).collect();
            let frame = frame_with(&payload);
            let messages: Vec<_> = RtcmFrames::new(&frame[..]).collect();
            assert_eq!(messages.len(), 1, "len={len}");
            assert_eq!(messages[0].as_ref().unwrap().payload, payload);
        }
    }

    #[test]
    fn encode_rejects_empty_and_oversize() {
        assert!(encode_frame(&[]).is_err());
        assert!(encode_frame(&vec![0u8; 1024]).is_err());
    }

    #[test]
    fn garbage_between_frames_is_tolerated() {
        let mut w = BitWriter::new();
        w.put(12, 1005);
        w.align_to_byte();
        let payload = w.into_bytes();

        let mut data = vec![0x00, 0xd3, 0x55]; // a stray preamble-ish run
        data.extend_from_slice(&frame_with(&payload));
        data.extend_from_slice(&[0xff, 0xfe]);
        data.extend_from_slice(&frame_with(&payload));

        let messages: Vec<_> = RtcmFrames::new(&data[..])
            .filter_map(|m| m.ok())
            .collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].number, 1005);
    }

    #[test]
    fn nonzero_reserved_bits_resync() {
        // 0xd3 followed by a length whose reserved bits are set
        let mut data = vec![PREAMBLE, 0xff, 0xff];
        data.extend_from_slice(&frame_with(&[0x3e, 0x90]));
        let items: Vec<_> = RtcmFrames::new(&data[..]).collect();
        assert!(matches!(items[0], Err(Error::SyncLost { .. })));
        assert!(items[1].is_ok());
    }

    #[test]
    fn zero_length_is_length_fail() {
        let data = vec![PREAMBLE, 0x00, 0x00, 0xaa, 0xbb, 0xcc];
        let items: Vec<_> = RtcmFrames::new(&data[..]).collect();
        assert!(matches!(items[0], Err(Error::LengthFail { value: 0, .. })));
    }

    #[test]
    fn corrupt_crc_is_checksum_fail_and_stream_recovers() {
        let payload = [0x3e, 0x90, 0x12];
        let mut data = frame_with(&payload);
        let n = data.len();
        data[n - 1] ^= 0x01;
        data.extend_from_slice(&frame_with(&payload));

        let items: Vec<_> = RtcmFrames::new(&data[..]).collect();
        assert!(matches!(items[0], Err(Error::ChecksumFail { .. })));
        let ok: Vec<_> = items.iter().filter(|i| i.is_ok()).collect();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn reference_station_decodes_ecef() {
        let mut w = BitWriter::new();
        w.put(12, 1005);
        w.put(12, 213); // station id
        w.put(6, 0);
        w.put(4, 0b1111);
        w.put_signed(38, -35_284_156_602); // x = -3528415.6602 m
        w.put(2, 0);
        w.put_signed(38, 38_994_486_238);
        w.put(2, 0);
        w.put_signed(38, 35_892_877_851);
        w.align_to_byte();
        let msg = RtcmMessage {
            number: 1005,
            payload: w.into_bytes(),
        };
        let RtcmContent::ReferenceStation { station_id, x, y, z, antenna_height } =
            msg.content().unwrap()
        else {
            panic!("expected reference station");
        };
        assert_eq!(station_id, 213);
        assert!((x - -3_528_415.6602).abs() < 1e-6);
        assert!((y - 3_899_448.6238).abs() < 1e-6);
        assert!((z - 3_589_287.7851).abs() < 1e-6);
        assert_eq!(antenna_height, None);
    }

    #[test]
    fn antenna_info_reads_descriptors() {
        let mut w = BitWriter::new();
        w.put(12, 1033);
        w.put(12, 0);
        for part in ["TRM59800.00", "12345", "NetR9", "5.45", "999"] {
            w.put(8, part.len() as u64);
            for b in part.bytes() {
                w.put(8, u64::from(b));
            }
            if part == "TRM59800.00" {
                w.put(8, 0); // setup id after the antenna descriptor
            }
        }
        w.align_to_byte();
        let msg = RtcmMessage {
            number: 1033,
            payload: w.into_bytes(),
        };
        let RtcmContent::AntennaInfo { antenna, receiver, firmware, .. } = msg.content().unwrap()
        else {
            panic!("expected antenna info");
        };
        assert_eq!(antenna, "TRM59800.00");
        assert_eq!(receiver.as_deref(), Some("NetR9"));
        assert_eq!(firmware.as_deref(), Some("5.45"));
    }

    #[test]
    fn cssr_envelope_reports_subtype() {
        let mut w = BitWriter::new();
        w.put(12, 4073);
        w.put(4, 1);
        w.align_to_byte();
        let msg = RtcmMessage {
            number: 4073,
            payload: w.into_bytes(),
        };
        assert_eq!(msg.content().unwrap(), RtcmContent::Cssr { subtype: 1 });
    }
}
