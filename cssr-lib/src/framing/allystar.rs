//! Allystar HD9310 (option C) L6 raw framing.
//!
//! Frame layout after the `F1 D9 02 10` sync: little-endian payload
//! length (264) and PRN (offset by 700), frequency id, data length byte,
//! big-endian GPS week and millisecond time of week, C/No, a flag byte
//! carrying receiver-side error bits, then 252 bytes of L6 data. A
//! two-byte Fletcher sum over the 268-byte region starting at `02 10`
//! closes the frame.

use std::collections::HashMap;
use std::io::Read;

use tracing::trace;

use super::bytes::Bytes;
use super::{Constellation, FrameFlags, SatFrame, Signal};
use crate::crc::fletcher;
use crate::prelude::*;
use crate::time::GpsTime;

pub const SYNC: [u8; 4] = [0xf1, 0xd9, 0x02, 0x10];
/// Checked region: `02 10` + length + body.
const FRAME_LEN: usize = 268;
/// Expected value of the payload length field.
const PAYLOAD_LEN: u16 = 264;
/// Expected value of the data length field after the -2 bias.
const DATA_LEN: u8 = 63;
/// L6 data bytes carried per frame (250-byte L6 frame plus trailing pad).
pub const L6_DATA_LEN: usize = 252;

/// Iterator of L6 satellite frames over an HD9310 byte stream.
pub struct AllystarFrames<R> {
    bytes: Bytes<R>,
}

impl<R: Read> AllystarFrames<R> {
    pub fn new(reader: R) -> Self {
        AllystarFrames {
            bytes: Bytes::new(reader),
        }
    }

    fn read_frame(&mut self) -> Result<Option<SatFrame>> {
        let Some(skipped) = self.bytes.scan_sync(&SYNC)? else {
            return Ok(None);
        };
        if skipped > 0 {
            trace!(skipped, "allystar resync");
        }

        let mut frame = [0u8; FRAME_LEN];
        frame[0] = SYNC[2];
        frame[1] = SYNC[3];
        if self.bytes.read_exact(&mut frame[2..]).is_err() {
            return Ok(None);
        }
        let mut csum = [0u8; 2];
        if self.bytes.read_exact(&mut csum).is_err() {
            return Ok(None);
        }

        let payload_len = u16::from_le_bytes([frame[2], frame[3]]);
        let prn = u16::from_le_bytes([frame[4], frame[5]]).wrapping_sub(700);
        let data_len = frame[7].wrapping_sub(2);
        let week = u16::from_be_bytes([frame[8], frame[9]]);
        let tow_ms = u32::from_be_bytes([frame[10], frame[11], frame[12], frame[13]]);
        let cno = frame[14];
        let flag = frame[15];

        let (c1, c2) = fletcher(&frame);
        let flags = FrameFlags {
            checksum: csum != [c1, c2],
            payload_len: payload_len != PAYLOAD_LEN,
            data_len: data_len != DATA_LEN,
            reed_solomon: flag & 0x01 != 0,
            week: flag & 0x02 != 0,
            tow: flag & 0x04 != 0,
        };

        Ok(Some(SatFrame {
            constellation: Constellation::Qzss,
            prn,
            signal: Signal::L6,
            time: Some(GpsTime::new(week, tow_ms / 1000)),
            tow_ms: Some(tow_ms),
            cno: Some(f64::from(cno)),
            flags,
            payload: frame[16..].to_vec(),
        }))
    }
}

impl<R: Read> Iterator for AllystarFrames<R> {
    type Item = Result<SatFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

/// The satellite picked for a tick by [`BestSat`].
#[derive(Clone, Debug)]
pub struct L6Pick {
    pub prn: u16,
    pub cno: f64,
    pub time: Option<GpsTime>,
    pub payload: Vec<u8>,
}

/// Per-tick best-satellite selection.
///
/// The receiver tracks several L6 satellites at once but downstream
/// consumers want a single L6 stream. Frames are collected per GPS
/// millisecond tick; when the tick advances, the frame with the highest
/// C/No (or the pinned PRN) is picked. Ties break toward the lowest PRN,
/// and at most one pick is produced per tick.
#[derive(Debug, Default)]
pub struct BestSat {
    pinned: Option<u16>,
    last_tick: Option<u32>,
    table: HashMap<u16, L6Pick>,
}

impl BestSat {
    #[must_use]
    pub fn new(pinned: Option<u16>) -> Self {
        BestSat {
            pinned,
            ..BestSat::default()
        }
    }

    /// Offer a frame; returns the previous tick's pick when `frame` opens
    /// a new tick.
    pub fn offer(&mut self, frame: &SatFrame) -> Option<L6Pick> {
        let tick = frame.tow_ms.unwrap_or(0);
        if self.last_tick.is_none() {
            self.last_tick = Some(tick);
        }

        let mut pick = None;
        if self.last_tick != Some(tick) && !self.table.is_empty() {
            self.last_tick = Some(tick);
            pick = self.take_pick();
            self.table.clear();
        }

        if frame.flags.ok() {
            self.table.insert(
                frame.prn,
                L6Pick {
                    prn: frame.prn,
                    cno: frame.cno.unwrap_or(0.0),
                    time: frame.time,
                    payload: frame.payload.clone(),
                },
            );
        }
        pick
    }

    fn take_pick(&mut self) -> Option<L6Pick> {
        if let Some(pin) = self.pinned {
            return self.table.remove(&pin);
        }
        let best = self
            .table
            .iter()
            .max_by(|(ap, a), (bp, b)| {
                a.cno
                    .partial_cmp(&b.cno)
                    .expect("C/No is never NaN")
                    .then(bp.cmp(ap))
            })
            .map(|(prn, _)| *prn)?;
        self.table.remove(&best)
    }

    /// Flush the pending tick at end of stream.
    pub fn finish(&mut self) -> Option<L6Pick> {
        let pick = self.take_pick();
        self.table.clear();
        pick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_frame(prn: u16, week: u16, tow_ms: u32, cno: u8, flag: u8) -> Vec<u8> {
        let mut frame = vec![0u8; FRAME_LEN];
        frame[0] = 0x02;
        frame[1] = 0x10;
        frame[2..4].copy_from_slice(&PAYLOAD_LEN.to_le_bytes());
        frame[4..6].copy_from_slice(&(prn + 700).to_le_bytes());
        frame[6] = 1; // freq id
        frame[7] = DATA_LEN + 2;
        frame[8..10].copy_from_slice(&week.to_be_bytes());
        frame[10..14].copy_from_slice(&tow_ms.to_be_bytes());
        frame[14] = cno;
        frame[15] = flag;
        for (i, b) in frame[16..].iter_mut().enumerate() {
            *b = (prn as u8).wrapping_add(i as u8);
        }
        let (c1, c2) = fletcher(&frame);
        let mut out = SYNC.to_vec();
        out.extend_from_slice(&frame[2..]);
        out.push(c1);
        out.push(c2);
        out
    }

    #[test]
    fn valid_frame_decodes() {
        let data = build_frame(199, 2202, 423_120_000, 45, 0);
        let mut frames = AllystarFrames::new(&data[..]);
        let frame = frames.next().unwrap().unwrap();
        assert!(frames.next().is_none());

        assert!(frame.flags.ok());
        assert_eq!(frame.prn, 199);
        assert_eq!(frame.cno, Some(45.0));
        assert_eq!(frame.time.unwrap(), GpsTime::new(2202, 423_120));
        assert_eq!(frame.payload.len(), L6_DATA_LEN);
    }

    #[test]
    fn corrupt_checksum_sets_flag_and_stream_continues() {
        let mut data = build_frame(199, 2202, 423_120_000, 45, 0);
        let last = data.len() - 3;
        data[last] ^= 0xff; // corrupt a payload byte
        data.extend_from_slice(&build_frame(200, 2202, 423_120_000, 40, 0));

        let frames: Vec<_> = AllystarFrames::new(&data[..]).collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].as_ref().unwrap().flags.checksum);
        assert!(frames[1].as_ref().unwrap().flags.ok());
    }

    #[test]
    fn receiver_flag_bits_map_to_causes() {
        let data = build_frame(205, 2202, 100_000, 33, 0b0000_0101);
        let frame = AllystarFrames::new(&data[..]).next().unwrap().unwrap();
        assert!(frame.flags.reed_solomon);
        assert!(frame.flags.tow);
        assert!(!frame.flags.week);
    }

    #[test]
    fn garbage_between_frames_is_skipped() {
        let mut data = vec![0xde, 0xad, 0xbe, 0xef];
        data.extend_from_slice(&build_frame(196, 2202, 1000, 41, 0));
        let frame = AllystarFrames::new(&data[..]).next().unwrap().unwrap();
        assert_eq!(frame.prn, 196);
    }

    fn frame_for(prn: u16, tow_ms: u32, cno: u8) -> SatFrame {
        let data = build_frame(prn, 2202, tow_ms, cno, 0);
        AllystarFrames::new(&data[..]).next().unwrap().unwrap()
    }

    #[test]
    fn best_sat_emits_once_per_tick() {
        let mut sel = BestSat::new(None);
        assert!(sel.offer(&frame_for(193, 1000, 30)).is_none());
        assert!(sel.offer(&frame_for(199, 1000, 45)).is_none());
        assert!(sel.offer(&frame_for(205, 1000, 40)).is_none());

        // tick advances: the strongest satellite from the closed tick wins
        let pick = sel.offer(&frame_for(193, 2000, 30)).unwrap();
        assert_eq!(pick.prn, 199);
        assert_eq!(pick.cno, 45.0);

        // still the same tick, nothing more is emitted
        assert!(sel.offer(&frame_for(199, 2000, 44)).is_none());
        let pick = sel.finish().unwrap();
        assert_eq!(pick.prn, 199);
    }

    #[test]
    fn best_sat_ties_break_to_lowest_prn() {
        let mut sel = BestSat::new(None);
        sel.offer(&frame_for(205, 1000, 45));
        sel.offer(&frame_for(199, 1000, 45));
        let pick = sel.offer(&frame_for(199, 2000, 45)).unwrap();
        assert_eq!(pick.prn, 199);
    }

    #[test]
    fn best_sat_honors_pin() {
        let mut sel = BestSat::new(Some(193));
        sel.offer(&frame_for(193, 1000, 10));
        sel.offer(&frame_for(199, 1000, 45));
        let pick = sel.offer(&frame_for(193, 2000, 10)).unwrap();
        assert_eq!(pick.prn, 193);
    }

    #[test]
    fn best_sat_skips_frames_with_errors() {
        let mut sel = BestSat::new(None);
        let data = build_frame(199, 2202, 1000, 45, 0b0000_0001); // RS error
        let bad = AllystarFrames::new(&data[..]).next().unwrap().unwrap();
        sel.offer(&bad);
        sel.offer(&frame_for(193, 1000, 20));
        let pick = sel.offer(&frame_for(193, 2000, 20)).unwrap();
        assert_eq!(pick.prn, 193);
    }
}
