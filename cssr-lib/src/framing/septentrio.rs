//! Septentrio SBF framing.
//!
//! SBF blocks are `$@`, a 16-bit CRC, block id, and a total length that
//! must be a multiple of four; the CRC-16-CCITT covers everything after
//! the CRC field. Raw navigation bits arrive as little-endian u32 words
//! and need per-word byte reversal before bit-level parsing.

use std::io::Read;

use tracing::{debug, trace};

use super::bytes::Bytes;
use super::ublox::u4perm;
use super::{Constellation, FrameFlags, SatFrame, Signal};
use crate::bits::BitCursor;
use crate::crc::crc16_ccitt;
use crate::prelude::*;
use crate::time::GpsTime;

pub const SYNC: [u8; 2] = [0x24, 0x40];

pub const BLOCK_GALRAWCNAV: u16 = 4024;
pub const BLOCK_QZSRAWL6: u16 = 4069;
pub const BLOCK_BDSRAWB2B: u16 = 4242;

/// BeiDou B2b preamble on BCNAV3 pages.
pub const B2B_PREAMBLE: u16 = 0xeb90;
/// B2b data field: message type + data + CRC, zero-padded to bytes.
pub const B2B_DATA_LEN: usize = 62;

/// Iterator of satellite frames over an SBF byte stream.
pub struct SbfFrames<R> {
    bytes: Bytes<R>,
}

impl<R: Read> SbfFrames<R> {
    pub fn new(reader: R) -> Self {
        SbfFrames {
            bytes: Bytes::new(reader),
        }
    }

    fn read_frame(&mut self) -> Result<Option<Result<SatFrame>>> {
        loop {
            let Some(skipped) = self.bytes.scan_sync(&SYNC)? else {
                return Ok(None);
            };
            if skipped > 0 {
                trace!(skipped, "sbf resync");
            }
            let mut head = [0u8; 6];
            if self.bytes.read_exact(&mut head).is_err() {
                return Ok(None);
            }
            let crc = [head[0], head[1]];
            let block_id = u16::from_le_bytes([head[2], head[3]]);
            let msg_len = usize::from(u16::from_le_bytes([head[4], head[5]]));
            if msg_len % 4 != 0 || msg_len < 8 {
                return Ok(Some(Err(Error::LengthFail {
                    stage: Stage::Framer,
                    value: msg_len,
                    prn: None,
                    tow: None,
                })));
            }
            let mut payload = vec![0u8; msg_len - 8];
            if self.bytes.read_exact(&mut payload).is_err() {
                return Ok(None);
            }
            let mut checked = head[2..].to_vec();
            checked.extend_from_slice(&payload);
            if crc16_ccitt(&checked).to_le_bytes() != crc {
                return Ok(Some(Err(Error::ChecksumFail {
                    stage: Stage::Framer,
                    prn: None,
                    tow: None,
                })));
            }

            match block_id {
                BLOCK_GALRAWCNAV => return Ok(Some(self.galrawcnav(&payload))),
                BLOCK_QZSRAWL6 => return Ok(Some(self.qzsrawl6(&payload))),
                BLOCK_BDSRAWB2B => return Ok(Some(self.bdsrawb2b(&payload))),
                _ => {
                    trace!(block_id, "sbf block not handled");
                }
            }
        }
    }

    fn raw_header(&self, payload: &[u8], nav_len: usize) -> Result<(GpsTime, u32, u8, u8)> {
        if payload.len() < 12 + nav_len {
            return Err(Error::LengthFail {
                stage: Stage::Framer,
                value: payload.len(),
                prn: None,
                tow: None,
            });
        }
        let tow_ms = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let week = u16::from_le_bytes([payload[4], payload[5]]);
        let svid = payload[6];
        let source = payload[9];
        Ok((GpsTime::new(week, tow_ms / 1000), tow_ms, svid, source))
    }

    /// GALRawCNAV: HAS E6B page, 64 nav bytes of which 62 carry the page.
    fn galrawcnav(&self, payload: &[u8]) -> Result<SatFrame> {
        let (time, tow_ms, svid, _) = self.raw_header(payload, 64)?;
        let nav = u4perm(&payload[12..76]);
        Ok(SatFrame {
            constellation: Constellation::Galileo,
            prn: u16::from(svid.wrapping_sub(70)),
            signal: Signal::E6b,
            time: Some(time),
            tow_ms: Some(tow_ms),
            cno: None,
            flags: FrameFlags::default(),
            payload: nav[..62].to_vec(),
        })
    }

    /// QZSRawL6: 252 bytes of L6 frame data.
    fn qzsrawl6(&self, payload: &[u8]) -> Result<SatFrame> {
        let (time, tow_ms, svid, source) = self.raw_header(payload, 252)?;
        let nav = u4perm(&payload[12..264]);
        if source != 1 {
            debug!(svid, source, "qzsrawl6 from L6E");
        }
        Ok(SatFrame {
            constellation: Constellation::Qzss,
            prn: u16::from(svid.wrapping_sub(180)) + 192,
            signal: Signal::L6,
            time: Some(time),
            tow_ms: Some(tow_ms),
            cno: None,
            flags: FrameFlags::default(),
            payload: nav,
        })
    }

    /// BDSRawB2b: extract the 486-bit data field following preamble and PRN.
    fn bdsrawb2b(&self, payload: &[u8]) -> Result<SatFrame> {
        let (time, tow_ms, svid, _) = self.raw_header(payload, 124)?;
        let prn = if svid <= 180 {
            u16::from(svid) - 140
        } else {
            u16::from(svid) - 182
        };
        let nav = u4perm(&payload[12..136]);
        let mut cur = BitCursor::new(&nav);
        let preamble = cur.take(16)? as u16;
        let mut flags = FrameFlags::default();
        if preamble != B2B_PREAMBLE {
            debug!(prn, preamble, "bcnav3 preamble mismatch");
            flags.checksum = true;
        }
        cur.skip(6 + 6)?; // page PRN and revision
        let data = cur.take_bytes(486)?;
        Ok(SatFrame {
            constellation: Constellation::BeiDou,
            prn,
            signal: Signal::B2b,
            time: Some(time),
            tow_ms: Some(tow_ms),
            cno: None,
            flags,
            payload: data,
        })
    }
}

impl<R: Read> Iterator for SbfFrames<R> {
    type Item = Result<SatFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_frame() {
            Ok(Some(item)) => Some(item),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
