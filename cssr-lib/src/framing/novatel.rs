//! NovAtel OEM7 binary framing.
//!
//! OEM7 long-format blocks are `AA 44 12`, a one-byte header length, the
//! remaining header (message id, message length, GPS week and millisecond
//! time of week), the payload, and a reflected CRC-32 over everything
//! from the sync bytes through the payload.

use std::io::Read;

use tracing::{debug, trace};

use super::bytes::Bytes;
use super::{Constellation, FrameFlags, SatFrame, Signal};
use crate::crc::crc32_reflected;
use crate::prelude::*;
use crate::time::GpsTime;

pub const SYNC: [u8; 3] = [0xaa, 0x44, 0x12];
/// HAS C/NAV page bytes after zero-padding (NovAtel strips CRC and tail).
pub const CNAV_PAGE_LEN: usize = 62;

pub const MSG_QZSSRAWSUBFRAME: u16 = 1330;
pub const MSG_GALCNAVRAWPAGE: u16 = 2239;

/// Iterator of satellite frames over an OEM7 byte stream.
///
/// GALCNAVRAWPAGE blocks become HAS E6B pages and QZSSRAWSUBFRAME blocks
/// become QZSS LNAV subframes; other well-formed blocks are skipped.
pub struct NovFrames<R> {
    bytes: Bytes<R>,
}

impl<R: Read> NovFrames<R> {
    pub fn new(reader: R) -> Self {
        NovFrames {
            bytes: Bytes::new(reader),
        }
    }

    fn read_frame(&mut self) -> Result<Option<Result<SatFrame>>> {
        loop {
            let Some(skipped) = self.bytes.scan_sync(&SYNC)? else {
                return Ok(None);
            };
            if skipped > 0 {
                trace!(skipped, "novatel resync");
            }
            let mut head_len = [0u8; 1];
            if self.bytes.read_exact(&mut head_len).is_err() {
                return Ok(None);
            }
            let head_len = usize::from(head_len[0]);
            if head_len < 4 + 24 {
                return Ok(Some(Err(Error::LengthFail {
                    stage: Stage::Framer,
                    value: head_len,
                    prn: None,
                    tow: None,
                })));
            }
            let mut head = vec![0u8; head_len - 4];
            if self.bytes.read_exact(&mut head).is_err() {
                return Ok(None);
            }

            let msg_id = u16::from_le_bytes([head[0], head[1]]);
            let msg_len = usize::from(u16::from_le_bytes([head[4], head[5]]));
            let week = u16::from_le_bytes([head[10], head[11]]);
            let tow_ms = u32::from_le_bytes([head[12], head[13], head[14], head[15]]);

            let mut payload = vec![0u8; msg_len];
            if self.bytes.read_exact(&mut payload).is_err() {
                return Ok(None);
            }
            let mut crc = [0u8; 4];
            if self.bytes.read_exact(&mut crc).is_err() {
                return Ok(None);
            }
            let mut checked = SYNC.to_vec();
            checked.push(head_len as u8);
            checked.extend_from_slice(&head);
            checked.extend_from_slice(&payload);
            if crc32_reflected(&checked).to_le_bytes() != crc {
                return Ok(Some(Err(Error::ChecksumFail {
                    stage: Stage::Framer,
                    prn: None,
                    tow: Some(tow_ms / 1000),
                })));
            }

            let time = GpsTime::new(week, tow_ms / 1000);
            match msg_id {
                MSG_GALCNAVRAWPAGE => match self.galcnavrawpage(&payload, time, tow_ms) {
                    Ok(frame) => return Ok(Some(Ok(frame))),
                    Err(err) => return Ok(Some(Err(err))),
                },
                MSG_QZSSRAWSUBFRAME => match self.qzssrawsubframe(&payload, time, tow_ms) {
                    Ok(frame) => return Ok(Some(Ok(frame))),
                    Err(err) => return Ok(Some(Err(err))),
                },
                _ => {
                    trace!(msg_id, "novatel block not handled");
                }
            }
        }
    }

    /// GALCNAVRAWPAGE: signal channel, PRN, message id, page id, then the
    /// C/NAV page with the 24-bit CRC and 6 tail bits already removed.
    fn galcnavrawpage(&self, payload: &[u8], time: GpsTime, tow_ms: u32) -> Result<SatFrame> {
        if payload.len() != 4 + 4 + 2 + 2 + 58 {
            debug!(len = payload.len(), "galcnavrawpage length mismatch");
            return Err(Error::LengthFail {
                stage: Stage::Framer,
                value: payload.len(),
                prn: None,
                tow: Some(tow_ms / 1000),
            });
        }
        let prn = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]) as u16;
        let mut page = payload[12..70].to_vec();
        page.resize(CNAV_PAGE_LEN, 0);
        Ok(SatFrame {
            constellation: Constellation::Galileo,
            prn,
            signal: Signal::E6b,
            time: Some(time),
            tow_ms: Some(tow_ms),
            cno: None,
            flags: FrameFlags::default(),
            payload: page,
        })
    }

    /// QZSSRAWSUBFRAME: PRN, subframe id, 32 bytes of raw subframe.
    fn qzssrawsubframe(&self, payload: &[u8], time: GpsTime, tow_ms: u32) -> Result<SatFrame> {
        if payload.len() != 4 + 4 + 32 + 4 {
            debug!(len = payload.len(), "qzssrawsubframe length mismatch");
            return Err(Error::LengthFail {
                stage: Stage::Framer,
                value: payload.len(),
                prn: None,
                tow: Some(tow_ms / 1000),
            });
        }
        let prn = u16::from_le_bytes([payload[0], payload[1]]);
        Ok(SatFrame {
            constellation: Constellation::Qzss,
            prn,
            signal: Signal::QzssLnav,
            time: Some(time),
            tow_ms: Some(tow_ms),
            cno: None,
            flags: FrameFlags::default(),
            payload: payload[8..40].to_vec(),
        })
    }
}

impl<R: Read> Iterator for NovFrames<R> {
    type Item = Result<SatFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_frame() {
            Ok(Some(item)) => Some(item),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}
