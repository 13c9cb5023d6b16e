//! u-blox UBX raw framing (RXM-SFRBX and RXM-PMP).
//!
//! UBX frames are `B5 62`, class, id, little-endian length, payload, and
//! an 8-bit Fletcher checksum over class through payload. RXM-SFRBX
//! carries broadcast navigation words as u32s that need per-word byte
//! reversal; the GNSS id / signal id pair selects what the words are.

use std::io::Read;

use tracing::{debug, trace};

use super::bytes::Bytes;
use super::{Constellation, FrameFlags, SatFrame, Signal};
use crate::crc::fletcher;
use crate::prelude::*;

pub const SYNC: [u8; 2] = [0xb5, 0x62];
const CLS_RXM: u8 = 0x02;
const ID_SFRBX: u8 = 0x13;
const ID_PMP: u8 = 0x72;
/// L1S message bytes after u32 permutation (250 bits zero-padded).
pub const L1S_LEN: usize = 32;

/// Reverse the byte order within each 4-byte word.
pub(crate) fn u4perm(words: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; words.len()];
    for (src, dst) in words.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
        dst[0] = src[3];
        dst[1] = src[2];
        dst[2] = src[1];
        dst[3] = src[0];
    }
    out
}

fn gnss_of(gnssid: u8) -> Option<Constellation> {
    Some(match gnssid {
        0 => Constellation::Gps,
        1 => Constellation::Sbas,
        2 => Constellation::Galileo,
        3 => Constellation::BeiDou,
        5 => Constellation::Qzss,
        6 => Constellation::Glonass,
        7 => Constellation::Navic,
        _ => return None,
    })
}

/// Iterator of satellite frames over a UBX byte stream.
///
/// Only the blocks this pipeline consumes are surfaced: QZSS L1S and SBAS
/// L1 C/A from RXM-SFRBX, QZSS LNAV subframes, and the L1S records RXM-PMP
/// delivers. Everything else is skipped with a trace note.
pub struct UbxFrames<R> {
    bytes: Bytes<R>,
    pending: Vec<SatFrame>,
}

impl<R: Read> UbxFrames<R> {
    pub fn new(reader: R) -> Self {
        UbxFrames {
            bytes: Bytes::new(reader),
            pending: Vec::new(),
        }
    }

    fn read_block(&mut self) -> Result<Option<(u8, u8, Vec<u8>, bool)>> {
        let Some(skipped) = self.bytes.scan_sync(&SYNC)? else {
            return Ok(None);
        };
        if skipped > 0 {
            trace!(skipped, "ubx resync");
        }
        let mut head = [0u8; 4];
        if self.bytes.read_exact(&mut head).is_err() {
            return Ok(None);
        }
        let (class, id) = (head[0], head[1]);
        let len = usize::from(u16::from_le_bytes([head[2], head[3]]));
        let mut payload = vec![0u8; len];
        if self.bytes.read_exact(&mut payload).is_err() {
            return Ok(None);
        }
        let mut ck = [0u8; 2];
        if self.bytes.read_exact(&mut ck).is_err() {
            return Ok(None);
        }
        let mut checked = head.to_vec();
        checked.extend_from_slice(&payload);
        let (c1, c2) = fletcher(&checked);
        Ok(Some((class, id, payload, ck == [c1, c2])))
    }

    fn sfrbx(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() < 8 {
            return Err(Error::LengthFail {
                stage: Stage::Framer,
                value: payload.len(),
                prn: None,
                tow: None,
            });
        }
        let gnssid = payload[0];
        let svid = payload[1];
        let sigid = payload[2];
        let n_words = usize::from(payload[4]);
        let version = payload[6];
        if version != 0x02 {
            debug!(version, "sfrbx version should be 2");
            return Ok(());
        }
        if payload.len() - 8 != n_words * 4 {
            return Err(Error::LengthFail {
                stage: Stage::Framer,
                value: payload.len() - 8,
                prn: Some(u16::from(svid)),
                tow: None,
            });
        }
        let Some(constellation) = gnss_of(gnssid) else {
            trace!(gnssid, "sfrbx gnss id not handled");
            return Ok(());
        };
        let words = u4perm(&payload[8..]);

        let frame = match (constellation, sigid) {
            // QZSS L1S uses the SBAS-overlay PRN numbering
            (Constellation::Qzss, 1) => SatFrame {
                constellation: Constellation::Qzss,
                prn: u16::from(svid) + 182,
                signal: Signal::L1s,
                time: None,
                tow_ms: None,
                cno: None,
                flags: FrameFlags::default(),
                payload: pad_to(&words, L1S_LEN),
            },
            (Constellation::Sbas, 0) => SatFrame {
                constellation: Constellation::Sbas,
                prn: u16::from(svid),
                signal: Signal::L1s,
                time: None,
                tow_ms: None,
                cno: None,
                flags: FrameFlags::default(),
                payload: pad_to(&words, L1S_LEN),
            },
            (Constellation::Qzss, 0) => SatFrame {
                constellation: Constellation::Qzss,
                prn: u16::from(svid),
                signal: Signal::QzssLnav,
                time: None,
                tow_ms: None,
                cno: None,
                flags: FrameFlags::default(),
                payload: words,
            },
            _ => {
                trace!(gnssid, sigid, "sfrbx signal not handled");
                return Ok(());
            }
        };
        self.pending.push(frame);
        Ok(())
    }

    fn pmp(&mut self, payload: &[u8]) -> Result<()> {
        // version, reserved, then a little-endian user data length; the
        // user data carries {PRN, 32-byte L1S message} records.
        if payload.len() < 24 {
            return Err(Error::LengthFail {
                stage: Stage::Framer,
                value: payload.len(),
                prn: None,
                tow: None,
            });
        }
        let n_user = usize::from(u16::from_le_bytes([payload[2], payload[3]]));
        let user = payload
            .get(24..24 + n_user)
            .ok_or(Error::LengthFail {
                stage: Stage::Framer,
                value: payload.len(),
                prn: None,
                tow: None,
            })?;
        for rec in user.chunks_exact(1 + L1S_LEN) {
            let prn = u16::from(rec[0]);
            self.pending.push(SatFrame {
                constellation: if (120..=158).contains(&prn) {
                    Constellation::Sbas
                } else {
                    Constellation::Qzss
                },
                prn,
                signal: Signal::L1s,
                time: None,
                tow_ms: None,
                cno: None,
                flags: FrameFlags::default(),
                payload: rec[1..].to_vec(),
            });
        }
        Ok(())
    }
}

fn pad_to(data: &[u8], len: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    out.truncate(len);
    out.resize(len, 0);
    out
}

impl<R: Read> Iterator for UbxFrames<R> {
    type Item = Result<SatFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.pending.is_empty() {
                return Some(Ok(self.pending.remove(0)));
            }
            let (class, id, payload, ck_ok) = match self.read_block() {
                Ok(Some(block)) => block,
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            };
            if !ck_ok {
                return Some(Err(Error::ChecksumFail {
                    stage: Stage::Framer,
                    prn: None,
                    tow: None,
                }));
            }
            let zult = match (class, id) {
                (CLS_RXM, ID_SFRBX) => self.sfrbx(&payload),
                (CLS_RXM, ID_PMP) => self.pmp(&payload),
                _ => {
                    trace!(class, id, "ubx block not handled");
                    Ok(())
                }
            };
            if let Err(err) = zult {
                return Some(Err(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_sfrbx(gnssid: u8, svid: u8, sigid: u8, words: &[u8]) -> Vec<u8> {
        assert_eq!(words.len() % 4, 0);
        let mut payload = vec![
            gnssid,
            svid,
            sigid,
            0,
            (words.len() / 4) as u8,
            0,
            0x02,
            0,
        ];
        payload.extend_from_slice(words);
        let mut block = vec![CLS_RXM, ID_SFRBX];
        block.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        block.extend_from_slice(&payload);
        let (c1, c2) = fletcher(&block);
        let mut out = SYNC.to_vec();
        out.extend_from_slice(&block);
        out.push(c1);
        out.push(c2);
        out
    }

    #[test]
    fn u4perm_reverses_each_word() {
        assert_eq!(
            u4perm(&[1, 2, 3, 4, 5, 6, 7, 8]),
            vec![4, 3, 2, 1, 8, 7, 6, 5]
        );
    }

    #[test]
    fn qzss_l1s_frame_gets_overlay_prn() {
        let words: Vec<u8> = (0..32).collect();
        let data = build_sfrbx(5, 4, 1, &words);
        let frame = UbxFrames::new(&data[..]).next().unwrap().unwrap();
        assert_eq!(frame.prn, 186);
        assert_eq!(frame.signal, Signal::L1s);
        assert_eq!(frame.payload.len(), L1S_LEN);
        assert_eq!(frame.payload[..4], [3, 2, 1, 0]);
    }

    #[test]
    fn unhandled_signals_are_skipped() {
        let words: Vec<u8> = (0..32).collect();
        let mut data = build_sfrbx(0, 7, 0, &words); // GPS L1CA
        data.extend_from_slice(&build_sfrbx(5, 2, 1, &words));
        let frames: Vec<_> = UbxFrames::new(&data[..]).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap().prn, 184);
    }

    #[test]
    fn bad_checksum_is_tagged_and_stream_continues() {
        let words: Vec<u8> = (0..32).collect();
        let mut data = build_sfrbx(5, 4, 1, &words);
        let n = data.len();
        data[n - 1] ^= 0xff;
        data.extend_from_slice(&build_sfrbx(5, 4, 1, &words));

        let frames: Vec<_> = UbxFrames::new(&data[..]).collect();
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            frames[0],
            Err(Error::ChecksumFail { stage: Stage::Framer, .. })
        ));
        assert!(frames[1].is_ok());
    }

    #[test]
    fn pmp_user_data_yields_l1s_records() {
        let mut payload = vec![0u8; 24];
        payload[0] = 1; // version
        let mut user = vec![186u8];
        user.extend_from_slice(&[0xab; L1S_LEN]);
        payload[2..4].copy_from_slice(&(user.len() as u16).to_le_bytes());
        payload.extend_from_slice(&user);

        let mut block = vec![CLS_RXM, ID_PMP];
        block.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        block.extend_from_slice(&payload);
        let (c1, c2) = fletcher(&block);
        let mut data = SYNC.to_vec();
        data.extend_from_slice(&block);
        data.push(c1);
        data.push(c2);

        let frame = UbxFrames::new(&data[..]).next().unwrap().unwrap();
        assert_eq!(frame.prn, 186);
        assert_eq!(frame.payload, vec![0xab; L1S_LEN]);
    }
}
