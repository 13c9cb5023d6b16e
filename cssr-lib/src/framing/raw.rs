//! Readers for the extracted payload byte formats.
//!
//! These are the stream formats the reader tools emit for downstream
//! consumption: bare 250-byte L6 frames, and {PRN, fixed-size payload}
//! records for HAS pages, L1S messages, and B2b data fields. The L1S
//! archive format additionally carries the receive epoch per record.

use std::io::Read;

use super::{Constellation, FrameFlags, SatFrame, Signal};
use crate::bits::BitCursor;
use crate::prelude::*;
use crate::time::GpsTime;

/// Bare L6 frames, 250 bytes each, no per-frame framing.
pub struct RawL6Frames<R> {
    reader: R,
}

impl<R: Read> RawL6Frames<R> {
    pub fn new(reader: R) -> Self {
        RawL6Frames { reader }
    }
}

impl<R: Read> Iterator for RawL6Frames<R> {
    type Item = Result<SatFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = [0u8; 250];
        if let Err(err) = read_record(&mut self.reader, &mut buf)? {
            return Some(Err(err));
        }
        // PRN sits just after the 4-byte preamble
        Some(Ok(SatFrame {
            constellation: Constellation::Qzss,
            prn: u16::from(buf[4]),
            signal: Signal::L6,
            time: None,
            tow_ms: None,
            cno: None,
            flags: FrameFlags::default(),
            payload: buf.to_vec(),
        }))
    }
}

/// {PRN, payload} records of a fixed payload size.
struct PrnRecords<R, const N: usize> {
    reader: R,
}

impl<R: Read, const N: usize> Iterator for PrnRecords<R, N> {
    type Item = Result<(u16, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rec = vec![0u8; N + 1];
        if let Err(err) = read_record(&mut self.reader, &mut rec)? {
            return Some(Err(err));
        }
        Some(Ok((u16::from(rec[0]), rec[1..].to_vec())))
    }
}

/// Galileo HAS pages: {PRN, 62 bytes}.
pub struct HasPageRecords<R> {
    inner: PrnRecords<R, 62>,
}

impl<R: Read> HasPageRecords<R> {
    pub fn new(reader: R) -> Self {
        HasPageRecords {
            inner: PrnRecords { reader },
        }
    }
}

impl<R: Read> Iterator for HasPageRecords<R> {
    type Item = Result<SatFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let (prn, payload) = match self.inner.next()? {
            Ok(rec) => rec,
            Err(err) => return Some(Err(err)),
        };
        Some(Ok(SatFrame {
            constellation: Constellation::Galileo,
            prn,
            signal: Signal::E6b,
            time: None,
            tow_ms: None,
            cno: None,
            flags: FrameFlags::default(),
            payload,
        }))
    }
}

/// BeiDou B2b data fields: {PRN, 62 bytes}.
pub struct B2bRecords<R> {
    inner: PrnRecords<R, 62>,
}

impl<R: Read> B2bRecords<R> {
    pub fn new(reader: R) -> Self {
        B2bRecords {
            inner: PrnRecords { reader },
        }
    }
}

impl<R: Read> Iterator for B2bRecords<R> {
    type Item = Result<SatFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let (prn, payload) = match self.inner.next()? {
            Ok(rec) => rec,
            Err(err) => return Some(Err(err)),
        };
        Some(Ok(SatFrame {
            constellation: Constellation::BeiDou,
            prn,
            signal: Signal::B2b,
            time: None,
            tow_ms: None,
            cno: None,
            flags: FrameFlags::default(),
            payload,
        }))
    }
}

/// QZSS L1S / SBAS messages: {PRN, 32 bytes} (250 bits zero-padded).
pub struct L1sRecords<R> {
    inner: PrnRecords<R, 32>,
}

impl<R: Read> L1sRecords<R> {
    pub fn new(reader: R) -> Self {
        L1sRecords {
            inner: PrnRecords { reader },
        }
    }
}

impl<R: Read> Iterator for L1sRecords<R> {
    type Item = Result<SatFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let (prn, payload) = match self.inner.next()? {
            Ok(rec) => rec,
            Err(err) => return Some(Err(err)),
        };
        Some(Ok(l1s_frame(prn, None, payload)))
    }
}

/// L1S archive files: one leading PRN byte, then 36-byte records of
/// {GPS week (12), TOW (20), 250-bit message, 6 pad bits}.
pub struct L1sArchive<R> {
    reader: R,
    prn: Option<u16>,
}

impl<R: Read> L1sArchive<R> {
    pub fn new(reader: R) -> Self {
        L1sArchive { reader, prn: None }
    }
}

impl<R: Read> Iterator for L1sArchive<R> {
    type Item = Result<SatFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.prn.is_none() {
            let mut b = [0u8; 1];
            if let Err(err) = read_record(&mut self.reader, &mut b)? {
                return Some(Err(err));
            }
            self.prn = Some(u16::from(b[0]));
        }
        let mut rec = [0u8; 36];
        if let Err(err) = read_record(&mut self.reader, &mut rec)? {
            return Some(Err(err));
        }

        let mut cur = BitCursor::new(&rec);
        let week = cur.take(12).expect("fixed record") as u16;
        let tow = cur.take(20).expect("fixed record") as u32;
        let payload = cur.take_bytes(250).expect("fixed record");
        Some(Ok(l1s_frame(
            self.prn.expect("read above"),
            Some(GpsTime::new(week, tow)),
            payload,
        )))
    }
}

fn l1s_frame(prn: u16, time: Option<GpsTime>, payload: Vec<u8>) -> SatFrame {
    SatFrame {
        constellation: if (120..=158).contains(&prn) {
            Constellation::Sbas
        } else {
            Constellation::Qzss
        },
        prn,
        signal: Signal::L1s,
        time,
        tow_ms: None,
        cno: None,
        flags: FrameFlags::default(),
        payload,
    }
}

/// Fill `buf` from the reader; `None` on clean EOF at a record boundary.
fn read_record<R: Read>(reader: &mut R, buf: &mut [u8]) -> Option<Result<()>> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return None,
            Ok(0) => return None, // partial trailing record is dropped
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Some(Err(Error::Io(err))),
        }
    }
    Some(Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l6_frames_split_on_250_bytes() {
        let mut data = vec![0x1a, 0xcf, 0xfc, 0x1d, 199];
        data.resize(250, 0);
        let mut second = vec![0x1a, 0xcf, 0xfc, 0x1d, 205];
        second.resize(250, 0);
        data.extend_from_slice(&second);

        let frames: Vec<_> = RawL6Frames::new(&data[..]).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap().prn, 199);
        assert_eq!(frames[1].as_ref().unwrap().prn, 205);
    }

    #[test]
    fn partial_trailing_record_is_dropped() {
        let data = vec![0u8; 100];
        assert!(RawL6Frames::new(&data[..]).next().is_none());
    }

    #[test]
    fn has_records_carry_prn_prefix() {
        let mut data = vec![12u8];
        data.extend_from_slice(&[0xaa; 62]);
        let frame = HasPageRecords::new(&data[..]).next().unwrap().unwrap();
        assert_eq!(frame.prn, 12);
        assert_eq!(frame.payload, vec![0xaa; 62]);
    }

    #[test]
    fn l1s_archive_parses_epoch_per_record() {
        let mut data = vec![186u8];
        // week 2280, tow 41076
        let mut rec = [0u8; 36];
        rec[0] = (2280 >> 4) as u8;
        rec[1] = ((2280 & 0xf) << 4) as u8 | ((41076 >> 16) & 0xf) as u8;
        rec[2] = ((41076 >> 8) & 0xff) as u8;
        rec[3] = (41076 & 0xff) as u8;
        data.extend_from_slice(&rec);

        let frame = L1sArchive::new(&data[..]).next().unwrap().unwrap();
        assert_eq!(frame.prn, 186);
        let t = frame.time.unwrap();
        assert_eq!(t.week, 2280);
        assert_eq!(t.tow, 41076);
        assert_eq!(frame.payload.len(), 32);
    }

    #[test]
    fn sbas_prn_range_classifies_constellation() {
        let mut data = vec![129u8];
        data.extend_from_slice(&[0u8; 32]);
        let frame = L1sRecords::new(&data[..]).next().unwrap().unwrap();
        assert_eq!(frame.constellation, Constellation::Sbas);
    }
}
