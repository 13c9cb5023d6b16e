//! Pocket SDR log framing.
//!
//! Pocket SDR writes one text record per decoded symbol block. The
//! records this pipeline consumes are `$L6FRM` (QZSS L6 frames), `$CNAV`
//! (Galileo E6B HAS pages), `$INAV` (Galileo E1B pages), and `$BCNAV3`
//! (BeiDou B2b pages), each carrying a satellite id field and a
//! hex-encoded payload.

use std::io::{BufRead, BufReader, Read};

use regex::Regex;
use tracing::{debug, trace};

use super::{Constellation, FrameFlags, SatFrame, Signal};
use crate::bits::BitCursor;
use crate::framing::septentrio::{B2B_DATA_LEN, B2B_PREAMBLE};
use crate::prelude::*;

/// QZS L6 frame bytes per record.
pub const L6_FRAME_LEN: usize = 250;
/// HAS C/NAV page bytes after padding.
pub const CNAV_PAGE_LEN: usize = 62;
/// BCNAV3 page bytes.
const BCNAV3_LEN: usize = 125;

pub(crate) fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Iterator of satellite frames over a Pocket SDR log.
pub struct PsdrLines<R> {
    lines: std::io::Lines<BufReader<R>>,
    record: Regex,
}

impl<R: Read> PsdrLines<R> {
    pub fn new(reader: R) -> Self {
        PsdrLines {
            lines: BufReader::new(reader).lines(),
            record: Regex::new(r"^\$(L6FRM|CNAV|INAV|BCNAV3),").expect("pattern compiles"),
        }
    }

    fn parse(&self, line: &str) -> Result<Option<SatFrame>> {
        let Some(caps) = self.record.captures(line) else {
            return Ok(None);
        };
        let fields: Vec<&str> = line.split(',').collect();
        let kind = caps.get(1).expect("group 1 always captures").as_str();
        let hex_field = if kind == "L6FRM" { 5 } else { 4 };
        let (Some(satid), Some(hex)) = (fields.get(3), fields.get(hex_field)) else {
            debug!(line, "short pocket sdr record");
            return Ok(None);
        };
        let Ok(satid) = satid.parse::<u16>() else {
            debug!(line, "bad satellite id");
            return Ok(None);
        };
        let Some(raw) = hex_decode(hex.trim()) else {
            debug!(line, "bad hex payload");
            return Ok(None);
        };

        let frame = match kind {
            "L6FRM" => {
                if raw.len() != L6_FRAME_LEN {
                    return Err(self.length_fail(raw.len(), satid));
                }
                SatFrame {
                    constellation: Constellation::Qzss,
                    prn: satid,
                    signal: Signal::L6,
                    time: None,
                    tow_ms: None,
                    cno: None,
                    flags: FrameFlags::default(),
                    payload: raw,
                }
            }
            "CNAV" => {
                let mut page = raw;
                if page.len() != CNAV_PAGE_LEN - 1 {
                    return Err(self.length_fail(page.len(), satid));
                }
                page.resize(CNAV_PAGE_LEN, 0);
                SatFrame {
                    constellation: Constellation::Galileo,
                    prn: satid,
                    signal: Signal::E6b,
                    time: None,
                    tow_ms: None,
                    cno: None,
                    flags: FrameFlags::default(),
                    payload: page,
                }
            }
            "INAV" => SatFrame {
                constellation: Constellation::Galileo,
                prn: satid,
                signal: Signal::INav,
                time: None,
                tow_ms: None,
                cno: None,
                flags: FrameFlags::default(),
                payload: raw,
            },
            "BCNAV3" => {
                if raw.len() != BCNAV3_LEN {
                    return Err(self.length_fail(raw.len(), satid));
                }
                let mut cur = BitCursor::new(&raw);
                let mut flags = FrameFlags::default();
                if cur.take(16)? as u16 != B2B_PREAMBLE {
                    trace!(satid, "bcnav3 preamble mismatch");
                    flags.checksum = true;
                }
                cur.skip(6 + 6)?;
                let data = cur.take_bytes(486)?;
                debug_assert_eq!(data.len(), B2B_DATA_LEN);
                SatFrame {
                    constellation: Constellation::BeiDou,
                    prn: satid,
                    signal: Signal::B2b,
                    time: None,
                    tow_ms: None,
                    cno: None,
                    flags,
                    payload: data,
                }
            }
            _ => unreachable!("pattern restricts record kinds"),
        };
        Ok(Some(frame))
    }

    fn length_fail(&self, value: usize, prn: u16) -> Error {
        Error::LengthFail {
            stage: Stage::Framer,
            value,
            prn: Some(prn),
            tow: None,
        }
    }
}

impl<R: Read> Iterator for PsdrLines<R> {
    type Item = Result<SatFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(Error::Io(err))),
            };
            match self.parse(line.trim()) {
                Ok(Some(frame)) => return Some(Ok(frame)),
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_decode_round_trip() {
        assert_eq!(hex_decode("deadBEEF"), Some(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(hex_decode("abc"), None);
        assert_eq!(hex_decode("zz"), None);
    }

    #[test]
    fn cnav_record_is_padded_to_full_page() {
        let hex = "ab".repeat(61);
        let line = format!("$CNAV,2023,063900.0,17,{hex}\n$OBS,ignored\n");
        let frames: Vec<_> = PsdrLines::new(line.as_bytes()).collect();
        assert_eq!(frames.len(), 1);
        let frame = frames[0].as_ref().unwrap();
        assert_eq!(frame.prn, 17);
        assert_eq!(frame.signal, Signal::E6b);
        assert_eq!(frame.payload.len(), CNAV_PAGE_LEN);
        assert_eq!(frame.payload[61], 0);
    }

    #[test]
    fn l6frm_record_uses_sixth_field() {
        let hex = "1a".repeat(250);
        let line = format!("$L6FRM,1,2,199,4,{hex}");
        let frame = PsdrLines::new(line.as_bytes()).next().unwrap().unwrap();
        assert_eq!(frame.prn, 199);
        assert_eq!(frame.signal, Signal::L6);
        assert_eq!(frame.payload.len(), L6_FRAME_LEN);
    }

    #[test]
    fn bcnav3_record_extracts_data_field() {
        let mut page = vec![0u8; BCNAV3_LEN];
        page[0] = 0xeb;
        page[1] = 0x90;
        let hex: String = page.iter().map(|b| format!("{b:02x}")).collect();
        let line = format!("$BCNAV3,1,2,60,{hex}");
        let frame = PsdrLines::new(line.as_bytes()).next().unwrap().unwrap();
        assert_eq!(frame.prn, 60);
        assert_eq!(frame.signal, Signal::B2b);
        assert!(frame.flags.ok());
        assert_eq!(frame.payload.len(), B2B_DATA_LEN);
    }

    #[test]
    fn unrelated_lines_are_skipped() {
        let data = "$OBS,1,2,3\nnoise\n";
        assert!(PsdrLines::new(data.as_bytes()).next().is_none());
    }

    #[test]
    fn short_l6_payload_is_tagged() {
        let line = format!("$L6FRM,1,2,199,4,{}", "1a".repeat(10));
        let item = PsdrLines::new(line.as_bytes()).next().unwrap();
        assert!(matches!(item, Err(Error::LengthFail { value: 10, .. })));
    }
}
