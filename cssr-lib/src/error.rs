use serde::{Deserialize, Serialize};

/// Pipeline stage an error was observed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Framer,
    Reassembler,
    Decoder,
    Rtcm,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Framer => "framer",
            Stage::Reassembler => "reassembler",
            Stage::Decoder => "decoder",
            Stage::Rtcm => "rtcm",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Sync marker lost; the framer skipped bytes to re-synchronize.
    #[error("[{stage}] sync lost after {skipped} byte(s)")]
    SyncLost { stage: Stage, skipped: usize },

    #[error("[{stage}] checksum mismatch{}", fmt_sat(*.prn, *.tow))]
    ChecksumFail {
        stage: Stage,
        prn: Option<u16>,
        tow: Option<u32>,
    },

    #[error("[{stage}] bad length field {value}{}", fmt_sat(*.prn, *.tow))]
    LengthFail {
        stage: Stage,
        value: usize,
        prn: Option<u16>,
        tow: Option<u32>,
    },

    /// Reed-Solomon decoding could not recover the message.
    #[error("[{stage}] RS decode failed: {reason}{}", fmt_sat(*.prn, None))]
    RsUncorrectable {
        stage: Stage,
        prn: Option<u16>,
        reason: String,
    },

    /// A page joined a HAS group whose message size disagrees.
    #[error("[reassembler] MS mismatch for MID {mid}: kept {kept}, got {got}")]
    MsMismatch { mid: u8, kept: u8, got: u8 },

    #[error("[decoder] IODSSR mismatch (active={active}, msg={msg})")]
    IodssrMismatch { active: u8, msg: u8 },

    #[error("[decoder] waiting for mask")]
    MaskAbsent,

    #[error("[decoder] unknown subtype {subtype}")]
    UnknownSubtype { subtype: u8 },

    #[error("[{stage}] payload too short: have {have} bits, need {need}")]
    ShortPayload {
        stage: Stage,
        have: usize,
        need: usize,
    },
}

fn fmt_sat(prn: Option<u16>, tow: Option<u32>) -> String {
    match (prn, tow) {
        (Some(prn), Some(tow)) => format!(" (prn {prn}, tow {tow})"),
        (Some(prn), None) => format!(" (prn {prn})"),
        (None, Some(tow)) => format!(" (tow {tow})"),
        (None, None) => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stage_and_satellite() {
        let err = Error::ChecksumFail {
            stage: Stage::Framer,
            prn: Some(199),
            tow: Some(423_120),
        };
        assert_eq!(
            err.to_string(),
            "[framer] checksum mismatch (prn 199, tow 423120)"
        );
    }

    #[test]
    fn display_iodssr_mismatch() {
        let err = Error::IodssrMismatch { active: 3, msg: 7 };
        assert_eq!(err.to_string(), "[decoder] IODSSR mismatch (active=3, msg=7)");
    }
}
