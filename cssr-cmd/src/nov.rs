//! NovAtel OEM7 reader subcommand.

use anyhow::Result;
use cssr::framing::novatel::NovFrames;
use cssr::framing::Signal;

use crate::display::{emit_raw, Sink};

pub fn run(e6b: bool, qzss_lnav: bool, message: bool, color: bool) -> Result<()> {
    let extracting = e6b || qzss_lnav;
    let sink = Sink::select(extracting, message, color);

    let stdin = std::io::stdin().lock();
    for frame in NovFrames::new(stdin) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };
        let c = sink.color();
        let hex: String = frame.payload.iter().map(|b| format!("{b:02x}")).collect();
        let stamp = frame.time.map(|t| t.to_utc_string()).unwrap_or_default();
        sink.line(&format!(
            "{} {} {} {}",
            c.green(&stamp),
            c.cyan(&format!("{:?}", frame.signal)),
            c.yellow(&frame.sat_name()),
            hex
        ));

        match frame.signal {
            Signal::E6b if e6b => {
                let mut record = vec![frame.prn as u8];
                record.extend_from_slice(&frame.payload);
                emit_raw(&record);
            }
            Signal::QzssLnav if qzss_lnav => emit_raw(&frame.payload),
            _ => {}
        }
    }
    Ok(())
}
