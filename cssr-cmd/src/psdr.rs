//! Pocket SDR log reader subcommand.

use anyhow::Result;
use cssr::framing::pocketsdr::PsdrLines;
use cssr::framing::Signal;

use crate::display::{emit_raw, Sink};

pub fn run(l6: bool, e6b: bool, inav: bool, b2b: bool, message: bool, color: bool) -> Result<()> {
    let extracting = l6 || e6b || inav || b2b;
    let sink = Sink::select(extracting, message, color);

    let stdin = std::io::stdin().lock();
    for frame in PsdrLines::new(stdin) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };
        let c = sink.color();
        let hex: String = frame.payload.iter().map(|b| format!("{b:02x}")).collect();
        let label = match frame.signal {
            Signal::L6 => "L6",
            Signal::E6b => "E6B",
            Signal::INav => "I/NAV",
            Signal::B2b => "B2b",
            _ => "?",
        };
        sink.line(&format!(
            "{} {} {}",
            c.green(&frame.sat_name()),
            c.cyan(label),
            c.yellow(&hex)
        ));

        let selected = match frame.signal {
            Signal::L6 => l6,
            Signal::E6b => e6b,
            Signal::INav => inav,
            Signal::B2b => b2b,
            _ => false,
        };
        if !selected {
            continue;
        }
        if frame.signal == Signal::L6 {
            // bare frame concatenation, no per-frame prefix
            emit_raw(&frame.payload);
        } else {
            let mut record = vec![frame.prn as u8];
            record.extend_from_slice(&frame.payload);
            emit_raw(&record);
        }
    }
    Ok(())
}
