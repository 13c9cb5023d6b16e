//! u-blox UBX reader subcommand.

use anyhow::Result;
use cssr::framing::ublox::UbxFrames;
use cssr::framing::{Constellation, Signal};

use crate::display::{emit_raw, Sink};

pub fn run(
    l1s: bool,
    sbas: bool,
    prn: u16,
    duplicate: bool,
    message: bool,
    color: bool,
) -> Result<()> {
    let extracting = l1s || sbas;
    let sink = Sink::select(extracting, message, color);

    let stdin = std::io::stdin().lock();
    let mut previous: Vec<u8> = Vec::new();
    for frame in UbxFrames::new(stdin) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };
        let c = sink.color();
        let hex: String = frame.payload.iter().map(|b| format!("{b:02x}")).collect();
        sink.line(&format!(
            "{} {} {}",
            c.green(&frame.sat_name()),
            c.yellow(&format!("{:?}", frame.signal)),
            hex
        ));

        if frame.signal != Signal::L1s {
            continue;
        }
        let wanted = (l1s && frame.constellation == Constellation::Qzss)
            || (sbas && frame.constellation == Constellation::Sbas);
        if !wanted {
            continue;
        }
        if prn != 0 && frame.prn != prn {
            continue;
        }
        // all QZSS satellites broadcast the same DCR stream
        if frame.payload == previous && !duplicate {
            continue;
        }
        previous.clone_from(&frame.payload);
        let mut record = vec![frame.prn as u8];
        record.extend_from_slice(&frame.payload);
        emit_raw(&record);
    }
    Ok(())
}
