//! Allystar HD9310 reader subcommand.

use anyhow::Result;
use cssr::framing::allystar::{AllystarFrames, BestSat};

use crate::display::{emit_raw, Sink};

pub fn run(l6: bool, message: bool, prn: u16, color: bool) -> Result<()> {
    let sink = Sink::select(l6, message, color);
    let pin = if (193..=211).contains(&prn) {
        Some(prn)
    } else {
        if prn != 0 {
            tracing::warn!(prn, "QZS L6 PRN is in range of 193-211 or 0");
        }
        None
    };

    let stdin = std::io::stdin().lock();
    let mut selector = BestSat::new(pin);
    for frame in AllystarFrames::new(stdin) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };
        if let Some(pick) = selector.offer(&frame) {
            sink.line(&format!("---> prn {} (C/No {} dB)", pick.prn, pick.cno));
            if l6 {
                emit_raw(&pick.payload);
            }
        }
        let c = sink.color();
        let mut line = format!(
            "{} {} {}",
            c.green(&frame.prn.to_string()),
            c.yellow(&frame.time.map(|t| t.to_utc_string()).unwrap_or_default()),
            frame.cno.unwrap_or(0.0)
        );
        if !frame.flags.ok() {
            line.push(' ');
            line.push_str(&c.red(&frame.flags.to_string()));
        }
        sink.line(&line);
    }
    if let Some(pick) = selector.finish() {
        if l6 {
            emit_raw(&pick.payload);
        }
    }
    Ok(())
}
