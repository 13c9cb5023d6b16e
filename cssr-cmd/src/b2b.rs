//! BeiDou PPP-B2b decoder subcommand.

use anyhow::Result;
use cssr::b2b::{B2bBody, B2bDecoder};
use cssr::framing::raw::B2bRecords;

use crate::display::Sink;

pub fn run(prn: u16, trace: u8, color: bool) -> Result<()> {
    let sink = Sink::select(false, false, color);

    let stdin = std::io::stdin().lock();
    let mut decoder = B2bDecoder::new();

    for record in B2bRecords::new(stdin) {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };
        if prn != 0 && record.prn != prn {
            continue;
        }
        let c = sink.color();
        let head = format!(
            "{} {}",
            c.green(&format!("C{:02}", record.prn)),
            c.yellow(&format!("MT{:<2}", peek_type(&record.payload)))
        );
        match decoder.decode(record.prn, &record.payload) {
            Ok(rec) => {
                let mut line = head;
                if !rec.crc_ok {
                    line.push(' ');
                    line.push_str(&c.red("CRC error"));
                }
                line.push_str(&summary(&rec.body));
                sink.line(&line);
                if trace >= 1 {
                    for detail in details(&rec.body) {
                        sink.line(&detail);
                    }
                }
            }
            Err(err) => sink.line(&format!("{head} {}", c.red(&err.to_string()))),
        }
    }
    Ok(())
}

fn peek_type(payload: &[u8]) -> u8 {
    payload.first().map_or(0, |b| b >> 2)
}

fn fmt_opt(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(v) => format!("{v:.digits$}"),
        None => "#N/A".to_string(),
    }
}

fn summary(body: &B2bBody) -> String {
    match body {
        B2bBody::Mask(mask) => format!(
            " mask IODSSR={} IODP={} ({} sats)",
            mask.iodssr,
            mask.iodp,
            mask.sats.len()
        ),
        B2bBody::Orbit { iodssr, entries, .. } => {
            format!(" orbit IODSSR={iodssr} ({} sats)", entries.len())
        }
        B2bBody::CodeBias { iodssr, entries, .. } => {
            format!(" code bias IODSSR={iodssr} ({} sats)", entries.len())
        }
        B2bBody::Clock { iodssr, entries, .. } => {
            format!(" clock IODSSR={iodssr} ({} sats)", entries.len())
        }
        B2bBody::Null => " null".to_string(),
        B2bBody::Unsupported { message_type } => {
            format!(" reserved message type {message_type}")
        }
    }
}

fn details(body: &B2bBody) -> Vec<String> {
    let mut lines = Vec::new();
    match body {
        B2bBody::Mask(mask) => {
            let mut line = String::from("  mask:");
            for sat in &mask.sats {
                line.push(' ');
                line.push_str(&sat.to_string());
            }
            lines.push(line);
        }
        B2bBody::Orbit { entries, .. } => {
            for e in entries {
                lines.push(format!(
                    "  {} IODN={} IOD={} d_radial={}m d_along={}m d_cross={}m URA={}:{}",
                    e.sat,
                    e.iod_nav,
                    e.iod_corr,
                    fmt_opt(e.radial, 3),
                    fmt_opt(e.along, 3),
                    fmt_opt(e.cross, 3),
                    e.ura_class,
                    e.ura_value
                ));
            }
        }
        B2bBody::CodeBias { entries, .. } => {
            for e in entries {
                let mut line = format!("  {}", e.sat);
                for (signal, bias) in &e.biases {
                    line.push_str(&format!(" sig{signal}={bias:.3}m"));
                }
                lines.push(line);
            }
        }
        B2bBody::Clock { entries, .. } => {
            for e in entries {
                lines.push(format!(
                    "  {} IOD={} clock={} m",
                    e.sat,
                    e.iod_corr,
                    fmt_opt(e.c0, 3)
                ));
            }
        }
        B2bBody::Null | B2bBody::Unsupported { .. } => {}
    }
    lines
}
