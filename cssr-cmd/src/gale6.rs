//! Galileo HAS decoder subcommand.

use anyhow::Result;
use cssr::framing::raw::HasPageRecords;
use cssr::has::{HasDecoder, HasMessage, HasPage};

use crate::display::Sink;

pub fn run(trace: u8, statistics: bool, color: bool) -> Result<()> {
    let sink = Sink::select(false, false, color);

    let stdin = std::io::stdin().lock();
    let mut decoder = HasDecoder::new();
    let mut n_pages = 0usize;
    let mut n_messages = 0usize;

    for record in HasPageRecords::new(stdin) {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };
        let page = match HasPage::decode(record.prn, &record.payload) {
            Ok(Some(page)) => page,
            Ok(None) => continue,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };
        n_pages += 1;
        let c = sink.color();
        if trace >= 2 {
            let hex: String = page.body.iter().map(|b| format!("{b:02x}")).collect();
            sink.line(&format!(
                "E{:02} MID={} MS={} PID={:3} {hex}",
                page.prn, page.mid, page.ms, page.pid
            ));
        }
        match decoder.push_page(&page) {
            Ok(Some(message)) => {
                n_messages += 1;
                sink.line(&format!(
                    "{} {} {}",
                    c.green(&format!("E{:02}", page.prn)),
                    c.yellow(&format!("MID={} MS={}", message.mid, message.ms)),
                    format!("TOH={} IOD set={}", message.toh, message.iod_set)
                ));
                if trace >= 1 {
                    for line in detail_lines(&message) {
                        sink.line(&line);
                    }
                }
                if statistics {
                    sink.line(&format!(
                        "stat pages {n_pages} messages {n_messages} live_groups {}",
                        decoder.live_groups()
                    ));
                }
            }
            Ok(None) => {}
            Err(err) => sink.line(&c.red(&err.to_string())),
        }
    }
    Ok(())
}

fn fmt_opt(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(v) => format!("{v:.digits$}"),
        None => "#N/A".to_string(),
    }
}

fn detail_lines(message: &HasMessage) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(mask) = &message.mask {
        for section in &mask.systems {
            let mut cell = 0usize;
            for sat in section.sat_ids() {
                let mut line = format!("MASK {sat}");
                for name in section.signal_names() {
                    let active = section.cell_mask[cell];
                    cell += 1;
                    if active {
                        line.push(' ');
                        line.push_str(name);
                    }
                }
                lines.push(line);
            }
        }
    }
    if let Some(validity) = message.orbit_validity {
        lines.push(format!("ORBIT validity_interval={validity}s"));
        for e in &message.orbits {
            lines.push(format!(
                "ORBIT {} IODE={:4} d_radial={}m d_track={}m d_cross={}m",
                e.sat,
                e.iode,
                fmt_opt(e.radial, 4),
                fmt_opt(e.along, 4),
                fmt_opt(e.cross, 4)
            ));
        }
    }
    if let Some(validity) = message.clock_validity {
        lines.push(format!("CKFUL validity_interval={validity}s"));
        for e in &message.clocks {
            lines.push(format!("CKFUL {} d_clock={}m", e.sat, fmt_opt(e.c0, 3)));
        }
    }
    for e in &message.subset_clocks {
        lines.push(format!("CKSUB {} d_clock={}m", e.sat, fmt_opt(e.c0, 3)));
    }
    if let Some(validity) = message.code_bias_validity {
        lines.push(format!("CBIAS validity_interval={validity}s"));
        for e in &message.code_biases {
            lines.push(format!(
                "CBIAS {} {:13} code_bias={}m",
                e.sat,
                e.signal,
                fmt_opt(e.bias, 2)
            ));
        }
    }
    if let Some(validity) = message.phase_bias_validity {
        lines.push(format!("PBIAS validity_interval={validity}s"));
        for e in &message.phase_biases {
            lines.push(format!(
                "PBIAS {} {:13} phase_bias={}cycle discont_indicator={}",
                e.sat,
                e.signal,
                fmt_opt(e.bias, 2),
                e.discontinuity
            ));
        }
    }
    lines
}
