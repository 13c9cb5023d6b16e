//! QZS L6 stream decoder subcommand (CLAS, MADOCA-PPP, MADOCA).

use anyhow::Result;
use cssr::cssr::{CssrDecoder, DataPartSummary, Dialect, SubtypeBody, SubtypeRecord};
use cssr::framing::raw::RawL6Frames;
use cssr::l6::{L6Frame, Vendor};
use cssr::rtcm::encode_frame;
use cssr::ssr::MadocaDecoder;
use cssr::time::GpsTime;

use crate::display::{emit_raw, Color, Sink};

pub fn run(rtcm: bool, trace: u8, statistics: bool, message: bool, color: bool) -> Result<()> {
    let sink = Sink::select(rtcm, message, color);

    let stdin = std::io::stdin().lock();
    let mut clas = CssrDecoder::new(Dialect::Clas);
    let mut madoca_ppp = CssrDecoder::new(Dialect::MadocaPpp);
    let mut madoca = MadocaDecoder::new();

    for frame in RawL6Frames::new(stdin) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };
        let frame = match L6Frame::decode(&frame.payload) {
            Ok(frame) => frame,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };

        match frame.vendor {
            Vendor::Clas => {
                let summary = clas.push_frame(&frame);
                show_cssr(&sink, &frame, &summary, trace, statistics);
                if rtcm {
                    for record in &summary.records {
                        if !record.raw.is_empty() {
                            emit_raw(&encode_frame(&record.raw)?);
                        }
                    }
                }
            }
            Vendor::MadocaPpp => {
                let summary = madoca_ppp.push_frame(&frame);
                show_cssr(&sink, &frame, &summary, trace, statistics);
                if rtcm {
                    for record in &summary.records {
                        if !record.raw.is_empty() {
                            emit_raw(&encode_frame(&record.raw)?);
                        }
                    }
                }
            }
            Vendor::Madoca => {
                let summary = match madoca.push_frame(&frame) {
                    Ok(summary) => summary,
                    Err(err) => {
                        sink.line(&sink.color().red(&err.to_string()));
                        continue;
                    }
                };
                let c = sink.color();
                let mut msg = GpsTime::new(summary.week, summary.tow).to_utc_string();
                for m in &summary.messages {
                    msg.push_str(&format!(
                        " RTCM {}({})",
                        m.message.msgnum,
                        m.message.header.n_sat
                    ));
                    if rtcm {
                        emit_raw(&encode_frame(&m.raw)?);
                    }
                }
                for err in &summary.errors {
                    msg.push(' ');
                    msg.push_str(&c.red(err));
                }
                sink.line(&vendor_line(&c, &frame, &msg));
            }
            Vendor::Qznma | Vendor::Unknown(_) => {
                if trace >= 2 {
                    let hex: String =
                        frame.data_part_bytes().iter().map(|b| format!("{b:02x}")).collect();
                    sink.line(&format!("dump: {hex}"));
                }
                sink.line(&vendor_line(&sink.color(), &frame, ""));
            }
        }
    }
    Ok(())
}

fn vendor_line(c: &Color, frame: &L6Frame, msg: &str) -> String {
    let alert = if frame.alert { c.red("*") } else { " ".to_string() };
    format!(
        "{} {:13}{}{} {}",
        c.green(&frame.prn.to_string()),
        frame.facility(),
        alert,
        c.yellow(&frame.vendor.to_string()),
        msg
    )
}

fn show_cssr(
    sink: &Sink,
    frame: &L6Frame,
    summary: &DataPartSummary,
    trace: u8,
    statistics: bool,
) {
    if !sink.active() {
        return;
    }
    let c = sink.color();
    let mut msg = String::new();
    if summary.sfn != 0 {
        msg.push_str(&format!(" SF{} DP{}", summary.sfn, summary.dpn));
        if frame.vendor == Vendor::MadocaPpp {
            let service = if frame.service_iono { "Ionosph" } else { "Clk/Eph" };
            let ext = if frame.msg_ext_cnav { "CNAV" } else { "LNAV" };
            msg.push_str(&format!(" ({service} {ext})"));
        }
    }
    for record in &summary.records {
        msg.push_str(&format!(" ST{}", record.header.subtype));
    }
    if let Some(st) = summary.partial {
        if st != 0 {
            msg.push_str(&format!(" ST{st}"));
        }
        msg.push_str(&c.yellow("..."));
    } else if summary.null && summary.records.is_empty() {
        msg.push_str(&c.dim(" (null)"));
    }
    for err in &summary.errors {
        msg.push(' ');
        msg.push_str(&c.red(err));
    }
    sink.line(&vendor_line(&c, frame, &msg));

    if trace >= 1 {
        for record in &summary.records {
            for line in detail_lines(record) {
                sink.line(&line);
            }
            if trace >= 2 && !record.raw.is_empty() {
                let hex: String = record.raw.iter().map(|b| format!("{b:02x}")).collect();
                sink.line(&format!("ST{} dump: {hex}", record.header.subtype));
            }
        }
    }
    if statistics {
        if let Some(stats) = summary.stats {
            sink.line(&stats.to_string());
        }
    }
}

fn fmt_opt(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(v) => format!("{v:.digits$}"),
        None => "#N/A".to_string(),
    }
}

fn detail_lines(record: &SubtypeRecord) -> Vec<String> {
    let mut lines = Vec::new();
    match &record.body {
        SubtypeBody::Mask(mask) => {
            for section in &mask.systems {
                let mut cell = 0usize;
                for sat in section.sat_ids() {
                    let mut line = format!("ST1 {sat}");
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
        SubtypeBody::Orbit(entries) => {
            for e in entries {
                lines.push(format!(
                    "ST2 {} IODE={:4} d_radial={}m d_along={}m d_cross={}m",
                    e.sat,
                    e.iode,
                    fmt_opt(e.radial, 4),
                    fmt_opt(e.along, 4),
                    fmt_opt(e.cross, 4)
                ));
            }
        }
        SubtypeBody::Clock(entries) => {
            for e in entries {
                lines.push(format!("ST3 {} d_clock={}m", e.sat, fmt_opt(e.c0, 4)));
            }
        }
        SubtypeBody::CodeBias(entries) => {
            for e in entries {
                lines.push(format!(
                    "ST4 {} {:13} code_bias={}m",
                    e.sat,
                    e.signal,
                    fmt_opt(e.bias, 2)
                ));
            }
        }
        SubtypeBody::PhaseBias(entries) => {
            for e in entries {
                lines.push(format!(
                    "ST5 {} {:13} phase_bias={}m discont_indicator={}",
                    e.sat,
                    e.signal,
                    fmt_opt(e.bias, 3),
                    e.discontinuity
                ));
            }
        }
        SubtypeBody::CombinedBias { network_id, entries } => {
            if let Some(nid) = network_id {
                lines.push(format!("ST6 NID={nid}"));
            }
            for e in entries {
                let mut line = format!("ST6 {} {:13}", e.sat, e.signal);
                if let Some(cb) = e.code_bias {
                    line.push_str(&format!(" code_bias={cb:.2}m"));
                }
                if let Some(pb) = e.phase_bias {
                    line.push_str(&format!(" phase_bias={pb:.3}m"));
                }
                if let Some(di) = e.discontinuity {
                    line.push_str(&format!(" discont_indi={di}"));
                }
                lines.push(line);
            }
        }
        SubtypeBody::Ura(entries) => {
            for e in entries {
                lines.push(format!("ST7 {} URA {}", e.sat, e.ura));
            }
        }
        SubtypeBody::Stec { correction_type, network_id, entries } => {
            lines.push(format!("ST8 type={correction_type} NID={network_id}"));
            for e in entries {
                lines.push(format!(
                    "ST8 {} quality={} c00={}TECU c01={}TECU/deg c10={}TECU/deg",
                    e.sat,
                    e.quality,
                    fmt_opt(e.poly.c00, 2),
                    fmt_opt(e.poly.c01, 2),
                    fmt_opt(e.poly.c10, 2)
                ));
            }
        }
        SubtypeBody::Grid { correction_type, network_id, quality, grids } => {
            lines.push(format!(
                "ST9 Trop correct_type={correction_type} NID={network_id} quality={quality} ngrid={}",
                grids.len()
            ));
            for (i, grid) in grids.iter().enumerate() {
                lines.push(format!(
                    "ST9 Trop grid {:2}/{:2} dry-delay={}m wet-delay={}m",
                    i + 1,
                    grids.len(),
                    fmt_opt(grid.hydrostatic, 3),
                    fmt_opt(grid.wet, 3)
                ));
                for (sat, residual) in &grid.residuals {
                    lines.push(format!(
                        "ST9 STEC {sat} grid {:2}/{:2} residual={}TECU",
                        i + 1,
                        grids.len(),
                        fmt_opt(*residual, 2)
                    ));
                }
            }
        }
        SubtypeBody::ServiceInfo => {
            lines.push("ST10 --- not implemented".to_string());
        }
        SubtypeBody::OrbitClock { network_id, entries } => {
            if let Some(nid) = network_id {
                lines.push(format!("ST11 NID={nid}"));
            }
            for e in entries {
                let mut line = format!("ST11 {}", e.sat);
                if let Some(iode) = e.iode {
                    line.push_str(&format!(
                        " IODE={iode:4} d_radial={}m d_along={}m d_cross={}m",
                        fmt_opt(e.radial, 1),
                        fmt_opt(e.along, 1),
                        fmt_opt(e.cross, 1)
                    ));
                }
                if e.c0.is_some() {
                    line.push_str(&format!(" c0={}m", fmt_opt(e.c0, 1)));
                }
                lines.push(line);
            }
        }
        SubtypeBody::Atmos { network_id, trop_quality, trop_poly, trop_offset, trop_residuals, stec } => {
            lines.push(format!("ST12 NID={network_id}"));
            if let (Some(quality), Some(poly)) = (trop_quality, trop_poly) {
                lines.push(format!(
                    "ST12 Trop quality={quality} t00={} t01={} t10={} t11={}",
                    fmt_opt(poly[0], 2),
                    fmt_opt(poly[1], 2),
                    fmt_opt(poly[2], 2),
                    fmt_opt(poly[3], 2)
                ));
            }
            if let Some(offset) = trop_offset {
                lines.push(format!("ST12 Trop offset={offset:.2}m"));
                for (i, residual) in trop_residuals.iter().enumerate() {
                    lines.push(format!(
                        "ST12 Trop grid {:2}/{:2} residual={}m",
                        i + 1,
                        trop_residuals.len(),
                        fmt_opt(*residual, 2)
                    ));
                }
            }
            for e in stec {
                lines.push(format!(
                    "ST12 STEC {} quality={:02x} type={} c00={}TECU",
                    e.sat,
                    e.quality,
                    e.correction_type,
                    fmt_opt(e.poly.c00, 1)
                ));
            }
        }
    }
    lines
}
