//! RTCM 3 stream display subcommand.

use anyhow::Result;
use cssr::framing::Constellation;
use cssr::rtcm::{RtcmContent, RtcmFrames, RtcmMessage};
use cssr::ssr::SsrKind;

use crate::display::{ecef_to_llh, Sink};

pub fn run(trace: u8, color: bool) -> Result<()> {
    let sink = Sink::select(false, false, color);

    let stdin = std::io::stdin().lock();
    for message in RtcmFrames::new(stdin) {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };
        let c = sink.color();
        let content = match message.content() {
            Ok(content) => content,
            Err(err) => {
                sink.line(&format!(
                    "{} {}",
                    c.green(&format!("RTCM {}", message.number)),
                    c.red(&err.to_string())
                ));
                continue;
            }
        };
        let (system, mtype) = classify(&message, &content);
        let line = format!(
            "{} {}{}",
            c.green(&format!("RTCM {}", message.number)),
            c.yellow(&format!("{system:1} {mtype:14}")),
            describe(&content)
        );
        sink.line(&line);
        if trace >= 1 {
            for detail in details(&content) {
                sink.line(&detail);
            }
        }
    }
    Ok(())
}

fn system_letter(content: &RtcmContent) -> Option<char> {
    match content {
        RtcmContent::Msm(msm) => Some(msm.system.letter()),
        RtcmContent::Ssr(ssr) => Some(ssr.system.letter()),
        RtcmContent::Ephemeris { system, .. } => Some(system.letter()),
        _ => None,
    }
}

fn classify(message: &RtcmMessage, content: &RtcmContent) -> (String, String) {
    let system = system_letter(content)
        .map(|l| l.to_string())
        .unwrap_or_default();
    let mtype = match content {
        RtcmContent::ReferenceStation { .. } => "Position".to_string(),
        RtcmContent::AntennaInfo { .. } => "Ant/Rcv info".to_string(),
        RtcmContent::Ephemeris { system, .. } => match (message.number, system) {
            (1045, _) => "F/NAV".to_string(),
            (1046, _) => "I/NAV".to_string(),
            _ => "NAV".to_string(),
        },
        RtcmContent::Msm(msm) => format!("MSM{}", msm.level),
        RtcmContent::Ssr(ssr) => match cssr::ssr::ssr_kind(ssr.msgnum) {
            Some((_, SsrKind::Orbit)) => "SSR orbit".to_string(),
            Some((_, SsrKind::Clock)) => "SSR clock".to_string(),
            Some((_, SsrKind::CodeBias)) => "SSR code bias".to_string(),
            Some((_, SsrKind::CombinedOrbitClock)) => "SSR obt/clk".to_string(),
            Some((_, SsrKind::Ura)) => "SSR URA".to_string(),
            _ => "SSR hr clock".to_string(),
        },
        RtcmContent::Cssr { .. } => "CSSR".to_string(),
        RtcmContent::Unknown => format!("MT{:<4}", message.number),
    };
    (system, mtype)
}

fn describe(content: &RtcmContent) -> String {
    match content {
        RtcmContent::ReferenceStation { x, y, z, antenna_height, .. } => {
            let (lat, lon, height) = ecef_to_llh(*x, *y, *z);
            let mut s = format!("{lat:.7} {lon:.7} {height:.3}");
            if let Some(h) = antenna_height {
                if *h != 0.0 {
                    s.push_str(&format!(" (ant {h:.3})"));
                }
            }
            s
        }
        RtcmContent::AntennaInfo {
            station_id,
            antenna,
            setup_id,
            antenna_serial,
            receiver,
            firmware,
            receiver_serial,
        } => {
            let mut s = String::new();
            if *station_id != 0 {
                s.push_str(&format!("{station_id} "));
            }
            s.push_str(antenna);
            if *setup_id != 0 {
                s.push_str(&format!(" {setup_id}"));
            }
            if let Some(serial) = antenna_serial.as_deref().filter(|v| !v.is_empty()) {
                s.push_str(&format!(" s/n {serial}"));
            }
            if let Some(rcv) = receiver.as_deref().filter(|v| !v.is_empty()) {
                s.push_str(&format!(" rcv \"{rcv}\""));
            }
            if let Some(ver) = firmware.as_deref().filter(|v| !v.is_empty()) {
                s.push_str(&format!(" ver {ver}"));
            }
            if let Some(serial) = receiver_serial.as_deref().filter(|v| !v.is_empty()) {
                s.push_str(&format!(" s/n {serial}"));
            }
            s
        }
        RtcmContent::Ephemeris { system, sat_id, health } => {
            let mut s = format!("{}{sat_id:02}", system.letter());
            if let Some(health) = health {
                s.push_str(&format!(" svh={health:02x}"));
            }
            s
        }
        RtcmContent::Msm(msm) => msm.sat_names().join(" "),
        RtcmContent::Ssr(ssr) => {
            let mut s = ssr.sat_names().join(" ");
            s.push_str(&format!(
                " (nsat={} iod={}{})",
                ssr.header.n_sat,
                ssr.header.iod,
                if ssr.header.multiple_message { " cont." } else { "" }
            ));
            s
        }
        RtcmContent::Cssr { subtype } => format!("ST{subtype}"),
        RtcmContent::Unknown => String::new(),
    }
}

fn details(content: &RtcmContent) -> Vec<String> {
    let mut lines = Vec::new();
    match content {
        RtcmContent::Msm(msm) => {
            for cell in &msm.cells {
                let sat = if msm.system == Constellation::Sbas {
                    format!("S{}", u16::from(cell.sat_id) + 119)
                } else {
                    format!("{}{:02}", msm.system.letter(), cell.sat_id)
                };
                lines.push(format!(
                    "  {sat} sig{:02} pr={} cp={} cnr={} rate={}",
                    cell.signal_id,
                    opt(cell.pseudorange, 3),
                    opt(cell.phase_range, 3),
                    opt(cell.cnr, 1),
                    opt(cell.phase_rate, 3)
                ));
            }
        }
        RtcmContent::Ssr(ssr) => {
            if let cssr::ssr::SsrBody::HighRateClock(entries) = &ssr.body {
                for e in entries {
                    lines.push(format!(
                        "  {}{:02} hr_clock={:.4}m",
                        ssr.system.letter(),
                        e.sat_id,
                        e.clock
                    ));
                }
            }
        }
        _ => {}
    }
    lines
}

fn opt(value: Option<f64>, digits: usize) -> String {
    match value {
        Some(v) => format!("{v:.digits$}"),
        None => "#N/A".to_string(),
    }
}
