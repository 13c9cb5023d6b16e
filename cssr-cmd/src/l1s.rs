//! QZS L1S decoder subcommand.

use anyhow::Result;
use cssr::framing::raw::L1sRecords;
use cssr::l1s::{disaster_category, report_classification, station_name, L1sBody, L1sDecoder};

use crate::display::Sink;

fn type_name(mt: u8) -> &'static str {
    match mt {
        0 => "Test mode",
        1 => "PRN mask",
        2..=5 => "Fast corrections",
        6 => "Integrity information",
        7 => "Fast correction degradation factor",
        9 => "GEO ranging function parameters",
        10 => "Degradation parameters",
        12 => "SBAS network time/UTC offset parameters",
        17 => "GEO satellite almanacs",
        18 => "Ionospheric grid point masks",
        24 => "Mixed fast/long-term satellite corrections",
        25 => "Long-term satellite error corrections",
        26 => "Ionospheric delay corrections",
        27 => "SBAS service message",
        28 => "Clock-ephemeris covariance matrix",
        43 => "JMA DCR",
        44 => "Organization DCR",
        47 => "Monitoring station information",
        48 => "PRN mask",
        49 => "Data issue number",
        50 => "DGPS correction",
        51 => "Satellite health",
        63 => "Null message",
        _ => "unknown message type",
    }
}

pub fn run(duplicate: bool, color: bool) -> Result<()> {
    let sink = Sink::select(false, false, color);

    let stdin = std::io::stdin().lock();
    let mut decoder = L1sDecoder::new();
    let mut previous: Vec<u8> = Vec::new();

    for record in L1sRecords::new(stdin) {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                sink.line(&sink.color().red(&err.to_string()));
                continue;
            }
        };
        if record.payload == previous && !duplicate {
            continue;
        }
        previous.clone_from(&record.payload);

        let c = sink.color();
        let head = c.green(&format!("PRN{:3}", record.prn));
        let msg = match decoder.decode(&record.payload) {
            Ok(msg) => msg,
            Err(err) => {
                sink.line(&format!("{head}: {}", c.red(&err.to_string())));
                continue;
            }
        };
        if !msg.crc_ok {
            sink.line(&format!("{head}: {}", c.red("CRC error")));
            continue;
        }
        let name = c.cyan(type_name(msg.message_type));
        let detail = detail(&msg.body);
        sink.line(&format!("{head}: {name}{detail}"));
    }
    Ok(())
}

fn detail(body: &L1sBody) -> String {
    match body {
        L1sBody::DcReport {
            classification,
            category,
            month,
            day,
            hour,
            minute,
            information_type,
        } => {
            let mut s = format!(
                ": {} ({})",
                disaster_category(*category),
                report_classification(*classification)
            );
            if *information_type != 0 {
                s.push_str(match information_type {
                    1 => " correction",
                    2 => " cancel",
                    _ => " undefined information type",
                });
            }
            s.push_str(&format!(" {month:02}-{day:02} {hour:02}:{minute:02} UTC"));
            s
        }
        L1sBody::StationInfo(stations) => {
            let mut s = String::new();
            for (i, st) in stations.iter().enumerate() {
                s.push_str(&format!(
                    "\n  location {}: {} {:6.3} {:7.3} {:4}",
                    i + 1,
                    station_name(st.code),
                    st.latitude,
                    st.longitude,
                    st.height
                ));
            }
            s
        }
        L1sBody::PrnMask { iodp, sats } => {
            let mut s = String::from(":");
            for sat in sats {
                s.push(' ');
                s.push_str(sat);
            }
            s.push_str(&format!(" ({} sats, IODP={iodp})", sats.len()));
            s
        }
        L1sBody::IssueNumbers { iodi, iodp, entries } => {
            let mut s = format!(": IODI={iodi} IODP={iodp}");
            for (sat, iod, available) in entries {
                s.push_str(&format!("\n  {sat} IOD={iod:3}"));
                if !available {
                    s.push_str(" (not available)");
                }
            }
            s
        }
        L1sBody::DgpsCorrection {
            station,
            station_healthy,
            entries,
        } => {
            let mut s = format!(": {}", station_name(*station));
            if !station_healthy {
                s.push_str(" (unhealthy)");
            }
            for (sat, prc) in entries {
                s.push_str(&format!("\n  {sat} PRC={prc:6.2} m"));
            }
            s
        }
        L1sBody::SatelliteHealth { unhealthy } => {
            let mut s = String::from(": unhealthy sats");
            for sat in unhealthy {
                s.push(' ');
                s.push_str(sat);
            }
            s
        }
        L1sBody::IssueMismatch { expected, got } => {
            format!(": issue number mismatch (mask={expected}, message={got})")
        }
        L1sBody::Null | L1sBody::Other { .. } => String::new(),
    }
}
