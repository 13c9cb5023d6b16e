mod alst;
mod b2b;
mod display;
mod gale6;
mod l1s;
mod nov;
mod psdr;
mod qzsl6;
mod rtcm;
mod sept;
mod ubx;

use std::io::stderr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "GNSS augmentation message reader tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read Allystar HD9310 raw messages from stdin.
    Alst {
        /// Send QZS L6 payload bytes to stdout (one best satellite per
        /// second) and turn off display messages.
        #[arg(short, long)]
        l6: bool,

        /// Show display messages on stderr while extracting.
        #[arg(short, long)]
        message: bool,

        /// Satellite PRN to pin (193-211, 0 selects the strongest).
        #[arg(short, long, default_value_t = 0)]
        prn: u16,

        /// Apply ANSI colors even when stdout is not a terminal.
        #[arg(short, long)]
        color: bool,
    },
    /// Read u-blox UBX raw messages from stdin.
    Ubx {
        /// Send QZS L1S payload records to stdout.
        #[arg(long)]
        l1s: bool,

        /// Send SBAS payload records to stdout.
        #[arg(long)]
        sbas: bool,

        /// Restrict to one PRN (0 = all).
        #[arg(short, long, default_value_t = 0)]
        prn: u16,

        /// Allow duplicate L1S messages (all QZSS satellites broadcast
        /// the same DCR stream).
        #[arg(short, long)]
        duplicate: bool,

        /// Show display messages on stderr while extracting.
        #[arg(short, long)]
        message: bool,

        /// Apply ANSI colors even when stdout is not a terminal.
        #[arg(short, long)]
        color: bool,
    },
    /// Read Septentrio SBF blocks from stdin.
    Sept {
        /// Send Galileo E6B page records to stdout.
        #[arg(short, long)]
        e6b: bool,

        /// Send QZS L6 payload bytes to stdout.
        #[arg(short, long)]
        l6: bool,

        /// Send BeiDou B2b records to stdout.
        #[arg(short, long)]
        b2b: bool,

        /// Show display messages on stderr while extracting.
        #[arg(short, long)]
        message: bool,

        /// Apply ANSI colors even when stdout is not a terminal.
        #[arg(short, long)]
        color: bool,
    },
    /// Read NovAtel OEM7 blocks from stdin.
    Nov {
        /// Send Galileo E6B page records to stdout.
        #[arg(short, long)]
        e6b: bool,

        /// Send QZSS LNAV subframes to stdout.
        #[arg(short, long)]
        qzss_lnav: bool,

        /// Show display messages on stderr while extracting.
        #[arg(short, long)]
        message: bool,

        /// Apply ANSI colors even when stdout is not a terminal.
        #[arg(short, long)]
        color: bool,
    },
    /// Read Pocket SDR log lines from stdin.
    Psdr {
        /// Send QZS L6 frames to stdout.
        #[arg(short, long)]
        l6: bool,

        /// Send Galileo E6B page records to stdout.
        #[arg(short, long)]
        e6b: bool,

        /// Send Galileo I/NAV records to stdout.
        #[arg(short, long)]
        inav: bool,

        /// Send BeiDou B2b records to stdout.
        #[arg(short, long)]
        b2b: bool,

        /// Show display messages on stderr while extracting.
        #[arg(short, long)]
        message: bool,

        /// Apply ANSI colors even when stdout is not a terminal.
        #[arg(short, long)]
        color: bool,
    },
    /// Decode a raw QZS L6 frame stream (CLAS, MADOCA-PPP, MADOCA).
    Qzsl6 {
        /// Re-encode decoded correction payloads as RTCM frames on
        /// stdout.
        #[arg(short, long)]
        rtcm: bool,

        /// Verbosity: 1 shows per-subtype detail, 2 adds bit images.
        #[arg(short, long, default_value_t = 0)]
        trace: u8,

        /// Show compact SSR bit statistics at each mask boundary.
        #[arg(short, long)]
        statistics: bool,

        /// Show display messages on stderr while extracting.
        #[arg(short, long)]
        message: bool,

        /// Apply ANSI colors even when stdout is not a terminal.
        #[arg(short, long)]
        color: bool,
    },
    /// Decode a Galileo HAS page stream ({PRN, 62-byte page} records).
    Gale6 {
        /// Verbosity: 1 shows per-subtype detail, 2 adds bit images.
        #[arg(short, long, default_value_t = 0)]
        trace: u8,

        /// Show HAS statistics in display messages.
        #[arg(short, long)]
        statistics: bool,

        /// Apply ANSI colors even when stdout is not a terminal.
        #[arg(short, long)]
        color: bool,
    },
    /// Decode a QZS L1S message stream ({PRN, 32-byte} records).
    L1s {
        /// Allow duplicate DCR sentences.
        #[arg(short, long)]
        duplicate: bool,

        /// Apply ANSI colors even when stdout is not a terminal.
        #[arg(short, long)]
        color: bool,
    },
    /// Decode a BeiDou B2b stream ({PRN, 62-byte} records).
    B2b {
        /// Restrict to one PRN (0 = all).
        #[arg(short, long, default_value_t = 0)]
        prn: u16,

        /// Verbosity: 1 shows per-entry detail.
        #[arg(short, long, default_value_t = 0)]
        trace: u8,

        /// Apply ANSI colors even when stdout is not a terminal.
        #[arg(short, long)]
        color: bool,
    },
    /// Decode an RTCM 3 stream.
    Rtcm {
        /// Verbosity: 1 shows per-message detail.
        #[arg(short, long, default_value_t = 0)]
        trace: u8,

        /// Apply ANSI colors even when stdout is not a terminal.
        #[arg(short, long)]
        color: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(EnvFilter::try_from_env("CSSR_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match Cli::parse().command {
        Commands::Alst {
            l6,
            message,
            prn,
            color,
        } => alst::run(l6, message, prn, color),
        Commands::Ubx {
            l1s,
            sbas,
            prn,
            duplicate,
            message,
            color,
        } => ubx::run(l1s, sbas, prn, duplicate, message, color),
        Commands::Sept {
            e6b,
            l6,
            b2b,
            message,
            color,
        } => sept::run(e6b, l6, b2b, message, color),
        Commands::Nov {
            e6b,
            qzss_lnav,
            message,
            color,
        } => nov::run(e6b, qzss_lnav, message, color),
        Commands::Psdr {
            l6,
            e6b,
            inav,
            b2b,
            message,
            color,
        } => psdr::run(l6, e6b, inav, b2b, message, color),
        Commands::Qzsl6 {
            rtcm,
            trace,
            statistics,
            message,
            color,
        } => qzsl6::run(rtcm, trace, statistics, message, color),
        Commands::Gale6 {
            trace,
            statistics,
            color,
        } => gale6::run(trace, statistics, color),
        Commands::L1s { duplicate, color } => l1s::run(duplicate, color),
        Commands::B2b { prn, trace, color } => b2b::run(prn, trace, color),
        Commands::Rtcm { trace, color } => rtcm::run(trace, color),
    }
}
