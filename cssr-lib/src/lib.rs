//! Decoding for GNSS augmentation message streams.
//!
//! This crate turns raw receiver byte streams into typed correction records
//! in four stages, each a lazy iterator pulled on demand by the next:
//!
//! 1. [`framing`] — vendor framers (Allystar HD9310, u-blox UBX, NovAtel
//!    OEM7, Septentrio SBF, Pocket SDR logs, raw payload files) producing
//!    per-satellite payload frames.
//! 2. [`l6`] / [`has`] — subframe and multi-page reassembly, including
//!    Reed-Solomon erasure decoding for Galileo HAS.
//! 3. [`cssr`] / [`ssr`] / [`b2b`] / [`l1s`] — bit-packed correction
//!    decoders working against a stateful mask table.
//! 4. [`rtcm`] — RTCM 3 framing, message dispatch, and re-encoding of
//!    Compact SSR payloads into type-4073 envelopes.
//!
//! # Example
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//! use cssr::framing::allystar::AllystarFrames;
//!
//! let file = BufReader::new(File::open("capture.alst").unwrap());
//! for frame in AllystarFrames::new(file) {
//!     match frame {
//!         Ok(frame) => println!("{} C/No {:?}", frame.prn, frame.cno),
//!         Err(err) => eprintln!("{err}"),
//!     }
//! }
//! ```

mod error;

pub mod b2b;
pub mod bits;
pub mod crc;
pub mod cssr;
pub mod framing;
pub mod gf256;
pub mod has;
pub mod l1s;
pub mod l6;
pub mod rtcm;
pub mod ssr;
pub mod time;

pub(crate) mod prelude;

pub use error::{Error, Result, Stage};
