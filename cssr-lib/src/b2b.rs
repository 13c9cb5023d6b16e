//! BeiDou PPP-B2b correction messages.
//!
//! Each B2b frame is an independent message: a 6-bit message type, a
//! 456-bit data field, and CRC-24Q over the type and data. No
//! cross-message reassembly is needed, but MT4 clock corrections index
//! satellites through the mask installed by MT1, so a per-PRN mask
//! context is kept across messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bits::BitCursor;
use crate::crc::crc24q;
use crate::cssr::{Dialect, SatId};
use crate::framing::Constellation;
use crate::prelude::*;

/// Clock corrections per MT4 message.
pub const CLOCKS_PER_MT4: usize = 23;
/// Satellite slots per constellation section of the MT1 mask.
const SLOTS: [(Constellation, u16); 4] = [
    (Constellation::BeiDou, 63),
    (Constellation::Gps, 37),
    (Constellation::Galileo, 37),
    (Constellation::Glonass, 37),
];

/// Satellite for a 1-based B2b slot number.
#[must_use]
pub fn slot_to_sat(slot: u16) -> Option<SatId> {
    let mut base = 0u16;
    for (system, count) in SLOTS {
        if slot > base && slot <= base + count {
            return Some(SatId {
                system,
                number: (slot - base) as u8,
            });
        }
        base += count;
    }
    None
}

/// MT1 satellite mask.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct B2bMask {
    pub epoch: u32,
    pub iodssr: u8,
    pub iodp: u8,
    /// Masked satellites in slot order.
    pub sats: Vec<SatId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct B2bOrbitEntry {
    pub sat: SatId,
    pub iod_nav: u16,
    pub iod_corr: u8,
    pub radial: Option<f64>,
    pub along: Option<f64>,
    pub cross: Option<f64>,
    pub ura_class: u8,
    pub ura_value: u8,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct B2bCodeBiasEntry {
    pub sat: SatId,
    /// (signal index, bias in meters)
    pub biases: Vec<(u8, f64)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct B2bClockEntry {
    pub sat: SatId,
    pub iod_corr: u8,
    pub c0: Option<f64>,
}

/// Decoded message body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum B2bBody {
    Mask(B2bMask),
    Orbit { epoch: u32, iodssr: u8, entries: Vec<B2bOrbitEntry> },
    CodeBias { epoch: u32, iodssr: u8, entries: Vec<B2bCodeBiasEntry> },
    Clock { epoch: u32, iodssr: u8, iodp: u8, entries: Vec<B2bClockEntry> },
    Null,
    Unsupported { message_type: u8 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct B2bRecord {
    pub prn: u16,
    pub message_type: u8,
    pub crc_ok: bool,
    pub body: B2bBody,
}

/// Per-PRN stateful decoder for MT1..MT4 and the null message.
#[derive(Debug, Default)]
pub struct B2bDecoder {
    masks: HashMap<u16, B2bMask>,
}

impl B2bDecoder {
    #[must_use]
    pub fn new() -> Self {
        B2bDecoder::default()
    }

    #[must_use]
    pub fn mask(&self, prn: u16) -> Option<&B2bMask> {
        self.masks.get(&prn)
    }

    /// Decode one 62-byte data field (message type + data + CRC).
    pub fn decode(&mut self, prn: u16, raw: &[u8]) -> Result<B2bRecord> {
        if raw.len() < 61 {
            return Err(Error::ShortPayload {
                stage: Stage::Decoder,
                have: raw.len() * 8,
                need: 486,
            });
        }
        let mut cur = BitCursor::new(raw);
        let message_type = cur.take(6)? as u8;
        let data = cur.take_bytes(456)?;
        let crc = cur.take(24)? as u32;

        // the CRC is computed over the 2-bit-padded type + data field
        let mut checked = crate::bits::BitWriter::new();
        checked.put(2, 0);
        checked.put(6, u64::from(message_type));
        checked.extend_bits(&data, 456);
        let crc_ok = crc24q(&checked.into_bytes()) == crc;

        let mut cur = BitCursor::new(&data);
        let body = if !crc_ok {
            trace!(prn, message_type, "b2b crc mismatch");
            B2bBody::Unsupported { message_type }
        } else {
            match message_type {
                1 => self.decode_mask(prn, &mut cur)?,
                2 => decode_orbit(&mut cur)?,
                3 => decode_code_bias(&mut cur)?,
                4 => self.decode_clock(prn, &mut cur)?,
                63 => B2bBody::Null,
                other => B2bBody::Unsupported {
                    message_type: other,
                },
            }
        };
        Ok(B2bRecord {
            prn,
            message_type,
            crc_ok,
            body,
        })
    }

    fn decode_mask(&mut self, prn: u16, cur: &mut BitCursor<'_>) -> Result<B2bBody> {
        let epoch = cur.take(17)? as u32;
        cur.skip(4)?; // reserved
        let iodssr = cur.take(2)? as u8;
        let iodp = cur.take(4)? as u8;
        let mut sats = Vec::new();
        let mut slot = 1u16;
        for (_, count) in SLOTS {
            for _ in 0..count {
                if cur.take_bool()? {
                    sats.push(slot_to_sat(slot).expect("slot within table"));
                }
                slot += 1;
            }
        }
        let mask = B2bMask {
            epoch,
            iodssr,
            iodp,
            sats,
        };
        self.masks.insert(prn, mask.clone());
        Ok(B2bBody::Mask(mask))
    }

    fn decode_clock(&mut self, prn: u16, cur: &mut BitCursor<'_>) -> Result<B2bBody> {
        let table = Dialect::BdsB2b.field_table();
        let epoch = cur.take(17)? as u32;
        cur.skip(4)?; // reserved
        let iodssr = cur.take(2)? as u8;
        let iodp = cur.take(4)? as u8;
        let sub_slot = cur.take(5)? as usize;

        let mask = self.masks.get(&prn).ok_or(Error::MaskAbsent)?;
        if mask.iodssr != iodssr {
            return Err(Error::IodssrMismatch {
                active: mask.iodssr,
                msg: iodssr,
            });
        }
        if mask.iodp != iodp {
            return Err(Error::IodssrMismatch {
                active: mask.iodp,
                msg: iodp,
            });
        }

        let mut entries = Vec::new();
        for i in 0..CLOCKS_PER_MT4 {
            let iod_corr = cur.take(3)? as u8;
            let c0 = table.clock_c0.read(cur)?;
            let Some(&sat) = mask.sats.get(sub_slot * CLOCKS_PER_MT4 + i) else {
                // positions beyond the mask are fill
                continue;
            };
            entries.push(B2bClockEntry { sat, iod_corr, c0 });
        }
        Ok(B2bBody::Clock {
            epoch,
            iodssr,
            iodp,
            entries,
        })
    }
}

fn decode_orbit(cur: &mut BitCursor<'_>) -> Result<B2bBody> {
    let table = Dialect::BdsB2b.field_table();
    let epoch = cur.take(17)? as u32;
    cur.skip(4)?; // reserved
    let iodssr = cur.take(2)? as u8;
    let mut entries = Vec::new();
    for _ in 0..6 {
        let slot = cur.take(9)? as u16;
        let iod_nav = cur.take(10)? as u16;
        let iod_corr = cur.take(3)? as u8;
        let radial = table.orbit_radial.read(cur)?;
        let along = table.orbit_along.read(cur)?;
        let cross = table.orbit_cross.read(cur)?;
        let ura_class = cur.take(3)? as u8;
        let ura_value = cur.take(3)? as u8;
        let Some(sat) = slot_to_sat(slot) else {
            continue; // slot 0 pads the fixed six-entry block
        };
        entries.push(B2bOrbitEntry {
            sat,
            iod_nav,
            iod_corr,
            radial,
            along,
            cross,
            ura_class,
            ura_value,
        });
    }
    Ok(B2bBody::Orbit {
        epoch,
        iodssr,
        entries,
    })
}

fn decode_code_bias(cur: &mut BitCursor<'_>) -> Result<B2bBody> {
    let table = Dialect::BdsB2b.field_table();
    let epoch = cur.take(17)? as u32;
    cur.skip(4)?; // reserved
    let iodssr = cur.take(2)? as u8;
    let n_sat = cur.take(5)? as usize;
    let mut entries = Vec::new();
    for _ in 0..n_sat {
        let slot = cur.take(9)? as u16;
        let n_bias = cur.take(4)? as usize;
        let mut biases = Vec::with_capacity(n_bias);
        for _ in 0..n_bias {
            let signal = cur.take(4)? as u8;
            let bias = cur.take_signed(12)?;
            biases.push((signal, bias as f64 * table.code_bias.scale));
        }
        let Some(sat) = slot_to_sat(slot) else {
            continue;
        };
        entries.push(B2bCodeBiasEntry { sat, biases });
    }
    Ok(B2bBody::CodeBias {
        epoch,
        iodssr,
        entries,
    })
}
