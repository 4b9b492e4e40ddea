//! Versioned wire adapters. One canonical `Tx` in memory; the version tag
//! only selects the byte layout at the serialization boundary.

use anyhow::{anyhow, Result};

use crate::encode::*;
use crate::types::*;

/// Legacy layout without escrow descriptors.
pub const TX_WIRE_V1: u8 = 1;
/// Full layout with escrow descriptors.
pub const TX_WIRE_V2: u8 = 2;

impl Tx {
    pub fn to_wire(&self, version: u8) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(512);
        out.push(version);
        match version {
            TX_WIRE_V1 => {
                if self.desc_pkg.count() > 0 {
                    return Err(anyhow!("wire v1 cannot carry package descriptors"));
                }
                self.encode_body(&mut out, false);
            }
            TX_WIRE_V2 => self.encode_body(&mut out, true),
            v => return Err(anyhow!("unsupported tx wire version: {}", v)),
        }
        Ok(out)
    }

    /// Decode any supported version; returns the tag alongside the tx.
    pub fn from_wire(mut data: &[u8]) -> Result<(u8, Self)> {
        let ver = read_u8(&mut data)?;
        let tx = match ver {
            TX_WIRE_V1 => Self::decode_body(&mut data, false)?,
            TX_WIRE_V2 => Self::decode_body(&mut data, true)?,
            v => return Err(anyhow!("unsupported tx wire version: {}", v)),
        };
        if !data.is_empty() { return Err(anyhow!("trailing bytes in Tx")); }
        Ok((ver, tx))
    }

    fn encode_body(&self, out: &mut Vec<u8>, with_pkg: bool) {
        self.from.encode(out);
        self.fee.encode(out);
        self.desc_o.ins.encode(out);
        self.desc_o.outs.encode(out);
        self.desc_z.ins.encode(out);
        self.desc_z.outs.encode(out);
        if with_pkg { self.desc_pkg.encode(out); }
        out.extend_from_slice(&self.bcr);
        self.bsign.encode(out);
        self.sign.encode(out);
    }

    fn decode_body(data: &mut &[u8], with_pkg: bool) -> Result<Self> {
        let from = Address::decode(data)?;
        let fee = Token::decode(data)?;
        let desc_o = DescO { ins: Vec::decode(data)?, outs: Vec::decode(data)? };
        let desc_z = DescZ { ins: Vec::decode(data)?, outs: Vec::decode(data)? };
        let desc_pkg = if with_pkg { DescPkg::decode(data)? } else { DescPkg::default() };
        let bcr = read_fixed::<HASH_LEN>(data)?;
        let bsign = Signature::decode(data)?;
        let sign = Signature::decode(data)?;
        Ok(Tx { from, fee, desc_o, desc_z, desc_pkg, bcr, bsign, sign })
    }
}

/// Prefix a record with its version tag.
pub fn frame(version: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(version);
    out.extend_from_slice(body);
    out
}

/// Split off and check the version tag of a framed record.
pub fn unframe(expected: u8, data: &[u8]) -> Result<&[u8]> {
    let mut rest = data;
    let ver = read_u8(&mut rest)?;
    if ver != expected { return Err(anyhow!("unsupported encoding version: {}", ver)); }
    Ok(rest)
}
