//! Escrow package records.
//!
//! A package is created once under a caller-chosen id, may change holder
//! any number of times and is closed at most once. Closed records stay in
//! the store so the id can never be reused.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use primitives::encode::*;
use primitives::wire::{frame, unframe};
use primitives::{Address, PkgCreate, PkgId, Reject};

use crate::state::STATE_V1;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PkgState {
    /// Block number of the last change.
    pub high: u64,
    /// Sender of the creating transaction.
    pub from: Address,
    pub pack: PkgCreate,
    /// Current holder; signs transfers and the close.
    pub owner: Address,
    pub closed: bool,
}

impl PkgState {
    pub fn created(high: u64, from: Address, pack: PkgCreate) -> Self {
        let owner = pack.owner;
        Self { high, from, pack, owner, closed: false }
    }

    pub fn id(&self) -> PkgId { self.pack.id }

    /// Open packages only; a closed or missing package is a rejection.
    pub fn require_open(state: Option<Self>, id: &PkgId) -> Result<Self, Reject> {
        match state {
            Some(p) if !p.closed => Ok(p),
            _ => Err(Reject::PackageMissing(id.to_hex())),
        }
    }

    pub fn transfer(&mut self, high: u64, to: Address) {
        self.owner = to;
        self.high = high;
    }

    pub fn close(&mut self, high: u64) {
        self.closed = true;
        self.high = high;
    }

    pub fn to_record(&self) -> Vec<u8> {
        let mut body = Vec::new();
        encode_u64(self.high, &mut body);
        self.from.encode(&mut body);
        self.pack.encode(&mut body);
        self.owner.encode(&mut body);
        self.closed.encode(&mut body);
        frame(STATE_V1, &body)
    }

    pub fn from_record(data: &[u8]) -> Result<Self> {
        let mut rest = unframe(STATE_V1, data)?;
        let high = read_u64(&mut rest)?;
        let from = Address::decode(&mut rest)?;
        let pack = PkgCreate::decode(&mut rest)?;
        let owner = Address::decode(&mut rest)?;
        let closed = read_bool(&mut rest)?;
        if !rest.is_empty() {
            return Err(anyhow!("trailing bytes in package record"));
        }
        Ok(Self { high, from, pack, owner, closed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitives::{AssetCm, Commitment, Pkg, ProofBytes};

    fn created() -> PkgState {
        let pack = PkgCreate {
            id: PkgId([1u8; 32]),
            owner: Address { ak: [2u8; 32], pk_d: [3u8; 32] },
            pkg: Pkg { asset_cm: AssetCm([4u8; 32]), pkg_cm: Commitment([5u8; 32]), einfo: vec![6; 10] },
            proof: ProofBytes(vec![7; 4]),
        };
        PkgState::created(3, Address::default(), pack)
    }

    #[test]
    fn closed_package_cannot_be_reopened() {
        let mut p = created();
        p.transfer(4, Address { ak: [8u8; 32], pk_d: [9u8; 32] });
        assert_eq!(p.owner.ak, [8u8; 32]);
        p.close(5);
        let id = p.id();
        assert!(matches!(PkgState::require_open(Some(p), &id), Err(Reject::PackageMissing(_))));
        assert!(PkgState::require_open(None, &id).is_err());
    }

    #[test]
    fn record_keeps_holder_and_flag() {
        let mut p = created();
        p.close(9);
        let back = PkgState::from_record(&p.to_record()).unwrap();
        assert_eq!(back, p);
    }
}
