//! Exact per-asset balance over public assets.

use std::collections::BTreeMap;

use primitives::params::MAX_TOKEN_VALUE;
use primitives::{Asset, Currency, Reject, Ticket};

#[derive(Clone, Copy, Default, Debug)]
struct Sides {
    ins: u128,
    outs: u128,
}

/// Per-currency sums and per-ticket counts on the input and output side.
#[derive(Clone, Default, Debug)]
pub struct CkState {
    tokens: BTreeMap<Currency, Sides>,
    tickets: BTreeMap<Ticket, (u32, u32)>,
}

impl CkState {
    pub fn new() -> Self { Self::default() }

    pub fn add_in(&mut self, asset: &Asset) -> Result<(), Reject> { self.add(asset, true) }

    pub fn add_out(&mut self, asset: &Asset) -> Result<(), Reject> { self.add(asset, false) }

    fn add(&mut self, asset: &Asset, input: bool) -> Result<(), Reject> {
        if let Some(t) = &asset.tkn {
            if t.value > MAX_TOKEN_VALUE {
                return Err(Reject::ValueRange(format!("{} {}", t.value, t.currency.symbol())));
            }
            if t.value > 0 {
                let sides = self.tokens.entry(t.currency).or_default();
                let slot = if input { &mut sides.ins } else { &mut sides.outs };
                *slot = slot
                    .checked_add(t.value)
                    .ok_or_else(|| Reject::ValueRange(format!("{} total overflows", t.currency.symbol())))?;
            }
        }
        if let Some(t) = &asset.tkt {
            let counts = self.tickets.entry(*t).or_default();
            if input { counts.0 += 1 } else { counts.1 += 1 }
        }
        Ok(())
    }

    /// Every currency and ticket balances exactly.
    pub fn check(&self) -> Result<(), Reject> {
        for (cy, s) in &self.tokens {
            if s.ins != s.outs {
                return Err(Reject::BalanceMismatch(format!("{}: in {} != out {}", cy.symbol(), s.ins, s.outs)));
            }
        }
        for (t, (i, o)) in &self.tickets {
            if i != o || *i > 1 {
                return Err(Reject::BalanceMismatch(format!("ticket {}: in {} out {}", hex::encode(&t.value[..8]), i, o)));
            }
        }
        Ok(())
    }
}
