use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::engine::types::Side;

// External book holds one pair's reconstructed price levels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalBook {
    // price -> size (aggregate), iterated ascending on both sides
    pub bids: BTreeMap<Decimal, Decimal>, // highest price = best bid
    pub asks: BTreeMap<Decimal, Decimal>, // lowest price  = best ask
}

impl ExternalBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn side(&self, side: Side) -> &BTreeMap<Decimal, Decimal> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, Decimal> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    pub fn set_level(&mut self, side: Side, price: Decimal, size: Decimal) {
        self.side_mut(side).insert(price, size);
    }

    pub fn remove_level(&mut self, side: Side, price: &Decimal) -> Option<Decimal> {
        self.side_mut(side).remove(price)
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn bbo(&self) -> (Option<(Decimal, Decimal)>, Option<(Decimal, Decimal)>) {
        let best_bid = self.bids.iter().next_back().map(|(p, s)| (*p, *s));
        let best_ask = self.asks.iter().next().map(|(p, s)| (*p, *s));
        (best_bid, best_ask)
    }

    /// Top `n` levels per side, best first.
    pub fn depth(&self, n: usize) -> (Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>) {
        let bids = self.bids.iter().rev().take(n).map(|(p, s)| (*p, *s)).collect();
        let asks = self.asks.iter().take(n).map(|(p, s)| (*p, *s)).collect();
        (bids, asks)
    }
}
