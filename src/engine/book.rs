use std::collections::{HashMap, HashSet};

use ahash::AHashMap;
use rust_decimal::Decimal;
use tracing::{debug, error, instrument, trace, warn};

use crate::engine::types::{BookAction, BookDelta, BookEntry, BookMessage, BookUpdate, PartialPolicy, Side};
use crate::error::{FeedError, FeedResult};
use crate::market_data::external_book::ExternalBook;
use crate::market_data::normaliser::CanonicalChannel;

/// order id -> price it currently rests at, one map per side.
/// Updates and deletes carry only the id, so this is the only way back to a level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderIdIndex {
    pub bids: AHashMap<u64, Decimal>,
    pub asks: AHashMap<u64, Decimal>,
}

impl OrderIdIndex {
    pub fn side(&self, side: Side) -> &AHashMap<u64, Decimal> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut AHashMap<u64, Decimal> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    pub fn price(&self, side: Side, order_id: u64) -> Option<Decimal> {
        self.side(side).get(&order_id).copied()
    }

    pub fn len(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// One resolved change, computed before anything is mutated.
enum Op<'a> {
    Set { pair: &'a str, side: Side, order_id: u64, price: Decimal, size: Decimal },
    Resize { pair: &'a str, side: Side, price: Decimal, size: Decimal },
    Remove { pair: &'a str, side: Side, order_id: u64 },
}

/// Per-session book reconstruction driven by partial/insert/update/delete messages.
#[derive(Debug, Clone)]
pub struct BookEngine {
    pub books: HashMap<String, ExternalBook>,
    pub id_index: HashMap<String, OrderIdIndex>,
    pairs: Vec<String>,
    policy: PartialPolicy,
    partial_received: bool,
    partial_pairs: HashSet<String>,
}

impl BookEngine {
    pub fn new<I, S>(pairs: I, policy: PartialPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut engine = BookEngine {
            books: HashMap::new(),
            id_index: HashMap::new(),
            pairs: pairs.into_iter().map(Into::into).collect(),
            policy,
            partial_received: false,
            partial_pairs: HashSet::new(),
        };
        engine.reset();
        engine
    }

    /// Drop all state; the next accepted message has to be a partial.
    pub fn reset(&mut self) {
        self.partial_received = false;
        self.partial_pairs.clear();
        self.books = self.pairs.iter().map(|p| (p.clone(), ExternalBook::new())).collect();
        self.id_index = self.pairs.iter().map(|p| (p.clone(), OrderIdIndex::default())).collect();
        debug!(pairs = self.pairs.len(), policy = ?self.policy, "Book engine reset");
    }

    pub fn policy(&self) -> PartialPolicy {
        self.policy
    }

    pub fn partial_received(&self) -> bool {
        self.partial_received
    }

    /// Whether non-partial messages for `pair` are currently applied.
    pub fn accepts(&self, pair: &str) -> bool {
        match self.policy {
            PartialPolicy::Session => self.partial_received,
            PartialPolicy::PerPair => self.partial_pairs.contains(pair),
        }
    }

    pub fn book(&self, pair: &str) -> Option<&ExternalBook> {
        self.books.get(pair)
    }

    pub fn order_ids(&self, pair: &str) -> Option<&OrderIdIndex> {
        self.id_index.get(pair)
    }

    /// Every indexed order points at a live level and every level is indexed.
    pub fn is_consistent(&self) -> bool {
        let pairs: HashSet<&String> = self.books.keys().chain(self.id_index.keys()).collect();
        pairs.into_iter().all(|pair| {
            let empty_book = ExternalBook::new();
            let empty_index = OrderIdIndex::default();
            let book = self.books.get(pair).unwrap_or(&empty_book);
            let index = self.id_index.get(pair).unwrap_or(&empty_index);
            [Side::Bid, Side::Ask].into_iter().all(|side| {
                let levels = book.side(side);
                let ids = index.side(side);
                ids.values().all(|price| levels.contains_key(price))
                    && levels.keys().all(|price| ids.values().any(|p| p == price))
            })
        })
    }

    /// Apply one book message. Returns one update per pair the message touched;
    /// discarded and unknown-action messages return nothing.
    ///
    /// Either every entry is applied or, on error, none is.
    #[instrument(level = "debug", skip(self, msg), fields(action = ?msg.action, entries = msg.entries.len()))]
    pub fn apply(&mut self, msg: &BookMessage, timestamp: Decimal) -> FeedResult<Vec<BookUpdate>> {
        if let BookAction::Unknown(action) = &msg.action {
            warn!(action = %action, "Unexpected book action, ignoring message");
            return Ok(Vec::new());
        }
        let is_partial = msg.action == BookAction::Partial;

        // Messages before the snapshot reference state we never saw.
        let entries: Vec<_> = msg
            .entries
            .iter()
            .filter(|entry| is_partial || self.accepts(&entry.pair))
            .collect();
        if entries.is_empty() {
            if is_partial {
                // An empty book still opens the session; per pair there is no pair to open.
                self.partial_received = true;
                debug!("Empty partial received");
            } else {
                trace!("Discarding book message received before partial");
            }
            return Ok(Vec::new());
        }

        let ops = self.plan(&msg.action, &entries)?;

        let mut deltas: Vec<(&str, BookDelta)> = Vec::new();
        for op in ops {
            let pair = match &op {
                Op::Set { pair, .. } | Op::Resize { pair, .. } | Op::Remove { pair, .. } => *pair,
            };
            let i = match deltas.iter().position(|(p, _)| *p == pair) {
                Some(i) => i,
                None => {
                    deltas.push((pair, BookDelta::default()));
                    deltas.len() - 1
                }
            };
            self.execute(op, &mut deltas[i].1);
        }

        let session_forced = is_partial && !self.partial_received;
        let mut updates = Vec::with_capacity(deltas.len());
        for (pair, delta) in deltas {
            let forced = match self.policy {
                PartialPolicy::Session => session_forced,
                PartialPolicy::PerPair => is_partial && !self.partial_pairs.contains(pair),
            };
            if delta.is_empty() {
                continue;
            }
            updates.push(BookUpdate {
                pair: pair.to_string(),
                channel: CanonicalChannel::L2Book,
                forced,
                delta,
                timestamp,
            });
        }

        if is_partial {
            self.partial_received = true;
            if self.policy == PartialPolicy::PerPair {
                self.partial_pairs.extend(entries.iter().map(|e| e.pair.clone()));
            }
        }
        debug!(updates = updates.len(), "Applied book message");
        Ok(updates)
    }

    // Resolve every entry against the current index without touching it.
    fn plan<'a>(&self, action: &BookAction, entries: &[&'a BookEntry]) -> FeedResult<Vec<Op<'a>>> {
        let mut ops = Vec::with_capacity(entries.len());
        for &entry in entries {
            let pair = entry.pair.as_str();
            let side = entry.side;
            let order_id = entry.order_id;
            let op = match action {
                BookAction::Partial | BookAction::Insert => {
                    let (price, size) = match (entry.price, entry.size) {
                        (Some(price), Some(size)) => (price, size),
                        _ => {
                            return Err(FeedError::MalformedMessage(format!(
                                "{action:?} entry {order_id} for {pair} is missing price or size"
                            )))
                        }
                    };
                    Op::Set { pair, side, order_id, price, size }
                }
                BookAction::Update => {
                    let size = entry.size.ok_or_else(|| {
                        FeedError::MalformedMessage(format!("update entry {order_id} for {pair} is missing size"))
                    })?;
                    let price = self.resolve(pair, side, order_id)?;
                    Op::Resize { pair, side, price, size }
                }
                BookAction::Delete => {
                    self.resolve(pair, side, order_id)?;
                    Op::Remove { pair, side, order_id }
                }
                BookAction::Unknown(_) => continue,
            };
            ops.push(op);
        }
        Ok(ops)
    }

    fn resolve(&self, pair: &str, side: Side, order_id: u64) -> FeedResult<Decimal> {
        self.id_index.get(pair).and_then(|index| index.price(side, order_id)).ok_or_else(|| {
            error!(pair, ?side, order_id, "Order id missing from index, book is out of sync");
            FeedError::BookDesync { pair: pair.to_string(), side, order_id }
        })
    }

    fn execute(&mut self, op: Op<'_>, delta: &mut BookDelta) {
        match op {
            Op::Set { pair, side, order_id, price, size } => {
                self.book_mut(pair).set_level(side, price, size);
                self.index_mut(pair).side_mut(side).insert(order_id, price);
                delta.push(side, price, size);
            }
            Op::Resize { pair, side, price, size } => {
                self.book_mut(pair).set_level(side, price, size);
                delta.push(side, price, size);
            }
            Op::Remove { pair, side, order_id } => {
                // A repeated id within one delete message is already gone.
                if let Some(price) = self.index_mut(pair).side_mut(side).remove(&order_id) {
                    self.book_mut(pair).remove_level(side, &price);
                    delta.push(side, price, Decimal::ZERO);
                }
            }
        }
    }

    fn book_mut(&mut self, pair: &str) -> &mut ExternalBook {
        if !self.books.contains_key(pair) {
            debug!(pair, "Creating book for unsubscribed pair");
        }
        self.books.entry(pair.to_string()).or_default()
    }

    fn index_mut(&mut self, pair: &str) -> &mut OrderIdIndex {
        self.id_index.entry(pair.to_string()).or_default()
    }
}
