use transport::TransactionHandle;

/// Links one source-side transaction (client⇄proxy) to one target-side
/// transaction (proxy⇄origin) for the duration of a single proxied request
/// (C2 row, spec §3).
#[derive(Debug, Clone, Copy)]
pub struct TransactionPair {
    pub outbound_mid: u16,
    pub source: TransactionHandle,
    pub target: TransactionHandle,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PairStatus {
    Ok,
    Full,
}

/// Fixed-capacity table correlating outbound MIDs with transaction pairs
/// (spec §4.2, component C2). All operations are O(n) over a table small
/// enough (`MAX_OPEN_TRANSACTIONS`, typically ≤ 16) that a linear scan beats
/// the bookkeeping of a hash index — the original's `LIST`-based table
/// scanned the same way.
pub struct PairTable {
    rows: Vec<Option<(TransactionPair, String)>>,
}

impl PairTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            rows: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.rows.len()
    }

    pub fn len(&self) -> usize {
        self.rows.iter().filter(|row| row.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a new pair. Never creates a row without both transaction
    /// handles already allocated by the caller (spec invariant, §4.2).
    pub fn pair_new(
        &mut self,
        outbound_mid: u16,
        source: TransactionHandle,
        target: TransactionHandle,
        cache_key: String,
    ) -> PairStatus {
        let Some(slot) = self.rows.iter_mut().find(|row| row.is_none()) else {
            return PairStatus::Full;
        };

        *slot = Some((
            TransactionPair {
                outbound_mid,
                source,
                target,
            },
            cache_key,
        ));

        PairStatus::Ok
    }

    pub fn pair_find(&self, outbound_mid: u16) -> Option<(&TransactionPair, &str)> {
        self.rows.iter().find_map(|row| {
            row.as_ref().and_then(|(pair, cache_key)| {
                (pair.outbound_mid == outbound_mid).then_some((pair, cache_key.as_str()))
            })
        })
    }

    /// Removes the row for `outbound_mid`. Does not touch the referenced
    /// transactions — ownership stays with the transport (spec §3). A
    /// repeat call for an already-cleared MID is a no-op.
    pub fn pair_clear(&mut self, outbound_mid: u16) {
        if let Some(slot) = self
            .rows
            .iter_mut()
            .find(|row| matches!(row, Some((pair, _)) if pair.outbound_mid == outbound_mid))
        {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(pool: &mut transport::TransactionPool, mid: u16) -> TransactionHandle {
        pool.new_transaction(mid, "127.0.0.1:5683".parse().unwrap())
            .unwrap()
    }

    #[test]
    fn pair_clear_is_idempotent() {
        let mut pool = transport::TransactionPool::new(4);
        let source = handle(&mut pool, 1);
        let target = handle(&mut pool, 2);

        let mut pairs = PairTable::new(2);
        pairs.pair_new(0x5000, source, target, "coap://[fd00::2]/x".to_string());

        pairs.pair_clear(0x5000);
        pairs.pair_clear(0x5000);

        assert!(pairs.is_empty());
    }

    #[test]
    fn rejects_insert_once_table_is_full() {
        let mut pool = transport::TransactionPool::new(8);
        let mut pairs = PairTable::new(2);

        for mid in 0..2u16 {
            let source = handle(&mut pool, mid);
            let target = handle(&mut pool, mid + 10);
            assert_eq!(
                pairs.pair_new(mid, source, target, "k".to_string()),
                PairStatus::Ok
            );
        }

        let source = handle(&mut pool, 99);
        let target = handle(&mut pool, 100);
        assert_eq!(
            pairs.pair_new(2, source, target, "k".to_string()),
            PairStatus::Full
        );
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn outbound_mid_uniquely_identifies_a_live_row() {
        let mut pool = transport::TransactionPool::new(4);
        let mut pairs = PairTable::new(4);

        let source = handle(&mut pool, 1);
        let target = handle(&mut pool, 2);
        pairs.pair_new(0x5000, source, target, "k".to_string());

        let (found, _) = pairs.pair_find(0x5000).unwrap();
        assert_eq!(found.outbound_mid, 0x5000);
        assert!(pairs.pair_find(0x5001).is_none());
    }
}
