use std::net::SocketAddr;

use codec::{Message, MessageType, Token};

/// A handle to a pooled transaction: a slot index plus the generation it
/// was allocated under. Per the design notes' re-architecture of the
/// source's raw back-pointers, a stale handle (one whose generation no
/// longer matches the slot) is simply `None` on lookup rather than a
/// dangling reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHandle {
    index: usize,
    generation: u32,
}

/// One in-flight CoAP transaction: the peer it talks to, the MID that
/// correlates request and response on this hop, the original message's
/// type and token (needed to build the eventual reply), and (once
/// available) the serialized message waiting to go out.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub mid: u16,
    pub endpoint: SocketAddr,
    pub token: Token,
    pub mtype: MessageType,
    pending: Option<Vec<u8>>,
}

impl Transaction {
    /// Records the original request's type and token so a later reply
    /// built from this transaction mirrors them correctly (spec §3, §4.3.3).
    pub fn set_context(&mut self, token: Token, mtype: MessageType) {
        self.token = token;
        self.mtype = mtype;
    }

    pub fn set_message(&mut self, message: &Message) -> Result<(), codec::Error> {
        self.pending = Some(codec::Encoder::encode(message)?);
        Ok(())
    }
}

struct Slot {
    generation: u32,
    transaction: Option<Transaction>,
}

/// Fixed-capacity pool of open transactions, sized by `MAX_OPEN_TRANSACTIONS`
/// (spec §5, §6.4). `new_transaction` fails closed once the pool is full —
/// the engine turns that into `5.03 Service Unavailable`.
pub struct TransactionPool {
    slots: Vec<Slot>,
    open: usize,
}

impl TransactionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity)
                .map(|_| Slot {
                    generation: 0,
                    transaction: None,
                })
                .collect(),
            open: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn open_count(&self) -> usize {
        self.open
    }

    /// Allocates a transaction from the pool keyed by `mid` on `endpoint`.
    /// Returns `None` when every slot is occupied.
    ///
    /// # Test
    ///
    /// ```
    /// use coap_proxy_transport::TransactionPool;
    ///
    /// let mut pool = TransactionPool::new(2);
    /// let addr = "127.0.0.1:5683".parse().unwrap();
    ///
    /// let a = pool.new_transaction(1, addr).unwrap();
    /// let b = pool.new_transaction(2, addr).unwrap();
    /// assert!(pool.new_transaction(3, addr).is_none());
    ///
    /// pool.clear_transaction(a);
    /// assert!(pool.new_transaction(4, addr).is_some());
    /// assert_eq!(pool.open_count(), 2);
    /// let _ = b;
    /// ```
    pub fn new_transaction(&mut self, mid: u16, endpoint: SocketAddr) -> Option<TransactionHandle> {
        let index = self.slots.iter().position(|slot| slot.transaction.is_none())?;

        let slot = &mut self.slots[index];
        slot.transaction = Some(Transaction {
            mid,
            endpoint,
            token: Token::new(&[]).expect("empty token is always valid"),
            mtype: MessageType::Con,
            pending: None,
        });
        self.open += 1;

        Some(TransactionHandle {
            index,
            generation: slot.generation,
        })
    }

    pub fn get_transaction_by_mid(&self, mid: u16) -> Option<TransactionHandle> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            slot.transaction.as_ref().and_then(|t| {
                (t.mid == mid).then_some(TransactionHandle {
                    index,
                    generation: slot.generation,
                })
            })
        })
    }

    pub fn get(&self, handle: TransactionHandle) -> Option<&Transaction> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }

        slot.transaction.as_ref()
    }

    pub fn get_mut(&mut self, handle: TransactionHandle) -> Option<&mut Transaction> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }

        slot.transaction.as_mut()
    }

    /// Removes the transaction and hands back its pending bytes for the
    /// caller to push onto the socket. Does nothing (not an error) for an
    /// already-cleared or stale handle — `pair_clear`-style idempotence.
    pub fn send_transaction(&mut self, handle: TransactionHandle) -> Option<(SocketAddr, Vec<u8>)> {
        let transaction = self.get(handle)?;
        let endpoint = transaction.endpoint;
        let bytes = transaction.pending.clone()?;

        Some((endpoint, bytes))
    }

    /// Frees the slot and bumps its generation so any handle still
    /// referencing it becomes invalid on the next lookup.
    pub fn clear_transaction(&mut self, handle: TransactionHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index) {
            if slot.generation == handle.generation && slot.transaction.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.open -= 1;
            }
        }
    }
}
