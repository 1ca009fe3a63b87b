//! Discovered peer addresses.
//!
//! Filled during the scanning phase only; insertion order is the order in
//! which connections are attempted, and the index of an address is the
//! connection slot it ends up in.

use heapless::Vec;

use crate::ble::PeerAddress;

/// Ordered, deduplicated set of at most `N` peer addresses.
#[derive(Clone, Debug, Default)]
pub struct AddressRegistry<const N: usize> {
    entries: Vec<PeerAddress, N>,
}

impl<const N: usize> AddressRegistry<N> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn contains(&self, address: &PeerAddress) -> bool {
        self.entries.contains(address)
    }

    /// Append `address` unless it is already known or the registry is full.
    pub fn try_add(&mut self, address: PeerAddress) -> bool {
        if self.contains(&address) {
            return false;
        }
        self.entries.push(address).is_ok()
    }

    pub fn position(&self, address: &PeerAddress) -> Option<usize> {
        self.entries.iter().position(|a| a == address)
    }

    pub fn get(&self, index: usize) -> Option<&PeerAddress> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerAddress> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// Forget every address. Only a new discovery cycle does this.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
