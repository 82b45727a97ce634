// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Stores transport instances keyed by destination address and hands out
//! non-owning handles instead of raw pointers.
//!
//! The original implementation this is modeled on returns a raw pointer into
//! an `unordered_map`, which dangles the moment the map rehashes or the entry
//! is erased. A [`TransportHandle`] instead carries a generation counter: it
//! re-resolves against the manager on every use and reads as absent once the
//! slot it named has been erased or reused, so no caller can ever observe a
//! stale transport.

use std::collections::HashMap;

use crate::core::socket_address::SocketAddress;

/// A non-owning reference to a transport stored in a [`TransportManager`].
/// Valid only against the manager that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportHandle {
    addr: SocketAddress,
    generation: u64,
}

impl TransportHandle {
    /// Address this handle was issued for.
    pub fn address(&self) -> SocketAddress {
        self.addr
    }
}

struct Slot<T> {
    generation: u64,
    value: T,
}

/// Owns transport instances of type `T`, keyed by destination address.
pub struct TransportManager<T> {
    slots: HashMap<SocketAddress, Slot<T>>,
    next_generation: u64,
}

impl<T> Default for TransportManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TransportManager<T> {
    /// Empty manager.
    pub fn new() -> Self {
        Self { slots: HashMap::new(), next_generation: 1 }
    }

    /// Resolve a handle to a shared reference, if it is still live.
    pub fn resolve(&self, handle: TransportHandle) -> Option<&T> {
        self.slots
            .get(&handle.addr)
            .filter(|s| s.generation == handle.generation)
            .map(|s| &s.value)
    }

    /// Resolve a handle to a mutable reference, if it is still live.
    pub fn resolve_mut(&mut self, handle: TransportHandle) -> Option<&mut T> {
        self.slots
            .get_mut(&handle.addr)
            .filter(|s| s.generation == handle.generation)
            .map(|s| &mut s.value)
    }

    /// Look up the live handle for `addr`, if a transport exists there.
    pub fn get(&self, addr: &SocketAddress) -> Option<TransportHandle> {
        self.slots.get(addr).map(|s| TransportHandle { addr: *addr, generation: s.generation })
    }

    /// Borrow the transport at `addr` directly, if one exists.
    pub fn get_value(&self, addr: &SocketAddress) -> Option<&T> {
        self.slots.get(addr).map(|s| &s.value)
    }

    /// Borrow the transport at `addr` mutably, if one exists.
    pub fn get_value_mut(&mut self, addr: &SocketAddress) -> Option<&mut T> {
        self.slots.get_mut(addr).map(|s| &mut s.value)
    }

    /// Fetch the transport at `addr`, constructing it with `make` if absent.
    /// Returns the handle and whether it was newly created.
    pub fn get_or_create(&mut self, addr: SocketAddress, make: impl FnOnce() -> T) -> (TransportHandle, bool) {
        if let Some(s) = self.slots.get(&addr) {
            return (TransportHandle { addr, generation: s.generation }, false);
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.slots.insert(addr, Slot { generation, value: make() });
        (TransportHandle { addr, generation }, true)
    }

    /// Remove the transport at `addr`. Any handles previously issued for it
    /// become permanently unresolvable.
    pub fn erase(&mut self, addr: &SocketAddress) {
        self.slots.remove(addr);
    }

    /// Number of live transports.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the manager holds no transports.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate over all live addresses and their transports.
    pub fn iter(&self) -> impl Iterator<Item = (&SocketAddress, &T)> {
        self.slots.iter().map(|(a, s)| (a, &s.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddress {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn get_or_create_then_erase_invalidates_handle() {
        let mut mgr: TransportManager<u32> = TransportManager::new();
        let (h, created) = mgr.get_or_create(addr(1), || 42);
        assert!(created);
        assert_eq!(mgr.resolve(h), Some(&42));

        let (h2, created2) = mgr.get_or_create(addr(1), || 0);
        assert!(!created2);
        assert_eq!(h, h2);

        mgr.erase(&addr(1));
        assert_eq!(mgr.resolve(h), None);
        assert_eq!(mgr.get(&addr(1)), None);
    }

    #[test]
    fn reinsertion_after_erase_yields_new_generation() {
        let mut mgr: TransportManager<u32> = TransportManager::new();
        let (h1, _) = mgr.get_or_create(addr(1), || 1);
        mgr.erase(&addr(1));
        let (h2, created) = mgr.get_or_create(addr(1), || 2);
        assert!(created);
        assert_ne!(h1, h2);
        assert_eq!(mgr.resolve(h1), None);
        assert_eq!(mgr.resolve(h2), Some(&2));
    }
}
