//! Per-peer connection slots.
//!
//! Slot `i` belongs to the `i`-th registered address. A slot moves
//! `Idle -> Connecting -> Negotiating -> Subscribing -> Ready` and drops
//! back to `Idle` on disconnect. `Negotiating` lasts while the MTU exchange
//! is outstanding, `Subscribing` while the notification registration is;
//! `Ready` means both completed.

use crate::ble::{ConnId, PeerAddress};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotState {
    /// The owning profile has no interface handle yet.
    Unregistered,
    Idle,
    /// Open request issued, waiting for the connect event.
    Connecting,
    Negotiating,
    Subscribing,
    Ready,
}

impl SlotState {
    /// Link established (connection id valid).
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            SlotState::Negotiating | SlotState::Subscribing | SlotState::Ready
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionRecord {
    pub state: SlotState,
    pub connection_id: Option<ConnId>,
    pub address: Option<PeerAddress>,
    /// Negotiated ATT MTU, `None` until a successful exchange.
    pub mtu: Option<u16>,
    /// First byte of the most recent notification. Survives disconnects.
    pub last_value: u8,
    mtu_pending: bool,
    /// Issue sequence of the outstanding subscription, if any.
    subscribe_pending: Option<u32>,
    subscribed: bool,
}

impl ConnectionRecord {
    pub const UNREGISTERED: Self = Self {
        state: SlotState::Unregistered,
        connection_id: None,
        address: None,
        mtu: None,
        last_value: 0,
        mtu_pending: false,
        subscribe_pending: None,
        subscribed: false,
    };

    pub fn subscribe_pending(&self) -> Option<u32> {
        self.subscribe_pending
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    fn refresh(&mut self) {
        if !self.state.is_connected() {
            return;
        }
        self.state = if self.mtu_pending {
            SlotState::Negotiating
        } else if !self.subscribed {
            SlotState::Subscribing
        } else {
            SlotState::Ready
        };
    }

    fn reset(&mut self, state: SlotState) {
        *self = Self {
            state,
            last_value: self.last_value,
            ..Self::UNREGISTERED
        };
    }
}

/// Fixed array of `N` connection records.
#[derive(Clone, Debug)]
pub struct ConnectionTable<const N: usize> {
    slots: [ConnectionRecord; N],
}

impl<const N: usize> Default for ConnectionTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ConnectionTable<N> {
    pub const fn new() -> Self {
        Self {
            slots: [ConnectionRecord::UNREGISTERED; N],
        }
    }

    pub fn get(&self, slot: usize) -> Option<&ConnectionRecord> {
        self.slots.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionRecord> {
        self.slots.iter()
    }

    pub fn state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    pub fn slot_for_connection(&self, connection_id: ConnId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.state.is_connected() && s.connection_id == Some(connection_id))
    }

    pub fn slot_for_address(&self, address: &PeerAddress) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.state.is_connected() && s.address.as_ref() == Some(address))
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state.is_connected()).count()
    }

    pub fn all_idle(&self) -> bool {
        self.slots.iter().all(|s| s.state == SlotState::Idle)
    }

    /// Profile registered: every unregistered slot becomes idle.
    pub fn mark_registered(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.state == SlotState::Unregistered {
                slot.state = SlotState::Idle;
            }
        }
    }

    /// `Idle -> Connecting`. False if the slot is in any other state.
    pub fn begin_open(&mut self, slot: usize) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) if s.state == SlotState::Idle => {
                s.state = SlotState::Connecting;
                true
            }
            _ => false,
        }
    }

    /// `Connecting -> Idle` after a failed or dropped open attempt.
    pub fn abandon_open(&mut self, slot: usize) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) if s.state == SlotState::Connecting => {
                s.state = SlotState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Record a new link and mark both negotiation steps outstanding.
    pub fn connect(&mut self, slot: usize, connection_id: ConnId, address: PeerAddress, seq: u32) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.reset(SlotState::Negotiating);
            s.connection_id = Some(connection_id);
            s.address = Some(address);
            s.mtu_pending = true;
            s.subscribe_pending = Some(seq);
        }
    }

    /// MTU exchange finished, successfully (`Some(mtu)`) or not.
    pub fn mtu_done(&mut self, slot: usize, mtu: Option<u16>) {
        if let Some(s) = self.slots.get_mut(slot) {
            if !s.state.is_connected() {
                return;
            }
            s.mtu_pending = false;
            if mtu.is_some() {
                s.mtu = mtu;
            }
            s.refresh();
        }
    }

    /// Slot whose subscription was issued first and is still outstanding.
    pub fn oldest_pending_subscription(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.subscribe_pending.map(|seq| (i, seq)))
            .min_by_key(|&(_, seq)| seq)
            .map(|(i, _)| i)
    }

    /// Subscription outcome for `slot`.
    pub fn subscription_done(&mut self, slot: usize, success: bool) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.subscribe_pending = None;
            if success && s.state.is_connected() {
                s.subscribed = true;
            }
            s.refresh();
        }
    }

    pub fn record_value(&mut self, slot: usize, value: u8) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.last_value = value;
        }
    }

    /// Back to `Idle`, keeping the last value. Returns the previous state.
    pub fn disconnect(&mut self, slot: usize) -> Option<SlotState> {
        let s = self.slots.get_mut(slot)?;
        let previous = s.state;
        if previous == SlotState::Unregistered {
            return Some(previous);
        }
        s.reset(SlotState::Idle);
        Some(previous)
    }
}
