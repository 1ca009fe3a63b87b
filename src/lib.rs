//! ble-multilink - multi-peer BLE GATT client core.
//!
//! Discovers up to [`config::MAX_PEERS`] peripherals advertising a target
//! name, opens a link to each, negotiates the MTU, subscribes to one
//! notification characteristic and reports per-peer values to the
//! application.
//!
//! The crate holds no radio code. The stack is reached through
//! [`ble::runner::BleStack`] and reports back through
//! [`ble::StackEvent`]s, so everything here runs unchanged on the host.
//!
//! Usage: `cargo test` (host logging through the `log` feature), or build
//! for a target with `--features defmt`.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
mod fmt;

pub mod ble;
pub mod config;
pub mod error;
pub mod glue;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports
// ═══════════════════════════════════════════════════════════════════════════

pub use ble::central::Central;
pub use ble::dispatcher::{EventDispatcher, ProfileHandler};
pub use ble::runner::{post_event, BleStack, Runner};
pub use ble::{AppSignal, LinkCommand, PeerAddress, Request, StackEvent};
pub use config::LinkConfig;
pub use error::{Error, StackError};
pub use glue::AppSink;

/// The single-profile client this crate was built for.
pub type GattClient = EventDispatcher<Central<{ config::MAX_PEERS }>, 1>;

/// Build a [`GattClient`] for `config`, registered under [`config::APP_ID`].
pub fn gatt_client(config: LinkConfig) -> GattClient {
    let mut client = GattClient::new();
    if let Err(e) = client.add_profile(config::APP_ID, Central::new(config::APP_ID, config)) {
        error!("client profile not added: {:?}", e);
    }
    client
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::InterfaceHandle;

    #[test]
    fn gatt_client_has_one_unbound_profile() {
        let client = gatt_client(LinkConfig::default());
        assert_eq!(client.profiles().count(), 1);
        assert_eq!(client.profiles().next().unwrap().app_id(), config::APP_ID);
        assert_eq!(client.interface_of(config::APP_ID), InterfaceHandle::NONE);
        assert!(!client.handler(0).unwrap().is_registered());
    }
}
