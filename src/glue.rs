//! Application-side hooks.
//!
//! The BLE core raises [`AppSignal`]s; [`forward`] turns each one into a
//! call on the application's [`AppSink`]. Sink methods run inline on the
//! event path and must return quickly.

use crate::ble::AppSignal;

pub trait AppSink {
    /// A peer link came up.
    fn on_ble_connected(&mut self);

    /// A peer link went down.
    fn on_ble_disconnected(&mut self);

    /// First byte of a notification from the peer at `peer_index`.
    fn on_notification_received(&mut self, peer_index: usize, value: u8);
}

impl<T: AppSink + ?Sized> AppSink for &mut T {
    fn on_ble_connected(&mut self) {
        (**self).on_ble_connected()
    }

    fn on_ble_disconnected(&mut self) {
        (**self).on_ble_disconnected()
    }

    fn on_notification_received(&mut self, peer_index: usize, value: u8) {
        (**self).on_notification_received(peer_index, value)
    }
}

/// Deliver one signal to the sink.
pub fn forward<A: AppSink + ?Sized>(sink: &mut A, signal: &AppSignal) {
    match *signal {
        AppSignal::Connected { peer } => {
            debug!("peer {} connected", peer);
            sink.on_ble_connected();
        }
        AppSignal::Disconnected { peer } => {
            debug!("peer {} disconnected", peer);
            sink.on_ble_disconnected();
        }
        AppSignal::Notification { peer, value } => sink.on_notification_received(peer, value),
    }
}
