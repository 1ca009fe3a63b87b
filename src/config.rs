//! Application-wide constants and compile-time configuration.
//!
//! Peer discovery, connection pacing and the notification target live
//! here so they can be tuned in one place. [`LinkConfig`] bundles the
//! values the state machine and runner consume; its defaults are the
//! constants below.

use embassy_time::Duration;

use crate::ble::AddressType;

// Discovery

/// Number of peer servers tracked concurrently (registry and connection
/// table capacity).
pub const MAX_PEERS: usize = 2;

/// Prefix the advertised complete local name must start with.
pub const TARGET_NAME: &str = "SERVER";

/// Optional 16-bit service UUID a candidate must also advertise.
pub const TARGET_SERVICE_UUID: Option<u16> = None;

/// Duration of a scan window (seconds).
pub const SCAN_DURATION_SECS: u64 = 5;

// Connection

/// Pause between consecutive connection-open requests (ms). The stack's
/// request queue overflows if a burst is issued back to back.
pub const OPEN_REQUEST_DELAY_MS: u64 = 10;

/// Address type used when opening peer connections.
pub const PEER_ADDRESS_TYPE: AddressType = AddressType::Public;

/// Direct connection (as opposed to background auto-connect).
pub const DIRECT_CONNECT: bool = true;

/// What a rejected open request does to the rest of the burst.
pub const OPEN_FAILURE_POLICY: OpenFailurePolicy = OpenFailurePolicy::SkipAddress;

// GATT

/// Application id the client profile registers with.
pub const APP_ID: u16 = 0;

/// Characteristic subscribed to on every peer.
pub const NOTIFY_CHAR_ID: u16 = 0x002A;

/// ATT MTU in effect until (or unless) negotiation succeeds.
pub const DEFAULT_ATT_MTU: u16 = 23;

// Buffers

/// Advertising data plus scan response, 31 bytes each.
pub const MAX_ADV_DATA_LEN: usize = 62;

/// Bytes of a notification value kept in an event.
pub const MAX_NOTIFY_LEN: usize = 20;

/// Requests or signals one event can produce.
pub const MAX_ACTIONS: usize = 8;

/// Depth of the stack-event queue between the callback context and the
/// runner task.
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Depth of the application command queue.
pub const COMMAND_QUEUE_DEPTH: usize = 4;

/// Policy applied when `open_connection` is rejected synchronously.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenFailurePolicy {
    /// Abandon only the failing address and keep going.
    SkipAddress,
    /// Abandon the failing address and every address queued after it.
    AbortRemaining,
}

/// Runtime view of the link configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    pub target_name: &'static str,
    pub target_service: Option<u16>,
    pub notify_characteristic: u16,
    pub scan_duration: Duration,
    pub open_interval: Duration,
    pub open_failure_policy: OpenFailurePolicy,
    pub address_type: AddressType,
    pub direct_connect: bool,
}

impl LinkConfig {
    pub const fn new() -> Self {
        Self {
            target_name: TARGET_NAME,
            target_service: TARGET_SERVICE_UUID,
            notify_characteristic: NOTIFY_CHAR_ID,
            scan_duration: Duration::from_secs(SCAN_DURATION_SECS),
            open_interval: Duration::from_millis(OPEN_REQUEST_DELAY_MS),
            open_failure_policy: OPEN_FAILURE_POLICY,
            address_type: PEER_ADDRESS_TYPE,
            direct_connect: DIRECT_CONNECT,
        }
    }

    pub const fn with_target_name(mut self, name: &'static str) -> Self {
        self.target_name = name;
        self
    }

    pub const fn with_open_failure_policy(mut self, policy: OpenFailurePolicy) -> Self {
        self.open_failure_policy = policy;
        self
    }

    pub const fn with_target_service(mut self, uuid: Option<u16>) -> Self {
        self.target_service = uuid;
        self
    }

    /// Scan window in whole seconds, as the stack's start request takes it.
    pub fn scan_duration_secs(&self) -> u32 {
        u32::try_from(self.scan_duration.as_secs()).unwrap_or(u32::MAX)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}
