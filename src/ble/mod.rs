//! Bluetooth Low Energy client core.
//!
//! The underlying stack is a black box that reports everything through
//! [`StackEvent`]s and accepts [`Request`]s. Between the two sits:
//!
//! 1. **Scanner** - filters scan results by advertised name and fills the
//!    [`registry::AddressRegistry`] until it is full.
//! 2. **Central** - the per-slot connection state machine: opens a link to
//!    every registered peer, negotiates the MTU, subscribes to the
//!    notification characteristic and tracks the last value per peer.
//! 3. **Dispatcher** - routes events to profile handlers by interface
//!    handle.
//! 4. **Runner** - executes requests against a [`runner::BleStack`] and
//!    forwards [`AppSignal`]s to the application.

pub mod adv_parser;
pub mod central;
pub mod dispatcher;
pub mod multi_conn;
pub mod registry;
pub mod runner;
pub mod scanner;

use core::fmt;

use heapless::Vec;

use crate::config::{MAX_ACTIONS, MAX_ADV_DATA_LEN, MAX_NOTIFY_LEN};
use crate::error::Error;

/// Connection id assigned by the stack.
pub type ConnId = u16;

/// Raw advertising data plus scan response.
pub type AdvPayload = Vec<u8, MAX_ADV_DATA_LEN>;

/// Notification value as carried in an event.
pub type NotifyPayload = Vec<u8, MAX_NOTIFY_LEN>;

/// 6-byte link-layer address, most significant byte first.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress([u8; 6]);

impl PeerAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<[u8; 6]> for PeerAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PeerAddress {
    fn format(&self, f: defmt::Formatter) {
        let b = &self.0;
        defmt::write!(
            f,
            "{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}:{=u8:02x}",
            b[0],
            b[1],
            b[2],
            b[3],
            b[4],
            b[5]
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressType {
    Public,
    Random,
}

/// Opaque handle the stack assigns to a registered profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceHandle(u8);

impl InterfaceHandle {
    /// Not registered / addressed to every profile.
    pub const NONE: Self = Self(0xFF);

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }
}

/// GATT / GAP completion status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GattStatus(pub u8);

impl GattStatus {
    pub const SUCCESS: Self = Self(0);

    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }
}

/// Sub-event of a scan result report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SearchEvent {
    /// An advertising report.
    InquiryResult,
    /// The scan window elapsed.
    InquiryComplete,
    DiscoveryResult,
    DiscoveryComplete,
    SearchCancelComplete,
}

/// Everything the underlying stack reports, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackEvent {
    RegistrationComplete {
        interface: InterfaceHandle,
        app_id: u16,
        status: GattStatus,
    },
    ScanResult {
        sub_event: SearchEvent,
        address: PeerAddress,
        address_type: AddressType,
        rssi: i8,
        data: AdvPayload,
    },
    ScanStopped {
        status: GattStatus,
    },
    ConnectComplete {
        interface: InterfaceHandle,
        connection_id: ConnId,
        remote_address: PeerAddress,
    },
    OpenComplete {
        interface: InterfaceHandle,
        status: GattStatus,
        connection_id: ConnId,
        remote_address: PeerAddress,
    },
    MtuConfigured {
        interface: InterfaceHandle,
        status: GattStatus,
        mtu: u16,
        connection_id: ConnId,
    },
    NotifyRegistered {
        interface: InterfaceHandle,
        status: GattStatus,
        handle: u16,
    },
    Notification {
        interface: InterfaceHandle,
        connection_id: ConnId,
        handle: u16,
        value: NotifyPayload,
    },
    Disconnected {
        interface: InterfaceHandle,
        reason: u16,
        connection_id: ConnId,
        remote_address: PeerAddress,
    },
    ConnectionParamsUpdated {
        status: GattStatus,
        address: PeerAddress,
        min_interval: u16,
        max_interval: u16,
        interval: u16,
        latency: u16,
        timeout: u16,
    },
}

impl StackEvent {
    /// Build a scan result, truncating the payload to [`MAX_ADV_DATA_LEN`].
    pub fn scan_result(sub_event: SearchEvent, address: PeerAddress, rssi: i8, data: &[u8]) -> Self {
        StackEvent::ScanResult {
            sub_event,
            address,
            address_type: AddressType::Public,
            rssi,
            data: truncated(data),
        }
    }

    /// Build a notification, truncating the value to [`MAX_NOTIFY_LEN`].
    pub fn notification(
        interface: InterfaceHandle,
        connection_id: ConnId,
        handle: u16,
        value: &[u8],
    ) -> Self {
        StackEvent::Notification {
            interface,
            connection_id,
            handle,
            value: truncated(value),
        }
    }

    /// Interface handle carried by the event. GAP events carry none.
    pub fn interface(&self) -> Option<InterfaceHandle> {
        match self {
            StackEvent::RegistrationComplete { interface, .. }
            | StackEvent::ConnectComplete { interface, .. }
            | StackEvent::OpenComplete { interface, .. }
            | StackEvent::MtuConfigured { interface, .. }
            | StackEvent::NotifyRegistered { interface, .. }
            | StackEvent::Notification { interface, .. }
            | StackEvent::Disconnected { interface, .. } => Some(*interface),
            StackEvent::ScanResult { .. }
            | StackEvent::ScanStopped { .. }
            | StackEvent::ConnectionParamsUpdated { .. } => None,
        }
    }
}

fn truncated<const C: usize>(data: &[u8]) -> Vec<u8, C> {
    let mut out = Vec::new();
    // Cannot fail: the slice is clamped to the capacity.
    let _ = out.extend_from_slice(&data[..data.len().min(C)]);
    out
}

/// Outbound request to the underlying stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    StartScanning {
        duration_secs: u32,
    },
    StopScanning,
    OpenConnection {
        interface: InterfaceHandle,
        address: PeerAddress,
        address_type: AddressType,
        is_direct: bool,
    },
    RequestMtu {
        interface: InterfaceHandle,
        connection_id: ConnId,
    },
    RegisterForNotify {
        interface: InterfaceHandle,
        address: PeerAddress,
        characteristic: u16,
    },
}

impl Request {
    /// Profile the request was issued on behalf of.
    pub fn interface(&self) -> Option<InterfaceHandle> {
        match self {
            Request::StartScanning { .. } | Request::StopScanning => None,
            Request::OpenConnection { interface, .. }
            | Request::RequestMtu { interface, .. }
            | Request::RegisterForNotify { interface, .. } => Some(*interface),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Request::OpenConnection { .. })
    }
}

/// Signal for the application layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppSignal {
    Connected { peer: usize },
    Disconnected { peer: usize },
    Notification { peer: usize, value: u8 },
}

/// Application-level commands the runner accepts next to stack events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkCommand {
    /// Clear the registry and scan again. Only valid while every slot is idle.
    StartDiscovery,
    /// Issue open requests for registered peers whose slot is idle.
    ReconnectIdle,
}

/// What a request failure means for the rest of the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Disposition {
    Continue,
    /// Drop every open request still queued in this batch.
    AbortOpens,
}

/// Requests and signals produced while handling one event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Actions {
    requests: Vec<Request, MAX_ACTIONS>,
    signals: Vec<AppSignal, MAX_ACTIONS>,
}

impl Actions {
    pub const fn new() -> Self {
        Self {
            requests: Vec::new(),
            signals: Vec::new(),
        }
    }

    pub fn request(&mut self, request: Request) -> Result<(), Error> {
        self.requests.push(request).map_err(|_| Error::ActionOverflow)
    }

    pub fn signal(&mut self, signal: AppSignal) -> Result<(), Error> {
        self.signals.push(signal).map_err(|_| Error::ActionOverflow)
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn signals(&self) -> &[AppSignal] {
        &self.signals
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.signals.is_empty()
    }

    pub fn clear(&mut self) {
        self.requests.clear();
        self.signals.clear();
    }
}
