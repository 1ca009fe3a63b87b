//! Connection state machine for a fixed set of `N` peers.
//!
//! [`Central`] owns the address registry, the scan phase and the
//! connection table. It never talks to the stack itself: every event
//! handler appends the requests to issue and the application signals to
//! raise to an [`Actions`] batch, which the runner executes.

use crate::ble::dispatcher::ProfileHandler;
use crate::ble::multi_conn::{ConnectionRecord, ConnectionTable, SlotState};
use crate::ble::registry::AddressRegistry;
use crate::ble::scanner::{ScanFilter, ScanOutcome, ScanPhase, Scanner};
use crate::ble::{
    Actions, AppSignal, ConnId, Disposition, GattStatus, InterfaceHandle, LinkCommand,
    PeerAddress, Request, StackEvent,
};
use crate::config::{LinkConfig, OpenFailurePolicy, MAX_ACTIONS};
use crate::error::{Error, StackError};

pub struct Central<const N: usize> {
    config: LinkConfig,
    app_id: u16,
    interface: InterfaceHandle,
    registry: AddressRegistry<N>,
    scanner: Scanner,
    table: ConnectionTable<N>,
    /// Issue order of subscription requests.
    next_subscription: u32,
}

impl<const N: usize> Central<N> {
    const FITS_ONE_BATCH: () = assert!(
        N > 0 && N <= MAX_ACTIONS,
        "peer count must fit in one action batch"
    );

    pub fn new(app_id: u16, config: LinkConfig) -> Self {
        let () = Self::FITS_ONE_BATCH;
        Self {
            config,
            app_id,
            interface: InterfaceHandle::NONE,
            registry: AddressRegistry::new(),
            scanner: Scanner::new(ScanFilter::from_config(&config)),
            table: ConnectionTable::new(),
            next_subscription: 0,
        }
    }

    pub fn app_id(&self) -> u16 {
        self.app_id
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn interface(&self) -> InterfaceHandle {
        self.interface
    }

    pub fn is_registered(&self) -> bool {
        !self.interface.is_none()
    }

    pub fn registry(&self) -> &AddressRegistry<N> {
        &self.registry
    }

    pub fn scan_phase(&self) -> ScanPhase {
        self.scanner.phase()
    }

    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.table.state(slot)
    }

    pub fn record(&self, slot: usize) -> Option<&ConnectionRecord> {
        self.table.get(slot)
    }

    /// Last notified value of a peer (0 until the first notification).
    pub fn last_value(&self, slot: usize) -> Option<u8> {
        self.table.get(slot).map(|r| r.last_value)
    }

    pub fn active_count(&self) -> usize {
        self.table.active_count()
    }

    /// Start a fresh discovery cycle: forget the registry and scan again.
    pub fn start_discovery(&mut self, actions: &mut Actions) -> Result<(), Error> {
        if !self.is_registered() {
            return Err(Error::NotRegistered);
        }
        if self.scanner.is_active() || !self.table.all_idle() {
            warn!("Discovery refused - scan running or peers still attached");
            return Err(Error::Busy);
        }
        self.registry.clear();
        self.scanner.start(self.config.scan_duration_secs(), actions)
    }

    /// Issue an open request for every registered peer whose slot is idle,
    /// in registration order. Returns how many were queued.
    pub fn open_registered(&mut self, actions: &mut Actions) -> Result<usize, Error> {
        if !self.is_registered() {
            warn!("Not registered - no connection attempts");
            return Err(Error::NotRegistered);
        }
        if self.scanner.is_active() {
            warn!("Scan still running - connection attempts deferred");
            return Err(Error::Busy);
        }
        let mut queued = 0;
        for (slot, address) in self.registry.iter().enumerate() {
            if !self.table.begin_open(slot) {
                continue;
            }
            let request = Request::OpenConnection {
                interface: self.interface,
                address: *address,
                address_type: self.config.address_type,
                is_direct: self.config.direct_connect,
            };
            if let Err(e) = actions.request(request) {
                self.table.abandon_open(slot);
                return Err(e);
            }
            debug!("slot {} connecting to {:?}", slot, address);
            queued += 1;
        }
        Ok(queued)
    }

    fn on_registered(&mut self, interface: InterfaceHandle, actions: &mut Actions) -> Result<(), Error> {
        if self.is_registered() {
            warn!("Profile {} already registered - ignoring", self.app_id);
            return Ok(());
        }
        info!("Profile {} registered, if {}", self.app_id, interface.raw());
        self.interface = interface;
        self.table.mark_registered();
        self.scanner.start(self.config.scan_duration_secs(), actions)
    }

    fn on_scan_finished(&mut self, actions: &mut Actions) -> Result<(), Error> {
        let queued = self.open_registered(actions)?;
        info!("Opening {} of {} peers", queued, self.registry.len());
        Ok(())
    }

    fn on_connect(
        &mut self,
        connection_id: ConnId,
        address: PeerAddress,
        actions: &mut Actions,
    ) -> Result<(), Error> {
        info!("CONNECT conn_id {}, remote {:?}", connection_id, address);
        let Some(slot) = self.registry.position(&address) else {
            warn!("Connect from unregistered peer {:?}", address);
            return Err(Error::UnknownPeer);
        };
        let state = self.table.state(slot).unwrap_or(SlotState::Unregistered);
        if state.is_connected() {
            warn!("slot {} already connected - duplicate connect ignored", slot);
            return Ok(());
        }
        if state == SlotState::Unregistered {
            return Err(Error::NotRegistered);
        }

        let seq = self.next_subscription;
        self.next_subscription = self.next_subscription.wrapping_add(1);
        self.table.connect(slot, connection_id, address, seq);

        actions.request(Request::RequestMtu {
            interface: self.interface,
            connection_id,
        })?;
        actions.request(Request::RegisterForNotify {
            interface: self.interface,
            address,
            characteristic: self.config.notify_characteristic,
        })?;
        actions.signal(AppSignal::Connected { peer: slot })
    }

    fn on_open_complete(&mut self, status: GattStatus, address: PeerAddress) {
        if status.is_success() {
            info!("open success {:?}", address);
            return;
        }
        error!("open failed, status {}", status.0);
        if let Some(slot) = self.registry.position(&address) {
            if self.table.abandon_open(slot) {
                warn!("slot {} attempt abandoned", slot);
            }
        }
    }

    fn on_mtu_configured(&mut self, status: GattStatus, mtu: u16, connection_id: ConnId) {
        if !status.is_success() {
            error!("config mtu failed, error status = {}", status.0);
        }
        info!(
            "CFG_MTU status {}, MTU {}, conn_id {}",
            status.0,
            mtu,
            connection_id
        );
        match self.table.slot_for_connection(connection_id) {
            Some(slot) => self.table.mtu_done(slot, status.is_success().then_some(mtu)),
            None => warn!("MTU event for unknown conn_id {}", connection_id),
        }
    }

    fn on_notify_registered(&mut self, status: GattStatus, handle: u16) {
        let Some(slot) = self.table.oldest_pending_subscription() else {
            warn!("register for notify (handle {}) with no pending request", handle);
            return;
        };
        if status.is_success() {
            info!("register for notify, slot {} handle {}", slot, handle);
        } else {
            error!("register for notify failed, slot {} status {}", slot, status.0);
        }
        self.table.subscription_done(slot, status.is_success());
    }

    fn on_notification(
        &mut self,
        connection_id: ConnId,
        value: &[u8],
        actions: &mut Actions,
    ) -> Result<(), Error> {
        let Some(slot) = self.table.slot_for_connection(connection_id) else {
            warn!("notification from unknown conn_id {}", connection_id);
            return Err(Error::UnknownConnection);
        };
        let Some(&first) = value.first() else {
            warn!("empty notification from slot {}", slot);
            return Err(Error::EmptyNotification);
        };
        debug!("notified from peer {}: {}", slot, first);
        self.table.record_value(slot, first);
        actions.signal(AppSignal::Notification { peer: slot, value: first })
    }

    fn on_disconnect(
        &mut self,
        reason: u16,
        connection_id: ConnId,
        address: PeerAddress,
        actions: &mut Actions,
    ) -> Result<(), Error> {
        info!("DISCONNECT conn_id {}, reason = {}", connection_id, reason);
        // A link that never came up still resolves through the registry.
        let slot = self
            .table
            .slot_for_connection(connection_id)
            .or_else(|| self.table.slot_for_address(&address))
            .or_else(|| self.registry.position(&address));
        let Some(slot) = slot else {
            warn!("disconnect for untracked conn_id {}", connection_id);
            return Err(Error::UnknownConnection);
        };
        match self.table.disconnect(slot) {
            Some(SlotState::Unregistered) | None => Err(Error::NotRegistered),
            Some(previous) => {
                debug!("slot {} {:?} -> Idle", slot, previous);
                actions.signal(AppSignal::Disconnected { peer: slot })
            }
        }
    }
}

impl<const N: usize> ProfileHandler for Central<N> {
    fn on_event(&mut self, event: &StackEvent, actions: &mut Actions) -> Result<(), Error> {
        match event {
            StackEvent::RegistrationComplete {
                interface,
                app_id,
                status,
            } => {
                if *app_id != self.app_id || !status.is_success() || interface.is_none() {
                    return Ok(());
                }
                self.on_registered(*interface, actions)
            }
            StackEvent::ScanResult {
                sub_event,
                address,
                rssi,
                data,
                ..
            } => {
                trace!("scan result {:?} rssi {} len {}", address, rssi, data.len());
                let outcome = self.scanner.on_scan_result(
                    *sub_event,
                    *address,
                    data,
                    &mut self.registry,
                    actions,
                )?;
                if outcome == ScanOutcome::Finished {
                    self.on_scan_finished(actions)?;
                }
                Ok(())
            }
            StackEvent::ScanStopped { status } => {
                if !self.scanner.is_active() {
                    debug!("scan stop (status {}) outside a scan - ignored", status.0);
                    return Ok(());
                }
                if !status.is_success() {
                    error!("scan stop failed, status {}", status.0);
                    self.scanner.stop_failed();
                    return Ok(());
                }
                info!("BLE scan stopped - {} peers found", self.registry.len());
                self.scanner.on_stopped();
                self.on_scan_finished(actions)
            }
            StackEvent::ConnectComplete {
                connection_id,
                remote_address,
                ..
            } => self.on_connect(*connection_id, *remote_address, actions),
            StackEvent::OpenComplete {
                status,
                remote_address,
                ..
            } => {
                self.on_open_complete(*status, *remote_address);
                Ok(())
            }
            StackEvent::MtuConfigured {
                status,
                mtu,
                connection_id,
                ..
            } => {
                self.on_mtu_configured(*status, *mtu, *connection_id);
                Ok(())
            }
            StackEvent::NotifyRegistered { status, handle, .. } => {
                self.on_notify_registered(*status, *handle);
                Ok(())
            }
            StackEvent::Notification {
                connection_id,
                value,
                ..
            } => self.on_notification(*connection_id, value, actions),
            StackEvent::Disconnected {
                reason,
                connection_id,
                remote_address,
                ..
            } => self.on_disconnect(*reason, *connection_id, *remote_address, actions),
            StackEvent::ConnectionParamsUpdated {
                status,
                min_interval,
                max_interval,
                interval,
                latency,
                timeout,
                ..
            } => {
                info!(
                    "Connection updated: status = {}, min_int = {}, max_int = {}, conn_int = {}, latency = {}, timeout = {}",
                    status.0,
                    min_interval,
                    max_interval,
                    interval,
                    latency,
                    timeout
                );
                Ok(())
            }
        }
    }

    fn on_command(&mut self, command: LinkCommand, actions: &mut Actions) -> Result<(), Error> {
        match command {
            LinkCommand::StartDiscovery => self.start_discovery(actions),
            LinkCommand::ReconnectIdle => self.open_registered(actions).map(|_| ()),
        }
    }

    fn on_request_failed(&mut self, request: &Request, error: StackError) -> Disposition {
        match request {
            Request::OpenConnection { address, .. } => {
                warn!("Cannot connect to {:?} with {:?}", address, error);
                if let Some(slot) = self.registry.position(address) {
                    self.table.abandon_open(slot);
                }
                match self.config.open_failure_policy {
                    OpenFailurePolicy::SkipAddress => Disposition::Continue,
                    OpenFailurePolicy::AbortRemaining => Disposition::AbortOpens,
                }
            }
            Request::StartScanning { .. } => {
                error!("start scanning failed: {:?}", error);
                self.scanner.start_failed();
                Disposition::Continue
            }
            Request::StopScanning => {
                error!("stop scanning failed: {:?}", error);
                self.scanner.stop_failed();
                Disposition::Continue
            }
            Request::RequestMtu { connection_id, .. } => {
                error!("config MTU error, error code = {:?}", error);
                if let Some(slot) = self.table.slot_for_connection(*connection_id) {
                    self.table.mtu_done(slot, None);
                }
                Disposition::Continue
            }
            Request::RegisterForNotify { address, .. } => {
                error!("register for notify failed: {:?}", error);
                if let Some(slot) = self.table.slot_for_address(address) {
                    self.table.subscription_done(slot, false);
                }
                Disposition::Continue
            }
        }
    }

    fn on_request_skipped(&mut self, request: &Request) {
        if let Request::OpenConnection { address, .. } = request {
            if let Some(slot) = self.registry.position(address) {
                if self.table.abandon_open(slot) {
                    info!("slot {} open skipped", slot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::{SearchEvent, StackEvent};

    const A: PeerAddress = PeerAddress::new([0x30, 0xae, 0xa4, 0x3c, 0x3d, 0xf2]);
    const B: PeerAddress = PeerAddress::new([0x30, 0xae, 0xa4, 0x3c, 0x89, 0xf6]);
    const IF: InterfaceHandle = InterfaceHandle::new(3);
    const SERVER_X: [u8; 9] = [0x08, 0x09, b'S', b'E', b'R', b'V', b'E', b'R', b'X'];

    fn feed(central: &mut Central<2>, event: StackEvent) -> Actions {
        let mut actions = Actions::new();
        let _ = central.on_event(&event, &mut actions);
        actions
    }

    fn registered() -> Central<2> {
        let mut central = Central::new(0, LinkConfig::default());
        let actions = feed(
            &mut central,
            StackEvent::RegistrationComplete {
                interface: IF,
                app_id: 0,
                status: GattStatus::SUCCESS,
            },
        );
        assert_eq!(actions.requests(), &[Request::StartScanning { duration_secs: 5 }]);
        central
    }

    fn discovered() -> Central<2> {
        let mut central = registered();
        feed(&mut central, StackEvent::scan_result(SearchEvent::InquiryResult, A, -50, &SERVER_X));
        let actions = feed(&mut central, StackEvent::scan_result(SearchEvent::InquiryResult, B, -60, &SERVER_X));
        assert_eq!(actions.requests(), &[Request::StopScanning]);
        central
    }

    fn stopped() -> (Central<2>, Actions) {
        let mut central = discovered();
        let actions = feed(
            &mut central,
            StackEvent::ScanStopped {
                status: GattStatus::SUCCESS,
            },
        );
        (central, actions)
    }

    fn connected(central: &mut Central<2>, conn: ConnId, addr: PeerAddress) -> Actions {
        feed(
            central,
            StackEvent::ConnectComplete {
                interface: IF,
                connection_id: conn,
                remote_address: addr,
            },
        )
    }

    fn open(addr: PeerAddress) -> Request {
        Request::OpenConnection {
            interface: IF,
            address: addr,
            address_type: crate::ble::AddressType::Public,
            is_direct: true,
        }
    }

    #[test]
    fn registration_moves_slots_to_idle() {
        let central = registered();
        assert!(central.is_registered());
        assert_eq!(central.interface(), IF);
        assert_eq!(central.slot_state(0), Some(SlotState::Idle));
        assert_eq!(central.scan_phase(), ScanPhase::Scanning);
    }

    #[test]
    fn foreign_registration_is_ignored() {
        let mut central: Central<2> = Central::new(0, LinkConfig::default());
        let actions = feed(
            &mut central,
            StackEvent::RegistrationComplete {
                interface: IF,
                app_id: 9,
                status: GattStatus::SUCCESS,
            },
        );
        assert!(actions.is_empty());
        assert!(!central.is_registered());
        assert_eq!(central.slot_state(0), Some(SlotState::Unregistered));
    }

    #[test]
    fn scan_stop_opens_in_registration_order() {
        let (central, actions) = stopped();
        assert_eq!(actions.requests(), &[open(A), open(B)]);
        assert_eq!(central.slot_state(0), Some(SlotState::Connecting));
        assert_eq!(central.slot_state(1), Some(SlotState::Connecting));
    }

    #[test]
    fn scan_timeout_connects_what_was_found() {
        let mut central = registered();
        feed(&mut central, StackEvent::scan_result(SearchEvent::InquiryResult, B, -50, &SERVER_X));
        let actions = feed(&mut central, StackEvent::scan_result(SearchEvent::InquiryComplete, A, 0, &[]));
        assert_eq!(actions.requests(), &[open(B)]);
        assert_eq!(central.slot_state(0), Some(SlotState::Connecting));
        assert_eq!(central.slot_state(1), Some(SlotState::Idle));
    }

    #[test]
    fn connect_requests_mtu_and_subscription_then_signals() {
        let (mut central, _) = stopped();
        let actions = connected(&mut central, 0, A);
        assert_eq!(
            actions.requests(),
            &[
                Request::RequestMtu {
                    interface: IF,
                    connection_id: 0
                },
                Request::RegisterForNotify {
                    interface: IF,
                    address: A,
                    characteristic: 0x2A
                },
            ]
        );
        assert_eq!(actions.signals(), &[AppSignal::Connected { peer: 0 }]);
        assert_eq!(central.slot_state(0), Some(SlotState::Negotiating));
        assert_eq!(central.record(0).unwrap().connection_id, Some(0));
    }

    #[test]
    fn duplicate_connect_is_ignored() {
        let (mut central, _) = stopped();
        connected(&mut central, 0, A);
        let actions = connected(&mut central, 0, A);
        assert!(actions.is_empty());
    }

    #[test]
    fn connect_from_unknown_address_is_rejected() {
        let (mut central, _) = stopped();
        let mut actions = Actions::new();
        let result = central.on_event(
            &StackEvent::ConnectComplete {
                interface: IF,
                connection_id: 5,
                remote_address: PeerAddress::new([9; 6]),
            },
            &mut actions,
        );
        assert_eq!(result, Err(Error::UnknownPeer));
        assert!(actions.is_empty());
    }

    #[test]
    fn mtu_failure_is_non_fatal() {
        let (mut central, _) = stopped();
        connected(&mut central, 0, A);
        feed(
            &mut central,
            StackEvent::MtuConfigured {
                interface: IF,
                status: GattStatus(0x85),
                mtu: 23,
                connection_id: 0,
            },
        );
        assert_eq!(central.slot_state(0), Some(SlotState::Subscribing));
        assert_eq!(central.record(0).unwrap().mtu, None);
        assert_eq!(central.record(0).unwrap().connection_id, Some(0));
    }

    #[test]
    fn negotiation_reaches_ready() {
        let (mut central, _) = stopped();
        connected(&mut central, 0, A);
        feed(
            &mut central,
            StackEvent::MtuConfigured {
                interface: IF,
                status: GattStatus::SUCCESS,
                mtu: 200,
                connection_id: 0,
            },
        );
        feed(
            &mut central,
            StackEvent::NotifyRegistered {
                interface: IF,
                status: GattStatus::SUCCESS,
                handle: 0x2A,
            },
        );
        assert_eq!(central.slot_state(0), Some(SlotState::Ready));
        assert_eq!(central.record(0).unwrap().mtu, Some(200));
    }

    #[test]
    fn notification_updates_only_its_slot() {
        let (mut central, _) = stopped();
        connected(&mut central, 0, A);
        connected(&mut central, 1, B);
        let actions = feed(&mut central, StackEvent::notification(IF, 1, 0x2A, &[42, 7]));
        assert_eq!(actions.signals(), &[AppSignal::Notification { peer: 1, value: 42 }]);
        assert_eq!(central.last_value(1), Some(42));
        assert_eq!(central.last_value(0), Some(0));
    }

    #[test]
    fn notification_from_unknown_connection_is_dropped() {
        let (mut central, _) = stopped();
        let mut actions = Actions::new();
        let result = central.on_event(&StackEvent::notification(IF, 3, 0x2A, &[1]), &mut actions);
        assert_eq!(result, Err(Error::UnknownConnection));
        assert!(actions.is_empty());
    }

    #[test]
    fn empty_notification_is_dropped() {
        let (mut central, _) = stopped();
        connected(&mut central, 0, A);
        let mut actions = Actions::new();
        let result = central.on_event(&StackEvent::notification(IF, 0, 0x2A, &[]), &mut actions);
        assert_eq!(result, Err(Error::EmptyNotification));
        assert_eq!(central.last_value(0), Some(0));
    }

    #[test]
    fn disconnect_returns_slot_to_idle() {
        let (mut central, _) = stopped();
        connected(&mut central, 0, A);
        feed(&mut central, StackEvent::notification(IF, 0, 0x2A, &[9]));
        let actions = feed(
            &mut central,
            StackEvent::Disconnected {
                interface: IF,
                reason: 0x13,
                connection_id: 0,
                remote_address: A,
            },
        );
        assert_eq!(actions.signals(), &[AppSignal::Disconnected { peer: 0 }]);
        assert!(actions.requests().is_empty());
        assert_eq!(central.slot_state(0), Some(SlotState::Idle));
        assert_eq!(central.record(0).unwrap().connection_id, None);
        assert_eq!(central.last_value(0), Some(9));
    }

    #[test]
    fn failed_link_disconnect_frees_slot_and_signals() {
        let (mut central, _) = stopped();
        let actions = feed(
            &mut central,
            StackEvent::Disconnected {
                interface: IF,
                reason: 0x3E,
                connection_id: 0,
                remote_address: B,
            },
        );
        assert_eq!(actions.signals(), &[AppSignal::Disconnected { peer: 1 }]);
        assert!(actions.requests().is_empty());
        assert_eq!(central.slot_state(1), Some(SlotState::Idle));
        assert_eq!(central.slot_state(0), Some(SlotState::Connecting));
    }

    #[test]
    fn untracked_disconnect_is_rejected() {
        let (mut central, _) = stopped();
        let mut actions = Actions::new();
        let result = central.on_event(
            &StackEvent::Disconnected {
                interface: IF,
                reason: 0x13,
                connection_id: 9,
                remote_address: PeerAddress::new([9; 6]),
            },
            &mut actions,
        );
        assert_eq!(result, Err(Error::UnknownConnection));
        assert!(actions.is_empty());
    }

    #[test]
    fn stray_scan_stop_does_not_reconnect() {
        let (mut central, _) = stopped();
        connected(&mut central, 0, A);
        feed(
            &mut central,
            StackEvent::Disconnected {
                interface: IF,
                reason: 0x13,
                connection_id: 0,
                remote_address: A,
            },
        );
        let actions = feed(
            &mut central,
            StackEvent::ScanStopped {
                status: GattStatus::SUCCESS,
            },
        );
        assert!(actions.is_empty());
        assert_eq!(central.slot_state(0), Some(SlotState::Idle));
        assert_eq!(central.scan_phase(), ScanPhase::Stopped);
    }

    #[test]
    fn stop_ack_after_scan_timeout_is_ignored() {
        let mut central = discovered();
        assert_eq!(central.scan_phase(), ScanPhase::Stopping);
        let actions = feed(&mut central, StackEvent::scan_result(SearchEvent::InquiryComplete, A, 0, &[]));
        assert_eq!(actions.requests(), &[open(A), open(B)]);

        let actions = feed(
            &mut central,
            StackEvent::ScanStopped {
                status: GattStatus::SUCCESS,
            },
        );
        assert!(actions.is_empty());
        assert_eq!(central.slot_state(0), Some(SlotState::Connecting));
        assert_eq!(central.slot_state(1), Some(SlotState::Connecting));
    }

    #[test]
    fn notification_lands_in_registry_slot_not_connection_id() {
        let (mut central, _) = stopped();
        // B (slot 1) comes up first and gets connection id 0.
        connected(&mut central, 0, B);
        connected(&mut central, 1, A);
        let actions = feed(&mut central, StackEvent::notification(IF, 0, 0x2A, &[42]));
        assert_eq!(actions.signals(), &[AppSignal::Notification { peer: 1, value: 42 }]);
        assert_eq!(central.last_value(1), Some(42));
        assert_eq!(central.last_value(0), Some(0));
    }

    #[test]
    fn informational_events_change_nothing() {
        let (mut central, _) = stopped();
        connected(&mut central, 0, A);
        let before = *central.record(0).unwrap();

        let actions = feed(
            &mut central,
            StackEvent::OpenComplete {
                interface: IF,
                status: GattStatus::SUCCESS,
                connection_id: 0,
                remote_address: A,
            },
        );
        assert!(actions.is_empty());

        let actions = feed(
            &mut central,
            StackEvent::ConnectionParamsUpdated {
                status: GattStatus::SUCCESS,
                address: A,
                min_interval: 6,
                max_interval: 12,
                interval: 12,
                latency: 0,
                timeout: 400,
            },
        );
        assert!(actions.is_empty());
        assert_eq!(*central.record(0).unwrap(), before);
        assert_eq!(central.slot_state(1), Some(SlotState::Connecting));
    }

    #[test]
    fn async_open_failure_frees_slot() {
        let (mut central, _) = stopped();
        feed(
            &mut central,
            StackEvent::OpenComplete {
                interface: IF,
                status: GattStatus(0x85),
                connection_id: 0,
                remote_address: A,
            },
        );
        assert_eq!(central.slot_state(0), Some(SlotState::Idle));
    }

    #[test]
    fn open_rejection_follows_policy() {
        let (mut central, _) = stopped();
        assert_eq!(
            central.on_request_failed(&open(A), StackError::NoMemory),
            Disposition::Continue
        );
        assert_eq!(central.slot_state(0), Some(SlotState::Idle));

        let mut abort: Central<2> = Central::new(
            0,
            LinkConfig::new().with_open_failure_policy(OpenFailurePolicy::AbortRemaining),
        );
        assert_eq!(
            abort.on_request_failed(&open(A), StackError::NoMemory),
            Disposition::AbortOpens
        );
    }

    #[test]
    fn unregistered_profile_never_opens() {
        let mut central: Central<2> = Central::new(0, LinkConfig::default());
        feed(&mut central, StackEvent::scan_result(SearchEvent::InquiryResult, A, -50, &SERVER_X));
        let mut actions = Actions::new();
        let result = central.on_event(
            &StackEvent::ScanStopped {
                status: GattStatus::SUCCESS,
            },
            &mut actions,
        );
        assert_eq!(result, Ok(()));
        assert!(actions.is_empty());
        assert!(central.registry().is_empty());
        assert_eq!(
            central.on_command(LinkCommand::ReconnectIdle, &mut actions),
            Err(Error::NotRegistered)
        );
        assert!(actions.is_empty());
    }

    #[test]
    fn reconnect_idle_reopens_dropped_peer() {
        let (mut central, _) = stopped();
        connected(&mut central, 0, A);
        connected(&mut central, 1, B);
        feed(
            &mut central,
            StackEvent::Disconnected {
                interface: IF,
                reason: 0x08,
                connection_id: 1,
                remote_address: B,
            },
        );
        let mut actions = Actions::new();
        central.on_command(LinkCommand::ReconnectIdle, &mut actions).unwrap();
        assert_eq!(actions.requests(), &[open(B)]);
        assert_eq!(central.slot_state(1), Some(SlotState::Connecting));
    }

    #[test]
    fn start_discovery_requires_idle_slots() {
        let (mut central, _) = stopped();
        let mut actions = Actions::new();
        assert_eq!(
            central.on_command(LinkCommand::StartDiscovery, &mut actions),
            Err(Error::Busy)
        );

        for slot in 0..2 {
            let address = *central.registry().get(slot).unwrap();
            central.on_request_skipped(&open(address));
        }
        central.on_command(LinkCommand::StartDiscovery, &mut actions).unwrap();
        assert_eq!(actions.requests(), &[Request::StartScanning { duration_secs: 5 }]);
        assert!(central.registry().is_empty());
        assert_eq!(central.scan_phase(), ScanPhase::Scanning);
    }
}
