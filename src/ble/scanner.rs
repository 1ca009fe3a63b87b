//! Scan-phase logic - decides which advertisers become peers.
//!
//! A scan result is a candidate when it is an advertising report
//! ([`SearchEvent::InquiryResult`]), carries a complete local name and that
//! name starts with the configured target. Candidates go into the
//! [`AddressRegistry`]; once it is full a single stop request is issued.

use crate::ble::adv_parser::{contains_service_uuid16, extract_complete_name};
use crate::ble::registry::AddressRegistry;
use crate::ble::{Actions, PeerAddress, Request, SearchEvent};
use crate::config::LinkConfig;
use crate::error::Error;

/// Name (and optional service) filter applied to scan results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanFilter {
    target_name: &'static str,
    target_service: Option<u16>,
}

impl ScanFilter {
    pub const fn new(target_name: &'static str) -> Self {
        Self {
            target_name,
            target_service: None,
        }
    }

    pub const fn from_config(config: &LinkConfig) -> Self {
        Self {
            target_name: config.target_name,
            target_service: config.target_service,
        }
    }

    pub fn extract_name(payload: &[u8]) -> Option<&str> {
        extract_complete_name(payload)
    }

    /// Case-sensitive prefix match against the target name.
    pub fn is_candidate(&self, name: &str) -> bool {
        name.starts_with(self.target_name)
    }

    pub fn accepts(&self, sub_event: SearchEvent, payload: &[u8]) -> bool {
        if sub_event != SearchEvent::InquiryResult {
            return false;
        }
        let Some(name) = Self::extract_name(payload) else {
            return false;
        };
        if !self.is_candidate(name) {
            return false;
        }
        match self.target_service {
            Some(uuid) => contains_service_uuid16(payload, uuid),
            None => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanPhase {
    /// No scan requested.
    Idle,
    Scanning,
    /// Stop requested, waiting for the stack to acknowledge.
    Stopping,
    /// Scan window closed or stop acknowledged.
    Stopped,
}

/// Outcome of feeding one scan result to the scanner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Not scanning, wrong sub-event or not a candidate.
    Ignored,
    /// Candidate already known or registry already full.
    Known,
    /// New peer registered at this slot index.
    Added(usize),
    /// The scan window elapsed.
    Finished,
}

#[derive(Clone, Debug)]
pub struct Scanner {
    filter: ScanFilter,
    phase: ScanPhase,
}

impl Scanner {
    pub const fn new(filter: ScanFilter) -> Self {
        Self {
            filter,
            phase: ScanPhase::Idle,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn filter(&self) -> &ScanFilter {
        &self.filter
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, ScanPhase::Scanning | ScanPhase::Stopping)
    }

    pub fn start(&mut self, duration_secs: u32, actions: &mut Actions) -> Result<(), Error> {
        actions.request(Request::StartScanning { duration_secs })?;
        info!("BLE scan starting ({} s window)", duration_secs);
        self.phase = ScanPhase::Scanning;
        Ok(())
    }

    pub fn on_scan_result<const N: usize>(
        &mut self,
        sub_event: SearchEvent,
        address: PeerAddress,
        payload: &[u8],
        registry: &mut AddressRegistry<N>,
        actions: &mut Actions,
    ) -> Result<ScanOutcome, Error> {
        if !self.is_active() {
            trace!("scan result from {:?} outside a scan window", address);
            return Ok(ScanOutcome::Ignored);
        }
        if sub_event == SearchEvent::InquiryComplete {
            info!("BLE scan window elapsed - {} peers found", registry.len());
            self.phase = ScanPhase::Stopped;
            return Ok(ScanOutcome::Finished);
        }
        if !self.filter.accepts(sub_event, payload) {
            return Ok(ScanOutcome::Ignored);
        }

        let outcome = if registry.try_add(address) {
            let index = registry.len() - 1;
            info!("Adding peer {:?} on idx {}", address, index);
            ScanOutcome::Added(index)
        } else {
            ScanOutcome::Known
        };

        if registry.is_full() && self.phase == ScanPhase::Scanning {
            actions.request(Request::StopScanning)?;
            info!("Registry full - stopping scan");
            self.phase = ScanPhase::Stopping;
        }
        Ok(outcome)
    }

    pub fn on_stopped(&mut self) {
        self.phase = ScanPhase::Stopped;
    }

    /// The start request was rejected; nothing is scanning.
    pub fn start_failed(&mut self) {
        self.phase = ScanPhase::Idle;
    }

    /// The stop request was rejected; the next candidate retries it.
    pub fn stop_failed(&mut self) {
        if self.phase == ScanPhase::Stopping {
            self.phase = ScanPhase::Scanning;
        }
    }
}
