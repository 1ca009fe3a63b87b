//! Executes action batches against the BLE stack.
//!
//! Stack callbacks run in a context that must not block, so they only
//! [`post_event`] into an [`EventChannel`]. The [`Runner`] task drains the
//! channel, lets the dispatcher decide what to do, submits the resulting
//! requests one by one and hands app signals to the [`AppSink`].
//!
//! Consecutive open requests are paced by the configured interval; the
//! stack's request queue overflows on a burst.

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;

use crate::ble::dispatcher::{EventDispatcher, ProfileHandler};
use crate::ble::{
    Actions, AddressType, ConnId, Disposition, InterfaceHandle, LinkCommand, PeerAddress, Request,
    StackEvent,
};
use crate::config::{LinkConfig, COMMAND_QUEUE_DEPTH, EVENT_QUEUE_DEPTH};
use crate::error::StackError;
use crate::glue::{self, AppSink};

/// Stack events from the callback context to the runner.
pub type EventChannel<M> = Channel<M, StackEvent, EVENT_QUEUE_DEPTH>;

/// Application commands to the runner.
pub type CommandChannel<M> = Channel<M, LinkCommand, COMMAND_QUEUE_DEPTH>;

/// Outbound calls into the BLE stack. Each returns as soon as the request
/// is queued; the outcome arrives later as a [`StackEvent`].
pub trait BleStack {
    fn start_scanning(&mut self, duration_secs: u32) -> Result<(), StackError>;

    fn stop_scanning(&mut self) -> Result<(), StackError>;

    fn open_connection(
        &mut self,
        interface: InterfaceHandle,
        address: &PeerAddress,
        address_type: AddressType,
        is_direct: bool,
    ) -> Result<(), StackError>;

    fn request_mtu(&mut self, interface: InterfaceHandle, connection_id: ConnId) -> Result<(), StackError>;

    fn register_for_notify(
        &mut self,
        interface: InterfaceHandle,
        address: &PeerAddress,
        characteristic: u16,
    ) -> Result<(), StackError>;
}

/// Issue a single request.
pub fn submit<S: BleStack + ?Sized>(stack: &mut S, request: &Request) -> Result<(), StackError> {
    match *request {
        Request::StartScanning { duration_secs } => stack.start_scanning(duration_secs),
        Request::StopScanning => stack.stop_scanning(),
        Request::OpenConnection {
            interface,
            address,
            address_type,
            is_direct,
        } => stack.open_connection(interface, &address, address_type, is_direct),
        Request::RequestMtu {
            interface,
            connection_id,
        } => stack.request_mtu(interface, connection_id),
        Request::RegisterForNotify {
            interface,
            address,
            characteristic,
        } => stack.register_for_notify(interface, &address, characteristic),
    }
}

/// Queue an event from the stack callback context. Never blocks; returns
/// `false` if the queue was full and the event was dropped.
pub fn post_event<M: RawMutex, const Q: usize>(sender: &Sender<'_, M, StackEvent, Q>, event: StackEvent) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            error!("Event queue full - dropping {:?}", event);
            false
        }
    }
}

pub struct Runner<S, A, D> {
    stack: S,
    sink: A,
    delay: D,
    open_interval: Duration,
}

impl<S: BleStack, A: AppSink, D: DelayNs> Runner<S, A, D> {
    pub fn new(stack: S, sink: A, delay: D, open_interval: Duration) -> Self {
        Self {
            stack,
            sink,
            delay,
            open_interval,
        }
    }

    pub fn from_config(stack: S, sink: A, delay: D, config: &LinkConfig) -> Self {
        Self::new(stack, sink, delay, config.open_interval)
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut S {
        &mut self.stack
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    pub fn into_parts(self) -> (S, A, D) {
        (self.stack, self.sink, self.delay)
    }

    /// Submit every request of the batch in order, then deliver its signals.
    ///
    /// A synchronous rejection is reported back through the dispatcher. If
    /// the owning profile answers [`Disposition::AbortOpens`], the open
    /// requests still queued in this batch are skipped instead of issued.
    pub async fn apply<H: ProfileHandler, const P: usize>(
        &mut self,
        dispatcher: &mut EventDispatcher<H, P>,
        actions: &Actions,
    ) {
        let mut opened = false;
        let mut abort_opens = false;

        for request in actions.requests() {
            if request.is_open() {
                if abort_opens {
                    dispatcher.request_skipped(request);
                    continue;
                }
                if opened {
                    self.pace().await;
                }
                opened = true;
            }

            if let Err(e) = submit(&mut self.stack, request) {
                if dispatcher.request_failed(request, e) == Disposition::AbortOpens {
                    warn!("Aborting remaining connection attempts");
                    abort_opens = true;
                }
            }
        }

        for signal in actions.signals() {
            glue::forward(&mut self.sink, signal);
        }
    }

    pub async fn process<H: ProfileHandler, const P: usize>(
        &mut self,
        dispatcher: &mut EventDispatcher<H, P>,
        event: &StackEvent,
    ) {
        let actions = dispatcher.handle_event(event);
        self.apply(dispatcher, &actions).await;
    }

    pub async fn command<H: ProfileHandler, const P: usize>(
        &mut self,
        dispatcher: &mut EventDispatcher<H, P>,
        command: LinkCommand,
    ) {
        info!("Command {:?}", command);
        let actions = dispatcher.handle_command(command);
        self.apply(dispatcher, &actions).await;
    }

    /// Serve stack events and application commands forever.
    pub async fn run<H, M, const P: usize, const Q: usize, const C: usize>(
        &mut self,
        dispatcher: &mut EventDispatcher<H, P>,
        events: Receiver<'_, M, StackEvent, Q>,
        commands: Receiver<'_, M, LinkCommand, C>,
    ) -> !
    where
        H: ProfileHandler,
        M: RawMutex,
    {
        info!("BLE runner started");
        loop {
            match select(events.receive(), commands.receive()).await {
                Either::First(event) => self.process(dispatcher, &event).await,
                Either::Second(command) => self.command(dispatcher, command).await,
            }
        }
    }

    async fn pace(&mut self) {
        let us = u32::try_from(self.open_interval.as_micros()).unwrap_or(u32::MAX);
        if us > 0 {
            self.delay.delay_us(us).await;
        }
    }
}
