//! Routes stack events to registered profiles.
//!
//! Every profile is bound to the interface handle the stack assigns on
//! successful registration. An event is handed to a profile when it
//! carries no handle (GAP events, or [`InterfaceHandle::NONE`]) or when its
//! handle equals the profile's.

use heapless::Vec;

use crate::ble::{Actions, Disposition, InterfaceHandle, LinkCommand, Request, StackEvent};
use crate::error::{Error, StackError};

/// Logical client identity driven by the dispatcher.
pub trait ProfileHandler {
    fn on_event(&mut self, event: &StackEvent, actions: &mut Actions) -> Result<(), Error>;

    fn on_command(&mut self, _command: LinkCommand, _actions: &mut Actions) -> Result<(), Error> {
        Ok(())
    }

    /// A request issued for this profile was rejected synchronously.
    fn on_request_failed(&mut self, _request: &Request, _error: StackError) -> Disposition {
        Disposition::Continue
    }

    /// A request issued for this profile was dropped before submission.
    fn on_request_skipped(&mut self, _request: &Request) {}
}

pub struct ProfileSlot<H> {
    app_id: u16,
    interface: InterfaceHandle,
    handler: H,
}

impl<H> ProfileSlot<H> {
    pub fn app_id(&self) -> u16 {
        self.app_id
    }

    pub fn interface(&self) -> InterfaceHandle {
        self.interface
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    fn accepts(&self, target: Option<InterfaceHandle>) -> bool {
        match target {
            None => true,
            Some(handle) if handle.is_none() => true,
            Some(handle) => handle == self.interface,
        }
    }
}

pub struct EventDispatcher<H, const P: usize> {
    profiles: Vec<ProfileSlot<H>, P>,
}

impl<H: ProfileHandler, const P: usize> Default for EventDispatcher<H, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ProfileHandler, const P: usize> EventDispatcher<H, P> {
    pub const fn new() -> Self {
        Self {
            profiles: Vec::new(),
        }
    }

    /// Add a profile; it stays unbound until its registration completes.
    pub fn add_profile(&mut self, app_id: u16, handler: H) -> Result<usize, Error> {
        self.profiles
            .push(ProfileSlot {
                app_id,
                interface: InterfaceHandle::NONE,
                handler,
            })
            .map_err(|_| Error::ProfileTableFull)?;
        Ok(self.profiles.len() - 1)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &ProfileSlot<H>> {
        self.profiles.iter()
    }

    pub fn handler(&self, index: usize) -> Option<&H> {
        self.profiles.get(index).map(|p| &p.handler)
    }

    pub fn handler_mut(&mut self, index: usize) -> Option<&mut H> {
        self.profiles.get_mut(index).map(|p| &mut p.handler)
    }

    pub fn interface_of(&self, app_id: u16) -> InterfaceHandle {
        self.profiles
            .iter()
            .find(|p| p.app_id == app_id)
            .map_or(InterfaceHandle::NONE, |p| p.interface)
    }

    /// Drop the binding ahead of an explicit re-registration.
    pub fn unbind(&mut self, app_id: u16) -> bool {
        match self.profiles.iter_mut().find(|p| p.app_id == app_id) {
            Some(profile) => {
                profile.interface = InterfaceHandle::NONE;
                true
            }
            None => false,
        }
    }

    pub fn handle_event(&mut self, event: &StackEvent) -> Actions {
        let mut actions = Actions::new();
        self.handle_event_into(event, &mut actions);
        actions
    }

    fn handle_event_into(&mut self, event: &StackEvent, actions: &mut Actions) {
        if let StackEvent::RegistrationComplete {
            interface,
            app_id,
            status,
        } = event
        {
            if !status.is_success() {
                warn!("reg app failed, app_id {}, status {}", app_id, status.0);
                return;
            }
            self.bind(*app_id, *interface);
        }

        let target = event.interface();
        for profile in self.profiles.iter_mut() {
            if !profile.accepts(target) {
                continue;
            }
            if let Err(e) = profile.handler.on_event(event, actions) {
                warn!("profile {} failed to handle event: {:?}", profile.app_id, e);
            }
        }
    }

    pub fn handle_command(&mut self, command: LinkCommand) -> Actions {
        let mut actions = Actions::new();
        for profile in self.profiles.iter_mut() {
            if let Err(e) = profile.handler.on_command(command, &mut actions) {
                warn!("profile {} rejected {:?}: {:?}", profile.app_id, command, e);
            }
        }
        actions
    }

    /// Report a rejected request to the profile(s) that issued it.
    pub fn request_failed(&mut self, request: &Request, error: StackError) -> Disposition {
        let target = request.interface();
        let mut disposition = Disposition::Continue;
        for profile in self.profiles.iter_mut().filter(|p| p.accepts(target)) {
            if profile.handler.on_request_failed(request, error) == Disposition::AbortOpens {
                disposition = Disposition::AbortOpens;
            }
        }
        disposition
    }

    pub fn request_skipped(&mut self, request: &Request) {
        let target = request.interface();
        for profile in self.profiles.iter_mut().filter(|p| p.accepts(target)) {
            profile.handler.on_request_skipped(request);
        }
    }

    fn bind(&mut self, app_id: u16, interface: InterfaceHandle) {
        let Some(profile) = self.profiles.iter_mut().find(|p| p.app_id == app_id) else {
            warn!("registration for unknown app_id {}", app_id);
            return;
        };
        if !profile.interface.is_none() {
            warn!(
                "app_id {} already bound to if {} - keeping it",
                app_id,
                profile.interface.raw()
            );
            return;
        }
        profile.interface = interface;
    }
}
