//! Unified error types for ble-multilink.
//!
//! No `alloc` - every variant carries only fixed-size data. None of these
//! ever terminate the link: handlers return them, the dispatcher logs them
//! and the affected peer simply stays uninitialized.

/// Top-level error type used across the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The stack rejected an outbound request.
    Stack(StackError),

    /// The owning profile has no interface handle yet.
    NotRegistered,

    /// A connect event named an address that was never registered.
    UnknownPeer,

    /// An event named a connection id no slot is tracking.
    UnknownConnection,

    /// A notification arrived without a value.
    EmptyNotification,

    /// A new discovery cycle was requested while scanning or connected.
    Busy,

    /// More requests or signals than an action batch can hold.
    ActionOverflow,

    /// Every profile slot of the dispatcher is taken.
    ProfileTableFull,
}

/// Synchronous rejection reported by a stack request call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// Raw status code from the stack.
    Raw(u32),
    /// The request is not valid in the stack's current state.
    InvalidState,
    /// The stack's request queue or memory pool is exhausted.
    NoMemory,
}

// Convenience conversions

impl From<StackError> for Error {
    fn from(e: StackError) -> Self {
        Error::Stack(e)
    }
}
