//! Event definitions for the REPL loop.
//!
//! Stdin and OS signals are read off the main task and delivered through a
//! single channel, so the loop can wait on either while an action runs.

/// The OS signal that interrupted the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSignal {
    SigInt,
    SigTerm,
}

/// Represents an event delivered to the REPL loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A line typed by the user, without the trailing newline.
    Input(String),
    /// Stdin reached EOF or failed; treated like quitting.
    InputClosed,
    /// Ctrl-C or a terminate request from the OS.
    Interrupt { signal: InterruptSignal },
}
