//! Concrete [`Transport`](crate::channel::Transport) backends: a simulated
//! in-memory pipe used throughout this crate's own tests, and the two real
//! adapter families an installed diagnostic tool actually talks to.
//!
//! [`socketcan`] is gated behind the `socketcan` feature (Linux only,
//! native CAN/ISO-TP); [`serial`] is gated behind the `serial` feature
//! (any ELM327-compatible USB/Bluetooth-SPP adapter). [`simulation`] is
//! always available.

pub mod simulation;

#[cfg(feature = "socketcan")]
pub mod socketcan;

#[cfg(feature = "serial")]
pub mod serial;
