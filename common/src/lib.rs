//! Synchronization primitives shared by the driver crates.
//!
//! Everything here is `no_std`. Host builds (tests, simulators) use
//! [`sync::irq::NoIrq`] in place of real interrupt masking.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod sync;
