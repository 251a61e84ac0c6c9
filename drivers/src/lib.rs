//! Camera Driver Subsystem
//!
//! # Module Organization
//!
//! - [`hal`]: Collaborator traits and command arguments
//! - [`camera`]: Camera device context (request queues, state machine)
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use drivers::camera::{Context, ContextConfig, StateMachine};
//! use drivers::hal::camera::{AcquireCmd, DeviceId, HwManager};
//!
//! # fn run(hw: Arc<dyn HwManager<Vec<u8>>>) -> Result<(), drivers::camera::CtxError> {
//! let mut ctx = Context::new(hw);
//! ctx.init(ContextConfig::new("ife0", DeviceId::Ife), StateMachine::default())?;
//! ctx.handle_acquire_dev(&AcquireCmd { session_hdl: 1, dev_hdl: 2, num_resources: 1 })?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod camera;
pub mod hal;

// Re-export commonly used types
pub use camera::{Context, ContextConfig, CtxError, CtxState, StateMachine};
pub use hal::camera::{HwEvent, HwManager, Orchestrator};
