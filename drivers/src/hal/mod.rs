//! Hardware Abstraction Layer (HAL) - Collaborator Interfaces
//!
//! Traits in this module are implemented outside the driver core: by the
//! hardware manager that programs a device, and by the orchestrator that
//! sequences requests across linked devices.
//!
//! # Available Interfaces
//!
//! - [`camera`]: Camera context collaborators and command arguments

pub mod camera;
