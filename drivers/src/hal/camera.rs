//! Camera Device Hardware Abstraction Layer.
//!
//! This module defines the two collaborator boundaries of a camera device
//! context, plus the structured command arguments that reach it:
//!
//! ```text
//!        Orchestrator (request manager)
//!          │  get_dev_info / link / unlink / apply_req
//!          ▼                        ▲ add_request / notify_*
//!     Camera Context  ◄── administrative commands (acquire, config, ...)
//!          │  acquire / prepare_update / config / start / stop
//!          ▼                        ▲ hardware events
//!        Hardware Manager
//! ```
//!
//! Commands arrive already parsed; nothing here touches raw bytes.

use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;

/// Opaque handle allocated outside the context (session, device, link).
pub type Handle = i32;

/// Request identifier. Assigned by the submitter, strictly increasing per
/// acquisition.
pub type RequestId = u64;

/// Error reported by the hardware manager.
///
/// The code is opaque to the context and is surfaced unchanged.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HwError(pub i32);

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hardware error {}", self.0)
    }
}

/// Kind of device behind a context, as reported to the orchestrator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceId {
    Sensor,
    Ife,
    Icp,
    Jpeg,
    Flash,
    Actuator,
}

/// Number of frames between apply and the settings taking effect.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineDelay {
    Zero,
    One,
    Two,
}

bitflags! {
    /// Capability flags reported by the hardware manager.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct DeviceCaps: u32 {
        /// Requests complete in submission order.
        const IN_ORDER = 1 << 0;
        /// Hardware can be stopped with requests in flight.
        const FORCE_STOP = 1 << 1;
    }
}

/// Device description returned by `get_dev_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub dev_hdl: Handle,
    pub name: &'static str,
    pub dev_id: DeviceId,
    pub pipeline_delay: PipelineDelay,
    pub caps: DeviceCaps,
}

/// Acquire device command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AcquireCmd {
    pub session_hdl: Handle,
    pub dev_hdl: Handle,
    /// Number of hardware resources requested.
    pub num_resources: u32,
}

/// Release device command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ReleaseCmd {
    pub session_hdl: Handle,
    pub dev_hdl: Handle,
}

/// Config device command.
///
/// The first config after acquire is the initial device configuration;
/// later ones submit a request. The payload stays owned by the submitter;
/// the context only keeps a shared reference to it.
pub struct ConfigCmd<P> {
    pub session_hdl: Handle,
    pub dev_hdl: Handle,
    pub request_id: RequestId,
    pub payload: Arc<P>,
}

/// Start or stop device command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StartStopCmd {
    pub session_hdl: Handle,
    pub dev_hdl: Handle,
    /// Stop even if requests are still active. Ignored by start.
    pub force: bool,
}

impl StartStopCmd {
    pub const fn new(session_hdl: Handle, dev_hdl: Handle) -> Self {
        Self {
            session_hdl,
            dev_hdl,
            force: false,
        }
    }

    pub const fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Link setup from the orchestrator.
#[derive(Clone)]
pub struct LinkSetup {
    pub link_hdl: Handle,
    pub dev_hdl: Handle,
    /// Largest pipeline delay of any device on the link.
    pub max_delay: PipelineDelay,
    pub orchestrator: Arc<dyn Orchestrator>,
}

/// Unlink request from the orchestrator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UnlinkSetup {
    pub link_hdl: Handle,
    pub dev_hdl: Handle,
}

/// Apply request from the orchestrator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub link_hdl: Handle,
    pub dev_hdl: Handle,
    pub request_id: RequestId,
}

/// What the hardware reports about a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HwEventKind {
    /// Settings were latched; the request is now executing.
    Applied,
    /// The request finished.
    Done,
    /// The request failed in hardware.
    Error(HwError),
}

/// Hardware event delivered to the context's event handler.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HwEvent {
    pub kind: HwEventKind,
    pub request_id: RequestId,
}

impl HwEvent {
    pub const fn applied(request_id: RequestId) -> Self {
        Self {
            kind: HwEventKind::Applied,
            request_id,
        }
    }

    pub const fn done(request_id: RequestId) -> Self {
        Self {
            kind: HwEventKind::Done,
            request_id,
        }
    }

    pub const fn error(request_id: RequestId, err: HwError) -> Self {
        Self {
            kind: HwEventKind::Error(err),
            request_id,
        }
    }
}

/// Downstream hardware manager.
///
/// `P` is the driver-specific request payload.
///
/// No method is called with the context's queue lock held, so events may
/// be delivered from any execution context. Calls that program the device
/// (`config`, `stop`) are serialized with each other.
pub trait HwManager<P>: Send + Sync {
    /// Report device capabilities, or `None` if the query is not supported.
    fn get_caps(&self) -> Option<DeviceCaps>;

    /// Reserve hardware resources for a new acquisition.
    fn acquire(&self, cmd: &AcquireCmd) -> Result<(), HwError>;

    /// Return the resources taken by `acquire`.
    fn release(&self) -> Result<(), HwError>;

    /// Validate a payload before it is queued.
    fn prepare_update(&self, request_id: RequestId, payload: &P) -> Result<(), HwError>;

    /// Program a payload into the hardware.
    fn config(&self, request_id: RequestId, payload: &P) -> Result<(), HwError>;

    /// Start processing.
    fn start(&self) -> Result<(), HwError>;

    /// Stop processing. In-flight requests are abandoned.
    fn stop(&self) -> Result<(), HwError>;
}

/// Upstream orchestrator notifications.
///
/// Called without any context lock held.
pub trait Orchestrator: Send + Sync {
    /// A new request is queued and can be applied.
    fn add_request(&self, link_hdl: Handle, dev_hdl: Handle, request_id: RequestId);

    /// A request completed in hardware.
    fn notify_done(&self, link_hdl: Handle, dev_hdl: Handle, request_id: RequestId);

    /// A request failed in hardware.
    fn notify_error(&self, link_hdl: Handle, dev_hdl: Handle, request_id: RequestId, err: HwError);

    /// The device description changed.
    fn notify_dev_info(&self, link_hdl: Handle, info: &DeviceInfo) {
        let _ = (link_hdl, info);
    }
}
