//! Camera device context.
//!
//! A context sits between the request orchestrator, which decides when
//! each request is applied, and the hardware manager, which programs the
//! device and reports back asynchronously.
//!
//! - [`request`]: fixed slot pool split into free/wait/pending/active queues
//! - [`state`]: state register and per-state operation tables
//! - [`context`]: the context object and its locking
//!
//! A request's path: `config_dev` queues it on **wait**, `apply_req` moves
//! it to **pending** (and hands it to the hardware once active), an
//! `Applied` event moves it to **active**, and a `Done` event recycles it
//! to **free** and tells the orchestrator.

pub mod config;
pub mod context;
pub mod error;
mod ops;
pub mod request;
pub mod state;

pub use config::{CTX_REQ_MAX, ContextConfig};
pub use context::{Acquisition, Context, Link, Notice};
pub use error::{CtxError, CtxResult};
pub use request::{Queue, QueueCounts, RequestQueues, RequestStatus, SlotId};
pub use state::{CtxState, Operation, StateMachine, StateOps};
