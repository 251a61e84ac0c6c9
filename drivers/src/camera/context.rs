//! Camera context: the object one device node hands to each session.
//!
//! Locks, in acquisition order:
//!
//! - `ctx_mutex` serializes administrative commands and link changes. These
//!   come from process context and may wait.
//! - `submit_lock` serializes hardware programming (apply, the flush on
//!   start, stop), so requests reach the hardware in the order they were
//!   moved to pending.
//! - `queues` is an IRQ-safe spinlock around the request queues. It is only
//!   held for queue moves; no hardware manager call runs under it.
//!   Hardware events take only this lock (and a read of the link after it),
//!   so completions never wait behind a command or a slow `config`.
//!
//! State changes that enter or leave Ready/Activated are made with the queue
//! lock held, so queue moves see a state that cannot change under them.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use common::arch::CurrentIrq;
use common::sync::{IrqSpinLock, RwLock};
use log::{debug, info, warn};

use super::config::ContextConfig;
use super::error::{CtxError, CtxResult};
use super::request::{Queue, QueueCounts, RequestQueues};
use super::state::{CtxState, Operation, StateMachine, StateRegister};
use crate::hal::camera::{
    AcquireCmd, ApplyRequest, ConfigCmd, DeviceCaps, DeviceInfo, Handle, HwError, HwEvent,
    HwManager, LinkSetup, Orchestrator, PipelineDelay, ReleaseCmd, RequestId, StartStopCmd,
    UnlinkSetup,
};

/// Handles of the session that acquired the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub session_hdl: Handle,
    pub dev_hdl: Handle,
    /// Last request id accepted by config, for monotonicity checks.
    pub last_request_id: Option<RequestId>,
}

impl Acquisition {
    pub const fn new(session_hdl: Handle, dev_hdl: Handle) -> Self {
        Self {
            session_hdl,
            dev_hdl,
            last_request_id: None,
        }
    }

    pub fn owns(&self, session_hdl: Handle, dev_hdl: Handle) -> bool {
        self.session_hdl == session_hdl && self.dev_hdl == dev_hdl
    }
}

/// Binding between the context and an orchestrator pipeline.
#[derive(Clone)]
pub struct Link {
    pub link_hdl: Handle,
    pub dev_hdl: Handle,
    pub max_delay: PipelineDelay,
    pub orchestrator: Arc<dyn Orchestrator>,
}

impl From<&LinkSetup> for Link {
    fn from(setup: &LinkSetup) -> Self {
        Self {
            link_hdl: setup.link_hdl,
            dev_hdl: setup.dev_hdl,
            max_delay: setup.max_delay,
            orchestrator: setup.orchestrator.clone(),
        }
    }
}

/// Orchestrator notification produced by a hardware event binding.
///
/// Delivered after the queue lock is released.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Notice {
    Done(RequestId),
    Error(RequestId, HwError),
}

/// Camera device context.
///
/// `P` is the driver-specific request payload. The context only holds
/// shared references to payloads; the submitter owns them.
pub struct Context<P> {
    pub(super) config: ContextConfig,
    pub(super) state: StateRegister,
    pub(super) ctx_mutex: spin::Mutex<Option<Acquisition>>,
    pub(super) submit_lock: spin::Mutex<()>,
    pub(super) queues: IrqSpinLock<RequestQueues<P>, CurrentIrq>,
    pub(super) link: RwLock<Option<Link>>,
    pub(super) hw: Arc<dyn HwManager<P>>,
    caps: AtomicU32,
    state_machine: StateMachine<P>,
}

impl<P: Send + Sync + 'static> Context<P> {
    /// Create an uninitialized context bound to a hardware manager.
    ///
    /// Every operation is rejected until [`Context::init`] succeeds.
    pub fn new(hw: Arc<dyn HwManager<P>>) -> Self {
        Self {
            config: ContextConfig::default(),
            state: StateRegister::new(CtxState::Uninit),
            ctx_mutex: spin::Mutex::new(None),
            submit_lock: spin::Mutex::new(()),
            queues: IrqSpinLock::new(RequestQueues::new(0)),
            link: RwLock::new(None),
            hw,
            caps: AtomicU32::new(0),
            state_machine: StateMachine::empty(),
        }
    }

    /// Allocate the request pool and install the state machine.
    ///
    /// Moves the context from Uninit to Available.
    pub fn init(&mut self, config: ContextConfig, state_machine: StateMachine<P>) -> CtxResult<()> {
        if self.state() != CtxState::Uninit {
            warn!("{}: init in state {}", config.name, self.state());
            return Err(CtxError::InvalidState);
        }
        if config.req_capacity == 0 {
            warn!("{}: request pool size must be non-zero", config.name);
            return Err(CtxError::InvalidArgument);
        }

        *self.queues.get_mut() = RequestQueues::new(config.req_capacity);
        *self.ctx_mutex.get_mut() = None;
        *self.link.get_mut() = None;
        self.state_machine = state_machine;
        self.config = config;
        self.transition(CtxState::Available);
        Ok(())
    }

    /// Tear the context down to Uninit.
    ///
    /// Only an Available context, with every slot back on the free queue,
    /// can be torn down.
    pub fn deinit(&mut self) -> CtxResult<()> {
        match self.state() {
            CtxState::Available => {}
            CtxState::Uninit => return Err(CtxError::InvalidState),
            state => {
                warn!("{}: deinit while {}", self.config.name, state);
                return Err(CtxError::Busy);
            }
        }

        *self.queues.get_mut() = RequestQueues::new(0);
        *self.link.get_mut() = None;
        self.state_machine = StateMachine::empty();
        self.transition(CtxState::Uninit);
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn state(&self) -> CtxState {
        self.state.get()
    }

    /// Occupancy of all four queues, taken under one lock.
    pub fn snapshot(&self) -> QueueCounts {
        self.queues.lock().counts()
    }

    pub fn queue_len(&self, queue: Queue) -> usize {
        self.queues.lock().len(queue)
    }

    /// Request ids of a queue, oldest first.
    pub fn queue_ids(&self, queue: Queue) -> Vec<RequestId> {
        self.queues.lock().ids(queue).collect()
    }

    /// Every slot is on exactly one queue, checked by walking the lists.
    pub fn is_partitioned(&self) -> bool {
        self.queues.lock().is_partitioned()
    }

    /// Number of slots in the request pool.
    pub fn capacity(&self) -> usize {
        self.queues.lock().capacity()
    }

    /// Handles of the current acquisition.
    pub fn handles(&self) -> Option<Acquisition> {
        *self.ctx_mutex.lock()
    }

    pub fn link_hdl(&self) -> Option<Handle> {
        self.link.read().as_ref().map(|link| link.link_hdl)
    }

    /// Capabilities the hardware reported when the device was acquired.
    pub fn caps(&self) -> DeviceCaps {
        DeviceCaps::from_bits_truncate(self.caps.load(Ordering::Acquire))
    }

    pub fn handle_acquire_dev(&self, cmd: &AcquireCmd) -> CtxResult<()> {
        let mut acq = self.ctx_mutex.lock();
        let state = self.state();
        match self.state_machine.ops(state).ioctl.acquire_dev {
            Some(op) => op(self, &mut *acq, cmd),
            None => Err(self.reject(state, Operation::AcquireDev)),
        }
    }

    pub fn handle_release_dev(&self, cmd: &ReleaseCmd) -> CtxResult<()> {
        let mut acq = self.ctx_mutex.lock();
        let state = self.state();
        match self.state_machine.ops(state).ioctl.release_dev {
            Some(op) => op(self, &mut *acq, cmd),
            None => Err(self.reject(state, Operation::ReleaseDev)),
        }
    }

    pub fn handle_config_dev(&self, cmd: &ConfigCmd<P>) -> CtxResult<()> {
        let mut acq = self.ctx_mutex.lock();
        let state = self.state();
        match self.state_machine.ops(state).ioctl.config_dev {
            Some(op) => op(self, &mut *acq, cmd),
            None => Err(self.reject(state, Operation::ConfigDev)),
        }
    }

    pub fn handle_start_dev(&self, cmd: &StartStopCmd) -> CtxResult<()> {
        let mut acq = self.ctx_mutex.lock();
        let state = self.state();
        match self.state_machine.ops(state).ioctl.start_dev {
            Some(op) => op(self, &mut *acq, cmd),
            None => Err(self.reject(state, Operation::StartDev)),
        }
    }

    pub fn handle_stop_dev(&self, cmd: &StartStopCmd) -> CtxResult<()> {
        let mut acq = self.ctx_mutex.lock();
        let state = self.state();
        match self.state_machine.ops(state).ioctl.stop_dev {
            Some(op) => op(self, &mut *acq, cmd),
            None => Err(self.reject(state, Operation::StopDev)),
        }
    }

    pub fn handle_get_dev_info(&self) -> CtxResult<DeviceInfo> {
        let acq = self.ctx_mutex.lock();
        let state = self.state();
        match self.state_machine.ops(state).crm.get_dev_info {
            Some(op) => op(self, &*acq),
            None => Err(self.reject(state, Operation::GetDevInfo)),
        }
    }

    pub fn handle_link(&self, setup: &LinkSetup) -> CtxResult<()> {
        let acq = self.ctx_mutex.lock();
        let state = self.state();
        match self.state_machine.ops(state).crm.link {
            Some(op) => op(self, &*acq, setup),
            None => Err(self.reject(state, Operation::Link)),
        }
    }

    pub fn handle_unlink(&self, setup: &UnlinkSetup) -> CtxResult<()> {
        let acq = self.ctx_mutex.lock();
        let state = self.state();
        match self.state_machine.ops(state).crm.unlink {
            Some(op) => op(self, &*acq, setup),
            None => Err(self.reject(state, Operation::Unlink)),
        }
    }

    /// Orchestrator tick for one request.
    ///
    /// Does not take the context mutex. A second apply for the same id
    /// finds nothing on the wait queue and fails with `NotFound`.
    pub fn handle_apply_req(&self, apply: &ApplyRequest) -> CtxResult<()> {
        let state = self.state();
        match self.state_machine.ops(state).crm.apply_req {
            Some(op) => op(self, apply),
            None => Err(self.reject(state, Operation::ApplyReq)),
        }
    }

    /// Hardware event callback.
    ///
    /// Safe to call from completion context. Events for unknown or already
    /// retired requests are logged and dropped; the error is returned for
    /// the caller's information only.
    pub fn handle_hw_event(&self, event: HwEvent) -> CtxResult<()> {
        let notice = {
            let mut queues = self.queues.lock();
            let state = self.state();
            match self.state_machine.ops(state).irq {
                Some(op) => op(self, &mut queues, event),
                None => {
                    debug!(
                        "{}: no handler for {:?} of req {} in state {}",
                        self.name(),
                        event.kind,
                        event.request_id,
                        state
                    );
                    Err(CtxError::InvalidState)
                }
            }
        };

        match notice {
            Ok(Some(notice)) => {
                self.notify(notice);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(CtxError::NotFound) => {
                warn!(
                    "{}: dropping stale {:?} for req {}",
                    self.name(),
                    event.kind,
                    event.request_id
                );
                Err(CtxError::NotFound)
            }
            Err(err) => Err(err),
        }
    }

    /// Build the device description for the current acquisition.
    pub(super) fn dev_info(&self, dev_hdl: Handle, caps: DeviceCaps) -> DeviceInfo {
        DeviceInfo {
            dev_hdl,
            name: self.config.name,
            dev_id: self.config.dev_id,
            pipeline_delay: self.config.pipeline_delay,
            caps,
        }
    }

    pub(super) fn set_caps(&self, caps: DeviceCaps) {
        self.caps.store(caps.bits(), Ordering::Release);
    }

    /// Current link, cloned out so callbacks run without the link lock.
    pub(super) fn linked(&self) -> Option<Link> {
        self.link.read().clone()
    }

    /// Replace the link binding.
    ///
    /// The queue lock is held around the write so a completion on this CPU
    /// cannot spin on the link while its writer is preempted.
    pub(super) fn set_link(&self, link: Option<Link>) {
        let _queues = self.queues.lock();
        *self.link.write() = link;
    }

    pub(super) fn notify(&self, notice: Notice) {
        let Some(link) = self.linked() else {
            debug!("{}: {:?} with no link", self.name(), notice);
            return;
        };

        match notice {
            Notice::Done(id) => link.orchestrator.notify_done(link.link_hdl, link.dev_hdl, id),
            Notice::Error(id, err) => {
                link.orchestrator
                    .notify_error(link.link_hdl, link.dev_hdl, id, err)
            }
        }
    }

    pub(super) fn transition(&self, to: CtxState) {
        let from = self.state.get();
        if from != to {
            info!("{}: {} -> {}", self.config.name, from, to);
        }
        self.state.set(to);
    }

    fn reject(&self, state: CtxState, op: Operation) -> CtxError {
        warn!("{}: {:?} not allowed in state {}", self.name(), op, state);
        CtxError::InvalidState
    }
}
