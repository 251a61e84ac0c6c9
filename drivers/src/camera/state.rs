//! Top-level state register and per-state operation tables.
//!
//! Every externally visible operation is looked up in the table of the
//! current state. A missing binding means the operation is illegal in that
//! state and is rejected with `InvalidState`.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use super::context::{Acquisition, Context, Notice};
use super::error::CtxResult;
use super::request::RequestQueues;
use crate::hal::camera::{
    AcquireCmd, ApplyRequest, ConfigCmd, DeviceInfo, HwEvent, LinkSetup, ReleaseCmd,
    StartStopCmd, UnlinkSetup,
};

/// Context top-level states.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum CtxState {
    Uninit = 0,
    Available = 1,
    Acquired = 2,
    Ready = 3,
    Activated = 4,
}

impl CtxState {
    pub const COUNT: usize = 5;

    pub const ALL: [CtxState; Self::COUNT] = [
        CtxState::Uninit,
        CtxState::Available,
        CtxState::Acquired,
        CtxState::Ready,
        CtxState::Activated,
    ];

    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => CtxState::Available,
            2 => CtxState::Acquired,
            3 => CtxState::Ready,
            4 => CtxState::Activated,
            _ => CtxState::Uninit,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }

    /// States in which requests may be queued.
    pub const fn accepts_requests(self) -> bool {
        matches!(self, CtxState::Ready | CtxState::Activated)
    }
}

impl fmt::Display for CtxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CtxState::Uninit => "uninit",
            CtxState::Available => "available",
            CtxState::Acquired => "acquired",
            CtxState::Ready => "ready",
            CtxState::Activated => "activated",
        };
        f.write_str(name)
    }
}

/// The state register.
///
/// Written only by state transitions, which run under the context mutex
/// (and the queue lock when entering or leaving Ready/Activated). Read
/// lock-free from every path.
pub struct StateRegister(AtomicU8);

impl StateRegister {
    pub const fn new(state: CtxState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> CtxState {
        CtxState::from_raw(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: CtxState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Operation names, for logging rejected calls.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    AcquireDev,
    ReleaseDev,
    ConfigDev,
    StartDev,
    StopDev,
    GetDevInfo,
    Link,
    Unlink,
    ApplyReq,
    HwEvent,
}

pub type AcquireFn<P> = fn(&Context<P>, &mut Option<Acquisition>, &AcquireCmd) -> CtxResult<()>;
pub type ReleaseFn<P> = fn(&Context<P>, &mut Option<Acquisition>, &ReleaseCmd) -> CtxResult<()>;
pub type ConfigFn<P> = fn(&Context<P>, &mut Option<Acquisition>, &ConfigCmd<P>) -> CtxResult<()>;
pub type StartStopFn<P> =
    fn(&Context<P>, &mut Option<Acquisition>, &StartStopCmd) -> CtxResult<()>;
pub type DevInfoFn<P> = fn(&Context<P>, &Option<Acquisition>) -> CtxResult<DeviceInfo>;
pub type LinkFn<P> = fn(&Context<P>, &Option<Acquisition>, &LinkSetup) -> CtxResult<()>;
pub type UnlinkFn<P> = fn(&Context<P>, &Option<Acquisition>, &UnlinkSetup) -> CtxResult<()>;
pub type ApplyFn<P> = fn(&Context<P>, &ApplyRequest) -> CtxResult<()>;
pub type HwEventFn<P> =
    fn(&Context<P>, &mut RequestQueues<P>, HwEvent) -> CtxResult<Option<Notice>>;

/// Administrative command bindings.
pub struct IoctlOps<P> {
    pub acquire_dev: Option<AcquireFn<P>>,
    pub release_dev: Option<ReleaseFn<P>>,
    pub config_dev: Option<ConfigFn<P>>,
    pub start_dev: Option<StartStopFn<P>>,
    pub stop_dev: Option<StartStopFn<P>>,
}

/// Orchestrator-to-context bindings.
pub struct CrmOps<P> {
    pub get_dev_info: Option<DevInfoFn<P>>,
    pub link: Option<LinkFn<P>>,
    pub unlink: Option<UnlinkFn<P>>,
    pub apply_req: Option<ApplyFn<P>>,
}

/// Bindings for one state.
pub struct StateOps<P> {
    pub ioctl: IoctlOps<P>,
    pub crm: CrmOps<P>,
    pub irq: Option<HwEventFn<P>>,
}

impl<P> StateOps<P> {
    /// A state that rejects everything.
    pub const fn none() -> Self {
        Self {
            ioctl: IoctlOps {
                acquire_dev: None,
                release_dev: None,
                config_dev: None,
                start_dev: None,
                stop_dev: None,
            },
            crm: CrmOps {
                get_dev_info: None,
                link: None,
                unlink: None,
                apply_req: None,
            },
            irq: None,
        }
    }
}

/// Per-state operation tables, indexed by [`CtxState`].
pub struct StateMachine<P> {
    states: [StateOps<P>; CtxState::COUNT],
}

impl<P> StateMachine<P> {
    /// A table with no bindings at all.
    pub const fn empty() -> Self {
        Self {
            states: [
                StateOps::none(),
                StateOps::none(),
                StateOps::none(),
                StateOps::none(),
                StateOps::none(),
            ],
        }
    }

    pub fn ops(&self, state: CtxState) -> &StateOps<P> {
        &self.states[state.index()]
    }

    /// Edit the bindings of one state.
    pub fn bind(mut self, state: CtxState, f: impl FnOnce(&mut StateOps<P>)) -> Self {
        f(&mut self.states[state.index()]);
        self
    }
}

impl<P: Send + Sync + 'static> Default for StateMachine<P> {
    /// The stock bindings shared by all camera contexts.
    fn default() -> Self {
        super::ops::default_state_machine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_round_trips_every_state() {
        let reg = StateRegister::new(CtxState::Uninit);
        for state in CtxState::ALL {
            reg.set(state);
            assert_eq!(reg.get(), state);
        }
    }

    #[test]
    fn only_ready_and_activated_accept_requests() {
        let accepting: Vec<_> = CtxState::ALL
            .into_iter()
            .filter(|s| s.accepts_requests())
            .collect();
        assert_eq!(accepting, [CtxState::Ready, CtxState::Activated]);
    }

    #[test]
    fn default_table_gates_operations() {
        let sm: StateMachine<u32> = StateMachine::default();

        let uninit = sm.ops(CtxState::Uninit);
        assert!(uninit.ioctl.acquire_dev.is_none());
        assert!(uninit.irq.is_none());

        let available = sm.ops(CtxState::Available);
        assert!(available.ioctl.acquire_dev.is_some());
        assert!(available.ioctl.start_dev.is_none());
        assert!(available.crm.apply_req.is_none());

        let ready = sm.ops(CtxState::Ready);
        assert!(ready.ioctl.start_dev.is_some());
        assert!(ready.ioctl.stop_dev.is_none());
        assert!(ready.crm.link.is_some());
        assert!(ready.irq.is_some());

        let acquired = sm.ops(CtxState::Acquired);
        assert!(acquired.crm.apply_req.is_none());
        assert!(acquired.irq.is_none());

        let activated = sm.ops(CtxState::Activated);
        assert!(activated.ioctl.stop_dev.is_some());
        assert!(activated.crm.link.is_none());
        assert!(activated.irq.is_some());
    }

    #[test]
    fn bind_overrides_one_state() {
        fn reject(
            _: &Context<u32>,
            _: &mut RequestQueues<u32>,
            _: HwEvent,
        ) -> CtxResult<Option<Notice>> {
            Err(super::super::error::CtxError::Unsupported)
        }

        let sm: StateMachine<u32> =
            StateMachine::empty().bind(CtxState::Ready, |ops| ops.irq = Some(reject));
        assert!(sm.ops(CtxState::Ready).irq.is_some());
        assert!(sm.ops(CtxState::Activated).irq.is_none());
    }
}
