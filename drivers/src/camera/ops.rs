//! Stock per-state bindings.
//!
//! | State     | Bound operations                                          |
//! |-----------|-----------------------------------------------------------|
//! | Available | acquire                                                   |
//! | Acquired  | release, initial config, get-info, link, unlink           |
//! | Ready     | release, submit, start, get-info, link, unlink, apply     |
//! | Activated | release, submit, stop, get-info, apply, hardware event    |
//!
//! Acquire is also bound past Available, where it reports `AlreadyAcquired`.
//! Ready binds hardware events only to reject completions that arrive after
//! a stop; nothing is in flight there.
//!
//! Hardware manager calls never run under the queue lock. Queue moves are
//! made first, under the lock, and undone if the hardware refuses.

use alloc::vec::Vec;

use log::{debug, error, info, warn};

use super::context::{Acquisition, Context, Link, Notice};
use super::error::{CtxError, CtxResult};
use super::request::{Queue, RequestQueues};
use super::state::{CtxState, StateMachine};
use crate::hal::camera::{
    AcquireCmd, ApplyRequest, ConfigCmd, DeviceCaps, DeviceInfo, Handle, HwEvent, HwEventKind,
    LinkSetup, ReleaseCmd, StartStopCmd, UnlinkSetup,
};

pub(super) fn default_state_machine<P: Send + Sync + 'static>() -> StateMachine<P> {
    StateMachine::empty()
        .bind(CtxState::Available, |ops| {
            ops.ioctl.acquire_dev = Some(acquire_dev);
        })
        .bind(CtxState::Acquired, |ops| {
            ops.ioctl.acquire_dev = Some(already_acquired);
            ops.ioctl.release_dev = Some(release_dev);
            ops.ioctl.config_dev = Some(initial_config);
            ops.crm.get_dev_info = Some(get_dev_info);
            ops.crm.link = Some(link);
            ops.crm.unlink = Some(unlink);
        })
        .bind(CtxState::Ready, |ops| {
            ops.ioctl.acquire_dev = Some(already_acquired);
            ops.ioctl.release_dev = Some(release_dev);
            ops.ioctl.config_dev = Some(submit_request);
            ops.ioctl.start_dev = Some(start_dev);
            ops.crm.get_dev_info = Some(get_dev_info);
            ops.crm.link = Some(link);
            ops.crm.unlink = Some(unlink);
            ops.crm.apply_req = Some(apply_req);
            ops.irq = Some(late_event);
        })
        .bind(CtxState::Activated, |ops| {
            ops.ioctl.acquire_dev = Some(already_acquired);
            ops.ioctl.release_dev = Some(release_dev);
            ops.ioctl.config_dev = Some(submit_request);
            ops.ioctl.stop_dev = Some(stop_dev);
            ops.crm.get_dev_info = Some(get_dev_info);
            ops.crm.apply_req = Some(apply_req);
            ops.irq = Some(hw_event);
        })
}

/// The acquisition, if the command names its handles.
fn owner(
    acq: &mut Option<Acquisition>,
    session_hdl: Handle,
    dev_hdl: Handle,
) -> CtxResult<&mut Acquisition> {
    match acq {
        Some(a) if a.owns(session_hdl, dev_hdl) => Ok(a),
        _ => {
            warn!("handles {}/{} do not own this context", session_hdl, dev_hdl);
            Err(CtxError::InvalidArgument)
        }
    }
}

fn acquire_dev<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    acq: &mut Option<Acquisition>,
    cmd: &AcquireCmd,
) -> CtxResult<()> {
    if acq.is_some() {
        return Err(CtxError::AlreadyAcquired);
    }
    if cmd.session_hdl < 0 || cmd.dev_hdl < 0 {
        warn!("{}: bad handles {}/{}", ctx.name(), cmd.session_hdl, cmd.dev_hdl);
        return Err(CtxError::InvalidArgument);
    }

    ctx.hw.acquire(cmd).map_err(|err| {
        error!("{}: hw acquire failed: {}", ctx.name(), err);
        CtxError::from(err)
    })?;

    ctx.set_caps(ctx.hw.get_caps().unwrap_or(DeviceCaps::empty()));
    *acq = Some(Acquisition::new(cmd.session_hdl, cmd.dev_hdl));
    ctx.transition(CtxState::Acquired);
    Ok(())
}

fn already_acquired<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    _acq: &mut Option<Acquisition>,
    cmd: &AcquireCmd,
) -> CtxResult<()> {
    warn!("{}: acquire by dev {} while acquired", ctx.name(), cmd.dev_hdl);
    Err(CtxError::AlreadyAcquired)
}

/// Stop the hardware and return every request to the free queue.
///
/// The context leaves Activated before the hardware is stopped, so events
/// racing the stop are answered as stale instead of moving requests. A
/// non-forced stop refuses while requests are active and returns to
/// Activated if the hardware fails to stop. A forced stop with requests
/// active needs hardware that can abandon them.
fn halt<P: Send + Sync + 'static>(ctx: &Context<P>, force: bool) -> CtxResult<usize> {
    let _submit = ctx.submit_lock.lock();
    {
        let queues = ctx.queues.lock();
        let active = queues.len(Queue::Active);
        if active > 0 && !force {
            warn!("{}: stop with {} active requests", ctx.name(), active);
            return Err(CtxError::Busy);
        }
        if active > 0 && !ctx.caps().contains(DeviceCaps::FORCE_STOP) {
            warn!("{}: hw cannot abandon {} active requests", ctx.name(), active);
            return Err(CtxError::Unsupported);
        }
        ctx.transition(CtxState::Ready);
    }

    if let Err(err) = ctx.hw.stop() {
        if !force {
            error!("{}: hw stop failed: {}", ctx.name(), err);
            let _queues = ctx.queues.lock();
            ctx.transition(CtxState::Activated);
            return Err(err.into());
        }
        warn!("{}: ignoring hw stop failure on forced stop: {}", ctx.name(), err);
    }

    Ok(ctx.queues.lock().drain())
}

/// Release the hardware and forget the acquisition.
///
/// From Activated this is a stop followed by a release. If the hardware
/// then refuses the release, the stop stands: the context stays Ready and
/// acquired, with its queues drained, and release can be retried.
fn release_dev<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    acq: &mut Option<Acquisition>,
    cmd: &ReleaseCmd,
) -> CtxResult<()> {
    owner(acq, cmd.session_hdl, cmd.dev_hdl)?;

    if ctx.state() == CtxState::Activated {
        halt(ctx, false)?;
    } else if !ctx.queues.lock().is_empty(Queue::Active) {
        return Err(CtxError::Busy);
    }

    ctx.hw.release().map_err(|err| {
        error!("{}: hw release failed: {}", ctx.name(), err);
        CtxError::from(err)
    })?;

    let recycled = {
        let mut queues = ctx.queues.lock();
        ctx.transition(CtxState::Available);
        queues.drain()
    };
    ctx.set_link(None);
    ctx.set_caps(DeviceCaps::empty());
    *acq = None;

    debug!("{}: released, {} requests dropped", ctx.name(), recycled);
    Ok(())
}

fn initial_config<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    acq: &mut Option<Acquisition>,
    cmd: &ConfigCmd<P>,
) -> CtxResult<()> {
    let acquired = owner(acq, cmd.session_hdl, cmd.dev_hdl)?;

    ctx.hw
        .prepare_update(cmd.request_id, &cmd.payload)
        .map_err(|err| {
            warn!("{}: initial config rejected: {}", ctx.name(), err);
            CtxError::InvalidConfig
        })?;
    ctx.hw.config(cmd.request_id, &cmd.payload)?;

    acquired.last_request_id = Some(cmd.request_id);
    let dev_hdl = acquired.dev_hdl;
    {
        let _queues = ctx.queues.lock();
        ctx.transition(CtxState::Ready);
    }

    if let (Some(link), Some(caps)) = (ctx.linked(), ctx.hw.get_caps()) {
        link.orchestrator
            .notify_dev_info(link.link_hdl, &ctx.dev_info(dev_hdl, caps));
    }
    Ok(())
}

/// Queue a new request on the wait queue and announce it.
fn submit_request<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    acq: &mut Option<Acquisition>,
    cmd: &ConfigCmd<P>,
) -> CtxResult<()> {
    let acquired = owner(acq, cmd.session_hdl, cmd.dev_hdl)?;

    if acquired.last_request_id.is_some_and(|last| cmd.request_id <= last) {
        warn!(
            "{}: req {} does not follow {:?}",
            ctx.name(),
            cmd.request_id,
            acquired.last_request_id
        );
        return Err(CtxError::InvalidArgument);
    }

    ctx.hw
        .prepare_update(cmd.request_id, &cmd.payload)
        .map_err(|err| {
            warn!("{}: req {} rejected: {}", ctx.name(), cmd.request_id, err);
            CtxError::InvalidConfig
        })?;

    {
        let mut queues = ctx.queues.lock();
        if !ctx.state().accepts_requests() {
            return Err(CtxError::InvalidState);
        }
        let slot = queues.acquire_slot().inspect_err(|_| {
            warn!("{}: no free slot for req {}", ctx.name(), cmd.request_id);
        })?;
        queues.enqueue_wait(slot, cmd.request_id, cmd.payload.clone())?;
    }
    acquired.last_request_id = Some(cmd.request_id);

    if let Some(link) = ctx.linked() {
        link.orchestrator
            .add_request(link.link_hdl, link.dev_hdl, cmd.request_id);
    }
    Ok(())
}

fn start_dev<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    acq: &mut Option<Acquisition>,
    cmd: &StartStopCmd,
) -> CtxResult<()> {
    owner(acq, cmd.session_hdl, cmd.dev_hdl)?;

    ctx.hw.start().map_err(|err| {
        error!("{}: hw start failed: {}", ctx.name(), err);
        CtxError::from(err)
    })?;

    // Requests applied while Ready go to the hardware now, oldest first.
    let _submit = ctx.submit_lock.lock();
    let pending: Vec<_> = {
        let queues = ctx.queues.lock();
        ctx.transition(CtxState::Activated);
        queues
            .ids(Queue::Pending)
            .filter_map(|id| Some((id, queues.payload(Queue::Pending, id)?)))
            .collect()
    };

    for (id, payload) in pending {
        if let Err(err) = ctx.hw.config(id, &payload) {
            error!("{}: req {} rejected on start: {}", ctx.name(), id, err);
            let failed = ctx.queues.lock().fail(id);
            if failed.is_ok() {
                ctx.notify(Notice::Error(id, err));
            }
        }
    }
    Ok(())
}

fn stop_dev<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    acq: &mut Option<Acquisition>,
    cmd: &StartStopCmd,
) -> CtxResult<()> {
    owner(acq, cmd.session_hdl, cmd.dev_hdl)?;

    let dropped = halt(ctx, cmd.force)?;
    if dropped > 0 {
        info!("{}: stop dropped {} requests", ctx.name(), dropped);
    }
    Ok(())
}

fn get_dev_info<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    acq: &Option<Acquisition>,
) -> CtxResult<DeviceInfo> {
    let dev_hdl = acq.as_ref().ok_or(CtxError::InvalidState)?.dev_hdl;
    let caps = ctx.hw.get_caps().ok_or_else(|| {
        debug!("{}: hw declined caps query", ctx.name());
        CtxError::Unsupported
    })?;
    Ok(ctx.dev_info(dev_hdl, caps))
}

fn link<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    acq: &Option<Acquisition>,
    setup: &LinkSetup,
) -> CtxResult<()> {
    let acquired = acq.as_ref().ok_or(CtxError::InvalidState)?;
    if setup.dev_hdl != acquired.dev_hdl {
        warn!("{}: link for dev {} rejected", ctx.name(), setup.dev_hdl);
        return Err(CtxError::InvalidArgument);
    }

    if let Some(cur) = ctx.link_hdl() {
        if cur != setup.link_hdl {
            warn!("{}: already linked to {}", ctx.name(), cur);
            return Err(CtxError::Busy);
        }
    }

    ctx.set_link(Some(Link::from(setup)));
    debug!("{}: linked to {}", ctx.name(), setup.link_hdl);
    Ok(())
}

fn unlink<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    acq: &Option<Acquisition>,
    setup: &UnlinkSetup,
) -> CtxResult<()> {
    let acquired = acq.as_ref().ok_or(CtxError::InvalidState)?;
    if setup.dev_hdl != acquired.dev_hdl || ctx.link_hdl() != Some(setup.link_hdl) {
        warn!("{}: unlink of {} rejected", ctx.name(), setup.link_hdl);
        return Err(CtxError::InvalidArgument);
    }

    ctx.set_link(None);
    debug!("{}: unlinked from {}", ctx.name(), setup.link_hdl);
    Ok(())
}

/// Apply requests must come from the pipeline this context is linked to.
fn check_apply<P: Send + Sync + 'static>(ctx: &Context<P>, apply: &ApplyRequest) -> CtxResult<()> {
    let linked = ctx.link.read();
    match linked.as_ref() {
        Some(l) if l.link_hdl == apply.link_hdl && l.dev_hdl == apply.dev_hdl => Ok(()),
        _ => {
            warn!(
                "{}: apply from link {} dev {} rejected",
                ctx.name(),
                apply.link_hdl,
                apply.dev_hdl
            );
            Err(CtxError::InvalidArgument)
        }
    }
}

/// Move a waiting request to pending.
///
/// Once Activated the request is also programmed into the hardware, after
/// the queue lock is dropped. If the hardware refuses it, the request goes
/// back to the head of wait and the hardware error is returned.
fn apply_req<P: Send + Sync + 'static>(ctx: &Context<P>, apply: &ApplyRequest) -> CtxResult<()> {
    check_apply(ctx, apply)?;

    let id = apply.request_id;
    let _submit = ctx.submit_lock.lock();
    let payload = {
        let mut queues = ctx.queues.lock();
        let state = ctx.state();
        if !state.accepts_requests() {
            warn!("{}: apply of req {} while {}", ctx.name(), id, state);
            return Err(CtxError::InvalidState);
        }
        queues.promote_to_pending(id).inspect_err(|_| {
            warn!("{}: apply of req {} not waiting", ctx.name(), id);
        })?;
        if state != CtxState::Activated {
            return Ok(());
        }
        queues.payload(Queue::Pending, id)
    };

    let Some(payload) = payload else {
        return Ok(());
    };
    if let Err(err) = ctx.hw.config(id, &payload) {
        error!("{}: hw config of req {} failed: {}", ctx.name(), id, err);
        if ctx.queues.lock().requeue_wait(id).is_err() {
            debug!("{}: req {} left pending before requeue", ctx.name(), id);
        }
        return Err(err.into());
    }
    Ok(())
}

fn late_event<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    _queues: &mut RequestQueues<P>,
    event: HwEvent,
) -> CtxResult<Option<Notice>> {
    debug!("{}: req {} event after stop", ctx.name(), event.request_id);
    Err(CtxError::NotFound)
}

fn hw_event<P: Send + Sync + 'static>(
    ctx: &Context<P>,
    queues: &mut RequestQueues<P>,
    event: HwEvent,
) -> CtxResult<Option<Notice>> {
    let id = event.request_id;
    match event.kind {
        HwEventKind::Applied => {
            queues.promote_to_active(id)?;
            Ok(None)
        }
        HwEventKind::Done => {
            if queues.head(Queue::Active) != Some(id) {
                if ctx.caps().contains(DeviceCaps::IN_ORDER) {
                    warn!("{}: req {} done out of order", ctx.name(), id);
                } else {
                    debug!("{}: req {} done ahead of older requests", ctx.name(), id);
                }
            }
            queues.complete(id)?;
            Ok(Some(Notice::Done(id)))
        }
        HwEventKind::Error(err) => {
            queues.fail(id)?;
            error!("{}: req {} failed in hw: {}", ctx.name(), id, err);
            Ok(Some(Notice::Error(id, err)))
        }
    }
}
