//! Request slot pool and the four request queues.
//!
//! Slots live in one arena allocated at init. Each slot carries intrusive
//! `prev`/`next` indices, so moving a slot between queues is O(1) and no
//! slot is ever referenced by address. A slot is on exactly one queue at a
//! time, except between `acquire_slot` and `enqueue_wait`, where it is
//! reserved by the caller holding the queue lock.

use alloc::sync::Arc;
use alloc::vec::Vec;

use log::trace;

use super::error::{CtxError, CtxResult};
use crate::hal::camera::RequestId;

/// The queues a request moves through, in lifecycle order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Queue {
    /// Unused slots.
    Free,
    /// Submitted, waiting for the orchestrator to apply them.
    Wait,
    /// Applied, waiting for the hardware to latch them.
    Pending,
    /// Executing, waiting for the hardware to finish.
    Active,
}

impl Queue {
    pub const ALL: [Queue; 4] = [Queue::Free, Queue::Wait, Queue::Pending, Queue::Active];

    const fn index(self) -> usize {
        self as usize
    }
}

/// Progress marker of a single request slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Free,
    /// Taken from the free queue, not yet queued.
    Reserved,
    Waiting,
    Pending,
    Active,
}

impl RequestStatus {
    fn of(queue: Queue) -> Self {
        match queue {
            Queue::Free => RequestStatus::Free,
            Queue::Wait => RequestStatus::Waiting,
            Queue::Pending => RequestStatus::Pending,
            Queue::Active => RequestStatus::Active,
        }
    }
}

/// Index of a slot in the pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One reusable request record.
struct Request<P> {
    status: RequestStatus,
    request_id: RequestId,
    payload: Option<Arc<P>>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Copy, Clone, Default)]
struct ListHead {
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

/// A request taken off the pool, returned to the caller that retired it.
pub struct Retired<P> {
    pub request_id: RequestId,
    pub payload: Option<Arc<P>>,
}

/// Occupancy of every queue at one observation point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct QueueCounts {
    pub free: usize,
    pub wait: usize,
    pub pending: usize,
    pub active: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.free + self.wait + self.pending + self.active
    }
}

/// Fixed-capacity request pool partitioned into four ordered queues.
pub struct RequestQueues<P> {
    slots: Vec<Request<P>>,
    lists: [ListHead; 4],
}

impl<P> RequestQueues<P> {
    /// Build a pool with every slot on the free queue.
    pub fn new(capacity: usize) -> Self {
        let mut queues = Self {
            slots: Vec::with_capacity(capacity),
            lists: [ListHead::default(); 4],
        };

        for idx in 0..capacity {
            queues.slots.push(Request {
                status: RequestStatus::Free,
                request_id: 0,
                payload: None,
                prev: None,
                next: None,
            });
            queues.push_back(Queue::Free, idx);
        }

        queues
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self, queue: Queue) -> usize {
        self.lists[queue.index()].len
    }

    pub fn is_empty(&self, queue: Queue) -> bool {
        self.len(queue) == 0
    }

    pub fn counts(&self) -> QueueCounts {
        QueueCounts {
            free: self.len(Queue::Free),
            wait: self.len(Queue::Wait),
            pending: self.len(Queue::Pending),
            active: self.len(Queue::Active),
        }
    }

    /// Status of a slot.
    pub fn status(&self, slot: SlotId) -> Option<RequestStatus> {
        self.slots.get(slot.0).map(|r| r.status)
    }

    /// Request id at the head of a queue.
    pub fn head(&self, queue: Queue) -> Option<RequestId> {
        self.lists[queue.index()]
            .head
            .map(|idx| self.slots[idx].request_id)
    }

    /// Request ids of a queue, oldest first.
    pub fn ids(&self, queue: Queue) -> impl Iterator<Item = RequestId> + '_ {
        let mut cursor = self.lists[queue.index()].head;
        core::iter::from_fn(move || {
            let idx = cursor?;
            cursor = self.slots[idx].next;
            Some(self.slots[idx].request_id)
        })
    }

    /// Payload of the request `request_id` on `queue`.
    pub fn payload(&self, queue: Queue, request_id: RequestId) -> Option<Arc<P>> {
        let idx = self.find(queue, request_id)?;
        self.slots[idx].payload.clone()
    }

    pub fn contains(&self, queue: Queue, request_id: RequestId) -> bool {
        self.find(queue, request_id).is_some()
    }

    /// Take the head of the free queue.
    pub fn acquire_slot(&mut self) -> CtxResult<SlotId> {
        let idx = self.lists[Queue::Free.index()]
            .head
            .ok_or(CtxError::ResourceExhausted)?;

        self.unlink(Queue::Free, idx);
        self.slots[idx].status = RequestStatus::Reserved;
        trace!("req slot {} reserved", idx);
        Ok(SlotId(idx))
    }

    /// Queue a reserved slot at the tail of the wait queue.
    pub fn enqueue_wait(
        &mut self,
        slot: SlotId,
        request_id: RequestId,
        payload: Arc<P>,
    ) -> CtxResult<()> {
        let req = self.slots.get_mut(slot.0).ok_or(CtxError::InvalidArgument)?;
        if req.status != RequestStatus::Reserved {
            return Err(CtxError::InvalidArgument);
        }

        req.request_id = request_id;
        req.payload = Some(payload);
        self.push_back(Queue::Wait, slot.0);
        trace!("req {} -> wait (slot {})", request_id, slot.0);
        Ok(())
    }

    /// Move `request_id` from wait to the tail of pending.
    pub fn promote_to_pending(&mut self, request_id: RequestId) -> CtxResult<()> {
        self.move_request(Queue::Wait, Queue::Pending, request_id)
    }

    /// Move `request_id` from pending to the tail of active.
    pub fn promote_to_active(&mut self, request_id: RequestId) -> CtxResult<()> {
        self.move_request(Queue::Pending, Queue::Active, request_id)
    }

    /// Return a pending request to the head of wait, for a retry of its apply.
    pub fn requeue_wait(&mut self, request_id: RequestId) -> CtxResult<()> {
        let idx = self.find(Queue::Pending, request_id).ok_or(CtxError::NotFound)?;
        self.unlink(Queue::Pending, idx);
        self.push_front(Queue::Wait, idx);
        trace!("req {} Pending -> head of Wait", request_id);
        Ok(())
    }

    /// Recycle an active request back to the free queue.
    pub fn complete(&mut self, request_id: RequestId) -> CtxResult<Retired<P>> {
        let idx = self.find(Queue::Active, request_id).ok_or(CtxError::NotFound)?;
        Ok(self.retire(Queue::Active, idx))
    }

    /// Recycle a request that failed while pending or active.
    pub fn fail(&mut self, request_id: RequestId) -> CtxResult<Retired<P>> {
        for queue in [Queue::Active, Queue::Pending] {
            if let Some(idx) = self.find(queue, request_id) {
                return Ok(self.retire(queue, idx));
            }
        }
        Err(CtxError::NotFound)
    }

    /// Return every queued request to the free queue, oldest stage first.
    ///
    /// Returns the number of recycled slots.
    pub fn drain(&mut self) -> usize {
        let mut recycled = 0;
        for queue in [Queue::Active, Queue::Pending, Queue::Wait] {
            while let Some(idx) = self.lists[queue.index()].head {
                self.retire(queue, idx);
                recycled += 1;
            }
        }
        recycled
    }

    /// Every slot is on exactly one queue and the lists agree with it.
    pub fn is_partitioned(&self) -> bool {
        let mut seen = 0;
        for queue in Queue::ALL {
            let status = RequestStatus::of(queue);
            let mut cursor = self.lists[queue.index()].head;
            let mut len = 0;
            while let Some(idx) = cursor {
                if self.slots[idx].status != status || len > self.slots.len() {
                    return false;
                }
                len += 1;
                cursor = self.slots[idx].next;
            }
            if len != self.len(queue) {
                return false;
            }
            seen += len;
        }
        seen == self.capacity()
    }

    fn move_request(&mut self, from: Queue, to: Queue, request_id: RequestId) -> CtxResult<()> {
        let idx = self.find(from, request_id).ok_or(CtxError::NotFound)?;
        self.unlink(from, idx);
        self.push_back(to, idx);
        trace!("req {} {:?} -> {:?}", request_id, from, to);
        Ok(())
    }

    fn retire(&mut self, queue: Queue, idx: usize) -> Retired<P> {
        self.unlink(queue, idx);
        let req = &mut self.slots[idx];
        let retired = Retired {
            request_id: req.request_id,
            payload: req.payload.take(),
        };
        self.push_back(Queue::Free, idx);
        trace!("req {} {:?} -> free", retired.request_id, queue);
        retired
    }

    fn find(&self, queue: Queue, request_id: RequestId) -> Option<usize> {
        let mut cursor = self.lists[queue.index()].head;
        while let Some(idx) = cursor {
            if self.slots[idx].request_id == request_id {
                return Some(idx);
            }
            cursor = self.slots[idx].next;
        }
        None
    }

    fn push_back(&mut self, queue: Queue, idx: usize) {
        let list = &mut self.lists[queue.index()];
        let old_tail = list.tail;

        list.tail = Some(idx);
        if list.head.is_none() {
            list.head = Some(idx);
        }
        list.len += 1;

        if let Some(tail) = old_tail {
            self.slots[tail].next = Some(idx);
        }

        let req = &mut self.slots[idx];
        req.prev = old_tail;
        req.next = None;
        req.status = RequestStatus::of(queue);
    }

    fn push_front(&mut self, queue: Queue, idx: usize) {
        let list = &mut self.lists[queue.index()];
        let old_head = list.head;

        list.head = Some(idx);
        if list.tail.is_none() {
            list.tail = Some(idx);
        }
        list.len += 1;

        if let Some(head) = old_head {
            self.slots[head].prev = Some(idx);
        }

        let req = &mut self.slots[idx];
        req.prev = None;
        req.next = old_head;
        req.status = RequestStatus::of(queue);
    }

    fn unlink(&mut self, queue: Queue, idx: usize) {
        let (prev, next) = {
            let req = &mut self.slots[idx];
            (req.prev.take(), req.next.take())
        };

        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.lists[queue.index()].head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.lists[queue.index()].tail = prev,
        }
        self.lists[queue.index()].len -= 1;
    }
}
