//! The unit pool: a fixed number of OS channels shared by every open file.
//!
//! Handles outnumber units.  A handle that needs I/O asks for a unit with
//! [`UnitPool::attach`]; when the pool is full the least recently requested
//! unit that is neither locked nor serving the active handle is detached
//! from its owner and rebound.  Detached handles reattach transparently on
//! their next request.
//!
//! # Request counters
//! The pool keeps a request clock.  Every attach advances it and stamps the
//! unit's counter with the new value, so a lower counter means a less
//! recent request.  When the clock reaches the configured ceiling, all
//! counters are rescaled in one step (see [`UnitPool::rescale`]) before the
//! stamp, keeping their relative order.
//!
//! # Locking
//! A locked unit is never recycled.  Scratch files are locked for life.
//! `reserved_units` can never be locked, so at least that many units always
//! stay in rotation; `scratch_units` more are kept back from general locks
//! so scratch files can still be opened.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::config::PoolConfig;
use crate::directory::Channel;
use crate::error::{KernelError, Result};
use crate::files::Handle;

/// 1-based unit number.
pub type Unit = u32;

#[derive(Debug)]
struct UnitSlot<C> {
    handle: Option<Handle>,
    locked: bool,
    scratch: bool,
    counter: u32,
    channel: Option<C>,
}

impl<C> UnitSlot<C> {
    fn empty() -> Self {
        Self { handle: None, locked: false, scratch: false, counter: 0, channel: None }
    }
}

/// Result of a successful [`UnitPool::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub unit: Unit,
    /// Handle that lost its unit to make room, if any.
    pub evicted: Option<Handle>,
    /// Whether the unit was newly bound (false when the handle already had it).
    pub fresh: bool,
}

#[derive(Debug)]
pub struct UnitPool<C = Channel> {
    slots: Vec<UnitSlot<C>>,
    capacity: usize,
    reserved: usize,
    scratch_units: usize,
    ceiling: u32,
    clock: u32,
    by_handle: HashMap<Handle, usize>,
    active: Option<Handle>,
}

impl<C> UnitPool<C> {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            slots: Vec::new(),
            capacity: config.unit_pool_size,
            reserved: config.reserved_units,
            scratch_units: config.scratch_units,
            ceiling: config.counter_ceiling,
            clock: 0,
            by_handle: HashMap::new(),
            active: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units not bound to any handle.
    pub fn free_count(&self) -> usize {
        self.capacity - self.by_handle.len()
    }

    pub fn locked_count(&self) -> usize {
        self.slots.iter().filter(|s| s.locked).count()
    }

    /// Mark `handle` as the target of the I/O in progress; its unit is
    /// exempt from recycling until another handle becomes active.
    pub fn set_active(&mut self, handle: Option<Handle>) {
        self.active = handle;
    }

    pub fn lookup_unit(&self, handle: Handle) -> Option<Unit> {
        self.by_handle.get(&handle).map(|i| *i as Unit + 1)
    }

    pub fn lookup_handle(&self, unit: Unit) -> Option<Handle> {
        self.slot(unit).and_then(|s| s.handle)
    }

    pub fn is_locked(&self, handle: Handle) -> bool {
        self.by_handle.get(&handle).is_some_and(|i| self.slots[*i].locked)
    }

    /// Counter of every unit that has ever been bound, by unit number.
    pub fn counters(&self) -> Vec<(Unit, u32)> {
        self.slots.iter().enumerate().map(|(i, s)| (i as Unit + 1, s.counter)).collect()
    }

    pub fn channel_mut(&mut self, unit: Unit) -> Option<&mut C> {
        let idx = (unit as usize).checked_sub(1)?;
        self.slots.get_mut(idx).and_then(|s| s.channel.as_mut())
    }

    fn slot(&self, unit: Unit) -> Option<&UnitSlot<C>> {
        (unit as usize).checked_sub(1).and_then(|i| self.slots.get(i))
    }

    /// Bind a unit to `handle`, opening its channel with `open` when the
    /// handle is not already bound.
    ///
    /// The victim, if any, is chosen before `open` runs but only detached
    /// after it succeeds, so a failed open leaves the pool untouched.
    pub fn attach<F>(&mut self, handle: Handle, open: F) -> Result<Attachment>
    where
        F: FnOnce() -> Result<C>,
    {
        if let Some(&idx) = self.by_handle.get(&handle) {
            let unit = idx as Unit + 1;
            self.bump_and_possibly_rescale(unit);
            return Ok(Attachment { unit, evicted: None, fresh: false });
        }

        let idx = self.pick_slot().ok_or(KernelError::UnitPoolExhausted { handle, capacity: self.capacity })?;
        let channel = open()?;

        if idx == self.slots.len() {
            self.slots.push(UnitSlot::empty());
        }
        let slot = &mut self.slots[idx];
        let evicted = slot.handle.take();
        if let Some(old) = evicted {
            self.by_handle.remove(&old);
            debug!(unit = idx + 1, evicted = old, handle, "recycled unit");
        }
        let slot = &mut self.slots[idx];
        slot.handle = Some(handle);
        slot.locked = false;
        slot.scratch = false;
        slot.counter = 0;
        // Dropping the previous channel closes the victim's OS file.
        slot.channel = Some(channel);
        self.by_handle.insert(handle, idx);

        let unit = idx as Unit + 1;
        self.bump_and_possibly_rescale(unit);
        trace!(unit, handle, "bound unit");
        Ok(Attachment { unit, evicted, fresh: true })
    }

    /// A free slot, growing the table up to capacity, else the eviction victim.
    fn pick_slot(&self) -> Option<usize> {
        if let Some(i) = self.slots.iter().position(|s| s.handle.is_none()) {
            return Some(i);
        }
        if self.slots.len() < self.capacity {
            return Some(self.slots.len());
        }
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.locked && s.handle.is_some() && s.handle != self.active)
            .min_by_key(|(i, s)| (s.counter, *i))
            .map(|(i, _)| i)
    }

    /// Detach `handle`, returning its channel.  No-op when unbound.
    pub fn release(&mut self, handle: Handle) -> Option<C> {
        let idx = self.by_handle.remove(&handle)?;
        let slot = &mut self.slots[idx];
        slot.handle = None;
        slot.locked = false;
        slot.scratch = false;
        slot.counter = 0;
        if self.active == Some(handle) {
            self.active = None;
        }
        trace!(unit = idx + 1, handle, "released unit");
        slot.channel.take()
    }

    /// Advance the request clock and stamp `unit` with it, rescaling every
    /// counter first when the clock has reached the ceiling.
    pub fn bump_and_possibly_rescale(&mut self, unit: Unit) {
        let Some(idx) = (unit as usize).checked_sub(1).filter(|i| *i < self.slots.len()) else {
            return;
        };
        if self.clock >= self.ceiling {
            self.rescale();
        }
        self.clock += 1;
        self.slots[idx].counter = self.clock;
    }

    /// Halve every counter while keeping strict order: equal counters stay
    /// equal and a counter that was larger than another stays larger.
    pub fn rescale(&mut self) {
        let mut order: Vec<usize> = (0..self.slots.len()).collect();
        order.sort_by_key(|i| (self.slots[*i].counter, *i));
        let mut prev: Option<(u32, u32)> = None;
        for i in order {
            let old = self.slots[i].counter;
            let new = match prev {
                None => old / 2,
                Some((p_old, p_new)) if p_old == old => p_new,
                Some((_, p_new)) => (old / 2).max(p_new + 1),
            };
            self.slots[i].counter = new;
            prev = Some((old, new));
        }
        self.clock = prev.map_or(0, |(_, new)| new);
        debug!(clock = self.clock, "rescaled unit request counters");
    }

    /// Pin `handle`'s unit so it is never recycled.
    pub fn lock(&mut self, handle: Handle, scratch: bool) -> Result<()> {
        let idx = *self.by_handle.get(&handle).ok_or(KernelError::NoSuchHandle(handle))?;
        if self.slots[idx].locked {
            self.slots[idx].scratch |= scratch;
            return Ok(());
        }
        let lockable = if scratch {
            self.capacity.saturating_sub(self.reserved)
        } else {
            self.capacity.saturating_sub(self.reserved + self.scratch_units)
        };
        let locked = self.locked_count();
        if locked >= lockable {
            return Err(KernelError::LockFailed { handle, locked, lockable });
        }
        self.slots[idx].locked = true;
        self.slots[idx].scratch = scratch;
        Ok(())
    }

    /// Unpin `handle`'s unit.  Scratch units stay locked.
    pub fn unlock(&mut self, handle: Handle) {
        if let Some(&idx) = self.by_handle.get(&handle) {
            let slot = &mut self.slots[idx];
            if !slot.scratch {
                slot.locked = false;
            }
        }
    }
}
