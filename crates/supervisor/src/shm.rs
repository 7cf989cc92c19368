// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-shared accept mutex.
//!
//! A single `AtomicI32` in an anonymous `MAP_SHARED` mapping, inherited
//! across fork. Value 0 means free, 1 means held. Children take it with
//! a compare-exchange before accepting, so only one child reacts to a
//! listening-socket wakeup.

use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, Ordering};

use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};

use crate::error::SupervisorError;

const FREE: i32 = 0;
const HELD: i32 = 1;

pub struct AcceptMutex {
    cell: NonNull<AtomicI32>,
}

// The mapping is shared memory; the atomic makes access from any
// process or thread sound.
unsafe impl Send for AcceptMutex {}
unsafe impl Sync for AcceptMutex {}

impl AcceptMutex {
    /// Map the shared word. Must happen in the master, before fork.
    pub fn new() -> Result<Self, SupervisorError> {
        let len = NonZeroUsize::new(std::mem::size_of::<AtomicI32>())
            .ok_or_else(|| SupervisorError::Config("zero-size atomic".into()))?;
        let mapping = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED | MapFlags::MAP_ANONYMOUS,
            )
        }
        .map_err(SupervisorError::ShmMap)?;

        let cell = mapping.cast::<AtomicI32>();
        unsafe { cell.as_ptr().write(AtomicI32::new(FREE)) };
        Ok(Self { cell })
    }

    fn cell(&self) -> &AtomicI32 {
        unsafe { self.cell.as_ref() }
    }

    /// Try to take the mutex. Non-blocking; losers just skip the wakeup.
    pub fn try_lock(&self) -> bool {
        self.cell()
            .compare_exchange(FREE, HELD, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn unlock(&self) {
        self.cell().store(FREE, Ordering::Release);
    }

    /// Current holder state (observability only; racy by nature).
    pub fn is_held(&self) -> bool {
        self.cell().load(Ordering::Relaxed) == HELD
    }
}

impl Drop for AcceptMutex {
    fn drop(&mut self) {
        let _ = unsafe {
            munmap(self.cell.cast(), std::mem::size_of::<AtomicI32>())
        };
    }
}

#[cfg(test)]
#[path = "shm_tests.rs"]
mod tests;
