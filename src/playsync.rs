// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// A cancel handle shared between the owner of a long running operation and
/// the thread performing it. The thread is responsible for respecting the
/// cancel request.
#[derive(Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<Mutex<bool>>,
    condvar: Arc<Condvar>,
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle::default()
    }

    /// Blocks until the handle is cancelled.
    pub fn wait(&self) {
        let mut cancelled = self.cancelled.lock();
        self.condvar.wait_while(&mut cancelled, |cancelled| !*cancelled);
    }

    /// Cancels the operation and wakes every waiter.
    pub fn cancel(&self) {
        let mut cancelled = self.cancelled.lock();
        if !*cancelled {
            *cancelled = true;
            self.condvar.notify_all();
        }
    }
}
