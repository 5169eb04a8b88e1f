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

use parking_lot::Mutex;

/// Represents the current cancel state.
#[derive(PartialEq, Clone, Copy, Debug)]
enum CancelState {
    Untouched,
    Cancelled,
}

/// A cancel handle is shared between a scheduled task and its owner. The owner cancels it; the
/// task checks it before firing.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    cancelled: Arc<Mutex<CancelState>>,
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            cancelled: Arc::new(Mutex::new(CancelState::Untouched)),
        }
    }

    /// Returns true if the handle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock() == CancelState::Cancelled
    }

    /// Cancels the handle. Returns false if it was already cancelled.
    pub fn cancel(&self) -> bool {
        let mut cancel_state = self.cancelled.lock();
        if *cancel_state == CancelState::Untouched {
            *cancel_state = CancelState::Cancelled;
            return true;
        }
        false
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test_cancel_handle_cancelled() {
        let cancel_handle = CancelHandle::new();
        assert!(!cancel_handle.is_cancelled());

        let join = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || cancel_handle.cancel())
        };

        assert!(join.join().unwrap());
        assert!(cancel_handle.is_cancelled());
    }

    #[test]
    fn test_cancel_only_once() {
        let cancel_handle = CancelHandle::new();
        assert!(cancel_handle.cancel());
        assert!(!cancel_handle.cancel());
        assert!(cancel_handle.clone().is_cancelled());
    }
}
