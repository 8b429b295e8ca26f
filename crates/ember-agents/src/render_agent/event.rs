// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// An event that stays signaled until explicitly reset.
///
/// Every waiter is released by [`set`](Self::set), and later waits return
/// immediately until [`reset`](Self::reset) is called.
#[derive(Debug, Default)]
pub struct ManualResetEvent {
    signaled: Mutex<bool>,
    changed: Condvar,
}

impl ManualResetEvent {
    /// Creates an event in the given state.
    pub fn new(signaled: bool) -> Self {
        Self {
            signaled: Mutex::new(signaled),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.signaled.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Signals the event and wakes every waiter.
    pub fn set(&self) {
        *self.lock() = true;
        self.changed.notify_all();
    }

    /// Returns the event to the non-signaled state.
    pub fn reset(&self) {
        *self.lock() = false;
    }

    /// Returns `true` if the event is signaled.
    pub fn is_set(&self) -> bool {
        *self.lock()
    }

    /// Blocks until the event is signaled.
    pub fn wait(&self) {
        let mut signaled = self.lock();
        while !*signaled {
            signaled = self
                .changed
                .wait(signaled)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Blocks until the event is signaled or `timeout` elapses. Returns
    /// `true` if the event was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let signaled = self.lock();
        let (signaled, _) = self
            .changed
            .wait_timeout_while(signaled, timeout, |signaled| !*signaled)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *signaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn stays_set_until_reset() {
        let event = ManualResetEvent::new(false);
        assert!(!event.is_set());
        event.set();
        event.wait();
        event.wait();
        assert!(event.is_set());
        event.reset();
        assert!(!event.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn releases_a_waiting_thread() {
        let event = Arc::new(ManualResetEvent::new(false));
        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait_timeout(Duration::from_secs(5)))
        };
        event.set();
        assert!(waiter.join().unwrap());
    }
}
