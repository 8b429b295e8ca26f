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

//! Ordering of command lists recorded on several threads.
//!
//! Secondary lists (shadow maps) are produced by worker threads, primary lists
//! (the scene passes) by the render thread. Every secondary list is executed
//! before any primary list, since the primary passes sample what the
//! secondary passes wrote.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use ember_core::renderer::{CommandListId, GpuContext};

#[derive(Debug, Default)]
struct ReadyLists {
    secondary: VecDeque<CommandListId>,
    primary: VecDeque<CommandListId>,
    /// Secondary lists reserved but not yet submitted or abandoned.
    outstanding: usize,
}

/// A thread-safe ready queue of command lists.
///
/// Producers [`reserve_secondary`](Self::reserve_secondary) a slot before
/// they start recording, so the consumer knows how many lists to wait for.
#[derive(Debug, Default)]
pub struct CommandListScheduler {
    lists: Mutex<ReadyLists>,
    ready: Condvar,
}

/// A secondary list the scheduler is waiting for.
///
/// Dropping the reservation without submitting abandons the slot, so a
/// worker that fails to record does not stall the consumer.
#[derive(Debug)]
pub struct SecondaryReservation<'a> {
    scheduler: &'a CommandListScheduler,
    done: bool,
}

impl SecondaryReservation<'_> {
    /// Hands the recorded list to the scheduler.
    pub fn submit(mut self, list: CommandListId) {
        self.done = true;
        let mut lists = self.scheduler.lock();
        lists.outstanding -= 1;
        lists.secondary.push_back(list);
        self.scheduler.ready.notify_all();
    }
}

impl Drop for SecondaryReservation<'_> {
    fn drop(&mut self) {
        if !self.done {
            let mut lists = self.scheduler.lock();
            lists.outstanding -= 1;
            self.scheduler.ready.notify_all();
        }
    }
}

impl CommandListScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReadyLists> {
        self.lists.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Announces a secondary list that will be submitted later.
    pub fn reserve_secondary(&self) -> SecondaryReservation<'_> {
        self.lock().outstanding += 1;
        SecondaryReservation {
            scheduler: self,
            done: false,
        }
    }

    /// Queues a finished secondary list that was not reserved.
    pub fn push_secondary(&self, list: CommandListId) {
        self.lock().secondary.push_back(list);
        self.ready.notify_all();
    }

    /// Queues a finished primary list.
    pub fn push_primary(&self, list: CommandListId) {
        self.lock().primary.push_back(list);
        self.ready.notify_all();
    }

    /// Number of lists waiting to be executed, and of reservations pending.
    pub fn pending(&self) -> (usize, usize, usize) {
        let lists = self.lock();
        (lists.secondary.len(), lists.primary.len(), lists.outstanding)
    }

    /// Executes secondary lists as they arrive until no reservation is left,
    /// then every primary list in submission order. Returns the number of
    /// lists executed.
    ///
    /// Blocks without timeout while a reservation is outstanding.
    pub fn execute_render_passes(&self, gpu: &mut dyn GpuContext) -> usize {
        let mut executed = 0;
        loop {
            let next = {
                let mut lists = self.lock();
                while lists.secondary.is_empty() && lists.outstanding > 0 {
                    lists = self
                        .ready
                        .wait(lists)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                lists.secondary.pop_front()
            };
            match next {
                Some(list) => {
                    gpu.execute_command_list(list);
                    executed += 1;
                }
                None => break,
            }
        }

        let primary: Vec<_> = self.lock().primary.drain(..).collect();
        for list in primary {
            gpu.execute_command_list(list);
            executed += 1;
        }
        executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_infra::{GpuCommand, HeadlessGpuContext};
    use std::time::Duration;

    fn recorded_list(gpu: &mut HeadlessGpuContext, vertices: u32) -> CommandListId {
        let mut deferred = gpu.create_deferred_context().unwrap();
        deferred.draw(vertices, 0);
        deferred.finish_command_list().unwrap()
    }

    fn executed_draws(gpu: &HeadlessGpuContext) -> Vec<u32> {
        gpu.device()
            .commands()
            .into_iter()
            .filter_map(|command| match command {
                GpuCommand::Draw { vertex_count, .. } => Some(vertex_count),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn secondaries_run_before_primaries() {
        let mut gpu = HeadlessGpuContext::new();
        let scheduler = CommandListScheduler::new();
        let primary = recorded_list(&mut gpu, 3);
        let first = recorded_list(&mut gpu, 6);
        let second = recorded_list(&mut gpu, 9);

        scheduler.push_primary(primary);
        scheduler.push_secondary(first);
        scheduler.push_secondary(second);
        assert_eq!(scheduler.execute_render_passes(&mut gpu), 3);
        assert_eq!(executed_draws(&gpu), vec![6, 9, 3]);
        assert_eq!(scheduler.pending(), (0, 0, 0));
    }

    #[test]
    fn waits_for_reserved_secondaries() {
        let mut gpu = HeadlessGpuContext::new();
        let scheduler = CommandListScheduler::new();
        let primary = recorded_list(&mut gpu, 3);
        let late = recorded_list(&mut gpu, 12);
        scheduler.push_primary(primary);

        std::thread::scope(|scope| {
            let reservation = scheduler.reserve_secondary();
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                reservation.submit(late);
            });
            scheduler.execute_render_passes(&mut gpu);
        });
        assert_eq!(executed_draws(&gpu), vec![12, 3]);
    }

    #[test]
    fn abandoned_reservation_does_not_block() {
        let mut gpu = HeadlessGpuContext::new();
        let scheduler = CommandListScheduler::new();
        let primary = recorded_list(&mut gpu, 3);
        scheduler.push_primary(primary);

        std::thread::scope(|scope| {
            let reservation = scheduler.reserve_secondary();
            scope.spawn(move || drop(reservation));
            assert_eq!(scheduler.execute_render_passes(&mut gpu), 1);
        });
    }
}
