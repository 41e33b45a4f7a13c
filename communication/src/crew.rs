//! Crew recruitment and supervision.
//!
//! A crew is one scoped worker thread per lane, all running the same
//! worker logic against the same hub. The calling thread supervises:
//! it binds the kill switch, sleeps until the hub reports quiescence,
//! dismisses the crew, and joins the workers to collect their results.
//! Scoped threads let the worker logic borrow the job's shared state
//! (the graph under consideration, the operation's parameters) without
//! reference counting.

use std::thread;

use crate::hub::{Hub, Mailbox};
use crate::kill::KillSwitch;

/// Runs one worker per lane of the hub to quiescence and returns their
/// results in lane order.
///
/// Initial packets must be assigned to their ports before enlisting; a
/// crew whose hub holds no packets quiesces immediately. The kill switch,
/// if any, is bound to the job for exactly the duration of the call.
pub fn enlist<'env, M, S, T, W>(
    hub: &'env Hub<M, S>,
    kill: Option<&KillSwitch>,
    worker: W,
) -> Vec<T>
where
    M: Send,
    S: Send,
    T: Send,
    W: Fn(Mailbox<'env, M, S>) -> T + Sync,
{
    hub.log_launch();
    thread::scope(|scope| {
        let worker = &worker;
        let handles = (0..hub.lanes())
            .map(|index| scope.spawn(move || worker(Mailbox::new(hub, index))))
            .collect::<Vec<_>>();
        if let Some(kill) = kill {
            kill.enable(hub.kill_handle());
        }
        hub.wait_quiescent();
        if let Some(kill) = kill {
            kill.disable();
        }
        hub.dismiss();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker panicked"))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KILLED_BY_USER, NOT_KILLED};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn empty_job_quiesces_immediately() {
        let hub: Hub<(), ()> = Hub::new(4);
        let results = enlist(&hub, None, |mut mailbox| {
            let mut count = 0usize;
            while let Some(batch) = mailbox.recv() {
                count += batch.len();
            }
            count
        });
        assert_eq!(results, vec![0, 0, 0, 0]);
    }

    #[test]
    fn killed_job_winds_down() {
        // Workers generate unboundedly until a parallel thread fires the
        // kill switch; the job must still quiesce and join.
        let hub: Hub<u64, ()> = Hub::new(2);
        hub.assign(0, vec![1]);
        let switch = KillSwitch::new();
        let fired = AtomicBool::new(false);
        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(std::time::Duration::from_millis(10));
                switch.kill();
                fired.store(true, Ordering::Release);
            });
            enlist(&hub, Some(&switch), |mut mailbox: Mailbox<u64, ()>| {
                while let Some(batch) = mailbox.recv() {
                    for n in batch {
                        if mailbox.killed() == NOT_KILLED {
                            let lanes = mailbox.lanes();
                            mailbox.post((n as usize + 1) % lanes, n + 1);
                        }
                    }
                }
            });
        });
        assert!(fired.load(Ordering::Acquire));
        assert_eq!(hub.killed(), KILLED_BY_USER);
    }
}
