//! Producer-Consumer example with a mutex and two condition variables
//!
//! Tasks run cooperatively: each dispatch runs one step of the most urgent
//! ready task. A signal while the mutex is held moves the consumer onto the
//! mutex queue, boosting the producer until it unlocks.

use std::collections::VecDeque;

use rtsync::{CondId, Kernel, LockStatus, MutexId, NestPolicy, Protocol, TaskId, TaskModel, Timeout};

const ITEMS: u32 = 6;
const CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Producer,
    Consumer,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Lock,
    Check,
    /// Blocked; `Check` once the mutex is owned again
    Resume,
}

struct Actor {
    task: TaskId,
    role: Role,
    phase: Phase,
    done: u32,
}

struct Shared {
    mtx: MutexId,
    not_empty: CondId,
    not_full: CondId,
    buf: VecDeque<u32>,
}

fn step(k: &mut Kernel, s: &mut Shared, a: &mut Actor) {
    match a.phase {
        Phase::Lock => {
            a.phase = match k.mutex_lock(s.mtx, Timeout::Forever).expect("lock failed") {
                LockStatus::Acquired => Phase::Check,
                LockStatus::Blocked => Phase::Resume,
            };
        }
        Phase::Resume => {
            k.wait_result(a.task)
                .expect("resumed before wake-up")
                .expect("wait failed");
            a.phase = Phase::Check;
        }
        Phase::Check => {
            let (wait_on, ready) = match a.role {
                Role::Producer => (s.not_full, s.buf.len() < CAPACITY),
                Role::Consumer => (s.not_empty, !s.buf.is_empty()),
            };
            if !ready {
                k.cond_wait(wait_on, s.mtx, Timeout::Forever).expect("wait failed");
                a.phase = Phase::Resume;
                return;
            }

            let signal = match a.role {
                Role::Producer => {
                    s.buf.push_back(a.done);
                    println!("[P] produced #{}", a.done);
                    s.not_empty
                }
                Role::Consumer => {
                    let n = s.buf.pop_front().expect("buffer empty");
                    println!("[C] consumed #{n}");
                    s.not_full
                }
            };
            a.done += 1;

            k.cond_signal(signal).expect("signal failed");
            println!("    signaled at prio {}", k.sched().effective_priority(a.task));
            k.mutex_unlock(s.mtx).expect("unlock failed");
            a.phase = Phase::Lock;
        }
    }
}

fn main() {
    println!("Producer-Consumer Demo");

    let mut k = Kernel::default();
    let producer = k.sched_mut().task_create("P", 15).expect("task create failed");
    let consumer = k.sched_mut().task_create("C", 10).expect("task create failed");

    let mut shared = Shared {
        mtx: k
            .mutex_create("Mtx", Protocol::Inherit, NestPolicy::Disallowed)
            .expect("mutex create failed"),
        not_empty: k.cond_create("NotEmpty").expect("cond create failed"),
        not_full: k.cond_create("NotFull").expect("cond create failed"),
        buf: VecDeque::new(),
    };
    let mut actors = [
        Actor { task: producer, role: Role::Producer, phase: Phase::Lock, done: 0 },
        Actor { task: consumer, role: Role::Consumer, phase: Phase::Lock, done: 0 },
    ];

    while actors.iter().any(|a| a.done < ITEMS) {
        let Some(t) = k.sched_mut().dispatch() else {
            panic!("no task ready");
        };
        let actor = actors.iter_mut().find(|a| a.task == t).expect("unknown task");
        if actor.done == ITEMS {
            continue;
        }
        step(&mut k, &mut shared, actor);
    }

    println!("Resources: {:?}", k.snapshot());
}
