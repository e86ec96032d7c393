//! Priority Inversion Demo - mutex priority inheritance
//!
//! Three tasks: High(5), Med(10), Low(15)
//! Low holds mutex -> High waits -> Low boosted to prio 5, so Med cannot
//! preempt it

use rtsync::{Kernel, LockStatus, NestPolicy, Protocol, TaskId, TaskModel, Timeout};

fn show(k: &Kernel, tag: &str, tasks: &[(&str, TaskId)]) {
    print!("{tag:<28}");
    for (name, t) in tasks {
        print!(" {name}={:<3}", k.sched().effective_priority(*t));
    }
    println!(" next={:?}", k.sched().highest_ready());
}

fn main() {
    println!("Priority Inversion Demo: H(5) M(10) L(15)");

    let mut k = Kernel::default();
    let high = k.sched_mut().task_create("H", 5).expect("task create failed");
    let med = k.sched_mut().task_create("M", 10).expect("task create failed");
    let low = k.sched_mut().task_create("L", 15).expect("task create failed");
    let tasks = [("H", high), ("M", med), ("L", low)];

    let mtx = k
        .mutex_create("Mtx", Protocol::Inherit, NestPolicy::Disallowed)
        .expect("mutex create failed");

    // Low gets the mutex while the others sleep
    k.sched_mut().switch_to(low).expect("switch failed");
    assert_eq!(k.mutex_lock(mtx, Timeout::Forever), Ok(LockStatus::Acquired));
    show(&k, "[LOW] holding", &tasks);

    // High wakes up and wants the mutex
    k.sched_mut().switch_to(high).expect("switch failed");
    assert_eq!(k.mutex_lock(mtx, Timeout::Forever), Ok(LockStatus::Blocked));
    show(&k, "[HIGH] blocked", &tasks);

    // Med is ready but Low runs first
    let next = k.sched_mut().dispatch();
    assert_eq!(next, Some(low));
    k.mutex_unlock(mtx).expect("unlock failed");
    show(&k, "[LOW] released", &tasks);

    let next = k.sched_mut().dispatch();
    assert_eq!(next, Some(high));
    println!("[HIGH] acquired: {:?}", k.wait_result(high));
    k.mutex_unlock(mtx).expect("unlock failed");

    println!("Resources: {:?}", k.snapshot());
}
