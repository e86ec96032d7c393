//! Condition variable scenarios, engine level and through the POSIX and
//! C11 surfaces

use rtsync::api::{c11, posix};
use rtsync::types::opt;
use rtsync::{
    Clock, CondId, Kernel, LockStatus, MutexId, NestPolicy, OsError, Protocol, TaskId, TaskModel, Timeout,
    Timespec,
};

fn task(k: &mut Kernel, name: &'static str, prio: u8) -> TaskId {
    k.sched_mut().task_create(name, prio).unwrap()
}

fn run(k: &mut Kernel, t: TaskId) {
    k.sched_mut().switch_to(t).unwrap();
}

fn prio(k: &Kernel, t: TaskId) -> u8 {
    k.sched().effective_priority(t)
}

fn setup(k: &mut Kernel) -> (MutexId, CondId) {
    let m = k.mutex_create("mtx", Protocol::Inherit, NestPolicy::Disallowed).unwrap();
    let c = k.cond_create("cond").unwrap();
    (m, c)
}

/// Lock `m` as `t` and start waiting on `c`
fn wait(k: &mut Kernel, t: TaskId, c: CondId, m: MutexId, timeout: Timeout) {
    run(k, t);
    assert_eq!(k.mutex_lock(m, Timeout::Forever), Ok(LockStatus::Acquired));
    assert_eq!(k.cond_wait(c, m, timeout), Ok(LockStatus::Blocked));
}

#[test]
fn test_signal_reacquires_free_mutex() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let s = task(&mut k, "signaler", 7);
    let (m, c) = setup(&mut k);
    let before = k.snapshot();

    wait(&mut k, w, c, m, Timeout::Forever);
    assert_eq!(k.mutex_owner(m), Ok(None));
    assert_eq!(k.cond_waiters(c).unwrap(), [w]);
    assert_eq!(k.cond_mutex(c), Ok(Some(m)));

    run(&mut k, s);
    k.cond_signal(c).unwrap();
    assert_eq!(k.wait_result(w), Some(Ok(())));
    assert_eq!(k.mutex_owner(m), Ok(Some(w)));
    assert_eq!(k.cond_mutex(c), Ok(None));

    run(&mut k, w);
    k.mutex_unlock(m).unwrap();
    assert_eq!(k.snapshot(), before);
}

#[test]
fn test_signal_morphs_onto_taken_mutex() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let s = task(&mut k, "signaler", 7);
    let (m, c) = setup(&mut k);

    wait(&mut k, w, c, m, Timeout::Forever);

    run(&mut k, s);
    k.mutex_lock(m, Timeout::Forever).unwrap();
    k.cond_signal(c).unwrap();

    // Still blocked, now on the mutex, boosting its owner
    assert_eq!(k.wait_result(w), None);
    assert_eq!(k.cond_waiters(c).unwrap(), []);
    assert_eq!(k.mutex_waiters(m).unwrap(), [w]);
    assert_eq!(prio(&k, s), 5);

    k.mutex_unlock(m).unwrap();
    assert_eq!(prio(&k, s), 7);
    assert_eq!(k.wait_result(w), Some(Ok(())));
    assert_eq!(k.mutex_owner(m), Ok(Some(w)));
}

#[test]
fn test_signal_wakes_most_urgent() {
    let mut k = Kernel::default();
    let w1 = task(&mut k, "w1", 6);
    let w2 = task(&mut k, "w2", 4);
    let s = task(&mut k, "s", 9);
    let (m, c) = setup(&mut k);

    wait(&mut k, w1, c, m, Timeout::Forever);
    wait(&mut k, w2, c, m, Timeout::Forever);
    assert_eq!(k.cond_waiters(c).unwrap(), [w2, w1]);

    run(&mut k, s);
    k.cond_signal(c).unwrap();
    assert_eq!(k.wait_result(w2), Some(Ok(())));
    assert_eq!(k.cond_waiters(c).unwrap(), [w1]);
    assert_eq!(k.cond_mutex(c), Ok(Some(m)));
}

#[test]
fn test_broadcast_in_priority_order() {
    let mut k = Kernel::default();
    let w1 = task(&mut k, "w1", 6);
    let w2 = task(&mut k, "w2", 4);
    let w3 = task(&mut k, "w3", 6);
    let s = task(&mut k, "s", 8);
    let (m, c) = setup(&mut k);
    let before = k.snapshot();

    for w in [w1, w2, w3] {
        wait(&mut k, w, c, m, Timeout::Forever);
    }

    run(&mut k, s);
    k.mutex_lock(m, Timeout::Forever).unwrap();
    k.cond_broadcast(c).unwrap();
    assert_eq!(k.cond_waiters(c).unwrap(), []);
    assert_eq!(k.mutex_waiters(m).unwrap(), [w2, w1, w3]);
    assert_eq!(prio(&k, s), 4);

    let mut holder = s;
    for next in [w2, w1, w3] {
        run(&mut k, holder);
        k.mutex_unlock(m).unwrap();
        assert_eq!(k.wait_result(next), Some(Ok(())));
        holder = next;
    }
    run(&mut k, holder);
    k.mutex_unlock(m).unwrap();
    assert_eq!(k.snapshot(), before);
}

#[test]
fn test_timeout_reacquires_mutex() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let s = task(&mut k, "other", 7);
    let (m, c) = setup(&mut k);
    let before = k.snapshot();

    // Mutex free when the timeout fires
    wait(&mut k, w, c, m, Timeout::Ticks(3));
    k.tick_n(2);
    assert_eq!(k.wait_result(w), None);
    k.tick();
    assert_eq!(k.wait_result(w), Some(Err(OsError::Timeout)));
    assert_eq!(k.mutex_owner(m), Ok(Some(w)));
    assert_eq!(k.cond_mutex(c), Ok(None));
    run(&mut k, w);
    k.mutex_unlock(m).unwrap();

    // Mutex taken when the timeout fires
    wait(&mut k, w, c, m, Timeout::Ticks(3));
    run(&mut k, s);
    k.mutex_lock(m, Timeout::Forever).unwrap();
    k.tick_n(3);
    assert_eq!(k.wait_result(w), None);
    assert_eq!(k.mutex_waiters(m).unwrap(), [w]);

    k.mutex_unlock(m).unwrap();
    assert_eq!(k.wait_result(w), Some(Err(OsError::Timeout)));
    run(&mut k, w);
    k.mutex_unlock(m).unwrap();

    assert_eq!(k.snapshot(), before);
}

#[test]
fn test_signal_disarms_timeout() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let (m, c) = setup(&mut k);

    wait(&mut k, w, c, m, Timeout::Ticks(10));
    k.tick_n(2);
    k.cond_signal(c).unwrap();
    assert_eq!(k.snapshot().timers, 0);

    k.tick_n(20);
    assert_eq!(k.wait_result(w), Some(Ok(())));
    assert_eq!(k.mutex_owner(m), Ok(Some(w)));
}

#[test]
fn test_expired_wait_keeps_mutex() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let (m, c) = setup(&mut k);

    run(&mut k, w);
    k.mutex_lock(m, Timeout::Forever).unwrap();
    assert_eq!(k.cond_wait(c, m, Timeout::Expired), Err(OsError::Timeout));
    assert_eq!(k.mutex_owner(m), Ok(Some(w)));
    assert_eq!(k.cond_waiters(c).unwrap(), []);
}

#[test]
fn test_wait_errors() {
    let mut k = Kernel::default();
    let w1 = task(&mut k, "w1", 5);
    let w2 = task(&mut k, "w2", 5);
    let (m1, c) = setup(&mut k);
    let m2 = k.mutex_create("other", Protocol::Inherit, NestPolicy::Disallowed).unwrap();

    run(&mut k, w1);
    assert_eq!(k.cond_wait(c, m1, Timeout::Forever), Err(OsError::MutexNotOwner));

    wait(&mut k, w1, c, m1, Timeout::Forever);

    run(&mut k, w2);
    k.mutex_lock(m2, Timeout::Forever).unwrap();
    assert_eq!(k.cond_wait(c, m2, Timeout::Forever), Err(OsError::CondMutexMismatch));
    assert_eq!(k.mutex_owner(m2), Ok(Some(w2)));

    // The binding goes away with the last waiter
    k.cond_signal(c).unwrap();
    assert_eq!(k.wait_result(w1), Some(Ok(())));
    assert_eq!(k.cond_wait(c, m2, Timeout::Forever), Ok(LockStatus::Blocked));
    assert_eq!(k.cond_mutex(c), Ok(Some(m2)));
}

#[test]
fn test_delete() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let (m, c) = setup(&mut k);

    wait(&mut k, w, c, m, Timeout::Ticks(50));
    assert_eq!(k.cond_delete(c, opt::DEL_NO_PEND), Err(OsError::ObjBusy));
    assert_eq!(k.cond_delete(c, opt::DEL_ALWAYS), Ok(()));

    assert_eq!(k.wait_result(w), Some(Err(OsError::ObjDel)));
    assert_eq!(k.mutex_owner(m), Ok(Some(w)));
    assert_eq!(k.cond_signal(c), Err(OsError::ObjType));
    assert_eq!(k.snapshot().timers, 0);
}

#[test]
fn test_waiter_repositioned_on_priority_change() {
    let mut k = Kernel::default();
    let w1 = task(&mut k, "w1", 6);
    let w2 = task(&mut k, "w2", 5);
    let (m, c) = setup(&mut k);

    wait(&mut k, w1, c, m, Timeout::Forever);
    wait(&mut k, w2, c, m, Timeout::Forever);
    assert_eq!(k.cond_waiters(c).unwrap(), [w2, w1]);

    k.task_set_priority(w1, 2).unwrap();
    assert_eq!(k.cond_waiters(c).unwrap(), [w1, w2]);
}

/// W holds m2 while waiting with m1; X owns m1 and blocks on m2. Waking
/// W would close the cycle, so W is released with a deadlock error.
#[test]
fn test_reacquire_deadlock() {
    let mut k = Kernel::default();
    let w = task(&mut k, "W", 5);
    let x = task(&mut k, "X", 6);
    let y = task(&mut k, "Y", 7);
    let (m1, c) = setup(&mut k);
    let m2 = k.mutex_create("m2", Protocol::Inherit, NestPolicy::Disallowed).unwrap();

    run(&mut k, w);
    k.mutex_lock(m2, Timeout::Forever).unwrap();
    wait(&mut k, w, c, m1, Timeout::Forever);

    run(&mut k, x);
    k.mutex_lock(m1, Timeout::Forever).unwrap();
    assert_eq!(k.mutex_lock(m2, Timeout::Forever), Ok(LockStatus::Blocked));

    run(&mut k, y);
    k.cond_signal(c).unwrap();
    assert_eq!(k.wait_result(w), Some(Err(OsError::MutexDeadlock)));
    assert_eq!(k.mutex_owner(m1), Ok(Some(x)));
    assert_eq!(k.mutex_waiters(m1).unwrap(), []);

    run(&mut k, w);
    k.mutex_unlock(m2).unwrap();
    assert_eq!(k.wait_result(x), Some(Ok(())));
}

#[test]
fn test_cond_limit_and_names() {
    let mut k = Kernel::default();
    let c = k.cond_create("named").unwrap();
    assert_eq!(k.cond_cb(c).unwrap().name(), "named");
    assert_eq!(k.cond_cb(c).unwrap().clock(), Clock::Realtime);

    for _ in 1..rtsync::config::CFG_COND_MAX {
        k.cond_create("c").unwrap();
    }
    assert_eq!(k.cond_create("extra"), Err(OsError::ObjNoMore));
}

// ============ POSIX ============

#[test]
fn test_pthread_cond_timedwait_realtime() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let m = posix::pthread_mutex_init(&mut k, &posix::MutexAttr::default()).unwrap();
    let c = posix::pthread_cond_init(&mut k, &posix::CondAttr::default()).unwrap();
    k.set_realtime(Timespec::new(1_000, 0)).unwrap();

    run(&mut k, w);
    assert_eq!(posix::pthread_mutex_lock(&mut k, m), Ok(LockStatus::Acquired));

    // Past deadline: ETIMEDOUT with the mutex held
    assert_eq!(
        posix::pthread_cond_timedwait(&mut k, c, m, &Timespec::new(999, 0)),
        Err(posix::errno::ETIMEDOUT)
    );
    assert_eq!(k.mutex_owner(m), Ok(Some(w)));

    // Malformed deadline: EINVAL, nothing released
    assert_eq!(
        posix::pthread_cond_timedwait(&mut k, c, m, &Timespec::new(1_001, -5)),
        Err(posix::errno::EINVAL)
    );
    assert_eq!(k.mutex_owner(m), Ok(Some(w)));

    assert_eq!(
        posix::pthread_cond_timedwait(&mut k, c, m, &Timespec::new(1_000, 5_000_000)),
        Ok(LockStatus::Blocked)
    );
    k.tick_n(4);
    assert_eq!(k.wait_result(w), None);
    k.tick();
    let result = k.wait_result(w).unwrap();
    assert_eq!(posix::completion(result), posix::errno::ETIMEDOUT);
    assert_eq!(k.mutex_owner(m), Ok(Some(w)));
}

#[test]
fn test_pthread_cond_monotonic_ignores_realtime_jumps() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let m = posix::pthread_mutex_init(&mut k, &posix::MutexAttr::default()).unwrap();
    let attr = posix::CondAttr {
        clock: posix::CLOCK_MONOTONIC,
    };
    let c = posix::pthread_cond_init(&mut k, &attr).unwrap();
    assert_eq!(k.cond_cb(c).unwrap().clock(), Clock::Monotonic);

    k.tick_n(10);
    let deadline = k.clock_now(Clock::Monotonic);
    let deadline = Timespec::new(deadline.sec, deadline.nsec + 3_000_000);

    run(&mut k, w);
    posix::pthread_mutex_lock(&mut k, m).unwrap();
    assert_eq!(
        posix::pthread_cond_timedwait(&mut k, c, m, &deadline),
        Ok(LockStatus::Blocked)
    );

    k.set_realtime(Timespec::new(50_000, 0)).unwrap();
    k.tick_n(2);
    assert_eq!(k.wait_result(w), None);
    k.tick();
    assert_eq!(k.wait_result(w).map(posix::completion), Some(posix::errno::ETIMEDOUT));
}

#[test]
fn test_pthread_cond_clockwait_and_destroy() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let s = task(&mut k, "signaler", 6);
    let m = posix::pthread_mutex_init(&mut k, &posix::MutexAttr::default()).unwrap();
    let c = posix::pthread_cond_init(&mut k, &posix::CondAttr::default()).unwrap();

    assert_eq!(
        posix::pthread_cond_init(&mut k, &posix::CondAttr { clock: 99 }),
        Err(posix::errno::EINVAL)
    );

    run(&mut k, w);
    posix::pthread_mutex_lock(&mut k, m).unwrap();
    assert_eq!(
        posix::pthread_cond_clockwait(&mut k, c, m, 99, &Timespec::new(1, 0)),
        Err(posix::errno::EINVAL)
    );
    assert_eq!(
        posix::pthread_cond_clockwait(&mut k, c, m, posix::CLOCK_MONOTONIC, &Timespec::new(60, 0)),
        Ok(LockStatus::Blocked)
    );

    run(&mut k, s);
    assert_eq!(posix::pthread_cond_destroy(&mut k, c), posix::errno::EBUSY);
    assert_eq!(posix::pthread_cond_broadcast(&mut k, c), 0);
    assert_eq!(k.wait_result(w).map(posix::completion), Some(0));
    assert_eq!(posix::pthread_cond_destroy(&mut k, c), 0);
    assert_eq!(posix::pthread_cond_signal(&mut k, c), posix::errno::EINVAL);
}

#[test]
fn test_pthread_cond_wait_requires_owner() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let m = posix::pthread_mutex_init(&mut k, &posix::MutexAttr::default()).unwrap();
    let c = posix::pthread_cond_init(&mut k, &posix::CondAttr::default()).unwrap();

    run(&mut k, w);
    assert_eq!(posix::pthread_cond_wait(&mut k, c, m), Err(posix::errno::EPERM));
}

#[test]
fn test_recursive_mutex_fully_released_while_waiting() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let s = task(&mut k, "signaler", 7);
    let attr = posix::MutexAttr {
        kind: posix::PTHREAD_MUTEX_RECURSIVE,
        protocol: posix::PTHREAD_PRIO_INHERIT,
        ..Default::default()
    };
    let m = posix::pthread_mutex_init(&mut k, &attr).unwrap();
    let c = posix::pthread_cond_init(&mut k, &posix::CondAttr::default()).unwrap();
    let before = k.snapshot();

    run(&mut k, w);
    assert_eq!(posix::pthread_mutex_lock(&mut k, m), Ok(LockStatus::Acquired));
    assert_eq!(posix::pthread_mutex_lock(&mut k, m), Ok(LockStatus::Acquired));
    assert_eq!(k.mutex_nesting(m), Ok(2));
    assert_eq!(posix::pthread_cond_wait(&mut k, c, m), Ok(LockStatus::Blocked));
    assert_eq!(k.mutex_owner(m), Ok(None));

    // Signaler is not held off by the waiter's outer lock level
    run(&mut k, s);
    assert_eq!(posix::pthread_mutex_lock(&mut k, m), Ok(LockStatus::Acquired));
    assert_eq!(posix::pthread_cond_signal(&mut k, c), 0);
    assert_eq!(k.wait_result(w), None);
    assert_eq!(k.mutex_waiters(m).unwrap(), [w]);
    assert_eq!(prio(&k, s), 5);
    assert_eq!(posix::pthread_mutex_unlock(&mut k, m), 0);

    assert_eq!(k.wait_result(w), Some(Ok(())));
    assert_eq!(k.mutex_owner(m), Ok(Some(w)));
    assert_eq!(k.mutex_nesting(m), Ok(2));

    // Timeout reacquiring a free mutex keeps the level too
    run(&mut k, w);
    assert_eq!(k.cond_wait(c, m, Timeout::Ticks(2)), Ok(LockStatus::Blocked));
    assert_eq!(k.mutex_owner(m), Ok(None));
    k.tick_n(2);
    assert_eq!(k.wait_result(w), Some(Err(OsError::Timeout)));
    assert_eq!(k.mutex_nesting(m), Ok(2));

    run(&mut k, w);
    assert_eq!(k.cond_wait(c, m, Timeout::Expired), Err(OsError::Timeout));
    assert_eq!(k.mutex_nesting(m), Ok(2));

    assert_eq!(posix::pthread_mutex_unlock(&mut k, m), 0);
    assert_eq!(posix::pthread_mutex_unlock(&mut k, m), 0);
    assert_eq!(k.mutex_owner(m), Ok(None));
    assert_eq!(k.snapshot(), before);
}

// ============ C11 ============

#[test]
fn test_cnd_signal_and_timedwait() {
    let mut k = Kernel::default();
    let w = task(&mut k, "waiter", 5);
    let s = task(&mut k, "signaler", 6);
    let m = c11::mtx_init(&mut k, c11::MTX_TIMED).unwrap();
    let c = c11::cnd_init(&mut k).unwrap();

    run(&mut k, w);
    assert_eq!(c11::mtx_lock(&mut k, m), Ok(LockStatus::Acquired));
    assert_eq!(c11::cnd_wait(&mut k, c, m), Ok(LockStatus::Blocked));

    run(&mut k, s);
    assert_eq!(c11::cnd_destroy(&mut k, c), c11::ThrdStatus::Busy);
    assert_eq!(c11::cnd_signal(&mut k, c), c11::ThrdStatus::Success);
    assert_eq!(k.wait_result(w).map(c11::completion), Some(c11::ThrdStatus::Success));

    run(&mut k, w);
    let deadline = Timespec::new(0, 2_000_000);
    assert_eq!(c11::cnd_timedwait(&mut k, c, m, &deadline), Ok(LockStatus::Blocked));
    k.tick_n(2);
    assert_eq!(k.wait_result(w).map(c11::completion), Some(c11::ThrdStatus::Timedout));

    run(&mut k, w);
    assert_eq!(c11::cnd_broadcast(&mut k, c), c11::ThrdStatus::Success);
    assert_eq!(c11::mtx_unlock(&mut k, m), c11::ThrdStatus::Success);
    assert_eq!(c11::cnd_destroy(&mut k, c), c11::ThrdStatus::Success);
    assert_eq!(c11::mtx_destroy(&mut k, m), c11::ThrdStatus::Success);
}
