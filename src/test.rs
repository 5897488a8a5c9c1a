use crate::{Gate, Gated, Retainer};
use std::{
    mem,
    sync::atomic::Ordering::{Acquire, Relaxed, Release},
    sync::atomic::{AtomicBool, AtomicU32, AtomicUsize},
    sync::Mutex,
    thread,
    time::Duration,
};

struct DropCounter<'a>(&'a AtomicUsize);

impl Drop for DropCounter<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Relaxed);
    }
}

#[test]
fn t001() {
    let value = 7u32;
    let mut gate = Gate::new();
    assert!(!gate.is_armed());

    unsafe {
        gate.arm(&value);
        assert!(gate.is_armed());

        let weak = gate.weak(&value).unwrap();
        let strong = gate.strong(&value).unwrap();
        assert!(strong.get() == &7);
        assert!(strong.strong_count() == 2);
        assert!(weak.upgrade().unwrap().get() == &7);

        drop(strong);
        gate.disarm();
        assert!(!gate.is_armed());
        assert!(weak.upgrade().is_none());
        assert!(weak.strong_count() == 0);
    }
}

#[test]
fn t002() {
    let mut cell = Gated::new(String::from("a"));
    assert!(cell.has_value());
    assert!(cell.get().unwrap() == "a");

    let weak = cell.weak().unwrap();
    assert!(weak.upgrade().unwrap().get() == "a");

    cell.reset();
    assert!(!cell.has_value());
    assert!(cell.get().is_none());
    assert!(cell.weak().is_none());
    assert!(weak.upgrade().is_none());
}

#[test]
fn t003() {
    let first = 1u8;
    let second = 2u8;
    let mut gate = Gate::new();

    unsafe {
        gate.arm(&first);
        let weak_first = gate.weak(&first).unwrap();

        gate.disarm();
        gate.disarm();
        assert!(!gate.is_armed());
        assert!(weak_first.upgrade().is_none());

        gate.arm(&second);
        let weak_second = gate.weak(&second).unwrap();

        // The old cycle's observers stay expired.
        assert!(weak_first.upgrade().is_none());
        assert!(weak_second.upgrade().unwrap().get() == &2);

        gate.disarm();
        assert!(weak_second.upgrade().is_none());
    }
}

#[test]
fn t004() {
    let drops = AtomicUsize::new(0);
    let guard = DropCounter(&drops);
    let mut gate = Gate::new();

    unsafe {
        gate.arm(&guard);
        let strong = gate.strong(&guard).unwrap();
        drop(strong);
        gate.disarm();
    }

    // Observers came and went without touching the value.
    assert!(drops.load(Relaxed) == 0);
    drop(guard);
    assert!(drops.load(Relaxed) == 1);
}

#[test]
fn t005() {
    let value = AtomicU32::new(0);
    let released = AtomicBool::new(false);
    let mut gate = Gate::new();

    unsafe { gate.arm(&value) };
    let held = unsafe { gate.strong(&value) }.unwrap();

    crossbeam::thread::scope(|scope| {
        let released = &released;
        scope.spawn(move |_| {
            held.get().store(5, Relaxed);
            thread::sleep(Duration::from_millis(50));
            released.store(true, Release);
            drop(held);
        });

        // Blocks until the worker lets go; everything it wrote before the
        // release is visible afterwards.
        gate.disarm();
        assert!(released.load(Acquire));
        assert!(value.load(Relaxed) == 5);
    })
    .unwrap();
}

#[test]
fn t006() {
    const WORKERS: usize = 8;
    const ATTEMPTS: usize = 4_000;

    let hits = AtomicUsize::new(0);
    let misses = AtomicUsize::new(0);
    let mut cell = Gated::new(AtomicUsize::new(0));
    let weak = cell.weak().unwrap();

    crossbeam::thread::scope(|scope| {
        for _ in 0..WORKERS {
            let weak = weak.clone();
            let hits = &hits;
            let misses = &misses;
            scope.spawn(move |_| {
                for _ in 0..ATTEMPTS {
                    match weak.upgrade() {
                        Some(strong) => {
                            strong.get().fetch_add(1, Relaxed);
                            hits.fetch_add(1, Relaxed);
                        }
                        None => {
                            misses.fetch_add(1, Relaxed);
                        }
                    }
                }
            });
        }

        thread::sleep(Duration::from_millis(5));
        cell.reset();
        assert!(weak.upgrade().is_none());
    })
    .unwrap();

    // Every attempt either pinned the value or found it expired.
    assert!(hits.load(Relaxed) + misses.load(Relaxed) == WORKERS * ATTEMPTS);
}

#[test]
fn t007() {
    let pushes = AtomicUsize::new(0);
    let mut cell = Gated::new(Mutex::new(Vec::new()));
    let weak = cell.weak().unwrap();

    crossbeam::thread::scope(|scope| {
        let pushes = &pushes;
        let weak = weak.clone();
        scope.spawn(move |_| {
            let mut item = 0u32;
            while let Some(strong) = weak.upgrade() {
                strong.get().lock().unwrap().push(item);
                pushes.fetch_add(1, Relaxed);
                item += 1;
            }
        });

        thread::sleep(Duration::from_millis(10));
        cell.reset();

        // Once reset returns the worker cannot pin the value again, so the
        // push counter has settled.
        let settled = pushes.load(Relaxed);
        thread::sleep(Duration::from_millis(10));
        assert!(pushes.load(Relaxed) == settled);
    })
    .unwrap();
}

#[test]
fn t008() {
    let value = 3u64;
    let mut gate = Gate::new();

    unsafe {
        gate.arm(&value);

        let mut retainer = Retainer::new(gate.strong(&value).unwrap());
        assert!(retainer.is_armed());

        let observer = retainer.strong(&value).unwrap();
        assert!(observer.strong_count() == 3);

        let second = retainer.clone();
        assert!(observer.strong_count() == 4);
        drop(second);

        let weak = retainer.weak(&value).unwrap();
        drop(observer);

        retainer.reset();
        assert!(!retainer.is_armed());
        assert!(retainer.strong(&value).is_none());

        // The gate's own count still keeps the value pinned.
        assert!(weak.upgrade().unwrap().get() == &3);

        gate.disarm();
        assert!(weak.upgrade().is_none());

        let empty = Retainer::empty();
        assert!(!empty.is_armed());
        assert!(empty.strong(&value).is_none());
        assert!(empty.weak(&value).is_none());
    }
}

#[test]
fn t009() {
    let mut cell = Gated::new(0u64);
    let weak = cell.weak().unwrap();

    crossbeam::thread::scope(|scope| {
        scope.spawn(|_| {
            // Promote and release as fast as possible while the owner
            // tears down.
            while let Some(strong) = weak.upgrade() {
                assert!(strong.get() == &0);
            }
        });

        thread::sleep(Duration::from_millis(10));
        cell.reset();
    })
    .unwrap();

    assert!(weak.upgrade().is_none());
}

#[test]
fn t010() {
    let word = mem::size_of::<usize>();

    #[cfg(not(feature = "compressed"))]
    assert!(mem::size_of::<Retainer>() == 2 * word);
    #[cfg(feature = "compressed")]
    assert!(mem::size_of::<Retainer>() == word);

    assert!(mem::size_of::<crate::Strong<u64>>() == 2 * word);
    assert!(mem::size_of::<Option<crate::Strong<u64>>>() == 2 * word);
}

#[test]
fn t011() {
    let mut cell: Gated<String> = Gated::empty();
    assert!(!cell.has_value());
    assert!(cell.weak().is_none());
    assert!(cell.strong().is_none());
    assert!(cell.as_ptr().is_null());

    cell.set(String::from("a"));
    let weak = cell.weak().unwrap();
    assert!(cell.get().unwrap() == "a");

    let value = cell.take().unwrap();
    assert!(value == "a");
    assert!(!cell.has_value());
    assert!(weak.upgrade().is_none());

    cell.set(String::from("b"));
    assert!(cell.get().unwrap() == "b");
    assert!(weak.upgrade().is_none());
}

#[test]
fn t012() {
    let drops = AtomicUsize::new(0);
    let torn_down = AtomicBool::new(false);
    let mut cell = Gated::new(DropCounter(&drops));
    let weak = cell.weak().unwrap();

    crossbeam::thread::scope(|scope| {
        let strong = cell.strong().unwrap();
        let drops = &drops;
        let torn_down = &torn_down;
        scope.spawn(move |_| {
            thread::sleep(Duration::from_millis(50));
            // The owner is parked in `reset`; the value must still exist.
            assert!(!torn_down.load(Acquire));
            assert!(drops.load(Relaxed) == 0);
            drop(strong);
        });

        cell.reset();
        torn_down.store(true, Release);
    })
    .unwrap();

    // Disarm finished strictly before the value was destroyed.
    assert!(drops.load(Relaxed) == 1);
    assert!(weak.upgrade().is_none());
}

#[test]
fn t013() {
    let value = AtomicUsize::new(0);
    let stopped = AtomicBool::new(false);
    let mut gate = Gate::new();
    unsafe { gate.arm(&value) };

    crossbeam::thread::scope(|scope| {
        let gate = &gate;
        let value = &value;
        let stopped = &stopped;
        scope.spawn(move |_| {
            // Mint straight off the shared gate while the owner tears it
            // down. Mints that win the race pin the value; the first losing
            // mint means the teardown has claimed the gate for good.
            while let Some(strong) = unsafe { gate.strong(value) } {
                strong.get().fetch_add(1, Relaxed);
            }

            assert!(unsafe { gate.weak(value) }.is_none());
            assert!(!gate.is_armed());
            stopped.store(true, Release);
        });

        thread::sleep(Duration::from_millis(5));
        gate.disarm();
    })
    .unwrap();

    assert!(stopped.load(Acquire));
}
