use std::{
    sync::atomic::{
        AtomicU64, AtomicUsize,
        Ordering::Relaxed,
    },
    thread,
};

use tracing::{info, warn};

use super::{random_yielder, report_failure, report_success};
use crate::{
    config::HarnessConfig,
    error::HarnessError,
    sync::{RwLock, Semaphore},
};

/// State shared by the rwt1 workers. The value itself is only ever touched under the lock,
/// the atomics just keep the harness free of `unsafe`.
struct Shared<'a> {
    lock: &'a RwLock,
    donesem: &'a Semaphore,
    val: AtomicU64,
    mismatches: AtomicUsize,
    read_loops: u32,
    max_yield: u32,
}

impl Shared<'_> {
    fn reader(&self) {
        random_yielder(self.max_yield);

        self.lock.acquire_read();
        let stored = self.val.load(Relaxed);
        for _ in 0..self.read_loops {
            random_yielder(self.max_yield);
            if self.val.load(Relaxed) != stored {
                self.mismatches.fetch_add(1, Relaxed);
                break;
            }
        }
        self.lock.release_read();

        self.donesem.signal();
    }

    fn writer(&self, num: u64) {
        self.lock.acquire_write();
        random_yielder(self.max_yield);
        self.val.store(num, Relaxed);
        self.lock.release_write();

        self.donesem.signal();
    }
}

/// Readers and writers hammer one lock, every reader re-checks the value it saw on
/// acquiring all the way until it releases.
pub fn rwt1(config: &HarnessConfig) -> Result<(), HarnessError> {
    const TEST: &str = "rwt1";
    info!("{TEST} starting...");

    // creation must be repeatable, keep the last pair
    for _ in 1..config.create_loops {
        RwLock::create("testrwlock")?.destroy();
        Semaphore::create("donesem", 0)?.destroy();
    }
    let lock = RwLock::create("testrwlock")?;
    let donesem = Semaphore::create("donesem", 0)?;

    let shared = Shared {
        lock: &lock,
        donesem: &donesem,
        val: AtomicU64::new(0),
        mismatches: AtomicUsize::new(0),
        read_loops: config.read_loops,
        max_yield: config.max_yield,
    };

    lock.acquire_write();
    shared.val.store(10, Relaxed);
    lock.release_write();

    thread::scope(|s| {
        let shared = &shared;
        for i in 0..config.threads {
            thread::Builder::new()
                .name(format!("rwtest{i}"))
                .spawn_scoped(s, move || shared.reader())
                .map_err(|source| HarnessError::Spawn {
                    test: TEST,
                    role: "reader",
                    source,
                })?;
            thread::Builder::new()
                .name(format!("writetest{i}"))
                .spawn_scoped(s, move || shared.writer(u64::from(i)))
                .map_err(|source| HarnessError::Spawn {
                    test: TEST,
                    role: "writer",
                    source,
                })?;
        }

        for i in 0..config.write_loops {
            lock.acquire_write();
            shared.val.store(u64::from(i), Relaxed);
            lock.release_write();
        }

        for _ in 0..config.threads * 2 {
            donesem.wait();
        }
        Ok::<_, HarnessError>(())
    })?;

    let mismatches = shared.mismatches.load(Relaxed);
    lock.destroy();
    donesem.destroy();

    if mismatches > 0 {
        let err = HarnessError::ReadMismatch {
            test: TEST,
            mismatches,
        };
        report_failure(TEST, &err);
        return Err(err);
    }
    report_success(TEST);
    Ok(())
}

/// Release write when not held. Passes only by panicking.
pub fn rwt2() -> Result<(), HarnessError> {
    const TEST: &str = "rwt2";

    let lock = RwLock::create("testrwlock")?;
    warn!("{TEST} should panic now");
    lock.release_write();

    let err = HarnessError::MisuseTolerated { test: TEST };
    report_failure(TEST, &err);
    Err(err)
}

/// Release read when there're no readers. Passes only by panicking.
pub fn rwt3() -> Result<(), HarnessError> {
    const TEST: &str = "rwt3";

    let lock = RwLock::create("testrwlock")?;
    warn!("{TEST} should panic now");
    lock.release_read();

    let err = HarnessError::MisuseTolerated { test: TEST };
    report_failure(TEST, &err);
    Err(err)
}

/// Release read on a worker thread. The process has to die with the worker, a caught
/// panic means the next thread would go on using the lock.
pub fn rwt4() -> Result<(), HarnessError> {
    const TEST: &str = "rwt4";

    let lock = RwLock::create("testrwlock")?;
    warn!("{TEST} should abort now");
    thread::scope(|s| {
        let _ = s.spawn(|| lock.release_read()).join();
    });

    let err = HarnessError::MisuseTolerated { test: TEST };
    report_failure(TEST, &err);
    Err(err)
}

/// Release write held by the main thread from a worker thread
pub fn rwt5() -> Result<(), HarnessError> {
    const TEST: &str = "rwt5";

    let lock = RwLock::create("testrwlock")?;
    lock.acquire_write();
    warn!("{TEST} should abort now");
    thread::scope(|s| {
        let _ = s.spawn(|| lock.release_write()).join();
    });
    lock.release_write();

    let err = HarnessError::MisuseTolerated { test: TEST };
    report_failure(TEST, &err);
    Err(err)
}
