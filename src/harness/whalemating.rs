use std::{
    io,
    sync::atomic::{AtomicUsize, Ordering::SeqCst},
    thread,
};

use tracing::{debug, info, warn};

use super::{random_yielder, report_failure, report_success};
use crate::{
    config::HarnessConfig,
    error::HarnessError,
    sync::Mutex,
    synchprobs::{MatingObserver, Whalemating},
};

/// Counts every step and remembers the first whale that got ahead of the matchmakers
struct PairingCheck {
    males: AtomicUsize,
    females: AtomicUsize,
    matchmakers_started: AtomicUsize,
    matchmakers: AtomicUsize,
    violation: Mutex<Option<(&'static str, usize, usize)>>,
    max_yield: u32,
}

impl PairingCheck {
    fn new(max_yield: u32) -> Self {
        Self {
            males: AtomicUsize::new(0),
            females: AtomicUsize::new(0),
            matchmakers_started: AtomicUsize::new(0),
            matchmakers: AtomicUsize::new(0),
            violation: Mutex::new(None),
            max_yield,
        }
    }

    fn ended(&self, role: &'static str, counter: &AtomicUsize) {
        let ended = counter.fetch_add(1, SeqCst) + 1;
        // the semaphore gives us happens-before with the matchmaker that released us
        let started = self.matchmakers_started.load(SeqCst);
        if ended > started {
            let mut violation = self.violation.lock();
            if violation.is_none() {
                *violation = Some((role, ended, started));
            }
        }
    }
}

impl MatingObserver for PairingCheck {
    fn male_start(&self, index: u32) {
        debug!(index, "male starts");
        random_yielder(self.max_yield);
    }
    fn male_end(&self, index: u32) {
        self.ended("male", &self.males);
        debug!(index, "male proceeds");
    }
    fn female_start(&self, index: u32) {
        debug!(index, "female starts");
        random_yielder(self.max_yield);
    }
    fn female_end(&self, index: u32) {
        self.ended("female", &self.females);
        debug!(index, "female proceeds");
    }
    fn matchmaker_start(&self, index: u32) {
        self.matchmakers_started.fetch_add(1, SeqCst);
        debug!(index, "matchmaker starts");
    }
    fn matchmaker_end(&self, index: u32) {
        self.matchmakers.fetch_add(1, SeqCst);
        debug!(index, "matchmaker ends");
    }
}

/// Whales of both kinds and matchmakers, `whales` of each, all at once
pub fn sp1(config: &HarnessConfig) -> Result<(), HarnessError> {
    sp1_with(config, |role, i| Ok(thread::Builder::new().name(format!("{role}{i}"))))
}

/// `fork` hands out the builder for every thread about to be spawned
fn sp1_with(
    config: &HarnessConfig,
    fork: impl Fn(&'static str, u32) -> io::Result<thread::Builder>,
) -> Result<(), HarnessError> {
    const TEST: &str = "sp1";
    info!("{TEST} starting...");

    let wm = Whalemating::with_observer(PairingCheck::new(config.max_yield))?;

    thread::scope(|s| {
        let wm = &wm;
        let roles: [(&'static str, fn(&Whalemating<PairingCheck>, u32)); 3] = [
            ("male", Whalemating::<PairingCheck>::male),
            ("female", Whalemating::<PairingCheck>::female),
            ("matchmaker", Whalemating::<PairingCheck>::matchmaker),
        ];
        // males, females, matchmakers
        let mut spawned = [0u32; 3];
        for i in 0..config.whales {
            for (slot, (role, work)) in roles.into_iter().enumerate() {
                let forked = fork(role, i)
                    .and_then(|builder| builder.spawn_scoped(s, move || work(wm, i)).map(drop));
                if let Err(source) = forked {
                    // the scope joins whales already out there, they need their matchmakers
                    let [males, females, matchmakers] = spawned;
                    let stranded = males.max(females).saturating_sub(matchmakers);
                    warn!(role, index = i, stranded, "fork failed, matching the stranded whales");
                    for _ in 0..stranded {
                        wm.matchmaker(i);
                    }
                    return Err(HarnessError::Spawn {
                        test: TEST,
                        role,
                        source,
                    });
                }
                spawned[slot] += 1;
            }
        }
        Ok(())
    })?;

    let check = wm.cleanup();
    let result = verify(TEST, config.whales as usize, &check);
    match &result {
        Ok(()) => report_success(TEST),
        Err(err) => report_failure(TEST, err),
    }
    result
}

fn verify(test: &'static str, expected: usize, check: &PairingCheck) -> Result<(), HarnessError> {
    if let Some((role, ended, matchmakers)) = *check.violation.lock() {
        return Err(HarnessError::Pairing {
            test,
            role,
            ended,
            matchmakers,
        });
    }
    for (role, counter) in [
        ("male", &check.males),
        ("female", &check.females),
        ("matchmaker", &check.matchmakers),
    ] {
        let got = counter.load(SeqCst);
        if got != expected {
            return Err(HarnessError::Incomplete {
                test,
                role,
                expected,
                got,
            });
        }
    }
    Ok(())
}
