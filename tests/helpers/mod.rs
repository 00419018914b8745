#![allow(dead_code)]

use std::sync::Once;

use x86_oracle::{Failure, Oracle, Scenario, Toolchain};

static INIT_LOGGER: Once = Once::new();

pub fn init() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Oracle configured from `ORACLE_*` environment variables.
///
/// Tests using this are `#[ignore]`d by default, as they need nasm, a 32-bit
/// capable gcc and the engine; run them with `cargo test -- --ignored`.
pub fn oracle() -> Oracle {
    init();
    let toolchain = match Toolchain::from_env() {
        Ok(o) => o,
        Err(e) => panic!("Toolchain not configured (set ORACLE_ENGINE etc.): {}", e),
    };
    Oracle::new(toolchain).unwrap()
}

pub fn check_all(oracle: &Oracle, scenarios: &[Scenario]) {
    #[cfg(feature = "parallel")]
    let failures = oracle.check_all_parallel(scenarios);
    #[cfg(not(feature = "parallel"))]
    let failures = oracle.check_all(scenarios);
    report(&failures);
}

pub fn check_one(oracle: &Oracle, scenario: &Scenario) {
    if let Err(e) = oracle.check(scenario, 0) {
        report(&[(0, e)]);
    }
}

fn report(failures: &[(usize, Failure)]) {
    for (i, failure) in failures {
        println!("Scenario {} failed:{}\n", i, failure);
    }
    assert!(failures.is_empty(), "{} scenarios failed", failures.len());
}
