// Integration tests for the visa watcher
//
// These verify that the components work together across complete check
// cycles, using a scripted page capability instead of a live browser.

mod integration;

use integration::*;
use visa_watcher::scheduler::PollingScheduler;

#[test]
fn test_configuration_is_usable() {
    // The shared test configuration passes the same validation the binary
    // runs at startup.
    let config = test_config();
    assert!(config.validate().is_ok());
    assert_eq!(config.security_question_bank().answerable_count(), 2);
}

#[test]
fn test_interval_jitter_stays_inside_configured_bounds() {
    let config = test_config();
    for _ in 0..100 {
        let delay = PollingScheduler::jittered_delay(
            config.schedule.check_interval_min,
            config.schedule.check_interval_max,
        );
        assert!(delay.as_secs() >= config.schedule.check_interval_min * 60);
        assert!(delay.as_secs() <= config.schedule.check_interval_max * 60);
    }
}
