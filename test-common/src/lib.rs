mod mock;

pub use mock::*;

use log::LevelFilter;

/// Initialize logging for tests.
pub fn init() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(LevelFilter::Debug)
        .try_init();
}
