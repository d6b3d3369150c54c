use std::time::Duration;

pub const APP_NAME: &str = "sharedstate";

/// File name used when a caller does not pick one.
pub const DEFAULT_VALUE_FILENAME: &str = "shared_stats.json";

/// Appended to the value path to derive the lock path.
pub const LOCK_SUFFIX: &str = ".lock";

/// Appended to the value path to derive the previous-value backup path.
pub const BACKUP_SUFFIX: &str = ".bak";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Version of the diagnostic metadata written into lock tokens.
pub const LOCK_METADATA_VERSION: u32 = 1;
