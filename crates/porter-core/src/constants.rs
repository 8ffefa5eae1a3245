use std::time::Duration;

/// LCD geometry
pub const MAX_LCD_ROWS: usize = 2;
pub const MAX_LCD_COLS: usize = 24;

/// Serial link
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// A terminal answers a command within this window or the connection is bad.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Handler tick cadence while the event queue is idle.
pub const IDLE_TICK: Duration = Duration::from_millis(500);

/// Re-request the terminal name every this many idle ticks.
pub const LIVENESS_PING_TICKS: u32 = 10;

/// Reconnect backoff bounds (doubles per failure).
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(2);
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Quiet period that ends the connect-time input drain.
pub const DRAIN_SILENCE: Duration = Duration::from_millis(1000);

/// Depth of the per-terminal event and response queues.
pub const QUEUE_DEPTH: usize = 10;

/// Authentication
pub const MIN_AUTH_CODE_LENGTH: usize = 6;
pub const MAX_CODE_LENGTH: usize = 32;
pub const ANONYMOUS_VALIDITY_DAYS: i64 = 30;

/// Handler timing
pub const CODE_ENTRY_TIMEOUT: Duration = Duration::from_secs(5);
pub const FEEDBACK_HOLD: Duration = Duration::from_secs(2);
pub const RFID_DEBOUNCE: Duration = Duration::from_secs(2);
pub const ENROLLMENT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
