pub const OK_RESPONSE: &str = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n";
pub const BAD_REQUEST: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: application/json\r\n\r\n";
pub const UNAUTHORIZED: &str = "HTTP/1.1 401 Unauthorized\r\n\r\n";
pub const NOT_FOUND: &str = "HTTP/1.1 404 NOT FOUND\r\nContent-Type: application/json\r\n\r\n";
pub const INTERNAL_ERROR: &str = "HTTP/1.1 500 INTERNAL ERROR\r\nContent-Type: application/json\r\n\r\n";
pub const REQUEST_TIMEOUT: &str = "HTTP/1.1 408 Request Timeout\r\n\r\n";

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7879";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DB_MIN_CONNECTIONS: u32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LEDGER_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LEDGER_RETRY_BACKOFF_MS: u64 = 10;
pub const DEFAULT_LEDGER_COMMIT_WAIT_MS: u64 = 2_000;

/// Upper bound on a buffered request (head + body).
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;
