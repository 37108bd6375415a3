/// Error code registry for the prediction pipeline
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Request validation and input resolution errors
/// - 3000-3999: Persistence errors
/// - 4000-4999: Worker execution and protocol errors
/// - 5000-5999: Join stage errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_PARSE_ERROR: u16 = 1002;

    // Validation / input errors (2000-2999)
    pub const VALIDATION_REQUIRED_FIELD: u16 = 2001;
    pub const VALIDATION_INVALID_NUMBER: u16 = 2002;
    pub const VALIDATION_INPUT_SOURCE: u16 = 2003;
    pub const INPUT_NOT_FOUND: u16 = 2004;

    // Persistence errors (3000-3999)
    pub const STORAGE_IO_ERROR: u16 = 3001;
    pub const STORAGE_SERIALIZATION_ERROR: u16 = 3002;

    // Worker errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 4003;
    pub const EXEC_SIGNAL_RECEIVED: u16 = 4004;
    pub const EXEC_SPAWN_FAILED: u16 = 4005;
    pub const WORKER_PROTOCOL_VIOLATION: u16 = 4100;
    pub const WORKER_REPORTED: u16 = 4101;

    // Join errors (5000-5999)
    pub const JOIN_SOURCE_NOT_FOUND: u16 = 5001;
    pub const JOIN_IO_ERROR: u16 = 5002;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1001 => "Configuration file not found",
        1002 => "Failed to parse configuration",

        2001 => "Required request field is missing",
        2002 => "Request field is not a valid number",
        2003 => "Exactly one input source must be supplied",
        2004 => "Requested input dataset not found",

        3001 => "Result storage I/O failed",
        3002 => "Failed to serialize result record",

        4000 => "Generic worker error",
        4001 => "Worker executable not found",
        4002 => "Worker timed out",
        4003 => "Worker exited with failure and produced no output",
        4004 => "Worker terminated by signal",
        4005 => "Failed to spawn worker",
        4100 => "Worker output violated the result-line protocol",
        4101 => "Worker reported an error",

        5001 => "Join source table not found",
        5002 => "Join I/O failed",

        _ => "Unknown error code",
    }
}
