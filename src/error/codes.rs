/// Error code registry
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 3000-3999: Storage and ledger errors
/// - 4000-4999: Execution errors
/// - 5000-5999: Workflow errors
/// - 7000-7999: Validation errors
/// - 9000-9999: Other errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_YAML: u16 = 1002;
    pub const CONFIG_INVALID_JSON: u16 = 1003;
    pub const CONFIG_MISSING_REQUIRED: u16 = 1004;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;
    pub const CONFIG_PARSE_ERROR: u16 = 1007;
    pub const CONFIG_UNKNOWN_HOOK: u16 = 1010;

    // Storage errors (3000-3999)
    pub const STORAGE_GENERIC: u16 = 3000;
    pub const STORAGE_IO_ERROR: u16 = 3001;
    pub const STORAGE_PERMISSION_DENIED: u16 = 3002;
    pub const STORAGE_NOT_FOUND: u16 = 3004;
    pub const STORAGE_ALREADY_EXISTS: u16 = 3005;
    pub const STORAGE_CORRUPTED: u16 = 3006;
    pub const STORAGE_SERIALIZATION_ERROR: u16 = 3011;
    pub const STORAGE_LOCK_TIMEOUT: u16 = 3012;
    pub const STORAGE_INVALID_TRANSITION: u16 = 3020;

    // Execution errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 4003;
    pub const EXEC_SIGNAL_RECEIVED: u16 = 4005;
    pub const EXEC_SPAWN_FAILED: u16 = 4007;
    pub const EXEC_OUTPUT_ERROR: u16 = 4008;
    pub const EXEC_REMOTE_UNREACHABLE: u16 = 4011;

    // Workflow errors (5000-5999)
    pub const WORKFLOW_GENERIC: u16 = 5000;
    pub const WORKFLOW_NOT_FOUND: u16 = 5001;
    pub const WORKFLOW_MODULE_NOT_FOUND: u16 = 5013;
    pub const WORKFLOW_HOOK_FAILED: u16 = 5014;

    // Validation errors (7000-7999)
    pub const VALIDATION_GENERIC: u16 = 7000;
    pub const VALIDATION_REQUIRED_FIELD: u16 = 7001;
    pub const VALIDATION_OUT_OF_RANGE: u16 = 7003;
    pub const VALIDATION_INVALID_FORMAT: u16 = 7005;
    pub const VALIDATION_INVALID_INPUT: u16 = 7008;
    pub const VALIDATION_INVALID_DATA: u16 = 7009;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        1000 => "Generic configuration error",
        1001 => "Configuration file not found",
        1002 => "Invalid YAML syntax in configuration",
        1003 => "Invalid JSON syntax in configuration",
        1004 => "Required configuration field is missing",
        1005 => "Invalid value in configuration",
        1007 => "Failed to parse configuration",
        1010 => "Command catalog references an unregistered hook",

        3000 => "Generic storage error",
        3001 => "Storage I/O error",
        3002 => "Storage permission denied",
        3004 => "Storage item not found",
        3005 => "Storage item already exists",
        3006 => "Storage data is corrupted",
        3011 => "Storage serialization error",
        3012 => "Timed out waiting for a storage lock",
        3020 => "Activity status transition not allowed",

        4000 => "Generic execution error",
        4002 => "Command execution timeout",
        4003 => "Subprocess failed",
        4005 => "Command received signal",
        4007 => "Failed to spawn subprocess",
        4008 => "Command output error",
        4011 => "Remote executor unreachable",

        5000 => "Generic workflow error",
        5001 => "Workflow not found",
        5013 => "Workflow references an unknown module",
        5014 => "Workflow hook failed",

        7000 => "Generic validation error",
        7001 => "Required field is missing",
        7003 => "Value out of range",
        7005 => "Invalid format",
        7008 => "Invalid input",
        7009 => "Invalid data",

        9000 => "Generic error",

        _ => "Unknown error code",
    }
}
