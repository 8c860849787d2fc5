use crate::addr::UNIX_PATH_MAX;

/// Per-namespace tunables. Unset fields take the defaults below.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixConfig {
    /// Longest bind name kept; longer names are truncated. Default `UNIX_PATH_MAX`.
    pub max_name_len: Option<usize>,
    /// Bytes each pipe can hold. Default 64 KiB.
    pub pipe_capacity: Option<usize>,
    /// Upper bound for `listen()` backlogs. Default `SOMAXCONN`.
    pub max_backlog: Option<usize>,
}

pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Resolved values of a `UnixConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_name_len: usize,
    pub pipe_capacity: usize,
    pub max_backlog: usize,
}

impl Limits {
    pub fn from_config(config: Option<&UnixConfig>) -> Self {
        Limits {
            max_name_len: config
                .and_then(|cfg| cfg.max_name_len)
                .unwrap_or(UNIX_PATH_MAX)
                .clamp(1, UNIX_PATH_MAX),
            pipe_capacity: config
                .and_then(|cfg| cfg.pipe_capacity)
                .unwrap_or(DEFAULT_PIPE_CAPACITY)
                .max(1),
            max_backlog: config
                .and_then(|cfg| cfg.max_backlog)
                .unwrap_or(libc::SOMAXCONN as usize)
                .max(1),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits::from_config(None)
    }
}
