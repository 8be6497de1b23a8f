use std::fmt;

pub mod tcp_connect;

/// Why a probe did not establish a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InactiveReason {
    Timeout,
    ConnectionRefused,
    HostNotFound,
    ConnectionFailed,
}

impl InactiveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InactiveReason::Timeout => "Timeout",
            InactiveReason::ConnectionRefused => "Connection refused",
            InactiveReason::HostNotFound => "Host not found",
            InactiveReason::ConnectionFailed => "Connection failed",
        }
    }
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Active { latency_ms: u64 },
    Inactive { reason: InactiveReason },
}

impl ProbeResult {
    pub fn is_active(&self) -> bool {
        matches!(self, ProbeResult::Active { .. })
    }
}
