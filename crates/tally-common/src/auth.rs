//! Trusted-subnet access control.
//!
//! Mutating calls carry the caller's address in `X-Real-IP` (HTTP) or the
//! `x-real-ip` metadata entry (RPC). When a subnet is configured that
//! address must parse and fall inside it.

use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::protocol::error::{Result, TallyError};

/// A CIDR allow-list for mutating requests.
///
/// # Example
///
/// ```
/// use tally_common::TrustedSubnet;
///
/// let subnet: TrustedSubnet = "192.168.1.0/24".parse().unwrap();
/// assert!(subnet.check(Some("192.168.1.20")).is_ok());
/// assert!(subnet.check(Some("10.0.0.1")).is_err());
/// assert!(subnet.check(None).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedSubnet {
    net: IpNet,
}

impl TrustedSubnet {
    pub fn new(net: IpNet) -> Self {
        Self { net }
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.net.contains(ip)
    }

    /// Validates a caller-supplied address.
    ///
    /// # Errors
    ///
    /// [`TallyError::Forbidden`] when the address is missing, unparsable or
    /// outside the subnet.
    pub fn check(&self, real_ip: Option<&str>) -> Result<()> {
        let raw = real_ip
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TallyError::Forbidden("missing real ip".to_string()))?;

        let ip: IpAddr = raw
            .parse()
            .map_err(|_| TallyError::Forbidden(format!("invalid real ip '{}'", raw)))?;

        if self.contains(&ip) {
            Ok(())
        } else {
            Err(TallyError::Forbidden(format!("{} is outside {}", ip, self.net)))
        }
    }
}

impl FromStr for TrustedSubnet {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        let net = s
            .trim()
            .parse::<IpNet>()
            .map_err(|e| TallyError::Validation(format!("invalid CIDR '{}': {}", s, e)))?;
        Ok(Self::new(net))
    }
}

impl fmt::Display for TrustedSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.net)
    }
}
