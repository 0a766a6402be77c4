//! Value types shared by requests and topologies.

use crate::error::{Error, Result};
use declarative::{Input, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

/// An IP range in CIDR notation, e.g. `203.0.113.5/32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    addr: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// `10.128.0.0/9`, where auto mode networks allocate their subnetworks
    pub const AUTO_MODE_RANGE: Self = Self {
        addr: IpAddr::V4(Ipv4Addr::new(10, 128, 0, 0)),
        prefix: 9,
    };

    /// Build a CIDR, checking the prefix length against the address family.
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self> {
        let max = if addr.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(Error::Parse {
                what: "CIDR prefix",
                value: format!("{addr}/{prefix}"),
            });
        }
        Ok(Self { addr, prefix })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }
}

impl FromStr for Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Parse {
            what: "CIDR",
            value: s.to_string(),
        };
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        Self::new(addr, prefix)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl TryFrom<String> for Cidr {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

/// IP protocol matched by a firewall rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Icmp,
    Tcp,
    Udp,
    Sctp,
    All,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Icmp => "icmp",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Sctp => "sctp",
            Self::All => "all",
        }
    }

    /// Whether rules for this protocol may list ports.
    pub fn has_ports(&self) -> bool {
        matches!(self, Self::Tcp | Self::Udp | Self::Sctp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "icmp" => Ok(Self::Icmp),
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            "all" => Ok(Self::All),
            _ => Err(Error::Parse {
                what: "protocol",
                value: s.to_string(),
            }),
        }
    }
}

/// A single port or an inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PortSpec {
    Single(u16),
    Range(u16, u16),
}

impl FromStr for PortSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Parse {
            what: "port",
            value: s.to_string(),
        };
        let s = s.trim();
        match s.split_once('-') {
            Some((start, end)) => {
                let start: u16 = start.parse().map_err(|_| invalid())?;
                let end: u16 = end.parse().map_err(|_| invalid())?;
                if start == 0 || start > end {
                    return Err(invalid());
                }
                Ok(Self::Range(start, end))
            }
            None => match s.parse::<u16>() {
                Ok(0) | Err(_) => Err(invalid()),
                Ok(port) => Ok(Self::Single(port)),
            },
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(port) => write!(f, "{port}"),
            Self::Range(start, end) => write!(f, "{start}-{end}"),
        }
    }
}

impl TryFrom<String> for PortSpec {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PortSpec> for String {
    fn from(port: PortSpec) -> Self {
        port.to_string()
    }
}

/// One allow entry of a firewall rule: a protocol and optional ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallAllow {
    pub protocol: Protocol,
    /// Empty means every port
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
}

impl FirewallAllow {
    pub fn protocol(protocol: Protocol) -> Self {
        Self {
            protocol,
            ports: Vec::new(),
        }
    }

    pub fn with_ports(protocol: Protocol, ports: impl IntoIterator<Item = PortSpec>) -> Self {
        Self {
            protocol,
            ports: ports.into_iter().collect(),
        }
    }

    /// gcloud `--allow` syntax: `icmp`, `tcp:22`, `tcp:22,tcp:30000-40000`
    pub fn to_rule_args(&self) -> Vec<String> {
        if self.ports.is_empty() || !self.protocol.has_ports() {
            vec![self.protocol.to_string()]
        } else {
            self.ports
                .iter()
                .map(|port| format!("{}:{}", self.protocol, port))
                .collect()
        }
    }

    /// Property value as stored in resource inputs
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("protocol".to_string(), Value::from(self.protocol.as_str()));
        if !self.ports.is_empty() {
            map.insert(
                "ports".to_string(),
                Value::List(self.ports.iter().map(|p| Value::from(p.to_string())).collect()),
            );
        }
        Value::Map(map)
    }
}

impl From<&FirewallAllow> for Input {
    fn from(allow: &FirewallAllow) -> Self {
        Input::Value(allow.to_value())
    }
}

/// Backoff settings for transient API failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Default::default()
        }
    }

    /// Delay before retrying after the given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// A config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_parse() {
        let cidr: Cidr = "203.0.113.5/32".parse().unwrap();
        assert_eq!(cidr.prefix(), 32);
        assert_eq!(cidr.to_string(), "203.0.113.5/32");

        let internal: Cidr = "10.128.0.0/9".parse().unwrap();
        assert!(internal.addr().is_ipv4());
        assert_eq!(internal, Cidr::AUTO_MODE_RANGE);

        assert!("2001:db8::/32".parse::<Cidr>().is_ok());
        assert!("203.0.113.5".parse::<Cidr>().is_err());
        assert!("203.0.113.5/33".parse::<Cidr>().is_err());
        assert!("not-an-ip/8".parse::<Cidr>().is_err());
    }

    #[test]
    fn test_port_spec_parse() {
        assert_eq!("22".parse::<PortSpec>().unwrap(), PortSpec::Single(22));
        assert_eq!(
            "30000-40000".parse::<PortSpec>().unwrap(),
            PortSpec::Range(30000, 40000)
        );
        assert_eq!(PortSpec::Range(30000, 40000).to_string(), "30000-40000");
        assert!("0".parse::<PortSpec>().is_err());
        assert!("40000-30000".parse::<PortSpec>().is_err());
        assert!("70000".parse::<PortSpec>().is_err());
    }

    #[test]
    fn test_protocol_parse() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert!("gre".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_rule_args() {
        let icmp = FirewallAllow::protocol(Protocol::Icmp);
        assert_eq!(icmp.to_rule_args(), vec!["icmp"]);

        let tcp = FirewallAllow::with_ports(
            Protocol::Tcp,
            [PortSpec::Single(22), PortSpec::Range(30000, 40000)],
        );
        assert_eq!(tcp.to_rule_args(), vec!["tcp:22", "tcp:30000-40000"]);
    }

    #[test]
    fn test_allow_value_decodes_back() {
        let tcp = FirewallAllow::with_ports(Protocol::Tcp, [PortSpec::Single(22)]);
        let json = serde_json::to_value(tcp.to_value()).unwrap();
        let decoded: FirewallAllow = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, tcp);
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let config = RetryConfig::new(5, Duration::from_secs(10), 2.0);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(20));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(60));
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
    }
}
