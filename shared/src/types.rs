//! Basic type definitions for addressing cluster hosts and blocks.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::str::FromStr;

/// A cluster host, given as hostname or IP address.
///
/// Used as ssh destination as well as in `gluster-block` host lists, so it must not contain
/// whitespace or commas.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Host(String);

impl Host {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the host refers to the local machine.
    pub fn is_local(&self) -> bool {
        matches!(self.0.as_str(), "localhost" | "127.0.0.1" | "::1")
    }
}

impl TryFrom<String> for Host {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            anyhow::bail!("Host name must not be empty");
        }

        if value.chars().any(|c| c.is_whitespace() || c == ',' || c == '/') {
            anyhow::bail!("Invalid host name {value:?}");
        }

        Ok(Self(value))
    }
}

impl FromStr for Host {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.to_string().try_into()
    }
}

impl From<Host> for String {
    fn from(value: Host) -> Self {
        value.0
    }
}

impl Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The gluster block identifier, naming the backing file of a block in the volumes `block-store`
/// directory.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gbid(String);

impl Gbid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Gbid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Gbid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for Gbid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The number of servers exporting a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HaCount(u32);

impl HaCount {
    pub fn get(self) -> u32 {
        self.0
    }

    /// Whether exactly `count` servers satisfy this HA count.
    pub fn matches(self, count: usize) -> bool {
        usize::try_from(self.0).is_ok_and(|ha| ha == count)
    }
}

impl From<u32> for HaCount {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<HaCount> for u32 {
    fn from(value: HaCount) -> u32 {
        value.0
    }
}

impl Display for HaCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn host_validation() {
        assert_eq!("192.168.1.10".parse::<Host>().unwrap().as_str(), "192.168.1.10");
        assert!("localhost".parse::<Host>().unwrap().is_local());
        assert!(!"server1".parse::<Host>().unwrap().is_local());

        assert!("".parse::<Host>().is_err());
        assert!("a,b".parse::<Host>().is_err());
        assert!("a b".parse::<Host>().is_err());
    }

    #[test]
    fn ha_matches() {
        assert!(HaCount::from(3).matches(3));
        assert!(!HaCount::from(3).matches(2));
        assert!(HaCount::from(1).matches(1));
    }
}
