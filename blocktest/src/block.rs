//! Façade for the `gluster-block` CLI.
//!
//! Translates structured arguments into `gluster-block` invocations on the management node and
//! parses the replies (requested with `--json-plain`) into typed values.

mod client;
mod reply;

pub use client::*;
pub use reply::{BlockInfo, check as check_reply};

use crate::error::CliFailure;
use shared::{Gbid, HaCount};
use std::fmt::Display;
use std::str::FromStr;

/// Authentication mode of a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Enable,
    Disable,
    /// Passed to the CLI verbatim. Allows checking that `gluster-block` rejects invalid values.
    Other(String),
}

impl AuthMode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Other(s) => s,
        }
    }
}

impl FromStr for AuthMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "enable" => Self::Enable,
            "disable" => Self::Disable,
            other => Self::Other(other.to_string()),
        })
    }
}

impl Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preallocation of the backing file on create
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prealloc {
    Full,
    No,
}

impl Prealloc {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::No => "no",
        }
    }
}

/// Whether deleting a block also removes its backing file from the volume
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnlinkStorage {
    Yes,
    No,
}

impl UnlinkStorage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

/// Optional arguments of `gluster-block create`. Unset options are left to the CLI defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockOptions {
    pub ha: Option<HaCount>,
    pub auth: Option<AuthMode>,
    pub prealloc: Option<Prealloc>,
    /// Reuse the backing file of this GBID instead of allocating new storage
    pub storage: Option<Gbid>,
    /// Ring buffer size in MiB
    pub ring_buffer: Option<u32>,
}

impl BlockOptions {
    pub fn with_ha(ha: u32) -> Self {
        Self {
            ha: Some(ha.into()),
            ..Default::default()
        }
    }

    pub fn auth(mut self, auth: AuthMode) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn prealloc(mut self, prealloc: Prealloc) -> Self {
        self.prealloc = Some(prealloc);
        self
    }

    pub fn storage(mut self, gbid: Gbid) -> Self {
        self.storage = Some(gbid);
        self
    }

    pub fn ring_buffer(mut self, mib: u32) -> Self {
        self.ring_buffer = Some(mib);
        self
    }
}

/// Optional arguments of `gluster-block delete`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Left to the CLI default (`yes`) if not set
    pub unlink_storage: Option<UnlinkStorage>,
    pub force: bool,
}

impl DeleteOptions {
    pub fn unlink(unlink: UnlinkStorage) -> Self {
        Self {
            unlink_storage: Some(unlink),
            force: false,
        }
    }
}

/// The result of a block creation that didn't fail for infrastructure reasons.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    Rejected(Rejection),
}

impl CreateOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Why a block creation was refused
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Block size is empty and no storage to reuse is given")]
    EmptySize,
    #[error("HA count {ha} does not match the {servers} given servers")]
    HaMismatch { ha: HaCount, servers: usize },
    #[error(transparent)]
    Cli(#[from] CliFailure),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn auth_mode_strings() {
        assert_eq!("enable".parse::<AuthMode>().unwrap(), AuthMode::Enable);
        assert_eq!("disable".parse::<AuthMode>().unwrap(), AuthMode::Disable);
        assert_eq!(
            "yes-no".parse::<AuthMode>().unwrap(),
            AuthMode::Other("yes-no".into())
        );
        assert_eq!(AuthMode::Other("yes-no".into()).to_string(), "yes-no");
    }

    #[test]
    fn options_builder() {
        let opts = BlockOptions::with_ha(3)
            .auth(AuthMode::Enable)
            .prealloc(Prealloc::Full)
            .ring_buffer(32);

        assert_eq!(opts.ha, Some(HaCount::from(3)));
        assert_eq!(opts.auth, Some(AuthMode::Enable));
        assert_eq!(opts.prealloc, Some(Prealloc::Full));
        assert_eq!(opts.storage, None);
        assert_eq!(opts.ring_buffer, Some(32));
    }
}
