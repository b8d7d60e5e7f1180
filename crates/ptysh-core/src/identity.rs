//! Target identity for the privilege drop.
//!
//! An identity is given either as a numeric uid or as a login name and is
//! resolved against the system user database into the uid/gid pair, home
//! directory and login name the child should run as.

use nix::unistd::{Gid, Uid, User};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{PtyshError, PtyshResult};

/// The user a spawned child should run as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetIdentity {
    /// Numeric user id.
    Uid(u32),
    /// Login name.
    Name(String),
}

impl TargetIdentity {
    /// Parse an identity. All-digit input is a uid, anything else a name.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(uid) = s.parse::<u32>() {
                return TargetIdentity::Uid(uid);
            }
        }
        TargetIdentity::Name(s.to_string())
    }

    /// Look the identity up in the user database.
    ///
    /// A uid is looked up by uid, so its gid comes from the uid's own
    /// passwd entry and never from a name lookup.
    pub fn resolve(&self) -> PtyshResult<ResolvedIdentity> {
        let user = match self {
            TargetIdentity::Uid(uid) => User::from_uid(Uid::from_raw(*uid))?,
            TargetIdentity::Name(name) => User::from_name(name)?,
        };
        let user = user.ok_or_else(|| PtyshError::Other(format!("unknown user: {self}")))?;
        Ok(ResolvedIdentity {
            uid: user.uid,
            gid: user.gid,
            name: user.name,
            home: user.dir,
        })
    }
}

impl FromStr for TargetIdentity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TargetIdentity::parse(s))
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetIdentity::Uid(uid) => write!(f, "{uid}"),
            TargetIdentity::Name(name) => f.write_str(name),
        }
    }
}

/// A target identity after user database lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub uid: Uid,
    pub gid: Gid,
    /// Login name, also the seed for supplementary groups.
    pub name: String,
    pub home: PathBuf,
}
