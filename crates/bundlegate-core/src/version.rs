// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of BundleGate.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Version parsing and semantic-version precedence
//!
//! Both bundle versions and host app versions go through [`parse_version`].
//! Short forms such as `"1.5"` are accepted and padded with zeros, so `"1.5"`
//! and `"1.5.0"` name the same version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Numeric(u64),
    Alphanumeric(String),
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::Alphanumeric(_)) => Ordering::Less,
            (Self::Alphanumeric(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Alphanumeric(a), Self::Alphanumeric(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Alphanumeric(s) => f.write_str(s),
        }
    }
}

/// A parsed semantic version.
///
/// `Ord` is total: precedence first, then build metadata, so two distinct
/// canonical strings never compare equal. Use [`Version::precedence_cmp`] for
/// "is newer than" questions, where build metadata must not count.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<Identifier>,
    pub build: Vec<String>,
}

impl Version {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Semantic-versioning precedence; build metadata is ignored.
    #[must_use]
    pub fn precedence_cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }

    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.precedence_cmp(other) == Ordering::Greater
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_cmp(other)
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some((first, rest)) = self.pre.split_first() {
            write!(f, "-{first}")?;
            for id in rest {
                write!(f, ".{id}")?;
            }
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_version(s)
    }
}

/// Parse a version string (e.g. "1.5", "v2.0.1", "1.0.0-beta.2+build.7")
pub fn parse_version(input: &str) -> Result<Version> {
    let trimmed = input.trim();
    let s = trimmed
        .strip_prefix(|c: char| c == 'v' || c == 'V')
        .unwrap_or(trimmed);

    if s.is_empty() {
        return Err(invalid(input, "empty version"));
    }

    let (rest, build) = match s.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (s, None),
    };
    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };

    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 {
        return Err(invalid(input, "expected at most MAJOR.MINOR.PATCH"));
    }

    let mut numbers = [0_u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = parse_numeric(part).ok_or_else(|| invalid(input, "bad numeric component"))?;
    }

    let pre = match pre {
        Some(pre) => pre
            .split('.')
            .map(|id| parse_identifier(id).ok_or_else(|| invalid(input, "bad pre-release")))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let build = match build {
        Some(build) => build
            .split('.')
            .map(|id| {
                if is_identifier(id) {
                    Ok(id.to_owned())
                } else {
                    Err(invalid(input, "bad build metadata"))
                }
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let [major, minor, patch] = numbers;
    Ok(Version {
        major,
        minor,
        patch,
        pre,
        build,
    })
}

/// Parse an optional version where an empty or blank string means "none".
pub fn parse_optional_version(input: Option<&str>) -> Result<Option<Version>> {
    match input.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_version(s).map(Some),
    }
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::Validation(format!("invalid version {input:?}: {reason}"))
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn parse_numeric(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

fn parse_identifier(s: &str) -> Option<Identifier> {
    if !is_identifier(s) {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        parse_numeric(s).map(Identifier::Numeric)
    } else {
        Some(Identifier::Alphanumeric(s.to_owned()))
    }
}
