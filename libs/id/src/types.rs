//! Typed id definitions for scheduler resources.
//!
//! `AppId` and `TaskId` carry structure and are validated; the remaining
//! ids are opaque tokens minted by the cluster manager and are passed
//! through verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::IdError;

// =============================================================================
// AppId
// =============================================================================

/// Identity of an application: a user-chosen label.
///
/// Restricted to `[a-z0-9_-]` so that it can be embedded as the prefix of a
/// [`TaskId`] with `.` as an unambiguous separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppId(String);

impl AppId {
    /// Parses and validates an app id.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
        {
            return Err(IdError::InvalidAppId {
                actual: s.to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AppId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for AppId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AppId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// TaskId
// =============================================================================

/// Identity of a task: `{app_id}.{ulid}`.
///
/// The prefix encodes the owning app so that any status update can be
/// routed without a lookup; the ULID suffix is collision-resistant and
/// time-ordered, which makes task ids sortable by creation time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    app_id: AppId,
    suffix: Ulid,
}

impl TaskId {
    /// Mints a fresh task id for the given app.
    #[must_use]
    pub fn new(app_id: AppId) -> Self {
        Self {
            app_id,
            suffix: Ulid::new(),
        }
    }

    /// Parses a task id of the form `{app_id}.{ulid}`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let Some((app, suffix)) = s.split_once('.') else {
            return Err(IdError::MissingSeparator);
        };
        let app_id = AppId::parse(app)?;
        let suffix = suffix
            .parse::<Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;
        Ok(Self { app_id, suffix })
    }

    /// The app that owns this task.
    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    /// The ULID suffix.
    pub fn suffix(&self) -> Ulid {
        self.suffix
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_id, self.suffix)
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TaskId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// DeploymentId
// =============================================================================

/// Identity of one upgrade run: `dpl_{ulid}`.
///
/// Minted when an upgrade starts and carried through its log records and
/// completion events for correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeploymentId(Ulid);

impl DeploymentId {
    /// The prefix for this id type.
    pub const PREFIX: &'static str = "dpl";

    /// Mints a fresh deployment id.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parses a deployment id of the form `dpl_{ulid}`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let Some((prefix, ulid_str)) = s.split_once('_') else {
            return Err(IdError::MissingSeparator);
        };
        if prefix != Self::PREFIX {
            return Err(IdError::InvalidPrefix {
                expected: Self::PREFIX,
                actual: prefix.to_string(),
            });
        }
        let ulid = ulid_str
            .parse::<Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;
        Ok(Self(ulid))
    }
}

impl Default for DeploymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}

impl FromStr for DeploymentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// =============================================================================
// Opaque cluster-manager tokens
// =============================================================================

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw token; empty tokens are rejected.
            pub fn parse(s: &str) -> Result<Self, IdError> {
                if s.is_empty() {
                    return Err(IdError::Empty);
                }
                Ok(Self(s.to_string()))
            }

            /// Returns the token as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

opaque_id!(
    /// Identity of a resource offer, minted by the cluster manager.
    OfferId
);
opaque_id!(
    /// Identity of a cluster node (slave), minted by the cluster manager.
    SlaveId
);
opaque_id!(
    /// Identity of an executor on a node, minted by the cluster manager.
    ExecutorId
);
opaque_id!(
    /// The framework registration token. Persisted verbatim and reused on
    /// re-registration to preserve identity across leader handovers.
    FrameworkId
);

// =============================================================================
// Tests
// =============================================================================
