//! Actors and their roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, ResourceId};

/// The role an authenticated user picked during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Posts jobs and books technicians.
    Client,
    /// Accepts and fulfils jobs.
    Technician,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Technician => "technician",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "technician" => Ok(Role::Technician),
            other => Err(Error::InvalidInput(format!("unknown role: {}", other))),
        }
    }
}

/// The identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ResourceId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: ResourceId, role: Role) -> Self {
        Self { id, role }
    }

    pub fn client(id: ResourceId) -> Self {
        Self::new(id, Role::Client)
    }

    pub fn technician(id: ResourceId) -> Self {
        Self::new(id, Role::Technician)
    }

    pub fn is_technician(&self) -> bool {
        self.role == Role::Technician
    }
}
