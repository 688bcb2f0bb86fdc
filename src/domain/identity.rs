//! Resolved caller identity. Authentication happens upstream; the ledger only
//! checks roles and ownership.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { Admin, User }

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self { Self { user_id: user_id.into(), role: Role::User } }
    pub fn admin(user_id: impl Into<String>) -> Self { Self { user_id: user_id.into(), role: Role::Admin } }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
    pub fn owns(&self, owner_id: &str) -> bool { self.user_id == owner_id }
}
