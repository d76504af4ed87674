//! User account models.

use serde::{Deserialize, Serialize};

/// Account creation form data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// An account in the user directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$createdAt")]
    pub created_at: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}
