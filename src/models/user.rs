//! User model
//!
//! One table holds job seekers, employers and administrators. Employer
//! accounts carry company fields; job seekers carry a default resume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    /// Unique, stored lowercase
    pub email: String,
    /// Argon2 PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    /// Default resume attached to new applications
    pub resume_url: Option<String>,
    pub company_name: Option<String>,
    pub company_website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build an unsaved user. The password must already be hashed.
    pub fn new(name: String, email: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            email,
            password_hash,
            role,
            status: UserStatus::Active,
            phone: None,
            location: None,
            bio: None,
            avatar: None,
            resume_url: None,
            company_name: None,
            company_website: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn is_employer(&self) -> bool {
        self.role == UserRole::Employer
    }

    pub fn is_jobseeker(&self) -> bool {
        self.role == UserRole::Jobseeker
    }

    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }

    /// Employers and admins may post jobs.
    pub fn can_post_jobs(&self) -> bool {
        matches!(self.role, UserRole::Employer | UserRole::Admin)
    }

    /// Admins manage everything; others only what they own.
    pub fn can_manage(&self, owner_id: i64) -> bool {
        self.is_admin() || self.id == owner_id
    }
}

string_enum! {
    /// Account role
    pub enum UserRole {
        Jobseeker => "jobseeker",
        Employer => "employer",
        Admin => "admin",
    }
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Jobseeker
    }
}

string_enum! {
    /// Banned accounts cannot log in and their sessions are revoked.
    pub enum UserStatus {
        Active => "active",
        Banned => "banned",
    }
}

impl Default for UserStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// Registration input (before password hashing)
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default)]
    pub company_name: Option<String>,
    /// Set by clients that RSA-encrypted `password`
    #[serde(default)]
    pub encrypted: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub encrypted: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
    /// Applies to both password fields
    #[serde(default)]
    pub encrypted: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub resume_url: Option<String>,
    pub company_name: Option<String>,
    pub company_website: Option<String>,
}

/// Admin user listing filter
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    /// Matches name, email or company
    pub keyword: Option<String>,
}

/// Public projection of a user embedded in other responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub avatar: Option<String>,
    pub company_name: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            avatar: user.avatar.clone(),
            company_name: user.company_name.clone(),
        }
    }
}
