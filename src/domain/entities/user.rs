use chrono::{DateTime, Utc};
use std::fmt;

use crate::application::errors::BotError;

/// Free trial allowance in bytes (50 MiB)
pub const DEFAULT_QUOTA_LIMIT: i64 = 52_428_800;

/// Lifecycle status of a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserStatus {
    Inactive,
    Trial,
    Active,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Inactive => "inactive",
            UserStatus::Trial => "trial",
            UserStatus::Active => "active",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a user in the system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub status: UserStatus,
    pub quota_limit: i64,
    pub quota_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: None,
            first_name: first_name.into(),
            last_name: None,
            status: UserStatus::Inactive,
            quota_limit: DEFAULT_QUOTA_LIMIT,
            quota_used: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_username(mut self, username: Option<impl Into<String>>) -> Self {
        self.username = username.map(Into::into);
        self
    }

    pub fn with_last_name(mut self, last: Option<impl Into<String>>) -> Self {
        self.last_name = last.map(Into::into);
        self
    }

    pub fn display_name(&self) -> String {
        if let Some(ref username) = self.username {
            username.clone()
        } else if let Some(ref last) = self.last_name {
            format!("{} {}", self.first_name, last)
        } else {
            self.first_name.clone()
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, UserStatus::Active | UserStatus::Trial)
    }

    pub fn can_activate_trial(&self) -> bool {
        self.status == UserStatus::Inactive
    }

    pub fn activate_trial(&mut self) {
        self.status = UserStatus::Trial;
        self.updated_at = Utc::now();
    }

    pub fn quota_remaining(&self) -> i64 {
        self.quota_limit - self.quota_used
    }

    pub fn quota_usage_percentage(&self) -> f64 {
        if self.quota_limit == 0 {
            return 0.0;
        }
        self.quota_used as f64 / self.quota_limit as f64 * 100.0
    }

    pub fn add_quota_usage(&mut self, amount: i64) -> Result<(), BotError> {
        if !self.is_active() || amount <= 0 || self.quota_remaining() < amount {
            return Err(BotError::QuotaExceeded {
                used: self.quota_used + amount,
                limit: self.quota_limit,
            });
        }
        self.quota_used += amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn validate(&self) -> Result<(), BotError> {
        if self.id <= 0 {
            return Err(BotError::validation("id", "must be positive"));
        }
        if self.first_name.trim().is_empty() {
            return Err(BotError::validation("first_name", "cannot be empty"));
        }
        if self.quota_limit < 0 {
            return Err(BotError::validation("quota_limit", "cannot be negative"));
        }
        if self.quota_used < 0 {
            return Err(BotError::validation("quota_used", "cannot be negative"));
        }
        Ok(())
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
