//! Member-area access records.

use crate::domain::TimeMs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub product_id: String,
    pub seller_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Inactive,
}

impl StudentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "inactive" {
            StudentStatus::Inactive
        } else {
            StudentStatus::Active
        }
    }
}

/// A buyer as seen by one product's member area. The same email buying two
/// products yields two students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub email: String,
    pub name: String,
    pub product_id: String,
    pub seller_id: String,
    pub status: StudentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Active,
    Revoked,
    Expired,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Revoked => "revoked",
            EnrollmentStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(EnrollmentStatus::Active),
            "revoked" => Some(EnrollmentStatus::Revoked),
            "expired" => Some(EnrollmentStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub product_id: String,
    pub sale_id: Option<String>,
    pub status: EnrollmentStatus,
    pub enrolled_at: TimeMs,
    pub access_revoked_at: Option<TimeMs>,
    pub revoke_reason: Option<String>,
}
