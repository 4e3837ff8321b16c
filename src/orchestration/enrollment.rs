//! Member-area access for buyers.
//!
//! Every operation here is safe to repeat: the repository's unique keys plus
//! get-or-create and find-by-sale lookups make webhook retries converge on a
//! single course, student and enrollment.

use crate::db::Repository;
use crate::domain::{
    Course, EnrollmentStatus, Product, Sale, Student, StudentStatus, TimeMs,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentAction {
    Created,
    Reactivated,
    AlreadyActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeOutcome {
    Revoked,
    AlreadyRevoked,
    NoEnrollment,
}

#[derive(Clone)]
pub struct EnrollmentAccessManager {
    repo: Arc<Repository>,
}

impl EnrollmentAccessManager {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub async fn ensure_course(
        &self,
        product_id: &str,
        seller_id: &str,
        name: &str,
    ) -> Result<Course, sqlx::Error> {
        self.repo
            .get_or_create_course(product_id, seller_id, name, TimeMs::now())
            .await
    }

    /// One student per (email, product); the same buyer on another product is
    /// a different student.
    pub async fn ensure_student(
        &self,
        email: &str,
        name: &str,
        product_id: &str,
        seller_id: &str,
    ) -> Result<Student, sqlx::Error> {
        self.repo
            .get_or_create_student(email, name, product_id, seller_id, TimeMs::now())
            .await
    }

    pub async fn grant_or_reactivate(
        &self,
        student_id: &str,
        course_id: &str,
        product_id: &str,
        sale_id: Option<&str>,
    ) -> Result<EnrollmentAction, sqlx::Error> {
        let existing = match self.repo.find_enrollment(student_id, course_id).await? {
            Some(enrollment) => enrollment,
            None => {
                let created = self
                    .repo
                    .insert_enrollment(student_id, course_id, product_id, sale_id, TimeMs::now())
                    .await?;
                if created {
                    return Ok(EnrollmentAction::Created);
                }
                // Lost an insert race; the winner's row is authoritative.
                self.repo
                    .find_enrollment(student_id, course_id)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?
            }
        };

        if existing.status == EnrollmentStatus::Active {
            return Ok(EnrollmentAction::AlreadyActive);
        }

        let reactivated = self.repo.reactivate_enrollment(&existing.id, sale_id).await?;
        self.repo
            .set_student_status(student_id, StudentStatus::Active)
            .await?;

        if reactivated {
            Ok(EnrollmentAction::Reactivated)
        } else {
            Ok(EnrollmentAction::AlreadyActive)
        }
    }

    /// Revoke the enrollment granted by `sale_id` and deactivate its student.
    pub async fn revoke(&self, sale_id: &str, reason: &str) -> Result<RevokeOutcome, sqlx::Error> {
        let Some(enrollment) = self.repo.find_enrollment_by_sale(sale_id).await? else {
            debug!(sale_id, "no enrollment to revoke");
            return Ok(RevokeOutcome::NoEnrollment);
        };

        let revoked = self
            .repo
            .revoke_enrollment(&enrollment.id, reason, TimeMs::now())
            .await?;
        self.repo
            .set_student_status(&enrollment.student_id, StudentStatus::Inactive)
            .await?;

        if revoked {
            info!(sale_id, enrollment_id = %enrollment.id, reason, "enrollment revoked");
            Ok(RevokeOutcome::Revoked)
        } else {
            Ok(RevokeOutcome::AlreadyRevoked)
        }
    }

    /// Grant access for an approved sale. `None` when the product has no
    /// member area.
    pub async fn activate(
        &self,
        sale: &Sale,
        product: &Product,
    ) -> Result<Option<EnrollmentAction>, sqlx::Error> {
        if !product.has_member_area {
            return Ok(None);
        }

        let course = self
            .ensure_course(&product.id, &product.owner_user_id, &product.name)
            .await?;
        let name = sale.buyer_name.as_deref().unwrap_or(&sale.buyer_email);
        let student = self
            .ensure_student(&sale.buyer_email, name, &product.id, &sale.seller_user_id)
            .await?;

        let action = self
            .grant_or_reactivate(&student.id, &course.id, &product.id, Some(&sale.id))
            .await?;
        info!(sale_id = %sale.id, student_id = %student.id, ?action, "member-area access granted");
        Ok(Some(action))
    }

    /// Revoke access for a reversed sale. `None` when the product has no
    /// member area.
    pub async fn revoke_for_sale(
        &self,
        sale: &Sale,
        product: &Product,
        reason: &str,
    ) -> Result<Option<RevokeOutcome>, sqlx::Error> {
        if !product.has_member_area {
            return Ok(None);
        }
        self.revoke(&sale.id, reason).await.map(Some)
    }

    pub async fn has_access(&self, email: &str, product_id: &str) -> Result<bool, sqlx::Error> {
        self.repo.has_active_enrollment(email, product_id).await
    }
}
