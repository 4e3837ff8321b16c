//! Course, student and enrollment persistence.
//!
//! Every "ensure" method is an `INSERT ... ON CONFLICT DO NOTHING` followed by
//! a read of the unique key, so concurrent callers converge on one row.

use super::{get_enum, get_opt_time, get_time, Repository};
use crate::domain::{
    new_id, Course, Enrollment, EnrollmentStatus, Student, StudentStatus, TimeMs,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

const ENROLLMENT_COLUMNS: &str = r#"
    id, student_id, course_id, product_id, sale_id, status, enrolled_at,
    access_revoked_at, revoke_reason
"#;

fn enrollment_from_row(row: &SqliteRow) -> Result<Enrollment, sqlx::Error> {
    Ok(Enrollment {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        course_id: row.try_get("course_id")?,
        product_id: row.try_get("product_id")?,
        sale_id: row.try_get("sale_id")?,
        status: get_enum(row, "status", EnrollmentStatus::parse)?,
        enrolled_at: get_time(row, "enrolled_at")?,
        access_revoked_at: get_opt_time(row, "access_revoked_at")?,
        revoke_reason: row.try_get("revoke_reason")?,
    })
}

fn student_from_row(row: &SqliteRow) -> Result<Student, sqlx::Error> {
    Ok(Student {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        product_id: row.try_get("product_id")?,
        seller_id: row.try_get("seller_id")?,
        status: StudentStatus::parse(&row.try_get::<String, _>("status")?),
    })
}

impl Repository {
    /// Get the course bound to `product_id`, creating it on first use.
    pub async fn get_or_create_course(
        &self,
        product_id: &str,
        seller_id: &str,
        name: &str,
        now: TimeMs,
    ) -> Result<Course, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO courses (id, product_id, seller_id, name, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(product_id) DO NOTHING
            "#,
        )
        .bind(new_id())
        .bind(product_id)
        .bind(seller_id)
        .bind(name)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id, product_id, seller_id, name FROM courses WHERE product_id = ?")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Course {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            seller_id: row.try_get("seller_id")?,
            name: row.try_get("name")?,
        })
    }

    pub async fn count_courses(&self, product_id: &str) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM courses WHERE product_id = ?")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Get the student for (email, product), creating it on first use.
    /// Emails are matched case-insensitively and stored lower-cased.
    pub async fn get_or_create_student(
        &self,
        email: &str,
        name: &str,
        product_id: &str,
        seller_id: &str,
        now: TimeMs,
    ) -> Result<Student, sqlx::Error> {
        let email = email.trim().to_lowercase();

        sqlx::query(
            r#"
            INSERT INTO students (id, email, name, product_id, seller_id, status, created_at)
            VALUES (?, ?, ?, ?, ?, 'active', ?)
            ON CONFLICT(email, product_id) DO NOTHING
            "#,
        )
        .bind(new_id())
        .bind(&email)
        .bind(name)
        .bind(product_id)
        .bind(seller_id)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        self.find_student(&email, product_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_student(
        &self,
        email: &str,
        product_id: &str,
    ) -> Result<Option<Student>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, email, name, product_id, seller_id, status
            FROM students
            WHERE email = ? AND product_id = ?
            "#,
        )
        .bind(email.trim().to_lowercase())
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(student_from_row).transpose()
    }

    pub async fn get_student(&self, student_id: &str) -> Result<Option<Student>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, email, name, product_id, seller_id, status FROM students WHERE id = ?",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(student_from_row).transpose()
    }

    pub async fn set_student_status(
        &self,
        student_id: &str,
        status: StudentStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE students SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(student_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_enrollment(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Option<Enrollment>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM enrollments WHERE student_id = ? AND course_id = ?",
            ENROLLMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(student_id)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(enrollment_from_row).transpose()
    }

    pub async fn find_enrollment_by_sale(
        &self,
        sale_id: &str,
    ) -> Result<Option<Enrollment>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM enrollments WHERE sale_id = ? ORDER BY enrolled_at DESC LIMIT 1",
            ENROLLMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(enrollment_from_row).transpose()
    }

    /// Insert an active enrollment. Returns `false` if one already exists for
    /// the (student, course) pair.
    pub async fn insert_enrollment(
        &self,
        student_id: &str,
        course_id: &str,
        product_id: &str,
        sale_id: Option<&str>,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO enrollments (id, student_id, course_id, product_id, sale_id, status, enrolled_at)
            VALUES (?, ?, ?, ?, ?, 'active', ?)
            ON CONFLICT(student_id, course_id) DO NOTHING
            "#,
        )
        .bind(new_id())
        .bind(student_id)
        .bind(course_id)
        .bind(product_id)
        .bind(sale_id)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Bring a non-active enrollment back to active, clearing its revocation.
    /// Returns `false` when the enrollment was already active.
    pub async fn reactivate_enrollment(
        &self,
        enrollment_id: &str,
        sale_id: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments
            SET status = 'active',
                access_revoked_at = NULL,
                revoke_reason = NULL,
                sale_id = COALESCE(?, sale_id)
            WHERE id = ? AND status != 'active'
            "#,
        )
        .bind(sale_id)
        .bind(enrollment_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Revoke an active enrollment. Returns `false` when it was not active.
    pub async fn revoke_enrollment(
        &self,
        enrollment_id: &str,
        reason: &str,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE enrollments
            SET status = 'revoked', access_revoked_at = ?, revoke_reason = ?
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(now.as_ms())
        .bind(reason)
        .bind(enrollment_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count_enrollments_for_student(&self, student_id: &str) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE student_id = ?")
            .bind(student_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Whether `email` currently holds an active enrollment for `product_id`.
    pub async fn has_active_enrollment(
        &self,
        email: &str,
        product_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT 1
            FROM enrollments e
            JOIN students st ON st.id = e.student_id
            WHERE st.email = ? AND e.product_id = ? AND e.status = 'active'
            LIMIT 1
            "#,
        )
        .bind(email.trim().to_lowercase())
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}
