use sea_orm::{ActiveModelTrait, ActiveValue, TransactionTrait};
use uuid::Uuid;

use crate::{
    ResultEngine, SchoolFinance, Student, StudentFinance, students,
    util::{normalize_optional_text, normalize_required_text},
};

use super::{Engine, finances, with_tx};

impl Engine {
    /// Registers a student so invoices and payments can reference them.
    pub async fn new_student(
        &self,
        first_name: &str,
        last_name: &str,
        grade: Option<&str>,
        user_id: &str,
    ) -> ResultEngine<Student> {
        let student = Student {
            id: Uuid::new_v4(),
            first_name: normalize_required_text(first_name, "first name")?,
            last_name: normalize_required_text(last_name, "last name")?,
            grade: normalize_optional_text(grade),
        };
        let created: ResultEngine<()> = with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, user_id).await?;
            students::ActiveModel {
                id: ActiveValue::Set(student.id.to_string()),
                first_name: ActiveValue::Set(student.first_name.clone()),
                last_name: ActiveValue::Set(student.last_name.clone()),
                grade: ActiveValue::Set(student.grade.clone()),
            }
            .insert(&db_tx)
            .await?;
            Ok(())
        });
        created?;
        tracing::info!(student_id = %student.id, "student created");
        Ok(student)
    }

    pub async fn student(&self, student_id: Uuid, user_id: &str) -> ResultEngine<Student> {
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            let model = self.require_student(&db_tx, student_id).await?;
            Student::try_from(model)
        })
    }

    /// Running totals of one student; all zero before any invoice or payment.
    pub async fn student_finance(
        &self,
        student_id: Uuid,
        user_id: &str,
    ) -> ResultEngine<StudentFinance> {
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            self.require_student(&db_tx, student_id).await?;
            finances::load_student_finance(&db_tx, student_id).await
        })
    }

    /// The school-wide running totals, created on first access.
    pub async fn school_finance(&self, user_id: &str) -> ResultEngine<SchoolFinance> {
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            finances::load_school_finance(&db_tx).await
        })
    }
}
