use sea_orm::{
    ActiveValue, DatabaseTransaction, TransactionTrait, prelude::*, sea_query::OnConflict,
};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine, TransactionKind, UserRole, invoices, students, transactions, users,
    util::normalize_required_text,
};

use super::{Engine, with_tx};

/// Generates a `require_*` lookup that turns a missing row into `KeyNotFound`.
macro_rules! impl_require_by_id {
    ($require_fn:ident, $entity:path, $model:path, $label:literal) => {
        pub(super) async fn $require_fn(
            &self,
            db: &DatabaseTransaction,
            id: Uuid,
        ) -> ResultEngine<$model> {
            <$entity>::find_by_id(id.to_string())
                .one(db)
                .await?
                .ok_or_else(|| EngineError::not_found($label))
        }
    };
}

impl Engine {
    impl_require_by_id!(
        require_student,
        students::Entity,
        students::Model,
        "student"
    );

    impl_require_by_id!(
        require_invoice,
        invoices::Entity,
        invoices::Model,
        "invoice"
    );

    impl_require_by_id!(
        require_transaction,
        transactions::Entity,
        transactions::Model,
        "transaction"
    );

    /// Loads a transaction and checks it is of the expected kind, so that
    /// payment endpoints cannot touch expenses and vice versa.
    pub(super) async fn require_transaction_of_kind(
        &self,
        db: &DatabaseTransaction,
        id: Uuid,
        kind: Option<TransactionKind>,
    ) -> ResultEngine<transactions::Model> {
        let model = self.require_transaction(db, id).await?;
        if let Some(kind) = kind
            && model.kind != kind.as_str()
        {
            return Err(EngineError::not_found(match kind {
                TransactionKind::Income => "payment",
                TransactionKind::Expense => "expense",
            }));
        }
        Ok(model)
    }

    async fn caller_role(&self, db: &DatabaseTransaction, user_id: &str) -> ResultEngine<UserRole> {
        if user_id.trim().is_empty() {
            return Err(EngineError::Unauthorized("missing caller".to_string()));
        }
        let user = users::Entity::find_by_id(user_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::Unauthorized(format!("unknown user {user_id}")))?;
        UserRole::try_from(user.role.as_str())
    }

    /// Any authenticated user may read the ledger.
    pub(super) async fn require_reader(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
    ) -> ResultEngine<UserRole> {
        self.caller_role(db, user_id).await
    }

    /// Ledger mutations need a role that can write.
    pub(super) async fn require_writer(
        &self,
        db: &DatabaseTransaction,
        user_id: &str,
    ) -> ResultEngine<UserRole> {
        let role = self.caller_role(db, user_id).await?;
        if !role.can_write() {
            return Err(EngineError::Unauthorized(format!(
                "user {user_id} cannot modify financial records"
            )));
        }
        Ok(role)
    }

    /// Checks a username/password pair and returns the user's role.
    pub async fn authenticate(&self, username: &str, password: &str) -> ResultEngine<UserRole> {
        with_tx!(self, |db_tx| {
            let user = users::Entity::find_by_id(username.to_string())
                .one(&db_tx)
                .await?
                .filter(|user| user.password == password)
                .ok_or_else(|| EngineError::Unauthorized("invalid credentials".to_string()))?;
            UserRole::try_from(user.role.as_str())
        })
    }

    /// Creates the user if it does not exist yet. Existing users are left
    /// untouched.
    pub async fn ensure_user(
        &self,
        username: &str,
        password: &str,
        role: UserRole,
    ) -> ResultEngine<()> {
        let username = normalize_required_text(username, "username")?;
        if password.is_empty() {
            return Err(EngineError::Validation(
                "password must not be empty".to_string(),
            ));
        }
        with_tx!(self, |db_tx| {
            let model = users::ActiveModel {
                username: ActiveValue::Set(username.clone()),
                password: ActiveValue::Set(password.to_string()),
                role: ActiveValue::Set(role.as_str().to_string()),
            };
            users::Entity::insert(model)
                .on_conflict(
                    OnConflict::column(users::Column::Username)
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&db_tx)
                .await?;
            Ok(())
        })
    }
}
