//! Explicit unit of work over the relational store.
//!
//! Callers hold a `UnitOfWork` instead of threading a transaction handle
//! through every function. Each logical step picks one of two entry points:
//!
//! * [`UnitOfWork::run_in_new_transaction`] opens, commits or rolls back a
//!   fresh transaction around the closure.
//! * [`UnitOfWork::run_in_transaction`] joins a transaction the caller
//!   already holds, as a savepoint, so the inner step rolls back on its own
//!   without aborting the outer one.
//!
//! Writes that happen outside the relational store (the key vault) are not
//! covered by either. Code that pairs such a write with a transaction makes
//! that gap visible at the call site.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sea_orm::{DatabaseTransaction, DbErr, TransactionError, TransactionTrait};

use crate::DbConnection;

pub type TxFuture<'c, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'c>>;

#[derive(Clone)]
pub struct UnitOfWork {
    db: Arc<DbConnection>,
}

impl UnitOfWork {
    pub fn new(db: Arc<DbConnection>) -> Self {
        Self { db }
    }

    /// Plain connection for single statements that need no transaction.
    pub fn connection(&self) -> &DbConnection {
        self.db.as_ref()
    }

    pub fn shared_connection(&self) -> Arc<DbConnection> {
        self.db.clone()
    }

    pub async fn run_in_new_transaction<F, T, E>(&self, work: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> TxFuture<'c, T, E> + Send,
        T: Send,
        E: std::error::Error + From<DbErr> + Send,
    {
        self.db
            .transaction::<F, T, E>(work)
            .await
            .map_err(flatten_transaction_error)
    }

    pub async fn run_in_transaction<F, T, E>(
        &self,
        existing: &DatabaseTransaction,
        work: F,
    ) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> TxFuture<'c, T, E> + Send,
        T: Send,
        E: std::error::Error + From<DbErr> + Send,
    {
        existing
            .transaction::<F, T, E>(work)
            .await
            .map_err(flatten_transaction_error)
    }
}

fn flatten_transaction_error<E>(err: TransactionError<E>) -> E
where
    E: std::error::Error + From<DbErr>,
{
    match err {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(inner) => inner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestDatabase;
    use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
    use tops_entities::cdn;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error(transparent)]
        Db(#[from] DbErr),
        #[error("rolled back on purpose")]
        Abort,
    }

    fn cdn_model(name: &str) -> cdn::ActiveModel {
        cdn::ActiveModel {
            name: Set(name.to_string()),
            domain_name: Set(format!("{name}.example.net")),
            dnssec_enabled: Set(false),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn new_transaction_commits_on_success() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let uow = UnitOfWork::new(test_db.db.clone());

        uow.run_in_new_transaction::<_, _, TestError>(|txn| {
            Box::pin(async move {
                cdn_model("cdn1").insert(txn).await?;
                Ok(())
            })
        })
        .await
        .unwrap();

        let count = cdn::Entity::find().count(uow.connection()).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn new_transaction_rolls_back_on_error() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let uow = UnitOfWork::new(test_db.db.clone());

        let result = uow
            .run_in_new_transaction::<_, (), TestError>(|txn| {
                Box::pin(async move {
                    cdn_model("cdn1").insert(txn).await?;
                    Err(TestError::Abort)
                })
            })
            .await;

        assert!(matches!(result, Err(TestError::Abort)));
        let count = cdn::Entity::find().count(uow.connection()).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn inner_step_rolls_back_without_aborting_outer() {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let uow = UnitOfWork::new(test_db.db.clone());
        let inner_uow = uow.clone();

        uow.run_in_new_transaction::<_, _, TestError>(move |txn| {
            Box::pin(async move {
                cdn_model("outer").insert(txn).await?;
                let inner = inner_uow
                    .run_in_transaction::<_, (), TestError>(txn, |nested| {
                        Box::pin(async move {
                            cdn_model("inner").insert(nested).await?;
                            Err(TestError::Abort)
                        })
                    })
                    .await;
                assert!(inner.is_err());
                Ok(())
            })
        })
        .await
        .unwrap();

        let names: Vec<String> = cdn::Entity::find()
            .all(uow.connection())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["outer".to_string()]);
    }
}
