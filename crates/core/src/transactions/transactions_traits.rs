use async_trait::async_trait;

use crate::errors::Result;

use super::transactions_model::{NewTransaction, Transaction, TransactionField, TransactionUpdate};

/// Trait defining the contract for transaction data access.
#[async_trait]
pub trait TransactionServiceTrait: Send + Sync {
    /// Optimistic view, including writes not yet confirmed remotely.
    fn list_transactions(&self) -> Vec<Transaction>;

    async fn load_transactions(&self) -> Result<Vec<Transaction>>;

    async fn refresh_transactions(&self) -> Result<Vec<Transaction>>;

    async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction>;

    async fn update_transaction(
        &self,
        id: &str,
        update: TransactionUpdate,
    ) -> Result<Transaction>;

    async fn delete_transaction(&self, id: &str) -> Result<()>;

    /// Renames `old_value` to `new_value` in `field` across all transactions.
    /// Returns the number of cached transactions changed.
    async fn bulk_rename(
        &self,
        field: TransactionField,
        old_value: &str,
        new_value: &str,
    ) -> Result<usize>;
}
