use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::errors::{Result, ValidationError};
use crate::sync::{new_local_id, BulkRename, EntityFacade};

use super::transactions_model::{NewTransaction, Transaction, TransactionField, TransactionUpdate};
use super::transactions_traits::TransactionServiceTrait;

pub struct TransactionService {
    facade: EntityFacade<Transaction>,
}

impl TransactionService {
    pub fn new(facade: EntityFacade<Transaction>) -> Self {
        Self { facade }
    }

    pub fn facade(&self) -> &EntityFacade<Transaction> {
        &self.facade
    }
}

fn validate_new(new_transaction: &NewTransaction) -> Result<()> {
    if new_transaction.description.trim().is_empty() {
        return Err(ValidationError::InvalidPayload(
            "transaction description must not be empty".to_string(),
        )
        .into());
    }
    Ok(())
}

#[async_trait]
impl TransactionServiceTrait for TransactionService {
    fn list_transactions(&self) -> Vec<Transaction> {
        self.facade.list()
    }

    async fn load_transactions(&self) -> Result<Vec<Transaction>> {
        self.facade.load().await
    }

    async fn refresh_transactions(&self) -> Result<Vec<Transaction>> {
        self.facade.refresh().await
    }

    async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction> {
        validate_new(&new_transaction)?;
        let transaction = new_transaction.into_transaction(new_local_id());
        self.facade.create(transaction).await
    }

    async fn update_transaction(
        &self,
        id: &str,
        update: TransactionUpdate,
    ) -> Result<Transaction> {
        let patch = serde_json::to_value(&update)?;
        self.facade.update(id, patch).await
    }

    async fn delete_transaction(&self, id: &str) -> Result<()> {
        self.facade.delete(id).await
    }

    async fn bulk_rename(
        &self,
        field: TransactionField,
        old_value: &str,
        new_value: &str,
    ) -> Result<usize> {
        if new_value.trim().is_empty() {
            return Err(ValidationError::InvalidPayload(format!(
                "new {} must not be empty",
                field.as_str()
            ))
            .into());
        }
        if old_value == new_value {
            return Ok(0);
        }

        let renamed = self.facade.cache().update_where(|tx| {
            let slot = match field {
                TransactionField::Category => &mut tx.category,
                TransactionField::PaymentMethod => &mut tx.payment_method,
            };
            if slot.as_str() != old_value {
                return false;
            }
            *slot = new_value.to_string();
            true
        });
        self.facade.cache().persist().await;
        debug!(
            "[OfflineSync] Renamed {} '{}' -> '{}' on {} cached transaction(s)",
            field.as_str(),
            old_value,
            new_value,
            renamed
        );

        let rename = BulkRename {
            field: field.as_str().to_string(),
            old_value: old_value.to_string(),
            new_value: new_value.to_string(),
        };
        self.facade.bulk_rename(&rename).await?;
        Ok(renamed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::sync::{
        Connectivity, EntityFamily, MemoryStore, MutationQueue, OperationKind, OptimisticCache,
        SyncEngine,
    };
    use crate::test_support::{FakeRemote, RemoteCall};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn service(online: bool) -> (Arc<FakeRemote>, Arc<SyncEngine>, TransactionService) {
        let store = Arc::new(MemoryStore::new());
        let remote = FakeRemote::shared();
        let queue = Arc::new(MutationQueue::new(store.clone(), 3));
        let engine = Arc::new(SyncEngine::new(
            queue,
            remote.clone(),
            Connectivity::new(online),
        ));
        let cache = Arc::new(OptimisticCache::new(store));
        let facade = EntityFacade::new(cache, Arc::clone(&engine), remote.clone());
        (remote, engine, TransactionService::new(facade))
    }

    fn groceries(category: &str) -> NewTransaction {
        NewTransaction {
            date: NaiveDate::from_ymd_opt(2026, 5, 2).unwrap(),
            description: "Groceries".to_string(),
            amount: dec!(-54.20),
            category: category.to_string(),
            payment_method: "Visa".to_string(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn bulk_rename_makes_one_remote_call() {
        let (remote, _engine, service) = service(true);
        for category in ["Food", "Food", "Food", "Rent"] {
            service.create_transaction(groceries(category)).await.unwrap();
        }

        let renamed = service
            .bulk_rename(TransactionField::Category, "Food", "Dining")
            .await
            .unwrap();

        assert_eq!(renamed, 3);
        let bulk_calls: Vec<_> = remote
            .write_calls()
            .into_iter()
            .filter(|call| matches!(call, RemoteCall::BulkUpdate(..)))
            .collect();
        assert_eq!(
            bulk_calls,
            vec![RemoteCall::BulkUpdate(
                EntityFamily::Transaction,
                BulkRename {
                    field: "category".to_string(),
                    old_value: "Food".to_string(),
                    new_value: "Dining".to_string(),
                }
            )]
        );
        let dining = service
            .list_transactions()
            .into_iter()
            .filter(|tx| tx.category == "Dining")
            .count();
        assert_eq!(dining, 3);
    }

    #[tokio::test]
    async fn offline_bulk_rename_queues_a_single_operation() {
        let (remote, engine, service) = service(false);
        service.create_transaction(groceries("Food")).await.unwrap();
        service.create_transaction(groceries("Food")).await.unwrap();

        service
            .bulk_rename(TransactionField::Category, "Food", "Dining")
            .await
            .unwrap();

        let kinds: Vec<_> = engine.queue().list().await.into_iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Create,
                OperationKind::Create,
                OperationKind::BulkRename
            ]
        );
        assert!(remote.calls().is_empty());

        engine.connectivity().set_online(true);
        let result = engine.run_sync_pass().await;
        assert!(result.success);
        assert!(remote
            .records(EntityFamily::Transaction)
            .iter()
            .all(|record| record["category"] == "Dining"));
    }

    #[tokio::test]
    async fn online_bulk_rename_queues_behind_pending_creates() {
        let (remote, engine, service) = service(false);
        service.create_transaction(groceries("Food")).await.unwrap();
        engine.connectivity().set_online(true);

        service
            .bulk_rename(TransactionField::Category, "Food", "Dining")
            .await
            .unwrap();

        assert!(remote.calls().is_empty());
        let kinds: Vec<_> = engine.queue().list().await.into_iter().map(|op| op.kind).collect();
        assert_eq!(kinds, vec![OperationKind::Create, OperationKind::BulkRename]);

        let result = engine.run_sync_pass().await;
        assert!(result.success);
        assert_eq!(remote.records(EntityFamily::Transaction)[0]["category"], "Dining");
    }

    #[tokio::test]
    async fn update_sends_only_changed_fields() {
        let (remote, _engine, service) = service(true);
        let created = service.create_transaction(groceries("Food")).await.unwrap();

        let updated = service
            .update_transaction(
                &created.id,
                TransactionUpdate {
                    amount: Some(dec!(-60)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.amount, dec!(-60));
        assert_eq!(updated.description, "Groceries");
        let RemoteCall::Update(_, id, patch) = remote.write_calls().pop().unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(id, created.id);
        assert_eq!(patch.as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn offline_delete_removes_from_view_and_queues() {
        let (_remote, engine, service) = service(true);
        let created = service.create_transaction(groceries("Food")).await.unwrap();
        engine.connectivity().set_online(false);

        service.delete_transaction(&created.id).await.unwrap();

        assert!(service.list_transactions().is_empty());
        let queued = engine.queue().list().await;
        assert_eq!(queued[0].kind, OperationKind::Delete);
        assert_eq!(queued[0].entity_id.as_deref(), Some(created.id.as_str()));
    }

    #[tokio::test]
    async fn blank_description_is_rejected() {
        let (_remote, engine, service) = service(false);
        let mut input = groceries("Food");
        input.description = "  ".to_string();

        let err = service.create_transaction(input).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(engine.queue().is_empty().await);
    }
}
