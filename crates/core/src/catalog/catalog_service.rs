use std::sync::Arc;

use async_trait::async_trait;
use log::info;

use crate::errors::{Error, Result, ValidationError};
use crate::sync::{new_local_id, EntityFacade};
use crate::transactions::{TransactionField, TransactionServiceTrait};

use super::catalog_model::{
    Category, CategoryUpdate, NewCategory, NewPaymentMethod, PaymentMethod, PaymentMethodUpdate,
};
use super::catalog_traits::CatalogServiceTrait;

/// Categories and payment methods. Transactions reference both by name, so
/// renames are carried over to the transactions as one bulk rename.
pub struct CatalogService {
    categories: EntityFacade<Category>,
    payment_methods: EntityFacade<PaymentMethod>,
    transaction_service: Arc<dyn TransactionServiceTrait>,
}

impl CatalogService {
    pub fn new(
        categories: EntityFacade<Category>,
        payment_methods: EntityFacade<PaymentMethod>,
        transaction_service: Arc<dyn TransactionServiceTrait>,
    ) -> Self {
        Self {
            categories,
            payment_methods,
            transaction_service,
        }
    }

    pub fn categories(&self) -> &EntityFacade<Category> {
        &self.categories
    }

    pub fn payment_methods(&self) -> &EntityFacade<PaymentMethod> {
        &self.payment_methods
    }

    fn category_names_except(&self, id: Option<&str>) -> Vec<String> {
        self.categories
            .list()
            .into_iter()
            .filter(|c| Some(c.id.as_str()) != id)
            .map(|c| c.name)
            .collect()
    }

    fn payment_method_names_except(&self, id: Option<&str>) -> Vec<String> {
        self.payment_methods
            .list()
            .into_iter()
            .filter(|p| Some(p.id.as_str()) != id)
            .map(|p| p.name)
            .collect()
    }
}

/// Trimmed name; blanks and names already taken (case-insensitive) are rejected.
fn validate_name(kind: &str, name: &str, taken: &[String]) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        let message = format!("{kind} name must not be empty");
        return Err(ValidationError::InvalidPayload(message).into());
    }
    if taken.iter().any(|other| other.eq_ignore_ascii_case(name)) {
        let message = format!("{kind} '{name}' already exists");
        return Err(ValidationError::InvalidPayload(message).into());
    }
    Ok(name.to_string())
}

#[async_trait]
impl CatalogServiceTrait for CatalogService {
    fn list_categories(&self) -> Vec<Category> {
        self.categories.list()
    }

    async fn load_categories(&self) -> Result<Vec<Category>> {
        self.categories.load().await
    }

    async fn refresh_categories(&self) -> Result<Vec<Category>> {
        self.categories.refresh().await
    }

    async fn create_category(&self, mut new_category: NewCategory) -> Result<Category> {
        new_category.name = validate_name(
            "category",
            &new_category.name,
            &self.category_names_except(None),
        )?;
        let category = new_category.into_category(new_local_id());
        self.categories.create(category).await
    }

    async fn update_category(&self, id: &str, mut update: CategoryUpdate) -> Result<Category> {
        if let Some(name) = update.name.as_deref() {
            update.name = Some(validate_name(
                "category",
                name,
                &self.category_names_except(Some(id)),
            )?);
        }
        let patch = serde_json::to_value(&update)?;
        self.categories.update(id, patch).await
    }

    async fn delete_category(&self, id: &str) -> Result<()> {
        self.categories.delete(id).await
    }

    async fn rename_category(&self, id: &str, new_name: &str) -> Result<Category> {
        let existing = self
            .categories
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("category {id}")))?;
        let updated = self
            .update_category(
                id,
                CategoryUpdate {
                    name: Some(new_name.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let renamed = self
            .transaction_service
            .bulk_rename(TransactionField::Category, &existing.name, &updated.name)
            .await?;
        info!(
            "[OfflineSync] Category '{}' renamed to '{}' ({} transaction(s))",
            existing.name, updated.name, renamed
        );
        Ok(updated)
    }

    fn list_payment_methods(&self) -> Vec<PaymentMethod> {
        self.payment_methods.list()
    }

    async fn load_payment_methods(&self) -> Result<Vec<PaymentMethod>> {
        self.payment_methods.load().await
    }

    async fn refresh_payment_methods(&self) -> Result<Vec<PaymentMethod>> {
        self.payment_methods.refresh().await
    }

    async fn create_payment_method(
        &self,
        mut new_payment_method: NewPaymentMethod,
    ) -> Result<PaymentMethod> {
        new_payment_method.name = validate_name(
            "payment method",
            &new_payment_method.name,
            &self.payment_method_names_except(None),
        )?;
        let payment_method = new_payment_method.into_payment_method(new_local_id());
        self.payment_methods.create(payment_method).await
    }

    async fn update_payment_method(
        &self,
        id: &str,
        mut update: PaymentMethodUpdate,
    ) -> Result<PaymentMethod> {
        if let Some(name) = update.name.as_deref() {
            update.name = Some(validate_name(
                "payment method",
                name,
                &self.payment_method_names_except(Some(id)),
            )?);
        }
        let patch = serde_json::to_value(&update)?;
        self.payment_methods.update(id, patch).await
    }

    async fn delete_payment_method(&self, id: &str) -> Result<()> {
        self.payment_methods.delete(id).await
    }

    async fn rename_payment_method(&self, id: &str, new_name: &str) -> Result<PaymentMethod> {
        let existing = self
            .payment_methods
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("payment method {id}")))?;
        let updated = self
            .update_payment_method(
                id,
                PaymentMethodUpdate {
                    name: Some(new_name.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let renamed = self
            .transaction_service
            .bulk_rename(
                TransactionField::PaymentMethod,
                &existing.name,
                &updated.name,
            )
            .await?;
        info!(
            "[OfflineSync] Payment method '{}' renamed to '{}' ({} transaction(s))",
            existing.name, updated.name, renamed
        );
        Ok(updated)
    }
}
