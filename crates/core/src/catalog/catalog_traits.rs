use async_trait::async_trait;

use crate::errors::Result;

use super::catalog_model::{
    Category, CategoryUpdate, NewCategory, NewPaymentMethod, PaymentMethod, PaymentMethodUpdate,
};

/// Trait defining the contract for category and payment method data access.
#[async_trait]
pub trait CatalogServiceTrait: Send + Sync {
    fn list_categories(&self) -> Vec<Category>;
    async fn load_categories(&self) -> Result<Vec<Category>>;
    async fn refresh_categories(&self) -> Result<Vec<Category>>;
    async fn create_category(&self, new_category: NewCategory) -> Result<Category>;
    async fn update_category(&self, id: &str, update: CategoryUpdate) -> Result<Category>;
    async fn delete_category(&self, id: &str) -> Result<()>;

    /// Renames the category and every transaction filed under its old name.
    async fn rename_category(&self, id: &str, new_name: &str) -> Result<Category>;

    fn list_payment_methods(&self) -> Vec<PaymentMethod>;
    async fn load_payment_methods(&self) -> Result<Vec<PaymentMethod>>;
    async fn refresh_payment_methods(&self) -> Result<Vec<PaymentMethod>>;
    async fn create_payment_method(
        &self,
        new_payment_method: NewPaymentMethod,
    ) -> Result<PaymentMethod>;
    async fn update_payment_method(
        &self,
        id: &str,
        update: PaymentMethodUpdate,
    ) -> Result<PaymentMethod>;
    async fn delete_payment_method(&self, id: &str) -> Result<()>;

    /// Renames the payment method and every transaction paid with it.
    async fn rename_payment_method(&self, id: &str, new_name: &str) -> Result<PaymentMethod>;
}
