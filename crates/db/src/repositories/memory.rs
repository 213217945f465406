use std::collections::HashMap;

use tokio::sync::RwLock;

use meshitomo_core::{StoreError, UserAccount, UserStore};

/// In-memory twin of the SQL repository, used by tests and local dry runs.
#[derive(Default)]
pub struct InMemoryUserRepository {
    accounts: RwLock<HashMap<String, UserAccount>>,
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserRepository {
    async fn find(&self, user_id: &str) -> Result<Option<UserAccount>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(user_id).cloned())
    }

    async fn find_by_customer_ref(
        &self,
        customer_ref: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|account| account.stripe_customer_id.as_deref() == Some(customer_ref))
            .cloned())
    }

    async fn upsert(&self, account: UserAccount) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.user_id.clone(), account);
        Ok(())
    }
}
