use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use meshitomo_core::plans::PlanId;
use meshitomo_core::{StoreError, UserAccount, UserStore};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_one(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        let query = format!(
            "SELECT user_id, subscribed, plan_id, usage_count, usage_month, \
             stripe_customer_id, created_at, updated_at \
             FROM users WHERE {column} = ?1"
        );
        let row = sqlx::query(&query).bind(value).fetch_optional(&self.pool).await?;
        row.map(decode_account).transpose()
    }

    async fn save(&self, account: &UserAccount) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO users \
             (user_id, subscribed, plan_id, usage_count, usage_month, stripe_customer_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(user_id) DO UPDATE SET \
             subscribed = excluded.subscribed, \
             plan_id = excluded.plan_id, \
             usage_count = excluded.usage_count, \
             usage_month = excluded.usage_month, \
             stripe_customer_id = excluded.stripe_customer_id, \
             updated_at = excluded.updated_at",
        )
        .bind(&account.user_id)
        .bind(i64::from(account.subscribed))
        .bind(account.plan_id.as_ref().map(|plan| plan.0.as_str()))
        .bind(i64::from(account.usage_count))
        .bind(&account.usage_month)
        .bind(account.stripe_customer_id.as_deref())
        .bind(account.created_at.to_rfc3339())
        .bind(account.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqlUserRepository {
    async fn find(&self, user_id: &str) -> Result<Option<UserAccount>, StoreError> {
        self.fetch_one("user_id", user_id).await.map_err(StoreError::from)
    }

    async fn find_by_customer_ref(
        &self,
        customer_ref: &str,
    ) -> Result<Option<UserAccount>, StoreError> {
        self.fetch_one("stripe_customer_id", customer_ref).await.map_err(StoreError::from)
    }

    async fn upsert(&self, account: UserAccount) -> Result<(), StoreError> {
        self.save(&account).await.map_err(StoreError::from)
    }
}

fn decode_account(row: SqliteRow) -> Result<UserAccount, RepositoryError> {
    let usage_count: i64 = row.get("usage_count");
    let usage_count = u32::try_from(usage_count)
        .map_err(|_| RepositoryError::Decode(format!("usage_count out of range: {usage_count}")))?;

    Ok(UserAccount {
        user_id: row.get("user_id"),
        subscribed: row.get::<i64, _>("subscribed") != 0,
        plan_id: row.get::<Option<String>, _>("plan_id").map(PlanId),
        usage_count,
        usage_month: row.get("usage_month"),
        stripe_customer_id: row.get("stripe_customer_id"),
        created_at: decode_timestamp(&row, "created_at")?,
        updated_at: decode_timestamp(&row, "updated_at")?,
    })
}

fn decode_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = row.get(column);
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| RepositoryError::Decode(format!("bad {column} timestamp `{raw}`: {err}")))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use meshitomo_core::plans::PlanId;
    use meshitomo_core::{UserAccount, UserStore};

    use super::SqlUserRepository;
    use crate::{connect_with_settings, migrations};

    async fn repo() -> SqlUserRepository {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect in-memory pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlUserRepository::new(pool)
    }

    fn account(user_id: &str) -> UserAccount {
        let mut account = UserAccount::new(user_id, Utc::now());
        account.usage_count = 1;
        account
    }

    #[tokio::test]
    async fn upsert_then_find_round_trips() {
        let repo = repo().await;
        let stored = account("U-round-trip");

        repo.upsert(stored.clone()).await.expect("upsert");
        let found = repo.find("U-round-trip").await.expect("find");

        assert_eq!(found, Some(stored));
    }

    #[tokio::test]
    async fn find_missing_user_returns_none() {
        let repo = repo().await;
        assert_eq!(repo.find("U-missing").await.expect("find"), None);
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_row() {
        let repo = repo().await;
        let mut stored = account("U-update");
        repo.upsert(stored.clone()).await.expect("insert");

        stored.subscribed = true;
        stored.plan_id = Some(PlanId::new("light"));
        stored.usage_count = 7;
        repo.upsert(stored.clone()).await.expect("update");

        let found = repo.find("U-update").await.expect("find").expect("account exists");
        assert!(found.subscribed);
        assert_eq!(found.plan_id, Some(PlanId::new("light")));
        assert_eq!(found.usage_count, 7);
    }

    #[tokio::test]
    async fn lookup_by_customer_ref_finds_subscribed_account() {
        let repo = repo().await;
        let mut stored = account("U-billing");
        stored.stripe_customer_id = Some("cus_123".to_string());
        repo.upsert(stored).await.expect("upsert");

        let found = repo.find_by_customer_ref("cus_123").await.expect("find by customer ref");
        assert_eq!(found.map(|account| account.user_id), Some("U-billing".to_string()));

        let missing = repo.find_by_customer_ref("cus_none").await.expect("find missing");
        assert!(missing.is_none());
    }
}
