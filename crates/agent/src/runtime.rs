use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use meshitomo_core::plans::PlanId;
use meshitomo_core::quota::QuotaDecision;
use meshitomo_core::{ApplicationError, Intent, Lexicons, Reply};

use crate::account::AccountActionHandler;
use crate::pipeline::RecommendationPipeline;
use crate::quota::QuotaLedger;
use crate::session::SessionRepository;

const SEARCHING_NOTICE: &str = "🔎 ご希望に合うお店を検索しています…";
const UPSELL_MESSAGE: &str =
    "🔒 今月ご利用いただける回数を使い切りました。\n続けてご利用いただくには、以下のプランをご検討ください👇";
const WELCOME_MESSAGE: &str =
    "友だち追加ありがとうございます🍽️\n「渋谷で安い焼肉」のように、場所と食べたいものを送るとお店をご紹介します！";

/// Out-of-band push channel used to mask the latency of the model/catalog
/// chain. Failures are logged and ignored; the notice is best-effort.
#[async_trait]
pub trait UserNotifier: Send + Sync {
    async fn notify(&self, user_id: &str, text: &str) -> Result<()>;
}

/// Per-turn orchestrator. Serializes processing per user so the quota
/// ledger's check-then-act and the session's mutate-then-read sequences
/// cannot interleave for concurrent messages from the same user.
pub struct AgentRuntime {
    lexicons: Lexicons,
    quota: QuotaLedger,
    pipeline: RecommendationPipeline,
    account: AccountActionHandler,
    sessions: Arc<dyn SessionRepository>,
    notifier: Arc<dyn UserNotifier>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AgentRuntime {
    pub fn new(
        lexicons: Lexicons,
        quota: QuotaLedger,
        pipeline: RecommendationPipeline,
        account: AccountActionHandler,
        sessions: Arc<dyn SessionRepository>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        Self {
            lexicons,
            quota,
            pipeline,
            account,
            sessions,
            notifier,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Handle one inbound text message. Always produces a reply: failures
    /// degrade to a user-safe error message because the transport's reply
    /// token is single-shot and cannot be retried.
    pub async fn handle_message(&self, user_id: &str, text: &str, correlation_id: &str) -> Reply {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        match self.handle_text(user_id, text, correlation_id).await {
            Ok(reply) => reply,
            Err(app_error) => {
                error!(
                    event_name = "agent.runtime.turn_failed",
                    user_id = %user_id,
                    correlation_id = %correlation_id,
                    error = %app_error,
                    "turn aborted with user-safe degradation"
                );
                Reply::Text(app_error.into_interface(correlation_id).user_message().to_string())
            }
        }
    }

    /// Handle a postback payload (button selection). Currently the only
    /// postback is a plan choice, `plan:<id>`.
    pub async fn handle_postback(
        &self,
        user_id: &str,
        data: &str,
        correlation_id: &str,
    ) -> Option<Reply> {
        let plan_id = data.strip_prefix("plan:")?;
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        match self.account.select_plan(user_id, &PlanId::new(plan_id)).await {
            Ok(reply) => Some(reply),
            Err(app_error) => {
                error!(
                    event_name = "agent.runtime.postback_failed",
                    user_id = %user_id,
                    correlation_id = %correlation_id,
                    error = %app_error,
                    "postback handling failed"
                );
                Some(Reply::Text(
                    app_error.into_interface(correlation_id).user_message().to_string(),
                ))
            }
        }
    }

    /// Greeting for a freshly added friend.
    pub fn welcome(&self) -> Reply {
        Reply::Text(WELCOME_MESSAGE.to_string())
    }

    /// Subscription lifecycle pass-through for the payment webhook.
    pub async fn subscription_changed(
        &self,
        user_id: Option<&str>,
        customer_ref: &str,
        plan_id: Option<PlanId>,
        active: bool,
    ) -> Result<(), ApplicationError> {
        self.account.subscription_changed(user_id, customer_ref, plan_id, active).await
    }

    async fn handle_text(
        &self,
        user_id: &str,
        text: &str,
        correlation_id: &str,
    ) -> Result<Reply, ApplicationError> {
        // The metering gate runs before intent routing: at the ceiling,
        // every message short-circuits into the upsell.
        if let QuotaDecision::Deny { offers } = self.quota.check_and_consume(user_id).await? {
            return Ok(Reply::PlanMenu { message: UPSELL_MESSAGE.to_string(), offers });
        }

        let session = self
            .sessions
            .get(user_id)
            .await
            .map_err(|error| ApplicationError::Persistence(error.to_string()))?;
        let intent = self.lexicons.classify(text, session.is_some());

        info!(
            event_name = "agent.runtime.intent_classified",
            user_id = %user_id,
            correlation_id = %correlation_id,
            intent = ?intent,
            has_session = session.is_some(),
            "inbound message classified"
        );

        match (intent, session) {
            (Intent::Cancel, _) => self.account.cancel(user_id).await,
            (Intent::ChangePlan, _) => Ok(self.account.plan_menu()),
            (Intent::Refine, Some(session)) => {
                self.notify_searching(user_id).await;
                self.pipeline.refine(user_id, text, session).await
            }
            (Intent::NextCandidate, Some(session)) => {
                self.notify_searching(user_id).await;
                self.pipeline.next_candidate(user_id, session).await
            }
            // Refine/Next without a session cannot come out of the router,
            // but the fallback is the same either way: a fresh search.
            (Intent::NewSearch | Intent::Refine | Intent::NextCandidate, _) => {
                self.notify_searching(user_id).await;
                self.pipeline.new_search(user_id, text).await
            }
        }
    }

    async fn notify_searching(&self, user_id: &str) {
        if let Err(error) = self.notifier.notify(user_id, SEARCHING_NOTICE).await {
            warn!(
                event_name = "agent.runtime.notice_failed",
                user_id = %user_id,
                error = %error,
                "searching notice could not be delivered"
            );
        }
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks.entry(user_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;

    use meshitomo_core::plans::PlanId;
    use meshitomo_core::{
        Lexicons, PlanCatalog, Reply, SearchFilter, SessionState, ShopRecord, UserAccount,
        UserStore,
    };
    use meshitomo_db::InMemoryUserRepository;

    use super::{AgentRuntime, UserNotifier};
    use crate::account::AccountActionHandler;
    use crate::billing::BillingClient;
    use crate::catalog::{CatalogQuery, ShopCatalog};
    use crate::enrich::Enricher;
    use crate::extractor::StructuredExtractor;
    use crate::llm::LlmClient;
    use crate::pipeline::RecommendationPipeline;
    use crate::quota::QuotaLedger;
    use crate::selection::CandidateSelector;
    use crate::session::{InMemorySessionStore, SessionRepository};

    struct ScriptedLlm;

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, system_prompt: &str, _user_content: &str) -> Result<String> {
            if system_prompt.contains("抽出してください") && system_prompt.contains("場所") {
                return Ok("場所: 渋谷\nジャンル: 焼肉\n予算:\nキーワード:\n".to_string());
            }
            if system_prompt.contains("【紹介文】") {
                return Ok("【紹介文】良い店\n【おすすめの一品】名物".to_string());
            }
            if system_prompt.contains("ハッシュタグ") {
                return Ok("#焼肉".to_string());
            }
            Ok("- 店名: 炭火焼肉 とら\n- 理由: 条件に合うため".to_string())
        }
    }

    struct FakeCatalog {
        fail: bool,
    }

    #[async_trait]
    impl ShopCatalog for FakeCatalog {
        async fn search(&self, _query: &CatalogQuery) -> Result<Vec<ShopRecord>> {
            if self.fail {
                return Err(anyhow!("catalog unreachable"));
            }
            Ok(vec![shop("炭火焼肉 とら"), shop("ホルモン酒場 うし")])
        }
    }

    struct FakeBilling;

    #[async_trait]
    impl BillingClient for FakeBilling {
        async fn checkout_link(&self, _user_id: &str, plan_id: &PlanId) -> Result<String> {
            Ok(format!("https://pay.example.com/checkout/{}", plan_id.0))
        }

        async fn portal_link(&self, customer_ref: &str) -> Result<String> {
            Ok(format!("https://pay.example.com/portal/{customer_ref}"))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl UserNotifier for RecordingNotifier {
        async fn notify(&self, _user_id: &str, text: &str) -> Result<()> {
            self.notices.lock().expect("notices").push(text.to_string());
            Ok(())
        }
    }

    fn shop(name: &str) -> ShopRecord {
        ShopRecord {
            name: name.to_string(),
            genre: "焼肉・ホルモン".to_string(),
            budget: "2001〜3000円".to_string(),
            address: "東京都渋谷区".to_string(),
            smoking: None,
            photo_url: None,
            detail_url: "https://example.com/shop/1".to_string(),
            catch_phrase: "炭火で楽しむ".to_string(),
            open_hours: None,
            intro: None,
            highlight: None,
            tags: None,
        }
    }

    struct Harness {
        runtime: AgentRuntime,
        store: Arc<InMemoryUserRepository>,
        sessions: Arc<InMemorySessionStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(catalog_fails: bool) -> Harness {
        let llm = Arc::new(ScriptedLlm);
        let store = Arc::new(InMemoryUserRepository::default());
        let sessions = InMemorySessionStore::shared();
        let notifier = Arc::new(RecordingNotifier::default());

        let pipeline = RecommendationPipeline::new(
            StructuredExtractor::new(llm.clone()),
            CandidateSelector::new(llm.clone(), 1),
            Enricher::new(llm),
            Arc::new(FakeCatalog { fail: catalog_fails }),
            sessions.clone(),
        );
        let runtime = AgentRuntime::new(
            Lexicons::default(),
            QuotaLedger::new(store.clone(), PlanCatalog::default()),
            pipeline,
            AccountActionHandler::new(store.clone(), Arc::new(FakeBilling), PlanCatalog::default()),
            sessions.clone(),
            notifier.clone(),
        );

        Harness { runtime, store, sessions, notifier }
    }

    #[tokio::test]
    async fn first_message_from_new_user_is_served_and_counted() {
        let harness = harness(false);

        let reply = harness.runtime.handle_message("U1", "渋谷で安い焼肉", "req-1").await;

        assert!(matches!(reply, Reply::Shops { .. }));
        let account = harness.store.find("U1").await.expect("find").expect("created");
        assert_eq!(account.usage_count, 1);
        assert!(harness
            .notifier
            .notices
            .lock()
            .expect("notices")
            .iter()
            .any(|notice| notice.contains("検索しています")));
    }

    #[tokio::test]
    async fn at_ceiling_any_message_gets_the_upsell_without_increment() {
        let harness = harness(false);
        let mut account = UserAccount::new("U1", Utc::now());
        account.usage_count = 1;
        harness.store.upsert(account).await.expect("seed");

        let reply = harness.runtime.handle_message("U1", "渋谷で安い焼肉", "req-1").await;

        match reply {
            Reply::PlanMenu { message, offers } => {
                assert!(message.contains("使い切りました"));
                assert_eq!(offers.len(), 3);
            }
            other => panic!("expected upsell menu, got {other:?}"),
        }
        let stored = harness.store.find("U1").await.expect("find").expect("account");
        assert_eq!(stored.usage_count, 1, "deny must not consume");
    }

    #[tokio::test]
    async fn cancel_keyword_routes_to_account_action_even_with_session() {
        let harness = harness(false);
        let session = SessionState::new(
            "渋谷で焼肉",
            vec![shop("炭火焼肉 とら")],
            Vec::new(),
            SearchFilter::default(),
        )
        .expect("session");
        harness.sessions.put("U1", session).await.expect("seed session");
        let mut account = UserAccount::new("U1", Utc::now());
        account.subscribed = true;
        account.plan_id = Some(PlanId::new("premium"));
        account.stripe_customer_id = Some("cus_7".to_string());
        harness.store.upsert(account).await.expect("seed account");

        let reply = harness.runtime.handle_message("U1", "もっと静かな店もいいけど解約したい", "req-1").await;

        assert!(matches!(reply, Reply::Link { url, .. } if url.contains("/portal/cus_7")));
    }

    #[tokio::test]
    async fn plan_keyword_presents_the_menu() {
        let harness = harness(false);
        let reply = harness.runtime.handle_message("U1", "料金プランを教えて", "req-1").await;
        assert!(matches!(reply, Reply::PlanMenu { message, .. } if message.contains("お選びください")));
    }

    #[tokio::test]
    async fn collaborator_outage_degrades_to_error_text() {
        let harness = harness(true);
        let reply = harness.runtime.handle_message("U1", "渋谷で焼肉", "req-1").await;
        assert!(matches!(reply, Reply::Text(text) if text.contains("もう一度")));
    }

    #[tokio::test]
    async fn plan_postback_returns_checkout_link() {
        let harness = harness(false);
        let reply = harness.runtime.handle_postback("U1", "plan:light", "req-1").await;
        assert!(
            matches!(reply, Some(Reply::Link { url, .. }) if url.ends_with("/checkout/light"))
        );
    }

    #[tokio::test]
    async fn unrelated_postback_is_ignored() {
        let harness = harness(false);
        assert!(harness.runtime.handle_postback("U1", "noop", "req-1").await.is_none());
    }

    #[tokio::test]
    async fn concurrent_messages_from_one_user_consume_quota_exactly() {
        let harness = Arc::new(harness(false));
        let mut account = UserAccount::new("U1", Utc::now());
        account.subscribed = true;
        account.plan_id = Some(PlanId::new("light"));
        harness.store.upsert(account).await.expect("seed");

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let harness = harness.clone();
                tokio::spawn(async move {
                    harness.runtime.handle_message("U1", "渋谷で焼肉", &format!("req-{i}")).await
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("join");
        }

        let stored = harness.store.find("U1").await.expect("find").expect("account");
        assert_eq!(stored.usage_count, 4, "per-user serialization keeps the counter exact");
    }
}
