//! Shared integration test harness: a scripted provider and a fully wired engine
#![allow(dead_code)]

use async_trait::async_trait;
use merchant_ledger::config::EngineConfig;
use merchant_ledger::core::{
    Argon2PinStore, AuthorizationPolicy, BalanceOperations, BalanceRequest, BankCodeTranslator,
    DisbursementOrchestrator, DisbursementRequest, InMemoryReviewQueue, LedgerStore, PaymentStore,
    ReconciliationScheduler,
};
use merchant_ledger::provider::{
    DisbursementPayload, PaymentProvider, ProviderError, SubmissionResponse, HTTP_OK,
};
use merchant_ledger::types::{AccountId, AccountType, Actor, Amount, PaymentId, Role, UserType};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PIN: &str = "123456";
pub const MERCHANT_ACCOUNT: AccountId = 1;

/// Provider whose answers are set up front by the test
pub struct ScriptedProvider {
    account_name: Mutex<Result<String, ProviderError>>,
    balance: Mutex<Result<Amount, ProviderError>>,
    submission: Mutex<Result<SubmissionResponse, ProviderError>>,
    submission_delay: Mutex<Option<Duration>>,
    statuses: Mutex<VecDeque<Result<String, ProviderError>>>,
    submitted: Mutex<Vec<DisbursementPayload>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self {
            account_name: Mutex::new(Ok("Budi Santoso".to_string())),
            balance: Mutex::new(Ok(10_000_000)),
            submission: Mutex::new(Ok(SubmissionResponse {
                http_status: HTTP_OK,
                provider_state: "pending".to_string(),
                provider_ref: Some("FLIP-0001".to_string()),
            })),
            submission_delay: Mutex::new(None),
            statuses: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedProvider {
    pub fn with_submission(self, http_status: u16, provider_state: &str) -> Self {
        *self.submission.lock().unwrap() = Ok(SubmissionResponse {
            http_status,
            provider_state: provider_state.to_string(),
            provider_ref: Some("FLIP-0001".to_string()),
        });
        self
    }

    pub fn with_submission_error(self, error: ProviderError) -> Self {
        *self.submission.lock().unwrap() = Err(error);
        self
    }

    pub fn with_submission_delay(self, delay: Duration) -> Self {
        *self.submission_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn with_account_name(self, name: Result<String, ProviderError>) -> Self {
        *self.account_name.lock().unwrap() = name;
        self
    }

    pub fn with_balance(self, balance: Amount) -> Self {
        *self.balance.lock().unwrap() = Ok(balance);
        self
    }

    /// Queue answers for successive status inquiries; `pending` once exhausted
    pub fn with_statuses(self, statuses: Vec<Result<String, ProviderError>>) -> Self {
        *self.statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn submitted(&self) -> Vec<DisbursementPayload> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn inquire_account(&self, _bank_id: u32, _account_number: &str) -> Result<String, ProviderError> {
        self.account_name.lock().unwrap().clone()
    }

    async fn get_balance(&self) -> Result<Amount, ProviderError> {
        self.balance.lock().unwrap().clone()
    }

    async fn submit_disbursement(
        &self,
        payload: &DisbursementPayload,
    ) -> Result<SubmissionResponse, ProviderError> {
        self.submitted.lock().unwrap().push(payload.clone());
        let delay = *self.submission_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.submission.lock().unwrap().clone()
    }

    async fn inquire_status(
        &self,
        _payment_id: PaymentId,
        _provider_ref: Option<&str>,
    ) -> Result<String, ProviderError> {
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("pending".to_string()))
    }
}

/// Every engine component wired together in memory
pub struct Harness {
    pub config: Arc<EngineConfig>,
    pub ledger: Arc<LedgerStore>,
    pub payments: Arc<PaymentStore>,
    pub ops: Arc<BalanceOperations>,
    pub scheduler: Arc<ReconciliationScheduler>,
    pub orchestrator: DisbursementOrchestrator,
    pub provider: Arc<ScriptedProvider>,
    pub review: Arc<InMemoryReviewQueue>,
}

pub fn harness(provider: ScriptedProvider) -> Harness {
    harness_with_config(provider, EngineConfig::default())
}

pub fn harness_with_config(provider: ScriptedProvider, config: EngineConfig) -> Harness {
    let config = Arc::new(config);
    let ledger = Arc::new(LedgerStore::new());
    ledger
        .open_account(MERCHANT_ACCOUNT, AccountType::Creditor)
        .unwrap();
    let payments = Arc::new(PaymentStore::new());

    let pins = Argon2PinStore::with_params(8, 1).unwrap();
    for user in ["finance01", "merchant01", "cs01"] {
        pins.set_pin(user, PIN).unwrap();
    }

    let ops = Arc::new(BalanceOperations::new(
        Arc::clone(&ledger),
        Arc::clone(&payments),
        Arc::new(pins),
        Arc::new(AuthorizationPolicy::default()),
    ));
    let provider = Arc::new(provider);
    let review = Arc::new(InMemoryReviewQueue::new());
    let scheduler = Arc::new(ReconciliationScheduler::new(
        Arc::clone(&config),
        Arc::clone(&ops),
        provider.clone(),
        review.clone(),
    ));
    let orchestrator = DisbursementOrchestrator::new(
        Arc::clone(&config),
        Arc::new(BankCodeTranslator::default_table()),
        Arc::clone(&ops),
        Arc::clone(&scheduler),
        provider.clone(),
        review.clone(),
    );

    Harness {
        config,
        ledger,
        payments,
        ops,
        scheduler,
        orchestrator,
        provider,
        review,
    }
}

pub fn finance() -> Actor {
    Actor::new("finance01", UserType::UserOperation, Role::Finance)
}

pub fn merchant() -> Actor {
    Actor::new("merchant01", UserType::UserMerchant, Role::Admin).for_account(MERCHANT_ACCOUNT)
}

pub fn support() -> Actor {
    Actor::new("cs01", UserType::UserOperation, Role::CustomerSupport)
}

pub fn balance_request(amount: Amount) -> BalanceRequest {
    BalanceRequest {
        account_id: MERCHANT_ACCOUNT,
        amount,
        pin: PIN.to_string(),
        notes: None,
    }
}

pub fn disbursement(amount: Amount) -> DisbursementRequest {
    DisbursementRequest {
        account_id: MERCHANT_ACCOUNT,
        amount,
        bank_code: "IDR_014".to_string(),
        account_number: "1234567890".to_string(),
        account_name: "Budi Santoso".to_string(),
        pin: PIN.to_string(),
        notes: None,
    }
}

impl Harness {
    pub fn fund(&self, amount: Amount) {
        self.ops.top_up(&finance(), balance_request(amount)).unwrap();
    }

    /// (settled, unsettled) of the merchant account
    pub fn balances(&self) -> (Amount, Amount) {
        let account = self.ledger.account(MERCHANT_ACCOUNT).unwrap();
        (account.settled_balance, account.unsettled_balance)
    }
}
