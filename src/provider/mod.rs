//! External payment provider interface
//!
//! The provider's wire protocol lives outside this crate; the engine only
//! needs the four calls below. Implementations must be cheap to share across
//! tasks (`Arc<dyn PaymentProvider>`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::types::{Amount, LedgerError, PaymentId};

/// HTTP-style status the provider returns for an accepted submission
pub const HTTP_OK: u16 = 200;

/// HTTP-style status the provider returns for a rejected submission
pub const HTTP_UNPROCESSABLE: u16 = 422;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Unavailable(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for LedgerError {
    fn from(error: ProviderError) -> Self {
        LedgerError::provider_unavailable(error.to_string())
    }
}

/// Disbursement request body as the provider expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisbursementPayload {
    pub sender_first_name: String,
    pub sender_last_name: String,
    pub bank_id: u32,
    pub account_number: String,
    pub account_name: String,
    pub amount: Amount,
    pub currency: String,
    pub country_iso: String,
    pub notes: String,
    pub mode: String,
    /// Our payment id, echoed back on callbacks
    pub external_id: PaymentId,
}

/// Synchronous answer to a disbursement submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub http_status: u16,
    pub provider_state: String,
    pub provider_ref: Option<String>,
}

/// Operations the engine consumes from the payment provider
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Look up the holder name of a destination bank account
    async fn inquire_account(
        &self,
        bank_id: u32,
        account_number: &str,
    ) -> Result<String, ProviderError>;

    /// Float currently available at the provider for payouts
    async fn get_balance(&self) -> Result<Amount, ProviderError>;

    async fn submit_disbursement(
        &self,
        payload: &DisbursementPayload,
    ) -> Result<SubmissionResponse, ProviderError>;

    /// Current provider-side state string of a payment
    async fn inquire_status(
        &self,
        payment_id: PaymentId,
        provider_ref: Option<&str>,
    ) -> Result<String, ProviderError>;
}

/// Await a provider call, bounded by `timeout`
///
/// # Returns
///
/// * `Ok(T)` - the provider answered in time
/// * `Err(LedgerError::ProviderTimeout)` - no answer within `timeout`
/// * `Err(LedgerError::ProviderUnavailable)` - the call itself failed
pub async fn call_with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(LedgerError::from),
        Err(_) => Err(LedgerError::ProviderTimeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
