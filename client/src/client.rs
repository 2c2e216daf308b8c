use crate::{Error, Result};
use bytes::Bytes;
use commonware_codec::{DecodeExt, Encode, Read};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest, Digestible};
use commonware_utils::hex;
use futures::future::{AbortRegistration, Abortable};
use serde::Deserialize;
use std::{future::Future, time::Duration};
use tracing::debug;
use url::Url;
use wagerline_types::{
    api::MAX_SUBMISSION_TRANSACTIONS, execution::Transaction, EscrowVault, Receipt, Submission,
    Wager,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Nonce and free balance of a principal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub nonce: u64,
    pub balance: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub ok: bool,
    pub height: u64,
}

/// HTTP client for a wagerline backend.
///
/// Every request is attempted once. Waiting for a receipt always carries an explicit
/// timeout and may additionally be cancelled through an [`AbortRegistration`].
#[derive(Clone)]
pub struct Client {
    pub base_url: Url,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl Client {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidScheme(scheme.to_string())),
        }
        Ok(Self {
            base_url,
            http: reqwest::Client::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// How often `wait_for_receipt` asks the backend for the receipt.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn submit(&self, transactions: Vec<Transaction>) -> Result<()> {
        if transactions.is_empty() {
            return Err(Error::EmptySubmission);
        }
        if transactions.len() > MAX_SUBMISSION_TRANSACTIONS {
            return Err(Error::TooManyTransactions {
                max: MAX_SUBMISSION_TRANSACTIONS,
                got: transactions.len(),
            });
        }
        let count = transactions.len();
        let body = Bytes::from(Submission::Transactions(transactions).encode().to_vec());
        let url = self.base_url.join("submit")?;
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::FailedWithBody { status, body });
        }
        debug!(count, "submitted transactions");
        Ok(())
    }

    pub async fn health(&self) -> Result<Health> {
        let url = self.base_url.join("healthz")?;
        self.get_json(url).await
    }

    pub async fn query_wager(&self, wager_id: u64) -> Result<Option<Wager>> {
        let url = self.base_url.join(&format!("wager/{wager_id}"))?;
        self.get_decoded(url).await
    }

    pub async fn query_vault(&self, wager_id: u64) -> Result<Option<EscrowVault>> {
        let url = self.base_url.join(&format!("vault/{wager_id}"))?;
        self.get_decoded(url).await
    }

    pub async fn query_account(&self, public: &PublicKey) -> Result<Account> {
        let url = self
            .base_url
            .join(&format!("account/{}", hex(&public.encode())))?;
        self.get_json(url).await
    }

    pub async fn query_receipt(&self, digest: &Digest) -> Result<Option<Receipt>> {
        let url = self
            .base_url
            .join(&format!("receipt/{}", hex(&digest.encode())))?;
        self.get_decoded(url).await
    }

    /// Polls for the receipt of `digest` until it exists, `timeout` elapses or `cancel`
    /// is aborted.
    pub async fn wait_for_receipt(
        &self,
        digest: Digest,
        timeout: Duration,
        cancel: Option<AbortRegistration>,
    ) -> Result<Receipt> {
        bounded(self.poll_receipt(digest), timeout, cancel).await
    }

    /// Submits `transaction` and waits for its receipt.
    ///
    /// `timeout` and `cancel` cover both the submission and the wait. A rejected
    /// transition still yields `Ok` with a rejected receipt.
    pub async fn submit_and_confirm(
        &self,
        transaction: Transaction,
        timeout: Duration,
        cancel: Option<AbortRegistration>,
    ) -> Result<Receipt> {
        let digest = transaction.digest();
        bounded(
            async {
                self.submit(vec![transaction]).await?;
                self.poll_receipt(digest).await
            },
            timeout,
            cancel,
        )
        .await
    }

    async fn poll_receipt(&self, digest: Digest) -> Result<Receipt> {
        loop {
            if let Some(receipt) = self.query_receipt(&digest).await? {
                return Ok(receipt);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn get_decoded<T: Read<Cfg = ()>>(&self, url: Url) -> Result<Option<T>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::FailedWithBody { status, body });
        }
        let bytes = response.bytes().await?;
        Ok(Some(T::decode(bytes.as_ref())?))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::FailedWithBody { status, body });
        }
        Ok(response.json().await?)
    }
}

async fn bounded<T>(
    future: impl Future<Output = Result<T>>,
    timeout: Duration,
    cancel: Option<AbortRegistration>,
) -> Result<T> {
    let timed = async {
        match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    };
    match cancel {
        Some(registration) => Abortable::new(timed, registration)
            .await
            .unwrap_or(Err(Error::Cancelled)),
        None => timed.await,
    }
}
