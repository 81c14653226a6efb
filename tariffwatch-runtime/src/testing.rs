//! Fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tariffwatch_engie::{
    EngieError, PriceSource, RawPriceConfiguration, RawPriceConfigurations, RawPriceItem,
    RawPricePeriod, RawPriceResponse, TokenProvider,
};
use tokio::sync::{Notify, watch};

// ============================================================================
// Token Provider
// ============================================================================

pub(crate) struct FakeTokens {
    pub(crate) current: Mutex<String>,
    pub(crate) reauth: AtomicBool,
    pub(crate) expiring: AtomicBool,
    pub(crate) refresh_failures: Mutex<VecDeque<EngieError>>,
    pub(crate) refreshes: AtomicUsize,
    pub(crate) renewals: AtomicUsize,
    health: watch::Sender<bool>,
}

impl FakeTokens {
    pub(crate) fn new() -> Self {
        let (health, _) = watch::channel(true);
        Self {
            current: Mutex::new("AT-0".to_string()),
            reauth: AtomicBool::new(false),
            expiring: AtomicBool::new(true),
            refresh_failures: Mutex::new(VecDeque::new()),
            refreshes: AtomicUsize::new(0),
            renewals: AtomicUsize::new(0),
            health,
        }
    }

    pub(crate) fn fail_next_refresh(&self, err: EngieError) {
        self.refresh_failures.lock().unwrap().push_back(err);
    }

    pub(crate) fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub(crate) fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }

    fn rotate(&self) -> Result<String, EngieError> {
        if self.reauth.load(Ordering::SeqCst) {
            return Err(EngieError::ReauthRequired("dead".into()));
        }
        if let Some(err) = self.refresh_failures.lock().unwrap().pop_front() {
            if err.is_reauth_required() {
                self.reauth.store(true, Ordering::SeqCst);
                self.health.send_replace(false);
            }
            return Err(err);
        }
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("AT-{n}");
        self.current.lock().unwrap().clone_from(&token);
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn access_token(&self) -> Result<String, EngieError> {
        if self.reauth.load(Ordering::SeqCst) {
            return Err(EngieError::ReauthRequired("dead".into()));
        }
        Ok(self.current.lock().unwrap().clone())
    }

    async fn renew_after_rejection(&self, _rejected: &str) -> Result<String, EngieError> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        self.rotate()
    }

    async fn refresh_if_expiring(&self, _margin: Duration) -> Result<bool, EngieError> {
        if !self.expiring.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.rotate().map(|_| true)
    }

    fn needs_reauth(&self) -> bool {
        self.reauth.load(Ordering::SeqCst)
    }

    fn subscribe_health(&self) -> watch::Receiver<bool> {
        self.health.subscribe()
    }
}

// ============================================================================
// Price Source
// ============================================================================

pub(crate) struct FakePrices {
    pub(crate) responses: Mutex<VecDeque<Result<RawPriceResponse, EngieError>>>,
    pub(crate) calls: AtomicUsize,
    pub(crate) tokens_seen: Mutex<Vec<String>>,
    pub(crate) gate: Option<Notify>,
    pub(crate) entered: Notify,
}

impl FakePrices {
    pub(crate) fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            tokens_seen: Mutex::new(Vec::new()),
            gate: None,
            entered: Notify::new(),
        }
    }

    /// Calls block until `gate` is notified.
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new()
        }
    }

    pub(crate) fn push(&self, response: Result<RawPriceResponse, EngieError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for FakePrices {
    async fn fetch_prices(
        &self,
        access_token: &str,
        _customer_number: &str,
    ) -> Result<RawPriceResponse, EngieError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(access_token.to_string());
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(sample_response()))
    }
}

pub(crate) fn sample_response() -> RawPriceResponse {
    let config = |price: f64| RawPriceConfiguration {
        price_value: Some(price),
        price_value_excl_vat: Some(price * 0.94),
        time_of_use_slot_code: Some("TOTAL_HOURS".to_string()),
    };
    RawPriceResponse {
        items: vec![RawPriceItem {
            ean: "541448820012345678_ID1".to_string(),
            prices: vec![RawPricePeriod {
                from: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
                to: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                vat_tariff: Some(0.06),
                proportional_price_configurations: RawPriceConfigurations {
                    offtake: vec![config(0.30)],
                    injection: vec![config(0.05)],
                },
            }],
        }],
    }
}
