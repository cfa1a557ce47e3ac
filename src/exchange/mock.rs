//! Scripted in-memory exchange for tests and paper runs.
//!
//! Market books, catalogues, funds, and order outcomes are set up
//! front; every placement and cancellation is recorded so tests can
//! assert on the exact instructions submitted.

use crate::exchange::error::ExchangeError;
use crate::exchange::traits::ExchangeApi;
use crate::exchange::types::*;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// In-memory [`ExchangeApi`] implementation.
pub struct MockExchange {
    authenticated: Mutex<bool>,
    catalogues: Mutex<Vec<MarketCatalogue>>,
    books: Mutex<HashMap<String, MarketBook>>,
    funds: Mutex<AccountFunds>,
    /// Instructions recorded by `place_order`, with their market ids.
    pub placed: Mutex<Vec<(String, PlaceInstruction)>>,
    /// Bet ids recorded by `cancel_orders`.
    pub cancelled: Mutex<Vec<String>>,
    fail_placement: Mutex<Option<String>>,
    fail_cancel: Mutex<bool>,
    next_bet_id: AtomicU64,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            authenticated: Mutex::new(true),
            catalogues: Mutex::new(Vec::new()),
            books: Mutex::new(HashMap::new()),
            funds: Mutex::new(AccountFunds {
                available_to_bet_balance: Decimal::new(1000, 0),
                exposure: Decimal::ZERO,
                retained_commission: Decimal::ZERO,
            }),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_placement: Mutex::new(None),
            fail_cancel: Mutex::new(false),
            next_bet_id: AtomicU64::new(1),
        }
    }

    pub fn set_catalogues(&self, catalogues: Vec<MarketCatalogue>) {
        *self.catalogues.lock().unwrap() = catalogues;
    }

    pub fn set_book(&self, book: MarketBook) {
        self.books
            .lock()
            .unwrap()
            .insert(book.market_id.clone(), book);
    }

    pub fn remove_book(&self, market_id: &str) {
        self.books.lock().unwrap().remove(market_id);
    }

    pub fn set_available_balance(&self, available: Decimal) {
        self.funds.lock().unwrap().available_to_bet_balance = available;
    }

    /// Make subsequent placements fail with the given error code.
    pub fn fail_next_placements(&self, error_code: &str) {
        *self.fail_placement.lock().unwrap() = Some(error_code.to_string());
    }

    /// Make subsequent cancellations report FAILURE.
    pub fn fail_cancellations(&self, fail: bool) {
        *self.fail_cancel.lock().unwrap() = fail;
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        *self.authenticated.lock().unwrap() = authenticated;
    }

    pub fn placed_count(&self) -> usize {
        self.placed.lock().unwrap().len()
    }
}

#[async_trait]
impl ExchangeApi for MockExchange {
    async fn login(&self) -> Result<(), ExchangeError> {
        *self.authenticated.lock().unwrap() = true;
        Ok(())
    }

    async fn is_authenticated(&self) -> bool {
        *self.authenticated.lock().unwrap()
    }

    async fn list_market_catalogue(
        &self,
        filter: &MarketFilter,
        max_results: u32,
    ) -> Result<Vec<MarketCatalogue>, ExchangeError> {
        let catalogues = self.catalogues.lock().unwrap();
        let filtered: Vec<MarketCatalogue> = catalogues
            .iter()
            .filter(|c| match &filter.market_ids {
                Some(ids) => ids.contains(&c.market_id),
                None => true,
            })
            .take(max_results as usize)
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn list_market_book(
        &self,
        market_ids: &[String],
    ) -> Result<Vec<MarketBook>, ExchangeError> {
        let books = self.books.lock().unwrap();
        Ok(market_ids
            .iter()
            .filter_map(|id| books.get(id).cloned())
            .collect())
    }

    async fn place_order(
        &self,
        market_id: &str,
        instruction: PlaceInstruction,
        _customer_ref: &str,
    ) -> Result<PlaceExecutionReport, ExchangeError> {
        self.placed
            .lock()
            .unwrap()
            .push((market_id.to_string(), instruction));

        if let Some(code) = self.fail_placement.lock().unwrap().clone() {
            return Ok(PlaceExecutionReport {
                status: InstructionStatus::Failure,
                error_code: Some(code.clone()),
                instruction_reports: vec![PlaceInstructionReport {
                    status: InstructionStatus::Failure,
                    error_code: Some(code),
                    bet_id: None,
                    average_price_matched: None,
                    size_matched: None,
                }],
            });
        }

        let bet_id = self.next_bet_id.fetch_add(1, Ordering::SeqCst);
        Ok(PlaceExecutionReport {
            status: InstructionStatus::Success,
            error_code: None,
            instruction_reports: vec![PlaceInstructionReport {
                status: InstructionStatus::Success,
                error_code: None,
                bet_id: Some(format!("bet-{bet_id}")),
                average_price_matched: None,
                size_matched: None,
            }],
        })
    }

    async fn cancel_orders(
        &self,
        _market_id: &str,
        bet_ids: &[String],
    ) -> Result<CancelExecutionReport, ExchangeError> {
        let fail = *self.fail_cancel.lock().unwrap();
        if !fail {
            self.cancelled.lock().unwrap().extend_from_slice(bet_ids);
        }
        let status = if fail {
            InstructionStatus::Failure
        } else {
            InstructionStatus::Success
        };
        Ok(CancelExecutionReport {
            status,
            error_code: fail.then(|| "BET_TAKEN_OR_LAPSED".to_string()),
            instruction_reports: bet_ids
                .iter()
                .map(|_| CancelInstructionReport {
                    status,
                    error_code: None,
                    size_cancelled: None,
                })
                .collect(),
        })
    }

    async fn account_funds(&self) -> Result<AccountFunds, ExchangeError> {
        Ok(self.funds.lock().unwrap().clone())
    }
}
