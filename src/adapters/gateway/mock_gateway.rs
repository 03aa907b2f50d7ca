//! Mock payment gateway for testing.
//!
//! Provides a configurable implementation of `PaymentGateway` for unit and
//! integration tests. Supports:
//! - Pre-configured invoices, charge outcomes and transactions
//! - Error injection, persistent or for a fixed number of calls
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::payment::GatewayError;
use crate::ports::{
    ChargeCardRequest, ChargeResult, GatewayTransaction, InitiatePaymentRequest, InvoiceCreated,
    PaymentGateway, RefundRequest,
};

/// Mock payment gateway.
///
/// # Example
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
/// gateway.set_next_invoice("INV-1", "https://pay.example/INV-1");
/// gateway.fail_times("check_payment_status", GatewayError::unavailable("check_payment_status", "503"), 2);
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    invoice_counter: u64,
    next_invoice: Option<InvoiceCreated>,
    charge_result: Option<ChargeResult>,
    transactions: HashMap<String, GatewayTransaction>,
    method_errors: HashMap<&'static str, GatewayError>,
    counted_errors: HashMap<&'static str, (GatewayError, usize)>,
    call_log: Vec<MethodCall>,
    refunds: Vec<RefundRequest>,
    charges: Vec<ChargeCardRequest>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: &'static str,
    pub args: Vec<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Invoice returned by the next `initiate_payment` call.
    ///
    /// Without one, invoices are numbered `INV-1`, `INV-2`, ...
    pub fn set_next_invoice(&self, invoice_id: impl Into<String>, redirect_url: impl Into<String>) {
        self.inner.lock().unwrap().next_invoice = Some(InvoiceCreated {
            invoice_id: invoice_id.into(),
            redirect_url: redirect_url.into(),
        });
    }

    /// Outcome of every subsequent `charge_card_with_token` call.
    pub fn set_charge_result(&self, result: ChargeResult) {
        self.inner.lock().unwrap().charge_result = Some(result);
    }

    /// Transaction returned by `check_payment_status` for its invoice.
    pub fn set_transaction(&self, transaction: GatewayTransaction) {
        self.inner
            .lock()
            .unwrap()
            .transactions
            .insert(transaction.invoice_id.clone(), transaction);
    }

    /// Fail every call to `method` with `error`.
    pub fn set_error(&self, method: &'static str, error: GatewayError) {
        self.inner.lock().unwrap().method_errors.insert(method, error);
    }

    /// Fail the next `times` calls to `method` with `error`.
    pub fn fail_times(&self, method: &'static str, error: GatewayError, times: usize) {
        self.inner
            .lock()
            .unwrap()
            .counted_errors
            .insert(method, (error, times));
    }

    /// Remove all injected errors.
    pub fn clear_errors(&self) {
        let mut state = self.inner.lock().unwrap();
        state.method_errors.clear();
        state.counted_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Assertions
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.inner.lock().unwrap().call_log.clone()
    }

    /// Number of calls made to `method`.
    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn refund_requests(&self) -> Vec<RefundRequest> {
        self.inner.lock().unwrap().refunds.clone()
    }

    pub fn charge_requests(&self) -> Vec<ChargeCardRequest> {
        self.inner.lock().unwrap().charges.clone()
    }

    fn record(&self, method: &'static str, args: Vec<String>) -> Result<(), GatewayError> {
        let mut state = self.inner.lock().unwrap();
        state.call_log.push(MethodCall { method, args });

        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some((error, remaining)) = state.counted_errors.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(error.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn get_auth_token(&self) -> Result<String, GatewayError> {
        self.record("get_auth_token", vec![])?;
        Ok("mock-token".to_string())
    }

    async fn initiate_payment(
        &self,
        request: InitiatePaymentRequest,
    ) -> Result<InvoiceCreated, GatewayError> {
        self.record(
            "initiate_payment",
            vec![request.amount.to_string(), request.currency.to_string()],
        )?;
        let mut state = self.inner.lock().unwrap();
        if let Some(invoice) = state.next_invoice.take() {
            return Ok(invoice);
        }
        state.invoice_counter += 1;
        let invoice_id = format!("INV-{}", state.invoice_counter);
        Ok(InvoiceCreated {
            redirect_url: format!("https://gateway.test/pay/{}", invoice_id),
            invoice_id,
        })
    }

    async fn charge_card_with_token(
        &self,
        request: ChargeCardRequest,
    ) -> Result<ChargeResult, GatewayError> {
        self.record(
            "charge_card_with_token",
            vec![request.invoice_id.clone(), request.amount.to_string()],
        )?;
        let mut state = self.inner.lock().unwrap();
        let result = state.charge_result.clone().unwrap_or_else(|| ChargeResult::Approved {
            transaction_id: format!("TX-{}", request.invoice_id),
            approval_code: Some("000000".to_string()),
            card_mask: Some("4400****0000".to_string()),
        });
        state.charges.push(request);
        Ok(result)
    }

    async fn check_payment_status(
        &self,
        invoice_id: &str,
    ) -> Result<Option<GatewayTransaction>, GatewayError> {
        self.record("check_payment_status", vec![invoice_id.to_string()])?;
        Ok(self.inner.lock().unwrap().transactions.get(invoice_id).cloned())
    }

    async fn refund_payment(&self, request: RefundRequest) -> Result<(), GatewayError> {
        self.record(
            "refund_payment",
            vec![
                request.invoice_id.clone(),
                request.amount.map(|a| a.to_string()).unwrap_or_default(),
            ],
        )?;
        self.inner.lock().unwrap().refunds.push(request);
        Ok(())
    }

    async fn cancel_payment(&self, invoice_id: &str) -> Result<(), GatewayError> {
        self.record("cancel_payment", vec![invoice_id.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::MemberId;
    use crate::domain::payment::Currency;

    fn initiate_request() -> InitiatePaymentRequest {
        InitiatePaymentRequest {
            member_id: MemberId::new(),
            amount: 5000,
            currency: Currency::parse("KZT").unwrap(),
            description: "Late return fine".to_string(),
        }
    }

    #[tokio::test]
    async fn numbers_invoices_when_unconfigured() {
        let gateway = MockPaymentGateway::new();
        let first = gateway.initiate_payment(initiate_request()).await.unwrap();
        let second = gateway.initiate_payment(initiate_request()).await.unwrap();

        assert_eq!(first.invoice_id, "INV-1");
        assert_eq!(second.invoice_id, "INV-2");
    }

    #[tokio::test]
    async fn counted_errors_run_out() {
        let gateway = MockPaymentGateway::new();
        gateway.fail_times(
            "check_payment_status",
            GatewayError::unavailable("check_payment_status", "503"),
            1,
        );

        assert!(gateway.check_payment_status("INV-1").await.is_err());
        assert_eq!(gateway.check_payment_status("INV-1").await, Ok(None));
        assert_eq!(gateway.call_count("check_payment_status"), 2);
    }
}
