//! Transaction lifecycle state machine.
//!
//! [`CheckoutSession`] owns the single current order and the paid-line-item
//! collection, sequences Authenticate -> Approve, and processes deposit
//! confirmation and full/partial cancellation against the paid snapshot.
//! Every backend exchange, successful or rejected, is recorded in the audit
//! history before the outcome is reported.

use std::collections::HashSet;
use std::sync::Arc;

use strum::Display;
use uuid::Uuid;

use crate::audit::{ApiOperation, AuditLog};
use crate::backend::{
    ApproveRequest, AuthenticateRequest, BillingResponse, CancelAllRequest, CancelPartialRequest,
    CancelProduct, DepositRequest, OrderData, PaymentBackend, TokenDeleteRequest, TokenListRequest,
    TokenPayRequest, TokenRegisterRequest, TokenVerifyPasswordRequest,
};
use crate::error::{CheckoutError, Result};
use crate::storage::StorageAdapter;
use crate::types::{
    CancelSelection, DraftOrder, MethodKind, Order, PaidLineItem, PaymentMethod, ShippingCharge,
    TokenInfo, representative_name,
};
use crate::window::{self, WindowHost};

const DEFAULT_RETURN_URL: &str = "https://checkout.example.com/payment-callback.html";
const DEFAULT_FAIL_URL: &str = "https://checkout.example.com/payment-callback-fail.html";

/// Where the session sits in the payment lifecycle. Partial cancellation
/// keeps the session in `Paid`; only a full cancellation returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LifecycleState {
    Idle,
    Authenticating,
    Approving,
    Paid,
}

/// Configuration for a checkout session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Callback page the gateway redirects to on success.
    pub return_url: Option<String>,
    /// Callback page the gateway redirects to on failure.
    pub fail_url: Option<String>,
}

/// Transient token-selection state, reset whenever the selected token is
/// deleted or a token payment completes.
#[derive(Debug, Clone, Default)]
pub struct TokenSelection {
    pub selected_token_id: Option<String>,
    pub password_verified: bool,
}

#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub ord_no: String,
    pub order_id: String,
    pub gateway_name: String,
    pub transaction_id: String,
    pub approval_number: String,
}

#[derive(Debug, Clone)]
pub struct DepositReceipt {
    pub deposit_id: String,
    pub confirm_date: String,
}

#[derive(Debug, Clone)]
pub struct CancelReceipt {
    pub cancel_id: String,
    pub cancel_date: String,
}

#[derive(Debug, Clone)]
pub struct PartialCancelOutcome {
    pub cancel_id: String,
    pub cancelled_item_ids: Vec<String>,
    pub cancel_amount: u64,
    pub add_shipping_fee: u64,
}

/// The checkout driver. One session owns one current order at a time.
///
/// Methods take `&mut self`, so transaction-affecting operations cannot
/// interleave against the same order.
pub struct CheckoutSession<B, H> {
    backend: B,
    host: H,
    audit: AuditLog,
    state: LifecycleState,
    order: Option<Order>,
    paid_items: Vec<PaidLineItem>,
    paid_method: Option<MethodKind>,
    tokens: Vec<TokenInfo>,
    selection: TokenSelection,
    return_url: String,
    fail_url: String,
}

impl<B: PaymentBackend, H: WindowHost> CheckoutSession<B, H> {
    pub fn new(backend: B, host: H, storage: Arc<dyn StorageAdapter>) -> Self {
        Self::with_options(backend, host, storage, SessionOptions::default())
    }

    pub fn with_options(
        backend: B,
        host: H,
        storage: Arc<dyn StorageAdapter>,
        options: SessionOptions,
    ) -> Self {
        Self {
            backend,
            host,
            audit: AuditLog::load(storage),
            state: LifecycleState::Idle,
            order: None,
            paid_items: Vec::new(),
            paid_method: None,
            tokens: Vec::new(),
            selection: TokenSelection::default(),
            return_url: options
                .return_url
                .unwrap_or_else(|| DEFAULT_RETURN_URL.to_string()),
            fail_url: options
                .fail_url
                .unwrap_or_else(|| DEFAULT_FAIL_URL.to_string()),
        }
    }

    // ==================== Accessors ====================

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn current_order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn paid_items(&self) -> &[PaidLineItem] {
        &self.paid_items
    }

    /// Sum of all remaining amounts across the paid set.
    pub fn paid_remaining_total(&self) -> u64 {
        self.paid_items.iter().map(|p| p.remaining_total()).sum()
    }

    pub fn tokens(&self) -> &[TokenInfo] {
        &self.tokens
    }

    pub fn token_selection(&self) -> &TokenSelection {
        &self.selection
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn clear_audit(&mut self, confirmed: bool) -> Result<()> {
        self.audit.clear(confirmed)
    }

    // ==================== Payment ====================

    /// Start a payment for the draft order.
    ///
    /// Validates the draft and the method-specific required fields, then
    /// either completes a token payment in a single round trip or runs the
    /// authenticate -> window -> approve sequence. On success the current
    /// line items are snapshotted into the paid set and the session is
    /// `Paid`; on any failure the session returns to `Idle` with no order
    /// retained.
    pub async fn start_payment(
        &mut self,
        draft: &DraftOrder,
        method: &PaymentMethod,
    ) -> Result<PaymentReceipt> {
        if self.state != LifecycleState::Idle {
            return Err(CheckoutError::invalid_state(format!(
                "cannot start a payment while {}",
                self.state
            )));
        }
        if draft.items.is_empty() {
            return Err(CheckoutError::validation(
                "at least one line item is required",
            ));
        }
        if draft.customer.user_ref.trim().is_empty() {
            return Err(CheckoutError::validation("customer userRef is required"));
        }
        method.validate()?;

        if matches!(method, PaymentMethod::Token) {
            return self.complete_token_payment(draft).await;
        }

        self.state = LifecycleState::Authenticating;
        match self.run_authenticated_payment(draft, method).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                self.state = LifecycleState::Idle;
                Err(e)
            }
        }
    }

    async fn run_authenticated_payment(
        &mut self,
        draft: &DraftOrder,
        method: &PaymentMethod,
    ) -> Result<PaymentReceipt> {
        let order_id = new_order_id();
        let request = AuthenticateRequest {
            order_id: order_id.clone(),
            representative_product_name: representative_name(&draft.items),
            product_amount: draft.product_amount(),
            shipping_amount: draft.shipping_amount(),
            total_amount: draft.total_amount(),
            order_data: OrderData {
                products: draft.items.clone(),
                customer: draft.customer.clone(),
            },
            payment_data: method.clone(),
            return_url: self.return_url.clone(),
            fail_url: self.fail_url.clone(),
        };

        let response = self.backend.authenticate(&request).await?;
        self.audit.record(
            ApiOperation::Authenticate,
            serde_json::to_value(&request)?,
            serde_json::to_value(&response)?,
        );
        reject_on_failure(ApiOperation::Authenticate, &response)?;

        tracing::info!(gateway = %response.gateway_name, "opening payment window");
        let auth = window::authenticate(&self.host, &response).await?;

        self.state = LifecycleState::Approving;
        let approve_request = ApproveRequest {
            ord_no: response.ord_no.clone(),
            order_id: order_id.clone(),
            gateway_id: auth.gateway_id.clone(),
            callback_payload: auth.payload.clone(),
            timestamp: auth.timestamp.clone(),
        };
        let approval = self.backend.approve(&approve_request).await?;
        self.audit.record(
            ApiOperation::Approve,
            serde_json::to_value(&approve_request)?,
            serde_json::to_value(&approval)?,
        );
        reject_on_failure(ApiOperation::Approve, &approval)?;

        self.order = Some(Order {
            ord_no: response.ord_no.clone(),
            order_id: order_id.clone(),
            gateway_id: response.gateway_id.clone(),
            gateway_name: response.gateway_name.clone(),
        });
        self.paid_items = draft
            .items
            .iter()
            .cloned()
            .map(PaidLineItem::new)
            .collect();
        self.paid_method = Some(method.kind());
        self.state = LifecycleState::Paid;

        tracing::info!(
            ord_no = %response.ord_no,
            approval = %approval.approval_number,
            "payment approved"
        );

        Ok(PaymentReceipt {
            ord_no: response.ord_no,
            order_id,
            gateway_name: response.gateway_name,
            transaction_id: approval.transaction_id,
            approval_number: approval.approval_number,
        })
    }

    /// Token payments skip authentication entirely: one round trip marks the
    /// order paid.
    async fn complete_token_payment(&mut self, draft: &DraftOrder) -> Result<PaymentReceipt> {
        let Some(token_id) = self.selection.selected_token_id.clone() else {
            return Err(CheckoutError::validation("a payment token must be selected"));
        };
        let Some(token) = self.tokens.iter().find(|t| t.token_id == token_id).cloned() else {
            return Err(CheckoutError::validation(
                "the selected token is no longer registered",
            ));
        };
        if token.has_password && !self.selection.password_verified {
            return Err(CheckoutError::validation(
                "token password verification is required",
            ));
        }

        let order_id = new_order_id();
        let request = TokenPayRequest {
            order_id: order_id.clone(),
            user_ref: draft.customer.user_ref.clone(),
            token_id: token.token_id.clone(),
            token_name: token.name.clone(),
            representative_product_name: representative_name(&draft.items),
            product_amount: draft.product_amount(),
            shipping_amount: draft.shipping_amount(),
            total_amount: draft.total_amount(),
        };

        let response = self.backend.token_pay(&request).await?;
        self.audit.record(
            ApiOperation::TokenPay,
            serde_json::to_value(&request)?,
            serde_json::to_value(&response)?,
        );
        reject_on_failure(ApiOperation::TokenPay, &response)?;

        self.order = Some(Order {
            ord_no: response.ord_no.clone(),
            order_id: order_id.clone(),
            gateway_id: "TOKEN".to_string(),
            gateway_name: "Token payment".to_string(),
        });
        self.paid_items = draft
            .items
            .iter()
            .cloned()
            .map(PaidLineItem::new)
            .collect();
        self.paid_method = Some(MethodKind::Token);
        self.state = LifecycleState::Paid;
        self.selection = TokenSelection::default();

        tracing::info!(ord_no = %response.ord_no, token = %token.token_id, "token payment approved");

        Ok(PaymentReceipt {
            ord_no: response.ord_no,
            order_id,
            gateway_name: "Token payment".to_string(),
            transaction_id: response.transaction_id,
            approval_number: response.approval_number,
        })
    }

    // ==================== Deposit ====================

    /// Report the virtual-account deposit as completed. Valid only while
    /// `Paid` with a virtual-account order; records the call, no transition.
    pub async fn confirm_deposit(&mut self) -> Result<DepositReceipt> {
        let order = self.require_paid_order("deposit confirmation")?;
        if self.paid_method != Some(MethodKind::Vbank) {
            return Err(CheckoutError::invalid_state(
                "deposit confirmation is only available for virtual-account payments",
            ));
        }
        if self.paid_items.is_empty() {
            return Err(CheckoutError::invalid_state(
                "deposit confirmation requires at least one paid line item",
            ));
        }

        let request = DepositRequest {
            ord_no: order.ord_no.clone(),
            deposit_type: "VBANK_DEPOSIT".to_string(),
            products: self.paid_items.clone(),
            deposit_amount: self.paid_remaining_total(),
            deposit_date: chrono::Utc::now().to_rfc3339(),
        };

        let response = self.backend.confirm_deposit(&request).await?;
        self.audit.record(
            ApiOperation::ConfirmDeposit,
            serde_json::to_value(&request)?,
            serde_json::to_value(&response)?,
        );
        reject_on_failure(ApiOperation::ConfirmDeposit, &response)?;

        Ok(DepositReceipt {
            deposit_id: response.deposit_id,
            confirm_date: response.confirm_date,
        })
    }

    // ==================== Cancellation ====================

    /// Cancel the whole paid order. Requires the caller to pass an explicit
    /// confirmation; on success the paid set is emptied, the order cleared,
    /// and the session returns to `Idle`.
    pub async fn cancel_all(&mut self, confirmed: bool) -> Result<CancelReceipt> {
        let order = self.require_paid_order("full cancellation")?;
        if !confirmed {
            return Err(CheckoutError::validation(
                "full cancellation requires confirmation",
            ));
        }

        let request = CancelAllRequest {
            ord_no: order.ord_no.clone(),
            cancel_type: "FULL".to_string(),
            products: self.paid_items.clone(),
            cancel_amount: self.paid_remaining_total(),
            cancel_reason: "customer request".to_string(),
        };

        let response = self.backend.cancel_all(&request).await?;
        self.audit.record(
            ApiOperation::CancelAll,
            serde_json::to_value(&request)?,
            serde_json::to_value(&response)?,
        );
        reject_on_failure(ApiOperation::CancelAll, &response)?;

        self.paid_items.clear();
        self.order = None;
        self.paid_method = None;
        self.state = LifecycleState::Idle;

        tracing::info!(cancel_id = %response.cancel_id, "order fully cancelled");

        Ok(CancelReceipt {
            cancel_id: response.cancel_id,
            cancel_date: response.cancel_date,
        })
    }

    /// Cancel part of the paid order.
    ///
    /// Selections exceeding an item's remaining amounts, zero-amount
    /// selections, and duplicates are rejected before anything is sent;
    /// nothing is clamped and no paid item is mutated on rejection. The
    /// session stays `Paid` even when the paid set becomes empty -- only
    /// [`Self::cancel_all`] clears the order.
    pub async fn cancel_partial(
        &mut self,
        selections: &[CancelSelection],
        extra_shipping: &[ShippingCharge],
    ) -> Result<PartialCancelOutcome> {
        let order = self.require_paid_order("partial cancellation")?;

        if selections.is_empty() {
            return Err(CheckoutError::validation(
                "select at least one line item to cancel",
            ));
        }

        let mut seen = HashSet::new();
        let mut cancel_products = Vec::with_capacity(selections.len());
        for selection in selections {
            if !seen.insert(selection.line_item_id.as_str()) {
                return Err(CheckoutError::validation(format!(
                    "line item {} is selected more than once",
                    selection.line_item_id
                )));
            }
            let Some(paid) = self
                .paid_items
                .iter()
                .find(|p| p.item.id == selection.line_item_id)
            else {
                return Err(CheckoutError::validation(format!(
                    "line item {} is not part of the paid order",
                    selection.line_item_id
                )));
            };
            if selection.cancel_total() == 0 {
                return Err(CheckoutError::validation(format!(
                    "cancel amount must be greater than zero for line item {}",
                    selection.line_item_id
                )));
            }
            if selection.cancel_price > paid.remaining_price {
                return Err(CheckoutError::validation(format!(
                    "cancel price {} exceeds remaining price {} for line item {}",
                    selection.cancel_price, paid.remaining_price, selection.line_item_id
                )));
            }
            if selection.cancel_shipping > paid.remaining_shipping {
                return Err(CheckoutError::validation(format!(
                    "cancel shipping {} exceeds remaining shipping {} for line item {}",
                    selection.cancel_shipping, paid.remaining_shipping, selection.line_item_id
                )));
            }

            // The snapshot sent to the backend reflects the current
            // remaining amounts, not the originally paid ones.
            let mut item = paid.item.clone();
            item.price = paid.remaining_price;
            item.shipping_fee = paid.remaining_shipping;
            cancel_products.push(CancelProduct {
                item,
                cancel_price: selection.cancel_price,
                cancel_shipping: selection.cancel_shipping,
            });
        }

        for charge in extra_shipping {
            if charge.fee == 0 {
                return Err(CheckoutError::validation(format!(
                    "additional shipping fee must be greater than zero for {}",
                    charge.id
                )));
            }
        }

        let cancel_amount: u64 = selections.iter().map(CancelSelection::cancel_total).sum();
        let add_shipping_fee: u64 = extra_shipping.iter().map(|c| c.fee).sum();

        let request = CancelPartialRequest {
            ord_no: order.ord_no.clone(),
            cancel_type: "PARTIAL".to_string(),
            cancel_products,
            cancel_amount,
            cancel_reason: "partial cancellation request".to_string(),
            add_shipping_products: (!extra_shipping.is_empty())
                .then(|| extra_shipping.to_vec()),
            add_shipping_fee: (!extra_shipping.is_empty()).then_some(add_shipping_fee),
        };

        let response = self.backend.cancel_partial(&request).await?;
        self.audit.record(
            ApiOperation::CancelPartial,
            serde_json::to_value(&request)?,
            serde_json::to_value(&response)?,
        );
        reject_on_failure(ApiOperation::CancelPartial, &response)?;

        let mut cancelled_item_ids = Vec::new();
        for selection in selections {
            let Some(idx) = self
                .paid_items
                .iter()
                .position(|p| p.item.id == selection.line_item_id)
            else {
                continue;
            };
            let paid = &mut self.paid_items[idx];
            if selection.cancel_price >= paid.remaining_price
                && selection.cancel_shipping >= paid.remaining_shipping
            {
                cancelled_item_ids.push(selection.line_item_id.clone());
                self.paid_items.remove(idx);
            } else {
                paid.remaining_price -= selection.cancel_price;
                paid.remaining_shipping -= selection.cancel_shipping;
                cancelled_item_ids.push(selection.line_item_id.clone());
            }
        }

        tracing::info!(
            cancel_id = %response.cancel_id,
            cancel_amount,
            add_shipping_fee,
            "partial cancellation applied"
        );

        Ok(PartialCancelOutcome {
            cancel_id: response.cancel_id,
            cancelled_item_ids,
            cancel_amount,
            add_shipping_fee,
        })
    }

    // ==================== Token management ====================

    /// Fetch the registered tokens for `user_ref` and refresh the local
    /// cache. Clears the selection when the selected token disappeared.
    pub async fn refresh_tokens(&mut self, user_ref: &str) -> Result<&[TokenInfo]> {
        let request = TokenListRequest {
            user_ref: user_ref.to_string(),
        };
        let response = self.backend.token_list(&request).await?;
        self.audit.record(
            ApiOperation::TokenList,
            serde_json::to_value(&request)?,
            serde_json::to_value(&response)?,
        );
        reject_on_failure(ApiOperation::TokenList, &response)?;

        self.tokens = response.tokens;
        if let Some(selected) = &self.selection.selected_token_id
            && !self.tokens.iter().any(|t| &t.token_id == selected)
        {
            self.selection = TokenSelection::default();
        }
        Ok(&self.tokens)
    }

    pub async fn register_token(
        &mut self,
        user_ref: &str,
        name: &str,
        card_number: &str,
        password: Option<&str>,
    ) -> Result<TokenInfo> {
        let request = TokenRegisterRequest {
            user_ref: user_ref.to_string(),
            name: name.to_string(),
            card_number: card_number.to_string(),
            password: password.map(str::to_string),
        };
        let response = self.backend.token_register(&request).await?;
        self.audit.record(
            ApiOperation::TokenRegister,
            serde_json::to_value(&request)?,
            serde_json::to_value(&response)?,
        );
        reject_on_failure(ApiOperation::TokenRegister, &response)?;

        let token = response.token.ok_or_else(|| {
            CheckoutError::network("token registration response carried no token")
        })?;
        self.tokens.push(token.clone());
        Ok(token)
    }

    /// Delete a registered token. Resets the selection state when the
    /// deleted token was the selected one.
    pub async fn delete_token(&mut self, user_ref: &str, token_id: &str) -> Result<()> {
        let request = TokenDeleteRequest {
            user_ref: user_ref.to_string(),
            token_id: token_id.to_string(),
        };
        let response = self.backend.token_delete(&request).await?;
        self.audit.record(
            ApiOperation::TokenDelete,
            serde_json::to_value(&request)?,
            serde_json::to_value(&response)?,
        );
        reject_on_failure(ApiOperation::TokenDelete, &response)?;

        self.tokens.retain(|t| t.token_id != token_id);
        if self.selection.selected_token_id.as_deref() == Some(token_id) {
            self.selection = TokenSelection::default();
        }
        Ok(())
    }

    /// Select a token from the local cache for the next token payment.
    /// Selecting resets any prior password verification.
    pub fn select_token(&mut self, token_id: &str) -> Result<()> {
        if !self.tokens.iter().any(|t| t.token_id == token_id) {
            return Err(CheckoutError::validation(format!(
                "token {token_id} is not registered"
            )));
        }
        self.selection = TokenSelection {
            selected_token_id: Some(token_id.to_string()),
            password_verified: false,
        };
        Ok(())
    }

    /// Verify the password of the selected token.
    pub async fn verify_token_password(&mut self, user_ref: &str, password: &str) -> Result<bool> {
        let Some(token_id) = self.selection.selected_token_id.clone() else {
            return Err(CheckoutError::validation("a payment token must be selected"));
        };

        let request = TokenVerifyPasswordRequest {
            user_ref: user_ref.to_string(),
            token_id,
            password: password.to_string(),
        };
        let response = self.backend.token_verify_password(&request).await?;
        self.audit.record(
            ApiOperation::TokenVerifyPassword,
            serde_json::to_value(&request)?,
            serde_json::to_value(&response)?,
        );
        reject_on_failure(ApiOperation::TokenVerifyPassword, &response)?;

        if response.verified {
            self.selection.password_verified = true;
        }
        Ok(response.verified)
    }

    // ==================== Internal helpers ====================

    fn require_paid_order(&self, operation: &str) -> Result<&Order> {
        if self.state != LifecycleState::Paid {
            return Err(CheckoutError::invalid_state(format!(
                "{operation} is only valid for a paid order (state is {})",
                self.state
            )));
        }
        self.order
            .as_ref()
            .ok_or_else(|| CheckoutError::invalid_state("no current order"))
    }
}

impl<B, H> std::fmt::Debug for CheckoutSession<B, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutSession")
            .field("state", &self.state)
            .field("order", &self.order)
            .field("paid_items", &self.paid_items.len())
            .finish()
    }
}

fn new_order_id() -> String {
    format!("ORD{}", Uuid::new_v4().simple())
}

fn reject_on_failure<R: BillingResponse>(operation: ApiOperation, response: &R) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    let code = response.result_code().to_string();
    let message = response
        .err_msg()
        .unwrap_or("no error message from backend")
        .to_string();
    tracing::warn!(%operation, %code, %message, "backend rejected the call");
    Err(CheckoutError::BackendRejected {
        operation,
        code,
        message,
    })
}
