//! Backend interface for the payment aggregator.
//!
//! Every response carries a `resultCode` where `"0"` means success and any
//! other value carries `errMsg`. The session records each exchange in the
//! audit history and maps non-zero codes to [`CheckoutError::BackendRejected`];
//! this module only moves payloads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::audit::ApiOperation;
use crate::error::{CheckoutError, Result};
use crate::gateway::{self, WindowType};
use crate::types::{Customer, LineItem, PaidLineItem, PaymentMethod, ShippingCharge, TokenInfo};

pub const RESULT_SUCCESS: &str = "0";

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Common accessors over the `resultCode`/`errMsg` envelope fields.
pub trait BillingResponse {
    fn result_code(&self) -> &str;
    fn err_msg(&self) -> Option<&str>;

    fn is_success(&self) -> bool {
        self.result_code() == RESULT_SUCCESS
    }
}

macro_rules! billing_response {
    ($($ty:ty),+ $(,)?) => {
        $(impl BillingResponse for $ty {
            fn result_code(&self) -> &str {
                &self.result_code
            }
            fn err_msg(&self) -> Option<&str> {
                self.err_msg.as_deref()
            }
        })+
    };
}

// ==================== Wire types ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderData {
    pub products: Vec<LineItem>,
    pub customer: Customer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    pub order_id: String,
    pub representative_product_name: String,
    pub product_amount: u64,
    pub shipping_amount: u64,
    pub total_amount: u64,
    pub order_data: OrderData,
    pub payment_data: PaymentMethod,
    pub return_url: String,
    pub fail_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub ord_no: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub gateway_id: String,
    #[serde(default)]
    pub gateway_name: String,
    /// Window strategy as sent by the server; parsed by the window protocol.
    #[serde(default)]
    pub window_type: String,
    #[serde(default)]
    pub auth_token: String,
    /// Script strategy: SDK signature payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_data: Option<String>,
    /// Redirect strategy: target URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub ord_no: String,
    pub order_id: String,
    pub gateway_id: String,
    /// The completion payload from the external window, forwarded verbatim.
    pub callback_payload: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub ord_no: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub approval_number: String,
    #[serde(default)]
    pub approval_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub ord_no: String,
    pub deposit_type: String,
    pub products: Vec<PaidLineItem>,
    pub deposit_amount: u64,
    pub deposit_date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub ord_no: String,
    #[serde(default)]
    pub deposit_id: String,
    #[serde(default)]
    pub confirm_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAllRequest {
    pub ord_no: String,
    pub cancel_type: String,
    pub products: Vec<PaidLineItem>,
    pub cancel_amount: u64,
    pub cancel_reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAllResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub ord_no: String,
    #[serde(default)]
    pub cancel_id: String,
    #[serde(default)]
    pub cancel_date: String,
}

/// A cancelled line, carrying the paid snapshot plus the amounts to cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelProduct {
    #[serde(flatten)]
    pub item: LineItem,
    pub cancel_price: u64,
    pub cancel_shipping: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPartialRequest {
    pub ord_no: String,
    pub cancel_type: String,
    pub cancel_products: Vec<CancelProduct>,
    pub cancel_amount: u64,
    pub cancel_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_shipping_products: Option<Vec<ShippingCharge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_shipping_fee: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelPartialResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub ord_no: String,
    #[serde(default)]
    pub cancel_id: String,
    #[serde(default)]
    pub cancel_date: String,
    #[serde(default)]
    pub cancelled_product_ids: Vec<String>,
    #[serde(default)]
    pub cancel_amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_shipping_product_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_shipping_fee: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListRequest {
    pub user_ref: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub tokens: Vec<TokenInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRegisterRequest {
    pub user_ref: String,
    pub name: String,
    pub card_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRegisterResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDeleteRequest {
    pub user_ref: String,
    pub token_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDeleteResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenVerifyPasswordRequest {
    pub user_ref: String,
    pub token_id: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenVerifyPasswordResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayRequest {
    pub order_id: String,
    pub user_ref: String,
    pub token_id: String,
    pub token_name: String,
    pub representative_product_name: String,
    pub product_amount: u64,
    pub shipping_amount: u64,
    pub total_amount: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayResponse {
    pub result_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    #[serde(default)]
    pub ord_no: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub approval_number: String,
}

billing_response!(
    AuthenticateResponse,
    ApproveResponse,
    DepositResponse,
    CancelAllResponse,
    CancelPartialResponse,
    TokenListResponse,
    TokenRegisterResponse,
    TokenDeleteResponse,
    TokenVerifyPasswordResponse,
    TokenPayResponse,
);

// ==================== Backend trait ====================

/// Request/response access to the payment aggregator. Errors are transport
/// failures only; a business rejection arrives in-band as a non-zero
/// `resultCode`.
pub trait PaymentBackend {
    async fn authenticate(&self, request: &AuthenticateRequest) -> Result<AuthenticateResponse>;
    async fn approve(&self, request: &ApproveRequest) -> Result<ApproveResponse>;
    async fn confirm_deposit(&self, request: &DepositRequest) -> Result<DepositResponse>;
    async fn cancel_all(&self, request: &CancelAllRequest) -> Result<CancelAllResponse>;
    async fn cancel_partial(&self, request: &CancelPartialRequest)
    -> Result<CancelPartialResponse>;
    async fn token_list(&self, request: &TokenListRequest) -> Result<TokenListResponse>;
    async fn token_register(&self, request: &TokenRegisterRequest)
    -> Result<TokenRegisterResponse>;
    async fn token_delete(&self, request: &TokenDeleteRequest) -> Result<TokenDeleteResponse>;
    async fn token_verify_password(
        &self,
        request: &TokenVerifyPasswordRequest,
    ) -> Result<TokenVerifyPasswordResponse>;
    async fn token_pay(&self, request: &TokenPayRequest) -> Result<TokenPayResponse>;
}

impl<B: PaymentBackend> PaymentBackend for Arc<B> {
    async fn authenticate(&self, request: &AuthenticateRequest) -> Result<AuthenticateResponse> {
        (**self).authenticate(request).await
    }

    async fn approve(&self, request: &ApproveRequest) -> Result<ApproveResponse> {
        (**self).approve(request).await
    }

    async fn confirm_deposit(&self, request: &DepositRequest) -> Result<DepositResponse> {
        (**self).confirm_deposit(request).await
    }

    async fn cancel_all(&self, request: &CancelAllRequest) -> Result<CancelAllResponse> {
        (**self).cancel_all(request).await
    }

    async fn cancel_partial(
        &self,
        request: &CancelPartialRequest,
    ) -> Result<CancelPartialResponse> {
        (**self).cancel_partial(request).await
    }

    async fn token_list(&self, request: &TokenListRequest) -> Result<TokenListResponse> {
        (**self).token_list(request).await
    }

    async fn token_register(
        &self,
        request: &TokenRegisterRequest,
    ) -> Result<TokenRegisterResponse> {
        (**self).token_register(request).await
    }

    async fn token_delete(&self, request: &TokenDeleteRequest) -> Result<TokenDeleteResponse> {
        (**self).token_delete(request).await
    }

    async fn token_verify_password(
        &self,
        request: &TokenVerifyPasswordRequest,
    ) -> Result<TokenVerifyPasswordResponse> {
        (**self).token_verify_password(request).await
    }

    async fn token_pay(&self, request: &TokenPayRequest) -> Result<TokenPayResponse> {
        (**self).token_pay(request).await
    }
}

// ==================== HTTP backend ====================

/// Responses arrive wrapped in a `billing` envelope.
#[derive(Debug, Deserialize)]
struct BillingEnvelope<T> {
    billing: T,
}

/// reqwest-based backend speaking JSON to the aggregator.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("checkout-sdk-rust/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CheckoutError::network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
        B: Serialize,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CheckoutError::network(e.to_string()))?;

        Self::unwrap_billing(response).await
    }

    async fn unwrap_billing<T>(response: reqwest::Response) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        if !status.is_success() {
            return Err(CheckoutError::network(format!(
                "aggregator returned HTTP {status}"
            )));
        }

        let envelope: BillingEnvelope<T> = response
            .json()
            .await
            .map_err(|e| CheckoutError::network(e.to_string()))?;
        Ok(envelope.billing)
    }
}

impl PaymentBackend for HttpBackend {
    async fn authenticate(&self, request: &AuthenticateRequest) -> Result<AuthenticateResponse> {
        self.post("/api/payment/auth", request).await
    }

    async fn approve(&self, request: &ApproveRequest) -> Result<ApproveResponse> {
        self.post("/api/payment/approve", request).await
    }

    async fn confirm_deposit(&self, request: &DepositRequest) -> Result<DepositResponse> {
        self.post("/api/payment/deposit", request).await
    }

    async fn cancel_all(&self, request: &CancelAllRequest) -> Result<CancelAllResponse> {
        self.post("/api/payment/cancel", request).await
    }

    async fn cancel_partial(
        &self,
        request: &CancelPartialRequest,
    ) -> Result<CancelPartialResponse> {
        self.post("/api/payment/partial-cancel", request).await
    }

    async fn token_list(&self, request: &TokenListRequest) -> Result<TokenListResponse> {
        let url = format!("{}/api/token/list", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("userRef", request.user_ref.as_str())])
            .send()
            .await
            .map_err(|e| CheckoutError::network(e.to_string()))?;
        Self::unwrap_billing(response).await
    }

    async fn token_register(
        &self,
        request: &TokenRegisterRequest,
    ) -> Result<TokenRegisterResponse> {
        self.post("/api/token/register", request).await
    }

    async fn token_delete(&self, request: &TokenDeleteRequest) -> Result<TokenDeleteResponse> {
        let url = format!("{}/api/token/delete", self.base_url);
        let response = self
            .http
            .delete(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| CheckoutError::network(e.to_string()))?;
        Self::unwrap_billing(response).await
    }

    async fn token_verify_password(
        &self,
        request: &TokenVerifyPasswordRequest,
    ) -> Result<TokenVerifyPasswordResponse> {
        self.post("/api/token/verify-password", request).await
    }

    async fn token_pay(&self, request: &TokenPayRequest) -> Result<TokenPayResponse> {
        self.post("/api/token/pay", request).await
    }
}

// ==================== Simulated backend ====================

struct StoredToken {
    info: TokenInfo,
    password: Option<String>,
}

/// In-process stand-in for the aggregator, behind the same interface as
/// [`HttpBackend`] so the session never knows the difference.
///
/// Gateways are assigned round-robin unless pinned; identifiers are derived
/// from a sequence counter so runs are deterministic.
pub struct SimulatedBackend {
    seq: AtomicU64,
    rotation: AtomicUsize,
    pinned_gateway: Option<&'static str>,
    rejections: Mutex<Vec<(ApiOperation, String, String)>>,
    tokens: Mutex<HashMap<String, Vec<StoredToken>>>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            rotation: AtomicUsize::new(0),
            pinned_gateway: None,
            rejections: Mutex::new(Vec::new()),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Always select the given gateway instead of rotating.
    pub fn with_gateway(gateway_id: &'static str) -> Self {
        Self {
            pinned_gateway: Some(gateway_id),
            ..Self::new()
        }
    }

    /// Make the next call for `operation` come back rejected with the given
    /// code and message.
    pub fn reject_next(&self, operation: ApiOperation, code: &str, message: &str) {
        self.rejections
            .lock()
            .unwrap()
            .push((operation, code.to_string(), message.to_string()));
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn take_rejection(&self, operation: ApiOperation) -> Option<(String, String)> {
        let mut pending = self.rejections.lock().unwrap();
        let idx = pending.iter().position(|(op, ..)| *op == operation)?;
        let (_, code, message) = pending.remove(idx);
        Some((code, message))
    }

    fn pick_gateway(&self) -> &'static gateway::GatewayInfo {
        if let Some(id) = self.pinned_gateway
            && let Some(gw) = gateway::find(id)
        {
            return gw;
        }
        let idx = self.rotation.fetch_add(1, Ordering::Relaxed);
        &gateway::GATEWAYS[idx % gateway::GATEWAYS.len()]
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimulatedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBackend")
            .field("pinned_gateway", &self.pinned_gateway)
            .finish()
    }
}

macro_rules! simulate_rejection {
    ($self:ident, $op:expr, $response:ty) => {
        if let Some((code, message)) = $self.take_rejection($op) {
            return Ok(<$response>::default_rejected(code, message));
        }
    };
}

macro_rules! default_rejected {
    ($($ty:ty),+ $(,)?) => {
        $(impl $ty {
            fn default_rejected(code: String, message: String) -> Self {
                Self {
                    result_code: code,
                    err_msg: Some(message),
                    ..Self::default()
                }
            }
        })+
    };
}

default_rejected!(
    AuthenticateResponse,
    ApproveResponse,
    DepositResponse,
    CancelAllResponse,
    CancelPartialResponse,
    TokenListResponse,
    TokenRegisterResponse,
    TokenDeleteResponse,
    TokenVerifyPasswordResponse,
    TokenPayResponse,
);

impl PaymentBackend for SimulatedBackend {
    async fn authenticate(&self, request: &AuthenticateRequest) -> Result<AuthenticateResponse> {
        simulate_rejection!(self, ApiOperation::Authenticate, AuthenticateResponse);

        let n = self.next_seq();
        let gw = self.pick_gateway();
        let auth_token = format!("AUTH_TOKEN_{n:06}");

        let mut response = AuthenticateResponse {
            result_code: RESULT_SUCCESS.to_string(),
            err_msg: None,
            ord_no: format!("ORD{n:010}"),
            order_id: request.order_id.clone(),
            gateway_id: gw.id.to_string(),
            gateway_name: gw.name.to_string(),
            window_type: gw.window_type.to_string(),
            auth_token: auth_token.clone(),
            merchant_id: None,
            sign_data: None,
            payment_url: None,
        };

        match gw.window_type {
            WindowType::Script => {
                response.merchant_id = Some("MERCHANT_001".to_string());
                response.sign_data = Some(format!("SIGN_{n:08}"));
            }
            WindowType::Redirect => {
                response.payment_url = Some(format!(
                    "{}?resultCode=0&authCode=AUTH_{n}&orderId={}&authToken={auth_token}",
                    request.return_url, request.order_id
                ));
            }
        }

        Ok(response)
    }

    async fn approve(&self, request: &ApproveRequest) -> Result<ApproveResponse> {
        simulate_rejection!(self, ApiOperation::Approve, ApproveResponse);

        let n = self.next_seq();
        Ok(ApproveResponse {
            result_code: RESULT_SUCCESS.to_string(),
            err_msg: None,
            ord_no: request.ord_no.clone(),
            order_id: request.order_id.clone(),
            transaction_id: format!("TXN{n:010}"),
            approval_number: format!("APR{n:06}"),
            approval_date: now_rfc3339(),
        })
    }

    async fn confirm_deposit(&self, request: &DepositRequest) -> Result<DepositResponse> {
        simulate_rejection!(self, ApiOperation::ConfirmDeposit, DepositResponse);

        let n = self.next_seq();
        Ok(DepositResponse {
            result_code: RESULT_SUCCESS.to_string(),
            err_msg: None,
            ord_no: request.ord_no.clone(),
            deposit_id: format!("DEP{n:010}"),
            confirm_date: now_rfc3339(),
        })
    }

    async fn cancel_all(&self, request: &CancelAllRequest) -> Result<CancelAllResponse> {
        simulate_rejection!(self, ApiOperation::CancelAll, CancelAllResponse);

        let n = self.next_seq();
        Ok(CancelAllResponse {
            result_code: RESULT_SUCCESS.to_string(),
            err_msg: None,
            ord_no: request.ord_no.clone(),
            cancel_id: format!("CAN{n:010}"),
            cancel_date: now_rfc3339(),
        })
    }

    async fn cancel_partial(
        &self,
        request: &CancelPartialRequest,
    ) -> Result<CancelPartialResponse> {
        simulate_rejection!(self, ApiOperation::CancelPartial, CancelPartialResponse);

        let n = self.next_seq();
        Ok(CancelPartialResponse {
            result_code: RESULT_SUCCESS.to_string(),
            err_msg: None,
            ord_no: request.ord_no.clone(),
            cancel_id: format!("PCAN{n:09}"),
            cancel_date: now_rfc3339(),
            cancelled_product_ids: request
                .cancel_products
                .iter()
                .map(|p| p.item.id.clone())
                .collect(),
            cancel_amount: request.cancel_amount,
            added_shipping_product_ids: request
                .add_shipping_products
                .as_ref()
                .map(|charges| charges.iter().map(|c| c.id.clone()).collect()),
            add_shipping_fee: request.add_shipping_fee,
        })
    }

    async fn token_list(&self, request: &TokenListRequest) -> Result<TokenListResponse> {
        simulate_rejection!(self, ApiOperation::TokenList, TokenListResponse);

        let tokens = self.tokens.lock().unwrap();
        Ok(TokenListResponse {
            result_code: RESULT_SUCCESS.to_string(),
            err_msg: None,
            tokens: tokens
                .get(&request.user_ref)
                .map(|list| list.iter().map(|t| t.info.clone()).collect())
                .unwrap_or_default(),
        })
    }

    async fn token_register(
        &self,
        request: &TokenRegisterRequest,
    ) -> Result<TokenRegisterResponse> {
        simulate_rejection!(self, ApiOperation::TokenRegister, TokenRegisterResponse);

        let n = self.next_seq();
        let digits: String = request
            .card_number
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();
        let last4 = &digits[digits.len().saturating_sub(4)..];

        let info = TokenInfo {
            token_id: format!("TKN{n:08}"),
            name: request.name.clone(),
            masked_card_ref: format!("****-****-****-{last4}"),
            has_password: request.password.is_some(),
        };

        self.tokens
            .lock()
            .unwrap()
            .entry(request.user_ref.clone())
            .or_default()
            .push(StoredToken {
                info: info.clone(),
                password: request.password.clone(),
            });

        Ok(TokenRegisterResponse {
            result_code: RESULT_SUCCESS.to_string(),
            err_msg: None,
            token: Some(info),
        })
    }

    async fn token_delete(&self, request: &TokenDeleteRequest) -> Result<TokenDeleteResponse> {
        simulate_rejection!(self, ApiOperation::TokenDelete, TokenDeleteResponse);

        let mut tokens = self.tokens.lock().unwrap();
        let removed = tokens
            .get_mut(&request.user_ref)
            .map(|list| {
                let before = list.len();
                list.retain(|t| t.info.token_id != request.token_id);
                before != list.len()
            })
            .unwrap_or(false);

        if removed {
            Ok(TokenDeleteResponse {
                result_code: RESULT_SUCCESS.to_string(),
                err_msg: None,
            })
        } else {
            Ok(TokenDeleteResponse::default_rejected(
                "4004".to_string(),
                "token not found".to_string(),
            ))
        }
    }

    async fn token_verify_password(
        &self,
        request: &TokenVerifyPasswordRequest,
    ) -> Result<TokenVerifyPasswordResponse> {
        simulate_rejection!(self, ApiOperation::TokenVerifyPassword, TokenVerifyPasswordResponse);

        let tokens = self.tokens.lock().unwrap();
        let verified = tokens
            .get(&request.user_ref)
            .and_then(|list| list.iter().find(|t| t.info.token_id == request.token_id))
            .is_some_and(|t| t.password.as_deref() == Some(request.password.as_str()));

        Ok(TokenVerifyPasswordResponse {
            result_code: RESULT_SUCCESS.to_string(),
            err_msg: None,
            verified,
        })
    }

    async fn token_pay(&self, request: &TokenPayRequest) -> Result<TokenPayResponse> {
        simulate_rejection!(self, ApiOperation::TokenPay, TokenPayResponse);

        let n = self.next_seq();
        Ok(TokenPayResponse {
            result_code: RESULT_SUCCESS.to_string(),
            err_msg: None,
            ord_no: format!("ORD{n:010}"),
            order_id: request.order_id.clone(),
            transaction_id: format!("TXN{n:010}"),
            approval_number: format!("APR{n:06}"),
        })
    }
}
