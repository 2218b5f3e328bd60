//! # Checkout SDK
//!
//! Client for a multi-gateway payment aggregator. Drives the full checkout
//! lifecycle: authentication through an external gateway window, approval,
//! virtual-account deposit confirmation, full and partial cancellation, and
//! registered-token payments - with every backend exchange captured in a
//! bounded, persisted audit history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use checkout_sdk::{
//!     AuthData, AuthenticateResponse, CallbackMessage, CheckoutSession, Customer, DraftOrder,
//!     GatewayInfo, LineItem, MemoryStorage, PaymentMethod, SimulatedBackend, Url, WindowHandle,
//!     WindowHost, window_channel,
//! };
//!
//! // A host that opens the gateway window and reports success immediately.
//! // A real host would hand `url` to a browser and wire the callback page
//! // into the controller instead.
//! struct DemoHost;
//!
//! impl WindowHost for DemoHost {
//!     fn open_window(&self, _url: &Url) -> Option<WindowHandle> {
//!         let (controller, handle) = window_channel();
//!         controller.post_callback(&CallbackMessage::success("resultCode=0&authCode=DEMO"));
//!         Some(handle)
//!     }
//!
//!     async fn invoke_script(
//!         &self,
//!         gateway: &GatewayInfo,
//!         auth: &AuthenticateResponse,
//!     ) -> checkout_sdk::Result<AuthData> {
//!         Ok(AuthData {
//!             gateway_id: gateway.id.to_string(),
//!             payload: format!("authToken={}", auth.auth_token),
//!             timestamp: "2026-01-01T00:00:00Z".to_string(),
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = CheckoutSession::new(
//!         SimulatedBackend::new(),
//!         DemoHost,
//!         Arc::new(MemoryStorage::new()),
//!     );
//!
//!     let draft = DraftOrder {
//!         items: vec![LineItem {
//!             id: "PROD_001".into(),
//!             name: "Widget".into(),
//!             price: 10_000,
//!             shipping_fee: 2_500,
//!             delivery_group: "A01".into(),
//!             seller_ref: "SELLER_01".into(),
//!         }],
//!         customer: Customer {
//!             name: "Jane Doe".into(),
//!             phone: "010-0000-0000".into(),
//!             email: "jane@example.com".into(),
//!             user_ref: "USER_001".into(),
//!         },
//!     };
//!
//!     let receipt = session
//!         .start_payment(
//!             &draft,
//!             &PaymentMethod::Card {
//!                 issuer: "SHINHAN".into(),
//!                 installment: 0,
//!                 use_card_point: false,
//!             },
//!         )
//!         .await?;
//!     println!("paid: {} via {}", receipt.ord_no, receipt.gateway_name);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Design
//!
//! - The authentication window is modeled as a [`WindowHost`] trait plus a
//!   [`WindowController`]/[`WindowHandle`] channel pair; the protocol races
//!   the completion message, a closed-window poll, and a timeout, and always
//!   resolves exactly once.
//! - [`CheckoutSession`] is the single place transaction state lives. It owns
//!   the current order and the paid line items with their remaining amounts.
//! - Every request/response pair goes through [`AuditLog`], bounded to the
//!   most recent [`MAX_HISTORY`] entries and persisted via [`StorageAdapter`].

pub mod audit;
pub mod backend;
pub mod error;
pub mod gateway;
pub mod session;
pub mod storage;
pub mod types;
pub mod window;

// Session
pub use session::{
    CancelReceipt, CheckoutSession, DepositReceipt, LifecycleState, PartialCancelOutcome,
    PaymentReceipt, SessionOptions, TokenSelection,
};

// Error types
pub use error::{AuthFailureCode, CheckoutError, ProtocolErrorCode, Result};

// Data model
pub use types::{
    AuthData, CancelSelection, Customer, DraftOrder, LineItem, MethodKind, Order, PaidLineItem,
    PaymentMethod, ShippingCharge, TokenInfo, representative_name,
};

// Backend
pub use backend::{
    AuthenticateResponse, BillingResponse, HttpBackend, PaymentBackend, SimulatedBackend,
};

// Window protocol
pub use window::{
    AUTH_TIMEOUT, CALLBACK_MESSAGE_TYPE, CLOSE_POLL_INTERVAL, CallbackMessage, WindowController,
    WindowHandle, WindowHost, window_channel,
};

// Gateways
pub use gateway::{GATEWAYS, GatewayInfo, WindowType};

// Audit history
pub use audit::{ApiOperation, AuditEntry, AuditLog, MAX_HISTORY};

// Storage
pub use storage::{FileStorage, MemoryStorage, StorageAdapter};

// The window protocol's URL type.
pub use url::Url;
