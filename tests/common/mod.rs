#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use checkout_sdk::{
    AuthData, AuthFailureCode, AuthenticateResponse, CallbackMessage, CheckoutError,
    CheckoutSession, Customer, DraftOrder, GatewayInfo, LineItem, MemoryStorage, PaymentMethod,
    SimulatedBackend, StorageAdapter, Url, WindowController, WindowHandle, WindowHost,
    window_channel,
};
use serde_json::json;

pub const SUCCESS_QUERY: &str = "resultCode=0&authCode=AUTH_OK&authToken=TOKEN_1";
pub const FAILURE_QUERY: &str = "resultCode=9999&errMsg=declined";

/// Scripted behavior for the window opened by a redirect gateway (or the
/// inline handler of a script gateway).
#[derive(Clone)]
pub enum WindowBehavior {
    /// Post a success callback after the delay.
    CompleteSuccess { after: Duration, query: String },
    /// Post a failure callback after the delay.
    CompleteFailure { after: Duration, query: String },
    /// The user closes the window after the delay, never completing.
    CloseAfter(Duration),
    /// Post a success callback and close in the same instant.
    PostAndClose { query: String },
    /// Post unrelated messages immediately, then succeed after the delay.
    NoiseThenSuccess { after: Duration, query: String },
    /// The popup blocker wins; no window at all.
    Blocked,
    /// The window opens and then nothing ever happens.
    Silent,
}

pub fn instant_success() -> WindowBehavior {
    WindowBehavior::CompleteSuccess {
        after: Duration::ZERO,
        query: SUCCESS_QUERY.to_string(),
    }
}

/// Test double for the browser side of the protocol. Every opened window is
/// driven by the configured [`WindowBehavior`]; controllers are retained so
/// tests can inspect the window after the race settles.
pub struct ScriptedHost {
    behavior: WindowBehavior,
    opened: AtomicUsize,
    controllers: Mutex<Vec<WindowController>>,
}

impl ScriptedHost {
    pub fn new(behavior: WindowBehavior) -> Self {
        Self {
            behavior,
            opened: AtomicUsize::new(0),
            controllers: Mutex::new(Vec::new()),
        }
    }

    /// How many windows were actually opened.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn last_controller(&self) -> Option<WindowController> {
        self.controllers.lock().unwrap().last().cloned()
    }
}

impl WindowHost for ScriptedHost {
    fn open_window(&self, _url: &Url) -> Option<WindowHandle> {
        if matches!(self.behavior, WindowBehavior::Blocked) {
            return None;
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        let (controller, handle) = window_channel();
        self.controllers.lock().unwrap().push(controller.clone());

        match self.behavior.clone() {
            WindowBehavior::CompleteSuccess { after, query } => {
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    controller.post_callback(&CallbackMessage::success(query));
                });
            }
            WindowBehavior::CompleteFailure { after, query } => {
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    controller.post_callback(&CallbackMessage::failure(query));
                });
            }
            WindowBehavior::CloseAfter(after) => {
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    controller.close();
                });
            }
            WindowBehavior::PostAndClose { query } => {
                controller.post_callback(&CallbackMessage::success(query));
                controller.close();
            }
            WindowBehavior::NoiseThenSuccess { after, query } => {
                controller.post_message(json!({"type": "ANALYTICS", "event": "page_view"}));
                controller.post_message(json!(42));
                controller.post_message(json!({"success": true}));
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    controller.post_callback(&CallbackMessage::success(query));
                });
            }
            WindowBehavior::Blocked => unreachable!(),
            WindowBehavior::Silent => {}
        }

        Some(handle)
    }

    async fn invoke_script(
        &self,
        gateway: &GatewayInfo,
        _auth: &AuthenticateResponse,
    ) -> checkout_sdk::Result<AuthData> {
        match &self.behavior {
            WindowBehavior::CompleteSuccess { query, .. }
            | WindowBehavior::NoiseThenSuccess { query, .. }
            | WindowBehavior::PostAndClose { query } => Ok(AuthData {
                gateway_id: gateway.id.to_string(),
                payload: query.clone(),
                timestamp: "2026-01-01T00:00:00Z".to_string(),
            }),
            WindowBehavior::CompleteFailure { query, .. } => {
                Err(CheckoutError::AuthenticationFailed {
                    code: AuthFailureCode::AuthFailed,
                    message: "gateway handler reported failure".to_string(),
                    query_string: Some(query.clone()),
                })
            }
            _ => Err(CheckoutError::AuthenticationFailed {
                code: AuthFailureCode::AuthFailed,
                message: "gateway handler never completed".to_string(),
                query_string: None,
            }),
        }
    }
}

pub type TestSession = CheckoutSession<Arc<SimulatedBackend>, Arc<ScriptedHost>>;

pub fn session(
    gateway: &'static str,
    behavior: WindowBehavior,
) -> (Arc<SimulatedBackend>, Arc<ScriptedHost>, TestSession) {
    session_with_storage(gateway, behavior, Arc::new(MemoryStorage::new()))
}

pub fn session_with_storage(
    gateway: &'static str,
    behavior: WindowBehavior,
    storage: Arc<dyn StorageAdapter>,
) -> (Arc<SimulatedBackend>, Arc<ScriptedHost>, TestSession) {
    let backend = Arc::new(SimulatedBackend::with_gateway(gateway));
    let host = Arc::new(ScriptedHost::new(behavior));
    let session = CheckoutSession::new(backend.clone(), host.clone(), storage);
    (backend, host, session)
}

pub fn line_item(id: &str, name: &str, price: u64, shipping_fee: u64) -> LineItem {
    LineItem {
        id: id.to_string(),
        name: name.to_string(),
        price,
        shipping_fee,
        delivery_group: "A01".to_string(),
        seller_ref: "SELLER_01".to_string(),
    }
}

pub fn customer() -> Customer {
    Customer {
        name: "Jane Doe".to_string(),
        phone: "010-1234-5678".to_string(),
        email: "jane@example.com".to_string(),
        user_ref: "USER_001".to_string(),
    }
}

pub fn draft(items: Vec<LineItem>) -> DraftOrder {
    DraftOrder {
        items,
        customer: customer(),
    }
}

pub fn single_item_draft() -> DraftOrder {
    draft(vec![line_item("PROD_001", "Widget", 10_000, 2_500)])
}

/// Two items: PROD_001 at 1000 + 0 shipping, PROD_002 at 2000 + 500 shipping.
pub fn two_item_draft() -> DraftOrder {
    draft(vec![
        line_item("PROD_001", "Widget", 1_000, 0),
        line_item("PROD_002", "Gadget", 2_000, 500),
    ])
}

pub fn card() -> PaymentMethod {
    PaymentMethod::Card {
        issuer: "SHINHAN".to_string(),
        installment: 0,
        use_card_point: false,
    }
}

pub fn vbank() -> PaymentMethod {
    PaymentMethod::VirtualAccount {
        bank: "KOOKMIN".to_string(),
    }
}
