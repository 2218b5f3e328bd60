//! External authentication window protocol.
//!
//! Runs exactly one of two window strategies for a gateway and resolves to a
//! single outcome. The redirect strategy races three mutually exclusive
//! completion signals: the cross-window completion message, a periodic
//! closed-window check, and a single-shot timeout. Whichever fires first
//! settles the attempt; the race state is dropped on resolution, so the other
//! two signals can never produce a second outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use crate::backend::AuthenticateResponse;
use crate::error::{AuthFailureCode, CheckoutError, ProtocolErrorCode, Result};
use crate::gateway::{self, GatewayInfo, WindowType};
use crate::types::AuthData;

/// How often the opened window is checked for having been closed by the user.
pub const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long an attempt may stay unresolved before it is forced shut.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(300);

pub const CALLBACK_MESSAGE_TYPE: &str = "PAYMENT_CALLBACK";

/// Structured completion notification posted back by the opened surface.
/// Any inbound message not matching this shape is ignored, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub success: bool,
    pub query_string: String,
    pub timestamp: String,
}

impl CallbackMessage {
    pub fn success(query_string: impl Into<String>) -> Self {
        Self {
            message_type: CALLBACK_MESSAGE_TYPE.to_string(),
            success: true,
            query_string: query_string.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn failure(query_string: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::success(query_string)
        }
    }

    /// Parse an inbound message, returning `None` for anything that is not a
    /// payment callback.
    fn from_value(value: &Value) -> Option<Self> {
        if value.get("type")?.as_str()? != CALLBACK_MESSAGE_TYPE {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// The protocol's view of one opened window: inbound messages plus a shared
/// closed flag.
pub struct WindowHandle {
    messages: mpsc::UnboundedReceiver<Value>,
    closed: Arc<AtomicBool>,
}

impl WindowHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Force-close the window (timeout path).
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn recv(&mut self) -> Option<Value> {
        self.messages.recv().await
    }
}

/// The window's side of the pair: post messages to the opener, or close.
/// Held by the [`WindowHost`] implementation (or a test driving it).
#[derive(Clone)]
pub struct WindowController {
    messages: mpsc::UnboundedSender<Value>,
    closed: Arc<AtomicBool>,
}

impl WindowController {
    pub fn post_message(&self, message: Value) {
        let _ = self.messages.send(message);
    }

    pub fn post_callback(&self, callback: &CallbackMessage) {
        if let Ok(value) = serde_json::to_value(callback) {
            self.post_message(value);
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Create a connected controller/handle pair for one window.
pub fn window_channel() -> (WindowController, WindowHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    (
        WindowController {
            messages: tx,
            closed: closed.clone(),
        },
        WindowHandle {
            messages: rx,
            closed,
        },
    )
}

/// The out-of-process surface the protocol drives. Production hosts wrap a
/// real browser window; tests substitute a scripted double.
pub trait WindowHost {
    /// Open a new top-level window at `url`. `None` means the window was
    /// blocked and the attempt must fail without starting the race.
    fn open_window(&self, url: &Url) -> Option<WindowHandle>;

    /// Run the gateway's inline SDK handler (script strategy). The outcome
    /// arrives through the handler's own callback contract, modeled as this
    /// single asynchronous step.
    async fn invoke_script(
        &self,
        gateway: &GatewayInfo,
        auth: &AuthenticateResponse,
    ) -> Result<AuthData>;
}

impl<H: WindowHost> WindowHost for Arc<H> {
    fn open_window(&self, url: &Url) -> Option<WindowHandle> {
        (**self).open_window(url)
    }

    async fn invoke_script(
        &self,
        gateway: &GatewayInfo,
        auth: &AuthenticateResponse,
    ) -> Result<AuthData> {
        (**self).invoke_script(gateway, auth).await
    }
}

/// Run the window strategy selected by the authentication response and
/// resolve to exactly one outcome.
pub async fn authenticate<H: WindowHost>(
    host: &H,
    auth: &AuthenticateResponse,
) -> Result<AuthData> {
    let gateway = gateway::find(&auth.gateway_id).ok_or_else(|| {
        CheckoutError::protocol(
            ProtocolErrorCode::PgNotFound,
            format!("no gateway registered under {:?}", auth.gateway_id),
        )
    })?;

    let window_type: WindowType = auth.window_type.parse().map_err(|_| {
        CheckoutError::protocol(
            ProtocolErrorCode::UnknownWindowType,
            format!("unrecognized window type {:?}", auth.window_type),
        )
    })?;

    match window_type {
        WindowType::Script => {
            tracing::debug!(gateway = gateway.id, "invoking inline SDK handler");
            host.invoke_script(gateway, auth).await
        }
        WindowType::Redirect => run_redirect(host, gateway, auth).await,
    }
}

async fn run_redirect<H: WindowHost>(
    host: &H,
    gateway: &GatewayInfo,
    auth: &AuthenticateResponse,
) -> Result<AuthData> {
    let raw_url = auth.payment_url.as_deref().ok_or_else(|| {
        CheckoutError::protocol(
            ProtocolErrorCode::NoPaymentUrl,
            "authentication response carries no payment URL",
        )
    })?;
    let url = Url::parse(raw_url).map_err(|_| {
        CheckoutError::protocol(
            ProtocolErrorCode::NoPaymentUrl,
            format!("payment URL is not a valid URL: {raw_url:?}"),
        )
    })?;

    let Some(mut window) = host.open_window(&url) else {
        return Err(CheckoutError::protocol(
            ProtocolErrorCode::PopupBlocked,
            "payment window was blocked before it could open",
        ));
    };

    tracing::debug!(gateway = gateway.id, "payment window opened, race armed");

    let mut poll = tokio::time::interval(CLOSE_POLL_INTERVAL);
    let timeout = tokio::time::sleep(AUTH_TIMEOUT);
    tokio::pin!(timeout);
    let mut messages_open = true;

    // Returning from this loop settles the attempt: the listener, the poll,
    // and the timer are all dropped together, so a signal arriving after the
    // first one is a no-op. `biased` keeps the ordering deterministic when
    // several signals are ready at once -- a delivered message always beats
    // the closed-check and the timeout.
    loop {
        tokio::select! {
            biased;

            inbound = window.recv(), if messages_open => match inbound {
                Some(value) => {
                    let Some(callback) = CallbackMessage::from_value(&value) else {
                        continue;
                    };
                    return if callback.success {
                        Ok(AuthData {
                            gateway_id: gateway.id.to_string(),
                            payload: callback.query_string,
                            timestamp: callback.timestamp,
                        })
                    } else {
                        Err(CheckoutError::AuthenticationFailed {
                            code: AuthFailureCode::AuthFailed,
                            message: "gateway reported a failed authentication".to_string(),
                            query_string: Some(callback.query_string),
                        })
                    };
                }
                None => messages_open = false,
            },

            _ = poll.tick() => {
                if window.is_closed() {
                    return Err(CheckoutError::AuthenticationFailed {
                        code: AuthFailureCode::UserCancel,
                        message: "payment window was closed before completing".to_string(),
                        query_string: None,
                    });
                }
            }

            _ = &mut timeout => {
                if !window.is_closed() {
                    window.close();
                }
                return Err(CheckoutError::AuthenticationFailed {
                    code: AuthFailureCode::Timeout,
                    message: "authentication did not complete in time".to_string(),
                    query_string: None,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn callback_parsing_ignores_foreign_messages() {
        assert!(CallbackMessage::from_value(&json!({"type": "OTHER"})).is_none());
        assert!(CallbackMessage::from_value(&json!("not an object")).is_none());
        assert!(CallbackMessage::from_value(&json!({"success": true})).is_none());

        let parsed = CallbackMessage::from_value(&json!({
            "type": "PAYMENT_CALLBACK",
            "success": true,
            "queryString": "resultCode=0&authCode=AUTH_1",
            "timestamp": "2026-01-01T00:00:00Z",
        }))
        .unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.query_string, "resultCode=0&authCode=AUTH_1");
    }

    #[test]
    fn controller_close_is_visible_to_handle() {
        let (controller, handle) = window_channel();
        assert!(!handle.is_closed());
        controller.close();
        assert!(handle.is_closed());
    }
}
