//! Data model for the checkout client

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{CheckoutError, Result};

/// A product line on the draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub name: String,
    pub price: u64,
    pub shipping_fee: u64,
    pub delivery_group: String,
    pub seller_ref: String,
}

impl LineItem {
    pub fn total(&self) -> u64 {
        self.price + self.shipping_fee
    }
}

/// A paid line item with independently mutable remaining amounts.
///
/// Initialized to the paid values; partial cancellation decrements them.
/// An item whose remaining price and shipping both reach zero is removed
/// from the paid set entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidLineItem {
    #[serde(flatten)]
    pub item: LineItem,
    pub remaining_price: u64,
    pub remaining_shipping: u64,
}

impl PaidLineItem {
    pub fn new(item: LineItem) -> Self {
        let remaining_price = item.price;
        let remaining_shipping = item.shipping_fee;
        Self {
            item,
            remaining_price,
            remaining_shipping,
        }
    }

    pub fn remaining_total(&self) -> u64 {
        self.remaining_price + self.remaining_shipping
    }

    pub fn is_settled(&self) -> bool {
        self.remaining_price == 0 && self.remaining_shipping == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub phone: String,
    pub email: String,
    /// Required customer reference. Every payment and token operation is
    /// keyed on it.
    pub user_ref: String,
}

/// The order being assembled before payment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftOrder {
    pub items: Vec<LineItem>,
    pub customer: Customer,
}

impl DraftOrder {
    pub fn product_amount(&self) -> u64 {
        self.items.iter().map(|i| i.price).sum()
    }

    pub fn shipping_amount(&self) -> u64 {
        self.items.iter().map(|i| i.shipping_fee).sum()
    }

    pub fn total_amount(&self) -> u64 {
        self.items.iter().map(LineItem::total).sum()
    }
}

/// Representative product name for the whole order: the sole item's name,
/// or `"{first} 외 {N-1}건"` when there is more than one line item.
pub fn representative_name(items: &[LineItem]) -> String {
    match items {
        [] => String::new(),
        [only] => only.name.clone(),
        [first, rest @ ..] => format!("{} 외 {}건", first.name, rest.len()),
    }
}

/// Payment method selected for the order, carrying the method-specific
/// required fields. Validated exhaustively before any backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum PaymentMethod {
    #[serde(rename = "CARD", rename_all = "camelCase")]
    Card {
        issuer: String,
        installment: u32,
        use_card_point: bool,
    },
    #[serde(rename = "VBANK")]
    VirtualAccount { bank: String },
    #[serde(rename = "KEYIN", rename_all = "camelCase")]
    KeyIn {
        card_number: String,
        exp_month: String,
        exp_year: String,
    },
    /// Paid against a registered token; skips the authentication window.
    #[serde(rename = "TOKEN")]
    Token,
    #[serde(rename = "SIMPLE_PAY")]
    SimplePay { provider: String },
}

impl PaymentMethod {
    pub fn kind(&self) -> MethodKind {
        match self {
            PaymentMethod::Card { .. } => MethodKind::Card,
            PaymentMethod::VirtualAccount { .. } => MethodKind::Vbank,
            PaymentMethod::KeyIn { .. } => MethodKind::Keyin,
            PaymentMethod::Token => MethodKind::Token,
            PaymentMethod::SimplePay { .. } => MethodKind::SimplePay,
        }
    }

    /// Check the method-specific required fields, naming the missing one.
    pub fn validate(&self) -> Result<()> {
        match self {
            PaymentMethod::Card { issuer, .. } if issuer.trim().is_empty() => {
                Err(CheckoutError::validation("card issuer is required"))
            }
            PaymentMethod::VirtualAccount { bank } if bank.trim().is_empty() => {
                Err(CheckoutError::validation("bank is required"))
            }
            PaymentMethod::KeyIn { card_number, .. } if card_number.trim().is_empty() => {
                Err(CheckoutError::validation("card number is required"))
            }
            PaymentMethod::KeyIn { exp_month, .. } if exp_month.trim().is_empty() => {
                Err(CheckoutError::validation("expiry month is required"))
            }
            PaymentMethod::KeyIn { exp_year, .. } if exp_year.trim().is_empty() => {
                Err(CheckoutError::validation("expiry year is required"))
            }
            PaymentMethod::SimplePay { provider } if provider.trim().is_empty() => {
                Err(CheckoutError::validation("simple-pay provider is required"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MethodKind {
    Card,
    Vbank,
    Keyin,
    Token,
    SimplePay,
}

/// The single current order, set once approval succeeds and cleared only by
/// a full cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Server-issued order reference; the key for every later transaction.
    pub ord_no: String,
    /// Client-generated order id.
    pub order_id: String,
    pub gateway_id: String,
    pub gateway_name: String,
}

/// Opaque authentication outcome handed from the window protocol to the
/// approval call. The payload is never parsed or re-interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    pub gateway_id: String,
    pub payload: String,
    pub timestamp: String,
}

/// A registered payment token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token_id: String,
    pub name: String,
    pub masked_card_ref: String,
    pub has_password: bool,
}

/// One line of a partial cancellation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSelection {
    pub line_item_id: String,
    pub cancel_price: u64,
    pub cancel_shipping: u64,
}

impl CancelSelection {
    pub fn cancel_total(&self) -> u64 {
        self.cancel_price + self.cancel_shipping
    }
}

/// Additional shipping-only charge applied at partial-cancellation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingCharge {
    pub id: String,
    pub name: String,
    pub fee: u64,
    pub delivery_group: String,
    pub seller_ref: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, price: u64, shipping: u64) -> LineItem {
        LineItem {
            id: format!("PROD_{name}"),
            name: name.to_string(),
            price,
            shipping_fee: shipping,
            delivery_group: "A01".to_string(),
            seller_ref: "TEST01".to_string(),
        }
    }

    #[test]
    fn representative_name_single_item() {
        let items = vec![item("Widget", 1000, 0)];
        assert_eq!(representative_name(&items), "Widget");
    }

    #[test]
    fn representative_name_multiple_items() {
        let items = vec![
            item("Widget", 1000, 0),
            item("Gadget", 2000, 500),
            item("Sprocket", 3000, 0),
        ];
        assert_eq!(representative_name(&items), "Widget 외 2건");
    }

    #[test]
    fn representative_name_empty() {
        assert_eq!(representative_name(&[]), "");
    }

    #[test]
    fn method_validation_names_missing_field() {
        let err = PaymentMethod::VirtualAccount {
            bank: String::new(),
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("bank"));

        let err = PaymentMethod::KeyIn {
            card_number: "1234-5678-9012-3456".to_string(),
            exp_month: String::new(),
            exp_year: "2028".to_string(),
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("expiry month"));
    }

    #[test]
    fn method_serializes_with_wire_tag() {
        let method = PaymentMethod::Card {
            issuer: "SHINHAN".to_string(),
            installment: 0,
            use_card_point: false,
        };
        let value = serde_json::to_value(&method).unwrap();
        assert_eq!(value["method"], "CARD");
        assert_eq!(value["issuer"], "SHINHAN");
    }

    #[test]
    fn draft_totals_sum_price_and_shipping() {
        let draft = DraftOrder {
            items: vec![item("Widget", 1_000, 500), item("Gadget", 2_000, 0)],
            customer: Customer::default(),
        };
        assert_eq!(draft.items[0].total(), 1_500);
        assert_eq!(draft.product_amount(), 3_000);
        assert_eq!(draft.shipping_amount(), 500);
        assert_eq!(draft.total_amount(), 3_500);
    }

    #[test]
    fn paid_item_settles_at_zero() {
        let mut paid = PaidLineItem::new(item("Widget", 1000, 500));
        assert!(!paid.is_settled());
        paid.remaining_price = 0;
        paid.remaining_shipping = 0;
        assert!(paid.is_settled());
    }
}
