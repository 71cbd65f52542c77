use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bottega_core::ClientId;
use bottega_orders::Order;

/// Client kind: private person or company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Person,
    Company,
}

/// Loyalty tier. `None` on the record means not enrolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoyaltyLevel {
    Base,
    Silver,
    Gold,
}

/// Contact information for a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// A customer record.
///
/// There is no referential integrity between clients and orders: association
/// is a loose name/phone match (see [`Client::matches_order`]), mirroring how
/// the console relates the two at display time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub kind: ClientKind,
    pub name: String,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub loyalty: Option<LoyaltyLevel>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(kind: ClientKind, name: impl Into<String>) -> Self {
        Self {
            id: ClientId::new(),
            kind,
            name: name.into(),
            contact: ContactInfo::default(),
            loyalty: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_loyal(&self) -> bool {
        self.loyalty.is_some()
    }

    /// Loose association with an order: case-insensitive name match, or an
    /// exact phone match when both sides carry a phone number.
    pub fn matches_order(&self, order: &Order) -> bool {
        if let (Some(own), Some(theirs)) = (&self.contact.phone, &order.phone) {
            if phones_match(own, theirs) {
                return true;
            }
        }
        self.name.trim().eq_ignore_ascii_case(order.customer_name.trim())
    }

    /// Aggregate spend over a slice of orders, in cents.
    ///
    /// Computed on demand, never persisted. Cancelled orders do not count.
    pub fn total_spend(&self, orders: &[Order]) -> i64 {
        orders
            .iter()
            .filter(|o| self.matches_order(o))
            .filter(|o| o.status != bottega_orders::OrderStatus::Cancelled)
            .map(Order::total)
            .sum()
    }
}

/// Digits-only comparison, tolerant of a country prefix on either side
/// ("+39 333 123 4567" matches "3331234567").
fn phones_match(a: &str, b: &str) -> bool {
    let a = normalize_phone(a);
    let b = normalize_phone(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.ends_with(&b) || b.ends_with(&a)
}

fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}
