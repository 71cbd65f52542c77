use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bottega_core::{DomainError, DomainResult, OrderId};

/// Order status lifecycle.
///
/// `Cancelled` is terminal and replaces deletion: a cancelled order stays in
/// the persisted list with its status changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    New,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::InProgress => "in-progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (New, InProgress) | (InProgress, Completed) | (New, Cancelled) | (InProgress, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// Order line: product name, quantity in a free-form unit, unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product: String,
    pub quantity: f64,
    /// Unit of measure as entered ("kg", "pz", ...). Display-only.
    pub unit: String,
    /// Price per unit in smallest currency unit (cents).
    pub unit_price: i64,
}

impl OrderLine {
    /// Line total in cents, rounded half-up on fractional quantities.
    pub fn total(&self) -> i64 {
        (self.quantity * self.unit_price as f64).round() as i64
    }
}

/// A customer order with line items, pickup time and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub pickup_at: DateTime<Utc>,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order in `New` status.
    pub fn new(
        customer_name: impl Into<String>,
        pickup_at: DateTime<Utc>,
        lines: Vec<OrderLine>,
    ) -> DomainResult<Self> {
        let customer_name = customer_name.into();
        if customer_name.trim().is_empty() {
            return Err(DomainError::validation("customer name must not be empty"));
        }
        for line in &lines {
            if line.quantity <= 0.0 {
                return Err(DomainError::validation("line quantity must be positive"));
            }
            if line.unit_price < 0 {
                return Err(DomainError::validation("unit price must not be negative"));
            }
        }

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            customer_name,
            phone: None,
            pickup_at,
            lines,
            status: OrderStatus::New,
            note: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Order total in cents.
    pub fn total(&self) -> i64 {
        self.lines.iter().map(OrderLine::total).sum()
    }

    /// Transition to a new status, enforcing the lifecycle rules.
    pub fn set_status(&mut self, next: OrderStatus) -> DomainResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(DomainError::illegal_transition(format!(
                "{} -> {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Cancel the order. Allowed from any non-terminal status.
    pub fn cancel(&mut self) -> DomainResult<()> {
        self.set_status(OrderStatus::Cancelled)
    }

    pub fn is_modifiable(&self) -> bool {
        !self.status.is_terminal()
    }
}
