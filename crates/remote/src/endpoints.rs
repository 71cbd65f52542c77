//! Typed wrappers for the console's REST endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bottega_clients::Client;
use bottega_core::OrderId;
use bottega_orders::Order;

use crate::client::ApiClient;
use crate::error::ApiError;

/// Aggregate dashboard figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub orders_today: u32,
    pub pending_orders: u32,
    /// Revenue for the day in cents.
    pub revenue_today: i64,
}

/// WhatsApp channel status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsappStatus {
    pub connected: bool,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// A warehouse item below its minimum stock level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockItem {
    pub name: String,
    pub quantity: f64,
    pub minimum: f64,
    pub unit: String,
}

/// A broadcast message to customers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comunicazione {
    pub id: uuid::Uuid,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

impl ApiClient {
    pub async fn list_orders(&self) -> Result<Vec<Order>, ApiError> {
        self.get_json("/api/ordini").await
    }

    pub async fn create_order(&self, order: &Order) -> Result<Order, ApiError> {
        self.post_json("/api/ordini", order).await
    }

    pub async fn update_order(&self, order: &Order) -> Result<Order, ApiError> {
        self.put_json(&format!("/api/ordini/{}", order.id), order).await
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order, ApiError> {
        self.get_json(&format!("/api/ordini/{id}")).await
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>, ApiError> {
        self.get_json("/api/clienti").await
    }

    pub async fn create_client(&self, client: &Client) -> Result<Client, ApiError> {
        self.post_json("/api/clienti", client).await
    }

    pub async fn update_client(&self, client: &Client) -> Result<Client, ApiError> {
        self.put_json(&format!("/api/clienti/{}", client.id), client)
            .await
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary, ApiError> {
        self.get_json("/api/dashboard/summary").await
    }

    pub async fn whatsapp_status(&self) -> Result<WhatsappStatus, ApiError> {
        self.get_json("/api/whatsapp/status").await
    }

    pub async fn low_stock(&self) -> Result<Vec<LowStockItem>, ApiError> {
        self.get_json("/api/magazzino/scorte-basse").await
    }

    pub async fn list_comunicazioni(&self) -> Result<Vec<Comunicazione>, ApiError> {
        self.get_json("/api/comunicazioni").await
    }

    pub async fn send_comunicazione(
        &self,
        comunicazione: &Comunicazione,
    ) -> Result<Comunicazione, ApiError> {
        self.post_json("/api/comunicazioni", comunicazione).await
    }
}
