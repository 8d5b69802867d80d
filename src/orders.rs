//! Order placement and the order status lifecycle.
//!
//! `pending -> completed` is an admin transition, `pending -> cancelled` is
//! open to the owner and to admins. Both end states are final.

use chrono::{DateTime, Utc};
use log::{error, info};
use rust_decimal::Decimal;

use crate::auth::{require_admin, require_owner_or_admin, Identity};
use crate::error::ApiError;
use crate::models::{CartItem, Order, OrderDetails, OrderItem, OrderStatus, Product};
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub product_id: i64,
    pub quantity: i64,
    pub price: Decimal,
}

/// A cart priced at the current product prices.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkout {
    pub total: Decimal,
    pub lines: Vec<PricedLine>,
}

pub fn checkout(lines: &[(CartItem, Product)]) -> Result<Checkout, StoreError> {
    if lines.is_empty() {
        return Err(StoreError::EmptyCart);
    }

    let lines: Vec<PricedLine> = lines
        .iter()
        .map(|(item, product)| PricedLine {
            product_id: product.id,
            quantity: item.quantity,
            price: product.price,
        })
        .collect();
    let mut total = Decimal::ZERO;
    for line in &lines {
        total = line
            .price
            .checked_mul(Decimal::from(line.quantity))
            .and_then(|subtotal| total.checked_add(subtotal))
            .ok_or(StoreError::TotalOverflow)?;
    }

    Ok(Checkout { total, lines })
}

impl Checkout {
    /// Freezes the priced lines into a pending order. `item_ids` must yield
    /// one id per line.
    pub fn into_order(
        self,
        order_id: i64,
        user_id: i64,
        item_ids: impl IntoIterator<Item = i64>,
        created_at: DateTime<Utc>,
    ) -> OrderDetails {
        let order = Order {
            id: order_id,
            user_id,
            total_amount: self.total,
            status: OrderStatus::Pending,
            created_at,
        };
        let order_items = self
            .lines
            .into_iter()
            .zip(item_ids)
            .map(|(line, id)| OrderItem {
                id,
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.price,
            })
            .collect();

        OrderDetails { order, order_items }
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    from == OrderStatus::Pending && to != OrderStatus::Pending
}

pub async fn place_order(store: &dyn Store, identity: Identity) -> Result<OrderDetails, ApiError> {
    match store.place_order(identity.user_id).await {
        Ok(details) => {
            info!(
                "User {} placed order {} ({} items, total {})",
                identity.user_id,
                details.order.id,
                details.order_items.len(),
                details.order.total_amount
            );
            Ok(details)
        }
        Err(StoreError::EmptyCart) => Err(ApiError::validation("Cart is empty")),
        Err(e) => {
            error!("Error creating order: {}", e);
            Err(ApiError::Internal("Failed to create order".to_string()))
        }
    }
}

async fn with_items(store: &dyn Store, order: Order) -> Result<OrderDetails, ApiError> {
    let order_items = store.order_items(order.id).await?;
    Ok(OrderDetails { order, order_items })
}

pub async fn list_orders(
    store: &dyn Store,
    identity: Identity,
) -> Result<Vec<OrderDetails>, ApiError> {
    let owner = if identity.is_admin() {
        None
    } else {
        Some(identity.user_id)
    };

    let mut details = Vec::new();
    for order in store.list_orders(owner).await? {
        details.push(with_items(store, order).await?);
    }
    Ok(details)
}

pub async fn get_order(
    store: &dyn Store,
    identity: Identity,
    order_id: i64,
) -> Result<OrderDetails, ApiError> {
    let order = store
        .find_order(order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;
    require_owner_or_admin(&identity, order.user_id, "Unauthorized")?;
    with_items(store, order).await
}

pub async fn update_status(
    store: &dyn Store,
    identity: Identity,
    order_id: i64,
    status: &str,
) -> Result<OrderDetails, ApiError> {
    require_admin(&identity)?;
    if status.trim().is_empty() {
        return Err(ApiError::validation("Status is required"));
    }
    let next: OrderStatus = status.parse().map_err(ApiError::Validation)?;

    let order = store
        .find_order(order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;
    if !can_transition(order.status, next) {
        return Err(ApiError::validation(format!(
            "Cannot change order status from {} to {}",
            order.status, next
        )));
    }

    let updated = store
        .transition_order(order_id, order.status, next)
        .await?
        .ok_or_else(|| ApiError::Conflict("Order status changed concurrently".to_string()))?;
    info!("Order {} moved to {} by admin {}", order_id, next, identity.user_id);
    with_items(store, updated).await
}

#[derive(Debug)]
pub enum Removal {
    Deleted,
    Cancelled(Order),
}

/// Owners cancel their pending orders; admins delete orders outright.
pub async fn cancel_or_delete(
    store: &dyn Store,
    identity: Identity,
    order_id: i64,
) -> Result<Removal, ApiError> {
    let order = store
        .find_order(order_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;
    require_owner_or_admin(&identity, order.user_id, "Unauthorized")?;

    if identity.is_admin() {
        if !store.delete_order(order_id).await? {
            return Err(ApiError::not_found("Order not found"));
        }
        info!("Order {} deleted by admin {}", order_id, identity.user_id);
        return Ok(Removal::Deleted);
    }

    if order.status != OrderStatus::Pending {
        return Err(ApiError::validation("Can only cancel pending orders"));
    }
    let cancelled = store
        .transition_order(order_id, OrderStatus::Pending, OrderStatus::Cancelled)
        .await?
        .ok_or_else(|| ApiError::validation("Can only cancel pending orders"))?;
    info!("Order {} cancelled by user {}", order_id, identity.user_id);
    Ok(Removal::Cancelled(cancelled))
}
