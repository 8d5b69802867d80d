use log::warn;

use crate::auth::{require_owner_or_admin, Identity};
use crate::error::ApiError;
use crate::models::{Cart, CartItem, CartItemView, CartView, MAX_LINE_QUANTITY};
use crate::store::Store;

fn check_quantity(quantity: Option<i64>) -> Result<i64, ApiError> {
    match quantity {
        Some(q) if (1..=MAX_LINE_QUANTITY).contains(&q) => Ok(q),
        _ => Err(ApiError::validation("Invalid quantity")),
    }
}

async fn with_product(store: &dyn Store, item: CartItem) -> Result<CartItemView, ApiError> {
    let product = store.find_product(item.product_id).await?;
    if product.is_none() {
        warn!("Cart item {} references missing product {}", item.id, item.product_id);
    }
    Ok(CartItemView { item, product })
}

async fn item_views(store: &dyn Store, cart: &Cart) -> Result<Vec<CartItemView>, ApiError> {
    let mut views = Vec::new();
    for item in store.cart_items(cart.id).await? {
        views.push(with_product(store, item).await?);
    }
    Ok(views)
}

/// Loads an item and checks the caller may touch it: 404 before 403.
async fn owned_item(
    store: &dyn Store,
    identity: &Identity,
    item_id: i64,
) -> Result<CartItem, ApiError> {
    let item = store
        .find_cart_item(item_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Cart item not found"))?;
    let cart = store
        .find_cart_by_id(item.cart_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Cart item not found"))?;
    require_owner_or_admin(identity, cart.user_id, "Unauthorized")?;
    Ok(item)
}

/// The caller's cart, created on first access.
pub async fn view_cart(store: &dyn Store, identity: Identity) -> Result<CartView, ApiError> {
    let cart = store.find_or_create_cart(identity.user_id).await?;
    let cart_items = item_views(store, &cart).await?;
    Ok(CartView { cart, cart_items })
}

pub async fn list_items(
    store: &dyn Store,
    identity: Identity,
) -> Result<Vec<CartItemView>, ApiError> {
    match store.find_cart(identity.user_id).await? {
        Some(cart) => item_views(store, &cart).await,
        None => Ok(Vec::new()),
    }
}

/// Adding a product already in the cart increases its quantity.
pub async fn add_item(
    store: &dyn Store,
    identity: Identity,
    product_id: Option<i64>,
    quantity: Option<i64>,
) -> Result<CartItemView, ApiError> {
    let (product_id, quantity) = match (product_id, check_quantity(quantity)) {
        (Some(product_id), Ok(quantity)) => (product_id, quantity),
        _ => return Err(ApiError::validation("Invalid product_id or quantity")),
    };

    let product = store
        .find_product(product_id)
        .await?
        .filter(|p| !p.is_deleted)
        .ok_or_else(|| ApiError::not_found("Product not found"))?;

    let cart = store.find_or_create_cart(identity.user_id).await?;
    let item = store.add_cart_item(cart.id, product.id, quantity).await?;
    Ok(CartItemView {
        item,
        product: Some(product),
    })
}

pub async fn update_item_quantity(
    store: &dyn Store,
    identity: Identity,
    item_id: i64,
    quantity: Option<i64>,
) -> Result<CartItemView, ApiError> {
    let quantity = check_quantity(quantity)?;
    owned_item(store, &identity, item_id).await?;

    let item = store
        .set_cart_item_quantity(item_id, quantity)
        .await?
        .ok_or_else(|| ApiError::not_found("Cart item not found"))?;
    with_product(store, item).await
}

pub async fn remove_item(store: &dyn Store, identity: Identity, item_id: i64) -> Result<(), ApiError> {
    owned_item(store, &identity, item_id).await?;
    store.delete_cart_item(item_id).await?;
    Ok(())
}

/// Empties the caller's cart. Returns the number of removed items.
pub async fn clear_cart(store: &dyn Store, identity: Identity) -> Result<u64, ApiError> {
    let cart = store
        .find_cart(identity.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Cart not found"))?;
    require_owner_or_admin(&identity, cart.user_id, "Unauthorized")?;
    Ok(store.clear_cart(cart.id).await?)
}
