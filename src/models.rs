use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

/// Stored user record. Never serialised into a response directly,
/// see [`PublicUser`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicUser {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            created_at: user.created_at,
        }
    }
}

/// A user ready to be persisted; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "password", skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password_hash.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(email) = &self.email {
            user.email = email.clone();
        }
        if let Some(hash) = &self.password_hash {
            user.password = hash.clone();
        }
        if let Some(first_name) = &self.first_name {
            user.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &self.last_name {
            user.last_name = Some(last_name.clone());
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileInput {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    pub token: String,
    pub success: bool,
    pub message: &'static str,
}

/// Persisted id sequence, one document per collection.
#[derive(Serialize, Deserialize, Debug)]
pub struct Counter {
    pub _id: String,
    pub seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CategoryInput {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub category_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub stock: i64,
    pub sold_count: i64,
    pub is_deleted: bool,
}

/// Fields an admin supplies when creating or replacing a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInput {
    pub category_id: Option<i64>,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub sold_count: i64,
    #[serde(default)]
    pub is_deleted: bool,
}

impl ProductInput {
    pub fn into_product(self, id: i64) -> Product {
        Product {
            id,
            category_id: self.category_id,
            name: self.name,
            description: self.description,
            price: self.price,
            image_url: self.image_url,
            stock: self.stock,
            sold_count: self.sold_count,
            is_deleted: self.is_deleted,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cart {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Upper bound for the quantity of a single cart line.
pub const MAX_LINE_QUANTITY: i64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartItemView {
    #[serde(flatten)]
    pub item: CartItem,
    pub product: Option<Product>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub cart_items: Vec<CartItemView>,
}

#[derive(Debug, Deserialize)]
pub struct AddCartItemInput {
    pub product_id: Option<i64>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityInput {
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    /// Case-insensitive, `"Completed"` and `"completed"` are the same status.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err("Invalid status".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    /// Price at purchase time; never recalculated.
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub order_items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusInput {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressInput {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl AddressChanges {
    /// Drops blank fields so they don't overwrite stored values.
    pub fn without_blanks(self) -> Self {
        let keep = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        AddressChanges {
            address: keep(self.address),
            city: keep(self.city),
            state: keep(self.state),
            zip: keep(self.zip),
            country: keep(self.country),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_none()
            && self.city.is_none()
            && self.state.is_none()
            && self.zip.is_none()
            && self.country.is_none()
    }

    pub fn apply(&self, target: &mut Address) {
        let fields = [
            (&self.address, &mut target.address),
            (&self.city, &mut target.city),
            (&self.state, &mut target.state),
            (&self.zip, &mut target.zip),
            (&self.country, &mut target.country),
        ];
        for (change, field) in fields {
            if let Some(value) = change {
                *field = value.clone();
            }
        }
    }
}
