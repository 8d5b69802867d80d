//! Persistence port. Handlers only ever see `dyn Store`, injected through
//! `web::Data`, so the backend is chosen once at startup.

use async_trait::async_trait;

use crate::models::{
    Address, AddressChanges, AddressInput, Cart, CartItem, Category, NewUser, Order, OrderDetails,
    OrderItem, OrderStatus, Product, ProductInput, User, UserChanges,
};

pub mod memory;
pub mod mongo;

pub use memory::{FailPoint, MemoryStore};
pub use mongo::MongoStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated.
    #[error("{0}")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("cart is empty")]
    EmptyCart,
    /// A cart line would exceed `MAX_LINE_QUANTITY`.
    #[error("quantity limit exceeded")]
    QuantityLimit,
    #[error("order total overflows")]
    TotalOverflow,
    #[error("injected failure at {0:?}")]
    Injected(FailPoint),
    #[error("{0}")]
    Backend(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError>;
    /// Removes the user with their cart, cart items and addresses.
    /// Orders are kept.
    async fn delete_user(&self, id: i64) -> Result<bool, StoreError>;

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;
    async fn find_category(&self, id: i64) -> Result<Option<Category>, StoreError>;
    async fn create_category(&self, name: String) -> Result<Category, StoreError>;

    /// Products not flagged as deleted.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;
    /// Any product by id, deleted or not.
    async fn find_product(&self, id: i64) -> Result<Option<Product>, StoreError>;
    async fn create_product(&self, input: ProductInput) -> Result<Product, StoreError>;
    async fn update_product(&self, id: i64, input: ProductInput)
        -> Result<Option<Product>, StoreError>;
    async fn soft_delete_product(&self, id: i64) -> Result<Option<Product>, StoreError>;

    async fn find_cart(&self, user_id: i64) -> Result<Option<Cart>, StoreError>;
    async fn find_cart_by_id(&self, cart_id: i64) -> Result<Option<Cart>, StoreError>;
    async fn find_or_create_cart(&self, user_id: i64) -> Result<Cart, StoreError>;
    async fn cart_items(&self, cart_id: i64) -> Result<Vec<CartItem>, StoreError>;
    async fn find_cart_item(&self, item_id: i64) -> Result<Option<CartItem>, StoreError>;
    /// Adds `quantity` to the (cart, product) line, creating it if needed.
    async fn add_cart_item(
        &self,
        cart_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> Result<CartItem, StoreError>;
    async fn set_cart_item_quantity(
        &self,
        item_id: i64,
        quantity: i64,
    ) -> Result<Option<CartItem>, StoreError>;
    async fn delete_cart_item(&self, item_id: i64) -> Result<bool, StoreError>;
    async fn clear_cart(&self, cart_id: i64) -> Result<u64, StoreError>;

    /// Turns the user's cart into a pending order and empties the cart,
    /// all or nothing.
    async fn place_order(&self, user_id: i64) -> Result<OrderDetails, StoreError>;
    /// Newest first. `None` lists every user's orders.
    async fn list_orders(&self, user_id: Option<i64>) -> Result<Vec<Order>, StoreError>;
    async fn find_order(&self, id: i64) -> Result<Option<Order>, StoreError>;
    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError>;
    /// Moves the order to `next` only if it is still in `expected`.
    async fn transition_order(
        &self,
        id: i64,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Option<Order>, StoreError>;
    /// Deletes the order and its items together.
    async fn delete_order(&self, id: i64) -> Result<bool, StoreError>;

    /// Newest first.
    async fn list_addresses(&self, user_id: i64) -> Result<Vec<Address>, StoreError>;
    async fn find_address(&self, id: i64) -> Result<Option<Address>, StoreError>;
    async fn create_address(&self, user_id: i64, input: AddressInput)
        -> Result<Address, StoreError>;
    async fn update_address(
        &self,
        id: i64,
        changes: AddressChanges,
    ) -> Result<Option<Address>, StoreError>;
    async fn delete_address(&self, id: i64) -> Result<bool, StoreError>;
}
