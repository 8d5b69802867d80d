//! In-process store. Everything sits behind one async mutex; multi-step
//! writes are staged on a copy of the tables and swapped in on success.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{Store, StoreError};
use crate::models::{
    Address, AddressChanges, AddressInput, Cart, CartItem, Category, NewUser, Order, OrderDetails,
    OrderItem, OrderStatus, Product, ProductInput, User, UserChanges, MAX_LINE_QUANTITY,
};
use crate::orders;

/// Steps of order placement that can be made to fail, for rollback tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertOrder,
    InsertOrderItems,
    ClearCart,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    sequences: HashMap<&'static str, i64>,
    users: BTreeMap<i64, User>,
    categories: BTreeMap<i64, Category>,
    products: BTreeMap<i64, Product>,
    carts: BTreeMap<i64, Cart>,
    cart_items: BTreeMap<i64, CartItem>,
    orders: BTreeMap<i64, Order>,
    order_items: BTreeMap<i64, OrderItem>,
    addresses: BTreeMap<i64, Address>,
}

impl Tables {
    fn next_id(&mut self, sequence: &'static str) -> i64 {
        let seq = self.sequences.entry(sequence).or_insert(0);
        *seq += 1;
        *seq
    }

    fn cart_of(&self, user_id: i64) -> Option<&Cart> {
        self.carts.values().find(|c| c.user_id == user_id)
    }

    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn place_order(
        &mut self,
        user_id: i64,
        fail_point: Option<FailPoint>,
    ) -> Result<OrderDetails, StoreError> {
        let fail = |point: FailPoint| {
            if fail_point == Some(point) {
                Err(StoreError::Injected(point))
            } else {
                Ok(())
            }
        };

        let cart = self.cart_of(user_id).cloned().ok_or(StoreError::EmptyCart)?;
        let mut lines = Vec::new();
        for item in self.cart_items.values().filter(|i| i.cart_id == cart.id) {
            let product = self
                .products
                .get(&item.product_id)
                .ok_or(StoreError::NotFound("Product"))?;
            lines.push((item.clone(), product.clone()));
        }
        let checkout = orders::checkout(&lines)?;

        let order_id = self.next_id("orders");
        let item_ids: Vec<i64> = lines.iter().map(|_| self.next_id("order_items")).collect();
        let details = checkout.into_order(order_id, user_id, item_ids, Utc::now());

        fail(FailPoint::InsertOrder)?;
        self.orders.insert(order_id, details.order.clone());

        fail(FailPoint::InsertOrderItems)?;
        for item in &details.order_items {
            self.order_items.insert(item.id, item.clone());
        }

        fail(FailPoint::ClearCart)?;
        self.cart_items.retain(|_, item| item.cart_id != cart.id);

        Ok(details)
    }
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    fail_point: Option<FailPoint>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next order placement fail at `point`.
    pub async fn fail_next_order_at(&self, point: FailPoint) {
        self.state.lock().await.fail_point = Some(point);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        let tables = &mut state.tables;
        if tables.email_taken(&user.email, None) {
            return Err(StoreError::Conflict("User already exists".to_string()));
        }
        let user = User {
            id: tables.next_id("users"),
            email: user.email,
            password: user.password_hash,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: Utc::now(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.tables.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut state = self.state.lock().await;
        let tables = &mut state.tables;
        if let Some(email) = &changes.email {
            if tables.email_taken(email, Some(id)) {
                return Err(StoreError::Conflict("Email already in use".to_string()));
            }
        }
        Ok(tables.users.get_mut(&id).map(|user| {
            changes.apply(user);
            user.clone()
        }))
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let tables = &mut state.tables;
        if tables.users.remove(&id).is_none() {
            return Ok(false);
        }
        if let Some(cart_id) = tables.cart_of(id).map(|c| c.id) {
            tables.cart_items.retain(|_, item| item.cart_id != cart_id);
            tables.carts.remove(&cart_id);
        }
        tables.addresses.retain(|_, address| address.user_id != id);
        Ok(true)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.state.lock().await.tables.categories.values().cloned().collect())
    }

    async fn find_category(&self, id: i64) -> Result<Option<Category>, StoreError> {
        Ok(self.state.lock().await.tables.categories.get(&id).cloned())
    }

    async fn create_category(&self, name: String) -> Result<Category, StoreError> {
        let mut state = self.state.lock().await;
        let tables = &mut state.tables;
        let category = Category {
            id: tables.next_id("categories"),
            name,
        };
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .products
            .values()
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect())
    }

    async fn find_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        Ok(self.state.lock().await.tables.products.get(&id).cloned())
    }

    async fn create_product(&self, input: ProductInput) -> Result<Product, StoreError> {
        let mut state = self.state.lock().await;
        let tables = &mut state.tables;
        let product = input.into_product(tables.next_id("products"));
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: i64,
        input: ProductInput,
    ) -> Result<Option<Product>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.tables.products.get_mut(&id).map(|product| {
            *product = input.into_product(id);
            product.clone()
        }))
    }

    async fn soft_delete_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.tables.products.get_mut(&id).map(|product| {
            product.is_deleted = true;
            product.clone()
        }))
    }

    async fn find_cart(&self, user_id: i64) -> Result<Option<Cart>, StoreError> {
        Ok(self.state.lock().await.tables.cart_of(user_id).cloned())
    }

    async fn find_cart_by_id(&self, cart_id: i64) -> Result<Option<Cart>, StoreError> {
        Ok(self.state.lock().await.tables.carts.get(&cart_id).cloned())
    }

    async fn find_or_create_cart(&self, user_id: i64) -> Result<Cart, StoreError> {
        let mut state = self.state.lock().await;
        let tables = &mut state.tables;
        if let Some(cart) = tables.cart_of(user_id) {
            return Ok(cart.clone());
        }
        let cart = Cart {
            id: tables.next_id("carts"),
            user_id,
            created_at: Utc::now(),
        };
        tables.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn cart_items(&self, cart_id: i64) -> Result<Vec<CartItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .cart_items
            .values()
            .filter(|i| i.cart_id == cart_id)
            .cloned()
            .collect())
    }

    async fn find_cart_item(&self, item_id: i64) -> Result<Option<CartItem>, StoreError> {
        Ok(self.state.lock().await.tables.cart_items.get(&item_id).cloned())
    }

    async fn add_cart_item(
        &self,
        cart_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> Result<CartItem, StoreError> {
        let mut state = self.state.lock().await;
        let tables = &mut state.tables;
        if let Some(item) = tables
            .cart_items
            .values_mut()
            .find(|i| i.cart_id == cart_id && i.product_id == product_id)
        {
            item.quantity = item
                .quantity
                .checked_add(quantity)
                .filter(|q| *q <= MAX_LINE_QUANTITY)
                .ok_or(StoreError::QuantityLimit)?;
            return Ok(item.clone());
        }
        let item = CartItem {
            id: tables.next_id("cart_items"),
            cart_id,
            product_id,
            quantity,
        };
        tables.cart_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn set_cart_item_quantity(
        &self,
        item_id: i64,
        quantity: i64,
    ) -> Result<Option<CartItem>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.tables.cart_items.get_mut(&item_id).map(|item| {
            item.quantity = quantity;
            item.clone()
        }))
    }

    async fn delete_cart_item(&self, item_id: i64) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.tables.cart_items.remove(&item_id).is_some())
    }

    async fn clear_cart(&self, cart_id: i64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let items = &mut state.tables.cart_items;
        let before = items.len();
        items.retain(|_, item| item.cart_id != cart_id);
        Ok((before - items.len()) as u64)
    }

    async fn place_order(&self, user_id: i64) -> Result<OrderDetails, StoreError> {
        let mut state = self.state.lock().await;
        let fail_point = state.fail_point.take();

        let mut staged = state.tables.clone();
        let details = staged.place_order(user_id, fail_point)?;
        state.tables = staged;
        Ok(details)
    }

    async fn list_orders(&self, user_id: Option<i64>) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .orders
            .values()
            .rev()
            .filter(|o| user_id.map_or(true, |id| o.user_id == id))
            .cloned()
            .collect())
    }

    async fn find_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.tables.orders.get(&id).cloned())
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .order_items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn transition_order(
        &self,
        id: i64,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Option<Order>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state
            .tables
            .orders
            .get_mut(&id)
            .filter(|o| o.status == expected)
            .map(|order| {
                order.status = next;
                order.clone()
            }))
    }

    async fn delete_order(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let tables = &mut state.tables;
        if tables.orders.remove(&id).is_none() {
            return Ok(false);
        }
        tables.order_items.retain(|_, item| item.order_id != id);
        Ok(true)
    }

    async fn list_addresses(&self, user_id: i64) -> Result<Vec<Address>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .addresses
            .values()
            .rev()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_address(&self, id: i64) -> Result<Option<Address>, StoreError> {
        Ok(self.state.lock().await.tables.addresses.get(&id).cloned())
    }

    async fn create_address(
        &self,
        user_id: i64,
        input: AddressInput,
    ) -> Result<Address, StoreError> {
        let mut state = self.state.lock().await;
        let tables = &mut state.tables;
        let address = Address {
            id: tables.next_id("addresses"),
            user_id,
            address: input.address,
            city: input.city,
            state: input.state,
            zip: input.zip,
            country: input.country,
            created_at: Utc::now(),
        };
        tables.addresses.insert(address.id, address.clone());
        Ok(address)
    }

    async fn update_address(
        &self,
        id: i64,
        changes: AddressChanges,
    ) -> Result<Option<Address>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.tables.addresses.get_mut(&id).map(|address| {
            changes.apply(address);
            address.clone()
        }))
    }

    async fn delete_address(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.tables.addresses.remove(&id).is_some())
    }
}
