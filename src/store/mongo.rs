use async_trait::async_trait;
use chrono::Utc;
use futures::stream::TryStreamExt;
use log::{info, warn};
use mongodb::bson::{self, doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Store, StoreError};
use crate::models::{
    Address, AddressChanges, AddressInput, Cart, CartItem, Category, Counter, NewUser, Order,
    OrderDetails, OrderItem, OrderStatus, Product, ProductInput, User, UserChanges,
    MAX_LINE_QUANTITY,
};
use crate::orders;

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn to_set<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    let fields = bson::to_document(value).map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(doc! { "$set": fields })
}

fn newest_first() -> FindOptions {
    FindOptions::builder().sort(doc! { "id": -1 }).build()
}

fn return_updated() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

/// MongoDB backend. Order placement and order deletion use multi-document
/// transactions, which need a replica set.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(database_url: &str, database_name: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(database_url).await?;
        let db = client.database(database_name);
        let store = MongoStore { client, db };
        store.ensure_indexes().await?;
        info!("Connected to MongoDB database {}", database_name);
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique = |keys: Document| {
            IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).build())
                .build()
        };

        for name in [
            "users",
            "categories",
            "products",
            "carts",
            "cart_items",
            "orders",
            "order_items",
            "addresses",
        ] {
            self.db
                .collection::<Document>(name)
                .create_index(unique(doc! { "id": 1 }), None)
                .await?;
        }
        self.users().create_index(unique(doc! { "email": 1 }), None).await?;
        self.carts().create_index(unique(doc! { "user_id": 1 }), None).await?;
        self.cart_items()
            .create_index(unique(doc! { "cart_id": 1, "product_id": 1 }), None)
            .await?;
        Ok(())
    }

    fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    fn categories(&self) -> Collection<Category> {
        self.db.collection("categories")
    }

    fn products(&self) -> Collection<Product> {
        self.db.collection("products")
    }

    fn carts(&self) -> Collection<Cart> {
        self.db.collection("carts")
    }

    fn cart_items(&self) -> Collection<CartItem> {
        self.db.collection("cart_items")
    }

    fn orders(&self) -> Collection<Order> {
        self.db.collection("orders")
    }

    fn order_items(&self) -> Collection<OrderItem> {
        self.db.collection("order_items")
    }

    fn addresses(&self) -> Collection<Address> {
        self.db.collection("addresses")
    }

    fn counters(&self) -> Collection<Counter> {
        self.db.collection("counters")
    }

    fn counter_update(seq_name: &str) -> (Document, Document, FindOneAndUpdateOptions) {
        let filter = doc! { "_id": seq_name };
        let update = doc! { "$inc": { "seq": 1_i64 } };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        (filter, update, options)
    }

    async fn next_id(&self, seq_name: &str) -> Result<i64, StoreError> {
        let (filter, update, options) = Self::counter_update(seq_name);
        self.counters()
            .find_one_and_update(filter, update, options)
            .await?
            .map(|counter| counter.seq)
            .ok_or_else(|| StoreError::Backend("Failed to generate sequence value".to_string()))
    }

    async fn next_id_in(
        &self,
        session: &mut ClientSession,
        seq_name: &str,
    ) -> Result<i64, StoreError> {
        let (filter, update, options) = Self::counter_update(seq_name);
        self.counters()
            .find_one_and_update_with_session(filter, update, options, session)
            .await?
            .map(|counter| counter.seq)
            .ok_or_else(|| StoreError::Backend("Failed to generate sequence value".to_string()))
    }

    async fn find_all<T>(
        &self,
        collection: Collection<T>,
        filter: Document,
        options: Option<FindOptions>,
    ) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let cursor = collection.find(filter, options).await?;
        let found: Vec<T> = cursor.try_collect().await?;
        Ok(found)
    }

    /// Runs `place_order` inside an open transaction. Any error aborts it.
    async fn place_order_in(
        &self,
        session: &mut ClientSession,
        user_id: i64,
    ) -> Result<OrderDetails, StoreError> {
        let cart = self
            .carts()
            .find_one_with_session(doc! { "user_id": user_id }, None, session)
            .await?
            .ok_or(StoreError::EmptyCart)?;

        let mut cursor = self
            .cart_items()
            .find_with_session(doc! { "cart_id": cart.id }, None, session)
            .await?;
        let mut items = Vec::new();
        while let Some(item) = cursor.next(session).await {
            items.push(item?);
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = self
                .products()
                .find_one_with_session(doc! { "id": item.product_id }, None, session)
                .await?
                .ok_or(StoreError::NotFound("Product"))?;
            lines.push((item, product));
        }
        let checkout = orders::checkout(&lines)?;

        let order_id = self.next_id_in(session, "orders").await?;
        let mut item_ids = Vec::with_capacity(lines.len());
        for _ in &lines {
            item_ids.push(self.next_id_in(session, "order_items").await?);
        }
        let details = checkout.into_order(order_id, user_id, item_ids, Utc::now());

        self.orders()
            .insert_one_with_session(&details.order, None, session)
            .await?;
        self.order_items()
            .insert_many_with_session(&details.order_items, None, session)
            .await?;
        let cleared = self
            .cart_items()
            .delete_many_with_session(doc! { "cart_id": cart.id }, None, session)
            .await?;
        if cleared.deleted_count != lines.len() as u64 {
            return Err(StoreError::Backend(format!(
                "cart {} changed during checkout",
                cart.id
            )));
        }

        Ok(details)
    }

    /// Removes the user with their cart, cart items and addresses.
    async fn delete_user_in(
        &self,
        session: &mut ClientSession,
        id: i64,
    ) -> Result<bool, StoreError> {
        let result = self
            .users()
            .delete_one_with_session(doc! { "id": id }, None, session)
            .await?;
        if result.deleted_count == 0 {
            return Ok(false);
        }
        let cart = self
            .carts()
            .find_one_with_session(doc! { "user_id": id }, None, session)
            .await?;
        if let Some(cart) = cart {
            self.cart_items()
                .delete_many_with_session(doc! { "cart_id": cart.id }, None, session)
                .await?;
            self.carts()
                .delete_one_with_session(doc! { "id": cart.id }, None, session)
                .await?;
        }
        self.addresses()
            .delete_many_with_session(doc! { "user_id": id }, None, session)
            .await?;
        Ok(true)
    }

    async fn delete_order_in(
        &self,
        session: &mut ClientSession,
        id: i64,
    ) -> Result<bool, StoreError> {
        self.order_items()
            .delete_many_with_session(doc! { "order_id": id }, None, session)
            .await?;
        let result = self
            .orders()
            .delete_one_with_session(doc! { "id": id }, None, session)
            .await?;
        Ok(result.deleted_count == 1)
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let user = User {
            id: self.next_id("users").await?,
            email: user.email,
            password: user.password_hash,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
            created_at: Utc::now(),
        };
        match self.users().insert_one(&user, None).await {
            Ok(_) => Ok(user),
            Err(e) if is_duplicate_key(&e) => {
                Err(StoreError::Conflict("User already exists".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(doc! { "id": id }, None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(doc! { "email": email }, None).await?)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<Option<User>, StoreError> {
        if changes.is_empty() {
            return self.find_user(id).await;
        }
        let update = to_set(&changes)?;
        match self
            .users()
            .find_one_and_update(doc! { "id": id }, update, return_updated())
            .await
        {
            Ok(user) => Ok(user),
            Err(e) if is_duplicate_key(&e) => {
                Err(StoreError::Conflict("Email already in use".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        match self.delete_user_in(&mut session, id).await {
            Ok(deleted) => {
                session.commit_transaction().await?;
                Ok(deleted)
            }
            Err(err) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!("Failed to abort user deletion: {}", abort);
                }
                Err(err)
            }
        }
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "id": 1 }).build();
        self.find_all(self.categories(), doc! {}, Some(options)).await
    }

    async fn find_category(&self, id: i64) -> Result<Option<Category>, StoreError> {
        Ok(self.categories().find_one(doc! { "id": id }, None).await?)
    }

    async fn create_category(&self, name: String) -> Result<Category, StoreError> {
        let category = Category {
            id: self.next_id("categories").await?,
            name,
        };
        self.categories().insert_one(&category, None).await?;
        Ok(category)
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "id": 1 }).build();
        self.find_all(self.products(), doc! { "is_deleted": false }, Some(options))
            .await
    }

    async fn find_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        Ok(self.products().find_one(doc! { "id": id }, None).await?)
    }

    async fn create_product(&self, input: ProductInput) -> Result<Product, StoreError> {
        let product = input.into_product(self.next_id("products").await?);
        self.products().insert_one(&product, None).await?;
        Ok(product)
    }

    async fn update_product(
        &self,
        id: i64,
        input: ProductInput,
    ) -> Result<Option<Product>, StoreError> {
        let update = to_set(&input)?;
        Ok(self
            .products()
            .find_one_and_update(doc! { "id": id }, update, return_updated())
            .await?)
    }

    async fn soft_delete_product(&self, id: i64) -> Result<Option<Product>, StoreError> {
        Ok(self
            .products()
            .find_one_and_update(
                doc! { "id": id },
                doc! { "$set": { "is_deleted": true } },
                return_updated(),
            )
            .await?)
    }

    async fn find_cart(&self, user_id: i64) -> Result<Option<Cart>, StoreError> {
        Ok(self.carts().find_one(doc! { "user_id": user_id }, None).await?)
    }

    async fn find_cart_by_id(&self, cart_id: i64) -> Result<Option<Cart>, StoreError> {
        Ok(self.carts().find_one(doc! { "id": cart_id }, None).await?)
    }

    async fn find_or_create_cart(&self, user_id: i64) -> Result<Cart, StoreError> {
        if let Some(cart) = self.find_cart(user_id).await? {
            return Ok(cart);
        }
        let cart = Cart {
            id: self.next_id("carts").await?,
            user_id,
            created_at: Utc::now(),
        };
        match self.carts().insert_one(&cart, None).await {
            Ok(_) => Ok(cart),
            // lost a race with a concurrent first access
            Err(e) if is_duplicate_key(&e) => self
                .find_cart(user_id)
                .await?
                .ok_or(StoreError::NotFound("Cart")),
            Err(e) => Err(e.into()),
        }
    }

    async fn cart_items(&self, cart_id: i64) -> Result<Vec<CartItem>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "id": 1 }).build();
        self.find_all(self.cart_items(), doc! { "cart_id": cart_id }, Some(options))
            .await
    }

    async fn find_cart_item(&self, item_id: i64) -> Result<Option<CartItem>, StoreError> {
        Ok(self.cart_items().find_one(doc! { "id": item_id }, None).await?)
    }

    async fn add_cart_item(
        &self,
        cart_id: i64,
        product_id: i64,
        quantity: i64,
    ) -> Result<CartItem, StoreError> {
        // The id is only used when the line doesn't exist yet.
        let candidate_id = self.next_id("cart_items").await?;
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        // A line already at the limit falls out of the filter, so the upsert
        // attempts an insert and hits the (cart_id, product_id) unique index.
        let filter = doc! {
            "cart_id": cart_id,
            "product_id": product_id,
            "quantity": { "$lte": MAX_LINE_QUANTITY - quantity },
        };
        let update = doc! {
            "$inc": { "quantity": quantity },
            "$setOnInsert": { "id": candidate_id },
        };

        for _ in 0..2 {
            match self
                .cart_items()
                .find_one_and_update(filter.clone(), update.clone(), options.clone())
                .await
            {
                Ok(Some(item)) => return Ok(item),
                Ok(None) => break,
                Err(e) if is_duplicate_key(&e) => {
                    let existing = self
                        .cart_items()
                        .find_one(doc! { "cart_id": cart_id, "product_id": product_id }, None)
                        .await?;
                    match existing {
                        Some(item) if item.quantity + quantity > MAX_LINE_QUANTITY => {
                            return Err(StoreError::QuantityLimit)
                        }
                        // lost a race with a concurrent first insert, retry
                        _ => continue,
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Backend("cart item upsert returned nothing".to_string()))
    }

    async fn set_cart_item_quantity(
        &self,
        item_id: i64,
        quantity: i64,
    ) -> Result<Option<CartItem>, StoreError> {
        Ok(self
            .cart_items()
            .find_one_and_update(
                doc! { "id": item_id },
                doc! { "$set": { "quantity": quantity } },
                return_updated(),
            )
            .await?)
    }

    async fn delete_cart_item(&self, item_id: i64) -> Result<bool, StoreError> {
        let result = self
            .cart_items()
            .delete_one(doc! { "id": item_id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn clear_cart(&self, cart_id: i64) -> Result<u64, StoreError> {
        let result = self
            .cart_items()
            .delete_many(doc! { "cart_id": cart_id }, None)
            .await?;
        Ok(result.deleted_count)
    }

    async fn place_order(&self, user_id: i64) -> Result<OrderDetails, StoreError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        match self.place_order_in(&mut session, user_id).await {
            Ok(details) => {
                session.commit_transaction().await?;
                Ok(details)
            }
            Err(err) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!("Failed to abort order transaction: {}", abort);
                }
                Err(err)
            }
        }
    }

    async fn list_orders(&self, user_id: Option<i64>) -> Result<Vec<Order>, StoreError> {
        let filter = match user_id {
            Some(id) => doc! { "user_id": id },
            None => doc! {},
        };
        self.find_all(self.orders(), filter, Some(newest_first())).await
    }

    async fn find_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        Ok(self.orders().find_one(doc! { "id": id }, None).await?)
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, StoreError> {
        let options = FindOptions::builder().sort(doc! { "id": 1 }).build();
        self.find_all(self.order_items(), doc! { "order_id": order_id }, Some(options))
            .await
    }

    async fn transition_order(
        &self,
        id: i64,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .orders()
            .find_one_and_update(
                doc! { "id": id, "status": expected.as_str() },
                doc! { "$set": { "status": next.as_str() } },
                return_updated(),
            )
            .await?)
    }

    async fn delete_order(&self, id: i64) -> Result<bool, StoreError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        match self.delete_order_in(&mut session, id).await {
            Ok(deleted) => {
                session.commit_transaction().await?;
                Ok(deleted)
            }
            Err(err) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!("Failed to abort order deletion: {}", abort);
                }
                Err(err)
            }
        }
    }

    async fn list_addresses(&self, user_id: i64) -> Result<Vec<Address>, StoreError> {
        self.find_all(self.addresses(), doc! { "user_id": user_id }, Some(newest_first()))
            .await
    }

    async fn find_address(&self, id: i64) -> Result<Option<Address>, StoreError> {
        Ok(self.addresses().find_one(doc! { "id": id }, None).await?)
    }

    async fn create_address(
        &self,
        user_id: i64,
        input: AddressInput,
    ) -> Result<Address, StoreError> {
        let address = Address {
            id: self.next_id("addresses").await?,
            user_id,
            address: input.address,
            city: input.city,
            state: input.state,
            zip: input.zip,
            country: input.country,
            created_at: Utc::now(),
        };
        self.addresses().insert_one(&address, None).await?;
        Ok(address)
    }

    async fn update_address(
        &self,
        id: i64,
        changes: AddressChanges,
    ) -> Result<Option<Address>, StoreError> {
        let update = to_set(&changes)?;
        Ok(self
            .addresses()
            .find_one_and_update(doc! { "id": id }, update, return_updated())
            .await?)
    }

    async fn delete_address(&self, id: i64) -> Result<bool, StoreError> {
        let result = self
            .addresses()
            .delete_one(doc! { "id": id }, None)
            .await?;
        Ok(result.deleted_count == 1)
    }
}
