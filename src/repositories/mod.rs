pub mod order_store;
pub mod product_repository;

pub use order_store::{
    InMemoryOrderStore, NewOrder, OrderFilter, OrderPatch, OrderStore, SqlOrderStore,
};
pub use product_repository::{NewProduct, ProductChanges, ProductRepository};
