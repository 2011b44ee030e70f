pub mod order;
pub mod payment_settings;
pub mod product;

pub use order::{
    DeliveryOption, Entity as Order, Model as OrderModel, OrderLine, OrderLines, OrderStatus,
    PaymentMethod, ProductSnapshot,
};
pub use payment_settings::{Entity as PaymentSettings, Model as PaymentSettingsModel};
pub use product::{Entity as Product, Model as ProductModel};
