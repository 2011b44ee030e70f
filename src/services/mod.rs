// Storefront
pub mod cart;
pub mod catalog;
pub mod checkout;

// Payments
pub mod payment_gateway;
pub mod payment_settings;
pub mod payment_webhook;
pub mod payments;

// Back office
pub mod order_status;
