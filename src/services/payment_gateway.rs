//! Outbound half of the payment gateway integration.
//!
//! Orders paid online are registered with the gateway, which answers with a
//! transaction handle (`hash_pedido`). The buyer is redirected to the hosted
//! checkout page for that handle, and the gateway later reports the outcome
//! through the webhook handled in [`crate::services::payment_webhook`].
//!
//! Every exchange is authenticated with a lowercase hex SHA-1 token over the
//! merchant's private key and request-specific values.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::entities::OrderModel;
use crate::errors::ServiceError;

const ORDER_KIND: &str = "VENTA-COMERCIO";
const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const PAYMENT_WINDOW_HOURS: i64 = 24;
const UNKNOWN_GATEWAY_ERROR: &str = "unknown gateway error";

/// What the caller needs to send the buyer to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInitiation {
    pub transaction_handle: String,
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registers `order` with the gateway. Does not touch the order store;
    /// attaching the handle is the caller's job.
    async fn create_payment_order(
        &self,
        order: &OrderModel,
        return_base_url: &str,
    ) -> Result<PaymentInitiation, ServiceError>;

    /// Hosted checkout page for an already issued transaction handle.
    fn redirect_url(&self, transaction_handle: &str) -> String;
}

fn sha1_hex(parts: &[&str]) -> String {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Amount as the gateway expects it: no trailing fractional zeros, so
/// `200000.00` renders as `200000`.
pub fn format_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

/// Integrity token for a transaction request.
pub fn order_token(private_key: &str, order_id: Uuid, total: Decimal) -> String {
    sha1_hex(&[private_key, &order_id.to_string(), &format_amount(total)])
}

/// Token the gateway must present when calling back about `hash_pedido`.
pub fn callback_token(private_key: &str, hash_pedido: &str) -> String {
    sha1_hex(&[private_key, hash_pedido])
}

/// Byte-wise comparison whose running time does not depend on where the
/// inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Serialize)]
struct Buyer<'a> {
    nombre: &'a str,
    email: &'a str,
    telefono: &'a str,
    direccion: &'a str,
    ciudad: &'a str,
    razon_social: &'a str,
    tipo_documento: &'a str,
    documento: &'a str,
}

#[derive(Debug, Serialize)]
struct PurchaseItem {
    nombre: String,
    cantidad: i32,
    precio_total: Value,
    descripcion: String,
    id_producto: String,
    categoria: String,
    url_imagen: String,
}

#[derive(Debug, Serialize)]
struct TransactionRequest<'a> {
    token: String,
    public_key: &'a str,
    monto_total: Value,
    tipo_pedido: &'a str,
    id_pedido_comercio: String,
    descripcion_resumen: String,
    fecha_maxima_pago: String,
    url_retorno: String,
    comprador: Buyer<'a>,
    compras_items: Vec<PurchaseItem>,
}

#[derive(Debug, Deserialize)]
struct TransactionReply {
    #[serde(default)]
    respuesta: bool,
    #[serde(default)]
    resultado: Value,
}

impl TransactionReply {
    fn handle(&self) -> Option<&str> {
        self.resultado
            .as_array()?
            .first()?
            .get("data")?
            .as_str()
            .filter(|h| !h.is_empty())
    }

    fn message(&self) -> Option<&str> {
        self.resultado.as_str().filter(|m| !m.is_empty())
    }
}

fn json_amount(amount: Decimal) -> Result<Value, ServiceError> {
    format_amount(amount)
        .parse::<serde_json::Number>()
        .map(Value::Number)
        .map_err(|e| ServiceError::SerializationError(e.to_string()))
}

/// Gateway message from an error body, when it carries one.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["resultado", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

/// Pagopar-compatible [`PaymentGateway`] over HTTPS.
#[derive(Clone)]
pub struct PagoparGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl PagoparGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn build_request<'a>(
        &self,
        order: &'a OrderModel,
        public_key: &'a str,
        private_key: &str,
        return_base_url: &str,
    ) -> Result<TransactionRequest<'a>, ServiceError> {
        let items = order
            .items
            .iter()
            .map(|line| -> Result<PurchaseItem, ServiceError> {
                Ok(PurchaseItem {
                    nombre: line.product.name.clone(),
                    cantidad: line.quantity,
                    precio_total: json_amount(line.subtotal)?,
                    descripcion: line.product.id.to_string(),
                    id_producto: line.product.id.to_string(),
                    categoria: line.product.category.clone().unwrap_or_default(),
                    url_imagen: line.product.image_url.clone().unwrap_or_default(),
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let deadline = Utc::now() + ChronoDuration::hours(PAYMENT_WINDOW_HOURS);

        Ok(TransactionRequest {
            token: order_token(private_key, order.id, order.total),
            public_key,
            monto_total: json_amount(order.total)?,
            tipo_pedido: ORDER_KIND,
            id_pedido_comercio: order.id.to_string(),
            descripcion_resumen: format!("Pedido {}", order.id),
            fecha_maxima_pago: deadline.format(DEADLINE_FORMAT).to_string(),
            url_retorno: format!(
                "{}/pagos/retorno?pedido={}",
                return_base_url.trim_end_matches('/'),
                order.id
            ),
            comprador: Buyer {
                nombre: &order.customer_name,
                email: &order.customer_email,
                telefono: &order.customer_phone,
                direccion: &order.shipping_address,
                ciudad: &order.shipping_city,
                razon_social: &order.customer_name,
                tipo_documento: "CI",
                documento: "",
            },
            compras_items: items,
        })
    }
}

#[async_trait]
impl PaymentGateway for PagoparGateway {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_payment_order(
        &self,
        order: &OrderModel,
        return_base_url: &str,
    ) -> Result<PaymentInitiation, ServiceError> {
        let (public_key, private_key) = self.config.credentials().ok_or_else(|| {
            error!("Payment gateway keys are not configured");
            ServiceError::GatewayConfiguration("gateway public/private keys missing".to_string())
        })?;

        let request = self.build_request(order, public_key, private_key, return_base_url)?;

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Payment gateway unreachable");
                ServiceError::GatewayRequest(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
            warn!(status = %status, message = %message, "Payment gateway rejected transaction");
            return Err(ServiceError::GatewayRequest(message));
        }

        let reply: TransactionReply = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "Unparseable payment gateway reply");
            ServiceError::GatewayResponse(UNKNOWN_GATEWAY_ERROR.to_string())
        })?;

        if !reply.respuesta {
            if let Some(message) = reply.message() {
                warn!(message = %message, "Payment gateway refused transaction");
                return Err(ServiceError::GatewayRequest(message.to_string()));
            }
            return Err(ServiceError::GatewayResponse(
                UNKNOWN_GATEWAY_ERROR.to_string(),
            ));
        }

        let handle = reply
            .handle()
            .ok_or_else(|| ServiceError::GatewayResponse(UNKNOWN_GATEWAY_ERROR.to_string()))?
            .to_string();

        info!(transaction_handle = %handle, "Payment transaction created");

        Ok(PaymentInitiation {
            redirect_url: self.redirect_url(&handle),
            transaction_handle: handle,
        })
    }

    fn redirect_url(&self, transaction_handle: &str) -> String {
        format!(
            "{}/{}",
            self.config.checkout_url.trim_end_matches('/'),
            transaction_handle
        )
    }
}
