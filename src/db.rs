use crate::config::AppConfig;
use crate::entities::{Order, PaymentSettings, Product};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Acquire connection timeout
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 8,
            connect_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl DbConfig {
    /// An in-memory SQLite database lives inside one connection, so the pool
    /// must never hold more than that one.
    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Establishes a connection pool from the application configuration
pub async fn establish_connection_from_app_config(
    cfg: &AppConfig,
) -> Result<DbPool, DbErr> {
    let config = DbConfig {
        url: cfg.database_url.clone(),
        max_connections: cfg.db_max_connections,
        ..Default::default()
    };
    establish_connection_with_config(&config).await
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!("Configuring database connection with: {:?}", config);

    let max_connections = if config.is_in_memory() {
        1
    } else {
        config.max_connections
    };

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(max_connections)
        .min_connections(1)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    info!(
        "Connecting to database with max_connections={}",
        max_connections
    );
    Database::connect(opt).await
}

/// Creates the `orders`, `products` and `payment_settings` tables when missing.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = [
        create_table(&schema, Product),
        create_table(&schema, Order),
        create_table(&schema, PaymentSettings),
    ];

    for statement in statements {
        db.execute(backend.build(&statement)).await?;
    }

    info!("Database schema ready");
    Ok(())
}

fn create_table<E: EntityTrait>(
    schema: &Schema,
    entity: E,
) -> sea_orm::sea_query::TableCreateStatement {
    schema
        .create_table_from_entity(entity)
        .if_not_exists()
        .to_owned()
}
