//! # Database Persistence Layer
//!
//! Optional PostgreSQL storage via SQLx. When `DATABASE_URL` is set the
//! four lifecycle repositories are backed by tables created in
//! `migrations/`; otherwise the service runs on in-memory repositories.
//!
//! Each table keeps the record as a JSONB document next to the columns the
//! compare-and-swap predicate needs (`status`, `version`), so a write is a
//! single `UPDATE ... WHERE id = $1 AND status = $2 AND version = $3`.

pub mod repository;

use std::sync::Arc;

use safetrade_lifecycle::Repositories;
use safetrade_state::{Dispute, Invoice, Review, Transaction};
use sqlx::postgres::{PgPool, PgPoolOptions};

pub use repository::PgRepository;

pub type PgTransactionRepository = PgRepository<Transaction>;
pub type PgDisputeRepository = PgRepository<Dispute>;
pub type PgInvoiceRepository = PgRepository<Invoice>;
pub type PgReviewRepository = PgRepository<Review>;

/// Connect and apply embedded migrations.
pub async fn init_pool(url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

pub fn repositories(pool: &PgPool) -> Repositories {
    Repositories {
        transactions: Arc::new(PgTransactionRepository::new(pool.clone(), "transactions")),
        disputes: Arc::new(PgDisputeRepository::new(pool.clone(), "disputes")),
        invoices: Arc::new(PgInvoiceRepository::new(pool.clone(), "invoices")),
        reviews: Arc::new(PgReviewRepository::new(pool.clone(), "reviews")),
    }
}
