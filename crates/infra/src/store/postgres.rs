//! Postgres-backed record store.
//!
//! Each record table keeps the serialized aggregate in a `body` JSONB column
//! next to the columns that listings filter on. Uniqueness (order numbers,
//! one session and one document per order, document numbers) is enforced by
//! the schema in `migrations/0001_init.sql`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed, Io, Tls, ... | N/A | `Backend` |
//!
//! ## Blocking
//!
//! The store exposes the synchronous [`Store`] interface and drives sqlx on a
//! runtime it owns. It must not be called from inside another tokio runtime.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::Runtime;
use tracing::{instrument, Span};
use uuid::Uuid;

use sawit_core::{AggregateRoot, ExpectedVersion};
use sawit_orders::{PurchaseOrder, PurchaseOrderId};
use sawit_settlement::{Payment, PaymentId, SalesDocument, SalesDocumentId};
use sawit_stock::{StockLot, StockLotId};
use sawit_weighing::{WeighingSession, WeighingSessionId};

use crate::config::DatabaseConfig;

use super::filter::{DocumentFilter, LotFilter, OrderFilter, PaymentFilter, SessionFilter};
use super::r#trait::{SequenceKey, Store, StoreError, UnitOfWork};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Postgres-backed record store.
///
/// Rows read through [`UnitOfWork`] getters are locked (`FOR UPDATE`) until the
/// transaction ends, so two units of work touching the same lot or order are
/// serialized by the database.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    runtime: Arc<Runtime>,
}

impl PostgresStore {
    /// Build a runtime sized from `config` and open the connection pool.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .enable_all()
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build runtime: {e}")))?;

        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .connect(&config.url),
            )
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self {
            pool,
            runtime: Arc::new(runtime),
        })
    }

    /// Create the record tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub fn migrate(&self) -> Result<(), StoreError> {
        self.runtime
            .block_on(sqlx::raw_sql(SCHEMA).execute(&self.pool))
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Store for PostgresStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        let tx = self
            .runtime
            .block_on(self.pool.begin())
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut uow = PgUnitOfWork {
            tx,
            runtime: &self.runtime,
        };

        match work(&mut uow) {
            Ok(value) => {
                self.runtime
                    .block_on(uow.tx.commit())
                    .map_err(|e| map_sqlx_error("commit_transaction", e))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = self.runtime.block_on(uow.tx.rollback()) {
                    tracing::warn!(error = %e, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

struct PgUnitOfWork<'a> {
    tx: Transaction<'static, Postgres>,
    runtime: &'a Runtime,
}

impl PgUnitOfWork<'_> {
    fn fetch_one_body<T: DeserializeOwned>(
        &mut self,
        operation: &'static str,
        sql: &'static str,
        key: Uuid,
    ) -> Result<Option<T>, StoreError> {
        let row = self
            .runtime
            .block_on(sqlx::query(sql).bind(key).fetch_optional(&mut *self.tx))
            .map_err(|e| map_sqlx_error(operation, e))?;

        row.map(|r| decode_body(operation, &r)).transpose()
    }

    fn fetch_bodies<T: DeserializeOwned>(
        &mut self,
        operation: &'static str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<T>, StoreError> {
        let rows = self
            .runtime
            .block_on(query.fetch_all(&mut *self.tx))
            .map_err(|e| map_sqlx_error(operation, e))?;

        Span::current().record("rows", rows.len());
        rows.iter().map(|r| decode_body(operation, r)).collect()
    }

    fn execute_write(
        &mut self,
        operation: &'static str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<u64, StoreError> {
        let result = self
            .runtime
            .block_on(query.execute(&mut *self.tx))
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(result.rows_affected())
    }

    fn execute_update(
        &mut self,
        operation: &'static str,
        what: String,
        expected: ExpectedVersion,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<(), StoreError> {
        if self.execute_write(operation, query)? == 0 {
            return Err(StoreError::Conflict(format!(
                "{what}: expected {expected:?}, record missing or changed"
            )));
        }
        Ok(())
    }
}

impl UnitOfWork for PgUnitOfWork<'_> {
    #[instrument(skip(self), fields(lot_id = %id), err)]
    fn lot(&mut self, id: StockLotId) -> Result<Option<StockLot>, StoreError> {
        self.fetch_one_body(
            "load_lot",
            "SELECT body FROM stock_lots WHERE id = $1 FOR UPDATE",
            *id.as_uuid(),
        )
    }

    #[instrument(skip(self, lot), fields(lot_id = %lot.id_typed()), err)]
    fn insert_lot(&mut self, lot: &StockLot) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO stock_lots (id, status, grade, estate, harvest_date, version, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*lot.id_typed().as_uuid())
        .bind(lot.status().as_str())
        .bind(lot.grade().as_str())
        .bind(lot.estate())
        .bind(lot.harvest_date())
        .bind(version_column(lot.version()))
        .bind(Json(lot));
        self.execute_write("insert_lot", query)?;
        Ok(())
    }

    #[instrument(skip(self, lot), fields(lot_id = %lot.id_typed()), err)]
    fn update_lot(&mut self, lot: &StockLot, expected: ExpectedVersion) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE stock_lots
            SET status = $2, grade = $3, harvest_date = $4, version = $5, body = $6,
                updated_at = now()
            WHERE id = $1 AND ($7::bigint IS NULL OR version = $7)
            "#,
        )
        .bind(*lot.id_typed().as_uuid())
        .bind(lot.status().as_str())
        .bind(lot.grade().as_str())
        .bind(lot.harvest_date())
        .bind(version_column(lot.version()))
        .bind(Json(lot))
        .bind(expected_column(expected));
        self.execute_update(
            "update_lot",
            format!("stock lot {}", lot.id_typed()),
            expected,
            query,
        )
    }

    #[instrument(skip(self), fields(rows = tracing::field::Empty), err)]
    fn lots(&mut self, filter: &LotFilter) -> Result<Vec<StockLot>, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT body FROM stock_lots
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR grade = $2)
              AND ($3::text IS NULL OR estate = $3)
            ORDER BY harvest_date DESC NULLS LAST, id DESC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.grade.map(|g| g.as_str()))
        .bind(filter.estate.as_deref().map(str::trim));
        self.fetch_bodies("list_lots", query)
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    fn order(&mut self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        self.fetch_one_body(
            "load_order",
            "SELECT body FROM purchase_orders WHERE id = $1 FOR UPDATE",
            *id.as_uuid(),
        )
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed()), err)]
    fn insert_order(&mut self, order: &PurchaseOrder) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO purchase_orders
                (id, order_number, buyer, lot_id, status, created_at, version, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*order.id_typed().as_uuid())
        .bind(order.order_number())
        .bind(order.buyer().map(Uuid::from))
        .bind(order.lot_id().map(|l| *l.as_uuid()))
        .bind(order.status().as_str())
        .bind(order.created_at())
        .bind(version_column(order.version()))
        .bind(Json(order));
        self.execute_write("insert_order", query)?;
        Ok(())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed()), err)]
    fn update_order(
        &mut self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = $2, version = $3, body = $4, updated_at = now()
            WHERE id = $1 AND ($5::bigint IS NULL OR version = $5)
            "#,
        )
        .bind(*order.id_typed().as_uuid())
        .bind(order.status().as_str())
        .bind(version_column(order.version()))
        .bind(Json(order))
        .bind(expected_column(expected));
        self.execute_update(
            "update_order",
            format!("purchase order {}", order.id_typed()),
            expected,
            query,
        )
    }

    #[instrument(skip(self), fields(rows = tracing::field::Empty), err)]
    fn orders(&mut self, filter: &OrderFilter) -> Result<Vec<PurchaseOrder>, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT body FROM purchase_orders
            WHERE ($1::uuid IS NULL OR buyer = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR lot_id = $3)
            ORDER BY created_at DESC NULLS LAST, id DESC
            "#,
        )
        .bind(filter.buyer.map(Uuid::from))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.lot_id.map(|l| *l.as_uuid()));
        self.fetch_bodies("list_orders", query)
    }

    #[instrument(skip(self), fields(session_id = %id), err)]
    fn session(&mut self, id: WeighingSessionId) -> Result<Option<WeighingSession>, StoreError> {
        self.fetch_one_body(
            "load_session",
            "SELECT body FROM weighing_sessions WHERE id = $1 FOR UPDATE",
            *id.as_uuid(),
        )
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    fn session_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> Result<Option<WeighingSession>, StoreError> {
        self.fetch_one_body(
            "load_session_for_order",
            "SELECT body FROM weighing_sessions WHERE order_id = $1 FOR UPDATE",
            *order_id.as_uuid(),
        )
    }

    #[instrument(skip(self, session), fields(session_id = %session.id_typed()), err)]
    fn insert_session(&mut self, session: &WeighingSession) -> Result<(), StoreError> {
        let order_id = session.order_id().ok_or_else(|| {
            StoreError::Backend(format!("weighing session {} has no order", session.id_typed()))
        })?;
        let query = sqlx::query(
            r#"
            INSERT INTO weighing_sessions
                (id, order_id, status, queue_number, loading_at, loading_day, version, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*session.id_typed().as_uuid())
        .bind(*order_id.as_uuid())
        .bind(session.status().as_str())
        .bind(queue_column(session.queue_number()))
        .bind(session.schedule().map(|s| s.loading_at))
        .bind(session.loading_day())
        .bind(version_column(session.version()))
        .bind(Json(session));
        self.execute_write("insert_session", query)?;
        Ok(())
    }

    #[instrument(skip(self, session), fields(session_id = %session.id_typed()), err)]
    fn update_session(
        &mut self,
        session: &WeighingSession,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE weighing_sessions
            SET status = $2, version = $3, body = $4, updated_at = now()
            WHERE id = $1 AND ($5::bigint IS NULL OR version = $5)
            "#,
        )
        .bind(*session.id_typed().as_uuid())
        .bind(session.status().as_str())
        .bind(version_column(session.version()))
        .bind(Json(session))
        .bind(expected_column(expected));
        self.execute_update(
            "update_session",
            format!("weighing session {}", session.id_typed()),
            expected,
            query,
        )
    }

    #[instrument(skip(self), fields(rows = tracing::field::Empty), err)]
    fn sessions(&mut self, filter: &SessionFilter) -> Result<Vec<WeighingSession>, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT body FROM weighing_sessions
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR order_id = $2)
              AND ($3::date IS NULL OR loading_day = $3)
            ORDER BY loading_at ASC NULLS LAST, queue_number ASC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.order_id.map(|o| *o.as_uuid()))
        .bind(filter.loading_day);
        self.fetch_bodies("list_sessions", query)
    }

    #[instrument(skip(self), fields(document_id = %id), err)]
    fn document(&mut self, id: SalesDocumentId) -> Result<Option<SalesDocument>, StoreError> {
        self.fetch_one_body(
            "load_document",
            "SELECT body FROM sales_documents WHERE id = $1",
            *id.as_uuid(),
        )
    }

    #[instrument(skip(self), fields(order_id = %order_id), err)]
    fn document_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> Result<Option<SalesDocument>, StoreError> {
        self.fetch_one_body(
            "load_document_for_order",
            "SELECT body FROM sales_documents WHERE order_id = $1",
            *order_id.as_uuid(),
        )
    }

    #[instrument(skip(self, document), fields(document_id = %document.id_typed()), err)]
    fn insert_document(&mut self, document: &SalesDocument) -> Result<(), StoreError> {
        let numbers = document.numbers();
        let query = sqlx::query(
            r#"
            INSERT INTO sales_documents
                (id, order_id, session_id, delivery_note, invoice, weight_certificate,
                 document_date, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(*document.id_typed().as_uuid())
        .bind(*document.order_id().as_uuid())
        .bind(*document.session_id().as_uuid())
        .bind(numbers.delivery_note.as_str())
        .bind(numbers.invoice.as_str())
        .bind(numbers.weight_certificate.as_str())
        .bind(document.document_date())
        .bind(Json(document));
        self.execute_write("insert_document", query)?;
        Ok(())
    }

    #[instrument(skip(self), fields(rows = tracing::field::Empty), err)]
    fn documents(&mut self, filter: &DocumentFilter) -> Result<Vec<SalesDocument>, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT body FROM sales_documents
            WHERE ($1::uuid IS NULL OR order_id = $1)
              AND ($2::date IS NULL OR document_date >= $2)
              AND ($3::date IS NULL OR document_date <= $3)
            ORDER BY document_date ASC, invoice ASC
            "#,
        )
        .bind(filter.order_id.map(|o| *o.as_uuid()))
        .bind(filter.from)
        .bind(filter.to);
        self.fetch_bodies("list_documents", query)
    }

    #[instrument(skip(self), fields(payment_id = %id), err)]
    fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        self.fetch_one_body(
            "load_payment",
            "SELECT body FROM payments WHERE id = $1 FOR UPDATE",
            *id.as_uuid(),
        )
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.id_typed()), err)]
    fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            INSERT INTO payments
                (id, order_id, document_id, state, recorded_at, version, body)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(*payment.id_typed().as_uuid())
        .bind(payment.order_id().map(|o| *o.as_uuid()))
        .bind(payment.document_id().map(|d| *d.as_uuid()))
        .bind(payment.state().as_str())
        .bind(payment.recorded_at())
        .bind(version_column(payment.version()))
        .bind(Json(payment));
        self.execute_write("insert_payment", query)?;
        Ok(())
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.id_typed()), err)]
    fn update_payment(
        &mut self,
        payment: &Payment,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let query = sqlx::query(
            r#"
            UPDATE payments
            SET state = $2, version = $3, body = $4, updated_at = now()
            WHERE id = $1 AND ($5::bigint IS NULL OR version = $5)
            "#,
        )
        .bind(*payment.id_typed().as_uuid())
        .bind(payment.state().as_str())
        .bind(version_column(payment.version()))
        .bind(Json(payment))
        .bind(expected_column(expected));
        self.execute_update(
            "update_payment",
            format!("payment {}", payment.id_typed()),
            expected,
            query,
        )
    }

    #[instrument(skip(self), fields(rows = tracing::field::Empty), err)]
    fn payments(&mut self, filter: &PaymentFilter) -> Result<Vec<Payment>, StoreError> {
        let query = sqlx::query(
            r#"
            SELECT body FROM payments
            WHERE ($1::uuid IS NULL OR order_id = $1)
              AND ($2::uuid IS NULL OR document_id = $2)
              AND ($3::text IS NULL OR state = $3)
            ORDER BY recorded_at ASC NULLS FIRST, id ASC
            "#,
        )
        .bind(filter.order_id.map(|o| *o.as_uuid()))
        .bind(filter.document_id.map(|d| *d.as_uuid()))
        .bind(filter.state.map(|s| s.as_str()));
        self.fetch_bodies("list_payments", query)
    }

    #[instrument(skip(self), fields(kind = key.kind.as_str(), day = %key.day), err)]
    fn next_sequence(&mut self, key: SequenceKey) -> Result<u32, StoreError> {
        let row = self
            .runtime
            .block_on(
                sqlx::query(
                    r#"
                    INSERT INTO sequences (kind, day, last_value)
                    VALUES ($1, $2, 1)
                    ON CONFLICT (kind, day)
                    DO UPDATE SET last_value = sequences.last_value + 1
                    RETURNING last_value
                    "#,
                )
                .bind(key.kind.as_str())
                .bind(key.day)
                .fetch_one(&mut *self.tx),
            )
            .map_err(|e| map_sqlx_error("next_sequence", e))?;

        let value: i32 = row
            .try_get("last_value")
            .map_err(|e| map_sqlx_error("next_sequence", e))?;
        u32::try_from(value)
            .map_err(|_| StoreError::Backend(format!("sequence {key:?} returned {value}")))
    }
}

fn decode_body<T: DeserializeOwned>(operation: &str, row: &PgRow) -> Result<T, StoreError> {
    let Json(body) = row
        .try_get::<Json<T>, _>("body")
        .map_err(|e| StoreError::Backend(format!("failed to decode row in {operation}: {e}")))?;
    Ok(body)
}

fn version_column(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn expected_column(expected: ExpectedVersion) -> Option<i64> {
    match expected {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(version_column(v)),
    }
}

fn queue_column(queue_number: u32) -> i32 {
    i32::try_from(queue_number).unwrap_or(i32::MAX)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        other => StoreError::Backend(format!("sqlx error in {}: {}", operation, other)),
    }
}
