//! Draft maintenance for stock movement documents.
//!
//! Lines can only change while a document is `Draft`; `submit` and `cancel` live in the posting
//! engine.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::UnitOfWork;
use crate::entities::stock_movement::{self, MovementStatus};
use crate::entities::stock_movement_line;
use crate::errors::ServiceError;
use crate::models::movement::validate_lines;
use crate::models::{MovementDocument, NewMovement, UpdateMovement};

#[derive(Clone)]
pub struct MovementService {
    db_pool: Arc<DatabaseConnection>,
}

impl MovementService {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    /// Creates a draft document and returns its id.
    #[instrument(skip(self, movement), fields(kind = %movement.kind, lines = movement.lines.len()))]
    pub async fn create_draft(
        &self,
        tenant_id: Uuid,
        movement: NewMovement,
    ) -> Result<Uuid, ServiceError> {
        let uow = UnitOfWork::begin(&self.db_pool, "movement_create_draft").await?;
        let result = Self::insert_draft_in(uow.txn(), tenant_id, movement).await;
        let document = uow.finish(result).await?;
        info!(document_id = %document.id(), "draft created");
        Ok(document.id())
    }

    /// Replaces the header fields and lines of a draft.
    #[instrument(skip(self, changes))]
    pub async fn update_draft(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
        changes: UpdateMovement,
    ) -> Result<MovementDocument, ServiceError> {
        changes.validate()?;
        let uow = UnitOfWork::begin(&self.db_pool, "movement_update_draft").await?;
        let result = async {
            let document = Self::load_for_update_in(uow.txn(), tenant_id, document_id).await?;
            Self::require_status(&document.header, MovementStatus::Draft)?;
            validate_lines(document.header.kind, &changes.lines)?;
            let posting_time = changes
                .posting_time
                .unwrap_or(document.header.posting_time);

            stock_movement_line::Entity::delete_many()
                .filter(stock_movement_line::Column::MovementId.eq(document_id))
                .exec(uow.txn())
                .await
                .map_err(ServiceError::db_error)?;

            let mut header: stock_movement::ActiveModel = document.header.into();
            header.posting_date = Set(changes.posting_date);
            header.posting_time = Set(posting_time);
            header.reference = Set(changes.reference);
            header.updated_at = Set(Utc::now());
            let header = header.update(uow.txn()).await.map_err(ServiceError::db_error)?;

            let lines = MovementDocument::draft_lines(document_id, changes.lines);
            Self::insert_lines_in(uow.txn(), &lines).await?;
            Ok(MovementDocument { header, lines })
        }
        .await;
        uow.finish(result).await
    }

    /// Deletes a draft together with its lines.
    #[instrument(skip(self))]
    pub async fn delete_draft(&self, tenant_id: Uuid, document_id: Uuid) -> Result<(), ServiceError> {
        let uow = UnitOfWork::begin(&self.db_pool, "movement_delete_draft").await?;
        let result = async {
            let document = Self::load_for_update_in(uow.txn(), tenant_id, document_id).await?;
            Self::require_status(&document.header, MovementStatus::Draft)?;
            stock_movement_line::Entity::delete_many()
                .filter(stock_movement_line::Column::MovementId.eq(document_id))
                .exec(uow.txn())
                .await
                .map_err(ServiceError::db_error)?;
            document
                .header
                .delete(uow.txn())
                .await
                .map_err(ServiceError::db_error)?;
            Ok(())
        }
        .await;
        uow.finish(result).await?;
        info!(document_id = %document_id, "draft deleted");
        Ok(())
    }

    /// Header and lines in line order.
    #[instrument(skip(self))]
    pub async fn get_document(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<MovementDocument, ServiceError> {
        Self::load_in(&*self.db_pool, tenant_id, document_id).await
    }

    /// Validates and stores a new draft inside the caller's transaction.
    pub(crate) async fn insert_draft_in<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        movement: NewMovement,
    ) -> Result<MovementDocument, ServiceError> {
        movement.validate()?;
        validate_lines(movement.kind, &movement.lines)?;
        let document = MovementDocument::draft(tenant_id, movement, Utc::now());
        Self::insert_document_in(conn, &document).await?;
        Ok(document)
    }

    /// Stores an already built draft.
    pub(crate) async fn insert_document_in<C: ConnectionTrait>(
        conn: &C,
        document: &MovementDocument,
    ) -> Result<(), ServiceError> {
        let header = &document.header;
        stock_movement::ActiveModel {
            id: Set(header.id),
            tenant_id: Set(header.tenant_id),
            kind: Set(header.kind),
            posting_date: Set(header.posting_date),
            posting_time: Set(header.posting_time),
            status: Set(header.status),
            reference: Set(header.reference.clone()),
            created_at: Set(header.created_at),
            updated_at: Set(header.updated_at),
            submitted_at: Set(header.submitted_at),
            cancelled_at: Set(header.cancelled_at),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        Self::insert_lines_in(conn, &document.lines).await
    }

    async fn insert_lines_in<C: ConnectionTrait>(
        conn: &C,
        lines: &[stock_movement_line::Model],
    ) -> Result<(), ServiceError> {
        for line in lines {
            stock_movement_line::ActiveModel {
                id: Set(line.id),
                movement_id: Set(line.movement_id),
                line_no: Set(line.line_no),
                item_code: Set(line.item_code.clone()),
                quantity: Set(line.quantity),
                rate: Set(line.rate),
                source_location: Set(line.source_location.clone()),
                target_location: Set(line.target_location.clone()),
                batch_ref: Set(line.batch_ref.clone()),
                serial_refs: Set(line.serial_refs.clone()),
            }
            .insert(conn)
            .await
            .map_err(ServiceError::db_error)?;
        }
        Ok(())
    }

    /// Loads a tenant's document; other tenants' documents read as missing.
    pub(crate) async fn load_in<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<MovementDocument, ServiceError> {
        Self::load_with(conn, Self::find_header(tenant_id, document_id), document_id).await
    }

    /// Like `load_in`, holding the header row until the caller's transaction ends.
    pub(crate) async fn load_for_update_in<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> Result<MovementDocument, ServiceError> {
        let select = Self::find_header(tenant_id, document_id).lock_exclusive();
        Self::load_with(conn, select, document_id).await
    }

    fn find_header(tenant_id: Uuid, document_id: Uuid) -> Select<stock_movement::Entity> {
        stock_movement::Entity::find_by_id(document_id)
            .filter(stock_movement::Column::TenantId.eq(tenant_id))
    }

    async fn load_with<C: ConnectionTrait>(
        conn: &C,
        select: Select<stock_movement::Entity>,
        document_id: Uuid,
    ) -> Result<MovementDocument, ServiceError> {
        let header = select
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found(format!("stock movement {}", document_id)))?;

        let lines = stock_movement_line::Entity::find()
            .filter(stock_movement_line::Column::MovementId.eq(document_id))
            .order_by_asc(stock_movement_line::Column::LineNo)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(MovementDocument { header, lines })
    }

    pub(crate) fn require_status(
        header: &stock_movement::Model,
        expected: MovementStatus,
    ) -> Result<(), ServiceError> {
        if header.status != expected {
            return Err(ServiceError::InvalidState {
                document_id: header.id,
                status: header.status,
                expected,
            });
        }
        Ok(())
    }

    /// Moves the header to `status`, stamping the matching timestamp. The update only applies
    /// while the stored status still matches `header`, so a document cannot move twice.
    pub(crate) async fn transition_in<C: ConnectionTrait>(
        conn: &C,
        header: stock_movement::Model,
        status: MovementStatus,
    ) -> Result<stock_movement::Model, ServiceError> {
        if !header.status.can_transition_to(status) {
            let expected = match status {
                MovementStatus::Cancelled => MovementStatus::Submitted,
                MovementStatus::Submitted | MovementStatus::Draft => MovementStatus::Draft,
            };
            return Err(ServiceError::InvalidState {
                document_id: header.id,
                status: header.status,
                expected,
            });
        }
        let now = Utc::now();
        let mut update = stock_movement::Entity::update_many()
            .col_expr(stock_movement::Column::Status, Expr::value(status.to_value()))
            .col_expr(stock_movement::Column::UpdatedAt, Expr::value(now));
        match status {
            MovementStatus::Submitted => {
                update = update.col_expr(stock_movement::Column::SubmittedAt, Expr::value(now))
            }
            MovementStatus::Cancelled => {
                update = update.col_expr(stock_movement::Column::CancelledAt, Expr::value(now))
            }
            MovementStatus::Draft => {}
        }
        let result = update
            .filter(stock_movement::Column::Id.eq(header.id))
            .filter(stock_movement::Column::Status.eq(header.status.to_value()))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected != 1 {
            return Err(ServiceError::Conflict(format!(
                "stock movement {} is no longer {}",
                header.id, header.status
            )));
        }

        let mut header = header;
        header.status = status;
        header.updated_at = now;
        match status {
            MovementStatus::Submitted => header.submitted_at = Some(now),
            MovementStatus::Cancelled => header.cancelled_at = Some(now),
            MovementStatus::Draft => {}
        }
        Ok(header)
    }
}
