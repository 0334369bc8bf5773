//! Repository pattern for database operations
//!
//! Implements `DocumentStore` on top of SeaORM. Reads go to the replica
//! when one is configured; lifecycle units always run on the primary inside
//! a transaction with the document row locked.

use crate::db::models::*;
use crate::db::store::{apply_form, DocumentFilter, DocumentStore, LifecycleUnit, NewEvent, NewReserve, NewSignature};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    IntoActiveModel, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait,
};
use tracing::{debug, info};
use uuid::Uuid;

fn now() -> DateTime<FixedOffset> {
    Utc::now().into()
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    /// Owner check against the primary, used before writing child rows
    async fn require_document(&self, owner: Uuid, id: Uuid) -> Result<CmrDocument> {
        DocumentEntity::find_by_id(id)
            .filter(DocumentColumn::UserId.eq(owner))
            .one(self.write_conn())
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })
    }
}

#[async_trait]
impl DocumentStore for Repository {
    // ========================================================================
    // Document Operations
    // ========================================================================

    async fn find_document(&self, owner: Uuid, id: Uuid) -> Result<Option<CmrDocument>> {
        DocumentEntity::find_by_id(id)
            .filter(DocumentColumn::UserId.eq(owner))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_documents(&self, owner: Uuid, filter: &DocumentFilter) -> Result<Vec<CmrDocument>> {
        let mut query = DocumentEntity::find().filter(DocumentColumn::UserId.eq(owner));

        if !filter.statuses.is_empty() {
            let statuses: Vec<&str> = filter.statuses.iter().map(|s| s.as_str()).collect();
            query = query.filter(DocumentColumn::Status.is_in(statuses));
        }
        if let Some(archived) = filter.archived {
            query = query.filter(DocumentColumn::Archived.eq(archived));
        }

        query
            .order_by_desc(DocumentColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_document(&self, owner: Uuid, mut document: CmrDocument) -> Result<CmrDocument> {
        document.user_id = owner;
        document.status = DocumentStatus::ReadyToLoad.as_str().to_string();

        let inserted = document
            .into_active_model()
            .reset_all()
            .insert(self.write_conn())
            .await?;

        info!(document_id = %inserted.id, user_id = %owner, "CMR document created");
        Ok(inserted)
    }

    async fn update_document(
        &self,
        owner: Uuid,
        id: Uuid,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CmrDocument> {
        // Row lock keeps a concurrent lifecycle action from being overwritten
        let txn = self.write_conn().begin().await?;
        let current = DocumentEntity::find_by_id(id)
            .filter(DocumentColumn::UserId.eq(owner))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;

        let mut edited = apply_form(current, fields)?;
        edited.updated_at = now();

        let updated = edited.into_active_model().reset_all().update(&txn).await?;
        txn.commit().await?;

        info!(document_id = %id, user_id = %owner, "Document fields updated");
        Ok(updated)
    }

    async fn set_archived(&self, owner: Uuid, id: Uuid, archived: bool) -> Result<CmrDocument> {
        let at = now();
        let mut document: DocumentActiveModel = self.require_document(owner, id).await?.into();
        document.archived = Set(archived);
        document.archived_at = Set(archived.then_some(at));
        document.updated_at = Set(at);

        let updated = document.update(self.write_conn()).await?;
        info!(document_id = %id, archived, "Document archival toggled");
        Ok(updated)
    }

    // ========================================================================
    // Profile & Vehicle Operations
    // ========================================================================

    async fn find_profile(&self, owner: Uuid) -> Result<Option<Profile>> {
        ProfileEntity::find_by_id(owner)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_vehicle(&self, owner: Uuid, id: Uuid) -> Result<Option<Vehicle>> {
        VehicleEntity::find_by_id(id)
            .filter(VehicleColumn::UserId.eq(owner))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Event Operations
    // ========================================================================

    async fn list_events(&self, owner: Uuid, document_id: Uuid) -> Result<Vec<Event>> {
        EventEntity::find()
            .filter(EventColumn::DocumentId.eq(document_id))
            .filter(EventColumn::UserId.eq(owner))
            .order_by_asc(EventColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Reserve Operations
    // ========================================================================

    async fn list_reserves(
        &self,
        owner: Uuid,
        document_id: Uuid,
        side: Option<ReserveSide>,
    ) -> Result<Vec<Reserve>> {
        let mut query = ReserveEntity::find()
            .filter(ReserveColumn::DocumentId.eq(document_id))
            .filter(ReserveColumn::UserId.eq(owner));
        if let Some(side) = side {
            query = query.filter(ReserveColumn::Side.eq(side.as_str()));
        }
        query
            .order_by_asc(ReserveColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_reserve(&self, owner: Uuid, reserve: NewReserve) -> Result<Reserve> {
        self.require_document(owner, reserve.document_id).await?;

        let row = ReserveActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(reserve.document_id),
            user_id: Set(owner),
            side: Set(reserve.side.as_str().to_string()),
            reserve_type: Set(reserve.reserve_type),
            comment: Set(reserve.comment),
            photo_path: Set(reserve.photo_path),
            created_at: Set(now()),
        };

        row.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn delete_reserve(&self, owner: Uuid, id: Uuid) -> Result<Option<Reserve>> {
        let Some(reserve) = ReserveEntity::find_by_id(id)
            .filter(ReserveColumn::UserId.eq(owner))
            .one(self.write_conn())
            .await?
        else {
            return Ok(None);
        };

        reserve.clone().delete(self.write_conn()).await?;
        Ok(Some(reserve))
    }

    // ========================================================================
    // Photo Operations
    // ========================================================================

    async fn list_photos(&self, owner: Uuid, document_id: Uuid) -> Result<Vec<Photo>> {
        PhotoEntity::find()
            .filter(PhotoColumn::DocumentId.eq(document_id))
            .filter(PhotoColumn::UserId.eq(owner))
            .order_by_asc(PhotoColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_photo(&self, owner: Uuid, document_id: Uuid, path: String) -> Result<Photo> {
        self.require_document(owner, document_id).await?;

        let row = PhotoActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(document_id),
            user_id: Set(owner),
            path: Set(path),
            created_at: Set(now()),
        };

        row.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn delete_photo(&self, owner: Uuid, id: Uuid) -> Result<Option<Photo>> {
        let Some(photo) = PhotoEntity::find_by_id(id)
            .filter(PhotoColumn::UserId.eq(owner))
            .one(self.write_conn())
            .await?
        else {
            return Ok(None);
        };

        photo.clone().delete(self.write_conn()).await?;
        Ok(Some(photo))
    }

    // ========================================================================
    // Signature Operations
    // ========================================================================

    async fn list_signatures(&self, owner: Uuid, document_id: Uuid) -> Result<Vec<Signature>> {
        SignatureEntity::find()
            .filter(SignatureColumn::DocumentId.eq(document_id))
            .filter(SignatureColumn::UserId.eq(owner))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn insert_signature(&self, owner: Uuid, signature: NewSignature) -> Result<Signature> {
        self.require_document(owner, signature.document_id).await?;

        let document_id = signature.document_id;
        let party = signature.party;
        let row = SignatureActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(document_id),
            user_id: Set(owner),
            party: Set(party.as_str().to_string()),
            signer_name: Set(signature.signer_name),
            signer_role: Set(signature.signer_role),
            signer_email: Set(signature.signer_email),
            image_path: Set(signature.image_path),
            created_at: Set(now()),
        };

        row.insert(self.write_conn()).await.map_err(|e| {
            let sql_err = e.sql_err();
            signature_insert_error(e, sql_err, document_id, party)
        })
    }

    // ========================================================================
    // Lifecycle Unit of Work
    // ========================================================================

    async fn begin_lifecycle(&self) -> Result<Box<dyn LifecycleUnit>> {
        let txn = self.write_conn().begin().await?;
        Ok(Box::new(TransactionUnit { txn }))
    }
}

/// Map a failed signature insert; `uq_cmr_signatures_document_party`
/// violations become `DuplicateSignature`
fn signature_insert_error(
    err: DbErr,
    sql_err: Option<SqlErr>,
    document_id: Uuid,
    party: SignatureParty,
) -> AppError {
    match sql_err {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::DuplicateSignature {
            document_id: document_id.to_string(),
            party: party.as_str().to_string(),
        },
        _ => AppError::Database(err),
    }
}

/// Lifecycle unit running inside one database transaction
struct TransactionUnit {
    txn: DatabaseTransaction,
}

#[async_trait]
impl LifecycleUnit for TransactionUnit {
    async fn lock_document(&mut self, owner: Uuid, id: Uuid) -> Result<Option<CmrDocument>> {
        DocumentEntity::find_by_id(id)
            .filter(DocumentColumn::UserId.eq(owner))
            .lock_exclusive()
            .one(&self.txn)
            .await
            .map_err(Into::into)
    }

    async fn has_signature(&mut self, document_id: Uuid, party: SignatureParty) -> Result<bool> {
        let count = SignatureEntity::find()
            .filter(SignatureColumn::DocumentId.eq(document_id))
            .filter(SignatureColumn::Party.eq(party.as_str()))
            .count(&self.txn)
            .await?;
        Ok(count > 0)
    }

    async fn has_reserves(&mut self, document_id: Uuid) -> Result<bool> {
        let count = ReserveEntity::find()
            .filter(ReserveColumn::DocumentId.eq(document_id))
            .count(&self.txn)
            .await?;
        Ok(count > 0)
    }

    async fn set_status(&mut self, document_id: Uuid, status: DocumentStatus) -> Result<()> {
        let result = DocumentEntity::update_many()
            .col_expr(DocumentColumn::Status, Expr::value(status.as_str()))
            .col_expr(DocumentColumn::UpdatedAt, Expr::value(now()))
            .filter(DocumentColumn::Id.eq(document_id))
            .exec(&self.txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::DocumentNotFound {
                id: document_id.to_string(),
            });
        }
        debug!(document_id = %document_id, status = %status, "Document status staged");
        Ok(())
    }

    async fn append_event(&mut self, event: NewEvent) -> Result<Event> {
        let row = EventActiveModel {
            id: Set(Uuid::new_v4()),
            document_id: Set(event.document_id),
            user_id: Set(event.actor_id),
            event_type: Set(event.kind.event_type().to_string()),
            metadata: Set(event.kind.metadata()),
            created_at: Set(now()),
        };

        row.insert(&self.txn).await.map_err(Into::into)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn.commit().await.map_err(Into::into)
    }
}
