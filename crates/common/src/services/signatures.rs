use super::{delete_best_effort, upload_image};
use crate::auth::AuthContext;
use crate::config::AppConfig;
use crate::db::models::{DocumentStatus, Signature, SignatureParty};
use crate::db::{DocumentStore, NewSignature};
use crate::errors::{AppError, Result};
use crate::lifecycle::{LifecycleAction, LifecycleEngine, Transition};
use crate::storage::ObjectStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Who signed, as typed on the signature pad
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Signer {
    pub name: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapturedSignature {
    pub signature: Signature,

    /// Set when the consignee signature completed the delivery; `None` with
    /// a consignee signature on a `ready_to_deliver` document means the
    /// completion failed and `delivery_end` must be dispatched again
    pub transition: Option<Transition>,
}

#[derive(Clone)]
pub struct SignatureService {
    store: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    engine: LifecycleEngine,
    bucket: String,
    max_upload_bytes: usize,
}

impl SignatureService {
    pub fn new(store: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>, config: &AppConfig) -> Self {
        Self {
            engine: LifecycleEngine::new(store.clone()),
            store,
            objects,
            bucket: config.storage.signatures_bucket.clone(),
            max_upload_bytes: config.limits.max_upload_bytes,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store a party's signature
    ///
    /// A consignee signature on a document that is ready to deliver ends the
    /// delivery in the same call.
    pub async fn capture(
        &self,
        ctx: &AuthContext,
        document_id: Uuid,
        party: SignatureParty,
        signer: Signer,
        image: Vec<u8>,
    ) -> Result<CapturedSignature> {
        let document = self
            .store
            .find_document(ctx.user_id, document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        let already_signed = self
            .store
            .list_signatures(ctx.user_id, document_id)
            .await?
            .iter()
            .any(|s| s.party == party.as_str());
        if already_signed {
            return Err(AppError::DuplicateSignature {
                document_id: document_id.to_string(),
                party: party.as_str().to_string(),
            });
        }

        let stored = upload_image(
            self.objects.as_ref(),
            &self.bucket,
            ctx.user_id,
            document_id,
            &format!("signature-{}", party),
            image,
            self.max_upload_bytes,
        )
        .await?;

        let inserted = self
            .store
            .insert_signature(
                ctx.user_id,
                NewSignature {
                    document_id,
                    party,
                    signer_name: signer.name,
                    signer_role: signer.role,
                    signer_email: signer.email,
                    image_path: stored.path.clone(),
                },
            )
            .await;
        let signature = match inserted {
            Ok(signature) => signature,
            Err(e) => {
                delete_best_effort(self.objects.as_ref(), &self.bucket, &stored.path).await;
                return Err(e);
            }
        };
        info!(document_id = %document_id, party = %party, "Signature captured");

        let completes_delivery = party == SignatureParty::Consignee
            && document.document_status()? == DocumentStatus::ReadyToDeliver;
        let transition = if completes_delivery {
            // The signature stands on its own; a failed completion leaves the
            // document ready_to_deliver with delivery_end offered for retry
            match self
                .engine
                .dispatch(ctx, document_id, LifecycleAction::DeliveryEnd)
                .await
            {
                Ok(transition) => Some(transition),
                Err(e) => {
                    warn!(
                        document_id = %document_id,
                        request_id = %ctx.request_id,
                        error = %e,
                        "Delivery completion after consignee signature failed"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(CapturedSignature {
            signature,
            transition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ReserveSide;
    use crate::db::{blank_document, MemoryStore, NewReserve};
    use crate::services::DocumentService;
    use crate::storage::tests::tiny_png;
    use crate::storage::MemoryObjectStore;
    use chrono::Utc;

    struct Setup {
        service: SignatureService,
        engine: LifecycleEngine,
        store: MemoryStore,
        objects: MemoryObjectStore,
        ctx: AuthContext,
        doc: Uuid,
    }

    async fn setup() -> Setup {
        let store = MemoryStore::new();
        let objects = MemoryObjectStore::new();
        let ctx = AuthContext::for_user(Uuid::new_v4());
        let doc = store
            .insert_document(ctx.user_id, blank_document(Uuid::new_v4(), ctx.user_id, Utc::now().into()))
            .await
            .unwrap();
        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        Setup {
            service: SignatureService::new(shared.clone(), Arc::new(objects.clone()), &AppConfig::default()),
            engine: LifecycleEngine::new(shared),
            store,
            objects,
            ctx,
            doc: doc.id,
        }
    }

    fn signer(name: &str) -> Signer {
        Signer {
            name: Some(name.to_string()),
            role: Some("Quai 4".to_string()),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_party_rejected_without_upload() {
        let s = setup().await;
        s.service
            .capture(&s.ctx, s.doc, SignatureParty::Shipper, signer("A. Morel"), tiny_png())
            .await
            .unwrap();

        let err = s
            .service
            .capture(&s.ctx, s.doc, SignatureParty::Shipper, signer("A. Morel"), tiny_png())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateSignature { .. }));
        assert_eq!(s.objects.len().await, 1);
    }

    #[tokio::test]
    async fn test_shipper_signature_keeps_status() {
        let s = setup().await;
        let captured = s
            .service
            .capture(&s.ctx, s.doc, SignatureParty::Shipper, signer("A. Morel"), tiny_png())
            .await
            .unwrap();

        assert!(captured.transition.is_none());
        let doc = s.store.find_document(s.ctx.user_id, s.doc).await.unwrap().unwrap();
        assert_eq!(doc.status, "ready_to_load");
    }

    #[tokio::test]
    async fn test_consignee_signature_completes_delivery() {
        let s = setup().await;
        s.service
            .capture(&s.ctx, s.doc, SignatureParty::Shipper, signer("A. Morel"), tiny_png())
            .await
            .unwrap();
        for action in [
            LifecycleAction::LoadingStart,
            LifecycleAction::LoadingEnd,
            LifecycleAction::DeliveryStart,
        ] {
            s.engine.dispatch(&s.ctx, s.doc, action).await.unwrap();
        }
        s.store
            .insert_reserve(
                s.ctx.user_id,
                NewReserve {
                    document_id: s.doc,
                    side: ReserveSide::Delivery,
                    reserve_type: "Missing items".into(),
                    comment: None,
                    photo_path: None,
                },
            )
            .await
            .unwrap();

        let captured = s
            .service
            .capture(&s.ctx, s.doc, SignatureParty::Consignee, signer("K. Braun"), tiny_png())
            .await
            .unwrap();

        let transition = captured.transition.unwrap();
        assert_eq!(transition.to, DocumentStatus::CompletedWithReserves);
        assert_eq!(s.store.list_events(s.ctx.user_id, s.doc).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_completion_keeps_signature_and_can_be_retried() {
        let s = setup().await;
        s.service
            .capture(&s.ctx, s.doc, SignatureParty::Shipper, signer("A. Morel"), tiny_png())
            .await
            .unwrap();
        for action in [
            LifecycleAction::LoadingStart,
            LifecycleAction::LoadingEnd,
            LifecycleAction::DeliveryStart,
        ] {
            s.engine.dispatch(&s.ctx, s.doc, action).await.unwrap();
        }

        s.store.fail_next_event_append();
        let captured = s
            .service
            .capture(&s.ctx, s.doc, SignatureParty::Consignee, signer("K. Braun"), tiny_png())
            .await
            .unwrap();
        assert!(captured.transition.is_none());

        let documents = DocumentService::new(Arc::new(s.store.clone()));
        let detail = documents.get(&s.ctx, s.doc).await.unwrap();
        assert_eq!(detail.document.status, "ready_to_deliver");
        assert_eq!(detail.signatures.len(), 2);
        assert_eq!(detail.events.len(), 3);
        assert_eq!(detail.allowed_actions, vec![LifecycleAction::DeliveryEnd]);

        let transition = s
            .engine
            .dispatch(&s.ctx, s.doc, LifecycleAction::DeliveryEnd)
            .await
            .unwrap();
        assert_eq!(transition.to, DocumentStatus::Completed);
    }

    #[tokio::test]
    async fn test_early_consignee_signature_does_not_transition() {
        let s = setup().await;
        let captured = s
            .service
            .capture(&s.ctx, s.doc, SignatureParty::Consignee, signer("K. Braun"), tiny_png())
            .await
            .unwrap();

        assert!(captured.transition.is_none());
        assert!(s.store.list_events(s.ctx.user_id, s.doc).await.unwrap().is_empty());
    }
}
