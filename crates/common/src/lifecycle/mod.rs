//! CMR lifecycle engine
//!
//! Status moves one way through
//! `ready_to_load -> loading -> in_transit -> ready_to_deliver -> completed[_with_reserves]`
//! and only through the four actions below. Each successful action appends
//! exactly one event and updates the status in the same unit of work; the
//! precondition reads happen inside that unit too.

use crate::auth::AuthContext;
use crate::db::models::{DocumentStatus, Event, EventKind, SignatureParty};
use crate::db::{DocumentStore, NewEvent};
use crate::errors::{AppError, Result};
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// The only mutation entry points of the status field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    LoadingStart,
    LoadingEnd,
    DeliveryStart,
    /// Triggered after the consignee signature is captured
    DeliveryEnd,
}

impl LifecycleAction {
    pub const ALL: [LifecycleAction; 4] = [
        LifecycleAction::LoadingStart,
        LifecycleAction::LoadingEnd,
        LifecycleAction::DeliveryStart,
        LifecycleAction::DeliveryEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::LoadingStart => "loading_start",
            LifecycleAction::LoadingEnd => "loading_end",
            LifecycleAction::DeliveryStart => "delivery_start",
            LifecycleAction::DeliveryEnd => "delivery_end",
        }
    }

    /// The single status this action may leave from
    pub fn source_status(&self) -> DocumentStatus {
        match self {
            LifecycleAction::LoadingStart => DocumentStatus::ReadyToLoad,
            LifecycleAction::LoadingEnd => DocumentStatus::Loading,
            LifecycleAction::DeliveryStart => DocumentStatus::InTransit,
            LifecycleAction::DeliveryEnd => DocumentStatus::ReadyToDeliver,
        }
    }

    /// Whether the UI offers this action as a button
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, LifecycleAction::DeliveryEnd)
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        LifecycleAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AppError::UnknownAction { tag: s.to_string() })
    }
}

/// Actions that may be dispatched from `status`
pub fn allowed_actions(status: DocumentStatus) -> Vec<LifecycleAction> {
    LifecycleAction::ALL
        .into_iter()
        .filter(|a| a.source_status() == status)
        .collect()
}

/// Status reached once `kind` is recorded
pub fn target_status(kind: &EventKind) -> DocumentStatus {
    match kind {
        EventKind::LoadingStart => DocumentStatus::Loading,
        EventKind::LoadingEnd => DocumentStatus::InTransit,
        EventKind::DeliveryStart => DocumentStatus::ReadyToDeliver,
        EventKind::DeliveryEnd { status, .. } => *status,
    }
}

/// Outcome of a successful dispatch
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub document_id: Uuid,
    pub action: LifecycleAction,
    pub from: DocumentStatus,
    pub to: DocumentStatus,
    pub event: Event,
}

/// Runs lifecycle actions against a document store
#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn DocumentStore>,
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Apply `action` to the caller's document
    ///
    /// Fails without side effects when the document is missing, the status
    /// does not match the action, or loading is ended without a shipper
    /// signature. Store errors are returned unchanged.
    pub async fn dispatch(
        &self,
        ctx: &AuthContext,
        document_id: Uuid,
        action: LifecycleAction,
    ) -> Result<Transition> {
        match self.apply(ctx, document_id, action).await {
            Ok(transition) => {
                metrics::record_transition(action);
                info!(
                    document_id = %document_id,
                    action = %action,
                    from = %transition.from,
                    to = %transition.to,
                    request_id = %ctx.request_id,
                    "Lifecycle transition applied"
                );
                Ok(transition)
            }
            Err(e) => {
                if e.is_precondition() {
                    metrics::record_rejection(action, &e);
                    warn!(document_id = %document_id, action = %action, error = %e, "Lifecycle action rejected");
                }
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        ctx: &AuthContext,
        document_id: Uuid,
        action: LifecycleAction,
    ) -> Result<Transition> {
        let mut unit = self.store.begin_lifecycle().await?;

        let document = unit
            .lock_document(ctx.user_id, document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        let from = document.document_status()?;
        if from != action.source_status() {
            return Err(AppError::InvalidTransition {
                action: action.as_str().to_string(),
                status: from.as_str().to_string(),
            });
        }

        let kind = match action {
            LifecycleAction::LoadingStart => EventKind::LoadingStart,
            LifecycleAction::LoadingEnd => {
                if !unit.has_signature(document_id, SignatureParty::Shipper).await? {
                    return Err(AppError::MissingShipperSignature);
                }
                EventKind::LoadingEnd
            }
            LifecycleAction::DeliveryStart => EventKind::DeliveryStart,
            LifecycleAction::DeliveryEnd => {
                let has_reserves = unit.has_reserves(document_id).await?;
                let status = if has_reserves {
                    DocumentStatus::CompletedWithReserves
                } else {
                    DocumentStatus::Completed
                };
                EventKind::DeliveryEnd {
                    status,
                    has_reserves,
                }
            }
        };
        let to = target_status(&kind);

        let event = unit
            .append_event(NewEvent {
                document_id,
                actor_id: ctx.user_id,
                kind,
            })
            .await?;
        unit.set_status(document_id, to).await?;
        unit.commit().await?;

        Ok(Transition {
            document_id,
            action,
            from,
            to,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ReserveSide;
    use crate::db::{blank_document, MemoryStore, NewReserve, NewSignature};
    use chrono::Utc;

    struct Fixture {
        store: MemoryStore,
        engine: LifecycleEngine,
        ctx: AuthContext,
        document_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let ctx = AuthContext::for_user(Uuid::new_v4());
        let document = store
            .insert_document(
                ctx.user_id,
                blank_document(Uuid::new_v4(), ctx.user_id, Utc::now().into()),
            )
            .await
            .unwrap();
        Fixture {
            engine: LifecycleEngine::new(Arc::new(store.clone())),
            store,
            ctx,
            document_id: document.id,
        }
    }

    impl Fixture {
        async fn status(&self) -> String {
            self.store
                .find_document(self.ctx.user_id, self.document_id)
                .await
                .unwrap()
                .unwrap()
                .status
        }

        async fn events(&self) -> Vec<Event> {
            self.store
                .list_events(self.ctx.user_id, self.document_id)
                .await
                .unwrap()
        }

        async fn sign(&self, party: SignatureParty) {
            self.store
                .insert_signature(
                    self.ctx.user_id,
                    NewSignature {
                        document_id: self.document_id,
                        party,
                        signer_name: Some("Signer".into()),
                        signer_role: None,
                        signer_email: None,
                        image_path: format!("{}.png", party),
                    },
                )
                .await
                .unwrap();
        }

        async fn reserve(&self, side: ReserveSide) {
            self.store
                .insert_reserve(
                    self.ctx.user_id,
                    NewReserve {
                        document_id: self.document_id,
                        side,
                        reserve_type: "Missing items".into(),
                        comment: None,
                        photo_path: None,
                    },
                )
                .await
                .unwrap();
        }

        async fn run(&self, action: LifecycleAction) -> Result<Transition> {
            self.engine.dispatch(&self.ctx, self.document_id, action).await
        }
    }

    #[test]
    fn test_action_tags() {
        assert_eq!(
            "loading_end".parse::<LifecycleAction>().unwrap(),
            LifecycleAction::LoadingEnd
        );
        assert!(matches!(
            "unload".parse::<LifecycleAction>(),
            Err(AppError::UnknownAction { .. })
        ));
    }

    #[test]
    fn test_allowed_actions_per_status() {
        assert_eq!(
            allowed_actions(DocumentStatus::ReadyToLoad),
            vec![LifecycleAction::LoadingStart]
        );
        assert!(allowed_actions(DocumentStatus::Draft).is_empty());
        assert!(allowed_actions(DocumentStatus::Completed).is_empty());
        assert!(allowed_actions(DocumentStatus::CompletedWithReserves).is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_with_reserves() {
        let f = fixture().await;
        assert_eq!(f.status().await, "ready_to_load");

        f.run(LifecycleAction::LoadingStart).await.unwrap();
        assert_eq!(f.status().await, "loading");
        assert_eq!(f.events().await.len(), 1);

        let err = f.run(LifecycleAction::LoadingEnd).await.unwrap_err();
        assert!(matches!(err, AppError::MissingShipperSignature));
        assert_eq!(f.status().await, "loading");
        assert_eq!(f.events().await.len(), 1);

        f.sign(SignatureParty::Shipper).await;
        f.run(LifecycleAction::LoadingEnd).await.unwrap();
        assert_eq!(f.status().await, "in_transit");

        f.run(LifecycleAction::DeliveryStart).await.unwrap();
        assert_eq!(f.status().await, "ready_to_deliver");

        f.reserve(ReserveSide::Delivery).await;
        f.sign(SignatureParty::Consignee).await;
        let transition = f.run(LifecycleAction::DeliveryEnd).await.unwrap();
        assert_eq!(transition.to, DocumentStatus::CompletedWithReserves);
        assert_eq!(f.status().await, "completed_with_reserves");

        let events = f.events().await;
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["loading_start", "loading_end", "delivery_start", "delivery_end"]
        );
        assert_eq!(
            events[3].kind().unwrap(),
            EventKind::DeliveryEnd {
                status: DocumentStatus::CompletedWithReserves,
                has_reserves: true,
            }
        );
    }

    #[tokio::test]
    async fn test_delivery_without_reserves_completes() {
        let f = fixture().await;
        f.sign(SignatureParty::Shipper).await;
        f.run(LifecycleAction::LoadingStart).await.unwrap();
        f.run(LifecycleAction::LoadingEnd).await.unwrap();
        f.run(LifecycleAction::DeliveryStart).await.unwrap();
        f.sign(SignatureParty::Consignee).await;

        let transition = f.run(LifecycleAction::DeliveryEnd).await.unwrap();
        assert_eq!(transition.to, DocumentStatus::Completed);
        assert_eq!(
            transition.event.metadata,
            serde_json::json!({ "status": "completed", "has_reserves": false })
        );
    }

    #[tokio::test]
    async fn test_loading_side_reserve_counts_for_final_status() {
        let f = fixture().await;
        f.run(LifecycleAction::LoadingStart).await.unwrap();
        f.reserve(ReserveSide::Loading).await;
        f.sign(SignatureParty::Shipper).await;
        f.run(LifecycleAction::LoadingEnd).await.unwrap();
        f.run(LifecycleAction::DeliveryStart).await.unwrap();

        let transition = f.run(LifecycleAction::DeliveryEnd).await.unwrap();
        assert_eq!(transition.to, DocumentStatus::CompletedWithReserves);
    }

    #[tokio::test]
    async fn test_terminal_state_refuses_actions() {
        let f = fixture().await;
        f.sign(SignatureParty::Shipper).await;
        for action in LifecycleAction::ALL {
            f.run(action).await.unwrap();
        }

        for action in LifecycleAction::ALL {
            let err = f.run(action).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidTransition { .. }));
        }
        assert_eq!(f.status().await, "completed");
        assert_eq!(f.events().await.len(), 4);
    }

    #[tokio::test]
    async fn test_out_of_order_action_rejected() {
        let f = fixture().await;
        let err = f.run(LifecycleAction::DeliveryStart).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(f.status().await, "ready_to_load");
        assert!(f.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_event_write_leaves_status_unchanged() {
        let f = fixture().await;
        f.store.fail_next_event_append();

        let err = f.run(LifecycleAction::LoadingStart).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(f.status().await, "ready_to_load");
        assert!(f.events().await.is_empty());

        f.run(LifecycleAction::LoadingStart).await.unwrap();
        assert_eq!(f.status().await, "loading");
    }

    #[tokio::test]
    async fn test_other_owner_cannot_dispatch() {
        let f = fixture().await;
        let stranger = AuthContext::for_user(Uuid::new_v4());

        let err = f
            .engine
            .dispatch(&stranger, f.document_id, LifecycleAction::LoadingStart)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));
        assert_eq!(f.status().await, "ready_to_load");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Act(LifecycleAction),
            Sign(SignatureParty),
            Reserve(ReserveSide),
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                4 => prop::sample::select(LifecycleAction::ALL.to_vec()).prop_map(Step::Act),
                1 => prop_oneof![Just(SignatureParty::Shipper), Just(SignatureParty::Consignee)]
                    .prop_map(Step::Sign),
                1 => prop_oneof![Just(ReserveSide::Loading), Just(ReserveSide::Delivery)]
                    .prop_map(Step::Reserve),
            ]
        }

        proptest! {
            #[test]
            fn status_never_moves_backward(steps in prop::collection::vec(step(), 0..24)) {
                tokio_test::block_on(async {
                    let f = fixture().await;
                    let mut signed = Vec::new();
                    let mut rank = DocumentStatus::ReadyToLoad.rank();
                    let mut events = 0;

                    for step in steps {
                        match step {
                            Step::Act(action) => {
                                let outcome = f.run(action).await;
                                let status: DocumentStatus = f.status().await.parse().unwrap();
                                prop_assert!(status.rank() >= rank);
                                rank = status.rank();

                                if let Ok(transition) = outcome {
                                    events += 1;
                                    prop_assert_eq!(transition.event.event_type.as_str(), action.as_str());
                                    prop_assert_eq!(transition.to, status);
                                }
                                prop_assert_eq!(f.events().await.len(), events);
                            }
                            Step::Sign(party) => {
                                if !signed.contains(&party) {
                                    f.sign(party).await;
                                    signed.push(party);
                                }
                            }
                            Step::Reserve(side) => f.reserve(side).await,
                        }
                    }
                    Ok(())
                })?;
            }
        }
    }
}
