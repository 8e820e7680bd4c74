use serde::{Deserialize, Serialize};
use tracing::instrument;

use sawit_core::{Actor, AggregateRoot, DomainError, ExpectedVersion, Grade};
use sawit_events::AuditSink;
use sawit_orders::{
    AGGREGATE_TYPE as ORDER_AGGREGATE, CompleteOrder, OrderCommand, PurchaseOrder,
    PurchaseOrderId, StartLoading,
};
use sawit_settlement::{
    DocumentNumbers, IssueDocument, RECORD_TYPE as DOCUMENT_RECORD, SalesDocument,
    SalesDocumentId, settle,
};
use sawit_weighing::{
    AGGREGATE_TYPE as SESSION_AGGREGATE, LoadingSchedule, OpenSession, QualityReadings,
    RecordInbound, RecordOutbound, WeighingCommand, WeighingSession, WeighingSessionId,
};

use crate::store::{SequenceKey, SequenceKind, SessionFilter, Store, UnitOfWork};

use super::orders::load_order;
use super::{FulfillmentError, FulfillmentService, Trail, execute};

/// Scale reading and grading taken when the loaded truck leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundReading {
    pub weight_kg: i64,
    pub grade: Grade,
    #[serde(default)]
    pub quality: QualityReadings,
}

/// Everything a completed weigh-out produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settled {
    pub session: WeighingSession,
    pub order: PurchaseOrder,
    pub document: SalesDocument,
}

impl<S, A> FulfillmentService<S, A>
where
    S: Store,
    A: AuditSink,
{
    /// Open the weighing session for an approved order and move the order to
    /// `loading`. The session gets the next queue number of its loading day.
    #[instrument(skip(self, actor, schedule), fields(actor = %actor.user_id), err)]
    pub fn open_session(
        &self,
        actor: &Actor,
        order_id: PurchaseOrderId,
        schedule: LoadingSchedule,
    ) -> Result<WeighingSession, FulfillmentError> {
        let now = self.clock.now();
        let loading_day = self.business_day(schedule.loading_at);
        let session_id = WeighingSessionId::generate();

        let (session, trail) = self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            let mut trail = Trail::new(actor.user_id);
            let mut order = load_order(uow, order_id)?;
            let order_version = order.version();

            execute(
                &mut order,
                OrderCommand::StartLoading(StartLoading {
                    order_id,
                    session_id: session_id.0,
                    occurred_at: now,
                }),
                ORDER_AGGREGATE,
                *order_id.as_uuid(),
                &mut trail,
            )?;

            let queue_number =
                uow.next_sequence(SequenceKey::new(SequenceKind::LoadingQueue, loading_day))?;

            let mut session = WeighingSession::empty(session_id);
            execute(
                &mut session,
                WeighingCommand::OpenSession(OpenSession {
                    session_id,
                    order_id,
                    queue_number,
                    loading_day,
                    schedule,
                    occurred_at: now,
                }),
                SESSION_AGGREGATE,
                *session_id.as_uuid(),
                &mut trail,
            )?;

            uow.insert_session(&session)?;
            uow.update_order(&order, ExpectedVersion::Exact(order_version))?;
            Ok((session, trail))
        })?;

        self.publish(trail);
        tracing::info!(
            session_id = %session_id,
            order_id = %order_id,
            queue_number = session.queue_number(),
            "weighing session opened"
        );
        Ok(session)
    }

    /// Record the empty truck's weight.
    #[instrument(skip(self, actor), fields(actor = %actor.user_id), err)]
    pub fn record_inbound(
        &self,
        actor: &Actor,
        session_id: WeighingSessionId,
        weight_kg: i64,
    ) -> Result<WeighingSession, FulfillmentError> {
        let now = self.clock.now();

        let (session, trail) = self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            let mut trail = Trail::new(actor.user_id);
            let mut session = load_session(uow, session_id)?;
            let expected = session.version();

            execute(
                &mut session,
                WeighingCommand::RecordInbound(RecordInbound {
                    session_id,
                    weight_kg,
                    recorded_by: actor.user_id,
                    occurred_at: now,
                }),
                SESSION_AGGREGATE,
                *session_id.as_uuid(),
                &mut trail,
            )?;
            uow.update_session(&session, ExpectedVersion::Exact(expected))?;
            Ok((session, trail))
        })?;

        self.publish(trail);
        Ok(session)
    }

    /// Record the loaded truck's weight and settle the delivery.
    ///
    /// In one unit of work: the session completes with its net weight, the
    /// settlement is priced against the order's contracted grade and price, a
    /// sales document is issued under the next document counter of the day,
    /// and the order completes. Any failure leaves all of them untouched.
    #[instrument(
        skip(self, actor, reading),
        fields(actor = %actor.user_id, weight_kg = reading.weight_kg, grade = %reading.grade),
        err
    )]
    pub fn record_outbound(
        &self,
        actor: &Actor,
        session_id: WeighingSessionId,
        reading: OutboundReading,
    ) -> Result<Settled, FulfillmentError> {
        let now = self.clock.now();
        let day = self.business_day(now);

        let (settled, trail) = self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            let mut trail = Trail::new(actor.user_id);
            let mut session = load_session(uow, session_id)?;
            let session_version = session.version();

            execute(
                &mut session,
                WeighingCommand::RecordOutbound(RecordOutbound {
                    session_id,
                    weight_kg: reading.weight_kg,
                    grade: reading.grade,
                    quality: reading.quality,
                    recorded_by: actor.user_id,
                    occurred_at: now,
                }),
                SESSION_AGGREGATE,
                *session_id.as_uuid(),
                &mut trail,
            )?;

            let order_id = session
                .order_id()
                .ok_or_else(|| DomainError::invariant("weighing session has no order"))?;
            let mut order = uow.order(order_id)?.ok_or_else(|| {
                DomainError::settlement(format!(
                    "purchase order {order_id} of weighing session {session_id} not found"
                ))
            })?;
            let order_version = order.version();

            let net_kg = session
                .net_kg()
                .ok_or_else(|| DomainError::invariant("completed session has no net weight"))?;
            let observed = session
                .observed_grade()
                .ok_or_else(|| DomainError::invariant("completed session has no grade"))?;

            let settlement = settle(
                &self.settings.penalty_table,
                order.grade(),
                observed,
                order.unit_price(),
                net_kg,
            )?;

            let counter = uow.next_sequence(SequenceKey::new(SequenceKind::SalesDocument, day))?;
            let document = SalesDocument::issue(IssueDocument {
                document_id: SalesDocumentId::generate(),
                order_id,
                session_id,
                numbers: DocumentNumbers::for_day(&self.settings.prefixes, day, counter)?,
                document_date: day,
                contracted_grade: order.grade(),
                observed_grade: observed,
                settlement,
                issued_by: actor.user_id,
                issued_at: now,
            })?;
            trail.push(
                DOCUMENT_RECORD,
                *document.id_typed().as_uuid(),
                1,
                &document.issued_event(),
            );

            execute(
                &mut order,
                OrderCommand::CompleteOrder(CompleteOrder {
                    order_id,
                    document_id: document.id_typed().0,
                    occurred_at: now,
                }),
                ORDER_AGGREGATE,
                *order_id.as_uuid(),
                &mut trail,
            )?;

            uow.update_session(&session, ExpectedVersion::Exact(session_version))?;
            uow.insert_document(&document)?;
            uow.update_order(&order, ExpectedVersion::Exact(order_version))?;

            Ok((
                Settled {
                    session,
                    order,
                    document,
                },
                trail,
            ))
        })?;

        self.publish(trail);
        tracing::info!(
            session_id = %session_id,
            invoice = %settled.document.numbers().invoice,
            net_kg = settled.document.net_kg(),
            final_total = settled.document.final_total(),
            "delivery settled"
        );
        Ok(settled)
    }

    pub fn session(
        &self,
        session_id: WeighingSessionId,
    ) -> Result<WeighingSession, FulfillmentError> {
        self.store
            .transaction(|uow| -> Result<_, FulfillmentError> { load_session(uow, session_id) })
    }

    pub fn session_for_order(
        &self,
        order_id: PurchaseOrderId,
    ) -> Result<WeighingSession, FulfillmentError> {
        self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            uow.session_for_order(order_id)?.ok_or_else(|| {
                DomainError::not_found("weighing session for order", order_id).into()
            })
        })
    }

    /// Sessions in loading order.
    pub fn sessions(
        &self,
        filter: &SessionFilter,
    ) -> Result<Vec<WeighingSession>, FulfillmentError> {
        self.store
            .transaction(|uow| -> Result<_, FulfillmentError> { Ok(uow.sessions(filter)?) })
    }
}

fn load_session(
    uow: &mut dyn UnitOfWork,
    session_id: WeighingSessionId,
) -> Result<WeighingSession, FulfillmentError> {
    uow.session(session_id)?
        .ok_or_else(|| DomainError::not_found("weighing session", session_id).into())
}
