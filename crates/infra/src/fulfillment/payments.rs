use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use sawit_core::{Actor, AggregateRoot, DomainError, ExpectedVersion};
use sawit_events::AuditSink;
use sawit_orders::{PaymentTerms, PurchaseOrderId};
use sawit_settlement::{
    AGGREGATE_TYPE as PAYMENT_AGGREGATE, PayerDetails, Payment, PaymentCommand, PaymentDecision,
    PaymentId, PaymentStatus, RecordPayment, SalesDocument, SalesDocumentId, VerifyPayment,
};

use crate::store::{DocumentFilter, PaymentFilter, Store, UnitOfWork};

use super::orders::load_order;
use super::{FulfillmentError, FulfillmentService, Trail, execute};

/// Input for [`FulfillmentService::record_payment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub document_id: SalesDocumentId,
    pub amount: i64,
    pub method: PaymentTerms,
    #[serde(default)]
    pub payer: PayerDetails,
    pub paid_on: NaiveDate,
    pub due_on: Option<NaiveDate>,
    pub note: Option<String>,
}

impl<S, A> FulfillmentService<S, A>
where
    S: Store,
    A: AuditSink,
{
    /// Record money received against a sales document. The payment waits in
    /// `pending` until it is verified.
    #[instrument(
        skip(self, actor, payment),
        fields(actor = %actor.user_id, document_id = %payment.document_id, amount = payment.amount),
        err
    )]
    pub fn record_payment(
        &self,
        actor: &Actor,
        payment: NewPayment,
    ) -> Result<Payment, FulfillmentError> {
        let now = self.clock.now();
        let payment_id = PaymentId::generate();

        let (recorded, trail) = self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            let mut trail = Trail::new(actor.user_id);
            let document = load_document(uow, payment.document_id)?;

            let mut record = Payment::empty(payment_id);
            execute(
                &mut record,
                PaymentCommand::RecordPayment(RecordPayment {
                    payment_id,
                    document_id: payment.document_id,
                    order_id: document.order_id(),
                    amount: payment.amount,
                    method: payment.method,
                    payer: payment.payer,
                    paid_on: payment.paid_on,
                    due_on: payment.due_on,
                    note: payment.note,
                    recorded_by: actor.user_id,
                    occurred_at: now,
                }),
                PAYMENT_AGGREGATE,
                *payment_id.as_uuid(),
                &mut trail,
            )?;
            uow.insert_payment(&record)?;
            Ok((record, trail))
        })?;

        self.publish(trail);
        tracing::info!(payment_id = %payment_id, "payment recorded");
        Ok(recorded)
    }

    /// Accept or reject a pending payment.
    #[instrument(skip(self, actor, note), fields(actor = %actor.user_id), err)]
    pub fn verify_payment(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
        decision: PaymentDecision,
        note: Option<String>,
    ) -> Result<Payment, FulfillmentError> {
        let now = self.clock.now();

        let (payment, trail) = self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            let mut trail = Trail::new(actor.user_id);
            let mut payment = uow
                .payment(payment_id)?
                .ok_or_else(|| DomainError::not_found("payment", payment_id))?;
            let expected = payment.version();

            execute(
                &mut payment,
                PaymentCommand::VerifyPayment(VerifyPayment {
                    payment_id,
                    decision,
                    note,
                    verified_by: actor.user_id,
                    occurred_at: now,
                }),
                PAYMENT_AGGREGATE,
                *payment_id.as_uuid(),
                &mut trail,
            )?;
            uow.update_payment(&payment, ExpectedVersion::Exact(expected))?;
            Ok((payment, trail))
        })?;

        self.publish(trail);
        tracing::info!(payment_id = %payment_id, state = %payment.state(), "payment verified");
        Ok(payment)
    }

    /// Payment status of an order, taken from its most recent payment.
    pub fn payment_status(
        &self,
        order_id: PurchaseOrderId,
    ) -> Result<PaymentStatus, FulfillmentError> {
        self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            load_order(uow, order_id)?;
            let payments = uow.payments(&PaymentFilter::for_order(order_id))?;
            Ok(PaymentStatus::from_latest(payments.last()))
        })
    }

    /// Payments in recording order.
    pub fn payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, FulfillmentError> {
        self.store
            .transaction(|uow| -> Result<_, FulfillmentError> { Ok(uow.payments(filter)?) })
    }

    pub fn document(
        &self,
        document_id: SalesDocumentId,
    ) -> Result<SalesDocument, FulfillmentError> {
        self.store
            .transaction(|uow| -> Result<_, FulfillmentError> { load_document(uow, document_id) })
    }

    pub fn document_for_order(
        &self,
        order_id: PurchaseOrderId,
    ) -> Result<SalesDocument, FulfillmentError> {
        self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            uow.document_for_order(order_id)?.ok_or_else(|| {
                DomainError::not_found("sales document for order", order_id).into()
            })
        })
    }

    /// Documents by date, then number.
    pub fn documents(
        &self,
        filter: &DocumentFilter,
    ) -> Result<Vec<SalesDocument>, FulfillmentError> {
        self.store
            .transaction(|uow| -> Result<_, FulfillmentError> { Ok(uow.documents(filter)?) })
    }
}

fn load_document(
    uow: &mut dyn UnitOfWork,
    document_id: SalesDocumentId,
) -> Result<SalesDocument, FulfillmentError> {
    uow.document(document_id)?
        .ok_or_else(|| DomainError::not_found("sales document", document_id).into())
}
