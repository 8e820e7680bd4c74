use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sawit_core::{Aggregate, AggregateRoot, DomainError, Grade, UserId};
use sawit_events::Event;
use sawit_orders::PurchaseOrderId;

sawit_core::typed_aggregate_id!(
    /// Weighing session identifier.
    WeighingSessionId
);

/// Aggregate type name used for audit records and storage.
pub const AGGREGATE_TYPE: &str = "weighing.session";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    WeighIn,
    Loading,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::WeighIn => "weigh_in",
            SessionStatus::Loading => "loading",
            SessionStatus::Completed => "completed",
        }
    }
}

impl core::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When and with which truck the pickup is planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingSchedule {
    pub loading_at: DateTime<Utc>,
    pub plate_number: String,
    pub driver_name: String,
}

/// Quality observations taken at weigh-out. All optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReadings {
    pub moisture_pct: Option<f64>,
    pub debris_pct: Option<f64>,
    pub ripeness: Option<String>,
    pub note: Option<String>,
}

impl QualityReadings {
    fn validate(&self) -> Result<(), DomainError> {
        for (name, value) in [("moisture_pct", self.moisture_pct), ("debris_pct", self.debris_pct)] {
            if let Some(v) = value {
                if !(0.0..=100.0).contains(&v) {
                    return Err(DomainError::validation(format!(
                        "{name} must be between 0 and 100"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// One scale reading.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleReading {
    pub weight_kg: i64,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: UserId,
}

/// Aggregate root: WeighingSession.
///
/// Exactly one per order pickup. Net weight is derived from the two readings
/// when the outbound weight is recorded and is never set independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeighingSession {
    id: WeighingSessionId,
    order_id: Option<PurchaseOrderId>,
    queue_number: u32,
    loading_day: Option<NaiveDate>,
    schedule: Option<LoadingSchedule>,
    inbound: Option<ScaleReading>,
    outbound: Option<ScaleReading>,
    net_kg: Option<i64>,
    observed_grade: Option<Grade>,
    quality: QualityReadings,
    status: SessionStatus,
    opened_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl WeighingSession {
    /// Create an empty, not-yet-opened aggregate instance.
    pub fn empty(id: WeighingSessionId) -> Self {
        Self {
            id,
            order_id: None,
            queue_number: 0,
            loading_day: None,
            schedule: None,
            inbound: None,
            outbound: None,
            net_kg: None,
            observed_grade: None,
            quality: QualityReadings::default(),
            status: SessionStatus::WeighIn,
            opened_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> WeighingSessionId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn order_id(&self) -> Option<PurchaseOrderId> {
        self.order_id
    }

    pub fn queue_number(&self) -> u32 {
        self.queue_number
    }

    /// Business day the queue number belongs to.
    pub fn loading_day(&self) -> Option<NaiveDate> {
        self.loading_day
    }

    pub fn schedule(&self) -> Option<&LoadingSchedule> {
        self.schedule.as_ref()
    }

    pub fn inbound(&self) -> Option<&ScaleReading> {
        self.inbound.as_ref()
    }

    pub fn outbound(&self) -> Option<&ScaleReading> {
        self.outbound.as_ref()
    }

    pub fn net_kg(&self) -> Option<i64> {
        self.net_kg
    }

    pub fn observed_grade(&self) -> Option<Grade> {
        self.observed_grade
    }

    pub fn quality(&self) -> &QualityReadings {
        &self.quality
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }
}

impl AggregateRoot for WeighingSession {
    type Id = WeighingSessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenSession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSession {
    pub session_id: WeighingSessionId,
    pub order_id: PurchaseOrderId,
    pub queue_number: u32,
    pub loading_day: NaiveDate,
    pub schedule: LoadingSchedule,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordInbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInbound {
    pub session_id: WeighingSessionId,
    pub weight_kg: i64,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordOutbound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutbound {
    pub session_id: WeighingSessionId,
    pub weight_kg: i64,
    pub grade: Grade,
    pub quality: QualityReadings,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeighingCommand {
    OpenSession(OpenSession),
    RecordInbound(RecordInbound),
    RecordOutbound(RecordOutbound),
}

/// Event: SessionOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOpened {
    pub session_id: WeighingSessionId,
    pub order_id: PurchaseOrderId,
    pub queue_number: u32,
    pub loading_day: NaiveDate,
    pub schedule: LoadingSchedule,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InboundRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRecorded {
    pub session_id: WeighingSessionId,
    pub weight_kg: i64,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OutboundRecorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRecorded {
    pub session_id: WeighingSessionId,
    pub order_id: PurchaseOrderId,
    pub weight_kg: i64,
    pub net_kg: i64,
    pub grade: Grade,
    pub quality: QualityReadings,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeighingEvent {
    SessionOpened(SessionOpened),
    InboundRecorded(InboundRecorded),
    OutboundRecorded(OutboundRecorded),
}

impl Event for WeighingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WeighingEvent::SessionOpened(_) => "weighing.session.opened",
            WeighingEvent::InboundRecorded(_) => "weighing.session.inbound_recorded",
            WeighingEvent::OutboundRecorded(_) => "weighing.session.outbound_recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WeighingEvent::SessionOpened(e) => e.occurred_at,
            WeighingEvent::InboundRecorded(e) => e.occurred_at,
            WeighingEvent::OutboundRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for WeighingSession {
    type Command = WeighingCommand;
    type Event = WeighingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WeighingEvent::SessionOpened(e) => {
                self.id = e.session_id;
                self.order_id = Some(e.order_id);
                self.queue_number = e.queue_number;
                self.loading_day = Some(e.loading_day);
                self.schedule = Some(e.schedule.clone());
                self.status = SessionStatus::WeighIn;
                self.opened_at = Some(e.occurred_at);
                self.created = true;
            }
            WeighingEvent::InboundRecorded(e) => {
                self.inbound = Some(ScaleReading {
                    weight_kg: e.weight_kg,
                    recorded_at: e.occurred_at,
                    recorded_by: e.recorded_by,
                });
                self.status = SessionStatus::Loading;
            }
            WeighingEvent::OutboundRecorded(e) => {
                self.outbound = Some(ScaleReading {
                    weight_kg: e.weight_kg,
                    recorded_at: e.occurred_at,
                    recorded_by: e.recorded_by,
                });
                self.net_kg = Some(e.net_kg);
                self.observed_grade = Some(e.grade);
                self.quality = e.quality.clone();
                self.status = SessionStatus::Completed;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WeighingCommand::OpenSession(cmd) => self.handle_open(cmd),
            WeighingCommand::RecordInbound(cmd) => self.handle_inbound(cmd),
            WeighingCommand::RecordOutbound(cmd) => self.handle_outbound(cmd),
        }
    }
}

impl WeighingSession {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("weighing session", self.id));
        }
        Ok(())
    }

    fn ensure_session_id(&self, session_id: WeighingSessionId) -> Result<(), DomainError> {
        if self.id != session_id {
            return Err(DomainError::invariant("session_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenSession) -> Result<Vec<WeighingEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("weighing session already exists"));
        }
        self.ensure_session_id(cmd.session_id)?;

        if cmd.queue_number == 0 {
            return Err(DomainError::validation("queue_number starts at 1"));
        }
        if cmd.schedule.plate_number.trim().is_empty() {
            return Err(DomainError::validation("plate_number cannot be empty"));
        }
        if cmd.schedule.driver_name.trim().is_empty() {
            return Err(DomainError::validation("driver_name cannot be empty"));
        }

        Ok(vec![WeighingEvent::SessionOpened(SessionOpened {
            session_id: cmd.session_id,
            order_id: cmd.order_id,
            queue_number: cmd.queue_number,
            loading_day: cmd.loading_day,
            schedule: LoadingSchedule {
                loading_at: cmd.schedule.loading_at,
                plate_number: cmd.schedule.plate_number.trim().to_uppercase(),
                driver_name: cmd.schedule.driver_name.trim().to_string(),
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_inbound(&self, cmd: &RecordInbound) -> Result<Vec<WeighingEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_session_id(cmd.session_id)?;

        if self.status != SessionStatus::WeighIn {
            return Err(DomainError::invalid_transition(
                "weighing session",
                self.status,
                SessionStatus::Loading,
            ));
        }
        if cmd.weight_kg <= 0 {
            return Err(DomainError::invalid_weight(format!(
                "inbound weight must be positive, got {} kg",
                cmd.weight_kg
            )));
        }

        Ok(vec![WeighingEvent::InboundRecorded(InboundRecorded {
            session_id: cmd.session_id,
            weight_kg: cmd.weight_kg,
            recorded_by: cmd.recorded_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_outbound(&self, cmd: &RecordOutbound) -> Result<Vec<WeighingEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_session_id(cmd.session_id)?;

        if self.status == SessionStatus::Completed {
            return Err(DomainError::invalid_transition(
                "weighing session",
                self.status,
                SessionStatus::Completed,
            ));
        }

        let inbound_kg = match self.inbound {
            Some(reading) if reading.weight_kg > 0 => reading.weight_kg,
            _ => return Err(DomainError::InboundMissing),
        };

        if cmd.weight_kg <= 0 {
            return Err(DomainError::invalid_weight(format!(
                "outbound weight must be positive, got {} kg",
                cmd.weight_kg
            )));
        }
        if cmd.weight_kg < inbound_kg {
            return Err(DomainError::invalid_weight(format!(
                "outbound weight {} kg is below inbound weight {} kg",
                cmd.weight_kg, inbound_kg
            )));
        }
        cmd.quality.validate()?;

        let order_id = self
            .order_id
            .ok_or_else(|| DomainError::invariant("weighing session has no order"))?;

        Ok(vec![WeighingEvent::OutboundRecorded(OutboundRecorded {
            session_id: cmd.session_id,
            order_id,
            weight_kg: cmd.weight_kg,
            net_kg: cmd.weight_kg - inbound_kg,
            grade: cmd.grade,
            quality: cmd.quality.clone(),
            recorded_by: cmd.recorded_by,
            occurred_at: cmd.occurred_at,
        })])
    }
}
