use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coachline_core::models::{
    AuditEntry, Booking, BookingStatus, ModificationRecord, PassengerDetail, Seat, SeatOccupancy,
    Trip,
};
use coachline_core::repository::{BookingQuery, BookingStore, StoreError, StoreResult, StoreTx};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

/// SQLSTATEs worth retrying: serialization failure, deadlock, lock not
/// available, statement timeout.
const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01", "55P03", "57014"];
const UNIQUE_VIOLATION: &str = "23505";

pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Transient(err.to_string())
        }
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(code) if TRANSIENT_SQLSTATES.contains(&code) => StoreError::Transient(err.to_string()),
            Some(UNIQUE_VIOLATION) => StoreError::Conflict(err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        },
        _ => StoreError::Backend(err.to_string()),
    }
}

fn parse_column<T: std::str::FromStr>(column: &str, value: &str) -> StoreResult<T> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("{} has unexpected value '{}'", column, value)))
}

// Internal structs for type-safe querying

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    bus_id: Uuid,
    departure_at: DateTime<Utc>,
    arrival_at: DateTime<Utc>,
    base_fare: i64,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Trip {
            id: row.id,
            bus_id: row.bus_id,
            departure_at: row.departure_at,
            arrival_at: row.arrival_at,
            base_fare: row.base_fare,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: Uuid,
    bus_id: Uuid,
    code: String,
    seat_class: String,
    is_active: bool,
}

impl TryFrom<SeatRow> for Seat {
    type Error = StoreError;

    fn try_from(row: SeatRow) -> StoreResult<Self> {
        Ok(Seat {
            id: row.id,
            bus_id: row.bus_id,
            code: row.code,
            seat_class: parse_column("seats.seat_class", &row.seat_class)?,
            is_active: row.is_active,
        })
    }
}

const OCCUPANCY_COLUMNS: &str = "trip_id, seat_id, state, booking_id, lock_expires_at, updated_at";

#[derive(sqlx::FromRow)]
struct OccupancyRow {
    trip_id: Uuid,
    seat_id: Uuid,
    state: String,
    booking_id: Option<Uuid>,
    lock_expires_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OccupancyRow> for SeatOccupancy {
    type Error = StoreError;

    fn try_from(row: OccupancyRow) -> StoreResult<Self> {
        Ok(SeatOccupancy {
            trip_id: row.trip_id,
            seat_id: row.seat_id,
            state: parse_column("seat_occupancy.state", &row.state)?,
            booking_id: row.booking_id,
            lock_expires_at: row.lock_expires_at,
            updated_at: row.updated_at,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, reference, trip_id, owner_id, contact_email, contact_phone, \
     total_amount, currency, status, created_at, last_modified_at, cancelled_at, cancel_reason, \
     expires_at, payment_url";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    trip_id: Uuid,
    owner_id: Option<Uuid>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    total_amount: i64,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    last_modified_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    payment_url: Option<String>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> StoreResult<Self> {
        Ok(Booking {
            id: row.id,
            reference: row.reference,
            trip_id: row.trip_id,
            owner_id: row.owner_id,
            contact_email: row.contact_email,
            contact_phone: row.contact_phone,
            total_amount: row.total_amount,
            currency: row.currency,
            status: parse_column("bookings.status", &row.status)?,
            created_at: row.created_at,
            last_modified_at: row.last_modified_at,
            cancelled_at: row.cancelled_at,
            cancel_reason: row.cancel_reason,
            expires_at: row.expires_at,
            payment_url: row.payment_url,
        })
    }
}

fn bookings_from_rows(rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

const PASSENGER_COLUMNS: &str = "id, booking_id, full_name, document_id, seat_id, seat_code";

#[derive(sqlx::FromRow)]
struct PassengerRow {
    id: Uuid,
    booking_id: Uuid,
    full_name: String,
    document_id: Option<String>,
    seat_id: Uuid,
    seat_code: String,
}

impl From<PassengerRow> for PassengerDetail {
    fn from(row: PassengerRow) -> Self {
        PassengerDetail {
            id: row.id,
            booking_id: row.booking_id,
            full_name: row.full_name,
            document_id: row.document_id,
            seat_id: row.seat_id,
            seat_code: row.seat_code,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ModificationRow {
    id: Uuid,
    booking_id: Uuid,
    modification_type: String,
    description: String,
    previous_value: Value,
    new_value: Value,
    actor_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ModificationRow> for ModificationRecord {
    type Error = StoreError;

    fn try_from(row: ModificationRow) -> StoreResult<Self> {
        Ok(ModificationRecord {
            id: row.id,
            booking_id: row.booking_id,
            modification_type: parse_column("modification_records.modification_type", &row.modification_type)?,
            description: row.description,
            previous_value: row.previous_value,
            new_value: row.new_value,
            actor_id: row.actor_id,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    action: String,
    detail: String,
    actor_id: Option<Uuid>,
    affected_user_id: Option<Uuid>,
    entity_id: Option<Uuid>,
    metadata: Value,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        AuditEntry {
            id: row.id,
            action: row.action,
            detail: row.detail,
            actor_id: row.actor_id,
            affected_user_id: row.affected_user_id,
            entity_id: row.entity_id,
            metadata: row.metadata,
            created_at: row.created_at,
        }
    }
}

/// Postgres-backed booking store. Seat claims rely on row locks taken
/// with `SELECT ... FOR UPDATE` inside the caller's transaction.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingQuery for PgBookingStore {
    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn find_booking_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE reference = $1"))
                .bind(reference)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_owner_bookings(&self, owner_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE owner_id = $1 ORDER BY created_at DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        bookings_from_rows(rows)
    }

    async fn list_passengers(&self, booking_id: Uuid) -> StoreResult<Vec<PassengerDetail>> {
        let rows: Vec<PassengerRow> = sqlx::query_as(&format!(
            "SELECT {PASSENGER_COLUMNS} FROM passenger_details WHERE booking_id = $1 ORDER BY position"
        ))
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PassengerDetail::from).collect())
    }

    async fn list_modifications(&self, booking_id: Uuid) -> StoreResult<Vec<ModificationRecord>> {
        let rows: Vec<ModificationRow> = sqlx::query_as(
            r#"
            SELECT id, booking_id, modification_type, description, previous_value, new_value, actor_id, created_at
            FROM modification_records
            WHERE booking_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(ModificationRecord::try_from).collect()
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn find_overdue_pending(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Uuid>> {
        sqlx::query_scalar(
            r#"
            SELECT id FROM bookings
            WHERE status = 'PENDING' AND expires_at <= $1
            ORDER BY expires_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn set_payment_url(&self, booking_id: Uuid, url: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE bookings SET payment_url = $2 WHERE id = $1")
            .bind(booking_id)
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            warn!("Payment link for unknown booking {}", booking_id);
        }
        Ok(())
    }

    async fn list_audit_entries(&self, entity_id: Uuid) -> StoreResult<Vec<AuditEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, action, detail, actor_id, affected_user_id, entity_id, metadata, created_at
            FROM audit_log
            WHERE entity_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}

/// One open Postgres transaction. Dropped without commit, sqlx rolls it back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn find_trip(&mut self, trip_id: Uuid) -> StoreResult<Option<Trip>> {
        let row: Option<TripRow> = sqlx::query_as(
            "SELECT id, bus_id, departure_at, arrival_at, base_fare FROM trips WHERE id = $1",
        )
        .bind(trip_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(Trip::from))
    }

    async fn list_bus_seats(&mut self, bus_id: Uuid) -> StoreResult<Vec<Seat>> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            "SELECT id, bus_id, code, seat_class, is_active FROM seats WHERE bus_id = $1 ORDER BY code",
        )
        .bind(bus_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(Seat::try_from).collect()
    }

    async fn lock_seat_rows(
        &mut self,
        trip_id: Uuid,
        seat_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<SeatOccupancy>> {
        sqlx::query(
            r#"
            INSERT INTO seat_occupancy (trip_id, seat_id, state, updated_at)
            SELECT $1, seat_id, 'AVAILABLE', $3 FROM UNNEST($2::uuid[]) AS seat_id
            ORDER BY seat_id
            ON CONFLICT (trip_id, seat_id) DO NOTHING
            "#,
        )
        .bind(trip_id)
        .bind(seat_ids)
        .bind(now)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        // Fixed lock order across transactions, for the insert above too
        let rows: Vec<OccupancyRow> = sqlx::query_as(&format!(
            "SELECT {OCCUPANCY_COLUMNS} FROM seat_occupancy \
             WHERE trip_id = $1 AND seat_id = ANY($2) ORDER BY seat_id FOR UPDATE"
        ))
        .bind(trip_id)
        .bind(seat_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(SeatOccupancy::try_from).collect()
    }

    async fn lock_booking_seat_rows(&mut self, booking_id: Uuid) -> StoreResult<Vec<SeatOccupancy>> {
        let rows: Vec<OccupancyRow> = sqlx::query_as(&format!(
            "SELECT {OCCUPANCY_COLUMNS} FROM seat_occupancy \
             WHERE booking_id = $1 AND state <> 'AVAILABLE' ORDER BY seat_id FOR UPDATE"
        ))
        .bind(booking_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(SeatOccupancy::try_from).collect()
    }

    async fn list_trip_seat_rows(&mut self, trip_id: Uuid) -> StoreResult<Vec<SeatOccupancy>> {
        let rows: Vec<OccupancyRow> = sqlx::query_as(&format!(
            "SELECT {OCCUPANCY_COLUMNS} FROM seat_occupancy WHERE trip_id = $1 ORDER BY seat_id"
        ))
        .bind(trip_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        rows.into_iter().map(SeatOccupancy::try_from).collect()
    }

    async fn save_seat_row(&mut self, row: &SeatOccupancy) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE seat_occupancy
            SET state = $3, booking_id = $4, lock_expires_at = $5, updated_at = $6
            WHERE trip_id = $1 AND seat_id = $2
            "#,
        )
        .bind(row.trip_id)
        .bind(row.seat_id)
        .bind(row.state.as_str())
        .bind(row.booking_id)
        .bind(row.lock_expires_at)
        .bind(row.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn find_bookings(&mut self, ids: &[Uuid]) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ANY($1)"))
                .bind(ids)
                .fetch_all(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;
        bookings_from_rows(rows)
    }

    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"))
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn lock_pending_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 AND status = 'PENDING' FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        row.map(Booking::try_from).transpose()
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(booking.trip_id)
        .bind(booking.owner_id)
        .bind(&booking.contact_email)
        .bind(&booking.contact_phone)
        .bind(booking.total_amount)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.last_modified_at)
        .bind(booking.cancelled_at)
        .bind(&booking.cancel_reason)
        .bind(booking.expires_at)
        .bind(&booking.payment_url)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET contact_email = $2, contact_phone = $3, total_amount = $4, status = $5,
                last_modified_at = $6, cancelled_at = $7, cancel_reason = $8, expires_at = $9,
                payment_url = $10
            WHERE id = $1
            "#,
        )
        .bind(booking.id)
        .bind(&booking.contact_email)
        .bind(&booking.contact_phone)
        .bind(booking.total_amount)
        .bind(booking.status.as_str())
        .bind(booking.last_modified_at)
        .bind(booking.cancelled_at)
        .bind(&booking.cancel_reason)
        .bind(booking.expires_at)
        .bind(&booking.payment_url)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn transition_booking(
        &mut self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> StoreResult<u64> {
        let cancelled_at = matches!(to, BookingStatus::Cancelled | BookingStatus::Expired).then_some(at);
        let clear_expiry = from == BookingStatus::Pending;

        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $3,
                last_modified_at = $4,
                cancelled_at = COALESCE($5, cancelled_at),
                cancel_reason = COALESCE($6, cancel_reason),
                expires_at = CASE WHEN $7 THEN NULL ELSE expires_at END
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .bind(cancelled_at)
        .bind(reason)
        .bind(clear_expiry)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn insert_passengers(&mut self, passengers: &[PassengerDetail]) -> StoreResult<()> {
        for (position, passenger) in passengers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO passenger_details (id, booking_id, full_name, document_id, seat_id, seat_code, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(passenger.id)
            .bind(passenger.booking_id)
            .bind(&passenger.full_name)
            .bind(&passenger.document_id)
            .bind(passenger.seat_id)
            .bind(&passenger.seat_code)
            .bind(position as i32)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn list_passengers(&mut self, booking_id: Uuid) -> StoreResult<Vec<PassengerDetail>> {
        let rows: Vec<PassengerRow> = sqlx::query_as(&format!(
            "SELECT {PASSENGER_COLUMNS} FROM passenger_details WHERE booking_id = $1 ORDER BY position FOR UPDATE"
        ))
        .bind(booking_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(PassengerDetail::from).collect())
    }

    async fn update_passenger(&mut self, passenger: &PassengerDetail) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE passenger_details
            SET full_name = $2, document_id = $3, seat_id = $4, seat_code = $5
            WHERE id = $1
            "#,
        )
        .bind(passenger.id)
        .bind(&passenger.full_name)
        .bind(&passenger.document_id)
        .bind(passenger.seat_id)
        .bind(&passenger.seat_code)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn insert_modification(&mut self, record: &ModificationRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO modification_records
                (id, booking_id, modification_type, description, previous_value, new_value, actor_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.booking_id)
        .bind(record.modification_type.as_str())
        .bind(&record.description)
        .bind(&record.previous_value)
        .bind(&record.new_value)
        .bind(record.actor_id)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn insert_audit(&mut self, entry: &AuditEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, action, detail, actor_id, affected_user_id, entity_id, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.action)
        .bind(&entry.detail)
        .bind(entry.actor_id)
        .bind(entry.affected_user_id)
        .bind(entry.entity_id)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}
