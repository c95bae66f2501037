//! SQLite-backed booking repository.
//!
//! Thread-safe via an internal `Mutex<Connection>`. All writes are
//! serialized; the booking persistence path runs inside one transaction so
//! the overlap check and the upsert cannot interleave with a concurrent
//! confirm for the same room.

use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::schema::apply_schema;
use super::{
    Booking, BookingStatus, PersistBooking, PersistOutcome, Room, Tenant, idempotency_key,
    ranges_overlap,
};
use crate::error::{KioskError, Result};

/// SQLite-backed store for tenants, room inventory and bookings.
pub struct BookingStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for BookingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingStore").finish_non_exhaustive()
    }
}

fn db_err(e: rusqlite::Error) -> KioskError {
    KioskError::Store(e.to_string())
}

impl BookingStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the DDL fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        apply_schema(&conn).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database. Used by tests and ephemeral demos.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        apply_schema(&conn).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KioskError::Store("connection mutex poisoned".to_owned()))
    }

    /// Insert a tenant row.
    pub fn insert_tenant(&self, tenant: &Tenant) -> Result<()> {
        let conn = self.lock()?;
        let amenities = serde_json::to_string(&tenant.amenities)
            .map_err(|e| KioskError::Store(e.to_string()))?;
        conn.execute(
            "INSERT INTO tenants (id, slug, name, timezone, check_in_time, check_out_time, amenities)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                tenant.id.to_string(),
                tenant.slug,
                tenant.name,
                tenant.timezone,
                tenant.check_in_time,
                tenant.check_out_time,
                amenities,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Insert a room type row.
    pub fn insert_room(&self, room: &Room) -> Result<()> {
        let conn = self.lock()?;
        let amenities =
            serde_json::to_string(&room.amenities).map_err(|e| KioskError::Store(e.to_string()))?;
        conn.execute(
            "INSERT INTO room_types (id, tenant_id, code, name, price_cents, amenities)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                room.id.to_string(),
                room.tenant_id.to_string(),
                room.code,
                room.name,
                room.price_cents,
                amenities,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Resolve a tenant by its URL slug.
    pub fn tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, slug, name, timezone, check_in_time, check_out_time, amenities
             FROM tenants WHERE slug = ?1",
            params![slug],
            row_to_tenant,
        )
        .optional()
        .map_err(db_err)
    }

    /// All room types for a tenant, cheapest first.
    pub fn rooms_for_tenant(&self, tenant_id: Uuid) -> Result<Vec<Room>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, tenant_id, code, name, price_cents, amenities
                 FROM room_types WHERE tenant_id = ?1 ORDER BY price_cents ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![tenant_id.to_string()], row_to_room)
            .map_err(db_err)?;

        let mut rooms = Vec::new();
        for r in rows {
            rooms.push(r.map_err(db_err)?);
        }
        Ok(rooms)
    }

    /// Fetch one booking by id.
    pub fn booking(&self, id: Uuid) -> Result<Option<Booking>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{BOOKING_SELECT} WHERE id = ?1"),
            params![id.to_string()],
            row_to_booking,
        )
        .optional()
        .map_err(db_err)
    }

    /// All bookings for a tenant/room pair. Test and ops helper.
    pub fn bookings_for_room(&self, tenant_id: Uuid, room_type_id: Uuid) -> Result<Vec<Booking>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{BOOKING_SELECT} WHERE tenant_id = ?1 AND room_type_id = ?2 ORDER BY created_at"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![tenant_id.to_string(), room_type_id.to_string()],
                row_to_booking,
            )
            .map_err(db_err)?;

        let mut bookings = Vec::new();
        for r in rows {
            bookings.push(r.map_err(db_err)?);
        }
        Ok(bookings)
    }

    /// Persist a booking attempt in one transaction.
    ///
    /// Order of resolution:
    /// 1. overlap check against CONFIRMED bookings for the room, excluding
    ///    this session's own booking — conflict fails the whole call;
    /// 2. the session's own booking (if any) is updated in place;
    /// 3. a row with the same idempotency key is reused (promoted to
    ///    CONFIRMED when this attempt confirms);
    /// 4. otherwise a new row is inserted.
    ///
    /// # Errors
    ///
    /// `KioskError::BookingConflict` when the dates collide with a confirmed
    /// stay; `KioskError::Store` on any database failure or invariant
    /// violation.
    pub fn persist_booking(&self, req: &PersistBooking) -> Result<PersistOutcome> {
        if req.check_out <= req.check_in {
            return Err(KioskError::Store(
                "check_out must be after check_in".to_owned(),
            ));
        }
        if req.adults == 0 {
            return Err(KioskError::Store("adults must be at least 1".to_owned()));
        }
        let nights = u32::try_from((req.check_out - req.check_in).num_days())
            .map_err(|_| KioskError::Store("night count out of range".to_owned()))?;
        let total_cents = req.room.price_cents.saturating_mul(i64::from(nights));
        let key = idempotency_key(
            req.tenant_id,
            &req.session_id,
            req.room.id,
            req.check_in,
            req.check_out,
            &req.guest_name,
        );
        let status = if req.confirm {
            BookingStatus::Confirmed
        } else {
            BookingStatus::Draft
        };
        let now = chrono::Utc::now().timestamp();

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        // 1. Overlap check against confirmed stays for this room.
        {
            let exclude = req
                .existing_booking_id
                .map(|id| id.to_string())
                .unwrap_or_default();
            let mut stmt = tx
                .prepare(
                    "SELECT check_in, check_out FROM bookings
                     WHERE tenant_id = ?1 AND room_type_id = ?2 AND status = 'CONFIRMED'
                       AND id != ?3",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(
                    params![req.tenant_id.to_string(), req.room.id.to_string(), exclude],
                    |row| {
                        let check_in: String = row.get(0)?;
                        let check_out: String = row.get(1)?;
                        Ok((check_in, check_out))
                    },
                )
                .map_err(db_err)?;

            for r in rows {
                let (other_in, other_out) = r.map_err(db_err)?;
                let other_in = parse_date_str(&other_in)?;
                let other_out = parse_date_str(&other_out)?;
                if ranges_overlap(req.check_in, req.check_out, other_in, other_out) {
                    return Err(KioskError::BookingConflict(format!(
                        "room {} already booked {other_in} to {other_out}",
                        req.room.code
                    )));
                }
            }
        }

        // 2. Update the session's own booking in place.
        if let Some(own_id) = req.existing_booking_id {
            let owned: Option<String> = tx
                .query_row(
                    "SELECT id FROM bookings WHERE id = ?1 AND tenant_id = ?2",
                    params![own_id.to_string(), req.tenant_id.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;

            if owned.is_some() {
                tx.execute(
                    "UPDATE bookings SET room_type_id = ?2, guest_name = ?3, check_in = ?4,
                         check_out = ?5, adults = ?6, children = ?7, nights = ?8,
                         total_price_cents = ?9, status = ?10, idempotency_key = ?11,
                         updated_at = ?12
                     WHERE id = ?1",
                    params![
                        own_id.to_string(),
                        req.room.id.to_string(),
                        req.guest_name,
                        req.check_in.to_string(),
                        req.check_out.to_string(),
                        req.adults,
                        req.children,
                        nights,
                        total_cents,
                        status.as_str(),
                        key,
                        now,
                    ],
                )
                .map_err(db_err)?;
                tx.commit().map_err(db_err)?;
                drop(conn);
                let booking = self
                    .booking(own_id)?
                    .ok_or_else(|| KioskError::Store("updated booking vanished".to_owned()))?;
                return Ok(PersistOutcome {
                    booking,
                    created: false,
                });
            }
        }

        // 3. Reuse a row with the same idempotency key.
        let reused: Option<String> = tx
            .query_row(
                "SELECT id FROM bookings WHERE tenant_id = ?1 AND idempotency_key = ?2",
                params![req.tenant_id.to_string(), key],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        if let Some(id_str) = reused {
            if req.confirm {
                tx.execute(
                    "UPDATE bookings SET status = 'CONFIRMED', updated_at = ?2 WHERE id = ?1",
                    params![id_str, now],
                )
                .map_err(db_err)?;
            }
            tx.commit().map_err(db_err)?;
            drop(conn);
            let id = parse_uuid_str(&id_str)?;
            let booking = self
                .booking(id)?
                .ok_or_else(|| KioskError::Store("reused booking vanished".to_owned()))?;
            return Ok(PersistOutcome {
                booking,
                created: false,
            });
        }

        // 4. Insert a fresh row.
        let id = Uuid::new_v4();
        tx.execute(
            "INSERT INTO bookings (id, tenant_id, room_type_id, guest_name, check_in, check_out,
                                   adults, children, nights, total_price_cents, status,
                                   idempotency_key, session_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
            params![
                id.to_string(),
                req.tenant_id.to_string(),
                req.room.id.to_string(),
                req.guest_name,
                req.check_in.to_string(),
                req.check_out.to_string(),
                req.adults,
                req.children,
                nights,
                total_cents,
                status.as_str(),
                key,
                req.session_id,
                now,
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        drop(conn);

        let booking = self
            .booking(id)?
            .ok_or_else(|| KioskError::Store("inserted booking vanished".to_owned()))?;
        Ok(PersistOutcome {
            booking,
            created: true,
        })
    }

    /// Seed two demo tenants with inventory when the database is empty.
    ///
    /// Used by the brain binary on first run and by integration tests.
    pub fn seed_demo(&self) -> Result<()> {
        if self.tenant_by_slug("grand-hotel")?.is_some() {
            return Ok(());
        }

        let grand = Tenant {
            id: Uuid::new_v4(),
            slug: "grand-hotel".to_owned(),
            name: "The Grand Hotel".to_owned(),
            timezone: "Asia/Kolkata".to_owned(),
            check_in_time: "14:00".to_owned(),
            check_out_time: "11:00".to_owned(),
            amenities: vec![
                "Pool".to_owned(),
                "Spa".to_owned(),
                "Restaurant".to_owned(),
            ],
        };
        self.insert_tenant(&grand)?;
        for (code, name, price_cents, amenities) in [
            (
                "STANDARD_CITY",
                "Standard City Room",
                9_900,
                vec!["Wi-Fi", "TV"],
            ),
            (
                "DELUXE_OCEAN",
                "Ocean View Deluxe",
                15_000,
                vec!["Wi-Fi", "Balcony", "Sea View"],
            ),
            (
                "PRESIDENTIAL",
                "Presidential Suite",
                45_000,
                vec!["Wi-Fi", "Lounge", "Butler"],
            ),
        ] {
            self.insert_room(&Room {
                id: Uuid::new_v4(),
                tenant_id: grand.id,
                code: code.to_owned(),
                name: name.to_owned(),
                price_cents,
                amenities: amenities.into_iter().map(str::to_owned).collect(),
            })?;
        }

        let budget = Tenant {
            id: Uuid::new_v4(),
            slug: "budget-inn".to_owned(),
            name: "Budget Inn".to_owned(),
            timezone: "Asia/Kolkata".to_owned(),
            check_in_time: "13:00".to_owned(),
            check_out_time: "10:00".to_owned(),
            amenities: vec!["Wi-Fi".to_owned()],
        };
        self.insert_tenant(&budget)?;
        self.insert_room(&Room {
            id: Uuid::new_v4(),
            tenant_id: budget.id,
            code: "STANDARD".to_owned(),
            name: "Standard Room".to_owned(),
            price_cents: 3_900,
            amenities: vec!["Wi-Fi".to_owned()],
        })?;

        Ok(())
    }
}

const BOOKING_SELECT: &str = "SELECT id, tenant_id, room_type_id, guest_name, check_in, check_out,
        adults, children, nights, total_price_cents, status, idempotency_key, session_id,
        payment_ref
 FROM bookings";

fn parse_uuid_str(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| KioskError::Store(format!("bad uuid '{s}': {e}")))
}

fn parse_date_str(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| KioskError::Store(format!("bad date '{s}': {e}")))
}

fn column_uuid(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn column_date(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn column_string_list(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

fn row_to_tenant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: column_uuid(row, 0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        timezone: row.get(3)?,
        check_in_time: row.get(4)?,
        check_out_time: row.get(5)?,
        amenities: column_string_list(row, 6)?,
    })
}

fn row_to_room(row: &rusqlite::Row<'_>) -> rusqlite::Result<Room> {
    Ok(Room {
        id: column_uuid(row, 0)?,
        tenant_id: column_uuid(row, 1)?,
        code: row.get(2)?,
        name: row.get(3)?,
        price_cents: row.get(4)?,
        amenities: column_string_list(row, 5)?,
    })
}

fn row_to_booking(row: &rusqlite::Row<'_>) -> rusqlite::Result<Booking> {
    let status_raw: String = row.get(10)?;
    let status = BookingStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            rusqlite::types::Type::Text,
            format!("unknown booking status '{status_raw}'").into(),
        )
    })?;
    Ok(Booking {
        id: column_uuid(row, 0)?,
        tenant_id: column_uuid(row, 1)?,
        room_type_id: column_uuid(row, 2)?,
        guest_name: row.get(3)?,
        check_in: column_date(row, 4)?,
        check_out: column_date(row, 5)?,
        adults: row.get(6)?,
        children: row.get(7)?,
        nights: row.get(8)?,
        total_price_cents: row.get(9)?,
        status,
        idempotency_key: row.get(11)?,
        session_id: row.get(12)?,
        payment_ref: row.get(13)?,
    })
}
