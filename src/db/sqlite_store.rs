use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::db::models::{
    to_millis, AgentRow, AuditRow, DrawRow, ReprintRow, TicketRow, WagerRow, DRAW_COLUMNS,
    TICKET_COLUMNS,
};
use crate::error::{AppError, Result};
use crate::state::TicketStore;
use crate::types::{
    Agent, BetLimits, ClaimAuditRecord, Draw, DrawStatus, NewDraw, NewTicket, NewWager,
    ReprintRecord, StatusChange, Ticket, TicketStatus, Wager,
};

/// SQLite-backed storage port. Conditional writes are single `UPDATE ... WHERE`
/// statements, so the condition and the write happen atomically in the database;
/// the history row they produce is written in the same transaction.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }

    async fn ticket_exists(&self, ticket_id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM tickets WHERE id = ?")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Explains why a conditional ticket insert wrote nothing.
    async fn closed_draw_error(&self, draw_id: i64) -> Result<AppError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM draws WHERE id = ?")
            .bind(draw_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match status {
            Some(status) => AppError::Validation(format!(
                "draw {draw_id} is {status}, not open for betting"
            )),
            None => AppError::NotFound(format!("draw {draw_id}")),
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn append_audit_record(conn: &mut SqliteConnection, record: &ClaimAuditRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO claims_audit (
            ticket_id, action, performed_by, old_status, new_status, details, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.ticket_id)
    .bind(record.action.as_str())
    .bind(record.performed_by)
    .bind(record.old_status.as_str())
    .bind(record.new_status.as_str())
    .bind(&record.details)
    .bind(to_millis(record.timestamp))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn append_reprint_record(conn: &mut SqliteConnection, record: &ReprintRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO ticket_reprints (ticket_id, reprinted_by, reprint_number, created_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(record.ticket_id)
    .bind(record.reprinted_by)
    .bind(i64::from(record.reprint_number))
    .bind(to_millis(record.timestamp))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl TicketStore for SqliteStore {
    async fn find_ticket_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_number = ?");
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(ticket_number)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Ticket::try_from).transpose()
    }

    async fn find_tickets_by_draw(&self, draw_id: i64) -> Result<Vec<Ticket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE draw_id = ? ORDER BY id");
        let rows = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(draw_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn find_wagers_by_ticket(&self, ticket_id: i64) -> Result<Vec<Wager>> {
        let rows = sqlx::query_as::<_, WagerRow>(
            "SELECT id, ticket_id, bet_type, bet_combination, bet_amount \
             FROM wagers WHERE ticket_id = ? ORDER BY id",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Wager::try_from).collect()
    }

    async fn find_draw_by_id(&self, draw_id: i64) -> Result<Option<Draw>> {
        let sql = format!("SELECT {DRAW_COLUMNS} FROM draws WHERE id = ?");
        let row = sqlx::query_as::<_, DrawRow>(&sql)
            .bind(draw_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Draw::try_from).transpose()
    }

    async fn find_agent(&self, agent_id: i64) -> Result<Option<Agent>> {
        let row = sqlx::query_as::<_, AgentRow>(
            "SELECT id, username, full_name, phone, address FROM agents WHERE id = ?",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Agent::from))
    }

    async fn upsert_agent(&self, agent: Agent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, username, full_name, phone, address)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                full_name = excluded.full_name,
                phone = excluded.phone,
                address = excluded.address
            "#,
        )
        .bind(agent.id)
        .bind(&agent.username)
        .bind(&agent.full_name)
        .bind(&agent.phone)
        .bind(&agent.address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_ticket(
        &self,
        ticket: NewTicket,
        wagers: Vec<NewWager>,
        limits: BetLimits,
    ) -> Result<(Ticket, Vec<Wager>)> {
        for w in &wagers {
            if let Some(cap) = limits.cap(w.bet_type).filter(|&cap| w.amount > cap) {
                return Err(BetLimits::sold_out(ticket.draw_id, w.bet_type, &w.combination, cap));
            }
        }

        let mut tx = self.pool.begin().await?;

        // The insert is the transaction's first write, so closing the draw waits for commit.
        let sql = format!(
            "INSERT INTO tickets (ticket_number, status, total_amount, draw_id, agent_id, issued_at) \
             SELECT ?, ?, ?, ?, ?, ? \
             WHERE EXISTS (SELECT 1 FROM draws WHERE id = ? AND status = ?) \
             RETURNING {TICKET_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(&ticket.ticket_number)
            .bind(TicketStatus::Issued.as_str())
            .bind(ticket.total_amount)
            .bind(ticket.draw_id)
            .bind(ticket.agent_id)
            .bind(to_millis(ticket.issued_at))
            .bind(ticket.draw_id)
            .bind(DrawStatus::Open.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::DuplicateTicketNumber(ticket.ticket_number.clone())
                } else {
                    AppError::Database(e)
                }
            })?;
        let Some(row) = row else {
            drop(tx);
            return Err(self.closed_draw_error(ticket.draw_id).await?);
        };
        let stored = Ticket::try_from(row)?;

        let mut stored_wagers = Vec::with_capacity(wagers.len());
        for w in wagers {
            let cap = limits.cap(w.bet_type);
            let within_limit: Option<f64> = sqlx::query_scalar(
                r#"
                INSERT INTO bet_totals (draw_id, bet_type, bet_combination, total_amount)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(draw_id, bet_type, bet_combination) DO UPDATE SET
                    total_amount = bet_totals.total_amount + excluded.total_amount
                WHERE ? IS NULL OR bet_totals.total_amount + excluded.total_amount <= ?
                RETURNING total_amount
                "#,
            )
            .bind(stored.draw_id)
            .bind(w.bet_type.to_string())
            .bind(&w.combination)
            .bind(w.amount)
            .bind(cap)
            .bind(cap)
            .fetch_optional(&mut *tx)
            .await?;
            if let (None, Some(cap)) = (within_limit, cap) {
                return Err(BetLimits::sold_out(stored.draw_id, w.bet_type, &w.combination, cap));
            }

            let row = sqlx::query_as::<_, WagerRow>(
                "INSERT INTO wagers (ticket_id, bet_type, bet_combination, bet_amount) \
                 VALUES (?, ?, ?, ?) \
                 RETURNING id, ticket_id, bet_type, bet_combination, bet_amount",
            )
            .bind(stored.id)
            .bind(w.bet_type.to_string())
            .bind(&w.combination)
            .bind(w.amount)
            .fetch_one(&mut *tx)
            .await?;
            stored_wagers.push(Wager::try_from(row)?);
        }

        tx.commit().await?;
        Ok((stored, stored_wagers))
    }

    async fn update_ticket_status(
        &self,
        ticket_id: i64,
        expected: TicketStatus,
        next: TicketStatus,
        change: StatusChange,
        audit: ClaimAuditRecord,
    ) -> Result<Option<Ticket>> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            r#"
            UPDATE tickets SET
                status = ?,
                claimer_name = COALESCE(?, claimer_name),
                claimer_phone = COALESCE(?, claimer_phone),
                claimer_address = COALESCE(?, claimer_address),
                prize_amount = COALESCE(?, prize_amount),
                claimed_at = COALESCE(?, claimed_at),
                approval_requested_at = COALESCE(?, approval_requested_at),
                approved_at = COALESCE(?, approved_at),
                approved_by = COALESCE(?, approved_by)
            WHERE id = ? AND status = ?
            RETURNING {TICKET_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(next.as_str())
            .bind(&change.claimer_name)
            .bind(&change.claimer_phone)
            .bind(&change.claimer_address)
            .bind(change.prize_amount)
            .bind(change.claimed_at.map(to_millis))
            .bind(change.approval_requested_at.map(to_millis))
            .bind(change.approved_at.map(to_millis))
            .bind(change.approved_by)
            .bind(ticket_id)
            .bind(expected.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        match row {
            Some(row) => {
                let updated = Ticket::try_from(row)?;
                append_audit_record(&mut *tx, &audit).await?;
                tx.commit().await?;
                Ok(Some(updated))
            }
            None => {
                drop(tx);
                if self.ticket_exists(ticket_id).await? {
                    Ok(None)
                } else {
                    Err(AppError::NotFound(format!("ticket id {ticket_id}")))
                }
            }
        }
    }

    async fn increment_reprint_count(
        &self,
        ticket_id: i64,
        max: u8,
        reprinted_by: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Ticket>> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "UPDATE tickets SET reprint_count = reprint_count + 1 \
             WHERE id = ? AND reprint_count < ? AND status IN (?, ?) \
             RETURNING {TICKET_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TicketRow>(&sql)
            .bind(ticket_id)
            .bind(i64::from(max))
            .bind(TicketStatus::Issued.as_str())
            .bind(TicketStatus::Validated.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        match row {
            Some(row) => {
                let updated = Ticket::try_from(row)?;
                append_reprint_record(
                    &mut *tx,
                    &ReprintRecord {
                        ticket_id,
                        reprinted_by,
                        reprint_number: updated.reprint_count,
                        timestamp: at,
                    },
                )
                .await?;
                tx.commit().await?;
                Ok(Some(updated))
            }
            None => {
                drop(tx);
                if self.ticket_exists(ticket_id).await? {
                    Ok(None)
                } else {
                    Err(AppError::NotFound(format!("ticket id {ticket_id}")))
                }
            }
        }
    }

    async fn audit_records(&self, ticket_id: i64) -> Result<Vec<ClaimAuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT ticket_id, action, performed_by, old_status, new_status, details, created_at \
             FROM claims_audit WHERE ticket_id = ? ORDER BY id",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ClaimAuditRecord::try_from).collect()
    }

    async fn reprint_records(&self, ticket_id: i64) -> Result<Vec<ReprintRecord>> {
        let rows = sqlx::query_as::<_, ReprintRow>(
            "SELECT ticket_id, reprinted_by, reprint_number, created_at \
             FROM ticket_reprints WHERE ticket_id = ? ORDER BY id",
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReprintRecord::try_from).collect()
    }

    async fn insert_draw(&self, draw: NewDraw) -> Result<Draw> {
        let sql = format!(
            "INSERT INTO draws (draw_date, draw_time, status) VALUES (?, ?, ?) \
             RETURNING {DRAW_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DrawRow>(&sql)
            .bind(draw.draw_date.format("%Y-%m-%d").to_string())
            .bind(draw.draw_time.as_str())
            .bind(draw.status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Validation(format!(
                        "a {} draw already exists for {}",
                        draw.draw_time, draw.draw_date
                    ))
                } else {
                    AppError::Database(e)
                }
            })?;
        Draw::try_from(row)
    }

    async fn set_draw_result(&self, draw_id: i64, winning_number: &str) -> Result<Option<Draw>> {
        let sql = format!(
            "UPDATE draws SET winning_number = ?, status = ? \
             WHERE id = ? AND status IN (?, ?) \
             AND (winning_number IS NULL OR winning_number = ?) \
             RETURNING {DRAW_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DrawRow>(&sql)
            .bind(winning_number)
            .bind(DrawStatus::Completed.as_str())
            .bind(draw_id)
            .bind(DrawStatus::Closed.as_str())
            .bind(DrawStatus::Completed.as_str())
            .bind(winning_number)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = row {
            return Ok(Some(Draw::try_from(row)?));
        }

        let Some(draw) = self.find_draw_by_id(draw_id).await? else {
            return Err(AppError::NotFound(format!("draw {draw_id}")));
        };
        if !matches!(draw.status, DrawStatus::Closed | DrawStatus::Completed) {
            return Err(AppError::DrawConflict {
                draw_id,
                message: format!("cannot record a result while the draw is {}", draw.status),
            });
        }
        Ok(None)
    }

    async fn update_draw_status(&self, draw_id: i64, status: DrawStatus) -> Result<()> {
        let result = sqlx::query("UPDATE draws SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(draw_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("draw {draw_id}")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{AuditAction, BetType, DrawTime};
    use chrono::{NaiveDate, TimeZone};
    use sqlx::sqlite::SqlitePoolOptions;

    /// Single-connection in-memory database: every pooled connection would
    /// otherwise get its own empty database.
    pub(crate) async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn wager(bet_type: BetType, combo: &str, amount: f64) -> NewWager {
        NewWager {
            bet_type,
            combination: combo.to_string(),
            amount,
        }
    }

    fn new_ticket(number: &str, draw_id: i64) -> NewTicket {
        NewTicket {
            ticket_number: number.to_string(),
            total_amount: 15.0,
            draw_id,
            agent_id: 4,
            issued_at: Utc.timestamp_millis_opt(1_727_241_600_123).unwrap(),
        }
    }

    fn audit(ticket: &Ticket, next: TicketStatus) -> ClaimAuditRecord {
        ClaimAuditRecord {
            ticket_id: ticket.id,
            action: AuditAction::TicketValidated,
            performed_by: 0,
            old_status: ticket.status,
            new_status: next,
            details: Some("winning number 555".to_string()),
            timestamp: Utc.timestamp_millis_opt(1_727_300_000_000).unwrap(),
        }
    }

    async fn seeded() -> (Arc<SqliteStore>, Draw, Ticket) {
        let store = SqliteStore::new(memory_pool().await);
        let draw = store
            .insert_draw(NewDraw {
                draw_date: NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
                draw_time: DrawTime::TwoPm,
                status: DrawStatus::Open,
            })
            .await
            .unwrap();
        let (ticket, _) = store
            .insert_ticket(
                new_ticket("17272416001230042", draw.id),
                vec![
                    wager(BetType::Standard, "555", 10.0),
                    wager(BetType::Rambolito, "344", 5.0),
                ],
                BetLimits::default(),
            )
            .await
            .unwrap();
        (store, draw, ticket)
    }

    #[tokio::test]
    async fn ticket_and_wagers_round_trip() {
        let (store, draw, ticket) = seeded().await;
        let found = store
            .find_ticket_by_number("17272416001230042")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, ticket);
        assert_eq!(found.issued_at.timestamp_millis(), 1_727_241_600_123);

        let wagers = store.find_wagers_by_ticket(ticket.id).await.unwrap();
        assert_eq!(wagers.len(), 2);
        assert_eq!(wagers[1].bet_type, BetType::Rambolito);
        assert_eq!(wagers[1].combination, "344");

        let by_draw = store.find_tickets_by_draw(draw.id).await.unwrap();
        assert_eq!(by_draw.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_ticket_number_maps_to_retry_signal() {
        let (store, draw, _) = seeded().await;
        let err = store
            .insert_ticket(
                new_ticket("17272416001230042", draw.id),
                vec![],
                BetLimits::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateTicketNumber(_)));
    }

    #[tokio::test]
    async fn insert_is_refused_once_the_draw_leaves_open() {
        let (store, draw, _) = seeded().await;
        store.update_draw_status(draw.id, DrawStatus::Closed).await.unwrap();
        assert!(matches!(
            store
                .insert_ticket(
                    new_ticket("17272416001230043", draw.id),
                    vec![wager(BetType::Standard, "123", 1.0)],
                    BetLimits::default(),
                )
                .await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            store
                .insert_ticket(
                    new_ticket("17272416001230044", 404),
                    vec![wager(BetType::Standard, "123", 1.0)],
                    BetLimits::default(),
                )
                .await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(store.find_tickets_by_draw(draw.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sold_out_number_rolls_back_the_whole_ticket() {
        let (store, draw, _) = seeded().await;
        let limits = BetLimits {
            standard: Some(25.0),
            rambolito: None,
        };
        // seeded ticket already holds 10 on standard 555
        store
            .insert_ticket(
                new_ticket("17272416001230043", draw.id),
                vec![wager(BetType::Standard, "555", 15.0)],
                limits,
            )
            .await
            .unwrap();

        let err = store
            .insert_ticket(
                new_ticket("17272416001230044", draw.id),
                vec![
                    wager(BetType::Standard, "123", 5.0),
                    wager(BetType::Standard, "555", 1.0),
                ],
                limits,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("sold out")), "{err}");
        assert!(store
            .find_ticket_by_number("17272416001230044")
            .await
            .unwrap()
            .is_none());

        // the rolled-back 123 stake is not counted
        store
            .insert_ticket(
                new_ticket("17272416001230045", draw.id),
                vec![wager(BetType::Standard, "123", 25.0)],
                limits,
            )
            .await
            .unwrap();
        assert!(store
            .insert_ticket(
                new_ticket("17272416001230046", draw.id),
                vec![wager(BetType::Standard, "777", 26.0)],
                limits,
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn conditional_status_update_writes_one_audit_row() {
        let (store, _, ticket) = seeded().await;
        let stale = store
            .update_ticket_status(
                ticket.id,
                TicketStatus::PendingApproval,
                TicketStatus::Paid,
                StatusChange::default(),
                audit(&ticket, TicketStatus::Paid),
            )
            .await
            .unwrap();
        assert!(stale.is_none());
        assert!(store.audit_records(ticket.id).await.unwrap().is_empty());

        let now = Utc.timestamp_millis_opt(1_727_300_000_000).unwrap();
        let updated = store
            .update_ticket_status(
                ticket.id,
                TicketStatus::Issued,
                TicketStatus::Validated,
                StatusChange {
                    claimed_at: Some(now),
                    ..StatusChange::default()
                },
                audit(&ticket, TicketStatus::Validated),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, TicketStatus::Validated);
        assert_eq!(updated.claimed_at, Some(now));
        let trail = store.audit_records(ticket.id).await.unwrap();
        assert_eq!(trail, vec![audit(&ticket, TicketStatus::Validated)]);

        assert!(matches!(
            store
                .update_ticket_status(
                    9_999,
                    TicketStatus::Issued,
                    TicketStatus::Validated,
                    StatusChange::default(),
                    audit(&ticket, TicketStatus::Validated),
                )
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_audit_write_leaves_status_unchanged() {
        let (store, _, ticket) = seeded().await;
        sqlx::query("DROP TABLE claims_audit")
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store
            .update_ticket_status(
                ticket.id,
                TicketStatus::Issued,
                TicketStatus::Validated,
                StatusChange::default(),
                audit(&ticket, TicketStatus::Validated),
            )
            .await
            .is_err());
        let stored = store.find_ticket_by_number(&ticket.ticket_number).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Issued);
    }

    #[tokio::test]
    async fn reprint_increment_respects_cap_and_records_history() {
        let (store, _, ticket) = seeded().await;
        let at = Utc.timestamp_millis_opt(1_727_300_000_000).unwrap();
        for expected in [1, 2] {
            let updated = store
                .increment_reprint_count(ticket.id, 2, 4, at)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(updated.reprint_count, expected);
        }
        assert!(store
            .increment_reprint_count(ticket.id, 2, 4, at)
            .await
            .unwrap()
            .is_none());

        let history = store.reprint_records(ticket.id).await.unwrap();
        assert_eq!(
            history.iter().map(|r| r.reprint_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(history[0].timestamp, at);
    }

    #[tokio::test]
    async fn failed_reprint_record_leaves_counter_unchanged() {
        let (store, _, ticket) = seeded().await;
        sqlx::query("DROP TABLE ticket_reprints")
            .execute(&store.pool)
            .await
            .unwrap();

        assert!(store
            .increment_reprint_count(ticket.id, 2, 4, Utc::now())
            .await
            .is_err());
        let stored = store.find_ticket_by_number(&ticket.ticket_number).await.unwrap().unwrap();
        assert_eq!(stored.reprint_count, 0);
    }

    #[tokio::test]
    async fn agents_upsert_by_id() {
        let store = SqliteStore::new(memory_pool().await);
        let mut agent = Agent {
            id: 4,
            username: "agent4".to_string(),
            full_name: None,
            phone: None,
            address: Some("Davao".to_string()),
        };
        store.upsert_agent(agent.clone()).await.unwrap();
        agent.full_name = Some("Jose Reyes".to_string());
        store.upsert_agent(agent.clone()).await.unwrap();
        assert_eq!(store.find_agent(4).await.unwrap(), Some(agent));
        assert!(store.find_agent(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn draw_result_is_write_once() {
        let (store, draw, _) = seeded().await;
        assert!(matches!(
            store.set_draw_result(draw.id, "555").await,
            Err(AppError::DrawConflict { .. })
        ));
        store.update_draw_status(draw.id, DrawStatus::Closed).await.unwrap();
        let set = store.set_draw_result(draw.id, "555").await.unwrap().unwrap();
        assert_eq!(set.status, DrawStatus::Completed);
        assert!(store.set_draw_result(draw.id, "555").await.unwrap().is_some());
        assert!(store.set_draw_result(draw.id, "556").await.unwrap().is_none());
        assert!(matches!(
            store.set_draw_result(404, "555").await,
            Err(AppError::NotFound(_))
        ));
    }
}
