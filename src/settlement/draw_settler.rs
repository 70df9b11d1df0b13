use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::error::{AppError, Result};
use crate::settlement::report::{ExpiryReport, SettlementFailure, SettlementReport};
use crate::state::TicketStore;
use crate::types::{
    Actor, AuditAction, BetType, Draw, DrawStatus, DrawTime, LotteryEvent, NewDraw, StatusChange,
    Ticket, TicketStatus, SYSTEM_ACTOR_ID,
};
use crate::win::{validate_combination, PrizeCalculator, TicketPayout};
use crate::workflow::{guarded_transition, AuditEntry, EventSink, Transition};

enum TicketOutcome {
    /// Already past ISSUED, or moved by a concurrent pass.
    Skipped,
    NoWin,
    Validated(TicketPayout),
}

enum ExpiryOutcome {
    Expired,
    Skipped,
    /// Still ISSUED but holding a hit; left for settlement to validate.
    Winner,
}

pub struct DrawSettler<S> {
    store: Arc<S>,
    prizes: PrizeCalculator,
    events: EventSink,
    latency: Arc<LatencyStats>,
    health: Arc<HealthState>,
    concurrency: usize,
}

impl<S> Clone for DrawSettler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prizes: self.prizes,
            events: self.events.clone(),
            latency: Arc::clone(&self.latency),
            health: Arc::clone(&self.health),
            concurrency: self.concurrency,
        }
    }
}

fn authorize_draw_manager(actor: &Actor) -> Result<()> {
    if actor.role.can_manage_draws() {
        return Ok(());
    }
    Err(AppError::Authorization(format!(
        "role {} cannot manage draws",
        actor.role
    )))
}

impl<S: TicketStore> DrawSettler<S> {
    pub fn new(
        store: Arc<S>,
        prizes: PrizeCalculator,
        events: EventSink,
        latency: Arc<LatencyStats>,
        health: Arc<HealthState>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            prizes,
            events,
            latency,
            health,
            concurrency: concurrency.max(1),
        }
    }

    async fn load_draw(&self, draw_id: i64) -> Result<Draw> {
        self.store
            .find_draw_by_id(draw_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("draw {draw_id}")))
    }

    /// Opens a draw slot for betting. One draw per (date, time).
    pub async fn create_draw(
        &self,
        actor: &Actor,
        draw_date: NaiveDate,
        draw_time: DrawTime,
    ) -> Result<Draw> {
        authorize_draw_manager(actor)?;
        let draw = self
            .store
            .insert_draw(NewDraw {
                draw_date,
                draw_time,
                status: DrawStatus::Open,
            })
            .await?;
        info!(event = "DRAW_OPENED", draw_id = draw.id, %draw_date, %draw_time, "draw opened");
        Ok(draw)
    }

    /// Stops betting on an open draw ahead of its result.
    pub async fn close_draw(&self, actor: &Actor, draw_id: i64) -> Result<Draw> {
        authorize_draw_manager(actor)?;
        let draw = self.load_draw(draw_id).await?;
        match draw.status {
            DrawStatus::Pending | DrawStatus::Open => {
                self.store
                    .update_draw_status(draw_id, DrawStatus::Closed)
                    .await?;
                info!(event = "DRAW_CLOSED", draw_id, "draw closed");
                self.load_draw(draw_id).await
            }
            DrawStatus::Closed => Ok(draw),
            DrawStatus::Completed => Err(AppError::DrawConflict {
                draw_id,
                message: "already completed".to_string(),
            }),
        }
    }

    /// Sets the winning number (write-once) on a closed draw and settles it.
    /// Re-recording the same number re-runs settlement, which skips tickets
    /// already moved.
    pub async fn record_result(
        &self,
        actor: &Actor,
        draw_id: i64,
        winning_number: &str,
    ) -> Result<SettlementReport> {
        authorize_draw_manager(actor)?;
        validate_combination(winning_number, BetType::Standard)?;
        let current = self.load_draw(draw_id).await?;
        if !matches!(current.status, DrawStatus::Closed | DrawStatus::Completed) {
            return Err(AppError::DrawConflict {
                draw_id,
                message: format!(
                    "close the draw before recording a result (draw is {})",
                    current.status
                ),
            });
        }
        if self
            .store
            .set_draw_result(draw_id, winning_number)
            .await?
            .is_none()
        {
            return Err(AppError::DrawConflict {
                draw_id,
                message: format!(
                    "winning number already recorded as {}",
                    current.winning_number.as_deref().unwrap_or("?")
                ),
            });
        }
        info!(event = "DRAW_RESULT", draw_id, winning_number, recorded_by = actor.id, "draw result recorded");
        self.settle(draw_id).await
    }

    /// Validates every winning ISSUED ticket of a completed draw. Each ticket is
    /// independent: a failure is reported and the rest of the draw continues.
    pub async fn settle(&self, draw_id: i64) -> Result<SettlementReport> {
        let draw = self.load_draw(draw_id).await?;
        let Some(winning) = draw.winning_number.clone() else {
            return Err(AppError::DrawConflict {
                draw_id,
                message: "no winning number recorded".to_string(),
            });
        };
        let tickets = self.store.find_tickets_by_draw(draw_id).await?;
        let started = Instant::now();

        let outcomes: Vec<(String, Result<TicketOutcome>)> = stream::iter(tickets)
            .map(|ticket| {
                let settler = self.clone();
                let winning = winning.clone();
                async move {
                    let number = ticket.ticket_number.clone();
                    let t0 = Instant::now();
                    let outcome = settler.settle_ticket(ticket, &winning).await;
                    settler.latency.record(t0.elapsed());
                    (number, outcome)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = SettlementReport::new(draw_id, &winning);
        for (number, outcome) in outcomes {
            match outcome {
                Ok(TicketOutcome::Skipped) => report.skipped += 1,
                Ok(TicketOutcome::NoWin) => {
                    report.evaluated += 1;
                    report.non_winning += 1;
                }
                Ok(TicketOutcome::Validated(payout)) => {
                    report.evaluated += 1;
                    report.newly_validated += 1;
                    for hit in payout.hits {
                        report.add_hit(hit.category, hit.amount);
                    }
                }
                Err(e) => {
                    error!(ticket_number = %number, kind = e.kind(), "settlement failed: {e}");
                    report.evaluated += 1;
                    report.failures.push(SettlementFailure::new(&number, &e));
                }
            }
        }
        report.failures.sort_by(|a, b| a.ticket_number.cmp(&b.ticket_number));

        self.health
            .set_last_settlement_at_ms(u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0));
        info!(
            event = "DRAW_SETTLED",
            draw_id,
            winning_number = %winning,
            evaluated = report.evaluated,
            validated = report.newly_validated,
            skipped = report.skipped,
            failures = report.failures.len(),
            expected_payout = report.expected_payout,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "settlement pass complete"
        );
        Ok(report)
    }

    async fn settle_ticket(&self, ticket: Ticket, winning: &str) -> Result<TicketOutcome> {
        if ticket.status != TicketStatus::Issued {
            return Ok(TicketOutcome::Skipped);
        }
        let wagers = self.store.find_wagers_by_ticket(ticket.id).await?;
        let payout = self.prizes.price_ticket(&wagers, winning)?;
        if !payout.is_win() {
            return Ok(TicketOutcome::NoWin);
        }

        let change = StatusChange {
            prize_amount: Some(payout.total),
            ..StatusChange::default()
        };
        let audit = AuditEntry {
            action: AuditAction::TicketValidated,
            performed_by: SYSTEM_ACTOR_ID,
            details: Some(format!("winning number {winning}")),
        };
        match guarded_transition(
            self.store.as_ref(),
            &ticket,
            TicketStatus::Validated,
            change,
            "settle",
            audit,
        )
        .await?
        {
            Transition::Applied(updated) => {
                self.events.emit(LotteryEvent::TicketSettled {
                    ticket_number: updated.ticket_number,
                    agent_id: updated.agent_id,
                    draw_id: updated.draw_id,
                    winning_number: winning.to_string(),
                    expected_payout: payout.total,
                    settled_at: Utc::now(),
                });
                Ok(TicketOutcome::Validated(payout))
            }
            Transition::Lost(_) => Ok(TicketOutcome::Skipped),
        }
    }

    /// Moves every remaining losing ISSUED ticket of a resulted draw to EXPIRED.
    /// Winners still in ISSUED (a failed or pending settlement) are never expired;
    /// they are listed in the report instead.
    pub async fn expire_unclaimed(&self, actor: &Actor, draw_id: i64) -> Result<ExpiryReport> {
        authorize_draw_manager(actor)?;
        let draw = self.load_draw(draw_id).await?;
        let Some(winning) = draw.winning_number.clone() else {
            return Err(AppError::DrawConflict {
                draw_id,
                message: format!(
                    "cannot expire tickets before a result is recorded (draw is {})",
                    draw.status
                ),
            });
        };

        let tickets = self.store.find_tickets_by_draw(draw_id).await?;
        let actor_id = actor.id;
        let outcomes: Vec<(String, Result<ExpiryOutcome>)> = stream::iter(tickets)
            .map(|ticket| {
                let settler = self.clone();
                let winning = winning.clone();
                async move {
                    let number = ticket.ticket_number.clone();
                    (number, settler.expire_ticket(ticket, &winning, actor_id).await)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = ExpiryReport {
            draw_id,
            ..ExpiryReport::default()
        };
        for (number, outcome) in outcomes {
            match outcome {
                Ok(ExpiryOutcome::Expired) => report.expired += 1,
                Ok(ExpiryOutcome::Skipped) => report.skipped += 1,
                Ok(ExpiryOutcome::Winner) => report.unsettled_winners.push(number),
                Err(e) => report.failures.push(SettlementFailure::new(&number, &e)),
            }
        }
        report.unsettled_winners.sort();
        if !report.unsettled_winners.is_empty() {
            warn!(
                draw_id,
                count = report.unsettled_winners.len(),
                "winning tickets still ISSUED; re-run settlement"
            );
        }
        info!(
            event = "TICKETS_EXPIRED",
            draw_id,
            expired = report.expired,
            skipped = report.skipped,
            unsettled_winners = report.unsettled_winners.len(),
            failures = report.failures.len(),
            "expiry pass complete"
        );
        Ok(report)
    }

    async fn expire_ticket(
        &self,
        ticket: Ticket,
        winning: &str,
        actor_id: i64,
    ) -> Result<ExpiryOutcome> {
        if ticket.status != TicketStatus::Issued {
            return Ok(ExpiryOutcome::Skipped);
        }
        let wagers = self.store.find_wagers_by_ticket(ticket.id).await?;
        let is_winner = match self.prizes.price_ticket(&wagers, winning) {
            Ok(payout) => payout.is_win(),
            // only matching wagers are priced, so a pricing error implies a hit
            Err(_) => true,
        };
        if is_winner {
            return Ok(ExpiryOutcome::Winner);
        }

        let audit = AuditEntry {
            action: AuditAction::TicketExpired,
            performed_by: actor_id,
            details: Some(format!("no hit against {winning}")),
        };
        match guarded_transition(
            self.store.as_ref(),
            &ticket,
            TicketStatus::Expired,
            StatusChange::default(),
            "expire",
            audit,
        )
        .await?
        {
            Transition::Applied(_) => Ok(ExpiryOutcome::Expired),
            Transition::Lost(_) => Ok(ExpiryOutcome::Skipped),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStore;
    use crate::types::{BetLimits, NewTicket, NewWager, Role, WinCategory};
    use tokio::sync::mpsc;

    struct Fixture {
        store: Arc<MemoryStore>,
        settler: DrawSettler<MemoryStore>,
        events: mpsc::Receiver<LotteryEvent>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
        draw: Draw,
    }

    fn admin() -> Actor {
        Actor::new(1, Role::Admin)
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let (tx, rx) = mpsc::channel(64);
        let health = Arc::new(HealthState::new());
        let latency = Arc::new(LatencyStats::new().unwrap());
        let settler = DrawSettler::new(
            Arc::clone(&store),
            PrizeCalculator::default(),
            EventSink::new(tx, Arc::clone(&health)),
            Arc::clone(&latency),
            Arc::clone(&health),
            4,
        );
        let draw = settler
            .create_draw(
                &admin(),
                NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
                DrawTime::NinePm,
            )
            .await
            .unwrap();
        Fixture {
            store,
            settler,
            events: rx,
            health,
            latency,
            draw,
        }
    }

    async fn ticket(f: &Fixture, number: &str, wagers: &[(BetType, &str, f64)]) -> Ticket {
        f.store
            .insert_ticket(
                NewTicket {
                    ticket_number: number.to_string(),
                    total_amount: wagers.iter().map(|w| w.2).sum(),
                    draw_id: f.draw.id,
                    agent_id: 7,
                    issued_at: Utc::now(),
                },
                wagers
                    .iter()
                    .map(|&(bet_type, combo, amount)| NewWager {
                        bet_type,
                        combination: combo.to_string(),
                        amount,
                    })
                    .collect(),
                BetLimits::default(),
            )
            .await
            .unwrap()
            .0
    }

    /// Closes the fixture draw and records `winning`.
    async fn resulted(f: &Fixture, winning: &str) -> SettlementReport {
        f.settler.close_draw(&admin(), f.draw.id).await.unwrap();
        f.settler.record_result(&admin(), f.draw.id, winning).await.unwrap()
    }

    async fn status_of(f: &Fixture, number: &str) -> TicketStatus {
        f.store
            .find_ticket_by_number(number)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn settlement_validates_winners_and_reports_breakdown() {
        let mut f = fixture().await;
        ticket(&f, "10000000000000001", &[(BetType::Standard, "555", 10.0)]).await;
        ticket(&f, "10000000000000002", &[(BetType::Rambolito, "344", 5.0)]).await;
        ticket(&f, "10000000000000003", &[(BetType::Standard, "123", 10.0)]).await;

        let report = resulted(&f, "555").await;
        assert_eq!(report.evaluated, 3);
        assert_eq!(report.newly_validated, 1);
        assert_eq!(report.non_winning, 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.expected_payout, 4500.0);
        let straight = report
            .breakdown
            .iter()
            .find(|t| t.category == WinCategory::Straight)
            .unwrap();
        assert_eq!(straight.wagers, 1);

        assert_eq!(status_of(&f, "10000000000000001").await, TicketStatus::Validated);
        assert_eq!(status_of(&f, "10000000000000002").await, TicketStatus::Issued);
        assert!(matches!(
            f.events.try_recv().unwrap(),
            LotteryEvent::TicketSettled { expected_payout, .. } if expected_payout == 4500.0
        ));
        assert!(f.health.last_settlement_at_ms() > 0);
        assert_eq!(f.latency.len(), 3);

        let draw = f.store.find_draw_by_id(f.draw.id).await.unwrap().unwrap();
        assert_eq!(draw.status, DrawStatus::Completed);
    }

    #[tokio::test]
    async fn rerunning_settlement_is_idempotent() {
        let f = fixture().await;
        let t = ticket(&f, "10000000000000001", &[(BetType::Rambolito, "344", 5.0)]).await;
        let first = resulted(&f, "434").await;
        assert_eq!(first.newly_validated, 1);

        let second = f.settler.record_result(&admin(), f.draw.id, "434").await.unwrap();
        assert_eq!(second.newly_validated, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(second.expected_payout, 0.0);
        assert_eq!(f.store.audit_records(t.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_bad_ticket_does_not_block_the_draw() {
        let f = fixture().await;
        // below the minimum stake: pricing fails for this ticket only
        ticket(&f, "10000000000000001", &[(BetType::Standard, "555", 0.5)]).await;
        ticket(&f, "10000000000000002", &[(BetType::Standard, "555", 2.0)]).await;

        let report = resulted(&f, "555").await;
        assert_eq!(report.newly_validated, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].ticket_number, "10000000000000001");
        assert_eq!(report.failures[0].kind, "validation_error");
        assert_eq!(status_of(&f, "10000000000000002").await, TicketStatus::Validated);
    }

    #[tokio::test]
    async fn result_is_write_once_and_validated() {
        let f = fixture().await;
        assert!(matches!(
            f.settler.record_result(&admin(), f.draw.id, "55").await,
            Err(AppError::Validation(_))
        ));
        resulted(&f, "555").await;
        assert!(matches!(
            f.settler.record_result(&admin(), f.draw.id, "556").await,
            Err(AppError::DrawConflict { .. })
        ));
        assert!(matches!(
            f.settler
                .record_result(&Actor::new(7, Role::AreaCoordinator), f.draw.id, "555")
                .await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            f.settler.record_result(&admin(), 404, "555").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn result_requires_a_closed_draw_and_bets_stop_first() {
        let f = fixture().await;
        ticket(&f, "10000000000000001", &[(BetType::Standard, "555", 1.0)]).await;
        assert!(matches!(
            f.settler.record_result(&admin(), f.draw.id, "555").await,
            Err(AppError::DrawConflict { .. })
        ));
        let draw = f.store.find_draw_by_id(f.draw.id).await.unwrap().unwrap();
        assert_eq!(draw.status, DrawStatus::Open);
        assert!(draw.winning_number.is_none());

        f.settler.close_draw(&admin(), f.draw.id).await.unwrap();
        let late = f
            .store
            .insert_ticket(
                NewTicket {
                    ticket_number: "10000000000000002".to_string(),
                    total_amount: 1.0,
                    draw_id: f.draw.id,
                    agent_id: 7,
                    issued_at: Utc::now(),
                },
                vec![NewWager {
                    bet_type: BetType::Standard,
                    combination: "555".to_string(),
                    amount: 1.0,
                }],
                BetLimits::default(),
            )
            .await;
        assert!(matches!(late, Err(AppError::Validation(_))));

        let report = f.settler.record_result(&admin(), f.draw.id, "555").await.unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.newly_validated, 1);
    }

    #[tokio::test]
    async fn expiry_moves_only_losing_issued_tickets_of_resulted_draws() {
        let f = fixture().await;
        ticket(&f, "10000000000000001", &[(BetType::Standard, "555", 1.0)]).await;
        ticket(&f, "10000000000000002", &[(BetType::Standard, "123", 1.0)]).await;

        assert!(matches!(
            f.settler.expire_unclaimed(&admin(), f.draw.id).await,
            Err(AppError::DrawConflict { .. })
        ));

        resulted(&f, "555").await;
        let report = f.settler.expire_unclaimed(&admin(), f.draw.id).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.unsettled_winners.is_empty());
        assert_eq!(status_of(&f, "10000000000000001").await, TicketStatus::Validated);
        assert_eq!(status_of(&f, "10000000000000002").await, TicketStatus::Expired);

        let again = f.settler.expire_unclaimed(&admin(), f.draw.id).await.unwrap();
        assert_eq!(again.expired, 0);
        assert_eq!(again.skipped, 2);
    }

    #[tokio::test]
    async fn closed_draw_without_result_refuses_expiry_and_winner_survives() {
        let f = fixture().await;
        ticket(&f, "10000000000000001", &[(BetType::Standard, "555", 1.0)]).await;
        let closed = f.settler.close_draw(&admin(), f.draw.id).await.unwrap();
        assert_eq!(closed.status, DrawStatus::Closed);

        assert!(matches!(
            f.settler.expire_unclaimed(&admin(), f.draw.id).await,
            Err(AppError::DrawConflict { .. })
        ));
        assert_eq!(status_of(&f, "10000000000000001").await, TicketStatus::Issued);

        let report = f.settler.record_result(&admin(), f.draw.id, "555").await.unwrap();
        assert_eq!(report.newly_validated, 1);
        assert_eq!(status_of(&f, "10000000000000001").await, TicketStatus::Validated);
    }

    #[tokio::test]
    async fn winner_left_issued_by_failed_settlement_is_not_expired() {
        let f = fixture().await;
        // below the minimum stake: settlement reports it and leaves it ISSUED
        ticket(&f, "10000000000000001", &[(BetType::Standard, "555", 0.5)]).await;
        ticket(&f, "10000000000000002", &[(BetType::Rambolito, "345", 5.0)]).await;
        ticket(&f, "10000000000000003", &[(BetType::Standard, "999", 1.0)]).await;

        let settled = resulted(&f, "555").await;
        assert_eq!(settled.failures.len(), 1);
        assert_eq!(status_of(&f, "10000000000000001").await, TicketStatus::Issued);

        let report = f.settler.expire_unclaimed(&admin(), f.draw.id).await.unwrap();
        assert_eq!(report.expired, 2);
        assert_eq!(report.unsettled_winners, vec!["10000000000000001".to_string()]);
        assert!(report.failures.is_empty());
        assert_eq!(status_of(&f, "10000000000000001").await, TicketStatus::Issued);
        assert_eq!(status_of(&f, "10000000000000002").await, TicketStatus::Expired);
        assert_eq!(status_of(&f, "10000000000000003").await, TicketStatus::Expired);
    }
}
