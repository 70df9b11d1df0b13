use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MAX_REPRINTS;
use crate::error::{AppError, Result};
use crate::identity::{parse_payload, verify_integrity_hash, PrintPayload};
use crate::state::TicketStore;
use crate::types::{
    Actor, AuditAction, ClaimAuditRecord, Draw, LotteryEvent, ReprintRecord, StatusChange, Ticket,
    TicketStatus, Wager,
};
use crate::win::{PrizeCalculator, TicketPayout};
use crate::workflow::{guarded_transition, load_ticket, AuditEntry, EventSink, Transition};

const UNKNOWN_CLAIMER: &str = "Unknown Agent";

/// A ticket as shown to a searching agent or reviewer.
#[derive(Debug, Clone, Serialize)]
pub struct TicketDetails {
    pub ticket: Ticket,
    pub wagers: Vec<Wager>,
    pub draw: Option<Draw>,
    /// Present once the draw has a winning number.
    pub payout: Option<TicketPayout>,
}

/// Claim, approval, rejection and reprint transitions over an injected store.
pub struct ClaimWorkflow<S> {
    store: Arc<S>,
    prizes: PrizeCalculator,
    events: EventSink,
}

impl<S> Clone for ClaimWorkflow<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prizes: self.prizes,
            events: self.events.clone(),
        }
    }
}

fn authorize_ticket_access(actor: &Actor, ticket: &Ticket, action: &str) -> Result<()> {
    if actor.may_act_on(ticket) {
        return Ok(());
    }
    Err(AppError::Authorization(format!(
        "{} {} may not {action} ticket {} issued by agent {}",
        actor.role, actor.id, ticket.ticket_number, ticket.agent_id
    )))
}

fn authorize_reviewer(actor: &Actor) -> Result<()> {
    if actor.role.can_review_claims() {
        return Ok(());
    }
    Err(AppError::Authorization(format!(
        "role {} cannot review claims",
        actor.role
    )))
}

impl<S: TicketStore> ClaimWorkflow<S> {
    pub fn new(store: Arc<S>, prizes: PrizeCalculator, events: EventSink) -> Self {
        Self {
            store,
            prizes,
            events,
        }
    }

    /// Resolves a scanned QR payload to its stored ticket, rejecting tampered payloads.
    pub async fn verify_presentation(&self, payload: &str) -> Result<Ticket> {
        let (ticket_number, _) = parse_payload(payload)?;
        let ticket = load_ticket(self.store.as_ref(), ticket_number).await?;
        verify_integrity_hash(payload, &ticket)?;
        Ok(ticket)
    }

    pub async fn search(&self, ticket_number: &str) -> Result<TicketDetails> {
        let ticket = load_ticket(self.store.as_ref(), ticket_number).await?;
        let wagers = self.store.find_wagers_by_ticket(ticket.id).await?;
        let draw = self.store.find_draw_by_id(ticket.draw_id).await?;
        let payout = match draw.as_ref().and_then(|d| d.winning_number.as_deref()) {
            Some(winning) => Some(self.prizes.price_ticket(&wagers, winning)?),
            None => None,
        };
        Ok(TicketDetails {
            ticket,
            wagers,
            draw,
            payout,
        })
    }

    async fn winnings(&self, ticket: &Ticket) -> Result<TicketPayout> {
        let draw = self
            .store
            .find_draw_by_id(ticket.draw_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("draw {}", ticket.draw_id)))?;
        let Some(winning) = draw.winning_number else {
            return Ok(TicketPayout::default());
        };
        let wagers = self.store.find_wagers_by_ticket(ticket.id).await?;
        self.prizes.price_ticket(&wagers, &winning)
    }

    /// VALIDATED → PENDING_APPROVAL. The claimer is always the owning agent.
    pub async fn request_claim(&self, ticket_number: &str, actor: &Actor) -> Result<Ticket> {
        let ticket = load_ticket(self.store.as_ref(), ticket_number).await?;
        authorize_ticket_access(actor, &ticket, "claim")?;

        match ticket.status {
            TicketStatus::Validated => {}
            TicketStatus::PendingApproval | TicketStatus::Paid | TicketStatus::Cancelled => {
                return Err(AppError::AlreadyClaimed {
                    ticket_number: ticket.ticket_number,
                    status: ticket.status,
                })
            }
            TicketStatus::Issued => {
                // A winner whose draw has not been settled yet is a conflict, not a loser.
                return Err(if self.winnings(&ticket).await?.is_win() {
                    AppError::StateConflict {
                        ticket_number: ticket.ticket_number,
                        status: ticket.status,
                        action: "request claim",
                    }
                } else {
                    AppError::NotWinning(ticket.ticket_number)
                });
            }
            TicketStatus::Expired => {
                return Err(AppError::StateConflict {
                    ticket_number: ticket.ticket_number,
                    status: ticket.status,
                    action: "request claim",
                })
            }
        }

        let payout = self.winnings(&ticket).await?;
        if !payout.is_win() {
            return Err(AppError::NotWinning(ticket.ticket_number));
        }

        let owner = self.store.find_agent(ticket.agent_id).await?;
        let claimer_name = owner
            .as_ref()
            .and_then(|a| a.full_name.clone().or_else(|| Some(a.username.clone())))
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_CLAIMER.to_string());
        let now = Utc::now();
        let change = StatusChange {
            claimer_name: Some(claimer_name),
            claimer_phone: owner.as_ref().and_then(|a| a.phone.clone()),
            claimer_address: owner.as_ref().and_then(|a| a.address.clone()),
            prize_amount: Some(payout.total),
            claimed_at: Some(now),
            approval_requested_at: Some(now),
            ..StatusChange::default()
        };

        let audit = AuditEntry {
            action: AuditAction::ClaimRequested,
            performed_by: actor.id,
            details: Some(format!("expected payout {:.2}", payout.total)),
        };
        match guarded_transition(
            self.store.as_ref(),
            &ticket,
            TicketStatus::PendingApproval,
            change,
            "request claim",
            audit,
        )
        .await?
        {
            Transition::Applied(updated) => {
                info!(
                    event = "CLAIM_REQUESTED",
                    ticket_number = %updated.ticket_number,
                    actor_id = actor.id,
                    prize = payout.total,
                    "claim requested"
                );
                Ok(updated)
            }
            Transition::Lost(current) => Err(match current.status {
                TicketStatus::PendingApproval | TicketStatus::Paid | TicketStatus::Cancelled => {
                    AppError::AlreadyClaimed {
                        ticket_number: current.ticket_number,
                        status: current.status,
                    }
                }
                status => AppError::StateConflict {
                    ticket_number: current.ticket_number,
                    status,
                    action: "request claim",
                },
            }),
        }
    }

    /// PENDING_APPROVAL → PAID. Approving an already paid ticket is a no-op.
    pub async fn approve_claim(
        &self,
        ticket_number: &str,
        approver: &Actor,
        prize_amount: Option<f64>,
    ) -> Result<Ticket> {
        authorize_reviewer(approver)?;
        if let Some(p) = prize_amount {
            if !p.is_finite() || p < 0.0 {
                return Err(AppError::Validation(format!("invalid prize amount {p}")));
            }
        }

        let ticket = load_ticket(self.store.as_ref(), ticket_number).await?;
        if ticket.status == TicketStatus::Paid {
            debug!(ticket_number, "approve on paid ticket ignored");
            return Ok(ticket);
        }

        let prize = match prize_amount.or(ticket.prize_amount) {
            Some(p) => p,
            None => self.winnings(&ticket).await?.total,
        };
        let now = Utc::now();
        let change = StatusChange {
            prize_amount: Some(prize),
            approved_at: Some(now),
            approved_by: Some(approver.id),
            ..StatusChange::default()
        };
        let audit = AuditEntry {
            action: AuditAction::ClaimApproved,
            performed_by: approver.id,
            details: Some(format!("prize {prize:.2}")),
        };

        match guarded_transition(
            self.store.as_ref(),
            &ticket,
            TicketStatus::Paid,
            change,
            "approve claim",
            audit,
        )
        .await?
        {
            Transition::Applied(updated) => {
                info!(
                    event = "CLAIM_APPROVED",
                    ticket_number = %updated.ticket_number,
                    approver_id = approver.id,
                    prize,
                    "claim approved"
                );
                self.events.emit(LotteryEvent::ClaimApproved {
                    ticket_number: updated.ticket_number.clone(),
                    agent_id: updated.agent_id,
                    approved_by: approver.id,
                    prize_amount: prize,
                    approved_at: now,
                });
                Ok(updated)
            }
            Transition::Lost(current) if current.status == TicketStatus::Paid => Ok(current),
            Transition::Lost(current) => Err(AppError::StateConflict {
                ticket_number: current.ticket_number,
                status: current.status,
                action: "approve claim",
            }),
        }
    }

    /// PENDING_APPROVAL → CANCELLED. Rejecting an already cancelled ticket is a no-op.
    pub async fn reject_claim(
        &self,
        ticket_number: &str,
        approver: &Actor,
        reason: &str,
    ) -> Result<Ticket> {
        authorize_reviewer(approver)?;
        let ticket = load_ticket(self.store.as_ref(), ticket_number).await?;
        if ticket.status == TicketStatus::Cancelled {
            debug!(ticket_number, "reject on cancelled ticket ignored");
            return Ok(ticket);
        }

        let reason = reason.trim();
        let audit = AuditEntry {
            action: AuditAction::ClaimRejected,
            performed_by: approver.id,
            details: (!reason.is_empty()).then(|| reason.to_string()),
        };
        match guarded_transition(
            self.store.as_ref(),
            &ticket,
            TicketStatus::Cancelled,
            StatusChange::default(),
            "reject claim",
            audit,
        )
        .await?
        {
            Transition::Applied(updated) => {
                info!(
                    event = "CLAIM_REJECTED",
                    ticket_number = %updated.ticket_number,
                    approver_id = approver.id,
                    reason,
                    "claim rejected"
                );
                Ok(updated)
            }
            Transition::Lost(current) if current.status == TicketStatus::Cancelled => Ok(current),
            Transition::Lost(current) => Err(AppError::StateConflict {
                ticket_number: current.ticket_number,
                status: current.status,
                action: "reject claim",
            }),
        }
    }

    fn reprint_refusal(ticket: Ticket) -> AppError {
        match ticket.status {
            TicketStatus::Paid | TicketStatus::Cancelled => AppError::NotReprintable {
                ticket_number: ticket.ticket_number,
                status: ticket.status,
            },
            status if !status.is_reprintable() => AppError::StateConflict {
                ticket_number: ticket.ticket_number,
                status,
                action: "reprint",
            },
            _ => AppError::ReprintLimitExceeded {
                ticket_number: ticket.ticket_number,
                limit: MAX_REPRINTS,
            },
        }
    }

    /// Increments the reprint counter (hard cap of two), recording who reprinted, and
    /// returns a fresh print payload.
    pub async fn reprint(&self, ticket_number: &str, requester: &Actor) -> Result<PrintPayload> {
        let ticket = load_ticket(self.store.as_ref(), ticket_number).await?;
        authorize_ticket_access(requester, &ticket, "reprint")?;
        if !ticket.status.is_reprintable() || ticket.reprint_count >= MAX_REPRINTS {
            return Err(Self::reprint_refusal(ticket));
        }

        let updated = match self
            .store
            .increment_reprint_count(ticket.id, MAX_REPRINTS, requester.id, Utc::now())
            .await?
        {
            Some(updated) => updated,
            None => {
                let current = load_ticket(self.store.as_ref(), ticket_number).await?;
                return Err(Self::reprint_refusal(current));
            }
        };

        info!(
            event = "TICKET_REPRINTED",
            ticket_number = %updated.ticket_number,
            requester_id = requester.id,
            reprint_count = updated.reprint_count,
            "ticket reprinted"
        );

        let wagers = self.store.find_wagers_by_ticket(updated.id).await?;
        Ok(PrintPayload::build(&updated, &wagers))
    }

    pub async fn audit_trail(&self, ticket_number: &str) -> Result<Vec<ClaimAuditRecord>> {
        let ticket = load_ticket(self.store.as_ref(), ticket_number).await?;
        self.store.audit_records(ticket.id).await
    }

    pub async fn reprint_history(&self, ticket_number: &str) -> Result<Vec<ReprintRecord>> {
        let ticket = load_ticket(self.store.as_ref(), ticket_number).await?;
        self.store.reprint_records(ticket.id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::health::HealthState;
    use crate::identity::qr_payload;
    use crate::state::MemoryStore;
    use crate::types::{
        Agent, BetLimits, BetType, DrawStatus, DrawTime, NewDraw, NewTicket, NewWager, Role,
        SYSTEM_ACTOR_ID,
    };
    use chrono::NaiveDate;
    use tokio::sync::mpsc;

    const OWNER: i64 = 7;

    struct Fixture {
        store: Arc<MemoryStore>,
        workflow: ClaimWorkflow<MemoryStore>,
        events: mpsc::Receiver<LotteryEvent>,
        ticket: Ticket,
        /// Audit records written while walking the ticket to its starting status.
        setup_records: usize,
    }

    impl Fixture {
        /// Audit records written after fixture setup.
        async fn recorded(&self) -> Vec<ClaimAuditRecord> {
            let mut trail = self
                .workflow
                .audit_trail(&self.ticket.ticket_number)
                .await
                .unwrap();
            trail.drain(..self.setup_records);
            trail
        }
    }

    fn agent() -> Actor {
        Actor::new(OWNER, Role::Agent)
    }

    fn admin() -> Actor {
        Actor::new(1, Role::Admin)
    }

    /// One ticket with a standard "555" x10 and a rambolito "344" x5 on a draw
    /// whose winning number is `winning`, in status `status`.
    async fn fixture(winning: Option<&str>, status: TicketStatus) -> Fixture {
        let store = MemoryStore::new();
        let (tx, rx) = mpsc::channel(16);
        let workflow = ClaimWorkflow::new(
            Arc::clone(&store),
            PrizeCalculator::default(),
            EventSink::new(tx, Arc::new(HealthState::new())),
        );
        store
            .upsert_agent(Agent {
                id: OWNER,
                username: "agent7".to_string(),
                full_name: Some("Maria Santos".to_string()),
                phone: Some("09170000000".to_string()),
                address: Some("Cebu City".to_string()),
            })
            .await
            .unwrap();
        let draw = store
            .insert_draw(NewDraw {
                draw_date: NaiveDate::from_ymd_opt(2025, 9, 25).unwrap(),
                draw_time: DrawTime::TwoPm,
                status: DrawStatus::Open,
            })
            .await
            .unwrap();
        let (mut ticket, _) = store
            .insert_ticket(
                NewTicket {
                    ticket_number: "17272416001230042".to_string(),
                    total_amount: 15.0,
                    draw_id: draw.id,
                    agent_id: OWNER,
                    issued_at: Utc::now(),
                },
                vec![
                    NewWager {
                        bet_type: BetType::Standard,
                        combination: "555".to_string(),
                        amount: 10.0,
                    },
                    NewWager {
                        bet_type: BetType::Rambolito,
                        combination: "344".to_string(),
                        amount: 5.0,
                    },
                ],
                BetLimits::default(),
            )
            .await
            .unwrap();
        if let Some(w) = winning {
            store.update_draw_status(draw.id, DrawStatus::Closed).await.unwrap();
            store.set_draw_result(draw.id, w).await.unwrap();
        }
        if status != TicketStatus::Issued {
            ticket = force_status(&store, &ticket, status).await;
        }
        let setup_records = store.audit_records(ticket.id).await.unwrap().len();
        Fixture {
            store,
            workflow,
            events: rx,
            ticket,
            setup_records,
        }
    }

    /// Walks the state machine to `target`, one audited step at a time.
    async fn force_status(store: &MemoryStore, ticket: &Ticket, target: TicketStatus) -> Ticket {
        use TicketStatus::*;
        let path: &[TicketStatus] = match target {
            Issued => &[],
            Validated => &[Validated],
            Expired => &[Expired],
            PendingApproval => &[Validated, PendingApproval],
            Paid => &[Validated, PendingApproval, Paid],
            Cancelled => &[Validated, PendingApproval, Cancelled],
        };
        let mut current = ticket.clone();
        for &next in path {
            let record = ClaimAuditRecord {
                ticket_id: current.id,
                action: AuditAction::TicketValidated,
                performed_by: SYSTEM_ACTOR_ID,
                old_status: current.status,
                new_status: next,
                details: Some("fixture".to_string()),
                timestamp: Utc::now(),
            };
            current = store
                .update_ticket_status(current.id, current.status, next, StatusChange::default(), record)
                .await
                .unwrap()
                .unwrap();
        }
        current
    }

    #[tokio::test]
    async fn full_lifecycle_stamps_timestamps_and_two_audit_records() {
        let mut f = fixture(Some("555"), TicketStatus::Validated).await;

        let pending = f
            .workflow
            .request_claim(&f.ticket.ticket_number, &agent())
            .await
            .unwrap();
        assert_eq!(pending.status, TicketStatus::PendingApproval);
        assert_eq!(pending.claimer_name.as_deref(), Some("Maria Santos"));
        assert_eq!(pending.claimer_address.as_deref(), Some("Cebu City"));
        assert_eq!(pending.prize_amount, Some(4500.0));
        assert!(pending.claimed_at.is_some());
        assert!(pending.approval_requested_at.is_some());

        let paid = f
            .workflow
            .approve_claim(&f.ticket.ticket_number, &admin(), None)
            .await
            .unwrap();
        assert_eq!(paid.status, TicketStatus::Paid);
        assert_eq!(paid.ticket_number, f.ticket.ticket_number);
        assert!(paid.approved_at.is_some());
        assert_eq!(paid.approved_by, Some(1));
        assert!(paid.claimed_at.is_some());

        let trail = f.recorded().await;
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].action, AuditAction::ClaimRequested);
        assert_eq!(trail[0].old_status, TicketStatus::Validated);
        assert_eq!(trail[1].action, AuditAction::ClaimApproved);
        assert_eq!(trail[1].new_status, TicketStatus::Paid);
        assert_eq!(trail[1].performed_by, 1);

        match f.events.try_recv().unwrap() {
            LotteryEvent::ClaimApproved { prize_amount, agent_id, .. } => {
                assert_eq!(prize_amount, 4500.0);
                assert_eq!(agent_id, OWNER);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_claim_outside_validated_never_mutates() {
        let cases = [
            (TicketStatus::Issued, None, "not_winning"),
            (TicketStatus::Issued, Some("555"), "state_conflict"),
            (TicketStatus::PendingApproval, Some("555"), "already_claimed"),
            (TicketStatus::Paid, Some("555"), "already_claimed"),
            (TicketStatus::Cancelled, Some("555"), "already_claimed"),
            (TicketStatus::Expired, Some("000"), "state_conflict"),
        ];
        for (status, winning, kind) in cases {
            let f = fixture(winning, status).await;
            let err = f
                .workflow
                .request_claim(&f.ticket.ticket_number, &agent())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), kind, "{status}");
            let after = f.workflow.search(&f.ticket.ticket_number).await.unwrap();
            assert_eq!(after.ticket, f.ticket, "{status}");
            assert!(f.recorded().await.is_empty());
        }
    }

    #[tokio::test]
    async fn validated_ticket_without_winning_wager_is_not_winning() {
        let f = fixture(Some("000"), TicketStatus::Validated).await;
        let err = f
            .workflow
            .request_claim(&f.ticket.ticket_number, &agent())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotWinning(_)));
    }

    #[tokio::test]
    async fn claim_by_other_agent_is_unauthorized_but_supervisor_may() {
        let f = fixture(Some("434"), TicketStatus::Validated).await;
        let stranger = Actor::new(99, Role::Coordinator);
        assert!(matches!(
            f.workflow.request_claim(&f.ticket.ticket_number, &stranger).await,
            Err(AppError::Authorization(_))
        ));
        let supervisor = Actor::new(50, Role::AreaCoordinator);
        let pending = f
            .workflow
            .request_claim(&f.ticket.ticket_number, &supervisor)
            .await
            .unwrap();
        // 344 rambolito x5 against 434
        assert_eq!(pending.prize_amount, Some(750.0));
    }

    #[tokio::test]
    async fn only_reviewers_approve_or_reject() {
        let f = fixture(Some("555"), TicketStatus::PendingApproval).await;
        for role in [Role::Operator, Role::Agent, Role::Coordinator, Role::AreaCoordinator] {
            let actor = Actor::new(OWNER, role);
            assert!(matches!(
                f.workflow.approve_claim(&f.ticket.ticket_number, &actor, None).await,
                Err(AppError::Authorization(_))
            ));
            assert!(matches!(
                f.workflow.reject_claim(&f.ticket.ticket_number, &actor, "no").await,
                Err(AppError::Authorization(_))
            ));
        }
        let superadmin = Actor::new(2, Role::SuperAdmin);
        let paid = f
            .workflow
            .approve_claim(&f.ticket.ticket_number, &superadmin, Some(4000.0))
            .await
            .unwrap();
        assert_eq!(paid.prize_amount, Some(4000.0));
    }

    #[tokio::test]
    async fn duplicate_approval_is_a_no_op() {
        let f = fixture(Some("555"), TicketStatus::PendingApproval).await;
        let first = f
            .workflow
            .approve_claim(&f.ticket.ticket_number, &admin(), None)
            .await
            .unwrap();
        let second = f
            .workflow
            .approve_claim(&f.ticket.ticket_number, &admin(), None)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(f.recorded().await.len(), 1);
    }

    #[tokio::test]
    async fn approve_after_reject_is_a_conflict() {
        let f = fixture(Some("555"), TicketStatus::PendingApproval).await;
        let cancelled = f
            .workflow
            .reject_claim(&f.ticket.ticket_number, &admin(), "duplicate claim")
            .await
            .unwrap();
        assert_eq!(cancelled.status, TicketStatus::Cancelled);
        let err = f
            .workflow
            .approve_claim(&f.ticket.ticket_number, &admin(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "state_conflict");
        let trail = f.recorded().await;
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].details.as_deref(), Some("duplicate claim"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approve_and_reject_serialize() {
        let f = fixture(Some("555"), TicketStatus::PendingApproval).await;
        let number = f.ticket.ticket_number.clone();
        let (a, b) = (f.workflow.clone(), f.workflow.clone());
        let (n1, n2) = (number.clone(), number.clone());
        let approve = tokio::spawn(async move { a.approve_claim(&n1, &admin(), None).await });
        let reject =
            tokio::spawn(async move { b.reject_claim(&n2, &admin(), "suspicious").await });
        let approve = approve.await.unwrap();
        let reject = reject.await.unwrap();

        assert!(approve.is_ok() != reject.is_ok(), "exactly one transition wins");
        let loser = approve.err().or(reject.err()).unwrap();
        assert_eq!(loser.kind(), "state_conflict");
        assert_eq!(f.recorded().await.len(), 1);
        let final_status = f.workflow.search(&number).await.unwrap().ticket.status;
        assert!(matches!(final_status, TicketStatus::Paid | TicketStatus::Cancelled));
    }

    #[tokio::test]
    async fn third_reprint_fails_and_count_stays_at_two() {
        let f = fixture(None, TicketStatus::Issued).await;
        let first = f.workflow.reprint(&f.ticket.ticket_number, &agent()).await.unwrap();
        assert_eq!(first.reprint_count, 1);
        assert_eq!(first.wagers[0].sequence, 'A');
        assert_eq!(first.wagers[1].sequence, 'B');
        let second = f.workflow.reprint(&f.ticket.ticket_number, &agent()).await.unwrap();
        assert_eq!(second.reprint_count, 2);
        assert_eq!(second.qr_payload, first.qr_payload);

        let err = f
            .workflow
            .reprint(&f.ticket.ticket_number, &agent())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReprintLimitExceeded { limit: 2, .. }));
        let after = f.workflow.search(&f.ticket.ticket_number).await.unwrap();
        assert_eq!(after.ticket.reprint_count, 2);

        let history = f.workflow.reprint_history(&f.ticket.ticket_number).await.unwrap();
        assert_eq!(
            history.iter().map(|r| r.reprint_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reprints_respect_the_cap() {
        let f = fixture(None, TicketStatus::Issued).await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let wf = f.workflow.clone();
            let number = f.ticket.ticket_number.clone();
            handles.push(tokio::spawn(async move { wf.reprint(&number, &agent()).await }));
        }
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert_eq!(e.kind(), "reprint_limit_exceeded"),
            }
        }
        assert_eq!(ok, 2);
        let stored = f.store.find_ticket_by_number(&f.ticket.ticket_number).await.unwrap();
        assert_eq!(stored.unwrap().reprint_count, 2);
    }

    #[tokio::test]
    async fn paid_and_cancelled_tickets_are_not_reprintable() {
        for status in [TicketStatus::Paid, TicketStatus::Cancelled] {
            let f = fixture(Some("555"), status).await;
            let err = f
                .workflow
                .reprint(&f.ticket.ticket_number, &agent())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::NotReprintable { .. }), "{status}");
        }
        let f = fixture(Some("555"), TicketStatus::PendingApproval).await;
        assert_eq!(
            f.workflow
                .reprint(&f.ticket.ticket_number, &agent())
                .await
                .unwrap_err()
                .kind(),
            "state_conflict"
        );
    }

    #[tokio::test]
    async fn reprint_by_non_owner_requires_supervising_role() {
        let f = fixture(None, TicketStatus::Issued).await;
        assert!(matches!(
            f.workflow
                .reprint(&f.ticket.ticket_number, &Actor::new(8, Role::Agent))
                .await,
            Err(AppError::Authorization(_))
        ));
        assert!(f
            .workflow
            .reprint(&f.ticket.ticket_number, &Actor::new(8, Role::Admin))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn presentation_checks_integrity_and_existence() {
        let f = fixture(None, TicketStatus::Issued).await;
        let payload = qr_payload(&f.ticket);
        assert_eq!(f.workflow.verify_presentation(&payload).await.unwrap(), f.ticket);

        let tampered = format!("{}|0000000000000000", f.ticket.ticket_number);
        assert!(matches!(
            f.workflow.verify_presentation(&tampered).await,
            Err(AppError::Integrity(_))
        ));
        assert!(matches!(
            f.workflow
                .verify_presentation("99999999999999999|0123456789abcdef")
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn search_prices_ticket_once_draw_has_result() {
        let f = fixture(None, TicketStatus::Issued).await;
        assert!(f.workflow.search(&f.ticket.ticket_number).await.unwrap().payout.is_none());

        let f = fixture(Some("443"), TicketStatus::Validated).await;
        let details = f.workflow.search(&f.ticket.ticket_number).await.unwrap();
        assert_eq!(details.wagers.len(), 2);
        assert_eq!(details.payout.unwrap().total, 750.0);

        assert!(matches!(
            f.workflow.search("00000000000000001").await,
            Err(AppError::NotFound(_))
        ));
    }
}
