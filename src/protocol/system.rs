//! Tranche protocol - orchestration of one senior vault and its tranches.
//!
//! The orchestrator plays the asset custodian: it keeps the senior value
//! ledger in step with every operation, routes spillover out of senior and
//! backstop receipts into it, and emits one event per committed change.
//! Every public operation is all-or-nothing.

use tracing::{info, warn};

use crate::core::config::VaultConfig;
use crate::core::shares::ensure_within_cap;
use crate::core::vault::{SeniorVault, WithdrawalReceipt};
use crate::deposits::{Approval, PendingDepositQueue, Refund};
use crate::error::Result;
use crate::protocol::events::*;
use crate::rebase::{
    backing_ratio, BackstopOutcome, BackstopProvider, Counterparties, RebaseEngine, RebaseOutcome,
    RebasePreview, SeniorValue, TranchePool, ValueSource,
};
use crate::storage::backend::StorageBackend;
use crate::storage::state::StateManager;
use crate::utils::constants::MAX_EVENT_LOG;
use crate::utils::ids::{AccountId, TokenId};
use crate::utils::math::{safe_add, Amount, Rate, Shares};

// ═══════════════════════════════════════════════════════════════════════════════
// TRANCHE PROTOCOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Senior vault, junior and reserve tranches, and the pending deposit queue
pub struct TrancheProtocol<B: StorageBackend> {
    /// Persistence
    state_manager: StateManager<B>,
    /// Rebase engine (owns the config)
    engine: RebaseEngine,
    /// Senior share ledger
    vault: SeniorVault,
    /// Senior asset value
    senior_value: SeniorValue,
    /// First-loss tranche
    junior: TranchePool,
    /// Primary backstop tranche
    reserve: TranchePool,
    /// LP deposits awaiting approval
    queue: PendingDepositQueue,
    /// Events not yet drained
    event_log: EventLog,
}

impl<B: StorageBackend> TrancheProtocol<B> {
    /// Open the protocol over `backend`, resuming any persisted state.
    ///
    /// A config saved in the backend takes precedence over `config`.
    pub fn open(config: VaultConfig, treasury: AccountId, backend: B, now: u64) -> Result<Self> {
        let state_manager = StateManager::new(backend);
        let config = state_manager.load_config()?.unwrap_or(config);
        let engine = RebaseEngine::new(config.clone())?;

        let (vault, value) = match state_manager.load_vault(&config)? {
            Some(loaded) => loaded,
            None => (SeniorVault::new(&config, treasury, now), 0),
        };
        let junior = state_manager
            .load_tranche("junior")?
            .unwrap_or_else(|| TranchePool::junior(0, config.junior_backstop_capacity_bps));
        let reserve = state_manager
            .load_tranche("reserve")?
            .unwrap_or_else(|| TranchePool::reserve(0));
        let queue = state_manager.load_queue(config.pending_deposit_expiry)?;

        info!(
            epoch = vault.epoch(),
            accounts = vault.accounts().len(),
            pending = queue.pending().count(),
            "Tranche protocol opened"
        );

        Ok(Self {
            state_manager,
            engine,
            vault,
            senior_value: SeniorValue::new(value),
            junior,
            reserve,
            queue,
            event_log: EventLog::new(),
        })
    }

    /// Persist everything and flush
    pub fn save(&self) -> Result<()> {
        self.state_manager.save_config(self.engine.config())?;
        self.state_manager
            .save_vault(&self.vault, self.senior_value.current_value())?;
        self.state_manager.save_queue(&self.queue)?;
        self.state_manager.save_tranche(&self.junior)?;
        self.state_manager.save_tranche(&self.reserve)?;
        self.state_manager.flush()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REBASE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Run the epoch's rebase.
    ///
    /// The tranches are checkpointed first and restored if any step fails,
    /// so a failed rebase leaves no trace. A backstop shortfall is not a
    /// failure: it is logged and reported through the outcome and events.
    pub fn rebase(&mut self, now: u64) -> Result<RebaseOutcome> {
        let junior_checkpoint = self.junior.clone();
        let reserve_checkpoint = self.reserve.clone();

        match self.try_rebase(now) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.junior = junior_checkpoint;
                self.reserve = reserve_checkpoint;
                warn!(error = %e, "Rebase rolled back");
                Err(e)
            }
        }
    }

    fn try_rebase(&mut self, now: u64) -> Result<RebaseOutcome> {
        let outcome = self.engine.execute(
            &self.vault,
            now,
            &self.senior_value,
            Counterparties::new(&mut self.junior, &mut self.reserve),
        )?;

        // Stage the value movement before anything is committed
        let mut staged_value = self.senior_value;
        if let Some(split) = outcome.preview.spillover {
            staged_value.debit(safe_add(split.to_junior, split.to_reserve)?)?;
        }
        if let Some(backstop) = outcome.backstop {
            staged_value.credit(backstop.provided())?;
        }

        self.engine.commit(&mut self.vault, &outcome)?;
        self.senior_value = staged_value;

        if let Some(backstop) = outcome.backstop {
            if let Err(e) = backstop.ensure_restored() {
                warn!(epoch = outcome.preview.epoch, error = %e, "Senior absorbs backstop shortfall");
            }
        }
        self.emit_rebase_events(&outcome, now);
        Ok(outcome)
    }

    /// Preview the rebase and the waterfall it would run, touching nothing
    pub fn preview_rebase(&self, now: u64) -> Result<(RebasePreview, Option<BackstopOutcome>)> {
        let preview = self.engine.simulate_rebase(
            self.vault.state(),
            now,
            self.senior_value.current_value(),
        )?;
        let plan = preview.plan_backstop(
            self.reserve.backstop_capacity(),
            self.junior.backstop_capacity(),
        );
        Ok((preview, plan))
    }

    fn emit_rebase_events(&mut self, outcome: &RebaseOutcome, now: u64) {
        let epoch = outcome.preview.epoch;
        self.emit(ProtocolEvent::RebaseExecuted(RebaseExecutedEvent::from(outcome)));
        if let Some(split) = outcome.preview.spillover {
            self.emit(ProtocolEvent::SpilloverRouted(SpilloverRoutedEvent {
                epoch,
                to_junior: split.to_junior,
                to_reserve: split.to_reserve,
                timestamp: now,
            }));
        }
        if let Some(backstop) = &outcome.backstop {
            self.emit(ProtocolEvent::BackstopExecuted(BackstopExecutedEvent::new(
                epoch, backstop, now,
            )));
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SENIOR OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit `amount` of value into senior, capped by reserve value
    pub fn deposit_senior(&mut self, account: AccountId, amount: Amount, now: u64) -> Result<Shares> {
        let mut staged_value = self.senior_value;
        staged_value.credit(amount)?;
        let shares = self.vault.deposit(account, amount, self.reserve.value)?;
        self.senior_value = staged_value;

        self.emit(ProtocolEvent::SeniorDeposited(SeniorDepositedEvent {
            account,
            amount,
            shares,
            timestamp: now,
        }));
        Ok(shares)
    }

    /// Withdraw `amount` of balance; the net after penalty leaves the vault
    pub fn withdraw_senior(&mut self, account: AccountId, amount: Amount, now: u64) -> Result<WithdrawalReceipt> {
        let quote = self.vault.quote_withdrawal(&account, amount, now)?;
        let mut staged_value = self.senior_value;
        staged_value.debit(quote.net)?;

        let receipt = self.vault.withdraw(account, amount, now)?;
        self.senior_value = staged_value;

        self.emit(ProtocolEvent::SeniorWithdrawn(SeniorWithdrawnEvent {
            account,
            gross: receipt.quote.gross,
            penalty: receipt.quote.penalty,
            shares_burned: receipt.shares_burned,
            timestamp: now,
        }));
        Ok(receipt)
    }

    /// Start the cooldown clock for `account`
    pub fn initiate_cooldown(&mut self, account: AccountId, now: u64) -> Result<u64> {
        self.vault.initiate_cooldown(account, now)?;
        let completes_at = now.saturating_add(self.engine.config().cooldown_period);
        self.emit(ProtocolEvent::CooldownInitiated(CooldownInitiatedEvent {
            account,
            completes_at,
            timestamp: now,
        }));
        Ok(completes_at)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PENDING DEPOSITS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Queue an LP deposit
    pub fn deposit_lp(&mut self, depositor: AccountId, token: TokenId, amount: Amount, now: u64) -> Result<u64> {
        let id = self.queue.deposit_lp(depositor, token, amount, now)?;
        let expires_at = self.queue.get(id).map(|d| d.expires_at).unwrap_or(now);
        self.emit(ProtocolEvent::PendingDepositCreated(PendingDepositCreatedEvent {
            id,
            depositor,
            token,
            amount,
            expires_at,
            timestamp: now,
        }));
        Ok(id)
    }

    /// Approve an LP deposit at `price`, crediting senior shares to its depositor.
    ///
    /// The entry only becomes `Approved` once the shares are credited; any
    /// failure leaves the queue, vault and senior value as they were.
    pub fn approve_lp_deposit(&mut self, id: u64, price: Rate, now: u64) -> Result<Approval> {
        let approval = self
            .queue
            .prepare_approval(id, price, self.vault.index(), now)?;
        let cap = self.vault.deposit_cap(self.reserve.value)?;
        ensure_within_cap(self.vault.total_supply()?, approval.value, cap)?;

        let mut staged_value = self.senior_value;
        staged_value.credit(approval.value)?;

        let checkpoint = self.vault.clone();
        self.vault.credit_shares(approval.depositor, approval.shares)?;
        if let Err(e) = self.queue.mark_approved(&approval, now) {
            self.vault = checkpoint;
            return Err(e);
        }
        self.senior_value = staged_value;

        self.emit(ProtocolEvent::PendingDepositApproved(PendingDepositApprovedEvent {
            id,
            depositor: approval.depositor,
            price,
            value: approval.value,
            shares: approval.shares,
            timestamp: now,
        }));
        Ok(approval)
    }

    /// Reject an LP deposit
    pub fn reject_lp_deposit(&mut self, id: u64, reason: impl Into<String>, now: u64) -> Result<Refund> {
        let refund = self.queue.reject_lp_deposit(id, reason, now)?;
        self.emit(ProtocolEvent::PendingDepositRejected(PendingDepositRefundedEvent {
            refund,
            timestamp: now,
        }));
        Ok(refund)
    }

    /// Depositor cancels an LP deposit
    pub fn cancel_pending_deposit(&mut self, id: u64, caller: AccountId, now: u64) -> Result<Refund> {
        let refund = self.queue.cancel_pending_deposit(id, caller, now)?;
        self.emit(ProtocolEvent::PendingDepositCancelled(PendingDepositRefundedEvent {
            refund,
            timestamp: now,
        }));
        Ok(refund)
    }

    /// Anyone expires an undecided LP deposit
    pub fn claim_expired_deposit(&mut self, id: u64, now: u64) -> Result<Refund> {
        let refund = self.queue.claim_expired_deposit(id, now)?;
        self.emit(ProtocolEvent::PendingDepositExpired(PendingDepositRefundedEvent {
            refund,
            timestamp: now,
        }));
        Ok(refund)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANCHES AND VALUE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Add value to the junior tranche
    pub fn fund_junior(&mut self, amount: Amount) -> Result<()> {
        self.junior.fund(amount)
    }

    /// Add value to the reserve tranche
    pub fn fund_reserve(&mut self, amount: Amount) -> Result<()> {
        self.reserve.fund(amount)
    }

    /// Re-mark senior value (oracle repricing of held assets)
    pub fn mark_senior_value(&mut self, value: Amount) {
        self.senior_value.set(value);
    }

    /// Mutable junior tranche, for pausing
    pub fn junior_mut(&mut self) -> &mut TranchePool {
        &mut self.junior
    }

    /// Mutable reserve tranche, for pausing
    pub fn reserve_mut(&mut self) -> &mut TranchePool {
        &mut self.reserve
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Configuration in use
    pub fn config(&self) -> &VaultConfig {
        self.engine.config()
    }

    /// Senior share ledger
    pub fn vault(&self) -> &SeniorVault {
        &self.vault
    }

    /// Senior asset value
    pub fn senior_value(&self) -> Amount {
        self.senior_value.current_value()
    }

    /// Current backing ratio
    pub fn backing_ratio(&self) -> Result<Rate> {
        backing_ratio(
            self.senior_value.current_value(),
            self.vault.total_supply()?,
            self.config().target_backing,
        )
    }

    /// Junior tranche
    pub fn junior(&self) -> &TranchePool {
        &self.junior
    }

    /// Reserve tranche
    pub fn reserve(&self) -> &TranchePool {
        &self.reserve
    }

    /// Pending deposit queue
    pub fn queue(&self) -> &PendingDepositQueue {
        &self.queue
    }

    /// Persistence layer
    pub fn state_manager(&self) -> &StateManager<B> {
        &self.state_manager
    }

    /// Events not yet drained
    pub fn events(&self) -> &EventLog {
        &self.event_log
    }

    /// Drain accumulated events
    pub fn take_events(&mut self) -> Vec<ProtocolEvent> {
        self.event_log.drain()
    }

    fn emit(&mut self, event: ProtocolEvent) {
        self.event_log.push(event);
        self.event_log.truncate_front(MAX_EVENT_LOG);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deposits::DepositStatus;
    use crate::error::Error;
    use crate::rebase::Zone;
    use crate::storage::backend::InMemoryStore;
    use crate::utils::constants::{PRECISION, SECONDS_PER_DAY};

    const MONTH: u64 = 30 * SECONDS_PER_DAY;

    fn alice() -> AccountId {
        AccountId::from_label("alice")
    }

    fn protocol() -> TrancheProtocol<InMemoryStore> {
        let mut p = TrancheProtocol::open(
            VaultConfig::default(),
            AccountId::from_label("treasury"),
            InMemoryStore::new(),
            0,
        )
        .unwrap();
        p.fund_reserve(200_000 * PRECISION).unwrap();
        p.fund_junior(500_000 * PRECISION).unwrap();
        p
    }

    #[test]
    fn test_senior_deposit_tracks_value() {
        let mut p = protocol();
        p.deposit_senior(alice(), 1_000 * PRECISION, 1).unwrap();

        assert_eq!(p.senior_value(), 1_000 * PRECISION);
        assert_eq!(p.backing_ratio().unwrap(), PRECISION);
        assert_eq!(p.events().filter_by_type("SeniorDeposited").len(), 1);
    }

    #[test]
    fn test_capped_deposit_leaves_value_untouched() {
        let mut p = protocol();
        let err = p.deposit_senior(alice(), 2_000_001 * PRECISION, 1).unwrap_err();
        assert!(matches!(err, Error::DepositCapExceeded { .. }));
        assert_eq!(p.senior_value(), 0);
        assert!(p.events().is_empty());
    }

    #[test]
    fn test_withdraw_keeps_penalty_in_vault() {
        let mut p = protocol();
        p.deposit_senior(alice(), 1_000 * PRECISION, 1).unwrap();
        let receipt = p.withdraw_senior(alice(), 100 * PRECISION, 2).unwrap();

        assert_eq!(receipt.quote.penalty, 5 * PRECISION);
        assert_eq!(p.senior_value(), 905 * PRECISION);
        assert!(p.backing_ratio().unwrap() > PRECISION);
    }

    #[test]
    fn test_backstop_moves_value_into_senior() {
        let mut p = protocol();
        p.deposit_senior(alice(), 1_000_000 * PRECISION, 1).unwrap();
        p.mark_senior_value(800_000 * PRECISION);

        let outcome = p.rebase(MONTH + 1).unwrap();
        let backstop = outcome.backstop.unwrap();

        assert_eq!(outcome.preview.zone, Zone::Backstop);
        assert!(backstop.fully_restored);
        assert_eq!(p.senior_value(), 800_000 * PRECISION + backstop.provided());
        assert_eq!(p.reserve().value, 0);
        assert_eq!(p.events().filter_by_type("BackstopExecuted").len(), 1);
    }

    #[test]
    fn test_failed_rebase_restores_tranches() {
        let mut p = protocol();
        p.deposit_senior(alice(), 1_000_000 * PRECISION, 1).unwrap();
        p.mark_senior_value(1_500_000 * PRECISION);
        p.reserve_mut().pause();

        let junior_before = p.junior().clone();
        let hash_before = p.vault().state_hash();
        assert!(p.rebase(MONTH + 1).is_err());

        assert_eq!(p.junior(), &junior_before);
        assert_eq!(p.vault().state_hash(), hash_before);
        assert_eq!(p.senior_value(), 1_500_000 * PRECISION);
    }

    #[test]
    fn test_preview_matches_rebase() {
        let mut p = protocol();
        p.deposit_senior(alice(), 1_000_000 * PRECISION, 1).unwrap();
        p.mark_senior_value(900_000 * PRECISION);

        let (preview, plan) = p.preview_rebase(MONTH + 1).unwrap();
        let outcome = p.rebase(MONTH + 1).unwrap();
        assert_eq!(outcome.preview, preview);
        assert_eq!(outcome.backstop, plan);
    }

    #[test]
    fn test_approval_respects_cap() {
        let mut p = protocol();
        let id = p
            .deposit_lp(alice(), TokenId::from_symbol("LP"), 1_000_000 * PRECISION, 1)
            .unwrap();

        let err = p.approve_lp_deposit(id, 3 * PRECISION, 2).unwrap_err();
        assert!(matches!(err, Error::DepositCapExceeded { .. }));
        assert!(!p.queue().get(id).unwrap().status.is_terminal());

        let approval = p.approve_lp_deposit(id, PRECISION, 2).unwrap();
        assert_eq!(p.vault().shares_of(&alice()), approval.shares);
        assert_eq!(p.senior_value(), 1_000_000 * PRECISION);
    }

    #[test]
    fn test_failed_approval_keeps_entry_pending() {
        let mut p = protocol();
        let id = p
            .deposit_lp(alice(), TokenId::from_symbol("LP"), 1_000 * PRECISION, 1)
            .unwrap();
        p.take_events();

        // Priced fine, but crediting senior value overflows
        p.mark_senior_value(u128::MAX - PRECISION);
        let hash_before = p.vault().state_hash();
        let err = p.approve_lp_deposit(id, PRECISION, 2).unwrap_err();
        assert!(matches!(err, Error::ArithmeticOverflow { .. }));

        assert_eq!(p.queue().get(id).unwrap().status, DepositStatus::Pending);
        assert_eq!(p.vault().state_hash(), hash_before);
        assert_eq!(p.senior_value(), u128::MAX - PRECISION);
        assert!(p.events().is_empty());

        p.mark_senior_value(0);
        p.approve_lp_deposit(id, PRECISION, 2).unwrap();
        assert_eq!(p.queue().get(id).unwrap().status, DepositStatus::Approved);
    }

    #[test]
    fn test_worthless_approval_rejected() {
        let mut p = protocol();
        let id = p.deposit_lp(alice(), TokenId::from_symbol("LP"), 1, 1).unwrap();

        let err = p.approve_lp_deposit(id, PRECISION / 2, 2).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
        assert_eq!(p.queue().get(id).unwrap().status, DepositStatus::Pending);
        assert_eq!(p.vault().shares_of(&alice()), 0);

        let refund = p.reject_lp_deposit(id, "dust", 3).unwrap();
        assert_eq!(refund.amount, 1);
    }

    #[test]
    fn test_take_events_drains() {
        let mut p = protocol();
        p.deposit_lp(alice(), TokenId::from_symbol("LP"), 5, 1).unwrap();
        assert_eq!(p.take_events().len(), 1);
        assert!(p.events().is_empty());
    }
}
