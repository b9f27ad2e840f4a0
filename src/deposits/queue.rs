//! Admin-approved LP deposit queue.
//!
//! Entries start `Pending` and move exactly once to a terminal status:
//!
//! ```text
//!            ┌──> Approved   (admin, before expiry)
//!            ├──> Rejected   (admin)
//! Pending ───┼──> Cancelled  (depositor, before expiry)
//!            └──> Expired    (anyone, after expiry)
//! ```
//!
//! Terminal entries are kept for audit reads. Refund custody is external;
//! the queue only authorizes the transition and reports what to return.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::core::shares::shares_from_balance;
use crate::error::{Error, Result};
use crate::utils::ids::{AccountId, TokenId};
use crate::utils::math::{mul_div, Amount, Index, Rate, Shares};

// ═══════════════════════════════════════════════════════════════════════════════
// TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a pending deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepositStatus {
    /// Awaiting a decision
    Pending,
    /// Priced and converted to senior shares
    Approved,
    /// Refused by an admin, refunded
    Rejected,
    /// Withdrawn by the depositor, refunded
    Cancelled,
    /// Not decided in time, refunded
    Expired,
}

impl DepositStatus {
    /// Everything except `Pending`
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DepositStatus::Pending)
    }
}

/// One queued LP deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeposit {
    /// Queue-assigned id, starting at 1
    pub id: u64,
    /// Who deposited
    pub depositor: AccountId,
    /// Asset deposited
    pub token: TokenId,
    /// Token amount
    pub amount: Amount,
    /// Current status
    pub status: DepositStatus,
    /// Creation timestamp
    pub created_at: u64,
    /// Last moment the deposit can be approved or cancelled
    pub expires_at: u64,
    /// Unit price, set on approval
    pub price: Option<Rate>,
    /// Reason given on rejection
    pub rejection_reason: Option<String>,
    /// Timestamp of the terminal transition
    pub resolved_at: Option<u64>,
}

impl PendingDeposit {
    /// Past its expiry at `now`
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// Asset to hand back to a depositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    /// Deposit being refunded
    pub deposit_id: u64,
    /// Original depositor, whoever triggered the refund
    pub recipient: AccountId,
    /// Asset
    pub token: TokenId,
    /// Original amount, unchanged
    pub amount: Amount,
}

impl From<&PendingDeposit> for Refund {
    fn from(deposit: &PendingDeposit) -> Self {
        Self {
            deposit_id: deposit.id,
            recipient: deposit.depositor,
            token: deposit.token,
            amount: deposit.amount,
        }
    }
}

/// Result of approving a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// Deposit approved
    pub deposit_id: u64,
    /// Recipient of the shares
    pub depositor: AccountId,
    /// Unit price applied
    pub price: Rate,
    /// `amount × price`
    pub value: Amount,
    /// Senior shares for `value`, floored
    pub shares: Shares,
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUEUE
// ═══════════════════════════════════════════════════════════════════════════════

/// Pending deposit ledger with a per-depositor index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDepositQueue {
    next_id: u64,
    expiry: u64,
    deposits: BTreeMap<u64, PendingDeposit>,
    by_depositor: BTreeMap<AccountId, BTreeSet<u64>>,
}

impl PendingDepositQueue {
    /// Empty queue whose entries stay approvable for `expiry` seconds
    pub fn new(expiry: u64) -> Self {
        Self {
            next_id: 1,
            expiry,
            deposits: BTreeMap::new(),
            by_depositor: BTreeMap::new(),
        }
    }

    /// Rebuild from a persisted ledger, re-deriving the depositor index
    pub fn from_ledger(expiry: u64, next_id: u64, entries: Vec<PendingDeposit>) -> Result<Self> {
        let mut queue = Self::new(expiry);
        for entry in entries {
            if entry.id >= next_id {
                return Err(Error::InvariantViolation(format!(
                    "pending deposit {} is not below next id {}",
                    entry.id, next_id
                )));
            }
            queue.index(entry.depositor, entry.id);
            queue.deposits.insert(entry.id, entry);
        }
        queue.next_id = next_id.max(1);
        Ok(queue)
    }

    /// Queue `amount` of `token` from `depositor`
    pub fn deposit_lp(&mut self, depositor: AccountId, token: TokenId, amount: Amount, now: u64) -> Result<u64> {
        if amount == 0 {
            return Err(Error::InvalidAmount("LP deposit amount is zero".into()));
        }
        let expires_at = now
            .checked_add(self.expiry)
            .ok_or_else(|| Error::overflow("deposit_lp expiry"))?;

        let id = self.next_id;
        self.next_id += 1;

        self.deposits.insert(
            id,
            PendingDeposit {
                id,
                depositor,
                token,
                amount,
                status: DepositStatus::Pending,
                created_at: now,
                expires_at,
                price: None,
                rejection_reason: None,
                resolved_at: None,
            },
        );
        self.index(depositor, id);

        info!(id, depositor = %depositor.short(), amount, expires_at, "LP deposit queued");
        Ok(id)
    }

    /// Value `amount × price` an approval at `now` would credit
    pub fn quote_approval(&self, id: u64, price: Rate, now: u64) -> Result<Amount> {
        let deposit = self.pending_ref(id)?;
        if deposit.is_expired(now) {
            return Err(Error::Expired {
                id,
                expires_at: deposit.expires_at,
            });
        }
        if price == 0 {
            return Err(Error::InvalidAmount("approval price is zero".into()));
        }
        mul_div(deposit.amount, price)
    }

    /// Price an approval at `now` without changing the entry.
    ///
    /// Fails with [`Error::InvalidAmount`] when the priced value or the shares
    /// it buys at `index` floor to zero.
    pub fn prepare_approval(&self, id: u64, price: Rate, index: Index, now: u64) -> Result<Approval> {
        let value = self.quote_approval(id, price, now)?;
        if value == 0 {
            return Err(Error::InvalidAmount(format!(
                "pending deposit {} is worth zero at price {}",
                id, price
            )));
        }
        let shares = shares_from_balance(value, index)?;
        if shares == 0 {
            return Err(Error::InvalidAmount(format!(
                "pending deposit {} value {} buys zero shares",
                id, value
            )));
        }
        let deposit = self.pending_ref(id)?;
        Ok(Approval {
            deposit_id: id,
            depositor: deposit.depositor,
            price,
            value,
            shares,
        })
    }

    /// Approve at `price`, converting the value to shares at `index`
    pub fn approve_lp_deposit(&mut self, id: u64, price: Rate, index: Index, now: u64) -> Result<Approval> {
        let approval = self.prepare_approval(id, price, index, now)?;
        self.mark_approved(&approval, now)?;
        Ok(approval)
    }

    /// Move a prepared approval's entry to `Approved`
    pub fn mark_approved(&mut self, approval: &Approval, now: u64) -> Result<()> {
        let deposit = self.pending_mut(approval.deposit_id)?;
        deposit.status = DepositStatus::Approved;
        deposit.price = Some(approval.price);
        deposit.resolved_at = Some(now);

        info!(
            id = approval.deposit_id,
            price = approval.price,
            value = approval.value,
            shares = approval.shares,
            "LP deposit approved"
        );
        Ok(())
    }

    /// Reject and refund in full
    pub fn reject_lp_deposit(&mut self, id: u64, reason: impl Into<String>, now: u64) -> Result<Refund> {
        let reason = reason.into();
        let deposit = self.pending_mut(id)?;
        deposit.status = DepositStatus::Rejected;
        deposit.resolved_at = Some(now);
        info!(id, reason = %reason, "LP deposit rejected");
        deposit.rejection_reason = Some(reason);
        Ok(Refund::from(&*deposit))
    }

    /// Depositor withdraws the request before it expires
    pub fn cancel_pending_deposit(&mut self, id: u64, caller: AccountId, now: u64) -> Result<Refund> {
        let deposit = self.pending_mut(id)?;
        if deposit.depositor != caller {
            return Err(Error::Unauthorized(format!(
                "only the depositor may cancel pending deposit {}",
                id
            )));
        }
        if deposit.is_expired(now) {
            return Err(Error::Expired {
                id,
                expires_at: deposit.expires_at,
            });
        }
        deposit.status = DepositStatus::Cancelled;
        deposit.resolved_at = Some(now);
        info!(id, "LP deposit cancelled");
        Ok(Refund::from(&*deposit))
    }

    /// Anyone may expire an undecided deposit once past its expiry; the
    /// refund always goes to the depositor
    pub fn claim_expired_deposit(&mut self, id: u64, now: u64) -> Result<Refund> {
        let deposit = self.pending_mut(id)?;
        if !deposit.is_expired(now) {
            return Err(Error::DepositNotExpired {
                id,
                expires_at: deposit.expires_at,
            });
        }
        deposit.status = DepositStatus::Expired;
        deposit.resolved_at = Some(now);
        info!(id, "LP deposit expired");
        Ok(Refund::from(&*deposit))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Entry by id
    pub fn get(&self, id: u64) -> Option<&PendingDeposit> {
        self.deposits.get(&id)
    }

    /// Every entry of `depositor`, oldest first
    pub fn deposits_of(&self, depositor: &AccountId) -> Vec<&PendingDeposit> {
        self.by_depositor
            .get(depositor)
            .map(|ids| ids.iter().filter_map(|id| self.deposits.get(id)).collect())
            .unwrap_or_default()
    }

    /// Ids of `depositor`'s entries
    pub fn ids_of(&self, depositor: &AccountId) -> Option<&BTreeSet<u64>> {
        self.by_depositor.get(depositor)
    }

    /// Entries still awaiting a decision
    pub fn pending(&self) -> impl Iterator<Item = &PendingDeposit> {
        self.deposits
            .values()
            .filter(|d| d.status == DepositStatus::Pending)
    }

    /// All entries, by id
    pub fn iter(&self) -> impl Iterator<Item = &PendingDeposit> {
        self.deposits.values()
    }

    /// Id the next deposit will receive
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Expiry window in seconds
    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    /// Number of entries, terminal included
    pub fn len(&self) -> usize {
        self.deposits.len()
    }

    /// No entries at all
    pub fn is_empty(&self) -> bool {
        self.deposits.is_empty()
    }

    fn index(&mut self, depositor: AccountId, id: u64) {
        self.by_depositor.entry(depositor).or_default().insert(id);
    }

    fn pending_ref(&self, id: u64) -> Result<&PendingDeposit> {
        let deposit = self.deposits.get(&id).ok_or(Error::DepositNotFound(id))?;
        if deposit.status != DepositStatus::Pending {
            return Err(Error::InvalidState {
                id,
                status: deposit.status,
            });
        }
        Ok(deposit)
    }

    fn pending_mut(&mut self, id: u64) -> Result<&mut PendingDeposit> {
        let deposit = self.deposits.get_mut(&id).ok_or(Error::DepositNotFound(id))?;
        if deposit.status != DepositStatus::Pending {
            return Err(Error::InvalidState {
                id,
                status: deposit.status,
            });
        }
        Ok(deposit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{INITIAL_INDEX, PRECISION, SECONDS_PER_DAY};

    const WEEK: u64 = 7 * SECONDS_PER_DAY;

    fn alice() -> AccountId {
        AccountId::from_label("alice")
    }

    fn lp() -> TokenId {
        TokenId::from_symbol("LP-USDC-ETH")
    }

    fn queue() -> PendingDepositQueue {
        PendingDepositQueue::new(WEEK)
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut q = queue();
        assert_eq!(q.deposit_lp(alice(), lp(), 10, 0).unwrap(), 1);
        assert_eq!(q.deposit_lp(alice(), lp(), 20, 0).unwrap(), 2);
        assert_eq!(q.deposits_of(&alice()).len(), 2);
        assert_eq!(q.get(2).unwrap().expires_at, WEEK);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut q = queue();
        assert!(matches!(
            q.deposit_lp(alice(), lp(), 0, 0),
            Err(Error::InvalidAmount(_))
        ));
        assert!(q.is_empty());
    }

    #[test]
    fn test_approve_prices_and_converts() {
        let mut q = queue();
        let id = q.deposit_lp(alice(), lp(), 10 * PRECISION, 0).unwrap();
        let approval = q
            .approve_lp_deposit(id, 2 * PRECISION, INITIAL_INDEX, 100)
            .unwrap();

        assert_eq!(approval.value, 20 * PRECISION);
        assert_eq!(approval.shares, 20 * PRECISION);
        let entry = q.get(id).unwrap();
        assert_eq!(entry.status, DepositStatus::Approved);
        assert_eq!(entry.price, Some(2 * PRECISION));
    }

    #[test]
    fn test_approve_worthless_deposit_stays_pending() {
        let mut q = queue();
        let id = q.deposit_lp(alice(), lp(), 1, 0).unwrap();

        // 1 wei at half price floors to zero value
        assert!(matches!(
            q.approve_lp_deposit(id, PRECISION / 2, INITIAL_INDEX, 1),
            Err(Error::InvalidAmount(_))
        ));
        // 1 wei of value buys no shares once the index has grown
        assert!(matches!(
            q.approve_lp_deposit(id, PRECISION, 2 * INITIAL_INDEX, 1),
            Err(Error::InvalidAmount(_))
        ));

        let entry = q.get(id).unwrap();
        assert_eq!(entry.status, DepositStatus::Pending);
        assert_eq!(entry.resolved_at, None);
        assert_eq!(q.reject_lp_deposit(id, "dust", 2).unwrap().amount, 1);
    }

    #[test]
    fn test_approve_after_expiry_fails() {
        let mut q = queue();
        let id = q.deposit_lp(alice(), lp(), 10, 0).unwrap();
        assert_eq!(
            q.approve_lp_deposit(id, PRECISION, INITIAL_INDEX, WEEK + 1),
            Err(Error::Expired { id, expires_at: WEEK })
        );
        assert_eq!(q.get(id).unwrap().status, DepositStatus::Pending);
    }

    #[test]
    fn test_reject_records_reason_and_refunds() {
        let mut q = queue();
        let id = q.deposit_lp(alice(), lp(), 42, 0).unwrap();
        let refund = q.reject_lp_deposit(id, "unsupported pool", 5).unwrap();

        assert_eq!(refund.amount, 42);
        assert_eq!(refund.recipient, alice());
        assert_eq!(q.get(id).unwrap().rejection_reason.as_deref(), Some("unsupported pool"));
    }

    #[test]
    fn test_cancel_only_by_depositor() {
        let mut q = queue();
        let id = q.deposit_lp(alice(), lp(), 42, 0).unwrap();
        assert!(matches!(
            q.cancel_pending_deposit(id, AccountId::from_label("mallory"), 1),
            Err(Error::Unauthorized(_))
        ));
        assert_eq!(q.cancel_pending_deposit(id, alice(), WEEK).unwrap().amount, 42);
    }

    #[test]
    fn test_cancel_after_expiry_fails() {
        let mut q = queue();
        let id = q.deposit_lp(alice(), lp(), 42, 0).unwrap();
        assert!(matches!(
            q.cancel_pending_deposit(id, alice(), WEEK + 1),
            Err(Error::Expired { .. })
        ));
    }

    #[test]
    fn test_expiry_lifecycle() {
        let mut q = queue();
        let id = q.deposit_lp(alice(), lp(), 42, 0).unwrap();

        assert_eq!(
            q.claim_expired_deposit(id, WEEK),
            Err(Error::DepositNotExpired { id, expires_at: WEEK })
        );
        let refund = q.claim_expired_deposit(id, WEEK + 1).unwrap();
        assert_eq!(refund.recipient, alice());

        assert_eq!(
            q.approve_lp_deposit(id, PRECISION, INITIAL_INDEX, WEEK + 2),
            Err(Error::InvalidState {
                id,
                status: DepositStatus::Expired,
            })
        );
    }

    #[test]
    fn test_unknown_id() {
        let mut q = queue();
        assert_eq!(q.claim_expired_deposit(9, 0), Err(Error::DepositNotFound(9)));
    }

    #[test]
    fn test_terminal_entries_are_kept() {
        let mut q = queue();
        let a = q.deposit_lp(alice(), lp(), 1, 0).unwrap();
        let b = q.deposit_lp(alice(), lp(), 2, 0).unwrap();
        q.reject_lp_deposit(a, "no", 1).unwrap();

        assert_eq!(q.len(), 2);
        assert_eq!(q.pending().map(|d| d.id).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn test_from_ledger_rebuilds_index() {
        let mut q = queue();
        q.deposit_lp(alice(), lp(), 1, 0).unwrap();
        q.deposit_lp(AccountId::from_label("bob"), lp(), 2, 0).unwrap();

        let entries = q.iter().cloned().collect();
        let rebuilt = PendingDepositQueue::from_ledger(WEEK, q.next_id(), entries).unwrap();
        assert_eq!(rebuilt, q);
    }
}
