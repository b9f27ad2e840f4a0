//! Protocol events for state change notifications.
//!
//! Every committed state change emits one event so indexers can rebuild the
//! history of a vault without replaying its storage.

use serde::{Deserialize, Serialize};

use crate::deposits::Refund;
use crate::rebase::{ApyTier, BackstopOutcome, RebaseOutcome, Zone};
use crate::utils::ids::{AccountId, Hash, TokenId};
use crate::utils::math::{Amount, Index, Rate, Shares};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    // Rebase Events
    /// Epoch committed
    RebaseExecuted(RebaseExecutedEvent),
    /// Excess routed to junior and reserve
    SpilloverRouted(SpilloverRoutedEvent),
    /// Deficit pulled from reserve and junior
    BackstopExecuted(BackstopExecutedEvent),

    // Senior Events
    /// Senior deposit minted shares
    SeniorDeposited(SeniorDepositedEvent),
    /// Senior withdrawal burned shares
    SeniorWithdrawn(SeniorWithdrawnEvent),
    /// Cooldown clock started
    CooldownInitiated(CooldownInitiatedEvent),

    // Pending Deposit Events
    /// LP deposit queued
    PendingDepositCreated(PendingDepositCreatedEvent),
    /// LP deposit priced and converted
    PendingDepositApproved(PendingDepositApprovedEvent),
    /// LP deposit refused
    PendingDepositRejected(PendingDepositRefundedEvent),
    /// LP deposit withdrawn by its depositor
    PendingDepositCancelled(PendingDepositRefundedEvent),
    /// LP deposit expired undecided
    PendingDepositExpired(PendingDepositRefundedEvent),
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RebaseExecuted(_) => "RebaseExecuted",
            Self::SpilloverRouted(_) => "SpilloverRouted",
            Self::BackstopExecuted(_) => "BackstopExecuted",
            Self::SeniorDeposited(_) => "SeniorDeposited",
            Self::SeniorWithdrawn(_) => "SeniorWithdrawn",
            Self::CooldownInitiated(_) => "CooldownInitiated",
            Self::PendingDepositCreated(_) => "PendingDepositCreated",
            Self::PendingDepositApproved(_) => "PendingDepositApproved",
            Self::PendingDepositRejected(_) => "PendingDepositRejected",
            Self::PendingDepositCancelled(_) => "PendingDepositCancelled",
            Self::PendingDepositExpired(_) => "PendingDepositExpired",
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::RebaseExecuted(e) => e.timestamp,
            Self::SpilloverRouted(e) => e.timestamp,
            Self::BackstopExecuted(e) => e.timestamp,
            Self::SeniorDeposited(e) => e.timestamp,
            Self::SeniorWithdrawn(e) => e.timestamp,
            Self::CooldownInitiated(e) => e.timestamp,
            Self::PendingDepositCreated(e) => e.timestamp,
            Self::PendingDepositApproved(e) => e.timestamp,
            Self::PendingDepositRejected(e)
            | Self::PendingDepositCancelled(e)
            | Self::PendingDepositExpired(e) => e.timestamp,
        }
    }

    /// Compute event hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REBASE EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rebase summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseExecutedEvent {
    /// Epoch committed
    pub epoch: u64,
    /// Tier selected
    pub tier: ApyTier,
    /// Per-epoch rate applied
    pub epoch_rate: Rate,
    /// Index before
    pub old_index: Index,
    /// Index after
    pub new_index: Index,
    /// Supply after
    pub new_supply: Amount,
    /// Post-mint backing ratio
    pub backing_ratio: Rate,
    /// Zone
    pub zone: Zone,
    /// Management fee minted to treasury
    pub management_fee: Amount,
    /// Performance fee minted to treasury
    pub performance_fee: Amount,
    /// Timestamp
    pub timestamp: u64,
}

impl From<&RebaseOutcome> for RebaseExecutedEvent {
    fn from(outcome: &RebaseOutcome) -> Self {
        let p = &outcome.preview;
        Self {
            epoch: p.epoch,
            tier: p.selection.tier,
            epoch_rate: p.selection.epoch_rate,
            old_index: p.old_index,
            new_index: p.selection.new_index,
            new_supply: p.selection.new_supply,
            backing_ratio: p.backing_ratio,
            zone: p.zone,
            management_fee: p.selection.management_fee,
            performance_fee: p.selection.performance_fee,
            timestamp: p.next_state.last_rebase_time,
        }
    }
}

/// Spillover split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpilloverRoutedEvent {
    /// Epoch
    pub epoch: u64,
    /// Sent to junior
    pub to_junior: Amount,
    /// Sent to reserve
    pub to_reserve: Amount,
    /// Timestamp
    pub timestamp: u64,
}

/// Backstop waterfall result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackstopExecutedEvent {
    /// Epoch
    pub epoch: u64,
    /// Deficit requested
    pub requested: Amount,
    /// From reserve
    pub from_reserve: Amount,
    /// From junior
    pub from_junior: Amount,
    /// False when senior absorbs a shortfall
    pub fully_restored: bool,
    /// Timestamp
    pub timestamp: u64,
}

impl BackstopExecutedEvent {
    /// Build from a waterfall outcome
    pub fn new(epoch: u64, outcome: &BackstopOutcome, timestamp: u64) -> Self {
        Self {
            epoch,
            requested: outcome.requested,
            from_reserve: outcome.from_reserve,
            from_junior: outcome.from_junior,
            fully_restored: outcome.fully_restored,
            timestamp,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SENIOR EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Senior deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeniorDepositedEvent {
    /// Depositor
    pub account: AccountId,
    /// Value deposited
    pub amount: Amount,
    /// Shares minted
    pub shares: Shares,
    /// Timestamp
    pub timestamp: u64,
}

/// Senior withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeniorWithdrawnEvent {
    /// Account
    pub account: AccountId,
    /// Balance redeemed
    pub gross: Amount,
    /// Early-exit penalty kept by the vault
    pub penalty: Amount,
    /// Shares burned
    pub shares_burned: Shares,
    /// Timestamp
    pub timestamp: u64,
}

/// Cooldown start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownInitiatedEvent {
    /// Account
    pub account: AccountId,
    /// First penalty-free moment
    pub completes_at: u64,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PENDING DEPOSIT EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// LP deposit queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDepositCreatedEvent {
    /// Deposit id
    pub id: u64,
    /// Depositor
    pub depositor: AccountId,
    /// Asset
    pub token: TokenId,
    /// Amount
    pub amount: Amount,
    /// Expiry
    pub expires_at: u64,
    /// Timestamp
    pub timestamp: u64,
}

/// LP deposit approved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDepositApprovedEvent {
    /// Deposit id
    pub id: u64,
    /// Depositor
    pub depositor: AccountId,
    /// Price applied
    pub price: Rate,
    /// Value credited
    pub value: Amount,
    /// Shares minted
    pub shares: Shares,
    /// Timestamp
    pub timestamp: u64,
}

/// LP deposit refunded (rejected, cancelled or expired)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDepositRefundedEvent {
    /// Refund issued
    pub refund: Refund,
    /// Timestamp
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Collection of events from one or more operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop the oldest events beyond `max`
    pub fn truncate_front(&mut self, max: usize) {
        if self.events.len() > max {
            let excess = self.events.len() - max;
            self.events.drain(..excess);
        }
    }

    /// Take every event, leaving the log empty
    pub fn drain(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Merkle root of the event hashes
    pub fn merkle_root(&self) -> Hash {
        let hashes: Vec<Hash> = self.events.iter().map(|e| e.hash()).collect();
        Hash::merkle_root(&hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cooldown(ts: u64) -> ProtocolEvent {
        ProtocolEvent::CooldownInitiated(CooldownInitiatedEvent {
            account: AccountId::from_label("alice"),
            completes_at: ts + 10,
            timestamp: ts,
        })
    }

    fn refund_event(ts: u64) -> ProtocolEvent {
        ProtocolEvent::PendingDepositExpired(PendingDepositRefundedEvent {
            refund: Refund {
                deposit_id: 1,
                recipient: AccountId::from_label("alice"),
                token: TokenId::from_symbol("LP"),
                amount: 5,
            },
            timestamp: ts,
        })
    }

    #[test]
    fn test_event_types() {
        assert_eq!(cooldown(1).event_type(), "CooldownInitiated");
        assert_eq!(refund_event(2).event_type(), "PendingDepositExpired");
        assert_eq!(refund_event(2).timestamp(), 2);
    }

    #[test]
    fn test_event_hash() {
        assert_eq!(cooldown(1).hash(), cooldown(1).hash());
        assert_ne!(cooldown(1).hash(), cooldown(2).hash());
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        log.push(cooldown(1));
        log.push(refund_event(2));
        log.push(cooldown(3));

        assert_eq!(log.len(), 3);
        assert_eq!(log.filter_by_type("CooldownInitiated").len(), 2);
        assert_ne!(log.merkle_root(), Hash::zero());

        log.truncate_front(2);
        assert_eq!(log.events()[0].timestamp(), 2);

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
    }
}
