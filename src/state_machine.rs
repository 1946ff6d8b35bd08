//! Vault status transition table.
//!
//! This is the single source of truth consulted before any status write.
//! `Recovered` and `Failed` are terminal.

use crate::models::VaultStatus;

impl VaultStatus {
    /// Legal successor states from this state.
    pub fn valid_transitions(self) -> &'static [VaultStatus] {
        match self {
            VaultStatus::Pending => &[VaultStatus::Deploying, VaultStatus::Failed],
            VaultStatus::Deploying => &[VaultStatus::Active, VaultStatus::Failed],
            VaultStatus::Active => &[VaultStatus::Recovering, VaultStatus::Paused],
            VaultStatus::Recovering => &[
                VaultStatus::Active,
                VaultStatus::Recovered,
                VaultStatus::Failed,
            ],
            VaultStatus::Paused => &[VaultStatus::Active, VaultStatus::Recovering],
            VaultStatus::Recovered | VaultStatus::Failed => &[],
        }
    }

    pub fn can_transition_to(self, target: VaultStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.valid_transitions().is_empty()
    }
}

pub fn can_transition(from: VaultStatus, to: VaultStatus) -> bool {
    from.can_transition_to(to)
}
