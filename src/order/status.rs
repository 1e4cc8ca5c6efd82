// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle status. Ordered by protocol progress; `Cancelled` is
/// terminal and reachable from any non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Filled,
    CounterpartyEscrowCreated,
    SourceLockFunded,
    SourceClaimed,
    CounterpartyClaimed,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Created,
        OrderStatus::Filled,
        OrderStatus::CounterpartyEscrowCreated,
        OrderStatus::SourceLockFunded,
        OrderStatus::SourceClaimed,
        OrderStatus::CounterpartyClaimed,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Position along the happy path.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Created => 0,
            OrderStatus::Filled => 1,
            OrderStatus::CounterpartyEscrowCreated => 2,
            OrderStatus::SourceLockFunded => 3,
            OrderStatus::SourceClaimed => 4,
            OrderStatus::CounterpartyClaimed => 5,
            OrderStatus::Completed => 6,
            OrderStatus::Cancelled => 7,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::CounterpartyEscrowCreated => "COUNTERPARTY_ESCROW_CREATED",
            OrderStatus::SourceLockFunded => "SOURCE_LOCK_FUNDED",
            OrderStatus::SourceClaimed => "SOURCE_CLAIMED",
            OrderStatus::CounterpartyClaimed => "COUNTERPARTY_CLAIMED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
