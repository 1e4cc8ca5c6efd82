// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 AtomicX Contributors

//! Swap orders: lifecycle status, guarded transitions, persistence and the
//! engine that ties orders to their legs.

pub mod engine;
pub mod model;
pub mod status;
pub mod store;

pub use engine::SwapEngine;
pub use model::{EscrowRecord, LegSide, LegTerms, StatusChange, SwapEvent, SwapOrder};
pub use status::OrderStatus;
pub use store::{MemoryOrderStore, OrderStore, SledOrderStore};
