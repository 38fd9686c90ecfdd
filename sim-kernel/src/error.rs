use thiserror::Error;

use crate::types::{CommodityId, Money, OrderId, Price, Quantity};

/// Kernel error kinds.
///
/// The `Insufficient*` variants are operational: callers handle them and the
/// simulation continues. `Unknown*` indicate a collaborator passed a stale or
/// fabricated id. `Invalid*` reject bad input at the command boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("insufficient stock of commodity {commodity}: need {needed}, have {available}")]
    InsufficientStock {
        commodity: CommodityId,
        needed: Quantity,
        available: Quantity,
    },
    #[error("insufficient sale reservation on commodity {commodity}: need {needed}, reserved {reserved}")]
    InsufficientReserved {
        commodity: CommodityId,
        needed: Quantity,
        reserved: Quantity,
    },
    #[error("insufficient cash: need {needed}, have {available}")]
    InsufficientCash { needed: Money, available: Money },
    #[error("insufficient free stock of commodity {commodity}: need {needed}, free {free}")]
    InsufficientFree {
        commodity: CommodityId,
        needed: Quantity,
        free: Quantity,
    },

    #[error("unknown entity")]
    UnknownEntity,
    #[error("unknown commodity {0}")]
    UnknownCommodity(CommodityId),
    #[error("unknown order {0}")]
    UnknownOrder(OrderId),
    #[error("unknown building")]
    UnknownBuilding,

    #[error("invalid quantity {0}")]
    InvalidQuantity(Quantity),
    #[error("invalid price {0}")]
    InvalidPrice(Price),
    #[error("invalid capacity {0}")]
    InvalidCapacity(usize),

    /// Internal consistency failure. Fatal in debug builds (asserted at the
    /// violation site); in release the offending operation is aborted and the
    /// violation surfaced to diagnostics.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type SimResult<T> = Result<T, SimError>;
