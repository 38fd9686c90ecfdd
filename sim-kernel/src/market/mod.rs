pub mod book;
pub mod matching;
pub mod orders;

pub use book::{DepthLevel, DepthView, Markets, OrderBook, SubmitReceipt};
pub use matching::MatchingEngine;
pub use orders::{Order, OrderStatus, Side, TickVolume, Trade};
