pub mod candle;
pub mod instrument;
pub mod interval;
pub mod order;
pub mod proposal;
pub mod signal_key;

pub use candle::Candle;
pub use instrument::{InstrumentCache, InstrumentSpec};
pub use interval::Interval;
pub use order::*;
pub use proposal::TradeProposal;
pub use signal_key::SignalKey;
