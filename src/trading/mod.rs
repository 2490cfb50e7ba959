pub mod order_manager;
pub mod order_record;
pub mod state;

pub use order_manager::{CancelOutcome, FillOutcome, OrderManager};
pub use order_record::OrderRecord;
pub use state::{SharedState, StateStore};
