//! Capacity, reserved overhead and the bracket tables behind them

pub mod capacity;
pub mod tax;

pub use capacity::{capacity, overhead, EVICTION_MEMORY_AVAILABLE_MIB};
pub use tax::{TaxBracket, CPU_BRACKETS, MEMORY_BRACKETS};
