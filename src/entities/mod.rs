pub mod stock_balance;
pub mod stock_batch;
pub mod stock_item;
pub mod stock_ledger_entry;
pub mod stock_location;
pub mod stock_movement;
pub mod stock_movement_line;
