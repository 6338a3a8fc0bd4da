// Master data seams and the default batch/serial validator
pub mod master_data;

// Stores
pub mod stock_balance;
pub mod stock_ledger;

// Valuation replay over the ledger
pub mod valuation;

// Documents and posting
pub mod stock_movement;
pub mod stock_posting;
pub mod stock_reconciliation;

// Service factory for dependency injection
pub mod factory;
