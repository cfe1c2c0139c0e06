pub mod ai;
pub mod availability;
pub mod booking_flow;
pub mod ledger;
pub mod parsers;
pub mod sessions;
pub mod thread_lock;
