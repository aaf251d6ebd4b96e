pub mod customer;
pub mod order;
pub mod tracking;
