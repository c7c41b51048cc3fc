pub mod health;
pub mod vouchers;
