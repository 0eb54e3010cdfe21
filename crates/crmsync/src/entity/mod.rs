//! SeaORM entity definitions for the crmsync database schema.

pub mod customer;
pub mod customer_group;
pub mod group_type;
pub mod prelude;
pub mod sync_state;
