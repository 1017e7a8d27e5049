//! HTTP handlers, grouped by resource

pub mod account;
pub mod health;
pub mod transfer;
pub mod users;

pub use account::{
    create_account, get_account, list_account_entries, list_account_transfers, list_accounts,
};
pub use health::health_check;
pub use transfer::create_transfer;
pub use users::{create_user, login_user};
