pub mod worker;

pub use worker::{
    build_manager, lifecycle_rules, permission_policy, start_expiration_sweeper, sweeper_config,
    LogNotifier,
};
