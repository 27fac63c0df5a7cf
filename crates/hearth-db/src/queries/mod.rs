pub mod auth_accounts;
pub mod channels;
pub mod deletions;
pub mod friendships;
pub mod messages;
pub mod rate_limits;
pub mod scheduled;
pub mod servers;
pub mod sessions;
pub mod users;
