pub mod discord;
pub mod logging;

pub use discord::DiscordNotifier;
