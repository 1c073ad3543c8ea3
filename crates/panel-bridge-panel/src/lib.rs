//! Concrete panel collaborators: OAuth2 credentials and the HTTP control client.

pub mod client;
pub mod oauth;

pub use client::PanelClient;
pub use oauth::OauthTokenProvider;
