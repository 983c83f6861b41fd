//! Process configuration.
//!
//! Every option can be given as a flag or through the environment, so the
//! relay runs the same way from a shell and from a container.

use std::net::SocketAddr;

use clap::Parser;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(name = "gitlab-chat-relay", version, about = "Relays GitLab webhooks to VK community messages")]
pub struct Config {
    /// Community access token with messages and manage permissions.
    #[arg(long, env = "RELAY_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,

    /// Public address of this service, used to build webhook and callback URLs.
    /// `https` is assumed when no scheme is given.
    #[arg(long, env = "RELAY_DOMAIN")]
    pub domain: String,

    /// Address to listen on.
    #[arg(long, env = "RELAY_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: SocketAddr,

    /// VK API endpoint.
    #[arg(long, env = "RELAY_API_BASE", default_value = "https://api.vk.com/method")]
    pub api_base: String,

    /// VK API version.
    #[arg(long, env = "RELAY_API_VERSION", default_value = "5.131")]
    pub api_version: String,

    /// Log level, used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info")]
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid domain {domain:?}: {source}")]
    InvalidDomain {
        domain: String,
        #[source]
        source: url::ParseError,
    },

    #[error("domain {0:?} has no host")]
    MissingHost(String),
}

/// Parses the public domain into a base URL, defaulting the scheme to `https`.
pub fn public_base(domain: &str) -> Result<Url, ConfigError> {
    let domain = domain.trim();
    let candidate = if domain.contains("://") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    };

    let url = Url::parse(&candidate).map_err(|source| ConfigError::InvalidDomain {
        domain: domain.to_string(),
        source,
    })?;

    if url.cannot_be_a_base() || url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::MissingHost(domain.to_string()));
    }

    Ok(url)
}

/// Appends path segments to a base URL, keeping any path the base already has.
pub fn endpoint<'a>(base: &Url, segments: impl IntoIterator<Item = &'a str>) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}
