use anyhow::Context;
use url::{form_urlencoded, Url};

use super::hash::hash_email;
use crate::config::AvatarConfig;

/// Builds avatar links relative to where the web UI is mounted.
#[derive(Debug, Clone)]
pub struct AvatarLinks {
    app_url: String,
    app_sub_url: String,
    gravatar_source: Url,
}

impl AvatarLinks {
    pub fn from_config(cfg: &AvatarConfig) -> anyhow::Result<Self> {
        let gravatar_source = Url::parse(&cfg.gravatar_source)
            .with_context(|| format!("parse gravatar source {}", cfg.gravatar_source))?;
        anyhow::ensure!(
            !gravatar_source.cannot_be_a_base(),
            "gravatar source {} is not a base url",
            cfg.gravatar_source
        );
        Ok(Self {
            app_url: cfg.app_url.clone(),
            app_sub_url: cfg.app_sub_url.clone(),
            gravatar_source,
        })
    }

    pub fn default_avatar(&self) -> String {
        format!("{}/assets/img/avatar_default.png", self.app_sub_url)
    }

    /// Link to a blob in our own storage. `size == 0` leaves the size to the
    /// client.
    pub fn local(&self, key: &str, size: u32) -> String {
        let escaped: String = form_urlencoded::byte_serialize(key.as_bytes()).collect();
        let link = format!("{}/avatars/{}", self.app_sub_url, escaped);
        if size > 0 {
            format!("{}?size={}", link, size)
        } else {
            link
        }
    }

    pub fn remote(&self, email: &str, size: u32) -> String {
        let mut url = self.gravatar_source.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&hash_email(email));
        }
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("d", "identicon");
            if size > 0 {
                query.append_pair("s", &size.to_string());
            }
        }
        url.into()
    }

    /// Turns a link from this builder into one usable outside the web UI.
    pub fn absolute(&self, link: &str) -> String {
        if link.starts_with("//") || link.contains("://") {
            return link.to_string();
        }
        let prefix = format!("{}/", self.app_sub_url);
        let rel = link
            .strip_prefix(prefix.as_str())
            .unwrap_or_else(|| link.trim_start_matches('/'));
        format!("{}{}", self.app_url, rel)
    }
}
