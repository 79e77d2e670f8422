//! Reddit listing client.
//!
//! Without credentials the public `hot.json` listing is used. With an app id
//! and secret the client takes an application-only OAuth token and reads the
//! same listing from `oauth.reddit.com`.

use crate::candidate::{Candidate, ContentSource, SourceError, SourceKind};
use crate::config::{RedditCredentials, DEFAULT_USER_AGENT};
use base64::Engine as _;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

const PUBLIC_BASE_URL: &str = "https://www.reddit.com";
const OAUTH_BASE_URL: &str = "https://oauth.reddit.com";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
/// Refresh this long before the token actually expires.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);
/// Reddit serves at most this many posts per listing request.
pub const MAX_LISTING_LIMIT: usize = 100;
/// Link posts are only kept when their URL names one of these file types.
const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "mp4"];

pub struct RedditClient {
    agent: ureq::Agent,
    credentials: Option<RedditCredentials>,
    token: Mutex<Option<AccessToken>>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl RedditClient {
    pub fn new(credentials: Option<RedditCredentials>, user_agent: &str, timeout: Duration) -> Self {
        let user_agent = credentials
            .as_ref()
            .and_then(|c| c.user_agent.clone())
            .unwrap_or_else(|| {
                let trimmed = user_agent.trim();
                if trimmed.is_empty() {
                    DEFAULT_USER_AGENT.to_string()
                } else {
                    trimmed.to_string()
                }
            });

        let mut config = ureq::Agent::config_builder();
        config = config
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .user_agent(user_agent.as_str());
        let agent: ureq::Agent = config.build().into();

        Self {
            agent,
            credentials,
            token: Mutex::new(None),
        }
    }

    fn listing_url(&self, topic: &str, limit: usize) -> Result<Url, SourceError> {
        let limit = limit.clamp(1, MAX_LISTING_LIMIT).to_string();
        let (base, page) = if self.credentials.is_some() {
            (OAUTH_BASE_URL, "hot")
        } else {
            (PUBLIC_BASE_URL, "hot.json")
        };
        let mut url =
            Url::parse(base).map_err(|e| SourceError::Malformed(format!("bad listing url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Malformed("listing base url cannot hold a path".to_string()))?
            .clear()
            .extend(["r", topic.trim(), page]);
        url.query_pairs_mut()
            .append_pair("limit", &limit)
            .append_pair("raw_json", "1");
        Ok(url)
    }

    fn bearer_token(&self, credentials: &RedditCredentials) -> Result<String, SourceError> {
        let mut cached = self
            .token
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let basic = base64::engine::general_purpose::STANDARD.encode(format!(
            "{}:{}",
            credentials.client_id, credentials.client_secret
        ));
        let mut response = self
            .agent
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {basic}"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send("grant_type=client_credentials")
            .map_err(|e| SourceError::Network(e.to_string()))?;
        check_status(response.status().as_u16())?;

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| SourceError::Network(e.to_string()))?;
        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| SourceError::Malformed(e.to_string()))?;
        let Some(value) = parsed.access_token.filter(|v| !v.is_empty()) else {
            return Err(SourceError::Unauthorized { status: 200 });
        };

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(3600));
        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_SLACK),
        });
        Ok(value)
    }
}

impl ContentSource for RedditClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Reddit
    }

    fn list_hot(&self, topic: &str, limit: usize) -> Result<Vec<Candidate>, SourceError> {
        let url = self.listing_url(topic, limit)?;
        let mut request = self.agent.get(url.as_str());
        if let Some(credentials) = self.credentials.as_ref() {
            let token = self.bearer_token(credentials)?;
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let mut response = request
            .call()
            .map_err(|e| SourceError::Network(e.to_string()))?;
        check_status(response.status().as_u16())?;

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| SourceError::Network(e.to_string()))?;
        let mut candidates = parse_listing(&body)?;
        candidates.truncate(limit);
        Ok(candidates)
    }
}

fn check_status(status: u16) -> Result<(), SourceError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(SourceError::Unauthorized { status }),
        429 => Err(SourceError::RateLimited),
        _ => Err(SourceError::Http { status }),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    is_self: bool,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    media: Option<PostMedia>,
    #[serde(default)]
    secure_media: Option<PostMedia>,
    #[serde(default)]
    is_gallery: bool,
    #[serde(default)]
    post_hint: Option<String>,
}

impl PostData {
    /// Galleries, and link posts that point at a page instead of a file.
    fn is_unsupported(&self) -> bool {
        if self.is_self || self.is_video {
            return false;
        }
        let url = self.url.as_deref().unwrap_or("");
        if self.is_gallery || url.contains("/gallery/") {
            return true;
        }
        match self.post_hint.as_deref() {
            Some("link" | "rich:video") => !has_media_extension(url),
            _ => false,
        }
    }
}

fn has_media_extension(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => return false,
    };
    path.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .is_some_and(|(_, ext)| {
            MEDIA_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[derive(Debug, Deserialize)]
struct PostMedia {
    reddit_video: Option<RedditVideo>,
}

#[derive(Debug, Deserialize)]
struct RedditVideo {
    fallback_url: Option<String>,
}

pub fn parse_listing(body: &str) -> Result<Vec<Candidate>, SourceError> {
    let listing: Listing =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

    Ok(listing
        .data
        .children
        .into_iter()
        .map(|child| {
            let post = child.data;
            if post.is_unsupported() {
                return Candidate::unsupported(&post.title, post.url.as_deref().unwrap_or(""));
            }
            let fallback = [post.media.as_ref(), post.secure_media.as_ref()]
                .into_iter()
                .flatten()
                .filter_map(|m| m.reddit_video.as_ref())
                .find_map(|v| v.fallback_url.clone());
            Candidate {
                title: post.title,
                source_url: post.url.unwrap_or_default(),
                is_text_only: post.is_self,
                is_video: post.is_video,
                video_fallback_url: if post.is_video { fallback } else { None },
                is_unsupported: false,
            }
        })
        .collect())
}
