//! The boundary with the WeChat draft API.
//!
//! No HTTP client lives here: [`Publisher`] is implemented by whatever transport the caller
//! brings. This module owns the wire shapes, the error taxonomy callers branch on and the
//! token expiry rule.

pub mod images;

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::meta::Metadata;

pub use images::{local_images, process_images, replace_sources, upload_images, Upload};

/// Access tokens are refreshed this long before the API says they expire.
pub const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

const RATE_LIMITED: &[i64] = &[45009];
const INVALID_CREDENTIAL: &[i64] = &[40001, 40125, 40164, 42001];

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("WeChat API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("Could not reach the WeChat API: {0}")]
    Transport(String),
    #[error("Malformed WeChat API response")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How an [`ApiError`] should be presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    RateLimited,
    InvalidCredential,
    Other,
}

impl ApiError {
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self.code() {
            Some(code) if RATE_LIMITED.contains(&code) => ApiErrorKind::RateLimited,
            Some(code) if INVALID_CREDENTIAL.contains(&code) => ApiErrorKind::InvalidCredential,
            _ => ApiErrorKind::Other,
        }
    }

    /// A hint for the user, where one exists.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.kind() {
            ApiErrorKind::RateLimited => Some("The daily API quota is exhausted; try again tomorrow."),
            ApiErrorKind::InvalidCredential => {
                Some("Check WECHAT_APP_ID and WECHAT_APP_SECRET, and that this machine's IP is whitelisted.")
            }
            ApiErrorKind::Other => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Status {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Checks the `errcode` every API response carries, then decodes the body as `T`.
pub fn decode_response<'de, T: Deserialize<'de>>(body: &'de str) -> Result<T, ApiError> {
    let status: Status = serde_json::from_str(body)?;

    if status.errcode != 0 {
        return Err(ApiError::Api {
            code: status.errcode,
            message: status.errmsg,
        });
    }

    Ok(serde_json::from_str(body)?)
}

/// One article of a draft, in the shape the draft API expects.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
    pub content: String,
    #[serde(default, rename = "content_source_url", skip_serializing_if = "String::is_empty")]
    pub source_url: String,
    pub thumb_media_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_cover_pic: Option<u8>,
    pub need_open_comment: u8,
    pub only_fans_can_comment: u8,
}

impl Article {
    /// Builds an article from extracted metadata. The frontmatter author wins over
    /// `default_author`.
    pub fn new(meta: &Metadata, content: String, thumb_media_id: String, default_author: &str) -> Self {
        Self {
            title: meta.title.clone(),
            author: meta.author.clone().unwrap_or_else(|| default_author.to_owned()),
            digest: meta.digest.clone(),
            content,
            source_url: String::new(),
            thumb_media_id,
            show_cover_pic: None,
            need_open_comment: 0,
            only_fans_can_comment: 0,
        }
    }

    pub fn with_comments(mut self, open: bool, fans_only: bool) -> Self {
        self.need_open_comment = open.into();
        self.only_fans_can_comment = (open && fans_only).into();
        self
    }
}

#[derive(Serialize, Debug)]
pub struct CreateDraft<'a> {
    pub articles: &'a [Article],
}

#[derive(Serialize, Debug)]
pub struct UpdateDraft<'a> {
    pub media_id: &'a str,
    pub index: u32,
    pub articles: &'a Article,
}

/// The remote side of publishing.
pub trait Publisher {
    /// Uploads an image for use inside article content, returning its URL.
    fn upload_image(&self, path: &std::path::Path) -> Result<String, ApiError>;
    /// Uploads a cover thumbnail as permanent material, returning its media ID.
    fn upload_thumb(&self, path: &std::path::Path) -> Result<String, ApiError>;
    /// Creates a draft, returning its media ID.
    fn create_draft(&self, articles: &[Article]) -> Result<String, ApiError>;
    fn update_draft(&self, media_id: &str, index: u32, article: &Article) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: u64,
}

/// Caches one access token until shortly before it expires.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<(String, Instant)>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fetch: impl FnOnce() -> Result<AccessToken, ApiError>) -> Result<String, ApiError> {
        self.get_at(Instant::now(), fetch)
    }

    /// As [`TokenCache::get`], with an explicit clock.
    pub fn get_at(
        &self,
        now: Instant,
        fetch: impl FnOnce() -> Result<AccessToken, ApiError>,
    ) -> Result<String, ApiError> {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some((token, valid_until)) = slot.as_ref() {
            if now < *valid_until {
                return Ok(token.clone());
            }
        }

        tracing::debug!("Access token missing or near expiry, fetching a new one.");
        let fresh = fetch()?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(TOKEN_EXPIRY_BUFFER);
        *slot = Some((fresh.access_token.clone(), now + lifetime));

        Ok(fresh.access_token)
    }

    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::{Cell, RefCell};
    use std::path::{Path, PathBuf};

    use serde_json::json;

    use super::*;

    /// Records uploads and drafts in memory. With `failing` set, every upload is rejected.
    #[derive(Default)]
    pub struct FakePublisher {
        pub failing: bool,
        pub uploads: RefCell<Vec<PathBuf>>,
        pub drafts: RefCell<Vec<Article>>,
    }

    impl Publisher for FakePublisher {
        fn upload_image(&self, path: &Path) -> Result<String, ApiError> {
            self.uploads.borrow_mut().push(path.to_owned());

            let name = path.file_name().unwrap().to_string_lossy();
            match self.failing {
                true => Err(ApiError::Api {
                    code: 40005,
                    message: "invalid file type".to_owned(),
                }),
                false => Ok(format!("https://mmbiz.qpic.cn/{name}")),
            }
        }

        fn upload_thumb(&self, path: &Path) -> Result<String, ApiError> {
            self.uploads.borrow_mut().push(path.to_owned());

            match self.failing {
                true => Err(ApiError::Transport("connection reset".to_owned())),
                false => Ok(format!("THUMB_{}", self.uploads.borrow().len())),
            }
        }

        fn create_draft(&self, articles: &[Article]) -> Result<String, ApiError> {
            self.drafts.borrow_mut().extend_from_slice(articles);
            Ok("MEDIA_ID".to_owned())
        }

        fn update_draft(&self, _: &str, index: u32, article: &Article) -> Result<(), ApiError> {
            let mut drafts = self.drafts.borrow_mut();
            match drafts.get_mut(index as usize) {
                Some(slot) => {
                    *slot = article.clone();
                    Ok(())
                }
                None => Err(ApiError::Api {
                    code: 53402,
                    message: "invalid index".to_owned(),
                }),
            }
        }
    }

    fn meta(author: Option<&str>, digest: &str) -> Metadata {
        Metadata {
            title: "T".to_owned(),
            digest: digest.to_owned(),
            author: author.map(str::to_owned),
        }
    }

    #[test]
    fn article_wire_shape() {
        let article = Article::new(&meta(None, ""), "<p>x</p>".to_owned(), "THUMB".to_owned(), "Bob")
            .with_comments(true, true);

        assert_eq!(
            serde_json::to_value(&article).unwrap(),
            json!({
                "title": "T",
                "author": "Bob",
                "content": "<p>x</p>",
                "thumb_media_id": "THUMB",
                "need_open_comment": 1,
                "only_fans_can_comment": 1,
            })
        );
    }

    #[test]
    fn frontmatter_author_and_digest() {
        let article = Article::new(&meta(Some("Ann"), "Short."), String::new(), String::new(), "Bob");

        assert_eq!(article.author, "Ann");
        assert_eq!(serde_json::to_value(&article).unwrap()["digest"], "Short.");
    }

    #[test]
    fn update_request_shape() {
        let article = Article::new(&meta(None, ""), String::new(), String::new(), "");
        let request = UpdateDraft {
            media_id: "M",
            index: 0,
            articles: &article,
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["media_id"], "M");
        assert_eq!(value["index"], 0);
        assert_eq!(value["articles"]["title"], "T");
    }

    #[test]
    fn fake_publisher_round() {
        let publisher = FakePublisher::default();
        let article = Article::new(&meta(None, ""), String::new(), String::new(), "");

        assert_eq!(publisher.create_draft(&[article.clone()]).unwrap(), "MEDIA_ID");
        assert!(publisher.update_draft("MEDIA_ID", 0, &article).is_ok());
        assert_eq!(publisher.update_draft("MEDIA_ID", 3, &article).unwrap_err().code(), Some(53402));
    }

    #[test]
    fn error_kinds() {
        let err = |code| ApiError::Api {
            code,
            message: String::new(),
        };

        assert_eq!(err(45009).kind(), ApiErrorKind::RateLimited);
        assert_eq!(err(40001).kind(), ApiErrorKind::InvalidCredential);
        assert_eq!(err(42001).kind(), ApiErrorKind::InvalidCredential);
        assert_eq!(err(40007).kind(), ApiErrorKind::Other);
        assert_eq!(ApiError::Transport("down".to_owned()).kind(), ApiErrorKind::Other);
        assert!(err(45009).suggestion().is_some());
    }

    #[test]
    fn responses_are_checked() {
        let token: AccessToken =
            decode_response(r#"{"access_token": "abc", "expires_in": 7200}"#).unwrap();
        assert_eq!(token.access_token, "abc");

        let err = decode_response::<AccessToken>(r#"{"errcode": 40164, "errmsg": "invalid ip"}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ApiErrorKind::InvalidCredential);
        assert_eq!(err.to_string(), "WeChat API error 40164: invalid ip");
    }

    #[test]
    fn tokens_refresh_before_expiry() {
        let cache = TokenCache::new();
        let fetches = Cell::new(0);
        let fetch = || {
            fetches.set(fetches.get() + 1);
            Ok(AccessToken {
                access_token: format!("token-{}", fetches.get()),
                expires_in: 7200,
            })
        };

        let start = Instant::now();
        assert_eq!(cache.get_at(start, fetch).unwrap(), "token-1");
        assert_eq!(cache.get_at(start + Duration::from_secs(6000), fetch).unwrap(), "token-1");
        // Inside the five minute buffer.
        assert_eq!(cache.get_at(start + Duration::from_secs(6901), fetch).unwrap(), "token-2");
        assert_eq!(fetches.get(), 2);

        cache.clear();
        assert_eq!(cache.get_at(start, fetch).unwrap(), "token-3");
    }
}
