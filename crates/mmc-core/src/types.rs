use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MediaError;

/// Kind of media being transported. Selects the HKDF info string and the
/// upload path on the content host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Ptt,
    Ptv,
    Gif,
    Document,
    Sticker,
    Product,
    Ppic,
    ThumbnailImage,
    ThumbnailVideo,
    ThumbnailDocument,
    ThumbnailLink,
    MdMsgHist,
    MdAppState,
    ProductCatalogImage,
    PaymentBgImage,
    BizCoverPhoto,
}

impl MediaType {
    pub const ALL: [MediaType; 19] = [
        MediaType::Image,
        MediaType::Video,
        MediaType::Audio,
        MediaType::Ptt,
        MediaType::Ptv,
        MediaType::Gif,
        MediaType::Document,
        MediaType::Sticker,
        MediaType::Product,
        MediaType::Ppic,
        MediaType::ThumbnailImage,
        MediaType::ThumbnailVideo,
        MediaType::ThumbnailDocument,
        MediaType::ThumbnailLink,
        MediaType::MdMsgHist,
        MediaType::MdAppState,
        MediaType::ProductCatalogImage,
        MediaType::PaymentBgImage,
        MediaType::BizCoverPhoto,
    ];

    /// Wire name, e.g. `thumbnail-image`
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Ptt => "ptt",
            MediaType::Ptv => "ptv",
            MediaType::Gif => "gif",
            MediaType::Document => "document",
            MediaType::Sticker => "sticker",
            MediaType::Product => "product",
            MediaType::Ppic => "ppic",
            MediaType::ThumbnailImage => "thumbnail-image",
            MediaType::ThumbnailVideo => "thumbnail-video",
            MediaType::ThumbnailDocument => "thumbnail-document",
            MediaType::ThumbnailLink => "thumbnail-link",
            MediaType::MdMsgHist => "md-msg-hist",
            MediaType::MdAppState => "md-app-state",
            MediaType::ProductCatalogImage => "product-catalog-image",
            MediaType::PaymentBgImage => "payment-bg-image",
            MediaType::BizCoverPhoto => "biz-cover-photo",
        }
    }

    /// Label spliced into the HKDF info string (`WhatsApp {label} Keys`).
    ///
    /// Profile pictures and catalog images carry an empty label; the info
    /// string then contains two consecutive spaces.
    pub fn hkdf_label(&self) -> &'static str {
        match self {
            MediaType::Audio | MediaType::Ptt => "Audio",
            MediaType::Document => "Document",
            MediaType::Gif | MediaType::Video | MediaType::Ptv => "Video",
            MediaType::Image
            | MediaType::Sticker
            | MediaType::Product
            | MediaType::BizCoverPhoto => "Image",
            MediaType::Ppic | MediaType::ProductCatalogImage => "",
            MediaType::ThumbnailDocument => "Document Thumbnail",
            MediaType::ThumbnailImage => "Image Thumbnail",
            MediaType::ThumbnailVideo => "Video Thumbnail",
            MediaType::ThumbnailLink => "Link Thumbnail",
            MediaType::MdMsgHist => "History",
            MediaType::MdAppState => "App State",
            MediaType::PaymentBgImage => "Payment Background",
        }
    }

    /// Path prefix on the upload host, if this media type can be uploaded.
    pub fn upload_path(&self) -> Option<&'static str> {
        match self {
            MediaType::Image | MediaType::Sticker | MediaType::ThumbnailLink => Some("/mms/image"),
            MediaType::Video => Some("/mms/video"),
            MediaType::Document => Some("/mms/document"),
            MediaType::Audio => Some("/mms/audio"),
            MediaType::ProductCatalogImage => Some("/product/image"),
            MediaType::MdAppState => Some(""),
            MediaType::MdMsgHist => Some("/mms/md-app-state"),
            MediaType::BizCoverPhoto => Some("/pps/biz-cover-photo"),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MediaType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MediaError::Config(format!("unknown media type: {s}")))
    }
}

/// Identity of a protocol message (the message whose media is being fetched
/// or re-requested).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageKey {
    pub id: String,
    pub remote_jid: String,
    pub from_me: bool,
    pub participant: Option<String>,
}

/// The media fields of an incoming message needed to download it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaReference {
    pub media_key: Vec<u8>,
    pub direct_path: Option<String>,
    pub url: Option<String>,
}

/// File extension for a mimetype, e.g. `audio/ogg; codecs=opus` → `ogg`.
pub fn extension_for_mimetype(mimetype: &str) -> Option<&str> {
    let essence = mimetype.split(';').next()?.trim();
    let (_, subtype) = essence.split_once('/')?;
    if subtype.is_empty() {
        None
    } else {
        Some(subtype)
    }
}
