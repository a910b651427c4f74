//! Public URLs of a voucher and their LNURL encodings

use super::codec::{encode_lnurl, Bech32Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Pay,
    Withdraw,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Pay => "pay",
            LinkKind::Withdraw => "withdraw",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pay" => Some(LinkKind::Pay),
            "withdraw" => Some(LinkKind::Withdraw),
            _ => None,
        }
    }
}

/// URL builder rooted at the configured public base URL
#[derive(Debug, Clone)]
pub struct Links {
    base_url: String,
}

impl Links {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn voucher_url(&self, kind: LinkKind, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, kind.as_str(), id)
    }

    pub fn callback_url(&self, kind: LinkKind, id: &str) -> String {
        format!("{}/callback", self.voucher_url(kind, id))
    }

    pub fn lnurl(&self, kind: LinkKind, id: &str) -> Result<String, Bech32Error> {
        encode_lnurl(&self.voucher_url(kind, id))
    }

    /// JSON info endpoint for an encoded voucher link
    pub fn info_url(&self, lnurl: &str) -> String {
        format!("{}/api/vouchers/info?lightning={}", self.base_url, lnurl)
    }
}

/// Extract `(kind, id)` from a decoded voucher URL such as
/// `https://host/pay/<id>`. Callback URLs and unrelated paths yield `None`.
pub fn parse_voucher_url(raw: &str) -> Option<(LinkKind, String)> {
    let parsed = url::Url::parse(raw).ok()?;
    let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
    let kind = LinkKind::from_str(segments.next()?)?;
    let id = segments.next()?.to_string();
    if segments.next().is_some() {
        return None;
    }
    Some((kind, id))
}
