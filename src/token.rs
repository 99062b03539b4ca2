use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};

/// Opaque pagination cursor passed between an OAI-PMH client and this
/// provider. Encoded as six comma-joined fields, in this fixed order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResumptionToken {
    pub set: Option<String>,
    pub from: Option<String>,
    pub until: Option<String>,
    pub offset: Option<String>,
    pub count: Option<u64>,
    pub metadata_prefix: Option<String>,
}

const ATTRS: usize = 6;

impl ResumptionToken {
    pub fn new(
        set: Option<String>,
        from: Option<String>,
        until: Option<String>,
        offset: Option<String>,
        count: Option<u64>,
        metadata_prefix: Option<String>,
    ) -> Self {
        ResumptionToken {
            set,
            from,
            until,
            offset,
            count,
            metadata_prefix,
        }
    }

    /// Comma-joined positional encoding. `None` fields become empty segments.
    pub fn encode(&self) -> String {
        let fields = [
            self.set.clone().unwrap_or_default(),
            self.from.clone().unwrap_or_default(),
            self.until.clone().unwrap_or_default(),
            self.offset.clone().unwrap_or_default(),
            self.count.map(|c| c.to_string()).unwrap_or_default(),
            self.metadata_prefix.clone().unwrap_or_default(),
        ];
        fields.join(",")
    }

    /// Computes the token for the following page, given the ids of the
    /// records just returned and the expected page size (the token's own
    /// `count`). Returns `None` once the page was short, signalling that
    /// pagination is complete.
    ///
    /// The new `offset` is simply the last entry of `page_ids`, stringified;
    /// this type stays agnostic about what those ids mean. Callers decide:
    /// `oai_server.rs` passes absolute skip positions so `offset` doubles as
    /// a valid next `skip` count for `DocumentStore::filter` (see DESIGN.md).
    pub fn next(&self, page_ids: &[String]) -> Option<ResumptionToken> {
        let count = self.count?;
        if page_ids.len() as u64 != count {
            return None;
        }
        let last_id = page_ids.last()?.clone();
        Some(ResumptionToken {
            offset: Some(last_id),
            ..self.clone()
        })
    }
}

impl fmt::Display for ResumptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for ResumptionToken {
    type Err = anyhow::Error;

    /// Positional decode. Trailing missing fields map to `None`; this is
    /// the inverse of `encode` up to stringification of `count`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts: Vec<&str> = s.split(',').collect();
        parts.resize(ATTRS, "");

        let non_empty = |s: &str| -> Option<String> {
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        };

        let count = match non_empty(parts[4]) {
            Some(s) => Some(
                s.parse::<u64>()
                    .with_context(|| format!("resumption token has non-numeric count: {s:?}"))?,
            ),
            None => None,
        };

        Ok(ResumptionToken {
            set: non_empty(parts[0]),
            from: non_empty(parts[1]),
            until: non_empty(parts[2]),
            offset: non_empty(parts[3]),
            count,
            metadata_prefix: non_empty(parts[5]),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encodes_full_token() {
        let token = ResumptionToken::new(
            None,
            Some("1998-01-01".into()),
            Some("1998-12-31".into()),
            Some("5dd17ed0d0926d03e0638525".into()),
            Some(1000),
            Some("oai_dc".into()),
        );
        assert_eq!(
            token.encode(),
            ",1998-01-01,1998-12-31,5dd17ed0d0926d03e0638525,1000,oai_dc"
        );
    }

    #[test]
    fn encodes_token_without_count() {
        let token = ResumptionToken::new(
            None,
            Some("1998-01-01".into()),
            Some("1998-12-31".into()),
            Some("5dd17ed0d0926d03e0638525".into()),
            None,
            Some("oai_dc".into()),
        );
        assert_eq!(
            token.encode(),
            ",1998-01-01,1998-12-31,5dd17ed0d0926d03e0638525,,oai_dc"
        );
    }

    #[test]
    fn decode_is_inverse_of_encode() {
        let token = ResumptionToken::new(
            Some("v1".into()),
            Some("1998-01-01".into()),
            Some("1998-12-31".into()),
            Some("abc".into()),
            Some(100),
            Some("oai_dc".into()),
        );
        let decoded: ResumptionToken = token.encode().parse().unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn decode_short_string_fills_none() {
        let decoded: ResumptionToken = "set,from".parse().unwrap();
        assert_eq!(decoded.set, Some("set".into()));
        assert_eq!(decoded.from, Some("from".into()));
        assert_eq!(decoded.until, None);
        assert_eq!(decoded.count, None);
    }

    #[test]
    fn next_on_full_page_advances_offset() {
        let token = ResumptionToken::new(None, None, None, None, Some(2), Some("oai_dc".into()));
        let page = vec!["...525".to_string(), "...526".to_string()];
        let next = token.next(&page).unwrap();
        assert_eq!(next.offset, Some("...526".to_string()));
        assert_eq!(next.count, Some(2));
    }

    #[test]
    fn next_on_short_page_is_none() {
        let token = ResumptionToken::new(None, None, None, None, Some(2), Some("oai_dc".into()));
        let page = vec!["...525".to_string()];
        assert!(token.next(&page).is_none());
    }

    #[test]
    fn next_without_count_is_none() {
        let token = ResumptionToken::default();
        assert!(token.next(&["a".to_string()]).is_none());
    }
}
