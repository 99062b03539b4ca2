use anyhow::{Result, bail};
use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::record::{Creator, Description, Keyword, Record, SetRef, Title};

/// A single step in a defensive path into nested JSON: either an object key
/// or an array index. Mirrors the reference implementation's `_nestget`,
/// which tolerates missing keys and out-of-range indices by falling back to
/// a default rather than raising.
#[derive(Debug, Clone)]
pub enum Seg<'a> {
    Key(&'a str),
    Idx(usize),
}

/// Walks `value` along `path`, returning `None` at the first missing key or
/// out-of-range index instead of erroring.
pub fn nestget<'v>(value: &'v Value, path: &[Seg]) -> Option<&'v Value> {
    let mut cur = value;
    for seg in path {
        cur = match seg {
            Seg::Key(k) => cur.get(k)?,
            Seg::Idx(i) => cur.get(i)?,
        };
    }
    Some(cur)
}

/// Same as `nestget`, but returns an owned string (empty on any miss or
/// non-string value), matching the reference's `default=""` convention.
pub fn nestget_str(value: &Value, path: &[Seg]) -> String {
    nestget(value, path)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

const PUB_DATE_FORMATS: &[&str] = &["%d %m %Y", "%d%m%Y", "%m %Y", "%Y"];

/// Parses a publication date against the formats the upstream front-matter
/// uses, in order. Missing day/month components default to 1, matching
/// `strptime`'s defaulting behavior for partial formats such as `%Y`.
pub fn parse_pub_date(raw: &str) -> Option<NaiveDate> {
    for fmt in PUB_DATE_FORMATS {
        let mut parsed = chrono::format::Parsed::new();
        if chrono::format::parse(&mut parsed, raw, chrono::format::StrftimeItems::new(fmt)).is_ok() {
            if parsed.day.is_none() {
                parsed.day = Some(1);
            }
            if parsed.month.is_none() {
                parsed.month = Some(1);
            }
            if let Ok(date) = parsed.to_naive_date() {
                return Some(date);
            }
        }
    }
    None
}

/// Extracts the trailing path segment from an absolute or relative URL,
/// used as the `doc_id`.
fn last_path_segment(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Pure transform from upstream front-matter JSON to the stored `Record`
/// shape. `doc_url` is the document's absolute URL (used both to derive
/// `doc_id` and stored verbatim as `xml_url`). Fails (and the caller must
/// drop the task) when `pub_date` doesn't match any of the known formats,
/// mirroring `_parse_date`'s `ValueError` in the reference extractor.
pub fn extract_record(doc_url: &str, front: &Value) -> Result<Record> {
    let journal_meta = |idx: usize, key: &str| -> String {
        nestget_str(front, &[Seg::Key("journal_meta"), Seg::Idx(0), Seg::Key(key), Seg::Idx(idx)])
    };

    let set_spec = journal_meta(0, "journal_publisher_id");
    let set_name = journal_meta(0, "journal_title");
    let sets = if set_spec.is_empty() && set_name.is_empty() {
        Vec::new()
    } else {
        vec![SetRef { set_spec, set_name }]
    };
    let journal_acron = sets.first().map(|s| s.set_spec.clone()).unwrap_or_default();

    let language = nestget_str(front, &[Seg::Key("article"), Seg::Idx(0), Seg::Key("lang"), Seg::Idx(0)]);

    let creators = front
        .get("contrib")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|c| Creator {
                    surname: nestget_str(c, &[Seg::Key("contrib_surname"), Seg::Idx(0)]),
                    given_name: nestget_str(c, &[Seg::Key("contrib_given_names"), Seg::Idx(0)]),
                })
                .collect()
        })
        .unwrap_or_default();

    let article_title = nestget_str(
        front,
        &[Seg::Key("article_meta"), Seg::Idx(0), Seg::Key("article_title"), Seg::Idx(0)],
    );
    let titles = if article_title.is_empty() {
        Vec::new()
    } else {
        vec![Title {
            lang: language.clone(),
            title: article_title,
        }]
    };

    let mut descriptions = Vec::new();
    let original_abstract = nestget_str(
        front,
        &[Seg::Key("article_meta"), Seg::Idx(0), Seg::Key("abstract"), Seg::Idx(0)],
    );
    if !original_abstract.is_empty() {
        descriptions.push(Description {
            lang: language.clone(),
            description: original_abstract,
        });
    }
    if let Some(trans_abstracts) = front.get("trans_abstract").and_then(Value::as_array) {
        for t in trans_abstracts {
            let description = nestget_str(t, &[Seg::Key("text"), Seg::Idx(0)]);
            if description.is_empty() {
                continue;
            }
            descriptions.push(Description {
                lang: nestget_str(t, &[Seg::Key("lang"), Seg::Idx(0)]),
                description,
            });
        }
    }

    let mut keywords = Vec::new();
    if let Some(kwd_groups) = front.get("kwd_group").and_then(Value::as_array) {
        for group in kwd_groups {
            let lang = nestget_str(group, &[Seg::Key("lang"), Seg::Idx(0)]);
            if let Some(kwds) = group.get("kwd").and_then(Value::as_array) {
                for kwd in kwds {
                    if let Some(text) = kwd.as_str() {
                        keywords.push(Keyword {
                            lang: lang.clone(),
                            kwd: text.to_string(),
                        });
                    }
                }
            }
        }
    }

    let raw_pub_date = nestget_str(front, &[Seg::Key("pub_date"), Seg::Idx(0), Seg::Key("text"), Seg::Idx(0)]);
    let pub_date = match parse_pub_date(&raw_pub_date) {
        Some(date) => date,
        None => bail!("could not parse pub_date {raw_pub_date:?} against any known format"),
    };

    Ok(Record {
        doc_id: last_path_segment(doc_url),
        xml_url: doc_url.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        pub_date: Some(pub_date),
        language,
        publisher: journal_meta(0, "publisher_name"),
        doi: nestget_str(front, &[Seg::Key("article_meta"), Seg::Idx(0), Seg::Key("article_doi"), Seg::Idx(0)]),
        type_: nestget_str(front, &[Seg::Key("article"), Seg::Idx(0), Seg::Key("type"), Seg::Idx(0)]),
        journal_acron,
        sets,
        creators,
        titles,
        descriptions,
        keywords,
    })
}
