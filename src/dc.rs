use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::record::Record;

/// Maps an article's publication type to the OpenAIRE `info:eu-repo/semantics/*`
/// vocabulary, per the mapping the reference metadata store carries
/// (`ARTICLETYPE_TO_VOCABULARY_MAP`). Unknown types fall back to `.../other`.
const PUBTYPE_VOCABULARY: &[(&str, &str)] = &[
    ("research-article", "info:eu-repo/semantics/article"),
    ("article-commentary", "info:eu-repo/semantics/other"),
    ("book-review", "info:eu-repo/semantics/review"),
    ("brief-report", "info:eu-repo/semantics/report"),
    ("case-report", "info:eu-repo/semantics/report"),
    ("correction", "info:eu-repo/semantics/other"),
    ("editorial", "info:eu-repo/semantics/other"),
    ("in-brief", "info:eu-repo/semantics/other"),
    ("letter", "info:eu-repo/semantics/other"),
    ("other", "info:eu-repo/semantics/other"),
    ("partial-retraction", "info:eu-repo/semantics/other"),
    ("rapid-communication", "info:eu-repo/semantics/other"),
    ("reply", "info:eu-repo/semantics/other"),
    ("retraction", "info:eu-repo/semantics/other"),
    ("review-article", "info:eu-repo/semantics/article"),
];

pub fn pubtype_to_vocabulary(type_: &str) -> &'static str {
    PUBTYPE_VOCABULARY
        .iter()
        .find(|(k, _)| *k == type_)
        .map(|(_, v)| *v)
        .unwrap_or("info:eu-repo/semantics/other")
}

/// A Dublin Core element's value: either plain text, or text tagged with an
/// `xml:lang`.
enum DcValue {
    Plain(String),
    Lang { text: String, lang: String },
}

/// Python's `str.title()`: the first letter of each whitespace-separated
/// word uppercased, the rest lowercased. Used for `creator` and `subject`
/// values, matching the reference store's `.title()` calls.
fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn creators(record: &Record) -> Vec<DcValue> {
    record
        .creators
        .iter()
        .map(|c| {
            let surname = title_case(&c.surname);
            let given = title_case(&c.given_name);
            let name = if surname.is_empty() {
                given
            } else if given.is_empty() {
                surname
            } else {
                format!("{surname}, {given}")
            };
            DcValue::Plain(name)
        })
        .collect()
}

fn subjects(record: &Record) -> Vec<DcValue> {
    record
        .keywords
        .iter()
        .filter(|k| !k.kwd.is_empty())
        .map(|k| DcValue::Lang { text: title_case(&k.kwd), lang: k.lang.clone() })
        .collect()
}

fn descriptions(record: &Record) -> Vec<DcValue> {
    record
        .descriptions
        .iter()
        .filter(|d| !d.description.is_empty())
        .map(|d| DcValue::Lang { text: d.description.clone(), lang: d.lang.clone() })
        .collect()
}

fn titles(record: &Record) -> Vec<DcValue> {
    record
        .titles
        .iter()
        .filter(|t| !t.title.is_empty())
        .map(|t| DcValue::Lang { text: t.title.clone(), lang: t.lang.clone() })
        .collect()
}

fn identifier_url(record: &Record, site_base_url: &str) -> String {
    format!(
        "{}/j/{}/a/{}",
        site_base_url.trim_end_matches('/'),
        record.journal_acron,
        record.doc_id
    )
}

fn dc_fields(record: &Record, site_base_url: &str) -> Vec<(&'static str, Vec<DcValue>)> {
    let single = |s: &str| {
        if s.is_empty() {
            Vec::new()
        } else {
            vec![DcValue::Plain(s.to_string())]
        }
    };

    vec![
        ("title", titles(record)),
        ("creator", creators(record)),
        ("subject", subjects(record)),
        ("description", descriptions(record)),
        ("publisher", single(&record.publisher)),
        ("contributor", Vec::new()),
        ("date", record.pub_date.map(|d| vec![DcValue::Plain(d.format("%Y-%m-%d").to_string())]).unwrap_or_default()),
        ("type", vec![DcValue::Plain(pubtype_to_vocabulary(&record.type_).to_string())]),
        ("format", vec![DcValue::Plain("text/html".to_string())]),
        ("identifier", vec![DcValue::Plain(identifier_url(record, site_base_url))]),
        ("source", Vec::new()),
        ("language", single(&record.language)),
        ("relation", single(&record.doi)),
        ("coverage", Vec::new()),
        ("rights", vec![DcValue::Plain("info:eu-repo/semantics/openAccess".to_string())]),
    ]
}

/// Emits the `oai_dc:dc` element (and its Dublin Core children, in the
/// reference writer's fixed order) for `record` into `writer`, matching
/// `oaipmhserver/server.py`'s `lang_aware_oai_dc_writer`.
pub fn write_oai_dc(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    record: &Record,
    site_base_url: &str,
) -> quick_xml::Result<()> {
    let mut dc = BytesStart::new("oai_dc:dc");
    dc.push_attribute(("xmlns:oai_dc", "http://www.openarchives.org/OAI/2.0/oai_dc/"));
    dc.push_attribute(("xmlns:dc", "http://purl.org/dc/elements/1.1/"));
    dc.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
    dc.push_attribute((
        "xsi:schemaLocation",
        "http://www.openarchives.org/OAI/2.0/oai_dc/ http://www.openarchives.org/OAI/2.0/oai_dc.xsd",
    ));
    writer.write_event(Event::Start(dc))?;

    for (name, values) in dc_fields(record, site_base_url) {
        let tag = format!("dc:{name}");
        for value in values {
            let mut start = BytesStart::new(&tag);
            let text = match &value {
                DcValue::Plain(text) => text.clone(),
                DcValue::Lang { text, lang } => {
                    if !lang.is_empty() {
                        start.push_attribute(("xml:lang", lang.as_str()));
                    }
                    text.clone()
                }
            };
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(&text)))?;
            writer.write_event(Event::End(BytesEnd::new(&tag)))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("oai_dc:dc")))?;
    Ok(())
}

/// Convenience wrapper returning the rendered XML as a `String`.
pub fn render_oai_dc(record: &Record, site_base_url: &str) -> anyhow::Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_oai_dc(&mut writer, record, site_base_url)?;
    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes)?)
}
