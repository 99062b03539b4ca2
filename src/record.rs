use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRef {
    pub set_spec: String,
    pub set_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub surname: String,
    pub given_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    pub lang: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub lang: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub lang: String,
    pub kwd: String,
}

/// Local-mirror representation of a document's metadata. One row per
/// `doc_id` in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub doc_id: String,
    pub xml_url: String,
    pub timestamp: String,
    pub pub_date: Option<NaiveDate>,
    pub language: String,
    pub publisher: String,
    pub doi: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub journal_acron: String,
    pub sets: Vec<SetRef>,
    pub creators: Vec<Creator>,
    pub titles: Vec<Title>,
    pub descriptions: Vec<Description>,
    pub keywords: Vec<Keyword>,
}

impl Record {
    /// `oai:scielo.org:{doc_id}`-shaped identifier used as the OAI header
    /// identifier and as the suffix `GetRecord` strips to resolve a
    /// `doc_id`.
    pub fn oai_identifier(&self, repo_domain: &str) -> String {
        format!("oai:{repo_domain}:{}", self.doc_id)
    }

    pub fn set_specs(&self) -> Vec<String> {
        self.sets
            .iter()
            .map(|s| s.set_spec.clone())
            .filter(|s| !s.is_empty())
            .collect()
    }
}
