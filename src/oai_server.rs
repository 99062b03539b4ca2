use crate::record::Record;
use crate::settings::Settings;
use crate::store::DocumentStore;
use crate::token::ResumptionToken;

/// The OAI-PMH fault taxonomy this dispatcher can raise. Rendering these
/// into the `<error code="...">` XML wrapper is the surrounding HTTP
/// layer's job; this crate only classifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OaiFault {
    BadResumptionToken(String),
    CannotDisseminateFormat(String),
    IdDoesNotExist(String),
    NoRecordsMatch,
    NoSetHierarchy,
}

impl std::fmt::Display for OaiFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OaiFault::BadResumptionToken(msg) => write!(f, "badResumptionToken: {msg}"),
            OaiFault::CannotDisseminateFormat(msg) => write!(f, "cannotDisseminateFormat: {msg}"),
            OaiFault::IdDoesNotExist(msg) => write!(f, "idDoesNotExist: {msg}"),
            OaiFault::NoRecordsMatch => write!(f, "noRecordsMatch"),
            OaiFault::NoSetHierarchy => write!(f, "noSetHierarchy"),
        }
    }
}

impl std::error::Error for OaiFault {}

const KNOWN_METADATA_FORMATS: &[&str] = &["oai_dc"];

#[derive(Debug, Clone)]
pub struct IdentifyResult {
    pub repository_name: String,
    pub base_url: String,
    pub protocol_version: &'static str,
    pub admin_emails: Vec<String>,
    pub earliest_datestamp: String,
    pub deleted_record: String,
    pub granularity: String,
    pub compression: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub resumption_token: Option<ResumptionToken>,
}

/// Implements the six OAI-PMH verbs against a `DocumentStore`. The `set`
/// concept is a journal (identified by its `set_spec`); the only supported
/// metadata format is `oai_dc`.
pub struct OaiServer<'s> {
    store: &'s dyn DocumentStore,
    settings: &'s Settings,
}

impl<'s> OaiServer<'s> {
    pub fn new(store: &'s dyn DocumentStore, settings: &'s Settings) -> Self {
        OaiServer { store, settings }
    }

    fn oai_identifier(&self, record: &Record) -> String {
        record.oai_identifier(&self.settings.repo_domain)
    }

    fn doc_id_from_identifier(&self, identifier: &str) -> String {
        identifier.rsplit(':').next().unwrap_or(identifier).to_string()
    }

    pub fn identify(&self) -> anyhow::Result<IdentifyResult> {
        let earliest = self
            .store
            .earliest_datestamp()?
            .unwrap_or_else(|| self.settings.fallback_earliest_datestamp.clone());
        Ok(IdentifyResult {
            repository_name: self.settings.repo_name.clone(),
            base_url: self.settings.repo_base_url.clone(),
            protocol_version: "2.0",
            admin_emails: self.settings.admin_emails.clone(),
            earliest_datestamp: earliest,
            deleted_record: self.settings.deleted_record.clone(),
            granularity: self.settings.granularity.clone(),
            compression: self.settings.compression.clone(),
        })
    }

    pub fn list_metadata_formats(&self, identifier: Option<&str>) -> Result<Vec<&'static str>, OaiFault> {
        if let Some(identifier) = identifier {
            let doc_id = self.doc_id_from_identifier(identifier);
            if self
                .store
                .fetch(&doc_id)
                .map_err(|e| OaiFault::IdDoesNotExist(e.to_string()))?
                .is_none()
            {
                return Err(OaiFault::IdDoesNotExist(identifier.to_string()));
            }
        }
        Ok(KNOWN_METADATA_FORMATS.to_vec())
    }

    pub fn get_record(&self, metadata_prefix: &str, identifier: &str) -> Result<Record, OaiFault> {
        self.check_metadata_prefix(metadata_prefix)?;
        let doc_id = self.doc_id_from_identifier(identifier);
        self.store
            .fetch(&doc_id)
            .map_err(|e| OaiFault::IdDoesNotExist(e.to_string()))?
            .ok_or_else(|| OaiFault::IdDoesNotExist(identifier.to_string()))
    }

    pub fn list_sets(&self, resumption_token: Option<&str>) -> Result<ListPage<crate::record::SetRef>, OaiFault> {
        let token = self.resolve_token(resumption_token, None, None, None, None)?;
        let batch = self.settings.resumption_batch_size;
        let all = self.store.sets().map_err(|e| {
            eprintln!("store error listing sets: {e:#}");
            OaiFault::NoSetHierarchy
        })?;
        let offset: usize = token.offset.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0);
        let page: Vec<_> = all.into_iter().skip(offset).take(batch as usize).collect();

        let next = if page.len() as u64 == batch {
            Some(ResumptionToken {
                offset: Some((offset + page.len()).to_string()),
                count: Some(batch),
                ..token
            })
        } else {
            None
        };
        Ok(ListPage { items: page, resumption_token: next })
    }

    pub fn list_identifiers(
        &self,
        metadata_prefix: &str,
        set: Option<&str>,
        from: Option<&str>,
        until: Option<&str>,
        resumption_token: Option<&str>,
    ) -> Result<ListPage<Record>, OaiFault> {
        self.check_metadata_prefix(metadata_prefix)?;
        self.list_records_or_identifiers(set, from, until, resumption_token)
    }

    pub fn list_records(
        &self,
        metadata_prefix: &str,
        set: Option<&str>,
        from: Option<&str>,
        until: Option<&str>,
        resumption_token: Option<&str>,
    ) -> Result<ListPage<Record>, OaiFault> {
        self.check_metadata_prefix(metadata_prefix)?;
        self.list_records_or_identifiers(set, from, until, resumption_token)
    }

    fn list_records_or_identifiers(
        &self,
        set: Option<&str>,
        from: Option<&str>,
        until: Option<&str>,
        resumption_token: Option<&str>,
    ) -> Result<ListPage<Record>, OaiFault> {
        let token = self.resolve_token(resumption_token, set, from, until, None)?;
        let batch = self.settings.resumption_batch_size;
        let offset: u64 = token.offset.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0);

        let records = self
            .store
            .filter(
                token.set.as_deref(),
                token.from.as_deref(),
                token.until.as_deref(),
                offset,
                batch,
            )
            .map_err(|e| {
                eprintln!("store error listing records: {e:#}");
                OaiFault::NoRecordsMatch
            })?;

        if records.is_empty() {
            return Err(OaiFault::NoRecordsMatch);
        }

        // `token.next()` advances the cursor to the stringified last entry of
        // `page_ids`, so the last entry must be the *terminal* skip position
        // (`offset + len`), not the position of the last returned record —
        // otherwise the next `filter` call re-returns that record.
        let page_ids: Vec<String> = records
            .iter()
            .enumerate()
            .map(|(i, _)| (offset + i as u64 + 1).to_string())
            .collect();
        let next = token.next(&page_ids);
        Ok(ListPage { items: records, resumption_token: next })
    }

    fn resolve_token(
        &self,
        resumption_token: Option<&str>,
        set: Option<&str>,
        from: Option<&str>,
        until: Option<&str>,
        metadata_prefix: Option<&str>,
    ) -> Result<ResumptionToken, OaiFault> {
        match resumption_token {
            Some(raw) => raw
                .parse()
                .map_err(|e: anyhow::Error| OaiFault::BadResumptionToken(e.to_string())),
            None => Ok(ResumptionToken::new(
                set.map(str::to_string),
                from.map(str::to_string),
                until.map(str::to_string),
                Some("0".to_string()),
                Some(self.settings.resumption_batch_size),
                metadata_prefix.map(str::to_string),
            )),
        }
    }

    fn check_metadata_prefix(&self, metadata_prefix: &str) -> Result<(), OaiFault> {
        if KNOWN_METADATA_FORMATS.contains(&metadata_prefix) {
            Ok(())
        } else {
            Err(OaiFault::CannotDisseminateFormat(metadata_prefix.to_string()))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record::SetRef;
    use crate::store::SqliteDocumentStore;

    fn settings() -> Settings {
        Settings::defaults()
    }

    fn sample_record(doc_id: &str, timestamp: &str) -> Record {
        Record {
            doc_id: doc_id.to_string(),
            xml_url: format!("http://kernel.example/documents/{doc_id}"),
            timestamp: timestamp.to_string(),
            pub_date: None,
            language: "pt".to_string(),
            publisher: "Publisher".to_string(),
            doi: String::new(),
            type_: "research-article".to_string(),
            journal_acron: "rsp".to_string(),
            sets: vec![SetRef { set_spec: "rsp".to_string(), set_name: "Revista".to_string() }],
            creators: vec![],
            titles: vec![],
            descriptions: vec![],
            keywords: vec![],
        }
    }

    #[test]
    fn get_record_unknown_id_is_id_does_not_exist() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let settings = settings();
        let server = OaiServer::new(&store, &settings);
        let err = server.get_record("oai_dc", "oai:scielo.org:ZZZ").unwrap_err();
        assert_eq!(err, OaiFault::IdDoesNotExist("oai:scielo.org:ZZZ".to_string()));
    }

    #[test]
    fn get_record_unknown_format_is_cannot_disseminate() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let settings = settings();
        let server = OaiServer::new(&store, &settings);
        let err = server.get_record("mods", "oai:scielo.org:ZZZ").unwrap_err();
        assert!(matches!(err, OaiFault::CannotDisseminateFormat(_)));
    }

    #[test]
    fn get_record_returns_stored_record() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.upsert(&sample_record("abc", "2020-01-01T00:00:00Z")).unwrap();
        let settings = settings();
        let server = OaiServer::new(&store, &settings);
        let record = server.get_record("oai_dc", "oai:scielo.org:abc").unwrap();
        assert_eq!(record.doc_id, "abc");
    }

    #[test]
    fn list_metadata_formats_with_unknown_identifier_fails() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let settings = settings();
        let server = OaiServer::new(&store, &settings);
        let err = server.list_metadata_formats(Some("oai:scielo.org:ZZZ")).unwrap_err();
        assert!(matches!(err, OaiFault::IdDoesNotExist(_)));
    }

    #[test]
    fn list_metadata_formats_without_identifier_succeeds() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let settings = settings();
        let server = OaiServer::new(&store, &settings);
        assert_eq!(server.list_metadata_formats(None).unwrap(), vec!["oai_dc"]);
    }

    #[test]
    fn list_records_empty_store_is_no_records_match() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let settings = settings();
        let server = OaiServer::new(&store, &settings);
        let err = server
            .list_records("oai_dc", None, None, None, None)
            .unwrap_err();
        assert_eq!(err, OaiFault::NoRecordsMatch);
    }

    #[test]
    fn list_records_pagination_does_not_repeat_boundary_record() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        for (doc_id, ts) in [
            ("a", "2020-01-01T00:00:00Z"),
            ("b", "2020-01-02T00:00:00Z"),
            ("c", "2020-01-03T00:00:00Z"),
            ("d", "2020-01-04T00:00:00Z"),
        ] {
            store.upsert(&sample_record(doc_id, ts)).unwrap();
        }
        let mut settings = settings();
        settings.resumption_batch_size = 2;
        let server = OaiServer::new(&store, &settings);

        let page1 = server.list_records("oai_dc", None, None, None, None).unwrap();
        assert_eq!(
            page1.items.iter().map(|r| r.doc_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        let token1 = page1.resumption_token.unwrap();

        let page2 = server
            .list_records("oai_dc", None, None, None, Some(&token1.encode()))
            .unwrap();
        assert_eq!(
            page2.items.iter().map(|r| r.doc_id.as_str()).collect::<Vec<_>>(),
            vec!["c", "d"]
        );

        // A full page always carries a continuation token, even when it happens
        // to exhaust the mirror; the next request is what discovers there is
        // nothing left.
        let token2 = page2.resumption_token.unwrap();
        let err = server
            .list_records("oai_dc", None, None, None, Some(&token2.encode()))
            .unwrap_err();
        assert_eq!(err, OaiFault::NoRecordsMatch);
    }

    #[test]
    fn identify_falls_back_to_configured_earliest_datestamp() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let settings = settings();
        let server = OaiServer::new(&store, &settings);
        let identity = server.identify().unwrap();
        assert_eq!(identity.earliest_datestamp, settings.fallback_earliest_datestamp);
        assert_eq!(identity.protocol_version, "2.0");
    }
}
