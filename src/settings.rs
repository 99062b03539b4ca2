use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// All runtime tunables consolidated into one value, built once at startup
/// from (in increasing precedence) built-in defaults, an optional settings
/// file, and `OAIPMH_*` environment variables. Mirrors the teacher's
/// `config.rs` (one struct read once, passed by reference) generalized from
/// a single TOML file to the file-then-env overlay the reference server
/// actually does in `oaipmhserver/server.py`'s `parse_settings`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub repo_name: String,
    pub repo_base_url: String,
    pub repo_domain: String,
    pub admin_emails: Vec<String>,
    pub deleted_record: String,
    pub granularity: String,
    pub compression: Vec<String>,
    pub resumption_batch_size: u64,
    pub site_base_url: String,
    pub fallback_earliest_datestamp: String,
    pub store_dsn: Option<String>,
}

impl Settings {
    /// The built-in defaults, matching the reference server's
    /// `DEFAULT_SETTINGS` table.
    pub fn defaults() -> Self {
        Settings {
            max_retries: 4,
            backoff_factor: 1.2,
            repo_name: "SciELO - Scientific Electronic Library Online".to_string(),
            repo_base_url: "http://www.scielo.br/oai/scielo-oai.php".to_string(),
            repo_domain: "scielo.org".to_string(),
            admin_emails: vec!["scielo@scielo.org".to_string()],
            deleted_record: "no".to_string(),
            granularity: "YYYY-MM-DDThh:mm:ssZ".to_string(),
            compression: vec!["identity".to_string()],
            resumption_batch_size: 100,
            site_base_url: "https://www.scielo.br".to_string(),
            fallback_earliest_datestamp: "1998-01-01".to_string(),
            store_dsn: None,
        }
    }

    /// Loads settings starting from the defaults, overlaying an optional
    /// TOML file (if `file` is `Some` and exists), then overlaying
    /// `OAIPMH_*` environment variables, which always win.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut settings = Settings::defaults();

        if let Some(path) = file {
            if path.is_file() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {path:?}"))?;
                let file: SettingsFile =
                    toml::from_str(&contents).with_context(|| format!("parsing {path:?}"))?;
                file.apply_to(&mut settings);
            }
        }

        settings.apply_env()?;
        Ok(settings)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_var("OAIPMH_MAX_RETRIES") {
            self.max_retries = v.parse().context("OAIPMH_MAX_RETRIES must be an integer")?;
        }
        if let Some(v) = env_var("OAIPMH_BACKOFF_FACTOR") {
            self.backoff_factor = v.parse().context("OAIPMH_BACKOFF_FACTOR must be a number")?;
        }
        if let Some(v) = env_var("OAIPMH_REPO_NAME") {
            self.repo_name = v;
        }
        if let Some(v) = env_var("OAIPMH_REPO_BASEURL") {
            self.repo_base_url = v;
        }
        if let Some(v) = env_var("OAIPMH_REPO_DOMAIN") {
            self.repo_domain = v;
        }
        if let Some(v) = env_var("OAIPMH_REPO_ADMINEMAILS") {
            self.admin_emails = split_words(&v);
        }
        if let Some(v) = env_var("OAIPMH_REPO_DELETEDRECORD") {
            self.deleted_record = v;
        }
        if let Some(v) = env_var("OAIPMH_REPO_GRANULARITY") {
            self.granularity = v;
        }
        if let Some(v) = env_var("OAIPMH_REPO_COMPRESSION") {
            self.compression = split_words(&v);
        }
        if let Some(v) = env_var("OAIPMH_RESUMPTIONTOKEN_BATCHSIZE") {
            self.resumption_batch_size = v
                .parse()
                .context("OAIPMH_RESUMPTIONTOKEN_BATCHSIZE must be an integer")?;
        }
        if let Some(v) = env_var("OAIPMH_SITE_BASEURL") {
            self.site_base_url = v;
        }
        if let Some(v) = env_var("OAIPMH_STORE_DSN") {
            self.store_dsn = Some(v);
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Splits a space-separated list the way the reference settings parser
/// splits `adminemails`/`compression` (`str(x).split()`).
fn split_words(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    max_retries: Option<u32>,
    backoff_factor: Option<f64>,
    repo_name: Option<String>,
    repo_base_url: Option<String>,
    repo_domain: Option<String>,
    admin_emails: Option<Vec<String>>,
    deleted_record: Option<String>,
    granularity: Option<String>,
    compression: Option<Vec<String>>,
    resumption_batch_size: Option<u64>,
    site_base_url: Option<String>,
    fallback_earliest_datestamp: Option<String>,
    store_dsn: Option<String>,
}

impl SettingsFile {
    fn apply_to(self, settings: &mut Settings) {
        if let Some(v) = self.max_retries {
            settings.max_retries = v;
        }
        if let Some(v) = self.backoff_factor {
            settings.backoff_factor = v;
        }
        if let Some(v) = self.repo_name {
            settings.repo_name = v;
        }
        if let Some(v) = self.repo_base_url {
            settings.repo_base_url = v;
        }
        if let Some(v) = self.repo_domain {
            settings.repo_domain = v;
        }
        if let Some(v) = self.admin_emails {
            settings.admin_emails = v;
        }
        if let Some(v) = self.deleted_record {
            settings.deleted_record = v;
        }
        if let Some(v) = self.granularity {
            settings.granularity = v;
        }
        if let Some(v) = self.compression {
            settings.compression = v;
        }
        if let Some(v) = self.resumption_batch_size {
            settings.resumption_batch_size = v;
        }
        if let Some(v) = self.site_base_url {
            settings.site_base_url = v;
        }
        if let Some(v) = self.fallback_earliest_datestamp {
            settings.fallback_earliest_datestamp = v;
        }
        if let Some(v) = self.store_dsn {
            settings.store_dsn = Some(v);
        }
    }
}
