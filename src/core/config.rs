use crate::{ScraperError, ScraperResult};
use std::collections::BTreeSet;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.amazon.fr";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEFAULT_QUERY_KEYWORDS: &[&str] = &[
    "serviette hygiénique",
    "tampon femme",
    "cup menstruelle",
    "protege slip",
];

pub const DEFAULT_EXCLUDE_KEYWORDS: &[&str] = &[
    "cheveux",
    "sport",
    "rangement",
    "bain",
    "microfibre",
    "douche",
    "maquillage",
    "plage",
    "décoration",
    "percer",
    "manucure",
    "pédicure",
    "trouse",
    "stérilisateur",
    "cuisine",
    "éponge",
    "épilation",
    "épilateur",
];

/// Title signatures of the full-page block served instead of real content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntiBotSignatures {
    pub exact: Vec<String>,
    pub contains: Vec<String>,
}

impl Default for AntiBotSignatures {
    fn default() -> Self {
        Self {
            exact: vec!["nos excuses".to_string()],
            contains: vec!["robot check".to_string()],
        }
    }
}

impl AntiBotSignatures {
    pub fn matches(&self, title: &str) -> bool {
        let title = title.trim().to_lowercase();
        if title.is_empty() {
            return false;
        }
        self.exact.iter().any(|sig| title == sig.to_lowercase())
            || self
                .contains
                .iter()
                .any(|sig| title.contains(&sig.to_lowercase()))
    }
}

#[derive(Debug, Clone)]
pub struct SpiderConfig {
    pub base_url: Url,
    pub max_pages: Option<usize>,
    pub query_keywords: Vec<String>,
    pub exclude_keywords: BTreeSet<String>,
    pub antibot: AntiBotSignatures,
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            max_pages: None,
            query_keywords: DEFAULT_QUERY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            exclude_keywords: DEFAULT_EXCLUDE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            antibot: AntiBotSignatures::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: vec![("Accept-Language".to_string(), "fr-FR,fr;q=0.9".to_string())],
        }
    }
}

impl SpiderConfig {
    pub fn with_base_url(mut self, base_url: &str) -> ScraperResult<Self> {
        let url = Url::parse(base_url)?;
        if url.cannot_be_a_base() {
            return Err(ScraperError::ConfigError(format!(
                "base url {} cannot resolve relative links",
                base_url
            )));
        }
        self.base_url = url;
        Ok(self)
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_query_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_antibot_signatures(mut self, signatures: AntiBotSignatures) -> Self {
        self.antibot = signatures;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn with_headers(mut self, headers: Vec<(&str, &str)>) -> Self {
        self.headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    pub fn search_url(&self, keyword: &str) -> Url {
        let mut url = self.base_url.join("/s").unwrap_or_else(|_| self.base_url.clone());
        url.query_pairs_mut().clear().append_pair("k", keyword);
        url
    }

    pub fn product_url(&self, asin: &str) -> ScraperResult<Url> {
        Ok(self.base_url.join(&format!("/dp/{}", asin))?)
    }

    pub fn review_index_url(&self, asin: &str) -> ScraperResult<Url> {
        Ok(self.base_url.join(&format!("/product-reviews/{}", asin))?)
    }
}
