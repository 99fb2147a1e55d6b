//! CxOne REST client
//!
//! Blocking implementation of the collector traits against the Checkmarx One
//! API. Access tokens are obtained from the IAM realm of the tenant and
//! cached until shortly before they expire.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{
    FindingLister, Page, ProjectLister, ScanLister, ScanSummaryProvider, UpstreamError,
};
use crate::model::{Finding, Project, QueryCounter, ScanRecord, ScanSummary};

const DEFAULT_CLIENT_ID: &str = "ast-app";
const API_ACCEPT: &str = "application/json; version=1.0";
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Settings
// ============================================================================

/// Connection settings for a CxOne tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CxOneSettings {
    /// IAM base url, e.g. `https://iam.checkmarx.net`
    pub access_control_url: Option<String>,
    /// API base url, e.g. `https://ast.checkmarx.net`
    pub server: Option<String>,
    pub tenant_name: Option<String>,
    /// `refresh_token` (default) or `client_credentials`
    pub grant_type: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub proxy: Option<String>,
}

impl CxOneSettings {
    /// Fill every unset field from `other`
    pub fn or(self, other: CxOneSettings) -> CxOneSettings {
        CxOneSettings {
            access_control_url: self.access_control_url.or(other.access_control_url),
            server: self.server.or(other.server),
            tenant_name: self.tenant_name.or(other.tenant_name),
            grant_type: self.grant_type.or(other.grant_type),
            refresh_token: self.refresh_token.or(other.refresh_token),
            client_id: self.client_id.or(other.client_id),
            client_secret: self.client_secret.or(other.client_secret),
            proxy: self.proxy.or(other.proxy),
        }
    }
}

/// How the client authenticates against IAM
#[derive(Clone, PartialEq, Eq)]
pub enum AuthGrant {
    RefreshToken {
        client_id: String,
        refresh_token: String,
    },
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
}

impl std::fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthGrant::RefreshToken { client_id, .. } => {
                write!(f, "RefreshToken {{ client_id: {:?}, .. }}", client_id)
            }
            AuthGrant::ClientCredentials { client_id, .. } => {
                write!(f, "ClientCredentials {{ client_id: {:?}, .. }}", client_id)
            }
        }
    }
}

impl AuthGrant {
    fn from_settings(settings: &CxOneSettings) -> Result<Self, UpstreamError> {
        let grant_type = settings.grant_type.as_deref().unwrap_or("refresh_token");
        match grant_type {
            "refresh_token" => Ok(AuthGrant::RefreshToken {
                client_id: settings
                    .client_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                refresh_token: required(&settings.refresh_token, "refresh_token")?,
            }),
            "client_credentials" => Ok(AuthGrant::ClientCredentials {
                client_id: required(&settings.client_id, "client_id")?,
                client_secret: required(&settings.client_secret, "client_secret")?,
            }),
            other => Err(UpstreamError::Config(format!(
                "unsupported grant type '{}', use refresh_token or client_credentials",
                other
            ))),
        }
    }

    fn form(&self) -> Vec<(&'static str, &str)> {
        match self {
            AuthGrant::RefreshToken {
                client_id,
                refresh_token,
            } => vec![
                ("grant_type", "refresh_token"),
                ("client_id", client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ],
            AuthGrant::ClientCredentials {
                client_id,
                client_secret,
            } => vec![
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ],
        }
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String, UpstreamError> {
    value
        .as_ref()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| UpstreamError::Config(format!("missing {}", name)))
}

// ============================================================================
// Client
// ============================================================================

struct CachedToken {
    value: String,
    valid_until: Instant,
}

/// Blocking CxOne API client
pub struct CxOneClient {
    agent: ureq::Agent,
    server: String,
    token_url: String,
    grant: AuthGrant,
    token: RefCell<Option<CachedToken>>,
}

impl CxOneClient {
    /// Build a client from settings; no request is made until first use
    pub fn new(settings: &CxOneSettings) -> Result<Self, UpstreamError> {
        let server = required(&settings.server, "server")?;
        let iam = required(&settings.access_control_url, "access_control_url")?;
        let tenant = required(&settings.tenant_name, "tenant_name")?;
        let grant = AuthGrant::from_settings(settings)?;

        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT);
        if let Some(proxy) = settings.proxy.as_deref().filter(|p| !p.is_empty()) {
            let proxy = ureq::Proxy::new(proxy)
                .map_err(|e| UpstreamError::Config(format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            agent: builder.build(),
            server: server.trim_end_matches('/').to_string(),
            token_url: format!(
                "{}/auth/realms/{}/protocol/openid-connect/token",
                iam.trim_end_matches('/'),
                tenant
            ),
            grant,
            token: RefCell::new(None),
        })
    }

    /// API base url, also used for report deep links
    pub fn server(&self) -> &str {
        &self.server
    }

    fn access_token(&self) -> Result<String, UpstreamError> {
        if let Some(cached) = self.token.borrow().as_ref() {
            if Instant::now() < cached.valid_until {
                return Ok(cached.value.clone());
            }
        }

        log::debug!("Requesting access token from {}", self.token_url);
        let response = self
            .agent
            .post(&self.token_url)
            .send_form(&self.grant.form())
            .map_err(|e| match e {
                ureq::Error::Status(status, response) => UpstreamError::Auth(format!(
                    "HTTP {}: {}",
                    status,
                    response.into_string().unwrap_or_default()
                )),
                ureq::Error::Transport(t) => UpstreamError::Auth(t.to_string()),
            })?;
        let token: TokenResponse = response.into_json().map_err(|e| UpstreamError::Decode {
            url: self.token_url.clone(),
            message: e.to_string(),
        })?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *self.token.borrow_mut() = Some(CachedToken {
            value: token.access_token.clone(),
            valid_until: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let url = format!("{}{}", self.server, path);
        let token = self.access_token()?;

        let mut request = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", token))
            .set("Accept", API_ACCEPT);
        for (key, value) in query {
            request = request.query(key, value);
        }

        let response = request.call().map_err(|e| match e {
            ureq::Error::Status(status, response) => UpstreamError::Status {
                url: url.clone(),
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(t) => UpstreamError::Transport {
                url: url.clone(),
                message: t.to_string(),
            },
        })?;

        response.into_json().map_err(|e| UpstreamError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

fn api_timestamp(value: NaiveDateTime) -> String {
    value.and_utc().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ScanLister for CxOneClient {
    fn list_scans(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
        offset: usize,
        limit: usize,
    ) -> Result<Page<ScanRecord>, UpstreamError> {
        let response: ScansResponse = self.get_json(
            "/api/scans/",
            &[
                ("from-date", api_timestamp(from)),
                ("to-date", api_timestamp(to)),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ],
        )?;
        let total = response.filtered_total_count.unwrap_or(response.total_count);
        let scans = response.scans.into_iter().map(ScanRecord::from).collect();
        Ok(Page::new(scans, total))
    }
}

impl FindingLister for CxOneClient {
    fn list_findings(
        &self,
        scan_id: &str,
        state: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Finding>, UpstreamError> {
        let response: SastResultsResponse = self.get_json(
            "/api/sast-results/",
            &[
                ("scan-id", scan_id.to_string()),
                ("state", state.to_string()),
                ("offset", offset.to_string()),
                ("limit", limit.to_string()),
            ],
        )?;
        let findings = response.results.into_iter().map(Finding::from).collect();
        Ok(Page::new(findings, response.total_count))
    }
}

impl ScanSummaryProvider for CxOneClient {
    fn summarize(&self, scan_ids: &[String]) -> Result<Vec<ScanSummary>, UpstreamError> {
        let response: ScanSummaryResponse = self.get_json(
            "/api/scan-summary/",
            &[
                ("scan-ids", scan_ids.join(",")),
                ("include-queries", "true".to_string()),
            ],
        )?;
        Ok(response
            .scans_summaries
            .into_iter()
            .map(ScanSummary::from)
            .collect())
    }
}

impl ProjectLister for CxOneClient {
    fn list_projects(
        &self,
        ids: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Page<Project>, UpstreamError> {
        let mut query = vec![
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ];
        for id in ids {
            query.push(("ids", id.clone()));
        }
        let response: ProjectsResponse = self.get_json("/api/projects/", &query)?;
        let total = response.filtered_total_count.unwrap_or(response.total_count);
        let projects = response.projects.into_iter().map(Project::from).collect();
        Ok(Page::new(projects, total))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    300
}

/// Query ids arrive as numbers on some endpoints and strings on others
#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScansResponse {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    filtered_total_count: Option<usize>,
    #[serde(default)]
    scans: Vec<ScanDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanDto {
    id: String,
    project_id: String,
    #[serde(default)]
    branch: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ScanDto> for ScanRecord {
    fn from(dto: ScanDto) -> Self {
        ScanRecord {
            scan_id: dto.id,
            project_id: dto.project_id,
            branch: dto.branch,
            created_at: dto.created_at,
            updated_at: dto.updated_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SastResultsResponse {
    #[serde(default)]
    results: Vec<SastResultDto>,
    #[serde(default)]
    total_count: usize,
}

#[derive(Deserialize)]
struct SastResultDto {
    #[serde(rename = "queryIDStr", default)]
    query_id_str: Option<String>,
    #[serde(rename = "queryID", default)]
    query_id: Option<WireId>,
    #[serde(rename = "queryName", default)]
    query_name: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    state: String,
}

impl From<SastResultDto> for Finding {
    fn from(dto: SastResultDto) -> Self {
        let query_id = dto
            .query_id_str
            .or_else(|| dto.query_id.map(WireId::into_string))
            .unwrap_or_else(|| dto.query_name.clone());
        Finding {
            query_id,
            query_name: dto.query_name,
            severity: dto.severity,
            state: dto.state,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanSummaryResponse {
    #[serde(default)]
    scans_summaries: Vec<ScanSummaryDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanSummaryDto {
    scan_id: String,
    #[serde(default)]
    sast_counters: Option<SastCountersDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SastCountersDto {
    #[serde(default)]
    queries_counters: Option<Vec<QueryCounterDto>>,
}

#[derive(Deserialize)]
struct QueryCounterDto {
    #[serde(rename = "queryID")]
    query_id: WireId,
    #[serde(rename = "queryName", default)]
    query_name: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    counter: u64,
}

impl From<ScanSummaryDto> for ScanSummary {
    fn from(dto: ScanSummaryDto) -> Self {
        let query_counters = dto
            .sast_counters
            .and_then(|c| c.queries_counters)
            .unwrap_or_default()
            .into_iter()
            .map(|q| QueryCounter {
                query_id: q.query_id.into_string(),
                query_name: q.query_name,
                severity: q.severity,
                count: q.counter,
            })
            .collect();
        ScanSummary {
            scan_id: dto.scan_id,
            query_counters,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectsResponse {
    #[serde(default)]
    total_count: usize,
    #[serde(default)]
    filtered_total_count: Option<usize>,
    #[serde(default)]
    projects: Vec<ProjectDto>,
}

#[derive(Deserialize)]
struct ProjectDto {
    id: String,
    #[serde(default)]
    name: String,
}

impl From<ProjectDto> for Project {
    fn from(dto: ProjectDto) -> Self {
        Project {
            id: dto.id,
            name: dto.name,
        }
    }
}
