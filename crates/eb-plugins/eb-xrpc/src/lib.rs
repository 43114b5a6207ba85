//! # eb-xrpc
//!
//! `RepoAgent` and `SessionAgent` over the XRPC HTTP interface of a personal
//! data server. Every call goes to `{service}/xrpc/{nsid}`; queries are GETs,
//! procedures are JSON POSTs.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use eb_core::{
    AgentFactory, AgentHandle, AppError, Collection, Follow, RawRecord, RecordPage, RepoAgent, Result,
    SessionAgent, SessionGrant, StrongRef,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

const LIST_RECORDS: &str = "com.atproto.repo.listRecords";
const CREATE_RECORD: &str = "com.atproto.repo.createRecord";
const PUT_RECORD: &str = "com.atproto.repo.putRecord";
const GET_FOLLOWS: &str = "app.bsky.graph.getFollows";
const CREATE_SESSION: &str = "com.atproto.server.createSession";
const REFRESH_SESSION: &str = "com.atproto.server.refreshSession";

/// Largest page the server accepts for list-style queries.
const MAX_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ListRecordsOutput {
    records: Vec<RawRecord>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetFollowsOutput {
    follows: Vec<Follow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionOutput {
    did: String,
    handle: String,
    access_jwt: String,
    refresh_jwt: String,
}

impl From<SessionOutput> for SessionGrant {
    fn from(out: SessionOutput) -> Self {
        SessionGrant {
            actor_id: out.did,
            handle: out.handle,
            access_token: out.access_jwt,
            refresh_token: out.refresh_jwt,
        }
    }
}

/// Error body returned by XRPC endpoints.
#[derive(Debug, Default, Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Clone)]
struct Tokens {
    access: String,
    refresh: String,
}

/// Which token, if any, a call carries.
#[derive(Debug, Clone, Copy)]
enum Auth {
    None,
    Access,
    Refresh,
}

pub struct XrpcAgent {
    http: reqwest::Client,
    service_url: String,
    tokens: RwLock<Option<Tokens>>,
}

impl XrpcAgent {
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("echo-board/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| AppError::Remote(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            service_url: service_url.trim_end_matches('/').to_string(),
            tokens: RwLock::new(None),
        })
    }

    fn endpoint(&self, nsid: &str) -> String {
        endpoint_url(&self.service_url, nsid)
    }

    fn set_tokens(&self, tokens: Option<Tokens>) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = tokens;
    }

    fn authorize(&self, request: RequestBuilder, auth: Auth) -> Result<RequestBuilder> {
        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
        let token = match (auth, tokens.as_ref()) {
            (Auth::None, _) => return Ok(request),
            (Auth::Access, Some(tokens)) => &tokens.access,
            (Auth::Refresh, Some(tokens)) => &tokens.refresh,
            (_, None) => return Err(AppError::Unauthorized("no active session".into())),
        };
        Ok(request.bearer_auth(token))
    }

    async fn query<T: DeserializeOwned>(&self, nsid: &str, params: &[(&str, String)]) -> Result<T> {
        let request = self.http.get(self.endpoint(nsid)).query(params);
        let request = self.authorize(request, Auth::Access)?;
        self.send(nsid, request).await
    }

    async fn procedure<T: DeserializeOwned>(&self, nsid: &str, body: Option<&Value>, auth: Auth) -> Result<T> {
        let mut request = self.http.post(self.endpoint(nsid));
        if let Some(body) = body {
            request = request.json(body);
        }
        let request = self.authorize(request, auth)?;
        self.send(nsid, request).await
    }

    async fn send<T: DeserializeOwned>(&self, nsid: &str, request: RequestBuilder) -> Result<T> {
        let response = request
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|err| classify_transport(nsid, &err))?;
        decode_response(nsid, response).await
    }
}

async fn decode_response<T: DeserializeOwned>(nsid: &str, response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| AppError::Decode(format!("{nsid}: {err}")));
    }
    let text = response.text().await.unwrap_or_default();
    let body: XrpcErrorBody = serde_json::from_str(&text).unwrap_or_default();
    let err = classify_status(nsid, status, body.error.as_deref(), body.message.as_deref().unwrap_or(&text));
    debug!(nsid, status = status.as_u16(), error = %err, "xrpc call failed");
    Err(err)
}

pub fn endpoint_url(service_url: &str, nsid: &str) -> String {
    format!("{}/xrpc/{}", service_url.trim_end_matches('/'), nsid)
}

/// Maps a failed response onto the error taxonomy.
///
/// Rate limits and server errors are transient. Expired or invalid tokens are
/// reported as `Unauthorized` whatever the status code.
pub fn classify_status(nsid: &str, status: StatusCode, error_name: Option<&str>, message: &str) -> AppError {
    let detail = match error_name {
        Some(name) => format!("{nsid}: {} {name}: {message}", status.as_u16()),
        None => format!("{nsid}: {}: {message}", status.as_u16()),
    };
    if matches!(error_name, Some("ExpiredToken" | "InvalidToken" | "AuthenticationRequired")) {
        return AppError::Unauthorized(detail);
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS => AppError::TransientRemote(detail),
        s if s.is_server_error() => AppError::TransientRemote(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(detail),
        StatusCode::NOT_FOUND => AppError::NotFound("xrpc method".into(), nsid.to_string()),
        StatusCode::BAD_REQUEST if error_name == Some("RecordNotFound") => {
            AppError::NotFound("record".into(), detail)
        }
        _ => AppError::Remote(detail),
    }
}

/// Connection failures and timeouts are worth retrying; anything else is not.
fn classify_transport(nsid: &str, err: &reqwest::Error) -> AppError {
    let detail = format!("{nsid}: {err}");
    if err.is_timeout() || err.is_connect() || err.is_request() {
        AppError::TransientRemote(detail)
    } else if err.is_decode() {
        AppError::Decode(detail)
    } else {
        AppError::Remote(detail)
    }
}

#[async_trait]
impl RepoAgent for XrpcAgent {
    async fn list_records(
        &self,
        repo: &str,
        collection: Collection,
        limit: u32,
        cursor: Option<String>,
    ) -> Result<RecordPage> {
        let mut params = vec![
            ("repo", repo.to_string()),
            ("collection", collection.nsid().to_string()),
            ("limit", limit.clamp(1, MAX_PAGE).to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor));
        }
        let out: ListRecordsOutput = self.query(LIST_RECORDS, &params).await?;
        Ok(RecordPage {
            records: out.records,
            cursor: out.cursor,
        })
    }

    async fn create_record(&self, repo: &str, collection: Collection, record: Value) -> Result<StrongRef> {
        let body = json!({
            "repo": repo,
            "collection": collection.nsid(),
            "record": record,
        });
        self.procedure(CREATE_RECORD, Some(&body), Auth::Access).await
    }

    async fn put_record(&self, repo: &str, collection: Collection, rkey: &str, record: Value) -> Result<StrongRef> {
        let body = json!({
            "repo": repo,
            "collection": collection.nsid(),
            "rkey": rkey,
            "record": record,
        });
        self.procedure(PUT_RECORD, Some(&body), Auth::Access).await
    }

    async fn get_follows(&self, actor: &str, limit: u32) -> Result<Vec<Follow>> {
        let params = [
            ("actor", actor.to_string()),
            ("limit", limit.clamp(1, MAX_PAGE).to_string()),
        ];
        let out: GetFollowsOutput = self.query(GET_FOLLOWS, &params).await?;
        Ok(out.follows)
    }
}

#[async_trait]
impl SessionAgent for XrpcAgent {
    async fn login(&self, identifier: &str, password: &SecretString) -> Result<SessionGrant> {
        let body = json!({
            "identifier": identifier,
            "password": password.expose_secret(),
        });
        let out: SessionOutput = self.procedure(CREATE_SESSION, Some(&body), Auth::None).await?;
        let grant = SessionGrant::from(out);
        self.set_tokens(Some(Tokens {
            access: grant.access_token.clone(),
            refresh: grant.refresh_token.clone(),
        }));
        Ok(grant)
    }

    async fn resume(&self, grant: &SessionGrant) -> Result<SessionGrant> {
        self.set_tokens(Some(Tokens {
            access: grant.access_token.clone(),
            refresh: grant.refresh_token.clone(),
        }));
        match self.procedure::<SessionOutput>(REFRESH_SESSION, None, Auth::Refresh).await {
            Ok(out) => {
                let renewed = SessionGrant::from(out);
                self.set_tokens(Some(Tokens {
                    access: renewed.access_token.clone(),
                    refresh: renewed.refresh_token.clone(),
                }));
                Ok(renewed)
            }
            Err(err @ AppError::Unauthorized(_)) => {
                self.set_tokens(None);
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "session refresh failed, keeping stored tokens");
                Err(err)
            }
        }
    }

    fn forget(&self) {
        self.set_tokens(None);
    }
}

/// Builds one `XrpcAgent` per service.
pub struct XrpcAgentFactory {
    timeout: Duration,
}

impl XrpcAgentFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl AgentFactory for XrpcAgentFactory {
    fn connect(&self, service_url: &str) -> Result<AgentHandle> {
        debug!(service = service_url, "connecting xrpc agent");
        Ok(AgentHandle::from_shared(Arc::new(XrpcAgent::new(service_url, self.timeout)?)))
    }
}
