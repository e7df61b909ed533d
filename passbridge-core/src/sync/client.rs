//! HTTP client for the sync storage service.

use crate::sync::auth::{browserid_header, generate_nonce, sign_request, HawkCredentials};
use crate::sync::config::SyncSettings;
use crate::sync::models::{EncryptedRecord, TokenResponse};
use crate::sync::storage::{RecordStream, SyncStorage};
use crate::{PassbridgeError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Method;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

const NEXT_OFFSET_HEADER: &str = "X-Weave-Next-Offset";
const CLIENT_STATE_HEADER: &str = "X-Client-State";
const JSON: &str = "application/json";

/// Credentials and endpoint obtained from the token server.
#[derive(Debug)]
struct Session {
    credentials: HawkCredentials,
    api_endpoint: Url,
}

/// HTTP client for one sync account.
///
/// The token exchange happens on the first storage call and the result is
/// reused for the client's lifetime.
pub struct SyncClient {
    client: reqwest::Client,
    token_server_url: String,
    assertion: String,
    client_state: String,
    page_size: usize,
    session: OnceCell<Session>,
}

impl SyncClient {
    /// Create a new sync client.
    pub fn new(
        settings: &SyncSettings,
        assertion: impl Into<String>,
        client_state: impl Into<String>,
    ) -> Result<Self> {
        settings.validate()?;
        let assertion = assertion.into();
        if assertion.trim().is_empty() {
            return Err(PassbridgeError::Configuration(
                "account assertion is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| PassbridgeError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            token_server_url: settings.token_server_url.clone(),
            assertion,
            client_state: client_state.into(),
            page_size: settings.page_size,
            session: OnceCell::new(),
        })
    }

    /// Storage API base URL, exchanging the token first if needed.
    pub async fn api_endpoint(&self) -> Result<&Url> {
        Ok(&self.session().await?.api_endpoint)
    }

    // --- Internal helpers ---

    async fn session(&self) -> Result<&Session> {
        self.session
            .get_or_try_init(|| self.exchange_token())
            .await
    }

    async fn exchange_token(&self) -> Result<Session> {
        let resp = self
            .client
            .get(&self.token_server_url)
            .header("Authorization", browserid_header(&self.assertion))
            .header(CLIENT_STATE_HEADER, &self.client_state)
            .send()
            .await
            .map_err(|e| PassbridgeError::Transport(e.to_string()))?;
        let resp = check_status(resp).await?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PassbridgeError::Transport(e.to_string()))?;
        let token: TokenResponse = serde_json::from_slice(&bytes)?;
        let api_endpoint = Url::parse(&token.api_endpoint).map_err(|e| {
            PassbridgeError::Serialization(format!(
                "token server returned bad api_endpoint {:?}: {}",
                token.api_endpoint, e
            ))
        })?;

        info!(uid = token.uid, "Obtained sync token valid for {}s", token.duration);
        Ok(Session {
            credentials: HawkCredentials::new(token.id, token.key),
            api_endpoint,
        })
    }

    async fn signed(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response> {
        let session = self.session().await?;
        let timestamp = chrono::Utc::now().timestamp();
        let nonce = generate_nonce();
        let auth_header = sign_request(
            &session.credentials,
            method.as_str(),
            &url,
            body.as_deref().map(|bytes| (JSON, bytes)),
            timestamp,
            &nonce,
        )?;

        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", auth_header);
        if let Some(body) = body {
            request = request.header("Content-Type", JSON).body(body);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| PassbridgeError::Transport(e.to_string()))?;
        check_status(resp).await
    }

    async fn get_page(
        &self,
        collection: &str,
        offset: Option<String>,
    ) -> Result<(Vec<EncryptedRecord>, Option<String>)> {
        let mut url = storage_url(self.api_endpoint().await?, collection, None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("full", "1");
            query.append_pair("limit", &self.page_size.to_string());
            if let Some(offset) = &offset {
                query.append_pair("offset", offset);
            }
        }

        let resp = self.signed(Method::GET, url, None).await?;
        let next = resp
            .headers()
            .get(NEXT_OFFSET_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PassbridgeError::Transport(e.to_string()))?;
        let records: Vec<EncryptedRecord> = serde_json::from_slice(&bytes)?;

        debug!(
            collection,
            count = records.len(),
            more = next.is_some(),
            "Fetched page"
        );
        Ok((records, next))
    }
}

/// Build `<api_endpoint>/storage/<collection>[/<id>]`, each part one segment.
fn storage_url(api_endpoint: &Url, collection: &str, id: Option<&str>) -> Result<Url> {
    let mut url = api_endpoint.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            PassbridgeError::Configuration(format!("{} cannot be a base URL", api_endpoint))
        })?;
        segments.pop_if_empty().push("storage").push(collection);
        if let Some(id) = id {
            segments.push(id);
        }
    }
    Ok(url)
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
    Err(PassbridgeError::RemoteService { status, body })
}

#[async_trait]
impl SyncStorage for SyncClient {
    async fn get_record(&self, collection: &str, id: &str) -> Result<EncryptedRecord> {
        let url = storage_url(self.api_endpoint().await?, collection, Some(id))?;
        let resp = self.signed(Method::GET, url, None).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PassbridgeError::Transport(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn get_records<'a>(&'a self, collection: &'a str) -> RecordStream<'a> {
        // `None` once the server stops handing out offsets
        stream::try_unfold(Some(None::<String>), move |cursor| async move {
            let Some(offset) = cursor else {
                return Ok::<_, PassbridgeError>(None);
            };
            let (records, next) = self.get_page(collection, offset).await?;
            let page = stream::iter(records.into_iter().map(Ok::<_, PassbridgeError>));
            Ok(Some((page, next.map(Some))))
        })
        .try_flatten()
        .boxed()
    }

    async fn put_record(&self, collection: &str, record: &EncryptedRecord) -> Result<()> {
        let url = storage_url(self.api_endpoint().await?, collection, Some(&record.id))?;
        let body = serde_json::to_vec(record)?;
        self.signed(Method::PUT, url, Some(body)).await?;
        Ok(())
    }

    async fn delete_record(&self, collection: &str, id: &str) -> Result<()> {
        let url = storage_url(self.api_endpoint().await?, collection, Some(id))?;
        self.signed(Method::DELETE, url, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ASSERTION: &str = "eyJhbGciOiJSUzI1NiJ9.test";
    const CLIENT_STATE: &str = "66687aadf862bd776c8fc18b8e9f8e20";

    async fn server_with_token() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.0/sync/1.5"))
            .and(header("Authorization", format!("BrowserID {}", ASSERTION).as_str()))
            .and(header("X-Client-State", CLIENT_STATE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "hawk-id",
                "key": "hawk-key",
                "uid": 42,
                "api_endpoint": format!("{}/1.5/42", server.uri()),
                "duration": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    fn client_for(server: &MockServer) -> SyncClient {
        let settings = SyncSettings {
            token_server_url: format!("{}/1.0/sync/1.5", server.uri()),
            page_size: 2,
            ..Default::default()
        };
        SyncClient::new(&settings, ASSERTION, CLIENT_STATE).unwrap()
    }

    fn bso(id: &str) -> serde_json::Value {
        json!({ "id": id, "modified": 1700000000.0, "payload": "{}" })
    }

    #[test]
    fn empty_assertion_is_configuration_error() {
        let err = SyncClient::new(&SyncSettings::default(), " ", CLIENT_STATE)
            .err()
            .unwrap();
        assert!(matches!(err, PassbridgeError::Configuration(_)));
    }

    #[test]
    fn storage_url_encodes_record_id() {
        let base = Url::parse("https://sync.example.com/1.5/42/").unwrap();
        let url = storage_url(&base, "passwords", Some("{abc def}")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://sync.example.com/1.5/42/storage/passwords/%7Babc%20def%7D"
        );

        let url = storage_url(&base, "crypto", None).unwrap();
        assert_eq!(url.as_str(), "https://sync.example.com/1.5/42/storage/crypto");
    }

    #[tokio::test]
    async fn get_record_exchanges_token_once_and_signs() {
        let server = server_with_token().await;
        Mock::given(method("GET"))
            .and(path("/1.5/42/storage/crypto/keys"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(bso("keys")))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let record = client.get_record("crypto", "keys").await.unwrap();
        assert_eq!(record.id, "keys");
        assert_eq!(record.modified, Some(1700000000.0));
        client.get_record("crypto", "keys").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let storage_auth: Vec<_> = requests
            .iter()
            .filter(|r| r.url.path().starts_with("/1.5/42/"))
            .map(|r| r.headers.get("authorization").unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(storage_auth.len(), 2);
        assert!(storage_auth.iter().all(|h| h.starts_with(r#"Hawk id="hawk-id""#)));
    }

    #[tokio::test]
    async fn get_records_follows_next_offset() {
        let server = server_with_token().await;
        Mock::given(method("GET"))
            .and(path("/1.5/42/storage/passwords"))
            .and(query_param("full", "1"))
            .and(query_param("limit", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([bso("a"), bso("b")]))
                    .insert_header("X-Weave-Next-Offset", "page-2"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/1.5/42/storage/passwords"))
            .and(query_param("offset", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([bso("c")])))
            .expect(1)
            .with_priority(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let records: Vec<_> = client
            .get_records("passwords")
            .try_collect()
            .await
            .unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn put_record_sends_json_body_to_encoded_path() {
        let server = server_with_token().await;
        Mock::given(method("PUT"))
            .and(path("/1.5/42/storage/passwords/%7Babc%7D"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(1700000000.5)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let record = EncryptedRecord::new("{abc}", "{\"ciphertext\":\"x\"}");
        client.put_record("passwords", &record).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let put = requests.iter().find(|r| r.method.as_str() == "PUT").unwrap();
        let body: serde_json::Value = serde_json::from_slice(&put.body).unwrap();
        assert_eq!(body, json!({ "id": "{abc}", "payload": "{\"ciphertext\":\"x\"}" }));
        let auth = put.headers.get("authorization").unwrap().to_str().unwrap();
        assert!(auth.contains("hash="));
    }

    #[tokio::test]
    async fn missing_record_maps_to_remote_service_404() {
        let server = server_with_token().await;
        Mock::given(method("GET"))
            .and(path("/1.5/42/storage/crypto/keys"))
            .respond_with(ResponseTemplate::new(404).set_body_string("0"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_record("crypto", "keys")
            .await
            .unwrap_err();
        match err {
            PassbridgeError::RemoteService { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "0");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_on_delete_surfaces_status() {
        let server = server_with_token().await;
        Mock::given(method("DELETE"))
            .and(path("/1.5/42/storage/passwords/x"))
            .respond_with(ResponseTemplate::new(503).set_body_string("server busy"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .delete_record("passwords", "x")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PassbridgeError::RemoteService { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn rejected_token_exchange_is_remote_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1.0/sync/1.5"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "status": "invalid-credentials" })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_record("crypto", "keys")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PassbridgeError::RemoteService { status: 401, .. }
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let settings = SyncSettings {
            token_server_url: "http://127.0.0.1:9/1.0/sync/1.5".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let client = SyncClient::new(&settings, ASSERTION, CLIENT_STATE).unwrap();
        let err = client.get_record("crypto", "keys").await.unwrap_err();
        assert!(matches!(err, PassbridgeError::Transport(_)));
    }
}
