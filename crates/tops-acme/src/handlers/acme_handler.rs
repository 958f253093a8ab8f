use super::types::{
    AcmeAppState, DeleteSslKeysQuery, DnsRecord, DnsRecordsQuery, RenewResponse, SslKeysQuery,
};
use crate::autorenew::{ExpirationSummary, RenewalOutcome};
use crate::dns01::list_challenges;
use crate::issue::AcmeGenerateRequest;
use crate::keys::{AddSslKeysRequest, AddedKeys, UploadedCertificate};
use crate::renew::find_delivery_service;
use crate::status::{AsyncJobStatus, JobTicket};
use crate::authorization::check_cdn_locks;
use tops_core::error_builder;
use tops_core::problemdetails::Problem;
use tops_core::{Alert, AlertLevel, ApiError, ApiResponse};
use tops_entities::cdn;
use tops_vault::{DeliveryServiceSslKeys, PingResponse, SslKeyCertificate, AUTH_TYPE_LETS_ENCRYPT};

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use sea_orm::EntityTrait;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::OpenApi;

/// Header carrying the name of the operator making the request.
pub const USER_HEADER: &str = "x-tops-user";

/// The operator a request acts for.
pub struct Operator(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Operator {
    type Rejection = Problem;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| Operator(name.to_string()))
            .ok_or_else(|| {
                error_builder::unauthorized()
                    .detail(format!("missing {USER_HEADER} header"))
                    .build()
            })
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        renew_delivery_service_certificate,
        lets_encrypt_autorenew,
        acme_autorenew,
        generate_lets_encrypt,
        generate_acme,
        generate_self_signed,
        add_ssl_keys,
        get_ssl_keys,
        delete_ssl_keys,
        get_async_status,
        list_dns_records,
        ping_vault
    ),
    components(
        schemas(
            AcmeGenerateRequest,
            AddSslKeysRequest,
            UploadedCertificate,
            AddedKeys,
            DeliveryServiceSslKeys,
            SslKeyCertificate,
            JobTicket,
            AsyncJobStatus,
            DnsRecord,
            RenewResponse,
            RenewalOutcome,
            ExpirationSummary,
            PingResponse,
            Alert,
            AlertLevel
        )
    ),
    tags(
        (name = "SSL Keys", description = "Delivery service certificate management"),
        (name = "ACME", description = "ACME issuance and renewal")
    )
)]
pub struct AcmeApiDoc;

pub fn configure_routes() -> Router<Arc<AcmeAppState>> {
    Router::new()
        .route(
            "/deliveryservices/xmlId/{xml_id}/sslkeys/renew",
            post(renew_delivery_service_certificate),
        )
        .route(
            "/deliveryservices/xmlId/{xml_id}/sslkeys",
            get(get_ssl_keys).delete(delete_ssl_keys),
        )
        .route("/letsencrypt/autorenew", post(lets_encrypt_autorenew))
        .route("/acme_autorenew", post(acme_autorenew))
        .route(
            "/deliveryservices/sslkeys/generate/letsencrypt",
            post(generate_lets_encrypt),
        )
        .route("/deliveryservices/sslkeys/generate/acme", post(generate_acme))
        .route("/deliveryservices/sslkeys/generate", post(generate_self_signed))
        .route("/deliveryservices/sslkeys/add", post(add_ssl_keys))
        .route("/async_status/{id}", get(get_async_status))
        .route("/dnsrecords", get(list_dns_records))
        .route("/vault/ping", get(ping_vault))
}

fn accepted(ticket: JobTicket, text: String) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        [(header::LOCATION, ticket.location.clone())],
        Json(ApiResponse::with_response(ticket).alert(Alert::success(text))),
    )
}

/// Renews one delivery service's certificate in the request.
#[utoipa::path(
    post,
    path = "/deliveryservices/xmlId/{xml_id}/sslkeys/renew",
    responses(
        (status = 200, description = "Certificate renewed", body = RenewResponse),
        (status = 400, description = "Delivery service has no keys or no provider configuration"),
        (status = 403, description = "CDN is locked by another user"),
        (status = 404, description = "Delivery service or keys not found"),
        (status = 500, description = "Renewal failed")
    ),
    params(("xml_id" = String, Path, description = "Delivery service xml_id")),
    tag = "ACME"
)]
async fn renew_delivery_service_certificate(
    Operator(user): Operator,
    State(state): State<Arc<AcmeAppState>>,
    Path(xml_id): Path<String>,
) -> Result<impl IntoResponse, Problem> {
    let ds = find_delivery_service(state.db.as_ref(), &xml_id)
        .await
        .map_err(ApiError::from)?;
    if ds.ssl_key_version == 0 {
        return Err(ApiError::bad_request(format!("delivery service {xml_id} has no SSL keys")).into());
    }
    if let Some(owner) = cdn::Entity::find_by_id(ds.cdn_id)
        .one(state.db.as_ref())
        .await
        .map_err(|e| ApiError::system(e.to_string()))?
    {
        check_cdn_locks(state.db.as_ref(), &user, &[owner.name.as_str()]).await?;
    }

    info!("user {} renewing certificate for {}", user, xml_id);
    let renewed = state
        .renewal_engine
        .renew(&xml_id, ds.ssl_key_version, &user)
        .await
        .map_err(|e| {
            error!("renewal of {} failed: {}", xml_id, e);
            ApiError::from(e)
        })?;

    Ok(Json(
        ApiResponse::with_response(RenewResponse {
            version: renewed.version,
            expiration: renewed.expiration,
        })
        .alert(Alert::success(format!(
            "Certificate for {xml_id} successfully renewed."
        ))),
    ))
}

async fn start_batch(state: &AcmeAppState, user: &str) -> Result<impl IntoResponse, Problem> {
    let ticket = state.auto_renewer.start(user).await?;
    let text = format!(
        "Beginning async call to renew certificates. This may take a few minutes. Status updates can be found here: {}",
        ticket.location
    );
    Ok(accepted(ticket, text))
}

/// Starts a batch renewal of every certificate that is due.
#[utoipa::path(
    post,
    path = "/letsencrypt/autorenew",
    responses(
        (status = 202, description = "Batch renewal started", body = JobTicket),
        (status = 403, description = "A CDN is locked by another user"),
        (status = 503, description = "Worker queue is full")
    ),
    tag = "ACME"
)]
async fn lets_encrypt_autorenew(
    Operator(user): Operator,
    State(state): State<Arc<AcmeAppState>>,
) -> Result<impl IntoResponse, Problem> {
    start_batch(&state, &user).await
}

/// Same batch as `/letsencrypt/autorenew`.
#[utoipa::path(
    post,
    path = "/acme_autorenew",
    responses(
        (status = 202, description = "Batch renewal started", body = JobTicket),
        (status = 403, description = "A CDN is locked by another user"),
        (status = 503, description = "Worker queue is full")
    ),
    tag = "ACME"
)]
async fn acme_autorenew(
    Operator(user): Operator,
    State(state): State<Arc<AcmeAppState>>,
) -> Result<impl IntoResponse, Problem> {
    start_batch(&state, &user).await
}

async fn start_generation(
    state: &AcmeAppState,
    request: AcmeGenerateRequest,
    provider: String,
    user: &str,
) -> Result<impl IntoResponse, Problem> {
    let xml_id = request.delivery_service.clone();
    let ticket = state.issue_jobs.start(request, &provider, user).await?;
    info!("user {} requested a {} certificate for {}", user, provider, xml_id);
    let text = format!(
        "Beginning async ACME call for {xml_id} using {provider}. This may take a few minutes. Status updates can be found here: {}",
        ticket.location
    );
    Ok(accepted(ticket, text))
}

/// Orders a Let's Encrypt certificate in the background.
#[utoipa::path(
    post,
    path = "/deliveryservices/sslkeys/generate/letsencrypt",
    request_body = AcmeGenerateRequest,
    responses(
        (status = 202, description = "Order started", body = JobTicket),
        (status = 400, description = "Delivery service is not in the CDN"),
        (status = 403, description = "CDN is locked by another user"),
        (status = 404, description = "Delivery service or CDN not found")
    ),
    tag = "ACME"
)]
async fn generate_lets_encrypt(
    Operator(user): Operator,
    State(state): State<Arc<AcmeAppState>>,
    Json(request): Json<AcmeGenerateRequest>,
) -> Result<impl IntoResponse, Problem> {
    start_generation(&state, request, AUTH_TYPE_LETS_ENCRYPT.to_string(), &user).await
}

/// Orders a certificate from the provider named in `authType`.
#[utoipa::path(
    post,
    path = "/deliveryservices/sslkeys/generate/acme",
    request_body = AcmeGenerateRequest,
    responses(
        (status = 202, description = "Order started", body = JobTicket),
        (status = 400, description = "Unknown provider or delivery service not in the CDN"),
        (status = 403, description = "CDN is locked by another user"),
        (status = 404, description = "Delivery service or CDN not found")
    ),
    tag = "ACME"
)]
async fn generate_acme(
    Operator(user): Operator,
    State(state): State<Arc<AcmeAppState>>,
    Json(request): Json<AcmeGenerateRequest>,
) -> Result<impl IntoResponse, Problem> {
    let provider = request
        .auth_type
        .clone()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("authType is required"))?;
    start_generation(&state, request, provider, &user).await
}

#[utoipa::path(
    post,
    path = "/deliveryservices/sslkeys/generate",
    request_body = AcmeGenerateRequest,
    responses(
        (status = 200, description = "Self-signed certificate stored"),
        (status = 400, description = "Delivery service is not in the CDN"),
        (status = 403, description = "CDN is locked by another user"),
        (status = 404, description = "Delivery service not found")
    ),
    tag = "SSL Keys"
)]
async fn generate_self_signed(
    Operator(user): Operator,
    State(state): State<Arc<AcmeAppState>>,
    Json(request): Json<AcmeGenerateRequest>,
) -> Result<impl IntoResponse, Problem> {
    check_cdn_locks(state.db.as_ref(), &user, &[request.cdn.as_str()]).await?;
    let version = state.keys.generate_self_signed(&request, &user).await?;
    Ok(Json(ApiResponse::<()>::alerts(vec![Alert::success(format!(
        "Successfully generated ssl keys for {} as version {}",
        request.delivery_service, version
    ))])))
}

#[utoipa::path(
    post,
    path = "/deliveryservices/sslkeys/add",
    request_body = AddSslKeysRequest,
    responses(
        (status = 200, description = "Keys stored", body = AddedKeys),
        (status = 400, description = "Chain or key is invalid"),
        (status = 403, description = "CDN is locked by another user"),
        (status = 404, description = "Delivery service not found")
    ),
    tag = "SSL Keys"
)]
async fn add_ssl_keys(
    Operator(user): Operator,
    State(state): State<Arc<AcmeAppState>>,
    Json(request): Json<AddSslKeysRequest>,
) -> Result<impl IntoResponse, Problem> {
    check_cdn_locks(state.db.as_ref(), &user, &[request.cdn.as_str()]).await?;
    let added = state.keys.add(&request, &user).await?;

    let mut response = ApiResponse::with_response(added.clone()).alert(Alert::success(format!(
        "Successfully added ssl keys for {}",
        request.delivery_service
    )));
    if added.unknown_authority {
        response = response.alert(Alert::warning(
            "Certificate chain does not lead to a known authority; stored as given",
        ));
    }
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/deliveryservices/xmlId/{xml_id}/sslkeys",
    responses(
        (status = 200, description = "Stored bundle", body = DeliveryServiceSslKeys),
        (status = 404, description = "No keys for the delivery service")
    ),
    params(("xml_id" = String, Path, description = "Delivery service xml_id"), SslKeysQuery),
    tag = "SSL Keys"
)]
async fn get_ssl_keys(
    State(state): State<Arc<AcmeAppState>>,
    Path(xml_id): Path<String>,
    Query(query): Query<SslKeysQuery>,
) -> Result<impl IntoResponse, Problem> {
    let keys = state
        .keys
        .get(&xml_id, query.version.as_deref(), query.decode)
        .await?;
    Ok(Json(ApiResponse::with_response(keys)))
}

#[utoipa::path(
    delete,
    path = "/deliveryservices/xmlId/{xml_id}/sslkeys",
    responses(
        (status = 200, description = "Keys deleted"),
        (status = 403, description = "CDN is locked by another user"),
        (status = 404, description = "Delivery service not found")
    ),
    params(("xml_id" = String, Path, description = "Delivery service xml_id"), DeleteSslKeysQuery),
    tag = "SSL Keys"
)]
async fn delete_ssl_keys(
    Operator(user): Operator,
    State(state): State<Arc<AcmeAppState>>,
    Path(xml_id): Path<String>,
    Query(query): Query<DeleteSslKeysQuery>,
) -> Result<impl IntoResponse, Problem> {
    let ds = find_delivery_service(state.db.as_ref(), &xml_id)
        .await
        .map_err(ApiError::from)?;
    if let Some(owner) = cdn::Entity::find_by_id(ds.cdn_id)
        .one(state.db.as_ref())
        .await
        .map_err(|e| ApiError::system(e.to_string()))?
    {
        check_cdn_locks(state.db.as_ref(), &user, &[owner.name.as_str()]).await?;
    }

    state
        .keys
        .delete(&xml_id, query.version.as_deref(), &user)
        .await?;
    Ok(Json(ApiResponse::<()>::alerts(vec![Alert::success(format!(
        "Successfully deleted ssl keys for {xml_id}"
    ))])))
}

#[utoipa::path(
    get,
    path = "/async_status/{id}",
    responses(
        (status = 200, description = "Job status", body = AsyncJobStatus),
        (status = 404, description = "No such job")
    ),
    params(("id" = i32, Path, description = "Async job id")),
    tag = "ACME"
)]
async fn get_async_status(
    State(state): State<Arc<AcmeAppState>>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, Problem> {
    let status = state
        .status
        .get(id)
        .await
        .map_err(|e| ApiError::system(e.to_string()))?
        .ok_or_else(|| ApiError::not_found(format!("async job {id} not found")))?;
    Ok(Json(ApiResponse::with_response(status)))
}

#[utoipa::path(
    get,
    path = "/dnsrecords",
    responses((status = 200, description = "Published DNS-01 challenge records", body = Vec<DnsRecord>)),
    params(DnsRecordsQuery),
    tag = "ACME"
)]
async fn list_dns_records(
    State(state): State<Arc<AcmeAppState>>,
    Query(query): Query<DnsRecordsQuery>,
) -> Result<impl IntoResponse, Problem> {
    let records: Vec<DnsRecord> = list_challenges(state.db.as_ref(), query.fqdn.as_deref())
        .await
        .map_err(ApiError::from)?
        .into_iter()
        .map(DnsRecord::from)
        .collect();
    Ok(Json(ApiResponse::with_response(records)))
}

#[utoipa::path(
    get,
    path = "/vault/ping",
    responses(
        (status = 200, description = "Traffic Vault is reachable", body = PingResponse),
        (status = 500, description = "Traffic Vault is unreachable")
    ),
    tag = "SSL Keys"
)]
async fn ping_vault(State(state): State<Arc<AcmeAppState>>) -> Result<impl IntoResponse, Problem> {
    let ping = state.vault.ping().await.map_err(ApiError::from)?;
    Ok(Json(ApiResponse::with_response(ping)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_legacy_double;
    use crate::handlers::types::{create_acme_app_state, AcmeDependencies};
    use crate::test_utils::{self_signed_certificate, MockProtocol, RecordingNotifier};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tops_config::{AcmeAccountConfig, ServerConfig};
    use tops_database::test_utils::TestDatabase;
    use tops_queue::{CdnWorkerSupervisor, WorkerPool};
    use tops_vault::test_utils::InMemoryTrafficVault;
    use tops_vault::TrafficVault;
    use tower::ServiceExt;

    const PROVIDER: &str = "Example CA";

    struct Harness {
        test_db: TestDatabase,
        pool: Arc<WorkerPool>,
        app: Router,
    }

    async fn harness() -> Harness {
        let test_db = TestDatabase::with_migrations().await.unwrap();
        let cdn = test_db.insert_cdn("cdn1").await.unwrap();
        test_db.insert_delivery_service("demo1", cdn.id, 1).await.unwrap();
        test_db.insert_delivery_service("fresh", cdn.id, 0).await.unwrap();

        let vault = Arc::new(InMemoryTrafficVault::new());
        let (crt, key) = self_signed_certificate("demo1.example.net", &[], 10);
        vault
            .put_delivery_service_ssl_keys(&DeliveryServiceSslKeys {
                delivery_service: "demo1".to_string(),
                cdn: "cdn1".to_string(),
                hostname: "demo1.example.net".to_string(),
                auth_type: PROVIDER.to_string(),
                version: 1,
                certificate: SslKeyCertificate {
                    crt: encode_legacy_double(crt.as_bytes()),
                    key: encode_legacy_double(key.as_bytes()),
                    csr: String::new(),
                },
                ..Default::default()
            })
            .await
            .unwrap();

        let mut config = ServerConfig::from_json(r#"{"database_url": "sqlite::memory:"}"#).unwrap();
        config.lets_encrypt.user_email = "ops@example.net".to_string();
        config.acme_accounts.push(AcmeAccountConfig {
            acme_provider: PROVIDER.to_string(),
            user_email: "ops@example.net".to_string(),
            acme_url: "https://acme.example.net/directory".to_string(),
            ..Default::default()
        });

        let pool = WorkerPool::new(1, 4);
        let supervisor = Arc::new(CdnWorkerSupervisor::new(Arc::new(
            crate::keys::StaleKeyCleanup::new(vault.clone(), test_db.db.clone()),
        )));
        let state = create_acme_app_state(
            &config,
            AcmeDependencies {
                db: test_db.db.clone(),
                vault,
                protocol: Arc::new(MockProtocol::new()),
                queue: pool.clone(),
                supervisor,
                notifier: RecordingNotifier::new(),
            },
        );
        let app = configure_routes().with_state(state);
        Harness { test_db, pool, app }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value, Option<String>) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_HEADER, "admin")
            .header(header::CONTENT_TYPE, "application/json");
        let body = match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json, location)
    }

    #[tokio::test]
    async fn manual_renewal_answers_with_a_success_alert() {
        let h = harness().await;

        let (status, body, _) =
            send(&h.app, "POST", "/deliveryservices/xmlId/demo1/sslkeys/renew", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["alerts"][0]["level"], "success");
        assert_eq!(body["alerts"][0]["text"], "Certificate for demo1 successfully renewed.");
        assert_eq!(body["response"]["version"], 2);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn renewal_needs_existing_keys() {
        let h = harness().await;

        let (status, _, _) =
            send(&h.app, "POST", "/deliveryservices/xmlId/fresh/sslkeys/renew", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) =
            send(&h.app, "POST", "/deliveryservices/xmlId/nope/sslkeys/renew", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn requests_without_an_operator_are_rejected() {
        let h = harness().await;

        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/acme_autorenew")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn batch_renewal_is_accepted_with_a_polling_location() {
        let h = harness().await;

        let (status, body, location) = send(&h.app, "POST", "/letsencrypt/autorenew", None).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        let id = body["response"]["id"].as_i64().unwrap();
        assert_eq!(location, Some(format!("/api/5.0/async_status/{id}")));

        let (status, job, _) = send(&h.app, "GET", &format!("/async_status/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["response"]["id"], id);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn acme_generation_is_accepted() {
        let h = harness().await;
        let request = serde_json::json!({
            "deliveryservice": "fresh",
            "cdn": "cdn1",
            "hostname": "fresh.example.net",
            "authType": PROVIDER
        });

        let (status, body, _) = send(
            &h.app,
            "POST",
            "/deliveryservices/sslkeys/generate/acme",
            Some(request),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        let id = body["response"]["id"].as_i64().unwrap();
        assert_eq!(
            body["alerts"][0]["text"],
            format!(
                "Beginning async ACME call for fresh using {PROVIDER}. This may take a few minutes. Status updates can be found here: /api/5.0/async_status/{id}"
            )
        );
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn generation_for_a_locked_cdn_is_forbidden() {
        let h = harness().await;
        h.test_db.lock_cdn("cdn1", "alice", false).await.unwrap();
        let request = serde_json::json!({
            "deliveryservice": "fresh",
            "cdn": "cdn1",
            "hostname": "fresh.example.net"
        });

        let (status, _, _) = send(
            &h.app,
            "POST",
            "/deliveryservices/sslkeys/generate/letsencrypt",
            Some(request),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn uploaded_self_signed_chain_gets_a_warning() {
        let h = harness().await;
        let (crt, key) = self_signed_certificate("fresh.example.net", &[], 90);
        let request = serde_json::json!({
            "deliveryservice": "fresh",
            "cdn": "cdn1",
            "hostname": "fresh.example.net",
            "certificate": { "crt": crt, "key": key }
        });

        let (status, body, _) =
            send(&h.app, "POST", "/deliveryservices/sslkeys/add", Some(request)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["unknown_authority"], true);
        assert_eq!(body["alerts"][1]["level"], "warning");

        let (status, keys, _) = send(
            &h.app,
            "GET",
            "/deliveryservices/xmlId/fresh/sslkeys?decode=true",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(keys["response"]["certificate"]["crt"]
            .as_str()
            .unwrap()
            .starts_with("-----BEGIN CERTIFICATE-----"));
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn keys_can_be_deleted() {
        let h = harness().await;

        let (status, _, _) = send(&h.app, "DELETE", "/deliveryservices/xmlId/demo1/sslkeys", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(&h.app, "GET", "/deliveryservices/xmlId/demo1/sslkeys", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_async_job_is_not_found() {
        let h = harness().await;
        let (status, body, _) = send(&h.app, "GET", "/async_status/404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["title"], "Resource Not Found");
        h.pool.shutdown().await;
    }

    #[tokio::test]
    async fn dns_records_and_vault_ping_are_readable() {
        let h = harness().await;

        let (status, body, _) = send(&h.app, "GET", "/dnsrecords?fqdn=_acme-challenge.x.", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], serde_json::json!([]));

        let (status, body, _) = send(&h.app, "GET", "/vault/ping", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["status"], "OK");
        h.pool.shutdown().await;
    }
}
