//! HTTP routes
//!
//! Every response is a JSON envelope whose `status` is `success`, `error`
//! or `unauthenticated`. Service calls block, so each handler runs its call
//! on tokio's blocking pool.

use std::convert::Infallible;
use std::sync::Arc;

use log::{debug, warn};
use mail::{MailError, NewsletterService};
use serde::{Deserialize, Serialize};
use warp::http::{StatusCode, Uri};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Largest accepted JSON request body
const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailParams {
    #[serde(default)]
    pub email_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FolderRequest {
    #[serde(default)]
    pub folder_name: String,
}

#[derive(Serialize)]
struct SuccessBody<'a, T> {
    status: &'static str,
    data: &'a T,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_url: Option<&'a str>,
}

/// All API routes with CORS for `allowed_origins`
pub fn api(
    service: Arc<NewsletterService>,
    allowed_origins: &[String],
) -> impl Filter<Extract = (impl Reply + use<>,), Error = Rejection> + Clone + use<> {
    let root = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({ "message": "Gazette newsletter API" })));

    let search_emails = warp::path!("api" / "search-emails" / ..)
        .and(warp::get())
        .and(warp::query::<SearchParams>())
        .and(with_service(service.clone()))
        .and_then(search_emails);

    let live_search = warp::path!("api" / "live-search" / ..)
        .and(warp::get())
        .and(warp::query::<SearchParams>())
        .and(with_service(service.clone()))
        .and_then(live_search);

    let summarize = warp::path!("api" / "summarize-email" / ..)
        .and(warp::get())
        .and(warp::query::<EmailParams>())
        .and(with_service(service.clone()))
        .and_then(summarize_email);

    let ingest = warp::path!("api" / "ingest")
        .and(warp::post())
        .and(with_service(service.clone()))
        .and_then(ingest);

    let auth_status = warp::path!("api" / "auth" / "status")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(auth_status);

    let auth_callback = warp::path!("api" / "auth" / "callback")
        .and(warp::get())
        .and(warp::query::<CallbackParams>())
        .and(with_service(service.clone()))
        .and_then(auth_callback);

    let logout = warp::path!("api" / "auth" / "logout")
        .and(warp::post())
        .and(with_service(service.clone()))
        .and_then(logout);

    let get_folder = warp::path!("api" / "folder")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(get_folder);

    let set_folder = warp::path!("api" / "folder")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json::<FolderRequest>())
        .and(with_service(service.clone()))
        .and_then(set_folder);

    let list_folders = warp::path!("api" / "folders")
        .and(warp::get())
        .and(with_service(service))
        .and_then(list_folders);

    root.or(search_emails)
        .or(live_search)
        .or(summarize)
        .or(ingest)
        .or(auth_status)
        .or(auth_callback)
        .or(logout)
        .or(get_folder)
        .or(set_folder)
        .or(list_folders)
        .recover(handle_rejection)
        .with(cors(allowed_origins))
        .with(warp::log("gazette::http"))
}

fn with_service(
    service: Arc<NewsletterService>,
) -> impl Filter<Extract = (Arc<NewsletterService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

fn cors(allowed_origins: &[String]) -> warp::cors::Builder {
    let origins: Vec<&str> = allowed_origins
        .iter()
        .map(String::as_str)
        .filter(|origin| {
            let valid = is_valid_origin(origin);
            if !valid {
                warn!("Ignoring invalid CORS origin {:?}", origin);
            }
            valid
        })
        .collect();

    warp::cors()
        .allow_origins(origins)
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type", "authorization"])
}

/// An origin is `scheme://host[:port]` with nothing after it
fn is_valid_origin(origin: &str) -> bool {
    match origin.parse::<Uri>() {
        Ok(uri) => {
            uri.scheme().is_some()
                && uri.authority().is_some()
                && matches!(uri.path(), "" | "/")
                && !origin.ends_with('/')
                && uri.query().is_none()
        }
        Err(_) => false,
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn search_emails(
    params: SearchParams,
    service: Arc<NewsletterService>,
) -> Result<Response, Infallible> {
    Ok(respond(
        run_blocking(move || service.search_stored(&params.query)).await,
    ))
}

async fn live_search(
    params: SearchParams,
    service: Arc<NewsletterService>,
) -> Result<Response, Infallible> {
    Ok(respond(
        run_blocking(move || service.search_live(&params.query)).await,
    ))
}

async fn summarize_email(
    params: EmailParams,
    service: Arc<NewsletterService>,
) -> Result<Response, Infallible> {
    Ok(respond(
        run_blocking(move || service.summarize_email(&params.email_id)).await,
    ))
}

async fn ingest(service: Arc<NewsletterService>) -> Result<Response, Infallible> {
    Ok(respond(run_blocking(move || service.ingest()).await))
}

async fn auth_status(service: Arc<NewsletterService>) -> Result<Response, Infallible> {
    Ok(respond(run_blocking(move || service.auth_status()).await))
}

async fn auth_callback(
    params: CallbackParams,
    service: Arc<NewsletterService>,
) -> Result<Response, Infallible> {
    if let Some(error) = params.error {
        debug!("Authorization denied by provider: {}", error);
        return Ok(failure(&MailError::AuthRequired { auth_url: None }));
    }
    let Some(code) = params.code.filter(|c| !c.trim().is_empty()) else {
        return Ok(failure(&MailError::invalid("code is required")));
    };

    let result = run_blocking(move || {
        service.complete_authorization(&code)?;
        service.auth_status()
    })
    .await;
    Ok(respond(result))
}

async fn logout(service: Arc<NewsletterService>) -> Result<Response, Infallible> {
    let result = run_blocking(move || {
        service.logout()?;
        service.auth_status()
    })
    .await;
    Ok(respond(result))
}

async fn get_folder(service: Arc<NewsletterService>) -> Result<Response, Infallible> {
    Ok(respond(
        run_blocking(move || Ok(service.folder_config())).await,
    ))
}

async fn set_folder(
    request: FolderRequest,
    service: Arc<NewsletterService>,
) -> Result<Response, Infallible> {
    Ok(respond(
        run_blocking(move || service.set_folder(&request.folder_name)).await,
    ))
}

async fn list_folders(service: Arc<NewsletterService>) -> Result<Response, Infallible> {
    Ok(respond(run_blocking(move || service.list_folders()).await))
}

/// Run a service call on the blocking pool
async fn run_blocking<T, F>(call: F) -> Result<T, MailError>
where
    F: FnOnce() -> Result<T, MailError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Request worker failed: {}", e);
            Err(MailError::upstream("request worker failed"))
        }
    }
}

// ============================================================================
// Envelopes
// ============================================================================

fn respond<T: Serialize>(result: Result<T, MailError>) -> Response {
    match result {
        Ok(data) => success(&data),
        Err(error) => failure(&error),
    }
}

fn success<T: Serialize>(data: &T) -> Response {
    warp::reply::json(&SuccessBody {
        status: "success",
        data,
    })
    .into_response()
}

fn failure(error: &MailError) -> Response {
    let (status, code, auth_url) = match error {
        MailError::AuthRequired { auth_url } => {
            ("unauthenticated", StatusCode::UNAUTHORIZED, auth_url.as_deref())
        }
        MailError::InvalidArgument { .. } => ("error", StatusCode::BAD_REQUEST, None),
        MailError::NotFound { .. } => ("error", StatusCode::NOT_FOUND, None),
        MailError::UpstreamUnavailable { .. } => ("error", StatusCode::SERVICE_UNAVAILABLE, None),
        MailError::MalformedContent { .. } => ("error", StatusCode::BAD_GATEWAY, None),
    };

    let body = ErrorBody {
        status,
        kind: error.kind(),
        message: error.to_string(),
        auth_url,
    };
    warp::reply::with_status(warp::reply::json(&body), code).into_response()
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let error = if rejection.is_not_found() {
        MailError::not_found("route")
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        MailError::invalid(format!("invalid request body: {}", e))
    } else if rejection.find::<warp::reject::InvalidQuery>().is_some() {
        MailError::invalid("invalid query string")
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        MailError::invalid("request body too large")
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&ErrorBody {
                status: "error",
                kind: "method_not_allowed",
                message: "Method not allowed".to_string(),
                auth_url: None,
            }),
            StatusCode::METHOD_NOT_ALLOWED,
        )
        .into_response());
    } else {
        warn!("Unhandled rejection: {:?}", rejection);
        MailError::invalid("bad request")
    };

    Ok(failure(&error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use mail::gmail::api::GmailMessage;
    use mail::{
        AuthStatus, Authenticator, FolderSettings, InMemoryMailStore, IngestOptions, Label,
        LabelId, MailStore, Mailbox, Message, MessageId, Summarizer,
    };
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    const CONSENT_URL: &str = "https://accounts.example.com/consent";

    /// Mailbox with one empty folder that needs authorization to read
    struct FakeMailbox {
        authorized: Arc<AtomicBool>,
    }

    impl FakeMailbox {
        fn check(&self) -> Result<()> {
            if self.authorized.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(MailError::AuthRequired {
                    auth_url: Some(CONSENT_URL.to_string()),
                }
                .into())
            }
        }
    }

    impl Mailbox for FakeMailbox {
        fn list_labels(&self) -> Result<Vec<Label>> {
            self.check()?;
            Ok(vec![
                Label::system("INBOX", "INBOX"),
                Label::new("Label_1", "Newsletter"),
            ])
        }

        fn list_message_ids(&self, _label: &LabelId, _max: usize) -> Result<Vec<MessageId>> {
            self.check()?;
            Ok(Vec::new())
        }

        fn get_message(&self, id: &MessageId) -> Result<GmailMessage> {
            self.check()?;
            Err(MailError::not_found(format!("message {}", id)).into())
        }
    }

    struct FakeAuth {
        authorized: Arc<AtomicBool>,
    }

    impl Authenticator for FakeAuth {
        fn auth_status(&self) -> Result<AuthStatus> {
            Ok(if self.authorized.load(Ordering::SeqCst) {
                AuthStatus::Authenticated
            } else {
                AuthStatus::Unauthenticated {
                    auth_url: CONSENT_URL.to_string(),
                }
            })
        }

        fn complete_authorization(&self, code: &str) -> Result<()> {
            if code != "valid-code" {
                return Err(MailError::AuthRequired { auth_url: None }.into());
            }
            self.authorized.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn logout(&self) -> Result<()> {
            self.authorized.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StaticSummarizer;

    impl Summarizer for StaticSummarizer {
        fn summarize(&self, subject: &str, _body: &str) -> String {
            format!("In short: {}", subject)
        }
    }

    fn setup(authorized: bool) -> (Arc<NewsletterService>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let flag = Arc::new(AtomicBool::new(authorized));

        let store = Arc::new(InMemoryMailStore::new());
        store
            .upsert_message(
                Message::builder(MessageId::new("a"))
                    .sender("news@example.com")
                    .subject("Weekly Sales Report")
                    .body("numbers")
                    .build(),
            )
            .unwrap();
        store
            .upsert_message(
                Message::builder(MessageId::new("b"))
                    .sender("news@example.com")
                    .subject("Newsletter")
                    .body("our sales grew")
                    .build(),
            )
            .unwrap();

        let service = NewsletterService::new(
            store,
            Arc::new(FakeMailbox {
                authorized: flag.clone(),
            }),
            Arc::new(FakeAuth { authorized: flag }),
            FolderSettings::new(dir.path().join("folder-config.json")),
            Arc::new(StaticSummarizer),
            IngestOptions::default(),
        );
        (Arc::new(service), dir)
    }

    fn body_json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_search_emails() {
        let (service, _dir) = setup(true);
        let api = api(service, &[]);

        let res = warp::test::request()
            .method("GET")
            .path("/api/search-emails/?query=sales")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res.body());
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"][0]["id"], "a");
        assert_eq!(json["data"][0]["match_type"], "header");
        assert_eq!(json["data"][1]["id"], "b");
        assert_eq!(json["data"][1]["match_type"], "body");
    }

    #[tokio::test]
    async fn test_summarize_email() {
        let (service, _dir) = setup(true);
        let api = api(service, &[]);

        let res = warp::test::request()
            .path("/api/summarize-email/?email_id=a")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            body_json(res.body())["data"]["summary"],
            "In short: Weekly Sales Report"
        );

        let res = warp::test::request()
            .path("/api/summarize-email/?email_id=zzz")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let json = body_json(res.body());
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "not_found");

        let res = warp::test::request()
            .path("/api/summarize-email/")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ingest_requires_authorization() {
        let (service, _dir) = setup(false);
        let api = api(service, &[]);

        let res = warp::test::request()
            .method("POST")
            .path("/api/ingest")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(res.body());
        assert_eq!(json["status"], "unauthenticated");
        assert_eq!(json["auth_url"], CONSENT_URL);
    }

    #[tokio::test]
    async fn test_ingest_missing_folder() {
        let (service, _dir) = setup(true);
        let api = api(service, &[]);

        let res = warp::test::request()
            .method("POST")
            .path("/api/ingest")
            .reply(&api)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res.body());
        assert_eq!(json["data"]["result"], "folder_not_found");
        assert_eq!(json["data"]["folder_name"], "Da guardare");
    }

    #[tokio::test]
    async fn test_auth_flow() {
        let (service, _dir) = setup(false);
        let api = api(service, &[]);

        let res = warp::test::request()
            .path("/api/auth/status")
            .reply(&api)
            .await;
        let json = body_json(res.body());
        assert_eq!(json["data"]["state"], "unauthenticated");
        assert_eq!(json["data"]["auth_url"], CONSENT_URL);

        let res = warp::test::request()
            .path("/api/auth/callback?code=wrong")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = warp::test::request()
            .path("/api/auth/callback?code=valid-code")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body())["data"]["state"], "authenticated");

        let res = warp::test::request()
            .method("POST")
            .path("/api/auth/logout")
            .reply(&api)
            .await;
        assert_eq!(body_json(res.body())["data"]["state"], "unauthenticated");
    }

    #[tokio::test]
    async fn test_folder_config() {
        let (service, _dir) = setup(true);
        let api = api(service, &[]);

        let res = warp::test::request().path("/api/folder").reply(&api).await;
        assert_eq!(body_json(res.body())["data"]["folder_name"], "Da guardare");

        let res = warp::test::request()
            .method("POST")
            .path("/api/folder")
            .json(&serde_json::json!({ "folder_name": "Newsletter" }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body())["data"]["folder_name"], "Newsletter");

        let res = warp::test::request()
            .method("POST")
            .path("/api/folder")
            .json(&serde_json::json!({ "folder_name": "  " }))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res.body())["kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_list_folders_and_live_search() {
        let (service, _dir) = setup(true);
        let api = api(service, &[]);

        let res = warp::test::request().path("/api/folders").reply(&api).await;
        let json = body_json(res.body());
        assert_eq!(json["data"][0]["name"], "Newsletter");

        let res = warp::test::request()
            .path("/api/live-search/?query=anything")
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res.body())["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (service, _dir) = setup(true);
        let api = api(service, &[]);

        let res = warp::test::request().path("/api/nope").reply(&api).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res.body())["status"], "error");
    }

    #[tokio::test]
    async fn test_root() {
        let (service, _dir) = setup(true);
        let api = api(service, &[]);

        let res = warp::test::request().path("/").reply(&api).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn test_origin_validation() {
        assert!(is_valid_origin("http://localhost:3000"));
        assert!(is_valid_origin("https://news.example.com"));
        assert!(!is_valid_origin("localhost:3000"));
        assert!(!is_valid_origin("http://localhost:3000/app"));
        assert!(!is_valid_origin("*"));
    }
}
