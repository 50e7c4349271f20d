//! Docker Engine API client.
//!
//! Talks to the daemon over its Unix socket. Every path is prefixed with the
//! configured API version (`/v1.35/containers/json`).
//!
//! Reference: https://docs.docker.com/engine/api/v1.35/

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use hyper::body::{Buf, HttpBody};
use hyper::{Body, Client, Method, Request, Response, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use iot_model::{
    ContainerSpec, HostConfig, NetworkSpec, NetworkingConfig, RuntimeConfig, VolumeSpec,
};
use iot_reconcile::{
    ContainerRuntime, ContainerSummary, CreatedContainer, CreatedNetwork, NetworkSummary,
    ProgressStream, RuntimeError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

/// Errors from the Docker Engine API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("request error: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl From<ApiError> for RuntimeError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Api { status, message } => RuntimeError::Api { status, message },
            ApiError::Json(e) => RuntimeError::Decode(e.to_string()),
            ApiError::Request(e) => RuntimeError::InvalidRequest(e.to_string()),
            ApiError::Http(e) => RuntimeError::Transport(Box::new(e)),
        }
    }
}

/// Error body returned by the daemon.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeResponse {
    name: String,
}

#[derive(Serialize)]
struct CreateNetworkBody<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(flatten)]
    spec: &'a NetworkSpec,
}

#[derive(Serialize)]
struct CreateContainerBody<'a> {
    #[serde(flatten)]
    config: &'a RuntimeConfig,
    #[serde(rename = "HostConfig")]
    host_config: &'a HostConfig,
    #[serde(rename = "NetworkingConfig")]
    networking_config: &'a NetworkingConfig,
}

/// Docker Engine API client for Unix socket communication.
pub struct DockerClient {
    socket_path: String,
    api_version: String,
    client: Client<UnixConnector>,
}

impl DockerClient {
    /// Create a client for the daemon socket at `socket_path`.
    pub fn new<P: AsRef<Path>>(socket_path: P, api_version: impl Into<String>) -> Self {
        let socket_path = socket_path.as_ref().to_string_lossy().to_string();
        let client = Client::unix();
        Self {
            socket_path,
            api_version: api_version.into(),
            client,
        }
    }

    /// Check if the socket exists.
    pub fn socket_exists(&self) -> bool {
        Path::new(&self.socket_path).exists()
    }

    fn uri(&self, path: &str, query: Option<String>) -> Uri {
        let mut full = format!("/v{}{}", self.api_version, path);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            full.push('?');
            full.push_str(&query);
        }
        Uri::new(&self.socket_path, &full)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: Option<String>,
        body: Option<Vec<u8>>,
    ) -> Result<Response<Body>, ApiError> {
        debug!(method = %method, path, "Docker API request");

        let mut builder = Request::builder()
            .method(method)
            .uri(self.uri(path, query))
            .header("Accept", "application/json");

        let body = match body {
            Some(bytes) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(bytes)
            }
            None => Body::empty(),
        };

        let response = self.client.request(builder.body(body)?).await?;
        let status = response.status();

        // 304 means the container was already in the requested state.
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            Ok(response)
        } else {
            Err(api_error(status, response.into_body()).await)
        }
    }

    async fn send_json<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        query: Option<String>,
        body: &T,
    ) -> Result<Response<Body>, ApiError> {
        let bytes = serde_json::to_vec(body)?;
        self.send(method, path, query, Some(bytes)).await
    }

    async fn read_json<T: DeserializeOwned>(response: Response<Body>) -> Result<T, ApiError> {
        let body = hyper::body::aggregate(response.into_body()).await?;
        Ok(serde_json::from_reader(body.reader())?)
    }
}

async fn api_error(status: StatusCode, body: Body) -> ApiError {
    let message = match hyper::body::to_bytes(body).await {
        Ok(bytes) => match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(decoded) => decoded.message,
            Err(_) => String::from_utf8_lossy(&bytes).trim().to_string(),
        },
        Err(e) => e.to_string(),
    };
    error!(status = %status, message = %message, "Docker API error");
    ApiError::Api {
        status: status.as_u16(),
        message,
    }
}

fn query<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Split an image reference into the `fromImage` and `tag` pull parameters.
///
/// A digest reference (`repo@sha256:…`) passes the digest as the tag. A
/// reference without a tag pulls `latest`.
pub fn split_image_ref(image: &str) -> (&str, &str) {
    if let Some((repo, digest)) = image.split_once('@') {
        return (repo, digest);
    }

    // A colon before the last slash belongs to a registry port.
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (&image[..split], &image[split + 1..])
        }
        None => (image, "latest"),
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<String, RuntimeError> {
        let response = self
            .send_json(Method::POST, "/volumes/create", None, spec)
            .await?;
        let volume: VolumeResponse = Self::read_json(response).await?;
        Ok(volume.name)
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSummary>, RuntimeError> {
        let response = self.send(Method::GET, "/networks", None, None).await?;
        Ok(Self::read_json(response).await?)
    }

    async fn create_network(
        &self,
        name: &str,
        spec: &NetworkSpec,
    ) -> Result<CreatedNetwork, RuntimeError> {
        let body = CreateNetworkBody { name, spec };
        let response = self
            .send_json(Method::POST, "/networks/create", None, &body)
            .await?;
        Ok(Self::read_json(response).await?)
    }

    async fn pull_image(&self, image: &str) -> Result<ProgressStream, RuntimeError> {
        let (repo, tag) = split_image_ref(image);
        if repo.is_empty() || tag.is_empty() {
            return Err(RuntimeError::InvalidRequest(format!(
                "invalid image reference {image:?}"
            )));
        }

        let response = self
            .send(
                Method::POST,
                "/images/create",
                Some(query([("fromImage", repo), ("tag", tag)])),
                None,
            )
            .await?;

        let chunks = stream::unfold(response.into_body(), |mut body| async move {
            body.data().await.map(|chunk| {
                let chunk = chunk.map_err(|e| RuntimeError::Transport(Box::new(e)));
                (chunk, body)
            })
        });
        Ok(Box::pin(chunks))
    }

    async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let all = if include_stopped { "true" } else { "false" };
        let response = self
            .send(
                Method::GET,
                "/containers/json",
                Some(query([("all", all)])),
                None,
            )
            .await?;
        Ok(Self::read_json(response).await?)
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> Result<(), RuntimeError> {
        let secs = timeout.as_secs().to_string();
        self.send(
            Method::POST,
            &format!("/containers/{id}/stop"),
            Some(query([("t", secs.as_str())])),
            None,
        )
        .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let force = if force { "true" } else { "false" };
        self.send(
            Method::DELETE,
            &format!("/containers/{id}"),
            Some(query([("force", force)])),
            None,
        )
        .await?;
        Ok(())
    }

    async fn create_container(
        &self,
        name: &str,
        spec: &ContainerSpec,
    ) -> Result<CreatedContainer, RuntimeError> {
        let body = CreateContainerBody {
            config: &spec.config,
            host_config: &spec.host_config,
            networking_config: &spec.networking_config,
        };
        let response = self
            .send_json(
                Method::POST,
                "/containers/create",
                Some(query([("name", name)])),
                &body,
            )
            .await?;
        Ok(Self::read_json(response).await?)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.send(Method::POST, &format!("/containers/{id}/start"), None, None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use hyper::server::conn::Http;
    use hyper::service::service_fn;
    use iot_reconcile::ContainerState;
    use tokio::net::UnixListener;
    use tokio_stream::StreamExt;

    use super::*;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        target: String,
        body: String,
    }

    type Route = fn(&str, &str) -> (u16, String);

    /// Docker daemon stand-in served by hyper on a Unix socket.
    struct FakeDaemon {
        _dir: tempfile::TempDir,
        socket: std::path::PathBuf,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    impl FakeDaemon {
        fn start(route: Route) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let socket = dir.path().join("docker.sock");
            let listener = UnixListener::bind(&socket).unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));

            let recorded = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let recorded = Arc::clone(&recorded);
                    let service =
                        service_fn(move |request| handle(request, route, Arc::clone(&recorded)));
                    tokio::spawn(async move {
                        if let Err(e) = Http::new()
                            .http1_only(true)
                            .serve_connection(stream, service)
                            .await
                        {
                            debug!(error = %e, "Fake daemon connection closed");
                        }
                    });
                }
            });

            Self {
                _dir: dir,
                socket,
                requests,
            }
        }

        fn client(&self) -> DockerClient {
            DockerClient::new(&self.socket, "1.35")
        }

        fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn handle(
        request: Request<Body>,
        route: Route,
        recorded: Arc<Mutex<Vec<Recorded>>>,
    ) -> Result<Response<Body>, hyper::Error> {
        let method = request.method().to_string();
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default();
        let body = hyper::body::to_bytes(request.into_body()).await?;

        let (status, response_body) = route(&method, &target);
        recorded.lock().unwrap().push(Recorded {
            method,
            target,
            body: String::from_utf8_lossy(&body).into_owned(),
        });

        Ok(Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .body(Body::from(response_body))
            .unwrap())
    }

    fn engine(method: &str, target: &str) -> (u16, String) {
        let path = target.split('?').next().unwrap_or_default();
        match (method, path) {
            ("POST", "/v1.35/volumes/create") => (201, r#"{"Name":"data","Driver":"local"}"#.into()),
            ("GET", "/v1.35/networks") => (
                200,
                r#"[{"Id":"n1","Name":"bridge","Driver":"bridge"}]"#.into(),
            ),
            ("POST", "/v1.35/networks/create") => (201, r#"{"Id":"n2","Warning":""}"#.into()),
            ("POST", "/v1.35/images/create") => (
                200,
                "{\"status\":\"Pulling from library/busybox\"}\r\n{\"status\":\"Digest: sha256:abc\"}\r\n".into(),
            ),
            ("GET", "/v1.35/containers/json") => (
                200,
                r#"[{"Id":"web-id","Names":["/web"],"State":"running","Image":"nginx"}]"#.into(),
            ),
            ("POST", "/v1.35/containers/web-id/stop") => (304, String::new()),
            ("DELETE", "/v1.35/containers/web-id") => (204, String::new()),
            ("POST", "/v1.35/containers/create") => {
                (201, r#"{"Id":"new-id","Warnings":null}"#.into())
            }
            ("POST", "/v1.35/containers/new-id/start") => (204, String::new()),
            _ => (404, r#"{"message":"page not found"}"#.into()),
        }
    }

    fn conflict(_method: &str, _target: &str) -> (u16, String) {
        (
            409,
            r#"{"message":"Conflict. The container name \"/web\" is already in use"}"#.into(),
        )
    }

    #[test]
    fn test_split_image_ref() {
        assert_eq!(split_image_ref("busybox"), ("busybox", "latest"));
        assert_eq!(split_image_ref("busybox:1.36"), ("busybox", "1.36"));
        assert_eq!(
            split_image_ref("registry.local:5000/team/app"),
            ("registry.local:5000/team/app", "latest")
        );
        assert_eq!(
            split_image_ref("registry.local:5000/team/app:2.0"),
            ("registry.local:5000/team/app", "2.0")
        );
        assert_eq!(
            split_image_ref("alpine@sha256:deadbeef"),
            ("alpine", "sha256:deadbeef")
        );
    }

    #[test]
    fn test_api_error_conversion() {
        let err: RuntimeError = ApiError::Api {
            status: 404,
            message: "no such container".into(),
        }
        .into();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_and_stop_and_remove() {
        let daemon = FakeDaemon::start(engine);
        let client = daemon.client();

        let containers = client.list_containers(true).await.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].primary_name(), Some("web"));
        assert_eq!(containers[0].state, ContainerState::Running);

        // 304 from an already stopped container is not an error.
        client
            .stop_container("web-id", Duration::from_secs(30))
            .await
            .unwrap();
        client.remove_container("web-id", true).await.unwrap();

        let targets: Vec<String> = daemon.requests().into_iter().map(|r| r.target).collect();
        assert_eq!(
            targets,
            vec![
                "/v1.35/containers/json?all=true",
                "/v1.35/containers/web-id/stop?t=30",
                "/v1.35/containers/web-id?force=true",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_and_start_container() {
        let daemon = FakeDaemon::start(engine);
        let client = daemon.client();

        let mut spec = ContainerSpec::from_image("nginx:1.25");
        spec.config.env.push("MODE=edge".to_string());

        let created = client.create_container("web", &spec).await.unwrap();
        assert_eq!(created.id, "new-id");
        assert!(created.warnings.is_empty());
        client.start_container(&created.id).await.unwrap();

        let requests = daemon.requests();
        assert_eq!(requests[0].target, "/v1.35/containers/create?name=web");
        let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["Image"], "nginx:1.25");
        assert_eq!(body["Env"][0], "MODE=edge");
        assert!(body["HostConfig"].is_object());
        assert!(body["NetworkingConfig"].is_object());
        assert_eq!(requests[1].method, "POST");
        assert_eq!(requests[1].target, "/v1.35/containers/new-id/start");
    }

    #[tokio::test]
    async fn test_volume_and_network_create() {
        let daemon = FakeDaemon::start(engine);
        let client = daemon.client();

        let name = client.create_volume(&VolumeSpec::new("data")).await.unwrap();
        assert_eq!(name, "data");

        let networks = client.list_networks().await.unwrap();
        assert_eq!(networks[0].name, "bridge");

        let spec = NetworkSpec::with_driver("bridge").with_subnet("10.0.0.0/24");
        let created = client.create_network("net-a", &spec).await.unwrap();
        assert_eq!(created.id, "n2");

        let requests = daemon.requests();
        let body: serde_json::Value = serde_json::from_str(&requests[2].body).unwrap();
        assert_eq!(body["Name"], "net-a");
        assert_eq!(body["Driver"], "bridge");
        assert_eq!(body["IPAM"]["Config"][0]["Subnet"], "10.0.0.0/24");
    }

    #[tokio::test]
    async fn test_pull_streams_progress() {
        let daemon = FakeDaemon::start(engine);
        let client = daemon.client();

        let mut stream = client.pull_image("busybox:1.36").await.unwrap();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        let text = String::from_utf8(body).unwrap();
        assert_eq!(text.lines().count(), 2);

        assert_eq!(
            daemon.requests()[0].target,
            "/v1.35/images/create?fromImage=busybox&tag=1.36"
        );
    }

    #[tokio::test]
    async fn test_error_message_is_decoded() {
        let daemon = FakeDaemon::start(conflict);
        let err = daemon
            .client()
            .create_container("web", &ContainerSpec::from_image("nginx"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(409));
        match err {
            RuntimeError::Api { message, .. } => assert!(message.starts_with("Conflict.")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_socket_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = DockerClient::new(dir.path().join("absent.sock"), "1.35");
        assert!(!client.socket_exists());

        let err = client.list_networks().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Transport(_)));
    }
}
