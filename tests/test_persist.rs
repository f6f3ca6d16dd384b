use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use catalog_images::constants::BROWSER_USER_AGENTS;
use catalog_images::persist::{PersistOutcome, Persister};
use catalog_images::source::Artifact;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n fake png";

fn persister() -> Persister {
    Persister::new()
        .expect("persister")
        .with_access_denied_pause(Duration::from_millis(1))
}

fn leftover_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect()
}

#[tokio::test]
async fn forbidden_retries_once_with_another_identity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hotlinked.png"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hotlinked.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG, "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("out.png");
    let artifact = Artifact::Url(format!("{}/hotlinked.png", server.uri()));

    let outcome = persister().persist(&artifact, &target).await;

    assert!(matches!(outcome, PersistOutcome::Success(size) if size == PNG.len() as u64));
    assert_eq!(std::fs::read(&target).expect("read"), PNG);

    let requests = server.received_requests().await.expect("recording enabled");
    let agents: Vec<_> = requests
        .iter()
        .map(|request| {
            request
                .headers
                .get("user-agent")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string()
        })
        .collect();
    assert_eq!(agents, vec![BROWSER_USER_AGENTS[0], BROWSER_USER_AGENTS[1]]);
}

#[tokio::test]
async fn forbidden_twice_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blocked.png"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("out.png");
    let artifact = Artifact::Url(format!("{}/blocked.png", server.uri()));

    let outcome = persister().persist(&artifact, &target).await;

    assert!(matches!(outcome, PersistOutcome::DownloadFailed(reason) if reason.contains("403")));
    assert!(leftover_files(dir.path()).is_empty());
}

#[tokio::test]
async fn empty_download_leaves_no_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(Vec::<u8>::new(), "image/png"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("out.png");
    let artifact = Artifact::Url(format!("{}/empty.png", server.uri()));

    let outcome = persister().persist(&artifact, &target).await;

    assert!(matches!(outcome, PersistOutcome::DownloadFailed(_)));
    assert!(!target.exists());
    assert!(leftover_files(dir.path()).is_empty());
}

#[tokio::test]
async fn not_found_download_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("out.png");
    let artifact = Artifact::Url(format!("{}/gone.png", server.uri()));

    let outcome = persister().persist(&artifact, &target).await;

    assert!(matches!(outcome, PersistOutcome::DownloadFailed(_)));
    assert!(leftover_files(dir.path()).is_empty());
}

#[tokio::test]
async fn non_image_content_type_is_still_saved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/odd"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG, "application/octet-stream"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("odd.jpg");
    let artifact = Artifact::Url(format!("{}/odd", server.uri()));

    let outcome = persister().persist(&artifact, &target).await;

    assert!(matches!(outcome, PersistOutcome::Success(_)));
}

#[tokio::test]
async fn interrupted_download_leaves_no_partial_file() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            let read = stream.read(&mut buf).expect("read request");
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buf[..read]);
        }
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 100000\r\n\r\n",
            )
            .expect("write headers");
        stream.write_all(PNG).expect("write body");
        stream.flush().expect("flush");
    });

    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("out.png");
    let artifact = Artifact::Url(format!("http://{addr}/cut-short.png"));

    let outcome = persister().persist(&artifact, &target).await;
    server.join().expect("server thread");

    assert!(matches!(outcome, PersistOutcome::DownloadFailed(_)));
    assert!(!target.exists());
    assert!(leftover_files(dir.path()).is_empty());
}
