//! Integration tests for precache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    /// Isolated config + state directory for one test
    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let state = dir.path().join("state");
            std::fs::write(
                dir.path().join("config.toml"),
                format!(
                    "[storage]\ndir = {:?}\n\n[network]\ntimeout_secs = 5\n",
                    state.display().to_string()
                ),
            )
            .unwrap();
            Self { dir }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn write_manifest(&self, version: &str, build: &[&str]) -> PathBuf {
            let path = self.path().join("manifest.json");
            let manifest = serde_json::json!({
                "version": version,
                "build": build,
                "files": [],
                "prerendered": [],
            });
            std::fs::write(&path, manifest.to_string()).unwrap();
            path
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("precache");
            cmd.current_dir(self.path())
                .env_remove("PRECACHE_CONFIG")
                .arg("--no-local")
                .arg("--config")
                .arg(self.path().join("config.toml"));
            cmd
        }
    }

    /// Minimal HTTP origin serving fixed bodies; drops connections when offline
    struct Origin {
        url: String,
        offline: Arc<AtomicBool>,
    }

    impl Origin {
        fn start(routes: &'static [(&'static str, &'static str)]) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let offline = Arc::new(AtomicBool::new(false));

            let flag = offline.clone();
            thread::spawn(move || {
                for stream in listener.incoming().flatten() {
                    if flag.load(Ordering::SeqCst) {
                        drop(stream);
                        continue;
                    }
                    serve(stream, routes);
                }
            });

            Self { url, offline }
        }

        fn go_offline(&self) {
            self.offline.store(true, Ordering::SeqCst);
        }
    }

    fn serve(mut stream: TcpStream, routes: &[(&str, &str)]) {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).is_err() {
            return;
        }
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) if line == "\r\n" => break,
                Ok(_) => {}
            }
        }

        let path = request_line.split_whitespace().nth(1).unwrap_or("/");
        let (status, body) = match routes.iter().find(|(p, _)| *p == path) {
            Some((_, body)) => ("200 OK", *body),
            None => ("404 Not Found", "not found"),
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes());
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("precache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("offline asset cache"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("precache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("precache"));
    }

    #[test]
    fn config_path_honors_flag() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("timeout_secs = 5"));
    }

    #[test]
    fn config_set_round_trips() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "set", "agent.skip_waiting", "true"])
            .assert()
            .success();

        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("skip_waiting = true"));
    }

    #[test]
    fn config_set_unknown_key() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "set", "agent.nope", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown configuration key"));
    }

    #[test]
    fn status_without_manifest() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Build manifest not found"))
            .stdout(predicate::str::contains("No worker installed"));
    }

    #[test]
    fn install_without_manifest_fails_with_hint() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Build manifest not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn activate_before_install_fails() {
        let sandbox = Sandbox::new();
        sandbox.write_manifest("x", &["/a.js"]);
        sandbox
            .cmd()
            .args(["activate", "--manifest", "manifest.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No worker installed"));
    }

    #[test]
    fn cache_list_empty() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache partitions found"));
    }

    #[test]
    fn install_activate_and_serve_offline() {
        static ROUTES: &[(&str, &str)] = &[("/a.js", "console.log(1)"), ("/b.css", "body{}")];
        let origin = Origin::start(ROUTES);
        let sandbox = Sandbox::new();
        sandbox.write_manifest("x", &["/a.js", "/b.css"]);

        sandbox
            .cmd()
            .args(["install", "--manifest", "manifest.json", "--origin", &origin.url])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cached 2 assets into cache-x"));

        sandbox
            .cmd()
            .args(["activate", "--manifest", "manifest.json", "--origin", &origin.url])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache-x is active"));

        sandbox
            .cmd()
            .args(["cache", "list", "--format", "plain", "--manifest", "manifest.json"])
            .assert()
            .success()
            .stdout("cache-x\n");

        origin.go_offline();

        sandbox
            .cmd()
            .args(["fetch", "/a.js", "--manifest", "manifest.json", "--origin", &origin.url])
            .assert()
            .success()
            .stdout("console.log(1)")
            .stderr(predicate::str::contains("[cache]"))
            .stderr(predicate::str::contains("14 B, text/plain"));

        sandbox
            .cmd()
            .args(["fetch", "/missing", "--manifest", "manifest.json", "--origin", &origin.url])
            .assert()
            .failure()
            .stderr(predicate::str::contains("is not cached"));
    }

    #[test]
    fn fetch_rejects_malformed_header() {
        let sandbox = Sandbox::new();
        sandbox.write_manifest("x", &["/a.js"]);
        sandbox
            .cmd()
            .args(["fetch", "/a.js", "-H", "no-separator"])
            .args(["--manifest", "manifest.json", "--origin", "http://127.0.0.1:9"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid header"));
    }

    #[test]
    fn install_with_missing_asset_fails() {
        static ROUTES: &[(&str, &str)] = &[("/a.js", "a")];
        let origin = Origin::start(ROUTES);
        let sandbox = Sandbox::new();
        sandbox.write_manifest("x", &["/a.js", "/gone.js"]);

        sandbox
            .cmd()
            .args(["install", "--manifest", "manifest.json", "--origin", &origin.url])
            .assert()
            .failure()
            .stderr(predicate::str::contains("/gone.js"));

        sandbox
            .cmd()
            .args(["status", "--manifest", "manifest.json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Last install of x failed"));
    }
}

mod lifecycle_tests {
    use async_trait::async_trait;
    use precache::agent::{CacheAgent, FetchOutcome, ResponseSource};
    use precache::error::{PrecacheError, PrecacheResult};
    use precache::http::{Method, Request, Response};
    use precache::manifest::{AssetList, Deployment};
    use precache::network::Network;
    use precache::storage::{Caches, MemoryStorage};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use url::Url;

    const ORIGIN: &str = "https://app.example.com";

    /// Network with fixed replies that counts every call
    #[derive(Default)]
    struct FixedNetwork {
        replies: Mutex<HashMap<String, (u16, String)>>,
        calls: AtomicUsize,
    }

    impl FixedNetwork {
        fn reply(&self, path: &str, status: u16, body: &str) {
            self.replies
                .lock()
                .unwrap()
                .insert(path.to_string(), (status, body.to_string()));
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Network for FixedNetwork {
        async fn fetch(&self, request: &Request) -> PrecacheResult<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.replies.lock().unwrap().get(request.url.path()) {
                Some((status, body)) => Ok(Response::new(*status, body.clone())),
                None => Err(PrecacheError::network(request.url.as_str(), "unreachable")),
            }
        }
    }

    fn get(path: &str) -> Request {
        Request::resolve(Method::Get, path, &Url::parse(ORIGIN).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn end_to_end_deployment() {
        let caches = Caches::new(Arc::new(MemoryStorage::new()));
        let network = Arc::new(FixedNetwork::default());
        network.reply("/a.js", 200, "a");
        network.reply("/b.css", 200, "b");

        let assets: AssetList = ["/a.js", "/b.css"].into_iter().collect();
        let agent = CacheAgent::new(
            Arc::new(Deployment::new("x", assets)),
            Url::parse(ORIGIN).unwrap(),
            caches.clone(),
            network.clone(),
        );

        let installed = agent.install().await.unwrap();
        assert_eq!(installed.cache_name, "cache-x");
        assert_eq!(installed.assets_cached, 2);

        let partition = caches.open("cache-x").await.unwrap();
        assert!(partition.match_request(&get("/a.js")).await.unwrap().is_some());
        assert!(partition.match_request(&get("/b.css")).await.unwrap().is_some());

        caches.open("cache-old").await.unwrap();
        let activated = agent.activate().await.unwrap();
        assert_eq!(activated.evicted, vec!["cache-old"]);
        assert_eq!(caches.keys().await.unwrap(), vec!["cache-x"]);

        let before = network.calls();
        match agent.fetch(get("/a.js")).await.unwrap() {
            FetchOutcome::Respond { response, source } => {
                assert_eq!(source, ResponseSource::Cache);
                assert_eq!(response.into_body(), b"a");
            }
            FetchOutcome::Passthrough => panic!("asset was not intercepted"),
        }
        assert_eq!(network.calls(), before);

        network.reply("/data.json", 200, "{}");
        match agent.fetch(get("/data.json")).await.unwrap() {
            FetchOutcome::Respond { response, source } => {
                assert_eq!(source, ResponseSource::Network);
                assert_eq!(response.status, 200);
            }
            FetchOutcome::Passthrough => panic!("GET was not intercepted"),
        }
        let stored = partition
            .match_request(&get("/data.json"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.into_body(), b"{}");
    }

    #[tokio::test]
    async fn distinct_versions_get_distinct_partitions() {
        let a = Deployment::new("build-1", AssetList::default());
        let b = Deployment::new("build-2", AssetList::default());
        assert_ne!(a.cache_name, b.cache_name);
    }
}
