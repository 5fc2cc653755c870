//! Network transport and archive unpacking

use crate::error::{BasinError, BasinResult};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Downloads one URL to a local file
#[async_trait]
pub trait Transport: Send + Sync {
    /// Download `url` into `dest`
    ///
    /// A 404 must map to [`BasinError::RemoteNotFound`], other failures to
    /// [`BasinError::Http`] with `transient` set when a retry may help.
    async fn download(&self, url: &str, dest: &Path) -> BasinResult<u64>;
}

/// Blocking HTTP client run on the blocking thread pool
#[derive(Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
        }
    }
}

fn map_http_error(url: &str, err: ureq::Error) -> BasinError {
    match err {
        ureq::Error::StatusCode(404) => BasinError::RemoteNotFound {
            url: url.to_string(),
        },
        ureq::Error::StatusCode(code) => BasinError::Http {
            url: url.to_string(),
            reason: format!("status {}", code),
            transient: code == 429 || code >= 500,
        },
        other => BasinError::Http {
            url: url.to_string(),
            reason: other.to_string(),
            transient: true,
        },
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn download(&self, url: &str, dest: &Path) -> BasinResult<u64> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || -> BasinResult<u64> {
            debug!("GET {}", url);
            let mut response = agent.get(&url).call().map_err(|e| map_http_error(&url, e))?;

            let mut file = std::fs::File::create(&dest)
                .map_err(|e| BasinError::io(format!("creating {}", dest.display()), e))?;
            let mut reader = response.body_mut().as_reader();
            std::io::copy(&mut reader, &mut file).map_err(|e| BasinError::Http {
                url: url.clone(),
                reason: e.to_string(),
                transient: true,
            })
        })
        .await
        .map_err(|e| BasinError::Internal(format!("download task panicked: {}", e)))?
    }
}

/// Extracts an archive into a directory
#[async_trait]
pub trait Unpacker: Send + Sync {
    async fn unpack(&self, archive: &Path, dest: &Path) -> BasinResult<()>;
}

/// Uses the `unzip` program
#[derive(Debug, Clone, Copy, Default)]
pub struct UnzipCli;

#[async_trait]
impl Unpacker for UnzipCli {
    async fn unpack(&self, archive: &Path, dest: &Path) -> BasinResult<()> {
        let (archive_arg, dest_arg) = (
            archive.to_string_lossy().into_owned(),
            dest.to_string_lossy().into_owned(),
        );
        crate::ops::run_program("unzip", ["-o", "-q", archive_arg.as_str(), "-d", dest_arg.as_str()])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Serves canned bodies and records every request
    #[derive(Default)]
    pub struct FakeTransport {
        pub bodies: Mutex<HashMap<String, Vec<u8>>>,
        pub not_found: Mutex<HashSet<String>>,
        /// url -> remaining transient failures before success
        pub flaky: Mutex<HashMap<String, u32>>,
        pub requests: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        pub fn serve(&self, url: &str, body: &[u8]) {
            self.bodies.lock().unwrap().insert(url.to_string(), body.to_vec());
        }

        pub fn missing(&self, url: &str) {
            self.not_found.lock().unwrap().insert(url.to_string());
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn requests_matching(&self, needle: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|u| u.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn download(&self, url: &str, dest: &Path) -> BasinResult<u64> {
            self.requests.lock().unwrap().push(url.to_string());

            if let Some(remaining) = self.flaky.lock().unwrap().get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(BasinError::Http {
                        url: url.to_string(),
                        reason: "status 503".to_string(),
                        transient: true,
                    });
                }
            }
            if self.not_found.lock().unwrap().contains(url) {
                return Err(BasinError::RemoteNotFound {
                    url: url.to_string(),
                });
            }
            let body = self.bodies.lock().unwrap().get(url).cloned();
            match body {
                Some(body) => {
                    std::fs::write(dest, &body).unwrap();
                    Ok(body.len() as u64)
                }
                None => Err(BasinError::Http {
                    url: url.to_string(),
                    reason: "status 403".to_string(),
                    transient: false,
                }),
            }
        }
    }

    /// "Unpacks" an archive whose body lists relative paths, one per line
    #[derive(Default)]
    pub struct FakeUnpacker;

    #[async_trait]
    impl Unpacker for FakeUnpacker {
        async fn unpack(&self, archive: &Path, dest: &Path) -> BasinResult<()> {
            let listing = std::fs::read_to_string(archive).unwrap();
            for rel in listing.lines().filter(|l| !l.trim().is_empty()) {
                let path: PathBuf = dest.join(rel.trim());
                if rel.ends_with('/') {
                    std::fs::create_dir_all(&path).unwrap();
                } else {
                    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                    std::fs::write(&path, b"data").unwrap();
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_permanent() {
        let err = map_http_error("https://example.test/a.zip", ureq::Error::StatusCode(404));
        assert!(matches!(err, BasinError::RemoteNotFound { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(map_http_error("u", ureq::Error::StatusCode(503)).is_retryable());
        assert!(map_http_error("u", ureq::Error::StatusCode(429)).is_retryable());
        assert!(!map_http_error("u", ureq::Error::StatusCode(403)).is_retryable());
    }
}
