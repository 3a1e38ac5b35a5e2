//! Package admission listener
//!
//! JSON lines over TCP. Each request `{"id": "...", "chute": N}` gets one
//! reply line: the admission result or an error.

use std::sync::Arc;

use contracts::{Admission, ChuteId, Package};
use link::Connector;
use serde::{Deserialize, Serialize};
use sort_engine::SortingEngine;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::error::CliError;

/// Anything that can admit packages
pub trait Admit: Send + Sync + 'static {
    fn admit(&self, package: Package) -> Admission;
}

impl<C: Connector> Admit for SortingEngine<C> {
    fn admit(&self, package: Package) -> Admission {
        self.enqueue(package)
    }
}

#[derive(Debug, Deserialize)]
struct AdmissionRequest {
    id: String,
    chute: ChuteId,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
enum AdmissionReply {
    Tracked {
        id: String,
        seeded_count: u32,
    },
    Rerouted {
        id: String,
        requested: ChuteId,
        error_chute: ChuteId,
    },
    Refused {
        id: String,
    },
    Error {
        message: String,
    },
}

fn parse_request(line: &str) -> Result<AdmissionRequest, CliError> {
    let request: AdmissionRequest =
        serde_json::from_str(line).map_err(|e| CliError::bad_request(e.to_string()))?;
    if request.id.trim().is_empty() {
        return Err(CliError::bad_request("empty package id"));
    }
    Ok(request)
}

fn handle_line<A: Admit>(admit: &A, line: &str) -> AdmissionReply {
    let request = match parse_request(line) {
        Ok(request) => request,
        Err(e) => {
            return AdmissionReply::Error {
                message: e.to_string(),
            }
        }
    };

    let package = Package::new(request.id.as_str(), request.chute, sort_engine::now());
    match admit.admit(package) {
        Admission::Tracked { seeded_count } => AdmissionReply::Tracked {
            id: request.id,
            seeded_count,
        },
        Admission::Rerouted {
            requested,
            error_chute,
        } => AdmissionReply::Rerouted {
            id: request.id,
            requested,
            error_chute,
        },
        Admission::Refused => AdmissionReply::Refused { id: request.id },
    }
}

/// Accept connections until the task is aborted
///
/// Client tasks belong to this future; dropping it aborts them all.
#[instrument(name = "admission_serve", skip_all, fields(addr = ?listener.local_addr().ok()))]
pub async fn serve<A: Admit>(listener: TcpListener, admit: Arc<A>) {
    info!("admission listener ready");
    let mut clients = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, clients = clients.len() + 1, "admission client connected");
                    clients.spawn(serve_client(stream, Arc::clone(&admit)));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            Some(done) = clients.join_next(), if !clients.is_empty() => {
                if let Err(e) = done {
                    warn!(error = %e, "admission client task failed");
                }
            }
        }
    }
}

async fn serve_client<A: Admit>(stream: TcpStream, admit: Arc<A>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "admission client read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = handle_line(admit.as_ref(), &line);
        let mut bytes = match serde_json::to_vec(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode admission reply");
                break;
            }
        };
        bytes.push(b'\n');
        if let Err(e) = writer.write_all(&bytes).await {
            warn!(error = %e, "admission client write failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        admitted: Mutex<Vec<Package>>,
    }

    impl Admit for Recorder {
        fn admit(&self, package: Package) -> Admission {
            let chute = package.chute;
            if chute == 0 {
                return Admission::Refused;
            }
            self.admitted.lock().unwrap().push(package);
            if chute == 7 {
                Admission::Rerouted {
                    requested: 7,
                    error_chute: 99,
                }
            } else {
                Admission::Tracked { seeded_count: 0 }
            }
        }
    }

    #[test]
    fn test_handle_line_replies() {
        let recorder = Recorder::default();

        assert_eq!(
            handle_line(&recorder, r#"{"id":"PKG-1","chute":3}"#),
            AdmissionReply::Tracked {
                id: "PKG-1".to_string(),
                seeded_count: 0
            }
        );
        assert_eq!(
            handle_line(&recorder, r#"{"id":"PKG-2","chute":7}"#),
            AdmissionReply::Rerouted {
                id: "PKG-2".to_string(),
                requested: 7,
                error_chute: 99
            }
        );
        assert_eq!(
            handle_line(&recorder, r#"{"id":"PKG-3","chute":0}"#),
            AdmissionReply::Refused {
                id: "PKG-3".to_string()
            }
        );
        assert!(matches!(
            handle_line(&recorder, r#"{"id":"","chute":3}"#),
            AdmissionReply::Error { .. }
        ));
        assert!(matches!(
            handle_line(&recorder, "not json"),
            AdmissionReply::Error { .. }
        ));
        assert_eq!(recorder.admitted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorder = Arc::new(Recorder::default());
        let server = tokio::spawn(serve(listener, Arc::clone(&recorder)));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(b"{\"id\":\"A\",\"chute\":1}\n\n{\"id\":\"B\",\"chute\":7}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(reader).lines();
        let first: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();

        assert_eq!(first["result"], "tracked");
        assert_eq!(first["id"], "A");
        assert_eq!(second["result"], "rerouted");
        assert_eq!(second["error_chute"], 99);

        server.abort();
        assert!(server.await.unwrap_err().is_cancelled());
        // the client task went down with the listener
        let eof = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap();
        assert!(matches!(eof, Ok(None) | Err(_)));
        assert_eq!(Arc::strong_count(&recorder), 1);

        let ids: Vec<String> = recorder
            .admitted
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }
}
