//! Shared test fixtures
//!
//! An in-process jump host that resolves destination names from a table and
//! connects to local test servers, plus an event recorder.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use jump_tunnel::tunnel::{BoxedStream, JumpDialer, JumpSession};
use jump_tunnel::{Credential, Endpoint, EventSink, Result, TunnelError, TunnelEvent};

/// Jump host that accepts one user and reaches destinations from a table
#[derive(Clone)]
pub struct SimulatedJumpHost {
    user: String,
    routes: Arc<HashMap<String, SocketAddr>>,
    dials: Arc<Mutex<Vec<Endpoint>>>,
    opens: Arc<Mutex<Vec<(String, SocketAddr)>>>,
}

impl SimulatedJumpHost {
    pub fn new(user: &str, routes: &[(&str, SocketAddr)]) -> Self {
        Self {
            user: user.to_string(),
            routes: Arc::new(routes.iter().map(|(name, addr)| (name.to_string(), *addr)).collect()),
            dials: Arc::new(Mutex::new(Vec::new())),
            opens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Jump endpoints dialed so far
    pub fn dials(&self) -> Vec<Endpoint> {
        self.dials.lock().unwrap().clone()
    }

    /// (destination, originator) pairs of every channel opened so far
    pub fn opens(&self) -> Vec<(String, SocketAddr)> {
        self.opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl JumpDialer for SimulatedJumpHost {
    async fn dial(&self, jump: &Endpoint, _credential: &Credential) -> Result<Box<dyn JumpSession>> {
        self.dials.lock().unwrap().push(jump.clone());
        if jump.user() != self.user {
            return Err(TunnelError::Authentication {
                user: jump.user().to_string(),
                addr: jump.to_string(),
            });
        }

        Ok(Box::new(SimulatedSession {
            routes: Arc::clone(&self.routes),
            opens: Arc::clone(&self.opens),
        }))
    }
}

struct SimulatedSession {
    routes: Arc<HashMap<String, SocketAddr>>,
    opens: Arc<Mutex<Vec<(String, SocketAddr)>>>,
}

#[async_trait]
impl JumpSession for SimulatedSession {
    async fn open_direct(&mut self, remote: &Endpoint, originator: SocketAddr) -> Result<BoxedStream> {
        let name = remote.to_string();
        self.opens.lock().unwrap().push((name.clone(), originator));

        let addr = self.routes.get(&name).ok_or_else(|| TunnelError::RemoteDial {
            addr: name.clone(),
            reason: "no route to host".to_string(),
        })?;
        let stream = TcpStream::connect(addr).await.map_err(|e| TunnelError::RemoteDial {
            addr: name,
            reason: e.to_string(),
        })?;
        Ok(Box::new(stream))
    }

    async fn close(&mut self) {}
}

/// Event sink that keeps every event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TunnelEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<TunnelEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Poll until an event matches `pred`, for at most two seconds
    pub async fn wait_for(&self, pred: impl Fn(&TunnelEvent) -> bool) -> TunnelEvent {
        for _ in 0..200 {
            if let Some(event) = self.events().into_iter().find(|e| pred(e)) {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("event not seen; got {:?}", self.events());
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TunnelEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Server that answers each connection with `reply:` plus everything it read
pub async fn reply_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                if stream.read_to_end(&mut request).await.is_ok() {
                    let mut response = b"reply:".to_vec();
                    response.extend_from_slice(&request);
                    let _ = stream.write_all(&response).await;
                }
            });
        }
    });
    addr
}

/// Server that echoes bytes back as they arrive
pub async fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Address nothing listens on
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Whether the peer closed or reset the connection without sending anything
pub async fn closed_without_data(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 16];
    match tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        _ => false,
    }
}
