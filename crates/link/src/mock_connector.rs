//! Mock 连接器
//!
//! 用于单元测试：每次连接创建一对内存双工流，测试端拿到另一端扮演硬件。
//! 支持注入拒绝连接和连接超时场景。

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use contracts::LinkAddress;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::instrument;

use crate::connector::{Connector, LinkStream};
use crate::error::{LinkError, Result};

const MOCK_BUFFER_SIZE: usize = 4096;

/// 硬件端：链路建立后交给测试
#[derive(Debug)]
pub struct MockPeer {
    pub address: LinkAddress,
    pub stream: DuplexStream,
}

/// 接收新建立的硬件端
pub struct MockPeers {
    rx: mpsc::UnboundedReceiver<MockPeer>,
    pending: VecDeque<MockPeer>,
}

impl MockPeers {
    /// 下一个建立的连接 (任意地址)
    pub async fn accept(&mut self) -> Option<MockPeer> {
        if let Some(peer) = self.pending.pop_front() {
            return Some(peer);
        }
        self.rx.recv().await
    }

    /// 下一个到指定地址的连接；其他地址的连接暂存
    pub async fn accept_for(&mut self, address: &LinkAddress) -> Option<MockPeer> {
        if let Some(idx) = self.pending.iter().position(|p| &p.address == address) {
            return self.pending.remove(idx);
        }
        loop {
            let peer = self.rx.recv().await?;
            if &peer.address == address {
                return Some(peer);
            }
            self.pending.push_back(peer);
        }
    }
}

#[derive(Default)]
struct MockState {
    /// 剩余拒绝次数
    refuse: HashMap<LinkAddress, u32>,
    /// 连接挂起直到超时
    stall: HashMap<LinkAddress, u32>,
    /// 每个地址的连接尝试时间
    attempts: HashMap<LinkAddress, Vec<Instant>>,
}

/// Mock 连接器
pub struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    state: Mutex<MockState>,
}

impl MockConnector {
    /// 创建 mock 连接器及其硬件端接收器
    pub fn new() -> (Self, MockPeers) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers: tx,
            state: Mutex::new(MockState::default()),
        };
        let peers = MockPeers {
            rx,
            pending: VecDeque::new(),
        };
        (connector, peers)
    }

    /// 接下来 `times` 次连接 `address` 被拒绝
    pub fn refuse(&self, address: &LinkAddress, times: u32) {
        self.lock().refuse.insert(address.clone(), times);
    }

    /// 接下来 `times` 次连接 `address` 挂起直到超时
    pub fn stall(&self, address: &LinkAddress, times: u32) {
        self.lock().stall.insert(address.clone(), times);
    }

    /// 到 `address` 的连接尝试时间
    pub fn attempts(&self, address: &LinkAddress) -> Vec<Instant> {
        self.lock()
            .attempts
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_injection(map: &mut HashMap<LinkAddress, u32>, address: &LinkAddress) -> bool {
        match map.get_mut(address) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl Connector for MockConnector {
    #[instrument(name = "mock_link_connect", skip(self), fields(address = %address))]
    async fn connect(&self, address: &LinkAddress, timeout: Duration) -> Result<LinkStream> {
        let (refused, stalled) = {
            let mut state = self.lock();
            state
                .attempts
                .entry(address.clone())
                .or_default()
                .push(Instant::now());
            let refused = Self::take_injection(&mut state.refuse, address);
            let stalled = !refused && Self::take_injection(&mut state.stall, address);
            (refused, stalled)
        };

        if refused {
            return Err(LinkError::refused(address, "mock refusal"));
        }
        if stalled {
            tokio::time::sleep(timeout).await;
            return Err(LinkError::ConnectTimeout {
                address: address.clone(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        let (local, remote) = tokio::io::duplex(MOCK_BUFFER_SIZE);
        self.peers
            .send(MockPeer {
                address: address.clone(),
                stream: remote,
            })
            .map_err(|_| LinkError::refused(address, "mock peer receiver dropped"))?;
        Ok(Box::new(local) as LinkStream)
    }
}
