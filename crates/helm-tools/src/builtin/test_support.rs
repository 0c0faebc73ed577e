// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Shared test doubles for builtin-tool unit tests. Not compiled outside
//! `#[cfg(test)]`.
#![cfg(test)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use helm_term::{
    ControlKey, ExecuteOutcome, LocalProcessStatus, RemoteProcesses, TerminalDriver, TerminalKind,
};
use tokio::sync::broadcast;

struct NullDriver {
    tx: broadcast::Sender<Bytes>,
}

#[async_trait]
impl TerminalDriver for NullDriver {
    fn kind(&self) -> TerminalKind {
        TerminalKind::Local
    }
    async fn write(&self, _data: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn resize(&self, _cols: u16, _rows: u16) -> anyhow::Result<()> {
        Ok(())
    }
    fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }
    async fn execute_in_terminal(&self, _command: &str, _timeout: Duration) -> ExecuteOutcome {
        ExecuteOutcome { output: String::new(), duration: Duration::ZERO, timed_out: false }
    }
    async fn get_cwd(&self) -> Option<String> {
        None
    }
    async fn get_terminal_status(&self) -> LocalProcessStatus {
        LocalProcessStatus::default()
    }
    async fn get_remote_processes(&self) -> Option<RemoteProcesses> {
        None
    }
    async fn send_control(&self, _key: ControlKey) -> anyhow::Result<()> {
        Ok(())
    }
    async fn dispose(&self) {}
}

pub fn null_driver() -> Arc<dyn TerminalDriver> {
    let (tx, _rx) = broadcast::channel(1);
    Arc::new(NullDriver { tx })
}
