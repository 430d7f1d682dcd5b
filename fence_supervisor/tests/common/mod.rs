#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use regex::Regex;
use reqwest::StatusCode;
use serde_json::{json, Value};

use fence_core::{FenceError, Result};
use fence_supervisor::kube::classify_status;
use fence_supervisor::session::take_match;
use fence_supervisor::{ClusterApi, Node, Session, SessionMatch};

pub const PROMPT: &str = "nC-RBTP:>";

/// In-memory cluster API with call counters.
pub struct FakeCluster {
    pub ready: Cell<bool>,
    pub nnf_node: RefCell<Value>,
    pub node_error: Cell<Option<u16>>,
    pub nnf_error: Cell<Option<u16>>,
    pub node_reads: Cell<usize>,
    pub nnf_reads: Cell<usize>,
    pub writes: Cell<usize>,
}

impl FakeCluster {
    pub fn new(ready: bool, fenced: bool) -> Self {
        Self {
            ready: Cell::new(ready),
            nnf_node: RefCell::new(json!({
                "metadata": { "name": "nnf-nlc", "namespace": "rabbit-0", "resourceVersion": "7" },
                "status": { "fenced": fenced }
            })),
            node_error: Cell::new(None),
            nnf_error: Cell::new(None),
            node_reads: Cell::new(0),
            nnf_reads: Cell::new(0),
            writes: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.node_reads.get() + self.nnf_reads.get() + self.writes.get()
    }

    pub fn fenced(&self) -> bool {
        let node = self.nnf_node.borrow();
        node["status"]["fenced"] == json!(true)
    }
}

fn http_error(code: u16, kind: &'static str, name: &str) -> FenceError {
    let status = StatusCode::from_u16(code).unwrap();
    classify_status(status, kind, name).unwrap()
}

impl ClusterApi for FakeCluster {
    fn read_node(&self, name: &str) -> Result<Node> {
        self.node_reads.set(self.node_reads.get() + 1);
        if let Some(code) = self.node_error.get() {
            return Err(http_error(code, "node", name));
        }
        Ok(Node::with_ready(self.ready.get()))
    }

    fn get_nnf_node(&self, namespace: &str, _version: &str) -> Result<Value> {
        self.nnf_reads.set(self.nnf_reads.get() + 1);
        if let Some(code) = self.nnf_error.get() {
            return Err(http_error(code, "NNF node", namespace));
        }
        Ok(self.nnf_node.borrow().clone())
    }

    fn patch_nnf_node_status(&self, _namespace: &str, _version: &str, nnf_node: &Value) -> Result<()> {
        self.writes.set(self.writes.get() + 1);
        let mut node = self.nnf_node.borrow_mut();
        node["status"] = nnf_node["status"].clone();
        Ok(())
    }
}

/// Stand-in for the firmware shell. Each sent line is answered from a
/// queue of canned replies, or by the current power state for status and
/// power commands.
pub struct ScriptedShell {
    pub power_on: bool,
    /// When false, power commands are accepted but do nothing.
    pub obey_power: bool,
    pub status_reply: Option<String>,
    pub sent: Vec<String>,
    pending: String,
    replies: VecDeque<String>,
}

impl ScriptedShell {
    pub fn new(power_on: bool) -> Self {
        Self {
            power_on,
            obey_power: true,
            status_reply: None,
            sent: Vec::new(),
            pending: String::new(),
            replies: VecDeque::new(),
        }
    }

    /// Answer status queries with this exact line instead of the power state.
    pub fn with_status_line(mut self, line: &str) -> Self {
        self.status_reply = Some(line.to_string());
        self
    }

    pub fn push_reply(&mut self, reply: &str) {
        self.replies.push_back(reply.to_string());
    }

    pub fn power_commands(&self) -> usize {
        self.sent.iter().filter(|l| !l.contains("status")).count()
    }
}

impl Session for ScriptedShell {
    fn send_line(&mut self, line: &str) -> Result<()> {
        self.sent.push(line.to_string());
        if let Some(reply) = self.replies.pop_front() {
            self.pending.push_str(&reply);
            return Ok(());
        }
        if line.contains("status") {
            let status = match &self.status_reply {
                Some(s) => s.clone(),
                None if self.power_on => "node 0      [ON, redundant]".to_string(),
                None => "node 0      [Off]".to_string(),
            };
            self.pending.push_str(&format!("{line}\r\n{status}\r\n{PROMPT}"));
        } else {
            if self.obey_power {
                if line.ends_with(" on") {
                    self.power_on = true;
                } else if line.ends_with(" forceoff") {
                    self.power_on = false;
                }
            }
            self.pending.push_str(&format!("{line}\r\nOK\r\n{PROMPT}"));
        }
        Ok(())
    }

    fn expect(&mut self, pattern: &Regex, timeout: Duration) -> Result<SessionMatch> {
        take_match(&mut self.pending, pattern)
            .ok_or_else(|| FenceError::timeout(pattern.as_str(), timeout))
    }
}
