//! Origin access control for the API server.

use std::collections::HashSet;
use std::net::IpAddr;

/// Allow-list of caller origins, built once from config.
pub struct AccessList {
    allow_all: bool,
    hosts: HashSet<String>,
}

impl AccessList {
    pub fn new(allowed_hosts: &[String]) -> Self {
        let allow_all = allowed_hosts.iter().any(|h| h == "*");
        Self {
            allow_all,
            hosts: allowed_hosts.iter().cloned().collect(),
        }
    }

    /// Is this caller origin allowed to use the API at all?
    pub fn is_allowed(&self, origin: IpAddr) -> bool {
        if self.allow_all {
            return true;
        }
        if self.hosts.contains(&origin.to_string()) {
            return true;
        }
        // "localhost" in the list admits any loopback origin.
        origin.is_loopback() && self.hosts.contains("localhost")
    }
}
