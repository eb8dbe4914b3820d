//! DNSCrypt relay set bookkeeping

use dnsgate_tun::split_list;

use crate::prober::ProberTask;

/// Snapshot of the relay set reported in [`crate::SessionStatus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStatus {
    pub servers: Vec<String>,
    pub routes: Vec<String>,
    pub pending_removal: Vec<String>,
    pub live: Vec<String>,
    pub prober_running: bool,
}

/// Relay set of a session whose DNS family is DNSCrypt
///
/// Dropping the set stops its prober.
#[derive(Default)]
pub(crate) struct RelaySet {
    pub servers: Vec<String>,
    pub routes: Vec<String>,
    /// Server ids queued for removal at the last update
    pub pending_removal: Vec<String>,
    pub live: Vec<String>,
    prober: Option<ProberTask>,
}

impl RelaySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the lists last handed to the engine
    pub fn configure(&mut self, servers: &str, routes: &str, pending_removal: &str) {
        self.servers = split_list(servers);
        self.routes = split_list(routes);
        self.pending_removal = split_list(pending_removal);
    }

    pub fn prober_running(&self) -> bool {
        self.prober.as_ref().is_some_and(ProberTask::is_running)
    }

    /// Replace the prober task, stopping a previous one
    pub fn attach_prober(&mut self, task: ProberTask) {
        self.prober = Some(task);
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            servers: self.servers.clone(),
            routes: self.routes.clone(),
            pending_removal: self.pending_removal.clone(),
            live: self.live.clone(),
            prober_running: self.prober_running(),
        }
    }
}

/// Live servers that are listed in the pending-removal index
///
/// Both arguments and the result are comma-separated lists.
pub fn prepare_servers_to_remove(live: &str, pending: &str) -> String {
    let pending = split_list(pending);
    if pending.is_empty() {
        return String::new();
    }

    split_list(live)
        .into_iter()
        .filter(|server| pending.contains(server))
        .collect::<Vec<_>>()
        .join(",")
}
