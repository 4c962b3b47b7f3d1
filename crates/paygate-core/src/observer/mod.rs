//! Passive lock/deadlock observer (§4.5).
//!
//! The observer never owns the per-payment lock itself (see
//! `crate::payment::lock`); it only records request/acquire/release events
//! the state manager emits, builds a wait-for graph from a point-in-time
//! snapshot, and reports or resolves cycles it finds. Snapshot-based scans
//! are a deliberate departure from the teacher's coarse-locked list
//! traversal — see `DESIGN.md`'s Open Question #3.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::metrics::MetricsSink;
use crate::retry::engine::CancellationToken;

/// A transient per-{holder, resource} record (§3 `LockInfo`).
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub holder: String,
    pub resource: String,
    pub requested_at: Instant,
    pub held: bool,
}

/// An immutable record of a detected cycle (§3 `DeadlockChain`).
#[derive(Debug, Clone)]
pub struct DeadlockChain {
    pub holders: Vec<String>,
    pub resources: Vec<String>,
    pub detected_at: Instant,
}

struct HolderState {
    held: HashSet<String>,
    pending: HashSet<String>,
    first_seen: Instant,
}

/// Advisory deadlock observer (§4.5). Optionally resolves a detected cycle
/// by simulating release of the oldest holder's resources; otherwise
/// purely advisory.
pub struct DeadlockObserver {
    holders: DashMap<String, HolderState>,
    pending_requests: DashMap<(String, String), Instant>,
    history: std::sync::Mutex<VecDeque<DeadlockChain>>,
    history_cap: usize,
    auto_resolve: bool,
    max_lock_wait: Duration,
}

impl DeadlockObserver {
    pub fn new(history_cap: usize, auto_resolve: bool, max_lock_wait: Duration) -> Self {
        Self {
            holders: DashMap::new(),
            pending_requests: DashMap::new(),
            history: std::sync::Mutex::new(VecDeque::new()),
            history_cap,
            auto_resolve,
            max_lock_wait,
        }
    }

    /// Record that `holder` is now waiting on `resource` (§4.2 step 1). If
    /// this closes a cycle, the chain is recorded and, if `auto_resolve` is
    /// set, resolved immediately.
    pub fn on_request(&self, holder: &str, resource: &str) -> Option<DeadlockChain> {
        {
            let mut state = self.holders.entry(holder.to_string()).or_insert_with(|| HolderState {
                held: HashSet::new(),
                pending: HashSet::new(),
                first_seen: Instant::now(),
            });
            state.pending.insert(resource.to_string());
        }
        self.pending_requests
            .insert((holder.to_string(), resource.to_string()), Instant::now());

        let chain = self.detect_cycle_from(holder);
        if let Some(chain) = &chain {
            self.record_chain(chain.clone());
            if self.auto_resolve {
                self.resolve(chain);
            }
        }
        chain
    }

    /// Record that `holder` acquired `resource` it had been waiting on.
    pub fn on_acquired(&self, holder: &str, resource: &str) {
        if let Some(mut state) = self.holders.get_mut(holder) {
            state.pending.remove(resource);
            state.held.insert(resource.to_string());
        }
        self.pending_requests.remove(&(holder.to_string(), resource.to_string()));
    }

    /// Record that `holder` released `resource`, whether held or merely
    /// pending (used by [`Self::resolve`]'s simulated release). Once a
    /// holder has neither held nor pending resources left, its entry is
    /// dropped from `holders` rather than left behind empty — otherwise a
    /// fresh per-request holder id (e.g. `PaymentManager`'s `txn:{uuid}`)
    /// leaks one permanent entry per transition.
    pub fn on_released(&self, holder: &str, resource: &str) {
        let mut now_idle = false;
        if let Some(mut state) = self.holders.get_mut(holder) {
            state.held.remove(resource);
            state.pending.remove(resource);
            now_idle = state.held.is_empty() && state.pending.is_empty();
        }
        if now_idle {
            self.holders.remove(holder);
        }
        self.pending_requests.remove(&(holder.to_string(), resource.to_string()));
    }

    /// Snapshot of holder → awaited-resources and resource → holders, taken
    /// up front so a concurrent request/acquire/release can't corrupt the
    /// walk (this is the snapshot-based design decision in `DESIGN.md`).
    fn snapshot(&self) -> (HashMap<String, HashSet<String>>, HashMap<String, HashSet<String>>) {
        let mut awaits: HashMap<String, HashSet<String>> = HashMap::new();
        let mut held_by: HashMap<String, HashSet<String>> = HashMap::new();
        for entry in self.holders.iter() {
            awaits.insert(entry.key().clone(), entry.pending.clone());
            for resource in &entry.held {
                held_by.entry(resource.clone()).or_default().insert(entry.key().clone());
            }
        }
        (awaits, held_by)
    }

    fn detect_cycle_from(&self, origin: &str) -> Option<DeadlockChain> {
        let (awaits, held_by) = self.snapshot();
        let graph = build_graph(&awaits, &held_by);
        let start = format!("H:{origin}");
        let mut visited = HashSet::new();
        visited.insert(start.clone());
        let mut path = vec![];
        if dfs(&graph, &start, &start, &mut visited, &mut path) {
            let holders = path
                .iter()
                .filter_map(|n| n.strip_prefix("H:"))
                .map(String::from)
                .collect();
            let resources = path
                .iter()
                .filter_map(|n| n.strip_prefix("R:"))
                .map(String::from)
                .collect();
            Some(DeadlockChain {
                holders,
                resources,
                detected_at: Instant::now(),
            })
        } else {
            None
        }
    }

    fn record_chain(&self, chain: DeadlockChain) {
        let mut history = self.history.lock().unwrap();
        history.push_back(chain);
        while history.len() > self.history_cap {
            history.pop_front();
        }
    }

    /// Re-run cycle detection from every holder currently waiting on
    /// something. Intended for the periodic sweep (§4.5, default 30s)
    /// rather than per-event detection alone.
    pub fn sweep_cycles(&self) -> Vec<DeadlockChain> {
        let waiting: Vec<String> = self
            .holders
            .iter()
            .filter(|h| !h.pending.is_empty())
            .map(|h| h.key().clone())
            .collect();

        let mut found = Vec::new();
        for holder in waiting {
            if let Some(chain) = self.detect_cycle_from(&holder) {
                self.record_chain(chain.clone());
                found.push(chain);
            }
        }
        found
    }

    /// Flag pending requests older than `max_lock_wait` (§4.5 "long-wait
    /// surveillance").
    pub fn sweep_long_waits(&self) -> Vec<(String, String, Duration)> {
        let now = Instant::now();
        self.pending_requests
            .iter()
            .filter_map(|entry| {
                let (holder, resource) = entry.key().clone();
                let waited = now.duration_since(*entry.value());
                (waited > self.max_lock_wait).then_some((holder, resource, waited))
            })
            .collect()
    }

    /// Resolve a detected cycle by picking the oldest holder in it as
    /// victim and simulating release of every resource that holder holds.
    /// Advisory-only (returns `None` immediately) when `auto_resolve` is
    /// `false`.
    pub fn resolve(&self, chain: &DeadlockChain) -> Option<String> {
        if !self.auto_resolve {
            return None;
        }
        let victim = chain
            .holders
            .iter()
            .min_by_key(|h| {
                self.holders
                    .get(h.as_str())
                    .map(|s| s.first_seen)
                    .unwrap_or_else(Instant::now)
            })
            .cloned()?;

        let held_resources: Vec<String> = self
            .holders
            .get(&victim)
            .map(|s| s.held.iter().cloned().collect())
            .unwrap_or_default();
        for resource in held_resources {
            self.on_released(&victim, &resource);
        }
        tracing::warn!(holder = %victim, "deadlock victim resolved: simulated release of held resources");
        Some(victim)
    }

    pub fn history(&self) -> Vec<DeadlockChain> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    /// Spawn the periodic cycle sweep and long-wait surveillance as a single
    /// cooperative background task (§4.5 "periodic sweep (default 30s)" and
    /// "a background sweep flags any pending request older than
    /// `max_lock_wait`").
    pub fn start_sweep(
        self: Arc<Self>,
        interval: Duration,
        metrics: Arc<dyn MetricsSink>,
        cancel: CancellationToken,
    ) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let chains = self.sweep_cycles();
                        for _ in &chains {
                            metrics.record_deadlock_detected();
                        }
                        if !chains.is_empty() {
                            tracing::warn!(count = chains.len(), "sweep detected deadlock cycles");
                        }

                        let long_waits = self.sweep_long_waits();
                        for (holder, resource, waited) in &long_waits {
                            tracing::warn!(
                                holder,
                                resource,
                                waited_secs = waited.as_secs_f64(),
                                "pending lock request exceeded max_lock_wait"
                            );
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }
}

fn build_graph(
    awaits: &HashMap<String, HashSet<String>>,
    held_by: &HashMap<String, HashSet<String>>,
) -> HashMap<String, HashSet<String>> {
    let mut graph: HashMap<String, HashSet<String>> = HashMap::new();
    for (holder, resources) in awaits {
        let h_node = format!("H:{holder}");
        for resource in resources {
            graph.entry(h_node.clone()).or_default().insert(format!("R:{resource}"));
        }
    }
    for (resource, holders) in held_by {
        let r_node = format!("R:{resource}");
        for holder in holders {
            graph.entry(r_node.clone()).or_default().insert(format!("H:{holder}"));
        }
    }
    graph
}

fn dfs(
    graph: &HashMap<String, HashSet<String>>,
    node: &str,
    start: &str,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    path.push(node.to_string());
    if let Some(next_nodes) = graph.get(node) {
        for next in next_nodes {
            if next == start && path.len() > 1 {
                path.push(next.clone());
                return true;
            }
            if !visited.contains(next) {
                visited.insert(next.clone());
                if dfs(graph, next, start, visited, path) {
                    return true;
                }
            }
        }
    }
    path.pop();
    false
}
