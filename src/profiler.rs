//! Render profiling: commit ingestion and aggregation
//!
//! A profiling session buffers the commits a runtime reports between
//! `profile-start` and `profile-stop`. Display names are snapshotted at
//! session start so components that unmount mid-session still resolve to
//! a name. Reports aggregate per-component timings and render causes
//! across the whole commit sequence.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::tree::ComponentTree;
use crate::{DevtoolsError, Result};

/// Why a component rendered in a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RenderCause {
    FirstMount,
    PropsChanged,
    StateChanged,
    HooksChanged,
    ParentRendered,
    /// In the taxonomy but never reported distinctly by the wire
    ForceUpdate,
}

/// Per-component change description attached to a commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeDescription {
    pub did_hooks_change: bool,
    pub is_first_mount: bool,
    pub props: Option<Vec<String>>,
    pub state: Option<Vec<String>>,
    pub hooks: Option<Vec<u32>>,
}

impl ChangeDescription {
    /// Ordered cause set for this description.
    ///
    /// First mount short-circuits everything else; a commit with no
    /// props/state/hooks signal falls back to `ParentRendered`.
    pub fn causes(&self) -> Vec<RenderCause> {
        if self.is_first_mount {
            return vec![RenderCause::FirstMount];
        }
        let mut causes = Vec::new();
        if self.props.as_ref().is_some_and(|p| !p.is_empty()) {
            causes.push(RenderCause::PropsChanged);
        }
        if self.state.as_ref().is_some_and(|s| !s.is_empty()) {
            causes.push(RenderCause::StateChanged);
        }
        if self.did_hooks_change {
            causes.push(RenderCause::HooksChanged);
        }
        if causes.is_empty() {
            causes.push(RenderCause::ParentRendered);
        }
        causes
    }

    fn from_json(value: &Value) -> Self {
        let string_list = |v: Option<&Value>| -> Option<Vec<String>> {
            v.and_then(Value::as_array).map(|arr| {
                arr.iter()
                    .filter_map(|e| e.as_str().map(str::to_owned))
                    .collect()
            })
        };
        Self {
            did_hooks_change: value
                .get("didHooksChange")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            is_first_mount: value
                .get("isFirstMount")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            props: string_list(value.get("props")),
            state: string_list(value.get("state")),
            hooks: value.get("hooks").and_then(Value::as_array).map(|arr| {
                arr.iter()
                    .filter_map(|e| e.as_u64().map(|v| v as u32))
                    .collect()
            }),
        }
    }
}

/// One atomic batch of renders reported by the runtime
#[derive(Debug, Clone, Default)]
pub struct Commit {
    pub timestamp: f64,
    pub duration: f64,
    pub actual_durations: HashMap<u32, f64>,
    pub self_durations: HashMap<u32, f64>,
    pub change_descriptions: HashMap<u32, ChangeDescription>,
}

impl Commit {
    /// Parse one commit entry. Duration maps accept both `[[id,dur],...]`
    /// tuple lists and `[id,dur,id,dur,...]` interleaved lists;
    /// changeDescriptions accepts a map or a list of `[id, desc]` pairs.
    fn from_json(value: &Value) -> Self {
        let mut commit = Commit {
            timestamp: value
                .get("timestamp")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            duration: value.get("duration").and_then(Value::as_f64).unwrap_or(0.0),
            ..Default::default()
        };

        commit.actual_durations = parse_duration_entries(value.get("fiberActualDurations"));
        commit.self_durations = parse_duration_entries(value.get("fiberSelfDurations"));

        match value.get("changeDescriptions") {
            Some(Value::Object(map)) => {
                for (key, desc) in map {
                    if let Ok(id) = key.parse::<u32>() {
                        commit
                            .change_descriptions
                            .insert(id, ChangeDescription::from_json(desc));
                    }
                }
            }
            Some(Value::Array(pairs)) => {
                for pair in pairs {
                    if let Some([id, desc]) = pair.as_array().map(Vec::as_slice).and_then(|s| {
                        <&[Value; 2]>::try_from(s).ok()
                    }) {
                        if let Some(id) = id.as_u64() {
                            commit
                                .change_descriptions
                                .insert(id as u32, ChangeDescription::from_json(desc));
                        }
                    }
                }
            }
            _ => {}
        }

        commit
    }
}

fn parse_duration_entries(value: Option<&Value>) -> HashMap<u32, f64> {
    let mut out = HashMap::new();
    let Some(Value::Array(entries)) = value else {
        return out;
    };

    if entries.iter().all(Value::is_array) {
        // Tuple shape: [[id, duration], ...]
        for entry in entries {
            let pair = entry.as_array().unwrap();
            if let (Some(id), Some(dur)) = (
                pair.first().and_then(Value::as_u64),
                pair.get(1).and_then(Value::as_f64),
            ) {
                out.insert(id as u32, dur);
            }
        }
    } else {
        // Interleaved shape: [id, duration, id, duration, ...]
        for pair in entries.chunks_exact(2) {
            if let (Some(id), Some(dur)) = (pair[0].as_u64(), pair[1].as_f64()) {
                out.insert(id as u32, dur);
            }
        }
    }
    out
}

/// A single profiling session's buffered state
#[derive(Debug)]
pub struct ProfilingSession {
    pub name: String,
    pub started_at: Instant,
    pub started_at_utc: DateTime<Utc>,
    pub stopped_at: Option<Instant>,
    pub commits: Vec<Commit>,
    /// Display names captured at start; survives unmounts
    pub display_names: HashMap<u32, String>,
}

/// Aggregated changed keys across commits, first-seen order, deduplicated
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangedKeys {
    pub props: Vec<String>,
    pub state: Vec<String>,
    pub hooks: Vec<u32>,
}

/// Aggregated per-component report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: u32,
    pub display_name: String,
    pub render_count: usize,
    pub total_duration: f64,
    pub avg_duration: f64,
    pub max_duration: f64,
    pub causes: Vec<RenderCause>,
    pub changed_keys: ChangedKeys,
}

/// Summary returned by `profile-stop`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub name: String,
    pub duration_ms: u64,
    pub commit_count: usize,
    pub per_component_render_counts: Vec<ComponentRenderCount>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRenderCount {
    pub id: u32,
    pub display_name: String,
    pub count: usize,
}

/// One `profile-timeline` entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub index: usize,
    pub timestamp: f64,
    pub duration: f64,
    pub component_count: usize,
}

/// Per-component row of `profile-commit`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitComponent {
    pub id: u32,
    pub display_name: String,
    pub actual_duration: f64,
    pub self_duration: f64,
    pub causes: Vec<RenderCause>,
}

/// Detail view of one commit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDetails {
    pub index: usize,
    pub timestamp: f64,
    pub duration: f64,
    /// Untruncated component count for this commit
    pub total_components: usize,
    pub components: Vec<CommitComponent>,
}

/// Commit buffer and report builder. At most one session exists; starting
/// a new one replaces the previous session wholesale.
#[derive(Debug, Default)]
pub struct Profiler {
    session: Option<ProfilingSession>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Is a session currently recording?
    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.stopped_at.is_none())
    }

    /// Begin a new session, snapshotting display names for every node the
    /// tree currently knows
    pub fn start(&mut self, name: Option<String>, tree: &ComponentTree) {
        let name = name.unwrap_or_else(|| "unnamed".to_string());
        info!(session = %name, "profiling session started");
        self.session = Some(ProfilingSession {
            name,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            stopped_at: None,
            commits: Vec::new(),
            display_names: tree.display_names(),
        });
    }

    /// Finalize the active session and summarize it. The stopped session
    /// remains queryable until the next `start`.
    pub fn stop(&mut self, tree: &ComponentTree) -> Result<ProfileSummary> {
        let session = self
            .session
            .as_mut()
            .filter(|s| s.stopped_at.is_none())
            .ok_or_else(|| DevtoolsError::not_ready("No active profiling session"))?;
        session.stopped_at = Some(Instant::now());

        let duration_ms = session.started_at.elapsed().as_millis() as u64;
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for commit in &session.commits {
            for id in commit.actual_durations.keys() {
                *counts.entry(*id).or_insert(0) += 1;
            }
        }

        let snapshot = session.display_names.clone();
        let name = session.name.clone();
        let commit_count = session.commits.len();

        let mut per_component: Vec<ComponentRenderCount> = counts
            .into_iter()
            .map(|(id, count)| ComponentRenderCount {
                id,
                display_name: resolve_name(id, tree, &snapshot),
                count,
            })
            .collect();
        per_component.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));

        info!(
            session = %name,
            commits = commit_count,
            duration_ms,
            "profiling session stopped"
        );
        Ok(ProfileSummary {
            name,
            duration_ms,
            commit_count,
            per_component_render_counts: per_component,
        })
    }

    /// Ingest a `profilingData` payload. Accepts the nested
    /// `{dataForRoots: [{commitData: [...]}]}` shape and the flat
    /// `{commitData: [...]}` shape. Dropped when no session is recording.
    pub fn process_payload(&mut self, payload: &Value) {
        let Some(session) = self.session.as_mut().filter(|s| s.stopped_at.is_none()) else {
            debug!("profilingData with no active session, dropping");
            return;
        };

        let mut ingested = 0usize;
        if let Some(roots) = payload.get("dataForRoots").and_then(Value::as_array) {
            for root in roots {
                if let Some(commits) = root.get("commitData").and_then(Value::as_array) {
                    for commit in commits {
                        session.commits.push(Commit::from_json(commit));
                        ingested += 1;
                    }
                }
            }
        } else if let Some(commits) = payload.get("commitData").and_then(Value::as_array) {
            for commit in commits {
                session.commits.push(Commit::from_json(commit));
                ingested += 1;
            }
        }
        debug!(commits = ingested, total = session.commits.len(), "ingested profiling payload");
    }

    /// Aggregate a single component across all commits. None when the
    /// component never rendered in-session.
    pub fn get_report(&self, id: u32, tree: &ComponentTree) -> Option<Report> {
        let session = self.session.as_ref()?;

        let mut render_count = 0usize;
        let mut total = 0.0f64;
        let mut max = 0.0f64;
        let mut causes: Vec<RenderCause> = Vec::new();
        let mut changed = ChangedKeys::default();

        for commit in &session.commits {
            let Some(&actual) = commit.actual_durations.get(&id) else {
                continue;
            };
            render_count += 1;
            total += actual;
            if actual > max {
                max = actual;
            }

            if let Some(desc) = commit.change_descriptions.get(&id) {
                for cause in desc.causes() {
                    if !causes.contains(&cause) {
                        causes.push(cause);
                    }
                }
                for prop in desc.props.iter().flatten() {
                    if !changed.props.contains(prop) {
                        changed.props.push(prop.clone());
                    }
                }
                for key in desc.state.iter().flatten() {
                    if !changed.state.contains(key) {
                        changed.state.push(key.clone());
                    }
                }
                for hook in desc.hooks.iter().flatten() {
                    if !changed.hooks.contains(hook) {
                        changed.hooks.push(*hook);
                    }
                }
            }
        }

        if render_count == 0 {
            return None;
        }
        Some(Report {
            id,
            display_name: resolve_name(id, tree, &session.display_names),
            render_count,
            total_duration: total,
            avg_duration: total / render_count as f64,
            max_duration: max,
            causes,
            changed_keys: changed,
        })
    }

    /// Components sorted by average render duration, slowest first
    pub fn get_slowest(&self, tree: &ComponentTree, limit: usize) -> Vec<Report> {
        let mut reports = self.all_reports(tree);
        reports.sort_by(|a, b| {
            b.avg_duration
                .partial_cmp(&a.avg_duration)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        reports.truncate(limit);
        reports
    }

    /// Components sorted by render count, most first
    pub fn get_most_rerenders(&self, tree: &ComponentTree, limit: usize) -> Vec<Report> {
        let mut reports = self.all_reports(tree);
        reports.sort_by(|a, b| b.render_count.cmp(&a.render_count).then(a.id.cmp(&b.id)));
        reports.truncate(limit);
        reports
    }

    fn all_reports(&self, tree: &ComponentTree) -> Vec<Report> {
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };
        let mut ids: Vec<u32> = session
            .commits
            .iter()
            .flat_map(|c| c.actual_durations.keys().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .filter_map(|id| self.get_report(id, tree))
            .collect()
    }

    /// Commit timeline in commit order; a limit keeps the most recent
    /// entries (indices stay absolute)
    pub fn get_timeline(&self, limit: Option<usize>) -> Vec<TimelineEntry> {
        let Some(session) = self.session.as_ref() else {
            return Vec::new();
        };
        let mut entries: Vec<TimelineEntry> = session
            .commits
            .iter()
            .enumerate()
            .map(|(index, commit)| TimelineEntry {
                index,
                timestamp: commit.timestamp,
                duration: commit.duration,
                component_count: commit.actual_durations.len(),
            })
            .collect();
        if let Some(limit) = limit {
            if entries.len() > limit {
                entries.drain(..entries.len() - limit);
            }
        }
        entries
    }

    /// Per-component breakdown of one commit, sorted by self duration
    /// descending. None for an unknown index.
    pub fn get_commit_details(
        &self,
        index: usize,
        tree: &ComponentTree,
        limit: usize,
    ) -> Option<CommitDetails> {
        let session = self.session.as_ref()?;
        let commit = session.commits.get(index)?;

        let mut components: Vec<CommitComponent> = commit
            .actual_durations
            .iter()
            .map(|(&id, &actual)| CommitComponent {
                id,
                display_name: resolve_name(id, tree, &session.display_names),
                actual_duration: actual,
                self_duration: commit.self_durations.get(&id).copied().unwrap_or(0.0),
                causes: commit
                    .change_descriptions
                    .get(&id)
                    .map(ChangeDescription::causes)
                    .unwrap_or_default(),
            })
            .collect();
        components.sort_by(|a, b| {
            b.self_duration
                .partial_cmp(&a.self_duration)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        let total_components = components.len();
        components.truncate(limit);

        Some(CommitDetails {
            index,
            timestamp: commit.timestamp,
            duration: commit.duration,
            total_components,
            components,
        })
    }

    /// Number of buffered commits in the current session
    pub fn commit_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.commits.len())
    }
}

/// Tree first, session snapshot second, placeholder last
fn resolve_name(id: u32, tree: &ComponentTree, snapshot: &HashMap<u32, String>) -> String {
    tree.get_node(id)
        .map(|n| n.display_name.clone())
        .or_else(|| snapshot.get(&id).cloned())
        .unwrap_or_else(|| format!("Component#{id}"))
}
