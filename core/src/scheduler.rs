//! Dependency-ordered test scheduling.
//!
//! # Design
//! A [`Plan`] is an arena of case nodes with index-based edges, validated once
//! by [`PlanBuilder::build`]: duplicate ids, unknown dependencies and cycles are
//! rejected there, so a `Plan` that exists can always be run to completion.
//!
//! Cases are declared inside named groups. Within a group, setup hooks become
//! hard dependencies of every other case, and teardown hooks are ordered after
//! every non-teardown case of the group without inheriting their outcome. Only
//! hard edges propagate skips.
//!
//! Data produced by a case travels as an immutable [`Fixture`] behind an `Arc`.
//! A case can read the fixtures of everything it transitively depends on and
//! nothing else.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::error::{CaseError, PlanError};
use crate::report::{ExecutionReport, Labels, Recorder, ReportEntry, Severity};

/// Values a passed case hands to its dependents.
pub type Fixture = serde_json::Map<String, Value>;

pub type CaseResult = Result<Fixture, CaseError>;

type Action = Box<dyn Fn(&CaseContext<'_>) -> CaseResult + Send + Sync>;

/// Build a fixture from key/value pairs.
pub fn fixture<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Fixture
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A case that publishes nothing.
pub fn done() -> CaseResult {
    Ok(Fixture::new())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseState {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl CaseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CaseState::Passed | CaseState::Failed | CaseState::Skipped)
    }

    /// PENDING -> RUNNING -> PASSED | FAILED, or PENDING -> SKIPPED.
    pub fn can_become(self, next: CaseState) -> bool {
        matches!(
            (self, next),
            (CaseState::Pending, CaseState::Running)
                | (CaseState::Pending, CaseState::Skipped)
                | (CaseState::Running, CaseState::Passed)
                | (CaseState::Running, CaseState::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CaseState::Pending => "PENDING",
            CaseState::Running => "RUNNING",
            CaseState::Passed => "PASSED",
            CaseState::Failed => "FAILED",
            CaseState::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Test,
    Setup,
    Teardown,
}

struct CaseDef {
    group: String,
    local: String,
    labels: Labels,
    kind: CaseKind,
    depends_on: Vec<String>,
    action: Action,
}

fn qualify(group: &str, local: &str) -> String {
    if group.is_empty() || local.contains("::") {
        local.to_string()
    } else {
        format!("{group}::{local}")
    }
}

/// Collects case declarations. Ids are qualified as `group::id` when a group
/// is active; dependencies are resolved inside the declaring group unless
/// already qualified.
#[derive(Default)]
pub struct PlanBuilder {
    group: String,
    feature: Option<String>,
    story: Option<String>,
    cases: Vec<CaseDef>,
}

/// Handle returned by the declaration methods for chaining edges and labels.
pub struct CaseHandle<'b> {
    def: &'b mut CaseDef,
}

impl CaseHandle<'_> {
    pub fn depends_on(self, ids: &[&str]) -> Self {
        self.def
            .depends_on
            .extend(ids.iter().map(|id| id.to_string()));
        self
    }

    pub fn describe(self, text: impl Into<String>) -> Self {
        self.def.labels.description = Some(text.into());
        self
    }

    pub fn severity(self, severity: Severity) -> Self {
        self.def.labels.severity = Some(severity);
        self
    }

    /// Overrides the feature inherited from the group.
    pub fn feature(self, feature: impl Into<String>) -> Self {
        self.def.labels.feature = Some(feature.into());
        self
    }

    pub fn story(self, story: impl Into<String>) -> Self {
        self.def.labels.story = Some(story.into());
        self
    }
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new group; later declarations belong to it.
    pub fn group(&mut self, name: &str) -> &mut Self {
        self.group = name.to_string();
        self.feature = None;
        self.story = None;
        self
    }

    /// Feature and story labels for the rest of the current group.
    pub fn feature(&mut self, feature: &str, story: &str) -> &mut Self {
        self.feature = Some(feature.to_string());
        self.story = Some(story.to_string());
        self
    }

    fn declare<F>(&mut self, kind: CaseKind, id: &str, action: F) -> CaseHandle<'_>
    where
        F: Fn(&CaseContext<'_>) -> CaseResult + Send + Sync + 'static,
    {
        self.cases.push(CaseDef {
            group: self.group.clone(),
            local: id.to_string(),
            labels: Labels {
                feature: self.feature.clone(),
                story: self.story.clone(),
                ..Labels::default()
            },
            kind,
            depends_on: Vec::new(),
            action: Box::new(action),
        });
        let last = self.cases.len() - 1;
        CaseHandle {
            def: &mut self.cases[last],
        }
    }

    pub fn test<F>(&mut self, id: &str, action: F) -> CaseHandle<'_>
    where
        F: Fn(&CaseContext<'_>) -> CaseResult + Send + Sync + 'static,
    {
        self.declare(CaseKind::Test, id, action)
    }

    /// Run-once-before hook for the current group.
    pub fn setup<F>(&mut self, id: &str, action: F) -> CaseHandle<'_>
    where
        F: Fn(&CaseContext<'_>) -> CaseResult + Send + Sync + 'static,
    {
        self.declare(CaseKind::Setup, id, action)
    }

    /// Run-once-after hook for the current group.
    pub fn teardown<F>(&mut self, id: &str, action: F) -> CaseHandle<'_>
    where
        F: Fn(&CaseContext<'_>) -> CaseResult + Send + Sync + 'static,
    {
        self.declare(CaseKind::Teardown, id, action)
    }

    pub fn build(self) -> Result<Plan, PlanError> {
        let mut index: HashMap<String, usize> = HashMap::with_capacity(self.cases.len());
        for (i, def) in self.cases.iter().enumerate() {
            let id = qualify(&def.group, &def.local);
            if index.insert(id.clone(), i).is_some() {
                return Err(PlanError::DuplicateCase(id));
            }
        }

        let mut nodes = Vec::with_capacity(self.cases.len());
        let hooks = |group: &str, kind: CaseKind| -> Vec<usize> {
            self.cases
                .iter()
                .enumerate()
                .filter(|(_, d)| d.group == group && d.kind == kind)
                .map(|(i, _)| i)
                .collect()
        };

        for (i, def) in self.cases.iter().enumerate() {
            let id = qualify(&def.group, &def.local);
            let mut requires = Vec::new();
            for dep in &def.depends_on {
                let target = qualify(&def.group, dep);
                match index.get(&target).or_else(|| index.get(dep)) {
                    Some(&j) => requires.push(j),
                    None => {
                        return Err(PlanError::UnknownDependency {
                            case: id,
                            dependency: dep.clone(),
                        })
                    }
                }
            }
            let mut after = Vec::new();
            match def.kind {
                CaseKind::Setup => {}
                CaseKind::Test => requires.extend(hooks(&def.group, CaseKind::Setup)),
                CaseKind::Teardown => {
                    requires.extend(hooks(&def.group, CaseKind::Setup));
                    after.extend(
                        self.cases
                            .iter()
                            .enumerate()
                            .filter(|(j, d)| {
                                *j != i && d.group == def.group && d.kind != CaseKind::Teardown
                            })
                            .map(|(j, _)| j),
                    );
                }
            }
            requires.sort_unstable();
            requires.dedup();
            after.retain(|j| !requires.contains(j));
            nodes.push(NodeEdges {
                id,
                requires,
                after,
            });
        }

        let order = topological_order(&nodes)?;
        let ancestors = ancestors(&nodes, &order);

        let nodes = self
            .cases
            .into_iter()
            .zip(nodes)
            .zip(ancestors)
            .map(|((def, edges), ancestors)| Node {
                id: edges.id,
                local: def.local,
                labels: def.labels,
                kind: def.kind,
                requires: edges.requires,
                after: edges.after,
                ancestors,
                action: def.action,
            })
            .collect();

        Ok(Plan { nodes, order })
    }
}

struct NodeEdges {
    id: String,
    requires: Vec<usize>,
    after: Vec<usize>,
}

impl NodeEdges {
    fn all_deps(&self) -> impl Iterator<Item = usize> + '_ {
        self.requires.iter().chain(self.after.iter()).copied()
    }
}

/// Kahn's algorithm; ties broken by declaration order.
fn topological_order(nodes: &[NodeEdges]) -> Result<Vec<usize>, PlanError> {
    let n = nodes.len();
    let mut pending = vec![0usize; n];
    let mut dependents = vec![Vec::new(); n];
    for (i, node) in nodes.iter().enumerate() {
        for dep in node.all_deps() {
            pending[i] += 1;
            dependents[dep].push(i);
        }
    }
    let mut ready: BinaryHeap<Reverse<usize>> =
        (0..n).filter(|&i| pending[i] == 0).map(Reverse).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &d in &dependents[i] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.push(Reverse(d));
            }
        }
    }
    if order.len() == n {
        Ok(order)
    } else {
        let placed: HashSet<usize> = order.into_iter().collect();
        Err(PlanError::CyclicDependency(find_cycle(nodes, &placed)))
    }
}

/// Walks unplaced nodes along their edges until one repeats.
fn find_cycle(nodes: &[NodeEdges], placed: &HashSet<usize>) -> Vec<String> {
    let Some(start) = (0..nodes.len()).find(|i| !placed.contains(i)) else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;
    loop {
        // Every unplaced node has at least one unplaced dependency.
        let Some(next) = nodes[current].all_deps().find(|d| !placed.contains(d)) else {
            break;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|&i| nodes[i].id.clone()).collect();
            cycle.push(nodes[next].id.clone());
            return cycle;
        }
        path.push(next);
        current = next;
    }
    path.into_iter().map(|i| nodes[i].id.clone()).collect()
}

/// Transitive hard dependencies of every node.
fn ancestors(nodes: &[NodeEdges], order: &[usize]) -> Vec<Vec<usize>> {
    let mut result: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for &i in order {
        let mut set: Vec<usize> = Vec::new();
        for &dep in &nodes[i].requires {
            set.push(dep);
            set.extend(result[dep].iter().copied());
        }
        set.sort_unstable();
        set.dedup();
        result[i] = set;
    }
    result
}

struct Node {
    id: String,
    local: String,
    labels: Labels,
    kind: CaseKind,
    requires: Vec<usize>,
    after: Vec<usize>,
    ancestors: Vec<usize>,
    action: Action,
}

/// A validated, acyclic set of cases.
pub struct Plan {
    nodes: Vec<Node>,
    order: Vec<usize>,
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan").field("order", &self.order()).finish()
    }
}

impl Plan {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Qualified ids in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].id.as_str()).collect()
    }

    /// Hard dependencies of `id`, including implicit setup edges.
    pub fn dependencies_of(&self, id: &str) -> Option<Vec<&str>> {
        let node = self.nodes.iter().find(|n| n.id == id)?;
        Some(
            node.requires
                .iter()
                .map(|&i| self.nodes[i].id.as_str())
                .collect(),
        )
    }

    pub fn kind_of(&self, id: &str) -> Option<CaseKind> {
        self.nodes.iter().find(|n| n.id == id).map(|n| n.kind)
    }

    pub fn labels_of(&self, id: &str) -> Option<&Labels> {
        self.nodes.iter().find(|n| n.id == id).map(|n| &n.labels)
    }

    pub fn description_of(&self, id: &str) -> Option<&str> {
        self.labels_of(id)
            .and_then(|labels| labels.description.as_deref())
    }
}

/// What a running case can see.
pub struct CaseContext<'p> {
    id: &'p str,
    fixtures: HashMap<&'p str, Arc<Fixture>>,
}

impl<'p> CaseContext<'p> {
    pub fn id(&self) -> &str {
        self.id
    }

    /// Fixture published by `dep` (local or qualified id).
    pub fn fixture(&self, dep: &str) -> Result<&Fixture, CaseError> {
        self.fixtures
            .get(dep)
            .map(Arc::as_ref)
            .ok_or_else(|| CaseError::Fixture {
                case: dep.to_string(),
                key: "*".to_string(),
            })
    }

    pub fn value(&self, dep: &str, key: &str) -> Result<&Value, CaseError> {
        self.fixture(dep)?.get(key).ok_or_else(|| CaseError::Fixture {
            case: dep.to_string(),
            key: key.to_string(),
        })
    }

    pub fn int(&self, dep: &str, key: &str) -> Result<i64, CaseError> {
        self.value(dep, key)?.as_i64().ok_or_else(|| CaseError::Fixture {
            case: dep.to_string(),
            key: key.to_string(),
        })
    }

    /// The `id` a create case published.
    pub fn id_of(&self, dep: &str) -> Result<i64, CaseError> {
        self.int(dep, "id")
    }

    pub fn str(&self, dep: &str, key: &str) -> Result<&str, CaseError> {
        self.value(dep, key)?.as_str().ok_or_else(|| CaseError::Fixture {
            case: dep.to_string(),
            key: key.to_string(),
        })
    }
}

/// Runs a [`Plan`], sequentially or on a bounded pool of worker threads.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    workers: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::sequential()
    }
}

struct Outcome {
    index: usize,
    result: CaseResult,
    elapsed: Duration,
}

struct RunState<'p> {
    plan: &'p Plan,
    states: Vec<CaseState>,
    published: Vec<Option<Arc<Fixture>>>,
    recorder: Recorder,
}

impl<'p> RunState<'p> {
    fn new(plan: &'p Plan, suite: &str) -> Self {
        Self {
            plan,
            states: vec![CaseState::Pending; plan.nodes.len()],
            published: vec![None; plan.nodes.len()],
            recorder: Recorder::start(suite),
        }
    }

    fn transition(&mut self, index: usize, next: CaseState) {
        let current = self.states[index];
        debug_assert!(
            current.can_become(next),
            "illegal transition {current} -> {next} for {}",
            self.plan.nodes[index].id
        );
        self.states[index] = next;
    }

    /// First hard dependency that did not pass.
    fn blocker(&self, index: usize) -> Option<usize> {
        self.plan.nodes[index]
            .requires
            .iter()
            .copied()
            .find(|&d| self.states[d] != CaseState::Passed)
    }

    fn skip(&mut self, index: usize, blocker: usize) {
        self.transition(index, CaseState::Skipped);
        let plan = self.plan;
        let node = &plan.nodes[index];
        let dep = &plan.nodes[blocker];
        let detail = format!(
            "skipped due to dependency `{}` ending {}",
            dep.id, self.states[blocker]
        );
        log::warn!("{}: {detail}", node.id);
        self.recorder.push(ReportEntry {
            id: node.id.clone(),
            kind: node.kind,
            state: CaseState::Skipped,
            elapsed: Duration::ZERO,
            detail: Some(detail),
            labels: node.labels.clone(),
        });
    }

    fn start(&mut self, index: usize) -> CaseContext<'p> {
        self.transition(index, CaseState::Running);
        let plan = self.plan;
        let node = &plan.nodes[index];
        log::info!("{}: running", node.id);
        let mut fixtures = HashMap::new();
        for &a in &node.ancestors {
            if let Some(fixture) = &self.published[a] {
                let dep = &plan.nodes[a];
                fixtures.insert(dep.id.as_str(), Arc::clone(fixture));
                fixtures
                    .entry(dep.local.as_str())
                    .or_insert_with(|| Arc::clone(fixture));
            }
        }
        CaseContext {
            id: node.id.as_str(),
            fixtures,
        }
    }

    fn complete(&mut self, outcome: Outcome) {
        let Outcome {
            index,
            result,
            elapsed,
        } = outcome;
        let plan = self.plan;
        let node = &plan.nodes[index];
        let (state, detail) = match result {
            Ok(fixture) => {
                log::info!("{}: passed in {elapsed:.0?}", node.id);
                self.published[index] = Some(Arc::new(fixture));
                (CaseState::Passed, None)
            }
            Err(err) => {
                log::warn!("{}: failed in {elapsed:.0?}: {err}", node.id);
                (CaseState::Failed, Some(err.to_string()))
            }
        };
        self.transition(index, state);
        self.recorder.push(ReportEntry {
            id: node.id.clone(),
            kind: node.kind,
            state,
            elapsed,
            detail,
            labels: node.labels.clone(),
        });
    }
}

fn invoke(plan: &Plan, index: usize, ctx: &CaseContext<'_>) -> Outcome {
    let node = &plan.nodes[index];
    let clock = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| (node.action)(ctx)))
        .unwrap_or_else(|payload| Err(CaseError::Panicked(panic_message(payload.as_ref()))));
    Outcome {
        index,
        result,
        elapsed: clock.elapsed(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Scheduler {
    pub fn sequential() -> Self {
        Self { workers: 1 }
    }

    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run(&self, suite: &str, plan: &Plan) -> ExecutionReport {
        log::info!(
            "{suite}: running {} cases on {} worker(s)",
            plan.len(),
            self.workers
        );
        let state = if self.workers == 1 {
            run_sequential(plan, suite)
        } else {
            run_parallel(plan, suite, self.workers)
        };
        state.recorder.finish()
    }
}

fn run_sequential<'p>(plan: &'p Plan, suite: &str) -> RunState<'p> {
    let mut state = RunState::new(plan, suite);
    for &index in &plan.order {
        if let Some(blocker) = state.blocker(index) {
            state.skip(index, blocker);
            continue;
        }
        let ctx = state.start(index);
        let outcome = invoke(plan, index, &ctx);
        state.complete(outcome);
    }
    state
}

/// Dispatches every case whose dependencies are terminal, at most `workers`
/// at a time, and folds results back in as they arrive.
fn run_parallel<'p>(plan: &'p Plan, suite: &str, workers: usize) -> RunState<'p> {
    let n = plan.nodes.len();
    let mut state = RunState::new(plan, suite);
    let mut pending = vec![0usize; n];
    let mut dependents = vec![Vec::new(); n];
    for (i, node) in plan.nodes.iter().enumerate() {
        for &dep in node.requires.iter().chain(node.after.iter()) {
            pending[i] += 1;
            dependents[dep].push(i);
        }
    }
    let mut ready: BinaryHeap<Reverse<usize>> =
        (0..n).filter(|&i| pending[i] == 0).map(Reverse).collect();

    let release = |index: usize, pending: &mut [usize], ready: &mut BinaryHeap<Reverse<usize>>| {
        for &d in &dependents[index] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.push(Reverse(d));
            }
        }
    };

    std::thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<Outcome>();
        let mut finished = 0;
        let mut in_flight = 0;

        while finished < n {
            while in_flight < workers {
                let Some(Reverse(index)) = ready.pop() else {
                    break;
                };
                if let Some(blocker) = state.blocker(index) {
                    state.skip(index, blocker);
                    finished += 1;
                    release(index, &mut pending, &mut ready);
                    continue;
                }
                let ctx = state.start(index);
                let tx = tx.clone();
                scope.spawn(move || {
                    let outcome = invoke(plan, index, &ctx);
                    // The receiver lives until every outcome is collected.
                    let _ = tx.send(outcome);
                });
                in_flight += 1;
            }
            if finished == n || in_flight == 0 {
                break;
            }
            let Ok(outcome) = rx.recv() else {
                break;
            };
            in_flight -= 1;
            finished += 1;
            let index = outcome.index;
            state.complete(outcome);
            release(index, &mut pending, &mut ready);
        }
    });
    state
}
