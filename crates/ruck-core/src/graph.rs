//! The rule graph: which metric derives from which facts and metrics, and the
//! pure function computing it.
//!
//! The graph is built once at startup. Every registration re-runs a
//! topological sort over the whole graph, so a graph that finished building
//! is known to be acyclic; cascades never re-check it.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
  fmt,
  sync::Arc,
};

use crate::{
  Error, Result,
  fact::{Fact, FactType},
  metric::{Metric, MetricName, MetricValue},
  snapshot::MetricSnapshot,
};

// ─── Nodes ───────────────────────────────────────────────────────────────────

/// Something a rule can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
  Fact(FactType),
  Metric(MetricName),
}

impl From<FactType> for Node {
  fn from(t: FactType) -> Self { Self::Fact(t) }
}

impl From<MetricName> for Node {
  fn from(m: MetricName) -> Self { Self::Metric(m) }
}

impl fmt::Display for Node {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Fact(t) => write!(f, "fact:{t}"),
      Self::Metric(m) => write!(f, "{m}"),
    }
  }
}

// ─── Rule input ──────────────────────────────────────────────────────────────

/// What a compute function may read. Metric reads are restricted to the
/// rule's declared dependencies.
pub struct RuleInput<'a> {
  prior:      &'a Metric,
  fact:       Option<&'a Fact>,
  snapshot:   &'a MetricSnapshot,
  depends_on: &'a [Node],
}

impl<'a> RuleInput<'a> {
  pub(crate) fn new(
    prior: &'a Metric,
    fact: Option<&'a Fact>,
    snapshot: &'a MetricSnapshot,
    depends_on: &'a [Node],
  ) -> Self {
    Self { prior, fact, snapshot, depends_on }
  }

  /// The target metric as it stood before this evaluation.
  pub fn prior(&self) -> &'a Metric { self.prior }

  /// The triggering fact, present only when its type is a declared
  /// dependency of the rule.
  pub fn fact(&self) -> Option<&'a Fact> { self.fact }

  /// Current value of a declared metric dependency.
  pub fn value(&self, metric: MetricName) -> Result<MetricValue, String> {
    if !self.depends_on.contains(&Node::Metric(metric)) {
      return Err(format!("{metric} is not a declared dependency"));
    }
    Ok(self.snapshot.value(metric))
  }

  pub fn number(&self, metric: MetricName) -> Result<f64, String> {
    self
      .value(metric)?
      .as_number()
      .ok_or_else(|| format!("{metric} is not numeric"))
  }

  /// The prior value of the target as a number.
  pub fn prior_number(&self) -> Result<f64, String> {
    self
      .prior
      .value
      .as_number()
      .ok_or_else(|| format!("{} is not numeric", self.prior.name))
  }
}

// ─── Rule edge ───────────────────────────────────────────────────────────────

/// A pure, synchronous compute function. Errors are plain messages; the
/// engine wraps them with the fact and metric context.
pub type ComputeFn =
  Arc<dyn Fn(&RuleInput<'_>) -> Result<MetricValue, String> + Send + Sync>;

#[derive(Clone)]
pub struct RuleEdge {
  pub target:     MetricName,
  /// Deduplicated, in declaration order.
  pub depends_on: Vec<Node>,
  compute:        ComputeFn,
}

impl RuleEdge {
  pub fn compute(&self, input: &RuleInput<'_>) -> Result<MetricValue, String> {
    (self.compute)(input)
  }

  pub fn depends_on_node(&self, node: Node) -> bool {
    self.depends_on.contains(&node)
  }

  pub fn metric_dependencies(&self) -> impl Iterator<Item = MetricName> + '_ {
    self.depends_on.iter().filter_map(|n| match n {
      Node::Metric(m) => Some(*m),
      Node::Fact(_) => None,
    })
  }
}

impl fmt::Debug for RuleEdge {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RuleEdge")
      .field("target", &self.target)
      .field("depends_on", &self.depends_on)
      .finish_non_exhaustive()
  }
}

// ─── Graph ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RuleGraph {
  /// Registration order.
  rules: Vec<RuleEdge>,
  index: HashMap<MetricName, usize>,
  /// Topological order of all targets, ties broken by registration order.
  order: Vec<MetricName>,
}

impl RuleGraph {
  pub fn new() -> Self { Self::default() }

  /// Add the single rule for `target`.
  ///
  /// Fails with [`Error::DuplicateRule`] if `target` already has a rule and
  /// with [`Error::CyclicDependency`] if the rule closes a cycle, including a
  /// rule listing its own target. A rejected rule leaves the graph unchanged.
  pub fn register_rule<F>(
    &mut self,
    target: MetricName,
    dependencies: impl IntoIterator<Item = Node>,
    compute: F,
  ) -> Result<()>
  where
    F: Fn(&RuleInput<'_>) -> Result<MetricValue, String> + Send + Sync + 'static,
  {
    if self.index.contains_key(&target) {
      return Err(Error::DuplicateRule(target));
    }

    let mut depends_on = Vec::new();
    for dep in dependencies {
      if !depends_on.contains(&dep) {
        depends_on.push(dep);
      }
    }

    self.rules.push(RuleEdge { target, depends_on, compute: Arc::new(compute) });
    match topological_sort(&self.rules) {
      Ok(order) => {
        self.index.insert(target, self.rules.len() - 1);
        self.order = order;
        Ok(())
      }
      Err(cycle) => {
        self.rules.pop();
        Err(Error::CyclicDependency { target, cycle })
      }
    }
  }

  /// Check that every metric used as a dependency has a rule of its own.
  pub fn validate(&self) -> Result<()> {
    for rule in &self.rules {
      for dep in rule.metric_dependencies() {
        if !self.index.contains_key(&dep) {
          return Err(Error::UnresolvedDependency {
            dependent: rule.target,
            missing:   dep,
          });
        }
      }
    }
    Ok(())
  }

  pub fn rule(&self, target: MetricName) -> Option<&RuleEdge> {
    self.index.get(&target).map(|&i| &self.rules[i])
  }

  pub fn rules(&self) -> &[RuleEdge] { &self.rules }

  pub fn len(&self) -> usize { self.rules.len() }

  pub fn is_empty(&self) -> bool { self.rules.is_empty() }

  /// All targets, ancestors before descendants.
  pub fn topological_order(&self) -> &[MetricName] { &self.order }

  /// Metrics whose rule lists `node` directly, in registration order.
  pub fn dependents_of(&self, node: impl Into<Node>) -> Vec<MetricName> {
    let node = node.into();
    self
      .rules
      .iter()
      .filter(|r| r.depends_on_node(node))
      .map(|r| r.target)
      .collect()
  }

  /// Every metric transitively downstream of `node`, each exactly once,
  /// ancestors before descendants.
  pub fn compute_order_from(&self, node: impl Into<Node>) -> Vec<MetricName> {
    let mut reachable: HashSet<MetricName> = HashSet::new();
    let mut queue: VecDeque<MetricName> = self.dependents_of(node).into();

    while let Some(metric) = queue.pop_front() {
      if reachable.insert(metric) {
        queue.extend(self.dependents_of(metric));
      }
    }

    self
      .order
      .iter()
      .copied()
      .filter(|m| reachable.contains(m))
      .collect()
  }

  /// A snapshot for a player with no facts yet: defaults, then every rule
  /// evaluated once in topological order, so derived metrics agree with the
  /// metrics they depend on.
  pub fn baseline(&self, player_id: impl Into<String>) -> Result<MetricSnapshot> {
    self.seeded(player_id, BTreeMap::new())
  }

  /// A starting snapshot with some metrics assessed up front.
  ///
  /// A seed for a metric that facts move (a fold, or a rule with any fact
  /// dependency) is taken as the metric's state. Every other metric is
  /// evaluated from its rule in topological order over the seeds. A seed for
  /// a metric derived only from other metrics must equal what its rule gives,
  /// otherwise [`Error::SeedMismatch`].
  pub fn seeded(
    &self,
    player_id: impl Into<String>,
    seeds: BTreeMap<MetricName, MetricValue>,
  ) -> Result<MetricSnapshot> {
    let mut snapshot = MetricSnapshot::new(player_id);
    for (&name, &value) in &seeds {
      let value = name.check(value).map_err(|cause| Error::Baseline { metric: name, cause })?;
      let prior = snapshot.metric(name).clone();
      snapshot.set(Metric { value, ..prior });
    }

    for &name in &self.order {
      let Some(rule) = self.rule(name) else { continue };
      let seed = seeds.get(&name).copied();
      let fact_driven = rule.depends_on.iter().any(|n| matches!(n, Node::Fact(_)));
      if seed.is_some() && fact_driven {
        continue;
      }

      let prior = snapshot.metric(name).clone();
      let input = RuleInput::new(&prior, None, &snapshot, &rule.depends_on);
      let value = rule
        .compute(&input)
        .and_then(|v| name.check(v))
        .map_err(|cause| Error::Baseline { metric: name, cause })?;
      if let Some(seeded) = seed
        && seeded != value
      {
        return Err(Error::SeedMismatch { metric: name, seeded, derived: value });
      }
      snapshot.set(Metric { value, ..prior });
    }

    Ok(snapshot)
  }
}

/// Kahn's algorithm over rule targets. Dependencies on metrics with no rule
/// yet are ignored here; [`RuleGraph::validate`] reports them.
///
/// On failure returns every target that could not be ordered.
fn topological_sort(
  rules: &[RuleEdge],
) -> std::result::Result<Vec<MetricName>, Vec<MetricName>> {
  let position: HashMap<MetricName, usize> =
    rules.iter().enumerate().map(|(i, r)| (r.target, i)).collect();

  let mut in_degree = vec![0usize; rules.len()];
  let mut children: Vec<Vec<usize>> = vec![Vec::new(); rules.len()];
  for (i, rule) in rules.iter().enumerate() {
    for dep in rule.metric_dependencies() {
      if let Some(&parent) = position.get(&dep) {
        in_degree[i] += 1;
        children[parent].push(i);
      }
    }
  }

  let mut ready: BTreeSet<usize> =
    (0..rules.len()).filter(|&i| in_degree[i] == 0).collect();
  let mut order = Vec::with_capacity(rules.len());

  while let Some(i) = ready.pop_first() {
    order.push(rules[i].target);
    for &child in &children[i] {
      in_degree[child] -= 1;
      if in_degree[child] == 0 {
        ready.insert(child);
      }
    }
  }

  if order.len() == rules.len() {
    Ok(order)
  } else {
    Err(
      rules
        .iter()
        .zip(&in_degree)
        .filter(|(_, d)| **d > 0)
        .map(|(r, _)| r.target)
        .collect(),
    )
  }
}
