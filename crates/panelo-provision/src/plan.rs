//! Dependency-ordered provisioning plan built from the manifest

use crate::component::ComponentId;
use crate::{Error, Result};
use panelo_config::Config;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Components selected by the manifest toggles
pub fn component_set(config: &Config) -> BTreeSet<ComponentId> {
    let toggles = &config.components;
    let mut set: BTreeSet<ComponentId> = [
        ComponentId::Base,
        ComponentId::ContainerRuntime,
        ComponentId::WebServer,
        ComponentId::Database,
        ComponentId::Firewall,
        ComponentId::Supervisor,
    ]
    .into_iter()
    .collect();
    set.extend(toggles.runtimes.iter().copied().map(ComponentId::Runtime));
    for (enabled, id) in [
        (toggles.filebrowser, ComponentId::Filebrowser),
        (toggles.ssl, ComponentId::Ssl),
        (toggles.monitoring, ComponentId::Monitoring),
        (toggles.backup, ComponentId::Backup),
        (toggles.panel, ComponentId::Panel),
    ] {
        if enabled {
            set.insert(id);
        }
    }
    set
}

/// Directed dependency graph over component ids
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Dependency -> dependents
    edges: BTreeMap<ComponentId, BTreeSet<ComponentId>>,
    /// Node -> its dependencies
    reverse_edges: BTreeMap<ComponentId, BTreeSet<ComponentId>>,
    nodes: BTreeSet<ComponentId>,
}

impl DependencyGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node
    pub fn add_node(&mut self, id: ComponentId) {
        self.nodes.insert(id);
    }

    /// `node` must run after `dependency`
    pub fn add_dependency(&mut self, node: ComponentId, dependency: ComponentId) {
        self.nodes.insert(node);
        self.nodes.insert(dependency);
        self.edges.entry(dependency).or_default().insert(node);
        self.reverse_edges.entry(node).or_default().insert(dependency);
    }

    /// Direct dependencies of `id`
    pub fn dependencies_of(&self, id: ComponentId) -> Vec<ComponentId> {
        self.reverse_edges
            .get(&id)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Kahn's algorithm; ties resolve in canonical component order
    pub fn topological_sort(&self) -> Result<Vec<ComponentId>> {
        let mut in_degree: BTreeMap<ComponentId, usize> =
            self.nodes.iter().map(|node| (*node, 0)).collect();
        for dependents in self.edges.values() {
            for dependent in dependents {
                *in_degree.entry(*dependent).or_default() += 1;
            }
        }

        let mut ready: BTreeSet<ComponentId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            order.push(node);
            for dependent in self.edges.get(&node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck: Vec<String> = self
                .nodes
                .iter()
                .filter(|node| !order.contains(node))
                .map(ToString::to_string)
                .collect();
            return Err(Error::Config(format!(
                "circular dependency between {}",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }
}

/// Whether a planned step runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Runs
    Enabled,
    /// Short-circuited
    Skipped(String),
}

/// One step of the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    /// Component
    pub id: ComponentId,
    /// Direct dependencies within the plan
    pub depends_on: Vec<ComponentId>,
    /// Whether it runs
    pub status: StepStatus,
}

/// Ordered provisioning plan
#[derive(Debug, Clone)]
pub struct Plan {
    steps: Vec<PlannedStep>,
}

impl Plan {
    /// Build the plan for `config`
    pub fn build(config: &Config) -> Result<Self> {
        let selected = component_set(config);

        let mut skipped = BTreeSet::new();
        for entry in &config.components.skip {
            let id: ComponentId = entry.parse().map_err(|_| {
                Error::Config(format!("unknown component '{}' in components.skip", entry))
            })?;
            skipped.insert(id);
        }

        let mut graph = DependencyGraph::new();
        for id in &selected {
            graph.add_node(*id);
            if *id == ComponentId::Supervisor {
                continue;
            }
            for dependency in id.dependencies() {
                graph.add_dependency(*id, dependency);
            }
        }
        // The supervisor runs last and composes whatever ends up enabled
        for id in &selected {
            if *id != ComponentId::Supervisor {
                graph.add_dependency(ComponentId::Supervisor, *id);
            }
        }

        let mut status: BTreeMap<ComponentId, StepStatus> = BTreeMap::new();
        let mut steps = Vec::new();
        for id in graph.topological_sort()? {
            let mut depends_on = graph.dependencies_of(id);
            if id == ComponentId::Supervisor {
                depends_on.retain(|dep| matches!(status.get(dep), Some(StepStatus::Enabled)));
            }
            let step_status = if skipped.contains(&id) {
                StepStatus::Skipped("skipped by configuration".to_string())
            } else if !selected.contains(&id) {
                StepStatus::Skipped("disabled by configuration".to_string())
            } else if let Some(dep) = depends_on
                .iter()
                .find(|dep| !matches!(status.get(dep), Some(StepStatus::Enabled)))
            {
                StepStatus::Skipped(format!("dependency {} is not enabled", dep))
            } else {
                StepStatus::Enabled
            };
            status.insert(id, step_status.clone());
            steps.push(PlannedStep {
                id,
                depends_on,
                status: step_status,
            });
        }

        Ok(Self { steps })
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    /// Whether `id` is planned and runs
    pub fn is_enabled(&self, id: ComponentId) -> bool {
        self.step(id)
            .is_some_and(|step| step.status == StepStatus::Enabled)
    }

    /// The step for `id`
    pub fn step(&self, id: ComponentId) -> Option<&PlannedStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Ids of the steps that run, in order
    pub fn enabled(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Enabled)
            .map(|step| step.id)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            match &step.status {
                StepStatus::Enabled => writeln!(f, "{:2}. {}", index + 1, step.id)?,
                StepStatus::Skipped(reason) => {
                    writeln!(f, "{:2}. {} (skipped: {})", index + 1, step.id, reason)?
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panelo_config::AppKind;

    fn position(plan: &Plan, id: ComponentId) -> usize {
        plan.steps().iter().position(|s| s.id == id).unwrap()
    }

    #[test]
    fn test_default_plan_order() {
        let plan = Plan::build(&Config::default()).unwrap();
        let steps = plan.steps();
        assert_eq!(steps.first().unwrap().id, ComponentId::Base);
        assert_eq!(steps.last().unwrap().id, ComponentId::Supervisor);

        for step in steps {
            for dep in &step.depends_on {
                assert!(position(&plan, *dep) < position(&plan, step.id));
            }
        }
        assert!(!plan.is_enabled(ComponentId::Monitoring));
        assert!(plan.step(ComponentId::Monitoring).is_none());
    }

    #[test]
    fn test_skipped_dependency_short_circuits_dependents() {
        let mut config = Config::default();
        config.components.skip = vec!["database".to_string()];
        let plan = Plan::build(&config).unwrap();

        assert_eq!(
            plan.step(ComponentId::Database).unwrap().status,
            StepStatus::Skipped("skipped by configuration".to_string())
        );
        for id in [
            ComponentId::Runtime(AppKind::Wordpress),
            ComponentId::Backup,
            ComponentId::Panel,
        ] {
            assert!(matches!(
                plan.step(id).unwrap().status,
                StepStatus::Skipped(ref reason) if reason.contains("database")
            ));
        }
        assert!(plan.is_enabled(ComponentId::Runtime(AppKind::Static)));
        assert!(plan.is_enabled(ComponentId::Supervisor));
    }

    #[test]
    fn test_supervisor_composes_only_enabled_steps() {
        let mut config = Config::default();
        config.components.skip = vec!["database".to_string()];
        let plan = Plan::build(&config).unwrap();

        let supervisor = plan.step(ComponentId::Supervisor).unwrap();
        assert_eq!(supervisor.status, StepStatus::Enabled);
        assert_eq!(plan.steps().last().unwrap().id, ComponentId::Supervisor);
        assert!(!supervisor.depends_on.contains(&ComponentId::Panel));
        assert!(!supervisor.depends_on.contains(&ComponentId::Database));
        assert!(supervisor.depends_on.contains(&ComponentId::WebServer));
    }

    #[test]
    fn test_unknown_skip_entry_is_rejected() {
        let mut config = Config::default();
        config.components.skip = vec!["mailserver".to_string()];
        assert!(matches!(Plan::build(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(ComponentId::Panel, ComponentId::Database);
        graph.add_dependency(ComponentId::Database, ComponentId::Panel);
        graph.add_node(ComponentId::Base);
        let err = graph.topological_sort().unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("circular")));
    }
}
