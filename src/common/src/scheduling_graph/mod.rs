use crate::SchedulerError;
pub use scheduling_node::*;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;
mod scheduling_node;

/// Arena of the nodes still waiting to be scheduled, addressed by node name.
///
/// Nodes sit behind `Rc` so cloning the graph for a search branch only copies the
/// pointers; a node is deep copied the first time a branch mutates it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SchedulingGraph {
    nodes: BTreeMap<String, Rc<SchedulingNode>>,
}

impl SchedulingGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
        }
    }

    /// Adds or replaces a node.
    ///
    /// # Arguments
    ///
    /// * `name` - Unique name of the node.
    /// * `node` - Node to add.
    pub fn add_node(&mut self, name: &str, node: SchedulingNode) {
        self.nodes.insert(name.to_string(), Rc::new(node));
    }

    pub fn get_node(&self, name: &str) -> Option<&SchedulingNode> {
        self.nodes.get(name).map(|node| node.as_ref())
    }

    /// Returns the node or a validation error naming it.
    pub fn node(&self, name: &str) -> Result<&SchedulingNode, SchedulerError> {
        crate::require(self.get_node(name), &format!("Node {}", name))
    }

    /// Mutable access to a node, copying it first if another graph shares it.
    pub fn get_node_mut(&mut self, name: &str) -> Option<&mut SchedulingNode> {
        self.nodes.get_mut(name).map(Rc::make_mut)
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut SchedulingNode, SchedulerError> {
        let what = format!("Node {}", name);
        crate::require(self.get_node_mut(name), &what)
    }

    /// Removes a node without touching its neighbours.
    pub fn remove(&mut self, name: &str) -> Option<Rc<SchedulingNode>> {
        self.nodes.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates the nodes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SchedulingNode)> {
        self.nodes.iter().map(|(name, node)| (name, node.as_ref()))
    }

    pub fn node_names(&self) -> BTreeSet<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Serializes the graph as json.
    pub fn to_json(&self) -> serde_json::Value {
        let node_map: BTreeMap<&String, &SchedulingNode> = self.iter().collect();
        json!({ "nodes": node_map })
    }

    fn map_scheduler_err<T>(
        result: serde_json::Result<T>,
        err: SchedulerError,
    ) -> Result<T, SchedulerError> {
        match result {
            Ok(res) => Ok(res),
            _ => Err(err),
        }
    }

    /// De-Serializes a json representation of the graph created in to_json.
    pub fn from_json(json: &str) -> Result<Self, SchedulerError> {
        let malformed_err =
            SchedulerError::ValidationError(String::from("Malformatted scheduling graph json"));
        let v: Value =
            SchedulingGraph::map_scheduler_err(serde_json::from_str(json), malformed_err.clone())?;
        let nodes: BTreeMap<String, SchedulingNode> = SchedulingGraph::map_scheduler_err(
            serde_json::from_value(v["nodes"].clone()),
            malformed_err,
        )?;
        let mut graph = SchedulingGraph::new();
        for (name, node) in nodes.into_iter() {
            graph.add_node(&name, node);
        }
        Ok(graph)
    }

    /// Checks the stream wiring of the graph.
    ///
    /// Links to nodes outside of the graph are allowed, those nodes count as
    /// processed. Links between two graph nodes must mirror each other, every
    /// producer stream has at most one consumer and the graph must be acyclic.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        let mut consumed_streams = HashSet::new();
        for (name, node) in self.iter() {
            if node.data_tables.len() != node.before_nodes.len() {
                return Err(SchedulerError::ValidationError(format!(
                    "Node {} has {} input streams but {} tables",
                    name,
                    node.before_nodes.len(),
                    node.data_tables.len()
                )));
            }
            for (input, link) in node.before_nodes.iter().enumerate() {
                if link.is_boundary() {
                    continue;
                }
                if link.stream < 0 {
                    return Err(SchedulerError::ValidationError(format!(
                        "Node {} reads a negative stream of {}",
                        name, link.node
                    )));
                }
                if !consumed_streams.insert(link.clone()) {
                    return Err(SchedulerError::ValidationError(format!(
                        "Stream {} of {} has multiple consumers",
                        link.stream, link.node
                    )));
                }
                if let Some(producer) = self.get_node(&link.node) {
                    let mirrored = producer
                        .after_nodes
                        .get(link.stream as usize)
                        .map_or(false, |out| out.node == *name && out.stream == input as i32);
                    if !mirrored {
                        return Err(SchedulerError::ValidationError(format!(
                            "Input {} of {} is not linked back from {}",
                            input, name, link.node
                        )));
                    }
                }
            }
            for (output, link) in node.after_nodes.iter().enumerate() {
                if link.is_boundary() {
                    continue;
                }
                if let Some(consumer) = self.get_node(&link.node) {
                    let mirrored = link.stream >= 0
                        && consumer
                            .before_nodes
                            .get(link.stream as usize)
                            .map_or(false, |inp| inp.node == *name && inp.stream == output as i32);
                    if !mirrored {
                        return Err(SchedulerError::ValidationError(format!(
                            "Output {} of {} is not linked back from {}",
                            output, name, link.node
                        )));
                    }
                }
            }
        }
        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), SchedulerError> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        for (name, node) in self.iter() {
            let count = node.producer_names().filter(|p| self.contains(p)).count();
            in_degree.insert(name.as_str(), count);
        }
        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut visited = 0;
        while let Some(name) = queue.pop_front() {
            visited += 1;
            for consumer in self.node(name)?.consumer_names() {
                if let Some(count) = in_degree.get_mut(consumer) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(consumer);
                    }
                }
            }
        }
        if visited != self.node_count() {
            return Err(SchedulerError::ValidationError(String::from(
                "Scheduling graph contains a cycle",
            )));
        }
        Ok(())
    }

    /// Nodes whose producers are all processed or outside of the graph.
    ///
    /// # Arguments
    ///
    /// * `processed` - Nodes that are already scheduled.
    pub fn starting_nodes(&self, processed: &BTreeSet<String>) -> BTreeSet<String> {
        self.iter()
            .filter(|(name, _)| !processed.contains(*name))
            .filter(|(_, node)| {
                node.producer_names()
                    .all(|p| processed.contains(p) || !self.contains(p))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Consumers of a node that become schedulable once it is processed.
    ///
    /// Producers outside of the graph count as processed.
    ///
    /// # Arguments
    ///
    /// * `node_name` - Node that got processed.
    /// * `past_nodes` - Processed nodes, including `node_name`.
    pub fn new_available_nodes(
        &self,
        node_name: &str,
        past_nodes: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, SchedulerError> {
        let mut available = BTreeSet::new();
        for consumer_name in self.node(node_name)?.consumer_names() {
            if let Some(consumer) = self.get_node(consumer_name) {
                if consumer
                    .producer_names()
                    .all(|p| past_nodes.contains(p) || !self.contains(p))
                {
                    available.insert(consumer_name.to_string());
                }
            }
        }
        Ok(available)
    }

    /// Input indexes of `next_node` fed by `current_node`, with the producer stream of each.
    pub fn current_node_indexes(
        &self,
        next_node: &str,
        current_node: &str,
    ) -> Result<Vec<(usize, i32)>, SchedulerError> {
        let indexes: Vec<(usize, i32)> = self
            .node(next_node)?
            .before_nodes
            .iter()
            .enumerate()
            .filter(|(_, link)| link.node == current_node)
            .map(|(i, link)| (i, link.stream))
            .collect();
        if indexes.is_empty() {
            return Err(SchedulerError::SchedulerError(format!(
                "{} does not read from {}",
                next_node, current_node
            )));
        }
        Ok(indexes)
    }

    /// Binds the output tables of a node to the inputs of its consumers.
    ///
    /// Returns true if any consumer got a different table.
    ///
    /// # Arguments
    ///
    /// * `node_name` - Producer node.
    /// * `table_names` - Table of every output stream of the producer.
    pub fn add_new_table_to_next_nodes(
        &mut self,
        node_name: &str,
        table_names: &[String],
    ) -> Result<bool, SchedulerError> {
        let consumers: Vec<String> = self
            .node(node_name)?
            .consumer_names()
            .filter(|c| self.contains(c))
            .map(|c| c.to_string())
            .collect();
        let mut changed = false;
        for consumer in consumers {
            for (input, stream) in self.current_node_indexes(&consumer, node_name)? {
                let table = crate::require(
                    table_names.get(stream as usize),
                    &format!("Output table {} of {}", stream, node_name),
                )?;
                let node = self.node_mut(&consumer)?;
                if node.data_tables[input] != *table {
                    node.data_tables[input] = table.clone();
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    /// Removes a one input, one output node and connects its producer to its consumer.
    pub fn remove_node_from_graph(&mut self, node_name: &str) -> Result<(), SchedulerError> {
        let node = self.node(node_name)?;
        if node.before_nodes.len() != 1 || node.after_nodes.len() != 1 {
            return Err(SchedulerError::SchedulerError(format!(
                "Only nodes with one input and one output can be removed, {} is not",
                node_name
            )));
        }
        let before = node.before_nodes[0].clone();
        let after = node.after_nodes[0].clone();
        if !before.is_boundary() {
            if let Some(slot) = self
                .get_node_mut(&before.node)
                .and_then(|producer| producer.after_nodes.get_mut(before.stream as usize))
            {
                *slot = after.clone();
            }
        }
        if !after.is_boundary() && self.contains(&after.node) {
            let (input, _) = self.current_node_indexes(&after.node, node_name)?[0];
            self.node_mut(&after.node)?.before_nodes[input] = before;
        }
        self.nodes.remove(node_name);
        Ok(())
    }
}

impl fmt::Display for SchedulingGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}
