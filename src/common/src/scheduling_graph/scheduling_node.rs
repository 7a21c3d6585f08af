use crate::{OperationType, BOUNDARY_STREAM};

/// One end of a stream edge: the neighbour's name and its stream index.
///
/// In `before_nodes` the stream is the producer's output index, in `after_nodes`
/// it is the consumer's input index. An empty name is a graph boundary.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamLink {
    pub node: String,
    pub stream: i32,
}

impl StreamLink {
    pub fn new(node: &str, stream: i32) -> Self {
        StreamLink {
            node: node.to_string(),
            stream,
        }
    }

    /// Link to data supplied or consumed outside of the graph.
    pub fn boundary() -> Self {
        StreamLink {
            node: String::new(),
            stream: BOUNDARY_STREAM,
        }
    }

    pub fn is_boundary(&self) -> bool {
        self.node.is_empty()
    }
}

/// A query operation waiting to be scheduled.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SchedulingNode {
    pub operation: OperationType,
    /// Producer of every input stream.
    pub before_nodes: Vec<StreamLink>,
    /// Consumer of every output stream.
    pub after_nodes: Vec<StreamLink>,
    /// Table bound to every input stream.
    pub data_tables: Vec<String>,
    /// Outstanding resource requirement.
    #[serde(default)]
    pub capacity: Vec<i64>,
    /// Per start column the bitstreams meeting the minimum requirement.
    #[serde(default)]
    pub satisfying_bitstreams: Vec<Vec<String>>,
}

impl SchedulingNode {
    pub fn new(
        operation: OperationType,
        before_nodes: Vec<StreamLink>,
        after_nodes: Vec<StreamLink>,
        data_tables: Vec<String>,
        capacity: Vec<i64>,
    ) -> Self {
        SchedulingNode {
            operation,
            before_nodes,
            after_nodes,
            data_tables,
            capacity,
            satisfying_bitstreams: Vec::new(),
        }
    }

    /// Names of the producers inside the graph, boundaries skipped.
    pub fn producer_names(&self) -> impl Iterator<Item = &str> {
        self.before_nodes
            .iter()
            .filter(|link| !link.is_boundary())
            .map(|link| link.node.as_str())
    }

    /// Names of the consumers inside the graph, boundaries skipped.
    pub fn consumer_names(&self) -> impl Iterator<Item = &str> {
        self.after_nodes
            .iter()
            .filter(|link| !link.is_boundary())
            .map(|link| link.node.as_str())
    }
}
