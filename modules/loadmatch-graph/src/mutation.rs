//! The write vocabulary of the graph projection.
//!
//! Every mutation is keyed by external ids and is idempotent: applying the
//! same mutation twice leaves the graph exactly as applying it once.

use std::fmt;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeLabel {
    Load,
    Driver,
    Vehicle,
    Carrier,
    Route,
    Customer,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 6] = [
        NodeLabel::Load,
        NodeLabel::Driver,
        NodeLabel::Vehicle,
        NodeLabel::Carrier,
        NodeLabel::Route,
        NodeLabel::Customer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Load => "Load",
            NodeLabel::Driver => "Driver",
            NodeLabel::Vehicle => "Vehicle",
            NodeLabel::Carrier => "Carrier",
            NodeLabel::Route => "Route",
            NodeLabel::Customer => "Customer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(non_camel_case_types)]
pub enum RelType {
    ASSIGNED_TO,
    TRANSPORTS,
    DRIVES,
    OWNED_BY,
    ORDERS,
    OPTIMIZES,
    EXECUTED_BY,
    USES_VEHICLE,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::ASSIGNED_TO => "ASSIGNED_TO",
            RelType::TRANSPORTS => "TRANSPORTS",
            RelType::DRIVES => "DRIVES",
            RelType::OWNED_BY => "OWNED_BY",
            RelType::ORDERS => "ORDERS",
            RelType::OPTIMIZES => "OPTIMIZES",
            RelType::EXECUTED_BY => "EXECUTED_BY",
            RelType::USES_VEHICLE => "USES_VEHICLE",
        }
    }

    /// (from, to) labels. An edge type only ever connects these two labels.
    pub fn endpoints(&self) -> (NodeLabel, NodeLabel) {
        match self {
            RelType::ASSIGNED_TO => (NodeLabel::Driver, NodeLabel::Load),
            RelType::TRANSPORTS => (NodeLabel::Vehicle, NodeLabel::Load),
            RelType::DRIVES => (NodeLabel::Driver, NodeLabel::Vehicle),
            RelType::OWNED_BY => (NodeLabel::Vehicle, NodeLabel::Carrier),
            RelType::ORDERS => (NodeLabel::Customer, NodeLabel::Load),
            RelType::OPTIMIZES => (NodeLabel::Route, NodeLabel::Load),
            RelType::EXECUTED_BY => (NodeLabel::Route, NodeLabel::Driver),
            RelType::USES_VEHICLE => (NodeLabel::Route, NodeLabel::Vehicle),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl PropValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Float(f) => Some(*f),
            PropValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Float(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for PropValue {
    fn from(v: DateTime<Utc>) -> Self {
        PropValue::Timestamp(v)
    }
}

/// Ordered property list. Keys are graph property names.
pub type Props = Vec<(&'static str, PropValue)>;

/// Append a property only when the value is present.
pub fn push_opt<V: Into<PropValue>>(props: &mut Props, key: &'static str, value: Option<V>) {
    if let Some(v) = value {
        props.push((key, v.into()));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphMutation {
    /// Create the node if absent, then overwrite `props`.
    MergeNode {
        label: NodeLabel,
        id: String,
        props: Props,
    },
    /// Overwrite `props` on an existing node. No-op when the node is absent.
    SetProps {
        label: NodeLabel,
        id: String,
        props: Props,
    },
    /// Ensure exactly one `rel` edge between two existing nodes, then
    /// overwrite its `props`. No-op when either end is absent.
    MergeEdge {
        rel: RelType,
        from: String,
        to: String,
        props: Props,
    },
    /// Delete every `rel` edge ending at `to`. Nodes are left in place.
    RemoveEdgesTo { rel: RelType, to: String },
}

impl GraphMutation {
    pub fn merge_node(label: NodeLabel, id: impl Into<String>, props: Props) -> Self {
        GraphMutation::MergeNode {
            label,
            id: id.into(),
            props,
        }
    }

    /// A bare create-if-absent, used to make sure an edge endpoint exists.
    pub fn ensure_node(label: NodeLabel, id: impl Into<String>) -> Self {
        Self::merge_node(label, id, Vec::new())
    }

    pub fn set_props(label: NodeLabel, id: impl Into<String>, props: Props) -> Self {
        GraphMutation::SetProps {
            label,
            id: id.into(),
            props,
        }
    }

    pub fn merge_edge(rel: RelType, from: impl Into<String>, to: impl Into<String>, props: Props) -> Self {
        GraphMutation::MergeEdge {
            rel,
            from: from.into(),
            to: to.into(),
            props,
        }
    }
}

impl fmt::Display for GraphMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphMutation::MergeNode { label, id, .. } => write!(f, "merge {}({id})", label.as_str()),
            GraphMutation::SetProps { label, id, .. } => write!(f, "set {}({id})", label.as_str()),
            GraphMutation::MergeEdge { rel, from, to, .. } => {
                let (a, b) = rel.endpoints();
                write!(f, "merge {}({from})-[{}]->{}({to})", a.as_str(), rel.as_str(), b.as_str())
            }
            GraphMutation::RemoveEdgesTo { rel, to } => {
                write!(f, "remove [{}]->{}({to})", rel.as_str(), rel.endpoints().1.as_str())
            }
        }
    }
}
