//! 图结构与构造期校验
//!
//! GraphBuilder 在 build 时校验：start/finish 存在、边端点存在、
//! 每个节点从 start 可达且可达 finish（死代码即构造错误），运行期不再管可达性。

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::core::EngineError;
use crate::graph::edge::{Edge, EdgeCondition};
use crate::graph::node::{Node, NodeId, NodeKind};

/// 一张可执行图：start/finish 界定的节点与有序边集
#[derive(Debug, Clone)]
pub struct Graph {
    start: NodeId,
    finish: NodeId,
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<NodeId, Vec<Edge>>,
}

impl Graph {
    pub fn builder(start: impl Into<NodeId>, finish: impl Into<NodeId>) -> GraphBuilder {
        GraphBuilder {
            start: start.into(),
            finish: finish.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn start(&self) -> &NodeId {
        &self.start
    }

    pub fn finish(&self) -> &NodeId {
        &self.finish
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// 节点出边，按声明顺序
    pub fn edges(&self, id: &str) -> &[Edge] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 图内（含嵌套子图）ToolExecute 节点声明的全部工具名；Static 阶段构造期校验用
    pub fn referenced_tools(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for node in self.nodes.values() {
            match &node.kind {
                NodeKind::ToolExecute { tools } => out.extend(tools.iter().cloned()),
                NodeKind::Subgraph(inner) => out.extend(inner.referenced_tools()),
                _ => {}
            }
        }
        out
    }
}

/// 图构造器；节点与边按声明顺序累积，build 时统一校验
pub struct GraphBuilder {
    start: NodeId,
    finish: NodeId,
    nodes: Vec<Node>,
    edges: Vec<(NodeId, Edge)>,
}

impl GraphBuilder {
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn edge(mut self, from: impl Into<NodeId>, edge: Edge) -> Self {
        self.edges.push((from.into(), edge));
        self
    }

    /// 无变换边的简写
    pub fn connect(
        self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        condition: EdgeCondition,
    ) -> Self {
        self.edge(from, Edge::new(to, condition))
    }

    pub fn build(self) -> Result<Graph, EngineError> {
        let mut nodes: HashMap<NodeId, Node> = HashMap::new();
        for node in self.nodes {
            if nodes.insert(node.id.clone(), node).is_some() {
                return Err(EngineError::GraphTraversal(
                    "duplicate node id in graph".to_string(),
                ));
            }
        }

        for id in [&self.start, &self.finish] {
            if !nodes.contains_key(id) {
                return Err(EngineError::GraphTraversal(format!(
                    "start/finish node '{id}' not declared"
                )));
            }
        }

        let mut edges: HashMap<NodeId, Vec<Edge>> = HashMap::new();
        for (from, edge) in self.edges {
            if !nodes.contains_key(&from) {
                return Err(EngineError::GraphTraversal(format!(
                    "edge from unknown node '{from}'"
                )));
            }
            if !nodes.contains_key(&edge.to) {
                return Err(EngineError::GraphTraversal(format!(
                    "edge to unknown node '{}'",
                    edge.to
                )));
            }
            edges.entry(from).or_default().push(edge);
        }

        // 前向可达（start 出发）与后向可达（finish 反向出发）
        let forward = reach(&self.start, |id| {
            edges
                .get(id)
                .map(|es| es.iter().map(|e| e.to.clone()).collect())
                .unwrap_or_default()
        });
        let mut reverse: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (from, es) in &edges {
            for e in es {
                reverse.entry(e.to.clone()).or_default().push(from.clone());
            }
        }
        let backward = reach(&self.finish, |id| {
            reverse.get(id).cloned().unwrap_or_default()
        });

        for id in nodes.keys() {
            if !forward.contains(id) {
                return Err(EngineError::GraphTraversal(format!(
                    "node '{id}' is unreachable from start"
                )));
            }
            if !backward.contains(id) {
                return Err(EngineError::GraphTraversal(format!(
                    "node '{id}' cannot reach finish"
                )));
            }
        }

        Ok(Graph {
            start: self.start,
            finish: self.finish,
            nodes,
            edges,
        })
    }
}

fn reach(from: &NodeId, neighbors: impl Fn(&NodeId) -> Vec<NodeId>) -> HashSet<NodeId> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    seen.insert(from.clone());
    queue.push_back(from.clone());
    while let Some(id) = queue.pop_front() {
        for next in neighbors(&id) {
            if seen.insert(next.clone()) {
                queue.push_back(next);
            }
        }
    }
    seen
}
