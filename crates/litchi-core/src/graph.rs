use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::error::{Error, Result};
use crate::random::Random;
use crate::shape::Shape3D;
use crate::tensor::{self, Tensor};

// Graph — Nodes, edges and the arena that owns the edges
//
// Layers are nodes. The buffers flowing between them are edges. An edge holds
// two tensors, the activations (written by the producing layer during
// forward) and their gradients (written by the consuming layer during
// backward), so a layer's output is read in place by the next layer instead
// of being copied.
//
// OWNERSHIP:
//
//   All edges live in a Graph arena and are addressed by EdgeId. A Node only
//   stores handles in its slots; the producer recorded on an edge is a NodeId,
//   used for traversal and never for lifetime. Dropping a layer therefore
//   never invalidates an edge another layer still reads.
//
// LAZY ALLOCATION:
//
//   A slot starts empty. The first access through `input_edge` or
//   `output_edge` creates the edge with the shape and type the caller
//   declares and stores the handle; every later access returns the same
//   handle. Graphs can be wired in any order without pre-committing memory
//   and without creating a slot's edge twice.

/// Unique identifier of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeId {
    /// Generate a new unique node id (uses a global atomic counter).
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Handle of an edge inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(usize);

impl EdgeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge#{}", self.0)
    }
}

/// Role of the vector carried by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorType {
    /// Activations, fed by another layer or by the caller.
    Data,
    /// Trainable weight matrix.
    Weight,
    /// Trainable bias vector.
    Bias,
    /// Ground truth.
    Label,
    /// Layer-private scratch storage.
    Aux,
}

impl VectorType {
    /// Weights and biases: initialized once, not resized with the batch.
    pub fn is_trainable_weight(&self) -> bool {
        matches!(self, VectorType::Weight | VectorType::Bias)
    }
}

/// Buffer shared between a producing and a consuming node.
#[derive(Debug, Clone)]
pub struct Edge {
    shape: Shape3D,
    vtype: VectorType,
    data: Tensor,
    grad: Tensor,
    producer: Option<NodeId>,
    consumers: Vec<NodeId>,
}

impl Edge {
    /// New edge holding one zeroed sample of `shape`.
    pub fn new(producer: Option<NodeId>, shape: Shape3D, vtype: VectorType) -> Self {
        Edge {
            shape,
            vtype,
            data: tensor::zeros(1, shape.size()),
            grad: tensor::zeros(1, shape.size()),
            producer,
            consumers: Vec::new(),
        }
    }

    pub fn shape(&self) -> Shape3D {
        self.shape
    }

    pub fn vtype(&self) -> VectorType {
        self.vtype
    }

    pub fn producer(&self) -> Option<NodeId> {
        self.producer
    }

    pub fn consumers(&self) -> &[NodeId] {
        &self.consumers
    }

    pub fn add_consumer(&mut self, node: NodeId) {
        if !self.consumers.contains(&node) {
            self.consumers.push(node);
        }
    }

    pub fn data(&self) -> &Tensor {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Tensor {
        &mut self.data
    }

    pub fn gradient(&self) -> &Tensor {
        &self.grad
    }

    pub fn gradient_mut(&mut self) -> &mut Tensor {
        &mut self.grad
    }

    /// Copy `data` into the leading samples of the activation buffer, growing
    /// it if needed. Samples past `data.len()` are left as they are.
    pub fn write_data(&mut self, data: &Tensor) -> Result<()> {
        let dim = self.shape.size();
        tensor::check_sample_len("edge data", data, dim)?;
        tensor::grow_tensor(&mut self.data, data.len(), dim);
        self.data[..data.len()].clone_from_slice(data);
        Ok(())
    }

    /// Zero every gradient sample.
    pub fn clear_grads(&mut self) {
        tensor::fill_tensor(&mut self.grad, 0.0);
    }

    /// Grow data (unless `grow_data` is false) and gradients to `samples`.
    pub fn grow(&mut self, samples: usize, grow_data: bool) {
        let dim = self.shape.size();
        if grow_data {
            tensor::grow_tensor(&mut self.data, samples, dim);
        }
        tensor::grow_tensor(&mut self.grad, samples, dim);
    }

    /// Move the activations out, leaving an empty tensor behind.
    pub fn take_data(&mut self) -> Tensor {
        std::mem::take(&mut self.data)
    }

    /// Move the gradients out, leaving an empty tensor behind.
    pub fn take_gradient(&mut self) -> Tensor {
        std::mem::take(&mut self.grad)
    }

    /// Put back activations previously moved out with `take_data`.
    pub fn restore_data(&mut self, data: Tensor) {
        self.data = data;
    }

    /// Put back gradients previously moved out with `take_gradient`.
    pub fn restore_gradient(&mut self, grad: Tensor) {
        self.grad = grad;
    }

    /// Copy `grad` into the leading samples of the gradient buffer, growing
    /// it if needed. Samples past `grad.len()` are left as they are.
    pub fn write_gradient(&mut self, grad: &Tensor) -> Result<()> {
        let dim = self.shape.size();
        tensor::check_sample_len("edge gradient", grad, dim)?;
        tensor::grow_tensor(&mut self.grad, grad.len(), dim);
        self.grad[..grad.len()].clone_from_slice(grad);
        Ok(())
    }
}

/// Arena owning every edge, plus the random source used to initialize them.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    edges: Vec<Edge>,
    rng: Random,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph whose random source starts from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Graph {
            edges: Vec::new(),
            rng: Random::new(seed),
        }
    }

    /// Reseed the random source used by subsequent initializations.
    pub fn set_random_seed(&mut self, seed: u64) {
        self.rng.set_seed(seed);
    }

    pub fn rng_mut(&mut self) -> &mut Random {
        &mut self.rng
    }

    /// Number of edges allocated so far.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn add_edge(&mut self, edge: Edge) -> EdgeId {
        let id = EdgeId(self.edges.len());
        debug!(
            "allocated {} ({:?}, shape {}, producer {:?})",
            id, edge.vtype, edge.shape, edge.producer
        );
        self.edges.push(edge);
        id
    }

    pub fn edge(&self, id: EdgeId) -> Result<&Edge> {
        self.edges.get(id.0).ok_or(Error::UnknownEdge(id))
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Result<&mut Edge> {
        self.edges.get_mut(id.0).ok_or(Error::UnknownEdge(id))
    }

    /// Borrow an edge and the random source at the same time.
    pub fn edge_and_rng_mut(&mut self, id: EdgeId) -> Result<(&mut Edge, &mut Random)> {
        let edge = self.edges.get_mut(id.0).ok_or(Error::UnknownEdge(id))?;
        Ok((edge, &mut self.rng))
    }
}

/// A graph vertex with fixed numbers of input and output slots.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    prev: Vec<Option<EdgeId>>,
    next: Vec<Option<EdgeId>>,
}

impl Node {
    /// `in_size` input and `out_size` output slots, all empty.
    pub fn new(in_size: usize, out_size: usize) -> Self {
        Node {
            id: NodeId::new(),
            prev: vec![None; in_size],
            next: vec![None; out_size],
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn prev(&self) -> &[Option<EdgeId>] {
        &self.prev
    }

    pub fn next(&self) -> &[Option<EdgeId>] {
        &self.next
    }

    pub fn in_size(&self) -> usize {
        self.prev.len()
    }

    pub fn out_size(&self) -> usize {
        self.next.len()
    }

    /// Edge in input slot `i`, allocating it (without a producer) on first access.
    pub fn input_edge(
        &mut self,
        graph: &mut Graph,
        i: usize,
        shape: Shape3D,
        vtype: VectorType,
    ) -> Result<EdgeId> {
        let len = self.prev.len();
        let slot = self.prev.get_mut(i).ok_or(Error::IndexOutOfRange {
            what: "input slot",
            index: i,
            len,
        })?;
        if let Some(id) = *slot {
            return Ok(id);
        }
        let mut edge = Edge::new(None, shape, vtype);
        edge.add_consumer(self.id);
        let id = graph.add_edge(edge);
        *slot = Some(id);
        Ok(id)
    }

    /// Edge in output slot `i`, allocating it with this node as producer on first access.
    pub fn output_edge(
        &mut self,
        graph: &mut Graph,
        i: usize,
        shape: Shape3D,
        vtype: VectorType,
    ) -> Result<EdgeId> {
        let len = self.next.len();
        let slot = self.next.get_mut(i).ok_or(Error::IndexOutOfRange {
            what: "output slot",
            index: i,
            len,
        })?;
        if let Some(id) = *slot {
            return Ok(id);
        }
        let id = graph.add_edge(Edge::new(Some(self.id), shape, vtype));
        *slot = Some(id);
        Ok(id)
    }

    /// Point input slot `i` at an existing edge and register as its consumer.
    pub fn attach_input(&mut self, graph: &mut Graph, i: usize, edge: EdgeId) -> Result<()> {
        let len = self.prev.len();
        let slot = self.prev.get_mut(i).ok_or(Error::IndexOutOfRange {
            what: "input slot",
            index: i,
            len,
        })?;
        graph.edge_mut(edge)?.add_consumer(self.id);
        *slot = Some(edge);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_slots_start_empty() {
        let n = Node::new(3, 1);
        assert_eq!(n.in_size(), 3);
        assert_eq!(n.out_size(), 1);
        assert!(n.prev().iter().all(Option::is_none));
        assert!(n.next().iter().all(Option::is_none));
    }

    #[test]
    fn test_input_edge_allocated_once() {
        let mut g = Graph::new();
        let mut n = Node::new(2, 1);
        let shape = Shape3D::vector(4);
        let a = n.input_edge(&mut g, 0, shape, VectorType::Data).unwrap();
        let b = n.input_edge(&mut g, 0, shape, VectorType::Data).unwrap();
        assert_eq!(a, b);
        assert_eq!(g.len(), 1);
        let e = g.edge(a).unwrap();
        assert_eq!(e.producer(), None);
        assert_eq!(e.consumers(), &[n.id()]);
        assert_eq!(e.data().len(), 1);
        assert_eq!(e.data()[0].len(), 4);
    }

    #[test]
    fn test_output_edge_records_producer() {
        let mut g = Graph::new();
        let mut n = Node::new(1, 1);
        let id = n
            .output_edge(&mut g, 0, Shape3D::vector(2), VectorType::Data)
            .unwrap();
        assert_eq!(g.edge(id).unwrap().producer(), Some(n.id()));
        let again = n
            .output_edge(&mut g, 0, Shape3D::vector(2), VectorType::Data)
            .unwrap();
        assert_eq!(id, again);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_slot_out_of_range() {
        let mut g = Graph::new();
        let mut n = Node::new(1, 1);
        let err = n
            .input_edge(&mut g, 3, Shape3D::vector(1), VectorType::Data)
            .unwrap_err();
        assert!(matches!(err, Error::IndexOutOfRange { index: 3, len: 1, .. }));
    }

    #[test]
    fn test_attach_input_shares_edge() {
        let mut g = Graph::new();
        let mut head = Node::new(1, 1);
        let mut tail = Node::new(1, 1);
        let out = head
            .output_edge(&mut g, 0, Shape3D::vector(3), VectorType::Data)
            .unwrap();
        tail.attach_input(&mut g, 0, out).unwrap();
        let seen = tail
            .input_edge(&mut g, 0, Shape3D::vector(3), VectorType::Data)
            .unwrap();
        assert_eq!(seen, out);
        assert_eq!(g.edge(out).unwrap().consumers(), &[tail.id()]);
    }

    #[test]
    fn test_edge_grow_and_clear() {
        let mut e = Edge::new(None, Shape3D::vector(2), VectorType::Weight);
        e.gradient_mut()[0][1] = 3.0;
        e.grow(4, false);
        assert_eq!(e.data().len(), 1);
        assert_eq!(e.gradient().len(), 4);
        assert_eq!(e.gradient()[0][1], 3.0);
        e.clear_grads();
        assert!(e.gradient().iter().flatten().all(|&v| v == 0.0));
    }

    #[test]
    fn test_write_data_never_shrinks() {
        let mut e = Edge::new(None, Shape3D::vector(3), VectorType::Data);
        e.write_data(&vec![vec![1.0, 2.0, 3.0]; 4]).unwrap();
        assert_eq!(e.data().len(), 4);
        e.write_data(&vec![vec![7.0, 8.0, 9.0]]).unwrap();
        assert_eq!(e.data().len(), 4);
        assert_eq!(e.data()[0], vec![7.0, 8.0, 9.0]);
        assert_eq!(e.data()[3], vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            e.write_data(&vec![vec![1.0]]),
            Err(Error::ShapeInconsistency { expected: 3, got: 1, .. })
        ));
    }

    #[test]
    fn test_write_gradient_keeps_tail() {
        let mut e = Edge::new(None, Shape3D::vector(2), VectorType::Data);
        e.grow(3, true);
        e.gradient_mut()[2] = vec![5.0, 5.0];
        e.write_gradient(&vec![vec![1.0, 2.0]]).unwrap();
        assert_eq!(e.gradient()[0], vec![1.0, 2.0]);
        assert_eq!(e.gradient()[2], vec![5.0, 5.0]);
        assert!(e.write_gradient(&vec![vec![1.0]]).is_err());
    }

    #[test]
    fn test_take_and_restore() {
        let mut e = Edge::new(None, Shape3D::vector(1), VectorType::Data);
        let d = e.take_data();
        assert!(e.data().is_empty());
        e.restore_data(d);
        assert_eq!(e.data().len(), 1);
    }

    #[test]
    fn test_unknown_edge() {
        let mut other = Graph::new();
        let mut n = Node::new(1, 0);
        let id = n
            .input_edge(&mut other, 0, Shape3D::vector(1), VectorType::Data)
            .unwrap();
        let g = Graph::new();
        assert!(matches!(g.edge(id), Err(Error::UnknownEdge(_))));
    }
}
